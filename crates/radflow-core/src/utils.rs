//! 通用工具函数

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use uuid::Uuid;

/// 实体ID前缀
pub const PATIENT_ID_PREFIX: &str = "PT-";
pub const VISIT_ID_PREFIX: &str = "VS-";
pub const STUDY_ID_PREFIX: &str = "ST-";
pub const USER_ID_PREFIX: &str = "USR-";
pub const TEMPLATE_ID_PREFIX: &str = "TPL-";

/// 客户端占位ID的标记，同步成功后由服务端ID替换
pub const PLACEHOLDER_MARKER: &str = "local-";

/// 生成后端权威ID：前缀 + 8位十六进制
pub fn generate_record_id(prefix: &str) -> String {
    let simple = Uuid::new_v4().simple().to_string();
    format!("{}{}", prefix, simple[..8].to_ascii_uppercase())
}

/// 生成客户端占位ID（时间戳 + 随机数）
pub fn generate_placeholder_id(prefix: &str) -> String {
    let simple = Uuid::new_v4().simple().to_string();
    format!(
        "{}{}{}-{}",
        PLACEHOLDER_MARKER,
        prefix,
        Utc::now().timestamp_millis(),
        &simple[..6]
    )
}

/// 是否为尚未同步的占位ID
pub fn is_placeholder_id(id: &str) -> bool {
    id.starts_with(PLACEHOLDER_MARKER)
}

/// 当前时间戳（RFC3339，秒精度）
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// 从时间戳或日期字符串中提取日期
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Some(ts.with_timezone(&Utc).date_naive());
    }
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Some(date);
    }
    if let Ok(ts) = NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S") {
        return Some(ts.date());
    }
    value
        .get(..10)
        .and_then(|prefix| NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok())
}

/// 按出生日期计算周岁
pub fn age_on(dob: NaiveDate, today: NaiveDate) -> u32 {
    today.years_since(dob).unwrap_or(0)
}

/// 按出生日期计算当前周岁（UTC日期）
pub fn current_age(dob: NaiveDate) -> u32 {
    age_on(dob, Utc::now().date_naive())
}

/// 患者门户口令：姓名前三个字母（大写）+ 电话号码
pub fn derive_patient_passcode(full_name: &str, phone: &str) -> String {
    let letters: String = full_name
        .chars()
        .filter(|c| c.is_alphabetic())
        .take(3)
        .collect::<String>()
        .to_uppercase();
    format!("{}{}", letters, phone.trim())
}

/// 表格单元格宽松解码
///
/// 单元格可能是字符串、数字、布尔或 null，空字符串视为缺失。
pub mod cell {
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    fn to_text(value: Value) -> String {
        match value {
            Value::Null => String::new(),
            Value::String(s) => s,
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            other => other.to_string(),
        }
    }

    pub fn string<'de, D>(deserializer: D) -> Result<String, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(to_text(Value::deserialize(deserializer)?))
    }

    pub fn opt_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let text = to_text(Value::deserialize(deserializer)?);
        Ok(if text.trim().is_empty() { None } else { Some(text) })
    }

    pub fn opt_u32<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let text = to_text(Value::deserialize(deserializer)?);
        let text = text.trim();
        if text.is_empty() {
            return Ok(None);
        }
        // 无法解析的单元格按缺失处理，不影响整份数据集的解码
        Ok(text
            .parse::<f64>()
            .ok()
            .filter(|n| n.is_finite())
            .map(|n| n.max(0.0) as u32))
    }

    /// 图像链接：JSON数组，或保存在单元格中的JSON数组字符串
    pub fn string_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Value::deserialize(deserializer)? {
            Value::Array(items) => Ok(items.into_iter().map(to_text).collect()),
            Value::String(s) if s.trim().is_empty() => Ok(Vec::new()),
            Value::String(s) => serde_json::from_str(&s).map_err(serde::de::Error::custom),
            Value::Null => Ok(Vec::new()),
            other => Err(serde::de::Error::custom(format!(
                "invalid image link list: {}",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_record_id() {
        let id = generate_record_id(STUDY_ID_PREFIX);
        assert!(id.starts_with("ST-"));
        assert_eq!(id.len(), 11);
        assert!(!is_placeholder_id(&id));
    }

    #[test]
    fn test_placeholder_ids_are_unique() {
        let a = generate_placeholder_id(VISIT_ID_PREFIX);
        let b = generate_placeholder_id(VISIT_ID_PREFIX);
        assert!(is_placeholder_id(&a));
        assert_ne!(a, b);
    }

    #[test]
    fn test_parse_date_formats() {
        let expected = NaiveDate::from_ymd_opt(2026, 10, 19);
        assert_eq!(parse_date("2026-10-19T09:30:00Z"), expected);
        assert_eq!(parse_date("2026-10-19"), expected);
        assert_eq!(parse_date("2026-10-19 09:30:00"), expected);
        assert_eq!(parse_date(""), None);
    }

    #[test]
    fn test_derive_patient_passcode() {
        assert_eq!(
            derive_patient_passcode("Ahmed Khaled", "0599123456"),
            "AHM0599123456"
        );
        assert_eq!(derive_patient_passcode("Al Noor", "1"), "ALN1");
    }

    #[test]
    fn test_age_on() {
        let dob = NaiveDate::from_ymd_opt(1985, 4, 12).unwrap();
        let today = NaiveDate::from_ymd_opt(2026, 4, 11).unwrap();
        assert_eq!(age_on(dob, today), 40);
    }
}
