//! 表格
//!
//! 一张表由表头和若干行组成，行值按表头顺序排列，首列为ID。
//! 额外维护 ID → 行号 索引，更新与删除不再逐行扫描。

use radflow_core::{RadflowError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// 以表头为键的一行记录
pub type Record = Map<String, Value>;

/// ID列名
pub const ID_COLUMN: &str = "id";

/// 单元格转文本（数字ID也按文本比较）
pub fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// 表格
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sheet {
    name: String,
    headers: Vec<String>,
    rows: Vec<Vec<Value>>,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl Sheet {
    pub fn new(name: impl Into<String>, headers: &[&str]) -> Self {
        Self {
            name: name.into(),
            headers: headers.iter().map(|h| h.to_string()).collect(),
            rows: Vec::new(),
            index: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// 重建ID索引并把每行补齐到表头宽度（反序列化后调用）
    pub fn reindex(&mut self) {
        let width = self.headers.len();
        for row in &mut self.rows {
            if row.len() < width {
                row.resize(width, Value::String(String::new()));
            }
        }
        self.index = self
            .rows
            .iter()
            .enumerate()
            .filter_map(|(pos, row)| row.first().map(|id| (cell_text(id), pos)))
            .filter(|(id, _)| !id.is_empty())
            .collect();
    }

    /// 追加缺失的列，返回新增的列名；不删除也不重命名已有列
    pub fn ensure_columns(&mut self, columns: &[&str]) -> Vec<String> {
        let mut added = Vec::new();
        for column in columns {
            if !self.headers.iter().any(|h| h == column) {
                self.headers.push(column.to_string());
                added.push(column.to_string());
            }
        }
        if !added.is_empty() {
            let width = self.headers.len();
            for row in &mut self.rows {
                row.resize(width, Value::String(String::new()));
            }
        }
        added
    }

    fn column_index(&self, column: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == column)
    }

    fn to_record(&self, row: &[Value]) -> Record {
        self.headers
            .iter()
            .enumerate()
            .map(|(i, header)| {
                let value = row.get(i).cloned().unwrap_or(Value::String(String::new()));
                (header.clone(), value)
            })
            .collect()
    }

    /// 所有行
    pub fn records(&self) -> Vec<Record> {
        self.rows.iter().map(|row| self.to_record(row)).collect()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<Record> {
        self.index.get(id).map(|&pos| self.to_record(&self.rows[pos]))
    }

    /// 读取某行某列的文本值
    pub fn cell(&self, id: &str, column: &str) -> Option<String> {
        let pos = *self.index.get(id)?;
        let col = self.column_index(column)?;
        self.rows[pos].get(col).map(cell_text)
    }

    /// 追加一行，值按当前表头顺序排列，缺失字段写为空字符串
    pub fn append(&mut self, fields: &Record) -> Result<String> {
        let id = fields.get(ID_COLUMN).map(cell_text).unwrap_or_default();
        if id.is_empty() {
            return Err(RadflowError::Validation(format!(
                "Row for sheet {} has no id",
                self.name
            )));
        }
        if self.contains(&id) {
            return Err(RadflowError::Validation(format!(
                "Duplicate id {} in sheet {}",
                id, self.name
            )));
        }

        let row: Vec<Value> = self
            .headers
            .iter()
            .map(|header| match fields.get(header) {
                None | Some(Value::Null) => Value::String(String::new()),
                Some(value) => value.clone(),
            })
            .collect();

        self.index.insert(id.clone(), self.rows.len());
        self.rows.push(row);
        Ok(id)
    }

    /// 只覆盖给定的列，其余列保持不变；返回实际写入的列名
    pub fn update(&mut self, id: &str, fields: &Record) -> Result<Vec<String>> {
        let pos = *self
            .index
            .get(id)
            .ok_or_else(|| RadflowError::NotFound(format!("Record {} not found in {}", id, self.name)))?;

        let mut written = Vec::new();
        for (column, value) in fields {
            if column == ID_COLUMN {
                continue;
            }
            match self.column_index(column) {
                Some(col) => {
                    let row = &mut self.rows[pos];
                    if row.len() <= col {
                        row.resize(col + 1, Value::String(String::new()));
                    }
                    row[col] = match value {
                        Value::Null => Value::String(String::new()),
                        other => other.clone(),
                    };
                    written.push(column.clone());
                }
                None => {
                    tracing::debug!("Ignoring unknown column {} on sheet {}", column, self.name);
                }
            }
        }
        Ok(written)
    }

    /// 删除一行
    pub fn remove(&mut self, id: &str) -> Result<Record> {
        let pos = self
            .index
            .get(id)
            .copied()
            .ok_or_else(|| RadflowError::NotFound(format!("Record {} not found in {}", id, self.name)))?;
        let row = self.rows.remove(pos);
        self.reindex();
        Ok(self.to_record(&row))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    fn sheet() -> Sheet {
        let mut sheet = Sheet::new("visits", &["id", "patient_id", "status"]);
        sheet
            .append(&record(json!({"id": "VS-1", "patient_id": "PT-1", "status": "In Progress"})))
            .unwrap();
        sheet
            .append(&record(json!({"id": "VS-2", "patient_id": "PT-2"})))
            .unwrap();
        sheet
    }

    #[test]
    fn test_append_fills_missing_with_empty_string() {
        let sheet = sheet();
        let row = sheet.get("VS-2").unwrap();
        assert_eq!(row["status"], json!(""));
        assert_eq!(sheet.len(), 2);
    }

    #[test]
    fn test_duplicate_and_missing_ids_rejected() {
        let mut sheet = sheet();
        assert!(sheet.append(&record(json!({"id": "VS-1"}))).is_err());
        assert!(sheet.append(&record(json!({"status": "x"}))).is_err());
    }

    #[test]
    fn test_update_only_named_columns() {
        let mut sheet = sheet();
        let written = sheet
            .update("VS-1", &record(json!({"status": "Done", "bogus": 1, "id": "VS-9"})))
            .unwrap();
        assert_eq!(written, vec!["status".to_string()]);

        let row = sheet.get("VS-1").unwrap();
        assert_eq!(row["status"], json!("Done"));
        assert_eq!(row["patient_id"], json!("PT-1"));
        assert!(sheet.update("VS-404", &Record::new()).is_err());
    }

    #[test]
    fn test_remove_reindexes() {
        let mut sheet = sheet();
        sheet.remove("VS-1").unwrap();
        assert!(!sheet.contains("VS-1"));
        assert_eq!(sheet.cell("VS-2", "patient_id").as_deref(), Some("PT-2"));
        assert!(sheet.remove("VS-1").is_err());
    }

    #[test]
    fn test_short_rows_are_padded() {
        let raw = json!({
            "name": "studies",
            "headers": ["id", "visit_id", "status", "image_links"],
            "rows": [["ST-1", "VS-1"]]
        });
        let mut sheet: Sheet = serde_json::from_value(raw.clone()).unwrap();
        sheet.reindex();
        assert_eq!(sheet.get("ST-1").unwrap()["image_links"], json!(""));

        // 未重建宽度时直接更新也不越界
        let mut unpadded: Sheet = serde_json::from_value(raw).unwrap();
        unpadded.index.insert("ST-1".to_string(), 0);
        unpadded
            .update("ST-1", &record(json!({"image_links": "[]"})))
            .unwrap();
        assert_eq!(unpadded.cell("ST-1", "image_links").as_deref(), Some("[]"));
        assert_eq!(unpadded.cell("ST-1", "status").as_deref(), Some(""));
    }

    #[test]
    fn test_ensure_columns_is_additive() {
        let mut sheet = sheet();
        let added = sheet.ensure_columns(&["id", "status", "referrer_doctor"]);
        assert_eq!(added, vec!["referrer_doctor".to_string()]);
        assert_eq!(sheet.headers().len(), 4);
        assert_eq!(sheet.get("VS-1").unwrap()["referrer_doctor"], json!(""));
    }
}
