//! 核心数据模型定义
//!
//! 后端以表格行保存所有实体，单元格可能是字符串、数字或空字符串，
//! 因此文本字段统一通过 [`crate::utils::cell`] 中的宽松解码器读取。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::RadflowError;
use crate::utils::cell;

/// 用户角色
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Role {
    /// 前台登记
    Reception,
    /// 技师
    Technician,
    /// 放射科医生
    Radiologist,
    /// 管理员
    Admin,
    /// 患者（仅用于患者门户会话）
    Patient,
}

impl Role {
    /// 员工角色（可在用户表中出现的角色）
    pub fn staff_roles() -> [Role; 4] {
        [Role::Reception, Role::Technician, Role::Radiologist, Role::Admin]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Reception => "Reception",
            Role::Technician => "Technician",
            Role::Radiologist => "Radiologist",
            Role::Admin => "Admin",
            Role::Patient => "Patient",
        }
    }

    pub fn is_staff(&self) -> bool {
        !matches!(self, Role::Patient)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = RadflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "Reception" => Ok(Role::Reception),
            "Technician" => Ok(Role::Technician),
            "Radiologist" => Ok(Role::Radiologist),
            "Admin" => Ok(Role::Admin),
            "Patient" => Ok(Role::Patient),
            other => Err(RadflowError::Validation(format!("Unknown role: {}", other))),
        }
    }
}

/// 检查设备类型
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Modality {
    Us,  // 超声
    Ct,  // CT
    Mri, // 磁共振
    Xr,  // X线
    Other(String),
}

impl Modality {
    pub fn code(&self) -> &str {
        match self {
            Modality::Us => "US",
            Modality::Ct => "CT",
            Modality::Mri => "MRI",
            Modality::Xr => "XR",
            Modality::Other(code) => code,
        }
    }
}

impl From<String> for Modality {
    fn from(value: String) -> Self {
        match value.trim().to_ascii_uppercase().as_str() {
            "US" => Modality::Us,
            "CT" => Modality::Ct,
            "MRI" | "MR" => Modality::Mri,
            "XR" | "X-RAY" => Modality::Xr,
            _ => Modality::Other(value.trim().to_string()),
        }
    }
}

impl From<&str> for Modality {
    fn from(value: &str) -> Self {
        Modality::from(value.to_string())
    }
}

impl From<Modality> for String {
    fn from(value: Modality) -> Self {
        value.code().to_string()
    }
}

impl fmt::Display for Modality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// 检查状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StudyStatus {
    Waiting,   // 等待检查
    Scanning,  // 检查中
    Reporting, // 待写报告
    Reported,  // 已出报告
    Completed, // 已完成
}

impl StudyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StudyStatus::Waiting => "Waiting",
            StudyStatus::Scanning => "Scanning",
            StudyStatus::Reporting => "Reporting",
            StudyStatus::Reported => "Reported",
            StudyStatus::Completed => "Completed",
        }
    }

    pub fn all() -> [StudyStatus; 5] {
        [
            StudyStatus::Waiting,
            StudyStatus::Scanning,
            StudyStatus::Reporting,
            StudyStatus::Reported,
            StudyStatus::Completed,
        ]
    }
}

impl fmt::Display for StudyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StudyStatus {
    type Err = RadflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StudyStatus::all()
            .into_iter()
            .find(|status| status.as_str() == s.trim())
            .ok_or_else(|| RadflowError::Validation(format!("Unknown study status: {}", s)))
    }
}

/// 患者基本信息
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Patient {
    #[serde(deserialize_with = "cell::string")]
    pub id: String,
    #[serde(default, deserialize_with = "cell::string")]
    pub full_name: String,
    #[serde(default, deserialize_with = "cell::opt_string")]
    pub dob: Option<String>, // YYYY-MM-DD
    #[serde(default, deserialize_with = "cell::opt_u32")]
    pub age: Option<u32>,
    #[serde(default, deserialize_with = "cell::string")]
    pub gender: String,
    #[serde(default, deserialize_with = "cell::string")]
    pub phone: String,
    #[serde(default, deserialize_with = "cell::string")]
    pub complaint: String, // 主诉
    #[serde(default, deserialize_with = "cell::string")]
    pub diagnosis: String, // 临床诊断
    #[serde(default, deserialize_with = "cell::string")]
    pub medical_history: String,
    #[serde(default, deserialize_with = "cell::string")]
    pub created_at: String,
}

/// 就诊信息，一次就诊包含一个或多个检查
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Visit {
    #[serde(deserialize_with = "cell::string")]
    pub id: String,
    #[serde(default, deserialize_with = "cell::string")]
    pub patient_id: String,
    #[serde(default, deserialize_with = "cell::string")]
    pub status: String, // 自由文本，如 "In Progress"
    #[serde(default, deserialize_with = "cell::string")]
    pub check_in_time: String,
    #[serde(default, deserialize_with = "cell::string")]
    pub referrer_doctor: String,
    #[serde(default, deserialize_with = "cell::string")]
    pub assigned_doctor_id: String,
    #[serde(default, deserialize_with = "cell::string")]
    pub created_at: String,
}

/// 检查信息
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Study {
    #[serde(deserialize_with = "cell::string")]
    pub id: String,
    #[serde(default, deserialize_with = "cell::string")]
    pub visit_id: String,
    pub modality: Modality,
    #[serde(default, deserialize_with = "cell::string")]
    pub region: String, // 检查部位
    #[serde(default, deserialize_with = "cell::string")]
    pub study_name: String,
    #[serde(default, deserialize_with = "cell::string")]
    pub assigned_doctor_id: String,
    pub status: StudyStatus,
    #[serde(default, deserialize_with = "cell::opt_string")]
    pub report_content: Option<String>, // HTML片段
    #[serde(default, deserialize_with = "cell::string_list")]
    pub image_links: Vec<String>,
    #[serde(default, deserialize_with = "cell::opt_string")]
    pub completed_at: Option<String>,
    #[serde(default, deserialize_with = "cell::string")]
    pub created_at: String,
}

/// 员工账号。PIN只存在于后端，客户端模型不携带。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    #[serde(deserialize_with = "cell::string")]
    pub id: String,
    #[serde(default, deserialize_with = "cell::string")]
    pub email: String,
    #[serde(default, deserialize_with = "cell::string")]
    pub full_name: String,
    pub role: Role,
    #[serde(default, deserialize_with = "cell::string")]
    pub created_at: String,
}

/// 报告模板片段，按 设备类型 → 部位 → 所见 组织
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Template {
    #[serde(deserialize_with = "cell::string")]
    pub id: String,
    pub modality: Modality,
    #[serde(default, deserialize_with = "cell::string")]
    pub region: String,
    #[serde(default, deserialize_with = "cell::string")]
    pub finding: String,
    #[serde(default, deserialize_with = "cell::string")]
    pub content: String,
    #[serde(default, deserialize_with = "cell::string")]
    pub created_at: String,
}

/// 全量数据集（getAllData 的返回内容）
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Dataset {
    #[serde(default)]
    pub patients: Vec<Patient>,
    #[serde(default)]
    pub visits: Vec<Visit>,
    #[serde(default)]
    pub studies: Vec<Study>,
    #[serde(default)]
    pub templates: Vec<Template>,
    #[serde(default)]
    pub users: Vec<User>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_study_from_sheet_row() {
        let row = json!({
            "id": "ST-00A1",
            "visit_id": "VS-1",
            "modality": "US",
            "region": "Abdomen",
            "study_name": "US Abdomen",
            "assigned_doctor_id": "USR-2",
            "status": "Waiting",
            "report_content": "",
            "image_links": "[\"http://pacs/1\"]",
            "completed_at": "",
            "created_at": "2026-10-19T08:00:00Z"
        });

        let study: Study = serde_json::from_value(row).unwrap();
        assert_eq!(study.modality, Modality::Us);
        assert_eq!(study.status, StudyStatus::Waiting);
        assert_eq!(study.report_content, None);
        assert_eq!(study.image_links, vec!["http://pacs/1".to_string()]);
    }

    #[test]
    fn test_patient_numeric_cells() {
        let row = json!({
            "id": "PT-1",
            "full_name": "Ahmed Khaled",
            "age": "41",
            "phone": 599123456,
            "dob": ""
        });

        let patient: Patient = serde_json::from_value(row).unwrap();
        assert_eq!(patient.age, Some(41));
        assert_eq!(patient.phone, "599123456");
        assert_eq!(patient.dob, None);

        // 非数字年龄按缺失处理，不阻断整份数据集
        let data: Dataset = serde_json::from_value(json!({
            "patients": [{"id": "PT-2", "full_name": "X", "age": "forty"}]
        }))
        .unwrap();
        assert_eq!(data.patients[0].age, None);
    }

    #[test]
    fn test_modality_round_trip_keeps_unknown_codes() {
        assert_eq!(Modality::from("mr"), Modality::Mri);
        let other = Modality::from("PET");
        assert_eq!(String::from(other), "PET");
    }

    #[test]
    fn test_role_parsing() {
        assert_eq!("Radiologist".parse::<Role>().unwrap(), Role::Radiologist);
        assert!("Janitor".parse::<Role>().is_err());
        assert!(!Role::Patient.is_staff());
    }
}
