//! 集合定义与表结构迁移
//!
//! 启动时为缺失的集合建表、为已有表追加缺失的列。迁移只做加法。
//! 用户表首次创建时写入一个默认管理员。

use radflow_core::utils::{
    generate_record_id, now_timestamp, PATIENT_ID_PREFIX, STUDY_ID_PREFIX, TEMPLATE_ID_PREFIX,
    USER_ID_PREFIX, VISIT_ID_PREFIX,
};
use radflow_core::{RadflowError, Result, Role};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::fmt;

use crate::credentials::hash_pin;
use crate::sheet::{Record, Sheet};

/// 数据集合
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Collection {
    Patients,
    Visits,
    Studies,
    Templates,
    Users,
}

impl Collection {
    pub fn all() -> [Collection; 5] {
        [
            Collection::Patients,
            Collection::Visits,
            Collection::Studies,
            Collection::Templates,
            Collection::Users,
        ]
    }

    /// 表名
    pub fn sheet_name(&self) -> &'static str {
        match self {
            Collection::Patients => "patients",
            Collection::Visits => "visits",
            Collection::Studies => "studies",
            Collection::Templates => "templates",
            Collection::Users => "users",
        }
    }

    pub fn id_prefix(&self) -> &'static str {
        match self {
            Collection::Patients => PATIENT_ID_PREFIX,
            Collection::Visits => VISIT_ID_PREFIX,
            Collection::Studies => STUDY_ID_PREFIX,
            Collection::Templates => TEMPLATE_ID_PREFIX,
            Collection::Users => USER_ID_PREFIX,
        }
    }

    /// 当前版本的列定义
    pub fn columns(&self) -> &'static [&'static str] {
        match self {
            Collection::Patients => &[
                "id", "full_name", "dob", "age", "gender", "phone", "complaint", "diagnosis",
                "medical_history", "created_at",
            ],
            Collection::Visits => &[
                "id", "patient_id", "status", "check_in_time", "referrer_doctor",
                "assigned_doctor_id", "created_at",
            ],
            Collection::Studies => &[
                "id", "visit_id", "modality", "region", "study_name", "assigned_doctor_id",
                "status", "report_content", "image_links", "completed_at", "created_at",
            ],
            Collection::Templates => &["id", "modality", "region", "finding", "content", "created_at"],
            Collection::Users => &["id", "email", "full_name", "role", "pin", "created_at"],
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.sheet_name())
    }
}

/// 默认管理员
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminSeed {
    pub email: String,
    pub full_name: String,
    pub pin: String,
}

impl Default for AdminSeed {
    fn default() -> Self {
        Self {
            email: "admin@radflow.local".to_string(),
            full_name: "System Administrator".to_string(),
            pin: "1234".to_string(),
        }
    }
}

/// 迁移结果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MigrationReport {
    pub created_sheets: Vec<String>,
    pub added_columns: Vec<(String, String)>,
    pub seeded_admin: Option<String>,
}

impl MigrationReport {
    pub fn is_noop(&self) -> bool {
        self.created_sheets.is_empty() && self.added_columns.is_empty() && self.seeded_admin.is_none()
    }
}

/// 工作簿：所有集合的表
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Workbook {
    sheets: BTreeMap<String, Sheet>,
}

impl Workbook {
    /// 从JSON恢复并重建索引
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        let mut workbook: Workbook = serde_json::from_slice(bytes)?;
        for sheet in workbook.sheets.values_mut() {
            sheet.reindex();
        }
        Ok(workbook)
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn sheet(&self, collection: Collection) -> Result<&Sheet> {
        self.sheets
            .get(collection.sheet_name())
            .ok_or_else(|| RadflowError::Storage(format!("Sheet {} does not exist", collection)))
    }

    pub fn sheet_mut(&mut self, collection: Collection) -> Result<&mut Sheet> {
        self.sheets
            .get_mut(collection.sheet_name())
            .ok_or_else(|| RadflowError::Storage(format!("Sheet {} does not exist", collection)))
    }

    /// 整表替换，返回原表
    pub fn replace_sheet(&mut self, collection: Collection, sheet: Sheet) -> Result<Sheet> {
        let slot = self.sheet_mut(collection)?;
        Ok(std::mem::replace(slot, sheet))
    }

    pub fn has_sheet(&self, collection: Collection) -> bool {
        self.sheets.contains_key(collection.sheet_name())
    }

    /// 增量迁移
    pub fn migrate(&mut self, seed: &AdminSeed) -> Result<MigrationReport> {
        let mut report = MigrationReport::default();

        for collection in Collection::all() {
            let name = collection.sheet_name();
            match self.sheets.get_mut(name) {
                Some(sheet) => {
                    for column in sheet.ensure_columns(collection.columns()) {
                        tracing::info!("Added column {} to sheet {}", column, name);
                        report.added_columns.push((name.to_string(), column));
                    }
                }
                None => {
                    tracing::info!("Creating sheet {}", name);
                    self.sheets
                        .insert(name.to_string(), Sheet::new(name, collection.columns()));
                    report.created_sheets.push(name.to_string());

                    if collection == Collection::Users {
                        let admin_id = self.seed_admin(seed)?;
                        report.seeded_admin = Some(admin_id);
                    }
                }
            }
        }

        Ok(report)
    }

    fn seed_admin(&mut self, seed: &AdminSeed) -> Result<String> {
        let id = generate_record_id(USER_ID_PREFIX);
        let record: Record = match json!({
            "id": id,
            "email": seed.email,
            "full_name": seed.full_name,
            "role": Role::Admin.as_str(),
            "pin": hash_pin(&id, &seed.pin),
            "created_at": now_timestamp(),
        }) {
            Value::Object(map) => map,
            _ => return Err(RadflowError::Internal("Admin seed is not an object".to_string())),
        };

        self.sheet_mut(Collection::Users)?.append(&record)?;
        tracing::info!("Seeded default administrator {}", id);
        Ok(id)
    }
}
