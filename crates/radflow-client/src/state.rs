//! 应用状态
//!
//! 全量数据快照加上会话、当前页面和同步台账。数据通过 `getAllData`
//! 整体替换，不做增量合并。

use radflow_core::{Dataset, Patient, Study, Template, User, Visit};
use radflow_workflow::Page;
use std::collections::BTreeMap;

use crate::session::Session;

/// 本地实体的同步状态
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncStatus {
    /// 已在本地生效，等待写回后端
    Pending,
    /// 后端已确认
    Committed,
    /// 写回失败，本地状态与后端不一致，直到下次全量加载
    Failed(String),
}

impl SyncStatus {
    pub fn is_failed(&self) -> bool {
        matches!(self, SyncStatus::Failed(_))
    }
}

#[derive(Debug, Clone)]
pub struct AppState {
    pub patients: Vec<Patient>,
    pub visits: Vec<Visit>,
    pub studies: Vec<Study>,
    pub templates: Vec<Template>,
    pub users: Vec<User>,
    pub session: Option<Session>,
    pub current_page: Page,
    pub loading: bool,
    /// 实体ID → 同步状态
    sync: BTreeMap<String, SyncStatus>,
    /// 已被替换的占位ID → 后端ID
    aliases: BTreeMap<String, String>,
}

impl Default for AppState {
    fn default() -> Self {
        Self {
            patients: Vec::new(),
            visits: Vec::new(),
            studies: Vec::new(),
            templates: Vec::new(),
            users: Vec::new(),
            session: None,
            current_page: Page::Login,
            loading: false,
            sync: BTreeMap::new(),
            aliases: BTreeMap::new(),
        }
    }
}

impl AppState {
    /// 用后端数据整体替换各集合
    pub fn replace_dataset(&mut self, data: Dataset) {
        self.patients = data.patients;
        self.visits = data.visits;
        self.studies = data.studies;
        self.templates = data.templates;
        self.users = data.users;
    }

    pub fn dataset(&self) -> Dataset {
        Dataset {
            patients: self.patients.clone(),
            visits: self.visits.clone(),
            studies: self.studies.clone(),
            templates: self.templates.clone(),
            users: self.users.clone(),
        }
    }

    pub fn patient(&self, id: &str) -> Option<&Patient> {
        self.patients.iter().find(|p| p.id == id)
    }

    pub fn visit(&self, id: &str) -> Option<&Visit> {
        self.visits.iter().find(|v| v.id == id)
    }

    pub fn study(&self, id: &str) -> Option<&Study> {
        self.studies.iter().find(|s| s.id == id)
    }

    pub fn study_mut(&mut self, id: &str) -> Option<&mut Study> {
        self.studies.iter_mut().find(|s| s.id == id)
    }

    pub fn user(&self, id: &str) -> Option<&User> {
        self.users.iter().find(|u| u.id == id)
    }

    /// 检查所属患者
    pub fn patient_for_study(&self, study: &Study) -> Option<&Patient> {
        self.visit(&study.visit_id)
            .and_then(|visit| self.patient(&visit.patient_id))
    }

    /// 控制器可能持有已被替换的占位ID，统一解析为当前ID
    pub fn resolve_id<'a>(&'a self, id: &'a str) -> &'a str {
        self.aliases.get(id).map(String::as_str).unwrap_or(id)
    }

    pub fn sync_status(&self, id: &str) -> Option<&SyncStatus> {
        self.sync.get(self.resolve_id(id))
    }

    pub fn set_sync_status(&mut self, id: &str, status: SyncStatus) {
        self.sync.insert(id.to_string(), status);
    }

    /// 未完成同步的实体数
    pub fn pending_count(&self) -> usize {
        self.sync
            .values()
            .filter(|s| **s == SyncStatus::Pending)
            .count()
    }

    pub fn failed_entities(&self) -> Vec<(&str, &str)> {
        self.sync
            .iter()
            .filter_map(|(id, status)| match status {
                SyncStatus::Failed(msg) => Some((id.as_str(), msg.as_str())),
                _ => None,
            })
            .collect()
    }

    /// 把占位ID替换为后端分配的ID（实体自身、引用它的记录，包括指派医生，以及同步台账）
    pub fn rename_id(&mut self, placeholder: &str, real: &str) {
        let swap = |value: &mut String| {
            if value == placeholder {
                *value = real.to_string();
            }
        };

        for patient in &mut self.patients {
            swap(&mut patient.id);
        }
        for visit in &mut self.visits {
            swap(&mut visit.id);
            swap(&mut visit.patient_id);
            swap(&mut visit.assigned_doctor_id);
        }
        for study in &mut self.studies {
            swap(&mut study.id);
            swap(&mut study.visit_id);
            swap(&mut study.assigned_doctor_id);
        }
        for template in &mut self.templates {
            swap(&mut template.id);
        }
        for user in &mut self.users {
            swap(&mut user.id);
        }

        if let Some(status) = self.sync.remove(placeholder) {
            self.sync.insert(real.to_string(), status);
        }
        self.aliases.insert(placeholder.to_string(), real.to_string());
    }
}
