//! 访问策略
//!
//! 页面访问表与动作权限表放在同一个策略对象中，避免两张表各自演化。

use radflow_core::{RadflowError, Result, Role};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// 前端页面
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Page {
    Login,
    Reception,
    Technician,
    Radiologist,
    Admin,
    Patient,
}

impl Page {
    pub fn as_str(&self) -> &'static str {
        match self {
            Page::Login => "login",
            Page::Reception => "reception",
            Page::Technician => "technician",
            Page::Radiologist => "radiologist",
            Page::Admin => "admin",
            Page::Patient => "patient",
        }
    }
}

impl fmt::Display for Page {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Page {
    type Err = RadflowError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "login" => Ok(Page::Login),
            "reception" => Ok(Page::Reception),
            "technician" => Ok(Page::Technician),
            "radiologist" => Ok(Page::Radiologist),
            "admin" => Ok(Page::Admin),
            "patient" => Ok(Page::Patient),
            other => Err(RadflowError::Validation(format!("Unknown page: {}", other))),
        }
    }
}

/// 受控动作
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum PermissionAction {
    CreateVisit,
    StartScan,
    CompleteScan,
    WriteReport,
    MarkComplete,
    ManageUsers,
    ViewAllPatients,
}

impl PermissionAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            PermissionAction::CreateVisit => "createVisit",
            PermissionAction::StartScan => "startScan",
            PermissionAction::CompleteScan => "completeScan",
            PermissionAction::WriteReport => "writeReport",
            PermissionAction::MarkComplete => "markComplete",
            PermissionAction::ManageUsers => "manageUsers",
            PermissionAction::ViewAllPatients => "viewAllPatients",
        }
    }
}

/// 角色访问策略
#[derive(Debug, Clone)]
pub struct AccessPolicy {
    /// 角色 → 可访问页面（第一个为默认落地页）
    pages: HashMap<Role, Vec<Page>>,
    /// 动作 → 允许的角色
    actions: HashMap<PermissionAction, Vec<Role>>,
}

impl AccessPolicy {
    /// 默认策略
    pub fn new() -> Self {
        let mut pages = HashMap::new();
        pages.insert(Role::Reception, vec![Page::Reception]);
        pages.insert(Role::Technician, vec![Page::Technician]);
        pages.insert(Role::Radiologist, vec![Page::Radiologist]);
        pages.insert(
            Role::Admin,
            vec![Page::Admin, Page::Reception, Page::Technician, Page::Radiologist],
        );
        pages.insert(Role::Patient, vec![Page::Patient]);

        let mut actions = HashMap::new();
        actions.insert(PermissionAction::CreateVisit, vec![Role::Reception, Role::Admin]);
        actions.insert(PermissionAction::StartScan, vec![Role::Technician, Role::Admin]);
        actions.insert(PermissionAction::CompleteScan, vec![Role::Technician, Role::Admin]);
        actions.insert(PermissionAction::WriteReport, vec![Role::Radiologist, Role::Admin]);
        actions.insert(PermissionAction::MarkComplete, vec![Role::Radiologist, Role::Admin]);
        actions.insert(PermissionAction::ManageUsers, vec![Role::Admin]);
        actions.insert(
            PermissionAction::ViewAllPatients,
            vec![Role::Reception, Role::Radiologist, Role::Admin],
        );

        Self { pages, actions }
    }

    /// 角色可访问的页面
    pub fn allowed_pages(&self, role: Role) -> &[Page] {
        self.pages.get(&role).map(Vec::as_slice).unwrap_or(&[])
    }

    /// 角色默认页面
    pub fn default_page(&self, role: Role) -> Page {
        self.allowed_pages(role).first().copied().unwrap_or(Page::Login)
    }

    pub fn can_access(&self, role: Role, page: Page) -> bool {
        self.allowed_pages(role).contains(&page)
    }

    pub fn has_permission(&self, role: Role, action: PermissionAction) -> bool {
        self.actions
            .get(&action)
            .map(|roles| roles.contains(&role))
            .unwrap_or(false)
    }

    /// 动作授权，拒绝时返回面向用户的错误
    pub fn authorize(&self, role: Role, action: PermissionAction) -> Result<()> {
        if self.has_permission(role, action) {
            Ok(())
        } else {
            tracing::warn!("Role {} denied action {}", role, action.as_str());
            Err(RadflowError::Permission(format!(
                "Your role ({}) is not allowed to {}",
                role,
                action.as_str()
            )))
        }
    }
}

impl Default for AccessPolicy {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_ROLES: [Role; 5] = [
        Role::Reception,
        Role::Technician,
        Role::Radiologist,
        Role::Admin,
        Role::Patient,
    ];

    #[test]
    fn test_default_page_is_always_allowed() {
        let policy = AccessPolicy::new();
        for role in ALL_ROLES {
            let page = policy.default_page(role);
            assert!(policy.can_access(role, page));
            assert!(policy.allowed_pages(role).contains(&page));
        }
    }

    #[test]
    fn test_page_table() {
        let policy = AccessPolicy::new();
        assert!(!policy.can_access(Role::Technician, Page::Admin));
        assert!(policy.can_access(Role::Admin, Page::Technician));
        assert_eq!(policy.default_page(Role::Admin), Page::Admin);
        assert_eq!(policy.allowed_pages(Role::Patient), &[Page::Patient]);
    }

    #[test]
    fn test_patient_has_no_staff_action() {
        let policy = AccessPolicy::new();
        for action in [
            PermissionAction::CreateVisit,
            PermissionAction::StartScan,
            PermissionAction::CompleteScan,
            PermissionAction::WriteReport,
            PermissionAction::MarkComplete,
            PermissionAction::ManageUsers,
            PermissionAction::ViewAllPatients,
        ] {
            assert!(!policy.has_permission(Role::Patient, action));
            assert!(policy.has_permission(Role::Admin, action));
        }
    }

    #[test]
    fn test_authorize() {
        let policy = AccessPolicy::new();
        assert!(policy.authorize(Role::Technician, PermissionAction::StartScan).is_ok());
        let err = policy
            .authorize(Role::Reception, PermissionAction::WriteReport)
            .unwrap_err();
        assert!(matches!(err, RadflowError::Permission(_)));
    }

    #[test]
    fn test_page_names() {
        assert_eq!("technician".parse::<Page>().unwrap(), Page::Technician);
        assert_eq!(Page::Patient.to_string(), "patient");
    }
}
