//! 管理员控制台：账号、报告模板与当日概况

use chrono::NaiveDate;
use radflow_core::protocol::{creation_payload, RecordRef};
use radflow_core::utils::{generate_placeholder_id, now_timestamp, TEMPLATE_ID_PREFIX, USER_ID_PREFIX};
use radflow_core::{Action, Modality, RadflowError, Result, Role, Template, User};
use radflow_workflow::{PermissionAction, WorkListFilter, WorkListManager, WorkListStats};
use serde_json::{json, Value};

use crate::app::App;
use crate::auth::validate_pin_input;
use crate::state::SyncStatus;
use crate::sync::SyncJob;

/// 新员工表单
#[derive(Debug, Clone)]
pub struct UserForm {
    pub full_name: String,
    pub email: String,
    pub role: Role,
    pub pin: String,
}

/// 模板表单，`id` 为空时新建
#[derive(Debug, Clone)]
pub struct TemplateForm {
    pub id: Option<String>,
    pub modality: Modality,
    pub region: String,
    pub finding: String,
    pub content: String,
}

#[derive(Debug, Clone)]
pub struct UserRow {
    pub user: User,
    pub sync: Option<SyncStatus>,
}

pub struct AdminView<'a> {
    app: &'a App,
}

impl<'a> AdminView<'a> {
    pub fn new(app: &'a App) -> Self {
        Self { app }
    }

    pub async fn users(&self) -> Vec<UserRow> {
        self.app
            .read(|state| {
                state
                    .users
                    .iter()
                    .map(|user| UserRow {
                        user: user.clone(),
                        sync: state.sync_status(&user.id).cloned(),
                    })
                    .collect()
            })
            .await
    }

    /// 新建员工账号，返回占位ID
    ///
    /// PIN只随创建请求发送，不进入本地状态。
    pub async fn create_user(&self, form: UserForm) -> Result<String> {
        self.app.authorize(PermissionAction::ManageUsers).await?;

        if form.full_name.trim().is_empty() {
            return Err(self
                .app
                .reject(RadflowError::Validation("Full name is required".to_string())));
        }
        if !form.role.is_staff() {
            return Err(self
                .app
                .reject(RadflowError::Validation("Users must have a staff role".to_string())));
        }
        validate_pin_input(&form.pin).map_err(|e| self.app.reject(e))?;

        let user = User {
            id: generate_placeholder_id(USER_ID_PREFIX),
            email: form.email.trim().to_string(),
            full_name: form.full_name.trim().to_string(),
            role: form.role,
            created_at: now_timestamp(),
        };
        let id = user.id.clone();

        let mut payload = creation_payload(&user)?;
        if let Value::Object(map) = &mut payload {
            map.insert("pin".to_string(), json!(form.pin));
        }

        self.app.write(|state| state.users.push(user)).await;
        self.app
            .enqueue(SyncJob::create(Action::CreateUser, &id, payload))
            .await?;
        Ok(id)
    }

    /// 删除账号（需确认），不能删除自己
    pub async fn delete_user(&self, user_id: &str) -> Result<bool> {
        let session = self.app.authorize(PermissionAction::ManageUsers).await?;

        let (id, name) = self
            .app
            .read(|state| {
                let id = state.resolve_id(user_id);
                state.user(id).map(|u| (id.to_string(), u.full_name.clone()))
            })
            .await
            .ok_or_else(|| {
                self.app
                    .reject(RadflowError::NotFound(format!("User {} not found", user_id)))
            })?;
        if id == session.subject_id() {
            return Err(self
                .app
                .reject(RadflowError::Validation("You cannot delete your own account".to_string())));
        }
        if !self.app.prompter().confirm(&format!("Delete user {}?", name)) {
            return Ok(false);
        }

        self.app.write(|state| state.users.retain(|u| u.id != id)).await;
        let payload = serde_json::to_value(RecordRef { id: id.clone() })?;
        self.app
            .enqueue(SyncJob::update(Action::DeleteUser, &id, payload))
            .await?;
        Ok(true)
    }

    /// 新建或更新模板
    pub async fn save_template(&self, form: TemplateForm) -> Result<String> {
        self.app.authorize(PermissionAction::ManageUsers).await?;

        if form.region.trim().is_empty()
            || form.finding.trim().is_empty()
            || form.content.trim().is_empty()
        {
            return Err(self.app.reject(RadflowError::Validation(
                "Region, finding and content are required".to_string(),
            )));
        }

        let existing = match form.id.as_deref() {
            Some(id) => self
                .app
                .read(|state| {
                    let id = state.resolve_id(id);
                    state
                        .templates
                        .iter()
                        .find(|t| t.id == id)
                        .map(|t| (t.id.clone(), t.created_at.clone()))
                })
                .await,
            None => None,
        };

        let template = Template {
            id: existing
                .as_ref()
                .map(|(id, _)| id.clone())
                .unwrap_or_else(|| generate_placeholder_id(TEMPLATE_ID_PREFIX)),
            modality: form.modality,
            region: form.region.trim().to_string(),
            finding: form.finding.trim().to_string(),
            content: form.content,
            created_at: existing
                .as_ref()
                .map(|(_, created)| created.clone())
                .unwrap_or_else(now_timestamp),
        };
        let id = template.id.clone();

        let job = if existing.is_some() {
            SyncJob::update(Action::SaveTemplate, &id, serde_json::to_value(&template)?)
        } else {
            SyncJob::create(Action::SaveTemplate, &id, creation_payload(&template)?)
        };

        self.app
            .write(|state| match state.templates.iter_mut().find(|t| t.id == id) {
                Some(slot) => *slot = template,
                None => state.templates.push(template),
            })
            .await;
        self.app.enqueue(job).await?;
        Ok(id)
    }

    pub async fn delete_template(&self, template_id: &str) -> Result<bool> {
        self.app.authorize(PermissionAction::ManageUsers).await?;

        let id = self
            .app
            .read(|state| {
                let id = state.resolve_id(template_id);
                state.templates.iter().any(|t| t.id == id).then(|| id.to_string())
            })
            .await
            .ok_or_else(|| {
                self.app
                    .reject(RadflowError::NotFound(format!("Template {} not found", template_id)))
            })?;
        if !self.app.prompter().confirm("Delete this template?") {
            return Ok(false);
        }

        self.app.write(|state| state.templates.retain(|t| t.id != id)).await;
        let payload = serde_json::to_value(RecordRef { id: id.clone() })?;
        self.app
            .enqueue(SyncJob::update(Action::DeleteTemplate, &id, payload))
            .await?;
        Ok(true)
    }

    /// 指定日期的检查统计
    pub async fn dashboard(&self, date: NaiveDate) -> Result<WorkListStats> {
        self.app.authorize(PermissionAction::ViewAllPatients).await?;
        Ok(self
            .app
            .read(|state| {
                WorkListManager::new(&state.patients, &state.visits, &state.studies)
                    .stats(&WorkListFilter::on(date))
            })
            .await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::views::testing::{admin_app, app_with};
    use crate::views::today;
    use crate::ScriptedPrompter;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_created_user_can_log_in() {
        let (app, _) = admin_app().await;
        let admin = AdminView::new(&app);

        let placeholder = admin
            .create_user(UserForm {
                full_name: "Sara Nasser".to_string(),
                email: "sara@radflow.local".to_string(),
                role: Role::Reception,
                pin: "8642".to_string(),
            })
            .await
            .unwrap();
        assert!(app.read(|s| s.user(&placeholder).is_some()).await);

        app.flush().await.unwrap();
        let id = app.read(|s| s.resolve_id(&placeholder).to_string()).await;
        assert!(id.starts_with(USER_ID_PREFIX));
        assert_eq!(app.sync_status(&id).await, Some(SyncStatus::Committed));

        app.logout().await.unwrap();
        let nav = app.login_staff(&id, "8642").await.unwrap();
        assert_eq!(nav.page, radflow_workflow::Page::Reception);
        assert!(app.login_staff(&id, "0000").await.is_err());
    }

    #[tokio::test]
    async fn test_invalid_user_forms_are_rejected_locally() {
        let (app, prompter) = admin_app().await;
        let admin = AdminView::new(&app);
        let before = admin.users().await.len();

        let short_pin = admin
            .create_user(UserForm {
                full_name: "Omar".to_string(),
                email: String::new(),
                role: Role::Technician,
                pin: "12".to_string(),
            })
            .await;
        assert!(short_pin.is_err());
        assert_eq!(
            prompter.alerts().last().map(String::as_str),
            Some("PIN must be exactly 4 digits")
        );

        let patient_role = admin
            .create_user(UserForm {
                full_name: "Omar".to_string(),
                email: String::new(),
                role: Role::Patient,
                pin: "1234".to_string(),
            })
            .await;
        assert!(patient_role.is_err());
        assert_eq!(admin.users().await.len(), before);
    }

    #[tokio::test]
    async fn test_non_admin_is_denied() {
        let prompter = Arc::new(ScriptedPrompter::accepting());
        let (app, _) = app_with(Arc::clone(&prompter)).await;
        let err = AdminView::new(&app).dashboard(today()).await.unwrap_err();
        assert!(matches!(err, RadflowError::Authentication(_)));

        let (app, _) = admin_app().await;
        let admin = AdminView::new(&app);
        let tech = admin
            .create_user(UserForm {
                full_name: "Omar Haddad".to_string(),
                email: String::new(),
                role: Role::Technician,
                pin: "1111".to_string(),
            })
            .await
            .unwrap();
        app.flush().await.unwrap();
        let tech = app.read(|s| s.resolve_id(&tech).to_string()).await;
        app.logout().await.unwrap();
        app.login_staff(&tech, "1111").await.unwrap();

        let err = AdminView::new(&app)
            .delete_template("TPL-00000000")
            .await
            .unwrap_err();
        assert!(matches!(err, RadflowError::Permission(_)));
    }

    #[tokio::test]
    async fn test_template_lifecycle() {
        let (app, _) = admin_app().await;
        let admin = AdminView::new(&app);

        let id = admin
            .save_template(TemplateForm {
                id: None,
                modality: Modality::Us,
                region: "Thyroid".to_string(),
                finding: "Normal".to_string(),
                content: "<p>Thyroid lobes measure {{size}} mm.</p>".to_string(),
            })
            .await
            .unwrap();
        app.flush().await.unwrap();

        admin
            .save_template(TemplateForm {
                id: Some(id.clone()),
                modality: Modality::Us,
                region: "Thyroid".to_string(),
                finding: "Normal".to_string(),
                content: "<p>Normal thyroid.</p>".to_string(),
            })
            .await
            .unwrap();
        app.flush().await.unwrap();
        app.load_data(false).await.unwrap();

        let templates = app.read(|s| s.templates.clone()).await;
        assert_eq!(templates.len(), 1);
        assert_eq!(templates[0].content, "<p>Normal thyroid.</p>");

        assert!(admin.delete_template(&id).await.unwrap());
        app.flush().await.unwrap();
        app.load_data(false).await.unwrap();
        assert!(app.read(|s| s.templates.is_empty()).await);
    }
}
