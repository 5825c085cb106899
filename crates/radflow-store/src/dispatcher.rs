//! 请求分发器
//!
//! 把 动作名 + JSON请求体 路由到一个存储操作，结果统一包装为
//! `{status, data}`，错误统一包装为 `{status: "error", message}`。
//! 每个请求先获取咨询锁。

use async_trait::async_trait;
use radflow_core::protocol::{
    CompletionRequest, CreatedRecord, ImageLinksUpdate, LoginRequest, RecordRef, ReportSubmission,
    StudyStatusUpdate,
};
use radflow_core::utils::{
    current_age, generate_record_id, now_timestamp, parse_date, USER_ID_PREFIX,
};
use radflow_core::{Action, ApiResponse, Backend, RadflowError, Result, Role, StudyStatus};
use radflow_workflow::{StudyEvent, StudyStateMachine};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;

use crate::credentials::{hash_pin, is_hashed, validate_pin_format, verify_pin};
use crate::lock::AdvisoryLock;
use crate::schema::Collection;
use crate::sheet::{cell_text, Record, ID_COLUMN};
use crate::store::RowStore;

/// 请求分发器
#[derive(Debug)]
pub struct Dispatcher {
    store: Arc<RowStore>,
    lock: AdvisoryLock,
    state_machine: StudyStateMachine,
}

fn parse_payload<T: DeserializeOwned>(payload: Value) -> Result<T> {
    serde_json::from_value(payload)
        .map_err(|e| RadflowError::Validation(format!("Invalid payload: {}", e)))
}

fn into_record(payload: Value) -> Result<Record> {
    match payload {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Record::new()),
        other => Err(RadflowError::Validation(format!(
            "Payload must be a JSON object, got {}",
            other
        ))),
    }
}

fn text_field(record: &Record, field: &str) -> String {
    record.get(field).map(cell_text).unwrap_or_default().trim().to_string()
}

fn require_field(record: &Record, field: &str) -> Result<String> {
    let value = text_field(record, field);
    if value.is_empty() {
        Err(RadflowError::Validation(format!("Missing required field: {}", field)))
    } else {
        Ok(value)
    }
}

fn created(id: String) -> Result<Option<Value>> {
    Ok(Some(serde_json::to_value(CreatedRecord { id })?))
}

fn study_status(record: &Record) -> Result<StudyStatus> {
    text_field(record, "status").parse()
}

/// 去掉PIN列后再返回给客户端
fn redact_user(mut user: Record) -> Record {
    user.remove("pin");
    user
}

impl Dispatcher {
    pub fn new(store: Arc<RowStore>, lock: AdvisoryLock) -> Self {
        Self {
            store,
            lock,
            state_machine: StudyStateMachine::new(),
        }
    }

    pub fn lock(&self) -> &AdvisoryLock {
        &self.lock
    }

    /// 按动作名分发请求
    pub async fn dispatch(&self, action_name: &str, payload: Value) -> ApiResponse {
        let _ticket = self.lock.acquire().await;
        let started = Instant::now();

        let result = match action_name.parse::<Action>() {
            Ok(action) => self.execute(action, payload).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(data) => {
                tracing::debug!("Action {} succeeded in {:?}", action_name, started.elapsed());
                ApiResponse::success(data)
            }
            Err(e) => {
                tracing::warn!("Action {} failed: {}", action_name, e);
                ApiResponse::error(e.user_message())
            }
        }
    }

    /// 执行已解析的动作
    pub async fn execute(&self, action: Action, payload: Value) -> Result<Option<Value>> {
        match action {
            Action::GetAllData => self.get_all_data().await,
            Action::CreatePatient => self.create_patient(into_record(payload)?).await,
            Action::CreateVisit => self.create_visit(into_record(payload)?).await,
            Action::CreateStudy => self.create_study(into_record(payload)?).await,
            Action::CreateUser => self.create_user(into_record(payload)?).await,
            Action::UpdateStudyStatus => self.update_study_status(parse_payload(payload)?).await,
            Action::SaveReport => self.save_report(parse_payload(payload)?).await,
            Action::MarkComplete => self.mark_complete(parse_payload(payload)?).await,
            Action::UpdateImageLinks => self.update_image_links(parse_payload(payload)?).await,
            Action::SaveTemplate => self.save_template(into_record(payload)?).await,
            Action::DeleteTemplate => {
                let target: RecordRef = parse_payload(payload)?;
                self.store.delete_row(Collection::Templates, &target.id).await?;
                Ok(None)
            }
            Action::Login => self.login(parse_payload(payload)?).await,
            Action::DeleteUser => self.delete_user(parse_payload(payload)?).await,
        }
    }

    async fn get_all_data(&self) -> Result<Option<Value>> {
        let mut data = self.store.get_all_data().await?;
        if let Some(users) = data.remove("users") {
            data.insert("users", users.into_iter().map(redact_user).collect());
        }
        Ok(Some(serde_json::to_value(data)?))
    }

    /// 新建记录的ID一律由后端分配
    fn strip_client_id(fields: &mut Record, collection: Collection) {
        if let Some(id) = fields.remove(ID_COLUMN) {
            tracing::debug!("Ignoring client-supplied id {} for new {}", id, collection);
        }
    }

    async fn create_patient(&self, mut fields: Record) -> Result<Option<Value>> {
        Self::strip_client_id(&mut fields, Collection::Patients);
        require_field(&fields, "full_name")?;

        let age = text_field(&fields, "age");
        if age.is_empty() {
            if let Some(dob) = parse_date(&text_field(&fields, "dob")) {
                fields.insert("age".to_string(), json!(current_age(dob)));
            }
        } else {
            let years: u32 = age
                .parse()
                .map_err(|_| RadflowError::Validation(format!("Age must be a whole number, got {}", age)))?;
            fields.insert("age".to_string(), json!(years));
        }
        created(self.store.create_row(Collection::Patients, fields).await?)
    }

    async fn create_visit(&self, mut fields: Record) -> Result<Option<Value>> {
        Self::strip_client_id(&mut fields, Collection::Visits);
        require_field(&fields, "patient_id")?;
        if text_field(&fields, "status").is_empty() {
            fields.insert("status".to_string(), json!("In Progress"));
        }
        if text_field(&fields, "check_in_time").is_empty() {
            fields.insert("check_in_time".to_string(), json!(now_timestamp()));
        }
        created(self.store.create_row(Collection::Visits, fields).await?)
    }

    async fn create_study(&self, mut fields: Record) -> Result<Option<Value>> {
        Self::strip_client_id(&mut fields, Collection::Studies);
        require_field(&fields, "visit_id")?;
        require_field(&fields, "modality")?;

        let status = text_field(&fields, "status");
        if status.is_empty() {
            fields.insert("status".to_string(), json!(StudyStatus::Waiting.as_str()));
        } else if status.parse::<StudyStatus>()? != StudyStatus::Waiting {
            return Err(RadflowError::Validation(format!(
                "New studies must start as Waiting, got {}",
                status
            )));
        }

        let links = match fields.remove("image_links") {
            Some(Value::Array(items)) => Value::Array(items),
            Some(Value::String(s)) if !s.trim().is_empty() => serde_json::from_str(&s)?,
            _ => Value::Array(Vec::new()),
        };
        fields.insert("image_links".to_string(), Value::String(links.to_string()));

        created(self.store.create_row(Collection::Studies, fields).await?)
    }

    async fn create_user(&self, mut fields: Record) -> Result<Option<Value>> {
        Self::strip_client_id(&mut fields, Collection::Users);
        require_field(&fields, "full_name")?;
        let role: Role = require_field(&fields, "role")?.parse()?;
        if !role.is_staff() {
            return Err(RadflowError::Validation("Users must have a staff role".to_string()));
        }
        let pin = require_field(&fields, "pin")?;
        validate_pin_format(&pin)?;

        // PIN摘要以用户ID为盐，需要先确定ID
        let mut id = generate_record_id(USER_ID_PREFIX);
        while self.store.find_row(Collection::Users, &id).await.is_ok() {
            id = generate_record_id(USER_ID_PREFIX);
        }
        fields.insert("pin".to_string(), json!(hash_pin(&id, &pin)));
        fields.insert("role".to_string(), json!(role.as_str()));
        fields.insert(ID_COLUMN.to_string(), json!(id));

        created(self.store.create_row(Collection::Users, fields).await?)
    }

    async fn update_study_status(&self, request: StudyStatusUpdate) -> Result<Option<Value>> {
        let machine = &self.state_machine;
        self.store
            .update_with(Collection::Studies, &request.id, |current| {
                let from = study_status(current)?;
                let event = machine.validate_target(from, request.status)?;

                let mut fields = Record::new();
                fields.insert("status".to_string(), json!(request.status.as_str()));
                if event == StudyEvent::MarkComplete {
                    fields.insert("completed_at".to_string(), json!(now_timestamp()));
                }
                Ok(fields)
            })
            .await?;
        Ok(None)
    }

    async fn save_report(&self, request: ReportSubmission) -> Result<Option<Value>> {
        let machine = &self.state_machine;
        self.store
            .update_with(Collection::Studies, &request.study_id, |current| {
                let to = machine.transition(study_status(current)?, StudyEvent::SignReport)?;

                let mut fields = Record::new();
                fields.insert("report_content".to_string(), json!(request.content_html));
                fields.insert("status".to_string(), json!(to.as_str()));
                Ok(fields)
            })
            .await?;
        Ok(None)
    }

    async fn mark_complete(&self, request: CompletionRequest) -> Result<Option<Value>> {
        let machine = &self.state_machine;
        self.store
            .update_with(Collection::Studies, &request.study_id, |current| {
                let to = machine.transition(study_status(current)?, StudyEvent::MarkComplete)?;

                let mut fields = Record::new();
                fields.insert("status".to_string(), json!(to.as_str()));
                fields.insert("completed_at".to_string(), json!(now_timestamp()));
                if let Some(content) = &request.content_html {
                    fields.insert("report_content".to_string(), json!(content));
                }
                Ok(fields)
            })
            .await?;
        Ok(None)
    }

    async fn update_image_links(&self, request: ImageLinksUpdate) -> Result<Option<Value>> {
        let links: Vec<String> = request
            .image_links
            .iter()
            .map(|link| link.trim().to_string())
            .filter(|link| !link.is_empty())
            .collect();

        let mut fields = Record::new();
        fields.insert("image_links".to_string(), Value::String(serde_json::to_string(&links)?));
        self.store
            .update_row(Collection::Studies, &request.study_id, fields)
            .await?;
        Ok(None)
    }

    async fn save_template(&self, mut fields: Record) -> Result<Option<Value>> {
        require_field(&fields, "modality")?;
        require_field(&fields, "content")?;

        let id = text_field(&fields, ID_COLUMN);
        if !id.is_empty() && self.store.find_row(Collection::Templates, &id).await.is_ok() {
            fields.remove(ID_COLUMN);
            self.store.update_row(Collection::Templates, &id, fields).await?;
            return created(id);
        }

        Self::strip_client_id(&mut fields, Collection::Templates);
        created(self.store.create_row(Collection::Templates, fields).await?)
    }

    async fn login(&self, request: LoginRequest) -> Result<Option<Value>> {
        let user = self
            .store
            .find_row(Collection::Users, &request.user_id)
            .await
            .map_err(|_| RadflowError::Authentication("Unknown user".to_string()))?;
        let stored = text_field(&user, "pin");

        if !verify_pin(&request.user_id, &request.pin, &stored) {
            tracing::warn!("Rejected PIN for user {}", request.user_id);
            return Err(RadflowError::Authentication("Invalid PIN".to_string()));
        }

        // 旧数据中的明文PIN在首次成功登录时转为摘要
        if !is_hashed(&stored) {
            let mut fields = Record::new();
            fields.insert("pin".to_string(), json!(hash_pin(&request.user_id, &request.pin)));
            self.store
                .update_row(Collection::Users, &request.user_id, fields)
                .await?;
            tracing::info!("Upgraded plaintext PIN for user {}", request.user_id);
        }

        Ok(Some(Value::Object(redact_user(user))))
    }

    async fn delete_user(&self, target: RecordRef) -> Result<Option<Value>> {
        let user = self.store.find_row(Collection::Users, &target.id).await?;
        if text_field(&user, "role") == Role::Admin.as_str() {
            let data = self.store.get_all_data().await?;
            let admins = data
                .get("users")
                .map(|users| {
                    users
                        .iter()
                        .filter(|u| text_field(u, "role") == Role::Admin.as_str())
                        .count()
                })
                .unwrap_or(0);
            if admins <= 1 {
                return Err(RadflowError::Validation(
                    "Cannot delete the last administrator".to_string(),
                ));
            }
        }
        self.store.delete_row(Collection::Users, &target.id).await?;
        Ok(None)
    }
}

/// 进程内后端：客户端可直接调用分发器
#[async_trait]
impl Backend for Dispatcher {
    async fn call(&self, action: Action, payload: Value) -> Result<Value> {
        self.dispatch(action.as_str(), payload).await.into_result()
    }

    fn describe(&self) -> String {
        "in-process dispatcher".to_string()
    }
}
