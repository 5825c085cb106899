//! API客户端
//!
//! 配置了后端地址时通过HTTP调用 `/exec?action=`，否则回退到内存中的模拟数据集。

use async_trait::async_trait;
use radflow_core::protocol::{
    CompletionRequest, CreatedRecord, ImageLinksUpdate, LoginRequest, RecordRef, ReportSubmission,
    StudyStatusUpdate,
};
use radflow_core::utils::{
    generate_record_id, now_timestamp, PATIENT_ID_PREFIX, STUDY_ID_PREFIX, TEMPLATE_ID_PREFIX,
    USER_ID_PREFIX, VISIT_ID_PREFIX,
};
use radflow_core::{
    Action, ApiResponse, Backend, Dataset, RadflowError, Result, Role, Study, StudyStatus, User,
};
use radflow_workflow::{StudyEvent, StudyStateMachine};
use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::mock_data;

/// HTTP请求超时
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP后端
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    url: String,
}

impl HttpBackend {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| RadflowError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl Backend for HttpBackend {
    async fn call(&self, action: Action, payload: Value) -> Result<Value> {
        tracing::debug!("POST {}?action={}", self.url, action);

        let response = self
            .client
            .post(&self.url)
            .query(&[("action", action.as_str())])
            .json(&payload)
            .send()
            .await
            .map_err(|e| RadflowError::Network(format!("{} request failed: {}", action, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RadflowError::Network(format!(
                "{} request failed with HTTP {}",
                action, status
            )));
        }

        let envelope: ApiResponse = response
            .json()
            .await
            .map_err(|e| RadflowError::Network(format!("Malformed {} response: {}", action, e)))?;
        envelope.into_result()
    }

    fn describe(&self) -> String {
        format!("http backend at {}", self.url)
    }
}

struct MockData {
    dataset: Dataset,
    pins: HashMap<String, String>,
}

/// 内存模拟后端，行为与真实分发器一致（ID由后端分配、状态机校验）
pub struct MockBackend {
    data: Mutex<MockData>,
    state_machine: StudyStateMachine,
}

impl fmt::Debug for MockBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockBackend").finish_non_exhaustive()
    }
}

fn parse<T: DeserializeOwned>(payload: Value) -> Result<T> {
    serde_json::from_value(payload)
        .map_err(|e| RadflowError::Validation(format!("Invalid payload: {}", e)))
}

fn object(payload: Value) -> Result<Map<String, Value>> {
    match payload {
        Value::Object(map) => Ok(map),
        other => Err(RadflowError::Validation(format!(
            "Payload must be a JSON object, got {}",
            other
        ))),
    }
}

/// 分配ID并补齐创建时间后解码为实体
fn new_entity<T: DeserializeOwned>(mut fields: Map<String, Value>, prefix: &str) -> Result<(String, T)> {
    let id = generate_record_id(prefix);
    fields.insert("id".to_string(), json!(id));
    let stamped = fields
        .get("created_at")
        .and_then(Value::as_str)
        .map_or(false, |s| !s.is_empty());
    if !stamped {
        fields.insert("created_at".to_string(), json!(now_timestamp()));
    }
    Ok((id, parse(Value::Object(fields))?))
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn created(id: String) -> Result<Value> {
    Ok(serde_json::to_value(CreatedRecord { id })?)
}

impl MockBackend {
    pub fn new(dataset: Dataset, pins: HashMap<String, String>) -> Self {
        Self {
            data: Mutex::new(MockData { dataset, pins }),
            state_machine: StudyStateMachine::new(),
        }
    }

    /// 演示数据
    pub fn with_sample_data() -> Self {
        let (dataset, pins) = mock_data::sample_dataset();
        Self::new(dataset, pins)
    }

    fn study<'a>(dataset: &'a mut Dataset, id: &str) -> Result<&'a mut Study> {
        dataset
            .studies
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| RadflowError::NotFound(format!("Record {} not found in studies", id)))
    }

    fn advance(&self, study: &mut Study, event: StudyEvent) -> Result<()> {
        study.status = self.state_machine.transition(study.status, event)?;
        if event == StudyEvent::MarkComplete {
            study.completed_at = Some(now_timestamp());
        }
        Ok(())
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::with_sample_data()
    }
}

#[async_trait]
impl Backend for MockBackend {
    async fn call(&self, action: Action, payload: Value) -> Result<Value> {
        let mut data = self.data.lock().await;
        let MockData { dataset, pins } = &mut *data;

        match action {
            Action::GetAllData => Ok(serde_json::to_value(&*dataset)?),
            Action::CreatePatient => {
                let fields = object(payload)?;
                let age = fields.get("age").map(cell_text).unwrap_or_default();
                if !age.trim().is_empty() && age.trim().parse::<u32>().is_err() {
                    return Err(RadflowError::Validation(format!(
                        "Age must be a whole number, got {}",
                        age.trim()
                    )));
                }
                let (id, patient) = new_entity(fields, PATIENT_ID_PREFIX)?;
                dataset.patients.push(patient);
                created(id)
            }
            Action::CreateVisit => {
                let (id, visit) = new_entity(object(payload)?, VISIT_ID_PREFIX)?;
                dataset.visits.push(visit);
                created(id)
            }
            Action::CreateStudy => {
                let mut fields = object(payload)?;
                let status = fields.get("status").map(cell_text).unwrap_or_default();
                if status.trim().is_empty() {
                    fields.insert("status".to_string(), json!(StudyStatus::Waiting.as_str()));
                } else if status.parse::<StudyStatus>()? != StudyStatus::Waiting {
                    return Err(RadflowError::Validation(format!(
                        "New studies must start as Waiting, got {}",
                        status
                    )));
                }
                let (id, study) = new_entity(fields, STUDY_ID_PREFIX)?;
                dataset.studies.push(study);
                created(id)
            }
            Action::CreateUser => {
                let mut fields = object(payload)?;
                let pin = fields
                    .remove("pin")
                    .and_then(|v| v.as_str().map(str::to_string))
                    .filter(|p| p.len() == 4 && p.chars().all(|c| c.is_ascii_digit()))
                    .ok_or_else(|| RadflowError::Validation("PIN must be exactly 4 digits".to_string()))?;
                let (id, user): (String, User) = new_entity(fields, USER_ID_PREFIX)?;
                dataset.users.push(user);
                pins.insert(id.clone(), pin);
                created(id)
            }
            Action::UpdateStudyStatus => {
                let request: StudyStatusUpdate = parse(payload)?;
                let study = Self::study(dataset, &request.id)?;
                let event = self.state_machine.validate_target(study.status, request.status)?;
                self.advance(study, event)?;
                Ok(Value::Null)
            }
            Action::SaveReport => {
                let request: ReportSubmission = parse(payload)?;
                let study = Self::study(dataset, &request.study_id)?;
                self.advance(study, StudyEvent::SignReport)?;
                study.report_content = Some(request.content_html);
                Ok(Value::Null)
            }
            Action::MarkComplete => {
                let request: CompletionRequest = parse(payload)?;
                let study = Self::study(dataset, &request.study_id)?;
                self.advance(study, StudyEvent::MarkComplete)?;
                if let Some(content) = request.content_html {
                    study.report_content = Some(content);
                }
                Ok(Value::Null)
            }
            Action::UpdateImageLinks => {
                let request: ImageLinksUpdate = parse(payload)?;
                let links = request
                    .image_links
                    .iter()
                    .map(|link| link.trim().to_string())
                    .filter(|link| !link.is_empty())
                    .collect();
                Self::study(dataset, &request.study_id)?.image_links = links;
                Ok(Value::Null)
            }
            Action::SaveTemplate => {
                let mut fields = object(payload)?;
                let existing = fields
                    .remove("id")
                    .and_then(|v| v.as_str().map(str::to_string))
                    .and_then(|id| dataset.templates.iter().position(|t| t.id == id));
                match existing {
                    Some(index) => {
                        let mut merged = serde_json::to_value(&dataset.templates[index])?;
                        if let Value::Object(map) = &mut merged {
                            map.extend(fields);
                        }
                        dataset.templates[index] = parse(merged)?;
                        created(dataset.templates[index].id.clone())
                    }
                    None => {
                        let (id, template) = new_entity(fields, TEMPLATE_ID_PREFIX)?;
                        dataset.templates.push(template);
                        created(id)
                    }
                }
            }
            Action::DeleteTemplate => {
                let target: RecordRef = parse(payload)?;
                let before = dataset.templates.len();
                dataset.templates.retain(|t| t.id != target.id);
                if dataset.templates.len() == before {
                    return Err(RadflowError::NotFound(format!(
                        "Record {} not found in templates",
                        target.id
                    )));
                }
                Ok(Value::Null)
            }
            Action::Login => {
                let request: LoginRequest = parse(payload)?;
                let user = dataset
                    .users
                    .iter()
                    .find(|u| u.id == request.user_id)
                    .ok_or_else(|| RadflowError::Authentication("Unknown user".to_string()))?;
                if pins.get(&user.id) != Some(&request.pin) {
                    return Err(RadflowError::Authentication("Invalid PIN".to_string()));
                }
                Ok(serde_json::to_value(user)?)
            }
            Action::DeleteUser => {
                let target: RecordRef = parse(payload)?;
                let user = dataset
                    .users
                    .iter()
                    .find(|u| u.id == target.id)
                    .ok_or_else(|| {
                        RadflowError::NotFound(format!("Record {} not found in users", target.id))
                    })?;
                let admins = dataset.users.iter().filter(|u| u.role == Role::Admin).count();
                if user.role == Role::Admin && admins <= 1 {
                    return Err(RadflowError::Validation(
                        "Cannot delete the last administrator".to_string(),
                    ));
                }
                dataset.users.retain(|u| u.id != target.id);
                pins.remove(&target.id);
                Ok(Value::Null)
            }
        }
    }

    fn describe(&self) -> String {
        "in-memory mock dataset".to_string()
    }
}

/// 带类型的API客户端
#[derive(Clone)]
pub struct ApiClient {
    backend: Arc<dyn Backend>,
}

impl fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiClient")
            .field("backend", &self.backend.describe())
            .finish()
    }
}

impl ApiClient {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }

    /// 有后端地址时使用HTTP，否则使用模拟数据
    pub fn from_url(url: Option<&str>) -> Result<Self> {
        let backend: Arc<dyn Backend> = match url.map(str::trim).filter(|u| !u.is_empty()) {
            Some(url) => Arc::new(HttpBackend::new(url)?),
            None => {
                tracing::info!("No backend URL configured, using mock data");
                Arc::new(MockBackend::with_sample_data())
            }
        };
        Ok(Self::new(backend))
    }

    pub fn backend(&self) -> Arc<dyn Backend> {
        Arc::clone(&self.backend)
    }

    pub fn describe(&self) -> String {
        self.backend.describe()
    }

    pub async fn call(&self, action: Action, payload: Value) -> Result<Value> {
        self.backend.call(action, payload).await
    }

    pub async fn get_all_data(&self) -> Result<Dataset> {
        let data = self.call(Action::GetAllData, json!({})).await?;
        Ok(serde_json::from_value(data)?)
    }

    /// 员工登录，由后端校验PIN
    pub async fn login(&self, user_id: &str, pin: &str) -> Result<User> {
        let request = LoginRequest {
            user_id: user_id.to_string(),
            pin: pin.to_string(),
        };
        let data = self
            .call(Action::Login, serde_json::to_value(request)?)
            .await
            .map_err(|e| match e {
                RadflowError::Backend(msg) => RadflowError::Authentication(msg),
                other => other,
            })?;
        Ok(serde_json::from_value(data)?)
    }
}
