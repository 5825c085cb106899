//! 前后端通信协议
//!
//! 请求体为JSON文档，动作名通过查询参数 `action` 选择；
//! 响应统一包装为 `{status, data}` 或 `{status: "error", message}`。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::error::{RadflowError, Result};
use crate::models::StudyStatus;

/// 后端动作
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    GetAllData,
    CreatePatient,
    CreateVisit,
    CreateStudy,
    CreateUser,
    UpdateStudyStatus,
    SaveReport,
    MarkComplete,
    UpdateImageLinks,
    SaveTemplate,
    DeleteTemplate,
    Login,
    DeleteUser,
}

impl Action {
    pub fn all() -> &'static [Action] {
        &[
            Action::GetAllData,
            Action::CreatePatient,
            Action::CreateVisit,
            Action::CreateStudy,
            Action::CreateUser,
            Action::UpdateStudyStatus,
            Action::SaveReport,
            Action::MarkComplete,
            Action::UpdateImageLinks,
            Action::SaveTemplate,
            Action::DeleteTemplate,
            Action::Login,
            Action::DeleteUser,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::GetAllData => "getAllData",
            Action::CreatePatient => "createPatient",
            Action::CreateVisit => "createVisit",
            Action::CreateStudy => "createStudy",
            Action::CreateUser => "createUser",
            Action::UpdateStudyStatus => "updateStudyStatus",
            Action::SaveReport => "saveReport",
            Action::MarkComplete => "markComplete",
            Action::UpdateImageLinks => "updateImageLinks",
            Action::SaveTemplate => "saveTemplate",
            Action::DeleteTemplate => "deleteTemplate",
            Action::Login => "login",
            Action::DeleteUser => "deleteUser",
        }
    }

    /// 是否会修改后端数据
    pub fn is_mutation(&self) -> bool {
        !matches!(self, Action::GetAllData | Action::Login)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = RadflowError;

    fn from_str(s: &str) -> Result<Self> {
        Action::all()
            .iter()
            .copied()
            .find(|action| action.as_str() == s)
            .ok_or_else(|| RadflowError::Validation(format!("Unknown action: {}", s)))
    }
}

/// 响应状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Success,
    Error,
}

/// 统一响应包
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApiResponse {
    pub status: ResponseStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ApiResponse {
    pub fn success(data: Option<Value>) -> Self {
        Self {
            status: ResponseStatus::Success,
            data,
            message: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: ResponseStatus::Error,
            data: None,
            message: Some(message.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ResponseStatus::Success
    }

    /// 拆包：错误响应转换为 [`RadflowError::Backend`]
    pub fn into_result(self) -> Result<Value> {
        match self.status {
            ResponseStatus::Success => Ok(self.data.unwrap_or(Value::Null)),
            ResponseStatus::Error => Err(RadflowError::Backend(
                self.message
                    .unwrap_or_else(|| "Unknown backend error".to_string()),
            )),
        }
    }
}

/// 创建类动作的返回
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CreatedRecord {
    pub id: String,
}

/// updateStudyStatus 请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudyStatusUpdate {
    pub id: String,
    pub status: StudyStatus,
}

/// saveReport 请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportSubmission {
    pub study_id: String,
    pub content_html: String,
}

/// markComplete 请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub study_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_html: Option<String>,
}

/// updateImageLinks 请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageLinksUpdate {
    pub study_id: String,
    pub image_links: Vec<String>,
}

/// 按ID引用记录（deleteTemplate / deleteUser）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordRef {
    pub id: String,
}

/// login 请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub user_id: String,
    pub pin: String,
}

/// 后端调用接口
///
/// HTTP客户端、模拟数据集和进程内分发器都实现此接口。
#[async_trait]
pub trait Backend: Send + Sync {
    /// 执行一个动作，返回拆包后的 `data`
    async fn call(&self, action: Action, payload: Value) -> Result<Value>;

    /// 后端描述（用于日志）
    fn describe(&self) -> String;
}

/// 把实体序列化为创建请求体：ID由后端分配，因此去掉 `id` 字段
pub fn creation_payload<T: Serialize>(entity: &T) -> Result<Value> {
    let mut value = serde_json::to_value(entity)?;
    if let Value::Object(map) = &mut value {
        map.remove("id");
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_action_names() {
        for action in Action::all() {
            assert_eq!(action.as_str().parse::<Action>().unwrap(), *action);
        }
        assert!("dropEverything".parse::<Action>().is_err());
        assert!(!Action::GetAllData.is_mutation());
        assert!(Action::SaveReport.is_mutation());
    }

    #[test]
    fn test_error_envelope() {
        let response = ApiResponse::error("Record not found");
        let encoded = serde_json::to_value(&response).unwrap();
        assert_eq!(encoded, json!({"status": "error", "message": "Record not found"}));

        let err = response.into_result().unwrap_err();
        assert!(matches!(err, RadflowError::Backend(msg) if msg == "Record not found"));
    }

    #[test]
    fn test_creation_payload_strips_id() {
        let payload = creation_payload(&json!({"id": "local-PT-1", "full_name": "A"})).unwrap();
        assert_eq!(payload, json!({"full_name": "A"}));
    }
}
