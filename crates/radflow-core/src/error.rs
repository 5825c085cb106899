//! 错误定义模块

use thiserror::Error;

/// RadFlow系统统一错误类型
#[derive(Error, Debug)]
pub enum RadflowError {
    #[error("配置错误: {0}")]
    Config(String),

    #[error("存储错误: {0}")]
    Storage(String),

    #[error("网络错误: {0}")]
    Network(String),

    #[error("序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("验证错误: {0}")]
    Validation(String),

    #[error("权限错误: {0}")]
    Permission(String),

    #[error("认证失败: {0}")]
    Authentication(String),

    #[error("资源未找到: {0}")]
    NotFound(String),

    #[error("后端错误: {0}")]
    Backend(String),

    #[error("无效状态转换: 从 {from} 到 {event}")]
    InvalidStateTransition { from: String, event: String },

    #[error("系统内部错误: {0}")]
    Internal(String),
}

impl RadflowError {
    /// 面向用户的提示文本（不带分类前缀）
    pub fn user_message(&self) -> String {
        match self {
            RadflowError::Config(msg)
            | RadflowError::Storage(msg)
            | RadflowError::Network(msg)
            | RadflowError::Validation(msg)
            | RadflowError::Permission(msg)
            | RadflowError::Authentication(msg)
            | RadflowError::NotFound(msg)
            | RadflowError::Backend(msg)
            | RadflowError::Internal(msg) => msg.clone(),
            other => other.to_string(),
        }
    }
}

/// RadFlow系统统一结果类型
pub type Result<T> = std::result::Result<T, RadflowError>;
