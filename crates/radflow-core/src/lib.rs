//! # RadFlow Core
//!
//! 放射科工作流系统的核心模块，提供实体模型、错误定义、前后端通信协议和通用工具。

pub mod error;
pub mod models;
pub mod protocol;
pub mod utils;

pub use error::{RadflowError, Result};
pub use models::*;
pub use protocol::{Action, ApiResponse, Backend};
