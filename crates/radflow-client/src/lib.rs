//! # RadFlow Client
//!
//! 前端状态层：
//! - API客户端：HTTP后端，未配置地址时回退到内存模拟数据
//! - 应用状态：全量数据快照、当前会话与页面
//! - 同步队列：乐观更新后在后台按顺序写回后端，并记录每个实体的同步状态
//! - 认证、路由守卫与各角色的页面控制器（输出视图模型而非HTML）

pub mod app;
pub mod auth;
pub mod backend;
pub mod mock_data;
pub mod router;
pub mod session;
pub mod state;
pub mod storage;
pub mod sync;
pub mod ui;
pub mod views;

pub use app::{App, RestoredSession};
pub use backend::{ApiClient, HttpBackend, MockBackend};
pub use router::{Navigation, Router};
pub use session::Session;
pub use state::{AppState, SyncStatus};
pub use storage::LocalStorage;
pub use sync::{SyncJob, SyncQueue};
pub use ui::{Prompter, ScriptedPrompter};
