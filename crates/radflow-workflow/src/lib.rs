//! # RadFlow工作流模块
//!
//! 提供放射科检查流程的业务规则，包括：
//! - 检查状态机：Waiting → Scanning → Reporting → Reported / Completed
//! - 访问策略：角色可访问的页面与可执行的动作（统一在一张策略表中）
//! - 工作列表：按日期、状态和医生筛选检查
//! - 报告模板库与报告草稿编辑

pub mod policy;
pub mod report;
pub mod state_machine;
pub mod templates;
pub mod worklist;

// 重新导出主要类型
pub use policy::{AccessPolicy, Page, PermissionAction};
pub use report::{ClinicalContext, ReportDraft, DEFAULT_REPORT_HTML};
pub use state_machine::{StudyEvent, StudyStateMachine};
pub use templates::{PlaceholderPrompt, TemplateLibrary};
pub use worklist::{WorkItem, WorkListFilter, WorkListManager, WorkListStats};
