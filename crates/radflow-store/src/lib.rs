//! # RadFlow存储模块
//!
//! 以“表格”形式保存记录：每个集合一张表，首行表头定义列，首列为ID。
//! 提供通用的行增删改查、启动时的增量表结构迁移、工作簿持久化，
//! 以及把动作名路由到具体存储操作的请求分发器。

pub mod credentials;
pub mod dispatcher;
pub mod lock;
pub mod persistence;
pub mod schema;
pub mod sheet;
pub mod store;

pub use dispatcher::Dispatcher;
pub use lock::AdvisoryLock;
pub use persistence::{ObjectStoreBackend, WorkbookBackend};
pub use schema::{AdminSeed, Collection, MigrationReport, Workbook};
pub use sheet::{Record, Sheet};
pub use store::RowStore;
