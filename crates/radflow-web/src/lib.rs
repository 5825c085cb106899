//! # RadFlow Web
//!
//! 后端HTTP入口：单一 `/exec?action=` 端点，外加健康检查与Prometheus指标。

pub mod handlers;
pub mod metrics;
pub mod server;

pub use handlers::WebState;
pub use metrics::ExecMetrics;
pub use server::WebServer;
