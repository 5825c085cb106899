//! RadFlow服务器主程序

mod config;

use clap::Parser;
use radflow_store::{AdvisoryLock, Dispatcher, ObjectStoreBackend, RowStore};
use radflow_web::{ExecMetrics, WebServer, WebState};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::config::RadflowConfig;

/// RadFlow服务器命令行参数
#[derive(Parser, Debug)]
#[command(name = "radflow-server")]
#[command(about = "RadFlow 放射科工作流后端")]
struct Args {
    /// 配置文件路径
    #[arg(short, long)]
    config: Option<String>,

    /// 监听地址
    #[arg(long)]
    host: Option<String>,

    /// 监听端口
    #[arg(short, long)]
    port: Option<u16>,

    /// 工作簿存储目录
    #[arg(short, long)]
    data_dir: Option<String>,

    /// 日志级别
    #[arg(short, long)]
    log_level: Option<String>,
}

impl Args {
    fn apply(self, config: &mut RadflowConfig) {
        if let Some(host) = self.host {
            config.server.host = host;
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(data_dir) = self.data_dir {
            config.store.data_dir = data_dir;
        }
        if let Some(level) = self.log_level {
            config.logging.level = level;
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = RadflowConfig::load(args.config.as_deref())?;
    args.apply(&mut config);
    config.validate()?;

    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&config.logging.level)?)
        .init();

    info!("Starting RadFlow server...");
    info!("  Listen address: {}:{}", config.server.host, config.server.port);
    info!("  Data directory: {}", config.store.data_dir);
    info!("  Lock timeout: {:?}", config.lock_timeout());

    let backend = Arc::new(ObjectStoreBackend::local(&config.store.data_dir)?);
    let (store, migration) = RowStore::open(backend, &config.store.admin).await?;
    if let Some(admin_id) = &migration.seeded_admin {
        info!("Seeded administrator {} ({})", admin_id, config.store.admin.email);
    }

    let state = WebState {
        dispatcher: Arc::new(Dispatcher::new(
            Arc::new(store),
            AdvisoryLock::new(config.lock_timeout()),
        )),
        metrics: Arc::new(ExecMetrics::new()?),
    };

    let server = WebServer::new(config.listen_addr()?, state);
    if let Err(e) = server.run(shutdown_signal()).await {
        error!("Server failed: {}", e);
        return Err(e.into());
    }

    Ok(())
}
