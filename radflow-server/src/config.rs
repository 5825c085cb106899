//! 服务器配置
//!
//! 默认值 ← 可选的TOML文件 ← `RADFLOW__*` 环境变量（如 `RADFLOW__SERVER__PORT=9000`）。

use anyhow::{bail, Context, Result};
use config::{Config, Environment, File};
use radflow_store::AdminSeed;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;
use tracing::info;

/// RadFlow服务器完整配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RadflowConfig {
    /// 监听配置
    pub server: ServerConfig,
    /// 存储配置
    pub store: StoreConfig,
    /// 日志配置
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// 工作簿所在目录
    pub data_dir: String,
    /// 请求锁等待时间（秒）
    pub lock_timeout_secs: u64,
    /// 首次建立用户表时写入的管理员
    pub admin: AdminSeed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// EnvFilter 指令，如 `info` 或 `radflow_store=debug,info`
    pub level: String,
}

impl RadflowConfig {
    /// 加载配置；`path` 指向的文件可以不存在
    pub fn load(path: Option<&str>) -> Result<Self> {
        let seed = AdminSeed::default();
        let mut builder = Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?
            .set_default("store.data_dir", "./data")?
            .set_default("store.lock_timeout_secs", 10)?
            .set_default("store.admin.email", seed.email)?
            .set_default("store.admin.full_name", seed.full_name)?
            .set_default("store.admin.pin", seed.pin)?
            .set_default("logging.level", "info")?;

        if let Some(path) = path {
            builder = builder.add_source(File::with_name(path).required(false));
        }

        let settings = builder
            .add_source(Environment::with_prefix("RADFLOW").separator("__"))
            .build()
            .context("Failed to build configuration")?;

        let config: RadflowConfig = settings
            .try_deserialize()
            .context("Failed to deserialize configuration")?;
        config.validate()?;

        info!("Configuration loaded{}", path.map(|p| format!(" from {}", p)).unwrap_or_default());
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            bail!("server.port must be greater than 0");
        }
        if self.store.data_dir.trim().is_empty() {
            bail!("store.data_dir must not be empty");
        }
        if self.store.lock_timeout_secs == 0 {
            bail!("store.lock_timeout_secs must be greater than 0");
        }
        let pin = &self.store.admin.pin;
        if pin.len() != 4 || !pin.chars().all(|c| c.is_ascii_digit()) {
            bail!("store.admin.pin must be exactly 4 digits");
        }
        Ok(())
    }

    pub fn listen_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.server.host, self.server.port)
            .parse()
            .with_context(|| format!("Invalid listen address {}:{}", self.server.host, self.server.port))
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_secs(self.store.lock_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RadflowConfig::load(None).unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.lock_timeout(), Duration::from_secs(10));
        assert_eq!(config.store.admin.email, "admin@radflow.local");
        assert_eq!(config.listen_addr().unwrap().port(), 8080);
    }

    #[test]
    fn test_file_overrides_defaults() {
        let path = std::env::temp_dir().join(format!("radflow-config-{}.toml", std::process::id()));
        std::fs::write(
            &path,
            "[server]\nport = 9090\n\n[store]\ndata_dir = \"/var/lib/radflow\"\n",
        )
        .unwrap();

        let config = RadflowConfig::load(path.to_str()).unwrap();
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.store.data_dir, "/var/lib/radflow");
        assert_eq!(config.logging.level, "info");
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_validation() {
        let mut config = RadflowConfig::load(None).unwrap();
        config.store.admin.pin = "12345".to_string();
        assert!(config.validate().is_err());
    }
}
