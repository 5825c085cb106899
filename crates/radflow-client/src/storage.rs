//! 本地持久存储
//!
//! 简单的键值存储，保存为一个JSON文件；没有可写磁盘时使用内存版本。

use radflow_core::Result;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Mutex;

/// 当前会话
pub const SESSION_KEY: &str = "radflow.session";
/// 后端地址覆盖
pub const API_URL_KEY: &str = "radflow.api_url";

#[derive(Debug)]
pub struct LocalStorage {
    path: Option<PathBuf>,
    entries: Mutex<BTreeMap<String, String>>,
}

impl LocalStorage {
    /// 打开文件存储，文件不存在时从空开始
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let entries = if path.exists() {
            let bytes = std::fs::read(&path)?;
            if bytes.is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_slice(&bytes)?
            }
        } else {
            BTreeMap::new()
        };

        tracing::debug!("Opened local storage at {} ({} keys)", path.display(), entries.len());
        Ok(Self {
            path: Some(path),
            entries: Mutex::new(entries),
        })
    }

    pub fn in_memory() -> Self {
        Self {
            path: None,
            entries: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.lock().get(key).cloned()
    }

    pub fn set(&self, key: &str, value: impl Into<String>) -> Result<()> {
        let mut entries = self.lock();
        entries.insert(key.to_string(), value.into());
        self.persist(&entries)
    }

    pub fn remove(&self, key: &str) -> Result<()> {
        let mut entries = self.lock();
        if entries.remove(key).is_some() {
            self.persist(&entries)?;
        }
        Ok(())
    }

    pub fn clear(&self) -> Result<()> {
        let mut entries = self.lock();
        entries.clear();
        self.persist(&entries)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, String>> {
        // 写入失败不会留下半更新的表，中毒后继续使用
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn persist(&self, entries: &BTreeMap<String, String>) -> Result<()> {
        if let Some(path) = &self.path {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            std::fs::write(path, serde_json::to_vec_pretty(entries)?)?;
        }
        Ok(())
    }
}
