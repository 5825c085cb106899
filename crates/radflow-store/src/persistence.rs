//! 工作簿持久化
//!
//! 工作簿整体序列化为JSON，通过 object_store 写入本地目录或内存。

use async_trait::async_trait;
use bytes::Bytes;
use object_store::{local::LocalFileSystem, memory::InMemory, path::Path, ObjectStore};
use radflow_core::{RadflowError, Result};
use std::sync::Arc;

use crate::schema::Workbook;

/// 工作簿文件名
pub const WORKBOOK_OBJECT: &str = "workbook.json";

/// 工作簿持久化接口
#[async_trait]
pub trait WorkbookBackend: Send + Sync {
    /// 读取工作簿，不存在时返回 `None`
    async fn load(&self) -> Result<Option<Workbook>>;

    /// 保存工作簿
    async fn save(&self, workbook: &Workbook) -> Result<()>;
}

/// 基于 object_store 的持久化
#[derive(Debug, Clone)]
pub struct ObjectStoreBackend {
    store: Arc<dyn ObjectStore>,
    location: Path,
}

impl ObjectStoreBackend {
    pub fn new(store: Arc<dyn ObjectStore>, object_name: &str) -> Self {
        Self {
            store,
            location: Path::from(object_name),
        }
    }

    /// 本地目录
    pub fn local(data_dir: &str) -> Result<Self> {
        std::fs::create_dir_all(data_dir)?;
        let store = LocalFileSystem::new_with_prefix(data_dir)
            .map_err(|e| RadflowError::Storage(format!("Cannot open data dir {}: {}", data_dir, e)))?;
        Ok(Self::new(Arc::new(store), WORKBOOK_OBJECT))
    }

    /// 内存存储（测试或临时实例）
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemory::new()), WORKBOOK_OBJECT)
    }
}

#[async_trait]
impl WorkbookBackend for ObjectStoreBackend {
    async fn load(&self) -> Result<Option<Workbook>> {
        match self.store.get(&self.location).await {
            Ok(result) => {
                let bytes = result
                    .bytes()
                    .await
                    .map_err(|e| RadflowError::Storage(e.to_string()))?;
                Ok(Some(Workbook::from_json(&bytes)?))
            }
            Err(object_store::Error::NotFound { .. }) => Ok(None),
            Err(e) => Err(RadflowError::Storage(format!(
                "Failed to read {}: {}",
                self.location, e
            ))),
        }
    }

    async fn save(&self, workbook: &Workbook) -> Result<()> {
        let payload = Bytes::from(workbook.to_json()?);
        self.store
            .put(&self.location, payload)
            .await
            .map_err(|e| RadflowError::Storage(format!("Failed to write {}: {}", self.location, e)))?;
        tracing::debug!("Workbook saved to {}", self.location);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{AdminSeed, Collection};

    #[tokio::test]
    async fn test_missing_workbook_loads_as_none() {
        let backend = ObjectStoreBackend::in_memory();
        assert!(backend.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_and_reload_keeps_index() {
        let backend = ObjectStoreBackend::in_memory();
        let mut workbook = Workbook::default();
        let report = workbook.migrate(&AdminSeed::default()).unwrap();
        backend.save(&workbook).await.unwrap();

        let loaded = backend.load().await.unwrap().unwrap();
        let admin_id = report.seeded_admin.unwrap();
        assert!(loaded.sheet(Collection::Users).unwrap().contains(&admin_id));
    }
}
