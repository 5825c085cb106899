//! 行存储
//!
//! 集合名 → 表格 的通用增删改查。每次修改成功后整体保存工作簿。

use radflow_core::utils::{generate_record_id, now_timestamp};
use radflow_core::{RadflowError, Result};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::persistence::WorkbookBackend;
use crate::schema::{AdminSeed, Collection, MigrationReport, Workbook};
use crate::sheet::{cell_text, Record, Sheet, ID_COLUMN};

/// 行存储
pub struct RowStore {
    workbook: RwLock<Workbook>,
    backend: Arc<dyn WorkbookBackend>,
}

impl std::fmt::Debug for RowStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RowStore").finish_non_exhaustive()
    }
}

impl RowStore {
    /// 打开存储：读取工作簿（不存在则新建）并执行迁移
    pub async fn open(backend: Arc<dyn WorkbookBackend>, seed: &AdminSeed) -> Result<(Self, MigrationReport)> {
        let mut workbook = backend.load().await?.unwrap_or_default();
        let report = workbook.migrate(seed)?;
        if !report.is_noop() {
            backend.save(&workbook).await?;
        }

        tracing::info!(
            "Row store opened: {} new sheets, {} new columns",
            report.created_sheets.len(),
            report.added_columns.len()
        );

        Ok((
            Self {
                workbook: RwLock::new(workbook),
                backend,
            },
            report,
        ))
    }

    async fn persist(&self, workbook: &Workbook) -> Result<()> {
        if let Err(e) = self.backend.save(workbook).await {
            tracing::error!("Failed to persist workbook: {}", e);
            return Err(e);
        }
        Ok(())
    }

    /// 把修改后的表换入工作簿并保存；保存失败时换回原表
    async fn commit(&self, workbook: &mut Workbook, collection: Collection, staged: Sheet) -> Result<()> {
        let previous = workbook.replace_sheet(collection, staged)?;
        if let Err(e) = self.persist(workbook).await {
            workbook.replace_sheet(collection, previous)?;
            return Err(e);
        }
        Ok(())
    }

    /// 读取全部集合的全部行
    pub async fn get_all_data(&self) -> Result<BTreeMap<&'static str, Vec<Record>>> {
        let workbook = self.workbook.read().await;
        let mut data = BTreeMap::new();
        for collection in Collection::all() {
            data.insert(collection.sheet_name(), workbook.sheet(collection)?.records());
        }
        Ok(data)
    }

    pub async fn find_row(&self, collection: Collection, id: &str) -> Result<Record> {
        let workbook = self.workbook.read().await;
        workbook
            .sheet(collection)?
            .get(id)
            .ok_or_else(|| RadflowError::NotFound(format!("Record {} not found in {}", id, collection)))
    }

    /// 新建一行：缺少ID时分配 `前缀+随机`，缺少创建时间时写入当前时间
    pub async fn create_row(&self, collection: Collection, mut fields: Record) -> Result<String> {
        let mut workbook = self.workbook.write().await;
        let mut sheet = workbook.sheet(collection)?.clone();

        let has_id = fields
            .get(ID_COLUMN)
            .map(|v| !cell_text(v).trim().is_empty())
            .unwrap_or(false);
        if !has_id {
            let mut id = generate_record_id(collection.id_prefix());
            while sheet.contains(&id) {
                id = generate_record_id(collection.id_prefix());
            }
            fields.insert(ID_COLUMN.to_string(), Value::String(id));
        }

        let has_created = fields
            .get("created_at")
            .map(|v| !cell_text(v).trim().is_empty())
            .unwrap_or(false);
        if !has_created {
            fields.insert("created_at".to_string(), Value::String(now_timestamp()));
        }

        let id = sheet.append(&fields)?;
        self.commit(&mut workbook, collection, sheet).await?;

        tracing::info!("Created {} row {}", collection, id);
        Ok(id)
    }

    /// 只覆盖给定列
    pub async fn update_row(&self, collection: Collection, id: &str, fields: Record) -> Result<()> {
        self.update_with(collection, id, |_| Ok(fields)).await
    }

    /// 在同一写锁内读取当前行并计算要写入的列
    pub async fn update_with<F>(&self, collection: Collection, id: &str, compute: F) -> Result<()>
    where
        F: FnOnce(&Record) -> Result<Record>,
    {
        let mut workbook = self.workbook.write().await;
        let mut sheet = workbook.sheet(collection)?.clone();
        let current = sheet
            .get(id)
            .ok_or_else(|| RadflowError::NotFound(format!("Record {} not found in {}", id, collection)))?;

        let fields = compute(&current)?;
        let written = sheet.update(id, &fields)?;
        self.commit(&mut workbook, collection, sheet).await?;

        tracing::info!("Updated {} row {} columns {:?}", collection, id, written);
        Ok(())
    }

    pub async fn delete_row(&self, collection: Collection, id: &str) -> Result<Record> {
        let mut workbook = self.workbook.write().await;
        let mut sheet = workbook.sheet(collection)?.clone();
        let removed = sheet.remove(id)?;
        self.commit(&mut workbook, collection, sheet).await?;

        tracing::info!("Deleted {} row {}", collection, id);
        Ok(removed)
    }
}
