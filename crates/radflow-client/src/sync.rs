//! 后台同步队列
//!
//! 乐观更新先改本地状态，再把写操作交给这里。单个后台任务按先进先出
//! 顺序执行，因此就诊总是先于其检查写入。创建成功后，占位ID在本地状态
//! 和后续排队的请求体中统一替换为后端分配的ID；父记录创建失败时，
//! 依赖它的任务直接标记为失败，不再发送。任务不重试。

use radflow_core::utils::is_placeholder_id;
use radflow_core::{Action, Backend, RadflowError, Result};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::state::{AppState, SyncStatus};

/// 一次后台写操作
#[derive(Debug, Clone)]
pub struct SyncJob {
    pub action: Action,
    pub payload: Value,
    /// 台账中记录状态的实体（创建时为占位ID）
    pub entity_id: String,
    /// 是否为创建操作（成功后返回新ID）
    pub creates: bool,
}

impl SyncJob {
    pub fn create(action: Action, placeholder_id: impl Into<String>, payload: Value) -> Self {
        Self {
            action,
            payload,
            entity_id: placeholder_id.into(),
            creates: true,
        }
    }

    pub fn update(action: Action, entity_id: impl Into<String>, payload: Value) -> Self {
        Self {
            action,
            payload,
            entity_id: entity_id.into(),
            creates: false,
        }
    }
}

enum Message {
    Job(SyncJob),
    Flush(oneshot::Sender<()>),
}

/// 同步队列句柄
#[derive(Debug)]
pub struct SyncQueue {
    sender: mpsc::UnboundedSender<Message>,
    state: Arc<RwLock<AppState>>,
    worker: JoinHandle<()>,
}

impl SyncQueue {
    /// 启动后台任务（需在tokio运行时内调用）
    pub fn start(backend: Arc<dyn Backend>, state: Arc<RwLock<AppState>>) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let worker = SyncWorker {
            backend,
            state: Arc::clone(&state),
            resolved: HashMap::new(),
            failed: HashSet::new(),
        };
        let worker = tokio::spawn(worker.run(receiver));

        Self {
            sender,
            state,
            worker,
        }
    }

    /// 把实体标记为待同步并排队
    pub async fn enqueue(&self, job: SyncJob) -> Result<()> {
        self.state
            .write()
            .await
            .set_sync_status(&job.entity_id, SyncStatus::Pending);

        debug!("Queued {} for {}", job.action, job.entity_id);
        self.sender
            .send(Message::Job(job))
            .map_err(|_| RadflowError::Internal("Sync worker has stopped".to_string()))
    }

    /// 等待此前排队的任务全部处理完
    pub async fn flush(&self) -> Result<()> {
        let (done, wait) = oneshot::channel();
        self.sender
            .send(Message::Flush(done))
            .map_err(|_| RadflowError::Internal("Sync worker has stopped".to_string()))?;
        wait.await
            .map_err(|_| RadflowError::Internal("Sync worker has stopped".to_string()))
    }
}

impl Drop for SyncQueue {
    fn drop(&mut self) {
        self.worker.abort();
    }
}

struct SyncWorker {
    backend: Arc<dyn Backend>,
    state: Arc<RwLock<AppState>>,
    /// 占位ID → 后端ID
    resolved: HashMap<String, String>,
    /// 创建失败的占位ID
    failed: HashSet<String>,
}

impl SyncWorker {
    async fn run(mut self, mut receiver: mpsc::UnboundedReceiver<Message>) {
        while let Some(message) = receiver.recv().await {
            match message {
                Message::Job(job) => self.process(job).await,
                Message::Flush(done) => {
                    let _ = done.send(());
                }
            }
        }
        debug!("Sync worker stopped");
    }

    /// 替换已解析的占位ID，返回仍无法解析的占位ID
    fn rewrite(&self, value: &mut Value, unresolved: &mut Vec<String>) {
        match value {
            Value::String(s) if is_placeholder_id(s.as_str()) => match self.resolved.get(s.as_str()) {
                Some(real) => *s = real.clone(),
                None => unresolved.push(s.clone()),
            },
            Value::Array(items) => {
                for item in items {
                    self.rewrite(item, unresolved);
                }
            }
            Value::Object(map) => {
                for item in map.values_mut() {
                    self.rewrite(item, unresolved);
                }
            }
            _ => {}
        }
    }

    async fn process(&mut self, mut job: SyncJob) {
        let entity_id = self
            .resolved
            .get(&job.entity_id)
            .cloned()
            .unwrap_or_else(|| job.entity_id.clone());

        let mut unresolved = Vec::new();
        self.rewrite(&mut job.payload, &mut unresolved);
        if !job.creates && is_placeholder_id(&entity_id) {
            unresolved.push(entity_id.clone());
        }

        if let Some(missing) = unresolved.first() {
            let reason = if self.failed.contains(missing) {
                format!("Depends on {} which failed to sync", missing)
            } else {
                format!("Depends on unsynced record {}", missing)
            };
            warn!("Skipping {} for {}: {}", job.action, entity_id, reason);
            self.finish(&job, &entity_id, Err(reason)).await;
            return;
        }

        match self.backend.call(job.action, job.payload.clone()).await {
            Ok(data) if job.creates => {
                match data.get("id").and_then(Value::as_str) {
                    Some(real_id) => {
                        info!("Synced {}: {} -> {}", job.action, entity_id, real_id);
                        self.resolved.insert(entity_id.clone(), real_id.to_string());
                        self.state.write().await.rename_id(&entity_id, real_id);
                        self.finish(&job, real_id, Ok(())).await;
                    }
                    None => {
                        let reason = format!("{} response carried no id", job.action);
                        warn!("{}", reason);
                        self.finish(&job, &entity_id, Err(reason)).await;
                    }
                }
            }
            Ok(_) => {
                debug!("Synced {} for {}", job.action, entity_id);
                self.finish(&job, &entity_id, Ok(())).await;
            }
            Err(e) => {
                warn!("Background sync of {} for {} failed: {}", job.action, entity_id, e);
                self.finish(&job, &entity_id, Err(e.user_message())).await;
            }
        }
    }

    async fn finish(&mut self, job: &SyncJob, id: &str, outcome: std::result::Result<(), String>) {
        let status = match outcome {
            Ok(()) => SyncStatus::Committed,
            Err(reason) => {
                if job.creates {
                    self.failed.insert(id.to_string());
                }
                SyncStatus::Failed(reason)
            }
        };
        self.state.write().await.set_sync_status(id, status);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    /// 记录请求；createVisit 按配置成功或失败
    struct RecordingBackend {
        calls: Mutex<Vec<(Action, Value)>>,
        fail_visits: bool,
    }

    #[async_trait]
    impl Backend for RecordingBackend {
        async fn call(&self, action: Action, payload: Value) -> Result<Value> {
            let count = {
                let mut calls = self.calls.lock().unwrap();
                calls.push((action, payload));
                calls.len()
            };
            match action {
                Action::CreateVisit if self.fail_visits => {
                    Err(RadflowError::Backend("Sheet is locked".to_string()))
                }
                Action::CreateVisit => Ok(json!({"id": "VS-SERVER01"})),
                Action::CreateStudy => Ok(json!({"id": format!("ST-SERVER{:02}", count)})),
                _ => Ok(Value::Null),
            }
        }

        fn describe(&self) -> String {
            "recording".to_string()
        }
    }

    fn setup(fail_visits: bool) -> (Arc<RecordingBackend>, Arc<RwLock<AppState>>, SyncQueue) {
        let backend = Arc::new(RecordingBackend {
            calls: Mutex::new(Vec::new()),
            fail_visits,
        });
        let state = Arc::new(RwLock::new(AppState::default()));
        let queue = SyncQueue::start(backend.clone(), Arc::clone(&state));
        (backend, state, queue)
    }

    #[tokio::test]
    async fn test_placeholders_resolve_in_order() {
        let (backend, state, queue) = setup(false);

        queue
            .enqueue(SyncJob::create(Action::CreateVisit, "local-VS-1", json!({"patient_id": "PT-1"})))
            .await
            .unwrap();
        queue
            .enqueue(SyncJob::create(Action::CreateStudy, "local-ST-1", json!({"visit_id": "local-VS-1"})))
            .await
            .unwrap();
        assert_eq!(
            state.read().await.sync_status("local-ST-1"),
            Some(&SyncStatus::Pending)
        );

        queue.flush().await.unwrap();

        let calls = backend.calls.lock().unwrap().clone();
        assert_eq!(calls[0].0, Action::CreateVisit);
        assert_eq!(calls[1].1, json!({"visit_id": "VS-SERVER01"}));

        let state = state.read().await;
        assert_eq!(state.sync_status("VS-SERVER01"), Some(&SyncStatus::Committed));
        assert_eq!(state.sync_status("ST-SERVER02"), Some(&SyncStatus::Committed));
        assert_eq!(state.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_failed_parent_fails_dependents_without_sending() {
        let (backend, state, queue) = setup(true);

        queue
            .enqueue(SyncJob::create(Action::CreateVisit, "local-VS-1", json!({})))
            .await
            .unwrap();
        queue
            .enqueue(SyncJob::create(Action::CreateStudy, "local-ST-1", json!({"visit_id": "local-VS-1"})))
            .await
            .unwrap();
        queue.flush().await.unwrap();

        assert_eq!(backend.calls.lock().unwrap().len(), 1);
        let state = state.read().await;
        assert_eq!(
            state.sync_status("local-VS-1"),
            Some(&SyncStatus::Failed("Sheet is locked".to_string()))
        );
        assert!(state.sync_status("local-ST-1").unwrap().is_failed());
        assert_eq!(state.failed_entities().len(), 2);
    }
}
