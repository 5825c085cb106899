//! 请求级咨询锁
//!
//! 所有请求在处理前尝试获取同一把锁；超时后记录告警并继续执行，
//! 因此它只降低并发写入交错的概率，不保证互斥。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// 默认等待时间
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(10);

/// 咨询锁
#[derive(Debug, Clone)]
pub struct AdvisoryLock {
    inner: Arc<Mutex<()>>,
    timeout: Duration,
    timeouts: Arc<AtomicU64>,
}

/// 锁凭据；`guard` 为 `None` 表示超时后未持锁继续执行
#[derive(Debug)]
pub struct LockTicket {
    guard: Option<OwnedMutexGuard<()>>,
}

impl LockTicket {
    pub fn is_held(&self) -> bool {
        self.guard.is_some()
    }
}

impl AdvisoryLock {
    pub fn new(timeout: Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(())),
            timeout,
            timeouts: Arc::new(AtomicU64::new(0)),
        }
    }

    /// 获取锁，超时则不持锁返回
    pub async fn acquire(&self) -> LockTicket {
        match tokio::time::timeout(self.timeout, self.inner.clone().lock_owned()).await {
            Ok(guard) => LockTicket { guard: Some(guard) },
            Err(_) => {
                self.timeouts.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    "Request lock not acquired within {:?}, proceeding without it",
                    self.timeout
                );
                LockTicket { guard: None }
            }
        }
    }

    /// 累计超时次数
    pub fn timeout_count(&self) -> u64 {
        self.timeouts.load(Ordering::Relaxed)
    }
}

impl Default for AdvisoryLock {
    fn default() -> Self {
        Self::new(DEFAULT_LOCK_TIMEOUT)
    }
}
