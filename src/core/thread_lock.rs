//! 线程级互斥：同一 thread_id 同时只允许一个 start / resume / cancel 在途
//!
//! 不同线程互不影响，可并行推进。锁在整个调用期间持有（包括 Planner 与工具调用）；
//! 守卫释放时若无人等待，该线程的条目随即从表中移除。

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::{Mutex, OwnedMutexGuard};

/// 每个 thread_id 一把异步互斥锁
#[derive(Debug, Default)]
pub struct ThreadLocks {
    locks: StdMutex<HashMap<String, Arc<Mutex<()>>>>,
}

/// 线程独占权；drop 时释放并清理空闲条目
pub struct ThreadGuard<'a> {
    locks: &'a ThreadLocks,
    thread_id: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for ThreadGuard<'_> {
    fn drop(&mut self) {
        self.guard.take();
        self.locks.forget(&self.thread_id);
    }
}

impl ThreadLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self) -> std::sync::MutexGuard<'_, HashMap<String, Arc<Mutex<()>>>> {
        self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// 获取该线程的独占权；同线程的后续调用排队等待
    pub async fn acquire(&self, thread_id: &str) -> ThreadGuard<'_> {
        let lock = self.table().entry(thread_id.to_string()).or_default().clone();
        let guard = lock.lock_owned().await;
        ThreadGuard {
            locks: self,
            thread_id: thread_id.to_string(),
            guard: Some(guard),
        }
    }

    /// 无人持有也无人等待时移除该线程的锁
    fn forget(&self, thread_id: &str) {
        let mut locks = self.table();
        if locks
            .get(thread_id)
            .is_some_and(|l| Arc::strong_count(l) == 1)
        {
            locks.remove(thread_id);
        }
    }

    /// 当前登记的线程数
    pub fn len(&self) -> usize {
        self.table().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_thread_serialized() {
        let locks = Arc::new(ThreadLocks::new());
        let active = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..4 {
            let (locks, active, max_seen) = (locks.clone(), active.clone(), max_seen.clone());
            handles.push(tokio::spawn(async move {
                let _guard = locks.acquire("t1").await;
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                active.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn test_different_threads_independent() {
        let locks = ThreadLocks::new();
        let _a = locks.acquire("a").await;
        let b = tokio::time::timeout(Duration::from_millis(100), locks.acquire("b")).await;
        assert!(b.is_ok());
    }

    #[tokio::test]
    async fn test_entry_removed_when_guard_drops() {
        let locks = ThreadLocks::new();
        let guard = locks.acquire("t1").await;
        assert_eq!(locks.len(), 1);
        drop(guard);
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn test_entry_kept_while_waiter_queued() {
        let locks = Arc::new(ThreadLocks::new());
        let first = locks.acquire("t1").await;

        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _guard = locks.acquire("t1").await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(first);
        assert_eq!(locks.len(), 1);

        waiter.await.unwrap();
        assert!(locks.is_empty());
    }
}
