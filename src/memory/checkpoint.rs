//! 检查点存储抽象层
//!
//! 以 thread_id 为键保存完整 RunState，支持跨调用、跨进程挂起与恢复。save 为覆盖写（后写者胜）；
//! 引擎在两次调用之间不缓存状态，存储是 RunState 的唯一持有者。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::config::{CheckpointBackend, CheckpointSection};
use crate::core::{EngineError, RunState};
use crate::memory::{FileCheckpointStore, SqliteCheckpointStore};

/// 检查点存储接口
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// 覆盖写入
    async fn save(&self, state: &RunState) -> Result<(), EngineError>;

    /// 读取；不存在时报 UnknownThread
    async fn load(&self, thread_id: &str) -> Result<RunState, EngineError>;

    /// 删除；不存在时什么也不做
    async fn delete(&self, thread_id: &str) -> Result<(), EngineError>;

    async fn exists(&self, thread_id: &str) -> Result<bool, EngineError> {
        match self.load(thread_id).await {
            Ok(_) => Ok(true),
            Err(EngineError::UnknownThread(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// 全部线程 id（排序后）
    async fn thread_ids(&self) -> Result<Vec<String>, EngineError>;
}

/// 内存检查点存储（测试与单进程场景）
#[derive(Default)]
pub struct InMemoryCheckpointStore {
    entries: RwLock<HashMap<String, RunState>>,
}

impl InMemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn save(&self, state: &RunState) -> Result<(), EngineError> {
        self.entries
            .write()
            .await
            .insert(state.thread_id.clone(), state.clone());
        Ok(())
    }

    async fn load(&self, thread_id: &str) -> Result<RunState, EngineError> {
        self.entries
            .read()
            .await
            .get(thread_id)
            .cloned()
            .ok_or_else(|| EngineError::UnknownThread(thread_id.to_string()))
    }

    async fn delete(&self, thread_id: &str) -> Result<(), EngineError> {
        self.entries.write().await.remove(thread_id);
        Ok(())
    }

    async fn exists(&self, thread_id: &str) -> Result<bool, EngineError> {
        Ok(self.entries.read().await.contains_key(thread_id))
    }

    async fn thread_ids(&self) -> Result<Vec<String>, EngineError> {
        let mut ids: Vec<String> = self.entries.read().await.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}

/// 按配置打开检查点存储
pub async fn open_store(cfg: &CheckpointSection) -> Result<Arc<dyn CheckpointStore>, EngineError> {
    let store: Arc<dyn CheckpointStore> = match cfg.backend {
        CheckpointBackend::Memory => Arc::new(InMemoryCheckpointStore::new()),
        CheckpointBackend::File => Arc::new(FileCheckpointStore::new(&cfg.path)),
        CheckpointBackend::Sqlite => Arc::new(SqliteCheckpointStore::open(&cfg.path).await?),
    };
    tracing::info!(backend = ?cfg.backend, path = %cfg.path.display(), "checkpoint store ready");
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::RunStatus;
    use crate::memory::Message;

    #[tokio::test]
    async fn test_save_load_delete() {
        let store = InMemoryCheckpointStore::new();
        let mut state = RunState::new("t1");
        state.message_log.append(Message::user("hi")).unwrap();
        store.save(&state).await.unwrap();

        let a = store.load("t1").await.unwrap();
        let b = store.load("t1").await.unwrap();
        assert_eq!(a, state);
        assert_eq!(a, b);
        assert!(store.exists("t1").await.unwrap());

        store.delete("t1").await.unwrap();
        store.delete("t1").await.unwrap();
        assert!(matches!(
            store.load("t1").await,
            Err(EngineError::UnknownThread(id)) if id == "t1"
        ));
    }

    #[tokio::test]
    async fn test_last_writer_wins() {
        let store = InMemoryCheckpointStore::new();
        let mut state = RunState::new("t1");
        store.save(&state).await.unwrap();
        state.status = RunStatus::Completed;
        store.save(&state).await.unwrap();
        assert_eq!(store.load("t1").await.unwrap().status, RunStatus::Completed);
        assert_eq!(store.thread_ids().await.unwrap(), vec!["t1".to_string()]);
    }

    #[tokio::test]
    async fn test_open_memory_store() {
        let store = open_store(&CheckpointSection::default()).await.unwrap();
        assert!(!store.exists("nope").await.unwrap());
    }
}
