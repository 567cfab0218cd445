//! 文件检查点存储
//!
//! 每个线程一个 JSON 文件（<base>/<thread_id>.json）。写入先落临时文件再 rename，
//! 进程在写一半时崩溃也不会留下半截检查点。thread_id 必须是安全的文件名。

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::core::{EngineError, RunState};
use crate::memory::CheckpointStore;

/// 单文件 JSON 持久化
#[derive(Debug, Clone)]
pub struct FileCheckpointStore {
    base_path: PathBuf,
}

impl FileCheckpointStore {
    pub fn new(base_path: impl AsRef<Path>) -> Self {
        Self {
            base_path: base_path.as_ref().to_path_buf(),
        }
    }

    fn thread_path(&self, thread_id: &str) -> Result<PathBuf, EngineError> {
        validate_thread_id(thread_id)?;
        Ok(self.base_path.join(format!("{thread_id}.json")))
    }
}

/// 拒绝空 id、路径分隔符、`..` 与控制字符
pub fn validate_thread_id(thread_id: &str) -> Result<(), EngineError> {
    if thread_id.is_empty() {
        return Err(EngineError::InvalidThreadId(
            "thread id cannot be empty".to_string(),
        ));
    }
    if thread_id.contains('/')
        || thread_id.contains('\\')
        || thread_id.contains("..")
        || thread_id.chars().any(|c| c.is_control())
    {
        return Err(EngineError::InvalidThreadId(format!(
            "thread id contains invalid characters: {thread_id:?}"
        )));
    }
    Ok(())
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn save(&self, state: &RunState) -> Result<(), EngineError> {
        let path = self.thread_path(&state.thread_id)?;
        tokio::fs::create_dir_all(&self.base_path).await?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, serde_json::to_string_pretty(state)?).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn load(&self, thread_id: &str) -> Result<RunState, EngineError> {
        let path = self.thread_path(thread_id)?;
        match tokio::fs::read_to_string(&path).await {
            Ok(data) => Ok(serde_json::from_str(&data)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(EngineError::UnknownThread(thread_id.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, thread_id: &str) -> Result<(), EngineError> {
        let path = self.thread_path(thread_id)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, thread_id: &str) -> Result<bool, EngineError> {
        Ok(tokio::fs::try_exists(self.thread_path(thread_id)?).await?)
    }

    async fn thread_ids(&self) -> Result<Vec<String>, EngineError> {
        if !tokio::fs::try_exists(&self.base_path).await? {
            return Ok(Vec::new());
        }
        let mut entries = tokio::fs::read_dir(&self.base_path).await?;
        let mut ids = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            if let Some(id) = name.strip_suffix(".json") {
                ids.push(id.to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::RunStatus;
    use crate::memory::{Message, ToolCallRequest};
    use serde_json::json;
    use tempfile::TempDir;

    fn suspended_state() -> RunState {
        let mut state = RunState::new("t1");
        state.message_log.append(Message::user("reply to mark")).unwrap();
        let call = ToolCallRequest::new("c1", "send_email", json!({"recipient": "mark"}));
        state
            .message_log
            .append(Message::planner("", vec![call.clone()]))
            .unwrap();
        state.status = RunStatus::Suspended;
        state.pending_requests = vec![call];
        state
    }

    #[tokio::test]
    async fn test_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let state = suspended_state();
        FileCheckpointStore::new(dir.path()).save(&state).await.unwrap();

        let reopened = FileCheckpointStore::new(dir.path());
        let loaded = reopened.load("t1").await.unwrap();
        assert_eq!(loaded, state);
        assert_eq!(reopened.thread_ids().await.unwrap(), vec!["t1".to_string()]);
    }

    #[tokio::test]
    async fn test_missing_and_delete() {
        let dir = TempDir::new().unwrap();
        let store = FileCheckpointStore::new(dir.path().join("nested"));
        assert!(matches!(store.load("t1").await, Err(EngineError::UnknownThread(_))));
        assert!(store.thread_ids().await.unwrap().is_empty());

        store.save(&suspended_state()).await.unwrap();
        assert!(store.exists("t1").await.unwrap());
        store.delete("t1").await.unwrap();
        store.delete("t1").await.unwrap();
        assert!(!store.exists("t1").await.unwrap());
    }

    #[test]
    fn test_thread_id_validation() {
        assert!(validate_thread_id("cli-1234").is_ok());
        for bad in ["", "../etc", "a/b", "a\\b", "a\0b"] {
            assert!(matches!(
                validate_thread_id(bad),
                Err(EngineError::InvalidThreadId(_))
            ));
        }
    }
}
