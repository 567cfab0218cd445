//! SQLite 检查点存储（rusqlite）
//!
//! 单表 checkpoints(thread_id PRIMARY KEY, status, state, updated_at)，state 列为 RunState JSON。
//! rusqlite 是同步接口：连接放在 Mutex 后，所有操作经 spawn_blocking 执行，避免阻塞运行时。

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};

use crate::core::{EngineError, RunState};
use crate::memory::CheckpointStore;

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS checkpoints (
    thread_id  TEXT PRIMARY KEY,
    status     TEXT NOT NULL,
    state      TEXT NOT NULL,
    updated_at TEXT NOT NULL
)";

/// SQLite 持久化
#[derive(Clone)]
pub struct SqliteCheckpointStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteCheckpointStore {
    /// 打开（或创建）数据库文件并建表
    pub async fn open(db_path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let path = db_path.as_ref().to_path_buf();
        let conn = tokio::task::spawn_blocking(move || -> Result<Connection, EngineError> {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            let conn = Connection::open(&path)?;
            conn.execute(SCHEMA, [])?;
            Ok(conn)
        })
        .await
        .map_err(|e| EngineError::Storage(e.to_string()))??;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 内存数据库（测试用）
    pub fn open_in_memory() -> Result<Self, EngineError> {
        let conn = Connection::open_in_memory()?;
        conn.execute(SCHEMA, [])?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, EngineError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, EngineError> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|e| EngineError::Storage(format!("connection lock poisoned: {e}")))?;
            f(&guard)
        })
        .await
        .map_err(|e| EngineError::Storage(e.to_string()))?
    }
}

#[async_trait]
impl CheckpointStore for SqliteCheckpointStore {
    async fn save(&self, state: &RunState) -> Result<(), EngineError> {
        let thread_id = state.thread_id.clone();
        let status = state.status.as_str();
        let json = serde_json::to_string(state)?;
        let updated_at = state.updated_at.to_rfc3339();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO checkpoints (thread_id, status, state, updated_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(thread_id) DO UPDATE SET
                    status = excluded.status,
                    state = excluded.state,
                    updated_at = excluded.updated_at",
                params![thread_id, status, json, updated_at],
            )?;
            Ok(())
        })
        .await
    }

    async fn load(&self, thread_id: &str) -> Result<RunState, EngineError> {
        let id = thread_id.to_string();
        let raw: Option<String> = self
            .with_conn(move |conn| {
                Ok(conn
                    .query_row(
                        "SELECT state FROM checkpoints WHERE thread_id = ?1",
                        params![id],
                        |row| row.get(0),
                    )
                    .optional()?)
            })
            .await?;
        match raw {
            Some(json) => Ok(serde_json::from_str(&json)?),
            None => Err(EngineError::UnknownThread(thread_id.to_string())),
        }
    }

    async fn delete(&self, thread_id: &str) -> Result<(), EngineError> {
        let id = thread_id.to_string();
        self.with_conn(move |conn| {
            conn.execute("DELETE FROM checkpoints WHERE thread_id = ?1", params![id])?;
            Ok(())
        })
        .await
    }

    async fn exists(&self, thread_id: &str) -> Result<bool, EngineError> {
        let id = thread_id.to_string();
        self.with_conn(move |conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM checkpoints WHERE thread_id = ?1",
                params![id],
                |row| row.get(0),
            )?;
            Ok(count > 0)
        })
        .await
    }

    async fn thread_ids(&self) -> Result<Vec<String>, EngineError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT thread_id FROM checkpoints ORDER BY thread_id")?;
            let ids = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(ids)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::RunStatus;
    use crate::memory::Message;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_sqlite_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("checkpoints.db");

        let mut state = RunState::new("t1");
        state.message_log.append(Message::user("hello")).unwrap();
        {
            let store = SqliteCheckpointStore::open(&db).await.unwrap();
            store.save(&state).await.unwrap();
            state.status = RunStatus::Completed;
            store.save(&state).await.unwrap();
        }

        let store = SqliteCheckpointStore::open(&db).await.unwrap();
        let loaded = store.load("t1").await.unwrap();
        assert_eq!(loaded, state);
        assert_eq!(store.thread_ids().await.unwrap(), vec!["t1".to_string()]);
    }

    #[tokio::test]
    async fn test_sqlite_missing_and_delete() {
        let store = SqliteCheckpointStore::open_in_memory().unwrap();
        assert!(matches!(store.load("x").await, Err(EngineError::UnknownThread(_))));
        store.save(&RunState::new("x")).await.unwrap();
        assert!(store.exists("x").await.unwrap());
        store.delete("x").await.unwrap();
        assert!(!store.exists("x").await.unwrap());
    }
}
