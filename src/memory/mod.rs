//! 记忆层：消息日志与检查点存储（内存 / 文件 / SQLite）

pub mod checkpoint;
pub mod conversation;
pub mod persistence;
pub mod sqlite;

pub use checkpoint::{open_store, CheckpointStore, InMemoryCheckpointStore};
pub use conversation::{Message, MessageLog, Role, ToolCallRequest};
pub use persistence::{validate_thread_id, FileCheckpointStore};
pub use sqlite::SqliteCheckpointStore;
