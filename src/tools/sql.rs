//! SQL 工具（rusqlite）：execute_select_query（免审批）/ execute_write_query（需审批）
//!
//! 两个工具共享一个 SqlDatabase。写操作在审批前可用 preview_query_impact 预估影响范围：
//! DELETE 列出将删除的行，UPDATE 按 WHERE 列出将更新的行，INSERT 给出目标表结构。

use std::path::Path;
use std::sync::{Arc, Mutex, OnceLock};

use async_trait::async_trait;
use regex::Regex;
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OptionalExtension};
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;

use crate::core::EngineError;
use crate::tools::{parse_args, schema_of, Tool};

const WRITE_COMMANDS: [&str; 7] = [
    "INSERT", "UPDATE", "DELETE", "CREATE", "DROP", "ALTER", "TRUNCATE",
];

/// 共享的 SQLite 连接
#[derive(Clone)]
pub struct SqlDatabase {
    conn: Arc<Mutex<Connection>>,
}

impl SqlDatabase {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let conn = Connection::open(path)?;
        Ok(Self::from_connection(conn))
    }

    pub fn open_in_memory() -> Result<Self, EngineError> {
        Ok(Self::from_connection(Connection::open_in_memory()?))
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> Result<T, String>) -> Result<T, String> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| format!("database lock poisoned: {e}"))?;
        f(&conn)
    }

    /// 执行查询，结果格式化为 `[(1, 'AC/DC'), ...]`
    pub fn run_select(&self, query: &str) -> Result<String, String> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(query).map_err(|e| e.to_string())?;
            let columns = stmt.column_count();
            let rows = stmt
                .query_map([], |row| {
                    (0..columns)
                        .map(|i| row.get_ref(i).map(format_value))
                        .collect::<Result<Vec<_>, _>>()
                })
                .map_err(|e| e.to_string())?
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| e.to_string())?;
            let tuples: Vec<String> = rows
                .iter()
                .map(|cols| format!("({})", cols.join(", ")))
                .collect();
            Ok(format!("[{}]", tuples.join(", ")))
        })
    }

    /// 执行写语句，返回受影响行数
    pub fn run_write(&self, query: &str) -> Result<usize, String> {
        self.with_conn(|conn| conn.execute(query, []).map_err(|e| e.to_string()))
    }

    /// 表的建表语句
    pub fn table_info(&self, table: &str) -> Result<String, String> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT sql FROM sqlite_master WHERE type = 'table' AND name = ?1",
                [table],
                |row| row.get::<_, String>(0),
            )
            .optional()
            .map_err(|e| e.to_string())?
            .ok_or_else(|| format!("no such table: {table}"))
        })
    }
}

fn format_value(value: ValueRef<'_>) -> String {
    match value {
        ValueRef::Null => "None".to_string(),
        ValueRef::Integer(i) => i.to_string(),
        ValueRef::Real(f) => f.to_string(),
        ValueRef::Text(t) => format!("'{}'", String::from_utf8_lossy(t)),
        ValueRef::Blob(b) => format!("<{} bytes>", b.len()),
    }
}

fn starts_with_command(query: &str, command: &str) -> bool {
    query.trim_start().to_uppercase().starts_with(command)
}

#[derive(Deserialize, JsonSchema)]
struct QueryArgs {
    /// 完整的 SQL 语句
    query: String,
}

/// 只读查询
pub struct SelectQueryTool {
    db: SqlDatabase,
}

impl SelectQueryTool {
    pub fn new(db: SqlDatabase) -> Self {
        Self { db }
    }
}

#[async_trait]
impl Tool for SelectQueryTool {
    fn name(&self) -> &str {
        "execute_select_query"
    }

    fn description(&self) -> &str {
        "Execute SELECT queries (read-only)."
    }

    fn parameters_schema(&self) -> Value {
        schema_of::<QueryArgs>()
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let QueryArgs { query } = parse_args(args)?;
        if !starts_with_command(&query, "SELECT") {
            return Err("This tool only accepts SELECT queries".to_string());
        }
        let db = self.db.clone();
        let result = tokio::task::spawn_blocking(move || db.run_select(&query))
            .await
            .map_err(|e| e.to_string())??;
        Ok(format!("Query executed successfully:\n{result}"))
    }
}

/// 写操作（INSERT/UPDATE/DELETE/CREATE/DROP/ALTER/TRUNCATE）
pub struct WriteQueryTool {
    db: SqlDatabase,
}

impl WriteQueryTool {
    pub fn new(db: SqlDatabase) -> Self {
        Self { db }
    }
}

#[async_trait]
impl Tool for WriteQueryTool {
    fn name(&self) -> &str {
        "execute_write_query"
    }

    fn description(&self) -> &str {
        "Execute INSERT, UPDATE, DELETE, CREATE, DROP, ALTER, TRUNCATE queries (requires approval)."
    }

    fn parameters_schema(&self) -> Value {
        schema_of::<QueryArgs>()
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let QueryArgs { query } = parse_args(args)?;
        if !WRITE_COMMANDS.iter().any(|c| starts_with_command(&query, c)) {
            return Err(
                "This tool only accepts INSERT/UPDATE/DELETE/CREATE/DROP/ALTER/TRUNCATE queries"
                    .to_string(),
            );
        }
        let db = self.db.clone();
        let affected = tokio::task::spawn_blocking(move || db.run_write(&query))
            .await
            .map_err(|e| e.to_string())??;
        Ok(format!(
            "Write query executed successfully:\n{affected} row(s) affected"
        ))
    }
}

fn update_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?is)^\s*UPDATE\s+(\w+)\s+SET\s.*?(\sWHERE\s.*)?$").expect("valid regex")
    })
}

fn insert_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^\s*INSERT\s+INTO\s+(\w+)").expect("valid regex"))
}

fn delete_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^\s*DELETE\b").expect("valid regex"))
}

/// 预估写语句的影响；无法预估时返回说明文字而不是错误
pub fn preview_query_impact(db: &SqlDatabase, query: &str) -> String {
    let query = query.trim().trim_end_matches(';');

    let preview = if delete_pattern().is_match(query) {
        let select = delete_pattern().replace(query, "SELECT *");
        Some(
            db.run_select(&select)
                .map(|rows| format!("Rows that will be deleted:\n{rows}")),
        )
    } else if let Some(caps) = update_pattern().captures(query) {
        let table = &caps[1];
        let filter = caps.get(2).map(|m| m.as_str().trim()).unwrap_or("");
        Some(
            db.run_select(&format!("SELECT * FROM {table} {filter}"))
                .map(|rows| format!("Rows that will be updated:\n{rows}")),
        )
    } else {
        insert_pattern().captures(query).map(|caps| {
            db.table_info(&caps[1])
                .map(|info| format!("Target table structure:\n{info}"))
        })
    };

    match preview {
        Some(Ok(text)) => text,
        Some(Err(e)) => format!("Could not generate preview: {e}"),
        None => "Preview not available for this operation".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn seeded() -> SqlDatabase {
        let db = SqlDatabase::open_in_memory().unwrap();
        db.run_write("CREATE TABLE Artist (ArtistId INTEGER PRIMARY KEY, Name TEXT)")
            .unwrap();
        db.run_write("INSERT INTO Artist (Name) VALUES ('AC/DC'), ('Accept'), ('Aerosmith')")
            .unwrap();
        db
    }

    #[tokio::test]
    async fn test_select_only_accepts_select() {
        let tool = SelectQueryTool::new(seeded());
        let out = tool
            .execute(json!({"query": "SELECT ArtistId, Name FROM Artist WHERE ArtistId = 1"}))
            .await
            .unwrap();
        assert_eq!(out, "Query executed successfully:\n[(1, 'AC/DC')]");

        let err = tool
            .execute(json!({"query": "DELETE FROM Artist"}))
            .await
            .unwrap_err();
        assert!(err.contains("only accepts SELECT"));
    }

    #[tokio::test]
    async fn test_write_query_applies_change() {
        let db = seeded();
        let tool = WriteQueryTool::new(db.clone());
        let out = tool
            .execute(json!({"query": "INSERT INTO Artist (Name) VALUES ('AI Records')"}))
            .await
            .unwrap();
        assert!(out.ends_with("1 row(s) affected"));
        assert_eq!(
            db.run_select("SELECT COUNT(*) FROM Artist").unwrap(),
            "[(4)]"
        );

        assert!(tool
            .execute(json!({"query": "SELECT * FROM Artist"}))
            .await
            .is_err());
        assert!(tool
            .execute(json!({"query": "UPDATE Nope SET x = 1"}))
            .await
            .is_err());
    }

    #[test]
    fn test_preview_query_impact() {
        let db = seeded();

        let delete = preview_query_impact(&db, "delete FROM Artist WHERE ArtistId = 2;");
        assert_eq!(delete, "Rows that will be deleted:\n[(2, 'Accept')]");

        let update =
            preview_query_impact(&db, "UPDATE Artist SET Name = 'X' WHERE ArtistId = 3");
        assert_eq!(update, "Rows that will be updated:\n[(3, 'Aerosmith')]");

        let insert = preview_query_impact(&db, "INSERT INTO Artist (Name) VALUES ('Y')");
        assert!(insert.starts_with("Target table structure:\nCREATE TABLE Artist"));

        assert_eq!(
            preview_query_impact(&db, "DROP TABLE Artist"),
            "Preview not available for this operation"
        );
        assert!(preview_query_impact(&db, "DELETE FROM Missing")
            .starts_with("Could not generate preview"));
    }
}
