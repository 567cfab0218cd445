//! 示例 Agent 配置：email / sql / notes
//!
//! 每种 Agent 决定注册哪些工具、哪些需要审批、默认提示词，以及终端审批时的预览。
//! CLI 与集成测试共用 build_profile，保证工具注册与审批标志一致。

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::approval::PreviewFn;
use crate::config::AppConfig;
use crate::core::EngineError;
use crate::memory::ToolCallRequest;
use crate::tools::{
    preview_query_impact, CorrectNoteTool, InspectNotesTool, NoteCache, Outbox, ReadEmailTool,
    SelectQueryTool, SendEmailTool, SqlDatabase, ToolRegistry, WebSearchTool, WriteQueryTool,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AgentKind {
    Email,
    Sql,
    Notes,
}

impl AgentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentKind::Email => "email",
            AgentKind::Sql => "sql",
            AgentKind::Notes => "notes",
        }
    }

    pub fn system_prompt(&self) -> &'static str {
        match self {
            AgentKind::Email => "You're an AI assistant that helps manage emails and meetings.",
            AgentKind::Sql => {
                "You are an expert SQL agent that can interact with an SQL database. \
                 You have access to two tools:\n\
                 1. execute_select_query: run read-only SELECT queries to fetch data \
                 from the database.\n\
                 2. execute_write_query: run data-modifying queries like INSERT, UPDATE, \
                 DELETE, CREATE, DROP, ALTER and TRUNCATE."
            }
            AgentKind::Notes => {
                "Assistant that inspects and corrects personal notes.\n\
                 Rules:\n\
                 - Use web_search to verify facts (don't rely on your knowledge)\n\
                 - Match note length: short stays short, long stays long\n\
                 - Only correct if you're confident the info is wrong\n\
                 - MUST use correct_note tool to save changes\n\
                 - If a correction is rejected by the user, SKIP that note and continue \
                 with the next one\n\
                 - Do NOT retry the same note multiple times if rejected"
            }
        }
    }

    pub fn default_prompt(&self) -> &'static str {
        match self {
            AgentKind::Email => "Please read my latest email and reply.",
            AgentKind::Sql => {
                "Please provide me with the names of all artists in the database. \
                 Then, add a new artist with name 'AI Records'."
            }
            AgentKind::Notes => "Inspect my notes and correct any inaccuracies you find.",
        }
    }
}

impl FromStr for AgentKind {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "email" => Ok(AgentKind::Email),
            "sql" => Ok(AgentKind::Sql),
            "notes" | "obsidian" => Ok(AgentKind::Notes),
            other => Err(EngineError::Config(format!(
                "unknown agent '{other}' (expected email, sql or notes)"
            ))),
        }
    }
}

impl fmt::Display for AgentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 一个 Agent 的工具与审批预览
pub struct AgentProfile {
    pub kind: AgentKind,
    pub registry: ToolRegistry,
    pub preview: Option<PreviewFn>,
    /// 仅 email Agent 有
    pub outbox: Option<Outbox>,
}

/// 按配置构建 Agent 的工具集
pub fn build_profile(kind: AgentKind, cfg: &AppConfig) -> Result<AgentProfile, EngineError> {
    let tools = &cfg.tools;
    let mut registry = ToolRegistry::new();
    let mut preview: Option<PreviewFn> = None;
    let mut outbox = None;

    match kind {
        AgentKind::Email => {
            let out = Outbox::new();
            registry.register(ReadEmailTool::new(tools.inbox_text.clone()), false)?;
            registry.register(SendEmailTool::new(out.clone()), true)?;
            outbox = Some(out);
        }
        AgentKind::Sql => {
            let db = SqlDatabase::open(&tools.sqlite_path)?;
            registry.register(SelectQueryTool::new(db.clone()), false)?;
            registry.register(WriteQueryTool::new(db.clone()), true)?;
            preview = Some(Box::new(move |req: &ToolCallRequest| {
                let query = req.arguments.get("query")?.as_str()?;
                Some(preview_query_impact(&db, query))
            }));
        }
        AgentKind::Notes => {
            let cache = Arc::new(NoteCache::new(&tools.notes_vault));
            registry.register(WebSearchTool::from_config(&tools.search), false)?;
            registry.register(InspectNotesTool::new(cache.clone()), false)?;
            registry.register(CorrectNoteTool::new(cache.clone()), true)?;
            preview = Some(Box::new(move |req: &ToolCallRequest| {
                let title = req.arguments.get("note_title")?.as_str()?;
                let current = match cache.note_path(title) {
                    Ok(path) => std::fs::read_to_string(path)
                        .unwrap_or_else(|_| "[Not found]".to_string()),
                    Err(reason) => format!("[{reason}]"),
                };
                Some(format!("CURRENT: {title}\n{}", truncate(&current, 200)))
            }));
        }
    }

    tracing::info!(agent = %kind, tools = ?registry.tool_names(), "agent profile ready");
    Ok(AgentProfile {
        kind,
        registry,
        preview,
        outbox,
    })
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() > max_chars {
        format!("{}...", s.chars().take(max_chars).collect::<String>())
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::approval::GatingPolicy;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_agent_kind_parse() {
        assert_eq!("Email".parse::<AgentKind>().unwrap(), AgentKind::Email);
        assert_eq!("obsidian".parse::<AgentKind>().unwrap(), AgentKind::Notes);
        assert!("calendar".parse::<AgentKind>().is_err());
    }

    #[test]
    fn test_email_profile_gates_send() {
        let profile = build_profile(AgentKind::Email, &AppConfig::default()).unwrap();
        let policy = GatingPolicy::from_registry(&profile.registry);
        assert!(!policy.requires_approval("read_email").unwrap());
        assert!(policy.requires_approval("send_email").unwrap());
        assert!(profile.outbox.is_some());
    }

    #[test]
    fn test_sql_profile_preview() {
        let dir = TempDir::new().unwrap();
        let mut cfg = AppConfig::default();
        cfg.tools.sqlite_path = dir.path().join("demo.db");
        let db = SqlDatabase::open(&cfg.tools.sqlite_path).unwrap();
        db.run_write("CREATE TABLE Artist (ArtistId INTEGER PRIMARY KEY, Name TEXT)").unwrap();

        let profile = build_profile(AgentKind::Sql, &cfg).unwrap();
        assert_eq!(
            GatingPolicy::from_registry(&profile.registry).gated_tools(),
            vec!["execute_write_query".to_string()]
        );
        let preview = profile.preview.unwrap();
        let req = ToolCallRequest::new(
            "c1",
            "execute_write_query",
            json!({"query": "INSERT INTO Artist (Name) VALUES ('AI Records')"}),
        );
        assert!(preview(&req).unwrap().starts_with("Target table structure"));
    }

    #[test]
    fn test_notes_preview_stays_inside_vault() {
        let dir = TempDir::new().unwrap();
        let vault = dir.path().join("vault");
        std::fs::create_dir(&vault).unwrap();
        std::fs::write(vault.join("Rust.md"), "Rust 1.0 shipped in 2015.").unwrap();
        std::fs::write(dir.path().join("secret.md"), "do not show").unwrap();

        let mut cfg = AppConfig::default();
        cfg.tools.notes_vault = vault;
        let profile = build_profile(AgentKind::Notes, &cfg).unwrap();
        let preview = profile.preview.unwrap();

        let req = |title: &str| {
            ToolCallRequest::new("c1", "correct_note", json!({"note_title": title}))
        };
        assert!(preview(&req("Rust")).unwrap().contains("shipped in 2015"));

        let escaped = preview(&req("../secret")).unwrap();
        assert!(!escaped.contains("do not show"));
        assert!(escaped.contains("invalid note title"));
    }
}
