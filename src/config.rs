//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `TOLLGATE__*` 覆盖（双下划线表示嵌套，
//! 如 `TOLLGATE__CHECKPOINT__BACKEND=sqlite`）。

use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub engine: EngineSection,
    pub checkpoint: CheckpointSection,
    pub tools: ToolsSection,
}

/// [app] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    pub name: String,
    /// 覆盖各示例 agent 的默认系统提示词
    pub system_prompt: Option<String>,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: "tollgate".to_string(),
            system_prompt: None,
        }
    }
}

/// [llm] 段：后端选择与超时
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// openai / mock
    pub provider: String,
    pub model: String,
    pub base_url: Option<String>,
    /// 未设置时读取 OPENAI_API_KEY
    pub api_key: Option<String>,
    pub timeouts: LlmTimeoutsSection,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-4o-mini".to_string(),
            base_url: None,
            api_key: None,
            timeouts: LlmTimeoutsSection::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmTimeoutsSection {
    /// 单次请求超时（秒）
    pub request: u64,
}

impl Default for LlmTimeoutsSection {
    fn default() -> Self {
        Self { request: 60 }
    }
}

/// [engine] 段：单次调用的 Planner 轮数上限、工具超时
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineSection {
    pub max_steps: usize,
    pub tool_timeout_secs: u64,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            max_steps: 20,
            tool_timeout_secs: 30,
        }
    }
}

/// 检查点存储后端
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointBackend {
    #[default]
    Memory,
    File,
    Sqlite,
}

/// [checkpoint] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CheckpointSection {
    pub backend: CheckpointBackend,
    /// file 后端为目录，sqlite 后端为数据库文件
    pub path: PathBuf,
}

impl Default for CheckpointSection {
    fn default() -> Self {
        Self {
            backend: CheckpointBackend::Memory,
            path: PathBuf::from("workspace/checkpoints"),
        }
    }
}

/// [tools] 段：示例工具的数据来源
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsSection {
    /// read_email 返回的收件箱内容
    pub inbox_text: String,
    pub sqlite_path: PathBuf,
    pub notes_vault: PathBuf,
    pub search: SearchSection,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            inbox_text: "From Mark@domena.com:\n\
                         Hi, Jack.\n\
                         Can we reschedule our meeting to next week?"
                .to_string(),
            sqlite_path: PathBuf::from("workspace/Chinook.db"),
            notes_vault: PathBuf::from("workspace/obsidian"),
            search: SearchSection::default(),
        }
    }
}

/// [tools.search] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchSection {
    pub endpoint: String,
    /// 未设置时读取 TAVILY_API_KEY
    pub api_key: Option<String>,
    pub max_results: usize,
    pub timeout_secs: u64,
}

impl Default for SearchSection {
    fn default() -> Self {
        Self {
            endpoint: "https://api.tavily.com/search".to_string(),
            api_key: None,
            max_results: 5,
            timeout_secs: 15,
        }
    }
}

/// 从 config 目录加载配置，环境变量 TOLLGATE__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 TOLLGATE__*
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    for name in ["config/default", "../config/default", "default"] {
        if std::path::Path::new(&format!("{name}.toml")).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(path) = config_path.filter(|p| p.exists()) {
        builder = builder.add_source(config::File::from(path).required(false));
    }

    builder = builder.add_source(
        config::Environment::with_prefix("TOLLGATE")
            .separator("__")
            .try_parsing(true),
    );

    builder.build()?.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.engine.max_steps, 20);
        assert_eq!(cfg.checkpoint.backend, CheckpointBackend::Memory);
        assert!(cfg.tools.inbox_text.contains("reschedule"));
    }

    #[test]
    fn test_load_from_explicit_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("custom.toml");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(
            f,
            "[engine]\nmax_steps = 5\n\n[checkpoint]\nbackend = \"sqlite\"\npath = \"runs.db\""
        )
        .unwrap();

        let cfg = load_config(Some(path)).unwrap();
        assert_eq!(cfg.engine.max_steps, 5);
        assert_eq!(cfg.engine.tool_timeout_secs, 30);
        assert_eq!(cfg.checkpoint.backend, CheckpointBackend::Sqlite);
        assert_eq!(cfg.checkpoint.path, PathBuf::from("runs.db"));
    }
}
