//! 笔记工具：inspect_notes（免审批）/ correct_note（需审批）
//!
//! 笔记库是一个目录下的 *.md 文件（递归，walkdir）。读取结果缓存在 NoteCache 中，
//! 由两个工具共享；每次 correct_note 写入后失效，下次 inspect 重新加载。

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;
use walkdir::WalkDir;

use crate::tools::{parse_args, schema_of, Tool};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub title: String,
    pub content: String,
}

/// 笔记缓存（按需加载，写入后失效）
pub struct NoteCache {
    vault: PathBuf,
    notes: Mutex<Option<Arc<Vec<Note>>>>,
}

impl NoteCache {
    pub fn new(vault: impl AsRef<Path>) -> Self {
        Self {
            vault: vault.as_ref().to_path_buf(),
            notes: Mutex::new(None),
        }
    }

    pub fn vault(&self) -> &Path {
        &self.vault
    }

    /// 返回缓存；未加载时扫描笔记库
    pub async fn load(&self) -> Result<Arc<Vec<Note>>, String> {
        let mut guard = self.notes.lock().await;
        if let Some(notes) = guard.as_ref() {
            return Ok(notes.clone());
        }
        let vault = self.vault.clone();
        let notes = tokio::task::spawn_blocking(move || scan_vault(&vault))
            .await
            .map_err(|e| e.to_string())??;
        tracing::debug!(vault = %self.vault.display(), count = notes.len(), "notes loaded");
        let notes = Arc::new(notes);
        *guard = Some(notes.clone());
        Ok(notes)
    }

    pub async fn invalidate(&self) {
        *self.notes.lock().await = None;
    }

    /// 笔记文件路径；标题不能逃出笔记库
    pub(crate) fn note_path(&self, title: &str) -> Result<PathBuf, String> {
        let title = title.trim();
        if title.is_empty() || title.contains(['/', '\\']) || title.contains("..") {
            return Err(format!("invalid note title '{title}'"));
        }
        Ok(self.vault.join(format!("{title}.md")))
    }
}

fn scan_vault(vault: &Path) -> Result<Vec<Note>, String> {
    if !vault.is_dir() {
        return Err(format!("notes vault not found: {}", vault.display()));
    }
    let mut notes = Vec::new();
    for entry in WalkDir::new(vault).sort_by_file_name() {
        let entry = entry.map_err(|e| e.to_string())?;
        let path = entry.path();
        if !entry.file_type().is_file() || path.extension().map_or(true, |e| e != "md") {
            continue;
        }
        let content = std::fs::read_to_string(path).map_err(|e| e.to_string())?;
        let title = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "No Title".to_string());
        notes.push(Note { title, content });
    }
    Ok(notes)
}

/// 列出全部笔记
pub struct InspectNotesTool {
    cache: Arc<NoteCache>,
}

impl InspectNotesTool {
    pub fn new(cache: Arc<NoteCache>) -> Self {
        Self { cache }
    }
}

#[async_trait]
impl Tool for InspectNotesTool {
    fn name(&self) -> &str {
        "inspect_notes"
    }

    fn description(&self) -> &str {
        "Inspect personal notes. Returns a JSON list of {title, content} objects."
    }

    async fn execute(&self, _args: Value) -> Result<String, String> {
        let notes = self.cache.load().await?;
        serde_json::to_string_pretty(notes.as_ref()).map_err(|e| e.to_string())
    }
}

#[derive(Deserialize, JsonSchema)]
pub struct CorrectNoteArgs {
    /// 当前标题（文件名，不含 .md）
    pub note_title: String,
    pub new_note_title: String,
    pub new_note_content: String,
}

/// 改写笔记内容，必要时重命名
pub struct CorrectNoteTool {
    cache: Arc<NoteCache>,
}

impl CorrectNoteTool {
    pub fn new(cache: Arc<NoteCache>) -> Self {
        Self { cache }
    }
}

#[async_trait]
impl Tool for CorrectNoteTool {
    fn name(&self) -> &str {
        "correct_note"
    }

    fn description(&self) -> &str {
        "Correct a note: replace its content and optionally rename it."
    }

    fn parameters_schema(&self) -> Value {
        schema_of::<CorrectNoteArgs>()
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let args: CorrectNoteArgs = parse_args(args)?;
        let old_path = self.cache.note_path(&args.note_title)?;
        let new_path = self.cache.note_path(&args.new_note_title)?;

        if !tokio::fs::try_exists(&old_path).await.unwrap_or(false) {
            return Err(format!("'{}' not found", args.note_title));
        }
        let renamed = old_path != new_path;
        if renamed && tokio::fs::try_exists(&new_path).await.unwrap_or(false) {
            return Err(format!("'{}' already exists", args.new_note_title));
        }

        tokio::fs::write(&old_path, &args.new_note_content)
            .await
            .map_err(|e| e.to_string())?;
        if renamed {
            tokio::fs::rename(&old_path, &new_path)
                .await
                .map_err(|e| e.to_string())?;
        }
        self.cache.invalidate().await;

        Ok(if renamed {
            format!("Updated and renamed to '{}'", args.new_note_title)
        } else {
            format!("'{}' updated", args.note_title)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn vault() -> TempDir {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("Rust.md"), "Rust 1.0 shipped in 2014.").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub").join("Tokio.md"), "Async runtime.").unwrap();
        std::fs::write(dir.path().join("ignore.txt"), "not a note").unwrap();
        dir
    }

    #[tokio::test]
    async fn test_inspect_lists_markdown_only() {
        let dir = vault();
        let tool = InspectNotesTool::new(Arc::new(NoteCache::new(dir.path())));
        let out: Vec<Note> = serde_json::from_str(&tool.execute(json!({})).await.unwrap()).unwrap();
        let titles: Vec<&str> = out.iter().map(|n| n.title.as_str()).collect();
        assert_eq!(titles, vec!["Rust", "Tokio"]);
    }

    #[tokio::test]
    async fn test_correct_invalidates_cache() {
        let dir = vault();
        let cache = Arc::new(NoteCache::new(dir.path()));
        let inspect = InspectNotesTool::new(cache.clone());
        let correct = CorrectNoteTool::new(cache.clone());
        assert!(inspect.execute(json!({})).await.unwrap().contains("2014"));

        let out = correct
            .execute(json!({
                "note_title": "Rust",
                "new_note_title": "Rust Language",
                "new_note_content": "Rust 1.0 shipped in 2015."
            }))
            .await
            .unwrap();
        assert_eq!(out, "Updated and renamed to 'Rust Language'");
        assert!(!dir.path().join("Rust.md").exists());

        let listed = inspect.execute(json!({})).await.unwrap();
        assert!(listed.contains("Rust Language"));
        assert!(listed.contains("2015"));
    }

    #[tokio::test]
    async fn test_correct_errors() {
        let dir = vault();
        std::fs::write(dir.path().join("Other.md"), "x").unwrap();
        let correct = CorrectNoteTool::new(Arc::new(NoteCache::new(dir.path())));

        let missing =
            json!({"note_title": "Nope", "new_note_title": "Nope", "new_note_content": ""});
        assert_eq!(correct.execute(missing).await.unwrap_err(), "'Nope' not found");

        let clash =
            json!({"note_title": "Rust", "new_note_title": "Other", "new_note_content": "y"});
        assert_eq!(correct.execute(clash).await.unwrap_err(), "'Other' already exists");
        assert_eq!(
            std::fs::read_to_string(dir.path().join("Rust.md")).unwrap(),
            "Rust 1.0 shipped in 2014."
        );

        let escape =
            json!({"note_title": "../Rust", "new_note_title": "x", "new_note_content": ""});
        assert!(correct.execute(escape).await.is_err());
    }
}
