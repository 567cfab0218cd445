//! 工具执行器
//!
//! 持有只读的 ToolRegistry 与统一超时；invoke 在超时内调用工具，失败或超时转为 ToolError，
//! 每次调用输出结构化审计日志（JSON）。

use std::time::{Duration, Instant};

use tokio::time::timeout;

use crate::core::{EngineError, ToolError};
use crate::memory::ToolCallRequest;
use crate::tools::{ToolRegistry, ToolSpec};

/// args 预览最大字符数
const ARGS_PREVIEW_CHARS: usize = 200;

/// 工具执行器：对每次调用施加超时，并将结果映射为 ToolError
pub struct ToolExecutor {
    registry: ToolRegistry,
    timeout: Duration,
}

impl ToolExecutor {
    pub fn new(registry: ToolRegistry, timeout_secs: u64) -> Self {
        Self {
            registry,
            timeout: Duration::from_secs(timeout_secs.max(1)),
        }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn catalog(&self) -> Vec<ToolSpec> {
        self.registry.catalog()
    }

    /// 执行一次工具调用；未注册的工具属于配置错误，其余失败均为 ToolError
    pub async fn invoke(
        &self,
        request: &ToolCallRequest,
    ) -> Result<Result<String, ToolError>, EngineError> {
        let entry = self.registry.lookup(&request.tool_name)?;
        let start = Instant::now();
        let args = request.args_value();
        let args_preview = args_preview(&args);
        let result = timeout(self.timeout, entry.tool.execute(args)).await;

        let (ok, outcome) = match &result {
            Ok(Ok(_)) => (true, "ok"),
            Ok(Err(_)) => (false, "error"),
            Err(_) => (false, "timeout"),
        };
        let audit = serde_json::json!({
            "event": "tool_audit",
            "tool": request.tool_name,
            "call_id": request.id,
            "ok": ok,
            "outcome": outcome,
            "duration_ms": start.elapsed().as_millis() as u64,
            "args_preview": args_preview,
        });
        tracing::info!(audit = %audit, "tool");

        Ok(match result {
            Ok(Ok(content)) => Ok(content),
            Ok(Err(e)) => Err(ToolError::Failed(e)),
            Err(_) => Err(ToolError::Timeout(request.tool_name.clone())),
        })
    }
}

fn args_preview(args: &serde_json::Value) -> String {
    let s = args.to_string();
    if s.chars().count() > ARGS_PREVIEW_CHARS {
        format!("{}...", s.chars().take(ARGS_PREVIEW_CHARS).collect::<String>())
    } else {
        s
    }
}
