//! 引擎错误类型
//!
//! 按来源分为四类：配置错误（工具重复/未知）、协议错误（调用方输入不合法，运行状态不变）、
//! Planner 错误（终止本次调用，不落盘）、存储错误。工具执行失败不在此列：它们作为
//! tool 结果写回消息日志，由 Planner 自行应对。

use thiserror::Error;

use crate::core::RunStatus;
use crate::llm::LlmError;

/// 引擎对外暴露的错误
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Duplicate tool: {0}")]
    DuplicateTool(String),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Unknown thread: {0}")]
    UnknownThread(String),

    #[error("Thread {thread_id} is not suspended (status: {status})")]
    NotSuspended { thread_id: String, status: RunStatus },

    #[error("A run already exists for thread {0}")]
    DuplicateRun(String),

    /// 决策批次的 request_id 集合与挂起请求不一致（缺失、多余或重复）
    #[error("Decision mismatch: expected {expected:?}, received {received:?}")]
    DecisionMismatch {
        expected: Vec<String>,
        received: Vec<String>,
    },

    #[error("Invalid decision: {0}")]
    InvalidDecision(String),

    #[error("Invalid thread id: {0}")]
    InvalidThreadId(String),

    #[error("Planner error: {0}")]
    Planner(#[from] PlannerError),

    #[error("Malformed planner response: {0}")]
    MalformedPlannerResponse(String),

    #[error("Step limit exceeded ({0} planner turns)")]
    StepLimitExceeded(usize),

    /// tool 结果引用了日志中从未出现过的 tool_call_id
    #[error("Tool result references unknown call: {0}")]
    DanglingToolResult(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Config error: {0}")]
    Config(String),
}

/// Planner 调用失败（传输失败、回复格式错误）
#[derive(Error, Debug)]
pub enum PlannerError {
    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error("Malformed reply: {0}")]
    Malformed(String),
}

/// 单次工具调用失败；非致命，会被转成 tool 结果文本
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ToolError {
    #[error("Tool execution failed: {0}")]
    Failed(String),

    #[error("Tool timeout: {0}")]
    Timeout(String),
}

impl EngineError {
    /// 协议类错误：调用方输入问题，运行状态保持不变
    pub fn is_protocol_error(&self) -> bool {
        matches!(
            self,
            EngineError::UnknownThread(_)
                | EngineError::NotSuspended { .. }
                | EngineError::DuplicateRun(_)
                | EngineError::DecisionMismatch { .. }
                | EngineError::InvalidDecision(_)
                | EngineError::InvalidThreadId(_)
        )
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(e: serde_json::Error) -> Self {
        EngineError::Storage(e.to_string())
    }
}

impl From<std::io::Error> for EngineError {
    fn from(e: std::io::Error) -> Self {
        EngineError::Storage(e.to_string())
    }
}

impl From<rusqlite::Error> for EngineError {
    fn from(e: rusqlite::Error) -> Self {
        EngineError::Storage(e.to_string())
    }
}
