//! 运行状态：RunState / RunStatus / RunOutcome / Interrupt
//!
//! RunState 是每个 thread_id 唯一的持久化单元，由检查点存储独占；引擎每次调用时加载一份副本，
//! 工具执行后、挂起、完成或取消时写回。

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::memory::{Message, MessageLog, ToolCallRequest};

/// 运行阶段
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Suspended,
    /// 终态
    Completed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Suspended => "suspended",
            RunStatus::Completed => "completed",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 一个对话线程的完整可恢复状态
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunState {
    pub thread_id: String,
    pub message_log: MessageLog,
    pub status: RunStatus,
    /// 等待决策的请求；仅 suspended 时非空
    #[serde(default)]
    pub pending_requests: Vec<ToolCallRequest>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
    /// 整个生命周期内的 Planner 调用次数
    #[serde(default)]
    pub turns: usize,
    #[serde(default)]
    pub cancelled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_text: Option<String>,
    /// 挂起那一轮里已执行的免审批调用结果；恢复时与审批结果一起按请求顺序写回日志
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub deferred_results: Vec<Message>,
    /// 最近一次 resume 已处理的请求 id；running 检查点上重试同一 resume 时据此匹配
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resolved_batch: Vec<String>,
}

impl RunState {
    pub fn new(thread_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            thread_id: thread_id.into(),
            message_log: MessageLog::new(),
            status: RunStatus::Running,
            pending_requests: Vec::new(),
            created_at: now,
            updated_at: now,
            turns: 0,
            cancelled: false,
            final_text: None,
            deferred_results: Vec::new(),
            resolved_batch: Vec::new(),
        }
    }

    pub fn messages(&self) -> &[Message] {
        self.message_log.messages()
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// 挂起时对外暴露的中断；非 suspended 返回 None
    pub fn interrupt(&self) -> Option<Interrupt> {
        (self.status == RunStatus::Suspended).then(|| Interrupt {
            thread_id: self.thread_id.clone(),
            pending_requests: self.pending_requests.clone(),
        })
    }

    /// 检查 suspended 不变量：挂起请求非空且 id 互不相同；暂存结果只在挂起时存在
    pub fn check_invariants(&self) -> bool {
        if self.status != RunStatus::Suspended && !self.deferred_results.is_empty() {
            return false;
        }
        match self.status {
            RunStatus::Suspended => {
                let mut ids: Vec<&str> =
                    self.pending_requests.iter().map(|r| r.id.as_str()).collect();
                ids.sort_unstable();
                ids.dedup();
                !self.pending_requests.is_empty() && ids.len() == self.pending_requests.len()
            }
            _ => self.pending_requests.is_empty(),
        }
    }
}

/// 挂起中断：线程 id + 全部待决请求
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Interrupt {
    pub thread_id: String,
    pub pending_requests: Vec<ToolCallRequest>,
}

/// start / resume / cancel 的返回值
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome {
    Completed { final_text: String },
    Suspended { pending_requests: Vec<ToolCallRequest> },
}

impl RunOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, RunOutcome::Completed { .. })
    }

    pub fn final_text(&self) -> Option<&str> {
        match self {
            RunOutcome::Completed { final_text } => Some(final_text),
            RunOutcome::Suspended { .. } => None,
        }
    }

    pub fn pending_requests(&self) -> &[ToolCallRequest] {
        match self {
            RunOutcome::Suspended { pending_requests } => pending_requests,
            RunOutcome::Completed { .. } => &[],
        }
    }
}
