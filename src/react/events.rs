//! 引擎过程事件：供 CLI / 前端展示 Planner 轮次、工具调用、中断与恢复

use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;

use crate::memory::ToolCallRequest;

/// Observation 预览最大字符数
pub const OBSERVATION_PREVIEW_CHARS: usize = 200;

/// 单步过程事件（可序列化为 JSON）
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    /// 第几次调用 Planner（本次调用内计数）
    PlannerTurn { thread_id: String, step: usize },
    ToolCall {
        thread_id: String,
        call_id: String,
        tool: String,
        args: serde_json::Value,
    },
    /// 工具返回（预览）
    Observation {
        thread_id: String,
        call_id: String,
        preview: String,
    },
    ToolFailure {
        thread_id: String,
        call_id: String,
        reason: String,
    },
    /// 遇到需审批的调用，运行挂起
    Interrupted {
        thread_id: String,
        pending: Vec<ToolCallRequest>,
    },
    Resumed {
        thread_id: String,
        approved: usize,
        rejected: usize,
    },
    Completed { thread_id: String, final_text: String },
    Cancelled { thread_id: String },
}

/// 事件发送端（可选）；接收端已关闭时静默丢弃
#[derive(Clone, Default)]
pub struct EventSink {
    tx: Option<UnboundedSender<EngineEvent>>,
}

impl EventSink {
    pub fn new(tx: UnboundedSender<EngineEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    pub fn none() -> Self {
        Self::default()
    }

    pub fn send(&self, ev: EngineEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(ev);
        }
    }
}

/// 截断到 OBSERVATION_PREVIEW_CHARS 个字符
pub fn preview(text: &str) -> String {
    if text.chars().count() > OBSERVATION_PREVIEW_CHARS {
        format!(
            "{}...",
            text.chars().take(OBSERVATION_PREVIEW_CHARS).collect::<String>()
        )
    } else {
        text.to_string()
    }
}
