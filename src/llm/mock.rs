//! Mock LLM 客户端（用于测试与离线演示，无需 API）
//!
//! 按顺序返回预设回复；脚本耗尽后回复固定的结束语。每次调用收到的消息会被记录，便于断言。

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::{ChatMessage, LlmClient, LlmError};

/// 脚本耗尽后的默认回复
pub const MOCK_FALLBACK_REPLY: &str = "Done. (mock planner has no further steps)";

/// Mock 客户端：依次吐出脚本中的回复
#[derive(Debug, Default)]
pub struct MockLlmClient {
    replies: Mutex<VecDeque<Result<String, LlmError>>>,
    calls: Mutex<Vec<Vec<ChatMessage>>>,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_replies<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let client = Self::new();
        for r in replies {
            client.push_reply(r);
        }
        client
    }

    pub fn push_reply(&self, reply: impl Into<String>) {
        if let Ok(mut q) = self.replies.lock() {
            q.push_back(Ok(reply.into()));
        }
    }

    /// 追加一次失败（模拟网络/接口错误）
    pub fn push_error(&self, err: LlmError) {
        if let Ok(mut q) = self.replies.lock() {
            q.push_back(Err(err));
        }
    }

    /// 已收到的全部请求
    pub fn calls(&self) -> Vec<Vec<ChatMessage>> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, LlmError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(messages.to_vec());
        }
        let next = self
            .replies
            .lock()
            .map_err(|e| LlmError::Api(e.to_string()))?
            .pop_front();
        next.unwrap_or_else(|| Ok(MOCK_FALLBACK_REPLY.to_string()))
    }
}
