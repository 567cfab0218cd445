//! Planner：外部推理组件的契约与基于 LLM 的实现
//!
//! Planner 给定完整消息日志与工具目录，返回最终回复或一组工具调用。LlmPlanner 把日志翻译成
//! Chat 消息调用 LLM，再用 parse_llm_output 从回复文本中提取 JSON 工具调用。

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::PlannerError;
use crate::llm::{ChatMessage, LlmClient};
use crate::memory::{Message, Role, ToolCallRequest};
use crate::tools::ToolSpec;

/// Planner 单轮输出；tool_calls 为空即为最终回复
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlannerResponse {
    pub content: String,
    #[serde(default)]
    pub tool_calls: Vec<ToolCallRequest>,
}

impl PlannerResponse {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            tool_calls: Vec::new(),
        }
    }

    pub fn calls(tool_calls: Vec<ToolCallRequest>) -> Self {
        Self {
            content: String::new(),
            tool_calls,
        }
    }
}

/// Planner 契约
#[async_trait]
pub trait Planner: Send + Sync {
    async fn plan(
        &self,
        messages: &[Message],
        catalog: &[ToolSpec],
    ) -> Result<PlannerResponse, PlannerError>;
}

/// LLM 回复中的单个工具调用（{"id"?, "tool", "args"}）
#[derive(Debug, Deserialize)]
struct RawToolCall {
    #[serde(default)]
    id: Option<String>,
    tool: String,
    #[serde(default)]
    args: serde_json::Value,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawReply {
    Batch { tool_calls: Vec<RawToolCall> },
    Single(RawToolCall),
}

/// 以 { 开头或含 ```json 代码块的回复视为工具调用，返回（说明文字, JSON）；否则为最终回复
fn extract_json(text: &str) -> Option<(&str, &str)> {
    if let Some(start) = text.find("```json") {
        let rest = &text[start + 7..];
        let body = rest.find("```").map(|end| &rest[..end]).unwrap_or(rest);
        return Some((text[..start].trim(), body.trim()));
    }
    text.starts_with('{').then_some(("", text))
}

/// 解析 LLM 输出：JSON 工具调用解析为调用列表，否则整段为最终回复；JSON 不完整报 Malformed
pub fn parse_llm_output(output: &str) -> Result<PlannerResponse, PlannerError> {
    let trimmed = output.trim();
    let Some((preamble, json_str)) = extract_json(trimmed) else {
        return Ok(PlannerResponse::text(trimmed));
    };

    let raw: RawReply = serde_json::from_str(json_str)
        .map_err(|e| PlannerError::Malformed(format!("{e}: {json_str}")))?;
    let raw_calls = match raw {
        RawReply::Batch { tool_calls } => tool_calls,
        RawReply::Single(call) => vec![call],
    };

    // 工具名为空的调用原样保留，由驱动循环统一校验
    let tool_calls = raw_calls
        .into_iter()
        .map(|c| {
            let id = c
                .id
                .filter(|id| !id.is_empty())
                .unwrap_or_else(|| format!("call_{}", uuid::Uuid::new_v4().simple()));
            ToolCallRequest::new(id, c.tool, c.args)
        })
        .collect::<Vec<_>>();

    if tool_calls.is_empty() {
        return Ok(PlannerResponse::text(preamble));
    }
    Ok(PlannerResponse {
        content: preamble.to_string(),
        tool_calls,
    })
}

/// 回复协议说明，拼在 system prompt 末尾
pub const REPLY_PROTOCOL: &str = "\
To call tools, reply with ONLY a JSON object of the form \
{\"tool_calls\": [{\"tool\": \"<tool name>\", \"args\": {...}}]}. \
You may request several tools in one reply. \
When you have the final answer, reply with plain text that does not start with \"{\". \
A tool result starting with \"Rejected by reviewer\" means a human declined that action: \
do not retry it.";

/// 基于 LlmClient 的 Planner
pub struct LlmPlanner {
    llm: Arc<dyn LlmClient>,
    system_prompt: String,
}

impl LlmPlanner {
    pub fn new(llm: Arc<dyn LlmClient>, system_prompt: impl Into<String>) -> Self {
        Self {
            llm,
            system_prompt: system_prompt.into(),
        }
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    pub fn token_usage(&self) -> (u64, u64, u64) {
        self.llm.token_usage()
    }

    fn build_system(&self, catalog: &[ToolSpec]) -> String {
        let tools = serde_json::to_string_pretty(catalog).unwrap_or_else(|_| "[]".to_string());
        format!(
            "{}\n\nAvailable tools:\n{}\n\n{}",
            self.system_prompt, tools, REPLY_PROTOCOL
        )
    }

    /// 消息日志 -> Chat 消息：planner 消息带上其工具调用 JSON，tool 结果作为 Observation
    fn to_chat_messages(messages: &[Message]) -> Vec<ChatMessage> {
        messages
            .iter()
            .map(|m| match m.role {
                Role::User => ChatMessage::user(m.content.clone()),
                Role::Planner if m.tool_calls.is_empty() => {
                    ChatMessage::assistant(m.content.clone())
                }
                Role::Planner => {
                    let calls: Vec<serde_json::Value> = m
                        .tool_calls
                        .iter()
                        .map(|c| {
                            serde_json::json!({
                                "id": c.id,
                                "tool": c.tool_name,
                                "args": c.args_value(),
                            })
                        })
                        .collect();
                    let json = serde_json::json!({ "tool_calls": calls }).to_string();
                    if m.content.is_empty() {
                        ChatMessage::assistant(json)
                    } else {
                        ChatMessage::assistant(format!("{}\n{}", m.content, json))
                    }
                }
                Role::Tool => ChatMessage::user(format!(
                    "Observation [{}]: {}",
                    m.tool_call_id.as_deref().unwrap_or("?"),
                    m.content
                )),
            })
            .collect()
    }
}

#[async_trait]
impl Planner for LlmPlanner {
    async fn plan(
        &self,
        messages: &[Message],
        catalog: &[ToolSpec],
    ) -> Result<PlannerResponse, PlannerError> {
        let mut full = vec![ChatMessage::system(self.build_system(catalog))];
        full.extend(Self::to_chat_messages(messages));
        let output = self.llm.complete(&full).await?;
        parse_llm_output(&output)
    }
}
