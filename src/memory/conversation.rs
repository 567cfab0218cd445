//! 消息日志：对话的有序、只追加记录
//!
//! 每轮都会把完整日志原样回放给 Planner，因此顺序有意义；追加后消息不可变。
//! tool 结果必须引用此前某条 planner 消息中出现过的调用 id，append 时校验。

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::core::EngineError;

/// 消息角色
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Planner,
    Tool,
}

/// Planner 请求的一次工具调用；创建后不再修改
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// 轮内唯一
    pub id: String,
    pub tool_name: String,
    /// 参数名 -> 值（JSON 对象）
    #[serde(default)]
    pub arguments: serde_json::Map<String, serde_json::Value>,
}

impl ToolCallRequest {
    pub fn new(
        id: impl Into<String>,
        tool_name: impl Into<String>,
        arguments: serde_json::Value,
    ) -> Self {
        let arguments = match arguments {
            serde_json::Value::Object(map) => map,
            _ => serde_json::Map::new(),
        };
        Self {
            id: id.into(),
            tool_name: tool_name.into(),
            arguments,
        }
    }

    /// 参数作为 JSON Value（交给 Tool::execute）
    pub fn args_value(&self) -> serde_json::Value {
        serde_json::Value::Object(self.arguments.clone())
    }
}

/// 单条消息
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallRequest>,
    /// 仅 role=tool 时存在
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn planner(content: impl Into<String>, tool_calls: Vec<ToolCallRequest>) -> Self {
        Self {
            role: Role::Planner,
            content: content.into(),
            tool_calls,
            tool_call_id: None,
        }
    }

    pub fn tool(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: Some(tool_call_id.into()),
        }
    }
}

/// 只追加的消息日志
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageLog {
    messages: Vec<Message>,
}

impl MessageLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加一条消息；tool 结果若引用未知调用 id 则拒绝
    pub fn append(&mut self, msg: Message) -> Result<(), EngineError> {
        if msg.role == Role::Tool {
            let id = msg.tool_call_id.as_deref().unwrap_or("");
            if !self.has_call(id) {
                return Err(EngineError::DanglingToolResult(id.to_string()));
            }
        }
        self.messages.push(msg);
        Ok(())
    }

    /// 日志中是否有 planner 消息发起过该调用
    pub fn has_call(&self, call_id: &str) -> bool {
        self.messages
            .iter()
            .filter(|m| m.role == Role::Planner)
            .any(|m| m.tool_calls.iter().any(|c| c.id == call_id))
    }

    /// 尚无 tool 结果的调用 id（按出现顺序）
    pub fn unanswered_calls(&self) -> Vec<String> {
        let answered: HashSet<&str> = self
            .messages
            .iter()
            .filter_map(|m| m.tool_call_id.as_deref())
            .collect();
        self.messages
            .iter()
            .flat_map(|m| m.tool_calls.iter())
            .filter(|c| !answered.contains(c.id.as_str()))
            .map(|c| c.id.clone())
            .collect()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// 最近一条 planner 消息发起的调用；没有则为空
    pub fn last_planner_calls(&self) -> &[ToolCallRequest] {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::Planner)
            .map(|m| m.tool_calls.as_slice())
            .unwrap_or(&[])
    }

    /// 某个调用的 tool 结果（取第一条）
    pub fn result_for(&self, call_id: &str) -> Option<&Message> {
        self.messages
            .iter()
            .find(|m| m.tool_call_id.as_deref() == Some(call_id))
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn call(id: &str) -> ToolCallRequest {
        ToolCallRequest::new(id, "read_email", json!({}))
    }

    #[test]
    fn test_append_keeps_order() {
        let mut log = MessageLog::new();
        log.append(Message::user("hi")).unwrap();
        log.append(Message::planner("", vec![call("c1"), call("c2")])).unwrap();
        log.append(Message::tool("c2", "second")).unwrap();
        log.append(Message::tool("c1", "first")).unwrap();

        let roles: Vec<Role> = log.messages().iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::User, Role::Planner, Role::Tool, Role::Tool]);
        assert_eq!(log.messages()[2].content, "second");
    }

    #[test]
    fn test_dangling_tool_result_rejected() {
        let mut log = MessageLog::new();
        log.append(Message::user("hi")).unwrap();
        let err = log.append(Message::tool("nope", "x")).unwrap_err();
        assert!(matches!(err, EngineError::DanglingToolResult(id) if id == "nope"));
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn test_unanswered_calls() {
        let mut log = MessageLog::new();
        log.append(Message::planner("", vec![call("a"), call("b"), call("c")]))
            .unwrap();
        log.append(Message::tool("b", "ok")).unwrap();
        assert_eq!(log.unanswered_calls(), vec!["a".to_string(), "c".to_string()]);
    }

    #[test]
    fn test_last_planner_calls() {
        let mut log = MessageLog::new();
        assert!(log.last_planner_calls().is_empty());
        log.append(Message::planner("", vec![call("a")])).unwrap();
        log.append(Message::tool("a", "ok")).unwrap();
        log.append(Message::planner("", vec![call("b"), call("c")]))
            .unwrap();
        let ids: Vec<&str> = log.last_planner_calls().iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c"]);
    }

    #[test]
    fn test_non_object_arguments_become_empty_map() {
        let c = ToolCallRequest::new("x", "t", json!("oops"));
        assert!(c.arguments.is_empty());
        assert_eq!(c.args_value(), json!({}));
    }

    #[test]
    fn test_serde_shape() {
        let mut log = MessageLog::new();
        log.append(Message::user("hi")).unwrap();
        let v = serde_json::to_value(&log).unwrap();
        assert_eq!(v, json!([{"role": "user", "content": "hi"}]));
    }
}
