//! 工具注册表
//!
//! 所有工具实现 Tool trait（name / description / parameters_schema / execute），注册时附带
//! gated 标志。注册表只在构建引擎前可变，此后由引擎持有、只读。
//! gated 标志属于内部信息，catalog() 交给 Planner 的内容不包含它。

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::EngineError;

/// 工具 trait：名称、描述（供 Planner 理解）、参数 schema、异步执行（args 为 JSON）
#[async_trait]
pub trait Tool: Send + Sync {
    /// 工具名称（Planner 请求中的 tool_name）
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// 参数 JSON Schema；默认无参数
    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {},
            "required": []
        })
    }

    /// 执行工具；Err 中的文本会作为失败结果写回消息日志
    async fn execute(&self, args: Value) -> Result<String, String>;
}

/// 交给 Planner 的工具目录条目
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// 注册表条目
#[derive(Clone)]
pub struct ToolRegistration {
    pub name: String,
    pub input_schema: Value,
    pub tool: Arc<dyn Tool>,
    pub gated: bool,
}

/// 工具注册表：按名称有序存储，catalog 输出顺序稳定
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: BTreeMap<String, ToolRegistration>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册工具；同名已存在时报 DuplicateTool
    pub fn register(&mut self, tool: impl Tool + 'static, gated: bool) -> Result<(), EngineError> {
        self.register_arc(Arc::new(tool), gated)
    }

    pub fn register_arc(&mut self, tool: Arc<dyn Tool>, gated: bool) -> Result<(), EngineError> {
        let name = tool.name().to_string();
        if self.tools.contains_key(&name) {
            return Err(EngineError::DuplicateTool(name));
        }
        let registration = ToolRegistration {
            name: name.clone(),
            input_schema: tool.parameters_schema(),
            tool,
            gated,
        };
        self.tools.insert(name, registration);
        Ok(())
    }

    /// 便捷写法：注册无需审批的工具
    pub fn with_tool(mut self, tool: impl Tool + 'static) -> Result<Self, EngineError> {
        self.register(tool, false)?;
        Ok(self)
    }

    /// 便捷写法：注册需要审批的工具
    pub fn with_gated_tool(mut self, tool: impl Tool + 'static) -> Result<Self, EngineError> {
        self.register(tool, true)?;
        Ok(self)
    }

    pub fn lookup(&self, name: &str) -> Result<&ToolRegistration, EngineError> {
        self.tools
            .get(name)
            .ok_or_else(|| EngineError::UnknownTool(name.to_string()))
    }

    /// Planner 可见的工具目录（不含 gated 标志）
    pub fn catalog(&self) -> Vec<ToolSpec> {
        self.tools
            .values()
            .map(|r| ToolSpec {
                name: r.name.clone(),
                description: r.tool.description().to_string(),
                input_schema: r.input_schema.clone(),
            })
            .collect()
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    /// (name, gated) 快照，供 GatingPolicy 构建
    pub fn gating_flags(&self) -> impl Iterator<Item = (&str, bool)> {
        self.tools.values().map(|r| (r.name.as_str(), r.gated))
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
