//! 集成测试公共设施：脚本化 Planner、计数工具、引擎构建

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use tollgate::core::PlannerError;
use tollgate::memory::{CheckpointStore, InMemoryCheckpointStore, Message, ToolCallRequest};
use tollgate::react::{Planner, PlannerResponse};
use tollgate::tools::{Tool, ToolRegistry, ToolSpec};
use tollgate::{Engine, EngineBuilder};

/// 按脚本依次返回的 Planner；脚本用完后返回最终回复 "done"
#[derive(Default)]
pub struct ScriptedPlanner {
    script: Mutex<VecDeque<Result<PlannerResponse, PlannerError>>>,
    seen: Mutex<Vec<Vec<Message>>>,
    delay: Option<Duration>,
}

impl ScriptedPlanner {
    pub fn new(steps: impl IntoIterator<Item = PlannerResponse>) -> Self {
        Self {
            script: Mutex::new(steps.into_iter().map(Ok).collect()),
            ..Default::default()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn push(&self, step: PlannerResponse) {
        self.script.lock().unwrap().push_back(Ok(step));
    }

    pub fn push_error(&self, err: PlannerError) {
        self.script.lock().unwrap().push_back(Err(err));
    }

    /// 每次 plan 收到的消息日志
    pub fn seen(&self) -> Vec<Vec<Message>> {
        self.seen.lock().unwrap().clone()
    }

    pub fn turns(&self) -> usize {
        self.seen.lock().unwrap().len()
    }
}

#[async_trait]
impl Planner for ScriptedPlanner {
    async fn plan(
        &self,
        messages: &[Message],
        _catalog: &[ToolSpec],
    ) -> Result<PlannerResponse, PlannerError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.seen.lock().unwrap().push(messages.to_vec());
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(PlannerResponse::text("done")))
    }
}

/// 所有 CountingTool 共享的调用顺序记录
pub type CallLog = Arc<Mutex<Vec<String>>>;

pub fn call_log() -> CallLog {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn invocations(log: &CallLog) -> Vec<String> {
    log.lock().unwrap().clone()
}

pub fn count(log: &CallLog, tool: &str) -> usize {
    log.lock().unwrap().iter().filter(|t| *t == tool).count()
}

/// 记录每次调用的工具；可配置为总是失败
pub struct CountingTool {
    name: String,
    log: CallLog,
    failure: Option<String>,
}

impl CountingTool {
    pub fn new(name: &str, log: &CallLog) -> Self {
        Self {
            name: name.to_string(),
            log: log.clone(),
            failure: None,
        }
    }

    pub fn failing(name: &str, log: &CallLog, reason: &str) -> Self {
        Self {
            failure: Some(reason.to_string()),
            ..Self::new(name, log)
        }
    }
}

#[async_trait]
impl Tool for CountingTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Counts invocations."
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        self.log.lock().unwrap().push(self.name.clone());
        match &self.failure {
            Some(reason) => Err(reason.clone()),
            None => Ok(format!("{} ok {}", self.name, args)),
        }
    }
}

pub fn call(id: &str, tool: &str) -> ToolCallRequest {
    ToolCallRequest::new(id, tool, serde_json::json!({}))
}

pub fn calls(list: &[(&str, &str)]) -> PlannerResponse {
    PlannerResponse::calls(list.iter().map(|(id, tool)| call(id, tool)).collect())
}

/// ungated: a, c；gated: b, g
pub fn abc_registry(log: &CallLog) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(CountingTool::new("a", log), false).unwrap();
    registry.register(CountingTool::new("b", log), true).unwrap();
    registry.register(CountingTool::new("c", log), false).unwrap();
    registry.register(CountingTool::new("g", log), true).unwrap();
    registry
}

pub fn memory_store() -> Arc<dyn CheckpointStore> {
    Arc::new(InMemoryCheckpointStore::new())
}

pub fn build_engine(
    registry: ToolRegistry,
    planner: Arc<ScriptedPlanner>,
    store: Arc<dyn CheckpointStore>,
) -> Engine {
    EngineBuilder::new()
        .registry(registry)
        .planner(planner)
        .store(store)
        .max_steps(10)
        .tool_timeout_secs(5)
        .build()
        .unwrap()
}
