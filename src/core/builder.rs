//! 引擎构建器：统一的 Engine 初始化逻辑
//!
//! CLI 与测试共用：注册表、Planner、检查点存储、事件通道各自注入，其余取配置默认值。

use std::sync::Arc;

use crate::config::AppConfig;
use crate::core::{Engine, EngineError};
use crate::memory::{CheckpointStore, InMemoryCheckpointStore};
use crate::react::{EngineEvent, EventSink, Planner};
use crate::tools::{ToolExecutor, ToolRegistry};

const DEFAULT_MAX_STEPS: usize = 20;
const DEFAULT_TOOL_TIMEOUT_SECS: u64 = 30;

/// Engine 构建器
pub struct EngineBuilder {
    registry: ToolRegistry,
    planner: Option<Arc<dyn Planner>>,
    store: Option<Arc<dyn CheckpointStore>>,
    events: EventSink,
    max_steps: usize,
    tool_timeout_secs: u64,
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self {
            registry: ToolRegistry::new(),
            planner: None,
            store: None,
            events: EventSink::none(),
            max_steps: DEFAULT_MAX_STEPS,
            tool_timeout_secs: DEFAULT_TOOL_TIMEOUT_SECS,
        }
    }

    /// 从配置读取步数上限与工具超时
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self::new()
            .max_steps(cfg.engine.max_steps)
            .tool_timeout_secs(cfg.engine.tool_timeout_secs)
    }

    pub fn registry(mut self, registry: ToolRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn planner(mut self, planner: Arc<dyn Planner>) -> Self {
        self.planner = Some(planner);
        self
    }

    /// 未设置时使用内存存储
    pub fn store(mut self, store: Arc<dyn CheckpointStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// 订阅运行事件（CLI 进度显示用）
    pub fn events(mut self, tx: tokio::sync::mpsc::UnboundedSender<EngineEvent>) -> Self {
        self.events = EventSink::new(tx);
        self
    }

    pub fn max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn tool_timeout_secs(mut self, secs: u64) -> Self {
        self.tool_timeout_secs = secs;
        self
    }

    pub fn build(self) -> Result<Engine, EngineError> {
        let planner = self
            .planner
            .ok_or_else(|| EngineError::Config("engine requires a planner".to_string()))?;
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(InMemoryCheckpointStore::new()));
        let executor = ToolExecutor::new(self.registry, self.tool_timeout_secs);
        tracing::info!(
            tools = executor.registry().len(),
            gated = executor.registry().gating_flags().filter(|(_, g)| *g).count(),
            max_steps = self.max_steps,
            "engine built"
        );
        Ok(Engine::new(
            planner,
            executor,
            store,
            self.events,
            self.max_steps,
        ))
    }
}
