//! Tollgate - 可中断的工具调用 Agent 引擎
//!
//! 模块划分：
//! - **agent**: 示例 Agent（email / sql / notes）的工具集与提示词
//! - **approval**: 审批策略、决策、恢复协议、终端审批交互
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误、运行状态、线程锁、执行引擎（start / resume / cancel）
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / Mock）
//! - **memory**: 消息日志与检查点存储（内存 / 文件 / SQLite）
//! - **observability**: tracing 初始化
//! - **react**: Planner、驱动循环、过程事件
//! - **tools**: Tool trait、注册表、执行器与示例工具

pub mod agent;
pub mod approval;
pub mod config;
pub mod core;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod react;
pub mod tools;

pub use crate::approval::{Decision, Verdict};
pub use crate::core::{Engine, EngineBuilder, EngineError, RunOutcome, RunState, RunStatus};
