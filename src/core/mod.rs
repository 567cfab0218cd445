//! 核心层：错误、运行状态、线程锁、执行引擎与构建器

pub mod builder;
pub mod error;
pub mod orchestrator;
pub mod state;
pub mod thread_lock;

pub use builder::EngineBuilder;
pub use error::{EngineError, PlannerError, ToolError};
pub use orchestrator::Engine;
pub use state::{Interrupt, RunOutcome, RunState, RunStatus};
pub use thread_lock::{ThreadGuard, ThreadLocks};
