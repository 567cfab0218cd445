//! 审批层：审批策略、决策、恢复协议、终端交互

pub mod decision;
pub mod policy;
pub mod prompt;
pub mod resume;

pub use decision::{Decision, Verdict};
pub use policy::{GatingPolicy, Partition};
pub use prompt::{PreviewFn, TerminalPrompt};
pub use resume::{submit, RawDecision, ResumeRequest};
