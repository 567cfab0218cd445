//! 审批决策：Verdict / Decision
//!
//! Verdict 是封闭的两值枚举；自由文本（a / yes / N …）只在输入边界通过 FromStr 解析。

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core::{EngineError, Interrupt};

/// 审批结论
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Approve,
    Reject,
}

impl FromStr for Verdict {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "approve" | "a" | "yes" | "y" => Ok(Verdict::Approve),
            "reject" | "r" | "no" | "n" => Ok(Verdict::Reject),
            other => Err(EngineError::InvalidDecision(format!(
                "unrecognized verdict '{other}'"
            ))),
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Verdict::Approve => "approve",
            Verdict::Reject => "reject",
        })
    }
}

/// 针对单个挂起请求的决策
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    pub request_id: String,
    pub verdict: Verdict,
}

impl Decision {
    pub fn new(request_id: impl Into<String>, verdict: Verdict) -> Self {
        Self {
            request_id: request_id.into(),
            verdict,
        }
    }

    pub fn approve(request_id: impl Into<String>) -> Self {
        Self::new(request_id, Verdict::Approve)
    }

    pub fn reject(request_id: impl Into<String>) -> Self {
        Self::new(request_id, Verdict::Reject)
    }

    /// 对整个中断批次给出统一结论
    pub fn all(interrupt: &Interrupt, verdict: Verdict) -> Vec<Decision> {
        interrupt
            .pending_requests
            .iter()
            .map(|r| Decision::new(r.id.clone(), verdict))
            .collect()
    }
}
