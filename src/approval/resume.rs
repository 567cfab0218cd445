//! 恢复协议：外部（JSON / 终端）决策批次 -> Engine::resume
//!
//! verdict 在这里从自由文本解析为 Verdict；解析失败或批次为空时直接报错，不触碰运行状态。

use serde::{Deserialize, Serialize};

use crate::approval::{Decision, Verdict};
use crate::core::{Engine, EngineError, RunOutcome};

/// 未解析的单条决策
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawDecision {
    pub request_id: String,
    pub verdict: String,
}

/// 一次恢复请求：线程 id + 针对当前挂起批次的全部决策
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResumeRequest {
    pub thread_id: String,
    pub decisions: Vec<RawDecision>,
}

impl ResumeRequest {
    /// 解析全部 verdict
    pub fn parse(&self) -> Result<Vec<Decision>, EngineError> {
        if self.decisions.is_empty() {
            return Err(EngineError::InvalidDecision(
                "empty decision batch".to_string(),
            ));
        }
        self.decisions
            .iter()
            .map(|raw| {
                let verdict: Verdict = raw.verdict.parse()?;
                Ok(Decision::new(raw.request_id.clone(), verdict))
            })
            .collect()
    }
}

/// 校验并提交决策批次
pub async fn submit(engine: &Engine, request: ResumeRequest) -> Result<RunOutcome, EngineError> {
    let decisions = request.parse()?;
    engine.resume(&request.thread_id, &decisions).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_from_json() {
        let req: ResumeRequest = serde_json::from_value(json!({
            "thread_id": "t1",
            "decisions": [
                {"request_id": "c1", "verdict": "Approve"},
                {"request_id": "c2", "verdict": "n"}
            ]
        }))
        .unwrap();
        let decisions = req.parse().unwrap();
        assert_eq!(
            decisions,
            vec![Decision::approve("c1"), Decision::reject("c2")]
        );
    }

    #[test]
    fn test_empty_and_unknown_verdict() {
        let empty = ResumeRequest {
            thread_id: "t1".into(),
            decisions: vec![],
        };
        assert!(matches!(
            empty.parse(),
            Err(EngineError::InvalidDecision(m)) if m == "empty decision batch"
        ));

        let bad = ResumeRequest {
            thread_id: "t1".into(),
            decisions: vec![RawDecision {
                request_id: "c1".into(),
                verdict: "maybe".into(),
            }],
        };
        assert!(matches!(bad.parse(), Err(EngineError::InvalidDecision(_))));
    }
}
