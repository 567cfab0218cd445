//! 执行引擎：start / resume / cancel 的入口
//!
//! 每次调用：取线程锁 -> 从检查点存储加载（或新建）RunState -> 在副本上推进驱动循环 ->
//! 挂起或完成时写回。每批工具执行后立即写入 running 检查点：之后的 Planner 错误只回滚到
//! 该检查点，重试同一 start / resume 会从这里继续，已执行的工具不会再次调用。

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::approval::{Decision, GatingPolicy, Verdict};
use crate::core::{EngineError, Interrupt, RunOutcome, RunState, RunStatus, ThreadLocks};
use crate::memory::{CheckpointStore, Message, Role};
use crate::react::{
    append_in_request_order, checkpoint, drive_loop, execute_call, rejection_result,
    DriveContext, EngineEvent, EventSink, Planner, CANCELLATION_PAYLOAD,
};
use crate::tools::{ToolExecutor, ToolSpec};

/// 可中断执行引擎；以 Arc<Engine> 在多个任务间共享
pub struct Engine {
    planner: Arc<dyn Planner>,
    executor: ToolExecutor,
    policy: GatingPolicy,
    store: Arc<dyn CheckpointStore>,
    locks: ThreadLocks,
    events: EventSink,
    max_steps: usize,
}

impl Engine {
    pub(crate) fn new(
        planner: Arc<dyn Planner>,
        executor: ToolExecutor,
        store: Arc<dyn CheckpointStore>,
        events: EventSink,
        max_steps: usize,
    ) -> Self {
        let policy = GatingPolicy::from_registry(executor.registry());
        Self {
            planner,
            executor,
            policy,
            store,
            locks: ThreadLocks::new(),
            events,
            max_steps: max_steps.max(1),
        }
    }

    fn drive_context(&self) -> DriveContext<'_> {
        DriveContext {
            planner: self.planner.as_ref(),
            executor: &self.executor,
            policy: &self.policy,
            store: self.store.as_ref(),
            events: &self.events,
            max_steps: self.max_steps,
        }
    }

    pub fn catalog(&self) -> Vec<ToolSpec> {
        self.executor.catalog()
    }

    pub fn policy(&self) -> &GatingPolicy {
        &self.policy
    }

    /// 当前登记了线程锁的 thread_id 数；没有调用在途时为 0
    pub fn active_threads(&self) -> usize {
        self.locks.len()
    }

    /// 为新线程开始一次运行；同一条消息重试被中断的 start 时从 running 检查点继续
    pub async fn start(&self, thread_id: &str, user_text: &str) -> Result<RunOutcome, EngineError> {
        if thread_id.trim().is_empty() {
            return Err(EngineError::InvalidThreadId(
                "thread id cannot be empty".to_string(),
            ));
        }
        let _guard = self.locks.acquire(thread_id).await;
        let mut state = match self.store.load(thread_id).await {
            Err(EngineError::UnknownThread(_)) => {
                tracing::info!(thread_id, "run started");
                let mut state = RunState::new(thread_id);
                state.message_log.append(Message::user(user_text))?;
                state
            }
            Ok(existing) if interrupted_start(&existing, user_text) => {
                tracing::info!(thread_id, "continuing interrupted run from checkpoint");
                existing
            }
            Ok(_) => return Err(EngineError::DuplicateRun(thread_id.to_string())),
            Err(e) => return Err(e),
        };

        let outcome = drive_loop(&self.drive_context(), &mut state).await?;
        self.persist(&mut state, &outcome).await?;
        Ok(outcome)
    }

    /// 对挂起的整批请求应用决策并继续运行
    ///
    /// 若上一次 resume 在决策已执行后失败（检查点为 running），以同一批决策重试会直接继续
    /// 驱动循环，不再执行任何工具。
    pub async fn resume(
        &self,
        thread_id: &str,
        decisions: &[Decision],
    ) -> Result<RunOutcome, EngineError> {
        let _guard = self.locks.acquire(thread_id).await;
        let mut state = self.store.load(thread_id).await?;
        let ctx = self.drive_context();

        match state.status {
            RunStatus::Suspended => self.apply_decisions(&ctx, &mut state, decisions).await?,
            RunStatus::Running => {
                match_decisions(&state.resolved_batch, decisions)?;
                tracing::info!(thread_id, "continuing interrupted run from checkpoint");
            }
            RunStatus::Completed => {
                return Err(EngineError::NotSuspended {
                    thread_id: thread_id.to_string(),
                    status: state.status,
                })
            }
        }

        let outcome = drive_loop(&ctx, &mut state).await?;
        self.persist(&mut state, &outcome).await?;
        Ok(outcome)
    }

    /// 执行批准、记录拒绝，按请求顺序写回整轮结果后保存 running 检查点
    async fn apply_decisions(
        &self,
        ctx: &DriveContext<'_>,
        state: &mut RunState,
        decisions: &[Decision],
    ) -> Result<(), EngineError> {
        let expected: Vec<String> = state.pending_requests.iter().map(|r| r.id.clone()).collect();
        let verdicts = match_decisions(&expected, decisions)?;

        let thread_id = state.thread_id.clone();
        let pending = std::mem::take(&mut state.pending_requests);
        let mut results = std::mem::take(&mut state.deferred_results);
        let (mut approved, mut rejected) = (0, 0);
        for request in &pending {
            match verdicts[request.id.as_str()] {
                Verdict::Approve => {
                    approved += 1;
                    results.push(execute_call(ctx, &thread_id, request).await?);
                }
                Verdict::Reject => {
                    rejected += 1;
                    results.push(rejection_result(&thread_id, request));
                }
            }
        }
        append_in_request_order(state, results)?;
        state.resolved_batch = expected;
        state.status = RunStatus::Running;
        checkpoint(ctx, state).await?;

        tracing::info!(thread_id = %thread_id, approved, rejected, "run resumed");
        self.events.send(EngineEvent::Resumed {
            thread_id,
            approved,
            rejected,
        });
        Ok(())
    }

    /// 放弃挂起的运行：每个挂起请求写回取消结果，状态转为 completed
    pub async fn cancel(&self, thread_id: &str) -> Result<RunOutcome, EngineError> {
        let _guard = self.locks.acquire(thread_id).await;
        let mut state = self.load_suspended(thread_id).await?;

        let mut results = std::mem::take(&mut state.deferred_results);
        for request in std::mem::take(&mut state.pending_requests) {
            results.push(Message::tool(request.id, CANCELLATION_PAYLOAD));
        }
        append_in_request_order(&mut state, results)?;
        state.status = RunStatus::Completed;
        state.cancelled = true;
        state.final_text = Some(CANCELLATION_PAYLOAD.to_string());
        state.touch();
        self.store.save(&state).await?;

        tracing::info!(thread_id, "run cancelled");
        self.events.send(EngineEvent::Cancelled {
            thread_id: thread_id.to_string(),
        });
        Ok(RunOutcome::Completed {
            final_text: CANCELLATION_PAYLOAD.to_string(),
        })
    }

    /// 只读快照
    pub async fn state(&self, thread_id: &str) -> Result<RunState, EngineError> {
        self.store.load(thread_id).await
    }

    /// 当前中断；运行未挂起时为 None
    pub async fn interrupt(&self, thread_id: &str) -> Result<Option<Interrupt>, EngineError> {
        Ok(self.store.load(thread_id).await?.interrupt())
    }

    /// 释放线程的检查点（任何状态）；之后可用同一 id 重新 start
    pub async fn release(&self, thread_id: &str) -> Result<(), EngineError> {
        let _guard = self.locks.acquire(thread_id).await;
        self.store.delete(thread_id).await?;
        tracing::info!(thread_id, "run released");
        Ok(())
    }

    async fn load_suspended(&self, thread_id: &str) -> Result<RunState, EngineError> {
        let state = self.store.load(thread_id).await?;
        if state.status != RunStatus::Suspended {
            return Err(EngineError::NotSuspended {
                thread_id: thread_id.to_string(),
                status: state.status,
            });
        }
        Ok(state)
    }

    async fn persist(&self, state: &mut RunState, outcome: &RunOutcome) -> Result<(), EngineError> {
        state.touch();
        self.store.save(state).await?;
        match outcome {
            RunOutcome::Completed { .. } => {
                tracing::info!(thread_id = %state.thread_id, turns = state.turns, "run completed")
            }
            RunOutcome::Suspended { pending_requests } => tracing::info!(
                thread_id = %state.thread_id,
                pending = pending_requests.len(),
                "run suspended awaiting decisions"
            ),
        }
        Ok(())
    }
}

/// running 检查点且首条用户消息相同：视为对同一次 start 的重试
fn interrupted_start(state: &RunState, user_text: &str) -> bool {
    state.status == RunStatus::Running
        && state
            .messages()
            .first()
            .is_some_and(|m| m.role == Role::User && m.content == user_text)
}

/// 决策批次必须与期望的请求 id 一一对应（不多、不少、不重复）
fn match_decisions<'a>(
    expected: &[String],
    decisions: &'a [Decision],
) -> Result<HashMap<&'a str, Verdict>, EngineError> {
    let expected_ids: HashSet<&str> = expected.iter().map(String::as_str).collect();
    let verdicts: HashMap<&str, Verdict> = decisions
        .iter()
        .map(|d| (d.request_id.as_str(), d.verdict))
        .collect();

    let exact = decisions.len() == expected_ids.len()
        && verdicts.len() == decisions.len()
        && verdicts.keys().all(|id| expected_ids.contains(id));
    if !exact {
        return Err(EngineError::DecisionMismatch {
            expected: expected.to_vec(),
            received: decisions.iter().map(|d| d.request_id.clone()).collect(),
        });
    }
    Ok(verdicts)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|id| id.to_string()).collect()
    }

    #[test]
    fn test_match_exact_batch() {
        let decisions = [Decision::reject("b"), Decision::approve("a")];
        let v = match_decisions(&ids(&["a", "b"]), &decisions).unwrap();
        assert_eq!(v["a"], Verdict::Approve);
        assert_eq!(v["b"], Verdict::Reject);
    }

    #[test]
    fn test_match_rejects_partial_extra_and_duplicate() {
        let expected = ids(&["a", "b"]);
        let cases: Vec<Vec<Decision>> = vec![
            vec![Decision::approve("a")],
            vec![
                Decision::approve("a"),
                Decision::approve("b"),
                Decision::approve("c"),
            ],
            vec![Decision::approve("a"), Decision::reject("a")],
            vec![Decision::approve("a"), Decision::approve("z")],
            vec![],
        ];
        for decisions in cases {
            assert!(matches!(
                match_decisions(&expected, &decisions),
                Err(EngineError::DecisionMismatch { .. })
            ));
        }
    }

    #[test]
    fn test_empty_batch_matches_nothing_pending() {
        assert!(match_decisions(&[], &[]).unwrap().is_empty());
        assert!(match_decisions(&[], &[Decision::approve("a")]).is_err());
    }

    #[test]
    fn test_interrupted_start_requires_same_message() {
        let mut state = RunState::new("t1");
        state.message_log.append(Message::user("go")).unwrap();
        assert!(interrupted_start(&state, "go"));
        assert!(!interrupted_start(&state, "something else"));

        state.status = RunStatus::Completed;
        assert!(!interrupted_start(&state, "go"));
    }
}
