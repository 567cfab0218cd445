//! 驱动循环（start 与 resume 共用）
//!
//! Plan -> 拆分（需审批 / 免审批）-> 立即执行免审批调用 -> 有需审批调用则挂起，否则下一轮 Plan；
//! Planner 不再请求工具时完成。每批工具执行完毕都写入 running 检查点，之后 Planner 失败时
//! 重试同一调用从检查点继续，已执行的工具不会再次调用。
//!
//! 工具结果总是按 Planner 的请求顺序进入日志：挂起那一轮的免审批结果先暂存在 RunState，
//! 恢复时与审批结果合并后一起写回。

use std::collections::{HashMap, HashSet};

use crate::approval::GatingPolicy;
use crate::core::{EngineError, RunOutcome, RunState, RunStatus, ToolError};
use crate::memory::{CheckpointStore, Message, ToolCallRequest};
use crate::react::{preview, EngineEvent, EventSink, Planner, PlannerResponse};
use crate::tools::ToolExecutor;

/// 被拒绝调用写回日志的固定前缀
pub const REJECTION_PREFIX: &str = "Rejected by reviewer";

/// 取消运行时为每个挂起请求写回的结果
pub const CANCELLATION_PAYLOAD: &str =
    "Cancelled: the run was abandoned before a decision was made.";

pub fn rejection_payload(tool_name: &str) -> String {
    format!("{REJECTION_PREFIX}: the user declined to run {tool_name}.")
}

pub fn failure_payload(err: &ToolError) -> String {
    format!("Error: {err}")
}

/// 一次驱动所需的依赖
pub struct DriveContext<'a> {
    pub planner: &'a dyn Planner,
    pub executor: &'a ToolExecutor,
    pub policy: &'a GatingPolicy,
    pub store: &'a dyn CheckpointStore,
    pub events: &'a EventSink,
    /// 本次调用最多调用 Planner 的次数
    pub max_steps: usize,
}

/// 执行单个调用，返回 tool 结果消息；工具失败只记入结果，不中断运行
pub async fn execute_call(
    ctx: &DriveContext<'_>,
    thread_id: &str,
    call: &ToolCallRequest,
) -> Result<Message, EngineError> {
    ctx.events.send(EngineEvent::ToolCall {
        thread_id: thread_id.to_string(),
        call_id: call.id.clone(),
        tool: call.tool_name.clone(),
        args: call.args_value(),
    });

    let content = match ctx.executor.invoke(call).await? {
        Ok(output) => {
            ctx.events.send(EngineEvent::Observation {
                thread_id: thread_id.to_string(),
                call_id: call.id.clone(),
                preview: preview(&output),
            });
            output
        }
        Err(err) => {
            tracing::warn!(
                thread_id,
                tool = %call.tool_name,
                error = %err,
                "tool failed, recording failure as result"
            );
            ctx.events.send(EngineEvent::ToolFailure {
                thread_id: thread_id.to_string(),
                call_id: call.id.clone(),
                reason: err.to_string(),
            });
            failure_payload(&err)
        }
    };
    Ok(Message::tool(call.id.clone(), content))
}

/// 拒绝：不调用工具，只生成拒绝标记
pub fn rejection_result(thread_id: &str, call: &ToolCallRequest) -> Message {
    tracing::info!(
        thread_id,
        tool = %call.tool_name,
        call_id = %call.id,
        "tool call rejected by reviewer"
    );
    Message::tool(call.id.clone(), rejection_payload(&call.tool_name))
}

/// 按最近一条 planner 消息的请求顺序写回本轮结果
pub fn append_in_request_order(
    state: &mut RunState,
    results: Vec<Message>,
) -> Result<(), EngineError> {
    let order: Vec<String> = state
        .message_log
        .last_planner_calls()
        .iter()
        .map(|c| c.id.clone())
        .collect();
    let mut by_id: HashMap<String, Message> = results
        .into_iter()
        .map(|m| (m.tool_call_id.clone().unwrap_or_default(), m))
        .collect();
    for id in order {
        if let Some(msg) = by_id.remove(&id) {
            state.message_log.append(msg)?;
        }
    }
    match by_id.into_keys().next() {
        Some(stray) => Err(EngineError::DanglingToolResult(stray)),
        None => Ok(()),
    }
}

/// 写入 running 检查点
pub async fn checkpoint(ctx: &DriveContext<'_>, state: &mut RunState) -> Result<(), EngineError> {
    state.touch();
    ctx.store.save(state).await?;
    tracing::debug!(thread_id = %state.thread_id, status = %state.status, "checkpoint saved");
    Ok(())
}

/// 同一轮内调用 id 必须唯一，工具名不能为空
fn validate_response(response: &PlannerResponse) -> Result<(), EngineError> {
    let mut seen = HashSet::new();
    for call in &response.tool_calls {
        if call.tool_name.trim().is_empty() {
            return Err(EngineError::MalformedPlannerResponse(format!(
                "call {} has an empty tool name",
                call.id
            )));
        }
        if call.id.is_empty() || !seen.insert(call.id.as_str()) {
            return Err(EngineError::MalformedPlannerResponse(format!(
                "duplicate or empty call id '{}'",
                call.id
            )));
        }
    }
    Ok(())
}

/// 运行直到挂起或完成
pub async fn drive_loop(
    ctx: &DriveContext<'_>,
    state: &mut RunState,
) -> Result<RunOutcome, EngineError> {
    debug_assert_eq!(state.status, RunStatus::Running);
    let catalog = ctx.executor.catalog();
    let mut step = 0;

    loop {
        if step >= ctx.max_steps {
            return Err(EngineError::StepLimitExceeded(ctx.max_steps));
        }
        ctx.events.send(EngineEvent::PlannerTurn {
            thread_id: state.thread_id.clone(),
            step,
        });
        tracing::debug!(thread_id = %state.thread_id, step, "planner turn");

        let response = ctx.planner.plan(state.messages(), &catalog).await?;
        validate_response(&response)?;
        step += 1;
        state.turns += 1;

        // 先校验工具名，再落日志：未知工具时本轮不产生任何副作用
        let partition = ctx.policy.partition(&response.tool_calls)?;
        state
            .message_log
            .append(Message::planner(response.content.clone(), response.tool_calls))?;

        if partition.ungated.is_empty() && partition.gated.is_empty() {
            state.status = RunStatus::Completed;
            state.final_text = Some(response.content.clone());
            ctx.events.send(EngineEvent::Completed {
                thread_id: state.thread_id.clone(),
                final_text: response.content.clone(),
            });
            return Ok(RunOutcome::Completed {
                final_text: response.content,
            });
        }

        let mut results = Vec::with_capacity(partition.ungated.len());
        for call in &partition.ungated {
            results.push(execute_call(ctx, &state.thread_id, call).await?);
        }

        if !partition.gated.is_empty() {
            state.deferred_results = results;
            state.resolved_batch.clear();
            state.status = RunStatus::Suspended;
            state.pending_requests = partition.gated.clone();
            ctx.events.send(EngineEvent::Interrupted {
                thread_id: state.thread_id.clone(),
                pending: partition.gated.clone(),
            });
            return Ok(RunOutcome::Suspended {
                pending_requests: partition.gated,
            });
        }

        append_in_request_order(state, results)?;
        checkpoint(ctx, state).await?;
    }
}
