//! 认知层：Planner、驱动循环、过程事件

pub mod events;
pub mod loop_;
pub mod planner;

pub use events::{preview, EngineEvent, EventSink, OBSERVATION_PREVIEW_CHARS};
pub use loop_::{
    append_in_request_order, checkpoint, drive_loop, execute_call, failure_payload,
    rejection_payload, rejection_result, DriveContext, CANCELLATION_PAYLOAD, REJECTION_PREFIX,
};
pub use planner::{parse_llm_output, LlmPlanner, Planner, PlannerResponse, REPLY_PROTOCOL};
