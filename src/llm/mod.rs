//! LLM 层：客户端抽象与实现（OpenAI 兼容 / Mock），以及按配置选择后端

pub mod mock;
pub mod openai;
pub mod traits;

use std::sync::Arc;

pub use mock::MockLlmClient;
pub use openai::{OpenAiClient, TokenUsage};
pub use traits::{ChatMessage, ChatRole, LlmClient, LlmError};

use crate::config::AppConfig;

/// 根据配置与环境变量选择 LLM 后端：有 API Key 走 OpenAI 兼容端点，否则退回 Mock
pub fn create_llm_from_config(cfg: &AppConfig) -> Arc<dyn LlmClient> {
    let api_key = cfg
        .llm
        .api_key
        .clone()
        .or_else(|| std::env::var("OPENAI_API_KEY").ok());
    let provider = cfg.llm.provider.to_lowercase();

    match api_key {
        Some(key) if provider != "mock" => {
            tracing::info!(model = %cfg.llm.model, "Using OpenAI-compatible LLM");
            Arc::new(OpenAiClient::new(
                cfg.llm.base_url.as_deref(),
                &cfg.llm.model,
                Some(&key),
                cfg.llm.timeouts.request,
            ))
        }
        _ => {
            tracing::warn!("No API key set or provider is mock, using Mock LLM");
            Arc::new(MockLlmClient::new())
        }
    }
}
