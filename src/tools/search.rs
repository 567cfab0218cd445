//! Web 搜索工具（Tavily HTTP API）
//!
//! POST {endpoint}，Bearer 鉴权；结果整理为 `title - url\ncontent` 列表。
//! API Key 取自配置，未配置时读 TAVILY_API_KEY；都没有时调用失败（作为工具错误写回）。

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;

use crate::config::SearchSection;
use crate::tools::{parse_args, schema_of, Tool};

#[derive(Deserialize, JsonSchema)]
struct SearchArgs {
    /// 搜索关键词
    query: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    answer: Option<String>,
    #[serde(default)]
    results: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    content: String,
}

/// web_search 工具
pub struct WebSearchTool {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
    max_results: usize,
}

impl WebSearchTool {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: Option<String>,
        max_results: usize,
        timeout_secs: u64,
    ) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs.max(1)))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            endpoint: endpoint.into(),
            api_key,
            max_results: max_results.max(1),
        }
    }

    pub fn from_config(cfg: &SearchSection) -> Self {
        let api_key = cfg
            .api_key
            .clone()
            .or_else(|| std::env::var("TAVILY_API_KEY").ok())
            .filter(|k| !k.trim().is_empty());
        Self::new(cfg.endpoint.clone(), api_key, cfg.max_results, cfg.timeout_secs)
    }
}

fn format_response(resp: &SearchResponse) -> String {
    let mut out = String::new();
    if let Some(answer) = resp.answer.as_deref().filter(|a| !a.is_empty()) {
        out.push_str(&format!("Answer: {answer}\n\n"));
    }
    if resp.results.is_empty() {
        out.push_str("No results.");
    }
    for (i, hit) in resp.results.iter().enumerate() {
        out.push_str(&format!("{}. {} - {}\n{}\n\n", i + 1, hit.title, hit.url, hit.content));
    }
    out.trim_end().to_string()
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Search the web for information."
    }

    fn parameters_schema(&self) -> Value {
        schema_of::<SearchArgs>()
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let SearchArgs { query } = parse_args(args)?;
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| "web search is not configured (set TAVILY_API_KEY)".to_string())?;

        let resp = self
            .client
            .post(&self.endpoint)
            .bearer_auth(api_key)
            .json(&serde_json::json!({
                "query": query,
                "max_results": self.max_results,
            }))
            .send()
            .await
            .map_err(|e| format!("search request failed: {e}"))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(format!("search failed with {status}: {body}"));
        }
        let parsed: SearchResponse = resp
            .json()
            .await
            .map_err(|e| format!("invalid search response: {e}"))?;
        Ok(format_response(&parsed))
    }
}
