//! 邮件工具：read_email（免审批）/ send_email（需审批）
//!
//! 收件箱内容来自配置；发送只记入 Outbox，不连接真实邮件服务。

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::tools::{parse_args, schema_of, Tool};

/// 返回收件箱中的最新邮件
pub struct ReadEmailTool {
    inbox: String,
}

impl ReadEmailTool {
    pub fn new(inbox: impl Into<String>) -> Self {
        Self {
            inbox: inbox.into(),
        }
    }
}

#[async_trait]
impl Tool for ReadEmailTool {
    fn name(&self) -> &str {
        "read_email"
    }

    fn description(&self) -> &str {
        "Reads the latest email from the inbox."
    }

    async fn execute(&self, _args: Value) -> Result<String, String> {
        Ok(self.inbox.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SentEmail {
    /// 收件人地址
    pub recipient: String,
    pub subject: String,
    pub body: String,
}

/// 已发送邮件记录，SendEmailTool 与调用方共享
#[derive(Clone, Default)]
pub struct Outbox {
    sent: Arc<Mutex<Vec<SentEmail>>>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<SentEmail> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    fn push(&self, email: SentEmail) -> Result<(), String> {
        self.sent
            .lock()
            .map_err(|e| format!("outbox unavailable: {e}"))?
            .push(email);
        Ok(())
    }
}

/// 发送邮件（写入 Outbox）
pub struct SendEmailTool {
    outbox: Outbox,
}

impl SendEmailTool {
    pub fn new(outbox: Outbox) -> Self {
        Self { outbox }
    }
}

#[async_trait]
impl Tool for SendEmailTool {
    fn name(&self) -> &str {
        "send_email"
    }

    fn description(&self) -> &str {
        "Sends an email to the specified recipient."
    }

    fn parameters_schema(&self) -> Value {
        schema_of::<SentEmail>()
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let email: SentEmail = parse_args(args)?;
        if email.recipient.trim().is_empty() {
            return Err("recipient is required".to_string());
        }
        let summary = format!(
            "Email sent to {} with subject '{}' and body '{}'",
            email.recipient, email.subject, email.body
        );
        self.outbox.push(email)?;
        Ok(summary)
    }
}
