//! 终端审批交互
//!
//! 对中断里的每个挂起请求：打印工具名、参数（可附带预览，如 SQL 写操作影响的行），
//! 读取一行决策，无法识别时重新提示。输入输出为泛型 BufRead / Write，便于测试。

use std::io::{self, BufRead, Write};

use crate::approval::{Decision, Verdict};
use crate::core::Interrupt;
use crate::memory::ToolCallRequest;

const RULE_WIDTH: usize = 80;

/// 挂起请求的附加说明（返回 None 表示不展示）
pub type PreviewFn = Box<dyn Fn(&ToolCallRequest) -> Option<String> + Send + Sync>;

pub struct TerminalPrompt<R, W> {
    input: R,
    output: W,
    preview: Option<PreviewFn>,
}

impl<R: BufRead, W: Write> TerminalPrompt<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self {
            input,
            output,
            preview: None,
        }
    }

    pub fn with_preview(mut self, preview: PreviewFn) -> Self {
        self.preview = Some(preview);
        self
    }

    /// 为整批挂起请求收集决策；输入提前结束时报 UnexpectedEof
    pub fn decide(&mut self, interrupt: &Interrupt) -> io::Result<Vec<Decision>> {
        let mut decisions = Vec::with_capacity(interrupt.pending_requests.len());
        for request in &interrupt.pending_requests {
            self.render(request)?;
            let verdict = self.read_verdict()?;
            let label = match verdict {
                Verdict::Approve => "approved, executing",
                Verdict::Reject => "rejected",
            };
            writeln!(self.output, "\n{} {label}\n", request.tool_name)?;
            decisions.push(Decision::new(request.id.clone(), verdict));
        }
        Ok(decisions)
    }

    fn render(&mut self, request: &ToolCallRequest) -> io::Result<()> {
        let rule = "=".repeat(RULE_WIDTH);
        let args = serde_json::to_string_pretty(&request.arguments)
            .unwrap_or_else(|_| "{}".to_string());
        writeln!(self.output, "\n{rule}")?;
        writeln!(
            self.output,
            "APPROVAL REQUIRED - {} ({})",
            request.tool_name, request.id
        )?;
        writeln!(self.output, "{rule}")?;
        writeln!(self.output, "Arguments:\n{args}")?;
        if let Some(text) = self.preview.as_ref().and_then(|f| f(request)) {
            writeln!(self.output, "{rule}")?;
            writeln!(self.output, "{text}")?;
        }
        writeln!(self.output, "{rule}")?;
        writeln!(self.output, "\nOptions:")?;
        writeln!(self.output, "  [a] Approve  - Run the tool")?;
        writeln!(self.output, "  [r] Reject   - Skip it and let the agent continue")?;
        Ok(())
    }

    fn read_verdict(&mut self) -> io::Result<Verdict> {
        loop {
            write!(self.output, "\nYour decision: ")?;
            self.output.flush()?;
            let mut line = String::new();
            if self.input.read_line(&mut line)? == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "input closed before a decision was made",
                ));
            }
            match line.parse::<Verdict>() {
                Ok(verdict) => return Ok(verdict),
                Err(_) => writeln!(
                    self.output,
                    "Invalid input. Please choose: [a]pprove or [r]eject"
                )?,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Cursor;

    fn interrupt() -> Interrupt {
        Interrupt {
            thread_id: "t1".into(),
            pending_requests: vec![
                ToolCallRequest::new("c1", "send_email", json!({"recipient": "mark@domena.com"})),
                ToolCallRequest::new(
                    "c2",
                    "execute_write_query",
                    json!({"query": "DELETE FROM t"}),
                ),
            ],
        }
    }

    #[test]
    fn test_reprompts_on_invalid_input() {
        let input = Cursor::new("maybe\nyes\n  R \n");
        let mut out = Vec::new();
        let decisions = TerminalPrompt::new(input, &mut out)
            .decide(&interrupt())
            .unwrap();
        assert_eq!(decisions, vec![Decision::approve("c1"), Decision::reject("c2")]);

        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("APPROVAL REQUIRED - send_email (c1)"));
        assert!(text.contains("mark@domena.com"));
        assert_eq!(
            text.matches("Invalid input. Please choose: [a]pprove or [r]eject").count(),
            1
        );
    }

    #[test]
    fn test_preview_is_rendered() {
        let input = Cursor::new("a\na\n");
        let mut out = Vec::new();
        TerminalPrompt::new(input, &mut out)
            .with_preview(Box::new(|req: &ToolCallRequest| {
                (req.tool_name == "execute_write_query")
                    .then(|| "Rows that will be deleted: 3".to_string())
            }))
            .decide(&interrupt())
            .unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.matches("Rows that will be deleted: 3").count(), 1);
    }

    #[test]
    fn test_eof_is_an_error() {
        let mut out = Vec::new();
        let err = TerminalPrompt::new(Cursor::new("a\n"), &mut out)
            .decide(&interrupt())
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }
}
