//! tollgate CLI
//!
//! 用法：`tollgate <email|sql|notes> [prompt]`。启动对应 Agent，遇到需审批的工具调用时
//! 在终端逐条询问，恢复运行直到完成。

use std::io::{self, Write};
use std::sync::Arc;

use anyhow::Context;
use tokio::sync::mpsc;

use tollgate::agent::{build_profile, AgentKind};
use tollgate::approval::TerminalPrompt;
use tollgate::config::load_config;
use tollgate::llm::create_llm_from_config;
use tollgate::memory::open_store;
use tollgate::react::{EngineEvent, LlmPlanner};
use tollgate::{EngineBuilder, RunOutcome};

fn usage() -> ! {
    eprintln!("Usage: tollgate <email|sql|notes> [prompt]");
    std::process::exit(2);
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tollgate::observability::init();

    let mut args = std::env::args().skip(1);
    let kind: AgentKind = match args.next() {
        Some(name) => name.parse().context("Invalid agent")?,
        None => usage(),
    };
    let rest: Vec<String> = args.collect();
    let prompt = if rest.is_empty() {
        kind.default_prompt().to_string()
    } else {
        rest.join(" ")
    };

    let cfg = load_config(None).context("Failed to load config")?;
    let profile = build_profile(kind, &cfg).context("Failed to build agent tools")?;
    let store = open_store(&cfg.checkpoint)
        .await
        .context("Failed to open checkpoint store")?;
    let system_prompt = cfg
        .app
        .system_prompt
        .clone()
        .unwrap_or_else(|| kind.system_prompt().to_string());
    let planner = Arc::new(LlmPlanner::new(create_llm_from_config(&cfg), system_prompt));

    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
    let engine = EngineBuilder::from_config(&cfg)
        .registry(profile.registry)
        .planner(planner)
        .store(store)
        .events(event_tx)
        .build()
        .context("Failed to build engine")?;

    // 过程事件打印到 stderr，stdout 留给审批交互与最终结果
    let printer = tokio::spawn(async move {
        while let Some(ev) = event_rx.recv().await {
            match ev {
                EngineEvent::ToolCall { tool, args, .. } => eprintln!("-> {tool} {args}"),
                EngineEvent::Observation { preview, .. } => eprintln!("<- {preview}"),
                EngineEvent::ToolFailure { reason, .. } => eprintln!("!! {reason}"),
                _ => {}
            }
        }
    });

    let thread_id = format!("cli-{}", uuid::Uuid::new_v4());
    println!("Starting {kind} agent (thread {thread_id})...\n");

    let mut terminal = TerminalPrompt::new(io::stdin().lock(), io::stdout());
    if let Some(preview) = profile.preview {
        terminal = terminal.with_preview(preview);
    }

    let mut outcome = engine
        .start(&thread_id, &prompt)
        .await
        .context("Run failed")?;
    loop {
        match outcome {
            RunOutcome::Completed { final_text } => {
                println!("\n{kind} agent finished!");
                println!("\n--- Final Result ---");
                println!("{final_text}");
                break;
            }
            RunOutcome::Suspended { .. } => {
                let interrupt = engine
                    .interrupt(&thread_id)
                    .await?
                    .context("Run is suspended without an interrupt")?;
                let decisions = terminal
                    .decide(&interrupt)
                    .context("Failed to read decision")?;
                outcome = engine
                    .resume(&thread_id, &decisions)
                    .await
                    .context("Resume failed")?;
            }
        }
    }
    io::stdout().flush()?;

    if let Some(outbox) = profile.outbox {
        for email in outbox.sent() {
            tracing::info!(
                recipient = %email.recipient,
                subject = %email.subject,
                "email in outbox"
            );
        }
    }

    drop(engine);
    let _ = printer.await;
    Ok(())
}
