//! agentflow CLI — interactive front end to the message-execution engine.

use std::sync::Arc;
use std::time::Duration;

use agentflow::config::Config;
use agentflow::engine::{Engine, EngineConfig};
use agentflow::error::Error;
use agentflow::llm::passthrough::Passthrough;
use agentflow::llm::{AnthropicInvoker, Invoker, anthropic_client};
use agentflow::telemetry::init_tracing;
use anyhow::Context as _;
use clap::{Parser, Subcommand};
use tokio::io::AsyncBufReadExt as _;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "agentflow", about = "Concurrent message-execution engine for LLM agents")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Interactive chat: stdin lines in, responses out as they complete
    Chat {
        /// Use the echo invoker instead of Anthropic (no API key needed)
        #[arg(long)]
        passthrough: bool,
        /// Request/response/error queue capacity
        #[arg(long, default_value_t = 100)]
        capacity: usize,
        /// Seconds to wait for in-flight invocations at shutdown
        #[arg(long, default_value_t = 5)]
        drain_grace: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        Command::Chat {
            passthrough,
            capacity,
            drain_grace,
        } => cmd_chat(passthrough, capacity, drain_grace).await,
    }
}

async fn cmd_chat(passthrough: bool, capacity: usize, drain_grace: u64) -> anyhow::Result<()> {
    let invoker: Arc<dyn Invoker> = if passthrough {
        let log_level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        init_tracing(&log_level)?;
        Arc::new(Passthrough::new("passthrough"))
    } else {
        let config = Config::from_env()?;
        init_tracing(&config.log_level)?;
        let client = anthropic_client(&config.anthropic_api_key)?;
        Arc::new(AnthropicInvoker::new(
            &client,
            &config.model,
            &config.instruction,
        ))
    };

    let engine_config = EngineConfig {
        request_capacity: capacity,
        response_capacity: capacity,
        error_capacity: capacity,
        drain_grace: Duration::from_secs(drain_grace),
    };

    let cancel = CancellationToken::new();
    let mut engine = Engine::start(invoker, engine_config, cancel.clone());

    let ctrl_c_cancel = cancel.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        ctrl_c_cancel.cancel();
    });

    let mut responses = engine.responses().context("response stream taken")?;
    let mut errors = engine.errors().context("error stream taken")?;

    // Print results as they complete. Both streams end at shutdown, but
    // their buffers empty at different times — keep draining each until it
    // closes so no buffered result is lost.
    let printer = tokio::spawn(async move {
        let mut responses_open = true;
        let mut errors_open = true;
        while responses_open || errors_open {
            tokio::select! {
                resp = responses.recv(), if responses_open => match resp {
                    Some(msg) => println!("{}", msg.content),
                    None => responses_open = false,
                },
                err = errors.recv(), if errors_open => match err {
                    Some(e) => eprintln!("error: {e}"),
                    None => errors_open = false,
                },
            }
        }
    });

    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            line = lines.next_line() => match line? {
                Some(line) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    match engine.submit(line) {
                        Ok(()) => {}
                        Err(Error::QueueFull) => eprintln!("busy, try again"),
                        Err(e) => {
                            eprintln!("rejected: {e}");
                            break;
                        }
                    }
                }
                None => break, // stdin EOF
            },
        }
    }

    engine.shutdown().await;
    printer.await.ok();
    Ok(())
}
