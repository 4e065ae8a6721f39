//! Interactive chat demo: connect the configured tool servers and run a
//! turn-by-turn REPL against an OpenAI-compatible endpoint.
//!
//! ```text
//! COAGENT_BASE_URL=http://localhost:11434/v1 COAGENT_MODEL=qwen2.5 \
//!     chat [servers.json]
//! ```

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use coagent::agent::{LoopEvent, ProgressSender, ToolCallingLoop};
use coagent::config::load_server_config;
use coagent::gateway::{ChatMessage, GatewayConfig, OpenAiGateway};
use coagent::mcp::ToolServerManager;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("servers.json"));

    let base_url = std::env::var("COAGENT_BASE_URL")
        .unwrap_or_else(|_| "http://localhost:11434/v1".to_string());
    let model = std::env::var("COAGENT_MODEL").unwrap_or_else(|_| "qwen2.5".to_string());

    let descriptors = load_server_config(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;

    let mut manager = ToolServerManager::new(descriptors);
    let summary = manager.connect_all().await;
    for (server, error) in &summary.failures {
        eprintln!("warning: server '{server}' unavailable: {error}");
    }
    println!(
        "connected {}/{} servers, {} tools available",
        summary.connected.len(),
        summary.attempted,
        manager.catalog().len()
    );

    let mut gateway_config = GatewayConfig::new(base_url, model);
    gateway_config.api_key = std::env::var("COAGENT_API_KEY").ok();
    let gateway = Arc::new(OpenAiGateway::new(gateway_config)?);

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let progress = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match event {
                LoopEvent::ToolStarted { name, .. } => eprintln!("  [tool] {name} ..."),
                LoopEvent::ToolFinished {
                    name,
                    succeeded,
                    elapsed_ms,
                    ..
                } => {
                    let status = if succeeded { "ok" } else { "failed" };
                    eprintln!("  [tool] {name} {status} ({elapsed_ms}ms)");
                }
                _ => {}
            }
        }
    });

    let manager = Arc::new(manager);
    let agent = ToolCallingLoop::new(gateway, manager.clone())
        .with_progress(ProgressSender::new(tx));

    let mut history = vec![ChatMessage::system(
        "You are a helpful assistant. Use the available tools when they help \
         answer the user's question.",
    )];

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "exit" || line == "quit" {
            break;
        }

        history.push(ChatMessage::user(line));
        match agent.run_turn(&mut history).await {
            Ok(outcome) => println!("{}", outcome.text()),
            Err(e) => eprintln!("error: {e}"),
        }
    }

    // Manager is shared with the loop only through the Arc we hold here.
    drop(agent);
    match Arc::try_unwrap(manager) {
        Ok(mut manager) => manager.disconnect_all().await,
        Err(_) => tracing::warn!("manager still shared at shutdown, skipping disconnect"),
    }
    progress.abort();
    Ok(())
}
