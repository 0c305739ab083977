//! # riskfeed
//!
//! Tail a server-push event stream from the terminal. Every delivered
//! payload is printed to stdout as one JSON line; logs go to stderr.

#![deny(unsafe_code)]

use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use riskfeed_client::{handler, Client, ConnectionState};
use riskfeed_core::settings::{load_settings_from_path, settings_path};
use riskfeed_core::DEFAULT_TOPIC;
use riskfeed_telemetry::{init_telemetry, TelemetryConfig};
use serde_json::{json, Value};

/// Risk-analytics stream client.
#[derive(Parser, Debug)]
#[command(name = "riskfeed", about = "Reconnecting server-push stream client")]
struct Cli {
    /// Settings file (default: `~/.riskfeed/settings.json`).
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Connect to an endpoint and print every payload on the given topics.
    Tail {
        /// Stream URL, or a path resolved against `--base-url`.
        endpoint: String,

        /// Topic to print (repeatable). Defaults to the unnamed-event topic.
        #[arg(long = "topic", short = 't')]
        topics: Vec<String>,

        /// Base URL for relative endpoints (overrides settings).
        #[arg(long)]
        base_url: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let path = cli.settings.clone().unwrap_or_else(settings_path);
    let mut settings = load_settings_from_path(&path)
        .with_context(|| format!("Failed to load settings: {}", path.display()))?;
    if cli.json_logs {
        settings.logging.json = true;
    }
    init_telemetry(&TelemetryConfig::from_settings(&settings.logging))?;

    match cli.command {
        Command::Tail {
            endpoint,
            topics,
            base_url,
        } => {
            if let Some(url) = base_url {
                settings.base_url = Some(url);
            }
            tail(&endpoint, topics, &settings).await
        }
    }
}

async fn tail(
    endpoint: &str,
    mut topics: Vec<String>,
    settings: &riskfeed_core::RiskfeedSettings,
) -> Result<()> {
    if topics.is_empty() {
        topics.push(DEFAULT_TOPIC.to_string());
    }

    let client = Client::from_settings(endpoint, settings)
        .with_context(|| format!("Invalid transport configuration for {endpoint}"))?;
    for topic in topics {
        let label = topic.clone();
        client.subscribe(
            topic,
            handler(move |payload: &Value| {
                let line = json!({ "topic": label, "payload": payload });
                let mut stdout = std::io::stdout().lock();
                writeln!(stdout, "{line}")?;
                Ok(())
            }),
        );
    }

    tracing::info!(endpoint = %client.endpoint(), "tailing");
    client.connect();

    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for ctrl+c")?;
            tracing::info!("Shutting down");
            client.disconnect();
            let _ = client.wait_for(|s| s == ConnectionState::Disconnected).await;
            Ok(())
        }
        _ = client.wait_for(ConnectionState::is_terminal) => {
            anyhow::bail!(
                "Giving up on {endpoint} after {} failed attempts",
                client.reconnect_attempts()
            )
        }
    }
}
