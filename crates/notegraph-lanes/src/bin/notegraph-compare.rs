//! notegraph-compare: run one note through the local and remote lanes and
//! print every lane's result as JSON.
//!
//! Logs go to stderr; stdout carries only the result array.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::AsyncReadExt;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use notegraph_core::LaneId;
use notegraph_inference::{LocalRuntime, NotegraphConfig};
use notegraph_lanes::{Credentials, LaneOrchestrator};

#[derive(Parser)]
#[command(name = "notegraph-compare")]
#[command(author, version, about = "Compare note extraction across local and remote models")]
struct Cli {
    /// Note file to extract from, or `-` for stdin
    input: String,

    /// Lanes to run
    #[arg(long, value_delimiter = ',', default_values_t = LaneId::ALL)]
    lanes: Vec<LaneId>,

    /// Include debug bundles in the output
    #[arg(long)]
    debug: bool,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,

    /// Config file (default: $NOTEGRAPH_CONFIG or ~/.config/notegraph/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,
}

fn init_tracing(json: bool) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "notegraph=info".into());
    let registry = tracing_subscriber::registry().with(env_filter);

    if json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

async fn read_input(input: &str) -> Result<String> {
    if input == "-" {
        let mut text = String::new();
        tokio::io::stdin()
            .read_to_string(&mut text)
            .await
            .context("failed to read note from stdin")?;
        Ok(text)
    } else {
        tokio::fs::read_to_string(input)
            .await
            .with_context(|| format!("failed to read note from {}", input))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let config = match &cli.config {
        Some(path) => NotegraphConfig::from_file(path),
        None => NotegraphConfig::load(),
    }
    .context("failed to load configuration")?;

    let text = read_input(&cli.input).await?;
    let runtime = Arc::new(LocalRuntime::new(config.local.clone())?);
    let orchestrator =
        LaneOrchestrator::from_config(&config, &Credentials::from_env(), runtime.clone())?;

    let mut results = orchestrator.run(&text, &cli.lanes).await;
    runtime.stop().await;

    if !cli.debug {
        for result in &mut results {
            result.debug = None;
        }
    }
    println!("{}", serde_json::to_string_pretty(&results)?);
    Ok(())
}
