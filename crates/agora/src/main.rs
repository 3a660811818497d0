use std::io::Read;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "agora", about = "Multi-agent decision orchestration")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/agora.toml")]
    config: String,

    /// Read newline-delimited MarketInput JSON from a file instead of stdin
    #[arg(short, long)]
    input: Option<String>,

    /// Per-round decision timeout in milliseconds (defaults to the config value)
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Pretty-print the output JSON
    #[arg(long)]
    pretty: bool,

    /// Print the manager status after the last round
    #[arg(long)]
    status: bool,
}

fn to_json<T: serde::Serialize>(value: &T, pretty: bool) -> Result<String> {
    let json = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    Ok(json)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing (respects RUST_LOG env var)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = agora::load_config(&cli.config)?;
    let manager = agora::build_manager(&config).context("Failed to build manager")?;

    let raw = if let Some(input_path) = &cli.input {
        std::fs::read_to_string(input_path)
            .with_context(|| format!("Failed to read input: {input_path}"))?
    } else {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read from stdin")?;
        buf
    };
    let inputs = agora::parse_inputs(&raw)?;

    let timeout = cli.timeout_ms.map(Duration::from_millis);
    for (i, input) in inputs.iter().enumerate() {
        let report = agora::run_round(&manager, i + 1, input, timeout).await;
        println!("{}", to_json(&report, cli.pretty)?);
    }

    if cli.status {
        println!("{}", to_json(&manager.get_manager_status(), cli.pretty)?);
    }

    manager.shutdown().await;
    Ok(())
}
