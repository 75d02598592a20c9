//! Ocean data searcher.
//!
//! Loads a YAML search config, runs a region or station search against
//! ERDDAP, Axiom Search and local files, and writes a JSON summary of the
//! datasets found.

mod config;
mod search;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use config::load_search_config;
use search::{build_data, run_search};

#[derive(Parser, Debug)]
#[command(name = "searcher")]
#[command(about = "Search ERDDAP, Axiom and local catalogs for ocean data")]
struct Args {
    /// Configuration file path
    #[arg(short, long, env = "SEARCHER_CONFIG", default_value = "config/search.yaml")]
    config: PathBuf,

    /// Only list datasets and metadata, do not download data
    #[arg(long)]
    no_data: bool,

    /// Write the summary here instead of the configured output
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Log level
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long, env = "LOG_JSON")]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Initialize tracing
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // Logs go to stderr so the summary can be piped from stdout.
    let builder = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_writer(std::io::stderr);
    if args.json_logs {
        tracing::subscriber::set_global_default(builder.json().finish())?;
    } else {
        tracing::subscriber::set_global_default(builder.finish())?;
    }

    info!(config = %args.config.display(), "Starting ocean data searcher");

    let config = load_search_config(&args.config)?;
    info!(
        mode = ?config.mode,
        sources = config.sources.len(),
        "Loaded configuration"
    );

    let data = build_data(&config).await?;
    let summaries = run_search(&data, !args.no_data).await?;
    let json = serde_json::to_string_pretty(&summaries)?;

    match args.output.or(config.output) {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&path, json)
                .await
                .with_context(|| format!("Failed to write summary to {:?}", path))?;
            info!(path = %path.display(), "Wrote summary");
        }
        None => println!("{}", json),
    }

    Ok(())
}
