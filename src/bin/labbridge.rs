//! Labbridge CLI - run a bridge endpoint over stdio
//!
//! The `serve` subcommand speaks newline-delimited JSON on stdin/stdout and
//! answers `echo` and `ping` requests from the frontend.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use labbridge::rpc::transport::{NdjsonTransport, read_ndjson};
use labbridge::rpc::{BridgeConfig, EndpointBuilder, OperationTable};
use labbridge::{PROTOCOL_VERSION, VERSION};
use serde_json::json;
use std::path::PathBuf;
use tokio::io::BufReader;
use tokio::sync::mpsc;

#[derive(Parser)]
#[command(name = "labbridge")]
#[command(about = "Correlated async RPC bridge to a workbench frontend", long_about = None)]
struct Cli {
    /// JSON config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve an endpoint on stdin/stdout
    Serve {
        /// Model id of the endpoint (random when omitted)
        #[arg(long)]
        model_id: Option<String>,

        /// Send operations without waiting for the frontend handshake
        #[arg(long)]
        no_ready_gate: bool,

        /// Fail gated operations after this many milliseconds
        #[arg(long)]
        ready_timeout_ms: Option<u64>,

        /// Include error source chains in replies
        #[arg(long)]
        traceback: bool,
    },

    /// Write a config file with default settings
    InitConfig {
        /// Destination path
        path: PathBuf,
    },

    /// Print version information
    Version,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => BridgeConfig::load(path)?,
        None => BridgeConfig::default(),
    };

    // stdout carries the protocol
    let level = if config.debug { tracing::Level::DEBUG } else { tracing::Level::INFO };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    match cli.command {
        Commands::Serve {
            model_id,
            no_ready_gate,
            ready_timeout_ms,
            traceback,
        } => {
            if no_ready_gate {
                config.require_ready = false;
            }
            if ready_timeout_ms.is_some() {
                config.ready_timeout_ms = ready_timeout_ms;
            }
            if traceback {
                config.traceback_in_errors = true;
            }
            serve(config, model_id).await
        }
        Commands::InitConfig { path } => {
            BridgeConfig::default().save(&path)?;
            println!("Wrote default config to {}", path.display());
            Ok(())
        }
        Commands::Version => {
            println!("labbridge {VERSION} (protocol {PROTOCOL_VERSION})");
            Ok(())
        }
    }
}

fn handlers() -> OperationTable {
    OperationTable::new()
        .on("echo", |request| async move { Ok(request.payload) })
        .on("ping", |request| async move {
            Ok(json!({
                "modelId": request.endpoint.model_id(),
                "version": VERSION,
                "protocol": PROTOCOL_VERSION,
            }))
        })
}

async fn serve(config: BridgeConfig, model_id: Option<String>) -> Result<()> {
    let mut builder = EndpointBuilder::new("Labbridge", NdjsonTransport::new(std::io::stdout()))
        .config(config)
        .handler(handlers());
    if let Some(model_id) = model_id {
        builder = builder.model_id(model_id);
    }
    let endpoint = builder.build();
    tracing::info!(model_id = endpoint.model_id(), "serving on stdio");

    let (sink, inbound) = mpsc::unbounded_channel();
    let listener = endpoint.listen(inbound);

    let lines = read_ndjson(BufReader::new(tokio::io::stdin()), sink)
        .await
        .context("Failed to read stdin")?;
    tracing::info!(lines, "stdin closed");

    // The listen loop closes the endpoint once stdin ends.
    if let Err(err) = listener.await {
        tracing::debug!(error = %err, "listener ended");
    }
    endpoint.close();
    Ok(())
}
