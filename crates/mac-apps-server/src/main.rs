//! mac-apps-mcp: standalone MCP server for macOS apps, Ollama and MongoDB
//!
//! Exposes application launch/quit, AppleScript, local Ollama models and
//! MongoDB databases as tools over the Model Context Protocol (STDIO JSON-RPC 2.0).
//!
//! Usage:
//!   mac-apps-mcp [--config mac-apps.toml] [--log-level debug]
//!
//! Environment:
//!   OLLAMA_API_URL  (default http://localhost:11434)
//!   MONGODB_URI     (default mongodb://localhost:27017)

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{self, AsyncBufRead, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::info;

use mac_apps_core::Config;
use mac_apps_core::tools::{Collaborators, builtin_registry};
use mac_apps_mcp::{Dispatcher, McpServer};

#[derive(Debug, Parser)]
#[command(name = "mac-apps-mcp", version, about = "MCP server for macOS apps, Ollama and MongoDB")]
struct Cli {
    /// Path to a TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level used when RUST_LOG is not set
    #[arg(long)]
    log_level: Option<String>,
}

fn init_tracing(level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(level) = cli.log_level {
        config.log_level = level;
    }
    init_tracing(&config.log_level);

    info!(
        "mac-apps-mcp v{} starting on STDIO (ollama: {}, mongodb: {})",
        env!("CARGO_PKG_VERSION"),
        config.ollama_api_url,
        config.mongodb_uri
    );

    let collaborators = Collaborators::from_config(&config)?;
    let registry = builtin_registry(&collaborators).context("Failed to build tool registry")?;
    info!("Registered {} tools", registry.len());

    let server = McpServer::new(Dispatcher::new(Arc::new(registry)));
    let stdin = BufReader::new(io::stdin());
    let mut stdout = io::stdout();

    let shutdown = serve_until(&server, stdin, &mut stdout, tokio::signal::ctrl_c()).await?;

    stdout.flush().await.context("Failed to flush stdout")?;
    info!("mac-apps-mcp stopped");

    if shutdown == Shutdown::Interrupted {
        // stdin is still blocked in a read the runtime cannot cancel
        std::process::exit(0);
    }
    Ok(())
}

/// Why the serve loop ended
#[derive(Debug, PartialEq, Eq)]
enum Shutdown {
    InputClosed,
    Interrupted,
}

/// Serve until the input closes or `interrupt` resolves, whichever comes first
async fn serve_until<R, W, F>(
    server: &McpServer,
    reader: R,
    writer: &mut W,
    interrupt: F,
) -> Result<Shutdown>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
    F: Future<Output = std::io::Result<()>>,
{
    tokio::select! {
        result = server.serve(reader, writer) => {
            result?;
            Ok(Shutdown::InputClosed)
        }
        _ = interrupt => {
            info!("Interrupt received, shutting down");
            Ok(Shutdown::Interrupted)
        }
    }
}
