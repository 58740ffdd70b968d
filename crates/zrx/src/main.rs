//! zrx - live event stream over a Zabbix real-time export directory
//!
//! # Usage
//!
//! ```bash
//! # Run the server (default)
//! zrx
//! zrx serve --port 8080 --dir /var/lib/zabbix/export
//!
//! # Configuration comes from the environment; flags override it
//! ZBX_RTX_DIR=/var/lib/zabbix/export RB_CAPACITY=100000 zrx
//! ```

mod cmd;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Live event stream over a monitoring server's real-time export directory
#[derive(Parser, Debug)]
#[command(name = "zrx")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the stream server
    Serve(cmd::serve::ServeArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level)?;

    match cli.command {
        Some(Command::Serve(args)) => cmd::serve::run(args).await,
        // No subcommand = run the server
        None => cmd::serve::run(cmd::serve::ServeArgs::default()).await,
    }
}

/// Initialize the tracing subscriber for logging
fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_new(level)
        .or_else(|_| EnvFilter::try_new("info"))
        .map_err(|e| anyhow::anyhow!("invalid log level: {}", e))?;

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(false))
        .with(filter)
        .init();

    Ok(())
}
