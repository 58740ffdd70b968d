//! Serve command - run the export stream server
//!
//! Wires the pipeline together: directory tailer -> replay ring -> SSE hub,
//! with the HTTP front serving live streams and snapshots. Shutdown is
//! coordinated: close the hub, stop the tailer (bounded per child), stop the
//! HTTP server, with a hard-kill guard so a stuck component can never hang
//! the process past the grace period.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use tokio::signal;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use zrx_api::{ApiServer, ApiServerConfig, AppState};
use zrx_config::Config;
use zrx_hub::{RingBuffer, SseHub};
use zrx_protocol::{Record, Source};
use zrx_tailer::{DirectoryTailer, DirectoryTailerConfig, TailEvent};

/// Grace period for graceful shutdown before the process force-exits
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Depth of the tailer -> pump event channel
const EVENT_CHANNEL_SIZE: usize = 1024;

/// Serve command arguments. Flags override the environment.
#[derive(Args, Debug, Default)]
pub struct ServeArgs {
    /// HTTP listen port (overrides PORT)
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Export directory to tail (overrides ZBX_RTX_DIR)
    #[arg(short, long)]
    pub dir: Option<PathBuf>,
}

/// Run the serve command
pub async fn run(args: ServeArgs) -> Result<()> {
    let mut config = Config::from_env().context("invalid configuration")?;
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(dir) = args.dir {
        config.export_dir = dir;
    }
    config.validate().context("invalid configuration")?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        dir = %config.export_dir.display(),
        port = config.port,
        capacity = config.ring_capacity,
        "zrx starting"
    );

    let ring = Arc::new(RingBuffer::new(config.ring_capacity).context("invalid ring capacity")?);
    let hub = Arc::new(SseHub::new(config.sse_drop_threshold));

    // Tail engine feeding the pump.
    let (events_tx, events_rx) = mpsc::channel::<TailEvent>(EVENT_CHANNEL_SIZE);
    let mut dir_config = DirectoryTailerConfig::new(&config.export_dir);
    dir_config.file.poll_interval = config.poll_interval;
    dir_config.file.max_backoff = config.max_backoff;
    let tailer = DirectoryTailer::new(dir_config, events_tx);

    let pump = tokio::spawn(pump_events(
        events_rx,
        Arc::clone(&ring),
        Arc::clone(&hub),
    ));

    tailer.start().await;
    hub.heartbeat_start(config.heartbeat);

    // HTTP front.
    let cancel = CancellationToken::new();
    let server = ApiServer::new(
        ApiServerConfig::with_port(config.port),
        AppState::new(Arc::clone(&ring), Arc::clone(&hub)),
    );
    let server_task = {
        let cancel = cancel.clone();
        tokio::spawn(server.run(cancel))
    };

    info!("zrx running");

    wait_for_shutdown().await;
    info!("shutdown signal received, stopping...");

    // Hard-kill guard: a stuck read on a network filesystem must never
    // block shutdown past the grace period.
    let hard_kill = tokio::spawn(async {
        tokio::time::sleep(SHUTDOWN_GRACE).await;
        error!("graceful shutdown timed out, forcing exit");
        std::process::exit(1);
    });

    hub.close();
    tailer.stop().await;
    cancel.cancel();

    match server_task.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(error = %e, "http server error during shutdown"),
        Err(e) => warn!(error = %e, "http server task failed"),
    }

    // The tailer held the last event sender; with it stopped and dropped the
    // pump drains and ends.
    drop(tailer);
    if let Err(e) = pump.await {
        warn!(error = %e, "event pump task failed");
    }

    let stats = hub.stats();
    info!(
        broadcasts = stats.broadcasts,
        frames_dropped = stats.frames_dropped,
        "zrx shutdown complete"
    );
    hard_kill.abort();

    Ok(())
}

/// Classify tailer events into envelopes and fan them out.
async fn pump_events(
    mut events: mpsc::Receiver<TailEvent>,
    ring: Arc<RingBuffer>,
    hub: Arc<SseHub>,
) {
    while let Some(event) = events.recv().await {
        match event {
            TailEvent::Data { path, family, line } => {
                let source = Source::new(basename(&path), family);
                let envelope = ring.push(source, Record::new(line));
                hub.broadcast(
                    family.event_name(),
                    &envelope.record.to_json_line(),
                    Some(envelope.id),
                );
            }
            TailEvent::Ready { path, size, inode } => {
                info!(path = %path.display(), size, inode, "file ready");
            }
            TailEvent::Info { path, msg } => {
                info!(path = %path.display(), msg = %msg, "tailer");
            }
            TailEvent::Warn { path, msg } => {
                warn!(path = %path.display(), msg = %msg, "tailer");
            }
            TailEvent::ParseError { path, msg } => {
                warn!(path = %path.display(), msg = %msg, "record parse error");
            }
        }
    }
}

fn basename(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Wait for SIGINT or SIGTERM
async fn wait_for_shutdown() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
