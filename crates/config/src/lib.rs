//! zrx Configuration
//!
//! Environment-variable configuration with sensible defaults. An unset
//! variable falls back to its default; a set-but-invalid one is a startup
//! error, never a silent fallback.
//!
//! | Variable             | Default     | Meaning                              |
//! |----------------------|-------------|--------------------------------------|
//! | `PORT`               | `3000`      | HTTP listen port                     |
//! | `ZBX_RTX_DIR`        | `./zbx-rtx` | Export directory to tail             |
//! | `RB_CAPACITY`        | `50000`     | Replay ring capacity                 |
//! | `HEARTBEAT_MS`       | `20000`     | SSE heartbeat interval               |
//! | `POLL_INTERVAL_MS`   | `250`       | Baseline per-file poll interval      |
//! | `MAX_BACKOFF_MS`     | `2000`      | Maximum idle backoff per file        |
//! | `SSE_DROP_THRESHOLD` | `65536`     | Per-client pending-byte drop bound   |

mod error;

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub use error::{ConfigError, Result};

/// Default HTTP listen port
const DEFAULT_PORT: u16 = 3000;

/// Default export directory
const DEFAULT_EXPORT_DIR: &str = "./zbx-rtx";

/// Default replay ring capacity
const DEFAULT_RING_CAPACITY: usize = 50_000;

/// Default SSE heartbeat interval
const DEFAULT_HEARTBEAT: Duration = Duration::from_millis(20_000);

/// Default baseline poll interval per tailed file
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Default maximum idle backoff per tailed file
const DEFAULT_MAX_BACKOFF: Duration = Duration::from_millis(2_000);

/// Default per-client pending-byte drop threshold
const DEFAULT_SSE_DROP_THRESHOLD: usize = 64 * 1024;

/// Process configuration, resolved once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP listen port
    pub port: u16,

    /// Directory the monitoring server exports NDJSON files into
    pub export_dir: PathBuf,

    /// Replay ring capacity (envelopes)
    pub ring_capacity: usize,

    /// SSE heartbeat interval
    pub heartbeat: Duration,

    /// Baseline per-file poll interval
    pub poll_interval: Duration,

    /// Maximum idle backoff per file
    pub max_backoff: Duration,

    /// Per-client pending-byte drop threshold
    pub sse_drop_threshold: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            export_dir: PathBuf::from(DEFAULT_EXPORT_DIR),
            ring_capacity: DEFAULT_RING_CAPACITY,
            heartbeat: DEFAULT_HEARTBEAT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_backoff: DEFAULT_MAX_BACKOFF,
            sse_drop_threshold: DEFAULT_SSE_DROP_THRESHOLD,
        }
    }
}

impl Config {
    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        let config = Self {
            port: parse_var("PORT", DEFAULT_PORT)?,
            export_dir: env::var("ZBX_RTX_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_EXPORT_DIR)),
            ring_capacity: parse_var("RB_CAPACITY", DEFAULT_RING_CAPACITY)?,
            heartbeat: parse_millis("HEARTBEAT_MS", DEFAULT_HEARTBEAT)?,
            poll_interval: parse_millis("POLL_INTERVAL_MS", DEFAULT_POLL_INTERVAL)?,
            max_backoff: parse_millis("MAX_BACKOFF_MS", DEFAULT_MAX_BACKOFF)?,
            sse_drop_threshold: parse_var("SSE_DROP_THRESHOLD", DEFAULT_SSE_DROP_THRESHOLD)?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate cross-field constraints. Fatal at startup.
    pub fn validate(&self) -> Result<()> {
        if self.ring_capacity == 0 {
            return Err(ConfigError::out_of_range("RB_CAPACITY", "must be > 0"));
        }
        if self.poll_interval.is_zero() {
            return Err(ConfigError::out_of_range("POLL_INTERVAL_MS", "must be > 0"));
        }
        if self.max_backoff < self.poll_interval {
            return Err(ConfigError::out_of_range(
                "MAX_BACKOFF_MS",
                "must be >= POLL_INTERVAL_MS",
            ));
        }
        if self.heartbeat.is_zero() {
            return Err(ConfigError::out_of_range("HEARTBEAT_MS", "must be > 0"));
        }
        Ok(())
    }
}

/// Parse an optional environment variable, falling back to a default when
/// unset. A set-but-unparseable value is an error.
fn parse_var<T>(var: &'static str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(var) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e: T::Err| ConfigError::invalid_value(var, raw, e.to_string())),
        Err(_) => Ok(default),
    }
}

/// Parse a millisecond duration variable.
fn parse_millis(var: &'static str, default: Duration) -> Result<Duration> {
    let millis: u64 = parse_var(var, default.as_millis() as u64)?;
    Ok(Duration::from_millis(millis))
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
