//! Single-file NDJSON tailer
//!
//! Follows one append-only file and emits every complete line exactly once,
//! in file order. The loop is a polling cycle:
//!
//! 1. Stat the file by path.
//! 2. A changed inode is a rotation: reopen at offset 0, drop the partial.
//! 3. Open the file if no handle is held (first cycle, or after an error).
//! 4. A size below the read offset is a truncation: reset to offset 0.
//! 5. Read forward in chunks from the offset until caught up with the
//!    stat'ed size, feeding the line assembler.
//!
//! One loop task owns all tailer state, so cycles can never overlap. Idle
//! cycles double the poll delay up to a bound; a poke (from a filesystem
//! change hint) resets the delay and runs the next cycle immediately. The
//! hints are advisory: with no hints at all the file is still read
//! correctly, just on the polling cadence.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::{Notify, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::event::FileEvent;
use crate::lines::LineBuffer;

/// Default read chunk size
const DEFAULT_READ_CHUNK: usize = 64 * 1024;

/// Tuning for a single file tailer
#[derive(Debug, Clone)]
pub struct FileTailerConfig {
    /// Baseline poll interval
    pub poll_interval: Duration,
    /// Maximum idle backoff
    pub max_backoff: Duration,
    /// Seek to the end at first open instead of reading existing content
    pub start_at_end: bool,
    /// Bytes per positioned read
    pub read_chunk: usize,
}

impl Default for FileTailerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(250),
            max_backoff: Duration::from_millis(2_000),
            start_at_end: false,
            read_chunk: DEFAULT_READ_CHUNK,
        }
    }
}

/// Follows one NDJSON file
pub struct FileTailer {
    path: PathBuf,
    config: FileTailerConfig,
    events: mpsc::Sender<FileEvent>,
}

impl FileTailer {
    /// Create a tailer for one file. Nothing happens until [`spawn`](Self::spawn).
    pub fn new(
        path: impl Into<PathBuf>,
        config: FileTailerConfig,
        events: mpsc::Sender<FileEvent>,
    ) -> Self {
        Self {
            path: path.into(),
            config,
            events,
        }
    }

    /// Start the polling loop and return the control handle.
    ///
    /// The first cycle runs immediately.
    pub fn spawn(self) -> FileTailerHandle {
        let cancel = CancellationToken::new();
        let poke = Arc::new(Notify::new());
        let path = self.path.clone();

        let state = TailState {
            path: self.path,
            config: self.config.clone(),
            events: self.events,
            file: None,
            inode: None,
            offset: 0,
            lines: LineBuffer::new(),
            first_open: true,
        };

        let task = tokio::spawn(state.run(cancel.clone(), Arc::clone(&poke)));

        FileTailerHandle {
            path,
            cancel,
            poke,
            task,
        }
    }
}

/// Control handle for a spawned [`FileTailer`]
pub struct FileTailerHandle {
    path: PathBuf,
    cancel: CancellationToken,
    poke: Arc<Notify>,
    task: JoinHandle<()>,
}

impl FileTailerHandle {
    /// Path the tailer follows.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reset the backoff and run the next cycle immediately.
    pub fn poke(&self) {
        self.poke.notify_one();
    }

    /// Signal the loop to stop. Idempotent.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the loop task to finish. Callers bound this with a timeout.
    pub async fn stopped(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await
            && e.is_panic()
        {
            tracing::warn!(path = %self.path.display(), "file tailer task panicked");
        }
    }
}

/// All mutable tailer state, owned by the loop task
struct TailState {
    path: PathBuf,
    config: FileTailerConfig,
    events: mpsc::Sender<FileEvent>,
    /// Open handle, absent before first open and after an I/O error
    file: Option<File>,
    /// Last observed inode identity
    inode: Option<u64>,
    /// Exclusive upper bound of bytes already delivered as lines
    offset: u64,
    /// Partial-line assembly buffer
    lines: LineBuffer,
    first_open: bool,
}

impl TailState {
    async fn run(mut self, cancel: CancellationToken, poke: Arc<Notify>) {
        let mut backoff = self.config.poll_interval;

        loop {
            if cancel.is_cancelled() {
                break;
            }

            let progress = self.cycle().await;
            backoff = if progress {
                self.config.poll_interval
            } else {
                (backoff * 2).min(self.config.max_backoff)
            };

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = poke.notified() => {
                    backoff = self.config.poll_interval;
                }
                _ = tokio::time::sleep(backoff) => {}
            }
        }

        debug!(path = %self.path.display(), "file tailer stopped");
    }

    /// One polling cycle. Returns whether any bytes were consumed.
    async fn cycle(&mut self) -> bool {
        let meta = match tokio::fs::metadata(&self.path).await {
            Ok(meta) => meta,
            Err(e) => {
                self.warn(format!("stat failed: {e}")).await;
                self.file = None;
                return false;
            }
        };
        let size = meta.len();
        let inode = inode_of(&meta);

        // Rotation: same path, different inode. The buffered partial line
        // belonged to the old file and is discarded with it.
        if let (Some(prev), Some(current)) = (self.inode, inode)
            && prev != current
        {
            self.info("inode changed -> reopen".to_string()).await;
            if self.lines.pending() > 0 {
                debug!(
                    path = %self.path.display(),
                    bytes = self.lines.pending(),
                    "partial line discarded with rotated file"
                );
            }
            self.file = None;
            self.inode = Some(current);
            self.offset = 0;
            self.lines.clear();
        }

        if self.file.is_none() && !self.open(size, inode).await {
            return false;
        }

        // Truncation: the producer rewrote the file in place.
        if size < self.offset {
            self.info(format!("truncated ({size} < {offset}) -> offset reset", offset = self.offset))
                .await;
            self.offset = 0;
            self.lines.clear();
        }

        self.read_forward(size).await
    }

    /// Open the file and report it ready. Offset handling differs by cause:
    /// first open honors `start_at_end`, a reopen keeps whatever offset the
    /// caller left (0 after rotation, unchanged after a transient error).
    async fn open(&mut self, size: u64, inode: Option<u64>) -> bool {
        match File::open(&self.path).await {
            Ok(file) => {
                self.file = Some(file);
                self.inode = inode;
                if self.first_open {
                    if self.config.start_at_end {
                        self.offset = size;
                    }
                    self.first_open = false;
                }
                let _ = self
                    .events
                    .send(FileEvent::Ready {
                        path: self.path.clone(),
                        size,
                        inode,
                    })
                    .await;
                true
            }
            Err(e) => {
                self.warn(format!("open failed: {e}")).await;
                false
            }
        }
    }

    /// Read from the offset toward `size` in bounded chunks, emitting every
    /// line the new bytes complete.
    async fn read_forward(&mut self, size: u64) -> bool {
        let mut progress = false;

        while size > self.offset {
            let offset = self.offset;
            let want = ((size - offset) as usize).min(self.config.read_chunk);
            let mut buf = vec![0u8; want];

            let Some(file) = self.file.as_mut() else {
                break;
            };
            let read = async {
                file.seek(SeekFrom::Start(offset)).await?;
                file.read(&mut buf).await
            }
            .await;

            match read {
                Ok(0) => break,
                Ok(n) => {
                    buf.truncate(n);
                    self.offset += n as u64;
                    progress = true;
                    for line in self.lines.push_bytes(&buf) {
                        let _ = self
                            .events
                            .send(FileEvent::Data {
                                path: self.path.clone(),
                                line,
                            })
                            .await;
                    }
                }
                Err(e) => {
                    self.warn(format!("read failed: {e}")).await;
                    self.file = None;
                    break;
                }
            }
        }

        progress
    }

    async fn info(&self, msg: String) {
        debug!(path = %self.path.display(), msg = %msg, "tail info");
        let _ = self
            .events
            .send(FileEvent::Info {
                path: self.path.clone(),
                msg,
            })
            .await;
    }

    async fn warn(&self, msg: String) {
        let _ = self
            .events
            .send(FileEvent::Warn {
                path: self.path.clone(),
                msg,
            })
            .await;
    }
}

#[cfg(unix)]
fn inode_of(meta: &std::fs::Metadata) -> Option<u64> {
    use std::os::unix::fs::MetadataExt;
    Some(meta.ino())
}

#[cfg(not(unix))]
fn inode_of(_meta: &std::fs::Metadata) -> Option<u64> {
    None
}

#[cfg(test)]
#[path = "file_test.rs"]
mod tests;
