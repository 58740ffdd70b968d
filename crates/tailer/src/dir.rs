//! Directory tailer
//!
//! Keeps exactly one [`FileTailer`] per file in the export directory that
//! matches the include patterns and is not ignored, derives each child's
//! [`Family`] from its basename, and forwards child events upward with data
//! records annotated by that family.
//!
//! Discovery runs three ways, all funneling into the same single-flighted
//! `scan`: once at start, debounced after every filesystem change hint, and
//! on a fallback interval in case the platform watcher is degraded or
//! unavailable. Hints that name a tracked file additionally poke its tailer
//! straight out of idle backoff.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use regex::Regex;
use tokio::sync::{Notify, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use zrx_protocol::Family;

use crate::error::{Result, TailError};
use crate::event::TailEvent;
use crate::file::{FileTailer, FileTailerConfig, FileTailerHandle};

/// Debounce between a change hint and the rescan it triggers
const RESCAN_DEBOUNCE: Duration = Duration::from_millis(150);

/// Fallback rescan cadence; discovery must not depend on hints arriving
const RESCAN_INTERVAL: Duration = Duration::from_secs(2);

/// Bound on how long one child may take to stop before it is abandoned
const CHILD_STOP_TIMEOUT: Duration = Duration::from_secs(2);

/// Per-child event channel depth
const CHILD_CHANNEL_SIZE: usize = 256;

/// Default include set: the file classes the monitoring server exports.
pub fn default_include() -> Vec<Regex> {
    vec![
        Regex::new(r"^(problems|history)-.*\.ndjson$").unwrap(),
        Regex::new(r"^(problems|history)-.*-(main-process|task-manager)-\d+\.ndjson$").unwrap(),
    ]
}

/// Default ignore set: files the exporter has rotated away.
pub fn default_ignore() -> Vec<Regex> {
    vec![Regex::new(r"\.old$").unwrap()]
}

/// Configuration for a directory tailer
#[derive(Debug, Clone)]
pub struct DirectoryTailerConfig {
    /// Directory to scan
    pub dir: PathBuf,
    /// A basename must match at least one of these
    pub include: Vec<Regex>,
    /// A basename must match none of these
    pub ignore: Vec<Regex>,
    /// Tuning handed to every child tailer
    pub file: FileTailerConfig,
}

impl DirectoryTailerConfig {
    /// Config for a directory with the default include/ignore sets.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            include: default_include(),
            ignore: default_ignore(),
            file: FileTailerConfig::default(),
        }
    }

    /// Config with custom include/ignore patterns, compiled from strings.
    pub fn with_patterns(
        dir: impl Into<PathBuf>,
        include: &[&str],
        ignore: &[&str],
    ) -> Result<Self> {
        let compile = |patterns: &[&str]| -> Result<Vec<Regex>> {
            patterns
                .iter()
                .map(|p| {
                    Regex::new(p).map_err(|e| TailError::Pattern {
                        pattern: p.to_string(),
                        source: e,
                    })
                })
                .collect()
        };
        Ok(Self {
            dir: dir.into(),
            include: compile(include)?,
            ignore: compile(ignore)?,
            file: FileTailerConfig::default(),
        })
    }

    /// Whether a basename belongs to the tracked set.
    pub fn matches(&self, basename: &str) -> bool {
        self.include.iter().any(|re| re.is_match(basename))
            && !self.ignore.iter().any(|re| re.is_match(basename))
    }
}

/// One tracked file: its tailer plus the task lifting its events upward
struct Child {
    handle: FileTailerHandle,
    forwarder: JoinHandle<()>,
}

/// Dirty set fed by the filesystem watcher callback
#[derive(Default)]
struct HintSet {
    inner: Mutex<HintState>,
    notify: Notify,
}

#[derive(Default)]
struct HintState {
    paths: HashSet<PathBuf>,
    rescan: bool,
}

impl HintSet {
    fn mark(&self, path: PathBuf) {
        self.inner.lock().paths.insert(path);
        self.notify.notify_one();
    }

    fn mark_rescan(&self) {
        self.inner.lock().rescan = true;
        self.notify.notify_one();
    }

    fn drain(&self) -> Vec<PathBuf> {
        let mut inner = self.inner.lock();
        inner.rescan = false;
        inner.paths.drain().collect()
    }

    async fn notified(&self) {
        self.notify.notified().await;
    }
}

/// Maintains one file tailer per matching file in a directory
pub struct DirectoryTailer {
    config: DirectoryTailerConfig,
    out: mpsc::Sender<TailEvent>,
    children: Mutex<HashMap<PathBuf, Child>>,
    /// Single-flight guard for scan
    scanning: AtomicBool,
    stopped: AtomicBool,
    cancel: CancellationToken,
    hints: Arc<HintSet>,
    /// Kept alive for the watch registration; dropped at stop
    watcher: Mutex<Option<RecommendedWatcher>>,
    /// Hint pump and fallback rescan tasks
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl DirectoryTailer {
    /// Create a directory tailer emitting into `out`. Nothing happens until
    /// [`start`](Self::start).
    pub fn new(config: DirectoryTailerConfig, out: mpsc::Sender<TailEvent>) -> Arc<Self> {
        Arc::new(Self {
            config,
            out,
            children: Mutex::new(HashMap::new()),
            scanning: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            cancel: CancellationToken::new(),
            hints: Arc::new(HintSet::default()),
            watcher: Mutex::new(None),
            tasks: Mutex::new(Vec::new()),
        })
    }

    /// Scan once, then follow the directory until [`stop`](Self::stop).
    pub async fn start(self: &Arc<Self>) {
        self.scan().await;
        self.install_watcher();

        let this = Arc::clone(self);
        let hint_pump = tokio::spawn(async move { this.hint_loop().await });
        let this = Arc::clone(self);
        let rescan = tokio::spawn(async move { this.rescan_loop().await });
        self.tasks.lock().extend([hint_pump, rescan]);

        info!(dir = %self.config.dir.display(), "directory tailer started");
    }

    /// Stop every child in parallel, each bounded by the stop timeout, and
    /// tear down hint plumbing. Never blocks indefinitely on a stuck child.
    pub async fn stop(&self) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        self.cancel.cancel();
        *self.watcher.lock() = None;

        let aux: Vec<JoinHandle<()>> = self.tasks.lock().drain(..).collect();
        for task in aux {
            let _ = task.await;
        }

        let children: Vec<(PathBuf, Child)> = self.children.lock().drain().collect();
        let stops: Vec<JoinHandle<()>> = children
            .into_iter()
            .map(|(path, child)| tokio::spawn(stop_child(path, child)))
            .collect();
        for stop in stops {
            let _ = stop.await;
        }

        debug!(dir = %self.config.dir.display(), "directory tailer stopped");
    }

    /// Paths currently tracked.
    pub fn tracked(&self) -> Vec<PathBuf> {
        self.children.lock().keys().cloned().collect()
    }

    /// Reconcile children with the directory contents.
    ///
    /// Single-flighted: a request while a scan is running, or after stop,
    /// is dropped.
    pub async fn scan(&self) {
        if self.stopped.load(Ordering::Acquire) {
            return;
        }
        if self
            .scanning
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }
        self.scan_inner().await;
        self.scanning.store(false, Ordering::Release);
    }

    async fn scan_inner(&self) {
        let mut entries = match tokio::fs::read_dir(&self.config.dir).await {
            Ok(entries) => entries,
            Err(e) => {
                // Existing tailers stay; the next scan retries.
                warn!(dir = %self.config.dir.display(), error = %e, "directory scan failed");
                let _ = self
                    .out
                    .send(TailEvent::Warn {
                        path: self.config.dir.clone(),
                        msg: format!("scan failed: {e}"),
                    })
                    .await;
                return;
            }
        };

        let mut want: HashSet<PathBuf> = HashSet::new();
        loop {
            match entries.next_entry().await {
                Ok(Some(entry)) => {
                    let name = entry.file_name();
                    let Some(name) = name.to_str() else { continue };
                    if !self.config.matches(name) {
                        continue;
                    }
                    let is_file = entry
                        .file_type()
                        .await
                        .map(|t| t.is_file())
                        .unwrap_or(false);
                    if is_file {
                        want.insert(self.config.dir.join(name));
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!(dir = %self.config.dir.display(), error = %e, "directory entry error");
                    break;
                }
            }
        }

        // Membership changes happen under the lock; stopping the removed
        // children awaits outside it.
        let mut removed: Vec<(PathBuf, Child)> = Vec::new();
        {
            let mut children = self.children.lock();
            let tracked: Vec<PathBuf> = children.keys().cloned().collect();
            for path in tracked {
                if !want.contains(&path)
                    && let Some(child) = children.remove(&path)
                {
                    removed.push((path, child));
                }
            }
            for path in want {
                if children.contains_key(&path) {
                    continue;
                }
                let child = self.start_child(path.clone());
                children.insert(path, child);
            }
        }

        for (path, child) in removed {
            info!(path = %path.display(), "file left the tracked set, stopping tailer");
            stop_child(path, child).await;
        }
    }

    /// Spawn a tailer plus the forwarder annotating its data events with the
    /// family derived from the basename.
    fn start_child(&self, path: PathBuf) -> Child {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let family = Family::from_basename(&name);

        let (tx, mut rx) = mpsc::channel(CHILD_CHANNEL_SIZE);
        let handle = FileTailer::new(path.clone(), self.config.file.clone(), tx).spawn();

        let out = self.out.clone();
        let forwarder = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if out
                    .send(TailEvent::from_file_event(event, family))
                    .await
                    .is_err()
                {
                    break;
                }
            }
        });

        info!(path = %path.display(), family = %family, "tracking file");
        Child { handle, forwarder }
    }

    fn install_watcher(&self) {
        let hints = Arc::clone(&self.hints);
        let watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            match res {
                Ok(event) => {
                    // Backends may emit pathless or `Other` events when
                    // details are unreliable; a rescan covers those.
                    if event.paths.is_empty() || matches!(event.kind, notify::EventKind::Other) {
                        hints.mark_rescan();
                        return;
                    }
                    for path in event.paths {
                        hints.mark(path);
                    }
                }
                Err(_) => hints.mark_rescan(),
            }
        });

        match watcher {
            Ok(mut watcher) => {
                match watcher.watch(&self.config.dir, RecursiveMode::NonRecursive) {
                    Ok(()) => {
                        *self.watcher.lock() = Some(watcher);
                        debug!(dir = %self.config.dir.display(), "change hints installed");
                    }
                    Err(e) => {
                        warn!(
                            dir = %self.config.dir.display(),
                            error = %e,
                            "cannot watch directory, relying on polling"
                        );
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "cannot create watcher, relying on polling");
            }
        }
    }

    /// Turn change hints into child pokes and debounced rescans.
    async fn hint_loop(self: Arc<Self>) {
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return,
                _ = self.hints.notified() => {}
            }
            // Pokes fire immediately; only the rescan is debounced.
            self.apply_hints();
            tokio::time::sleep(RESCAN_DEBOUNCE).await;
            self.apply_hints();
            self.scan().await;
        }
    }

    /// Poke the tailer of every hinted file that is tracked. Hints for
    /// anything else are covered by the rescan that follows.
    fn apply_hints(&self) {
        let paths = self.hints.drain();
        if paths.is_empty() {
            return;
        }
        let children = self.children.lock();
        for path in paths {
            if let Some(name) = path.file_name()
                && let Some(child) = children.get(&self.config.dir.join(name))
            {
                child.handle.poke();
            }
        }
    }

    async fn rescan_loop(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(RESCAN_INTERVAL);
        // The interval fires immediately; the initial scan already ran.
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return,
                _ = ticker.tick() => {}
            }
            self.scan().await;
        }
    }
}

/// Stop one child, bounded by the stop timeout. A stuck tailer is abandoned
/// with a warning rather than blocking shutdown.
async fn stop_child(path: PathBuf, child: Child) {
    let Child { handle, forwarder } = child;
    let forwarder_abort = forwarder.abort_handle();
    handle.cancel();
    match tokio::time::timeout(CHILD_STOP_TIMEOUT, handle.stopped()).await {
        Ok(()) => {
            // The tailer dropped its sender, so the forwarder drains and ends.
            if tokio::time::timeout(CHILD_STOP_TIMEOUT, forwarder).await.is_err() {
                warn!(path = %path.display(), "event forwarder did not drain, aborting");
                forwarder_abort.abort();
            }
        }
        Err(_) => {
            warn!(path = %path.display(), "file tailer stop timed out, abandoning");
            forwarder_abort.abort();
        }
    }
}

#[cfg(test)]
#[path = "dir_test.rs"]
mod tests;
