//! # Change Watcher
//!
//! Turns a stream of raw filesystem events into settled snapshots of the
//! watched tree.
//!
//! ## Loop
//!
//! ```text
//!            ┌──────────── initial scan ────────────┐
//!            ▼                                      │
//!   event ──► arm debounce ──(quiet period)──► scan ├──► on_settled(FileSet)
//!   safety tick ───────────────────────────► scan ─┘
//! ```
//!
//! Every raw event restarts the debounce countdown, so a burst of writes
//! produces one scan. A safety re-scan runs on a fixed interval in case
//! the platform dropped events.
//!
//! ## Pausing
//!
//! While paused (the coordinator pauses around its own downloads):
//! - events are consumed but do not arm the timer
//! - events still queued when the flag flips count as paused-period events
//! - pausing cancels an armed timer
//! - safety ticks are skipped
//! - a scan that completes while paused is discarded
//!
//! Resuming does not scan on its own; the next event or safety tick does.

use crate::fingerprint::{fingerprint_file, DEFAULT_CHUNK_SIZE};
use crate::model::{FileEntry, FileSet, RelativePath};
use crate::transfer::is_partial_download;
use crate::{Result, SyncError};
use bridge_traits::storage::{FileStat, FileTree};
use bridge_traits::watch::{EventSubscription, FileEventSource};
use core_async::sync::{watch, CancellationToken};
use core_async::task::JoinHandle;
use core_async::time::{interval_at, DebounceTimer, Duration, Instant, MissedTickBehavior};
use core_runtime::config::{CoreConfig, DEFAULT_DEBOUNCE, DEFAULT_SAFETY_INTERVAL};
use futures::{stream, StreamExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

/// Files fingerprinted concurrently during one scan.
const SCAN_CONCURRENCY: usize = 16;

/// Callback invoked with every settled snapshot.
pub type SettledCallback = Arc<dyn Fn(FileSet) + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatcherConfig {
    /// Quiet period after the last event before scanning
    pub debounce: Duration,
    /// Interval of unconditional re-scans
    pub safety_interval: Duration,
    /// Fingerprint chunk size
    pub chunk_size: usize,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
            safety_interval: DEFAULT_SAFETY_INTERVAL,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl From<&CoreConfig> for WatcherConfig {
    fn from(config: &CoreConfig) -> Self {
        Self {
            debounce: config.debounce,
            safety_interval: config.safety_interval,
            chunk_size: config.chunk_size,
        }
    }
}

/// Pause/resume seam between the coordinator and the watcher.
pub trait WatchControl: Send + Sync {
    fn pause(&self);
    fn resume(&self);
}

/// Shared paused flag.
///
/// Cloneable and usable before the watcher starts, so the coordinator can be
/// wired up first.
#[derive(Debug, Clone)]
pub struct PauseSwitch {
    tx: Arc<watch::Sender<bool>>,
}

impl PauseSwitch {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn pause(&self) {
        if !self.tx.send_replace(true) {
            debug!("Watcher paused");
        }
    }

    pub fn resume(&self) {
        if self.tx.send_replace(false) {
            debug!("Watcher resumed");
        }
    }

    pub fn is_paused(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

impl Default for PauseSwitch {
    fn default() -> Self {
        Self::new()
    }
}

impl WatchControl for PauseSwitch {
    fn pause(&self) {
        PauseSwitch::pause(self);
    }

    fn resume(&self) {
        PauseSwitch::resume(self);
    }
}

/// Debounced snapshot producer for one root.
pub struct ChangeWatcher {
    tree: Arc<dyn FileTree>,
    source: Arc<dyn FileEventSource>,
    config: WatcherConfig,
    switch: PauseSwitch,
}

impl ChangeWatcher {
    pub fn new(
        tree: Arc<dyn FileTree>,
        source: Arc<dyn FileEventSource>,
        config: WatcherConfig,
    ) -> Self {
        Self {
            tree,
            source,
            config,
            switch: PauseSwitch::new(),
        }
    }

    /// Share an existing paused flag, e.g. one the coordinator already holds.
    pub fn with_pause_switch(mut self, switch: PauseSwitch) -> Self {
        self.switch = switch;
        self
    }

    pub fn config(&self) -> &WatcherConfig {
        &self.config
    }

    /// Handle to the paused flag shared with the running loop.
    pub fn pause_switch(&self) -> PauseSwitch {
        self.switch.clone()
    }

    /// Subscribe to `root` and start the watch loop.
    ///
    /// Subscription failures are reported here; everything after that is
    /// logged by the loop. The first snapshot is delivered as soon as the
    /// initial scan finishes.
    pub fn start<F>(&self, root: PathBuf, on_settled: F) -> Result<WatcherHandle>
    where
        F: Fn(FileSet) + Send + Sync + 'static,
    {
        let subscription = self
            .source
            .subscribe(&root)
            .map_err(|e| SyncError::local(root.display(), e))?;

        info!(root = %root.display(), "Watching for changes");

        let stop = CancellationToken::new();
        let watch_loop = WatchLoop {
            scanner: Scanner {
                tree: Arc::clone(&self.tree),
                root,
                config: self.config.clone(),
                paused: self.switch.subscribe(),
                on_settled: Arc::new(on_settled),
            },
            subscription,
            paused: self.switch.subscribe(),
            stop: stop.clone(),
        };

        let task = core_async::spawn(watch_loop.run());

        Ok(WatcherHandle {
            switch: self.switch.clone(),
            stop,
            task: Some(task),
        })
    }
}

/// Handle to a running watch loop. Dropping it stops the loop.
#[derive(Debug)]
pub struct WatcherHandle {
    switch: PauseSwitch,
    stop: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl WatcherHandle {
    pub fn pause(&self) {
        self.switch.pause();
    }

    pub fn resume(&self) {
        self.switch.resume();
    }

    pub fn is_paused(&self) -> bool {
        self.switch.is_paused()
    }

    pub fn pause_switch(&self) -> PauseSwitch {
        self.switch.clone()
    }

    /// Stop the loop and wait for it to exit.
    pub async fn stop(mut self) {
        self.stop.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "Watch loop terminated abnormally");
            }
        }
    }
}

impl Drop for WatcherHandle {
    fn drop(&mut self) {
        self.stop.cancel();
    }
}

struct WatchLoop {
    scanner: Scanner,
    subscription: EventSubscription,
    paused: watch::Receiver<bool>,
    stop: CancellationToken,
}

impl WatchLoop {
    async fn run(mut self) {
        self.scanner.scan_and_report("initial").await;

        let mut timer = DebounceTimer::new(self.scanner.config.debounce);
        let period = self.scanner.config.safety_interval;
        let mut safety = interval_at(Instant::now() + period, period);
        safety.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            core_async::select! {
                // Pause changes must be seen before any event queued behind them.
                biased;

                _ = self.stop.cancelled() => {
                    debug!("Watch loop stopped");
                    break;
                }
                changed = self.paused.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let paused = *self.paused.borrow_and_update();
                    let dropped = self.drain_queued_events();
                    if paused && timer.cancel() {
                        debug!("Pending scan cancelled by pause");
                    }
                    if dropped > 0 {
                        trace!(dropped, paused, "Queued events superseded by pause change");
                    }
                }
                event = self.subscription.recv() => match event {
                    Some(event) => {
                        if *self.paused.borrow() {
                            trace!(paths = ?event.paths, "Event ignored while paused");
                        } else {
                            trace!(paths = ?event.paths, "Change observed");
                            timer.arm();
                        }
                    }
                    None => {
                        debug!("Event source closed");
                        break;
                    }
                },
                _ = timer.fired() => {
                    self.scanner.scan_and_report("debounce").await;
                }
                _ = safety.tick() => {
                    if *self.paused.borrow() {
                        trace!("Safety re-scan skipped while paused");
                    } else {
                        self.scanner.scan_and_report("safety").await;
                    }
                }
            }
        }
    }

    /// Discard events delivered before the latest pause change.
    ///
    /// A resume can land while writes made under the pause are still queued;
    /// those belong to the paused period and must not arm the timer.
    fn drain_queued_events(&mut self) -> usize {
        let mut dropped = 0;
        while self.subscription.try_recv().is_some() {
            dropped += 1;
        }
        dropped
    }
}

/// The part of the loop that scans; shared by reference across awaits.
struct Scanner {
    tree: Arc<dyn FileTree>,
    root: PathBuf,
    config: WatcherConfig,
    paused: watch::Receiver<bool>,
    on_settled: SettledCallback,
}

impl Scanner {
    async fn scan_and_report(&self, trigger: &'static str) {
        let snapshot = match scan_tree(self.tree.as_ref(), &self.root, self.config.chunk_size).await
        {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(trigger, root = %self.root.display(), error = %e, "Scan failed");
                return;
            }
        };

        if *self.paused.borrow() {
            debug!(trigger, files = snapshot.len(), "Scan discarded, watcher paused");
            return;
        }

        debug!(trigger, files = snapshot.len(), "Tree settled");
        (self.on_settled)(snapshot);
    }
}

/// Build a snapshot of every regular file under `root`.
///
/// Individual files that cannot be read, whose path is not a valid relative
/// path, or that are in-progress downloads are left out of the snapshot; only
/// a failure to enumerate the root itself is an error.
pub async fn scan_tree(tree: &dyn FileTree, root: &Path, chunk_size: usize) -> Result<FileSet> {
    let stats = tree
        .enumerate(root)
        .await
        .map_err(|e| SyncError::local(root.display(), e))?;

    let entries: Vec<Option<FileEntry>> = stream::iter(stats)
        .map(|stat| scan_entry(tree, root, stat, chunk_size))
        .buffer_unordered(SCAN_CONCURRENCY)
        .collect()
        .await;

    Ok(entries.into_iter().flatten().collect())
}

async fn scan_entry(
    tree: &dyn FileTree,
    root: &Path,
    stat: FileStat,
    chunk_size: usize,
) -> Option<FileEntry> {
    if is_partial_download(&stat.absolute_path) {
        trace!(path = %stat.absolute_path.display(), "Skipping in-progress download");
        return None;
    }

    let path = match RelativePath::from_path(root, &stat.absolute_path) {
        Ok(path) => path,
        Err(e) => {
            debug!(path = %stat.absolute_path.display(), error = %e, "Skipping file");
            return None;
        }
    };

    match fingerprint_file(tree, &stat.absolute_path, chunk_size).await {
        Ok(fingerprint) => Some(FileEntry::new(path, stat.modified_at, fingerprint)),
        Err(e) => {
            debug!(path = %path, error = %e, "Skipping unreadable file");
            None
        }
    }
}
