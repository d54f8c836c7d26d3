//! # Reconciliation Coordinator
//!
//! Drives one reconciliation cycle per settled snapshot of the watched tree.
//!
//! ## Cycle
//!
//! 1. Compute the aggregate fingerprint of the snapshot
//! 2. Probe `check-files-update`; stop here if the server reports no change
//! 3. Request `get-file-diff` with the full snapshot
//! 4. Pause the watcher, apply the diff, resume the watcher
//!
//! ## State Machine
//!
//! ```text
//! Watching → ProbeSent → DiffRequested → Transferring
//!    ↑           │             │              │
//!    └───────────┴─────────────┴──────────────┘
//! ```
//!
//! Any failure returns the machine to `Watching`.
//!
//! ## Admission
//!
//! Only one cycle runs at a time. A snapshot whose fingerprint is already
//! being reconciled is dropped. A snapshot arriving while another cycle
//! runs is parked; only the latest parked snapshot survives, and it runs as
//! soon as the current cycle ends. The fingerprint is released when its
//! cycle ends, whether it succeeded or not.

use crate::channel::CorrelationChannel;
use crate::fingerprint::fingerprint_file_set;
use crate::model::{DiffResult, FileSet, Fingerprint};
use crate::protocol::{UpdateStatus, CHECK_FILES_UPDATE, GET_FILE_DIFF};
use crate::transfer::{TransferOrchestrator, TransferReport};
use crate::watcher::WatchControl;
use crate::{Result, SyncError};
use bridge_traits::storage::{FileTree, ObjectStore};
use bridge_traits::transport::MessageTransport;
use core_async::sync::watch;
use core_async::time::{Duration, Instant};
use core_runtime::config::{CoreConfig, DEFAULT_BATCH_SIZE, DEFAULT_CALL_TIMEOUT};
use core_runtime::events::{CoreEvent, EventBus, ReconcileEvent};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

// ============================================================================
// ID Types
// ============================================================================

/// Identifies one reconciliation cycle in logs and events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CycleId(Uuid);

impl CycleId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CycleId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CycleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// State Machine
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleState {
    /// Idle, waiting for the next settled snapshot
    Watching,
    /// Probe sent, waiting for `{update}`
    ProbeSent,
    /// Snapshot sent, waiting for the diff
    DiffRequested,
    /// Applying the diff
    Transferring,
}

impl CycleState {
    pub fn can_transition_to(self, next: CycleState) -> bool {
        use CycleState::*;
        matches!(
            (self, next),
            (Watching, ProbeSent)
                | (ProbeSent, Watching)
                | (ProbeSent, DiffRequested)
                | (DiffRequested, Watching)
                | (DiffRequested, Transferring)
                | (Transferring, Watching)
        )
    }

    /// Validate a transition.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidStateTransition`] if `next` is not
    /// reachable from `self`.
    pub fn transition(self, next: CycleState) -> Result<CycleState> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(SyncError::InvalidStateTransition {
                from: self.to_string(),
                to: next.to_string(),
            })
        }
    }
}

impl fmt::Display for CycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CycleState::Watching => "watching",
            CycleState::ProbeSent => "probe_sent",
            CycleState::DiffRequested => "diff_requested",
            CycleState::Transferring => "transferring",
        };
        f.write_str(name)
    }
}

// ============================================================================
// Configuration
// ============================================================================

/// Settings for the client side of reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileConfig {
    /// Local root the snapshots are taken from
    pub root_dir: PathBuf,
    /// Maximum concurrent transfers per batch
    pub batch_size: usize,
    /// Upper bound on each protocol call
    pub call_timeout: Duration,
}

impl ReconcileConfig {
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
            batch_size: DEFAULT_BATCH_SIZE,
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    /// Channel over `transport` with this configuration's call timeout.
    pub fn channel(&self, transport: Arc<dyn MessageTransport>) -> CorrelationChannel {
        CorrelationChannel::with_timeout(transport, self.call_timeout)
    }

    /// Orchestrator rooted at `root_dir` with this configuration's batch size.
    pub fn orchestrator(
        &self,
        store: Arc<dyn ObjectStore>,
        tree: Arc<dyn FileTree>,
    ) -> TransferOrchestrator {
        TransferOrchestrator::new(store, tree, self.root_dir.clone(), self.batch_size)
    }
}

impl From<&CoreConfig> for ReconcileConfig {
    fn from(config: &CoreConfig) -> Self {
        Self {
            root_dir: config.root_dir.clone(),
            batch_size: config.batch_size,
            call_timeout: config.call_timeout,
        }
    }
}

// ============================================================================
// Coordinator
// ============================================================================

/// Result of handing a snapshot to the coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The server already matches the snapshot
    UpToDate,
    /// The diff was applied
    Transferred(TransferReport),
    /// Deduplicated, or parked behind a running cycle
    Skipped,
}

#[derive(Default)]
struct CycleGate {
    running: bool,
    in_flight: HashSet<Fingerprint>,
    parked: Option<(Fingerprint, FileSet)>,
}

/// Keeps the watcher paused while transfers write into the tree.
struct PauseGuard<'a> {
    control: &'a dyn WatchControl,
}

impl<'a> PauseGuard<'a> {
    fn new(control: &'a dyn WatchControl) -> Self {
        control.pause();
        Self { control }
    }
}

impl Drop for PauseGuard<'_> {
    fn drop(&mut self) {
        self.control.resume();
    }
}

/// Client-side reconciliation for one watched root.
pub struct ReconcileCoordinator {
    channel: Arc<CorrelationChannel>,
    orchestrator: Arc<TransferOrchestrator>,
    watch_control: Arc<dyn WatchControl>,
    config: ReconcileConfig,
    event_bus: Option<EventBus>,
    state: watch::Sender<CycleState>,
    gate: Mutex<CycleGate>,
}

impl ReconcileCoordinator {
    pub fn new(
        channel: Arc<CorrelationChannel>,
        orchestrator: Arc<TransferOrchestrator>,
        watch_control: Arc<dyn WatchControl>,
        config: ReconcileConfig,
    ) -> Self {
        let (state, _rx) = watch::channel(CycleState::Watching);
        Self {
            channel,
            orchestrator,
            watch_control,
            config,
            event_bus: None,
            state,
            gate: Mutex::new(CycleGate::default()),
        }
    }

    /// Publish cycle progress on `bus`.
    pub fn with_event_bus(mut self, bus: EventBus) -> Self {
        self.event_bus = Some(bus);
        self
    }

    pub fn config(&self) -> &ReconcileConfig {
        &self.config
    }

    pub fn state(&self) -> CycleState {
        *self.state.borrow()
    }

    /// Observe state changes.
    pub fn subscribe_state(&self) -> watch::Receiver<CycleState> {
        self.state.subscribe()
    }

    /// Callback for [`ChangeWatcher::start`](crate::watcher::ChangeWatcher::start).
    ///
    /// Each snapshot is handled on its own task so the watch loop never
    /// waits on the network.
    pub fn settled_callback(self: &Arc<Self>) -> impl Fn(FileSet) + Send + Sync + 'static {
        let coordinator = Arc::clone(self);
        move |snapshot| {
            let coordinator = Arc::clone(&coordinator);
            core_async::spawn(async move {
                // Failures are logged and published by the cycle itself.
                let _ = coordinator.handle_settled(snapshot).await;
            });
        }
    }

    /// Admit a settled snapshot and run its cycle if nothing else is running.
    ///
    /// Returns the outcome of this snapshot's own cycle. Parked snapshots
    /// that run afterwards on this call are logged, not returned.
    pub async fn handle_settled(&self, snapshot: FileSet) -> Result<CycleOutcome> {
        let fingerprint = fingerprint_file_set(&snapshot);

        {
            let mut gate = self.gate();
            if gate.in_flight.contains(&fingerprint) {
                debug!(fingerprint = %fingerprint, "Snapshot already being reconciled");
                return Ok(CycleOutcome::Skipped);
            }
            if gate.running {
                debug!(fingerprint = %fingerprint, "Cycle running, parking snapshot");
                gate.parked = Some((fingerprint, snapshot));
                return Ok(CycleOutcome::Skipped);
            }
            gate.running = true;
            gate.in_flight.insert(fingerprint.clone());
        }

        let first = self.run_cycle(CycleId::new(), &fingerprint, &snapshot).await;
        let mut next = self.finish_cycle(&fingerprint);

        while let Some((fingerprint, snapshot)) = next {
            // Errors were already reported by `run_cycle`.
            let _ = self.run_cycle(CycleId::new(), &fingerprint, &snapshot).await;
            next = self.finish_cycle(&fingerprint);
        }

        first
    }

    /// Release `fingerprint` and claim the parked snapshot, if any.
    fn finish_cycle(&self, fingerprint: &Fingerprint) -> Option<(Fingerprint, FileSet)> {
        let mut gate = self.gate();
        gate.in_flight.remove(fingerprint);

        match gate.parked.take() {
            Some((fingerprint, snapshot)) => {
                gate.in_flight.insert(fingerprint.clone());
                Some((fingerprint, snapshot))
            }
            None => {
                gate.running = false;
                None
            }
        }
    }

    #[instrument(
        skip_all,
        fields(cycle_id = %cycle_id, fingerprint = %fingerprint, files = snapshot.len())
    )]
    async fn run_cycle(
        &self,
        cycle_id: CycleId,
        fingerprint: &Fingerprint,
        snapshot: &FileSet,
    ) -> Result<CycleOutcome> {
        self.emit(ReconcileEvent::CycleStarted {
            cycle_id: cycle_id.to_string(),
            fingerprint: fingerprint.to_string(),
            file_count: snapshot.len() as u64,
        });

        let result = self.execute_cycle(cycle_id, fingerprint, snapshot).await;

        if let Err(e) = &result {
            warn!(
                root = %self.config.root_dir.display(),
                error = %e,
                "Reconciliation cycle failed"
            );
            self.state.send_replace(CycleState::Watching);
            self.emit(ReconcileEvent::CycleFailed {
                cycle_id: cycle_id.to_string(),
                message: e.to_string(),
            });
        }

        result
    }

    async fn execute_cycle(
        &self,
        cycle_id: CycleId,
        fingerprint: &Fingerprint,
        snapshot: &FileSet,
    ) -> Result<CycleOutcome> {
        self.transition(CycleState::ProbeSent)?;
        let status: UpdateStatus = self
            .channel
            .call(CHECK_FILES_UPDATE, fingerprint.as_str())
            .await?;

        if !status.update {
            self.transition(CycleState::Watching)?;
            debug!("Remote matches local snapshot");
            self.emit(ReconcileEvent::UpToDate {
                cycle_id: cycle_id.to_string(),
            });
            return Ok(CycleOutcome::UpToDate);
        }

        self.transition(CycleState::DiffRequested)?;
        let diff: DiffResult = self.channel.call(GET_FILE_DIFF, snapshot).await?;

        info!(
            to_upload = diff.to_upload.len(),
            to_update = diff.to_update.len(),
            to_download = diff.to_download.len(),
            "Diff received"
        );
        self.emit(ReconcileEvent::DiffReceived {
            cycle_id: cycle_id.to_string(),
            to_upload: diff.to_upload.len() as u64,
            to_update: diff.to_update.len() as u64,
            to_download: diff.to_download.len() as u64,
        });

        if diff.is_empty() {
            self.transition(CycleState::Watching)?;
            self.emit(ReconcileEvent::UpToDate {
                cycle_id: cycle_id.to_string(),
            });
            return Ok(CycleOutcome::UpToDate);
        }

        self.transition(CycleState::Transferring)?;
        let started = Instant::now();
        let report = {
            let _paused = PauseGuard::new(self.watch_control.as_ref());
            self.orchestrator.apply(&diff).await
        };
        self.transition(CycleState::Watching)?;

        self.emit(ReconcileEvent::TransferCompleted {
            cycle_id: cycle_id.to_string(),
            uploaded: report.uploaded.len() as u64,
            updated: report.updated.len() as u64,
            downloaded: report.downloaded.len() as u64,
            failed: report.failed() as u64,
            duration_ms: started.elapsed().as_millis() as u64,
        });

        Ok(CycleOutcome::Transferred(report))
    }

    fn transition(&self, next: CycleState) -> Result<()> {
        let current = *self.state.borrow();
        let next = current.transition(next)?;
        self.state.send_replace(next);
        debug!(from = %current, to = %next, "State changed");
        Ok(())
    }

    fn emit(&self, event: ReconcileEvent) {
        if let Some(bus) = &self.event_bus {
            // No subscribers is not an error.
            let _ = bus.emit(CoreEvent::Reconcile(event));
        }
    }

    fn gate(&self) -> MutexGuard<'_, CycleGate> {
        self.gate.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
