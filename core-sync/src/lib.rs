//! # Reconciliation Engine
//!
//! Keeps a local directory tree and a remote object store converging.
//!
//! ## Overview
//!
//! The client watches its tree, and whenever the tree settles it asks the
//! server whether anything differs. If so it requests a three-way diff and
//! moves files in whichever direction is newer:
//!
//! ```text
//! FileEventSource ─► ChangeWatcher ─► ReconcileCoordinator ─► CorrelationChannel ─► server
//!                        ▲                     │                                      │
//!                        └─── pause/resume ────┤                               RemoteResponder
//!                                              ▼
//!                                    TransferOrchestrator ─► ObjectStore / FileTree
//! ```
//!
//! ## Components
//!
//! - **Model** (`model`): relative paths, fingerprints, snapshots and diffs
//! - **Fingerprints** (`fingerprint`): S3-style chunked MD5 per file, SHA-256 per snapshot
//! - **Change Watcher** (`watcher`): debounced, pausable snapshots of the tree
//! - **Protocol** (`protocol`): the JSON envelope and operation names
//! - **Correlation Channel** (`channel`): request/reply over a message transport
//! - **Diff Classifier** (`diff`): upload / update / download by last-write-wins
//! - **Transfer Orchestrator** (`transfer`): batched concurrent transfers
//! - **Coordinator** (`coordinator`): the per-snapshot cycle and its state machine
//! - **Remote Responder** (`responder`): the server side of the protocol
//! - **Loopback** (`loopback`): in-memory transport pair

pub mod channel;
pub mod coordinator;
pub mod diff;
pub mod error;
pub mod fingerprint;
pub mod loopback;
pub mod model;
pub mod protocol;
pub mod responder;
pub mod transfer;
pub mod watcher;

pub use channel::CorrelationChannel;
pub use coordinator::{CycleId, CycleOutcome, CycleState, ReconcileConfig, ReconcileCoordinator};
pub use diff::classify;
pub use error::{Result, SyncError};
pub use fingerprint::{fingerprint_file, fingerprint_file_set, fingerprint_reader, ChunkedDigest};
pub use loopback::LoopbackTransport;
pub use model::{DiffResult, FileEntry, FileSet, Fingerprint, RelativePath};
pub use responder::RemoteResponder;
pub use transfer::{TransferFailure, TransferKind, TransferOrchestrator, TransferReport};
pub use watcher::{
    scan_tree, ChangeWatcher, PauseSwitch, WatchControl, WatcherConfig, WatcherHandle,
};
