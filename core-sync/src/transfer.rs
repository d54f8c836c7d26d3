//! # Transfer Orchestrator
//!
//! Applies a [`DiffResult`] against the object store and the local tree.
//!
//! Phases run in a fixed order (upload, update, download). Within a phase
//! entries are split into batches; batches run one after another and every
//! transfer in a batch runs as its own task. A failed transfer is recorded
//! in the [`TransferReport`] and never stops its batch or phase. Nothing is
//! retried here; the next cycle picks up whatever is still different.
//!
//! Downloads are staged in a hidden sibling file and renamed over the target
//! only once the whole object has been written. An interrupted download
//! leaves the target untouched, so it still reads as remote-newer next cycle.

use crate::model::{DiffResult, FileEntry, FileSet, RelativePath};
use crate::{Result, SyncError};
use bridge_traits::storage::{DynAsyncRead, FileTree, ObjectStore};
use core_async::io::{self, AsyncWriteExt};
use core_runtime::config::DEFAULT_BATCH_SIZE;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

/// Suffix of in-progress download files; scans never report these.
pub const PARTIAL_SUFFIX: &str = ".treesync-part";

/// Whether `path` names an in-progress download.
pub fn is_partial_download(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.ends_with(PARTIAL_SUFFIX))
}

fn partial_path(target: &Path) -> PathBuf {
    let name = target
        .file_name()
        .map(|name| name.to_string_lossy())
        .unwrap_or_default();
    target.with_file_name(format!(".{name}{PARTIAL_SUFFIX}"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransferKind {
    /// New local file, created remotely
    Upload,
    /// Newer local file, replaced remotely
    Update,
    /// Remote file written locally
    Download,
}

impl fmt::Display for TransferKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransferKind::Upload => "upload",
            TransferKind::Update => "update",
            TransferKind::Download => "download",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferFailure {
    pub path: RelativePath,
    pub kind: TransferKind,
    pub cause: String,
}

/// Per-item outcome of one [`TransferOrchestrator::apply`] pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferReport {
    pub uploaded: Vec<RelativePath>,
    pub updated: Vec<RelativePath>,
    pub downloaded: Vec<RelativePath>,
    pub failures: Vec<TransferFailure>,
}

impl TransferReport {
    pub fn succeeded(&self) -> usize {
        self.uploaded.len() + self.updated.len() + self.downloaded.len()
    }

    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    fn record_success(&mut self, kind: TransferKind, path: RelativePath) {
        match kind {
            TransferKind::Upload => self.uploaded.push(path),
            TransferKind::Update => self.updated.push(path),
            TransferKind::Download => self.downloaded.push(path),
        }
    }

    fn record_failure(&mut self, kind: TransferKind, path: RelativePath, cause: String) {
        self.failures.push(TransferFailure { path, kind, cause });
    }
}

/// Moves file contents between the local tree and the object store.
#[derive(Clone)]
pub struct TransferOrchestrator {
    store: Arc<dyn ObjectStore>,
    tree: Arc<dyn FileTree>,
    root: PathBuf,
    batch_size: usize,
}

impl TransferOrchestrator {
    /// A zero batch size is treated as one.
    pub fn new(
        store: Arc<dyn ObjectStore>,
        tree: Arc<dyn FileTree>,
        root: impl Into<PathBuf>,
        batch_size: usize,
    ) -> Self {
        Self {
            store,
            tree,
            root: root.into(),
            batch_size: batch_size.max(1),
        }
    }

    /// Orchestrator with the default batch size.
    pub fn with_defaults(
        store: Arc<dyn ObjectStore>,
        tree: Arc<dyn FileTree>,
        root: impl Into<PathBuf>,
    ) -> Self {
        Self::new(store, tree, root, DEFAULT_BATCH_SIZE)
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    #[instrument(
        skip(self, diff),
        fields(
            upload = diff.to_upload.len(),
            update = diff.to_update.len(),
            download = diff.to_download.len()
        )
    )]
    pub async fn apply(&self, diff: &DiffResult) -> TransferReport {
        let mut report = TransferReport::default();

        self.run_phase(TransferKind::Upload, &diff.to_upload, &mut report)
            .await;
        self.run_phase(TransferKind::Update, &diff.to_update, &mut report)
            .await;
        self.run_phase(TransferKind::Download, &diff.to_download, &mut report)
            .await;

        info!(
            succeeded = report.succeeded(),
            failed = report.failed(),
            "Transfers finished"
        );
        report
    }

    async fn run_phase(&self, kind: TransferKind, entries: &FileSet, report: &mut TransferReport) {
        if entries.is_empty() {
            return;
        }

        let entries: Vec<&FileEntry> = entries.iter().collect();
        let batches = entries.len().div_ceil(self.batch_size);

        for (index, batch) in entries.chunks(self.batch_size).enumerate() {
            debug!(%kind, batch = index + 1, batches, size = batch.len(), "Starting batch");

            let mut handles = Vec::with_capacity(batch.len());
            for entry in batch {
                let job = self.clone();
                let entry = (*entry).clone();
                let path = entry.path.clone();

                let handle =
                    core_async::spawn(async move { job.transfer_one(kind, &entry).await });
                handles.push((path, handle));
            }

            for (path, handle) in handles {
                match handle.await {
                    Ok(Ok(())) => report.record_success(kind, path),
                    Ok(Err(e)) => {
                        warn!(path = %path, %kind, error = %e, "Transfer failed");
                        report.record_failure(kind, path, e.to_string());
                    }
                    Err(e) => {
                        error!(path = %path, %kind, error = %e, "Transfer task panicked");
                        report.record_failure(kind, path, e.to_string());
                    }
                }
            }
        }
    }

    async fn transfer_one(&self, kind: TransferKind, entry: &FileEntry) -> Result<()> {
        let key = entry.path.as_str();
        let local_path = entry.path.to_path(&self.root);

        match kind {
            TransferKind::Upload => {
                let data = self
                    .tree
                    .read_file(&local_path)
                    .await
                    .map_err(|e| SyncError::local(local_path.display(), e))?;
                self.store.put_object(key, data).await?;
            }
            TransferKind::Update => {
                let data = self
                    .tree
                    .read_file(&local_path)
                    .await
                    .map_err(|e| SyncError::local(local_path.display(), e))?;
                self.store.replace_object(key, data).await?;
            }
            TransferKind::Download => self.download(key, &local_path).await?,
        }

        debug!(path = %entry.path, %kind, "Transferred");
        Ok(())
    }

    async fn download(&self, key: &str, target: &Path) -> Result<()> {
        let mut reader = self.store.get_object_stream(key).await?;
        let staged = partial_path(target);

        let written = match self.write_staged(&mut reader, &staged).await {
            Ok(()) => self
                .tree
                .rename(&staged, target)
                .await
                .map_err(|e| SyncError::local(target.display(), e)),
            Err(e) => Err(e),
        };

        if written.is_err() {
            if let Err(e) = self.tree.remove_file(&staged).await {
                debug!(path = %staged.display(), error = %e, "Staged download not removed");
            }
        }
        written
    }

    async fn write_staged(&self, reader: &mut Box<DynAsyncRead>, staged: &Path) -> Result<()> {
        let mut writer = self
            .tree
            .open_write_stream(staged)
            .await
            .map_err(|e| SyncError::local(staged.display(), e))?;

        io::copy(reader, &mut writer)
            .await
            .map_err(|e| SyncError::io(staged.display(), e))?;
        writer
            .shutdown()
            .await
            .map_err(|e| SyncError::io(staged.display(), e))
    }
}
