//! Storage and File System Abstractions
//!
//! Two collaborators sit on either side of a transfer:
//! - [`ObjectStore`]: the durable remote store that persists file bytes
//! - [`FileTree`]: the local directory tree being watched
//!
//! Both are addressed by plain strings/paths here. Validation of relative
//! paths happens in the sync engine before any call reaches a bridge.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Boxed async reader handed across the bridge.
pub type DynAsyncRead = dyn core_async::io::AsyncRead + Send + Unpin;

/// Boxed async writer handed across the bridge.
pub type DynAsyncWrite = dyn core_async::io::AsyncWrite + Send + Unpin;

/// One object as reported by an [`ObjectStore`] listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectInfo {
    /// Object key, a `/`-separated relative path
    pub path: String,
    /// Last modification time recorded by the store
    pub modified_at: DateTime<Utc>,
    /// Content identity as the store reports it (may be quoted)
    pub etag: String,
}

/// Remote object store trait
///
/// Abstracts the durable backing store (S3-style bucket, HTTP file service,
/// in-memory fake). Every failure should surface as
/// [`BridgeError::Storage`](crate::error::BridgeError::Storage) with the
/// operation, key and cause so the caller can log it and move on.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::storage::ObjectStore;
///
/// async fn publish(store: &dyn ObjectStore, data: bytes::Bytes) -> Result<()> {
///     store.put_object("notes/today.md", data).await?;
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Create an object under `path`
    async fn put_object(&self, path: &str, data: Bytes) -> Result<()>;

    /// Replace the object under `path`
    ///
    /// Stores without a native replace verb fall back to delete-then-put.
    async fn replace_object(&self, path: &str, data: Bytes) -> Result<()> {
        self.delete_object(path).await?;
        self.put_object(path, data).await
    }

    /// List every object in the store
    async fn list_objects(&self) -> Result<Vec<ObjectInfo>>;

    /// Delete the object under `path`
    async fn delete_object(&self, path: &str) -> Result<()>;

    /// Open a byte stream over the object under `path`
    async fn get_object_stream(&self, path: &str) -> Result<Box<DynAsyncRead>>;
}

/// A regular file found while enumerating a [`FileTree`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStat {
    pub absolute_path: PathBuf,
    pub modified_at: DateTime<Utc>,
}

/// Local file tree trait
///
/// The primitives the watcher and the transfer orchestrator need from the
/// local filesystem. Desktop builds use a Tokio-backed implementation; tests
/// substitute in-memory trees.
#[async_trait]
pub trait FileTree: Send + Sync {
    /// Enumerate every regular file under `root`, recursively
    ///
    /// Directories are walked but not returned. Hidden files are included.
    /// Entries that disappear mid-walk are skipped rather than reported.
    async fn enumerate(&self, root: &Path) -> Result<Vec<FileStat>>;

    /// Read entire file contents into memory
    async fn read_file(&self, path: &Path) -> Result<Bytes>;

    /// Open a file for streaming reads
    async fn open_read_stream(&self, path: &Path) -> Result<Box<DynAsyncRead>>;

    /// Open a file for streaming writes, truncating it
    ///
    /// Missing parent directories are created.
    async fn open_write_stream(&self, path: &Path) -> Result<Box<DynAsyncWrite>>;

    /// Move `from` onto `to`, replacing whatever is there
    async fn rename(&self, from: &Path, to: &Path) -> Result<()>;

    /// Delete a single file
    async fn remove_file(&self, path: &Path) -> Result<()>;
}
