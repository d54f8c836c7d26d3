//! Local File Tree Implementation using Tokio

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    storage::{DynAsyncRead, DynAsyncWrite, FileStat, FileTree},
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// Tokio-based file tree implementation
///
/// Walks directories iteratively with an explicit stack so deep trees never
/// recurse on the call stack. Symlinks are followed for the entry itself but
/// only regular files are reported.
#[derive(Debug, Clone, Default)]
pub struct TokioFileTree;

impl TokioFileTree {
    pub fn new() -> Self {
        Self
    }

    /// Convert std::io::Error to BridgeError
    fn map_io_error(e: std::io::Error) -> BridgeError {
        BridgeError::Io(e)
    }

    /// Only the root has to be readable; anything below it may vanish mid-walk.
    fn tolerate_walk_error(dir: &Path, is_root: bool, e: std::io::Error) -> Result<()> {
        if is_root {
            return Err(Self::map_io_error(e));
        }
        debug!(path = ?dir, error = %e, "Skipping unreadable directory");
        Ok(())
    }

    async fn create_parent_dirs(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .await
                    .map_err(Self::map_io_error)?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl FileTree for TokioFileTree {
    async fn enumerate(&self, root: &Path) -> Result<Vec<FileStat>> {
        let mut files = Vec::new();
        let mut pending: Vec<PathBuf> = vec![root.to_path_buf()];
        let mut is_root = true;

        while let Some(dir) = pending.pop() {
            let at_root = is_root;
            is_root = false;

            let mut read_dir = match fs::read_dir(&dir).await {
                Ok(read_dir) => read_dir,
                Err(e) => {
                    Self::tolerate_walk_error(&dir, at_root, e)?;
                    continue;
                }
            };

            loop {
                let entry = match read_dir.next_entry().await {
                    Ok(Some(entry)) => entry,
                    Ok(None) => break,
                    Err(e) => {
                        Self::tolerate_walk_error(&dir, at_root, e)?;
                        break;
                    }
                };
                let path = entry.path();
                let metadata = match fs::metadata(&path).await {
                    Ok(metadata) => metadata,
                    Err(e) if e.kind() == ErrorKind::NotFound => {
                        debug!(path = ?path, "Entry disappeared during walk");
                        continue;
                    }
                    Err(e) => {
                        debug!(path = ?path, error = %e, "Skipping entry without metadata");
                        continue;
                    }
                };

                if metadata.is_dir() {
                    pending.push(path);
                } else if metadata.is_file() {
                    let modified_at = match metadata.modified() {
                        Ok(time) => DateTime::<Utc>::from(time),
                        Err(e) => {
                            debug!(path = ?path, error = %e, "Skipping entry without mtime");
                            continue;
                        }
                    };
                    files.push(FileStat {
                        absolute_path: path,
                        modified_at,
                    });
                }
            }
        }

        debug!(path = ?root, count = files.len(), "Enumerated file tree");
        Ok(files)
    }

    async fn read_file(&self, path: &Path) -> Result<Bytes> {
        let data = fs::read(path).await.map_err(Self::map_io_error)?;
        debug!(path = ?path, size = data.len(), "Read file");
        Ok(Bytes::from(data))
    }

    async fn open_read_stream(&self, path: &Path) -> Result<Box<DynAsyncRead>> {
        let file = fs::File::open(path).await.map_err(Self::map_io_error)?;
        debug!(path = ?path, "Opened file for reading");
        Ok(Box::new(file))
    }

    async fn open_write_stream(&self, path: &Path) -> Result<Box<DynAsyncWrite>> {
        Self::create_parent_dirs(path).await?;

        let file = fs::File::create(path).await.map_err(Self::map_io_error)?;
        debug!(path = ?path, "Opened file for writing");
        Ok(Box::new(file))
    }

    async fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        fs::rename(from, to).await.map_err(Self::map_io_error)?;
        debug!(from = ?from, to = ?to, "Renamed file");
        Ok(())
    }

    async fn remove_file(&self, path: &Path) -> Result<()> {
        fs::remove_file(path).await.map_err(Self::map_io_error)?;
        debug!(path = ?path, "Removed file");
        Ok(())
    }
}
