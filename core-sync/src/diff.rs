//! # Diff Classifier
//!
//! Three-way classification of a local snapshot against a remote one.
//!
//! ```text
//!                     remote absent    remote present, fingerprint differs
//! local present       upload           local newer  → update
//!                                      remote newer → download
//!                                      same instant → nothing
//! local absent        -                download
//! ```
//!
//! Entries with equal fingerprints are never moved, whatever their
//! timestamps say. Equal timestamps with differing content are left alone;
//! there is no tie-breaker beyond last-write-wins on a strictly newer side.

use crate::model::{DiffResult, FileSet};
use std::cmp::Ordering;
use tracing::debug;

/// Classify `local` against `remote`.
///
/// Upload and update sets carry the local entries; the download set carries
/// the remote entries. Pure and deterministic.
pub fn classify(local: &FileSet, remote: &FileSet) -> DiffResult {
    let mut to_upload = Vec::new();
    let mut to_update = Vec::new();
    let mut to_download = Vec::new();

    for local_entry in local {
        let Some(remote_entry) = remote.get(&local_entry.path) else {
            to_upload.push(local_entry.clone());
            continue;
        };

        if local_entry.fingerprint == remote_entry.fingerprint {
            continue;
        }

        match local_entry.modified_at.cmp(&remote_entry.modified_at) {
            Ordering::Greater => to_update.push(local_entry.clone()),
            Ordering::Less => to_download.push(remote_entry.clone()),
            Ordering::Equal => {
                debug!(
                    path = %local_entry.path,
                    local = %local_entry.fingerprint,
                    remote = %remote_entry.fingerprint,
                    "Content differs with identical timestamps; leaving both sides"
                );
            }
        }
    }

    for remote_entry in remote {
        if !local.contains(&remote_entry.path) {
            to_download.push(remote_entry.clone());
        }
    }

    DiffResult {
        to_upload: to_upload.into_iter().collect(),
        to_update: to_update.into_iter().collect(),
        to_download: to_download.into_iter().collect(),
    }
}
