//! # Reconciliation Data Model
//!
//! Value types exchanged between the watcher, the diff classifier and the
//! remote side.
//!
//! ## Overview
//!
//! - [`RelativePath`]: a validated, `/`-separated path below the synced root
//! - [`Fingerprint`]: an opaque content-identity token compared byte for byte
//! - [`FileEntry`]: one file's path, modification time and fingerprint
//! - [`FileSet`]: an immutable snapshot of entries keyed by path
//! - [`DiffResult`]: the three disjoint sets of files to move
//!
//! All of them serialize to the JSON shapes used on the wire.

use crate::{Result, SyncError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;

// ============================================================================
// RelativePath
// ============================================================================

/// A relative path identifying a file below the synced root.
///
/// Separators are normalized to `/`, `.` and empty segments are dropped.
/// Absolute paths, drive prefixes and `..` segments are rejected, so a
/// `RelativePath` can always be joined onto the root without escaping it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RelativePath(String);

impl RelativePath {
    pub fn new(raw: impl AsRef<str>) -> Result<Self> {
        let raw = raw.as_ref();
        let invalid = |reason: &str| SyncError::InvalidPath {
            path: raw.to_string(),
            reason: reason.to_string(),
        };

        let unified = raw.replace('\\', "/");
        if unified.trim().is_empty() {
            return Err(invalid("path is empty"));
        }
        if unified.starts_with('/') {
            return Err(invalid("path is absolute"));
        }
        let bytes = unified.as_bytes();
        if bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' {
            return Err(invalid("path has a drive prefix"));
        }

        let mut segments = Vec::new();
        for segment in unified.split('/') {
            match segment {
                "" | "." => continue,
                ".." => return Err(invalid("path escapes the root")),
                other => segments.push(other),
            }
        }

        if segments.is_empty() {
            return Err(invalid("path has no segments"));
        }

        Ok(Self(segments.join("/")))
    }

    /// Derive the relative path of `absolute` below `root`.
    pub fn from_path(root: &Path, absolute: &Path) -> Result<Self> {
        let relative = absolute
            .strip_prefix(root)
            .map_err(|_| SyncError::InvalidPath {
                path: absolute.display().to_string(),
                reason: format!("not below {}", root.display()),
            })?;

        let mut segments = Vec::new();
        for component in relative.components() {
            match component {
                Component::Normal(part) => {
                    let part = part.to_str().ok_or_else(|| SyncError::InvalidPath {
                        path: absolute.display().to_string(),
                        reason: "path is not valid UTF-8".to_string(),
                    })?;
                    segments.push(part);
                }
                Component::CurDir => {}
                _ => {
                    return Err(SyncError::InvalidPath {
                        path: absolute.display().to_string(),
                        reason: "unexpected path component".to_string(),
                    })
                }
            }
        }

        Self::new(segments.join("/"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Join this path onto `root` using the platform separator.
    pub fn to_path(&self, root: &Path) -> PathBuf {
        self.0
            .split('/')
            .fold(root.to_path_buf(), |path, segment| path.join(segment))
    }
}

impl TryFrom<String> for RelativePath {
    type Error = SyncError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<RelativePath> for String {
    fn from(path: RelativePath) -> Self {
        path.0
    }
}

impl FromStr for RelativePath {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl AsRef<str> for RelativePath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RelativePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Fingerprint
// ============================================================================

/// Content-identity token. Equal strings mean equal content; nothing else
/// about the format is assumed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Build from an object-store ETag, which usually arrives wrapped in
    /// double quotes.
    pub fn from_etag(etag: &str) -> Self {
        let trimmed = etag
            .strip_prefix('"')
            .and_then(|rest| rest.strip_suffix('"'))
            .unwrap_or(etag);
        Self(trimmed.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// FileEntry
// ============================================================================

/// Metadata of one file on either side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileEntry {
    pub path: RelativePath,
    pub modified_at: DateTime<Utc>,
    pub fingerprint: Fingerprint,
}

impl FileEntry {
    pub fn new(path: RelativePath, modified_at: DateTime<Utc>, fingerprint: Fingerprint) -> Self {
        Self {
            path,
            modified_at,
            fingerprint,
        }
    }
}

// ============================================================================
// FileSet
// ============================================================================

/// Immutable snapshot of file entries, unique by path.
///
/// Iteration is in path order. Building from entries with a repeated path
/// keeps the last one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileSet {
    entries: BTreeMap<RelativePath, FileEntry>,
}

impl FileSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, path: &RelativePath) -> Option<&FileEntry> {
        self.entries.get(path)
    }

    pub fn contains(&self, path: &RelativePath) -> bool {
        self.entries.contains_key(path)
    }

    pub fn iter(&self) -> impl Iterator<Item = &FileEntry> + '_ {
        self.entries.values()
    }

    pub fn paths(&self) -> impl Iterator<Item = &RelativePath> + '_ {
        self.entries.keys()
    }
}

impl FromIterator<FileEntry> for FileSet {
    fn from_iter<I: IntoIterator<Item = FileEntry>>(iter: I) -> Self {
        let entries = iter
            .into_iter()
            .map(|entry| (entry.path.clone(), entry))
            .collect();
        Self { entries }
    }
}

impl IntoIterator for FileSet {
    type Item = FileEntry;
    type IntoIter = std::collections::btree_map::IntoValues<RelativePath, FileEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_values()
    }
}

impl<'a> IntoIterator for &'a FileSet {
    type Item = &'a FileEntry;
    type IntoIter = std::collections::btree_map::Values<'a, RelativePath, FileEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.values()
    }
}

impl Serialize for FileSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_seq(self.entries.values())
    }
}

impl<'de> Deserialize<'de> for FileSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let entries = Vec::<FileEntry>::deserialize(deserializer)?;
        Ok(entries.into_iter().collect())
    }
}

// ============================================================================
// DiffResult
// ============================================================================

/// Files to move, by direction. The three sets never share a path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffResult {
    /// Local only; upload as new objects
    pub to_upload: FileSet,
    /// Newer locally; replace the remote object
    pub to_update: FileSet,
    /// Remote only or newer remotely; write locally
    pub to_download: FileSet,
}

impl DiffResult {
    pub fn is_empty(&self) -> bool {
        self.to_upload.is_empty() && self.to_update.is_empty() && self.to_download.is_empty()
    }

    pub fn total(&self) -> usize {
        self.to_upload.len() + self.to_update.len() + self.to_download.len()
    }
}
