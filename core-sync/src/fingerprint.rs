//! # Fingerprint Engine
//!
//! Content identity for single files and for whole snapshots.
//!
//! ## Per-file fingerprint
//!
//! Follows the S3 ETag convention so a local file and the object it was
//! uploaded as produce the same token:
//!
//! ```text
//! 0 chunks  → md5("")
//! 1 chunk   → md5(chunk)
//! N chunks  → md5(md5(c1) ‖ md5(c2) ‖ … ‖ md5(cN)) + "-N"
//! ```
//!
//! Chunks are [`DEFAULT_CHUNK_SIZE`] bytes unless configured otherwise; the
//! chunk size must match the store's multipart part size for tokens to agree.
//!
//! ## Snapshot fingerprint
//!
//! `sha256(sorted("path~fingerprint").join(";"))`, so two snapshots with the
//! same files and contents compare equal regardless of scan order.

use crate::model::{FileSet, Fingerprint};
use crate::{Result, SyncError};
use bridge_traits::storage::FileTree;
use core_async::io::{AsyncRead, AsyncReadExt};
use sha2::{Digest, Sha256};
use std::io;
use std::path::Path;

pub use core_runtime::config::DEFAULT_CHUNK_SIZE;

const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Incremental chunked MD5 accumulator.
///
/// Feed bytes with [`update`](Self::update) in pieces of any size; chunk
/// boundaries depend only on the total byte count.
pub struct ChunkedDigest {
    chunk_size: usize,
    current: md5::Context,
    filled: usize,
    chunk_digests: Vec<[u8; 16]>,
}

impl ChunkedDigest {
    /// A zero chunk size is treated as one byte.
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            current: md5::Context::new(),
            filled: 0,
            chunk_digests: Vec::new(),
        }
    }

    pub fn update(&mut self, mut data: &[u8]) {
        while !data.is_empty() {
            let take = (self.chunk_size - self.filled).min(data.len());
            self.current.consume(&data[..take]);
            self.filled += take;
            data = &data[take..];

            if self.filled == self.chunk_size {
                self.close_chunk();
            }
        }
    }

    fn close_chunk(&mut self) {
        let finished = std::mem::replace(&mut self.current, md5::Context::new());
        self.chunk_digests.push(finished.compute().0);
        self.filled = 0;
    }

    pub fn finish(mut self) -> Fingerprint {
        if self.filled > 0 {
            self.close_chunk();
        }

        match self.chunk_digests.as_slice() {
            [] => Fingerprint::new(format!("{:x}", md5::compute(b""))),
            [single] => Fingerprint::new(format!("{:x}", md5::Digest(*single))),
            many => {
                let combined: Vec<u8> = many.iter().flatten().copied().collect();
                Fingerprint::new(format!("{:x}-{}", md5::compute(&combined), many.len()))
            }
        }
    }
}

impl Default for ChunkedDigest {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE)
    }
}

/// Fingerprint everything `reader` yields.
pub async fn fingerprint_reader<R>(reader: &mut R, chunk_size: usize) -> io::Result<Fingerprint>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut digest = ChunkedDigest::new(chunk_size);
    let mut buffer = vec![0u8; READ_BUFFER_SIZE.min(chunk_size.max(1))];

    loop {
        let read = reader.read(&mut buffer).await?;
        if read == 0 {
            break;
        }
        digest.update(&buffer[..read]);
    }

    Ok(digest.finish())
}

/// Fingerprint a local file through the tree collaborator.
pub async fn fingerprint_file(
    tree: &dyn FileTree,
    path: &Path,
    chunk_size: usize,
) -> Result<Fingerprint> {
    let mut reader = tree
        .open_read_stream(path)
        .await
        .map_err(|e| SyncError::local(path.display(), e))?;

    fingerprint_reader(&mut reader, chunk_size)
        .await
        .map_err(|e| SyncError::io(path.display(), e))
}

/// Aggregate fingerprint of a whole snapshot.
pub fn fingerprint_file_set(set: &FileSet) -> Fingerprint {
    let mut lines: Vec<String> = set
        .iter()
        .map(|entry| format!("{}~{}", entry.path, entry.fingerprint))
        .collect();
    lines.sort();

    let digest = Sha256::digest(lines.join(";").as_bytes());
    Fingerprint::new(format!("{:x}", digest))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FileEntry, RelativePath};
    use chrono::{TimeZone, Utc};

    const EMPTY_MD5: &str = "d41d8cd98f00b204e9800998ecf8427e";

    fn digest_of(data: &[u8], chunk_size: usize) -> String {
        let mut digest = ChunkedDigest::new(chunk_size);
        digest.update(data);
        digest.finish().as_str().to_string()
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(digest_of(b"", 4), EMPTY_MD5);
    }

    #[test]
    fn test_single_chunk_is_plain_md5() {
        assert_eq!(digest_of(b"abc", 4), "900150983cd24fb0d6963f7d28e17f72");
        // Exactly one full chunk is still the single-chunk shape.
        assert_eq!(digest_of(b"abcd", 4), format!("{:x}", md5::compute(b"abcd")));
    }

    #[test]
    fn test_multipart_shape() {
        let first = md5::compute(b"abcd");
        let second = md5::compute(b"ef");
        let mut combined = first.0.to_vec();
        combined.extend_from_slice(&second.0);
        let expected = format!("{:x}-2", md5::compute(&combined));

        assert_eq!(digest_of(b"abcdef", 4), expected);
    }

    #[test]
    fn test_chunk_boundaries_independent_of_feed_size() {
        let data: Vec<u8> = (0..=255u8).cycle().take(1000).collect();

        let mut piecewise = ChunkedDigest::new(64);
        for piece in data.chunks(7) {
            piecewise.update(piece);
        }

        assert_eq!(piecewise.finish().as_str(), digest_of(&data, 64));
    }

    #[core_async::test]
    async fn test_reader_matches_accumulator() {
        let data: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        let mut reader: &[u8] = &data;

        let fingerprint = fingerprint_reader(&mut reader, 1024).await.unwrap();

        assert_eq!(fingerprint.as_str(), digest_of(&data, 1024));
        assert!(fingerprint.as_str().ends_with("-10"));
    }

    fn entry(path: &str, fp: &str) -> FileEntry {
        FileEntry::new(
            RelativePath::new(path).unwrap(),
            Utc.timestamp_opt(0, 0).unwrap(),
            Fingerprint::new(fp),
        )
    }

    #[test]
    fn test_file_set_fingerprint_order_independent() {
        let forward: FileSet = vec![entry("a", "1"), entry("b", "2"), entry("c/d", "3")]
            .into_iter()
            .collect();
        let backward: FileSet = vec![entry("c/d", "3"), entry("b", "2"), entry("a", "1")]
            .into_iter()
            .collect();

        assert_eq!(fingerprint_file_set(&forward), fingerprint_file_set(&backward));
    }

    #[test]
    fn test_file_set_fingerprint_matches_line_format() {
        let set: FileSet = vec![entry("b", "2"), entry("a", "1")].into_iter().collect();
        let expected = format!("{:x}", Sha256::digest(b"a~1;b~2"));

        assert_eq!(fingerprint_file_set(&set).as_str(), expected);
    }

    #[test]
    fn test_file_set_fingerprint_sensitive_to_content() {
        let before: FileSet = vec![entry("a", "1")].into_iter().collect();
        let after: FileSet = vec![entry("a", "2")].into_iter().collect();

        assert_ne!(fingerprint_file_set(&before), fingerprint_file_set(&after));
    }

    #[test]
    fn test_empty_file_set_fingerprint() {
        assert_eq!(
            fingerprint_file_set(&FileSet::new()).as_str(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
