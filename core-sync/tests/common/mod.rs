//! Shared fixtures for the reconciliation integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use bridge_traits::error::{BridgeError, Result as BridgeResult};
use bridge_traits::storage::{DynAsyncRead, ObjectInfo, ObjectStore};
use bridge_traits::transport::MessageTransport;
use bridge_traits::watch::{EventSubscription, FileEventSource, FsEvent};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use core_async::sync::mpsc;
use core_async::time::{sleep, Duration};
use core_sync::protocol::{decode, CHECK_FILES_UPDATE};
use core_sync::ChunkedDigest;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Object store kept in memory, with S3-style quoted ETags.
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: Mutex<BTreeMap<String, (Bytes, DateTime<Utc>)>>,
    on_download: Mutex<Option<Arc<ManualEventSource>>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, path: &str, data: &[u8], modified_at: DateTime<Utc>) {
        self.objects
            .lock()
            .unwrap()
            .insert(path.to_string(), (Bytes::copy_from_slice(data), modified_at));
    }

    pub fn get(&self, path: &str) -> Option<Bytes> {
        self.objects.lock().unwrap().get(path).map(|(data, _)| data.clone())
    }

    pub fn len(&self) -> usize {
        self.objects.lock().unwrap().len()
    }

    /// Report a filesystem event on `source` during every download, the
    /// way a real watcher sees the tree being written.
    pub fn notify_downloads_on(&self, source: Arc<ManualEventSource>) {
        *self.on_download.lock().unwrap() = Some(source);
    }
}

fn etag(data: &[u8]) -> String {
    let mut digest = ChunkedDigest::default();
    digest.update(data);
    format!("\"{}\"", digest.finish())
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put_object(&self, path: &str, data: Bytes) -> BridgeResult<()> {
        self.objects
            .lock()
            .unwrap()
            .insert(path.to_string(), (data, Utc::now()));
        Ok(())
    }

    async fn list_objects(&self) -> BridgeResult<Vec<ObjectInfo>> {
        Ok(self
            .objects
            .lock()
            .unwrap()
            .iter()
            .map(|(path, (data, modified_at))| ObjectInfo {
                path: path.clone(),
                modified_at: *modified_at,
                etag: etag(data),
            })
            .collect())
    }

    async fn delete_object(&self, path: &str) -> BridgeResult<()> {
        self.objects.lock().unwrap().remove(path);
        Ok(())
    }

    async fn get_object_stream(&self, path: &str) -> BridgeResult<Box<DynAsyncRead>> {
        let data = self
            .get(path)
            .ok_or_else(|| BridgeError::storage("download", path, "HTTP 404"))?;

        let source = self.on_download.lock().unwrap().clone();
        if let Some(source) = source {
            source.emit();
            // Give the watch loop a chance to see the event mid-transfer.
            sleep(Duration::from_millis(20)).await;
        }

        Ok(Box::new(std::io::Cursor::new(data.to_vec())))
    }
}

/// Event source driven by the test.
#[derive(Default)]
pub struct ManualEventSource {
    tx: Mutex<Option<mpsc::UnboundedSender<FsEvent>>>,
}

impl ManualEventSource {
    pub fn emit(&self) {
        if let Some(tx) = self.tx.lock().unwrap().as_ref() {
            let _ = tx.send(FsEvent::default());
        }
    }
}

impl FileEventSource for ManualEventSource {
    fn subscribe(&self, _root: &Path) -> BridgeResult<EventSubscription> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.tx.lock().unwrap() = Some(tx);
        Ok(EventSubscription::new(rx))
    }
}

/// Server-side transport wrapper counting `check-files-update` requests.
pub struct ProbeCounter<T> {
    inner: T,
    probes: Arc<AtomicUsize>,
}

impl<T> ProbeCounter<T> {
    pub fn new(inner: T) -> (Self, Arc<AtomicUsize>) {
        let probes = Arc::new(AtomicUsize::new(0));
        (
            Self {
                inner,
                probes: Arc::clone(&probes),
            },
            probes,
        )
    }
}

#[async_trait]
impl<T: MessageTransport> MessageTransport for ProbeCounter<T> {
    async fn send(&self, message: String) -> BridgeResult<()> {
        self.inner.send(message).await
    }

    async fn recv(&self) -> BridgeResult<Option<String>> {
        let message = self.inner.recv().await?;
        if let Some(text) = &message {
            if decode(text).is_ok_and(|envelope| envelope.operation == CHECK_FILES_UPDATE) {
                self.probes.fetch_add(1, Ordering::SeqCst);
            }
        }
        Ok(message)
    }

    async fn close(&self) -> BridgeResult<()> {
        self.inner.close().await
    }
}

/// Poll `condition` until it holds or two seconds pass.
pub async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        sleep(Duration::from_millis(10)).await;
    }
    condition()
}
