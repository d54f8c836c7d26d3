//! # Remote Responder
//!
//! The server side of the reconciliation protocol, answering a client's
//! probes and diff requests from the contents of an [`ObjectStore`].
//!
//! Requests that cannot be answered get no reply at all; the client's call
//! times out and its cycle fails, which is the same outcome a lost message
//! would have.

use crate::diff::classify;
use crate::fingerprint::fingerprint_file_set;
use crate::model::{FileEntry, FileSet, Fingerprint, RelativePath};
use crate::protocol::{self, payload_as, UpdateStatus, CHECK_FILES_UPDATE, GET_FILE_DIFF};
use crate::{Result, SyncError};
use bridge_traits::storage::ObjectStore;
use bridge_traits::transport::MessageTransport;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct RemoteResponder {
    store: Arc<dyn ObjectStore>,
}

impl RemoteResponder {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// Current remote snapshot.
    ///
    /// Objects whose keys are not valid relative paths are left out.
    pub async fn remote_file_set(&self) -> Result<FileSet> {
        let objects = self.store.list_objects().await?;

        Ok(objects
            .into_iter()
            .filter_map(|object| match RelativePath::new(&object.path) {
                Ok(path) => Some(FileEntry::new(
                    path,
                    object.modified_at,
                    Fingerprint::from_etag(&object.etag),
                )),
                Err(e) => {
                    warn!(key = %object.path, error = %e, "Skipping object with invalid key");
                    None
                }
            })
            .collect())
    }

    /// Answer one inbound message. `None` means no reply is sent.
    pub async fn respond(&self, text: &str) -> Option<String> {
        let request = match protocol::decode(text) {
            Ok(request) => request,
            Err(e) => {
                warn!(error = %e, "Dropping malformed request");
                return None;
            }
        };
        let operation = request.operation.as_str();

        let reply = match operation {
            CHECK_FILES_UPDATE => self.check_files_update(request.payload).await,
            GET_FILE_DIFF => self.get_file_diff(request.payload).await,
            _ => {
                warn!(operation, "Dropping request for unknown operation");
                return None;
            }
        };

        match reply {
            Ok(reply) => Some(reply),
            Err(e) => {
                warn!(operation, error = %e, "Request failed, not replying");
                None
            }
        }
    }

    async fn check_files_update(&self, payload: serde_json::Value) -> Result<String> {
        let client: Fingerprint = payload_as(CHECK_FILES_UPDATE, payload)?;
        let remote = fingerprint_file_set(&self.remote_file_set().await?);
        let update = remote != client;

        debug!(client = %client, remote = %remote, update, "Probe answered");
        protocol::encode(CHECK_FILES_UPDATE, &UpdateStatus { update })
    }

    async fn get_file_diff(&self, payload: serde_json::Value) -> Result<String> {
        let client: FileSet = payload_as(GET_FILE_DIFF, payload)?;
        let diff = classify(&client, &self.remote_file_set().await?);

        debug!(
            to_upload = diff.to_upload.len(),
            to_update = diff.to_update.len(),
            to_download = diff.to_download.len(),
            "Diff computed"
        );
        protocol::encode(GET_FILE_DIFF, &diff)
    }

    /// Answer requests on `transport` until it closes.
    pub async fn serve(&self, transport: Arc<dyn MessageTransport>) -> Result<()> {
        info!("Serving reconciliation requests");

        loop {
            let text = match transport.recv().await {
                Ok(Some(text)) => text,
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "Transport failed");
                    return Err(SyncError::ChannelClosed);
                }
            };

            if let Some(reply) = self.respond(&text).await {
                if let Err(e) = transport.send(reply).await {
                    warn!(error = %e, "Failed to send reply");
                    return Err(SyncError::ChannelClosed);
                }
            }
        }

        debug!("Client disconnected");
        Ok(())
    }
}
