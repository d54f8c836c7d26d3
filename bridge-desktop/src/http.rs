//! Object Store Implementation over the file HTTP service using Reqwest

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    storage::{DynAsyncRead, ObjectInfo, ObjectStore},
};
use bytes::Bytes;
use futures_util::TryStreamExt;
use reqwest::{multipart, Client, Response, Url};
use std::time::Duration;
use tracing::debug;

/// Reqwest-based object store
///
/// Talks to the sync server's file endpoints:
/// - `POST /file` creates an object (multipart `file` + `filePath`)
/// - `PUT /file` replaces an object (same form)
/// - `DELETE /file/{key}` removes an object
/// - `GET /file/download/{path}` streams an object back
///
/// The service does not expose a listing endpoint; listing is only available
/// server-side, next to the bucket.
pub struct HttpObjectStore {
    client: Client,
    base_url: String,
}

impl HttpObjectStore {
    /// Create a store with default client configuration
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .pool_max_idle_per_host(10)
            .user_agent(concat!("treesync/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| BridgeError::OperationFailed(format!("HTTP client setup: {e}")))?;

        Ok(Self::with_client(client, base_url))
    }

    /// Create a store around an existing client
    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn file_url(&self) -> String {
        format!("{}/file", self.base_url)
    }

    /// `{base}/file/{segments..}/{key}` with every key segment percent-encoded.
    fn object_url(&self, operation: &str, segments: &[&str], path: &str) -> Result<Url> {
        let mut url =
            Url::parse(&self.file_url()).map_err(|e| BridgeError::storage(operation, path, e))?;
        url.path_segments_mut()
            .map_err(|_| BridgeError::storage(operation, path, "base URL cannot hold a path"))?
            .extend(segments.iter().copied().chain(path.split('/')));
        Ok(url)
    }

    fn upload_form(path: &str, data: Bytes) -> multipart::Form {
        let file_name = path.rsplit('/').next().unwrap_or(path).to_string();
        let part = multipart::Part::stream(data).file_name(file_name);
        multipart::Form::new()
            .part("file", part)
            .text("filePath", path.to_string())
    }

    fn check_status(operation: &str, path: &str, response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            Err(BridgeError::storage(operation, path, format!("HTTP {status}")))
        }
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    async fn put_object(&self, path: &str, data: Bytes) -> Result<()> {
        let size = data.len();
        let response = self
            .client
            .post(self.file_url())
            .multipart(Self::upload_form(path, data))
            .send()
            .await
            .map_err(|e| BridgeError::storage("upload", path, e))?;
        Self::check_status("upload", path, response)?;

        debug!(path, size, "Uploaded object");
        Ok(())
    }

    async fn replace_object(&self, path: &str, data: Bytes) -> Result<()> {
        let size = data.len();
        let response = self
            .client
            .put(self.file_url())
            .multipart(Self::upload_form(path, data))
            .send()
            .await
            .map_err(|e| BridgeError::storage("update", path, e))?;
        Self::check_status("update", path, response)?;

        debug!(path, size, "Replaced object");
        Ok(())
    }

    async fn list_objects(&self) -> Result<Vec<ObjectInfo>> {
        Err(BridgeError::NotAvailable(
            "object listing is not served over HTTP".to_string(),
        ))
    }

    async fn delete_object(&self, path: &str) -> Result<()> {
        let response = self
            .client
            .delete(self.object_url("delete", &[], path)?)
            .send()
            .await
            .map_err(|e| BridgeError::storage("delete", path, e))?;
        Self::check_status("delete", path, response)?;

        debug!(path, "Deleted object");
        Ok(())
    }

    async fn get_object_stream(&self, path: &str) -> Result<Box<DynAsyncRead>> {
        let response = self
            .client
            .get(self.object_url("download", &["download"], path)?)
            .send()
            .await
            .map_err(|e| BridgeError::storage("download", path, e))?;
        let response = Self::check_status("download", path, response)?;

        let stream = response.bytes_stream().map_err(std::io::Error::other);
        let reader = core_async::io::StreamReader::new(stream);

        debug!(path, "Opened object download stream");
        Ok(Box::new(reader))
    }
}
