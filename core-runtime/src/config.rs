//! # Core Configuration Module
//!
//! Configuration for a tree sync client.
//!
//! ## Overview
//!
//! A [`CoreConfig`] is built through [`CoreConfigBuilder`] and validated
//! before anything is started: a client with a zero batch size or a debounce
//! longer than its safety re-scan interval fails at startup rather than
//! misbehaving later.
//!
//! Only two values are required, the watched folder and the server host.
//! They are also the two values remembered between runs in `config.json`
//! (see [`PersistedConfig`]).
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::CoreConfig;
//! use std::time::Duration;
//!
//! let config = CoreConfig::builder()
//!     .root_dir("/home/me/Drive")
//!     .server("sync.example.com")
//!     .debounce(Duration::from_millis(500))
//!     .build()?;
//!
//! assert_eq!(config.websocket_url(), "ws://sync.example.com:3000");
//! ```

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default port of the sync server (WebSocket and HTTP share it)
pub const DEFAULT_PORT: u16 = 3000;
/// Quiet period after the last filesystem event before a scan
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_secs(1);
/// Periodic re-scan regardless of events
pub const DEFAULT_SAFETY_INTERVAL: Duration = Duration::from_secs(60);
/// Maximum concurrent transfers per batch
pub const DEFAULT_BATCH_SIZE: usize = 50;
/// Fingerprint chunk size (matches S3 multipart part size)
pub const DEFAULT_CHUNK_SIZE: usize = 5 * 1024 * 1024;
/// Upper bound on a single request/reply exchange
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);
/// File name of the persisted configuration
pub const CONFIG_FILE: &str = "config.json";

/// Validated client configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreConfig {
    /// Directory tree being synchronized
    pub root_dir: PathBuf,
    /// Server host name or address, without scheme or port
    pub server: String,
    pub port: u16,
    pub debounce: Duration,
    pub safety_interval: Duration,
    pub batch_size: usize,
    pub chunk_size: usize,
    pub call_timeout: Duration,
}

impl CoreConfig {
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Validates the configuration.
    ///
    /// This checks:
    /// - root directory and server are not empty
    /// - the server is a bare host (no scheme)
    /// - batch and chunk sizes are positive
    /// - intervals are non-zero and the debounce is shorter than the safety interval
    pub fn validate(&self) -> Result<()> {
        if self.root_dir.as_os_str().is_empty() {
            return Err(Error::Config("Root directory cannot be empty".to_string()));
        }

        if self.server.trim().is_empty() {
            return Err(Error::Config("Server cannot be empty".to_string()));
        }

        if self.server.contains("://") {
            return Err(Error::Config(format!(
                "Server must be a host name without scheme, got '{}'",
                self.server
            )));
        }

        if self.port == 0 {
            return Err(Error::Config("Port must be greater than 0".to_string()));
        }

        if self.batch_size == 0 {
            return Err(Error::Config(
                "Batch size must be greater than 0".to_string(),
            ));
        }

        if self.chunk_size == 0 {
            return Err(Error::Config(
                "Chunk size must be greater than 0".to_string(),
            ));
        }

        if self.debounce.is_zero() || self.safety_interval.is_zero() || self.call_timeout.is_zero()
        {
            return Err(Error::Config(
                "Debounce, safety interval and call timeout must be non-zero".to_string(),
            ));
        }

        if self.debounce >= self.safety_interval {
            return Err(Error::Config(format!(
                "Debounce ({:?}) must be shorter than the safety interval ({:?})",
                self.debounce, self.safety_interval
            )));
        }

        Ok(())
    }

    /// WebSocket endpoint of the sync server
    pub fn websocket_url(&self) -> String {
        format!("ws://{}:{}", self.server, self.port)
    }

    /// Base URL of the sync server's HTTP file endpoints
    pub fn http_base_url(&self) -> String {
        format!("http://{}:{}", self.server, self.port)
    }
}

/// Builder for [`CoreConfig`]
#[derive(Debug, Default, Clone)]
pub struct CoreConfigBuilder {
    root_dir: Option<PathBuf>,
    server: Option<String>,
    port: Option<u16>,
    debounce: Option<Duration>,
    safety_interval: Option<Duration>,
    batch_size: Option<usize>,
    chunk_size: Option<usize>,
    call_timeout: Option<Duration>,
}

impl CoreConfigBuilder {
    /// Sets the directory tree to synchronize (required).
    pub fn root_dir<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.root_dir = Some(path.into());
        self
    }

    /// Sets the server host (required).
    pub fn server(mut self, server: impl Into<String>) -> Self {
        self.server = Some(server.into());
        self
    }

    /// Default: 3000
    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Default: 1 second
    pub fn debounce(mut self, debounce: Duration) -> Self {
        self.debounce = Some(debounce);
        self
    }

    /// Default: 60 seconds
    pub fn safety_interval(mut self, interval: Duration) -> Self {
        self.safety_interval = Some(interval);
        self
    }

    /// Default: 50
    pub fn batch_size(mut self, size: usize) -> Self {
        self.batch_size = Some(size);
        self
    }

    /// Default: 5 MiB
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = Some(size);
        self
    }

    /// Default: 30 seconds
    pub fn call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = Some(timeout);
        self
    }

    /// Seed the required fields from a persisted configuration.
    ///
    /// Values already set on the builder win.
    pub fn persisted(mut self, persisted: &PersistedConfig) -> Self {
        if self.root_dir.is_none() {
            self.root_dir = persisted.folder_path.clone();
        }
        if self.server.is_none() {
            self.server = persisted.server.clone();
        }
        self
    }

    /// Builds the final `CoreConfig` instance.
    ///
    /// Fails with an actionable message if a required value is missing or a
    /// value is out of range.
    pub fn build(self) -> Result<CoreConfig> {
        let root_dir = self.root_dir.ok_or_else(|| {
            Error::Config("Root directory is required. Use .root_dir() to set it.".to_string())
        })?;

        let server = self.server.ok_or_else(|| {
            Error::Config("Server is required. Use .server() to set it.".to_string())
        })?;

        let config = CoreConfig {
            root_dir,
            server,
            port: self.port.unwrap_or(DEFAULT_PORT),
            debounce: self.debounce.unwrap_or(DEFAULT_DEBOUNCE),
            safety_interval: self.safety_interval.unwrap_or(DEFAULT_SAFETY_INTERVAL),
            batch_size: self.batch_size.unwrap_or(DEFAULT_BATCH_SIZE),
            chunk_size: self.chunk_size.unwrap_or(DEFAULT_CHUNK_SIZE),
            call_timeout: self.call_timeout.unwrap_or(DEFAULT_CALL_TIMEOUT),
        };

        config.validate()?;

        Ok(config)
    }
}

/// The subset of configuration remembered between runs.
///
/// Stored as pretty-printed JSON: `{ "folderPath": "...", "server": "..." }`.
/// Both fields are optional so a partially written or hand-edited file still
/// loads.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,
}

impl PersistedConfig {
    /// Load from `path`; a missing file yields the empty configuration.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(Error::ConfigFile {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        serde_json::from_str(&raw)
            .map_err(|e| Error::Config(format!("Invalid config file {}: {}", path.display(), e)))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| Error::Internal(format!("Failed to encode config: {}", e)))?;

        std::fs::write(path, json).map_err(|source| Error::ConfigFile {
            path: path.to_path_buf(),
            source,
        })
    }
}

impl From<&CoreConfig> for PersistedConfig {
    fn from(config: &CoreConfig) -> Self {
        Self {
            folder_path: Some(config.root_dir.clone()),
            server: Some(config.server.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn base() -> CoreConfigBuilder {
        CoreConfig::builder().root_dir("/srv/drive").server("example.com")
    }

    #[test]
    fn test_builder_defaults() {
        let config = base().build().unwrap();

        assert_eq!(config.port, 3000);
        assert_eq!(config.debounce, Duration::from_secs(1));
        assert_eq!(config.safety_interval, Duration::from_secs(60));
        assert_eq!(config.batch_size, 50);
        assert_eq!(config.chunk_size, 5 * 1024 * 1024);
        assert_eq!(config.call_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_builder_requires_root_dir() {
        let result = CoreConfig::builder().server("example.com").build();

        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Root directory is required"));
    }

    #[test]
    fn test_builder_requires_server() {
        let result = CoreConfig::builder().root_dir("/srv/drive").build();

        assert!(result.unwrap_err().to_string().contains("Server is required"));
    }

    #[test]
    fn test_validate_rejects_zero_batch_size() {
        let result = base().batch_size(0).build();
        assert!(matches!(result, Err(Error::Config(msg)) if msg.contains("Batch size")));
    }

    #[test]
    fn test_validate_rejects_zero_chunk_size() {
        assert!(base().chunk_size(0).build().is_err());
    }

    #[test]
    fn test_validate_rejects_debounce_longer_than_safety_interval() {
        let result = base()
            .debounce(Duration::from_secs(90))
            .safety_interval(Duration::from_secs(60))
            .build();

        assert!(matches!(result, Err(Error::Config(msg)) if msg.contains("shorter")));
    }

    #[test]
    fn test_validate_rejects_scheme_in_server() {
        let result = CoreConfig::builder()
            .root_dir("/srv/drive")
            .server("http://example.com")
            .build();

        assert!(result.is_err());
    }

    #[test]
    fn test_urls() {
        let config = base().port(8080).build().unwrap();

        assert_eq!(config.websocket_url(), "ws://example.com:8080");
        assert_eq!(config.http_base_url(), "http://example.com:8080");
    }

    #[test]
    fn test_persisted_seeds_missing_fields_only() {
        let persisted = PersistedConfig {
            folder_path: Some(PathBuf::from("/old/folder")),
            server: Some("old.example.com".to_string()),
        };

        let config = CoreConfig::builder()
            .server("new.example.com")
            .persisted(&persisted)
            .build()
            .unwrap();

        assert_eq!(config.root_dir, PathBuf::from("/old/folder"));
        assert_eq!(config.server, "new.example.com");
    }

    #[test]
    fn test_persisted_config_file_shape() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        let config = base().build().unwrap();

        PersistedConfig::from(&config).save(&path).unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["folderPath"], "/srv/drive");
        assert_eq!(raw["server"], "example.com");

        let loaded = PersistedConfig::load(&path).unwrap();
        assert_eq!(loaded, PersistedConfig::from(&config));
    }

    #[test]
    fn test_persisted_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let loaded = PersistedConfig::load(&dir.path().join("absent.json")).unwrap();
        assert_eq!(loaded, PersistedConfig::default());
    }

    #[test]
    fn test_persisted_malformed_file_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, "{ not json").unwrap();

        assert!(matches!(PersistedConfig::load(&path), Err(Error::Config(_))));
    }

    #[test]
    fn test_persisted_save_into_missing_directory_fails() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("no-such-dir").join(CONFIG_FILE);

        let result = PersistedConfig::default().save(&path);
        assert!(matches!(result, Err(Error::ConfigFile { .. })));
    }
}
