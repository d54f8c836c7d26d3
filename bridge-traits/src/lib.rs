//! # Host Bridge Traits
//!
//! Platform abstraction traits for the tree sync engine.
//!
//! ## Overview
//!
//! This crate defines the contract between the sync core and the concrete
//! adapters that touch the outside world. The core never opens a socket, reads
//! a directory or talks to a bucket directly; it goes through one of these
//! traits so every collaborator can be replaced by an in-memory fake in tests.
//!
//! ## Traits
//!
//! ### Storage
//! - [`ObjectStore`](storage::ObjectStore) - Remote object store holding the synced bytes
//! - [`FileTree`](storage::FileTree) - Local directory tree enumeration and streaming I/O
//!
//! ### Notifications & Messaging
//! - [`FileEventSource`](watch::FileEventSource) - Raw recursive change notifications
//! - [`MessageTransport`](transport::MessageTransport) - Duplex text message channel
//!
//! ### Utilities
//! - [`LoggerSink`](logging::LoggerSink) - Forward structured logs to host logging
//!
//! ## Implementations
//!
//! | Platform | Implementation Crate |
//! |----------|---------------------|
//! | Desktop  | `bridge-desktop`    |
//! | Tests    | in-memory fakes in each crate's test suite |
//!
//! ## Error Handling
//!
//! All bridge traits use the [`BridgeError`](error::BridgeError) type. Adapters
//! should convert platform errors to `BridgeError` and keep the context (the
//! operation, the object key or file path, the underlying cause) so a failed
//! transfer can be reported per file.
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` so they can be shared behind `Arc`
//! across spawned transfer tasks.
//!
//! ## Example
//!
//! ```ignore
//! use bridge_traits::storage::{ObjectInfo, ObjectStore};
//! use bridge_traits::error::Result;
//! use async_trait::async_trait;
//!
//! pub struct MyStore {
//!     client: reqwest::Client,
//! }
//!
//! #[async_trait]
//! impl ObjectStore for MyStore {
//!     async fn put_object(&self, path: &str, data: bytes::Bytes) -> Result<()> {
//!         // Implementation
//!         todo!()
//!     }
//!     // ...
//! }
//! ```

pub mod error;
pub mod logging;
pub mod storage;
pub mod transport;
pub mod watch;

pub use error::BridgeError;

// Re-export commonly used types
pub use logging::{LogEntry, LogLevel, LoggerSink};
pub use storage::{DynAsyncRead, DynAsyncWrite, FileStat, FileTree, ObjectInfo, ObjectStore};
pub use transport::MessageTransport;
pub use watch::{EventSubscription, FileEventSource, FsEvent};
