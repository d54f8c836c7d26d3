//! # Desktop Bridge Implementations
//!
//! Default implementations of bridge traits for desktop platforms
//! (macOS, Windows, Linux).
//!
//! ## Overview
//!
//! - `FileTree` using `tokio::fs`
//! - `FileEventSource` using the `notify` crate's recommended backend
//! - `MessageTransport` using a `tokio-tungstenite` WebSocket
//! - `ObjectStore` using `reqwest` against the sync server's file endpoints
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::{HttpObjectStore, NotifyEventSource, TokioFileTree, WebSocketTransport};
//!
//! #[core_async::main]
//! async fn main() -> anyhow::Result<()> {
//!     let transport = WebSocketTransport::connect("ws://localhost:3000").await?;
//!     let store = HttpObjectStore::new("http://localhost:3000")?;
//!     let tree = TokioFileTree::new();
//!     let events = NotifyEventSource::new();
//!
//!     // Hand them to the reconciliation engine
//!     Ok(())
//! }
//! ```

mod filesystem;
mod http;
mod watcher;
mod websocket;

pub use filesystem::TokioFileTree;
pub use http::HttpObjectStore;
pub use watcher::NotifyEventSource;
pub use websocket::WebSocketTransport;
