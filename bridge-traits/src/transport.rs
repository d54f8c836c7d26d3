//! Duplex message transport.
//!
//! The reconciliation protocol exchanges JSON text messages over a persistent,
//! ordered, reliable connection (a WebSocket on desktop). Framing and
//! reconnection are the transport's concern; the sync engine only sends and
//! receives whole messages.

use async_trait::async_trait;

use crate::error::Result;

/// Message transport trait
///
/// `recv` is called from a single reader task; `send` may be called
/// concurrently with it. Implementations therefore need independent locking
/// for the two directions.
#[async_trait]
pub trait MessageTransport: Send + Sync {
    /// Send one text message
    async fn send(&self, message: String) -> Result<()>;

    /// Receive the next text message
    ///
    /// Returns `Ok(None)` once the peer has closed the connection.
    async fn recv(&self) -> Result<Option<String>>;

    /// Close the connection
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
