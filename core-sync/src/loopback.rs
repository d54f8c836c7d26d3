//! In-memory [`MessageTransport`] pair.
//!
//! Connects a client channel to a [`RemoteResponder`](crate::responder::RemoteResponder)
//! inside one process. Closing or dropping either end makes the peer's
//! `recv` return `None`.

use async_trait::async_trait;
use bridge_traits::error::{BridgeError, Result};
use bridge_traits::transport::MessageTransport;
use core_async::sync::{mpsc, Mutex as AsyncMutex};
use std::sync::{Mutex, PoisonError};

/// One end of an in-memory duplex connection.
pub struct LoopbackTransport {
    tx: Mutex<Option<mpsc::UnboundedSender<String>>>,
    rx: AsyncMutex<mpsc::UnboundedReceiver<String>>,
}

impl LoopbackTransport {
    /// Two connected ends.
    pub fn pair() -> (Self, Self) {
        let (a_tx, a_rx) = mpsc::unbounded_channel();
        let (b_tx, b_rx) = mpsc::unbounded_channel();
        (Self::new(a_tx, b_rx), Self::new(b_tx, a_rx))
    }

    fn new(tx: mpsc::UnboundedSender<String>, rx: mpsc::UnboundedReceiver<String>) -> Self {
        Self {
            tx: Mutex::new(Some(tx)),
            rx: AsyncMutex::new(rx),
        }
    }
}

#[async_trait]
impl MessageTransport for LoopbackTransport {
    async fn send(&self, message: String) -> Result<()> {
        let tx = self.tx.lock().unwrap_or_else(PoisonError::into_inner);
        match tx.as_ref() {
            Some(tx) => tx
                .send(message)
                .map_err(|_| BridgeError::OperationFailed("Loopback peer is gone".to_string())),
            None => Err(BridgeError::OperationFailed(
                "Loopback transport is closed".to_string(),
            )),
        }
    }

    async fn recv(&self) -> Result<Option<String>> {
        Ok(self.rx.lock().await.recv().await)
    }

    async fn close(&self) -> Result<()> {
        self.tx.lock().unwrap_or_else(PoisonError::into_inner).take();
        Ok(())
    }
}
