//! # Correlation Channel
//!
//! Request/reply calls over a [`MessageTransport`] whose only correlation
//! key is the operation name.
//!
//! ## Overview
//!
//! At most one call per operation is outstanding. A call registers its
//! waiter *before* sending so a fast reply cannot be missed, then waits
//! for the next inbound envelope carrying the same operation. A single
//! reader task owns the inbound half of the transport:
//!
//! - a matching envelope resolves its waiter and removes it
//! - an envelope nobody waits for is dropped
//! - a malformed message is dropped and reading continues
//! - transport close or failure fails every pending call with
//!   [`SyncError::ChannelClosed`], and all later calls fail immediately
//!
//! ## Usage
//!
//! ```ignore
//! use core_sync::channel::CorrelationChannel;
//! use core_sync::protocol::{UpdateStatus, CHECK_FILES_UPDATE};
//!
//! let channel = CorrelationChannel::new(transport);
//! let status: UpdateStatus = channel.call(CHECK_FILES_UPDATE, "3f2a...").await?;
//! ```

use crate::protocol::{self, payload_as};
use crate::{Result, SyncError};
use bridge_traits::transport::MessageTransport;
use core_async::sync::oneshot;
use core_async::task::JoinHandle;
use core_async::time::{timeout, Duration};
use core_runtime::config::DEFAULT_CALL_TIMEOUT;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, trace, warn};

#[derive(Default)]
struct PendingCalls {
    waiters: HashMap<String, Waiter>,
    closed: bool,
}

struct Waiter {
    id: u64,
    reply: oneshot::Sender<Value>,
}

struct Shared {
    transport: Arc<dyn MessageTransport>,
    // Never held across an await.
    pending: Mutex<PendingCalls>,
    next_id: AtomicU64,
}

impl Shared {
    fn pending(&self) -> MutexGuard<'_, PendingCalls> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn close(&self) {
        let mut pending = self.pending();
        pending.closed = true;
        // Dropping the senders wakes every waiter with a receive error.
        pending.waiters.clear();
    }
}

/// Operation-correlated request/reply channel.
pub struct CorrelationChannel {
    shared: Arc<Shared>,
    timeout: Duration,
    reader: JoinHandle<()>,
}

impl CorrelationChannel {
    /// Wrap `transport` with the default call timeout.
    ///
    /// Must be called within a runtime: the reader task starts immediately.
    pub fn new(transport: Arc<dyn MessageTransport>) -> Self {
        Self::with_timeout(transport, DEFAULT_CALL_TIMEOUT)
    }

    pub fn with_timeout(transport: Arc<dyn MessageTransport>, call_timeout: Duration) -> Self {
        let shared = Arc::new(Shared {
            transport,
            pending: Mutex::new(PendingCalls::default()),
            next_id: AtomicU64::new(0),
        });

        let reader = core_async::spawn(read_loop(Arc::clone(&shared)));

        Self {
            shared,
            timeout: call_timeout,
            reader,
        }
    }

    pub fn call_timeout(&self) -> Duration {
        self.timeout
    }

    /// Whether the transport has closed.
    pub fn is_closed(&self) -> bool {
        self.shared.pending().closed
    }

    /// Send `payload` under `operation` and wait for the matching reply.
    ///
    /// # Errors
    ///
    /// - [`SyncError::CallInFlight`] if a call for `operation` is already pending
    /// - [`SyncError::ChannelClosed`] if the transport is or becomes closed
    /// - [`SyncError::Timeout`] if no reply arrives within the call timeout
    /// - [`SyncError::Protocol`] if the reply payload has the wrong shape
    pub async fn call<Req, Resp>(&self, operation: &str, payload: &Req) -> Result<Resp>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        let message = protocol::encode(operation, payload)?;

        let (reply_tx, reply_rx) = oneshot::channel();
        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        {
            let mut pending = self.shared.pending();
            if pending.closed {
                return Err(SyncError::ChannelClosed);
            }
            if pending.waiters.contains_key(operation) {
                return Err(SyncError::CallInFlight {
                    operation: operation.to_string(),
                });
            }
            pending.waiters.insert(
                operation.to_string(),
                Waiter {
                    id,
                    reply: reply_tx,
                },
            );
        }
        let _registration = Registration {
            shared: &self.shared,
            operation,
            id,
        };

        trace!(operation, "Sending request");
        if let Err(e) = self.shared.transport.send(message).await {
            warn!(operation, error = %e, "Failed to send request");
            return Err(SyncError::ChannelClosed);
        }

        let payload = match timeout(self.timeout, reply_rx).await {
            Ok(Ok(payload)) => payload,
            Ok(Err(_)) => return Err(SyncError::ChannelClosed),
            Err(_) => {
                warn!(operation, timeout_secs = self.timeout.as_secs(), "Call timed out");
                return Err(SyncError::Timeout {
                    operation: operation.to_string(),
                    secs: self.timeout.as_secs(),
                });
            }
        };

        payload_as(operation, payload)
    }

    /// Close the underlying transport; pending and future calls fail.
    pub async fn close(&self) -> Result<()> {
        self.shared.close();
        self.shared.transport.close().await?;
        Ok(())
    }
}

impl Drop for CorrelationChannel {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

/// Removes a waiter when its call ends, however it ends.
///
/// The id check keeps a finished call from removing a newer registration
/// for the same operation.
struct Registration<'a> {
    shared: &'a Shared,
    operation: &'a str,
    id: u64,
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        let mut pending = self.shared.pending();
        if pending
            .waiters
            .get(self.operation)
            .is_some_and(|waiter| waiter.id == self.id)
        {
            pending.waiters.remove(self.operation);
        }
    }
}

async fn read_loop(shared: Arc<Shared>) {
    loop {
        let text = match shared.transport.recv().await {
            Ok(Some(text)) => text,
            Ok(None) => {
                debug!("Transport closed");
                break;
            }
            Err(e) => {
                warn!(error = %e, "Transport failed");
                break;
            }
        };

        let envelope = match protocol::decode(&text) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(error = %e, "Dropping malformed message");
                continue;
            }
        };

        let waiter = shared.pending().waiters.remove(&envelope.operation);
        match waiter {
            Some(waiter) => {
                trace!(operation = %envelope.operation, "Reply received");
                // The caller may have given up in the meantime.
                let _ = waiter.reply.send(envelope.payload);
            }
            None => {
                debug!(operation = %envelope.operation, "Dropping unmatched message");
            }
        }
    }

    shared.close();
}
