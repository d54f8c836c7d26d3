//! # Event Bus System
//!
//! Broadcasts what the reconciliation engine is doing so a host (CLI status
//! line, tray icon, test harness) can follow along without hooking into the
//! engine itself. Built on `tokio::sync::broadcast`.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     emit      ┌───────────┐     subscribe    ┌────────────┐
//! │ Coordinator ├──────────────>│ EventBus  ├─────────────────>│ Subscriber │
//! └─────────────┘               │ (broadcast│                  └────────────┘
//!                               │  channel) │     subscribe    ┌────────────┐
//!                               │           ├─────────────────>│ Subscriber │
//!                               └───────────┘                  └────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{CoreEvent, EventBus, EventStream, ReconcileEvent};
//!
//! # #[core_async::main]
//! # async fn main() {
//! let bus = EventBus::new(100);
//! let mut failures = EventStream::new(bus.subscribe())
//!     .filter(|event| matches!(event, CoreEvent::Reconcile(ReconcileEvent::CycleFailed { .. })));
//!
//! bus.emit(CoreEvent::Reconcile(ReconcileEvent::CycleFailed {
//!     cycle_id: "c-1".to_string(),
//!     message: "channel closed".to_string(),
//! }))
//! .ok();
//!
//! let event = failures.recv().await.unwrap();
//! assert_eq!(event.severity(), core_runtime::events::EventSeverity::Error);
//! # }
//! ```
//!
//! ## Delivery
//!
//! Emitting with no subscribers is not an error for the engine; callers
//! ignore the `SendError`. Slow subscribers see `RecvError::Lagged(n)` and
//! continue from the oldest retained event.

use core_async::sync::broadcast;
use serde::{Deserialize, Serialize};
use std::fmt;

pub use core_async::sync::broadcast::error::{RecvError, SendError};
pub use core_async::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

/// Top-level event enum.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Reconciliation cycle progress
    Reconcile(ReconcileEvent),
}

impl CoreEvent {
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Reconcile(e) => e.description(),
        }
    }

    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Reconcile(ReconcileEvent::CycleFailed { .. }) => EventSeverity::Error,
            CoreEvent::Reconcile(ReconcileEvent::TransferCompleted { failed, .. }) if *failed > 0 => {
                EventSeverity::Warning
            }
            CoreEvent::Reconcile(ReconcileEvent::TransferCompleted { .. }) => EventSeverity::Info,
            CoreEvent::Reconcile(_) => EventSeverity::Debug,
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

/// One reconciliation cycle, from probe to transfer.
///
/// Every variant carries the `cycle_id` so subscribers can group events.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum ReconcileEvent {
    /// A settled snapshot was accepted and the probe is about to be sent.
    CycleStarted {
        cycle_id: String,
        /// Aggregate fingerprint of the local snapshot
        fingerprint: String,
        file_count: u64,
    },
    /// The server reported no difference.
    UpToDate { cycle_id: String },
    /// The server returned a diff.
    DiffReceived {
        cycle_id: String,
        to_upload: u64,
        to_update: u64,
        to_download: u64,
    },
    /// All three transfer phases ran.
    TransferCompleted {
        cycle_id: String,
        uploaded: u64,
        updated: u64,
        downloaded: u64,
        failed: u64,
        duration_ms: u64,
    },
    /// The cycle was aborted (channel closed, timeout, protocol error).
    CycleFailed { cycle_id: String, message: String },
}

impl ReconcileEvent {
    fn description(&self) -> &str {
        match self {
            ReconcileEvent::CycleStarted { .. } => "Reconciliation started",
            ReconcileEvent::UpToDate { .. } => "Already up to date",
            ReconcileEvent::DiffReceived { .. } => "Diff received",
            ReconcileEvent::TransferCompleted { .. } => "Transfers completed",
            ReconcileEvent::CycleFailed { .. } => "Reconciliation failed",
        }
    }

    pub fn cycle_id(&self) -> &str {
        match self {
            ReconcileEvent::CycleStarted { cycle_id, .. }
            | ReconcileEvent::UpToDate { cycle_id }
            | ReconcileEvent::DiffReceived { cycle_id, .. }
            | ReconcileEvent::TransferCompleted { cycle_id, .. }
            | ReconcileEvent::CycleFailed { cycle_id, .. } => cycle_id,
        }
    }
}

/// Central event bus
///
/// Cheap to clone; all clones share one channel.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a new event bus buffering up to `capacity` events per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event, or an error
    /// if there are none.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// Creates a new subscriber. Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

/// Type alias for event filter functions.
type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// A `broadcast::Receiver` with optional filtering.
pub struct EventStream {
    receiver: Receiver<CoreEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    pub fn new(receiver: Receiver<CoreEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    /// Only events matching `predicate` will be returned by `recv()`.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    fn accepts(&self, event: &CoreEvent) -> bool {
        self.filter.as_ref().map_or(true, |filter| filter(event))
    }

    /// Receives the next event that passes the filter.
    ///
    /// # Errors
    ///
    /// Returns `RecvError::Lagged(n)` if the subscriber fell behind by `n` events.
    /// Returns `RecvError::Closed` if all senders have been dropped.
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.accepts(&event) {
                return Ok(event);
            }
        }
    }

    /// Attempts to receive a matching event without waiting.
    ///
    /// Returns `None` if no matching events are currently available.
    pub fn try_recv(&mut self) -> Option<Result<CoreEvent, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.accepts(&event) {
                        return Some(Ok(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    return Some(Err(RecvError::Lagged(n)))
                }
                Err(broadcast::error::TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
            }
        }
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn started(id: &str) -> CoreEvent {
        CoreEvent::Reconcile(ReconcileEvent::CycleStarted {
            cycle_id: id.to_string(),
            fingerprint: "abc".to_string(),
            file_count: 3,
        })
    }

    fn failed(id: &str) -> CoreEvent {
        CoreEvent::Reconcile(ReconcileEvent::CycleFailed {
            cycle_id: id.to_string(),
            message: "timeout".to_string(),
        })
    }

    #[core_async::test]
    async fn test_emission_without_subscribers_errors() {
        let bus = EventBus::new(10);
        assert!(bus.emit(started("c1")).is_err());
    }

    #[core_async::test]
    async fn test_multiple_subscribers_receive_same_event() {
        let bus = EventBus::new(10);
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();

        assert_eq!(bus.emit(started("c1")).unwrap(), 2);

        assert_eq!(first.recv().await.unwrap(), started("c1"));
        assert_eq!(second.recv().await.unwrap(), started("c1"));
    }

    #[core_async::test]
    async fn test_event_stream_with_filter() {
        let bus = EventBus::new(10);
        let mut stream = EventStream::new(bus.subscribe())
            .filter(|event| event.severity() == EventSeverity::Error);

        bus.emit(started("c1")).unwrap();
        bus.emit(failed("c1")).unwrap();

        assert_eq!(stream.recv().await.unwrap(), failed("c1"));
    }

    #[core_async::test]
    async fn test_lagged_subscriber() {
        let bus = EventBus::new(2);
        let mut sub = bus.subscribe();

        for i in 0..5 {
            bus.emit(started(&format!("c{i}"))).ok();
        }

        assert!(matches!(sub.recv().await, Err(RecvError::Lagged(_))));
    }

    #[core_async::test]
    async fn test_try_recv_empty_then_event() {
        let bus = EventBus::new(10);
        let mut stream = EventStream::new(bus.subscribe());

        assert!(stream.try_recv().is_none());

        bus.emit(failed("c2")).unwrap();
        assert_eq!(stream.try_recv().unwrap().unwrap(), failed("c2"));
    }

    #[test]
    fn test_severity_of_partial_transfer() {
        let clean = CoreEvent::Reconcile(ReconcileEvent::TransferCompleted {
            cycle_id: "c".to_string(),
            uploaded: 1,
            updated: 0,
            downloaded: 0,
            failed: 0,
            duration_ms: 5,
        });
        let partial = CoreEvent::Reconcile(ReconcileEvent::TransferCompleted {
            cycle_id: "c".to_string(),
            uploaded: 1,
            updated: 0,
            downloaded: 0,
            failed: 2,
            duration_ms: 5,
        });

        assert_eq!(clean.severity(), EventSeverity::Info);
        assert_eq!(partial.severity(), EventSeverity::Warning);
        assert_eq!(started("c").severity(), EventSeverity::Debug);
    }

    #[test]
    fn test_event_serialization() {
        let json = serde_json::to_value(failed("c9")).unwrap();

        assert_eq!(json["type"], "Reconcile");
        assert_eq!(json["payload"]["event"], "CycleFailed");
        assert_eq!(json["payload"]["cycle_id"], "c9");

        let back: CoreEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, failed("c9"));
    }

    #[test]
    fn test_cycle_id_accessor() {
        let event = ReconcileEvent::UpToDate {
            cycle_id: "c7".to_string(),
        };
        assert_eq!(event.cycle_id(), "c7");
        assert_eq!(CoreEvent::Reconcile(event).description(), "Already up to date");
    }
}
