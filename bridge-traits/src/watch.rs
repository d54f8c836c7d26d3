//! Raw filesystem change notifications.
//!
//! A [`FileEventSource`] only reports *that* something changed under a root.
//! Debouncing, pausing and rescanning are the sync engine's job; sources
//! should forward events as fast as the platform delivers them.

use core_async::sync::mpsc;
use std::any::Any;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// A single raw change notification.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FsEvent {
    /// Paths the platform attributed to the change (may be empty)
    pub paths: Vec<PathBuf>,
}

impl FsEvent {
    pub fn new(paths: Vec<PathBuf>) -> Self {
        Self { paths }
    }
}

/// Live subscription returned by [`FileEventSource::subscribe`].
///
/// Events keep flowing for as long as the subscription is alive. The
/// keep-alive guard holds whatever platform handle must not be dropped
/// (e.g. a native watcher object).
pub struct EventSubscription {
    events: mpsc::UnboundedReceiver<FsEvent>,
    _keepalive: Option<Box<dyn Any + Send>>,
}

impl EventSubscription {
    pub fn new(events: mpsc::UnboundedReceiver<FsEvent>) -> Self {
        Self {
            events,
            _keepalive: None,
        }
    }

    /// Attach a handle that must live as long as the subscription
    pub fn with_keepalive(mut self, guard: impl Any + Send) -> Self {
        self._keepalive = Some(Box::new(guard));
        self
    }

    /// Receive the next event, or `None` once the source has shut down
    pub async fn recv(&mut self) -> Option<FsEvent> {
        self.events.recv().await
    }

    /// Take an already queued event without waiting
    pub fn try_recv(&mut self) -> Option<FsEvent> {
        self.events.try_recv().ok()
    }
}

impl fmt::Debug for EventSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSubscription")
            .field("has_keepalive", &self._keepalive.is_some())
            .finish()
    }
}

/// Filesystem event source trait
///
/// # Example
///
/// ```ignore
/// use bridge_traits::watch::FileEventSource;
///
/// async fn first_change(source: &dyn FileEventSource, root: &Path) -> Result<()> {
///     let mut subscription = source.subscribe(root)?;
///     let _ = subscription.recv().await;
///     Ok(())
/// }
/// ```
pub trait FileEventSource: Send + Sync {
    /// Start observing `root` recursively
    fn subscribe(&self, root: &Path) -> Result<EventSubscription>;
}
