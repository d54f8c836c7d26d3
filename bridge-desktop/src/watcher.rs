//! Filesystem Event Source Implementation using notify

use bridge_traits::{
    error::{BridgeError, Result},
    watch::{EventSubscription, FileEventSource, FsEvent},
};
use core_async::sync::mpsc;
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::Path;
use tracing::{info, warn};

/// Recursive watcher backed by the platform's recommended notify backend
///
/// Access events are filtered out; everything else is forwarded as-is.
/// The native watcher lives inside the returned subscription, so dropping
/// the subscription stops delivery.
#[derive(Debug, Clone, Default)]
pub struct NotifyEventSource;

impl NotifyEventSource {
    pub fn new() -> Self {
        Self
    }
}

fn is_relevant(kind: &EventKind) -> bool {
    !matches!(kind, EventKind::Access(_))
}

impl FileEventSource for NotifyEventSource {
    fn subscribe(&self, root: &Path) -> Result<EventSubscription> {
        let (tx, rx) = mpsc::unbounded_channel();

        let mut watcher: RecommendedWatcher =
            notify::recommended_watcher(move |res: notify::Result<notify::Event>| match res {
                Ok(event) if is_relevant(&event.kind) => {
                    // Receiver gone means the subscription was dropped.
                    let _ = tx.send(FsEvent::new(event.paths));
                }
                Ok(_) => {}
                Err(e) => warn!(error = %e, "Filesystem watch error"),
            })
            .map_err(|e| BridgeError::OperationFailed(format!("create watcher: {e}")))?;

        watcher
            .watch(root, RecursiveMode::Recursive)
            .map_err(|e| {
                BridgeError::OperationFailed(format!("watch {}: {e}", root.display()))
            })?;

        info!(path = ?root, "Watching directory tree");
        Ok(EventSubscription::new(rx).with_keepalive(watcher))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_async::time::{timeout, Duration};
    use notify::event::{AccessKind, CreateKind};
    use tempfile::TempDir;

    #[test]
    fn test_access_events_filtered() {
        assert!(!is_relevant(&EventKind::Access(AccessKind::Any)));
        assert!(is_relevant(&EventKind::Create(CreateKind::File)));
    }

    #[test]
    fn test_subscribe_missing_root_fails() {
        let dir = TempDir::new().unwrap();
        let source = NotifyEventSource::new();
        assert!(source.subscribe(&dir.path().join("missing")).is_err());
    }

    #[core_async::test]
    async fn test_file_creation_is_reported() {
        let dir = TempDir::new().unwrap();
        let source = NotifyEventSource::new();
        let mut subscription = source.subscribe(dir.path()).unwrap();

        std::fs::write(dir.path().join("new.txt"), b"x").unwrap();

        let event = timeout(Duration::from_secs(5), subscription.recv())
            .await
            .expect("no event within 5s");
        assert!(event.is_some());
    }
}
