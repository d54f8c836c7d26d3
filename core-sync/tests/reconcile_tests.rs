//! End-to-end reconciliation tests.
//!
//! A client coordinator talks to a [`RemoteResponder`] over an in-memory
//! transport pair; the local side is a real temporary directory.

mod common;

use bridge_desktop::TokioFileTree;
use bridge_traits::storage::FileTree;
use bridge_traits::transport::MessageTransport;
use chrono::{TimeZone, Utc};
use common::{eventually, ManualEventSource, MemoryObjectStore, ProbeCounter};
use core_async::time::{sleep, Duration};
use core_runtime::events::{CoreEvent, EventBus, ReconcileEvent};
use core_sync::{
    scan_tree, ChangeWatcher, CycleOutcome, LoopbackTransport, PauseSwitch, ReconcileConfig,
    ReconcileCoordinator, RemoteResponder, WatcherConfig,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

const CHUNK: usize = core_sync::fingerprint::DEFAULT_CHUNK_SIZE;

struct Fixture {
    dir: TempDir,
    tree: Arc<TokioFileTree>,
    store: Arc<MemoryObjectStore>,
    coordinator: Arc<ReconcileCoordinator>,
    switch: PauseSwitch,
    probes: Arc<AtomicUsize>,
}

impl Fixture {
    fn new(store: MemoryObjectStore) -> Self {
        Self::build(store, PauseSwitch::new(), None)
    }

    fn build(store: MemoryObjectStore, switch: PauseSwitch, bus: Option<EventBus>) -> Self {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(store);
        let tree = Arc::new(TokioFileTree::new());

        let (client, server) = LoopbackTransport::pair();
        let (server, probes) = ProbeCounter::new(server);
        let server: Arc<dyn MessageTransport> = Arc::new(server);
        let responder = RemoteResponder::new(store.clone());
        core_async::spawn(async move { responder.serve(server).await });

        let config = ReconcileConfig {
            call_timeout: Duration::from_secs(5),
            ..ReconcileConfig::new(dir.path())
        };
        let channel = config.channel(Arc::new(client));
        let orchestrator = config.orchestrator(store.clone(), tree.clone());
        let mut coordinator = ReconcileCoordinator::new(
            Arc::new(channel),
            Arc::new(orchestrator),
            Arc::new(switch.clone()),
            config,
        );
        if let Some(bus) = bus {
            coordinator = coordinator.with_event_bus(bus);
        }

        Self {
            dir,
            tree,
            store,
            coordinator: Arc::new(coordinator),
            switch,
            probes,
        }
    }

    fn write(&self, path: &str, data: &[u8]) {
        let full = self.dir.path().join(path);
        std::fs::create_dir_all(full.parent().unwrap()).unwrap();
        std::fs::write(full, data).unwrap();
    }

    fn read(&self, path: &str) -> Vec<u8> {
        std::fs::read(self.dir.path().join(path)).unwrap()
    }

    async fn reconcile(&self) -> CycleOutcome {
        let snapshot = scan_tree(self.tree.as_ref(), self.dir.path(), CHUNK)
            .await
            .unwrap();
        self.coordinator.handle_settled(snapshot).await.unwrap()
    }
}

fn transferred(outcome: CycleOutcome) -> core_sync::TransferReport {
    match outcome {
        CycleOutcome::Transferred(report) => report,
        other => panic!("expected transfers, got {other:?}"),
    }
}

#[core_async::test]
async fn test_new_local_file_is_uploaded() {
    let fixture = Fixture::new(MemoryObjectStore::new());
    fixture.write("docs/a.txt", b"hello");

    let report = transferred(fixture.reconcile().await);

    assert_eq!(report.uploaded.len(), 1);
    assert_eq!(report.uploaded[0].as_str(), "docs/a.txt");
    assert_eq!(fixture.store.get("docs/a.txt").unwrap().as_ref(), b"hello");

    // Converged: the next probe reports nothing to do.
    assert_eq!(fixture.reconcile().await, CycleOutcome::UpToDate);
}

#[core_async::test]
async fn test_newer_local_file_replaces_remote() {
    let store = MemoryObjectStore::new();
    store.insert("a.txt", b"old", Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0).unwrap());
    let fixture = Fixture::new(store);
    fixture.write("a.txt", b"new");

    let report = transferred(fixture.reconcile().await);

    assert_eq!(report.updated.len(), 1);
    assert!(report.uploaded.is_empty() && report.downloaded.is_empty());
    assert_eq!(fixture.store.get("a.txt").unwrap().as_ref(), b"new");
    assert_eq!(fixture.reconcile().await, CycleOutcome::UpToDate);
}

#[core_async::test]
async fn test_remote_files_are_downloaded() {
    let store = MemoryObjectStore::new();
    let later = Utc::now() + chrono::Duration::hours(1);
    store.insert("nested/b.txt", b"remote only", Utc::now());
    store.insert("c.txt", b"remote is newer", later);
    let fixture = Fixture::new(store);
    fixture.write("c.txt", b"stale");

    let report = transferred(fixture.reconcile().await);

    assert_eq!(report.downloaded.len(), 2);
    assert!(report.is_clean());
    assert_eq!(fixture.read("nested/b.txt"), b"remote only");
    assert_eq!(fixture.read("c.txt"), b"remote is newer");
    assert!(!fixture.switch.is_paused());

    assert_eq!(fixture.reconcile().await, CycleOutcome::UpToDate);
}

#[core_async::test]
async fn test_identical_trees_stop_after_probe() {
    let store = MemoryObjectStore::new();
    store.insert("same.txt", b"same", Utc::now());
    let fixture = Fixture::new(store);
    fixture.write("same.txt", b"same");

    assert_eq!(fixture.reconcile().await, CycleOutcome::UpToDate);
    assert_eq!(fixture.probes.load(Ordering::SeqCst), 1);
}

#[core_async::test]
async fn test_duplicate_snapshots_send_one_probe() {
    let fixture = Fixture::new(MemoryObjectStore::new());
    fixture.write("a.txt", b"content");
    let snapshot = scan_tree(fixture.tree.as_ref(), fixture.dir.path(), CHUNK)
        .await
        .unwrap();

    let on_settled = fixture.coordinator.settled_callback();
    on_settled(snapshot.clone());
    on_settled(snapshot);

    assert!(eventually(|| fixture.store.len() == 1).await);
    sleep(Duration::from_millis(50)).await;
    assert_eq!(fixture.probes.load(Ordering::SeqCst), 1);
}

#[core_async::test]
async fn test_cycle_events_are_published() {
    let bus = EventBus::new(32);
    let mut events = bus.subscribe();

    let fixture = Fixture::build(MemoryObjectStore::new(), PauseSwitch::new(), Some(bus));
    fixture.write("a.txt", b"x");
    fixture.reconcile().await;

    let mut kinds = Vec::new();
    while let Ok(CoreEvent::Reconcile(event)) = events.try_recv() {
        kinds.push(match event {
            ReconcileEvent::CycleStarted { .. } => "started",
            ReconcileEvent::UpToDate { .. } => "up_to_date",
            ReconcileEvent::DiffReceived { to_upload, .. } => {
                assert_eq!(to_upload, 1);
                "diff"
            }
            ReconcileEvent::TransferCompleted { uploaded, failed, .. } => {
                assert_eq!((uploaded, failed), (1, 0));
                "transferred"
            }
            ReconcileEvent::CycleFailed { .. } => "failed",
        });
    }
    assert_eq!(kinds, vec!["started", "diff", "transferred"]);
}

#[core_async::test]
async fn test_download_writes_do_not_retrigger_until_next_event() {
    let source = Arc::new(ManualEventSource::default());
    let store = MemoryObjectStore::new();
    store.insert("from-server.txt", b"payload", Utc::now() + chrono::Duration::hours(1));
    store.notify_downloads_on(source.clone());

    let fixture = Fixture::build(store, PauseSwitch::new(), None);

    let config = WatcherConfig {
        debounce: Duration::from_millis(50),
        safety_interval: Duration::from_secs(30),
        ..WatcherConfig::default()
    };
    let tree: Arc<dyn FileTree> = fixture.tree.clone();
    let handle = ChangeWatcher::new(tree, source.clone(), config)
        .with_pause_switch(fixture.switch.clone())
        .start(
            fixture.dir.path().to_path_buf(),
            fixture.coordinator.settled_callback(),
        )
        .unwrap();

    assert!(eventually(|| fixture.dir.path().join("from-server.txt").exists()).await);
    sleep(Duration::from_millis(300)).await;
    assert_eq!(fixture.probes.load(Ordering::SeqCst), 1);

    source.emit();
    assert!(eventually(|| fixture.probes.load(Ordering::SeqCst) == 2).await);

    handle.stop().await;
}
