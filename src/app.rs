//! Command-line client: argument parsing, configuration and wiring.

use anyhow::Context;
use bridge_desktop::{HttpObjectStore, NotifyEventSource, TokioFileTree, WebSocketTransport};
use bridge_traits::logging::LogLevel;
use clap::Parser;
use core_runtime::config::{CoreConfig, PersistedConfig, CONFIG_FILE, DEFAULT_PORT};
use core_runtime::events::{CoreEvent, EventBus, EventSeverity, EventStream, RecvError};
use core_runtime::logging::{parse_log_level, LogFormat, LoggingConfig};
use core_sync::{ChangeWatcher, ReconcileConfig, ReconcileCoordinator, WatcherConfig};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Keep a local folder converged with a Tree Sync server
#[derive(Parser, Debug)]
#[command(name = "treesync")]
#[command(version)]
#[command(about = "Keep a local folder in sync with a remote object store")]
pub struct Cli {
    /// Folder to synchronize (remembered in the config file)
    #[arg(value_name = "FOLDER")]
    pub folder: Option<PathBuf>,

    /// Server host name, without scheme (remembered in the config file)
    #[arg(value_name = "SERVER")]
    pub server: Option<String>,

    /// Server port for both the WebSocket and the file endpoints
    #[arg(long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Configuration file
    #[arg(long, value_name = "PATH", default_value = CONFIG_FILE)]
    pub config: PathBuf,

    /// Log format: pretty, json or compact
    #[arg(long, value_name = "FORMAT", value_parser = LogFormat::from_str)]
    pub log_format: Option<LogFormat>,

    /// Log level for workspace crates
    #[arg(long, value_name = "LEVEL", default_value = "info", value_parser = parse_log_level)]
    pub log_level: LogLevel,
}

impl Cli {
    pub fn logging_config(&self) -> LoggingConfig {
        let config = LoggingConfig::default().with_level(self.log_level);
        match self.log_format {
            Some(format) => config.with_format(format),
            None => config,
        }
    }

    /// Merge the arguments over the persisted configuration and save the result.
    ///
    /// Arguments win over the file; whatever ends up in use is written back
    /// so the next run can omit it.
    pub fn resolve_config(&self) -> anyhow::Result<CoreConfig> {
        let persisted = PersistedConfig::load(&self.config)?;

        let mut builder = CoreConfig::builder().port(self.port);
        if let Some(folder) = &self.folder {
            builder = builder.root_dir(folder);
        }
        if let Some(server) = &self.server {
            builder = builder.server(server);
        }

        let config = builder
            .persisted(&persisted)
            .build()
            .context("Pass FOLDER and SERVER, or run once with both to remember them")?;

        PersistedConfig::from(&config).save(&self.config)?;
        Ok(config)
    }
}

/// Connect to the server and reconcile until Ctrl-C.
pub async fn run(config: CoreConfig) -> anyhow::Result<()> {
    let url = config.websocket_url();
    let transport = WebSocketTransport::connect(&url)
        .await
        .with_context(|| format!("Failed to connect to {url}"))?;
    let store = HttpObjectStore::new(config.http_base_url())?;
    let tree = Arc::new(TokioFileTree::new());

    let reconcile = ReconcileConfig::from(&config);
    let channel = Arc::new(reconcile.channel(Arc::new(transport)));
    let orchestrator = Arc::new(reconcile.orchestrator(Arc::new(store), tree.clone()));

    let watcher = ChangeWatcher::new(
        tree,
        Arc::new(NotifyEventSource::new()),
        WatcherConfig::from(&config),
    );
    let bus = EventBus::default();
    let reporter = core_async::spawn(report_progress(progress_stream(&bus)));
    let coordinator = Arc::new(
        ReconcileCoordinator::new(
            Arc::clone(&channel),
            orchestrator,
            Arc::new(watcher.pause_switch()),
            reconcile,
        )
        .with_event_bus(bus),
    );

    let handle = watcher.start(config.root_dir.clone(), coordinator.settled_callback())?;
    info!(
        root = %config.root_dir.display(),
        server = %url,
        "Tree sync running, press Ctrl-C to stop"
    );

    core_async::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;

    info!("Shutting down");
    handle.stop().await;
    channel.close().await?;
    reporter.abort();
    Ok(())
}

/// Cycle milestones worth showing to the user.
pub fn progress_stream(bus: &EventBus) -> EventStream {
    EventStream::new(bus.subscribe()).filter(|event| event.severity() >= EventSeverity::Info)
}

/// Log each event at the level its severity calls for, until the bus goes away.
pub async fn report_progress(mut events: EventStream) {
    loop {
        match events.recv().await {
            Ok(event) => log_event(&event),
            Err(RecvError::Lagged(missed)) => warn!(missed, "Progress reporter fell behind"),
            Err(RecvError::Closed) => break,
        }
    }
}

fn log_event(event: &CoreEvent) {
    let CoreEvent::Reconcile(detail) = event;
    let cycle_id = detail.cycle_id();
    let summary = event.description();

    match event.severity() {
        EventSeverity::Error => error!(cycle_id, ?detail, "{summary}"),
        EventSeverity::Warning => warn!(cycle_id, ?detail, "{summary}"),
        EventSeverity::Info => info!(cycle_id, ?detail, "{summary}"),
        EventSeverity::Debug => debug!(cycle_id, ?detail, "{summary}"),
    }
}
