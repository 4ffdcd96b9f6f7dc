use std::sync::Arc;

use clap::Parser;
use fiberwatch::config::{read_config_file, MonitoringConfig, StorageConfig};
use fiberwatch::events::{EventBroadcaster, MONITORING_TOPIC};
use fiberwatch::monitor::MonitorSupervisor;
use fiberwatch::storage::memory::MemoryStorage;
use fiberwatch::storage::Storage;
use fiberwatch::sync::{DeviceReconciler, DeviceTypeFilter};
use fiberwatch::acs::AcsClient;
use tracing::{debug, error, info, level_filters::LevelFilter, trace, warn};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Parser)]
struct Args {
    /// Config file
    #[arg(short)]
    file: Option<String>,
}

fn init() {
    let filter = filter::Targets::new().with_targets(vec![
        ("fiberwatch", LevelFilter::TRACE),
        ("hub", LevelFilter::TRACE),
    ]);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init();
    dotenv::dotenv().ok();

    let args = Args::parse();
    trace!("started with args: {args:?}");

    let (monitors, storage_config) = match &args.file {
        Some(file) => {
            let config = read_config_file(file)?;
            (
                config.monitors.unwrap_or_default(),
                config.storage.unwrap_or_default(),
            )
        }
        None => {
            // no config file: one monitor from the ACS_* environment
            (
                vec![MonitoringConfig::from_env("acs-main")],
                StorageConfig::default(),
            )
        }
    };

    let storage = build_storage(&storage_config).await?;
    info!("storage ready: {}", storage.get_stats().await?);

    let broadcaster = Arc::new(EventBroadcaster::new());
    let supervisor = MonitorSupervisor::new(storage.clone(), broadcaster.clone());

    spawn_event_logger(broadcaster.clone());

    for config in monitors {
        if !config.active {
            debug!("skipping inactive config {}", config.id);
            continue;
        }

        // an initial full sync before the poll loop starts
        let client = Arc::new(AcsClient::new(&config)?);
        let reconciler = DeviceReconciler::new(client, storage.clone(), broadcaster.clone());
        match reconciler.sync(&config, DeviceTypeFilter::All).await {
            Ok(report) => info!(
                "initial sync for {}: {}/{} devices, {} errors",
                config.id,
                report.synced,
                report.total,
                report.errors.len()
            ),
            Err(e) => warn!("initial sync for {} failed: {e:#}", config.id),
        }

        supervisor.start(config).await?;
    }

    tokio::signal::ctrl_c().await?;
    info!("shutting down");

    supervisor.stop_all().await;
    storage.close().await?;

    Ok(())
}

async fn build_storage(config: &StorageConfig) -> anyhow::Result<Arc<dyn Storage>> {
    match config {
        StorageConfig::None => {
            info!("using in-memory storage (no persistence)");
            Ok(Arc::new(MemoryStorage::new()))
        }
        #[cfg(feature = "storage-sqlite")]
        StorageConfig::Sqlite { path } => {
            info!("using SQLite storage at {}", path.display());
            let backend = fiberwatch::storage::sqlite::SqliteBackend::new(path).await?;
            Ok(Arc::new(backend))
        }
        #[cfg(not(feature = "storage-sqlite"))]
        StorageConfig::Sqlite { .. } => {
            anyhow::bail!("built without the storage-sqlite feature")
        }
    }
}

fn spawn_event_logger(broadcaster: Arc<EventBroadcaster>) {
    let mut events = broadcaster.subscribe(MONITORING_TOPIC);
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => match serde_json::to_string(&event) {
                    Ok(json) => debug!("event: {json}"),
                    Err(e) => error!("failed to encode event: {e}"),
                },
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("event logger lagged, skipped {skipped} events");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}
