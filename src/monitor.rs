//! ParameterMonitorActor - polls critical parameters for the whole fleet
//!
//! One actor per monitoring config. Each tick lists the devices the ACS
//! knows, polls the critical parameter set for each (bounded concurrency),
//! refreshes the snapshot cache, persists samples, runs threshold evaluation
//! and recomputes health.
//!
//! ## Message Flow
//!
//! ```text
//! Timer tick → list devices → poll parameters → cache + store → thresholds → health
//!     ↑
//!     └─── Commands (PollNow, UpdateInterval, Shutdown)
//! ```
//!
//! Per-device failures are logged and skipped; one misbehaving device never
//! stalls the tick for the rest of the fleet.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use futures::StreamExt;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::time::interval;
use tracing::{debug, error, instrument, trace, warn};

use crate::acs::{AcsClient, RemoteDevice};
use crate::cache::ParameterCache;
use crate::classify::classify_device;
use crate::config::MonitoringConfig;
use crate::events::{EventBroadcaster, MonitoringEvent, MONITORING_TOPIC};
use crate::health::HealthScorer;
use crate::params::{critical_parameters, unit_for_path};
use crate::storage::{SampleRow, Storage};
use crate::thresholds::ThresholdEngine;
use crate::DeviceParameter;

/// Devices polled concurrently within one tick.
const POLL_CONCURRENCY: usize = 8;

/// Control messages for a [`ParameterMonitorActor`].
pub enum MonitorCommand {
    /// Poll the fleet immediately, outside the timer.
    PollNow {
        respond_to: oneshot::Sender<Result<usize>>,
    },

    /// Change the polling interval, effective immediately.
    UpdateInterval { interval_secs: u64 },

    /// Stop the actor.
    Shutdown,
}

/// Actor that polls one ACS endpoint's fleet at a fixed interval.
pub struct ParameterMonitorActor {
    config: MonitoringConfig,
    client: Arc<AcsClient>,
    cache: Arc<ParameterCache>,
    storage: Arc<dyn Storage>,
    broadcaster: Arc<EventBroadcaster>,
    thresholds: ThresholdEngine,
    health: HealthScorer,
    command_rx: mpsc::Receiver<MonitorCommand>,
    interval_duration: Duration,
}

impl ParameterMonitorActor {
    fn new(
        config: MonitoringConfig,
        client: Arc<AcsClient>,
        cache: Arc<ParameterCache>,
        storage: Arc<dyn Storage>,
        broadcaster: Arc<EventBroadcaster>,
        command_rx: mpsc::Receiver<MonitorCommand>,
    ) -> Self {
        let thresholds = ThresholdEngine::new(storage.clone(), cache.clone(), broadcaster.clone());
        let health = HealthScorer::new(client.clone(), cache.clone(), storage.clone());
        let interval_duration = Duration::from_secs(config.poll_interval_minutes * 60);

        Self {
            config,
            client,
            cache,
            storage,
            broadcaster,
            thresholds,
            health,
            command_rx,
            interval_duration,
        }
    }

    /// Run the actor's main loop until shutdown or channel closure.
    ///
    /// The first tick fires immediately, so a freshly started monitor polls
    /// without waiting a full interval.
    #[instrument(skip(self), fields(config_id = %self.config.id))]
    pub async fn run(mut self) {
        debug!("starting parameter monitor");

        let mut ticker = interval(self.interval_duration);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.poll_all().await {
                        error!("poll tick failed: {:#}", e);
                    }
                }

                Some(cmd) = self.command_rx.recv() => {
                    match cmd {
                        MonitorCommand::PollNow { respond_to } => {
                            debug!("received PollNow command");
                            let result = self.poll_all().await;
                            let _ = respond_to.send(result);
                        }

                        MonitorCommand::UpdateInterval { interval_secs } => {
                            debug!("updating interval to {interval_secs}s");
                            self.interval_duration = Duration::from_secs(interval_secs);
                            ticker = interval(self.interval_duration);
                        }

                        MonitorCommand::Shutdown => {
                            debug!("received shutdown command");
                            break;
                        }
                    }
                }

                else => {
                    warn!("command channel closed, shutting down");
                    break;
                }
            }
        }

        debug!("parameter monitor stopped");
    }

    /// Poll every device the ACS lists. Returns the number of devices that
    /// were processed successfully.
    #[instrument(skip(self), fields(config_id = %self.config.id))]
    async fn poll_all(&self) -> Result<usize> {
        let devices = self
            .client
            .list_devices(None)
            .await
            .context("listing devices for poll tick")?;

        trace!("polling {} devices", devices.len());

        let processed = AtomicUsize::new(0);

        futures::stream::iter(&devices)
            .for_each_concurrent(POLL_CONCURRENCY, |device| {
                let processed = &processed;
                async move {
                    match self.process_device(device).await {
                        Ok(()) => {
                            processed.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(e) => {
                            warn!("failed to process device {}: {e:#}", device.id);
                        }
                    }
                }
            })
            .await;

        Ok(processed.load(Ordering::Relaxed))
    }

    /// One device's slice of a tick: poll, cache, persist, evaluate, score.
    async fn process_device(&self, remote: &RemoteDevice) -> Result<()> {
        let class = classify_device(remote.manufacturer.as_deref(), remote.product_id.as_deref());
        let paths = critical_parameters(class);

        let reported = self
            .client
            .get_parameters(&remote.id, paths)
            .await
            .context("polling critical parameters")?;

        let now = Utc::now();
        let parameters: Vec<DeviceParameter> = reported
            .into_iter()
            .filter_map(|parameter| {
                let value = parameter.value?;
                Some(DeviceParameter {
                    device_id: remote.id.clone(),
                    unit: unit_for_path(&parameter.path).to_string(),
                    path: parameter.path,
                    value,
                    timestamp: now,
                })
            })
            .collect();

        self.cache.insert_snapshot(&remote.id, parameters.clone());

        let metrics = snapshot_json(&parameters);

        // Storage failure degrades to cache-only operation for this tick
        let samples: Vec<SampleRow> = parameters.iter().map(SampleRow::from_parameter).collect();
        match self.storage.insert_samples_batch(samples).await {
            Ok(_) => {
                self.broadcaster.publish(
                    MONITORING_TOPIC,
                    MonitoringEvent::MetricLogged {
                        device_id: remote.id.clone(),
                        device_type: class,
                        metrics: metrics.clone(),
                        timestamp: now,
                    },
                );
            }
            Err(e) => {
                warn!("failed to persist samples for {}: {e}", remote.id);
            }
        }

        if let Err(e) = self.thresholds.evaluate_device(&remote.id, class).await {
            warn!("threshold evaluation failed for {}: {e:#}", remote.id);
        }

        let snapshot = self.health.calculate_health(&remote.id).await;

        self.broadcaster.publish(
            MONITORING_TOPIC,
            MonitoringEvent::DeviceMetricsUpdated {
                device_id: remote.id.clone(),
                device_type: class,
                metrics: serde_json::json!({
                    "parameters": metrics,
                    "health": snapshot.overall,
                }),
                timestamp: now,
            },
        );

        Ok(())
    }
}

fn snapshot_json(parameters: &[DeviceParameter]) -> serde_json::Value {
    parameters
        .iter()
        .map(|parameter| (parameter.path.clone(), parameter.value.clone()))
        .collect::<serde_json::Map<String, serde_json::Value>>()
        .into()
}

/// Handle for controlling a [`ParameterMonitorActor`].
///
/// Cloneable; all clones talk to the same actor.
#[derive(Clone)]
pub struct MonitorHandle {
    sender: mpsc::Sender<MonitorCommand>,

    /// Config this monitor is bound to
    pub config_id: String,
}

impl MonitorHandle {
    /// Spawn a monitor actor for a config and return its handle.
    pub fn spawn(
        config: MonitoringConfig,
        client: Arc<AcsClient>,
        cache: Arc<ParameterCache>,
        storage: Arc<dyn Storage>,
        broadcaster: Arc<EventBroadcaster>,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);
        let config_id = config.id.clone();

        let actor =
            ParameterMonitorActor::new(config, client, cache, storage, broadcaster, cmd_rx);
        tokio::spawn(actor.run());

        Self {
            sender: cmd_tx,
            config_id,
        }
    }

    /// Trigger an immediate poll, bypassing the timer. Returns the number of
    /// devices processed.
    pub async fn poll_now(&self) -> Result<usize> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(MonitorCommand::PollNow { respond_to: tx })
            .await
            .context("failed to send PollNow command")?;

        rx.await.context("failed to receive response")?
    }

    /// Update the polling interval.
    pub async fn update_interval(&self, interval_secs: u64) -> Result<()> {
        self.sender
            .send(MonitorCommand::UpdateInterval { interval_secs })
            .await
            .context("failed to send UpdateInterval command")?;
        Ok(())
    }

    /// Gracefully shut down the monitor.
    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(MonitorCommand::Shutdown)
            .await
            .context("failed to send Shutdown command")?;
        Ok(())
    }
}

/// Owns the running monitors, one per config id.
///
/// Starting a monitor for a config that already has one replaces it; stopping
/// an unknown config is a no-op. All monitors share the storage backend, the
/// snapshot cache and the event broadcaster.
pub struct MonitorSupervisor {
    monitors: Mutex<HashMap<String, MonitorHandle>>,
    cache: Arc<ParameterCache>,
    storage: Arc<dyn Storage>,
    broadcaster: Arc<EventBroadcaster>,
}

impl MonitorSupervisor {
    pub fn new(storage: Arc<dyn Storage>, broadcaster: Arc<EventBroadcaster>) -> Self {
        Self {
            monitors: Mutex::new(HashMap::new()),
            cache: Arc::new(ParameterCache::new()),
            storage,
            broadcaster,
        }
    }

    pub fn cache(&self) -> Arc<ParameterCache> {
        self.cache.clone()
    }

    /// Start (or restart) monitoring for a config.
    pub async fn start(&self, config: MonitoringConfig) -> Result<MonitorHandle> {
        config.validate()?;

        let client = Arc::new(AcsClient::new(&config)?);
        self.storage.upsert_config(config.clone()).await?;

        let mut monitors = self.monitors.lock().await;

        // the old timer must be gone before the new one exists, so a config
        // never has two live timers even for an instant
        if let Some(previous) = monitors.remove(&config.id) {
            debug!("replacing existing monitor for {}", previous.config_id);
            let _ = previous.shutdown().await;
        }

        let handle = MonitorHandle::spawn(
            config,
            client,
            self.cache.clone(),
            self.storage.clone(),
            self.broadcaster.clone(),
        );
        monitors.insert(handle.config_id.clone(), handle.clone());

        Ok(handle)
    }

    /// Stop monitoring for a config. Idempotent.
    pub async fn stop(&self, config_id: &str) -> Result<()> {
        let handle = self.monitors.lock().await.remove(config_id);
        if let Some(handle) = handle {
            handle.shutdown().await?;
        }
        Ok(())
    }

    /// Stop every running monitor.
    pub async fn stop_all(&self) {
        let handles: Vec<MonitorHandle> = self.monitors.lock().await.drain().map(|(_, h)| h).collect();
        for handle in handles {
            if let Err(e) = handle.shutdown().await {
                warn!("failed to stop monitor {}: {e}", handle.config_id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryStorage;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(base_url: &str) -> MonitoringConfig {
        MonitoringConfig {
            id: "acs-main".to_string(),
            base_url: base_url.to_string(),
            username: None,
            password: None,
            timeout_secs: 5,
            active: true,
            poll_interval_minutes: 5,
            last_sync: None,
        }
    }

    async fn mount_fleet(server: &MockServer) {
        let recent = (Utc::now() - chrono::Duration::minutes(2)).to_rfc3339();

        Mock::given(method("GET"))
            .and(path("/devices"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
                "_id": "onu-1",
                "_serialNumber": "SN456",
                "_manufacturer": "FiberHome",
                "_lastInform": recent,
            }])))
            .mount(server)
            .await;

        Mock::given(method("GET"))
            .and(path("/devices/onu-1/parameters"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                { "path": "InternetGatewayDevice.DeviceInfo.UpTime", "value": 86400 },
                { "path": "InternetGatewayDevice.DeviceInfo.X_CT-COM_Temperature", "value": 45 },
                { "path": "InternetGatewayDevice.DeviceInfo.X_CT-COM_OpticalSignal" }
            ])))
            .mount(server)
            .await;

        Mock::given(method("GET"))
            .and(path("/devices/onu-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "_id": "onu-1",
                "_lastInform": recent,
            })))
            .mount(server)
            .await;
    }

    fn spawn_monitor(
        server_uri: &str,
    ) -> (MonitorHandle, Arc<dyn Storage>, Arc<ParameterCache>, Arc<EventBroadcaster>) {
        let config = test_config(server_uri);
        let client = Arc::new(AcsClient::new(&config).unwrap());
        let cache = Arc::new(ParameterCache::new());
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
        let broadcaster = Arc::new(EventBroadcaster::new());

        let handle = MonitorHandle::spawn(
            config,
            client,
            cache.clone(),
            storage.clone(),
            broadcaster.clone(),
        );
        (handle, storage, cache, broadcaster)
    }

    #[tokio::test]
    async fn test_poll_now_runs_the_full_pipeline() {
        let server = MockServer::start().await;
        mount_fleet(&server).await;

        let (handle, storage, cache, broadcaster) = spawn_monitor(&server.uri());
        let mut events = broadcaster.subscribe(MONITORING_TOPIC);

        let processed = handle.poll_now().await.unwrap();
        assert_eq!(processed, 1);

        // snapshot cached without the absent parameter
        let snapshot = cache.snapshot("onu-1").unwrap();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(
            snapshot
                .iter()
                .find(|p| p.path.contains("Temperature"))
                .unwrap()
                .unit,
            "°C"
        );

        // samples persisted
        let rows = storage
            .query_samples_range(
                "onu-1",
                Utc::now() - chrono::Duration::hours(1),
                Utc::now() + chrono::Duration::hours(1),
                100,
            )
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);

        // health snapshot computed and stored
        let health = storage.get_health_snapshot("onu-1").await.unwrap().unwrap();
        assert_eq!(health.connectivity, 100);

        // both pipeline events observed
        let mut saw_logged = false;
        let mut saw_updated = false;
        while let Ok(event) = events.try_recv() {
            match event {
                MonitoringEvent::MetricLogged { .. } => saw_logged = true,
                MonitoringEvent::DeviceMetricsUpdated { .. } => saw_updated = true,
                _ => {}
            }
        }
        assert!(saw_logged);
        assert!(saw_updated);

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_unreachable_acs_fails_the_poll_without_panicking() {
        let (handle, _storage, _cache, _broadcaster) = spawn_monitor("http://127.0.0.1:9");
        assert!(handle.poll_now().await.is_err());
        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_stops_polling() {
        let server = MockServer::start().await;
        mount_fleet(&server).await;

        let (handle, _storage, _cache, _broadcaster) = spawn_monitor(&server.uri());
        handle.shutdown().await.unwrap();

        assert!(handle.poll_now().await.is_err());
    }

    #[tokio::test]
    async fn test_update_interval() {
        let server = MockServer::start().await;
        mount_fleet(&server).await;

        let (handle, _storage, _cache, _broadcaster) = spawn_monitor(&server.uri());
        handle.update_interval(60).await.unwrap();
        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_supervisor_start_replaces_and_stop_is_idempotent() {
        let server = MockServer::start().await;
        mount_fleet(&server).await;

        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
        let broadcaster = Arc::new(EventBroadcaster::new());
        let supervisor = MonitorSupervisor::new(storage.clone(), broadcaster);

        let first = supervisor.start(test_config(&server.uri())).await.unwrap();
        let second = supervisor.start(test_config(&server.uri())).await.unwrap();

        // the first handle's actor was replaced and shut down
        assert!(first.poll_now().await.is_err());
        assert!(second.poll_now().await.is_ok());

        // the config landed in storage
        assert!(storage.get_config("acs-main").await.unwrap().is_some());

        supervisor.stop("acs-main").await.unwrap();
        supervisor.stop("acs-main").await.unwrap();
        supervisor.stop("never-started").await.unwrap();
    }

    #[tokio::test]
    async fn test_supervisor_rejects_invalid_config() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
        let broadcaster = Arc::new(EventBroadcaster::new());
        let supervisor = MonitorSupervisor::new(storage, broadcaster);

        let mut config = test_config("http://localhost:7557");
        config.id = String::new();
        assert!(supervisor.start(config).await.is_err());
    }
}
