//! Helper functions for integration tests

use std::sync::Arc;

use chrono::Utc;
use fiberwatch::acs::AcsClient;
use fiberwatch::config::MonitoringConfig;
use fiberwatch::events::EventBroadcaster;
use fiberwatch::storage::memory::MemoryStorage;
use fiberwatch::storage::Storage;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub fn test_config(base_url: &str) -> MonitoringConfig {
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

pub struct TestStack {
    pub client: Arc<AcsClient>,
    pub storage: Arc<dyn Storage>,
    pub broadcaster: Arc<EventBroadcaster>,
    pub config: MonitoringConfig,
}

pub async fn build_stack(server: &MockServer) -> TestStack {
    let config = test_config(&server.uri());
    let client = Arc::new(AcsClient::new(&config).unwrap());
    let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
    storage.upsert_config(config.clone()).await.unwrap();

    TestStack {
        client,
        storage,
        broadcaster: Arc::new(EventBroadcaster::new()),
        config,
    }
}

/// A small mixed fleet: one online Huawei OLT, one offline FiberHome ONU.
pub async fn mount_fleet_listing(server: &MockServer) {
    let recent = (Utc::now() - chrono::Duration::minutes(2)).to_rfc3339();

    Mock::given(method("GET"))
        .and(path("/devices"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            {
                "_id": "huawei-olt-1",
                "_serialNumber": "HW123",
                "_manufacturer": "Huawei",
                "_productId": "MA5800",
                "_lastInform": recent,
            },
            {
                "_id": "onu-1",
                "_serialNumber": "SN456",
                "_manufacturer": "FiberHome",
                "_productId": "AN5506",
            }
        ])))
        .mount(server)
        .await;
}

/// Parameter responses for the fleet, with a configurable ONU temperature so
/// tests can push it over a threshold.
pub async fn mount_fleet_parameters(server: &MockServer, onu_temperature: f64) {
    Mock::given(method("GET"))
        .and(path("/devices/huawei-olt-1/parameters"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            { "path": "InternetGatewayDevice.DeviceInfo.UpTime", "value": 604800 },
            { "path": "InternetGatewayDevice.DeviceInfo.ProcessorStatus", "value": 35 },
            {
                "path": "InternetGatewayDevice.ManagementServer.ConnectionRequestURL",
                "value": "http://10.0.0.5:7547/cr"
            },
            {
                "path": "InternetGatewayDevice.LANDevice.1.Hosts.HostNumberOfEntries",
                "value": "64"
            }
        ])))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/devices/onu-1/parameters"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            { "path": "InternetGatewayDevice.DeviceInfo.UpTime", "value": 86400 },
            { "path": "InternetGatewayDevice.DeviceInfo.X_CT-COM_Temperature", "value": onu_temperature },
            { "path": "InternetGatewayDevice.DeviceInfo.X_CT-COM_ReceivePower", "value": -18.5 }
        ])))
        .mount(server)
        .await;
}

/// Device detail endpoints, needed by the health scorer.
pub async fn mount_fleet_details(server: &MockServer) {
    let recent = (Utc::now() - chrono::Duration::minutes(2)).to_rfc3339();

    Mock::given(method("GET"))
        .and(path("/devices/huawei-olt-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "_id": "huawei-olt-1",
            "_lastInform": recent,
        })))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/devices/onu-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "_id": "onu-1",
        })))
        .mount(server)
        .await;
}
