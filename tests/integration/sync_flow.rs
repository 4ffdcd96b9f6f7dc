//! Reconciliation behavior: classification, idempotence, fault isolation.

use chrono::Utc;
use fiberwatch::events::{MonitoringEvent, MONITORING_TOPIC};
use fiberwatch::sync::{DeviceReconciler, DeviceTypeFilter};
use fiberwatch::{DeviceClass, DeviceStatus};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::helpers::{build_stack, mount_fleet_listing, mount_fleet_parameters};

#[tokio::test]
async fn test_sync_builds_the_inventory() {
    let server = MockServer::start().await;
    mount_fleet_listing(&server).await;
    mount_fleet_parameters(&server, 45.0).await;

    let stack = build_stack(&server).await;
    let reconciler = DeviceReconciler::new(
        stack.client.clone(),
        stack.storage.clone(),
        stack.broadcaster.clone(),
    );

    let report = reconciler
        .sync(&stack.config, DeviceTypeFilter::All)
        .await
        .unwrap();
    assert_eq!(report.synced, 2);
    assert!(report.errors.is_empty());

    let devices = stack.storage.list_devices().await.unwrap();
    assert_eq!(devices.len(), 2);

    let olt = devices.iter().find(|d| d.class == DeviceClass::Olt).unwrap();
    assert_eq!(olt.name, "OLT-HW123");
    assert_eq!(olt.status, DeviceStatus::Online);
    // enrichment parsed the connection request URL and host count
    assert_eq!(olt.ip_address.as_deref(), Some("10.0.0.5"));
    assert_eq!(olt.subordinate_count, Some(64));

    let onu = devices.iter().find(|d| d.class == DeviceClass::Onu).unwrap();
    assert_eq!(onu.status, DeviceStatus::Offline);
    assert_eq!(onu.serial_number, "SN456");
}

#[tokio::test]
async fn test_repeated_sync_does_not_duplicate_or_re_announce() {
    let server = MockServer::start().await;
    mount_fleet_listing(&server).await;
    mount_fleet_parameters(&server, 45.0).await;

    let stack = build_stack(&server).await;
    let reconciler = DeviceReconciler::new(
        stack.client.clone(),
        stack.storage.clone(),
        stack.broadcaster.clone(),
    );
    let mut events = stack.broadcaster.subscribe(MONITORING_TOPIC);

    for _ in 0..3 {
        reconciler
            .sync(&stack.config, DeviceTypeFilter::All)
            .await
            .unwrap();
    }

    assert_eq!(stack.storage.list_devices().await.unwrap().len(), 2);

    // two creations, zero re-announcements for unchanged statuses
    let mut status_events = 0;
    while let Ok(event) = events.try_recv() {
        if matches!(event, MonitoringEvent::DeviceStatusChanged { .. }) {
            status_events += 1;
        }
    }
    assert_eq!(status_events, 2);
}

#[tokio::test]
async fn test_device_without_serial_is_isolated() {
    let server = MockServer::start().await;
    let recent = (Utc::now() - chrono::Duration::minutes(1)).to_rfc3339();

    Mock::given(method("GET"))
        .and(path("/devices"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            { "_id": "ghost-1" },
            {
                "_id": "onu-1",
                "_serialNumber": "SN456",
                "_manufacturer": "FiberHome",
                "_lastInform": recent,
            }
        ])))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/devices/onu-1/parameters"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
        .mount(&server)
        .await;

    let stack = build_stack(&server).await;
    let reconciler = DeviceReconciler::new(
        stack.client.clone(),
        stack.storage.clone(),
        stack.broadcaster.clone(),
    );

    let report = reconciler
        .sync(&stack.config, DeviceTypeFilter::All)
        .await
        .unwrap();

    assert_eq!(report.total, 2);
    assert_eq!(report.synced, 1);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].device_id, "ghost-1");

    // the healthy device still made it in, and the pass was recorded
    assert_eq!(stack.storage.list_devices().await.unwrap().len(), 1);
    let config = stack.storage.get_config("acs-main").await.unwrap().unwrap();
    assert!(config.last_sync.is_some());
}

#[tokio::test]
async fn test_status_flip_is_announced() {
    let server = MockServer::start().await;
    let stack = build_stack(&server).await;
    let reconciler = DeviceReconciler::new(
        stack.client.clone(),
        stack.storage.clone(),
        stack.broadcaster.clone(),
    );

    Mock::given(method("GET"))
        .and(path("/devices/onu-1/parameters"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
        .mount(&server)
        .await;

    // first pass: device informs recently, comes up online
    let recent = (Utc::now() - chrono::Duration::minutes(1)).to_rfc3339();
    let listing = Mock::given(method("GET"))
        .and(path("/devices"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([{
            "_id": "onu-1",
            "_serialNumber": "SN456",
            "_manufacturer": "FiberHome",
            "_lastInform": recent,
        }])))
        .expect(1)
        .mount_as_scoped(&server)
        .await;

    reconciler
        .sync(&stack.config, DeviceTypeFilter::All)
        .await
        .unwrap();
    drop(listing);

    let mut events = stack.broadcaster.subscribe(MONITORING_TOPIC);

    // second pass: the inform went stale, device flips offline
    let stale = (Utc::now() - chrono::Duration::minutes(30)).to_rfc3339();
    Mock::given(method("GET"))
        .and(path("/devices"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([{
            "_id": "onu-1",
            "_serialNumber": "SN456",
            "_manufacturer": "FiberHome",
            "_lastInform": stale,
        }])))
        .mount(&server)
        .await;

    reconciler
        .sync(&stack.config, DeviceTypeFilter::All)
        .await
        .unwrap();

    match events.try_recv().unwrap() {
        MonitoringEvent::DeviceStatusChanged { status, .. } => assert_eq!(status, "offline"),
        other => panic!("unexpected event: {other:?}"),
    }

    let device = stack
        .storage
        .find_device_by_remote_id("onu-1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(device.status, DeviceStatus::Offline);
}
