//! End-to-end tests of the polling pipeline: parameters flow through the
//! cache into storage, thresholds fire once, health gets scored.

use std::sync::Arc;

use chrono::Utc;
use fiberwatch::events::{MonitoringEvent, MONITORING_TOPIC};
use fiberwatch::monitor::MonitorHandle;
use fiberwatch::cache::ParameterCache;
use fiberwatch::thresholds::{Condition, NewThresholdRule, ThresholdScope, ThresholdValue};
use fiberwatch::{DeviceClass, Severity};
use wiremock::MockServer;

use crate::helpers::{
    build_stack, mount_fleet_details, mount_fleet_listing, mount_fleet_parameters,
};

#[tokio::test]
async fn test_full_pipeline_from_poll_to_health() {
    let server = MockServer::start().await;
    mount_fleet_listing(&server).await;
    mount_fleet_parameters(&server, 45.0).await;
    mount_fleet_details(&server).await;

    let stack = build_stack(&server).await;
    let cache = Arc::new(ParameterCache::new());
    let handle = MonitorHandle::spawn(
        stack.config.clone(),
        stack.client.clone(),
        cache.clone(),
        stack.storage.clone(),
        stack.broadcaster.clone(),
    );

    let processed = handle.poll_now().await.unwrap();
    assert_eq!(processed, 2);

    // both devices snapshotted
    assert_eq!(cache.len(), 2);

    // samples landed in storage for both devices
    let start = Utc::now() - chrono::Duration::hours(1);
    let end = Utc::now() + chrono::Duration::hours(1);
    for device_id in ["huawei-olt-1", "onu-1"] {
        let rows = stack
            .storage
            .query_samples_range(device_id, start, end, 100)
            .await
            .unwrap();
        assert!(!rows.is_empty(), "no samples for {device_id}");
    }

    // the recently-informing OLT scores full connectivity, the silent ONU
    // bottoms out
    let olt_health = stack
        .storage
        .get_health_snapshot("huawei-olt-1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(olt_health.connectivity, 100);

    let onu_health = stack
        .storage
        .get_health_snapshot("onu-1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(onu_health.connectivity, 20);

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_threshold_fires_once_across_repeated_ticks() {
    let server = MockServer::start().await;
    mount_fleet_listing(&server).await;
    mount_fleet_parameters(&server, 82.0).await;
    mount_fleet_details(&server).await;

    let stack = build_stack(&server).await;
    stack
        .storage
        .create_threshold(NewThresholdRule {
            parameter_path: "InternetGatewayDevice.DeviceInfo.X_CT-COM_Temperature".to_string(),
            scope: ThresholdScope::Onu,
            condition: Condition::GreaterThan,
            threshold_value: ThresholdValue::Number(70.0),
            severity: Severity::Critical,
            enabled: true,
            description: None,
        })
        .await
        .unwrap();

    let cache = Arc::new(ParameterCache::new());
    let handle = MonitorHandle::spawn(
        stack.config.clone(),
        stack.client.clone(),
        cache,
        stack.storage.clone(),
        stack.broadcaster.clone(),
    );
    let mut events = stack.broadcaster.subscribe(MONITORING_TOPIC);

    handle.poll_now().await.unwrap();
    handle.poll_now().await.unwrap();

    // one alert despite two breaching ticks
    let alerts = stack.storage.list_alerts("onu-1").await.unwrap();
    assert_eq!(alerts.len(), 1);
    assert_eq!(
        alerts[0].title,
        "Parameter Threshold: InternetGatewayDevice.DeviceInfo.X_CT-COM_Temperature"
    );
    assert_eq!(alerts[0].device_class, DeviceClass::Onu);

    // and exactly one alert event on the wire
    let mut alert_events = 0;
    while let Ok(event) = events.try_recv() {
        if matches!(event, MonitoringEvent::AlertCreated { .. }) {
            alert_events += 1;
        }
    }
    assert_eq!(alert_events, 1);

    // the OLT-scoped fleet stays clean
    assert!(stack
        .storage
        .list_alerts("huawei-olt-1")
        .await
        .unwrap()
        .is_empty());

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_healthy_fleet_raises_no_alerts() {
    let server = MockServer::start().await;
    mount_fleet_listing(&server).await;
    mount_fleet_parameters(&server, 45.0).await;
    mount_fleet_details(&server).await;

    let stack = build_stack(&server).await;
    stack
        .storage
        .create_threshold(NewThresholdRule {
            parameter_path: "InternetGatewayDevice.DeviceInfo.X_CT-COM_Temperature".to_string(),
            scope: ThresholdScope::All,
            condition: Condition::GreaterThan,
            threshold_value: ThresholdValue::Number(70.0),
            severity: Severity::Warning,
            enabled: true,
            description: None,
        })
        .await
        .unwrap();

    let cache = Arc::new(ParameterCache::new());
    let handle = MonitorHandle::spawn(
        stack.config.clone(),
        stack.client.clone(),
        cache,
        stack.storage.clone(),
        stack.broadcaster.clone(),
    );

    handle.poll_now().await.unwrap();

    assert!(stack.storage.list_alerts("onu-1").await.unwrap().is_empty());
    handle.shutdown().await.unwrap();
}
