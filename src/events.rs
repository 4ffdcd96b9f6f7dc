//! Transport-agnostic event broadcasting
//!
//! The engine publishes state-change notifications to logical topics; UI
//! transports (websocket rooms, SSE, ...) subscribe and forward. The engine
//! itself only ever depends on [`EventBroadcaster::publish`].
//!
//! ## Delivery semantics
//!
//! At-least-once to currently-connected subscribers. Subscribers that connect
//! after an event never see it, and slow subscribers may lag and drop
//! messages (tokio broadcast semantics). Events for the same device are
//! published in order from a single task per tick; no cross-device ordering is
//! promised.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::trace;

use crate::{DeviceClass, Severity};

/// Topic carrying all engine state-change notifications.
pub const MONITORING_TOPIC: &str = "monitoring";

/// Buffered events per topic before slow subscribers start lagging.
const CHANNEL_CAPACITY: usize = 256;

/// A state-change notification published on the "monitoring" topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum MonitoringEvent {
    /// A device's stored status flipped (online/offline/warning)
    #[serde(rename_all = "camelCase")]
    DeviceStatusChanged {
        device_id: String,
        device_type: DeviceClass,
        status: String,
        timestamp: DateTime<Utc>,
    },

    /// A fresh parameter snapshot and health score are available
    #[serde(rename_all = "camelCase")]
    DeviceMetricsUpdated {
        device_id: String,
        device_type: DeviceClass,
        metrics: Value,
        timestamp: DateTime<Utc>,
    },

    /// A threshold rule fired and a new alert was stored
    #[serde(rename_all = "camelCase")]
    AlertCreated {
        device_id: String,
        device_type: DeviceClass,
        severity: Severity,
        title: String,
        timestamp: DateTime<Utc>,
    },

    /// A batch of parameter samples was persisted
    #[serde(rename_all = "camelCase")]
    MetricLogged {
        device_id: String,
        device_type: DeviceClass,
        metrics: Value,
        timestamp: DateTime<Utc>,
    },
}

impl MonitoringEvent {
    pub fn device_id(&self) -> &str {
        match self {
            MonitoringEvent::DeviceStatusChanged { device_id, .. }
            | MonitoringEvent::DeviceMetricsUpdated { device_id, .. }
            | MonitoringEvent::AlertCreated { device_id, .. }
            | MonitoringEvent::MetricLogged { device_id, .. } => device_id,
        }
    }
}

/// Fan-out hub for [`MonitoringEvent`]s, keyed by topic.
///
/// Cheap to share via `Arc`; publishers and subscribers register
/// independently.
#[derive(Debug, Default)]
pub struct EventBroadcaster {
    topics: DashMap<String, broadcast::Sender<MonitoringEvent>>,
}

impl EventBroadcaster {
    pub fn new() -> Self {
        Self {
            topics: DashMap::new(),
        }
    }

    fn sender(&self, topic: &str) -> broadcast::Sender<MonitoringEvent> {
        self.topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }

    /// Publish an event to all current subscribers of a topic.
    ///
    /// Returns the number of subscribers that received it. Zero subscribers is
    /// not an error; events are continuously generated and late subscribers
    /// only care about what happens after they join.
    pub fn publish(&self, topic: &str, event: MonitoringEvent) -> usize {
        match self.sender(topic).send(event) {
            Ok(receivers) => receivers,
            Err(_) => {
                trace!("no subscribers on topic {topic}");
                0
            }
        }
    }

    /// Subscribe to a topic. Only events published after this call are seen.
    pub fn subscribe(&self, topic: &str) -> broadcast::Receiver<MonitoringEvent> {
        self.sender(topic).subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_event_wire_schema() {
        let event = MonitoringEvent::DeviceStatusChanged {
            device_id: "dev-1".to_string(),
            device_type: DeviceClass::Onu,
            status: "online".to_string(),
            timestamp: "2024-05-01T10:00:00Z".parse().unwrap(),
        };

        let encoded = serde_json::to_value(&event).unwrap();
        assert_eq!(
            encoded,
            json!({
                "type": "device-status-changed",
                "deviceId": "dev-1",
                "deviceType": "onu",
                "status": "online",
                "timestamp": "2024-05-01T10:00:00Z",
            })
        );
    }

    #[test]
    fn test_alert_event_schema() {
        let event = MonitoringEvent::AlertCreated {
            device_id: "dev-9".to_string(),
            device_type: DeviceClass::Olt,
            severity: Severity::Critical,
            title: "Parameter Threshold: Temperature.Value".to_string(),
            timestamp: Utc::now(),
        };

        let encoded = serde_json::to_value(&event).unwrap();
        assert_eq!(encoded["type"], "alert-created");
        assert_eq!(encoded["severity"], "critical");
        assert_eq!(encoded["deviceType"], "olt");
    }

    #[tokio::test]
    async fn test_publish_reaches_all_subscribers() {
        let broadcaster = EventBroadcaster::new();
        let mut first = broadcaster.subscribe(MONITORING_TOPIC);
        let mut second = broadcaster.subscribe(MONITORING_TOPIC);

        let event = MonitoringEvent::MetricLogged {
            device_id: "dev-1".to_string(),
            device_type: DeviceClass::Onu,
            metrics: json!({}),
            timestamp: Utc::now(),
        };

        let receivers = broadcaster.publish(MONITORING_TOPIC, event.clone());
        assert_eq!(receivers, 2);
        assert_eq!(first.recv().await.unwrap(), event);
        assert_eq!(second.recv().await.unwrap(), event);
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_ok() {
        let broadcaster = EventBroadcaster::new();
        let receivers = broadcaster.publish(
            MONITORING_TOPIC,
            MonitoringEvent::MetricLogged {
                device_id: "dev-1".to_string(),
                device_type: DeviceClass::Unknown,
                metrics: json!({}),
                timestamp: Utc::now(),
            },
        );
        assert_eq!(receivers, 0);
    }

    #[tokio::test]
    async fn test_per_device_publish_order_is_preserved() {
        let broadcaster = EventBroadcaster::new();
        let mut rx = broadcaster.subscribe(MONITORING_TOPIC);

        for status in ["online", "offline", "online"] {
            broadcaster.publish(
                MONITORING_TOPIC,
                MonitoringEvent::DeviceStatusChanged {
                    device_id: "dev-1".to_string(),
                    device_type: DeviceClass::Onu,
                    status: status.to_string(),
                    timestamp: Utc::now(),
                },
            );
        }

        for expected in ["online", "offline", "online"] {
            match rx.recv().await.unwrap() {
                MonitoringEvent::DeviceStatusChanged { status, .. } => {
                    assert_eq!(status, expected)
                }
                other => panic!("unexpected event: {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn test_topics_are_isolated() {
        let broadcaster = EventBroadcaster::new();
        let mut monitoring = broadcaster.subscribe(MONITORING_TOPIC);
        let _other = broadcaster.subscribe("audit");

        let receivers = broadcaster.publish(
            "audit",
            MonitoringEvent::MetricLogged {
                device_id: "dev-1".to_string(),
                device_type: DeviceClass::Onu,
                metrics: json!({}),
                timestamp: Utc::now(),
            },
        );
        assert_eq!(receivers, 1);
        assert!(monitoring.try_recv().is_err());
    }
}
