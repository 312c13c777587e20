//! Wire types for the REST API

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use meshttpd_bridge::{
    format_node_id, BridgeStatus, DeviceTelemetry, EnvironmentTelemetry, Message, NodeRecord,
};

/// Form body for `POST /api/mesh/send_message`
#[derive(Debug, Deserialize)]
pub struct SendMessageForm {
    /// The message to be sent
    pub message: String,
    /// Target node id (`!hex`); broadcast when omitted
    pub node_id: Option<String>,
}

/// Query parameters for the telemetry endpoints
#[derive(Debug, Deserialize)]
pub struct TelemetryQuery {
    /// Target node id (`!hex`); the radio itself when omitted
    pub node_id: Option<String>,
}

/// Query parameters for `GET /api/mesh/get_last_messages`
#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    /// Most recent messages to return; everything when omitted
    pub limit: Option<usize>,
}

/// Generic operation outcome envelope
#[derive(Debug, Serialize)]
pub struct StatusBody {
    pub status: &'static str,
    pub message: String,
}

impl StatusBody {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            status: "success",
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: "error",
            message: message.into(),
        }
    }
}

/// One message history entry
#[derive(Debug, Serialize)]
pub struct MessageEntry {
    pub node_id: String,
    pub to: Option<String>,
    pub message: String,
    pub rx_time: DateTime<Utc>,
}

impl From<Message> for MessageEntry {
    fn from(message: Message) -> Self {
        Self {
            node_id: format_node_id(message.from),
            to: message.to.map(format_node_id),
            message: message.text,
            rx_time: message.rx_time,
        }
    }
}

/// Device telemetry for one node
#[derive(Debug, Serialize)]
pub struct DeviceTelemetryEntry {
    pub node_id: String,
    #[serde(flatten)]
    pub telemetry: DeviceTelemetry,
}

/// Environment telemetry for one node
#[derive(Debug, Serialize)]
pub struct EnvironmentTelemetryEntry {
    pub node_id: String,
    #[serde(flatten)]
    pub telemetry: EnvironmentTelemetry,
}

/// One node registry entry
#[derive(Debug, Serialize)]
pub struct NodeEntry {
    pub node_id: String,
    pub long_name: Option<String>,
    pub short_name: Option<String>,
    pub last_seen: DateTime<Utc>,
    pub device: Option<DeviceTelemetry>,
    pub environment: Option<EnvironmentTelemetry>,
}

impl From<NodeRecord> for NodeEntry {
    fn from(record: NodeRecord) -> Self {
        Self {
            node_id: format_node_id(record.id),
            long_name: record.user.as_ref().map(|u| u.long_name.clone()),
            short_name: record.user.as_ref().map(|u| u.short_name.clone()),
            last_seen: record.last_seen,
            device: record.device,
            environment: record.environment,
        }
    }
}

/// Connection status response
#[derive(Debug, Serialize)]
pub struct StatusEntry {
    pub connected: bool,
    pub node_id: Option<String>,
    pub uptime_seconds: u64,
    pub node_count: usize,
    pub last_packet: Option<DateTime<Utc>>,
    pub last_connected: Option<DateTime<Utc>>,
    pub connection_attempts: u64,
}

impl From<BridgeStatus> for StatusEntry {
    fn from(status: BridgeStatus) -> Self {
        Self {
            connected: status.connected,
            node_id: status.local_node.map(format_node_id),
            uptime_seconds: status.uptime_seconds,
            node_count: status.node_count,
            last_packet: status.last_packet,
            last_connected: status.last_connected,
            connection_attempts: status.connection_attempts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshttpd_bridge::{DeviceMetrics, NodeUser};

    #[test]
    fn test_message_entry_formats_node_ids() {
        let entry = MessageEntry::from(Message {
            from: 0xA1B2_C3D4,
            to: Some(0x01),
            text: "hi".into(),
            rx_time: Utc::now(),
        });
        assert_eq!(entry.node_id, "!a1b2c3d4");
        assert_eq!(entry.to.as_deref(), Some("!00000001"));
    }

    #[test]
    fn test_node_entry_lifts_user_names() {
        let entry = NodeEntry::from(NodeRecord {
            id: 0x22,
            user: Some(NodeUser {
                id: "!00000022".into(),
                long_name: "Valley Gate".into(),
                short_name: "VG".into(),
            }),
            last_seen: Utc::now(),
            device: None,
            environment: None,
        });
        assert_eq!(entry.long_name.as_deref(), Some("Valley Gate"));
        assert_eq!(entry.node_id, "!00000022");
    }

    #[test]
    fn test_device_telemetry_entry_flattens_metrics() {
        let entry = DeviceTelemetryEntry {
            node_id: "!00000001".into(),
            telemetry: DeviceTelemetry {
                time: Utc::now(),
                metrics: DeviceMetrics {
                    battery_level: Some(88),
                    ..Default::default()
                },
            },
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["battery_level"], 88);
        assert_eq!(json["node_id"], "!00000001");
        assert!(json.get("metrics").is_none());
    }
}
