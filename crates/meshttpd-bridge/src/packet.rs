//! Packet model for the mesh radio link
//!
//! A [`MeshPacket`] is the decoded unit the bridge works with: a routing
//! header (source, destination, packet id, correlation id) plus a
//! [`PacketBody`] tagged by payload kind. Telemetry metric structs mirror
//! the fields the radio reports for device health and environment sensors.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, Result};

/// A node's mesh address
pub type NodeId = u32;

/// Destination address for broadcast packets
pub const BROADCAST_ADDR: NodeId = 0xFFFF_FFFF;

/// Format a node id in its canonical text form, e.g. `!a1b2c3d4`
pub fn format_node_id(id: NodeId) -> String {
    format!("!{id:08x}")
}

/// Parse a node id from its text form
///
/// Accepts the canonical `!hex` form (`!a1b2c3d4`) or a plain decimal
/// address.
pub fn parse_node_id(s: &str) -> Result<NodeId> {
    let s = s.trim();
    if let Some(hex) = s.strip_prefix('!') {
        if hex.is_empty() || hex.len() > 8 {
            return Err(BridgeError::InvalidNodeId(s.to_string()));
        }
        return NodeId::from_str_radix(hex, 16)
            .map_err(|_| BridgeError::InvalidNodeId(s.to_string()));
    }
    s.parse::<NodeId>()
        .map_err(|_| BridgeError::InvalidNodeId(s.to_string()))
}

/// Port numbers identifying payload kinds on the radio link
///
/// A subset of the radio protocol's port space; ports the bridge does not
/// interpret decode as [`PacketBody::Other`].
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortNum {
    /// Unknown/invalid port
    Unknown = 0,
    /// Text message port (UTF-8 encoded strings)
    TextMessage = 1,
    /// Position data
    Position = 3,
    /// Node info (user announcement)
    NodeInfo = 4,
    /// Routing protocol messages
    Routing = 5,
    /// Admin messages
    Admin = 6,
    /// Telemetry data (requests and responses)
    Telemetry = 67,
}

impl From<u8> for PortNum {
    fn from(value: u8) -> Self {
        match value {
            1 => Self::TextMessage,
            3 => Self::Position,
            4 => Self::NodeInfo,
            5 => Self::Routing,
            6 => Self::Admin,
            67 => Self::Telemetry,
            _ => Self::Unknown,
        }
    }
}

/// Which telemetry metric set a request targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TelemetryKind {
    /// Device health metrics (battery, voltage, channel utilization)
    Device,
    /// Environment sensor metrics (temperature, humidity, pressure)
    Environment,
}

impl std::fmt::Display for TelemetryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TelemetryKind::Device => write!(f, "device"),
            TelemetryKind::Environment => write!(f, "environment"),
        }
    }
}

/// Device health metrics reported by a node
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceMetrics {
    /// Battery charge percentage (0-100, >100 means powered)
    pub battery_level: Option<u32>,
    /// Supply voltage in volts
    pub voltage: Option<f32>,
    /// Channel utilization percentage
    pub channel_utilization: Option<f32>,
    /// Airtime transmit utilization percentage
    pub air_util_tx: Option<f32>,
}

/// Environment sensor metrics reported by a node
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentMetrics {
    /// Temperature in degrees Celsius
    pub temperature: Option<f32>,
    /// Relative humidity percentage
    pub relative_humidity: Option<f32>,
    /// Barometric pressure in hPa
    pub barometric_pressure: Option<f32>,
}

/// A telemetry frame as carried on the wire
///
/// A single frame may carry either metric set, or both; the bridge records
/// whichever sets are present independently.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryFrame {
    /// Sample timestamp reported by the node
    pub time: DateTime<Utc>,
    /// Device health metrics, if present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<DeviceMetrics>,
    /// Environment sensor metrics, if present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<EnvironmentMetrics>,
}

/// Node user announcement carried by NodeInfo packets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeUser {
    /// Canonical node id string (`!hex` form)
    pub id: String,
    /// Long display name
    pub long_name: String,
    /// Short display name (up to 4 characters)
    pub short_name: String,
}

/// Decoded packet payload, tagged by kind
#[derive(Debug, Clone, PartialEq)]
pub enum PacketBody {
    /// A UTF-8 text message
    Text(String),
    /// A node user announcement
    NodeInfo(NodeUser),
    /// A telemetry report
    Telemetry(TelemetryFrame),
    /// A telemetry query expecting a correlated response
    TelemetryRequest(TelemetryKind),
    /// A payload kind the bridge does not interpret
    Other {
        /// Raw port number as seen on the wire
        port: u8,
    },
}

impl PacketBody {
    /// Port number this body travels on
    pub fn port(&self) -> PortNum {
        match self {
            PacketBody::Text(_) => PortNum::TextMessage,
            PacketBody::NodeInfo(_) => PortNum::NodeInfo,
            PacketBody::Telemetry(_) | PacketBody::TelemetryRequest(_) => PortNum::Telemetry,
            PacketBody::Other { port } => PortNum::from(*port),
        }
    }
}

/// A decoded packet from (or for) the radio link
#[derive(Debug, Clone, PartialEq)]
pub struct MeshPacket {
    /// Source node address
    pub from: NodeId,
    /// Destination node address ([`BROADCAST_ADDR`] for broadcast)
    pub to: NodeId,
    /// Unique packet identifier
    pub packet_id: u32,
    /// Channel index
    pub channel: u8,
    /// Decoded payload
    pub body: PacketBody,
    /// Id of the request packet this one answers, if any
    pub request_id: Option<u32>,
    /// Whether the sender expects a correlated response
    pub want_response: bool,
    /// When the packet was received (or created, for outbound packets)
    pub rx_time: DateTime<Utc>,
}

impl MeshPacket {
    /// Check if this packet is addressed to everyone
    pub fn is_broadcast(&self) -> bool {
        self.to == BROADCAST_ADDR
    }

    /// Build an outbound text message packet
    pub fn text(from: NodeId, to: NodeId, text: impl Into<String>) -> Self {
        Self {
            from,
            to,
            packet_id: fresh_packet_id(),
            channel: 0,
            body: PacketBody::Text(text.into()),
            request_id: None,
            want_response: false,
            rx_time: Utc::now(),
        }
    }

    /// Build an outbound telemetry query
    ///
    /// The packet id doubles as the correlation id the eventual response
    /// must carry in its `request_id` field.
    pub fn telemetry_request(from: NodeId, to: NodeId, kind: TelemetryKind, request_id: u32) -> Self {
        Self {
            from,
            to,
            packet_id: request_id,
            channel: 0,
            body: PacketBody::TelemetryRequest(kind),
            request_id: None,
            want_response: true,
            rx_time: Utc::now(),
        }
    }
}

/// Allocate a fresh non-zero packet id
///
/// Zero is reserved on the wire as the "no correlation id" sentinel.
pub fn fresh_packet_id() -> u32 {
    loop {
        let id: u32 = rand::random();
        if id != 0 {
            return id;
        }
    }
}
