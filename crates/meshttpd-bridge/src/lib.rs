//! Mesh radio bridge for synchronous HTTP access
//!
//! This crate owns the persistent connection to a packet-oriented mesh
//! radio and converts its asynchronous traffic into the bounded,
//! synchronous calls an HTTP handler needs: send a message, read the
//! message history and node registry, and ask a node for telemetry with
//! a hard deadline.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                         MeshBridge                           │
//! ├──────────────────────────────────────────────────────────────┤
//! │                                                              │
//! │  ┌──────────────┐    ┌────────────┐    ┌────────────────┐    │
//! │  │ PacketChannel│───►│  Listener  │───►│  StateStore    │    │
//! │  │ (TCP / mock) │    │            │    │  (ring + map)  │    │
//! │  └──────────────┘    │            │    └────────────────┘    │
//! │         ▲            │            │    ┌────────────────┐    │
//! │         │            │            │───►│  Correlator    │    │
//! │    send commands     └────────────┘    │  (pending reqs)│    │
//! │         │                              └────────────────┘    │
//! │         └── MeshBridge handles (one per HTTP request) ───────┤
//! │                                                              │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! The listener is the single consumer of the channel and the sole
//! writer of the shared state; bridge handles only read snapshots, queue
//! outbound sends, and wait on correlation slots. A transport failure
//! degrades writes to fail-fast errors while cached reads keep working,
//! and the listener reconnects with backoff indefinitely.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use meshttpd_bridge::{BridgeConfigBuilder, MeshBridge, TcpChannel};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = BridgeConfigBuilder::new()
//!         .history_capacity(100)
//!         .build();
//!     let channel = Box::new(TcpChannel::new("meshtastic.local:4403"));
//!     let (bridge, _listener) = MeshBridge::spawn(channel, config);
//!
//!     bridge.send_message("hello mesh", None).await.unwrap();
//!     for message in bridge.last_messages(Some(10)) {
//!         println!("{}: {}", message.from, message.text);
//!     }
//! }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod channel;
pub mod config;
pub mod correlator;
pub mod error;
pub mod packet;
pub mod state;
pub mod wire;

mod bridge;
mod listener;

pub mod test_utils;

pub use bridge::{BridgeStatus, MeshBridge};
pub use channel::{PacketChannel, TcpChannel};
pub use config::{
    BridgeConfig, BridgeConfigBuilder, ReconnectConfig, DEFAULT_HISTORY_CAPACITY,
    DEFAULT_RADIO_PORT, DEFAULT_TELEMETRY_MAX_AGE, DEFAULT_TELEMETRY_TIMEOUT, TEXT_PAYLOAD_MAX,
};
pub use correlator::{Correlator, TelemetryTicket};
pub use error::{BridgeError, Result};
pub use packet::{
    format_node_id, parse_node_id, DeviceMetrics, EnvironmentMetrics, MeshPacket, NodeId,
    NodeUser, PacketBody, PortNum, TelemetryFrame, TelemetryKind, BROADCAST_ADDR,
};
pub use state::{DeviceTelemetry, EnvironmentTelemetry, Message, NodeRecord, StateStore};
pub use wire::{FrameBuffer, FRAME_MAGIC, MAX_FRAME_PAYLOAD};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_constants() {
        assert_eq!(FRAME_MAGIC, 0x94C3);
        assert_eq!(TEXT_PAYLOAD_MAX, 237);
        assert_eq!(DEFAULT_RADIO_PORT, 4403);
    }
}
