//! Packet channel abstraction over the radio connection
//!
//! A [`PacketChannel`] produces a lazy, restartable sequence of decoded
//! inbound packets and accepts outbound packets for transmission. The
//! listener owns exactly one channel for the process lifetime; tests
//! substitute [`crate::test_utils::MockChannel`] through the same trait.

mod tcp;

pub use tcp::TcpChannel;

use async_trait::async_trait;

use crate::error::Result;
use crate::packet::{MeshPacket, NodeId};

/// Trait for radio packet channels
#[async_trait]
pub trait PacketChannel: Send {
    /// Connect (or reconnect) to the radio
    async fn connect(&mut self) -> Result<()>;

    /// Disconnect from the radio
    async fn disconnect(&mut self) -> Result<()>;

    /// Check if currently connected
    fn is_connected(&self) -> bool;

    /// Produce the next decoded inbound packet
    ///
    /// Blocks until a packet arrives. Returns `Ok(None)` when no complete
    /// packet is available yet, a protocol error for an undecodable packet
    /// (drop and continue), and a transport error when the link is lost
    /// (triggers reconnection).
    async fn next_packet(&mut self) -> Result<Option<MeshPacket>>;

    /// Transmit an outbound packet
    async fn send_packet(&mut self, packet: &MeshPacket) -> Result<()>;

    /// The radio's own node address, once known
    fn local_node_id(&self) -> Option<NodeId> {
        None
    }

    /// Channel name for logging
    fn name(&self) -> &str;
}
