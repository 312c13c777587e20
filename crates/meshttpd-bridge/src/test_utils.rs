//! Test utilities: a scriptable in-memory packet channel
//!
//! [`MockChannel`] implements [`PacketChannel`] over a pair of in-memory
//! queues so tests can drive the listener without a radio: inbound
//! packets (or transport errors) are injected through the
//! [`MockChannelHandle`], and everything the bridge transmits can be
//! inspected from the other side.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::mpsc;

use crate::channel::PacketChannel;
use crate::error::{BridgeError, Result};
use crate::packet::{
    DeviceMetrics, EnvironmentMetrics, MeshPacket, NodeId, NodeUser, PacketBody, TelemetryFrame,
    format_node_id, fresh_packet_id,
};

/// In-memory packet channel for tests
pub struct MockChannel {
    connected: bool,
    local_node: Option<NodeId>,
    incoming_rx: mpsc::UnboundedReceiver<Result<MeshPacket>>,
    outgoing_tx: mpsc::UnboundedSender<MeshPacket>,
    fail_connects: Arc<AtomicUsize>,
}

/// Test-side controls for a [`MockChannel`]
pub struct MockChannelHandle {
    incoming_tx: mpsc::UnboundedSender<Result<MeshPacket>>,
    outgoing_rx: mpsc::UnboundedReceiver<MeshPacket>,
    fail_connects: Arc<AtomicUsize>,
}

impl MockChannel {
    /// Create a channel and its test-side handle
    ///
    /// `local_node` is what the channel reports as the radio's own
    /// address after connecting.
    pub fn pair(local_node: Option<NodeId>) -> (Self, MockChannelHandle) {
        let (incoming_tx, incoming_rx) = mpsc::unbounded_channel();
        let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();
        let fail_connects = Arc::new(AtomicUsize::new(0));

        let channel = Self {
            connected: false,
            local_node,
            incoming_rx,
            outgoing_tx,
            fail_connects: Arc::clone(&fail_connects),
        };
        let handle = MockChannelHandle {
            incoming_tx,
            outgoing_rx,
            fail_connects,
        };
        (channel, handle)
    }
}

impl MockChannelHandle {
    /// Deliver an inbound packet to the listener
    pub fn inject(&self, packet: MeshPacket) {
        self.incoming_tx.send(Ok(packet)).expect("listener gone");
    }

    /// Deliver a transport error (e.g. simulate a disconnect)
    pub fn inject_error(&self, error: BridgeError) {
        self.incoming_tx.send(Err(error)).expect("listener gone");
    }

    /// Make the next `n` connect attempts fail
    pub fn fail_next_connects(&self, n: usize) {
        self.fail_connects.store(n, Ordering::SeqCst);
    }

    /// Next packet the bridge transmitted, waiting if none yet
    pub async fn next_outgoing(&mut self) -> Option<MeshPacket> {
        self.outgoing_rx.recv().await
    }

    /// Packet the bridge transmitted, without waiting
    pub fn try_outgoing(&mut self) -> Option<MeshPacket> {
        self.outgoing_rx.try_recv().ok()
    }
}

#[async_trait]
impl PacketChannel for MockChannel {
    async fn connect(&mut self) -> Result<()> {
        let remaining = self.fail_connects.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_connects.store(remaining - 1, Ordering::SeqCst);
            return Err(BridgeError::ConnectFailed {
                addr: "mock".to_string(),
                reason: "scripted failure".to_string(),
            });
        }
        self.connected = true;
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        self.connected = false;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    async fn next_packet(&mut self) -> Result<Option<MeshPacket>> {
        if !self.connected {
            return Err(BridgeError::NotConnected);
        }
        match self.incoming_rx.recv().await {
            Some(Ok(packet)) => Ok(Some(packet)),
            Some(Err(e)) => {
                if e.is_retriable() {
                    self.connected = false;
                }
                Err(e)
            }
            None => {
                self.connected = false;
                Err(BridgeError::Disconnected)
            }
        }
    }

    async fn send_packet(&mut self, packet: &MeshPacket) -> Result<()> {
        if !self.connected {
            return Err(BridgeError::NotConnected);
        }
        self.outgoing_tx
            .send(packet.clone())
            .map_err(|_| BridgeError::ChannelClosed)
    }

    fn local_node_id(&self) -> Option<NodeId> {
        self.local_node
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// Build an inbound text packet
pub fn text_packet(from: NodeId, to: NodeId, text: &str) -> MeshPacket {
    MeshPacket::text(from, to, text)
}

/// Build an inbound node announcement
pub fn node_info_packet(from: NodeId, long_name: &str, short_name: &str) -> MeshPacket {
    MeshPacket {
        from,
        to: crate::packet::BROADCAST_ADDR,
        packet_id: fresh_packet_id(),
        channel: 0,
        body: PacketBody::NodeInfo(NodeUser {
            id: format_node_id(from),
            long_name: long_name.to_string(),
            short_name: short_name.to_string(),
        }),
        request_id: None,
        want_response: false,
        rx_time: Utc::now(),
    }
}

/// Build a device telemetry response correlated to `request_id`
pub fn device_telemetry_response(
    from: NodeId,
    to: NodeId,
    request_id: Option<u32>,
    metrics: DeviceMetrics,
) -> MeshPacket {
    telemetry_packet(from, to, request_id, Some(metrics), None)
}

/// Build an environment telemetry response correlated to `request_id`
pub fn environment_telemetry_response(
    from: NodeId,
    to: NodeId,
    request_id: Option<u32>,
    metrics: EnvironmentMetrics,
) -> MeshPacket {
    telemetry_packet(from, to, request_id, None, Some(metrics))
}

/// Build a telemetry packet with the given metric sets
pub fn telemetry_packet(
    from: NodeId,
    to: NodeId,
    request_id: Option<u32>,
    device: Option<DeviceMetrics>,
    environment: Option<EnvironmentMetrics>,
) -> MeshPacket {
    MeshPacket {
        from,
        to,
        packet_id: fresh_packet_id(),
        channel: 0,
        body: PacketBody::Telemetry(TelemetryFrame {
            time: Utc::now(),
            device,
            environment,
        }),
        request_id,
        want_response: false,
        rx_time: Utc::now(),
    }
}
