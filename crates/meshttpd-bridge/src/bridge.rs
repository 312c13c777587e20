//! Public bridge API
//!
//! A [`MeshBridge`] is a cheap cloneable handle used concurrently by many
//! request handlers. Reads are served from the state store without
//! blocking; sends are routed through the listener's command queue; only
//! the telemetry queries may suspend the caller, bounded by the
//! configured timeout.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::channel::PacketChannel;
use crate::config::{BridgeConfig, TEXT_PAYLOAD_MAX};
use crate::correlator::Correlator;
use crate::error::{BridgeError, Result};
use crate::listener::{Command, LinkStatus, Listener};
use crate::packet::{
    format_node_id, MeshPacket, NodeId, PacketBody, TelemetryFrame, TelemetryKind, BROADCAST_ADDR,
};
use crate::state::{DeviceTelemetry, EnvironmentTelemetry, Message, NodeRecord, StateStore};

/// Snapshot of the bridge's connection and state counters
#[derive(Debug, Clone, Serialize)]
pub struct BridgeStatus {
    /// Whether the radio link is currently up
    pub connected: bool,
    /// Seconds since the bridge was started
    pub uptime_seconds: u64,
    /// Number of distinct nodes seen
    pub node_count: usize,
    /// When the last packet of any kind was observed
    pub last_packet: Option<DateTime<Utc>>,
    /// The radio's own node address, once known
    pub local_node: Option<NodeId>,
    /// When the link last came up
    pub last_connected: Option<DateTime<Utc>>,
    /// Successful connections over the process lifetime
    pub connection_attempts: u64,
}

/// Handle to a running bridge
#[derive(Clone)]
pub struct MeshBridge {
    command_tx: mpsc::Sender<Command>,
    store: Arc<StateStore>,
    correlator: Arc<Correlator>,
    status: Arc<LinkStatus>,
    config: BridgeConfig,
}

impl MeshBridge {
    /// Start a bridge over the given channel
    ///
    /// Spawns the listener task, which owns the channel for the process
    /// lifetime and reconnects with backoff on transport failures.
    pub fn spawn(channel: Box<dyn PacketChannel>, config: BridgeConfig) -> (Self, JoinHandle<()>) {
        let store = Arc::new(StateStore::new(config.history_capacity));
        let correlator = Arc::new(Correlator::new());
        let status = Arc::new(LinkStatus::new());
        let (command_tx, command_rx) = mpsc::channel(config.send_queue_size.max(1));

        let listener = Listener::new(
            channel,
            Arc::clone(&store),
            Arc::clone(&correlator),
            Arc::clone(&status),
            command_rx,
            config.reconnect.clone(),
        );
        let handle = tokio::spawn(listener.run());

        let bridge = Self {
            command_tx,
            store,
            correlator,
            status,
            config,
        };
        (bridge, handle)
    }

    /// Send a text message to a node, or broadcast when `to` is `None`
    ///
    /// Validation failures (empty text, oversize payload) are reported
    /// before anything touches the transport; transport failures while
    /// disconnected surface immediately as [`BridgeError::NotConnected`].
    pub async fn send_message(&self, text: &str, to: Option<NodeId>) -> Result<()> {
        if text.is_empty() {
            return Err(BridgeError::EmptyMessage);
        }
        if text.len() > TEXT_PAYLOAD_MAX {
            return Err(BridgeError::MessageTooLarge {
                size: text.len(),
                max: TEXT_PAYLOAD_MAX,
            });
        }
        if !self.status.is_connected() {
            return Err(BridgeError::NotConnected);
        }

        let from = self.status.local_node().unwrap_or(0);
        let packet = MeshPacket::text(from, to.unwrap_or(BROADCAST_ADDR), text);
        debug!(
            to = %format_node_id(packet.to),
            len = text.len(),
            "sending text message"
        );
        self.transmit(packet).await
    }

    /// Device telemetry for a node (the radio itself when `node` is `None`)
    ///
    /// Served from the cache when fresh; otherwise one correlated round
    /// trip, bounded by the configured timeout. A timeout or a response
    /// without device metrics surfaces as unavailable, never as a
    /// fabricated value.
    pub async fn device_telemetry(&self, node: Option<NodeId>) -> Result<DeviceTelemetry> {
        let target = self.resolve_target(node)?;

        if let Some(cached) = self.store.device_telemetry(target) {
            if self.is_fresh(cached.time) {
                debug!(node = %format_node_id(target), "device telemetry cache hit");
                return Ok(cached);
            }
        }

        let frame = self.request_telemetry(target, TelemetryKind::Device).await?;
        match frame.device {
            Some(metrics) => Ok(DeviceTelemetry {
                time: frame.time,
                metrics,
            }),
            None => Err(BridgeError::TelemetryUnavailable {
                node: target,
                kind: TelemetryKind::Device,
            }),
        }
    }

    /// Environment telemetry for a node (the radio itself when `node` is `None`)
    pub async fn environment_telemetry(&self, node: Option<NodeId>) -> Result<EnvironmentTelemetry> {
        let target = self.resolve_target(node)?;

        if let Some(cached) = self.store.environment_telemetry(target) {
            if self.is_fresh(cached.time) {
                debug!(node = %format_node_id(target), "environment telemetry cache hit");
                return Ok(cached);
            }
        }

        let frame = self
            .request_telemetry(target, TelemetryKind::Environment)
            .await?;
        match frame.environment {
            Some(metrics) => Ok(EnvironmentTelemetry {
                time: frame.time,
                metrics,
            }),
            None => Err(BridgeError::TelemetryUnavailable {
                node: target,
                kind: TelemetryKind::Environment,
            }),
        }
    }

    /// The message history in arrival order, optionally only the most
    /// recent `limit` entries
    pub fn last_messages(&self, limit: Option<usize>) -> Vec<Message> {
        self.store.snapshot_messages(limit)
    }

    /// All node records seen so far
    pub fn nodes(&self) -> Vec<NodeRecord> {
        self.store.snapshot_nodes()
    }

    /// Connection status and state counters; never blocks
    pub fn status(&self) -> BridgeStatus {
        BridgeStatus {
            connected: self.status.is_connected(),
            uptime_seconds: self.status.uptime().as_secs(),
            node_count: self.store.node_count(),
            last_packet: self.store.last_packet(),
            local_node: self.status.local_node(),
            last_connected: self.status.last_connected(),
            connection_attempts: self.status.connection_attempts(),
        }
    }

    fn resolve_target(&self, node: Option<NodeId>) -> Result<NodeId> {
        node.or_else(|| self.status.local_node())
            .ok_or(BridgeError::LocalNodeUnknown)
    }

    fn is_fresh(&self, sample_time: DateTime<Utc>) -> bool {
        let age = Utc::now().signed_duration_since(sample_time);
        age >= chrono::Duration::zero()
            && age.to_std().map_or(false, |a| a < self.config.telemetry_max_age)
    }

    /// One correlated telemetry round trip
    async fn request_telemetry(&self, target: NodeId, kind: TelemetryKind) -> Result<TelemetryFrame> {
        if !self.status.is_connected() {
            return Err(BridgeError::NotConnected);
        }

        let ticket = self.correlator.issue(target, kind)?;
        let from = self.status.local_node().unwrap_or(0);
        let query = MeshPacket::telemetry_request(from, target, kind, ticket.request_id());

        if let Err(e) = self.transmit(query).await {
            self.correlator.abort(ticket);
            return Err(e);
        }

        let response = self
            .correlator
            .await_response(ticket, self.config.telemetry_timeout)
            .await?;

        match response.body {
            PacketBody::Telemetry(frame) => Ok(frame),
            _ => Err(BridgeError::TelemetryUnavailable { node: target, kind }),
        }
    }

    async fn transmit(&self, packet: MeshPacket) -> Result<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.command_tx
            .send(Command::Send {
                packet,
                reply: reply_tx,
            })
            .await
            .map_err(|_| BridgeError::ChannelClosed)?;
        reply_rx.await.map_err(|_| BridgeError::ChannelClosed)?
    }
}
