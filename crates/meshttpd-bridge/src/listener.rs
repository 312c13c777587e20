//! Background listener: the single consumer of the packet channel
//!
//! The listener runs for the process lifetime. Its loop multiplexes
//! inbound packets with outbound send commands from [`crate::MeshBridge`]
//! handles, so the channel has exactly one owner and API callers never
//! touch the transport directly. Transport failures flip the shared
//! [`LinkStatus`] and enter a backoff reconnect loop during which send
//! commands are refused fast while cached reads keep working.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::channel::PacketChannel;
use crate::config::ReconnectConfig;
use crate::correlator::Correlator;
use crate::error::{BridgeError, Result};
use crate::packet::{format_node_id, MeshPacket, NodeId, PacketBody, BROADCAST_ADDR};
use crate::state::{DeviceTelemetry, EnvironmentTelemetry, Message, StateStore};

/// Commands routed into the listener loop
pub(crate) enum Command {
    /// Transmit a packet and report the outcome
    Send {
        packet: MeshPacket,
        reply: oneshot::Sender<Result<()>>,
    },
}

/// Connection state shared between the listener and bridge handles
///
/// Everything here is readable without blocking; `status()` must never
/// wait on the listener.
#[derive(Debug)]
pub struct LinkStatus {
    connected: AtomicBool,
    connection_attempts: AtomicU64,
    last_connected: RwLock<Option<DateTime<Utc>>>,
    local_node: RwLock<Option<NodeId>>,
    started_at: Instant,
}

impl LinkStatus {
    pub(crate) fn new() -> Self {
        Self {
            connected: AtomicBool::new(false),
            connection_attempts: AtomicU64::new(0),
            last_connected: RwLock::new(None),
            local_node: RwLock::new(None),
            started_at: Instant::now(),
        }
    }

    /// Whether the radio link is currently up
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Number of successful connections over the process lifetime
    pub fn connection_attempts(&self) -> u64 {
        self.connection_attempts.load(Ordering::Relaxed)
    }

    /// When the link last came up
    pub fn last_connected(&self) -> Option<DateTime<Utc>> {
        *self.last_connected.read()
    }

    /// The radio's own node address, once known
    pub fn local_node(&self) -> Option<NodeId> {
        *self.local_node.read()
    }

    /// Time since the bridge was started
    pub fn uptime(&self) -> std::time::Duration {
        self.started_at.elapsed()
    }

    fn mark_connected(&self, local_node: Option<NodeId>) {
        *self.last_connected.write() = Some(Utc::now());
        if local_node.is_some() {
            *self.local_node.write() = local_node;
        }
        self.connection_attempts.fetch_add(1, Ordering::Relaxed);
        self.connected.store(true, Ordering::Release);
    }

    fn mark_disconnected(&self) {
        self.connected.store(false, Ordering::Release);
    }
}

pub(crate) struct Listener {
    channel: Box<dyn PacketChannel>,
    store: Arc<StateStore>,
    correlator: Arc<Correlator>,
    status: Arc<LinkStatus>,
    command_rx: mpsc::Receiver<Command>,
    reconnect: ReconnectConfig,
}

impl Listener {
    pub(crate) fn new(
        channel: Box<dyn PacketChannel>,
        store: Arc<StateStore>,
        correlator: Arc<Correlator>,
        status: Arc<LinkStatus>,
        command_rx: mpsc::Receiver<Command>,
        reconnect: ReconnectConfig,
    ) -> Self {
        Self {
            channel,
            store,
            correlator,
            status,
            command_rx,
            reconnect,
        }
    }

    /// Run until every bridge handle is dropped or reconnection gives up
    pub(crate) async fn run(mut self) {
        info!(channel = self.channel.name(), "listener started");

        loop {
            if !self.channel.is_connected() && !self.connect_with_backoff().await {
                break;
            }

            tokio::select! {
                result = self.channel.next_packet() => match result {
                    Ok(Some(packet)) => self.handle_packet(packet),
                    Ok(None) => {}
                    Err(e) if e.is_protocol() => {
                        warn!(error = %e, "dropping malformed packet");
                    }
                    Err(e) => {
                        warn!(error = %e, "radio link lost");
                        self.on_disconnect().await;
                    }
                },

                command = self.command_rx.recv() => match command {
                    Some(Command::Send { packet, reply }) => {
                        let result = self.transmit(packet).await;
                        let _ = reply.send(result);
                    }
                    None => break,
                },
            }
        }

        self.status.mark_disconnected();
        let _ = self.channel.disconnect().await;
        info!("listener stopped");
    }

    async fn transmit(&mut self, packet: MeshPacket) -> Result<()> {
        match self.channel.send_packet(&packet).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_retriable() => {
                warn!(error = %e, "transmit failed, radio link lost");
                self.on_disconnect().await;
                Err(BridgeError::NotConnected)
            }
            Err(e) => Err(e),
        }
    }

    async fn on_disconnect(&mut self) {
        self.status.mark_disconnected();
        let _ = self.channel.disconnect().await;
    }

    /// Reconnect with exponential backoff
    ///
    /// Send commands arriving while disconnected are refused immediately.
    /// Returns false when attempts are exhausted or every handle is gone.
    async fn connect_with_backoff(&mut self) -> bool {
        let mut delay = self.reconnect.initial_delay;
        let mut failures = 0u32;

        loop {
            match self.channel.connect().await {
                Ok(()) => {
                    self.status.mark_connected(self.channel.local_node_id());
                    info!(channel = self.channel.name(), "radio link up");
                    return true;
                }
                Err(e) => {
                    failures += 1;
                    if self.reconnect.max_attempts != 0 && failures >= self.reconnect.max_attempts {
                        error!(
                            error = %e,
                            attempts = failures,
                            "giving up on radio connection"
                        );
                        return false;
                    }
                    warn!(error = %e, retry_in = ?delay, "radio connection failed");
                }
            }

            let sleep = tokio::time::sleep(delay);
            tokio::pin!(sleep);
            loop {
                tokio::select! {
                    _ = &mut sleep => break,
                    command = self.command_rx.recv() => match command {
                        Some(Command::Send { reply, .. }) => {
                            let _ = reply.send(Err(BridgeError::NotConnected));
                        }
                        None => return false,
                    },
                }
            }
            delay = (delay * 2).min(self.reconnect.max_delay);
        }
    }

    /// Classify one inbound packet and apply it to the shared state
    fn handle_packet(&self, packet: MeshPacket) {
        self.store.note_packet(packet.rx_time);

        match &packet.body {
            PacketBody::Text(text) => {
                debug!(
                    from = %format_node_id(packet.from),
                    len = text.len(),
                    "text message"
                );
                self.store.record_message(Message {
                    from: packet.from,
                    to: (packet.to != BROADCAST_ADDR).then_some(packet.to),
                    text: text.clone(),
                    rx_time: packet.rx_time,
                });
                self.store.touch_node(packet.from, packet.rx_time);
            }
            PacketBody::NodeInfo(user) => {
                debug!(
                    from = %format_node_id(packet.from),
                    name = %user.long_name,
                    "node announcement"
                );
                self.store
                    .set_node_user(packet.from, user.clone(), packet.rx_time);
            }
            PacketBody::Telemetry(frame) => {
                if let Some(metrics) = &frame.device {
                    self.store.record_device_telemetry(
                        packet.from,
                        DeviceTelemetry {
                            time: frame.time,
                            metrics: metrics.clone(),
                        },
                        packet.rx_time,
                    );
                }
                if let Some(metrics) = &frame.environment {
                    self.store.record_environment_telemetry(
                        packet.from,
                        EnvironmentTelemetry {
                            time: frame.time,
                            metrics: metrics.clone(),
                        },
                        packet.rx_time,
                    );
                }
                if frame.device.is_none() && frame.environment.is_none() {
                    self.store.touch_node(packet.from, packet.rx_time);
                }
            }
            // A query addressed to us is the radio firmware's concern
            PacketBody::TelemetryRequest(_) | PacketBody::Other { .. } => {
                self.store.touch_node(packet.from, packet.rx_time);
            }
        }

        if let Some(request_id) = packet.request_id {
            self.correlator.fulfill(request_id, packet);
        }
    }
}
