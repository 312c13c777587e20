//! Correlation of outbound telemetry queries with their async responses
//!
//! A telemetry response from the radio is an independent packet with no
//! latency bound; the [`Correlator`] turns that into a bounded synchronous
//! wait. Each pending request owns a oneshot completion slot. The listener
//! fulfills slots exactly once; a caller whose wait times out removes its
//! own slot, so a response racing the deadline is dropped as unmatched.
//!
//! Invariant: at most one request may be outstanding per (target node,
//! telemetry kind); a second concurrent request is rejected as busy.

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{debug, trace};

use crate::error::{BridgeError, Result};
use crate::packet::{fresh_packet_id, format_node_id, MeshPacket, NodeId, TelemetryKind};

struct Pending {
    node: NodeId,
    kind: TelemetryKind,
    tx: oneshot::Sender<MeshPacket>,
}

/// Ticket for one outstanding telemetry request
///
/// Holds the receiving half of the completion slot; redeem it with
/// [`Correlator::await_response`] or release it with
/// [`Correlator::abort`].
#[derive(Debug)]
pub struct TelemetryTicket {
    request_id: u32,
    node: NodeId,
    kind: TelemetryKind,
    rx: oneshot::Receiver<MeshPacket>,
}

impl TelemetryTicket {
    /// Correlation id the outbound query packet must carry as its packet id
    pub fn request_id(&self) -> u32 {
        self.request_id
    }
}

/// Tracks outstanding request/response pairs
#[derive(Default)]
pub struct Correlator {
    pending: Mutex<HashMap<u32, Pending>>,
}

impl Correlator {
    /// Create an empty correlator
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new pending request for (node, kind)
    ///
    /// Atomic create-or-reject: fails with [`BridgeError::TelemetryBusy`]
    /// while an earlier request for the same target and kind is still
    /// outstanding.
    pub fn issue(&self, node: NodeId, kind: TelemetryKind) -> Result<TelemetryTicket> {
        let mut pending = self.pending.lock();

        if pending.values().any(|p| p.node == node && p.kind == kind) {
            return Err(BridgeError::TelemetryBusy { node, kind });
        }

        let request_id = loop {
            let id = fresh_packet_id();
            if !pending.contains_key(&id) {
                break id;
            }
        };

        let (tx, rx) = oneshot::channel();
        pending.insert(request_id, Pending { node, kind, tx });
        debug!(
            node = %format_node_id(node),
            %kind,
            request_id,
            "issued telemetry request"
        );

        Ok(TelemetryTicket {
            request_id,
            node,
            kind,
            rx,
        })
    }

    /// Block the calling task until fulfillment or the deadline
    ///
    /// On timeout the pending entry is removed before returning, so a
    /// fresh request for the same target is immediately accepted and a
    /// late response is dropped as unmatched.
    pub async fn await_response(&self, ticket: TelemetryTicket, timeout: Duration) -> Result<MeshPacket> {
        let TelemetryTicket {
            request_id,
            node,
            kind,
            rx,
        } = ticket;

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(packet)) => Ok(packet),
            // Sender dropped without fulfilling: the listener is gone
            Ok(Err(_)) => {
                self.pending.lock().remove(&request_id);
                Err(BridgeError::ChannelClosed)
            }
            Err(_) => {
                self.pending.lock().remove(&request_id);
                debug!(
                    node = %format_node_id(node),
                    %kind,
                    request_id,
                    "telemetry request timed out"
                );
                Err(BridgeError::TelemetryTimeout { node, kind })
            }
        }
    }

    /// Release a pending request without waiting (e.g. the outbound
    /// transmit failed)
    pub fn abort(&self, ticket: TelemetryTicket) {
        self.pending.lock().remove(&ticket.request_id);
    }

    /// Complete the pending request matching `request_id`, if any
    ///
    /// Called only by the listener. A no-op for unknown ids, which covers
    /// duplicate responses, responses racing a timeout, and unsolicited
    /// packets.
    pub fn fulfill(&self, request_id: u32, packet: MeshPacket) {
        let entry = self.pending.lock().remove(&request_id);
        match entry {
            Some(p) => {
                debug!(
                    node = %format_node_id(p.node),
                    kind = %p.kind,
                    request_id,
                    "fulfilled telemetry request"
                );
                // Receiver may have just timed out; the packet is dropped
                let _ = p.tx.send(packet);
            }
            None => {
                trace!(request_id, "response without matching request, dropped");
            }
        }
    }

    /// Number of outstanding requests
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::{PacketBody, TelemetryFrame};
    use chrono::Utc;

    fn response(request_id: u32) -> MeshPacket {
        MeshPacket {
            from: 0xAA,
            to: 0x01,
            packet_id: 7,
            channel: 0,
            body: PacketBody::Telemetry(TelemetryFrame {
                time: Utc::now(),
                device: None,
                environment: None,
            }),
            request_id: Some(request_id),
            want_response: false,
            rx_time: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_issue_rejects_duplicate_target() {
        let correlator = Correlator::new();
        let ticket = correlator.issue(0xAA, TelemetryKind::Device).unwrap();

        let err = correlator.issue(0xAA, TelemetryKind::Device).unwrap_err();
        assert!(matches!(err, BridgeError::TelemetryBusy { .. }));

        // A different kind for the same node is independent
        let env = correlator.issue(0xAA, TelemetryKind::Environment).unwrap();
        assert_eq!(correlator.pending_count(), 2);
        correlator.abort(ticket);
        correlator.abort(env);
    }

    #[tokio::test]
    async fn test_fulfill_releases_waiter() {
        let correlator = Correlator::new();
        let ticket = correlator.issue(0xAA, TelemetryKind::Device).unwrap();
        let id = ticket.request_id();

        correlator.fulfill(id, response(id));
        let packet = correlator
            .await_response(ticket, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(packet.request_id, Some(id));
        assert_eq!(correlator.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_frees_slot() {
        let correlator = Correlator::new();
        let ticket = correlator.issue(0xAA, TelemetryKind::Device).unwrap();

        let err = correlator
            .await_response(ticket, Duration::from_secs(10))
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::TelemetryTimeout { .. }));

        // The slot is free again
        assert_eq!(correlator.pending_count(), 0);
        assert!(correlator.issue(0xAA, TelemetryKind::Device).is_ok());
    }

    #[tokio::test]
    async fn test_fulfill_unknown_id_is_noop() {
        let correlator = Correlator::new();
        correlator.fulfill(12345, response(12345));
        assert_eq!(correlator.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_duplicate_fulfill_ignored() {
        let correlator = Correlator::new();
        let ticket = correlator.issue(0xAA, TelemetryKind::Device).unwrap();
        let id = ticket.request_id();

        correlator.fulfill(id, response(id));
        // Late duplicate: entry already gone
        correlator.fulfill(id, response(id));

        let packet = correlator
            .await_response(ticket, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(packet.request_id, Some(id));
    }

    #[tokio::test]
    async fn test_abort_frees_slot() {
        let correlator = Correlator::new();
        let ticket = correlator.issue(0xBB, TelemetryKind::Environment).unwrap();
        correlator.abort(ticket);
        assert!(correlator.issue(0xBB, TelemetryKind::Environment).is_ok());
    }
}
