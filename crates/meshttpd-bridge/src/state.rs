//! Shared state derived from the packet stream
//!
//! The [`StateStore`] holds the message history ring, the node registry,
//! and the latest telemetry snapshots. The listener is the sole writer;
//! query paths only ever take point-in-time copies, so readers never hold
//! the lock past the copy and never observe partial updates.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;

use crate::packet::{DeviceMetrics, EnvironmentMetrics, NodeId, NodeUser};

/// A text message observed on the mesh
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Message {
    /// Sender node address
    pub from: NodeId,
    /// Target node address; `None` for broadcast
    pub to: Option<NodeId>,
    /// Message text
    pub text: String,
    /// When the listener observed the message
    pub rx_time: DateTime<Utc>,
}

/// Latest device telemetry snapshot for a node
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceTelemetry {
    /// Sample timestamp
    pub time: DateTime<Utc>,
    /// Reported metrics
    #[serde(flatten)]
    pub metrics: DeviceMetrics,
}

/// Latest environment telemetry snapshot for a node
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnvironmentTelemetry {
    /// Sample timestamp
    pub time: DateTime<Utc>,
    /// Reported metrics
    #[serde(flatten)]
    pub metrics: EnvironmentMetrics,
}

/// Everything known about a node, updated on every packet from it
#[derive(Debug, Clone, Serialize)]
pub struct NodeRecord {
    /// Node address
    pub id: NodeId,
    /// User announcement, once one has been seen
    pub user: Option<NodeUser>,
    /// When a packet from this node was last observed
    pub last_seen: DateTime<Utc>,
    /// Last known device telemetry
    pub device: Option<DeviceTelemetry>,
    /// Last known environment telemetry
    pub environment: Option<EnvironmentTelemetry>,
}

impl NodeRecord {
    fn new(id: NodeId, seen: DateTime<Utc>) -> Self {
        Self {
            id,
            user: None,
            last_seen: seen,
            device: None,
            environment: None,
        }
    }
}

#[derive(Debug, Default)]
struct StoreInner {
    messages: VecDeque<Message>,
    nodes: HashMap<NodeId, NodeRecord>,
    last_packet: Option<DateTime<Utc>>,
}

/// Thread-safe store for messages, nodes, and telemetry snapshots
#[derive(Debug)]
pub struct StateStore {
    inner: RwLock<StoreInner>,
    capacity: usize,
}

impl StateStore {
    /// Create a store with the given message history capacity
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: RwLock::new(StoreInner::default()),
            capacity: capacity.max(1),
        }
    }

    /// Append a message, evicting the oldest past capacity
    pub fn record_message(&self, message: Message) {
        let mut inner = self.inner.write();
        if inner.messages.len() == self.capacity {
            inner.messages.pop_front();
        }
        inner.messages.push_back(message);
    }

    /// Refresh a node's last-seen timestamp, creating the record if new
    pub fn touch_node(&self, id: NodeId, seen: DateTime<Utc>) {
        let mut inner = self.inner.write();
        inner
            .nodes
            .entry(id)
            .and_modify(|rec| rec.last_seen = seen)
            .or_insert_with(|| NodeRecord::new(id, seen));
    }

    /// Record a node's user announcement
    pub fn set_node_user(&self, id: NodeId, user: NodeUser, seen: DateTime<Utc>) {
        let mut inner = self.inner.write();
        let rec = inner
            .nodes
            .entry(id)
            .or_insert_with(|| NodeRecord::new(id, seen));
        rec.last_seen = seen;
        rec.user = Some(user);
    }

    /// Record a node's latest device telemetry
    pub fn record_device_telemetry(&self, id: NodeId, telemetry: DeviceTelemetry, seen: DateTime<Utc>) {
        let mut inner = self.inner.write();
        let rec = inner
            .nodes
            .entry(id)
            .or_insert_with(|| NodeRecord::new(id, seen));
        rec.last_seen = seen;
        rec.device = Some(telemetry);
    }

    /// Record a node's latest environment telemetry
    pub fn record_environment_telemetry(
        &self,
        id: NodeId,
        telemetry: EnvironmentTelemetry,
        seen: DateTime<Utc>,
    ) {
        let mut inner = self.inner.write();
        let rec = inner
            .nodes
            .entry(id)
            .or_insert_with(|| NodeRecord::new(id, seen));
        rec.last_seen = seen;
        rec.environment = Some(telemetry);
    }

    /// Note that a packet was observed (any kind)
    pub fn note_packet(&self, at: DateTime<Utc>) {
        self.inner.write().last_packet = Some(at);
    }

    /// Copy of the message history in arrival order, optionally only the
    /// most recent `limit` entries
    pub fn snapshot_messages(&self, limit: Option<usize>) -> Vec<Message> {
        let inner = self.inner.read();
        let len = inner.messages.len();
        let skip = limit.map_or(0, |l| len.saturating_sub(l));
        inner.messages.iter().skip(skip).cloned().collect()
    }

    /// Copy of all node records
    pub fn snapshot_nodes(&self) -> Vec<NodeRecord> {
        self.inner.read().nodes.values().cloned().collect()
    }

    /// Number of distinct nodes seen
    pub fn node_count(&self) -> usize {
        self.inner.read().nodes.len()
    }

    /// When the last packet of any kind was observed
    pub fn last_packet(&self) -> Option<DateTime<Utc>> {
        self.inner.read().last_packet
    }

    /// Cached device telemetry for a node, if any
    pub fn device_telemetry(&self, id: NodeId) -> Option<DeviceTelemetry> {
        self.inner.read().nodes.get(&id).and_then(|rec| rec.device.clone())
    }

    /// Cached environment telemetry for a node, if any
    pub fn environment_telemetry(&self, id: NodeId) -> Option<EnvironmentTelemetry> {
        self.inner
            .read()
            .nodes
            .get(&id)
            .and_then(|rec| rec.environment.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(n: u32) -> Message {
        Message {
            from: 0x10,
            to: None,
            text: format!("message {n}"),
            rx_time: Utc::now(),
        }
    }

    #[test]
    fn test_fifo_eviction_keeps_newest() {
        let store = StateStore::new(50);
        for n in 1..=60 {
            store.record_message(msg(n));
        }
        let history = store.snapshot_messages(None);
        assert_eq!(history.len(), 50);
        assert_eq!(history.first().unwrap().text, "message 11");
        assert_eq!(history.last().unwrap().text, "message 60");
    }

    #[test]
    fn test_snapshot_limit_takes_most_recent() {
        let store = StateStore::new(10);
        for n in 1..=5 {
            store.record_message(msg(n));
        }
        let tail = store.snapshot_messages(Some(2));
        assert_eq!(tail.len(), 2);
        assert_eq!(tail[0].text, "message 4");
        assert_eq!(tail[1].text, "message 5");
        // A limit past the history length returns everything
        assert_eq!(store.snapshot_messages(Some(100)).len(), 5);
    }

    #[test]
    fn test_snapshot_is_a_copy() {
        let store = StateStore::new(10);
        store.record_message(msg(1));
        let snapshot = store.snapshot_messages(None);
        store.record_message(msg(2));
        assert_eq!(snapshot.len(), 1);
    }

    #[test]
    fn test_upsert_refreshes_last_seen() {
        let store = StateStore::new(10);
        let first = Utc::now();
        store.touch_node(0xAA, first);
        let later = first + chrono::Duration::seconds(5);
        store.touch_node(0xAA, later);

        let nodes = store.snapshot_nodes();
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].last_seen, later);
    }

    #[test]
    fn test_telemetry_update_preserves_user() {
        let store = StateStore::new(10);
        let now = Utc::now();
        store.set_node_user(
            0xAA,
            NodeUser {
                id: "!000000aa".into(),
                long_name: "Relay West".into(),
                short_name: "RW".into(),
            },
            now,
        );
        store.record_device_telemetry(
            0xAA,
            DeviceTelemetry {
                time: now,
                metrics: DeviceMetrics {
                    battery_level: Some(92),
                    ..Default::default()
                },
            },
            now,
        );

        let nodes = store.snapshot_nodes();
        assert_eq!(nodes[0].user.as_ref().unwrap().long_name, "Relay West");
        assert_eq!(
            store.device_telemetry(0xAA).unwrap().metrics.battery_level,
            Some(92)
        );
        assert!(store.environment_telemetry(0xAA).is_none());
    }

    #[test]
    fn test_node_count_and_last_packet() {
        let store = StateStore::new(10);
        assert_eq!(store.node_count(), 0);
        assert!(store.last_packet().is_none());

        let now = Utc::now();
        store.touch_node(1, now);
        store.touch_node(2, now);
        store.note_packet(now);
        assert_eq!(store.node_count(), 2);
        assert_eq!(store.last_packet(), Some(now));
    }
}
