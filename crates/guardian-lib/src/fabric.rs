//! Connection fabric: per-node outbound channels plus observer fan-out
//!
//! Each connected node owns one bounded mpsc channel; the transport task
//! holding the receiver drains it onto the wire. Per-node ordering follows
//! from the single channel. Reconnection is last-writer-wins: a fresh
//! connect replaces the previous channel and the old transport task sees
//! its receiver close.

use crate::observability::GuardianMetrics;
use crate::protocol::OutboundMessage;
use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Depth of each per-connection outbound channel
const OUTBOUND_CHANNEL_DEPTH: usize = 64;

/// Routes outbound messages to connected nodes and observers
pub struct ConnectionFabric {
    nodes: DashMap<String, mpsc::Sender<OutboundMessage>>,
    observers: DashMap<String, mpsc::Sender<OutboundMessage>>,
    metrics: GuardianMetrics,
}

impl Default for ConnectionFabric {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionFabric {
    pub fn new() -> Self {
        Self {
            nodes: DashMap::new(),
            observers: DashMap::new(),
            metrics: GuardianMetrics::new(),
        }
    }

    /// Attach a node connection, returning the receiver half for the
    /// transport task. Replaces any existing connection for the same id.
    pub fn connect(&self, node_id: &str) -> mpsc::Receiver<OutboundMessage> {
        let (tx, rx) = mpsc::channel(OUTBOUND_CHANNEL_DEPTH);
        if self.nodes.insert(node_id.to_string(), tx).is_some() {
            debug!(node_id = %node_id, "Replaced existing connection");
        }
        rx
    }

    /// Attach an observer connection (dashboards, operator tooling)
    pub fn connect_observer(&self, observer_id: &str) -> mpsc::Receiver<OutboundMessage> {
        let (tx, rx) = mpsc::channel(OUTBOUND_CHANNEL_DEPTH);
        self.observers.insert(observer_id.to_string(), tx);
        rx
    }

    /// Detach a node connection and tell observers about it
    pub async fn disconnect(&self, node_id: &str) {
        if self.nodes.remove(node_id).is_some() {
            debug!(node_id = %node_id, "Node disconnected");
            self.broadcast_to_observers(OutboundMessage::observer(
                "node_disconnected",
                &serde_json::json!({ "node_id": node_id }),
            ))
            .await;
        }
    }

    pub fn disconnect_observer(&self, observer_id: &str) {
        self.observers.remove(observer_id);
    }

    pub fn is_connected(&self, node_id: &str) -> bool {
        self.nodes.contains_key(node_id)
    }

    pub fn connected_count(&self) -> usize {
        self.nodes.len()
    }

    /// Send to one node; false if it is not connected or its channel is gone
    ///
    /// A dead channel means the transport task exited without a disconnect,
    /// so the stale sender is torn down here.
    pub async fn send(&self, node_id: &str, message: OutboundMessage) -> bool {
        let Some(tx) = self.nodes.get(node_id).map(|entry| entry.value().clone()) else {
            debug!(node_id = %node_id, "Send to unconnected node dropped");
            self.metrics.inc_send_failures("node");
            return false;
        };

        if tx.send(message).await.is_err() {
            warn!(node_id = %node_id, "Outbound channel closed, removing connection");
            self.nodes.remove(node_id);
            self.metrics.inc_send_failures("node");
            return false;
        }
        true
    }

    /// Fan a message out to every connected node except `exclude`
    ///
    /// Returns how many nodes accepted the message. Failed channels are
    /// removed as in `send`.
    pub async fn broadcast_to_nodes(
        &self,
        message: OutboundMessage,
        exclude: Option<&str>,
    ) -> usize {
        let targets: Vec<String> = self
            .nodes
            .iter()
            .map(|entry| entry.key().clone())
            .filter(|id| Some(id.as_str()) != exclude)
            .collect();

        let mut delivered = 0;
        for node_id in targets {
            if self.send(&node_id, message.clone()).await {
                delivered += 1;
            }
        }
        delivered
    }

    /// Fan a message out to every observer; dead observers are dropped
    pub async fn broadcast_to_observers(&self, message: OutboundMessage) {
        let targets: Vec<(String, mpsc::Sender<OutboundMessage>)> = self
            .observers
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();

        for (observer_id, tx) in targets {
            if tx.send(message.clone()).await.is_err() {
                debug!(observer_id = %observer_id, "Dropping dead observer");
                self.observers.remove(&observer_id);
                self.metrics.inc_send_failures("observer");
            }
        }
    }
}
