//! Node registry with heartbeat-based liveness tracking
//!
//! Owns the Node lifecycle: nodes are created on registration, mutated by
//! heartbeats and by the coordinator on activation/isolation, and never
//! deleted — only marked offline.

use crate::error::{GuardianError, Result};
use crate::models::{MetricSample, Node, NodeInfo, NodeStatus};
use dashmap::DashMap;
use tokio::sync::broadcast;
use tracing::{debug, info};

/// Capacity of the status-change broadcast channel
const STATUS_EVENT_CAPACITY: usize = 256;

/// Emitted to observers on every node status transition
#[derive(Debug, Clone)]
pub struct NodeStatusChanged {
    pub node_id: String,
    pub previous: NodeStatus,
    pub current: NodeStatus,
    pub timestamp: i64,
}

/// Registry of known nodes keyed by node id
pub struct NodeRegistry {
    nodes: DashMap<String, Node>,
    status_tx: broadcast::Sender<NodeStatusChanged>,
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl NodeRegistry {
    pub fn new() -> Self {
        let (status_tx, _) = broadcast::channel(STATUS_EVENT_CAPACITY);
        Self {
            nodes: DashMap::new(),
            status_tx,
        }
    }

    /// Subscribe to node status transitions
    pub fn subscribe(&self) -> broadcast::Receiver<NodeStatusChanged> {
        self.status_tx.subscribe()
    }

    /// Register a node, idempotently upserting by node id
    ///
    /// Re-registration refreshes identity fields and marks the node online;
    /// it does not reset an `ActiveMirror` assignment (activation is one-way
    /// until an explicit reinstate).
    pub fn register(&self, info: NodeInfo) -> Result<String> {
        validate_node_id(&info.node_id)?;

        let now = chrono::Utc::now().timestamp();
        let node_id = info.node_id.clone();

        match self.nodes.get_mut(&node_id) {
            Some(mut entry) => {
                entry.role = info.role;
                entry.hostname = info.hostname;
                entry.address = info.address;
                entry.capabilities = info.capabilities;
                entry.last_heartbeat = now;
                let previous = entry.status;
                if previous != NodeStatus::ActiveMirror {
                    entry.status = NodeStatus::Online;
                }
                let current = entry.status;
                drop(entry);
                if previous != current {
                    self.emit_status_change(&node_id, previous, current, now);
                }
                debug!(node_id = %node_id, "Node re-registered");
            }
            None => {
                self.nodes.insert(
                    node_id.clone(),
                    Node {
                        node_id: node_id.clone(),
                        role: info.role,
                        hostname: info.hostname,
                        address: info.address,
                        status: NodeStatus::Online,
                        capabilities: info.capabilities,
                        last_heartbeat: now,
                        registered_at: now,
                        latest_metrics: None,
                    },
                );
                info!(node_id = %node_id, "Node registered");
                self.emit_status_change(&node_id, NodeStatus::Connecting, NodeStatus::Online, now);
            }
        }

        Ok(node_id)
    }

    /// Record a heartbeat, optionally storing the latest metric sample
    ///
    /// Heartbeats from unregistered nodes are dropped, not auto-registered;
    /// the sender sees no error.
    pub fn heartbeat(&self, node_id: &str, metrics: Option<MetricSample>) {
        let now = chrono::Utc::now().timestamp();

        let Some(mut entry) = self.nodes.get_mut(node_id) else {
            debug!(node_id = %node_id, "Dropping heartbeat from unregistered node");
            return;
        };

        entry.last_heartbeat = now;
        if let Some(sample) = metrics {
            entry.latest_metrics = Some(sample);
        }

        let previous = entry.status;
        // A heartbeat revives offline/connecting nodes but does not clear
        // isolation or undo a mirror takeover.
        if matches!(previous, NodeStatus::Offline | NodeStatus::Connecting) {
            entry.status = NodeStatus::Online;
            drop(entry);
            self.emit_status_change(node_id, previous, NodeStatus::Online, now);
        }
    }

    /// Mark nodes silent for longer than `timeout_secs` as offline
    ///
    /// Returns the ids of nodes that transitioned on this sweep.
    pub fn sweep_offline(&self, timeout_secs: i64) -> Vec<String> {
        let now = chrono::Utc::now().timestamp();
        let mut swept = Vec::new();

        for mut entry in self.nodes.iter_mut() {
            if entry.status == NodeStatus::Online && now - entry.last_heartbeat > timeout_secs {
                entry.status = NodeStatus::Offline;
                swept.push(entry.node_id.clone());
            }
        }

        for node_id in &swept {
            info!(node_id = %node_id, timeout_secs, "Node swept offline");
            self.emit_status_change(node_id, NodeStatus::Online, NodeStatus::Offline, now);
        }

        swept
    }

    /// Force a status transition (isolation, activation, reinstate)
    pub fn set_status(&self, node_id: &str, status: NodeStatus) -> Result<()> {
        let mut entry = self
            .nodes
            .get_mut(node_id)
            .ok_or_else(|| GuardianError::NotFound(node_id.to_string()))?;

        let previous = entry.status;
        if previous == status {
            return Ok(());
        }
        entry.status = status;
        drop(entry);

        let now = chrono::Utc::now().timestamp();
        self.emit_status_change(node_id, previous, status, now);
        Ok(())
    }

    pub fn get(&self, node_id: &str) -> Result<Node> {
        self.nodes
            .get(node_id)
            .map(|r| r.clone())
            .ok_or_else(|| GuardianError::NotFound(node_id.to_string()))
    }

    pub fn list(&self) -> Vec<Node> {
        self.nodes.iter().map(|r| r.value().clone()).collect()
    }

    /// True if the node exists and is currently online
    pub fn is_online(&self, node_id: &str) -> bool {
        self.nodes
            .get(node_id)
            .map(|n| n.status == NodeStatus::Online)
            .unwrap_or(false)
    }

    pub fn online_count(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| n.status == NodeStatus::Online)
            .count()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn emit_status_change(
        &self,
        node_id: &str,
        previous: NodeStatus,
        current: NodeStatus,
        timestamp: i64,
    ) {
        // Lagging or absent subscribers must not affect the registry.
        let _ = self.status_tx.send(NodeStatusChanged {
            node_id: node_id.to_string(),
            previous,
            current,
            timestamp,
        });
    }
}

/// Reject empty identifiers and unresolved template placeholders
fn validate_node_id(node_id: &str) -> Result<()> {
    if node_id.trim().is_empty() {
        return Err(GuardianError::InvalidIdentity("empty node id".to_string()));
    }
    for marker in ["{{", "}}", "${"] {
        if node_id.contains(marker) {
            return Err(GuardianError::InvalidIdentity(format!(
                "node id contains unresolved placeholder: {}",
                node_id
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NodeRole;

    fn test_info(node_id: &str) -> NodeInfo {
        NodeInfo {
            node_id: node_id.to_string(),
            role: NodeRole::Agent,
            hostname: "host-1".to_string(),
            address: "10.0.0.5:3002".to_string(),
            capabilities: vec!["metrics_collection".to_string()],
        }
    }

    fn test_sample(node_id: &str, cpu: f64) -> MetricSample {
        MetricSample {
            node_id: node_id.to_string(),
            timestamp: chrono::Utc::now().timestamp(),
            cpu_percent: cpu,
            memory_percent: 30.0,
            disk_percent: 40.0,
            network_speed_mbps: 1.0,
            extra: Default::default(),
        }
    }

    #[test]
    fn test_register_and_get() {
        let registry = NodeRegistry::new();
        registry.register(test_info("node-1")).unwrap();

        let node = registry.get("node-1").unwrap();
        assert_eq!(node.status, NodeStatus::Online);
        assert_eq!(node.hostname, "host-1");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_register_is_idempotent() {
        let registry = NodeRegistry::new();
        registry.register(test_info("node-1")).unwrap();
        let mut info = test_info("node-1");
        info.hostname = "host-2".to_string();
        registry.register(info).unwrap();

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("node-1").unwrap().hostname, "host-2");
    }

    #[test]
    fn test_register_rejects_malformed_ids() {
        let registry = NodeRegistry::new();

        assert!(matches!(
            registry.register(test_info("")),
            Err(GuardianError::InvalidIdentity(_))
        ));
        assert!(matches!(
            registry.register(test_info("{{node_name}}")),
            Err(GuardianError::InvalidIdentity(_))
        ));
        assert!(matches!(
            registry.register(test_info("${HOSTNAME}")),
            Err(GuardianError::InvalidIdentity(_))
        ));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_heartbeat_from_ghost_node_is_dropped() {
        let registry = NodeRegistry::new();
        registry.heartbeat("ghost-node", None);

        assert!(registry.is_empty());
        assert!(registry.get("ghost-node").is_err());
    }

    #[test]
    fn test_heartbeat_stores_metrics_and_revives_offline() {
        let registry = NodeRegistry::new();
        registry.register(test_info("node-1")).unwrap();
        registry.set_status("node-1", NodeStatus::Offline).unwrap();

        registry.heartbeat("node-1", Some(test_sample("node-1", 12.0)));

        let node = registry.get("node-1").unwrap();
        assert_eq!(node.status, NodeStatus::Online);
        assert_eq!(node.latest_metrics.unwrap().cpu_percent, 12.0);
    }

    #[test]
    fn test_heartbeat_does_not_clear_isolation() {
        let registry = NodeRegistry::new();
        registry.register(test_info("node-1")).unwrap();
        registry.set_status("node-1", NodeStatus::Isolated).unwrap();

        registry.heartbeat("node-1", None);

        assert_eq!(registry.get("node-1").unwrap().status, NodeStatus::Isolated);
    }

    #[test]
    fn test_sweep_offline_marks_silent_nodes() {
        let registry = NodeRegistry::new();
        registry.register(test_info("node-1")).unwrap();
        registry.register(test_info("node-2")).unwrap();

        // Backdate one node's heartbeat past the timeout.
        registry
            .nodes
            .get_mut("node-1")
            .unwrap()
            .last_heartbeat -= 600;

        let swept = registry.sweep_offline(300);
        assert_eq!(swept, vec!["node-1".to_string()]);
        assert_eq!(registry.get("node-1").unwrap().status, NodeStatus::Offline);
        assert_eq!(registry.get("node-2").unwrap().status, NodeStatus::Online);

        // A second sweep does not re-report or resurrect.
        assert!(registry.sweep_offline(300).is_empty());
        assert_eq!(registry.get("node-1").unwrap().status, NodeStatus::Offline);
    }

    #[tokio::test]
    async fn test_status_transitions_are_broadcast() {
        let registry = NodeRegistry::new();
        let mut events = registry.subscribe();

        registry.register(test_info("node-1")).unwrap();
        registry.set_status("node-1", NodeStatus::Isolated).unwrap();

        let first = events.recv().await.unwrap();
        assert_eq!(first.node_id, "node-1");
        assert_eq!(first.current, NodeStatus::Online);

        let second = events.recv().await.unwrap();
        assert_eq!(second.previous, NodeStatus::Online);
        assert_eq!(second.current, NodeStatus::Isolated);
    }
}
