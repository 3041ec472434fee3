//! Persistence facade over document and graph stores
//!
//! Storage is observational: ingestion, detection, and remediation must keep
//! working when a store is absent or failing, so the facade logs write
//! errors and carries on. The engine never awaits a round-trip to decide
//! behavior; the mirror topology is additionally held in memory.

use crate::models::{
    Anomaly, Escalation, HealthIssue, MetricSample, MirrorRelation, Node, RemediationRecord,
    SecurityIncident,
};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::warn;

/// Append-oriented document storage (nodes, samples, event records)
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn upsert_node(&self, node: &Node) -> anyhow::Result<()>;
    async fn append_metric(&self, sample: &MetricSample) -> anyhow::Result<()>;
    async fn append_anomaly(&self, anomaly: &Anomaly) -> anyhow::Result<()>;
    async fn append_remediation(&self, record: &RemediationRecord) -> anyhow::Result<()>;
    async fn append_escalation(&self, escalation: &Escalation) -> anyhow::Result<()>;
    async fn append_security_incident(&self, incident: &SecurityIncident) -> anyhow::Result<()>;
}

/// Relationship storage for the mirror topology and node issues
#[async_trait]
pub trait GraphStore: Send + Sync {
    async fn upsert_edge(&self, relation: &MirrorRelation) -> anyhow::Result<()>;
    async fn upsert_node_issue(&self, issue: &HealthIssue) -> anyhow::Result<()>;
    async fn query_mirrors(&self, primary_id: &str) -> anyhow::Result<Vec<MirrorRelation>>;
}

/// Facade the engine writes through
///
/// Either store may be absent; a `None` store is degraded in-memory mode and
/// every write silently succeeds.
#[derive(Clone, Default)]
pub struct Persistence {
    documents: Option<Arc<dyn DocumentStore>>,
    graph: Option<Arc<dyn GraphStore>>,
}

impl Persistence {
    pub fn new(
        documents: Option<Arc<dyn DocumentStore>>,
        graph: Option<Arc<dyn GraphStore>>,
    ) -> Self {
        Self { documents, graph }
    }

    /// Fully in-memory mode, used in tests and degraded deployments
    pub fn disabled() -> Self {
        Self::default()
    }

    pub async fn record_node(&self, node: &Node) {
        if let Some(store) = &self.documents {
            if let Err(error) = store.upsert_node(node).await {
                warn!(node_id = %node.node_id, %error, "Failed to persist node");
            }
        }
    }

    pub async fn record_metric(&self, sample: &MetricSample) {
        if let Some(store) = &self.documents {
            if let Err(error) = store.append_metric(sample).await {
                warn!(node_id = %sample.node_id, %error, "Failed to persist metric sample");
            }
        }
    }

    pub async fn record_anomaly(&self, anomaly: &Anomaly) {
        if let Some(store) = &self.documents {
            if let Err(error) = store.append_anomaly(anomaly).await {
                warn!(node_id = %anomaly.node_id, kind = %anomaly.kind, %error,
                    "Failed to persist anomaly");
            }
        }
    }

    pub async fn record_remediation(&self, record: &RemediationRecord) {
        if let Some(store) = &self.documents {
            if let Err(error) = store.append_remediation(record).await {
                warn!(remediation_id = %record.id, %error, "Failed to persist remediation");
            }
        }
    }

    pub async fn record_escalation(&self, escalation: &Escalation) {
        if let Some(store) = &self.documents {
            if let Err(error) = store.append_escalation(escalation).await {
                warn!(remediation_id = %escalation.remediation_id, %error,
                    "Failed to persist escalation");
            }
        }
    }

    pub async fn record_security_incident(&self, incident: &SecurityIncident) {
        if let Some(store) = &self.documents {
            if let Err(error) = store.append_security_incident(incident).await {
                warn!(node_id = %incident.node_id, %error,
                    "Failed to persist security incident");
            }
        }
    }

    pub async fn record_mirror_edge(&self, relation: &MirrorRelation) {
        if let Some(store) = &self.graph {
            if let Err(error) = store.upsert_edge(relation).await {
                warn!(primary = %relation.primary_id, mirror = %relation.mirror_id, %error,
                    "Failed to persist mirror edge");
            }
        }
    }

    pub async fn record_health_issue(&self, issue: &HealthIssue) {
        if let Some(store) = &self.graph {
            if let Err(error) = store.upsert_node_issue(issue).await {
                warn!(node_id = %issue.node_id, kind = %issue.kind, %error,
                    "Failed to persist health issue");
            }
        }
    }
}

/// In-memory document store for tests and single-process deployments
#[derive(Default)]
pub struct InMemoryDocumentStore {
    pub nodes: DashMap<String, Node>,
    pub metrics: DashMap<String, Vec<MetricSample>>,
    pub anomalies: std::sync::Mutex<Vec<Anomaly>>,
    pub remediations: std::sync::Mutex<Vec<RemediationRecord>>,
    pub escalations: std::sync::Mutex<Vec<Escalation>>,
    pub incidents: std::sync::Mutex<Vec<SecurityIncident>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn push<T>(list: &std::sync::Mutex<Vec<T>>, item: T) {
        if let Ok(mut guard) = list.lock() {
            guard.push(item);
        }
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn upsert_node(&self, node: &Node) -> anyhow::Result<()> {
        self.nodes.insert(node.node_id.clone(), node.clone());
        Ok(())
    }

    async fn append_metric(&self, sample: &MetricSample) -> anyhow::Result<()> {
        self.metrics
            .entry(sample.node_id.clone())
            .or_default()
            .push(sample.clone());
        Ok(())
    }

    async fn append_anomaly(&self, anomaly: &Anomaly) -> anyhow::Result<()> {
        Self::push(&self.anomalies, anomaly.clone());
        Ok(())
    }

    async fn append_remediation(&self, record: &RemediationRecord) -> anyhow::Result<()> {
        Self::push(&self.remediations, record.clone());
        Ok(())
    }

    async fn append_escalation(&self, escalation: &Escalation) -> anyhow::Result<()> {
        Self::push(&self.escalations, escalation.clone());
        Ok(())
    }

    async fn append_security_incident(&self, incident: &SecurityIncident) -> anyhow::Result<()> {
        Self::push(&self.incidents, incident.clone());
        Ok(())
    }
}

/// In-memory graph store mirroring the edge set held by the topology
#[derive(Default)]
pub struct InMemoryGraphStore {
    pub edges: DashMap<String, Vec<MirrorRelation>>,
    pub issues: std::sync::Mutex<Vec<HealthIssue>>,
}

impl InMemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl GraphStore for InMemoryGraphStore {
    async fn upsert_edge(&self, relation: &MirrorRelation) -> anyhow::Result<()> {
        let mut edges = self.edges.entry(relation.primary_id.clone()).or_default();
        edges.retain(|r| r.mirror_id != relation.mirror_id);
        edges.push(relation.clone());
        Ok(())
    }

    async fn upsert_node_issue(&self, issue: &HealthIssue) -> anyhow::Result<()> {
        if let Ok(mut guard) = self.issues.lock() {
            guard.push(issue.clone());
        }
        Ok(())
    }

    async fn query_mirrors(&self, primary_id: &str) -> anyhow::Result<Vec<MirrorRelation>> {
        Ok(self
            .edges
            .get(primary_id)
            .map(|r| r.clone())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MirrorType, NodeRole, NodeStatus, Severity};

    fn test_node(node_id: &str) -> Node {
        Node {
            node_id: node_id.to_string(),
            role: NodeRole::Agent,
            hostname: "host".to_string(),
            address: "10.0.0.1:3002".to_string(),
            status: NodeStatus::Online,
            capabilities: vec![],
            last_heartbeat: 0,
            registered_at: 0,
            latest_metrics: None,
        }
    }

    #[tokio::test]
    async fn test_disabled_persistence_absorbs_writes() {
        let persistence = Persistence::disabled();
        // No store configured: every write is a no-op, not an error.
        persistence.record_node(&test_node("node-1")).await;
        persistence
            .record_escalation(&Escalation {
                remediation_id: "r-1".to_string(),
                node_id: "node-1".to_string(),
                strategy: "cpu_high".to_string(),
                reason: "retries exhausted".to_string(),
                timestamp: 0,
            })
            .await;
    }

    #[tokio::test]
    async fn test_in_memory_document_store_records() {
        let store = Arc::new(InMemoryDocumentStore::new());
        let persistence = Persistence::new(Some(store.clone()), None);

        persistence.record_node(&test_node("node-1")).await;
        persistence
            .record_security_incident(&SecurityIncident {
                node_id: "node-1".to_string(),
                threat_kind: "ddos_attempt_detected".to_string(),
                severity: Severity::Critical,
                timestamp: 0,
                details: "traffic spike".to_string(),
            })
            .await;

        assert!(store.nodes.contains_key("node-1"));
        assert_eq!(store.incidents.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_graph_store_edge_upsert_replaces() {
        let store = InMemoryGraphStore::new();
        let mut relation = MirrorRelation {
            primary_id: "node-1".to_string(),
            mirror_id: "node-2".to_string(),
            mirror_type: MirrorType::Passive,
            priority: 2,
            created_at: 0,
        };

        store.upsert_edge(&relation).await.unwrap();
        relation.priority = 1;
        store.upsert_edge(&relation).await.unwrap();

        let mirrors = store.query_mirrors("node-1").await.unwrap();
        assert_eq!(mirrors.len(), 1);
        assert_eq!(mirrors[0].priority, 1);
    }
}
