//! Core data models for the guardian coordinator

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Role a node plays in the fleet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeRole {
    Guardian,
    Peer,
    Agent,
}

/// Liveness/availability status of a node
///
/// `Inactive` is the post-takeover state of a failed primary whose
/// responsibilities were handed to a mirror. It is distinct from `Offline`
/// (missed heartbeats) because returning an inactive node to service
/// requires an explicit reinstate operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Online,
    Offline,
    Connecting,
    Isolated,
    ActiveMirror,
    Inactive,
}

impl std::fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            NodeStatus::Online => "online",
            NodeStatus::Offline => "offline",
            NodeStatus::Connecting => "connecting",
            NodeStatus::Isolated => "isolated",
            NodeStatus::ActiveMirror => "active_mirror",
            NodeStatus::Inactive => "inactive",
        };
        write!(f, "{}", s)
    }
}

/// Registration payload supplied by a node on first contact
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeInfo {
    pub node_id: String,
    pub role: NodeRole,
    pub hostname: String,
    pub address: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
}

/// A registry-tracked node with liveness state
///
/// Nodes are never deleted, only marked offline; the record is retained
/// for audit and mirror-topology integrity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub node_id: String,
    pub role: NodeRole,
    pub hostname: String,
    pub address: String,
    pub status: NodeStatus,
    pub capabilities: Vec<String>,
    pub last_heartbeat: i64,
    pub registered_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest_metrics: Option<MetricSample>,
}

/// One metric sample reported by a node
///
/// All scalar fields default to zero so a partial payload decodes instead
/// of failing the ingestion path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricSample {
    pub node_id: String,
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default)]
    pub cpu_percent: f64,
    #[serde(default)]
    pub memory_percent: f64,
    #[serde(default)]
    pub disk_percent: f64,
    #[serde(default)]
    pub network_speed_mbps: f64,
    #[serde(default)]
    pub extra: HashMap<String, f64>,
}

/// Severity attached to anomalies and health issues
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Info => write!(f, "info"),
            Severity::Warning => write!(f, "warning"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

/// Supporting evidence for an anomaly
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomalyEvidence {
    pub current_value: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub baseline_mean: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub baseline_std: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub z_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f64>,
    pub description: String,
}

impl AnomalyEvidence {
    /// Evidence for a fixed-threshold rule violation
    pub fn threshold(current: f64, threshold: f64, description: impl Into<String>) -> Self {
        Self {
            current_value: current,
            baseline_mean: None,
            baseline_std: None,
            z_score: None,
            threshold: Some(threshold),
            description: description.into(),
        }
    }

    /// Evidence for a pattern match without a single numeric threshold
    pub fn pattern(current: f64, description: impl Into<String>) -> Self {
        Self {
            current_value: current,
            baseline_mean: None,
            baseline_std: None,
            z_score: None,
            threshold: None,
            description: description.into(),
        }
    }
}

/// A detected anomaly, immutable once created
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Anomaly {
    pub node_id: String,
    pub kind: String,
    pub severity: Severity,
    pub detected_at: i64,
    pub evidence: AnomalyEvidence,
}

/// How a mirror shadows its primary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MirrorType {
    Active,
    Passive,
    Backup,
}

/// Directed mirror edge: `primary_id` is shadowed by `mirror_id`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MirrorRelation {
    pub primary_id: String,
    pub mirror_id: String,
    pub mirror_type: MirrorType,
    /// Lower value is preferred when selecting a takeover candidate
    pub priority: u32,
    pub created_at: i64,
}

/// Lifecycle state of a healing process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealingStatus {
    InProgress,
    Completed,
    Failed,
}

/// Tracked lifecycle of one mirror takeover attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealingProcess {
    pub healing_id: String,
    pub failed_node: String,
    pub healing_node: String,
    pub status: HealingStatus,
    pub started_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completion_details: Option<String>,
    /// Mirrors already tried for this failure, in order
    #[serde(default)]
    pub attempted_mirrors: Vec<String>,
}

/// Lifecycle state of a remediation attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemediationStatus {
    Initiated,
    Completed,
    Failed,
}

/// One triggered remediation, retried in place up to a bounded maximum
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemediationRecord {
    pub id: String,
    pub node_id: String,
    pub strategy: String,
    pub status: RemediationStatus,
    pub retries: u32,
    pub started_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Terminal record signalling that automated recovery failed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Escalation {
    pub remediation_id: String,
    pub node_id: String,
    pub strategy: String,
    pub reason: String,
    pub timestamp: i64,
}

/// Security incident recorded alongside immediate isolation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityIncident {
    pub node_id: String,
    pub threat_kind: String,
    pub severity: Severity,
    pub timestamp: i64,
    pub details: String,
}

/// Health issue registered against a node, feeding the coordinator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthIssue {
    pub node_id: String,
    pub kind: String,
    pub severity: Severity,
    pub details: String,
    pub reported_at: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_sample_missing_fields_default_to_zero() {
        let sample: MetricSample =
            serde_json::from_str(r#"{"node_id":"node-1","cpu_percent":42.5}"#).unwrap();

        assert_eq!(sample.node_id, "node-1");
        assert_eq!(sample.cpu_percent, 42.5);
        assert_eq!(sample.memory_percent, 0.0);
        assert_eq!(sample.disk_percent, 0.0);
        assert_eq!(sample.network_speed_mbps, 0.0);
        assert!(sample.extra.is_empty());
    }

    #[test]
    fn test_node_status_serde_snake_case() {
        let json = serde_json::to_string(&NodeStatus::ActiveMirror).unwrap();
        assert_eq!(json, r#""active_mirror""#);

        let status: NodeStatus = serde_json::from_str(r#""isolated""#).unwrap();
        assert_eq!(status, NodeStatus::Isolated);
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Critical > Severity::Warning);
        assert!(Severity::Warning > Severity::Info);
    }
}
