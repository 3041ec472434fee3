//! Wire message contract
//!
//! Messages arrive as loose JSON keyed by a string `type`; they are decoded
//! once at the boundary into these tagged enums and internal components never
//! touch untyped maps. The transport carrying them is out of scope.

use crate::models::{MetricSample, NodeInfo, NodeRole, Severity};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Messages a node (or operator tooling) sends to the guardian
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundMessage {
    Register {
        node: NodeInfo,
    },
    Heartbeat {
        node_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        metrics: Option<MetricSample>,
    },
    MetricSample {
        sample: MetricSample,
    },
    HealthIssue {
        node_id: String,
        kind: String,
        severity: Severity,
        details: String,
    },
    HealingComplete {
        healing_id: String,
        success: bool,
        #[serde(default)]
        details: String,
    },
}

/// Messages the guardian sends to nodes and observers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    /// Remediation or isolation command addressed to one node
    Command {
        node_id: String,
        action: String,
        #[serde(default)]
        params: Value,
    },
    /// Instructs a mirror to take over a failed primary
    Activation {
        node_id: String,
        role: NodeRole,
        failed_node: String,
        healing_id: String,
    },
    /// Notifies a (possibly still reachable) failed node of the takeover
    TakeoverNotice {
        node_id: String,
        healing_node: String,
        timestamp: i64,
    },
    /// Fan-out event for observer/dashboard clients
    ObserverEvent {
        kind: String,
        payload: Value,
    },
}

impl OutboundMessage {
    /// Build an observer event, tolerating unserializable payloads
    pub fn observer(kind: impl Into<String>, payload: &impl Serialize) -> Self {
        OutboundMessage::ObserverEvent {
            kind: kind.into(),
            payload: serde_json::to_value(payload).unwrap_or(Value::Null),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inbound_decodes_by_type_tag() {
        let json = r#"{"type":"heartbeat","node_id":"node-1"}"#;
        let msg: InboundMessage = serde_json::from_str(json).unwrap();

        match msg {
            InboundMessage::Heartbeat { node_id, metrics } => {
                assert_eq!(node_id, "node-1");
                assert!(metrics.is_none());
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_healing_complete_default_details() {
        let json = r#"{"type":"healing_complete","healing_id":"h-1","success":true}"#;
        let msg: InboundMessage = serde_json::from_str(json).unwrap();

        match msg {
            InboundMessage::HealingComplete {
                healing_id,
                success,
                details,
            } => {
                assert_eq!(healing_id, "h-1");
                assert!(success);
                assert!(details.is_empty());
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_outbound_command_round_trip() {
        let msg = OutboundMessage::Command {
            node_id: "node-1".to_string(),
            action: "kill_high_cpu_processes".to_string(),
            params: serde_json::json!({"threshold": 50}),
        };

        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains(r#""type":"command""#));

        let decoded: OutboundMessage = serde_json::from_str(&json).unwrap();
        match decoded {
            OutboundMessage::Command { action, .. } => {
                assert_eq!(action, "kill_high_cpu_processes");
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }
}
