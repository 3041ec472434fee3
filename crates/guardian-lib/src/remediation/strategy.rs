//! Remediation strategy catalog
//!
//! Each strategy names the corrective command sent to a node, the anomaly
//! kinds that select it, and the verification check run after the grace
//! period. Adding a strategy means adding a variant and its three mappings
//! here; the engine is strategy-agnostic.

use crate::models::MetricSample;
use serde_json::{json, Value};

/// Known remediation strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StrategyKey {
    CpuHigh,
    MemoryHigh,
    DiskHigh,
    NetworkAnomaly,
    AgentOffline,
    SecurityThreat,
}

impl StrategyKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKey::CpuHigh => "cpu_high",
            StrategyKey::MemoryHigh => "memory_high",
            StrategyKey::DiskHigh => "disk_high",
            StrategyKey::NetworkAnomaly => "network_anomaly",
            StrategyKey::AgentOffline => "agent_offline",
            StrategyKey::SecurityThreat => "security_threat",
        }
    }

    /// Map an anomaly kind to the strategy that handles it
    ///
    /// Matching is substring-based so statistical, rule, and pattern kinds
    /// for the same resource land on the same strategy. Security kinds are
    /// checked first since "ddos" contains no resource name.
    pub fn for_anomaly_kind(kind: &str) -> Option<StrategyKey> {
        if kind.contains("ddos") || kind.contains("security") || kind.contains("attack") {
            return Some(StrategyKey::SecurityThreat);
        }
        if kind.contains("offline") {
            return Some(StrategyKey::AgentOffline);
        }
        if kind.contains("cpu") {
            return Some(StrategyKey::CpuHigh);
        }
        if kind.contains("memory") {
            return Some(StrategyKey::MemoryHigh);
        }
        if kind.contains("disk") {
            return Some(StrategyKey::DiskHigh);
        }
        if kind.contains("network") {
            return Some(StrategyKey::NetworkAnomaly);
        }
        None
    }

    /// Corrective command and parameters sent to the node
    ///
    /// `AgentOffline` and `SecurityThreat` have no in-place command: the
    /// former is delegated to mirror healing and the latter isolates.
    pub fn command(&self) -> Option<(&'static str, Value)> {
        match self {
            StrategyKey::CpuHigh => Some((
                "kill_high_cpu_processes",
                json!({ "cpu_threshold": 50.0 }),
            )),
            StrategyKey::MemoryHigh => Some((
                "clear_memory",
                json!({ "actions": ["garbage_collection", "cache_clear"] }),
            )),
            StrategyKey::DiskHigh => Some((
                "cleanup_disk",
                json!({ "targets": ["temp_files", "logs", "cache"] }),
            )),
            StrategyKey::NetworkAnomaly => Some(("restart_network", json!({}))),
            StrategyKey::AgentOffline | StrategyKey::SecurityThreat => None,
        }
    }

    /// True if this strategy isolates the node instead of remediating it
    pub fn isolates(&self) -> bool {
        matches!(self, StrategyKey::SecurityThreat)
    }

    /// True if the strategy delegates to the mirror coordinator
    pub fn delegates_to_healing(&self) -> bool {
        matches!(self, StrategyKey::AgentOffline)
    }

    /// Check whether the latest sample shows the condition cleared
    pub fn verify(&self, sample: &MetricSample) -> bool {
        match self {
            StrategyKey::CpuHigh => sample.cpu_percent < 70.0,
            StrategyKey::MemoryHigh => sample.memory_percent < 55.0,
            StrategyKey::DiskHigh => sample.disk_percent < 85.0,
            StrategyKey::NetworkAnomaly => sample.network_speed_mbps < 20.0,
            // Verified by their own flows, not by a metrics probe.
            StrategyKey::AgentOffline | StrategyKey::SecurityThreat => true,
        }
    }
}

impl std::fmt::Display for StrategyKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anomaly_kind_routing() {
        assert_eq!(
            StrategyKey::for_anomaly_kind("cpu_statistical_anomaly"),
            Some(StrategyKey::CpuHigh)
        );
        assert_eq!(
            StrategyKey::for_anomaly_kind("high_cpu_usage"),
            Some(StrategyKey::CpuHigh)
        );
        assert_eq!(
            StrategyKey::for_anomaly_kind("memory_leak_detected"),
            Some(StrategyKey::MemoryHigh)
        );
        assert_eq!(
            StrategyKey::for_anomaly_kind("extreme_network_traffic"),
            Some(StrategyKey::NetworkAnomaly)
        );
        assert_eq!(
            StrategyKey::for_anomaly_kind("ddos_attempt_detected"),
            Some(StrategyKey::SecurityThreat)
        );
        assert_eq!(
            StrategyKey::for_anomaly_kind("agent_offline"),
            Some(StrategyKey::AgentOffline)
        );
        assert_eq!(StrategyKey::for_anomaly_kind("unknown_kind"), None);
    }

    #[test]
    fn test_cpu_bomb_routes_to_security_free_cpu_strategy() {
        // cpu_bomb contains "cpu" and none of the security markers.
        assert_eq!(
            StrategyKey::for_anomaly_kind("cpu_bomb_detected"),
            Some(StrategyKey::CpuHigh)
        );
    }

    #[test]
    fn test_commands_exist_for_in_place_strategies() {
        for key in [
            StrategyKey::CpuHigh,
            StrategyKey::MemoryHigh,
            StrategyKey::DiskHigh,
            StrategyKey::NetworkAnomaly,
        ] {
            assert!(key.command().is_some(), "{} has a command", key);
        }
        assert!(StrategyKey::AgentOffline.command().is_none());
        assert!(StrategyKey::SecurityThreat.command().is_none());
    }

    #[test]
    fn test_verification_thresholds() {
        let sample = MetricSample {
            node_id: "node-1".to_string(),
            timestamp: 0,
            cpu_percent: 40.0,
            memory_percent: 80.0,
            disk_percent: 50.0,
            network_speed_mbps: 5.0,
            extra: Default::default(),
        };

        assert!(StrategyKey::CpuHigh.verify(&sample));
        assert!(!StrategyKey::MemoryHigh.verify(&sample));
        assert!(StrategyKey::DiskHigh.verify(&sample));
        assert!(StrategyKey::NetworkAnomaly.verify(&sample));
    }
}
