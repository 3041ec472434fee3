//! Observability infrastructure for the guardian coordinator
//!
//! Provides:
//! - Prometheus metrics (fleet size, anomaly/remediation/healing counters)
//! - Structured JSON logging with tracing

use prometheus::{register_int_counter_vec, register_int_gauge, IntCounterVec, IntGauge};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<GuardianMetricsInner> = OnceLock::new();

/// Inner metrics structure that holds the actual Prometheus metrics
struct GuardianMetricsInner {
    nodes_online: IntGauge,
    nodes_total: IntGauge,
    active_healings: IntGauge,
    anomalies_detected: IntCounterVec,
    remediations_started: IntCounterVec,
    remediations_completed: IntCounterVec,
    remediations_failed: IntCounterVec,
    escalations: IntCounterVec,
    nodes_isolated: IntCounterVec,
    send_failures: IntCounterVec,
}

impl GuardianMetricsInner {
    fn new() -> Self {
        Self {
            nodes_online: register_int_gauge!(
                "guardian_nodes_online",
                "Number of nodes currently online"
            )
            .expect("Failed to register nodes_online"),

            nodes_total: register_int_gauge!(
                "guardian_nodes_total",
                "Number of nodes known to the registry"
            )
            .expect("Failed to register nodes_total"),

            active_healings: register_int_gauge!(
                "guardian_active_healings",
                "Number of healing processes currently in progress"
            )
            .expect("Failed to register active_healings"),

            anomalies_detected: register_int_counter_vec!(
                "guardian_anomalies_detected_total",
                "Total anomalies detected, by kind and severity",
                &["kind", "severity"]
            )
            .expect("Failed to register anomalies_detected"),

            remediations_started: register_int_counter_vec!(
                "guardian_remediations_started_total",
                "Total remediations initiated, by strategy",
                &["strategy"]
            )
            .expect("Failed to register remediations_started"),

            remediations_completed: register_int_counter_vec!(
                "guardian_remediations_completed_total",
                "Total remediations completed and verified, by strategy",
                &["strategy"]
            )
            .expect("Failed to register remediations_completed"),

            remediations_failed: register_int_counter_vec!(
                "guardian_remediations_failed_total",
                "Total remediations that exhausted retries, by strategy",
                &["strategy"]
            )
            .expect("Failed to register remediations_failed"),

            escalations: register_int_counter_vec!(
                "guardian_escalations_total",
                "Total escalations to operators, by strategy",
                &["strategy"]
            )
            .expect("Failed to register escalations"),

            nodes_isolated: register_int_counter_vec!(
                "guardian_nodes_isolated_total",
                "Total node isolations, by threat kind",
                &["threat_kind"]
            )
            .expect("Failed to register nodes_isolated"),

            send_failures: register_int_counter_vec!(
                "guardian_send_failures_total",
                "Total outbound message delivery failures, by target kind",
                &["target"]
            )
            .expect("Failed to register send_failures"),
        }
    }
}

/// Guardian metrics for Prometheus exposition
///
/// This is a lightweight handle to the global metrics instance.
/// Multiple clones share the same underlying metrics.
#[derive(Clone)]
pub struct GuardianMetrics {
    _private: (),
}

impl Default for GuardianMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl GuardianMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(GuardianMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &GuardianMetricsInner {
        GLOBAL_METRICS.get().expect("Metrics not initialized")
    }

    /// Update the fleet size gauges
    pub fn set_fleet_size(&self, online: i64, total: i64) {
        self.inner().nodes_online.set(online);
        self.inner().nodes_total.set(total);
    }

    /// Update the active healing gauge
    pub fn set_active_healings(&self, count: i64) {
        self.inner().active_healings.set(count);
    }

    /// Increment the anomaly counter
    pub fn inc_anomalies_detected(&self, kind: &str, severity: &str) {
        self.inner()
            .anomalies_detected
            .with_label_values(&[kind, severity])
            .inc();
    }

    /// Increment the remediations started counter
    pub fn inc_remediations_started(&self, strategy: &str) {
        self.inner()
            .remediations_started
            .with_label_values(&[strategy])
            .inc();
    }

    /// Increment the remediations completed counter
    pub fn inc_remediations_completed(&self, strategy: &str) {
        self.inner()
            .remediations_completed
            .with_label_values(&[strategy])
            .inc();
    }

    /// Increment the remediations failed counter
    pub fn inc_remediations_failed(&self, strategy: &str) {
        self.inner()
            .remediations_failed
            .with_label_values(&[strategy])
            .inc();
    }

    /// Increment the escalation counter
    pub fn inc_escalations(&self, strategy: &str) {
        self.inner().escalations.with_label_values(&[strategy]).inc();
    }

    /// Increment the isolation counter
    pub fn inc_nodes_isolated(&self, threat_kind: &str) {
        self.inner()
            .nodes_isolated
            .with_label_values(&[threat_kind])
            .inc();
    }

    /// Increment the send failure counter
    pub fn inc_send_failures(&self, target: &str) {
        self.inner().send_failures.with_label_values(&[target]).inc();
    }
}

/// Structured logger for guardian events
///
/// Provides consistent JSON-formatted logging for anomalies, remediations,
/// healings, and other significant events.
#[derive(Clone)]
pub struct StructuredLogger {
    guardian_id: String,
}

impl StructuredLogger {
    pub fn new(guardian_id: impl Into<String>) -> Self {
        Self {
            guardian_id: guardian_id.into(),
        }
    }

    /// Log an anomaly detection event
    pub fn log_anomaly(&self, node_id: &str, kind: &str, severity: &str, details: &str) {
        match severity {
            "critical" => {
                warn!(
                    event = "anomaly_detected",
                    guardian = %self.guardian_id,
                    node_id = %node_id,
                    kind = %kind,
                    severity = %severity,
                    details = %details,
                    "Critical anomaly detected"
                );
            }
            _ => {
                info!(
                    event = "anomaly_detected",
                    guardian = %self.guardian_id,
                    node_id = %node_id,
                    kind = %kind,
                    severity = %severity,
                    details = %details,
                    "Anomaly detected"
                );
            }
        }
    }

    /// Log a remediation lifecycle event
    pub fn log_remediation(
        &self,
        remediation_id: &str,
        node_id: &str,
        strategy: &str,
        status: &str,
        retries: u32,
    ) {
        info!(
            event = "remediation",
            guardian = %self.guardian_id,
            remediation_id = %remediation_id,
            node_id = %node_id,
            strategy = %strategy,
            status = %status,
            retries = retries,
            "Remediation state changed"
        );
    }

    /// Log an escalation to operators
    pub fn log_escalation(&self, remediation_id: &str, node_id: &str, strategy: &str, reason: &str) {
        warn!(
            event = "escalation_required",
            guardian = %self.guardian_id,
            remediation_id = %remediation_id,
            node_id = %node_id,
            strategy = %strategy,
            reason = %reason,
            "Automated recovery exhausted, operator attention required"
        );
    }

    /// Log a healing lifecycle event
    pub fn log_healing(&self, healing_id: &str, failed_node: &str, healing_node: &str, status: &str) {
        info!(
            event = "healing",
            guardian = %self.guardian_id,
            healing_id = %healing_id,
            failed_node = %failed_node,
            healing_node = %healing_node,
            status = %status,
            "Healing state changed"
        );
    }

    /// Log a node isolation
    pub fn log_isolation(&self, node_id: &str, threat_kind: &str) {
        warn!(
            event = "node_isolated",
            guardian = %self.guardian_id,
            node_id = %node_id,
            threat_kind = %threat_kind,
            "Node isolated from the fleet"
        );
    }

    /// Log guardian startup
    pub fn log_startup(&self, version: &str) {
        info!(
            event = "guardian_started",
            guardian = %self.guardian_id,
            version = %version,
            "Guardian coordinator started"
        );
    }

    /// Log guardian shutdown
    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "guardian_shutdown",
            guardian = %self.guardian_id,
            reason = %reason,
            "Guardian coordinator shutting down"
        );
    }
}
