//! Remediation engine: bounded in-place recovery with escalation
//!
//! An anomaly selects a strategy; the engine sends the corrective command,
//! waits out a grace period, and probes the node's latest metrics to verify
//! recovery. Failed attempts retry in place with linear backoff. When
//! retries are exhausted the engine records exactly one escalation and
//! stops; it never retries past the bound.

mod retry;
mod strategy;

pub use retry::{InstantSleeper, RetryPolicy, Sleeper, TokioSleeper};
pub use strategy::StrategyKey;

use crate::error::{GuardianError, Result};
use crate::fabric::ConnectionFabric;
use crate::models::{
    Anomaly, Escalation, MetricSample, NodeStatus, RemediationRecord, RemediationStatus,
    SecurityIncident, Severity,
};
use crate::persistence::Persistence;
use crate::protocol::OutboundMessage;
use crate::registry::NodeRegistry;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Direct-trigger level: a metric at or above this remediates immediately,
/// bypassing the detector
const DIRECT_TRIGGER_PERCENT: f64 = 95.0;

/// In-flight guards older than this are presumed stuck and dropped
const STUCK_GUARD_MAX_AGE: Duration = Duration::from_secs(600);

/// Reads a node's freshest metrics for post-remediation verification
#[async_trait]
pub trait VerificationProbe: Send + Sync {
    async fn latest_sample(&self, node_id: &str) -> Option<MetricSample>;
}

/// Default probe backed by the registry's heartbeat-carried metrics
pub struct RegistryProbe {
    registry: Arc<NodeRegistry>,
}

impl RegistryProbe {
    pub fn new(registry: Arc<NodeRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl VerificationProbe for RegistryProbe {
    async fn latest_sample(&self, node_id: &str) -> Option<MetricSample> {
        self.registry
            .get(node_id)
            .ok()
            .and_then(|node| node.latest_metrics)
    }
}

/// Outcome of routing one anomaly
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemediationOutcome {
    /// In-place remediation completed and verified
    Remediated { remediation_id: String },
    /// Retries exhausted; an escalation was recorded
    Escalated { remediation_id: String },
    /// The node left the serving set mid-remediation; the offline path owns it
    Cancelled,
    /// The node was isolated from the fleet
    Isolated,
    /// The anomaly maps to mirror healing, owned by the coordinator
    DelegatedToHealing,
    /// No strategy covers this anomaly kind
    NoStrategy,
    /// The same remediation is already running
    AlreadyInFlight,
}

pub struct RemediationEngine {
    registry: Arc<NodeRegistry>,
    fabric: Arc<ConnectionFabric>,
    persistence: Persistence,
    policy: RetryPolicy,
    probe: Arc<dyn VerificationProbe>,
    sleeper: Arc<dyn Sleeper>,
    /// (node_id, strategy) -> start time; one remediation per pair at a time
    in_flight: DashMap<(String, String), Instant>,
}

impl RemediationEngine {
    pub fn new(
        registry: Arc<NodeRegistry>,
        fabric: Arc<ConnectionFabric>,
        persistence: Persistence,
        policy: RetryPolicy,
    ) -> Self {
        let probe = Arc::new(RegistryProbe::new(registry.clone()));
        Self::with_parts(registry, fabric, persistence, policy, probe, Arc::new(TokioSleeper))
    }

    /// Constructor with injectable probe and sleeper, used by tests
    pub fn with_parts(
        registry: Arc<NodeRegistry>,
        fabric: Arc<ConnectionFabric>,
        persistence: Persistence,
        policy: RetryPolicy,
        probe: Arc<dyn VerificationProbe>,
        sleeper: Arc<dyn Sleeper>,
    ) -> Self {
        Self {
            registry,
            fabric,
            persistence,
            policy,
            probe,
            sleeper,
            in_flight: DashMap::new(),
        }
    }

    /// Route a detected anomaly to its strategy
    pub async fn handle_anomaly(&self, anomaly: &Anomaly) -> RemediationOutcome {
        let Some(strategy) = StrategyKey::for_anomaly_kind(&anomaly.kind) else {
            warn!(node_id = %anomaly.node_id, kind = %anomaly.kind,
                "No remediation strategy for anomaly kind");
            return RemediationOutcome::NoStrategy;
        };

        if strategy.isolates() {
            self.isolate_node(&anomaly.node_id, &anomaly.kind, &anomaly.evidence.description)
                .await;
            return RemediationOutcome::Isolated;
        }
        if strategy.delegates_to_healing() {
            return RemediationOutcome::DelegatedToHealing;
        }

        match self.remediate(&anomaly.node_id, strategy).await {
            Ok(remediation_id) => RemediationOutcome::Remediated { remediation_id },
            Err(GuardianError::RetriesExhausted { remediation_id, .. }) => {
                RemediationOutcome::Escalated { remediation_id }
            }
            Err(GuardianError::NodeUnavailable(_)) => RemediationOutcome::Cancelled,
            Err(_) => RemediationOutcome::AlreadyInFlight,
        }
    }

    /// Strategies a raw sample triggers directly, without detector history
    pub fn direct_triggers(sample: &MetricSample) -> Vec<StrategyKey> {
        let mut triggers = Vec::new();
        if sample.cpu_percent >= DIRECT_TRIGGER_PERCENT {
            triggers.push(StrategyKey::CpuHigh);
        }
        if sample.memory_percent >= DIRECT_TRIGGER_PERCENT {
            triggers.push(StrategyKey::MemoryHigh);
        }
        if sample.disk_percent >= DIRECT_TRIGGER_PERCENT {
            triggers.push(StrategyKey::DiskHigh);
        }
        triggers
    }

    /// Run one remediation to completion: command, verify, retry, escalate
    ///
    /// Returns the remediation id on verified success. Exhausted retries
    /// return `RetriesExhausted` after recording a single escalation.
    pub async fn remediate(&self, node_id: &str, strategy: StrategyKey) -> Result<String> {
        let guard_key = (node_id.to_string(), strategy.as_str().to_string());
        if self.in_flight.contains_key(&guard_key) {
            return Err(GuardianError::HealingInProgress(node_id.to_string()));
        }
        self.in_flight.insert(guard_key.clone(), Instant::now());

        let result = self.run_attempts(node_id, strategy).await;
        self.in_flight.remove(&guard_key);
        result
    }

    async fn run_attempts(&self, node_id: &str, strategy: StrategyKey) -> Result<String> {
        let started_at = chrono::Utc::now().timestamp();
        let remediation_id = format!("{}_{}_{}", node_id, strategy, started_at);

        let mut record = RemediationRecord {
            id: remediation_id.clone(),
            node_id: node_id.to_string(),
            strategy: strategy.as_str().to_string(),
            status: RemediationStatus::Initiated,
            retries: 0,
            started_at,
            completed_at: None,
            error: None,
        };
        self.record_transition(&record).await;
        info!(remediation_id = %remediation_id, node_id = %node_id, strategy = %strategy,
            "Remediation initiated");

        let max_attempts = self.policy.max_retries + 1;
        let mut last_error = String::new();

        for attempt in 0..max_attempts {
            if attempt > 0 {
                record.retries = attempt;
                self.record_transition(&record).await;
                self.sleeper.sleep(self.policy.backoff_for(attempt)).await;
                info!(remediation_id = %remediation_id, attempt, "Retrying remediation");
            }

            if !self.node_serving(node_id) {
                return self.cancel_offline(&mut record).await;
            }

            match self.attempt_once(node_id, strategy).await {
                Ok(()) => {
                    record.status = RemediationStatus::Completed;
                    record.completed_at = Some(chrono::Utc::now().timestamp());
                    self.record_transition(&record).await;
                    info!(remediation_id = %remediation_id, retries = record.retries,
                        "Remediation completed");
                    return Ok(remediation_id);
                }
                Err(GuardianError::NodeUnavailable(_)) => {
                    return self.cancel_offline(&mut record).await;
                }
                Err(e) => {
                    last_error = e.to_string();
                    warn!(remediation_id = %remediation_id, attempt, error = %last_error,
                        "Remediation attempt failed");
                }
            }
        }

        record.status = RemediationStatus::Failed;
        record.completed_at = Some(chrono::Utc::now().timestamp());
        record.error = Some(last_error.clone());
        self.record_transition(&record).await;

        self.escalate(&remediation_id, node_id, strategy, &last_error)
            .await;

        Err(GuardianError::RetriesExhausted {
            remediation_id,
            node_id: node_id.to_string(),
            strategy: strategy.as_str().to_string(),
            attempts: max_attempts,
        })
    }

    /// True while the node is still something worth remediating in place
    fn node_serving(&self, node_id: &str) -> bool {
        self.registry
            .get(node_id)
            .map(|node| matches!(node.status, NodeStatus::Online | NodeStatus::ActiveMirror))
            .unwrap_or(false)
    }

    /// The node left the serving set mid-remediation. The record is closed
    /// out as failed without an escalation: the offline sweep and mirror
    /// healing own the node from here.
    async fn cancel_offline(&self, record: &mut RemediationRecord) -> Result<String> {
        record.status = RemediationStatus::Failed;
        record.completed_at = Some(chrono::Utc::now().timestamp());
        record.error = Some("node is no longer online".to_string());
        self.record_transition(record).await;

        warn!(remediation_id = %record.id, node_id = %record.node_id,
            "Remediation cancelled, node left the serving set");
        Err(GuardianError::NodeUnavailable(record.node_id.clone()))
    }

    /// One command/verify round
    ///
    /// Verification only trusts samples taken after the command went out;
    /// a node that stops reporting cannot pass on its pre-failure metrics.
    async fn attempt_once(&self, node_id: &str, strategy: StrategyKey) -> Result<()> {
        let (action, params) = strategy
            .command()
            .ok_or_else(|| GuardianError::NotFound(format!("no command for {}", strategy)))?;

        let issued_at = chrono::Utc::now().timestamp();
        let delivered = self
            .fabric
            .send(
                node_id,
                OutboundMessage::Command {
                    node_id: node_id.to_string(),
                    action: action.to_string(),
                    params,
                },
            )
            .await;
        if !delivered {
            return Err(GuardianError::ChannelUnavailable(node_id.to_string()));
        }

        self.sleeper.sleep(self.policy.verification_grace).await;

        // A heartbeat timeout during the grace wait cancels the remediation.
        if !self.node_serving(node_id) {
            return Err(GuardianError::NodeUnavailable(node_id.to_string()));
        }

        let verified = self
            .probe
            .latest_sample(node_id)
            .await
            .filter(|sample| sample.timestamp >= issued_at)
            .map(|sample| strategy.verify(&sample))
            .unwrap_or(false);

        if verified {
            Ok(())
        } else {
            Err(GuardianError::VerificationFailed {
                node_id: node_id.to_string(),
                strategy: strategy.as_str().to_string(),
            })
        }
    }

    /// Persist a record transition and surface it to observers
    async fn record_transition(&self, record: &RemediationRecord) {
        self.persistence.record_remediation(record).await;
        self.fabric
            .broadcast_to_observers(OutboundMessage::observer("remediation_update", record))
            .await;
    }

    /// Record the escalation and tell observers; called exactly once per
    /// exhausted remediation
    async fn escalate(
        &self,
        remediation_id: &str,
        node_id: &str,
        strategy: StrategyKey,
        reason: &str,
    ) {
        let escalation = Escalation {
            remediation_id: remediation_id.to_string(),
            node_id: node_id.to_string(),
            strategy: strategy.as_str().to_string(),
            reason: reason.to_string(),
            timestamp: chrono::Utc::now().timestamp(),
        };
        self.persistence.record_escalation(&escalation).await;

        error!(remediation_id = %remediation_id, node_id = %node_id, strategy = %strategy,
            "Remediation escalated to operators");

        self.fabric
            .broadcast_to_observers(OutboundMessage::observer("escalation_required", &escalation))
            .await;
    }

    /// Quarantine a node after a security-class anomaly
    ///
    /// Isolation is permanent until an operator reinstates the node; a
    /// heartbeat never clears it.
    pub async fn isolate_node(&self, node_id: &str, threat_kind: &str, details: &str) {
        if let Err(e) = self.registry.set_status(node_id, NodeStatus::Isolated) {
            warn!(node_id = %node_id, error = %e, "Cannot isolate unknown node");
            return;
        }

        let incident = SecurityIncident {
            node_id: node_id.to_string(),
            threat_kind: threat_kind.to_string(),
            severity: Severity::Critical,
            timestamp: chrono::Utc::now().timestamp(),
            details: details.to_string(),
        };
        self.persistence.record_security_incident(&incident).await;

        // Tell the node to drop non-control traffic, then warn the rest of
        // the fleet. The isolated node is excluded from the fan-out.
        self.fabric
            .send(
                node_id,
                OutboundMessage::Command {
                    node_id: node_id.to_string(),
                    action: "isolate".to_string(),
                    params: serde_json::json!({ "reason": threat_kind }),
                },
            )
            .await;
        self.fabric
            .broadcast_to_nodes(
                OutboundMessage::observer("agent_isolated", &incident),
                Some(node_id),
            )
            .await;
        self.fabric
            .broadcast_to_observers(OutboundMessage::observer("agent_isolated", &incident))
            .await;

        error!(node_id = %node_id, threat_kind = %threat_kind, "Node isolated");
    }

    /// Drop in-flight guards that have been held implausibly long
    ///
    /// Guards normally clear when their remediation finishes; a guard past
    /// the max age means the task died without cleanup.
    pub fn cleanup_stuck(&self) -> usize {
        self.cleanup_older_than(STUCK_GUARD_MAX_AGE)
    }

    fn cleanup_older_than(&self, max_age: Duration) -> usize {
        let before = self.in_flight.len();
        self.in_flight
            .retain(|_, started| started.elapsed() < max_age);
        let dropped = before - self.in_flight.len();
        if dropped > 0 {
            warn!(dropped, "Dropped stuck remediation guards");
        }
        dropped
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AnomalyEvidence, NodeInfo, NodeRole};
    use crate::persistence::InMemoryDocumentStore;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Probe returning a scripted sequence of samples
    struct ScriptedProbe {
        samples: Mutex<VecDeque<Option<MetricSample>>>,
    }

    impl ScriptedProbe {
        fn new(samples: Vec<Option<MetricSample>>) -> Self {
            Self {
                samples: Mutex::new(samples.into()),
            }
        }
    }

    #[async_trait]
    impl VerificationProbe for ScriptedProbe {
        async fn latest_sample(&self, _node_id: &str) -> Option<MetricSample> {
            self.samples.lock().unwrap().pop_front().flatten()
        }
    }

    /// Sample timestamped slightly ahead of now, as a node reporting after
    /// the corrective command went out.
    fn sample(cpu: f64) -> MetricSample {
        MetricSample {
            node_id: "node-1".to_string(),
            timestamp: chrono::Utc::now().timestamp() + 5,
            cpu_percent: cpu,
            memory_percent: 0.0,
            disk_percent: 0.0,
            network_speed_mbps: 0.0,
            extra: Default::default(),
        }
    }

    struct Fixture {
        engine: RemediationEngine,
        fabric: Arc<ConnectionFabric>,
        registry: Arc<NodeRegistry>,
        documents: Arc<InMemoryDocumentStore>,
    }

    fn fixture(probe: ScriptedProbe) -> Fixture {
        let registry = Arc::new(NodeRegistry::new());
        registry
            .register(NodeInfo {
                node_id: "node-1".to_string(),
                role: NodeRole::Agent,
                hostname: "host-1".to_string(),
                address: "10.0.0.1:3002".to_string(),
                capabilities: vec![],
            })
            .unwrap();

        let fabric = Arc::new(ConnectionFabric::new());
        let documents = Arc::new(InMemoryDocumentStore::new());
        let persistence = Persistence::new(Some(documents.clone()), None);

        let engine = RemediationEngine::with_parts(
            registry.clone(),
            fabric.clone(),
            persistence,
            RetryPolicy::default(),
            Arc::new(probe),
            Arc::new(InstantSleeper::default()),
        );

        Fixture {
            engine,
            fabric,
            registry,
            documents,
        }
    }

    /// Drains a node's outbound channel in the background so sends succeed.
    fn drain(fabric: &ConnectionFabric, node_id: &str) {
        let mut rx = fabric.connect(node_id);
        tokio::spawn(async move { while rx.recv().await.is_some() {} });
    }

    #[tokio::test]
    async fn test_fail_twice_then_succeed_records_retries() {
        let f = fixture(ScriptedProbe::new(vec![
            Some(sample(90.0)),
            Some(sample(88.0)),
            Some(sample(30.0)),
        ]));
        drain(&f.fabric, "node-1");

        let id = f.engine.remediate("node-1", StrategyKey::CpuHigh).await.unwrap();
        assert!(id.starts_with("node-1_cpu_high_"));

        // Every state change lands in the store: initiation, each retry
        // re-entry, and the terminal state.
        let remediations = f.documents.remediations.lock().unwrap();
        let transitions: Vec<_> = remediations
            .iter()
            .map(|r| (r.status, r.retries))
            .collect();
        assert_eq!(
            transitions,
            vec![
                (RemediationStatus::Initiated, 0),
                (RemediationStatus::Initiated, 1),
                (RemediationStatus::Initiated, 2),
                (RemediationStatus::Completed, 2),
            ]
        );

        assert!(f.documents.escalations.lock().unwrap().is_empty());
        assert_eq!(f.engine.in_flight_count(), 0);
    }

    #[tokio::test]
    async fn test_exhausted_retries_escalate_exactly_once() {
        // Four attempts (initial + 3 retries), all unverified.
        let f = fixture(ScriptedProbe::new(vec![Some(sample(90.0)); 4]));
        drain(&f.fabric, "node-1");

        let result = f.engine.remediate("node-1", StrategyKey::CpuHigh).await;
        assert!(matches!(
            result,
            Err(GuardianError::RetriesExhausted { attempts: 4, .. })
        ));

        let escalations = f.documents.escalations.lock().unwrap();
        assert_eq!(escalations.len(), 1);
        assert_eq!(escalations[0].node_id, "node-1");
        assert_eq!(escalations[0].strategy, "cpu_high");

        let remediations = f.documents.remediations.lock().unwrap();
        assert_eq!(remediations.last().unwrap().status, RemediationStatus::Failed);
    }

    #[tokio::test]
    async fn test_escalation_broadcast_to_observers() {
        let f = fixture(ScriptedProbe::new(vec![Some(sample(90.0)); 4]));
        drain(&f.fabric, "node-1");
        let mut observer_rx = f.fabric.connect_observer("dash-1");

        let _ = f.engine.remediate("node-1", StrategyKey::CpuHigh).await;

        // Observers see the state transitions and then the escalation.
        let mut kinds = Vec::new();
        while let Ok(message) = observer_rx.try_recv() {
            if let OutboundMessage::ObserverEvent { kind, .. } = message {
                kinds.push(kind);
            }
        }
        assert!(kinds.contains(&"remediation_update".to_string()));
        assert_eq!(
            kinds.iter().filter(|k| *k == "escalation_required").count(),
            1
        );
    }

    #[tokio::test]
    async fn test_offline_node_cancels_remediation() {
        // The probe would happily verify, but the node is gone.
        let f = fixture(ScriptedProbe::new(vec![Some(sample(30.0)); 4]));
        drain(&f.fabric, "node-1");
        f.registry.set_status("node-1", NodeStatus::Offline).unwrap();

        let result = f.engine.remediate("node-1", StrategyKey::CpuHigh).await;
        assert!(matches!(result, Err(GuardianError::NodeUnavailable(_))));

        // Closed out as failed without retries or an escalation; the
        // offline sweep owns the node now.
        let remediations = f.documents.remediations.lock().unwrap();
        assert_eq!(remediations.last().unwrap().status, RemediationStatus::Failed);
        assert!(f.documents.escalations.lock().unwrap().is_empty());
        assert_eq!(f.engine.in_flight_count(), 0);
    }

    #[tokio::test]
    async fn test_stale_probe_sample_does_not_verify() {
        // Samples that predate the command are pre-failure readings.
        let mut stale = sample(30.0);
        stale.timestamp = 0;
        let f = fixture(ScriptedProbe::new(vec![Some(stale); 4]));
        drain(&f.fabric, "node-1");

        let result = f.engine.remediate("node-1", StrategyKey::CpuHigh).await;
        assert!(matches!(
            result,
            Err(GuardianError::RetriesExhausted { attempts: 4, .. })
        ));
    }

    #[tokio::test]
    async fn test_escalated_outcome_carries_remediation_id() {
        let f = fixture(ScriptedProbe::new(vec![Some(sample(90.0)); 4]));
        drain(&f.fabric, "node-1");

        let anomaly = Anomaly {
            node_id: "node-1".to_string(),
            kind: "high_cpu_usage".to_string(),
            severity: Severity::Warning,
            detected_at: 0,
            evidence: AnomalyEvidence::threshold(90.0, 80.0, "cpu above threshold"),
        };

        match f.engine.handle_anomaly(&anomaly).await {
            RemediationOutcome::Escalated { remediation_id } => {
                assert!(remediation_id.starts_with("node-1_cpu_high_"));
                let escalations = f.documents.escalations.lock().unwrap();
                assert_eq!(escalations[0].remediation_id, remediation_id);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_probe_sample_counts_as_unverified() {
        let f = fixture(ScriptedProbe::new(vec![None; 4]));
        drain(&f.fabric, "node-1");

        let result = f.engine.remediate("node-1", StrategyKey::CpuHigh).await;
        assert!(result.is_err());
        assert_eq!(f.documents.escalations.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_ddos_anomaly_isolates_node() {
        let f = fixture(ScriptedProbe::new(vec![]));
        drain(&f.fabric, "node-1");
        let mut peer_rx = f.fabric.connect("node-2");

        let anomaly = Anomaly {
            node_id: "node-1".to_string(),
            kind: "ddos_attempt_detected".to_string(),
            severity: Severity::Critical,
            detected_at: 0,
            evidence: AnomalyEvidence::pattern(80.0, "traffic spike"),
        };

        let outcome = f.engine.handle_anomaly(&anomaly).await;
        assert_eq!(outcome, RemediationOutcome::Isolated);
        assert_eq!(
            f.registry.get("node-1").unwrap().status,
            NodeStatus::Isolated
        );
        assert_eq!(f.documents.incidents.lock().unwrap().len(), 1);

        // The rest of the fleet hears about the isolation.
        match peer_rx.recv().await.unwrap() {
            OutboundMessage::ObserverEvent { kind, .. } => assert_eq!(kind, "agent_isolated"),
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_offline_anomaly_delegates_to_healing() {
        let f = fixture(ScriptedProbe::new(vec![]));

        let anomaly = Anomaly {
            node_id: "node-1".to_string(),
            kind: "agent_offline".to_string(),
            severity: Severity::Critical,
            detected_at: 0,
            evidence: AnomalyEvidence::pattern(0.0, "missed heartbeats"),
        };

        // The takeover itself is the coordinator's job.
        assert_eq!(
            f.engine.handle_anomaly(&anomaly).await,
            RemediationOutcome::DelegatedToHealing
        );
    }

    #[tokio::test]
    async fn test_direct_triggers_at_ninety_five_percent() {
        let mut s = sample(95.0);
        s.memory_percent = 96.0;
        s.disk_percent = 10.0;

        let triggers = RemediationEngine::direct_triggers(&s);
        assert_eq!(triggers, vec![StrategyKey::CpuHigh, StrategyKey::MemoryHigh]);

        assert!(RemediationEngine::direct_triggers(&sample(94.9)).is_empty());
    }

    #[tokio::test]
    async fn test_in_flight_guard_rejects_duplicates() {
        let f = fixture(ScriptedProbe::new(vec![Some(sample(30.0))]));
        drain(&f.fabric, "node-1");

        f.engine
            .in_flight
            .insert(("node-1".to_string(), "cpu_high".to_string()), Instant::now());

        let result = f.engine.remediate("node-1", StrategyKey::CpuHigh).await;
        assert!(matches!(result, Err(GuardianError::HealingInProgress(_))));
    }

    #[tokio::test]
    async fn test_cleanup_drops_only_stale_guards() {
        let f = fixture(ScriptedProbe::new(vec![]));

        f.engine.in_flight.insert(
            ("node-1".to_string(), "cpu_high".to_string()),
            Instant::now(),
        );

        // Against a generous age the fresh guard survives; against a zero
        // age it is stale and dropped.
        assert_eq!(f.engine.cleanup_older_than(Duration::from_secs(3600)), 0);
        assert_eq!(f.engine.in_flight_count(), 1);
        assert_eq!(f.engine.cleanup_older_than(Duration::ZERO), 1);
        assert_eq!(f.engine.in_flight_count(), 0);
    }
}
