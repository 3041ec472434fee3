//! Guardian engine: message dispatch and background loops
//!
//! Wires the registry, detector, fabric, remediation engine, and mirror
//! coordinator behind a single message entry point. Every inbound message
//! passes credential verification before any state is touched. Slow paths
//! (remediation with its grace periods, healing) run as spawned tasks so
//! ingestion never blocks on them.

use crate::advisor::HealthAdvisor;
use crate::auth::CredentialVerifier;
use crate::coordinator::MirrorCoordinator;
use crate::detector::AnomalyDetector;
use crate::error::{GuardianError, Result};
use crate::fabric::ConnectionFabric;
use crate::models::{Anomaly, HealthIssue, MetricSample};
use crate::observability::{GuardianMetrics, StructuredLogger};
use crate::persistence::Persistence;
use crate::protocol::{InboundMessage, OutboundMessage};
use crate::registry::NodeRegistry;
use crate::remediation::{RemediationEngine, RemediationOutcome};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::interval;
use tracing::{debug, info, warn};

/// Loop timings for the engine's background tasks
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Seconds of heartbeat silence before a node is swept offline
    pub heartbeat_timeout_secs: i64,
    pub sweep_interval: Duration,
    pub cleanup_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            heartbeat_timeout_secs: 300,
            sweep_interval: Duration::from_secs(60),
            cleanup_interval: Duration::from_secs(30),
        }
    }
}

pub struct Guardian {
    pub registry: Arc<NodeRegistry>,
    pub detector: Arc<AnomalyDetector>,
    pub fabric: Arc<ConnectionFabric>,
    pub remediation: Arc<RemediationEngine>,
    pub coordinator: Arc<MirrorCoordinator>,
    pub persistence: Persistence,
    verifier: Arc<dyn CredentialVerifier>,
    advisor: Option<Arc<dyn HealthAdvisor>>,
    metrics: GuardianMetrics,
    logger: StructuredLogger,
    config: EngineConfig,
}

impl Guardian {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        registry: Arc<NodeRegistry>,
        detector: Arc<AnomalyDetector>,
        fabric: Arc<ConnectionFabric>,
        remediation: Arc<RemediationEngine>,
        coordinator: Arc<MirrorCoordinator>,
        persistence: Persistence,
        verifier: Arc<dyn CredentialVerifier>,
        config: EngineConfig,
    ) -> Self {
        Self {
            registry,
            detector,
            fabric,
            remediation,
            coordinator,
            persistence,
            verifier,
            advisor: None,
            metrics: GuardianMetrics::new(),
            logger: StructuredLogger::new("guardian"),
            config,
        }
    }

    pub fn with_advisor(mut self, advisor: Arc<dyn HealthAdvisor>) -> Self {
        self.advisor = Some(advisor);
        self
    }

    /// Dispatch one verified inbound message
    ///
    /// Node-scoped messages must come from the node they claim to be about;
    /// a mismatch is treated as a bad credential and the message is dropped.
    pub async fn handle_message(
        self: &Arc<Self>,
        token: &str,
        message: InboundMessage,
    ) -> Result<()> {
        let identity = self.verifier.verify(token)?;

        match message {
            InboundMessage::Register { node } => {
                if node.node_id != identity.node_id {
                    warn!(claimed = %node.node_id, verified = %identity.node_id,
                        "Registration identity mismatch");
                    return Err(GuardianError::InvalidCredential);
                }
                let node_id = self.registry.register(node)?;
                let registered = self.registry.get(&node_id)?;
                self.persistence.record_node(&registered).await;
                self.update_fleet_gauges();
                self.fabric
                    .broadcast_to_observers(OutboundMessage::observer(
                        "node_registered",
                        &registered,
                    ))
                    .await;
                Ok(())
            }
            InboundMessage::Heartbeat { node_id, metrics } => {
                if node_id != identity.node_id {
                    return Err(GuardianError::InvalidCredential);
                }
                self.registry.heartbeat(&node_id, metrics.clone());
                if let Some(sample) = metrics {
                    self.process_sample(sample).await;
                }
                Ok(())
            }
            InboundMessage::MetricSample { sample } => {
                if sample.node_id != identity.node_id {
                    return Err(GuardianError::InvalidCredential);
                }
                self.registry.heartbeat(&sample.node_id, Some(sample.clone()));
                self.process_sample(sample).await;
                Ok(())
            }
            InboundMessage::HealthIssue {
                node_id,
                kind,
                severity,
                details,
            } => {
                let issue = HealthIssue {
                    node_id,
                    kind,
                    severity,
                    details,
                    reported_at: chrono::Utc::now().timestamp(),
                };
                self.coordinator.register_health_issue(&issue).await;
                Ok(())
            }
            InboundMessage::HealingComplete {
                healing_id,
                success,
                details,
            } => {
                self.coordinator
                    .complete_healing(&healing_id, success, &details)
                    .await?;
                self.metrics
                    .set_active_healings(self.coordinator.active_healing_count() as i64);
                Ok(())
            }
        }
    }

    /// Run detection and remediation for one sample
    async fn process_sample(self: &Arc<Self>, sample: MetricSample) {
        self.persistence.record_metric(&sample).await;

        for anomaly in self.detector.analyze(&sample) {
            self.dispatch_anomaly(anomaly).await;
        }

        // Saturated metrics bypass detector history entirely.
        for strategy in RemediationEngine::direct_triggers(&sample) {
            let engine = self.clone();
            let node_id = sample.node_id.clone();
            tokio::spawn(async move {
                engine.metrics.inc_remediations_started(strategy.as_str());
                match engine.remediation.remediate(&node_id, strategy).await {
                    Ok(_) => engine.metrics.inc_remediations_completed(strategy.as_str()),
                    Err(GuardianError::HealingInProgress(_))
                    | Err(GuardianError::NodeUnavailable(_)) => {}
                    Err(_) => {
                        engine.metrics.inc_remediations_failed(strategy.as_str());
                        engine.metrics.inc_escalations(strategy.as_str());
                    }
                }
            });
        }

        if let Some(advisor) = &self.advisor {
            let recent = [sample.clone()];
            if let crate::advisor::Assessment::Degrading(reason) =
                advisor.assess(&sample.node_id, &recent)
            {
                debug!(node_id = %sample.node_id, reason = %reason, "Advisory degradation note");
            }
        }
    }

    /// Record, announce, and remediate one anomaly
    async fn dispatch_anomaly(self: &Arc<Self>, anomaly: Anomaly) {
        self.metrics
            .inc_anomalies_detected(&anomaly.kind, &anomaly.severity.to_string());
        self.logger.log_anomaly(
            &anomaly.node_id,
            &anomaly.kind,
            &anomaly.severity.to_string(),
            &anomaly.evidence.description,
        );
        self.persistence.record_anomaly(&anomaly).await;
        self.fabric
            .broadcast_to_observers(OutboundMessage::observer("anomaly_detected", &anomaly))
            .await;

        let engine = self.clone();
        tokio::spawn(async move {
            match engine.remediation.handle_anomaly(&anomaly).await {
                RemediationOutcome::Remediated { .. } => {}
                // In-place recovery is exhausted; fall through to takeover.
                RemediationOutcome::Escalated { .. } => {
                    if let Err(e) = engine.coordinator.initiate_healing(&anomaly.node_id).await {
                        debug!(node_id = %anomaly.node_id, error = %e,
                            "No healing after escalation");
                    }
                }
                RemediationOutcome::Isolated => {
                    engine.metrics.inc_nodes_isolated(&anomaly.kind);
                    engine.logger.log_isolation(&anomaly.node_id, &anomaly.kind);
                }
                RemediationOutcome::DelegatedToHealing => {
                    if let Err(e) = engine.coordinator.initiate_healing(&anomaly.node_id).await {
                        warn!(node_id = %anomaly.node_id, error = %e, "Healing not started");
                    }
                }
                // A node that went offline mid-remediation is picked up by
                // the heartbeat sweep.
                RemediationOutcome::Cancelled
                | RemediationOutcome::NoStrategy
                | RemediationOutcome::AlreadyInFlight => {}
            }
        });
    }

    /// Periodic liveness sweep; swept nodes go to mirror healing
    pub async fn run_sweep_loop(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        info!(
            interval_secs = self.config.sweep_interval.as_secs(),
            timeout_secs = self.config.heartbeat_timeout_secs,
            "Starting heartbeat sweep loop"
        );
        let mut ticker = interval(self.config.sweep_interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let swept = self.registry.sweep_offline(self.config.heartbeat_timeout_secs);
                    self.update_fleet_gauges();

                    for node_id in swept {
                        self.fabric
                            .broadcast_to_observers(OutboundMessage::observer(
                                "node_offline",
                                &serde_json::json!({ "node_id": node_id }),
                            ))
                            .await;
                        match self.coordinator.initiate_healing(&node_id).await {
                            Ok(healing_id) => {
                                self.logger.log_healing(&healing_id, &node_id, "", "initiated");
                            }
                            Err(GuardianError::HealingInProgress(_)) => {}
                            Err(e) => {
                                warn!(node_id = %node_id, error = %e,
                                    "Offline node could not be healed");
                            }
                        }
                    }
                    self.metrics
                        .set_active_healings(self.coordinator.active_healing_count() as i64);
                }
                _ = shutdown.recv() => {
                    info!("Shutting down heartbeat sweep loop");
                    break;
                }
            }
        }
    }

    /// Periodic cleanup of stuck remediation guards
    pub async fn run_cleanup_loop(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        info!(
            interval_secs = self.config.cleanup_interval.as_secs(),
            "Starting remediation cleanup loop"
        );
        let mut ticker = interval(self.config.cleanup_interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.remediation.cleanup_stuck();
                }
                _ = shutdown.recv() => {
                    info!("Shutting down remediation cleanup loop");
                    break;
                }
            }
        }
    }

    fn update_fleet_gauges(&self) {
        self.metrics.set_fleet_size(
            self.registry.online_count() as i64,
            self.registry.len() as i64,
        );
    }
}
