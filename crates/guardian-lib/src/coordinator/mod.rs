//! Mirror coordinator: self-healing through standby takeover
//!
//! When a node fails, the coordinator activates its best available mirror
//! and tracks the healing process until the mirror confirms (or reports
//! failure, in which case the next candidate is tried). At most one healing
//! process per failed node is in progress at a time; activation is one-way
//! and a recovered primary returns only through an explicit reinstate.

mod topology;

pub use topology::MirrorTopology;

use crate::error::{GuardianError, Result};
use crate::fabric::ConnectionFabric;
use crate::models::{
    Escalation, HealingProcess, HealingStatus, HealthIssue, NodeRole, NodeStatus, Severity,
};
use crate::persistence::Persistence;
use crate::protocol::OutboundMessage;
use crate::registry::NodeRegistry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{error, info, warn};

pub struct MirrorCoordinator {
    registry: Arc<NodeRegistry>,
    fabric: Arc<ConnectionFabric>,
    persistence: Persistence,
    topology: MirrorTopology,
    /// All healing processes by healing id, terminal ones included
    processes: DashMap<String, HealingProcess>,
    /// failed_node -> healing_id for the one in-progress process
    in_progress: DashMap<String, String>,
    sequence: AtomicU64,
}

impl MirrorCoordinator {
    pub fn new(
        registry: Arc<NodeRegistry>,
        fabric: Arc<ConnectionFabric>,
        persistence: Persistence,
    ) -> Self {
        Self {
            registry,
            fabric,
            persistence,
            topology: MirrorTopology::new(),
            processes: DashMap::new(),
            in_progress: DashMap::new(),
            sequence: AtomicU64::new(0),
        }
    }

    /// Declare a mirror relationship and persist the edge
    pub async fn add_mirror(
        &self,
        primary_id: &str,
        mirror_id: &str,
        mirror_type: crate::models::MirrorType,
        priority: u32,
    ) -> Result<()> {
        let relation = self
            .topology
            .add_mirror(primary_id, mirror_id, mirror_type, priority)?;
        self.persistence.record_mirror_edge(&relation).await;
        Ok(())
    }

    /// Start healing a failed node by activating its best available mirror
    ///
    /// Returns the healing id. Errors with `HealingInProgress` if a process
    /// for this node is already running, and `NoMirrorAvailable` (after
    /// escalating) if no online untried mirror exists.
    pub async fn initiate_healing(&self, failed_node: &str) -> Result<String> {
        if self.in_progress.contains_key(failed_node) {
            return Err(GuardianError::HealingInProgress(failed_node.to_string()));
        }

        let healing_id = format!(
            "healing_{}_{}_{}",
            failed_node,
            chrono::Utc::now().timestamp(),
            self.sequence.fetch_add(1, Ordering::Relaxed)
        );

        // Claim the per-node slot before any await so two concurrent
        // triggers cannot both proceed.
        if self
            .in_progress
            .insert(failed_node.to_string(), healing_id.clone())
            .is_some()
        {
            return Err(GuardianError::HealingInProgress(failed_node.to_string()));
        }

        let Some(mirror_id) = self.next_candidate(failed_node, &[]) else {
            self.in_progress.remove(failed_node);
            self.escalate_unhealable(&healing_id, failed_node, "no online mirror available")
                .await;
            return Err(GuardianError::NoMirrorAvailable(failed_node.to_string()));
        };

        let process = HealingProcess {
            healing_id: healing_id.clone(),
            failed_node: failed_node.to_string(),
            healing_node: mirror_id.clone(),
            status: HealingStatus::InProgress,
            started_at: chrono::Utc::now().timestamp(),
            completed_at: None,
            completion_details: None,
            attempted_mirrors: vec![mirror_id.clone()],
        };
        self.processes.insert(healing_id.clone(), process.clone());

        info!(healing_id = %healing_id, failed_node = %failed_node, mirror = %mirror_id,
            "Healing initiated");
        self.activate_mirror(&process).await;

        Ok(healing_id)
    }

    /// Mirror's completion report for a healing process
    ///
    /// Success finishes the process. Failure tries the next candidate,
    /// bounded by the mirror set; when candidates run out the process is
    /// marked failed and escalated.
    pub async fn complete_healing(
        &self,
        healing_id: &str,
        success: bool,
        details: &str,
    ) -> Result<()> {
        let mut process = self
            .processes
            .get_mut(healing_id)
            .ok_or_else(|| GuardianError::NotFound(healing_id.to_string()))?;

        if process.status != HealingStatus::InProgress {
            // Duplicate or late report; the terminal state stands.
            warn!(healing_id = %healing_id, "Completion report for finished healing ignored");
            return Ok(());
        }

        if success {
            process.status = HealingStatus::Completed;
            process.completed_at = Some(chrono::Utc::now().timestamp());
            process.completion_details = Some(details.to_string());
            let snapshot = process.clone();
            drop(process);

            self.in_progress.remove(&snapshot.failed_node);
            info!(healing_id = %healing_id, healing_node = %snapshot.healing_node,
                "Healing completed");
            self.fabric
                .broadcast_to_observers(OutboundMessage::observer("healing_completed", &snapshot))
                .await;
            return Ok(());
        }

        warn!(healing_id = %healing_id, mirror = %process.healing_node, details,
            "Mirror reported healing failure");

        // The failed mirror steps back down before the next candidate.
        let failed_mirror = process.healing_node.clone();
        let attempted = process.attempted_mirrors.clone();
        let failed_node = process.failed_node.clone();

        match self.next_candidate(&failed_node, &attempted) {
            Some(next_mirror) => {
                process.healing_node = next_mirror.clone();
                process.attempted_mirrors.push(next_mirror.clone());
                let snapshot = process.clone();
                drop(process);

                let _ = self.registry.set_status(&failed_mirror, NodeStatus::Online);
                info!(healing_id = %healing_id, mirror = %next_mirror,
                    "Trying next mirror candidate");
                self.activate_mirror(&snapshot).await;
            }
            None => {
                process.status = HealingStatus::Failed;
                process.completed_at = Some(chrono::Utc::now().timestamp());
                process.completion_details = Some(details.to_string());
                drop(process);

                let _ = self.registry.set_status(&failed_mirror, NodeStatus::Online);
                self.in_progress.remove(&failed_node);
                self.escalate_unhealable(healing_id, &failed_node, "all mirror candidates failed")
                    .await;
            }
        }

        Ok(())
    }

    /// Record a node health issue and surface it to observers
    ///
    /// A critical issue requests healing for the node; lesser severities
    /// are informational.
    pub async fn register_health_issue(&self, issue: &HealthIssue) {
        self.persistence.record_health_issue(issue).await;
        self.fabric
            .broadcast_to_observers(OutboundMessage::observer("health_issue", issue))
            .await;

        if issue.severity == Severity::Critical {
            match self.initiate_healing(&issue.node_id).await {
                Ok(_) | Err(GuardianError::HealingInProgress(_)) => {}
                Err(e) => {
                    warn!(node_id = %issue.node_id, error = %e,
                        "Critical health issue could not start healing");
                }
            }
        }
    }

    /// Operator action returning an inactive or isolated node to service
    pub async fn reinstate(&self, node_id: &str) -> Result<()> {
        let node = self.registry.get(node_id)?;
        if !matches!(node.status, NodeStatus::Inactive | NodeStatus::Isolated) {
            return Ok(());
        }

        self.registry.set_status(node_id, NodeStatus::Online)?;
        info!(node_id = %node_id, previous = %node.status, "Node reinstated");
        self.fabric
            .broadcast_to_observers(OutboundMessage::observer(
                "node_reinstated",
                &serde_json::json!({ "node_id": node_id }),
            ))
            .await;
        Ok(())
    }

    pub fn get_process(&self, healing_id: &str) -> Option<HealingProcess> {
        self.processes.get(healing_id).map(|p| p.clone())
    }

    pub fn active_healing_count(&self) -> usize {
        self.in_progress.len()
    }

    pub fn mirrors_of(&self, primary_id: &str) -> Vec<crate::models::MirrorRelation> {
        self.topology.get_mirrors(primary_id)
    }

    /// Best online mirror not yet attempted, by topology priority
    fn next_candidate(&self, failed_node: &str, attempted: &[String]) -> Option<String> {
        self.topology
            .get_mirrors(failed_node)
            .into_iter()
            .map(|relation| relation.mirror_id)
            .find(|mirror_id| {
                !attempted.contains(mirror_id) && self.registry.is_online(mirror_id)
            })
    }

    /// Flip statuses and notify the parties of a takeover
    async fn activate_mirror(&self, process: &HealingProcess) {
        let now = chrono::Utc::now().timestamp();

        if let Err(e) = self
            .registry
            .set_status(&process.healing_node, NodeStatus::ActiveMirror)
        {
            warn!(mirror = %process.healing_node, error = %e, "Cannot mark mirror active");
        }
        if let Err(e) = self
            .registry
            .set_status(&process.failed_node, NodeStatus::Inactive)
        {
            warn!(node_id = %process.failed_node, error = %e, "Cannot mark primary inactive");
        }

        let delivered = self
            .fabric
            .send(
                &process.healing_node,
                OutboundMessage::Activation {
                    node_id: process.healing_node.clone(),
                    role: NodeRole::Agent,
                    failed_node: process.failed_node.clone(),
                    healing_id: process.healing_id.clone(),
                },
            )
            .await;
        if !delivered {
            warn!(mirror = %process.healing_node, "Activation message not delivered");
        }

        // Best effort: the failed node is usually unreachable.
        self.fabric
            .send(
                &process.failed_node,
                OutboundMessage::TakeoverNotice {
                    node_id: process.failed_node.clone(),
                    healing_node: process.healing_node.clone(),
                    timestamp: now,
                },
            )
            .await;

        self.fabric
            .broadcast_to_observers(OutboundMessage::observer("healing_initiated", process))
            .await;
    }

    async fn escalate_unhealable(&self, healing_id: &str, failed_node: &str, reason: &str) {
        let escalation = Escalation {
            remediation_id: healing_id.to_string(),
            node_id: failed_node.to_string(),
            strategy: "agent_offline".to_string(),
            reason: reason.to_string(),
            timestamp: chrono::Utc::now().timestamp(),
        };
        self.persistence.record_escalation(&escalation).await;

        error!(healing_id = %healing_id, failed_node = %failed_node, reason,
            "Healing escalated to operators");
        self.fabric
            .broadcast_to_observers(OutboundMessage::observer("escalation_required", &escalation))
            .await;
    }
}
