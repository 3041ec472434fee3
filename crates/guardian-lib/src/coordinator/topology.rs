//! In-memory mirror topology
//!
//! Directed edges: primary -> mirror, ordered by priority. The edge set
//! must stay acyclic so a cascade of takeovers always terminates; cycles
//! and self-edges are rejected at insertion.

use crate::error::{GuardianError, Result};
use crate::models::{MirrorRelation, MirrorType};
use dashmap::DashMap;
use std::collections::HashSet;
use tracing::info;

/// Directed, acyclic mirror relationships keyed by primary id
#[derive(Default)]
pub struct MirrorTopology {
    edges: DashMap<String, Vec<MirrorRelation>>,
}

impl MirrorTopology {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or update) a mirror edge
    ///
    /// Rejects self-edges and any edge that would make the mirror's
    /// responsibilities eventually flow back to itself.
    pub fn add_mirror(
        &self,
        primary_id: &str,
        mirror_id: &str,
        mirror_type: MirrorType,
        priority: u32,
    ) -> Result<MirrorRelation> {
        if primary_id == mirror_id {
            return Err(GuardianError::CycleRejected {
                primary: primary_id.to_string(),
                mirror: mirror_id.to_string(),
            });
        }
        if self.reaches(mirror_id, primary_id) {
            return Err(GuardianError::CycleRejected {
                primary: primary_id.to_string(),
                mirror: mirror_id.to_string(),
            });
        }

        let relation = MirrorRelation {
            primary_id: primary_id.to_string(),
            mirror_id: mirror_id.to_string(),
            mirror_type,
            priority,
            created_at: chrono::Utc::now().timestamp(),
        };

        let mut edges = self.edges.entry(primary_id.to_string()).or_default();
        edges.retain(|r| r.mirror_id != mirror_id);
        edges.push(relation.clone());
        edges.sort_by_key(|r| r.priority);
        drop(edges);

        info!(primary = %primary_id, mirror = %mirror_id, priority, "Mirror edge added");
        Ok(relation)
    }

    /// Mirrors of a primary, best candidate first (lowest priority value)
    pub fn get_mirrors(&self, primary_id: &str) -> Vec<MirrorRelation> {
        self.edges
            .get(primary_id)
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    pub fn remove_mirror(&self, primary_id: &str, mirror_id: &str) -> bool {
        let Some(mut edges) = self.edges.get_mut(primary_id) else {
            return false;
        };
        let before = edges.len();
        edges.retain(|r| r.mirror_id != mirror_id);
        edges.len() != before
    }

    /// True if `to` is reachable from `from` along mirror edges
    fn reaches(&self, from: &str, to: &str) -> bool {
        let mut stack = vec![from.to_string()];
        let mut seen = HashSet::new();

        while let Some(current) = stack.pop() {
            if current == to {
                return true;
            }
            if !seen.insert(current.clone()) {
                continue;
            }
            if let Some(edges) = self.edges.get(&current) {
                for relation in edges.iter() {
                    stack.push(relation.mirror_id.clone());
                }
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mirrors_ordered_by_priority() {
        let topology = MirrorTopology::new();
        topology.add_mirror("a", "c", MirrorType::Backup, 3).unwrap();
        topology.add_mirror("a", "b", MirrorType::Passive, 1).unwrap();

        let mirrors = topology.get_mirrors("a");
        assert_eq!(mirrors[0].mirror_id, "b");
        assert_eq!(mirrors[1].mirror_id, "c");
    }

    #[test]
    fn test_self_edge_rejected() {
        let topology = MirrorTopology::new();
        assert!(matches!(
            topology.add_mirror("a", "a", MirrorType::Active, 1),
            Err(GuardianError::CycleRejected { .. })
        ));
    }

    #[test]
    fn test_two_node_cycle_rejected() {
        let topology = MirrorTopology::new();
        topology.add_mirror("a", "b", MirrorType::Passive, 1).unwrap();

        assert!(matches!(
            topology.add_mirror("b", "a", MirrorType::Passive, 1),
            Err(GuardianError::CycleRejected { .. })
        ));
    }

    #[test]
    fn test_longer_cycle_rejected() {
        let topology = MirrorTopology::new();
        topology.add_mirror("a", "b", MirrorType::Passive, 1).unwrap();
        topology.add_mirror("b", "c", MirrorType::Passive, 1).unwrap();

        assert!(topology.add_mirror("c", "a", MirrorType::Passive, 1).is_err());
        // A chain in the other direction stays legal.
        assert!(topology.add_mirror("a", "c", MirrorType::Backup, 2).is_ok());
    }

    #[test]
    fn test_re_adding_edge_updates_priority() {
        let topology = MirrorTopology::new();
        topology.add_mirror("a", "b", MirrorType::Passive, 5).unwrap();
        topology.add_mirror("a", "b", MirrorType::Active, 1).unwrap();

        let mirrors = topology.get_mirrors("a");
        assert_eq!(mirrors.len(), 1);
        assert_eq!(mirrors[0].priority, 1);
        assert_eq!(mirrors[0].mirror_type, MirrorType::Active);
    }

    #[test]
    fn test_remove_mirror() {
        let topology = MirrorTopology::new();
        topology.add_mirror("a", "b", MirrorType::Passive, 1).unwrap();

        assert!(topology.remove_mirror("a", "b"));
        assert!(!topology.remove_mirror("a", "b"));
        assert!(topology.get_mirrors("a").is_empty());
    }
}
