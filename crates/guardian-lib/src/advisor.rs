//! Advisory health assessment hook
//!
//! An advisor may annotate a node's condition from its recent samples. Its
//! output is advisory only: remediation and healing decisions come from the
//! detector and coordinator, never from an advisor verdict.

use crate::models::MetricSample;

/// Qualitative assessment of a node's recent behavior
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Assessment {
    Nominal,
    Degrading(String),
    Unknown,
}

/// Pluggable advisory assessor over recent samples
pub trait HealthAdvisor: Send + Sync {
    fn assess(&self, node_id: &str, recent: &[MetricSample]) -> Assessment;
}

/// Flags sustained elevation across CPU and memory together
///
/// The default advisor; intentionally conservative since its verdicts only
/// decorate observer events and logs.
pub struct TrendAdvisor {
    pub cpu_watermark: f64,
    pub memory_watermark: f64,
    pub min_samples: usize,
}

impl Default for TrendAdvisor {
    fn default() -> Self {
        Self {
            cpu_watermark: 70.0,
            memory_watermark: 55.0,
            min_samples: 5,
        }
    }
}

impl HealthAdvisor for TrendAdvisor {
    fn assess(&self, _node_id: &str, recent: &[MetricSample]) -> Assessment {
        if recent.len() < self.min_samples {
            return Assessment::Unknown;
        }

        let window = &recent[recent.len() - self.min_samples..];
        let cpu_elevated = window.iter().all(|s| s.cpu_percent > self.cpu_watermark);
        let memory_elevated = window
            .iter()
            .all(|s| s.memory_percent > self.memory_watermark);

        if cpu_elevated && memory_elevated {
            Assessment::Degrading("sustained cpu and memory elevation".to_string())
        } else {
            Assessment::Nominal
        }
    }
}
