//! Anomaly detection over per-node metric streams
//!
//! Three independent checks run on every sample: a statistical z-score
//! against the rolling baseline, fixed-threshold rules, and composite
//! attack-pattern heuristics. A single sample may yield zero, one, or
//! several anomalies; identical `(node, kind)` repeats are suppressed
//! within a short cool-down to avoid event storms.

mod baseline;
mod patterns;

pub use baseline::{BaselineStats, MetricWindow};
pub use patterns::{detect_cpu_bomb, detect_ddos_attempt, detect_memory_leak, PatternConfig};

use crate::models::{Anomaly, AnomalyEvidence, MetricSample, Severity};
use dashmap::DashMap;
use std::time::{Duration, Instant};
use tracing::debug;

/// Tunables for the detector
#[derive(Debug, Clone)]
pub struct DetectorConfig {
    /// Ring buffer capacity per (node, metric)
    pub window_size: usize,
    /// Minimum history before the statistical check runs
    pub min_history: usize,
    /// Z-score above which a value is anomalous
    pub anomaly_threshold: f64,
    /// Z-score above which a statistical anomaly is critical
    pub spike_threshold: f64,
    /// CPU percentage for the high-usage rule
    pub cpu_high_threshold: f64,
    /// Memory percentage for the high-usage rule
    pub memory_high_threshold: f64,
    /// Network speed (Mbps) for the extreme-traffic rule
    pub network_high_threshold: f64,
    /// Suppression window for identical (node, kind) repeats
    pub cooldown: Duration,
    pub patterns: PatternConfig,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            window_size: 100,
            min_history: 10,
            anomaly_threshold: 2.5,
            spike_threshold: 3.0,
            cpu_high_threshold: 80.0,
            memory_high_threshold: 60.0,
            network_high_threshold: 25.0,
            cooldown: Duration::from_secs(30),
            patterns: PatternConfig::default(),
        }
    }
}

/// Rolling windows for one node's tracked metrics
struct NodeWindows {
    cpu: MetricWindow,
    memory: MetricWindow,
    network: MetricWindow,
}

impl NodeWindows {
    fn new(capacity: usize) -> Self {
        Self {
            cpu: MetricWindow::new(capacity),
            memory: MetricWindow::new(capacity),
            network: MetricWindow::new(capacity),
        }
    }
}

/// Statistical + rule + pattern anomaly detector
///
/// Owns the per-node rolling windows; the ingestion path never errors on
/// malformed samples (missing fields decode to zero upstream).
pub struct AnomalyDetector {
    config: DetectorConfig,
    windows: DashMap<String, NodeWindows>,
    /// (node_id, kind) -> last emission, for cool-down suppression
    recent: DashMap<(String, String), Instant>,
}

impl AnomalyDetector {
    pub fn new(config: DetectorConfig) -> Self {
        Self {
            config,
            windows: DashMap::new(),
            recent: DashMap::new(),
        }
    }

    /// Analyze one sample, returning all anomalies it triggers
    pub fn analyze(&self, sample: &MetricSample) -> Vec<Anomaly> {
        let mut anomalies = Vec::new();

        {
            let mut entry = self
                .windows
                .entry(sample.node_id.clone())
                .or_insert_with(|| NodeWindows::new(self.config.window_size));
            let windows = entry.value_mut();

            windows.cpu.push(sample.cpu_percent);
            windows.memory.push(sample.memory_percent);
            windows.network.push(sample.network_speed_mbps);

            self.check_statistical(sample, windows, &mut anomalies);
            self.check_patterns(sample, windows, &mut anomalies);
        }

        self.check_rules(sample, &mut anomalies);

        anomalies.retain(|anomaly| self.pass_cooldown(anomaly));
        anomalies
    }

    /// Z-score check per tracked metric, over all history but the current
    /// sample. A zero-variance baseline with a deviating current value is
    /// treated as an unbounded z-score rather than skipped.
    fn check_statistical(
        &self,
        sample: &MetricSample,
        windows: &NodeWindows,
        out: &mut Vec<Anomaly>,
    ) {
        let checks = [
            ("cpu", sample.cpu_percent, &windows.cpu),
            ("memory", sample.memory_percent, &windows.memory),
            ("network", sample.network_speed_mbps, &windows.network),
        ];

        for (metric, current, window) in checks {
            if window.len() < self.config.min_history {
                continue;
            }
            let Some(stats) = window.baseline() else {
                continue;
            };

            let deviation = (current - stats.mean).abs();
            let z_score = if stats.std_dev > f64::EPSILON {
                deviation / stats.std_dev
            } else if deviation > f64::EPSILON {
                f64::INFINITY
            } else {
                continue;
            };

            if z_score > self.config.anomaly_threshold {
                let severity = if z_score > self.config.spike_threshold {
                    Severity::Critical
                } else {
                    Severity::Warning
                };

                out.push(Anomaly {
                    node_id: sample.node_id.clone(),
                    kind: format!("{}_statistical_anomaly", metric),
                    severity,
                    detected_at: sample.timestamp,
                    evidence: AnomalyEvidence {
                        current_value: current,
                        baseline_mean: Some(stats.mean),
                        baseline_std: Some(stats.std_dev),
                        z_score: Some(z_score),
                        threshold: Some(self.config.anomaly_threshold),
                        description: format!(
                            "{} value {:.2} deviates {:.1} std devs from baseline {:.2}",
                            metric, current, z_score, stats.mean
                        ),
                    },
                });
            }
        }
    }

    /// Fixed-threshold rules, independent of baseline history
    fn check_rules(&self, sample: &MetricSample, out: &mut Vec<Anomaly>) {
        if sample.cpu_percent > self.config.cpu_high_threshold {
            out.push(Anomaly {
                node_id: sample.node_id.clone(),
                kind: "high_cpu_usage".to_string(),
                severity: Severity::Warning,
                detected_at: sample.timestamp,
                evidence: AnomalyEvidence::threshold(
                    sample.cpu_percent,
                    self.config.cpu_high_threshold,
                    format!("High CPU usage detected: {:.1}%", sample.cpu_percent),
                ),
            });
        }

        if sample.memory_percent > self.config.memory_high_threshold {
            out.push(Anomaly {
                node_id: sample.node_id.clone(),
                kind: "high_memory_usage".to_string(),
                severity: Severity::Warning,
                detected_at: sample.timestamp,
                evidence: AnomalyEvidence::threshold(
                    sample.memory_percent,
                    self.config.memory_high_threshold,
                    format!("High memory usage detected: {:.1}%", sample.memory_percent),
                ),
            });
        }

        if sample.network_speed_mbps > self.config.network_high_threshold {
            out.push(Anomaly {
                node_id: sample.node_id.clone(),
                kind: "extreme_network_traffic".to_string(),
                severity: Severity::Critical,
                detected_at: sample.timestamp,
                evidence: AnomalyEvidence::threshold(
                    sample.network_speed_mbps,
                    self.config.network_high_threshold,
                    format!(
                        "High network traffic detected: {:.1} Mbps",
                        sample.network_speed_mbps
                    ),
                ),
            });
        }
    }

    /// Composite attack-pattern heuristics
    fn check_patterns(&self, sample: &MetricSample, windows: &NodeWindows, out: &mut Vec<Anomaly>) {
        let patterns = &self.config.patterns;

        if detect_cpu_bomb(patterns, &windows.cpu, sample.cpu_percent) {
            out.push(Anomaly {
                node_id: sample.node_id.clone(),
                kind: "cpu_bomb_detected".to_string(),
                severity: Severity::Critical,
                detected_at: sample.timestamp,
                evidence: AnomalyEvidence::pattern(
                    sample.cpu_percent,
                    "CPU spike or sustained high usage matching cpu_bomb pattern",
                ),
            });
        }

        if detect_memory_leak(patterns, &windows.memory) {
            out.push(Anomaly {
                node_id: sample.node_id.clone(),
                kind: "memory_leak_detected".to_string(),
                severity: Severity::Warning,
                detected_at: sample.timestamp,
                evidence: AnomalyEvidence::pattern(
                    sample.memory_percent,
                    "Gradual memory increase or sustained high usage",
                ),
            });
        }

        if detect_ddos_attempt(patterns, &windows.network, sample.network_speed_mbps) {
            out.push(Anomaly {
                node_id: sample.node_id.clone(),
                kind: "ddos_attempt_detected".to_string(),
                severity: Severity::Critical,
                detected_at: sample.timestamp,
                evidence: AnomalyEvidence::pattern(
                    sample.network_speed_mbps,
                    "Network traffic spike matching ddos_attempt pattern",
                ),
            });
        }
    }

    /// True if the anomaly is outside the cool-down window; records emission
    fn pass_cooldown(&self, anomaly: &Anomaly) -> bool {
        let key = (anomaly.node_id.clone(), anomaly.kind.clone());
        let now = Instant::now();

        if let Some(last) = self.recent.get(&key) {
            if now.duration_since(*last) < self.config.cooldown {
                debug!(
                    node_id = %anomaly.node_id,
                    kind = %anomaly.kind,
                    "Suppressing repeated anomaly within cool-down"
                );
                return false;
            }
        }

        self.recent.insert(key, now);
        // Bound the suppression map.
        if self.recent.len() > 4096 {
            let cooldown = self.config.cooldown;
            self.recent
                .retain(|_, last| now.duration_since(*last) < cooldown);
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(node_id: &str, cpu: f64, memory: f64, network: f64, ts: i64) -> MetricSample {
        MetricSample {
            node_id: node_id.to_string(),
            timestamp: ts,
            cpu_percent: cpu,
            memory_percent: memory,
            disk_percent: 0.0,
            network_speed_mbps: network,
            extra: Default::default(),
        }
    }

    /// Quiet config: rules and patterns off so statistical behavior can be
    /// observed in isolation.
    fn statistical_only() -> DetectorConfig {
        DetectorConfig {
            cpu_high_threshold: 1000.0,
            memory_high_threshold: 1000.0,
            network_high_threshold: 1000.0,
            cooldown: Duration::ZERO,
            patterns: PatternConfig {
                cpu_bomb_floor: 1000.0,
                cpu_jump_min: 1000.0,
                memory_leak_floor: 1000.0,
                memory_leak_delta: 1000.0,
                network_spike_floor: 1000.0,
                network_sustained_ceiling: 1000.0,
                ..PatternConfig::default()
            },
            ..DetectorConfig::default()
        }
    }

    #[test]
    fn test_cpu_spike_after_flat_baseline() {
        let detector = AnomalyDetector::new(statistical_only());

        for i in 0..9 {
            let anomalies = detector.analyze(&sample("node-1", 20.0, 30.0, 1.0, i));
            assert!(anomalies.is_empty(), "no anomaly during baseline feed");
        }

        let anomalies = detector.analyze(&sample("node-1", 95.0, 30.0, 1.0, 9));
        let cpu = anomalies
            .iter()
            .find(|a| a.kind == "cpu_statistical_anomaly")
            .expect("cpu statistical anomaly");

        assert_eq!(cpu.severity, Severity::Critical);
        let mean = cpu.evidence.baseline_mean.unwrap();
        assert!((mean - 20.0).abs() < 0.01, "baseline mean ~20, got {}", mean);
        assert!(cpu.evidence.z_score.unwrap() > 3.0);
    }

    #[test]
    fn test_statistical_detection_is_deterministic() {
        let history = [10.0, 12.0, 11.0, 14.0, 9.0, 13.0, 10.0, 12.0, 11.0];

        let run = || {
            let detector = AnomalyDetector::new(statistical_only());
            for (i, v) in history.iter().enumerate() {
                detector.analyze(&sample("node-1", *v, 30.0, 1.0, i as i64));
            }
            detector.analyze(&sample("node-1", 40.0, 30.0, 1.0, 99))
        };

        let a = run();
        let b = run();
        assert_eq!(a.len(), b.len());
        assert_eq!(
            a[0].evidence.z_score.unwrap(),
            b[0].evidence.z_score.unwrap()
        );
    }

    #[test]
    fn test_no_statistical_check_below_min_history() {
        let detector = AnomalyDetector::new(statistical_only());

        for i in 0..5 {
            detector.analyze(&sample("node-1", 20.0, 30.0, 1.0, i));
        }
        let anomalies = detector.analyze(&sample("node-1", 95.0, 30.0, 1.0, 5));
        assert!(anomalies.is_empty());
    }

    #[test]
    fn test_rule_checks_fire_without_history() {
        let detector = AnomalyDetector::new(DetectorConfig {
            cooldown: Duration::ZERO,
            ..DetectorConfig::default()
        });

        let anomalies = detector.analyze(&sample("node-1", 85.0, 65.0, 30.0, 0));
        let kinds: Vec<&str> = anomalies.iter().map(|a| a.kind.as_str()).collect();

        assert!(kinds.contains(&"high_cpu_usage"));
        assert!(kinds.contains(&"high_memory_usage"));
        assert!(kinds.contains(&"extreme_network_traffic"));
    }

    #[test]
    fn test_single_sample_can_yield_multiple_kinds() {
        let detector = AnomalyDetector::new(DetectorConfig {
            cooldown: Duration::ZERO,
            ..DetectorConfig::default()
        });

        // High CPU triggers both the rule and the cpu_bomb pattern.
        let anomalies = detector.analyze(&sample("node-1", 90.0, 10.0, 1.0, 0));
        let kinds: Vec<&str> = anomalies.iter().map(|a| a.kind.as_str()).collect();

        assert!(kinds.contains(&"high_cpu_usage"));
        assert!(kinds.contains(&"cpu_bomb_detected"));
    }

    #[test]
    fn test_cooldown_suppresses_identical_repeats() {
        let detector = AnomalyDetector::new(DetectorConfig::default());

        let first = detector.analyze(&sample("node-1", 90.0, 10.0, 1.0, 0));
        assert!(!first.is_empty());

        let second = detector.analyze(&sample("node-1", 91.0, 10.0, 1.0, 1));
        assert!(second.is_empty(), "identical kinds suppressed in cool-down");

        // A different node is not affected by node-1's cool-down.
        let other = detector.analyze(&sample("node-2", 90.0, 10.0, 1.0, 1));
        assert!(!other.is_empty());
    }

    #[test]
    fn test_nodes_have_independent_baselines() {
        let detector = AnomalyDetector::new(statistical_only());

        for i in 0..20 {
            detector.analyze(&sample("node-1", 20.0, 30.0, 1.0, i));
            detector.analyze(&sample("node-2", 80.0, 30.0, 1.0, i));
        }

        // 80% is normal for node-2, anomalous for node-1.
        assert!(detector
            .analyze(&sample("node-2", 80.0, 30.0, 1.0, 20))
            .is_empty());
        assert!(!detector
            .analyze(&sample("node-1", 80.0, 30.0, 1.0, 20))
            .is_empty());
    }
}
