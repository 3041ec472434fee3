//! Composite attack-pattern heuristics
//!
//! These run alongside the statistical and rule checks and key off short
//! window averages rather than the full baseline.

use super::baseline::MetricWindow;

/// Tunables for pattern detection
#[derive(Debug, Clone)]
pub struct PatternConfig {
    /// CPU above this is flagged outright
    pub cpu_bomb_floor: f64,
    /// Minimum CPU before a jump is considered
    pub cpu_jump_min: f64,
    /// Jump over the short-window average that flags a CPU bomb
    pub cpu_jump_delta: f64,
    /// Short window length for CPU jump detection
    pub cpu_short_window: usize,
    /// Growth between consecutive short windows that flags a leak
    pub memory_leak_delta: f64,
    /// Absolute memory usage that flags a leak regardless of trend
    pub memory_leak_floor: f64,
    /// Short window length for memory trend detection
    pub memory_short_window: usize,
    /// Minimum speed before a traffic multiple is considered
    pub network_spike_floor: f64,
    /// Multiple of the short-window average that flags a DDoS attempt
    pub network_spike_factor: f64,
    /// Short window length for traffic spike detection
    pub network_short_window: usize,
    /// Sustained speed that flags a DDoS attempt on its own
    pub network_sustained_ceiling: f64,
}

impl Default for PatternConfig {
    fn default() -> Self {
        Self {
            cpu_bomb_floor: 10.0,
            cpu_jump_min: 5.0,
            cpu_jump_delta: 5.0,
            cpu_short_window: 5,
            memory_leak_delta: 10.0,
            memory_leak_floor: 70.0,
            memory_short_window: 5,
            network_spike_floor: 10.0,
            network_spike_factor: 3.0,
            network_short_window: 3,
            network_sustained_ceiling: 50.0,
        }
    }
}

/// CPU bomb: usage above an absolute floor, or a sharp jump over the short
/// window average
pub fn detect_cpu_bomb(config: &PatternConfig, window: &MetricWindow, current: f64) -> bool {
    if current > config.cpu_bomb_floor {
        return true;
    }

    if current > config.cpu_jump_min {
        if let Some(recent_avg) = window.preceding_mean(config.cpu_short_window) {
            if current - recent_avg > config.cpu_jump_delta {
                return true;
            }
        }
    }

    false
}

/// Memory leak: consistent upward trend between consecutive short windows,
/// or absolute usage above the floor
pub fn detect_memory_leak(config: &PatternConfig, window: &MetricWindow) -> bool {
    let n = config.memory_short_window;

    if let (Some(recent), Some(older)) = (window.recent_mean(n), window.prior_mean(n)) {
        if recent - older > config.memory_leak_delta {
            return true;
        }
    }

    window
        .latest()
        .map(|latest| latest > config.memory_leak_floor)
        .unwrap_or(false)
}

/// DDoS attempt: current speed several times the short-window average above
/// a floor, or sustained speed above the ceiling
pub fn detect_ddos_attempt(config: &PatternConfig, window: &MetricWindow, current: f64) -> bool {
    if current > config.network_spike_floor {
        if let Some(recent_avg) = window.preceding_mean(config.network_short_window) {
            if current > recent_avg * config.network_spike_factor {
                return true;
            }
        }
    }

    current > config.network_sustained_ceiling
}
