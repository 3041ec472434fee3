//! Rolling metric windows for baseline statistics
//!
//! Each `(node, metric)` pair keeps a fixed-capacity ring buffer; the
//! baseline is the mean/stddev over everything except the newest sample so
//! a spike cannot mask itself.

use std::collections::VecDeque;

/// Baseline statistics over a window's history
#[derive(Debug, Clone, Copy)]
pub struct BaselineStats {
    pub mean: f64,
    pub std_dev: f64,
    pub count: usize,
}

/// Fixed-capacity ring buffer of metric values, oldest evicted first
#[derive(Debug, Clone)]
pub struct MetricWindow {
    samples: VecDeque<f64>,
    capacity: usize,
}

impl MetricWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a value, evicting the oldest when at capacity
    pub fn push(&mut self, value: f64) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(value);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn latest(&self) -> Option<f64> {
        self.samples.back().copied()
    }

    /// Mean/stddev over all samples except the newest
    ///
    /// Returns `None` until at least two samples exist (one historical value
    /// plus the current one).
    pub fn baseline(&self) -> Option<BaselineStats> {
        let n = self.samples.len();
        if n < 2 {
            return None;
        }

        let history = self.samples.iter().take(n - 1);
        let count = n - 1;
        let sum: f64 = history.clone().sum();
        let mean = sum / count as f64;

        let variance: f64 =
            history.map(|v| (v - mean).powi(2)).sum::<f64>() / count as f64;

        Some(BaselineStats {
            mean,
            std_dev: variance.sqrt(),
            count,
        })
    }

    /// Mean of the newest `n` samples (including the current one)
    pub fn recent_mean(&self, n: usize) -> Option<f64> {
        if self.samples.len() < n || n == 0 {
            return None;
        }
        let sum: f64 = self.samples.iter().rev().take(n).sum();
        Some(sum / n as f64)
    }

    /// Mean of the `n` samples immediately preceding the newest `n`
    pub fn prior_mean(&self, n: usize) -> Option<f64> {
        if self.samples.len() < 2 * n || n == 0 {
            return None;
        }
        let sum: f64 = self.samples.iter().rev().skip(n).take(n).sum();
        Some(sum / n as f64)
    }

    /// Mean of the `n` samples immediately before the newest one
    ///
    /// Used for spike checks where the current sample must not contribute
    /// to its own reference average.
    pub fn preceding_mean(&self, n: usize) -> Option<f64> {
        if self.samples.len() < n + 1 || n == 0 {
            return None;
        }
        let sum: f64 = self.samples.iter().rev().skip(1).take(n).sum();
        Some(sum / n as f64)
    }
}
