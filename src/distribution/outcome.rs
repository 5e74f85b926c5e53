//! Simulated outcome distribution and its statistics
//!
//! Sorted values and summary statistics are computed on first use and kept
//! until the next `add_*` call.

use super::analytic::{self, GrowthProjection};
use super::critical::{self, CriticalPeriod};
use crate::simulation::TrajectoryMatrix;
use serde::{Deserialize, Serialize};
use std::cell::OnceCell;
use std::collections::BTreeMap;

/// Lower edge of the partial-credit band, as a fraction of the target
pub const PARTIAL_CREDIT_FLOOR: f64 = 0.9;

/// Fixed-width histogram
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Histogram {
    /// `bins + 1` edges from min to max
    pub bin_edges: Vec<f64>,
    pub counts: Vec<usize>,
}

#[derive(Debug, Clone, Copy)]
struct SummaryStats {
    mean: f64,
    median: f64,
    std_dev: f64,
}

/// Terminal (and optionally full-path) simulation values
#[derive(Debug, Clone, Default)]
pub struct OutcomeDistribution {
    values: Vec<f64>,
    trajectories: Vec<Vec<f64>>,
    sorted: OnceCell<Vec<f64>>,
    summary: OnceCell<SummaryStats>,
}

impl OutcomeDistribution {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_values(values: Vec<f64>) -> Self {
        let mut distribution = Self::new();
        distribution.add_values(&values);
        distribution
    }

    /// Add one value; non-finite values are ignored
    pub fn add_value(&mut self, value: f64) {
        if value.is_finite() {
            self.values.push(value);
        }
        self.invalidate();
    }

    pub fn add_values(&mut self, values: &[f64]) {
        self.values.extend(values.iter().copied().filter(|v| v.is_finite()));
        self.invalidate();
    }

    /// Add every path of a simulation run, plus its terminal values
    pub fn add_trajectories(&mut self, matrix: &TrajectoryMatrix) {
        self.values
            .extend(matrix.terminal_values().into_iter().filter(|v| v.is_finite()));
        self.trajectories.extend(matrix.to_rows());
        self.invalidate();
    }

    /// Keep only the newest `max_values` values and `max_paths` paths
    pub fn retain_latest(&mut self, max_values: usize, max_paths: usize) {
        if self.values.len() > max_values {
            let excess = self.values.len() - max_values;
            self.values.drain(..excess);
        }
        if self.trajectories.len() > max_paths {
            let excess = self.trajectories.len() - max_paths;
            self.trajectories.drain(..excess);
        }
        self.invalidate();
    }

    /// Drop all values and paths
    pub fn clear(&mut self) {
        self.values.clear();
        self.trajectories.clear();
        self.invalidate();
    }

    fn invalidate(&mut self) {
        self.sorted = OnceCell::new();
        self.summary = OnceCell::new();
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn trajectories(&self) -> &[Vec<f64>] {
        &self.trajectories
    }

    fn sorted(&self) -> &[f64] {
        self.sorted.get_or_init(|| {
            let mut sorted = self.values.clone();
            sorted.sort_by(|a, b| a.total_cmp(b));
            sorted
        })
    }

    fn summary(&self) -> SummaryStats {
        *self.summary.get_or_init(|| {
            let n = self.values.len();
            if n == 0 {
                return SummaryStats { mean: 0.0, median: 0.0, std_dev: 0.0 };
            }

            let mean = self.values.iter().sum::<f64>() / n as f64;
            let sorted = self.sorted();
            let median = if n % 2 == 0 {
                (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
            } else {
                sorted[n / 2]
            };
            let std_dev = if n >= 2 {
                let variance = self.values.iter().map(|v| (v - mean).powi(2)).sum::<f64>()
                    / (n - 1) as f64;
                variance.sqrt()
            } else {
                0.0
            };

            SummaryStats { mean, median, std_dev }
        })
    }

    pub fn mean(&self) -> f64 {
        self.summary().mean
    }

    pub fn median(&self) -> f64 {
        self.summary().median
    }

    /// Sample standard deviation; 0 with fewer than two values
    pub fn std_dev(&self) -> f64 {
        self.summary().std_dev
    }

    pub fn min(&self) -> f64 {
        self.sorted().first().copied().unwrap_or(0.0)
    }

    pub fn max(&self) -> f64 {
        self.sorted().last().copied().unwrap_or(0.0)
    }

    /// Nearest-rank percentile: `sorted[floor(p * n)]`, clamped to the range
    pub fn percentile(&self, p: f64) -> f64 {
        let sorted = self.sorted();
        if sorted.is_empty() {
            return 0.0;
        }
        let index = (p * sorted.len() as f64).floor();
        let index = index.clamp(0.0, (sorted.len() - 1) as f64) as usize;
        sorted[index]
    }

    /// Probability of reaching `target`, with partial credit for near misses
    ///
    /// Values at or above the target count fully; values in
    /// `[0.9 * target, target)` count `(value / target - 0.9) * 10`.
    pub fn success_probability(&self, target: f64) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }
        if target <= 0.0 {
            return 1.0;
        }

        let credit: f64 = self
            .values
            .iter()
            .map(|&value| {
                if value >= target {
                    1.0
                } else if value >= PARTIAL_CREDIT_FLOOR * target {
                    (value / target - PARTIAL_CREDIT_FLOOR) * 10.0
                } else {
                    0.0
                }
            })
            .sum();

        (credit / self.values.len() as f64).clamp(0.0, 1.0)
    }

    /// Fraction of outcomes strictly below `target * threshold_pct`
    pub fn shortfall_risk(&self, target: f64, threshold_pct: f64) -> f64 {
        self.fraction(|v| v < target * threshold_pct)
    }

    /// Fraction of outcomes at or above `target * excess_pct`
    pub fn upside_probability(&self, target: f64, excess_pct: f64) -> f64 {
        self.fraction(|v| v >= target * excess_pct)
    }

    fn fraction(&self, predicate: impl Fn(f64) -> bool) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }
        self.values.iter().filter(|v| predicate(**v)).count() as f64 / self.values.len() as f64
    }

    /// Value at risk: the `(1 - confidence)` percentile
    pub fn value_at_risk(&self, confidence: f64) -> f64 {
        self.percentile(1.0 - confidence)
    }

    /// Mean of outcomes at or below the VaR threshold
    pub fn conditional_value_at_risk(&self, confidence: f64) -> f64 {
        let var = self.value_at_risk(confidence);
        let tail: Vec<f64> = self.values.iter().copied().filter(|v| *v <= var).collect();
        if tail.is_empty() {
            var
        } else {
            tail.iter().sum::<f64>() / tail.len() as f64
        }
    }

    pub fn calculate_histogram(&self, bins: usize) -> Histogram {
        if bins == 0 || self.values.is_empty() {
            return Histogram::default();
        }

        let min = self.min();
        let max = self.max();
        let width = if max > min { (max - min) / bins as f64 } else { 1.0 };

        let bin_edges = (0..=bins).map(|i| min + width * i as f64).collect();
        let mut counts = vec![0usize; bins];
        for value in &self.values {
            let index = ((value - min) / width).floor() as usize;
            counts[index.min(bins - 1)] += 1;
        }

        Histogram { bin_edges, counts }
    }

    /// Years until the approximate success probability reaches `target_probability`
    pub fn calculate_time_to_goal_probability(
        &self,
        target_probability: f64,
        projection: &GrowthProjection,
        max_years: f64,
    ) -> Option<f64> {
        analytic::time_to_probability(projection, target_probability, max_years)
    }

    /// Approximate success probability at each requested year
    pub fn calculate_probability_at_timepoints(
        &self,
        timepoints: &[u32],
        projection: &GrowthProjection,
    ) -> BTreeMap<u32, f64> {
        analytic::probability_at_timepoints(projection, timepoints)
    }

    /// High-volatility stretches of `time_series` (one row per simulation)
    pub fn identify_critical_periods(
        &self,
        time_series: &[Vec<f64>],
        threshold_pct: f64,
    ) -> Vec<CriticalPeriod> {
        critical::identify_critical_periods(time_series, threshold_pct)
    }

    /// Critical periods of the stored trajectories
    pub fn critical_periods(&self, threshold_pct: f64) -> Vec<CriticalPeriod> {
        self.identify_critical_periods(&self.trajectories, threshold_pct)
    }
}
