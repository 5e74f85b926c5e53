//! Closed-form normal approximation of goal progress over time
//!
//! Used where re-running the simulation at every candidate horizon would be
//! too expensive: time-to-probability search and probability at future
//! timepoints.

use serde::{Deserialize, Serialize};
use statrs::function::erf::erf;
use std::collections::BTreeMap;

/// Half-year tolerance for the time-to-probability search
pub const SEARCH_TOLERANCE_YEARS: f64 = 0.5;

/// Deterministic growth inputs for the normal approximation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GrowthProjection {
    pub initial_amount: f64,
    pub annual_contribution: f64,
    pub expected_return: f64,
    pub volatility: f64,
    pub target_amount: f64,
}

impl GrowthProjection {
    /// Compounded initial amount plus the future value of contributions
    pub fn expected_value(&self, years: f64) -> f64 {
        let growth = (1.0 + self.expected_return).powf(years);
        let contributions = if self.expected_return.abs() < 1e-9 {
            self.annual_contribution * years
        } else {
            self.annual_contribution * (growth - 1.0) / self.expected_return
        };
        self.initial_amount * growth + contributions
    }

    /// Probability of reaching the target after `years`
    ///
    /// Outcome ~ Normal(expected, expected * volatility * sqrt(years)).
    pub fn probability_at(&self, years: f64) -> f64 {
        if years <= 0.0 {
            return if self.initial_amount >= self.target_amount { 1.0 } else { 0.0 };
        }

        let expected = self.expected_value(years);
        let std_dev = expected * self.volatility * years.sqrt();
        if !(std_dev > 0.0) || !std_dev.is_finite() {
            return if expected >= self.target_amount { 1.0 } else { 0.0 };
        }

        let z = (expected - self.target_amount) / std_dev;
        (0.5 * (1.0 + erf(z / std::f64::consts::SQRT_2))).clamp(0.0, 1.0)
    }
}

/// Smallest horizon in `[1, max_years]` reaching `target_probability`
///
/// Binary search to within half a year. None if even `max_years` falls short.
pub fn time_to_probability(
    projection: &GrowthProjection,
    target_probability: f64,
    max_years: f64,
) -> Option<f64> {
    let mut low = 1.0_f64;
    let mut high = max_years.max(low);

    if projection.probability_at(high) < target_probability {
        return None;
    }
    if projection.probability_at(low) >= target_probability {
        return Some(low);
    }

    while high - low > SEARCH_TOLERANCE_YEARS {
        let mid = (low + high) / 2.0;
        if projection.probability_at(mid) >= target_probability {
            high = mid;
        } else {
            low = mid;
        }
    }

    Some(high)
}

/// Approximate probability at each requested year
pub fn probability_at_timepoints(
    projection: &GrowthProjection,
    timepoints: &[u32],
) -> BTreeMap<u32, f64> {
    timepoints
        .iter()
        .map(|&year| (year, projection.probability_at(year as f64)))
        .collect()
}
