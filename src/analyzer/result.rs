//! Probability analysis results
//!
//! Every field is finite: failed or short-circuited analyses are reported as
//! zero-probability results rather than NaN, so results survive a JSON round
//! trip into the cache file unchanged.

use crate::distribution::{CriticalPeriod, Histogram};
use crate::error::{ErrorCategory, ParameterError, SimulationError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// How a result was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultSource {
    Simulation,
    ImpossibilityShortCircuit,
    InvalidParameters,
    SimulationFailure,
}

/// Percentiles and moments of the terminal values
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DistributionSummary {
    /// Keyed by percentile (10, 25, 50, 75, 90)
    pub percentiles: BTreeMap<u8, f64>,
    pub mean: f64,
    pub median: f64,
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
    pub histogram: Histogram,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RiskMetrics {
    /// Allocation volatility at year 0
    pub portfolio_volatility: f64,
    pub value_at_risk_95: f64,
    pub conditional_value_at_risk_95: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TimeMetrics {
    /// Approximate success probability keyed by year from now
    pub probability_at_timepoints: BTreeMap<u32, f64>,
    pub years_to_50_percent: Option<f64>,
    pub years_to_75_percent: Option<f64>,
    pub years_to_90_percent: Option<f64>,
    pub critical_periods: Vec<CriticalPeriod>,
}

/// Metrics specific to the goal's type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "goal_type", rename_all = "snake_case")]
pub enum GoalTypeMetrics {
    Retirement {
        /// Monthly income the median corpus sustains at the withdrawal rate
        sustainable_monthly_income: f64,
        withdrawal_rate: f64,
        /// Sustainable income over current income, when income is known
        income_replacement_ratio: Option<f64>,
    },
    Education {
        years_to_start: f64,
        /// Median outcome over target
        funding_ratio: f64,
    },
    HomePurchase {
        /// Pessimistic (p25) outcome over target
        down_payment_readiness: f64,
        ready_at_p25: bool,
    },
    EmergencyFund {
        /// Months of expenses the median outcome covers
        months_covered: Option<f64>,
        /// Months of expenses already saved
        current_months_covered: Option<f64>,
    },
    Custom {
        funding_ratio: f64,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultMetadata {
    pub goal_id: String,
    pub source: ResultSource,
    pub simulations_run: usize,
    pub seed: u64,
    pub elapsed_ms: u64,
    pub cache_key: Option<String>,
    /// RFC 3339 timestamp of the computation
    pub computed_at: String,
}

/// Classified failure attached to a degraded result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisIssue {
    pub category: ErrorCategory,
    pub message: String,
    pub remedy: String,
    /// Closed-form estimate offered in place of the simulated probability
    pub estimated_probability: Option<f64>,
}

impl AnalysisIssue {
    pub fn from_parameter_error(error: &ParameterError) -> Self {
        let category = ErrorCategory::from(error);
        Self {
            category,
            message: error.to_string(),
            remedy: category.remedy().to_string(),
            estimated_probability: None,
        }
    }

    pub fn from_simulation_error(error: &SimulationError, estimate: Option<f64>) -> Self {
        let category = error.category();
        Self {
            category,
            message: error.to_string(),
            remedy: category.remedy().to_string(),
            estimated_probability: estimate,
        }
    }
}

/// Outcome of one goal analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbabilityResult {
    pub success_probability: f64,
    pub failure_probability: f64,
    /// Probability of ending below 80% of target
    pub shortfall_risk: f64,
    /// Probability of ending at or above 120% of target
    pub upside_probability: f64,
    pub distribution: DistributionSummary,
    pub risk: RiskMetrics,
    pub time: TimeMetrics,
    pub goal_metrics: Option<GoalTypeMetrics>,
    pub metadata: ResultMetadata,
    pub error: Option<AnalysisIssue>,
}

impl ProbabilityResult {
    /// Zero-probability result with empty statistics
    pub fn zero(goal_id: impl Into<String>, source: ResultSource, seed: u64) -> Self {
        Self {
            success_probability: 0.0,
            failure_probability: 1.0,
            shortfall_risk: 1.0,
            upside_probability: 0.0,
            distribution: DistributionSummary::default(),
            risk: RiskMetrics::default(),
            time: TimeMetrics::default(),
            goal_metrics: None,
            metadata: ResultMetadata {
                goal_id: goal_id.into(),
                source,
                simulations_run: 0,
                seed,
                elapsed_ms: 0,
                cache_key: None,
                computed_at: chrono::Utc::now().to_rfc3339(),
            },
            error: None,
        }
    }

    pub fn with_error(mut self, issue: AnalysisIssue) -> Self {
        self.error = Some(issue);
        self
    }

    pub fn is_degraded(&self) -> bool {
        self.error.is_some()
    }
}
