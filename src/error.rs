//! Error types for parameter parsing, simulation and cache persistence
//!
//! Nothing in here crosses the `ProbabilityAnalyzer` boundary as an error:
//! the analyzer converts every variant into a well-formed result.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while normalizing raw goal input
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ParameterError {
    #[error("missing required field: {0}")]
    Missing(&'static str),
    #[error("field {field} is not a valid number: {value}")]
    NotANumber { field: &'static str, value: String },
    #[error("field {field} must be positive, got {value}")]
    NonPositive { field: &'static str, value: f64 },
    #[error("field {field} must not be negative, got {value}")]
    Negative { field: &'static str, value: f64 },
    #[error("invalid timeframe: {0}")]
    InvalidTimeframe(String),
}

/// Errors raised by the trajectory simulator and the parallel coordinator
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SimulationError {
    #[error("invalid simulation parameters: {0}")]
    InvalidParameters(String),
    #[error("allocation weights sum to {sum:.4} at year {year}, expected 1.0")]
    InvalidAllocation { sum: f64, year: f64 },
    #[error("simulation produced non-finite values at year {0}")]
    NonFinite(u32),
    #[error("no parallel worker returned a usable batch ({0} batches attempted)")]
    AllWorkersFailed(usize),
    #[error("worker batch {index} failed: {reason}")]
    BatchFailed { index: usize, reason: String },
}

/// Errors raised while persisting the simulation cache
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("cache serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// User-facing classification of a failed analysis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    InvalidParameters,
    InvalidAllocation,
    ConvergenceFailure,
    WorkerFailure,
}

impl ErrorCategory {
    /// Suggested fix shown alongside the error
    pub fn remedy(&self) -> &'static str {
        match self {
            ErrorCategory::InvalidParameters => {
                "Check that the target amount and timeframe are positive and well formed"
            }
            ErrorCategory::InvalidAllocation => {
                "Adjust the asset allocation so the weights add up to 100%"
            }
            ErrorCategory::ConvergenceFailure => {
                "Reduce the horizon or volatility of the allocation and retry"
            }
            ErrorCategory::WorkerFailure => {
                "Retry without parallel execution or with fewer workers"
            }
        }
    }
}

impl From<&ParameterError> for ErrorCategory {
    fn from(_: &ParameterError) -> Self {
        ErrorCategory::InvalidParameters
    }
}

impl SimulationError {
    /// Classify the error for reporting
    pub fn category(&self) -> ErrorCategory {
        match self {
            SimulationError::InvalidParameters(_) => ErrorCategory::InvalidParameters,
            SimulationError::InvalidAllocation { .. } => ErrorCategory::InvalidAllocation,
            SimulationError::NonFinite(_) => ErrorCategory::ConvergenceFailure,
            SimulationError::AllWorkersFailed(_) | SimulationError::BatchFailed { .. } => {
                ErrorCategory::WorkerFailure
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simulation_error_categories() {
        let err = SimulationError::InvalidAllocation { sum: 0.8, year: 0.0 };
        assert_eq!(err.category(), ErrorCategory::InvalidAllocation);
        assert!(err.to_string().contains("0.8000"));

        let err = SimulationError::AllWorkersFailed(4);
        assert_eq!(err.category(), ErrorCategory::WorkerFailure);
        assert!(!err.category().remedy().is_empty());
    }

    #[test]
    fn test_category_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorCategory::ConvergenceFailure).unwrap();
        assert_eq!(json, "\"convergence_failure\"");
    }
}
