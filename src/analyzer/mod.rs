//! Goal probability analysis
//!
//! - `ProbabilityAnalyzer`: cache-aside Monte Carlo analysis of one goal
//! - `ProbabilityResult`: the composed, serializable outcome
//! - Goal-type metrics and simulation-free estimates

mod engine;
mod estimate;
mod goal_metrics;
mod result;

pub use engine::{
    cache_disabled_by_env, AnalysisOptions, AnalyzerConfig, ProbabilityAnalyzer, DISABLE_CACHE_ENV,
    REPORTED_PERCENTILES,
};
pub use estimate::{
    estimate_probability, growth_projection, is_clearly_impossible, IMPOSSIBLE_MAX_YEARS,
    IMPOSSIBLE_TARGET_THRESHOLD, MIN_CONTRIBUTION_SHARE,
};
pub use goal_metrics::SAFE_WITHDRAWAL_RATE;
pub use result::{
    AnalysisIssue, DistributionSummary, GoalTypeMetrics, ProbabilityResult, ResultMetadata, ResultSource,
    RiskMetrics, TimeMetrics,
};
