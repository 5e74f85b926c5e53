//! Goal Probability Engine - Monte Carlo estimation of financial goal success
//!
//! This library provides:
//! - Goal normalization from loosely typed input
//! - Stochastic portfolio trajectory simulation (sequential and parallel)
//! - Outcome distribution statistics and time-based probability analysis
//! - LRU/TTL result caching with atomic disk persistence
//! - Goal analysis composing all of the above into a serializable result

pub mod analyzer;
pub mod assumptions;
pub mod cache;
pub mod distribution;
pub mod error;
pub mod goal;
pub mod simulation;

// Re-export commonly used types
pub use analyzer::{AnalysisOptions, AnalyzerConfig, ProbabilityAnalyzer, ProbabilityResult};
pub use assumptions::{AssetClass, ReturnAssumptions};
pub use cache::{CacheConfig, CacheService, SimulationCache};
pub use distribution::OutcomeDistribution;
pub use error::{CacheError, ErrorCategory, ParameterError, SimulationError};
pub use goal::{GoalParameters, GoalType, RawGoal};
pub use simulation::{ParallelCoordinator, SimulationRequest, TrajectorySimulator};
