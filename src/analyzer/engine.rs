//! Goal probability analysis
//!
//! Each call walks the same stages: parse parameters, screen for impossible
//! goals, build strategies, look up the cache, simulate, fold the paths into
//! the goal's distribution, compose the result and store it. Every failure
//! becomes a well-formed zero-probability result.

use super::estimate::{estimate_probability, growth_projection, is_clearly_impossible};
use super::goal_metrics;
use super::result::{
    AnalysisIssue, DistributionSummary, ProbabilityResult, ResultMetadata, ResultSource, RiskMetrics,
    TimeMetrics,
};
use crate::assumptions::ReturnAssumptions;
use crate::cache::{Fingerprint, SimulationCache};
use crate::distribution::OutcomeDistribution;
use crate::error::ParameterError;
use crate::goal::{check_timeframe, GoalParameters, RawGoal};
use crate::simulation::{
    AllocationStrategy, ContributionPattern, ExecutionMode, ParallelConfig, ParallelCoordinator,
    SimulationRequest, TrajectoryMatrix, TrajectorySimulator,
};
use log::{debug, info, warn};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

/// Environment variable that bypasses the result cache when set to 1/true/yes
pub const DISABLE_CACHE_ENV: &str = "GOAL_PROBABILITY_DISABLE_CACHE";

/// Percentiles reported in the distribution summary
pub const REPORTED_PERCENTILES: [u8; 5] = [10, 25, 50, 75, 90];

/// Whether the cache bypass variable is set; read on every call
pub fn cache_disabled_by_env() -> bool {
    std::env::var(DISABLE_CACHE_ENV)
        .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(false)
}

/// Per-request knobs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnalysisOptions {
    pub simulations: usize,
    pub seed: u64,
    pub use_parallel: bool,
    pub use_cache: bool,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            simulations: 1000,
            seed: 42,
            use_parallel: false,
            use_cache: true,
        }
    }
}

/// Analyzer-wide settings
#[derive(Debug, Clone)]
pub struct AnalyzerConfig {
    pub assumptions: ReturnAssumptions,
    pub parallel: ParallelConfig,
    pub execution_mode: ExecutionMode,
    /// Years at which the approximate probability is reported
    pub timepoints: Vec<u32>,
    pub histogram_bins: usize,
    /// Fraction of peak volatility that marks a critical period
    pub critical_threshold: f64,
    /// Outcomes below `target * shortfall_threshold` count as shortfall
    pub shortfall_threshold: f64,
    /// Outcomes at or above `target * upside_threshold` count as upside
    pub upside_threshold: f64,
    pub var_confidence: f64,
    /// Upper bound of the time-to-probability search
    pub max_search_years: f64,
    /// Terminal values kept per goal across repeated runs
    pub max_accumulated_outcomes: usize,
    /// Goals whose distributions are kept; the least recently analyzed goes first
    pub max_tracked_goals: usize,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            assumptions: ReturnAssumptions::default(),
            parallel: ParallelConfig::default(),
            execution_mode: ExecutionMode::default(),
            timepoints: vec![1, 3, 5, 10, 15, 20, 25, 30],
            histogram_bins: 20,
            critical_threshold: 0.9,
            shortfall_threshold: 0.8,
            upside_threshold: 1.2,
            var_confidence: 0.95,
            max_search_years: 50.0,
            max_accumulated_outcomes: 10_000,
            max_tracked_goals: 256,
        }
    }
}

/// Accumulated outcomes for one goal, tied to the fingerprint that produced them
#[derive(Debug, Default)]
struct GoalDistribution {
    fingerprint: String,
    distribution: OutcomeDistribution,
}

#[derive(Debug)]
struct TrackedGoal {
    last_used: u64,
    goal: Arc<Mutex<GoalDistribution>>,
}

/// Per-goal distributions, bounded by `max_tracked_goals`
#[derive(Debug, Default)]
struct GoalRegistry {
    clock: u64,
    goals: HashMap<String, TrackedGoal>,
}

impl GoalRegistry {
    fn get(&self, goal_id: &str) -> Option<Arc<Mutex<GoalDistribution>>> {
        self.goals.get(goal_id).map(|tracked| Arc::clone(&tracked.goal))
    }

    fn touch(&mut self, goal_id: &str, capacity: usize) -> Arc<Mutex<GoalDistribution>> {
        self.clock += 1;
        let clock = self.clock;
        if let Some(tracked) = self.goals.get_mut(goal_id) {
            tracked.last_used = clock;
            return Arc::clone(&tracked.goal);
        }

        while self.goals.len() >= capacity.max(1) {
            let Some(oldest) = self
                .goals
                .iter()
                .min_by_key(|(_, tracked)| tracked.last_used)
                .map(|(id, _)| id.clone())
            else {
                break;
            };
            debug!("Dropping accumulated outcomes for goal {}", oldest);
            self.goals.remove(&oldest);
        }

        let goal = Arc::new(Mutex::new(GoalDistribution::default()));
        self.goals.insert(
            goal_id.to_string(),
            TrackedGoal {
                last_used: clock,
                goal: Arc::clone(&goal),
            },
        );
        goal
    }

    fn len(&self) -> usize {
        self.goals.len()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Monte Carlo goal analyzer with a shared result cache
pub struct ProbabilityAnalyzer {
    config: AnalyzerConfig,
    simulator: TrajectorySimulator,
    cache: Arc<SimulationCache<ProbabilityResult>>,
    distributions: Mutex<GoalRegistry>,
    simulations_run: AtomicU64,
    analyses_run: AtomicU64,
}

impl ProbabilityAnalyzer {
    pub fn new(config: AnalyzerConfig, cache: Arc<SimulationCache<ProbabilityResult>>) -> Self {
        let simulator = TrajectorySimulator::new(config.assumptions.clone()).with_mode(config.execution_mode);
        Self {
            config,
            simulator,
            cache,
            distributions: Mutex::new(GoalRegistry::default()),
            simulations_run: AtomicU64::new(0),
            analyses_run: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<SimulationCache<ProbabilityResult>> {
        &self.cache
    }

    /// Trajectories simulated over the analyzer's lifetime
    pub fn total_simulations(&self) -> u64 {
        self.simulations_run.load(Ordering::Relaxed)
    }

    pub fn total_analyses(&self) -> u64 {
        self.analyses_run.load(Ordering::Relaxed)
    }

    /// Number of outcomes accumulated for a goal
    pub fn accumulated_outcomes(&self, goal_id: &str) -> usize {
        let entry = lock(&self.distributions).get(goal_id);
        entry.map(|goal| lock(&goal).distribution.len()).unwrap_or(0)
    }

    /// Number of goals with accumulated outcomes
    pub fn tracked_goals(&self) -> usize {
        lock(&self.distributions).len()
    }

    /// Analyze a loosely typed goal
    pub fn analyze(&self, raw: &RawGoal, options: &AnalysisOptions) -> ProbabilityResult {
        match GoalParameters::from_raw(raw) {
            Ok(params) => self.analyze_parameters(&params, options),
            Err(e) => {
                self.analyses_run.fetch_add(1, Ordering::Relaxed);
                self.invalid_parameters(raw.goal_id(), &e, options)
            }
        }
    }

    /// Analyze an already normalized goal
    pub fn analyze_parameters(&self, params: &GoalParameters, options: &AnalysisOptions) -> ProbabilityResult {
        self.analyses_run.fetch_add(1, Ordering::Relaxed);
        let started = Instant::now();

        if let Err(e) = check_parameters(params) {
            return self.invalid_parameters(params.goal_id.clone(), &e, options);
        }

        debug!("Goal {}: impossibility check", params.goal_id);
        if is_clearly_impossible(params) {
            info!(
                "Goal {} cannot reach {:.0} in {:.2} years, skipping simulation",
                params.goal_id, params.target_amount, params.timeframe_years
            );
            return ProbabilityResult::zero(
                params.goal_id.clone(),
                ResultSource::ImpossibilityShortCircuit,
                options.seed,
            );
        }

        debug!("Goal {}: building strategies", params.goal_id);
        let strategy = params.allocation_strategy();
        let contributions = params.contribution_pattern();
        let key = self.cache_key(params, &strategy, &contributions, options);

        let use_cache = options.use_cache && !cache_disabled_by_env();
        if use_cache {
            if let Some(hit) = self.cache.get(&key) {
                debug!("Goal {}: cache hit {}", params.goal_id, key);
                return hit;
            }
            debug!("Goal {}: cache miss {}", params.goal_id, key);
        }

        let request = SimulationRequest {
            initial_amount: params.current_amount,
            contributions: contributions.clone(),
            years: params.horizon_years(),
            allocation: strategy.clone(),
            simulations: options.simulations,
            seed: options.seed,
        };

        let outcome = if options.use_parallel {
            ParallelCoordinator::new(self.simulator.clone(), self.config.parallel.clone()).run(&request)
        } else {
            self.simulator.simulate(&request)
        };

        let matrix = match outcome {
            Ok(matrix) => matrix,
            Err(e) => {
                warn!("Simulation failed for goal {}: {}", params.goal_id, e);
                let estimate = estimate_probability(params, &self.config.assumptions);
                let mut result =
                    ProbabilityResult::zero(params.goal_id.clone(), ResultSource::SimulationFailure, options.seed)
                        .with_error(AnalysisIssue::from_simulation_error(&e, estimate));
                result.metadata.elapsed_ms = started.elapsed().as_millis() as u64;
                result.metadata.cache_key = Some(key);
                return result;
            }
        };
        self.simulations_run
            .fetch_add(matrix.simulations() as u64, Ordering::Relaxed);

        let result = self.compose(params, &strategy, &contributions, &matrix, &key, options, started);
        if use_cache {
            self.cache.set(key, result.clone(), None);
        }
        result
    }

    /// Cache key over every input that changes the result
    pub fn cache_key(
        &self,
        params: &GoalParameters,
        strategy: &AllocationStrategy,
        contributions: &ContributionPattern,
        options: &AnalysisOptions,
    ) -> String {
        Fingerprint::new(format!("goal:{}", params.goal_id))
            .field("goal_type", params.goal_type)
            .field("target", format!("{:.2}", params.target_amount))
            .field("current", format!("{:.2}", params.current_amount))
            .field("monthly", format!("{:.2}", params.monthly_contribution))
            .field("years", format!("{:.6}", params.timeframe_years))
            .field("simulations", options.simulations)
            .field("seed", options.seed)
            .field("parallel", options.use_parallel)
            .field("allocation", strategy.signature())
            .field("contributions", contributions.signature())
            .field("frequency", format!("{:?}", params.contribution_frequency))
            .field("income", format!("{:?}", params.annual_income))
            .field("expenses", format!("{:?}", params.monthly_expenses))
            .field("assumptions", self.config.assumptions.signature())
            .key()
    }

    fn invalid_parameters(
        &self,
        goal_id: String,
        error: &ParameterError,
        options: &AnalysisOptions,
    ) -> ProbabilityResult {
        warn!("Invalid parameters for goal {}: {}", goal_id, error);
        ProbabilityResult::zero(goal_id, ResultSource::InvalidParameters, options.seed)
            .with_error(AnalysisIssue::from_parameter_error(error))
    }

    fn goal_distribution(&self, goal_id: &str) -> Arc<Mutex<GoalDistribution>> {
        lock(&self.distributions).touch(goal_id, self.config.max_tracked_goals)
    }

    #[allow(clippy::too_many_arguments)]
    fn compose(
        &self,
        params: &GoalParameters,
        strategy: &AllocationStrategy,
        contributions: &ContributionPattern,
        matrix: &TrajectoryMatrix,
        key: &str,
        options: &AnalysisOptions,
        started: Instant,
    ) -> ProbabilityResult {
        let goal = self.goal_distribution(&params.goal_id);
        let mut goal = lock(&goal);
        // Outcomes accumulate only while the inputs stay the same
        if goal.fingerprint != key {
            goal.distribution.clear();
            goal.fingerprint = key.to_string();
        }
        goal.distribution.add_trajectories(matrix);
        // Newest outcomes only, and paths from this run alone
        goal.distribution
            .retain_latest(self.config.max_accumulated_outcomes.max(matrix.simulations()), matrix.simulations());
        let distribution = &goal.distribution;

        let target = params.target_amount;
        let config = &self.config;
        let success_probability = distribution.success_probability(target);

        let summary = DistributionSummary {
            percentiles: REPORTED_PERCENTILES
                .iter()
                .map(|&p| (p, distribution.percentile(p as f64 / 100.0)))
                .collect(),
            mean: distribution.mean(),
            median: distribution.median(),
            std_dev: distribution.std_dev(),
            min: distribution.min(),
            max: distribution.max(),
            histogram: distribution.calculate_histogram(config.histogram_bins),
        };

        let risk = RiskMetrics {
            portfolio_volatility: strategy.volatility(&config.assumptions, 0.0),
            value_at_risk_95: distribution.value_at_risk(config.var_confidence),
            conditional_value_at_risk_95: distribution.conditional_value_at_risk(config.var_confidence),
        };

        let projection = growth_projection(params, strategy, contributions, &config.assumptions);
        let time = TimeMetrics {
            probability_at_timepoints: distribution
                .calculate_probability_at_timepoints(&config.timepoints, &projection),
            years_to_50_percent: distribution.calculate_time_to_goal_probability(
                0.5,
                &projection,
                config.max_search_years,
            ),
            years_to_75_percent: distribution.calculate_time_to_goal_probability(
                0.75,
                &projection,
                config.max_search_years,
            ),
            years_to_90_percent: distribution.calculate_time_to_goal_probability(
                0.9,
                &projection,
                config.max_search_years,
            ),
            critical_periods: distribution.critical_periods(config.critical_threshold),
        };

        let result = ProbabilityResult {
            success_probability,
            failure_probability: 1.0 - success_probability,
            shortfall_risk: distribution.shortfall_risk(target, config.shortfall_threshold),
            upside_probability: distribution.upside_probability(target, config.upside_threshold),
            distribution: summary,
            risk,
            time,
            goal_metrics: Some(goal_metrics::compute(params, distribution)),
            metadata: ResultMetadata {
                goal_id: params.goal_id.clone(),
                source: ResultSource::Simulation,
                simulations_run: matrix.simulations(),
                seed: options.seed,
                elapsed_ms: started.elapsed().as_millis() as u64,
                cache_key: Some(key.to_string()),
                computed_at: chrono::Utc::now().to_rfc3339(),
            },
            error: None,
        };

        info!(
            "Goal {}: success probability {:.3} from {} outcomes",
            params.goal_id,
            result.success_probability,
            distribution.len()
        );
        result
    }
}

/// Reject values the simulator cannot work with
fn check_parameters(params: &GoalParameters) -> Result<(), ParameterError> {
    if !params.target_amount.is_finite() || params.target_amount <= 0.0 {
        return Err(ParameterError::NonPositive {
            field: "target_amount",
            value: params.target_amount,
        });
    }
    check_timeframe(params.timeframe_years)?;
    for (field, value) in [
        ("current_amount", params.current_amount),
        ("monthly_contribution", params.monthly_contribution),
    ] {
        if !value.is_finite() || value < 0.0 {
            return Err(ParameterError::Negative { field, value });
        }
    }
    Ok(())
}
