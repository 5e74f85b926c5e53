//! Simulation-free checks and estimates
//!
//! The impossibility screen runs before any simulation; the growth projection
//! feeds the time metrics and the fallback estimate attached to failed runs.

use crate::assumptions::ReturnAssumptions;
use crate::distribution::GrowthProjection;
use crate::goal::GoalParameters;
use crate::simulation::{AllocationStrategy, ContributionPattern};

/// Targets above this are screened for impossibility
pub const IMPOSSIBLE_TARGET_THRESHOLD: f64 = 10_000_000.0;

/// Only horizons up to this many years are screened
pub const IMPOSSIBLE_MAX_YEARS: f64 = 5.0;

/// Contributions below this share of the required monthly saving fail the screen
pub const MIN_CONTRIBUTION_SHARE: f64 = 0.10;

/// Large target, short horizon and a contribution far below what is needed
pub fn is_clearly_impossible(params: &GoalParameters) -> bool {
    if params.target_amount <= IMPOSSIBLE_TARGET_THRESHOLD || params.timeframe_years > IMPOSSIBLE_MAX_YEARS {
        return false;
    }

    let months = params.months_remaining();
    if months <= 0.0 {
        return true;
    }
    let required_monthly = (params.target_amount - params.current_amount) / months;
    params.monthly_contribution < MIN_CONTRIBUTION_SHARE * required_monthly
}

/// Normal-approximation inputs at the starting allocation
pub fn growth_projection(
    params: &GoalParameters,
    strategy: &AllocationStrategy,
    contributions: &ContributionPattern,
    assumptions: &ReturnAssumptions,
) -> GrowthProjection {
    GrowthProjection {
        initial_amount: params.current_amount,
        annual_contribution: contributions.amount_for_year(1),
        expected_return: strategy.expected_return(assumptions, 0.0),
        volatility: strategy.volatility(assumptions, 0.0),
        target_amount: params.target_amount,
    }
}

/// Closed-form success probability at the goal's horizon
pub fn estimate_probability(params: &GoalParameters, assumptions: &ReturnAssumptions) -> Option<f64> {
    let projection = growth_projection(
        params,
        &params.allocation_strategy(),
        &params.contribution_pattern(),
        assumptions,
    );
    Some(projection.probability_at(params.timeframe_years)).filter(|p| p.is_finite())
}
