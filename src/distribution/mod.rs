//! Outcome distribution statistics and time-based probability analysis

mod analytic;
mod critical;
mod outcome;

pub use analytic::{probability_at_timepoints, time_to_probability, GrowthProjection, SEARCH_TOLERANCE_YEARS};
pub use critical::{identify_critical_periods, volatility_by_step, CriticalPeriod};
pub use outcome::{Histogram, OutcomeDistribution, PARTIAL_CREDIT_FLOOR};
