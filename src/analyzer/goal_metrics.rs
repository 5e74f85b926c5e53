//! Goal-type specific metrics

use super::result::GoalTypeMetrics;
use crate::distribution::OutcomeDistribution;
use crate::goal::{GoalParameters, GoalType};

/// Annual withdrawal rate considered sustainable in retirement
pub const SAFE_WITHDRAWAL_RATE: f64 = 0.04;

fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 {
        numerator / denominator
    } else {
        0.0
    }
}

pub fn compute(params: &GoalParameters, distribution: &OutcomeDistribution) -> GoalTypeMetrics {
    let median = distribution.median();
    let target = params.target_amount;

    match params.goal_type {
        GoalType::Retirement => {
            let sustainable_monthly_income = median * SAFE_WITHDRAWAL_RATE / 12.0;
            GoalTypeMetrics::Retirement {
                sustainable_monthly_income,
                withdrawal_rate: SAFE_WITHDRAWAL_RATE,
                income_replacement_ratio: params
                    .annual_income
                    .filter(|income| *income > 0.0)
                    .map(|income| sustainable_monthly_income * 12.0 / income),
            }
        }
        GoalType::Education => GoalTypeMetrics::Education {
            years_to_start: params.timeframe_years,
            funding_ratio: ratio(median, target),
        },
        GoalType::HomePurchase => {
            let readiness = ratio(distribution.percentile(0.25), target);
            GoalTypeMetrics::HomePurchase {
                down_payment_readiness: readiness,
                ready_at_p25: readiness >= 1.0,
            }
        }
        GoalType::EmergencyFund => {
            let expenses = params.monthly_expenses.filter(|e| *e > 0.0);
            GoalTypeMetrics::EmergencyFund {
                months_covered: expenses.map(|e| median / e),
                current_months_covered: expenses.map(|e| params.current_amount / e),
            }
        }
        GoalType::Custom => GoalTypeMetrics::Custom {
            funding_ratio: ratio(median, target),
        },
    }
}
