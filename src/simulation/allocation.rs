//! Asset allocation strategies with optional glide path and rebalancing

use crate::assumptions::{AssetClass, ReturnAssumptions};
use crate::error::SimulationError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Allowed deviation of the weight sum from 1.0
pub const WEIGHT_TOLERANCE: f64 = 0.01;

/// How often the portfolio is brought back to its target weights
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RebalanceFrequency {
    Annual,
    Quarterly,
    Monthly,
}

impl RebalanceFrequency {
    /// Parse a schedule name; "none" and unknown names disable rebalancing
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "annual" | "annually" | "yearly" => Some(RebalanceFrequency::Annual),
            "quarterly" | "quarter" => Some(RebalanceFrequency::Quarterly),
            "monthly" | "month" => Some(RebalanceFrequency::Monthly),
            _ => None,
        }
    }

    fn bonus_multiplier(&self) -> f64 {
        match self {
            RebalanceFrequency::Annual => 1.0,
            RebalanceFrequency::Quarterly => 1.25,
            RebalanceFrequency::Monthly => 1.5,
        }
    }
}

/// Weights per asset class, optionally gliding towards a target mix
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationStrategy {
    /// Weights at year 0
    pub initial: BTreeMap<AssetClass, f64>,

    /// Weights reached at the end of the glide path
    pub target: Option<BTreeMap<AssetClass, f64>>,

    /// Years over which `initial` moves linearly to `target`
    pub glide_path_years: u32,

    /// Rebalancing schedule; None disables the rebalancing bonus
    pub rebalancing: Option<RebalanceFrequency>,
}

impl AllocationStrategy {
    /// Static allocation with no glide path
    pub fn new(weights: BTreeMap<AssetClass, f64>) -> Self {
        Self {
            initial: weights,
            target: None,
            glide_path_years: 0,
            rebalancing: None,
        }
    }

    /// Default moderate mix used when a goal carries no usable allocation
    pub fn moderate() -> Self {
        Self::new(moderate_weights())
    }

    pub fn with_glide_path(mut self, target: BTreeMap<AssetClass, f64>, years: u32) -> Self {
        self.target = Some(target);
        self.glide_path_years = years;
        self
    }

    pub fn with_rebalancing(mut self, frequency: RebalanceFrequency) -> Self {
        self.rebalancing = Some(frequency);
        self
    }

    /// Weights after `year` elapsed years
    ///
    /// Linear interpolation between initial and target, clipped at the
    /// glide-path horizon.
    pub fn weights_at(&self, year: f64) -> BTreeMap<AssetClass, f64> {
        let target = match &self.target {
            Some(target) if self.glide_path_years > 0 => target,
            _ => return self.initial.clone(),
        };

        let progress = (year / self.glide_path_years as f64).clamp(0.0, 1.0);
        let mut weights = BTreeMap::new();
        for class in self.initial.keys().chain(target.keys()) {
            let from = self.initial.get(class).copied().unwrap_or(0.0);
            let to = target.get(class).copied().unwrap_or(0.0);
            weights.insert(*class, from + (to - from) * progress);
        }
        weights
    }

    /// Check the weight-sum invariant at every year of the horizon
    pub fn validate(&self, horizon_years: u32) -> Result<(), SimulationError> {
        for year in 0..=horizon_years {
            let weights = self.weights_at(year as f64);
            if weights.values().any(|w| *w < 0.0 || !w.is_finite()) {
                return Err(SimulationError::InvalidAllocation {
                    sum: weights.values().sum(),
                    year: year as f64,
                });
            }
            let sum: f64 = weights.values().sum();
            if (sum - 1.0).abs() > WEIGHT_TOLERANCE {
                return Err(SimulationError::InvalidAllocation { sum, year: year as f64 });
            }
            // Without a glide path every year has the same weights
            if self.target.is_none() {
                break;
            }
        }
        Ok(())
    }

    /// Expected real annual return at `year`, including any rebalancing bonus
    pub fn expected_return(&self, assumptions: &ReturnAssumptions, year: f64) -> f64 {
        let weights = self.weights_at(year);
        let base: f64 = weights
            .iter()
            .map(|(class, w)| w * assumptions.real_return(*class))
            .sum();
        base + self.rebalancing_bonus(assumptions, &weights)
    }

    /// Allocation-weighted annual volatility at `year`
    pub fn volatility(&self, assumptions: &ReturnAssumptions, year: f64) -> f64 {
        self.weights_at(year)
            .iter()
            .map(|(class, w)| w * assumptions.get(*class).volatility)
            .sum()
    }

    /// Extra annual return from disciplined rebalancing (0.1%..0.4%)
    fn rebalancing_bonus(
        &self,
        assumptions: &ReturnAssumptions,
        weights: &BTreeMap<AssetClass, f64>,
    ) -> f64 {
        let frequency = match self.rebalancing {
            Some(frequency) => frequency,
            None => return 0.0,
        };

        let held: Vec<f64> = weights
            .iter()
            .filter(|(_, w)| **w > 0.0)
            .map(|(class, _)| assumptions.get(*class).volatility)
            .collect();
        if held.len() < 2 {
            return 0.0;
        }

        let max_vol = held.iter().cloned().fold(f64::MIN, f64::max);
        let min_vol = held.iter().cloned().fold(f64::MAX, f64::min);
        let bonus = 0.001 + 0.0005 * (held.len() - 2) as f64 + 0.02 * (max_vol - min_vol);

        (bonus * frequency.bonus_multiplier()).clamp(0.001, 0.004)
    }

    /// Stable textual form used in cache fingerprints
    pub fn signature(&self) -> String {
        let fmt_weights = |weights: &BTreeMap<AssetClass, f64>| {
            weights
                .iter()
                .map(|(class, w)| format!("{}={:.4}", class, w))
                .collect::<Vec<_>>()
                .join(",")
        };

        let mut sig = fmt_weights(&self.initial);
        if let Some(target) = &self.target {
            sig.push_str(&format!("->{}@{}", fmt_weights(target), self.glide_path_years));
        }
        if let Some(frequency) = self.rebalancing {
            sig.push_str(&format!("|rebalance={:?}", frequency));
        }
        sig
    }
}

impl Default for AllocationStrategy {
    fn default() -> Self {
        Self::moderate()
    }
}

/// equity 60% / debt 30% / gold 5% / cash 5%
pub fn moderate_weights() -> BTreeMap<AssetClass, f64> {
    BTreeMap::from([
        (AssetClass::Equity, 0.60),
        (AssetClass::Debt, 0.30),
        (AssetClass::Gold, 0.05),
        (AssetClass::Cash, 0.05),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn aggressive() -> BTreeMap<AssetClass, f64> {
        BTreeMap::from([(AssetClass::Equity, 0.9), (AssetClass::Debt, 0.1)])
    }

    fn conservative() -> BTreeMap<AssetClass, f64> {
        BTreeMap::from([(AssetClass::Equity, 0.3), (AssetClass::Debt, 0.7)])
    }

    #[test]
    fn test_glide_path_interpolation() {
        let strategy = AllocationStrategy::new(aggressive()).with_glide_path(conservative(), 10);

        let start = strategy.weights_at(0.0);
        assert_abs_diff_eq!(start[&AssetClass::Equity], 0.9, epsilon = 1e-12);

        let mid = strategy.weights_at(5.0);
        assert_abs_diff_eq!(mid[&AssetClass::Equity], 0.6, epsilon = 1e-12);
        assert_abs_diff_eq!(mid[&AssetClass::Debt], 0.4, epsilon = 1e-12);

        // Clipped at the glide-path horizon
        let late = strategy.weights_at(25.0);
        assert_abs_diff_eq!(late[&AssetClass::Equity], 0.3, epsilon = 1e-12);
    }

    #[test]
    fn test_glide_path_keeps_weight_sum() {
        let strategy = AllocationStrategy::moderate().with_glide_path(conservative(), 7);
        assert!(strategy.validate(20).is_ok());
        for year in 0..20 {
            let sum: f64 = strategy.weights_at(year as f64).values().sum();
            assert_abs_diff_eq!(sum, 1.0, epsilon = WEIGHT_TOLERANCE);
        }
    }

    #[test]
    fn test_validate_rejects_bad_sum() {
        let strategy = AllocationStrategy::new(BTreeMap::from([(AssetClass::Equity, 0.7)]));
        match strategy.validate(10) {
            Err(SimulationError::InvalidAllocation { sum, .. }) => {
                assert_abs_diff_eq!(sum, 0.7, epsilon = 1e-12)
            }
            other => panic!("expected InvalidAllocation, got {:?}", other),
        }
    }

    #[test]
    fn test_expected_return_and_volatility() {
        let assumptions = ReturnAssumptions::default_market();
        let strategy = AllocationStrategy::moderate();

        // 0.6*0.12 + 0.3*0.07 + 0.05*0.08 + 0.05*0.04 - 0.06
        assert_abs_diff_eq!(strategy.expected_return(&assumptions, 0.0), 0.039, epsilon = 1e-9);
        // 0.6*0.18 + 0.3*0.05 + 0.05*0.15 + 0.05*0.01
        assert_abs_diff_eq!(strategy.volatility(&assumptions, 0.0), 0.131, epsilon = 1e-9);
    }

    #[test]
    fn test_rebalancing_bonus_bounds() {
        let assumptions = ReturnAssumptions::default_market();
        let plain = AllocationStrategy::moderate();
        let annual = plain.clone().with_rebalancing(RebalanceFrequency::Annual);
        let monthly = plain.clone().with_rebalancing(RebalanceFrequency::Monthly);

        let base = plain.expected_return(&assumptions, 0.0);
        let annual_bonus = annual.expected_return(&assumptions, 0.0) - base;
        let monthly_bonus = monthly.expected_return(&assumptions, 0.0) - base;

        assert!(annual_bonus >= 0.001 - 1e-12 && annual_bonus <= 0.004 + 1e-12);
        assert!(monthly_bonus >= annual_bonus);
        assert!(monthly_bonus <= 0.004 + 1e-12);
    }

    #[test]
    fn test_single_asset_has_no_rebalancing_bonus() {
        let assumptions = ReturnAssumptions::default_market();
        let strategy = AllocationStrategy::new(BTreeMap::from([(AssetClass::Equity, 1.0)]))
            .with_rebalancing(RebalanceFrequency::Monthly);
        assert_abs_diff_eq!(strategy.expected_return(&assumptions, 0.0), 0.06, epsilon = 1e-12);
    }

    #[test]
    fn test_signature_reflects_glide_path() {
        let plain = AllocationStrategy::moderate();
        let glide = plain.clone().with_glide_path(conservative(), 10);
        assert_ne!(plain.signature(), glide.signature());
    }
}
