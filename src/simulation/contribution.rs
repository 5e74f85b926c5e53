//! Contribution schedules

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// How often the investor contributes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContributionFrequency {
    #[default]
    Monthly,
    Quarterly,
    Annual,
}

impl ContributionFrequency {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "monthly" | "month" | "sip" => Some(ContributionFrequency::Monthly),
            "quarterly" | "quarter" => Some(ContributionFrequency::Quarterly),
            "annual" | "annually" | "yearly" | "lumpsum" | "lump_sum" => {
                Some(ContributionFrequency::Annual)
            }
            _ => None,
        }
    }

    /// Multiplier on the annual contribution for dollar-cost averaging
    /// (money invested through the year rather than at year end)
    pub fn adjustment(&self) -> f64 {
        match self {
            ContributionFrequency::Monthly => 1.02,
            ContributionFrequency::Quarterly => 1.01,
            ContributionFrequency::Annual => 1.0,
        }
    }
}

/// Annual contribution schedule
///
/// Year `t` (1-indexed) contributes `overrides[t]` when present, otherwise
/// `annual_amount * (1 + growth_rate)^(t-1)`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ContributionPattern {
    pub annual_amount: f64,
    pub growth_rate: f64,
    pub overrides: BTreeMap<u32, f64>,
}

impl ContributionPattern {
    /// Flat annual amount with a yearly step-up
    pub fn flat(annual_amount: f64, growth_rate: f64) -> Self {
        Self {
            annual_amount,
            growth_rate,
            overrides: BTreeMap::new(),
        }
    }

    /// Build from a monthly figure, applying the frequency adjustment
    pub fn from_monthly(monthly: f64, frequency: ContributionFrequency, growth_rate: f64) -> Self {
        Self::flat(monthly * 12.0 * frequency.adjustment(), growth_rate)
    }

    pub fn with_overrides(mut self, overrides: BTreeMap<u32, f64>) -> Self {
        self.overrides = overrides;
        self
    }

    /// Contribution added at the end of `year`; year 0 has none
    pub fn amount_for_year(&self, year: u32) -> f64 {
        if year == 0 {
            return 0.0;
        }
        if let Some(amount) = self.overrides.get(&year) {
            return *amount;
        }
        self.annual_amount * (1.0 + self.growth_rate).powi(year as i32 - 1)
    }

    /// Contributions for years 1..=years
    pub fn schedule(&self, years: u32) -> Vec<f64> {
        (1..=years).map(|year| self.amount_for_year(year)).collect()
    }

    /// Stable textual form used in cache fingerprints
    pub fn signature(&self) -> String {
        let mut sig = format!("{:.2}@{:.6}", self.annual_amount, self.growth_rate);
        for (year, amount) in &self.overrides {
            sig.push_str(&format!(";{}={:.2}", year, amount));
        }
        sig
    }
}
