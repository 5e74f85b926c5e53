//! Asset classes and their capital-market return assumptions

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Asset classes a goal can be allocated across
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetClass {
    Equity,
    Debt,
    Gold,
    Cash,
    RealEstate,
}

impl AssetClass {
    pub const ALL: [AssetClass; 5] = [
        AssetClass::Equity,
        AssetClass::Debt,
        AssetClass::Gold,
        AssetClass::Cash,
        AssetClass::RealEstate,
    ];

    /// Parse a user-supplied key, case-insensitively and with common aliases
    pub fn parse(key: &str) -> Option<Self> {
        let normalized = key.trim().to_ascii_lowercase().replace([' ', '-'], "_");
        match normalized.as_str() {
            "equity" | "equities" | "stocks" | "stock" | "shares" => Some(AssetClass::Equity),
            "debt" | "bonds" | "bond" | "fixed_income" => Some(AssetClass::Debt),
            "gold" | "commodities" => Some(AssetClass::Gold),
            "cash" | "liquid" | "money_market" => Some(AssetClass::Cash),
            "real_estate" | "realestate" | "property" | "reits" => Some(AssetClass::RealEstate),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AssetClass::Equity => "equity",
            AssetClass::Debt => "debt",
            AssetClass::Gold => "gold",
            AssetClass::Cash => "cash",
            AssetClass::RealEstate => "real_estate",
        }
    }
}

impl fmt::Display for AssetClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Annual nominal return distribution for one asset class
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AssetReturn {
    /// Mean annual nominal return
    pub expected_return: f64,
    /// Standard deviation of the annual return
    pub volatility: f64,
}

/// Return assumptions for every asset class plus the inflation rate
///
/// Expected returns are nominal; the simulator works in today's money, so
/// `real_return` deflates them by `inflation_rate`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReturnAssumptions {
    pub asset_returns: BTreeMap<AssetClass, AssetReturn>,
    pub inflation_rate: f64,
}

impl ReturnAssumptions {
    /// Long-run assumptions for Indian markets
    pub fn default_market() -> Self {
        let asset_returns = [
            (AssetClass::Equity, 0.12, 0.18),
            (AssetClass::Debt, 0.07, 0.05),
            (AssetClass::Gold, 0.08, 0.15),
            (AssetClass::Cash, 0.04, 0.01),
            (AssetClass::RealEstate, 0.09, 0.14),
        ]
        .into_iter()
        .map(|(class, expected_return, volatility)| {
            (class, AssetReturn { expected_return, volatility })
        })
        .collect();

        Self {
            asset_returns,
            inflation_rate: 0.06,
        }
    }

    /// Nominal assumptions for an asset class (zero return if unknown)
    pub fn get(&self, class: AssetClass) -> AssetReturn {
        self.asset_returns
            .get(&class)
            .copied()
            .unwrap_or(AssetReturn { expected_return: 0.0, volatility: 0.0 })
    }

    /// Expected annual return net of inflation
    pub fn real_return(&self, class: AssetClass) -> f64 {
        self.get(class).expected_return - self.inflation_rate
    }

    /// Stable textual form used in cache fingerprints
    pub fn signature(&self) -> String {
        let mut parts: Vec<String> = self
            .asset_returns
            .iter()
            .map(|(class, r)| format!("{}={:.6}/{:.6}", class, r.expected_return, r.volatility))
            .collect();
        parts.push(format!("inflation={:.6}", self.inflation_rate));
        parts.join(",")
    }
}

impl Default for ReturnAssumptions {
    fn default() -> Self {
        Self::default_market()
    }
}
