//! Normalized goal parameters

use super::raw::RawGoal;
use crate::assumptions::AssetClass;
use crate::error::ParameterError;
use crate::simulation::{
    moderate_weights, AllocationStrategy, ContributionFrequency, ContributionPattern, RebalanceFrequency,
    WEIGHT_TOLERANCE,
};
use chrono::{DateTime, NaiveDate, Utc};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Days per year used to turn target dates into fractional years
pub const DAYS_PER_YEAR: f64 = 365.25;

/// Longest timeframe the simulator accepts, in years
pub const MAX_TIMEFRAME_YEARS: f64 = 100.0;

/// Kind of financial goal; selects the goal-specific metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalType {
    Retirement,
    Education,
    HomePurchase,
    EmergencyFund,
    #[default]
    Custom,
}

impl GoalType {
    /// Unknown names fall back to `Custom`
    pub fn parse(value: &str) -> Self {
        let normalized = value.trim().to_ascii_lowercase().replace([' ', '-'], "_");
        match normalized.as_str() {
            "retirement" | "early_retirement" | "traditional_retirement" => GoalType::Retirement,
            "education" | "child_education" | "higher_education" => GoalType::Education,
            "home" | "home_purchase" | "house" | "home_down_payment" => GoalType::HomePurchase,
            "emergency" | "emergency_fund" => GoalType::EmergencyFund,
            _ => GoalType::Custom,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GoalType::Retirement => "retirement",
            GoalType::Education => "education",
            GoalType::HomePurchase => "home_purchase",
            GoalType::EmergencyFund => "emergency_fund",
            GoalType::Custom => "custom",
        }
    }
}

impl fmt::Display for GoalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Target allocation reached linearly over `years`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlidePath {
    pub target: BTreeMap<AssetClass, f64>,
    pub years: u32,
}

/// Validated snapshot of one goal, ready for simulation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoalParameters {
    pub goal_id: String,
    pub goal_type: GoalType,
    pub target_amount: f64,
    pub current_amount: f64,
    pub monthly_contribution: f64,

    /// Fractional years until the target date
    pub timeframe_years: f64,

    /// Weights per asset class, summing to 1.0
    pub allocation: BTreeMap<AssetClass, f64>,

    pub contribution_frequency: ContributionFrequency,
    pub contribution_growth_rate: f64,
    pub contribution_overrides: BTreeMap<u32, f64>,
    pub glide_path: Option<GlidePath>,
    pub rebalancing: Option<RebalanceFrequency>,
    pub annual_income: Option<f64>,
    pub monthly_expenses: Option<f64>,
}

impl GoalParameters {
    /// Custom goal on the moderate mix with monthly contributions
    pub fn new(
        goal_id: impl Into<String>,
        target_amount: f64,
        current_amount: f64,
        monthly_contribution: f64,
        timeframe_years: f64,
    ) -> Self {
        Self {
            goal_id: goal_id.into(),
            goal_type: GoalType::Custom,
            target_amount,
            current_amount,
            monthly_contribution,
            timeframe_years,
            allocation: moderate_weights(),
            contribution_frequency: ContributionFrequency::Monthly,
            contribution_growth_rate: 0.0,
            contribution_overrides: BTreeMap::new(),
            glide_path: None,
            rebalancing: None,
            annual_income: None,
            monthly_expenses: None,
        }
    }

    pub fn with_goal_type(mut self, goal_type: GoalType) -> Self {
        self.goal_type = goal_type;
        self
    }

    pub fn with_allocation(mut self, allocation: BTreeMap<AssetClass, f64>) -> Self {
        self.allocation = allocation;
        self
    }

    /// Normalize a raw goal, resolving target dates against the current time
    pub fn from_raw(raw: &RawGoal) -> Result<Self, ParameterError> {
        Self::from_raw_at(raw, Utc::now())
    }

    /// Normalize a raw goal, resolving target dates against `now`
    pub fn from_raw_at(raw: &RawGoal, now: DateTime<Utc>) -> Result<Self, ParameterError> {
        let goal_id = raw.goal_id();

        let target_amount = required_number("target_amount", raw.target_amount.as_ref())?;
        if target_amount <= 0.0 {
            return Err(ParameterError::NonPositive {
                field: "target_amount",
                value: target_amount,
            });
        }

        let current_amount = non_negative("current_amount", raw.current_amount.as_ref())?.unwrap_or(0.0);
        let monthly_contribution =
            non_negative("monthly_contribution", raw.monthly_contribution.as_ref())?.unwrap_or(0.0);

        let timeframe = raw.timeframe.as_ref().ok_or(ParameterError::Missing("timeframe"))?;
        let timeframe_years = check_timeframe(parse_timeframe(timeframe, now)?)?;

        let allocation = parse_allocation(raw.asset_allocation.as_ref()).unwrap_or_else(|| {
            debug!("Goal {} has no usable allocation, using moderate mix", goal_id);
            moderate_weights()
        });

        let contribution_frequency = match raw.contribution_frequency.as_deref() {
            Some(value) => ContributionFrequency::parse(value).unwrap_or_else(|| {
                warn!("Unknown contribution frequency {:?}, assuming monthly", value);
                ContributionFrequency::Monthly
            }),
            None => ContributionFrequency::Monthly,
        };

        let contribution_growth_rate = optional_number("contribution_growth_rate", raw.contribution_growth_rate.as_ref())?
            .map(as_fraction)
            .unwrap_or(0.0);

        Ok(Self {
            goal_id,
            goal_type: raw.goal_type.as_deref().map(GoalType::parse).unwrap_or_default(),
            target_amount,
            current_amount,
            monthly_contribution,
            timeframe_years,
            allocation,
            contribution_frequency,
            contribution_growth_rate,
            contribution_overrides: parse_overrides(raw.contribution_overrides.as_ref()),
            glide_path: parse_glide_path(raw),
            rebalancing: raw.rebalancing.as_deref().and_then(RebalanceFrequency::parse),
            annual_income: non_negative("annual_income", raw.annual_income.as_ref())?,
            monthly_expenses: non_negative("monthly_expenses", raw.monthly_expenses.as_ref())?,
        })
    }

    /// Whole simulation years covering the timeframe (at least one)
    pub fn horizon_years(&self) -> u32 {
        (self.timeframe_years.round().min(MAX_TIMEFRAME_YEARS) as u32).max(1)
    }

    pub fn months_remaining(&self) -> f64 {
        self.timeframe_years * 12.0
    }

    pub fn allocation_strategy(&self) -> AllocationStrategy {
        let mut strategy = AllocationStrategy::new(self.allocation.clone());
        if let Some(glide) = &self.glide_path {
            strategy = strategy.with_glide_path(glide.target.clone(), glide.years);
        }
        if let Some(frequency) = self.rebalancing {
            strategy = strategy.with_rebalancing(frequency);
        }
        strategy
    }

    pub fn contribution_pattern(&self) -> ContributionPattern {
        ContributionPattern::from_monthly(
            self.monthly_contribution,
            self.contribution_frequency,
            self.contribution_growth_rate,
        )
        .with_overrides(self.contribution_overrides.clone())
    }
}

/// Number or numeric string; thousands separators are ignored
pub fn parse_number(field: &'static str, value: &Value) -> Result<f64, ParameterError> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let cleaned: String = s.chars().filter(|c| !matches!(c, ',' | '_' | ' ')).collect();
            cleaned.parse::<f64>().ok()
        }
        Value::Null => return Err(ParameterError::Missing(field)),
        _ => None,
    };

    parsed
        .filter(|v| v.is_finite())
        .ok_or_else(|| ParameterError::NotANumber {
            field,
            value: value.to_string(),
        })
}

fn required_number(field: &'static str, value: Option<&Value>) -> Result<f64, ParameterError> {
    parse_number(field, value.ok_or(ParameterError::Missing(field))?)
}

fn optional_number(field: &'static str, value: Option<&Value>) -> Result<Option<f64>, ParameterError> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(value) => parse_number(field, value).map(Some),
    }
}

fn non_negative(field: &'static str, value: Option<&Value>) -> Result<Option<f64>, ParameterError> {
    match optional_number(field, value)? {
        Some(v) if v < 0.0 => Err(ParameterError::Negative { field, value: v }),
        other => Ok(other),
    }
}

/// Rates above 1 are read as percentages
fn as_fraction(rate: f64) -> f64 {
    if rate.abs() > 1.0 {
        rate / 100.0
    } else {
        rate
    }
}

/// Years from `now` to a numeric horizon or a target date
pub fn parse_timeframe(value: &Value, now: DateTime<Utc>) -> Result<f64, ParameterError> {
    match value {
        Value::Number(n) => n
            .as_f64()
            .filter(|v| v.is_finite())
            .ok_or_else(|| ParameterError::InvalidTimeframe(n.to_string())),
        Value::String(s) => {
            let s = s.trim();
            if let Ok(years) = s.parse::<f64>() {
                return Ok(years);
            }
            if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
                let days = (date - now.date_naive()).num_days();
                return Ok(days as f64 / DAYS_PER_YEAR);
            }
            if let Ok(timestamp) = DateTime::parse_from_rfc3339(s) {
                let seconds = (timestamp.with_timezone(&Utc) - now).num_seconds();
                return Ok(seconds as f64 / (DAYS_PER_YEAR * 86_400.0));
            }
            Err(ParameterError::InvalidTimeframe(s.to_string()))
        }
        Value::Null => Err(ParameterError::Missing("timeframe")),
        other => Err(ParameterError::InvalidTimeframe(other.to_string())),
    }
}

/// Accept a timeframe in `(0, MAX_TIMEFRAME_YEARS]`
pub fn check_timeframe(years: f64) -> Result<f64, ParameterError> {
    if years.is_nan() || years <= 0.0 {
        return Err(ParameterError::NonPositive {
            field: "timeframe",
            value: years,
        });
    }
    if years > MAX_TIMEFRAME_YEARS {
        return Err(ParameterError::InvalidTimeframe(format!(
            "{} years exceeds the {} year limit",
            years, MAX_TIMEFRAME_YEARS
        )));
    }
    Ok(years)
}

/// Asset-class weights from a JSON object, or None when unusable
///
/// Keys are matched case-insensitively with aliases; unknown keys and
/// non-numeric or negative weights are skipped. Weights summing to ~100 are
/// read as percentages.
pub fn parse_allocation(value: Option<&Value>) -> Option<BTreeMap<AssetClass, f64>> {
    let object = value?.as_object()?;

    let mut weights: BTreeMap<AssetClass, f64> = BTreeMap::new();
    for (key, raw_weight) in object {
        let Some(class) = AssetClass::parse(key) else {
            debug!("Ignoring unknown asset class {:?}", key);
            continue;
        };
        match parse_number("asset_allocation", raw_weight) {
            Ok(weight) if weight >= 0.0 => *weights.entry(class).or_insert(0.0) += weight,
            _ => debug!("Ignoring weight {} for {}", raw_weight, class),
        }
    }

    let total: f64 = weights.values().sum();
    if weights.is_empty() || total <= 0.0 {
        return None;
    }

    if (total - 100.0).abs() <= 100.0 * WEIGHT_TOLERANCE {
        for weight in weights.values_mut() {
            *weight /= 100.0;
        }
    }

    let total: f64 = weights.values().sum();
    if (total - 1.0).abs() > WEIGHT_TOLERANCE {
        warn!("Allocation weights sum to {:.4}, ignoring allocation", total);
        return None;
    }

    weights.retain(|_, weight| *weight > 0.0);
    Some(weights)
}

fn parse_overrides(raw: Option<&BTreeMap<String, Value>>) -> BTreeMap<u32, f64> {
    let mut overrides = BTreeMap::new();
    for (year, amount) in raw.into_iter().flatten() {
        match (year.trim().parse::<u32>(), parse_number("contribution_overrides", amount)) {
            (Ok(year), Ok(amount)) if year >= 1 && amount >= 0.0 => {
                overrides.insert(year, amount);
            }
            _ => warn!("Ignoring contribution override {}={}", year, amount),
        }
    }
    overrides
}

fn parse_glide_path(raw: &RawGoal) -> Option<GlidePath> {
    let glide = raw.glide_path.as_ref()?;
    let target = parse_allocation(glide.target_allocation.as_ref());
    let years = glide
        .years
        .as_ref()
        .and_then(|v| parse_number("glide_path.years", v).ok())
        .map(|y| y.round())
        .filter(|y| *y >= 1.0);

    match (target, years) {
        (Some(target), Some(years)) => Some(GlidePath {
            target,
            years: years as u32,
        }),
        _ => {
            warn!("Ignoring incomplete glide path");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::TimeZone;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
    }

    fn raw(value: serde_json::Value) -> RawGoal {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_parse_full_goal() {
        let goal = raw(json!({
            "id": "123",
            "goal_type": "Retirement",
            "target_amount": "10,000,000",
            "current_amount": 1_000_000,
            "monthly_contribution": "20000",
            "timeframe": 25,
            "asset_allocation": {"Equity": 0.6, "debt": 0.3, "GOLD": 0.05, "cash": 0.05},
            "contribution_frequency": "quarterly",
            "contribution_growth_rate": 5,
            "contribution_overrides": {"3": 500000, "x": 1},
            "rebalancing": "annual",
            "annual_income": 1_200_000
        }));
        let params = GoalParameters::from_raw_at(&goal, now()).unwrap();

        assert_eq!(params.goal_id, "123");
        assert_eq!(params.goal_type, GoalType::Retirement);
        assert_relative_eq!(params.target_amount, 10_000_000.0);
        assert_relative_eq!(params.monthly_contribution, 20_000.0);
        assert_relative_eq!(params.timeframe_years, 25.0);
        assert_eq!(params.allocation.len(), 4);
        assert_eq!(params.contribution_frequency, ContributionFrequency::Quarterly);
        assert_relative_eq!(params.contribution_growth_rate, 0.05);
        assert_eq!(params.contribution_overrides.get(&3), Some(&500_000.0));
        assert_eq!(params.contribution_overrides.len(), 1);
        assert_eq!(params.rebalancing, Some(RebalanceFrequency::Annual));
        assert_eq!(params.annual_income, Some(1_200_000.0));
        assert_eq!(params.horizon_years(), 25);

        let pattern = params.contribution_pattern();
        assert_relative_eq!(pattern.amount_for_year(1), 20_000.0 * 12.0 * 1.01);
        assert_relative_eq!(pattern.amount_for_year(3), 500_000.0);
    }

    #[test]
    fn test_timeframe_from_dates() {
        let date = parse_timeframe(&json!("2035-01-01"), now()).unwrap();
        assert_relative_eq!(date, 3652.0 / DAYS_PER_YEAR, epsilon = 1e-9);

        let stamp = parse_timeframe(&json!("2030-01-01T00:00:00Z"), now()).unwrap();
        assert_relative_eq!(stamp, 1826.0 / DAYS_PER_YEAR, epsilon = 1e-9);

        assert_relative_eq!(parse_timeframe(&json!("7.5"), now()).unwrap(), 7.5);
        assert!(matches!(
            parse_timeframe(&json!("someday"), now()),
            Err(ParameterError::InvalidTimeframe(_))
        ));
    }

    #[test]
    fn test_timeframe_upper_limit() {
        let at_limit = raw(json!({"target_amount": 1000, "timeframe": 100}));
        let params = GoalParameters::from_raw_at(&at_limit, now()).unwrap();
        assert_eq!(params.horizon_years(), 100);

        for timeframe in [json!(1e12), json!("100.5"), json!("inf"), json!("2500-01-01")] {
            let goal = raw(json!({"target_amount": 1000, "timeframe": timeframe}));
            assert!(matches!(
                GoalParameters::from_raw_at(&goal, now()),
                Err(ParameterError::InvalidTimeframe(_))
            ));
        }

        let huge = GoalParameters::new("huge", 1e6, 0.0, 1e3, 1e12);
        assert_eq!(huge.horizon_years(), 100);
    }

    #[test]
    fn test_past_date_is_rejected() {
        let goal = raw(json!({"target_amount": 1000, "timeframe": "2020-01-01"}));
        assert!(matches!(
            GoalParameters::from_raw_at(&goal, now()),
            Err(ParameterError::NonPositive { field: "timeframe", .. })
        ));
    }

    #[test]
    fn test_invalid_amounts() {
        let missing = raw(json!({"timeframe": 5}));
        assert_eq!(
            GoalParameters::from_raw_at(&missing, now()),
            Err(ParameterError::Missing("target_amount"))
        );

        let zero = raw(json!({"target_amount": 0, "timeframe": 5}));
        assert!(matches!(
            GoalParameters::from_raw_at(&zero, now()),
            Err(ParameterError::NonPositive { .. })
        ));

        let text = raw(json!({"target_amount": "lots", "timeframe": 5}));
        assert!(matches!(
            GoalParameters::from_raw_at(&text, now()),
            Err(ParameterError::NotANumber { field: "target_amount", .. })
        ));

        let negative = raw(json!({"target_amount": 100, "current_amount": -5, "timeframe": 5}));
        assert!(matches!(
            GoalParameters::from_raw_at(&negative, now()),
            Err(ParameterError::Negative { field: "current_amount", .. })
        ));
    }

    #[test]
    fn test_allocation_aliases_and_percentages() {
        let weights = parse_allocation(Some(&json!({
            "Stocks": 50, "fixed_income": 30, "liquid": 10, "Property": 10, "crypto": 40
        })))
        .unwrap();

        assert_relative_eq!(weights[&AssetClass::Equity], 0.5);
        assert_relative_eq!(weights[&AssetClass::Debt], 0.3);
        assert_relative_eq!(weights[&AssetClass::Cash], 0.1);
        assert_relative_eq!(weights[&AssetClass::RealEstate], 0.1);
    }

    #[test]
    fn test_unusable_allocation_defaults_to_moderate() {
        assert!(parse_allocation(Some(&json!({}))).is_none());
        assert!(parse_allocation(Some(&json!({"equity": 0.5}))).is_none());
        assert!(parse_allocation(Some(&json!("60/40"))).is_none());

        let goal = raw(json!({"target_amount": 1000, "timeframe": 3, "asset_allocation": {"equity": "x"}}));
        let params = GoalParameters::from_raw_at(&goal, now()).unwrap();
        assert_eq!(params.allocation, moderate_weights());
        assert_eq!(params.goal_id, "anonymous");
        assert_eq!(params.goal_type, GoalType::Custom);
    }

    #[test]
    fn test_glide_path_parsing() {
        let goal = raw(json!({
            "target_amount": 1000,
            "timeframe": 20,
            "asset_allocation": {"equity": 0.8, "debt": 0.2},
            "glide_path": {"target_allocation": {"equity": 0.3, "debt": 0.7}, "years": "15"}
        }));
        let params = GoalParameters::from_raw_at(&goal, now()).unwrap();
        let glide = params.glide_path.as_ref().unwrap();
        assert_eq!(glide.years, 15);

        let strategy = params.allocation_strategy();
        assert_relative_eq!(strategy.weights_at(15.0)[&AssetClass::Equity], 0.3, epsilon = 1e-12);

        let incomplete = raw(json!({
            "target_amount": 1000,
            "timeframe": 20,
            "glide_path": {"years": 10}
        }));
        assert!(GoalParameters::from_raw_at(&incomplete, now()).unwrap().glide_path.is_none());
    }

    #[test]
    fn test_goal_type_parsing() {
        assert_eq!(GoalType::parse("home purchase"), GoalType::HomePurchase);
        assert_eq!(GoalType::parse("Emergency-Fund"), GoalType::EmergencyFund);
        assert_eq!(GoalType::parse("wedding"), GoalType::Custom);
    }
}
