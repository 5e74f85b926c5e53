//! Loosely typed goal input as it arrives from callers

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Goal record before normalization
///
/// Numeric fields accept JSON numbers or numeric strings; validation happens
/// in [`GoalParameters::from_raw`](super::GoalParameters::from_raw).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawGoal {
    #[serde(alias = "goal_id")]
    pub id: Option<Value>,

    #[serde(alias = "category", alias = "type")]
    pub goal_type: Option<String>,

    #[serde(alias = "target")]
    pub target_amount: Option<Value>,

    #[serde(alias = "current_savings", alias = "initial_amount")]
    pub current_amount: Option<Value>,

    #[serde(alias = "monthly_sip")]
    pub monthly_contribution: Option<Value>,

    /// Years from now, or a target date (`YYYY-MM-DD` / RFC 3339)
    #[serde(alias = "target_date", alias = "years")]
    pub timeframe: Option<Value>,

    #[serde(alias = "allocation")]
    pub asset_allocation: Option<Value>,

    pub contribution_frequency: Option<String>,

    /// Annual step-up of contributions, as a fraction or a percentage
    pub contribution_growth_rate: Option<Value>,

    /// Year (1-indexed) to annual amount, replacing the regular contribution
    pub contribution_overrides: Option<BTreeMap<String, Value>>,

    pub glide_path: Option<RawGlidePath>,

    pub rebalancing: Option<String>,

    /// Current annual income, for retirement replacement ratios
    pub annual_income: Option<Value>,

    /// For emergency fund coverage
    pub monthly_expenses: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawGlidePath {
    pub target_allocation: Option<Value>,
    pub years: Option<Value>,
}

impl RawGoal {
    /// Parse a goal from a JSON document
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Identifier as a string; goals without one share `anonymous`
    pub fn goal_id(&self) -> String {
        match &self.id {
            Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
            Some(Value::Number(n)) => n.to_string(),
            _ => "anonymous".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_aliases_and_missing_fields() {
        let raw = RawGoal::from_json(
            r#"{"goal_id": 123, "category": "retirement", "target": "1,00,00,000",
                "years": 25, "allocation": {"Stocks": 60, "Bonds": 40}}"#,
        )
        .unwrap();

        assert_eq!(raw.id, Some(json!(123)));
        assert_eq!(raw.goal_id(), "123");
        assert_eq!(raw.goal_type.as_deref(), Some("retirement"));
        assert_eq!(raw.target_amount, Some(json!("1,00,00,000")));
        assert_eq!(raw.timeframe, Some(json!(25)));
        assert!(raw.current_amount.is_none());
        assert!(raw.glide_path.is_none());
    }
}
