//! CSV-based return assumption loader
//!
//! Loads capital-market assumptions from CSV files in data/assumptions/

use super::asset_class::{AssetClass, AssetReturn, ReturnAssumptions};
use std::collections::BTreeMap;
use std::error::Error;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Default path to assumptions directory
pub const DEFAULT_ASSUMPTIONS_PATH: &str = "data/assumptions";

/// Raw CSV row of asset_returns.csv
#[derive(Debug, serde::Deserialize)]
struct AssetReturnRow {
    asset_class: String,
    expected_return: f64,
    volatility: f64,
}

/// Load per-asset-class return assumptions from any reader
/// Unknown asset classes are rejected so typos don't silently vanish
pub fn load_asset_returns_from_reader<R: Read>(
    reader: R,
) -> Result<BTreeMap<AssetClass, AssetReturn>, Box<dyn Error>> {
    let mut csv_reader = csv::Reader::from_reader(reader);
    let mut returns = BTreeMap::new();

    for result in csv_reader.deserialize() {
        let row: AssetReturnRow = result?;
        let class = AssetClass::parse(&row.asset_class)
            .ok_or_else(|| format!("Unknown asset class: {}", row.asset_class))?;
        if row.volatility < 0.0 || !row.volatility.is_finite() {
            return Err(format!("Invalid volatility for {}: {}", class, row.volatility).into());
        }
        returns.insert(
            class,
            AssetReturn {
                expected_return: row.expected_return,
                volatility: row.volatility,
            },
        );
    }

    Ok(returns)
}

/// Load the inflation rate (single `inflation_rate` column, first row)
pub fn load_inflation_from_reader<R: Read>(reader: R) -> Result<f64, Box<dyn Error>> {
    let mut csv_reader = csv::Reader::from_reader(reader);
    let record = csv_reader
        .records()
        .next()
        .ok_or("inflation.csv has no rows")??;
    let rate: f64 = record[0].trim().parse()?;
    Ok(rate)
}

/// Load assumptions from the given directory
///
/// Asset classes missing from the file keep their default values.
pub fn load_from(path: &Path) -> Result<ReturnAssumptions, Box<dyn Error>> {
    let mut assumptions = ReturnAssumptions::default_market();

    let returns = load_asset_returns_from_reader(File::open(path.join("asset_returns.csv"))?)?;
    assumptions.asset_returns.extend(returns);

    let inflation_path = path.join("inflation.csv");
    if inflation_path.exists() {
        assumptions.inflation_rate = load_inflation_from_reader(File::open(inflation_path)?)?;
    }

    Ok(assumptions)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_asset_returns() {
        let data = "asset_class,expected_return,volatility\nEquity,0.11,0.2\nbonds,0.065,0.04\n";
        let returns = load_asset_returns_from_reader(data.as_bytes()).unwrap();

        assert_eq!(returns.len(), 2);
        assert_eq!(returns[&AssetClass::Equity].expected_return, 0.11);
        assert_eq!(returns[&AssetClass::Debt].volatility, 0.04);
    }

    #[test]
    fn test_unknown_asset_class_rejected() {
        let data = "asset_class,expected_return,volatility\ncrypto,0.3,0.8\n";
        assert!(load_asset_returns_from_reader(data.as_bytes()).is_err());
    }

    #[test]
    fn test_load_inflation() {
        let data = "inflation_rate\n0.045\n";
        assert_eq!(load_inflation_from_reader(data.as_bytes()).unwrap(), 0.045);
    }

    #[test]
    fn test_load_from_directory_keeps_defaults() {
        let dir = std::env::temp_dir().join(format!("goal_prob_assumptions_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("asset_returns.csv"),
            "asset_class,expected_return,volatility\nequity,0.10,0.16\n",
        )
        .unwrap();

        let assumptions = load_from(&dir).unwrap();
        assert_eq!(assumptions.get(AssetClass::Equity).expected_return, 0.10);
        assert_eq!(assumptions.get(AssetClass::Gold).expected_return, 0.08);
        assert_eq!(assumptions.inflation_rate, 0.06);

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
