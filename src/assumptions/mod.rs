//! Capital-market assumptions: per-asset-class returns and inflation

mod asset_class;
pub mod loader;

pub use asset_class::{AssetClass, AssetReturn, ReturnAssumptions};

use std::path::Path;

impl ReturnAssumptions {
    /// Load assumptions from CSV files in the default location (data/assumptions/)
    pub fn from_csv() -> Result<Self, Box<dyn std::error::Error>> {
        Self::from_csv_path(Path::new(loader::DEFAULT_ASSUMPTIONS_PATH))
    }

    /// Load assumptions from CSV files in a specific directory
    pub fn from_csv_path(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        loader::load_from(path)
    }
}
