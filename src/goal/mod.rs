//! Goal input: loosely typed records and their normalized form

mod params;
mod raw;

pub use params::{
    check_timeframe, parse_allocation, parse_number, parse_timeframe, GlidePath, GoalParameters, GoalType,
    DAYS_PER_YEAR, MAX_TIMEFRAME_YEARS,
};
pub use raw::{RawGlidePath, RawGoal};
