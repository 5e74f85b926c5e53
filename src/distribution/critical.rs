//! Detection of high-volatility stretches in simulated trajectories

use serde::{Deserialize, Serialize};

/// A contiguous run of timesteps with unusually wide outcome dispersion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriticalPeriod {
    pub start_index: usize,
    pub end_index: usize,
    pub peak_volatility: f64,
    pub average_volatility: f64,
    /// Average volatility of the run relative to the whole horizon
    pub ratio_to_average: f64,
}

/// Cross-simulation standard deviation at every timestep
///
/// `time_series` holds one row per simulation.
pub fn volatility_by_step(time_series: &[Vec<f64>]) -> Vec<f64> {
    let steps = time_series.iter().map(|row| row.len()).min().unwrap_or(0);
    let n = time_series.len();
    if n < 2 {
        return vec![0.0; steps];
    }

    (0..steps)
        .map(|t| {
            let mean = time_series.iter().map(|row| row[t]).sum::<f64>() / n as f64;
            let variance = time_series
                .iter()
                .map(|row| (row[t] - mean).powi(2))
                .sum::<f64>()
                / (n - 1) as f64;
            variance.sqrt()
        })
        .collect()
}

/// Flag runs where volatility exceeds `threshold_pct` of its maximum
pub fn identify_critical_periods(time_series: &[Vec<f64>], threshold_pct: f64) -> Vec<CriticalPeriod> {
    let volatility = volatility_by_step(time_series);
    let max_vol = volatility.iter().cloned().fold(0.0_f64, f64::max);
    if volatility.is_empty() || max_vol <= 0.0 {
        return Vec::new();
    }

    let overall_average = volatility.iter().sum::<f64>() / volatility.len() as f64;
    let threshold = threshold_pct * max_vol;

    let mut periods = Vec::new();
    let mut start: Option<usize> = None;

    // Trailing sentinel closes a run that reaches the last step
    for (t, above) in volatility
        .iter()
        .map(|v| *v > threshold)
        .chain(std::iter::once(false))
        .enumerate()
    {
        match (start, above) {
            (None, true) => start = Some(t),
            (Some(s), false) => {
                let run = &volatility[s..t];
                let peak = run.iter().cloned().fold(0.0_f64, f64::max);
                let average = run.iter().sum::<f64>() / run.len() as f64;
                periods.push(CriticalPeriod {
                    start_index: s,
                    end_index: t - 1,
                    peak_volatility: peak,
                    average_volatility: average,
                    ratio_to_average: if overall_average > 0.0 {
                        average / overall_average
                    } else {
                        0.0
                    },
                });
                start = None;
            }
            _ => {}
        }
    }

    periods
}
