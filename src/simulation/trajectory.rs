//! Stochastic portfolio trajectory simulation
//!
//! Each simulation starts from the initial amount and rolls forward one year
//! at a time:
//!
//! ```text
//! value[t] = max(0, value[t-1] * (1 + r) + contribution(t))
//! r ~ Normal(expected_return(allocation, t-1), volatility(allocation, t-1))
//! ```
//!
//! Returns are real (net of inflation), so values are in today's money.

use super::allocation::AllocationStrategy;
use super::contribution::ContributionPattern;
use crate::assumptions::ReturnAssumptions;
use crate::error::SimulationError;
use log::debug;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

/// Requests below this count are raised to it
pub const MIN_SIMULATIONS: usize = 500;

/// How random returns are drawn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionMode {
    /// One return vector per year across all simulations
    #[default]
    Vectorized,
    /// Each simulation walks its full path before the next starts
    PerSimulation,
}

/// Inputs for one simulation run
#[derive(Debug, Clone)]
pub struct SimulationRequest {
    pub initial_amount: f64,
    pub contributions: ContributionPattern,
    pub years: u32,
    pub allocation: AllocationStrategy,
    pub simulations: usize,
    pub seed: u64,
}

/// Portfolio values laid out as `simulations x (years + 1)`, row-major
#[derive(Debug, Clone, PartialEq)]
pub struct TrajectoryMatrix {
    values: Vec<f64>,
    simulations: usize,
    columns: usize,
}

impl TrajectoryMatrix {
    fn filled(simulations: usize, years: u32, initial_amount: f64) -> Self {
        let columns = years as usize + 1;
        let mut values = vec![0.0; simulations * columns];
        for row in values.chunks_mut(columns) {
            row[0] = initial_amount;
        }
        Self { values, simulations, columns }
    }

    /// Build from explicit rows; every row must have the same length
    pub fn from_rows(rows: Vec<Vec<f64>>) -> Option<Self> {
        let columns = rows.first()?.len();
        if columns == 0 || rows.iter().any(|row| row.len() != columns) {
            return None;
        }
        let simulations = rows.len();
        Some(Self {
            values: rows.into_iter().flatten().collect(),
            simulations,
            columns,
        })
    }

    /// Stack batch outputs vertically, in order
    ///
    /// Returns None if there is nothing to stack or the widths disagree.
    pub fn stack(batches: Vec<TrajectoryMatrix>) -> Option<Self> {
        let columns = batches.first()?.columns;
        if batches.iter().any(|b| b.columns != columns) {
            return None;
        }
        let simulations = batches.iter().map(|b| b.simulations).sum();
        let mut values = Vec::with_capacity(simulations * columns);
        for batch in batches {
            values.extend(batch.values);
        }
        Some(Self { values, simulations, columns })
    }

    pub fn simulations(&self) -> usize {
        self.simulations
    }

    /// Horizon in years (columns - 1)
    pub fn years(&self) -> u32 {
        (self.columns - 1) as u32
    }

    pub fn row(&self, index: usize) -> &[f64] {
        &self.values[index * self.columns..(index + 1) * self.columns]
    }

    pub fn rows(&self) -> impl Iterator<Item = &[f64]> {
        self.values.chunks(self.columns)
    }

    /// Final-year value of every simulation
    pub fn terminal_values(&self) -> Vec<f64> {
        self.rows().map(|row| row[self.columns - 1]).collect()
    }

    /// All simulations' values at year `t`
    pub fn column(&self, t: usize) -> Vec<f64> {
        self.rows().map(|row| row[t]).collect()
    }

    pub fn to_rows(&self) -> Vec<Vec<f64>> {
        self.rows().map(|row| row.to_vec()).collect()
    }
}

/// Monte Carlo trajectory generator
#[derive(Debug, Clone)]
pub struct TrajectorySimulator {
    assumptions: ReturnAssumptions,
    mode: ExecutionMode,
}

impl TrajectorySimulator {
    pub fn new(assumptions: ReturnAssumptions) -> Self {
        Self {
            assumptions,
            mode: ExecutionMode::default(),
        }
    }

    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn assumptions(&self) -> &ReturnAssumptions {
        &self.assumptions
    }

    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    /// Run a full request, raising the simulation count to `MIN_SIMULATIONS`
    pub fn simulate(&self, request: &SimulationRequest) -> Result<TrajectoryMatrix, SimulationError> {
        let simulations = request.simulations.max(MIN_SIMULATIONS);
        self.simulate_batch(request, simulations, request.seed)
    }

    /// Run exactly `simulations` paths with the given seed
    pub fn simulate_batch(
        &self,
        request: &SimulationRequest,
        simulations: usize,
        seed: u64,
    ) -> Result<TrajectoryMatrix, SimulationError> {
        self.validate(request)?;
        let distributions = self.yearly_distributions(request)?;
        let contributions = request.contributions.schedule(request.years);

        debug!(
            "Simulating {} paths over {} years (seed {}, {:?})",
            simulations, request.years, seed, self.mode
        );

        let mut rng = StdRng::seed_from_u64(seed);
        let mut matrix = TrajectoryMatrix::filled(simulations, request.years, request.initial_amount);

        match self.mode {
            ExecutionMode::Vectorized => {
                let mut draws = vec![0.0; simulations];
                for (idx, normal) in distributions.iter().enumerate() {
                    let t = idx + 1;
                    for draw in draws.iter_mut() {
                        *draw = normal.sample(&mut rng);
                    }
                    for (row, r) in matrix.values.chunks_mut(matrix.columns).zip(&draws) {
                        row[t] = (row[t - 1] * (1.0 + r) + contributions[idx]).max(0.0);
                    }
                }
            }
            ExecutionMode::PerSimulation => {
                for row in matrix.values.chunks_mut(matrix.columns) {
                    for (idx, normal) in distributions.iter().enumerate() {
                        let t = idx + 1;
                        let r = normal.sample(&mut rng);
                        row[t] = (row[t - 1] * (1.0 + r) + contributions[idx]).max(0.0);
                    }
                }
            }
        }

        if let Some(position) = matrix.values.iter().position(|v| !v.is_finite()) {
            return Err(SimulationError::NonFinite((position % matrix.columns) as u32));
        }

        Ok(matrix)
    }

    fn validate(&self, request: &SimulationRequest) -> Result<(), SimulationError> {
        if request.years == 0 {
            return Err(SimulationError::InvalidParameters(
                "horizon must be at least one year".to_string(),
            ));
        }
        if !request.initial_amount.is_finite() || request.initial_amount < 0.0 {
            return Err(SimulationError::InvalidParameters(format!(
                "initial amount must be a non-negative number, got {}",
                request.initial_amount
            )));
        }
        if let Some(bad) = request
            .contributions
            .schedule(request.years)
            .into_iter()
            .find(|c| !c.is_finite())
        {
            return Err(SimulationError::InvalidParameters(format!(
                "contribution schedule contains {}",
                bad
            )));
        }
        request.allocation.validate(request.years)
    }

    /// Return distribution for each simulated year (index 0 = year 1)
    fn yearly_distributions(
        &self,
        request: &SimulationRequest,
    ) -> Result<Vec<Normal<f64>>, SimulationError> {
        (0..request.years)
            .map(|elapsed| {
                let mean = request.allocation.expected_return(&self.assumptions, elapsed as f64);
                let sd = request.allocation.volatility(&self.assumptions, elapsed as f64);
                Normal::new(mean, sd).map_err(|e| {
                    SimulationError::InvalidParameters(format!(
                        "return distribution N({:.4}, {:.4}) at year {}: {}",
                        mean, sd, elapsed, e
                    ))
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assumptions::AssetClass;
    use crate::simulation::contribution::ContributionFrequency;
    use std::collections::BTreeMap;

    fn request(simulations: usize, seed: u64) -> SimulationRequest {
        SimulationRequest {
            initial_amount: 500_000.0,
            contributions: ContributionPattern::from_monthly(
                10_000.0,
                ContributionFrequency::Monthly,
                0.0,
            ),
            years: 10,
            allocation: AllocationStrategy::moderate(),
            simulations,
            seed,
        }
    }

    fn median(mut values: Vec<f64>) -> f64 {
        values.sort_by(|a, b| a.partial_cmp(b).unwrap());
        values[values.len() / 2]
    }

    #[test]
    fn test_matrix_shape_and_initial_column() {
        let simulator = TrajectorySimulator::new(ReturnAssumptions::default_market());
        let matrix = simulator.simulate(&request(800, 7)).unwrap();

        assert_eq!(matrix.simulations(), 800);
        assert_eq!(matrix.years(), 10);
        assert!(matrix.column(0).iter().all(|v| *v == 500_000.0));
        assert!(matrix.rows().all(|row| row.iter().all(|v| *v >= 0.0)));
    }

    #[test]
    fn test_minimum_simulation_count() {
        let simulator = TrajectorySimulator::new(ReturnAssumptions::default_market());
        let matrix = simulator.simulate(&request(10, 7)).unwrap();
        assert_eq!(matrix.simulations(), MIN_SIMULATIONS);
    }

    #[test]
    fn test_reproducible_for_seed() {
        let simulator = TrajectorySimulator::new(ReturnAssumptions::default_market());
        let a = simulator.simulate(&request(500, 42)).unwrap();
        let b = simulator.simulate(&request(500, 42)).unwrap();
        let c = simulator.simulate(&request(500, 43)).unwrap();

        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_execution_modes_converge() {
        let assumptions = ReturnAssumptions::default_market();
        let vectorized = TrajectorySimulator::new(assumptions.clone());
        let looped = TrajectorySimulator::new(assumptions).with_mode(ExecutionMode::PerSimulation);

        let a = median(vectorized.simulate(&request(4000, 11)).unwrap().terminal_values());
        let b = median(looped.simulate(&request(4000, 11)).unwrap().terminal_values());

        assert!((a - b).abs() / a < 0.03, "medians diverge: {} vs {}", a, b);
    }

    #[test]
    fn test_zero_volatility_is_deterministic() {
        let mut assumptions = ReturnAssumptions::default_market();
        assumptions.inflation_rate = 0.0;
        assumptions.asset_returns.get_mut(&AssetClass::Cash).unwrap().volatility = 0.0;
        let simulator = TrajectorySimulator::new(assumptions);

        let req = SimulationRequest {
            initial_amount: 1_000.0,
            contributions: ContributionPattern::flat(100.0, 0.0),
            years: 2,
            allocation: AllocationStrategy::new(BTreeMap::from([(AssetClass::Cash, 1.0)])),
            simulations: 500,
            seed: 1,
        };
        let matrix = simulator.simulate(&req).unwrap();

        // 1000 * 1.04 + 100 = 1140; 1140 * 1.04 + 100 = 1285.6
        for row in matrix.rows() {
            assert!((row[1] - 1_140.0).abs() < 1e-9);
            assert!((row[2] - 1_285.6).abs() < 1e-9);
        }
    }

    #[test]
    fn test_values_never_negative() {
        let simulator = TrajectorySimulator::new(ReturnAssumptions::default_market());
        let req = SimulationRequest {
            initial_amount: 1_000.0,
            contributions: ContributionPattern::flat(-5_000.0, 0.0),
            years: 5,
            allocation: AllocationStrategy::moderate(),
            simulations: 500,
            seed: 3,
        };
        let matrix = simulator.simulate(&req).unwrap();
        assert!(matrix.terminal_values().iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_invalid_requests_rejected() {
        let simulator = TrajectorySimulator::new(ReturnAssumptions::default_market());

        let mut req = request(500, 1);
        req.years = 0;
        assert!(matches!(
            simulator.simulate(&req),
            Err(SimulationError::InvalidParameters(_))
        ));

        let mut req = request(500, 1);
        req.allocation = AllocationStrategy::new(BTreeMap::from([(AssetClass::Equity, 0.5)]));
        assert!(matches!(
            simulator.simulate(&req),
            Err(SimulationError::InvalidAllocation { .. })
        ));
    }

    #[test]
    fn test_stack_preserves_order() {
        let a = TrajectoryMatrix::from_rows(vec![vec![1.0, 2.0]]).unwrap();
        let b = TrajectoryMatrix::from_rows(vec![vec![3.0, 4.0], vec![5.0, 6.0]]).unwrap();
        let stacked = TrajectoryMatrix::stack(vec![a, b]).unwrap();

        assert_eq!(stacked.simulations(), 3);
        assert_eq!(stacked.terminal_values(), vec![2.0, 4.0, 6.0]);

        let narrow = TrajectoryMatrix::from_rows(vec![vec![1.0]]).unwrap();
        let wide = TrajectoryMatrix::from_rows(vec![vec![1.0, 2.0]]).unwrap();
        assert!(TrajectoryMatrix::stack(vec![narrow, wide]).is_none());
        assert!(TrajectoryMatrix::stack(Vec::new()).is_none());
    }
}
