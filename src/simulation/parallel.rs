//! Parallel batch execution of trajectory simulations
//!
//! A request is split into `workers` batches. Batch `i` runs with
//! `seed + i` on a dedicated thread pool; a batch that errors or panics is
//! dropped and logged. The surviving batches are stacked in order. Too few
//! surviving rows triggers a sequential re-run of the whole request.

use super::trajectory::{SimulationRequest, TrajectoryMatrix, TrajectorySimulator, MIN_SIMULATIONS};
use crate::error::SimulationError;
use log::{info, warn};
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use std::panic::{catch_unwind, AssertUnwindSafe};

/// One unit of work handed to a worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchSpec {
    pub index: usize,
    pub simulations: usize,
    pub seed: u64,
}

/// Something that can simulate one batch of a request
pub trait BatchWorker: Sync {
    fn run_batch(
        &self,
        request: &SimulationRequest,
        batch: &BatchSpec,
    ) -> Result<TrajectoryMatrix, SimulationError>;
}

impl BatchWorker for TrajectorySimulator {
    fn run_batch(
        &self,
        request: &SimulationRequest,
        batch: &BatchSpec,
    ) -> Result<TrajectoryMatrix, SimulationError> {
        self.simulate_batch(request, batch.simulations, batch.seed)
    }
}

/// Configuration for parallel execution
#[derive(Debug, Clone)]
pub struct ParallelConfig {
    /// Number of batches / worker threads
    pub workers: usize,

    /// Paths per batch; None splits the request evenly
    pub chunk_size: Option<usize>,

    /// Minimum combined paths before falling back to sequential execution
    pub min_simulations: usize,
}

impl Default for ParallelConfig {
    fn default() -> Self {
        Self {
            workers: rayon::current_num_threads().max(1),
            chunk_size: None,
            min_simulations: MIN_SIMULATIONS,
        }
    }
}

/// Fans a simulation request out across a fixed-size worker pool
pub struct ParallelCoordinator<W: BatchWorker = TrajectorySimulator> {
    worker: W,
    config: ParallelConfig,
}

impl<W: BatchWorker> ParallelCoordinator<W> {
    pub fn new(worker: W, config: ParallelConfig) -> Self {
        Self { worker, config }
    }

    pub fn config(&self) -> &ParallelConfig {
        &self.config
    }

    /// Split a request into batches with offset seeds
    pub fn plan(&self, requested: usize, seed: u64) -> Vec<BatchSpec> {
        let total = requested.max(MIN_SIMULATIONS);
        let workers = self.config.workers.max(1);
        let chunk = self
            .config
            .chunk_size
            .unwrap_or_else(|| total.div_ceil(workers))
            .max(1);

        let adjusted = workers * chunk;
        if adjusted != total {
            info!(
                "Adjusted simulation count from {} to {} ({} workers x {} paths)",
                total, adjusted, workers, chunk
            );
        }

        (0..workers)
            .map(|index| BatchSpec {
                index,
                simulations: chunk,
                seed: seed.wrapping_add(index as u64),
            })
            .collect()
    }

    /// Run the request in parallel, degrading to sequential when needed
    pub fn run(&self, request: &SimulationRequest) -> Result<TrajectoryMatrix, SimulationError> {
        let batches = self.plan(request.simulations, request.seed);

        let pool = match ThreadPoolBuilder::new()
            .num_threads(batches.len())
            .thread_name(|i| format!("goal-sim-worker-{}", i))
            .build()
        {
            Ok(pool) => pool,
            Err(e) => {
                warn!("Could not start worker pool ({}), running sequentially", e);
                return self.run_sequential(request);
            }
        };

        let results: Vec<Option<TrajectoryMatrix>> = pool.install(|| {
            batches
                .par_iter()
                .map(|batch| self.run_isolated(request, batch))
                .collect()
        });

        let successful: Vec<TrajectoryMatrix> = results.into_iter().flatten().collect();
        if successful.is_empty() {
            return Err(SimulationError::AllWorkersFailed(batches.len()));
        }
        let succeeded = successful.len();

        let combined = TrajectoryMatrix::stack(successful)
            .ok_or(SimulationError::AllWorkersFailed(batches.len()))?;

        if combined.simulations() < self.config.min_simulations {
            warn!(
                "Parallel run produced {} paths from {}/{} batches (minimum {}), falling back to sequential",
                combined.simulations(),
                succeeded,
                batches.len(),
                self.config.min_simulations
            );
            return self.run_sequential(request);
        }

        Ok(combined)
    }

    /// Run the whole request as a single batch on the calling thread
    pub fn run_sequential(
        &self,
        request: &SimulationRequest,
    ) -> Result<TrajectoryMatrix, SimulationError> {
        let batch = BatchSpec {
            index: 0,
            simulations: request.simulations.max(MIN_SIMULATIONS),
            seed: request.seed,
        };
        self.worker.run_batch(request, &batch)
    }

    fn run_isolated(&self, request: &SimulationRequest, batch: &BatchSpec) -> Option<TrajectoryMatrix> {
        match catch_unwind(AssertUnwindSafe(|| self.worker.run_batch(request, batch))) {
            Ok(Ok(matrix)) => Some(matrix),
            Ok(Err(e)) => {
                warn!("Worker batch {} failed: {}", batch.index, e);
                None
            }
            Err(_) => {
                warn!("Worker batch {} panicked", batch.index);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assumptions::{AssetClass, ReturnAssumptions};
    use crate::simulation::{AllocationStrategy, ContributionPattern};
    use std::collections::BTreeMap;

    fn request(simulations: usize) -> SimulationRequest {
        SimulationRequest {
            initial_amount: 200_000.0,
            contributions: ContributionPattern::flat(60_000.0, 0.05),
            years: 10,
            allocation: AllocationStrategy::new(BTreeMap::from([
                (AssetClass::Equity, 0.4),
                (AssetClass::Debt, 0.5),
                (AssetClass::Cash, 0.1),
            ])),
            simulations,
            seed: 42,
        }
    }

    fn simulator() -> TrajectorySimulator {
        TrajectorySimulator::new(ReturnAssumptions::default_market())
    }

    fn config(workers: usize) -> ParallelConfig {
        ParallelConfig {
            workers,
            chunk_size: None,
            min_simulations: MIN_SIMULATIONS,
        }
    }

    fn median(mut values: Vec<f64>) -> f64 {
        values.sort_by(|a, b| a.partial_cmp(b).unwrap());
        values[values.len() / 2]
    }

    /// Fails (or panics) for selected batch indices
    struct FlakyWorker {
        inner: TrajectorySimulator,
        failing: Vec<usize>,
        panicking: Vec<usize>,
    }

    impl BatchWorker for FlakyWorker {
        fn run_batch(
            &self,
            request: &SimulationRequest,
            batch: &BatchSpec,
        ) -> Result<TrajectoryMatrix, SimulationError> {
            if self.panicking.contains(&batch.index) {
                panic!("worker {} crashed", batch.index);
            }
            if self.failing.contains(&batch.index) {
                return Err(SimulationError::BatchFailed {
                    index: batch.index,
                    reason: "injected".to_string(),
                });
            }
            self.inner.run_batch(request, batch)
        }
    }

    #[test]
    fn test_plan_offsets_seeds() {
        let coordinator = ParallelCoordinator::new(simulator(), config(4));
        let plan = coordinator.plan(2000, 42);

        assert_eq!(plan.len(), 4);
        assert!(plan.iter().all(|b| b.simulations == 500));
        assert_eq!(plan.iter().map(|b| b.seed).collect::<Vec<_>>(), vec![42, 43, 44, 45]);
    }

    #[test]
    fn test_plan_rounds_up_uneven_split() {
        let coordinator = ParallelCoordinator::new(simulator(), config(3));
        let plan = coordinator.plan(1000, 0);
        let total: usize = plan.iter().map(|b| b.simulations).sum();
        assert_eq!(total, 1002);
    }

    #[test]
    fn test_plan_respects_minimum() {
        let coordinator = ParallelCoordinator::new(simulator(), config(2));
        let total: usize = coordinator.plan(100, 0).iter().map(|b| b.simulations).sum();
        assert_eq!(total, MIN_SIMULATIONS);
    }

    #[test]
    fn test_parallel_matches_sequential_distribution() {
        let coordinator = ParallelCoordinator::new(simulator(), config(4));
        let parallel = coordinator.run(&request(2000)).unwrap();
        let sequential = simulator().simulate(&request(2000)).unwrap();

        assert_eq!(parallel.simulations(), 2000);
        let a = median(parallel.terminal_values());
        let b = median(sequential.terminal_values());
        assert!((a - b).abs() / b <= 0.05, "parallel median {} vs sequential {}", a, b);
    }

    #[test]
    fn test_failed_batches_are_isolated() {
        let worker = FlakyWorker {
            inner: simulator(),
            failing: vec![1],
            panicking: vec![2],
        };
        let coordinator = ParallelCoordinator::new(worker, config(4));
        let matrix = coordinator.run(&request(2000)).unwrap();

        assert_eq!(matrix.simulations(), 1000);
    }

    #[test]
    fn test_all_workers_failing_is_an_error() {
        let worker = FlakyWorker {
            inner: simulator(),
            failing: vec![0, 1, 2, 3],
            panicking: Vec::new(),
        };
        let coordinator = ParallelCoordinator::new(worker, config(4));
        assert_eq!(
            coordinator.run(&request(2000)),
            Err(SimulationError::AllWorkersFailed(4))
        );
    }

    #[test]
    fn test_insufficient_results_fall_back_to_sequential() {
        // Only batch 0 (250 paths) survives; the sequential re-run uses index 0
        let worker = FlakyWorker {
            inner: simulator(),
            failing: vec![1, 2, 3],
            panicking: Vec::new(),
        };
        let coordinator = ParallelCoordinator::new(worker, config(4));
        let matrix = coordinator.run(&request(1000)).unwrap();

        assert_eq!(matrix.simulations(), 1000);
    }
}
