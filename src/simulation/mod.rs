//! Trajectory simulation: allocation and contribution models, the Monte Carlo
//! simulator, and the parallel batch coordinator

mod allocation;
mod contribution;
mod parallel;
mod trajectory;

pub use allocation::{moderate_weights, AllocationStrategy, RebalanceFrequency, WEIGHT_TOLERANCE};
pub use contribution::{ContributionFrequency, ContributionPattern};
pub use parallel::{BatchSpec, BatchWorker, ParallelConfig, ParallelCoordinator};
pub use trajectory::{
    ExecutionMode, SimulationRequest, TrajectoryMatrix, TrajectorySimulator, MIN_SIMULATIONS,
};
