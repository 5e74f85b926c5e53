//! Compare execution strategies on one reference goal
//!
//! Runs the same request vectorized, per simulation, sequentially and in
//! parallel, and prints the terminal-value statistics of each. The medians
//! should agree to within sampling noise.
//!
//! Usage: cargo run --release --bin compare_modes -- --simulations 20000

use anyhow::Result;
use clap::Parser;
use goal_probability::assumptions::ReturnAssumptions;
use goal_probability::distribution::OutcomeDistribution;
use goal_probability::simulation::{
    AllocationStrategy, ContributionFrequency, ContributionPattern, ExecutionMode, ParallelConfig,
    ParallelCoordinator, SimulationRequest, TrajectoryMatrix, TrajectorySimulator,
};
use std::time::Instant;

#[derive(Parser, Debug)]
#[command(name = "compare_modes", about = "Compare simulation execution modes")]
struct Cli {
    #[arg(long, default_value_t = 10_000)]
    simulations: usize,
    #[arg(long, default_value_t = 42)]
    seed: u64,
    #[arg(long, default_value_t = 25)]
    years: u32,
    #[arg(long, default_value_t = 1_000_000.0)]
    initial: f64,
    #[arg(long, default_value_t = 20_000.0)]
    monthly: f64,
    #[arg(long, default_value_t = 10_000_000.0)]
    target: f64,
    #[arg(long)]
    workers: Option<usize>,
}

struct Row {
    label: &'static str,
    paths: usize,
    median: f64,
    p10: f64,
    p90: f64,
    success: f64,
    millis: u128,
}

fn summarize(label: &'static str, matrix: &TrajectoryMatrix, target: f64, start: Instant) -> Row {
    let millis = start.elapsed().as_millis();
    let distribution = OutcomeDistribution::from_values(matrix.terminal_values());
    Row {
        label,
        paths: distribution.len(),
        median: distribution.median(),
        p10: distribution.percentile(0.10),
        p90: distribution.percentile(0.90),
        success: distribution.success_probability(target),
        millis,
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let request = SimulationRequest {
        initial_amount: cli.initial,
        contributions: ContributionPattern::from_monthly(cli.monthly, ContributionFrequency::Monthly, 0.0),
        years: cli.years,
        allocation: AllocationStrategy::moderate(),
        simulations: cli.simulations,
        seed: cli.seed,
    };

    let assumptions = ReturnAssumptions::default();
    let vectorized = TrajectorySimulator::new(assumptions.clone());
    let per_simulation = TrajectorySimulator::new(assumptions).with_mode(ExecutionMode::PerSimulation);

    let mut parallel_config = ParallelConfig::default();
    if let Some(workers) = cli.workers {
        parallel_config.workers = workers.max(1);
    }
    let coordinator = ParallelCoordinator::new(vectorized.clone(), parallel_config);

    let mut rows = Vec::new();

    let start = Instant::now();
    let matrix = vectorized.simulate(&request)?;
    rows.push(summarize("vectorized", &matrix, cli.target, start));

    let start = Instant::now();
    let matrix = per_simulation.simulate(&request)?;
    rows.push(summarize("per-simulation", &matrix, cli.target, start));

    let start = Instant::now();
    let matrix = coordinator.run_sequential(&request)?;
    rows.push(summarize("sequential", &matrix, cli.target, start));

    let start = Instant::now();
    let matrix = coordinator.run(&request)?;
    rows.push(summarize("parallel", &matrix, cli.target, start));

    println!(
        "{:<16} {:>8} {:>16} {:>16} {:>16} {:>9} {:>8}",
        "Mode", "Paths", "P10", "Median", "P90", "Success", "ms"
    );
    println!("{}", "-".repeat(95));
    for row in &rows {
        println!(
            "{:<16} {:>8} {:>16.0} {:>16.0} {:>16.0} {:>9.4} {:>8}",
            row.label, row.paths, row.p10, row.median, row.p90, row.success, row.millis
        );
    }

    let baseline = rows[0].median;
    let worst = rows
        .iter()
        .map(|row| (row.median - baseline).abs() / baseline.max(1.0))
        .fold(0.0_f64, f64::max);
    println!("\nLargest median deviation from vectorized: {:.2}%", worst * 100.0);

    Ok(())
}
