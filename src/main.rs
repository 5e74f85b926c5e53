//! Goal Probability CLI
//!
//! Analyzes one goal given on the command line or in a JSON file and prints
//! the result as JSON. Results are cached on disk between runs.

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use goal_probability::analyzer::{AnalysisOptions, AnalyzerConfig, ProbabilityAnalyzer, ProbabilityResult};
use goal_probability::assumptions::{loader::DEFAULT_ASSUMPTIONS_PATH, ReturnAssumptions};
use goal_probability::cache::{CacheConfig, CacheService, SimulationCache};
use goal_probability::goal::RawGoal;
use goal_probability::simulation::{ExecutionMode, ParallelConfig};
use log::info;
use serde_json::{json, Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

#[derive(Parser, Debug)]
#[command(name = "goal-probability", about = "Monte Carlo probability of reaching a financial goal")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Estimate the probability of reaching one goal
    Analyze(AnalyzeArgs),
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CliExecutionMode {
    Vectorized,
    PerSimulation,
}

impl From<CliExecutionMode> for ExecutionMode {
    fn from(value: CliExecutionMode) -> Self {
        match value {
            CliExecutionMode::Vectorized => ExecutionMode::Vectorized,
            CliExecutionMode::PerSimulation => ExecutionMode::PerSimulation,
        }
    }
}

#[derive(Args, Debug)]
struct AnalyzeArgs {
    #[arg(long, help = "JSON goal record; overrides the goal flags below")]
    goal_file: Option<PathBuf>,
    #[arg(long, default_value = "cli")]
    goal_id: String,
    #[arg(long, default_value = "custom")]
    goal_type: String,
    #[arg(long)]
    target: Option<f64>,
    #[arg(long, default_value_t = 0.0)]
    current: f64,
    #[arg(long, default_value_t = 0.0)]
    monthly: f64,
    #[arg(long, help = "Years from now, or a target date (YYYY-MM-DD)")]
    timeframe: Option<String>,
    #[arg(long, help = "Weights such as equity=0.6,debt=0.3,gold=0.05,cash=0.05")]
    allocation: Option<String>,
    #[arg(long, default_value = "monthly")]
    frequency: String,

    #[arg(long, default_value_t = 1000)]
    simulations: usize,
    #[arg(long, default_value_t = 42)]
    seed: u64,
    #[arg(long)]
    parallel: bool,
    #[arg(long, help = "Worker threads for --parallel; defaults to the CPU count")]
    workers: Option<usize>,
    #[arg(long, value_enum, default_value_t = CliExecutionMode::Vectorized)]
    mode: CliExecutionMode,

    #[arg(long, help = "Skip the result cache entirely")]
    no_cache: bool,
    #[arg(long, help = "Cache directory; defaults to GOAL_CACHE_DIR or data/cache")]
    cache_dir: Option<PathBuf>,
    #[arg(long, help = "Directory holding asset_returns.csv and inflation.csv")]
    assumptions_dir: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    match cli.command {
        Command::Analyze(args) => run_analyze(args),
    }
}

fn parse_allocation_flag(flag: &str) -> Result<Value> {
    let mut weights = Map::new();
    for pair in flag.split(',').filter(|p| !p.trim().is_empty()) {
        let (class, weight) = pair
            .split_once('=')
            .ok_or_else(|| anyhow!("allocation entry {:?} is not class=weight", pair))?;
        weights.insert(class.trim().to_string(), Value::String(weight.trim().to_string()));
    }
    Ok(Value::Object(weights))
}

fn goal_from_flags(args: &AnalyzeArgs) -> Result<RawGoal> {
    let target = args.target.ok_or_else(|| anyhow!("--target is required without --goal-file"))?;
    let timeframe = args
        .timeframe
        .as_deref()
        .ok_or_else(|| anyhow!("--timeframe is required without --goal-file"))?;

    let mut goal = json!({
        "id": args.goal_id,
        "goal_type": args.goal_type,
        "target_amount": target,
        "current_amount": args.current,
        "monthly_contribution": args.monthly,
        "timeframe": timeframe,
        "contribution_frequency": args.frequency,
    });
    if let Some(flag) = &args.allocation {
        goal["asset_allocation"] = parse_allocation_flag(flag)?;
    }

    serde_json::from_value(goal).context("building goal from flags")
}

fn load_assumptions(dir: Option<&Path>) -> Result<ReturnAssumptions> {
    let dir = match dir {
        Some(dir) => dir.to_path_buf(),
        None => {
            let default = PathBuf::from(DEFAULT_ASSUMPTIONS_PATH);
            if !default.join("asset_returns.csv").exists() {
                return Ok(ReturnAssumptions::default());
            }
            default
        }
    };
    ReturnAssumptions::from_csv_path(&dir)
        .map_err(|e| anyhow!("loading assumptions from {}: {}", dir.display(), e))
}

fn run_analyze(args: AnalyzeArgs) -> Result<()> {
    let raw = match &args.goal_file {
        Some(path) => {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("reading goal file {}", path.display()))?;
            RawGoal::from_json(&contents).with_context(|| format!("parsing goal file {}", path.display()))?
        }
        None => goal_from_flags(&args)?,
    };

    let mut parallel = ParallelConfig::default();
    if let Some(workers) = args.workers {
        parallel.workers = workers.max(1);
    }
    let config = AnalyzerConfig {
        assumptions: load_assumptions(args.assumptions_dir.as_deref())?,
        parallel,
        execution_mode: args.mode.into(),
        ..AnalyzerConfig::default()
    };

    let mut cache_config = CacheConfig::from_env();
    if let Some(dir) = &args.cache_dir {
        cache_config.cache_dir = dir.clone();
    }
    let mut service: Option<CacheService<ProbabilityResult>> =
        (!args.no_cache).then(|| CacheService::start(cache_config.clone()));
    let cache = match &service {
        Some(service) => Arc::clone(service.cache()),
        None => Arc::new(SimulationCache::with_config(&cache_config)),
    };

    let analyzer = ProbabilityAnalyzer::new(config, cache);
    let options = AnalysisOptions {
        simulations: args.simulations,
        seed: args.seed,
        use_parallel: args.parallel,
        use_cache: !args.no_cache,
    };

    let start = Instant::now();
    let result = analyzer.analyze(&raw, &options);
    info!("Analysis finished in {:?}", start.elapsed());

    println!("{}", serde_json::to_string_pretty(&result)?);

    if let Some(service) = service.as_mut() {
        service.shutdown();
    }
    Ok(())
}
