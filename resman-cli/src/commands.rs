use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use tracing::info;

use resman_config::ResmanConfig;
use resman_engine::SimulationRuntime;
use resman_telemetry::logging::EventLogger;

/// Mirror file used by a bare `-f`.
const DEFAULT_LOG_FILE: &str = "ossLog.txt";

#[derive(Parser)]
#[command(name = "resman", version, about)]
pub struct Cli {
    /// Configuration file; defaults to config/resman.yaml when present
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the simulation once
    Run(RunArgs),
    /// Repeat runs with incrementing seeds, checking every run ends idle
    Fuzz(FuzzArgs),
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Total number of processes to launch
    #[arg(short = 'n', long = "proc")]
    pub total_processes: Option<usize>,
    /// Processes allowed to run at the same time (at most 18)
    #[arg(short = 's', long = "simul")]
    pub max_concurrent: Option<usize>,
    /// Milliseconds of simulated time between launches
    #[arg(short = 'i', long = "interval")]
    pub interval_ms: Option<u64>,
    /// Mirror all output to a file (default name: ossLog.txt)
    #[arg(short = 'f', long = "log-file", num_args = 0..=1, default_missing_value = DEFAULT_LOG_FILE)]
    pub log_file: Option<PathBuf>,
    /// Seed for worker randomness
    #[arg(long)]
    pub seed: Option<u64>,
}

#[derive(Args, Debug, Clone)]
pub struct FuzzArgs {
    /// Initial seed (auto-increments each iteration)
    #[arg(long, default_value_t = 1)]
    pub seed: u64,
    /// Number of runs (0 for unlimited)
    #[arg(long, default_value_t = 10)]
    pub iterations: usize,
}

impl RunArgs {
    fn apply(&self, config: &mut ResmanConfig) {
        if let Some(total) = self.total_processes {
            config.simulator.total_processes = total;
        }
        if let Some(simul) = self.max_concurrent {
            config.simulator.max_concurrent = simul;
        }
        if let Some(interval) = self.interval_ms {
            config.simulator.spawn_interval_ms = interval;
        }
        if let Some(path) = &self.log_file {
            config.telemetry.log_file = Some(path.to_string_lossy().into_owned());
        }
        if self.seed.is_some() {
            config.simulator.seed = self.seed;
        }
    }
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<ResmanConfig> {
    let config = match path {
        Some(path) => ResmanConfig::load_from_path(path)?,
        None => ResmanConfig::load()?,
    };
    Ok(config)
}

fn init_logging(config: &ResmanConfig) -> anyhow::Result<()> {
    let mirror = config.telemetry.log_file.as_deref().map(std::path::Path::new);
    EventLogger::init(&config.telemetry.log_level, mirror).context("failed to initialize logging")
}

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    let mut config = load_config(cli.config.as_ref())?;

    match cli.command {
        Commands::Run(args) => {
            args.apply(&mut config);
            let config = config.validated()?;
            init_logging(&config)?;

            let summary = SimulationRuntime::new(config)?.run().await?;
            info!(
                "Run finished at {} after launching {} processes",
                summary.finished_at, summary.launched
            );
            Ok(())
        }
        Commands::Fuzz(args) => {
            config.telemetry.print_tables = false;
            let config = config.validated()?;
            init_logging(&config)?;
            run_fuzz_mode(config, args.seed, args.iterations).await
        }
    }
}

async fn run_fuzz_mode(base: ResmanConfig, mut seed: u64, iterations: usize) -> anyhow::Result<()> {
    let mut count = 0;
    loop {
        if iterations > 0 && count >= iterations {
            break;
        }

        let mut config = base.clone();
        config.simulator.seed = Some(seed);
        info!("Starting fuzz iteration {} with seed {seed}", count + 1);

        let summary = SimulationRuntime::new(config)?
            .run()
            .await
            .with_context(|| format!("fuzz run with seed {seed} failed"))?;
        if !summary.snapshot.is_idle() {
            bail!("seed {seed}: run ended with resources still allocated");
        }
        let stats = &summary.stats;
        info!(
            "seed {seed}: {} immediate and {} deferred grants, {} deadlocks, {} victims",
            stats.immediate_grants(),
            stats.deferred_grants(),
            stats.deadlock_detections(),
            stats.victims_killed()
        );

        seed += 1;
        count += 1;
    }
    Ok(())
}
