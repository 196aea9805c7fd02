#![warn(missing_docs)]
//! conbench CLI Library
//!
//! Execution strategies, the process-pool supervisor, report rendering and
//! the command-line front end. The `conbench` binary is a thin wrapper around
//! [`run`]; the same binary doubles as the process-pool worker when started
//! with the hidden `--conbench-worker` flag.
//!
//! # Example
//!
//! ```no_run
//! use conbench_cli::BoundedExecutor;
//! use conbench_core::{Strategy, TaskConfig, WorkloadSpec};
//! use std::time::Duration;
//!
//! let workload = WorkloadSpec::simulated_io(Duration::from_millis(5), Duration::from_millis(20));
//! let config = TaskConfig::new(200, 16, workload, Strategy::ThreadPool).unwrap();
//! let stats = BoundedExecutor::new(config).run().unwrap().stats();
//! println!("{:.2} tasks/s, p99 {:.2} ms", stats.throughput, stats.p99_ms());
//! ```

mod config;
mod executor;
mod report;
mod supervisor;

pub use config::*;
pub use executor::{BoundedExecutor, SequentialRunner};
pub use report::{
    OutputFormat, ReportConfig, ReportMeta, RunReport, StatsReport, generate_human_report,
    generate_json_report, render,
};
pub use supervisor::{SupervisorError, TaskReply, WorkerHandle};

use anyhow::Context;
use clap::Parser;
use conbench_core::{
    Strategy, TaskConfig, WorkerMain, WorkloadSpec, available_cpus, default_workers,
    latency_from_secs,
};
use std::io::Write;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// conbench CLI arguments
///
/// Every option is optional so that `conbench.toml` can supply it; the
/// documented defaults apply when neither sets a value.
#[derive(Parser, Debug, Default)]
#[command(name = "conbench")]
#[command(
    author,
    version,
    about = "conbench - throughput and latency of concurrent workloads"
)]
pub struct Cli {
    /// Scheduling strategy: cooperative, thread-pool, process-pool or
    /// sequential [default: thread-pool]
    #[arg(short, long)]
    pub strategy: Option<Strategy>,

    /// Workload: io or cpu [default: cpu for process-pool, io otherwise]
    #[arg(long)]
    pub workload: Option<WorkloadKind>,

    /// Number of tasks [default: 200]
    #[arg(short = 'n', long)]
    pub tasks: Option<usize>,

    /// Concurrency cap [default: min(64, cpus*4), or cpus for process-pool]
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Shortest simulated latency in seconds [default: 0.005]
    #[arg(long)]
    pub min_latency: Option<f64>,

    /// Longest simulated latency in seconds [default: 0.02]
    #[arg(long)]
    pub max_latency: Option<f64>,

    /// CPU-bound loop length [default: 100000]
    #[arg(long)]
    pub work: Option<u64>,

    /// Also run the sequential baseline and print the speedup
    #[arg(long)]
    pub baseline: bool,

    /// Output format: human or json [default: human]
    #[arg(long)]
    pub format: Option<String>,

    /// Output file (stdout if not specified)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Configuration file (default: nearest conbench.toml)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Internal: Run as worker process (used by the process-pool strategy)
    #[arg(long, hide = true)]
    pub conbench_worker: bool,
}

/// Everything needed to execute and report one invocation, after merging
/// flags, the configuration file and defaults
#[derive(Debug, Clone)]
pub struct RunPlan {
    /// Validated run parameters
    pub config: TaskConfig,
    /// Whether to also run the sequential baseline
    pub baseline: bool,
    /// Report format
    pub format: OutputFormat,
    /// Report destination, stdout when `None`
    pub output: Option<PathBuf>,
}

impl RunPlan {
    /// Merge `cli` over `file` over built-in defaults. `cpus` drives the
    /// default concurrency cap and is resolved once, here.
    pub fn resolve(cli: &Cli, file: &ConbenchConfig, cpus: usize) -> anyhow::Result<Self> {
        let strategy = cli.strategy.unwrap_or(file.runner.strategy);
        let tasks = cli.tasks.unwrap_or(file.runner.tasks);
        let workers = cli
            .workers
            .or(file.runner.workers)
            .unwrap_or_else(|| default_workers(strategy, cpus));

        let kind = cli
            .workload
            .or(file.workload.kind)
            .unwrap_or_else(|| WorkloadKind::default_for(strategy));
        let workload = match kind {
            WorkloadKind::Io => {
                let min = match cli.min_latency {
                    Some(secs) => latency_from_secs(secs)?,
                    None => file.min_latency()?,
                };
                let max = match cli.max_latency {
                    Some(secs) => latency_from_secs(secs)?,
                    None => file.max_latency()?,
                };
                WorkloadSpec::simulated_io(min, max)
            }
            WorkloadKind::Cpu => WorkloadSpec::cpu_bound(cli.work.unwrap_or(file.workload.iterations)),
        };

        let format_str = cli.format.as_deref().unwrap_or(&file.output.format);
        let format = format_str.parse::<OutputFormat>().map_err(anyhow::Error::msg)?;

        Ok(Self {
            config: TaskConfig::new(tasks, workers, workload, strategy)?,
            baseline: cli.baseline || file.runner.baseline,
            format,
            output: cli.output.clone(),
        })
    }
}

/// Run the conbench CLI with the process arguments.
///
/// # Returns
/// Returns `Ok(())` on success, or an error if something goes wrong.
pub fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    run_with_cli(cli)
}

/// Run the conbench CLI with pre-parsed arguments.
pub fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    // Worker mode first: workers never log and never touch stdout.
    if cli.conbench_worker {
        return run_worker_mode();
    }

    init_logging(cli.verbose);

    let file = match &cli.config {
        Some(path) => ConbenchConfig::load(path)?,
        None => ConbenchConfig::discover()?.unwrap_or_default(),
    };
    let cpus = available_cpus();
    let plan = RunPlan::resolve(&cli, &file, cpus)?;

    let outcome = BoundedExecutor::new(plan.config.clone()).run()?;
    let baseline = if plan.baseline {
        let sequential = plan.config.with_strategy(Strategy::Sequential);
        Some(SequentialRunner::new(sequential).run()?)
    } else {
        None
    };

    let report = RunReport::new(&plan.config, &outcome, baseline.as_ref(), cpus);
    let rendered = render(&report, plan.format)?;

    match &plan.output {
        Some(path) => {
            std::fs::write(path, &rendered)
                .with_context(|| format!("failed to write {}", path.display()))?;
            info!(path = %path.display(), "report written");
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(rendered.as_bytes())?;
            stdout.flush()?;
        }
    }

    Ok(())
}

/// Run as a worker process (IPC mode)
fn run_worker_mode() -> anyhow::Result<()> {
    let mut worker = WorkerMain::new();
    worker
        .run()
        .map_err(|e| anyhow::anyhow!("Worker error: {}", e))
}

/// Logs go to stderr so stdout carries only the report. `RUST_LOG` wins over
/// `--verbose`.
fn init_logging(verbose: bool) {
    let default = if verbose {
        "conbench=debug"
    } else {
        "conbench=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
