//! Report Rendering
//!
//! A [`RunReport`] is built once from the measured outcome (and the optional
//! sequential baseline) and rendered either as the one-line-per-run human
//! format or as pretty JSON.

use chrono::{DateTime, Utc};
use conbench_core::{RunOutcome, TaskConfig, WorkloadSpec};
use conbench_stats::speedup;
use serde::Serialize;
use std::fmt;
use std::time::Duration;

/// Output format selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Human-readable terminal output
    #[default]
    Human,
    /// Pretty-printed JSON
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "human" | "text" => Ok(OutputFormat::Human),
            "json" => Ok(OutputFormat::Json),
            other => Err(format!("Unknown output format: {}", other)),
        }
    }
}

/// Complete report of one invocation
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// Version, time and machine
    pub meta: ReportMeta,
    /// Run parameters
    pub config: ReportConfig,
    /// Measured run
    pub result: StatsReport,
    /// Sequential baseline, when requested
    pub baseline: Option<StatsReport>,
    /// Baseline elapsed divided by measured elapsed
    pub speedup: Option<f64>,
}

/// Report metadata
#[derive(Debug, Clone, Serialize)]
pub struct ReportMeta {
    /// conbench version
    pub version: String,
    /// Time the report was assembled
    pub timestamp: DateTime<Utc>,
    /// Logical CPUs available
    pub cpus: usize,
}

/// Parameters the run was executed with
#[derive(Debug, Clone, Serialize)]
pub struct ReportConfig {
    /// Strategy name
    pub strategy: String,
    /// Number of tasks (N)
    pub tasks: usize,
    /// Effective concurrency cap
    pub workers: usize,
    /// Workload every task ran
    pub workload: WorkloadSpec,
}

/// Statistics of one run, in the units people read
///
/// An infinite throughput serializes as `null`.
#[derive(Debug, Clone, Serialize)]
pub struct StatsReport {
    /// Run label
    pub label: String,
    /// Wall-clock time of the run
    pub elapsed_secs: f64,
    /// Tasks per second
    pub throughput: f64,
    /// Mean latency
    pub mean_ms: f64,
    /// Median latency
    pub p50_ms: f64,
    /// 95th percentile latency
    pub p95_ms: f64,
    /// 99th percentile latency
    pub p99_ms: f64,
    /// Fastest task
    pub min_ms: f64,
    /// Slowest task
    pub max_ms: f64,
    /// Number of completed tasks
    pub results: usize,
    /// Sum of the values the work units returned
    pub checksum: f64,
}

impl StatsReport {
    fn from_outcome(label: impl Into<String>, outcome: &RunOutcome) -> Self {
        let stats = outcome.stats();
        Self {
            label: label.into(),
            elapsed_secs: stats.elapsed.as_secs_f64(),
            throughput: stats.throughput,
            mean_ms: stats.mean_ms(),
            p50_ms: millis(stats.p50),
            p95_ms: stats.p95_ms(),
            p99_ms: stats.p99_ms(),
            min_ms: millis(stats.min),
            max_ms: millis(stats.max),
            results: stats.count,
            checksum: outcome.checksum,
        }
    }
}

fn millis(d: Duration) -> f64 {
    d.as_secs_f64() * 1_000.0
}

impl RunReport {
    /// Assemble a report from a measured run and an optional baseline run
    pub fn new(
        config: &TaskConfig,
        outcome: &RunOutcome,
        baseline: Option<&RunOutcome>,
        cpus: usize,
    ) -> Self {
        let stats = outcome.stats();
        let baseline_stats = baseline.map(RunOutcome::stats);

        Self {
            meta: ReportMeta {
                version: env!("CARGO_PKG_VERSION").to_string(),
                timestamp: Utc::now(),
                cpus,
            },
            config: ReportConfig {
                strategy: config.strategy().to_string(),
                tasks: config.tasks(),
                workers: config.effective_concurrency(),
                workload: *config.workload(),
            },
            result: StatsReport::from_outcome(config.strategy().as_str(), outcome),
            baseline: baseline.map(|b| StatsReport::from_outcome("sequential", b)),
            speedup: baseline_stats.map(|b| speedup(&b, &stats)),
        }
    }
}

fn describe_workload(workload: &WorkloadSpec) -> String {
    match *workload {
        WorkloadSpec::SimulatedIo {
            min_latency_ns,
            max_latency_ns,
        } => format!(
            "io lat=[{},{}]s",
            Duration::from_nanos(min_latency_ns).as_secs_f64(),
            Duration::from_nanos(max_latency_ns).as_secs_f64()
        ),
        WorkloadSpec::CpuBound { iterations } => format!("cpu work={iterations}"),
    }
}

impl fmt::Display for StatsReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "elapsed={:.4}s | throughput={:.2}/s | mean={:.2} ms | p95={:.2} ms | p99={:.2} ms | results={}",
            self.elapsed_secs, self.throughput, self.mean_ms, self.p95_ms, self.p99_ms, self.results
        )
    }
}

/// The human-readable report
impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "CPU cores: {} | strategy={} | workers={} | tasks={} | {}",
            self.meta.cpus,
            self.config.strategy,
            self.config.workers,
            self.config.tasks,
            describe_workload(&self.config.workload)
        )?;

        writeln!(f, "\n[{}]", self.result.label)?;
        writeln!(f, "{}", self.result)?;

        if let Some(baseline) = &self.baseline {
            writeln!(f, "\n[baseline ({}, 1 worker)]", baseline.label)?;
            writeln!(f, "{baseline}")?;
        }
        if let Some(speedup) = self.speedup {
            writeln!(
                f,
                "\n≈ Speedup ~ {:.2}x ({} vs sequential)",
                speedup, self.config.strategy
            )?;
        }
        Ok(())
    }
}

/// Render the human-readable report
pub fn generate_human_report(report: &RunReport) -> String {
    report.to_string()
}

/// Render the report as pretty JSON
pub fn generate_json_report(report: &RunReport) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(report)
}

/// Render in `format`
pub fn render(report: &RunReport, format: OutputFormat) -> anyhow::Result<String> {
    Ok(match format {
        OutputFormat::Human => generate_human_report(report),
        OutputFormat::Json => {
            let mut json = generate_json_report(report)?;
            json.push('\n');
            json
        }
    })
}
