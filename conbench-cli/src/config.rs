//! Configuration loading from conbench.toml
//!
//! Defaults for a run can live in a `conbench.toml` file. The file is
//! discovered by walking up from the current directory, or named explicitly
//! with `--config`. Command-line flags override anything set here.

use anyhow::{Context, anyhow};
use conbench_core::Strategy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// File name looked for during discovery
pub const CONFIG_FILE: &str = "conbench.toml";

/// conbench configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ConbenchConfig {
    /// Runner configuration
    #[serde(default)]
    pub runner: RunnerConfig,
    /// Built-in workload configuration
    #[serde(default)]
    pub workload: WorkloadConfig,
    /// Output configuration
    #[serde(default)]
    pub output: OutputConfig,
}

/// Which built-in workload to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WorkloadKind {
    /// Sleep for a random latency
    Io,
    /// Sum square roots
    Cpu,
}

impl WorkloadKind {
    /// Natural workload of `strategy`
    pub fn default_for(strategy: Strategy) -> Self {
        if strategy.prefers_cpu_work() {
            WorkloadKind::Cpu
        } else {
            WorkloadKind::Io
        }
    }
}

impl std::str::FromStr for WorkloadKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "io" | "sleep" => Ok(WorkloadKind::Io),
            "cpu" => Ok(WorkloadKind::Cpu),
            other => Err(format!("Unknown workload: {}", other)),
        }
    }
}

/// Runner configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunnerConfig {
    /// Scheduling strategy
    #[serde(default)]
    pub strategy: Strategy,
    /// Number of tasks per run
    #[serde(default = "default_tasks")]
    pub tasks: usize,
    /// Concurrency cap; derived from the CPU count when unset
    #[serde(default)]
    pub workers: Option<usize>,
    /// Also run the sequential baseline
    #[serde(default)]
    pub baseline: bool,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            strategy: Strategy::default(),
            tasks: default_tasks(),
            workers: None,
            baseline: false,
        }
    }
}

fn default_tasks() -> usize {
    200
}

/// Workload configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkloadConfig {
    /// "io" or "cpu"; follows the strategy when unset
    #[serde(default)]
    pub kind: Option<WorkloadKind>,
    /// Shortest simulated latency (e.g. "5ms")
    #[serde(default = "default_min_latency")]
    pub min_latency: String,
    /// Longest simulated latency (e.g. "20ms")
    #[serde(default = "default_max_latency")]
    pub max_latency: String,
    /// Loop length of the CPU-bound workload
    #[serde(default = "default_iterations")]
    pub iterations: u64,
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            kind: None,
            min_latency: default_min_latency(),
            max_latency: default_max_latency(),
            iterations: default_iterations(),
        }
    }
}

fn default_min_latency() -> String {
    "5ms".to_string()
}
fn default_max_latency() -> String {
    "20ms".to_string()
}
fn default_iterations() -> u64 {
    100_000
}

/// Output configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OutputConfig {
    /// Default output format: "human" or "json"
    #[serde(default = "default_format")]
    pub format: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: default_format(),
        }
    }
}

fn default_format() -> String {
    "human".to_string()
}

impl ConbenchConfig {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let config: Self =
            toml::from_str(&content).with_context(|| format!("invalid {}", path.display()))?;
        Ok(config)
    }

    /// Find the nearest `conbench.toml` walking up from `start`
    pub fn find_from(start: &Path) -> Option<PathBuf> {
        let mut dir = start.to_path_buf();
        loop {
            let config_path = dir.join(CONFIG_FILE);
            if config_path.is_file() {
                return Some(config_path);
            }
            if !dir.pop() {
                return None;
            }
        }
    }

    /// Discover and load configuration from the current directory upwards.
    ///
    /// A missing file yields `Ok(None)`; a file that exists but doesn't parse
    /// is an error.
    pub fn discover() -> anyhow::Result<Option<Self>> {
        let cwd = std::env::current_dir()?;
        Self::find_from(&cwd).map(Self::load).transpose()
    }

    /// Shortest simulated latency
    pub fn min_latency(&self) -> anyhow::Result<Duration> {
        parse_duration(&self.workload.min_latency).map(Duration::from_nanos)
    }

    /// Longest simulated latency
    pub fn max_latency(&self) -> anyhow::Result<Duration> {
        parse_duration(&self.workload.max_latency).map(Duration::from_nanos)
    }

    /// Generate a default configuration as TOML string
    pub fn default_toml() -> String {
        r#"# conbench configuration

[runner]
# cooperative, thread-pool, process-pool or sequential
strategy = "thread-pool"
# Number of tasks per run
tasks = 200
# Concurrency cap (uncomment to override the CPU-derived default)
# workers = 16
# Also run the sequential baseline and report the speedup
baseline = false

[workload]
# "io" or "cpu" (uncomment to override the strategy's default)
# kind = "io"
# Simulated I/O latency range
min_latency = "5ms"
max_latency = "20ms"
# CPU-bound loop length
iterations = 100000

[output]
# human or json
format = "human"
"#
        .to_string()
    }
}

/// Parse a duration string (e.g. "3s", "500ms", "2m") into nanoseconds
pub fn parse_duration(s: &str) -> anyhow::Result<u64> {
    let s = s.trim();
    if s.is_empty() {
        return Err(anyhow!("Empty duration string"));
    }

    let (num_part, unit_part) = s
        .char_indices()
        .find(|(_, c)| c.is_alphabetic() || *c == 'µ')
        .map(|(i, _)| s.split_at(i))
        .unwrap_or((s, "s"));

    let value: f64 = num_part
        .trim()
        .parse()
        .map_err(|_| anyhow!("Invalid duration number: {}", num_part))?;
    if !value.is_finite() || value < 0.0 {
        return Err(anyhow!("Duration must be a non-negative number: {}", s));
    }

    let multiplier: u64 = match unit_part.to_lowercase().as_str() {
        "ns" => 1,
        "us" | "µs" => 1_000,
        "ms" => 1_000_000,
        "s" | "" => 1_000_000_000,
        "m" | "min" => 60_000_000_000,
        _ => return Err(anyhow!("Unknown duration unit: {}", unit_part)),
    };

    Ok((value * multiplier as f64) as u64)
}
