//! Swell Soak Runner
//!
//! Drives the point-query engine with a churning population of simulated
//! callers and checks its bookkeeping every tick.
//!
//! Usage: `swell-run [--ticks N] [--callers N] [--backend cpu|gpu] [--config FILE]`

mod soak;

use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, ValueEnum};
use thiserror::Error;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use swell_gpu::{GpuError, gerstner_displacement};
use swell_query::{DeferredExecutor, QueryEngine, QueryEngineConfig, QueryError};

use crate::soak::{Soak, SoakOptions, SoakReport, TimedExecutor};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Backend {
    /// Rayon sampler with simulated readback latency
    Cpu,
    /// wgpu compute sampler (requires the `gpu` feature)
    Gpu,
}

#[derive(Parser, Debug)]
#[command(name = "swell-run")]
#[command(about = "Soak the swell query engine with churning callers")]
struct Args {
    /// Number of ticks to run
    #[arg(long, default_value = "600")]
    ticks: u64,

    /// Simulated callers alive at once
    #[arg(long, default_value = "64")]
    callers: usize,

    /// Seconds per tick
    #[arg(long, default_value = "0.0166667")]
    dt: f64,

    /// Upper bound on points per caller
    #[arg(long, default_value = "16")]
    max_points: usize,

    /// Per-tick probability that a caller leaves
    #[arg(long, default_value = "0.02")]
    churn: f64,

    /// Per-tick probability that a caller changes its point count
    #[arg(long, default_value = "0.01")]
    resize: f64,

    /// Workload seed
    #[arg(long, default_value = "42")]
    seed: u64,

    /// Ticks between submitting a CPU batch and its result arriving
    #[arg(long, default_value = "3")]
    latency: u32,

    /// Fail every Nth CPU batch
    #[arg(long)]
    fail_every: Option<u64>,

    /// Sampling backend
    #[arg(long, value_enum, default_value = "cpu")]
    backend: Backend,

    /// Engine configuration (JSON); missing fields take defaults
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log a health line every N ticks (0 disables)
    #[arg(long, default_value = "60")]
    report_every: u64,

    /// Write the final report as JSON
    #[arg(long)]
    report: Option<PathBuf>,
}

#[derive(Debug, Error)]
enum RunError {
    /// Config or report file could not be accessed.
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid JSON for [`QueryEngineConfig`].
    #[error("invalid config {path}: {source}")]
    Config {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error(transparent)]
    Gpu(#[from] GpuError),

    #[error("failed to serialize report: {0}")]
    Report(#[from] serde_json::Error),
}

/// Used when `RUST_LOG` is unset.
const DEFAULT_LOG_FILTER: &str = "swell_run=info,swell_query=warn";

fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn main() {
    init_logging();

    let args = Args::parse();

    match run(&args) {
        Ok(report) => {
            info!(
                ticks = report.ticks,
                queries = report.queries,
                retrieved = report.retrieved,
                velocities = report.velocities,
                evicted = report.engine.requests_evicted,
                failed = report.engine.requests_failed,
                "Soak complete"
            );
            if report.invariant_violations > 0 {
                error!(
                    violations = report.invariant_violations,
                    "Engine invariants were violated"
                );
                process::exit(2);
            }
        }
        Err(e) => {
            error!("Soak failed: {}", e);
            process::exit(1);
        }
    }
}

fn run(args: &Args) -> Result<SoakReport, RunError> {
    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => QueryEngineConfig::default(),
    };
    let options = SoakOptions {
        ticks: args.ticks,
        callers: args.callers,
        dt: args.dt,
        max_points: args.max_points,
        churn: args.churn,
        resize: args.resize,
        seed: args.seed,
        report_every: args.report_every,
    };

    info!(
        backend = ?args.backend,
        ticks = options.ticks,
        callers = options.callers,
        seed = options.seed,
        "Starting soak"
    );

    let report = match args.backend {
        Backend::Cpu => {
            let mut executor = DeferredExecutor::new(|p, t| {
                gerstner_displacement(p.position, p.min_grid_size, t as f32)
            })
            .with_latency(args.latency);
            if let Some(n) = args.fail_every {
                executor = executor.with_failure_every(n);
            }
            soak(config, executor, options)?
        }
        Backend::Gpu => run_gpu(config, options)?,
    };

    if let Some(path) = &args.report {
        let json = serde_json::to_string_pretty(&report)?;
        fs::write(path, json).map_err(|source| RunError::Io {
            path: path.clone(),
            source,
        })?;
        info!("Report written to {}", path.display());
    }

    Ok(report)
}

fn soak<E: TimedExecutor>(
    config: QueryEngineConfig,
    executor: E,
    options: SoakOptions,
) -> Result<SoakReport, RunError> {
    let mut engine = QueryEngine::new(config, executor)?;
    let report = Soak::new(options).run(&mut engine);
    if engine.is_stalled() {
        warn!("Engine finished with an exhausted ring");
    }
    Ok(report)
}

#[cfg(feature = "gpu")]
fn run_gpu(config: QueryEngineConfig, options: SoakOptions) -> Result<SoakReport, RunError> {
    use swell_gpu::{GpuBatchExecutor, GpuExecutorConfig};

    let executor = GpuBatchExecutor::new(GpuExecutorConfig::default())?;
    info!(adapter = executor.context().adapter_name(), "GPU sampler ready");
    soak(config, executor, options)
}

#[cfg(not(feature = "gpu"))]
fn run_gpu(_config: QueryEngineConfig, _options: SoakOptions) -> Result<SoakReport, RunError> {
    Err(GpuError::FeatureNotEnabled.into())
}

fn load_config(path: &Path) -> Result<QueryEngineConfig, RunError> {
    let text = fs::read_to_string(path).map_err(|source| RunError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let config = serde_json::from_str(&text).map_err(|source| RunError::Config {
        path: path.to_path_buf(),
        source,
    })?;
    info!("Loaded engine config from {}", path.display());
    Ok(config)
}
