use clap::Parser;
use hydrosim::core::execution::{BatchRunner, ConcurrencyMode, ExecutionConfig};
use hydrosim::{ComponentRegistry, ScenarioConfig, SimulationManager, SimulationReport};
use log::{error, info, LevelFilter};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

/// Run water-system scenarios described by JSON documents
#[derive(Parser, Debug)]
#[command(name = "hydrosim")]
#[command(about = "Discrete-time water-system simulation", long_about = None)]
struct Args {
    /// Scenario documents; more than one runs them as a batch
    #[arg(required = true)]
    configs: Vec<PathBuf>,

    /// Write logged rows as JSON lines (single scenario only)
    #[arg(short, long)]
    out: Option<PathBuf>,

    /// Run a batch on a thread pool
    #[arg(long)]
    parallel: bool,

    /// Worker threads for --parallel
    #[arg(long)]
    threads: Option<usize>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

/// Level set from the command line; `None` leaves filtering to RUST_LOG
fn cli_level(rust_log_set: bool, verbose: bool) -> Option<LevelFilter> {
    if rust_log_set {
        return None;
    }
    Some(if verbose { LevelFilter::Debug } else { LevelFilter::Info })
}

fn summarize(path: &Path, report: &SimulationReport) {
    info!(
        "{}: run {} {:?} after {} tick(s), {} row(s), {} event(s) fired, {} action error(s)",
        path.display(),
        report.run_id,
        report.status,
        report.ticks,
        report.rows.len(),
        report.fired_events.len(),
        report.action_errors.len()
    );
}

fn run(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let registry = ComponentRegistry::with_builtins();
    let scenarios = args
        .configs
        .iter()
        .map(ScenarioConfig::from_path)
        .collect::<Result<Vec<_>, _>>()?;

    if let [scenario] = scenarios.as_slice() {
        let path = &args.configs[0];
        let report = match SimulationManager::new(&registry).run(scenario) {
            Ok(report) => report,
            Err(e) => {
                error!("{}: [{}] {}", path.display(), e.kind().as_str(), e);
                return Err(format!("scenario {} failed", path.display()).into());
            }
        };
        summarize(path, &report);
        if let Some(out) = &args.out {
            std::fs::write(out, report.to_jsonl()?)?;
            info!("wrote {}", out.display());
        }
        return Ok(());
    }

    if args.out.is_some() {
        return Err("--out needs exactly one scenario".into());
    }
    let mut config = ExecutionConfig::new();
    if args.parallel {
        config = config.with_concurrency(ConcurrencyMode::Rayon);
    }
    if let Some(threads) = args.threads {
        config = config.with_thread_pool_size(threads);
    }

    let mut failures = 0;
    for (path, result) in args.configs.iter().zip(BatchRunner::new(&registry, config).run_all(&scenarios)) {
        match result {
            Ok(report) => summarize(path, &report),
            Err(e) => {
                failures += 1;
                error!("{}: [{}] {}", path.display(), e.kind().as_str(), e);
            }
        }
    }
    if failures > 0 {
        return Err(format!("{} of {} scenario(s) failed", failures, scenarios.len()).into());
    }
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();
    let mut logger = env_logger::Builder::from_default_env();
    if let Some(level) = cli_level(std::env::var_os("RUST_LOG").is_some(), args.verbose) {
        logger.filter_level(level);
    }
    logger.format_timestamp(None).init();

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
