//! gatepool command-line entry point

use std::time::{Duration, Instant};

use clap::Parser;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use gatepool::cli::{Cli, Commands, ConfigSubcommand, DispatcherArgs, RunArgs};
use gatepool::config::{self, GatepoolConfig};
use gatepool::error::{Error, Result};
use gatepool::logging::{self, LogGuards};
use gatepool::version;
use gatepool::workload::{self, FnRequest, SyntheticJob};
use gatepool::{Dispatcher, DispatcherStats};

fn main() {
    let cli = Cli::parse();

    if let Err(e) = run_command(cli) {
        error!("{}", e.format_for_log());
        eprint!("{}", e.format_for_terminal());
        std::process::exit(e.exit_code());
    }
}

fn run_command(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Version => {
            version::print_version();
            Ok(())
        }
        Commands::Config { subcommand } => {
            logging::init_simple(tracing::Level::WARN)?;
            handle_config_command(subcommand)
        }
        Commands::Run(args) => {
            let config = load_config(&args.dispatcher)?;
            let _log_guards = init_logging(&config, cli.verbose, cli.quiet)?;
            let runtime = build_runtime(&config)?;
            runtime.block_on(run_workload(config, args))
        }
        Commands::Sum { values, dispatcher } => {
            let config = load_config(&dispatcher)?;
            let _log_guards = init_logging(&config, cli.verbose, cli.quiet)?;
            let runtime = build_runtime(&config)?;
            let answer = runtime.block_on(sum_values(&config, values))?;
            println!("answer: {}", answer);
            Ok(())
        }
    }
}

/// File + env configuration with command-line overrides on top
fn load_config(args: &DispatcherArgs) -> Result<GatepoolConfig> {
    let mut config = GatepoolConfig::load(args.config.as_deref())?;
    config.apply_cli_overrides(&args.overrides())?;
    Ok(config)
}

fn init_logging(config: &GatepoolConfig, verbose: u8, quiet: bool) -> Result<LogGuards> {
    let guards = logging::init_logging(&config.logging, verbose, quiet)?;
    let build = version::build_info();
    debug!(
        version = %build.full_version(),
        target = %build.target,
        profile = %build.profile,
        "Starting gatepool"
    );
    Ok(guards)
}

fn build_runtime(config: &GatepoolConfig) -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .worker_threads(config.runtime_threads())
        .thread_name("gatepool")
        .build()
        .map_err(|e| Error::Internal(format!("Failed to create async runtime: {}", e)))
}

// ─────────────────────────────────────────────────────────────────
// sum
// ─────────────────────────────────────────────────────────────────

async fn sum_values(config: &GatepoolConfig, values: Vec<i64>) -> Result<i64> {
    let dispatcher = Dispatcher::with_config(config.to_dispatcher_config())?;
    let handle = dispatcher
        .submit(FnRequest::new(values, workload::sum))
        .await?;
    let answer = dispatcher.wait(handle).await;
    dispatcher.shutdown(true).await;
    answer
}

// ─────────────────────────────────────────────────────────────────
// run
// ─────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Serialize)]
struct Outcomes {
    succeeded: u64,
    failed: u64,
    timed_out: u64,
}

#[derive(Debug, Serialize)]
struct RunSummary {
    tasks: u64,
    sleep_ms: u64,
    interrupted: bool,
    wall_ms: u64,
    outcomes: Outcomes,
    dispatcher: DispatcherStats,
}

async fn run_workload(config: GatepoolConfig, args: RunArgs) -> Result<()> {
    let drain_on_interrupt = config.dispatcher.drain_on_shutdown;
    let dispatcher = Dispatcher::with_config(config.to_dispatcher_config())?;
    let jobs = workload::synthetic_batch(
        args.tasks,
        Duration::from_millis(args.sleep_ms),
        args.fail_every,
    );

    info!(
        tasks = args.tasks,
        sleep_ms = args.sleep_ms,
        fail_every = args.fail_every,
        "Starting workload"
    );
    let started = Instant::now();

    let mut outcomes = Outcomes::default();
    let interrupted = tokio::select! {
        result = submit_and_collect(&dispatcher, jobs, &mut outcomes) => {
            result?;
            false
        }
        _ = tokio::signal::ctrl_c() => {
            warn!(drain = drain_on_interrupt, "Interrupted, shutting down dispatcher");
            true
        }
    };

    dispatcher
        .shutdown(!interrupted || drain_on_interrupt)
        .await;

    let summary = RunSummary {
        tasks: args.tasks,
        sleep_ms: args.sleep_ms,
        interrupted,
        wall_ms: started.elapsed().as_millis() as u64,
        outcomes,
        dispatcher: dispatcher.stats(),
    };
    info!(
        wall_ms = summary.wall_ms,
        peak_in_flight = summary.dispatcher.peak_in_flight,
        "Workload finished"
    );

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary);
    }
    Ok(())
}

/// Submit every job, then wait on the handles in submission order
async fn submit_and_collect(
    dispatcher: &Dispatcher<SyntheticJob>,
    jobs: Vec<SyntheticJob>,
    outcomes: &mut Outcomes,
) -> Result<()> {
    let mut handles = Vec::with_capacity(jobs.len());
    for job in jobs {
        handles.push(dispatcher.submit(job).await?);
    }

    for handle in handles {
        let task_id = handle.id();
        match dispatcher.wait(handle).await {
            Ok(_) => outcomes.succeeded += 1,
            Err(e @ Error::TaskFailed { .. }) => {
                debug!(task_id = %task_id, error = %e, "Task reported failure");
                outcomes.failed += 1;
            }
            Err(Error::AwaitTimeout { .. }) => outcomes.timed_out += 1,
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

fn print_summary(summary: &RunSummary) {
    let stats = &summary.dispatcher;
    let mode = if stats.workers == 0 {
        "gate-only".to_string()
    } else {
        format!("{} workers", stats.workers)
    };

    println!("Workload Summary");
    println!("  Dispatcher:  {}, capacity {}", mode, stats.capacity);
    println!(
        "  Tasks:       {} x {}ms{}",
        summary.tasks,
        summary.sleep_ms,
        if summary.interrupted { " (interrupted)" } else { "" }
    );
    println!("  Submitted:   {}", stats.submitted);
    println!("  Succeeded:   {}", summary.outcomes.succeeded);
    println!("  Failed:      {}", summary.outcomes.failed);
    if summary.outcomes.timed_out > 0 {
        println!("  Timed out:   {}", summary.outcomes.timed_out);
    }
    println!("  Peak:        {} concurrent", stats.peak_in_flight);
    println!("  Wall time:   {}ms", summary.wall_ms);
    println!("  State:       {}", stats.state);
}

// ─────────────────────────────────────────────────────────────────
// config
// ─────────────────────────────────────────────────────────────────

fn handle_config_command(subcommand: ConfigSubcommand) -> Result<()> {
    match subcommand {
        ConfigSubcommand::Show { config } => {
            let cfg = GatepoolConfig::load(config.as_deref())?;
            println!("{}", toml::to_string_pretty(&cfg)?);
        }
        ConfigSubcommand::Init { path, force } => {
            let written = config::init_config(path.as_deref(), force)?;
            println!("Configuration file created: {}", written.display());
        }
        ConfigSubcommand::Validate { config } => {
            GatepoolConfig::load(config.as_deref())?;
            println!("Configuration is valid.");
        }
    }
    Ok(())
}
