//! stakepool: command-line driver for the staking engine.
//!
//! Replays scripted operations against an in-memory engine built from
//! configuration, and exposes the tax and cycle arithmetic directly.

mod script;

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing::info;

use stakepool_core::amount::{format_amount, parse_amount};
use stakepool_core::tax::{find_tax_amount, is_valid_bps};
use stakepool_core::token::MemoryTokenLedger;
use stakepool_engine::{Engine, EngineConfig, EngineReport, JournalEntry};
use stakepool_rewards::{CycleSchedule, CycleState};

use crate::script::{parse_script, run_script, StepOutcome};

/// Pooled staking with pro-rata dividends and cycle-gated rewards.
#[derive(Parser, Debug)]
#[command(name = "stakepool", version, about)]
struct Cli {
    /// Log level (trace, debug, info, warn, error). `RUST_LOG` wins if set.
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Log output format ("text" or "json").
    #[arg(long, global = true, default_value = "text")]
    log_format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Replay a JSON script and print a JSON report.
    Simulate(SimulateArgs),
    /// Compute the tax on an amount.
    Tax(TaxArgs),
    /// Compute the reward cycle for a timestamp.
    Cycle(CycleArgs),
}

#[derive(Args, Debug)]
struct SimulateArgs {
    /// Engine configuration (TOML). `STAKEPOOL__*` variables override it.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Script to replay.
    #[arg(short, long)]
    script: PathBuf,

    /// Include the event journal in the report.
    #[arg(long)]
    events: bool,

    /// Pretty-print the report.
    #[arg(long)]
    pretty: bool,
}

#[derive(Args, Debug)]
struct TaxArgs {
    /// Amount in tokens (e.g. 2.1).
    #[arg(short, long)]
    amount: String,

    /// Rate in basis points.
    #[arg(short, long, default_value_t = stakepool_core::constants::DEFAULT_STAKING_TAX_BPS)]
    bps: u64,
}

#[derive(Args, Debug)]
struct CycleArgs {
    /// Unix time at which cycle 1 begins.
    #[arg(long)]
    start: Option<u64>,

    /// Cycle length in seconds.
    #[arg(long, default_value_t = stakepool_core::constants::DEFAULT_RELEASE_INTERVAL_SECS)]
    interval: u64,

    /// Unix time to evaluate.
    #[arg(long)]
    now: u64,
}

#[derive(Serialize)]
struct SimulationReport {
    steps: Vec<StepOutcome>,
    unexpected: usize,
    state: EngineReport,
    solvent: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    events: Option<Vec<JournalEntry>>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Simulate(args) => simulate(args, cli.log_level, &cli.log_format),
        Commands::Tax(args) => {
            init_logging(cli.log_level.as_deref().unwrap_or("warn"), &cli.log_format);
            tax(args)
        }
        Commands::Cycle(args) => {
            init_logging(cli.log_level.as_deref().unwrap_or("warn"), &cli.log_format);
            cycle(args)
        }
    }
}

fn simulate(args: SimulateArgs, log_level: Option<String>, log_format: &str) -> Result<()> {
    let config = EngineConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    init_logging(log_level.as_deref().unwrap_or(&config.log_level), log_format);

    let text = std::fs::read_to_string(&args.script)
        .with_context(|| format!("Failed to read script: {}", args.script.display()))?;
    let script = parse_script(&text)?;
    let start = script.steps.first().map_or(0, |s| s.at);
    let end = script.steps.iter().map(|s| s.at).max().unwrap_or(start);

    let engine = Engine::from_config(&config, MemoryTokenLedger::new(), start)
        .context("Failed to build engine")?;
    info!(steps = script.steps.len(), pools = config.pools.len(), "replaying script");

    let steps = run_script(&engine, config.operator_id(), &script)?;
    let unexpected = steps.iter().filter(|s| !s.as_expected).count();
    let solvent = match engine.check_solvency() {
        Ok(_) => true,
        Err(e) => {
            tracing::error!(error = %e, "ledger invariant violated");
            false
        }
    };

    let report = SimulationReport {
        steps,
        unexpected,
        state: engine.report(end),
        solvent,
        events: args.events.then(|| engine.events()),
    };
    let out = if args.pretty {
        serde_json::to_string_pretty(&report)?
    } else {
        serde_json::to_string(&report)?
    };
    println!("{out}");

    if unexpected > 0 || !solvent {
        bail!("{unexpected} step(s) did not match expectations, solvent = {solvent}");
    }
    Ok(())
}

fn tax(args: TaxArgs) -> Result<()> {
    if !is_valid_bps(args.bps) {
        bail!("Rate must be at most 10000 bps, got {}", args.bps);
    }
    let amount = parse_amount(&args.amount).with_context(|| format!("Invalid amount: {}", args.amount))?;
    let tax = find_tax_amount(amount, args.bps);
    println!("amount: {}", format_amount(amount));
    println!("tax:    {}", format_amount(tax));
    println!("net:    {}", format_amount(amount - tax));
    Ok(())
}

fn cycle(args: CycleArgs) -> Result<()> {
    if args.interval == 0 {
        bail!("Interval must be nonzero");
    }
    let schedule = CycleSchedule::new(args.start, args.interval);
    match schedule.state_at(args.now) {
        CycleState::NotStarted => println!("cycle: 0 (not started)"),
        CycleState::Active(n) => {
            let next = schedule.cycle_start(n + 1).map_or("-".to_string(), |t| t.to_string());
            println!("cycle: {n}");
            println!("next cycle at: {next}");
        }
    }
    Ok(())
}

/// Initialize tracing subscriber with the given log level and output format.
///
/// Logs go to stderr so stdout stays parseable.
fn init_logging(level: &str, format: &str) {
    use tracing_subscriber::filter::EnvFilter;
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    }
}
