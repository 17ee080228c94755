//! Headless tactical battle runner.
//!
//! This binary runs a battle without graphics, controlled via JSON on stdin/stdout.
//! Designed for AI agents, CI testing, and replay verification.
//!
//! # Usage
//!
//! ```bash
//! # Interactive mode on the built-in duel - read requests from stdin
//! cargo run -p tactics_headless
//!
//! # Run a scenario, reading requests from a file and recording a replay
//! cargo run -p tactics_headless -- run --scenario scenarios/duel.ron --commands moves.jsonl --record duel.replay
//!
//! # Verify a scenario and command file replay identically
//! cargo run -p tactics_headless -- verify --scenario scenarios/duel.ron --commands moves.jsonl
//!
//! # Verify a recorded replay
//! cargo run -p tactics_headless -- verify --replay duel.replay
//! ```
//!
//! # Protocol
//!
//! Input (stdin): JSON requests, one per line
//! Output (stdout): JSON responses, one per line
//! Logs (stderr): Debug information
//!
//! See the protocol module for request/response format.

use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use tactics_headless::{
    load_command_script, verify_replay_bytes, verify_scenario, HeadlessConfig, HeadlessRunner,
    RunnerError, Scenario,
};

#[derive(Parser)]
#[command(name = "tactics_headless")]
#[command(about = "Headless tactical battle runner for AI play and CI")]
#[command(version)]
struct Cli {
    /// Enable verbose logging to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single interactive battle
    Run {
        /// Scenario file to load (built-in duel if omitted)
        #[arg(short, long)]
        scenario: Option<PathBuf>,

        /// Read requests from this JSON-lines file instead of stdin
        #[arg(short, long)]
        commands: Option<PathBuf>,

        /// Output state after every accepted command
        #[arg(long)]
        auto_state: bool,

        /// Write a replay of the session to this file
        #[arg(long)]
        record: Option<PathBuf>,
    },

    /// Verify determinism of a scenario, or of a recorded replay
    Verify {
        /// Scenario file to test (built-in duel if omitted)
        #[arg(short, long)]
        scenario: Option<PathBuf>,

        /// Extra commands to play after the scenario script
        #[arg(short, long)]
        commands: Option<PathBuf>,

        /// Number of runs to compare
        #[arg(short, long, default_value = "2")]
        runs: usize,

        /// Verify a replay file instead of a scenario
        #[arg(long, conflicts_with_all = ["scenario", "commands"])]
        replay: Option<PathBuf>,
    },
}

fn main() {
    let cli = Cli::parse();

    // Initialize logging to stderr (stdout is for protocol)
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(io::stderr)
                .with_ansi(true),
        )
        .with(filter)
        .init();

    let result = match cli.command {
        Some(Commands::Run {
            scenario,
            commands,
            auto_state,
            record,
        }) => cmd_run(scenario, commands, auto_state, record),
        Some(Commands::Verify {
            scenario,
            commands,
            runs,
            replay,
        }) => cmd_verify(scenario, commands, runs, replay),
        None => {
            // Default: interactive mode
            cmd_run(None, None, false, None)
        }
    };

    if let Err(e) = result {
        tracing::error!(error = %e, "Fatal");
        eprintln!("FATAL: {e}");
        std::process::exit(1);
    }
}

fn load_scenario(path: Option<&Path>) -> Result<Scenario, RunnerError> {
    match path {
        Some(path) => {
            tracing::info!(path = %path.display(), "Loading scenario");
            Ok(Scenario::load(path)?)
        }
        None => Ok(Scenario::duel()),
    }
}

/// Run a single interactive battle
fn cmd_run(
    scenario: Option<PathBuf>,
    commands: Option<PathBuf>,
    auto_state: bool,
    record: Option<PathBuf>,
) -> Result<(), RunnerError> {
    let scenario = load_scenario(scenario.as_deref())?;
    tracing::info!(scenario = %scenario.name, "Starting session");

    let config = HeadlessConfig {
        auto_state_output: auto_state,
    };
    let mut runner = HeadlessRunner::new(&scenario, config)?;

    let stdout = io::stdout();
    let summary = match commands {
        Some(path) => runner.run(BufReader::new(File::open(path)?), stdout.lock())?,
        None => runner.run(io::stdin().lock(), stdout.lock())?,
    };

    if let Some(path) = record {
        let bytes = runner.replay().to_bytes()?;
        std::fs::write(&path, bytes)?;
        tracing::info!(
            path = %path.display(),
            commands = runner.battle().command_log().len(),
            "Replay written"
        );
    }

    tracing::debug!(?summary, "Run complete");
    Ok(())
}

/// Verify determinism by running the same scenario multiple times
fn cmd_verify(
    scenario: Option<PathBuf>,
    commands: Option<PathBuf>,
    runs: usize,
    replay: Option<PathBuf>,
) -> Result<(), RunnerError> {
    if let Some(path) = replay {
        tracing::info!(path = %path.display(), "Verifying replay");
        let commands = verify_replay_bytes(&std::fs::read(&path)?)?;
        eprintln!("PASS: Replay reproduced its final hash after {commands} commands");
        return Ok(());
    }

    let scenario = load_scenario(scenario.as_deref())?;
    let extra = match commands {
        Some(path) => load_command_script(BufReader::new(File::open(path)?))?,
        None => Vec::new(),
    };
    tracing::info!(
        scenario = %scenario.name,
        commands = extra.len(),
        runs,
        "Verifying determinism"
    );

    let report = verify_scenario(&scenario, &extra, runs)?;
    if report.is_deterministic() {
        eprintln!(
            "PASS: All {} runs produced identical results ({} accepted, {} rejected)",
            report.hashes.len(),
            report.accepted,
            report.rejected
        );
        Ok(())
    } else {
        eprintln!("FAIL: Non-determinism detected!");
        eprintln!("  Hashes: {:016x?}", report.hashes);
        eprintln!("  Replay matched: {}", report.replay_ok);
        std::process::exit(1);
    }
}
