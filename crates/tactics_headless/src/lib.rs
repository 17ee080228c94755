//! Headless battle runner for scripted play, AI agents and CI verification.
//!
//! This crate drives a `tactics_core` battle from JSON requests on stdin,
//! with events and state on stdout. This enables:
//!
//! - **AI play**: an agent issues commands and reads back events
//! - **CI verification**: scenarios and scripts replay to identical hashes
//! - **Replay checks**: recorded replay files are re-run and compared
//!
//! # Protocol
//!
//! Communication uses JSON lines (one JSON object per line):
//!
//! - **stdin**: Requests from the controller (prepare, move, attack, etc.)
//! - **stdout**: Events, state and responses (JSON)
//! - **stderr**: Logs (human-readable)
//!
//! See [`protocol`] module for the full request/response format.
//!
//! # Example
//!
//! ```bash
//! # Run interactively on the built-in duel
//! echo '{"cmd":"query"}' | cargo run -p tactics_headless -- run
//!
//! # Run a scenario with a command file
//! cargo run -p tactics_headless -- run --scenario scenarios/duel.ron --commands moves.jsonl
//!
//! # Verify determinism
//! cargo run -p tactics_headless -- verify --scenario scenarios/duel.ron --commands moves.jsonl
//! ```

pub mod protocol;
pub mod runner;
pub mod scenario;
pub mod verify;

pub use protocol::{Request, Response, StateSnapshot, UnitState};
pub use runner::{load_command_script, HeadlessConfig, HeadlessRunner, RunnerError, SessionSummary};
pub use scenario::{Scenario, ScenarioError, ScenarioUnit, ScriptStep};
pub use verify::{verify_replay_bytes, verify_scenario, VerifyReport};
