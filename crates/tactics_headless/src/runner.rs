//! Headless battle runner implementation.
//!
//! The runner owns one battle and answers protocol requests against it. It
//! is generic over its input and output so tests can drive it from memory;
//! the binary wires it to stdin and stdout.

use std::io::{self, BufRead, Write};

use tactics_core::battle::{Battle, BattlePhase};
use tactics_core::command::Command;
use tactics_core::error::BattleError;
use tactics_core::replay::Replay;
use tactics_core::setup::BattleSetup;
use tactics_core::warrior::{TeamId, UnitId};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::protocol::{Request, Response, StateSnapshot};
use crate::scenario::{Scenario, ScenarioError};

/// Error type for runner operations.
#[derive(Error, Debug)]
pub enum RunnerError {
    /// Reading input or writing output failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// The scenario could not be loaded or compiled.
    #[error(transparent)]
    Scenario(#[from] ScenarioError),
    /// A line of a command file is not a valid request.
    #[error("Line {line}: {source}")]
    BadLine {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
    /// A scenario script step was rejected by the battle.
    #[error("Script step {step} rejected: {source}")]
    Script {
        step: usize,
        #[source]
        source: BattleError,
    },
    /// The core refused an operation outside a command.
    #[error(transparent)]
    Battle(#[from] BattleError),
}

/// Headless runner configuration.
#[derive(Debug, Clone, Default)]
pub struct HeadlessConfig {
    /// Output a state snapshot after every accepted command.
    pub auto_state_output: bool,
}

/// What happened during a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SessionSummary {
    /// Requests read, parse failures included.
    pub requests: usize,
    /// Battle commands accepted.
    pub accepted: usize,
    /// Requests rejected or unparsable.
    pub rejected: usize,
    /// Whether the controller sent `quit`.
    pub quit: bool,
}

/// Headless runner for controller-driven battles.
#[derive(Debug)]
pub struct HeadlessRunner {
    config: HeadlessConfig,
    scenario_name: String,
    setup: BattleSetup,
    battle: Battle,
    game_over_sent: bool,
}

impl HeadlessRunner {
    /// Build the scenario's battle and apply its opening script.
    ///
    /// # Errors
    ///
    /// [`RunnerError::Script`] if a scripted command is rejected.
    pub fn new(scenario: &Scenario, config: HeadlessConfig) -> Result<Self, RunnerError> {
        let setup = scenario.to_setup()?;
        let mut battle = Battle::from_setup(&setup)?;
        for (step, (player, command)) in scenario.script().into_iter().enumerate() {
            battle
                .apply(player, command)
                .map_err(|source| RunnerError::Script { step, source })?;
        }
        info!(
            scenario = %scenario.name,
            scripted = scenario.script.len(),
            phase = ?battle.phase(),
            "Runner ready"
        );
        Ok(Self {
            config,
            scenario_name: scenario.name.clone(),
            setup,
            battle,
            game_over_sent: false,
        })
    }

    /// The battle being played.
    pub fn battle(&self) -> &Battle {
        &self.battle
    }

    /// Everything accepted so far, as a replay.
    pub fn replay(&self) -> Replay {
        Replay::record(self.scenario_name.clone(), self.setup.clone(), &self.battle)
    }

    /// Answer one request.
    pub fn handle(&mut self, request: Request) -> Vec<Response> {
        let name = request.name();
        debug!(cmd = name, "Request");
        match request {
            Request::Query => vec![Response::State(StateSnapshot::capture(&self.battle))],
            Request::Hash => vec![Response::StateHash {
                commands: self.battle.command_log().len(),
                hash: self.battle.state_hash(),
            }],
            Request::Path { unit, to } => match self.battle.find_path_for(UnitId(unit), to) {
                Ok(path) => vec![Response::Path { unit, path }],
                Err(err) => vec![Response::error(err.to_string(), Some(name))],
            },
            Request::Quit => vec![Response::Bye],
            battle_request => match battle_request.into_command() {
                Some((player, command)) => self.apply(name, player, command),
                None => vec![Response::error("not a battle command", Some(name))],
            },
        }
    }

    fn apply(&mut self, name: &str, player: TeamId, command: Command) -> Vec<Response> {
        let events = match self.battle.apply(player, command) {
            Ok(events) => events,
            Err(err) => return vec![Response::error(err.to_string(), Some(name))],
        };

        let seq = self.battle.command_log().len() as u64 - 1;
        let mut responses = vec![Response::Events { seq, events }];
        if self.config.auto_state_output {
            responses.push(Response::State(StateSnapshot::capture(&self.battle)));
        }
        if self.battle.phase() == BattlePhase::Ended && !self.game_over_sent {
            self.game_over_sent = true;
            info!(winner = self.battle.winner(), turn = self.battle.turn(), "Game over");
            responses.push(Response::GameOver {
                winner: self.battle.winner(),
                turn: self.battle.turn(),
            });
        }
        responses
    }

    /// Run the session: write `ready`, then answer each input line until
    /// `quit` or end of input.
    pub fn run<R: BufRead, W: Write>(
        &mut self,
        input: R,
        mut output: W,
    ) -> Result<SessionSummary, RunnerError> {
        let mut summary = SessionSummary::default();
        write_response(&mut output, &Response::ready(&self.battle))?;

        for line in input.lines() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            summary.requests += 1;

            let request = match Request::from_json(line) {
                Ok(request) => request,
                Err(e) => {
                    warn!(error = %e, "Unparsable request");
                    summary.rejected += 1;
                    write_response(&mut output, &Response::error(format!("Parse error: {e}"), None))?;
                    continue;
                }
            };
            let quit = matches!(request, Request::Quit);

            for response in self.handle(request) {
                match response {
                    Response::Events { .. } => summary.accepted += 1,
                    Response::Error { .. } => summary.rejected += 1,
                    _ => {}
                }
                write_response(&mut output, &response)?;
            }
            output.flush()?;

            if quit {
                summary.quit = true;
                break;
            }
        }

        info!(
            requests = summary.requests,
            accepted = summary.accepted,
            rejected = summary.rejected,
            "Session finished"
        );
        Ok(summary)
    }
}

fn write_response<W: Write>(output: &mut W, response: &Response) -> io::Result<()> {
    output.write_all(response.to_json_line().as_bytes())
}

/// Read a JSON-lines command file into player-attributed commands.
///
/// Session requests (query, path, hash, quit) are skipped.
pub fn load_command_script<R: BufRead>(input: R) -> Result<Vec<(TeamId, Command)>, RunnerError> {
    let mut script = Vec::new();
    for (index, line) in input.lines().enumerate() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let request = Request::from_json(line).map_err(|source| RunnerError::BadLine {
            line: index + 1,
            source,
        })?;
        if let Some(issued) = request.into_command() {
            script.push(issued);
        }
    }
    Ok(script)
}
