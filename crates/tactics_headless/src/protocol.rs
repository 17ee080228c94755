//! JSON protocol for headless battle communication.
//!
//! The headless runner communicates via JSON lines (one JSON object per line):
//!
//! **Input (stdin):** Requests from the controller
//! **Output (stdout):** Events, state snapshots and responses
//!
//! # Protocol Flow
//!
//! 1. Runner starts, outputs `{"type":"ready",...}`
//! 2. Controller sends requests as JSON lines
//! 3. Every accepted battle command is answered with the events it produced
//! 4. When one team is left, outputs `{"type":"game_over","winner":N,...}`
//!
//! # Example Session
//!
//! ```text
//! <- {"type":"ready","version":"1.0","players":[1,2],"phase":"Preparing"}
//! -> {"cmd":"prepare","player":1}
//! <- {"type":"events","seq":0,"events":[{"PlayerPrepared":{"player":1}}]}
//! -> {"cmd":"attack","player":1,"attacker":0,"target":2}
//! <- {"type":"error","message":"...","cmd":"attack"}
//! -> {"cmd":"hash"}
//! <- {"type":"state_hash","commands":1,"hash":1234}
//! ```

use serde::{Deserialize, Serialize};
use tactics_core::battle::{Battle, BattlePhase};
use tactics_core::command::Command as CoreCommand;
use tactics_core::events::BattleEvent;
use tactics_core::map::GridPos;
use tactics_core::warrior::{TeamId, UnitId};

/// Protocol version reported in `ready`.
pub const PROTOCOL_VERSION: &str = "1.0";

// ============================================================================
// Input Requests (Controller -> Runner)
// ============================================================================

/// Requests that can be sent to the headless runner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum Request {
    /// Declare a player ready.
    Prepare { player: TeamId },

    /// Swap two cells during preparation.
    Exchange {
        player: TeamId,
        from: GridPos,
        to: GridPos,
    },

    /// Start the next round for a player.
    StartRound { player: TeamId },

    /// Walk a unit along a path that starts at its cell.
    Move {
        player: TeamId,
        unit: u32,
        path: Vec<GridPos>,
    },

    /// Basic attack.
    Attack {
        player: TeamId,
        attacker: u32,
        target: u32,
    },

    /// Cast an active skill at a cell.
    Cast {
        player: TeamId,
        caster: u32,
        skill: String,
        target: GridPos,
    },

    /// End a player's actions for the round.
    ActionDone { player: TeamId },

    /// Query current battle state.
    Query,

    /// Ask for a unit's path to a cell, limited to its move range.
    Path { unit: u32, to: GridPos },

    /// Current state hash (for determinism verification).
    Hash,

    /// Quit the session.
    Quit,
}

impl Request {
    /// Parse from a JSON line.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Request name, as written in the `cmd` field.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Prepare { .. } => "prepare",
            Self::Exchange { .. } => "exchange",
            Self::StartRound { .. } => "start_round",
            Self::Move { .. } => "move",
            Self::Attack { .. } => "attack",
            Self::Cast { .. } => "cast",
            Self::ActionDone { .. } => "action_done",
            Self::Query => "query",
            Self::Path { .. } => "path",
            Self::Hash => "hash",
            Self::Quit => "quit",
        }
    }

    /// The battle command this request issues, with the issuing player.
    /// `None` for session requests (query, path, hash, quit).
    pub fn into_command(self) -> Option<(TeamId, CoreCommand)> {
        let issued = match self {
            Self::Prepare { player } => (player, CoreCommand::PlayerPrepared),
            Self::Exchange { player, from, to } => {
                (player, CoreCommand::ExchangePositions { from, to })
            }
            Self::StartRound { player } => (player, CoreCommand::StartNextRound),
            Self::Move { player, unit, path } => (
                player,
                CoreCommand::MoveOnPath {
                    unit: UnitId(unit),
                    path,
                },
            ),
            Self::Attack {
                player,
                attacker,
                target,
            } => (
                player,
                CoreCommand::Attack {
                    attacker: UnitId(attacker),
                    target: UnitId(target),
                },
            ),
            Self::Cast {
                player,
                caster,
                skill,
                target,
            } => (
                player,
                CoreCommand::CastSkill {
                    caster: UnitId(caster),
                    skill,
                    target,
                },
            ),
            Self::ActionDone { player } => (player, CoreCommand::ActionDone),
            Self::Query | Self::Path { .. } | Self::Hash | Self::Quit => return None,
        };
        Some(issued)
    }

    /// The request that issues `command` as `player`.
    pub fn from_command(player: TeamId, command: CoreCommand) -> Self {
        match command {
            CoreCommand::ExchangePositions { from, to } => Self::Exchange { player, from, to },
            CoreCommand::PlayerPrepared => Self::Prepare { player },
            CoreCommand::StartNextRound => Self::StartRound { player },
            CoreCommand::MoveOnPath { unit, path } => Self::Move {
                player,
                unit: unit.0,
                path,
            },
            CoreCommand::Attack { attacker, target } => Self::Attack {
                player,
                attacker: attacker.0,
                target: target.0,
            },
            CoreCommand::CastSkill {
                caster,
                skill,
                target,
            } => Self::Cast {
                player,
                caster: caster.0,
                skill,
                target,
            },
            CoreCommand::ActionDone => Self::ActionDone { player },
        }
    }
}

// ============================================================================
// Output Responses (Runner -> Controller)
// ============================================================================

/// Responses sent from the headless runner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    /// Runner is ready to accept requests.
    Ready {
        version: String,
        players: Vec<TeamId>,
        phase: BattlePhase,
    },

    /// Events produced by an accepted command.
    Events { seq: u64, events: Vec<BattleEvent> },

    /// Current battle state.
    State(StateSnapshot),

    /// Path query answer. `null` when no path exists.
    Path {
        unit: u32,
        path: Option<Vec<GridPos>>,
    },

    /// State hash for determinism verification.
    StateHash { commands: usize, hash: u64 },

    /// Error processing a request.
    Error {
        message: String,
        cmd: Option<String>,
    },

    /// The battle has ended.
    GameOver { winner: TeamId, turn: u32 },

    /// Goodbye message before shutdown.
    Bye,
}

// ============================================================================
// State Types
// ============================================================================

/// Battle state as seen by a controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub phase: BattlePhase,
    pub turn: u32,
    pub winner: TeamId,
    pub units: Vec<UnitState>,
    pub hash: u64,
}

/// State of a single warrior.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitState {
    pub id: u32,
    pub name: String,
    pub team: TeamId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pos: Option<GridPos>,
    pub hp: i32,
    pub max_hp: i32,
    pub es: i32,
    pub max_es: i32,
    pub moved: bool,
    pub action_done: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub buffs: Vec<String>,
}

impl StateSnapshot {
    /// Capture a battle. Dead warriors are listed without a position.
    pub fn capture(battle: &Battle) -> Self {
        let units = battle
            .warriors()
            .iter()
            .map(|w| UnitState {
                id: w.id().0,
                name: w.name.clone(),
                team: w.team,
                pos: battle.position_of(w.id()),
                hp: w.hp,
                max_hp: w.max_hp,
                es: w.es,
                max_es: w.max_es,
                moved: w.moved,
                action_done: w.action_done,
                buffs: w.buffs().map(|b| b.id.clone()).collect(),
            })
            .collect();
        Self {
            phase: battle.phase(),
            turn: battle.turn(),
            winner: battle.winner(),
            units,
            hash: battle.state_hash(),
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

impl Response {
    /// Create a ready response for a battle.
    pub fn ready(battle: &Battle) -> Self {
        Self::Ready {
            version: PROTOCOL_VERSION.to_string(),
            players: battle.players().to_vec(),
            phase: battle.phase(),
        }
    }

    /// Create an error response.
    pub fn error(message: impl Into<String>, cmd: Option<&str>) -> Self {
        Self::Error {
            message: message.into(),
            cmd: cmd.map(String::from),
        }
    }

    /// Serialize to JSON line (with newline).
    pub fn to_json_line(&self) -> String {
        let mut json = serde_json::to_string(self).unwrap_or_else(|e| {
            format!(
                r#"{{"type":"error","message":"Serialization failed: {}"}}"#,
                e
            )
        });
        json.push('\n');
        json
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_attack_request() {
        let json = r#"{"cmd":"attack","player":1,"attacker":0,"target":2}"#;
        let request = Request::from_json(json).unwrap();
        assert_eq!(
            request.into_command(),
            Some((
                1,
                CoreCommand::Attack {
                    attacker: UnitId(0),
                    target: UnitId(2)
                }
            ))
        );
    }

    #[test]
    fn test_parse_move_request() {
        let json = r#"{"cmd":"move","player":2,"unit":3,"path":[{"x":6,"y":3},{"x":5,"y":3}]}"#;
        let request = Request::from_json(json).unwrap();
        assert_eq!(request.name(), "move");
        assert!(matches!(
            request,
            Request::Move { player: 2, unit: 3, ref path } if path.len() == 2
        ));
    }

    #[test]
    fn test_session_requests_issue_no_command() {
        for json in [
            r#"{"cmd":"query"}"#,
            r#"{"cmd":"hash"}"#,
            r#"{"cmd":"quit"}"#,
            r#"{"cmd":"path","unit":0,"to":{"x":1,"y":1}}"#,
        ] {
            assert_eq!(Request::from_json(json).unwrap().into_command(), None);
        }
    }

    #[test]
    fn test_unknown_request_is_an_error() {
        assert!(Request::from_json(r#"{"cmd":"tick","count":60}"#).is_err());
        assert!(Request::from_json(r#"{"cmd":"attack","player":1}"#).is_err());
    }

    #[test]
    fn test_command_conversion_is_symmetric() {
        let command = CoreCommand::CastSkill {
            caster: UnitId(3),
            skill: "bolt".into(),
            target: GridPos::new(4, 2),
        };
        let request = Request::from_command(2, command.clone());
        assert_eq!(request.name(), "cast");
        assert_eq!(request.into_command(), Some((2, command)));
    }

    #[test]
    fn test_serialize_responses() {
        let json = Response::StateHash {
            commands: 3,
            hash: 42,
        }
        .to_json_line();
        assert_eq!(json, "{\"type\":\"state_hash\",\"commands\":3,\"hash\":42}\n");

        let json = Response::Events {
            seq: 0,
            events: vec![BattleEvent::PlayerPrepared { player: 1 }],
        }
        .to_json_line();
        assert!(json.contains(r#""type":"events""#));
        assert!(json.contains(r#"{"PlayerPrepared":{"player":1}}"#));

        assert_eq!(Response::Bye.to_json_line(), "{\"type\":\"bye\"}\n");
    }
}
