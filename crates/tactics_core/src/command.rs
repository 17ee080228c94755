//! Player commands.
//!
//! Commands are the only way players change a battle. Each is attributed to
//! an originating player, validated against the authoritative state, and
//! appended to the command log once accepted. The log plus the seed is a
//! complete replay.

use serde::{Deserialize, Serialize};

use crate::map::GridPos;
use crate::warrior::{TeamId, UnitId};

/// A state-changing request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Command {
    /// Swap two cells during preparation.
    ExchangePositions {
        /// First cell.
        from: GridPos,
        /// Second cell.
        to: GridPos,
    },
    /// The player is ready to start.
    PlayerPrepared,
    /// The player's round begins.
    StartNextRound,
    /// Walk a unit along a path whose first cell is its current cell.
    MoveOnPath {
        /// Moving unit.
        unit: UnitId,
        /// Cells to walk, start included.
        path: Vec<GridPos>,
    },
    /// Basic attack.
    Attack {
        /// Acting unit.
        attacker: UnitId,
        /// Target unit.
        target: UnitId,
    },
    /// Use an active skill on a cell.
    CastSkill {
        /// Acting unit.
        caster: UnitId,
        /// Skill id.
        skill: String,
        /// Target cell.
        target: GridPos,
    },
    /// The player ends their turn.
    ActionDone,
}

impl Command {
    /// Short stable name for logs and errors.
    #[must_use]
    pub const fn opcode(&self) -> &'static str {
        match self {
            Self::ExchangePositions { .. } => "exchange_positions",
            Self::PlayerPrepared => "player_prepared",
            Self::StartNextRound => "start_next_round",
            Self::MoveOnPath { .. } => "move_on_path",
            Self::Attack { .. } => "attack",
            Self::CastSkill { .. } => "cast_skill",
            Self::ActionDone => "action_done",
        }
    }
}

/// An accepted command in the log.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CommandRecord {
    /// Position in the log, from zero.
    pub seq: u64,
    /// Originating player.
    pub player: TeamId,
    /// The command.
    pub command: Command,
}
