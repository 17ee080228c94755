//! Error types for the battle simulation.
//!
//! Every variant here is a contract violation: the caller issued a command
//! that does not match the authoritative state. Commands check all of their
//! preconditions before mutating anything, so a returned error always means
//! the battle is unchanged. Expected "nothing found" outcomes (no path, no
//! buff, no target) are `Option`s and never show up here.

use thiserror::Error;

use crate::battle::BattlePhase;
use crate::map::{GridPos, ObjId};
use crate::warrior::{TeamId, UnitId};

/// Result type alias using [`BattleError`].
pub type Result<T> = std::result::Result<T, BattleError>;

/// Top-level error type for all battle simulation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BattleError {
    /// The map object is not present on the grid.
    #[error("Object {0} is not on the grid")]
    NotOnGrid(ObjId),

    /// The unit is not present on the grid (dead or never placed).
    #[error("Unit {0} is not on the grid")]
    UnitNotOnGrid(UnitId),

    /// No warrior with this id exists in the battle.
    #[error("Unknown unit: {0}")]
    UnknownUnit(UnitId),

    /// The player does not take part in this battle.
    #[error("Unknown player: {0}")]
    UnknownPlayer(TeamId),

    /// A player tried to command a unit from another team.
    #[error("Player {player} does not own unit {unit}")]
    NotOwner {
        /// Originating player.
        player: TeamId,
        /// Unit the command targeted.
        unit: UnitId,
    },

    /// The command is not valid in the current battle phase.
    #[error("Command '{op}' is not allowed while the battle is {phase:?}")]
    InvalidPhase {
        /// Opcode of the rejected command.
        op: &'static str,
        /// Phase at the time of the command.
        phase: BattlePhase,
    },

    /// The unit already moved this round.
    #[error("Unit {0} has already moved this round")]
    AlreadyMoved(UnitId),

    /// The unit already acted this round.
    #[error("Unit {0} has already finished its action this round")]
    ActionAlreadyDone(UnitId),

    /// The first cell of a move path is not where the unit stands.
    #[error("Unit {unit} is at {actual} but the path starts at {expected}")]
    PathStartMismatch {
        /// Unit being moved.
        unit: UnitId,
        /// First cell of the submitted path.
        expected: GridPos,
        /// Cell the unit actually occupies.
        actual: GridPos,
    },

    /// The move path is malformed (empty or not 4-connected).
    #[error("Invalid move path for unit {unit}: {reason}")]
    InvalidPath {
        /// Unit being moved.
        unit: UnitId,
        /// Why the path was rejected.
        reason: String,
    },

    /// Coordinates fall outside the map.
    #[error("Position {0} is outside the map")]
    OutOfBounds(GridPos),

    /// The target cell is not inside the attack range set.
    #[error("Target at {target} is out of range for unit {unit}")]
    TargetOutOfRange {
        /// Acting unit.
        unit: UnitId,
        /// Target cell.
        target: GridPos,
    },

    /// The command expected a live unit at a cell and found none.
    #[error("No unit at {0}")]
    NoUnitAt(GridPos),

    /// The unit is dead and cannot act or be acted upon.
    #[error("Unit {0} is dead")]
    UnitDead(UnitId),

    /// Friendly fire is not allowed.
    #[error("Unit {attacker} cannot attack teammate {target}")]
    FriendlyTarget {
        /// Attacking unit.
        attacker: UnitId,
        /// Targeted teammate.
        target: UnitId,
    },

    /// An active skill with this id is already present.
    #[error("Unit {unit} already has skill '{skill}'; replace it instead")]
    DuplicateSkill {
        /// Owning unit.
        unit: UnitId,
        /// Skill id.
        skill: String,
    },

    /// No active skill with this id exists on the unit.
    #[error("Unit {unit} has no skill '{skill}'")]
    UnknownSkill {
        /// Owning unit.
        unit: UnitId,
        /// Skill id.
        skill: String,
    },

    /// No buff with this id exists on the unit.
    #[error("Unit {unit} has no buff '{buff}'")]
    UnknownBuff {
        /// Owning unit.
        unit: UnitId,
        /// Buff id.
        buff: String,
    },

    /// The battle setup is inconsistent.
    #[error("Invalid battle setup: {0}")]
    InvalidSetup(String),

    /// Encoding or decoding failed.
    #[error("Serialization failed: {0}")]
    Serialization(String),

    /// A replay was produced by an incompatible format version.
    #[error("Replay version mismatch: expected {expected}, got {actual}")]
    ReplayVersionMismatch {
        /// Version this build understands.
        expected: u32,
        /// Version found in the replay.
        actual: u32,
    },

    /// Replaying produced a different state than was recorded.
    #[error("Desync detected after {commands} commands: expected hash {expected:#x}, got {actual:#x}")]
    DesyncDetected {
        /// Number of commands replayed.
        commands: usize,
        /// Recorded final hash.
        expected: u64,
        /// Recomputed hash.
        actual: u64,
    },
}
