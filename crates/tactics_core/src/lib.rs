//! # Tactics Core
//!
//! Deterministic simulation core for a turn-based tactical battle.
//!
//! This crate contains **only** deterministic logic:
//! - No rendering
//! - No IO
//! - No system randomness (one seeded RNG per battle)
//!
//! This separation enables:
//! - Headless and server-side battles
//! - Replays from a seed plus a command log
//! - Determinism testing
//!
//! ## Crate Structure
//!
//! - [`map`] - Grid, terrain and occupancy
//! - [`pathfinding`] - Grid A*
//! - [`warrior`] - Combat units
//! - [`skill`] - Active skills and buffs
//! - [`battle`] - The battle state machine
//! - [`replay`] - Replay recording and playback

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod battle;
pub mod command;
pub mod error;
pub mod events;
pub mod hooks;
pub mod map;
pub mod pathfinding;
pub mod replay;
pub mod rng;
pub mod setup;
pub mod skill;
pub mod tile;
pub mod warrior;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::battle::{Battle, BattlePhase};
    pub use crate::command::{Command, CommandRecord};
    pub use crate::error::{BattleError, Result};
    pub use crate::events::{BattleEvent, DamageReport, SelectionChanged};
    pub use crate::map::{BattleMap, GridPos, ObjId, Occupant, OccupantKind};
    pub use crate::pathfinding::find_path;
    pub use crate::replay::{Replay, ReplayPlayer};
    pub use crate::setup::{BattleSetup, MapDescription, UnitPlacement, WarriorTemplate};
    pub use crate::skill::{ActiveSkill, ActiveSkillKind, Buff, BuffEffect, BuffKind};
    pub use crate::tile::Tiles;
    pub use crate::warrior::{AttackType, CombatStats, TeamId, UnitId, Warrior};
}
