//! Public battle events and the listener bus.
//!
//! Every successful command publishes its events synchronously, in a fixed
//! order, to the subscribed listeners. The same events are returned from
//! [`Battle::apply`](crate::battle::Battle::apply) so frontends that prefer
//! polling never need to subscribe.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::map::GridPos;
use crate::warrior::{TeamId, UnitId};

/// Outcome of one damage resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DamageReport {
    /// Damage dealt after crit.
    pub power: i32,
    /// Part absorbed by the energy shield.
    pub absorbed: i32,
    /// Part that reached HP.
    pub hp_lost: i32,
    /// Whether the hit was critical.
    pub critical: bool,
}

/// Something observable happened in the battle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BattleEvent {
    /// Two cells swapped during preparation.
    PositionExchanged {
        /// First cell.
        from: GridPos,
        /// Second cell.
        to: GridPos,
    },
    /// A player declared ready.
    PlayerPrepared {
        /// The player.
        player: TeamId,
    },
    /// Every player is ready; the battle is in progress.
    BattleStarted,
    /// A team's round started.
    RoundStarted {
        /// The team.
        player: TeamId,
        /// Battle-wide round counter after the increment.
        turn: u32,
    },
    /// A unit walked. `path` includes the start cell and stops where the
    /// unit actually ended up.
    MovedOnPath {
        /// Moving unit.
        unit: UnitId,
        /// Cells visited.
        path: Vec<GridPos>,
    },
    /// A damaging action resolved.
    Attacked {
        /// Acting unit.
        attacker: UnitId,
        /// Receiving unit.
        target: UnitId,
        /// Damage breakdown.
        report: DamageReport,
    },
    /// An active skill was used.
    SkillCast {
        /// Caster.
        caster: UnitId,
        /// Skill id.
        skill: String,
        /// Target cell.
        target: GridPos,
    },
    /// HP restored.
    Healed {
        /// Receiving unit.
        unit: UnitId,
        /// HP actually restored.
        amount: i32,
    },
    /// Shield granted.
    Shielded {
        /// Receiving unit.
        unit: UnitId,
        /// Shield actually granted.
        amount: i32,
    },
    /// A unit's HP dropped to zero and it left the grid.
    Died {
        /// The dead unit.
        unit: UnitId,
        /// Cell it was removed from.
        at: GridPos,
    },
    /// A player ended their turn.
    ActionDone {
        /// The player.
        player: TeamId,
    },
    /// A buff was attached, or merged into an existing one.
    BuffAdded {
        /// Owner.
        unit: UnitId,
        /// Buff id.
        buff: String,
        /// True if it merged into an existing instance.
        merged: bool,
    },
    /// A buff was detached.
    BuffRemoved {
        /// Owner.
        unit: UnitId,
        /// Buff id.
        buff: String,
    },
    /// The battle is over.
    BattleEnded {
        /// Winning team.
        winner: TeamId,
    },
}

impl BattleEvent {
    /// Short machine-readable name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::PositionExchanged { .. } => "position_exchanged",
            Self::PlayerPrepared { .. } => "player_prepared",
            Self::BattleStarted => "battle_started",
            Self::RoundStarted { .. } => "round_started",
            Self::MovedOnPath { .. } => "moved_on_path",
            Self::Attacked { .. } => "attacked",
            Self::SkillCast { .. } => "skill_cast",
            Self::Healed { .. } => "healed",
            Self::Shielded { .. } => "shielded",
            Self::Died { .. } => "died",
            Self::ActionDone { .. } => "action_done",
            Self::BuffAdded { .. } => "buff_added",
            Self::BuffRemoved { .. } => "buff_removed",
            Self::BattleEnded { .. } => "battle_ended",
        }
    }
}

/// Interface-level notification that the selected unit changed. Not part of
/// the battle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionChanged {
    /// Previously selected unit.
    pub previous: Option<UnitId>,
    /// Newly selected unit.
    pub current: Option<UnitId>,
}

/// Handle returned by [`EventBus::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

type Listener<E> = Box<dyn FnMut(&E)>;

/// Ordered list of listeners for one event type.
///
/// Listeners run in subscription order. They only observe; they cannot
/// reach back into the battle.
pub struct EventBus<E> {
    listeners: Vec<(ListenerId, Listener<E>)>,
    next_id: u64,
}

impl<E> EventBus<E> {
    /// Create an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self {
            listeners: Vec::new(),
            next_id: 0,
        }
    }

    /// Add a listener.
    pub fn subscribe(&mut self, listener: impl FnMut(&E) + 'static) -> ListenerId {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    /// Remove a listener. Returns false if it was not subscribed.
    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(lid, _)| *lid != id);
        self.listeners.len() != before
    }

    /// Deliver an event to every listener.
    pub fn publish(&mut self, event: &E) {
        for (_, listener) in &mut self.listeners {
            listener(event);
        }
    }

    /// Number of listeners.
    #[must_use]
    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    /// Returns true if nobody listens.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}

impl<E> Default for EventBus<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> fmt::Debug for EventBus<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}
