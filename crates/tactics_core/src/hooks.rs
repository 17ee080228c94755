//! Before/after hook registry.
//!
//! Every state-changing battle operation runs a `Before` hook, mutates,
//! then runs an `After` hook. Buffs subscribe [`Handler`]s to hook points
//! when attached. The registry keeps subscriptions per point in
//! subscription order, and dispatch follows that order.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::map::GridPos;
use crate::warrior::{TeamId, UnitId};

/// Whether a hook fires before or after the mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Stage {
    /// Before the state change.
    Before,
    /// After the state change, before the public event.
    After,
}

/// Hookable battle operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum HookKind {
    /// Two cells swapped during preparation.
    ExchangePositions,
    /// A player declared ready.
    PlayerPrepared,
    /// A team's round begins.
    StartNextRound,
    /// A unit walks a path.
    MoveOnPath,
    /// A basic attack resolves.
    Attack,
    /// An active skill resolves.
    CastSkill,
    /// A player ends their turn.
    ActionDone,
}

/// A hook point: operation plus stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HookPoint {
    /// Before or after.
    pub stage: Stage,
    /// Operation.
    pub kind: HookKind,
}

impl HookPoint {
    /// Build a hook point.
    #[must_use]
    pub const fn new(stage: Stage, kind: HookKind) -> Self {
        Self { stage, kind }
    }
}

/// Arguments passed to handlers when a hook fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookArgs {
    /// Team-scoped operations.
    Player(TeamId),
    /// Preparation swap.
    Exchange {
        /// First cell.
        from: GridPos,
        /// Second cell.
        to: GridPos,
    },
    /// Unit-scoped operations.
    Unit(UnitId),
    /// Attacker and target of a damaging action.
    Strike {
        /// Acting unit.
        attacker: UnitId,
        /// Receiving unit.
        target: UnitId,
    },
}

/// Buff behaviours the battle knows how to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Handler {
    /// Decrement a countdown buff when its owner's team ends a turn.
    CountDown,
    /// Zero the shields of the team starting a round.
    ResetShield,
    /// Regenerate the owner's shield when its team starts a round.
    ShieldRegen,
}

/// One buff handler registered at one hook point.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Subscription {
    /// Unit owning the buff.
    pub unit: UnitId,
    /// Buff id on that unit.
    pub buff: String,
    /// Behaviour to run.
    pub handler: Handler,
}

/// Subscriptions per hook point.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct HookRegistry {
    table: BTreeMap<HookPoint, Vec<Subscription>>,
}

impl HookRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscription. Returns false if it was already present.
    pub fn subscribe(&mut self, point: HookPoint, subscription: Subscription) -> bool {
        let list = self.table.entry(point).or_default();
        if list.contains(&subscription) {
            return false;
        }
        list.push(subscription);
        true
    }

    /// Remove a subscription. Returns false if it was not present.
    pub fn unsubscribe(&mut self, point: HookPoint, subscription: &Subscription) -> bool {
        let Some(list) = self.table.get_mut(&point) else {
            return false;
        };
        let before = list.len();
        list.retain(|s| s != subscription);
        let removed = list.len() != before;
        if list.is_empty() {
            self.table.remove(&point);
        }
        removed
    }

    /// Subscribers of a point, in subscription order.
    #[must_use]
    pub fn subscribers(&self, point: HookPoint) -> &[Subscription] {
        self.table.get(&point).map_or(&[], Vec::as_slice)
    }

    /// Returns true if the exact subscription is registered.
    #[must_use]
    pub fn is_subscribed(&self, point: HookPoint, subscription: &Subscription) -> bool {
        self.subscribers(point).contains(subscription)
    }

    /// All subscriptions held for a unit.
    pub fn for_unit(&self, unit: UnitId) -> impl Iterator<Item = (HookPoint, &Subscription)> + '_ {
        self.table
            .iter()
            .flat_map(|(point, subs)| subs.iter().map(move |s| (*point, s)))
            .filter(move |(_, s)| s.unit == unit)
    }

    /// Total number of subscriptions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.table.values().map(Vec::len).sum()
    }

    /// Returns true if nothing is subscribed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sub(unit: u32, buff: &str, handler: Handler) -> Subscription {
        Subscription {
            unit: UnitId(unit),
            buff: buff.to_string(),
            handler,
        }
    }

    const BEFORE_DONE: HookPoint = HookPoint::new(Stage::Before, HookKind::ActionDone);

    #[test]
    fn test_subscribe_is_idempotent() {
        let mut hooks = HookRegistry::new();
        assert!(hooks.subscribe(BEFORE_DONE, sub(0, "slow", Handler::CountDown)));
        assert!(!hooks.subscribe(BEFORE_DONE, sub(0, "slow", Handler::CountDown)));
        assert_eq!(hooks.len(), 1);
    }

    #[test]
    fn test_unsubscribe_removes_exact_entry() {
        let mut hooks = HookRegistry::new();
        hooks.subscribe(BEFORE_DONE, sub(0, "slow", Handler::CountDown));
        hooks.subscribe(BEFORE_DONE, sub(1, "slow", Handler::CountDown));

        assert!(hooks.unsubscribe(BEFORE_DONE, &sub(0, "slow", Handler::CountDown)));
        assert!(!hooks.unsubscribe(BEFORE_DONE, &sub(0, "slow", Handler::CountDown)));
        assert_eq!(hooks.subscribers(BEFORE_DONE), &[sub(1, "slow", Handler::CountDown)]);

        assert!(hooks.unsubscribe(BEFORE_DONE, &sub(1, "slow", Handler::CountDown)));
        assert!(hooks.is_empty());
    }

    #[test]
    fn test_subscription_order_is_kept() {
        let mut hooks = HookRegistry::new();
        hooks.subscribe(BEFORE_DONE, sub(2, "a", Handler::CountDown));
        hooks.subscribe(BEFORE_DONE, sub(0, "b", Handler::CountDown));
        let units: Vec<u32> = hooks.subscribers(BEFORE_DONE).iter().map(|s| s.unit.0).collect();
        assert_eq!(units, vec![2, 0]);
    }

    #[test]
    fn test_for_unit_filters() {
        let mut hooks = HookRegistry::new();
        let regen = HookPoint::new(Stage::After, HookKind::StartNextRound);
        hooks.subscribe(BEFORE_DONE, sub(0, "regen", Handler::CountDown));
        hooks.subscribe(regen, sub(0, "regen", Handler::ShieldRegen));
        hooks.subscribe(regen, sub(1, "regen", Handler::ShieldRegen));
        assert_eq!(hooks.for_unit(UnitId(0)).count(), 2);
        assert_eq!(hooks.for_unit(UnitId(1)).count(), 1);
    }
}
