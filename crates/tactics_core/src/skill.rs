//! Active skills and buffs.
//!
//! A warrior's capabilities are plain data: active skills are tagged by
//! [`ActiveSkillKind`], buffs by [`BuffKind`] (lifetime) and [`BuffEffect`]
//! (what they do). Capability queries are pattern matches on those tags.
//!
//! Buffs never hold a reference to the battle. Attaching a buff registers
//! its [`Handler`]s with the battle's hook registry; detaching removes
//! exactly the same set. The battle dispatches hooks by matching on the
//! handler, so there is no callback state to keep in sync.

use serde::{Deserialize, Serialize};

use crate::hooks::{Handler, HookKind, HookPoint, Stage};

/// Active skill behaviours.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActiveSkillKind {
    /// Regular attack using the owner's full power.
    BasicAttack,
    /// Attack dealing `percent`% of the owner's power.
    Strike {
        /// Damage multiplier in percent.
        percent: u32,
    },
    /// Restore HP to a teammate, capped at MaxHP.
    Heal {
        /// HP restored.
        amount: i32,
    },
    /// Grant shield to a teammate, capped at MaxES.
    Fortify {
        /// Shield granted.
        amount: i32,
    },
}

/// Discriminant of [`ActiveSkillKind`], for "find the skill of this type" queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SkillTag {
    /// [`ActiveSkillKind::BasicAttack`].
    BasicAttack,
    /// [`ActiveSkillKind::Strike`].
    Strike,
    /// [`ActiveSkillKind::Heal`].
    Heal,
    /// [`ActiveSkillKind::Fortify`].
    Fortify,
}

impl ActiveSkillKind {
    /// The tag of this kind.
    #[must_use]
    pub const fn tag(&self) -> SkillTag {
        match self {
            Self::BasicAttack => SkillTag::BasicAttack,
            Self::Strike { .. } => SkillTag::Strike,
            Self::Heal { .. } => SkillTag::Heal,
            Self::Fortify { .. } => SkillTag::Fortify,
        }
    }

    /// Returns true if the skill is aimed at enemies.
    #[must_use]
    pub const fn is_offensive(&self) -> bool {
        matches!(self, Self::BasicAttack | Self::Strike { .. })
    }
}

/// A player-invoked, targetable action owned by one warrior.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActiveSkill {
    /// Unique id within the owner.
    pub id: String,
    /// Behaviour.
    pub kind: ActiveSkillKind,
    /// Allowed Manhattan distances. Empty means "use the owner's attack range".
    #[serde(default)]
    pub range: Vec<u32>,
}

impl ActiveSkill {
    /// Create a skill that uses the owner's attack range.
    #[must_use]
    pub fn new(id: impl Into<String>, kind: ActiveSkillKind) -> Self {
        Self {
            id: id.into(),
            kind,
            range: Vec::new(),
        }
    }

    /// Restrict the skill to its own set of distances.
    #[must_use]
    pub fn with_range(mut self, range: impl Into<Vec<u32>>) -> Self {
        self.range = range.into();
        self
    }

    /// The standard basic attack every warrior defaults to.
    #[must_use]
    pub fn basic_attack() -> Self {
        Self::new("attack", ActiveSkillKind::BasicAttack)
    }
}

/// What a buff does while attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BuffEffect {
    /// No effect beyond its own lifetime (markers, timers).
    Marker,
    /// Before a team's round starts, zero the shield of every living
    /// warrior on that team.
    ResetShield,
    /// After the owner's team starts a round, gain `amount` shield per stack.
    ShieldRegen {
        /// Shield per stack.
        amount: i32,
    },
    /// While attached, raise the owner's ATK increment by `amount` per stack.
    AttackBoost {
        /// ATK per stack.
        amount: i32,
    },
}

/// Lifetime and stacking behaviour of a buff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BuffKind {
    /// Stays until explicitly removed; re-adding changes nothing.
    Passive,
    /// Expires after the owner's team finishes `remaining` more turns.
    Countdown {
        /// Turns left.
        remaining: u32,
        /// Upper bound when extended.
        max: u32,
    },
    /// Stacks in intensity up to a cap.
    Overlay {
        /// Current stack count.
        stacks: u32,
        /// Maximum stack count.
        cap: u32,
    },
}

/// Attachment lifecycle of a buff instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AttachState {
    /// Created, handlers not yet registered.
    #[default]
    Pending,
    /// Handlers registered with the battle.
    Attached,
    /// Handlers unregistered; the buff is gone from its owner.
    Detached,
}

/// A passive effect owned by exactly one warrior.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Buff {
    /// Unique id within the owner. Adding a buff with an existing id merges.
    pub id: String,
    /// Lifetime and stacking behaviour.
    pub kind: BuffKind,
    /// What it does.
    pub effect: BuffEffect,
    #[serde(default)]
    state: AttachState,
    /// ATK currently contributed to the owner by an [`BuffEffect::AttackBoost`].
    #[serde(default)]
    applied_atk: i32,
}

impl Buff {
    /// A buff that lasts until removed.
    #[must_use]
    pub fn passive(id: impl Into<String>, effect: BuffEffect) -> Self {
        Self::with_kind(id, BuffKind::Passive, effect)
    }

    /// A buff lasting `rounds` turns of its owner's team, extendable up to `max`.
    #[must_use]
    pub fn countdown(id: impl Into<String>, rounds: u32, max: u32, effect: BuffEffect) -> Self {
        let max = max.max(rounds);
        Self::with_kind(id, BuffKind::Countdown { remaining: rounds, max }, effect)
    }

    /// A stacking buff starting at `stacks`, capped at `cap`.
    #[must_use]
    pub fn overlay(id: impl Into<String>, stacks: u32, cap: u32, effect: BuffEffect) -> Self {
        let cap = cap.max(1);
        Self::with_kind(
            id,
            BuffKind::Overlay {
                stacks: stacks.clamp(1, cap),
                cap,
            },
            effect,
        )
    }

    fn with_kind(id: impl Into<String>, kind: BuffKind, effect: BuffEffect) -> Self {
        Self {
            id: id.into(),
            kind,
            effect,
            state: AttachState::Pending,
            applied_atk: 0,
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> AttachState {
        self.state
    }

    /// Intensity multiplier: the stack count for overlays, 1 otherwise.
    #[must_use]
    pub const fn stacks(&self) -> u32 {
        match self.kind {
            BuffKind::Overlay { stacks, .. } => stacks,
            _ => 1,
        }
    }

    /// Turns left for countdown buffs.
    #[must_use]
    pub const fn remaining(&self) -> Option<u32> {
        match self.kind {
            BuffKind::Countdown { remaining, .. } => Some(remaining),
            _ => None,
        }
    }

    /// Fold a duplicate into this instance.
    ///
    /// Countdowns extend their remaining turns, overlays add stacks; both are
    /// clamped to their bounds. Passive buffs are unchanged.
    pub fn merge_from(&mut self, incoming: &Buff) {
        match (&mut self.kind, incoming.kind) {
            (
                BuffKind::Countdown { remaining, max },
                BuffKind::Countdown { remaining: extra, .. },
            ) => {
                *remaining = remaining.saturating_add(extra).min(*max);
            }
            (BuffKind::Overlay { stacks, cap }, BuffKind::Overlay { stacks: extra, .. }) => {
                *stacks = stacks.saturating_add(extra).min(*cap);
            }
            _ => {}
        }
    }

    /// Decrement a countdown. Returns true once it has run out.
    pub(crate) fn tick_down(&mut self) -> bool {
        match &mut self.kind {
            BuffKind::Countdown { remaining, .. } => {
                *remaining = remaining.saturating_sub(1);
                *remaining == 0
            }
            _ => false,
        }
    }

    /// The hook subscriptions this buff needs while attached.
    #[must_use]
    pub fn handlers(&self) -> Vec<(HookPoint, Handler)> {
        let mut handlers = Vec::new();

        if matches!(self.kind, BuffKind::Countdown { .. }) {
            handlers.push((
                HookPoint::new(Stage::Before, HookKind::ActionDone),
                Handler::CountDown,
            ));
        }

        match self.effect {
            BuffEffect::ResetShield => handlers.push((
                HookPoint::new(Stage::Before, HookKind::StartNextRound),
                Handler::ResetShield,
            )),
            BuffEffect::ShieldRegen { .. } => handlers.push((
                HookPoint::new(Stage::After, HookKind::StartNextRound),
                Handler::ShieldRegen,
            )),
            BuffEffect::AttackBoost { .. } | BuffEffect::Marker => {}
        }

        handlers
    }

    /// ATK the buff should currently contribute to its owner.
    #[must_use]
    pub fn target_atk_bonus(&self) -> i32 {
        match self.effect {
            BuffEffect::AttackBoost { amount } => {
                amount.saturating_mul(i32::try_from(self.stacks()).unwrap_or(i32::MAX))
            }
            _ => 0,
        }
    }

    /// Record the ATK now applied and return the change to add to the owner.
    pub(crate) fn sync_atk_bonus(&mut self) -> i32 {
        let target = if self.state == AttachState::Detached {
            0
        } else {
            self.target_atk_bonus()
        };
        let delta = target - self.applied_atk;
        self.applied_atk = target;
        delta
    }

    /// Pending -> Attached. Returns false if the buff was not pending.
    pub(crate) fn mark_attached(&mut self) -> bool {
        if self.state == AttachState::Pending {
            self.state = AttachState::Attached;
            true
        } else {
            false
        }
    }

    /// Attached -> Detached. Returns false if the buff was not attached.
    pub(crate) fn mark_detached(&mut self) -> bool {
        if self.state == AttachState::Attached {
            self.state = AttachState::Detached;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_countdown_merge_clamps_to_max() {
        let mut buff = Buff::countdown("haste", 2, 4, BuffEffect::Marker);
        buff.merge_from(&Buff::countdown("haste", 1, 4, BuffEffect::Marker));
        assert_eq!(buff.remaining(), Some(3));

        buff.merge_from(&Buff::countdown("haste", 5, 9, BuffEffect::Marker));
        assert_eq!(buff.remaining(), Some(4), "clamped to the existing max");
    }

    #[test]
    fn test_overlay_merge_clamps_to_cap() {
        let mut buff = Buff::overlay("rage", 1, 3, BuffEffect::AttackBoost { amount: 2 });
        buff.merge_from(&Buff::overlay("rage", 1, 3, BuffEffect::AttackBoost { amount: 2 }));
        assert_eq!(buff.stacks(), 2);
        assert_eq!(buff.target_atk_bonus(), 4);

        buff.merge_from(&Buff::overlay("rage", 5, 3, BuffEffect::AttackBoost { amount: 2 }));
        assert_eq!(buff.stacks(), 3);
    }

    #[test]
    fn test_passive_merge_is_noop() {
        let mut buff = Buff::passive("reset", BuffEffect::ResetShield);
        let before = buff.clone();
        buff.merge_from(&Buff::passive("reset", BuffEffect::ResetShield));
        assert_eq!(buff, before);
    }

    #[test]
    fn test_tick_down_expires_at_zero() {
        let mut buff = Buff::countdown("slow", 2, 2, BuffEffect::Marker);
        assert!(!buff.tick_down());
        assert!(buff.tick_down());
        assert!(!Buff::passive("p", BuffEffect::Marker).tick_down());
    }

    #[test]
    fn test_handlers_by_kind_and_effect() {
        let countdown = Buff::countdown("regen", 3, 3, BuffEffect::ShieldRegen { amount: 1 });
        let handlers: Vec<Handler> = countdown.handlers().into_iter().map(|(_, h)| h).collect();
        assert_eq!(handlers, vec![Handler::CountDown, Handler::ShieldRegen]);

        assert!(Buff::passive("boost", BuffEffect::AttackBoost { amount: 1 })
            .handlers()
            .is_empty());
    }

    #[test]
    fn test_lifecycle_transitions_are_one_way() {
        let mut buff = Buff::passive("p", BuffEffect::Marker);
        assert!(!buff.mark_detached());
        assert!(buff.mark_attached());
        assert!(!buff.mark_attached());
        assert!(buff.mark_detached());
        assert!(!buff.mark_detached());
        assert_eq!(buff.state(), AttachState::Detached);
    }

    #[test]
    fn test_atk_sync_reverts_on_detach() {
        let mut buff = Buff::overlay("rage", 2, 5, BuffEffect::AttackBoost { amount: 3 });
        buff.mark_attached();
        assert_eq!(buff.sync_atk_bonus(), 6);
        assert_eq!(buff.sync_atk_bonus(), 0);
        buff.mark_detached();
        assert_eq!(buff.sync_atk_bonus(), -6);
    }

    #[test]
    fn test_skill_tags() {
        assert_eq!(ActiveSkillKind::Strike { percent: 150 }.tag(), SkillTag::Strike);
        assert!(ActiveSkillKind::BasicAttack.is_offensive());
        assert!(!ActiveSkillKind::Heal { amount: 3 }.is_offensive());
    }
}
