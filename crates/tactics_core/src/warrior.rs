//! Combat units.
//!
//! A [`Warrior`] is plain data living in the battle's arena and addressed by
//! [`UnitId`]. It does not know where it stands: position always comes from
//! the map. Skills and buffs are owned collections keyed by id and iterated
//! in id order.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{BattleError, Result};
use crate::events::DamageReport;
use crate::map::{GridPos, ObjId};
use crate::skill::{ActiveSkill, Buff, SkillTag};
use crate::tile::Tiles;

/// Index of a warrior in the battle arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UnitId(pub u32);

impl UnitId {
    /// Arena index.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unit#{}", self.0)
    }
}

/// Team, which is also the controlling player. Zero is reserved for
/// "nobody" in end-of-battle checks.
pub type TeamId = u32;

/// How a warrior's basic attack value is derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AttackType {
    /// ATK + POW/2, mitigated by armour.
    #[default]
    Physical,
    /// ATK/2 + POW, mitigated by resistance.
    Magical,
    /// ATK/2 + POW/2, mitigated by the mean of armour and resistance.
    Hybrid,
}

/// Base values and additive increments. Effective value = base + increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CombatStats {
    /// Attack.
    pub atk: i32,
    /// Attack bonus from buffs and items.
    pub atk_inc: i32,
    /// Power.
    pub pow: i32,
    /// Power bonus.
    pub pow_inc: i32,
    /// Armour.
    pub arm: i32,
    /// Armour bonus.
    pub arm_inc: i32,
    /// Resistance.
    pub res: i32,
    /// Resistance bonus.
    pub res_inc: i32,
    /// Critical hit chance in percent. Crits double the damage.
    pub crit: u32,
}

impl CombatStats {
    /// Effective attack.
    #[must_use]
    pub const fn attack(&self) -> i32 {
        self.atk + self.atk_inc
    }

    /// Effective power.
    #[must_use]
    pub const fn power(&self) -> i32 {
        self.pow + self.pow_inc
    }

    /// Effective armour.
    #[must_use]
    pub const fn armour(&self) -> i32 {
        self.arm + self.arm_inc
    }

    /// Effective resistance.
    #[must_use]
    pub const fn resistance(&self) -> i32 {
        self.res + self.res_inc
    }
}

/// A combat unit.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Warrior {
    id: UnitId,
    obj: Option<ObjId>,
    /// Display name.
    pub name: String,
    /// Owning team.
    pub team: TeamId,
    /// Maximum HP.
    pub max_hp: i32,
    /// Current HP. Zero or below means dead.
    pub hp: i32,
    /// Maximum energy shield.
    pub max_es: i32,
    /// Current energy shield, absorbed before HP.
    pub es: i32,
    /// Basic attack formula.
    pub attack_type: AttackType,
    /// Stats.
    pub stats: CombatStats,
    /// Manhattan distances at which the warrior can attack.
    pub attack_range: Vec<u32>,
    /// Steps per move.
    pub move_range: u32,
    /// Terrain the warrior can stand on.
    pub standable: Tiles,
    /// Obstacle flag for the warrior's map slot.
    pub obstacle: bool,
    /// Has moved this round.
    pub moved: bool,
    /// Has acted this round.
    pub action_done: bool,
    moving_path: Vec<GridPos>,
    active_skills: BTreeMap<String, ActiveSkill>,
    default_skill: Option<String>,
    buffs: BTreeMap<String, Buff>,
}

impl Warrior {
    /// Create a warrior with full HP, no shield and melee range.
    #[must_use]
    pub fn new(name: impl Into<String>, team: TeamId, max_hp: i32) -> Self {
        Self {
            id: UnitId(0),
            obj: None,
            name: name.into(),
            team,
            max_hp,
            hp: max_hp,
            max_es: 0,
            es: 0,
            attack_type: AttackType::Physical,
            stats: CombatStats::default(),
            attack_range: vec![1],
            move_range: 3,
            standable: Tiles::LAND,
            obstacle: true,
            moved: false,
            action_done: false,
            moving_path: Vec::new(),
            active_skills: BTreeMap::new(),
            default_skill: None,
            buffs: BTreeMap::new(),
        }
    }

    /// Set the stats.
    #[must_use]
    pub fn with_stats(mut self, attack_type: AttackType, stats: CombatStats) -> Self {
        self.attack_type = attack_type;
        self.stats = stats;
        self
    }

    /// Set maximum and current shield.
    #[must_use]
    pub fn with_shield(mut self, max_es: i32) -> Self {
        self.max_es = max_es;
        self.es = max_es;
        self
    }

    /// Set the attack distances.
    #[must_use]
    pub fn with_attack_range(mut self, range: impl Into<Vec<u32>>) -> Self {
        self.attack_range = range.into();
        self
    }

    /// Set steps per move and standable terrain.
    #[must_use]
    pub fn with_movement(mut self, move_range: u32, standable: Tiles) -> Self {
        self.move_range = move_range;
        self.standable = standable;
        self
    }

    /// Arena id. Assigned when the battle adopts the warrior.
    #[must_use]
    pub const fn id(&self) -> UnitId {
        self.id
    }

    pub(crate) fn set_id(&mut self, id: UnitId) {
        self.id = id;
    }

    /// Map object id, once placed.
    #[must_use]
    pub const fn obj(&self) -> Option<ObjId> {
        self.obj
    }

    pub(crate) fn set_obj(&mut self, obj: Option<ObjId>) {
        self.obj = obj;
    }

    /// HP at or below zero.
    #[must_use]
    pub const fn is_dead(&self) -> bool {
        self.hp <= 0
    }

    /// Raw damage of a basic attack ("power"), never negative.
    #[must_use]
    pub fn basic_attack_value(&self) -> i32 {
        let atk = self.stats.attack();
        let pow = self.stats.power();
        let value = match self.attack_type {
            AttackType::Physical => atk + pow / 2,
            AttackType::Magical => atk / 2 + pow,
            AttackType::Hybrid => atk / 2 + pow / 2,
        };
        value.max(0)
    }

    /// Mitigation this warrior offers against an attack type.
    #[must_use]
    pub fn estimated_defence(&self, against: AttackType) -> i32 {
        match against {
            AttackType::Physical => self.stats.armour(),
            AttackType::Magical => self.stats.resistance(),
            AttackType::Hybrid => (self.stats.armour() + self.stats.resistance()) / 2,
        }
    }

    /// Returns true if the Manhattan distance between the cells is one of
    /// the attack distances.
    #[must_use]
    pub fn in_attack_range(&self, from: GridPos, to: GridPos) -> bool {
        self.attack_range.contains(&from.manhattan(to))
    }

    /// Apply incoming damage: shield first, overflow to HP.
    pub fn absorb_damage(&mut self, power: i32, critical: bool) -> DamageReport {
        let power = power.max(0);
        let absorbed = power.min(self.es.max(0));
        let hp_lost = power - absorbed;
        self.es -= absorbed;
        self.hp -= hp_lost;
        DamageReport {
            power,
            absorbed,
            hp_lost,
            critical,
        }
    }

    /// Restore HP up to the maximum. Returns the amount actually restored.
    pub fn restore_hp(&mut self, amount: i32) -> i32 {
        let gained = amount.max(0).min((self.max_hp - self.hp).max(0));
        self.hp += gained;
        gained
    }

    /// Add shield up to the maximum. Returns the amount actually added.
    pub fn restore_es(&mut self, amount: i32) -> i32 {
        let gained = amount.max(0).min((self.max_es - self.es).max(0));
        self.es += gained;
        gained
    }

    /// Path staged for the next move.
    #[must_use]
    pub fn moving_path(&self) -> &[GridPos] {
        &self.moving_path
    }

    /// Stage a path for the next move. The first cell must be the current one.
    pub fn set_moving_path(&mut self, path: Vec<GridPos>) {
        self.moving_path = path;
    }

    pub(crate) fn clear_moving_path(&mut self) {
        self.moving_path.clear();
    }

    // --- active skills ---

    /// Add a new active skill, optionally making it the default.
    ///
    /// # Errors
    ///
    /// [`BattleError::DuplicateSkill`] if the id is taken; use
    /// [`replace_active_skill`](Self::replace_active_skill) instead.
    pub fn add_active_skill(&mut self, skill: ActiveSkill, as_default: bool) -> Result<()> {
        if self.active_skills.contains_key(&skill.id) {
            return Err(BattleError::DuplicateSkill {
                unit: self.id,
                skill: skill.id,
            });
        }
        if as_default || self.default_skill.is_none() {
            self.default_skill = Some(skill.id.clone());
        }
        self.active_skills.insert(skill.id.clone(), skill);
        Ok(())
    }

    /// Swap a skill for another with the same id, keeping its default status.
    ///
    /// # Errors
    ///
    /// [`BattleError::UnknownSkill`] if there is nothing to replace.
    pub fn replace_active_skill(&mut self, skill: ActiveSkill) -> Result<ActiveSkill> {
        match self.active_skills.get_mut(&skill.id) {
            Some(slot) => Ok(std::mem::replace(slot, skill)),
            None => Err(BattleError::UnknownSkill {
                unit: self.id,
                skill: skill.id,
            }),
        }
    }

    /// Remove a skill. Clears the default if it was the default.
    ///
    /// # Errors
    ///
    /// [`BattleError::UnknownSkill`] if no such skill exists.
    pub fn remove_active_skill(&mut self, id: &str) -> Result<ActiveSkill> {
        let skill = self
            .active_skills
            .remove(id)
            .ok_or_else(|| BattleError::UnknownSkill {
                unit: self.id,
                skill: id.to_string(),
            })?;
        if self.default_skill.as_deref() == Some(id) {
            self.default_skill = None;
        }
        Ok(skill)
    }

    /// Skill by id.
    #[must_use]
    pub fn active_skill(&self, id: &str) -> Option<&ActiveSkill> {
        self.active_skills.get(id)
    }

    /// First skill (in id order) of the given kind.
    #[must_use]
    pub fn active_skill_by_tag(&self, tag: SkillTag) -> Option<&ActiveSkill> {
        self.active_skills.values().find(|s| s.kind.tag() == tag)
    }

    /// The skill used when no skill is named.
    #[must_use]
    pub fn default_active_skill(&self) -> Option<&ActiveSkill> {
        self.default_skill
            .as_deref()
            .and_then(|id| self.active_skills.get(id))
    }

    /// All skills in id order.
    pub fn active_skills(&self) -> impl Iterator<Item = &ActiveSkill> {
        self.active_skills.values()
    }

    // --- buffs ---

    /// Buff by id.
    #[must_use]
    pub fn buff(&self, id: &str) -> Option<&Buff> {
        self.buffs.get(id)
    }

    /// First buff (in id order) matching a predicate.
    #[must_use]
    pub fn find_buff(&self, predicate: impl Fn(&Buff) -> bool) -> Option<&Buff> {
        self.buffs.values().find(|b| predicate(b))
    }

    /// All buffs in id order.
    pub fn buffs(&self) -> impl Iterator<Item = &Buff> {
        self.buffs.values()
    }

    pub(crate) fn buff_mut(&mut self, id: &str) -> Option<&mut Buff> {
        self.buffs.get_mut(id)
    }

    pub(crate) fn insert_buff(&mut self, buff: Buff) {
        self.buffs.insert(buff.id.clone(), buff);
    }

    pub(crate) fn take_buff(&mut self, id: &str) -> Option<Buff> {
        self.buffs.remove(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skill::{ActiveSkillKind, BuffEffect};

    fn fighter() -> Warrior {
        Warrior::new("Fighter", 1, 10).with_stats(
            AttackType::Physical,
            CombatStats {
                atk: 6,
                pow: 4,
                arm: 3,
                res: 1,
                ..CombatStats::default()
            },
        )
    }

    #[test]
    fn test_basic_attack_value_per_type() {
        let mut w = fighter();
        assert_eq!(w.basic_attack_value(), 8);
        w.attack_type = AttackType::Magical;
        assert_eq!(w.basic_attack_value(), 7);
        w.attack_type = AttackType::Hybrid;
        assert_eq!(w.basic_attack_value(), 5);
    }

    #[test]
    fn test_increments_count() {
        let mut w = fighter();
        w.stats.atk_inc = 2;
        assert_eq!(w.basic_attack_value(), 10);
    }

    #[test]
    fn test_estimated_defence() {
        let w = fighter();
        assert_eq!(w.estimated_defence(AttackType::Physical), 3);
        assert_eq!(w.estimated_defence(AttackType::Magical), 1);
        assert_eq!(w.estimated_defence(AttackType::Hybrid), 2);
    }

    #[test]
    fn test_attack_range_set() {
        let w = fighter().with_attack_range([2, 3]);
        let origin = GridPos::new(0, 0);
        assert!(!w.in_attack_range(origin, GridPos::new(1, 0)));
        assert!(w.in_attack_range(origin, GridPos::new(1, 1)));
        assert!(w.in_attack_range(origin, GridPos::new(0, 3)));
        assert!(!w.in_attack_range(origin, GridPos::new(4, 0)));
    }

    #[test]
    fn test_attack_value_floors_at_zero() {
        let mut w = fighter();
        w.stats.atk_inc = -20;
        assert_eq!(w.basic_attack_value(), 0);
    }

    #[test]
    fn test_shield_absorbs_first() {
        let mut w = Warrior::new("Target", 2, 10).with_shield(5);
        let report = w.absorb_damage(8, false);
        assert_eq!((w.es, w.hp), (0, 7));
        assert_eq!((report.absorbed, report.hp_lost), (5, 3));

        let mut w = Warrior::new("Target", 2, 10).with_shield(5);
        w.absorb_damage(3, false);
        assert_eq!((w.es, w.hp), (2, 10));
    }

    #[test]
    fn test_death_threshold() {
        let mut w = Warrior::new("Target", 2, 4);
        w.absorb_damage(4, false);
        assert!(w.is_dead());
    }

    #[test]
    fn test_restore_caps_at_max() {
        let mut w = Warrior::new("Target", 2, 10).with_shield(4);
        w.hp = 7;
        w.es = 1;
        assert_eq!(w.restore_hp(10), 3);
        assert_eq!(w.restore_es(2), 2);
        assert_eq!((w.hp, w.es), (10, 3));
    }

    #[test]
    fn test_skill_add_replace_remove() {
        let mut w = fighter();
        w.add_active_skill(ActiveSkill::basic_attack(), false).unwrap();
        w.add_active_skill(ActiveSkill::new("smite", ActiveSkillKind::Strike { percent: 150 }), false)
            .unwrap();

        assert_eq!(w.default_active_skill().unwrap().id, "attack");
        assert!(matches!(
            w.add_active_skill(ActiveSkill::basic_attack(), false),
            Err(BattleError::DuplicateSkill { .. })
        ));

        let old = w
            .replace_active_skill(ActiveSkill::new("attack", ActiveSkillKind::Strike { percent: 200 }))
            .unwrap();
        assert_eq!(old.kind, ActiveSkillKind::BasicAttack);
        assert_eq!(w.default_active_skill().unwrap().kind, ActiveSkillKind::Strike { percent: 200 });

        assert_eq!(w.active_skill_by_tag(SkillTag::Strike).unwrap().id, "attack");
        w.remove_active_skill("attack").unwrap();
        assert!(w.default_active_skill().is_none());
        assert!(w.remove_active_skill("attack").is_err());
    }

    #[test]
    fn test_find_buff_by_effect() {
        let mut w = fighter();
        w.insert_buff(Buff::passive("reset", BuffEffect::ResetShield));
        w.insert_buff(Buff::countdown("slow", 2, 2, BuffEffect::Marker));

        let found = w.find_buff(|b| b.remaining().is_some());
        assert_eq!(found.map(|b| b.id.as_str()), Some("slow"));
        assert!(w.buff("reset").is_some());
        assert!(w.take_buff("reset").is_some());
        assert!(w.buff("reset").is_none());
    }
}
