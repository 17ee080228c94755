//! Battle construction input.
//!
//! A [`BattleSetup`] is everything needed to build the initial state: seed,
//! terrain, players, roster and props. It is plain serde data, so the same
//! value feeds scenario files (RON), replays (bincode) and tests.

use serde::{Deserialize, Serialize};

use crate::error::{BattleError, Result};
use crate::map::{BattleMap, GridPos};
use crate::skill::{ActiveSkill, ActiveSkillKind, Buff, BuffEffect, BuffKind};
use crate::tile::Tiles;
use crate::warrior::{AttackType, CombatStats, TeamId, Warrior};

/// Terrain of a map, stored as a row-major tile vector.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MapDescription {
    /// Width in cells.
    pub width: u32,
    /// Height in cells.
    pub height: u32,
    /// Row-major terrain.
    pub tiles: Vec<Tiles>,
}

impl MapDescription {
    /// Build from a pure `(x, y) -> Tiles` generator.
    #[must_use]
    pub fn generate(width: u32, height: u32, mut generator: impl FnMut(i32, i32) -> Tiles) -> Self {
        let mut tiles = Vec::with_capacity((width as usize) * (height as usize));
        for y in 0..height as i32 {
            for x in 0..width as i32 {
                tiles.push(generator(x, y));
            }
        }
        Self {
            width,
            height,
            tiles,
        }
    }

    /// A map of a single terrain class.
    #[must_use]
    pub fn flat(width: u32, height: u32, tile: Tiles) -> Self {
        Self::generate(width, height, |_, _| tile)
    }

    /// Build the empty grid.
    pub fn build(&self) -> Result<BattleMap> {
        BattleMap::from_tiles(self.width, self.height, self.tiles.clone())
    }
}

/// Largest absolute value a template may use for HP, shield, stats and
/// effect amounts.
pub const STAT_LIMIT: i32 = 100_000;
/// Largest damage multiplier a strike skill may use, in percent.
pub const MAX_STRIKE_PERCENT: u32 = 10_000;
/// Largest stack cap of an overlay buff.
pub const MAX_STACKS: u32 = 99;

fn default_hp() -> i32 {
    10
}

fn default_attack_range() -> Vec<u32> {
    vec![1]
}

fn default_move_range() -> u32 {
    3
}

fn default_standable() -> Tiles {
    Tiles::LAND
}

fn default_true() -> bool {
    true
}

/// A unit kind, as written in roster files.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WarriorTemplate {
    /// Display name.
    pub name: String,
    /// Maximum HP.
    #[serde(default = "default_hp")]
    pub max_hp: i32,
    /// Maximum shield. Warriors start with a full shield.
    #[serde(default)]
    pub max_es: i32,
    /// Basic attack formula.
    #[serde(default)]
    pub attack_type: AttackType,
    /// Stats.
    #[serde(default)]
    pub stats: CombatStats,
    /// Attack distances.
    #[serde(default = "default_attack_range")]
    pub attack_range: Vec<u32>,
    /// Steps per move.
    #[serde(default = "default_move_range")]
    pub move_range: u32,
    /// Standable terrain.
    #[serde(default = "default_standable")]
    pub standable: Tiles,
    /// Whether the unit blocks movement.
    #[serde(default = "default_true")]
    pub obstacle: bool,
    /// Active skills. The first one is the default; a basic attack is added
    /// when the list is empty.
    #[serde(default)]
    pub skills: Vec<ActiveSkill>,
    /// Buffs attached when the unit enters the battle.
    #[serde(default)]
    pub buffs: Vec<Buff>,
}

impl WarriorTemplate {
    /// A template with default stats.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            max_hp: default_hp(),
            max_es: 0,
            attack_type: AttackType::default(),
            stats: CombatStats::default(),
            attack_range: default_attack_range(),
            move_range: default_move_range(),
            standable: default_standable(),
            obstacle: true,
            skills: Vec::new(),
            buffs: Vec::new(),
        }
    }

    /// Parse a single template from RON.
    pub fn from_ron_str(text: &str) -> Result<Self> {
        ron::from_str(text).map_err(|e| BattleError::Serialization(e.to_string()))
    }

    /// Create a warrior of this kind for a team. Buffs are not attached;
    /// the battle does that once the warrior has an id.
    pub fn instantiate(&self, team: TeamId) -> Result<Warrior> {
        if self.max_hp <= 0 {
            return Err(BattleError::InvalidSetup(format!(
                "template '{}' must have positive max_hp",
                self.name
            )));
        }
        self.check_magnitudes()?;

        let mut warrior = Warrior::new(self.name.clone(), team, self.max_hp)
            .with_stats(self.attack_type, self.stats)
            .with_shield(self.max_es)
            .with_attack_range(self.attack_range.clone())
            .with_movement(self.move_range, self.standable);
        warrior.obstacle = self.obstacle;

        if self.skills.is_empty() {
            warrior.add_active_skill(ActiveSkill::basic_attack(), true)?;
        }
        for (i, skill) in self.skills.iter().enumerate() {
            warrior.add_active_skill(skill.clone(), i == 0)?;
        }
        Ok(warrior)
    }
}

impl WarriorTemplate {
    /// Keep every number small enough that combat arithmetic cannot overflow.
    fn check_magnitudes(&self) -> Result<()> {
        let out_of_range = |what: &str| {
            Err(BattleError::InvalidSetup(format!(
                "template '{}': {what} is out of range",
                self.name
            )))
        };
        let within = |v: i32| (-STAT_LIMIT..=STAT_LIMIT).contains(&v);

        let s = &self.stats;
        let stats = [s.atk, s.atk_inc, s.pow, s.pow_inc, s.arm, s.arm_inc, s.res, s.res_inc];
        if self.max_hp > STAT_LIMIT || !(0..=STAT_LIMIT).contains(&self.max_es) {
            return out_of_range("max_hp/max_es");
        }
        if !stats.into_iter().all(within) {
            return out_of_range("stats");
        }

        for skill in &self.skills {
            let ok = match skill.kind {
                ActiveSkillKind::BasicAttack => true,
                ActiveSkillKind::Strike { percent } => percent <= MAX_STRIKE_PERCENT,
                ActiveSkillKind::Heal { amount } | ActiveSkillKind::Fortify { amount } => within(amount),
            };
            if !ok {
                return out_of_range(&format!("skill '{}'", skill.id));
            }
        }

        for buff in &self.buffs {
            let amount_ok = match buff.effect {
                BuffEffect::ShieldRegen { amount } | BuffEffect::AttackBoost { amount } => within(amount),
                BuffEffect::Marker | BuffEffect::ResetShield => true,
            };
            let stacks_ok = match buff.kind {
                BuffKind::Overlay { cap, .. } => cap <= MAX_STACKS,
                BuffKind::Passive | BuffKind::Countdown { .. } => true,
            };
            if !(amount_ok && stacks_ok) {
                return out_of_range(&format!("buff '{}'", buff.id));
            }
        }
        Ok(())
    }
}

/// Parse a list of templates from RON.
pub fn load_roster_ron(text: &str) -> Result<Vec<WarriorTemplate>> {
    ron::from_str(text).map_err(|e| BattleError::Serialization(e.to_string()))
}

/// A warrior to place at battle start.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UnitPlacement {
    /// Owning team.
    pub team: TeamId,
    /// Starting cell.
    pub pos: GridPos,
    /// Unit kind.
    pub template: WarriorTemplate,
}

/// Scenery to place at battle start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PropPlacement {
    /// Cell.
    pub pos: GridPos,
    /// Obstacle flag for its map slot.
    #[serde(default = "default_true")]
    pub obstacle: bool,
}

/// Complete initial state of a battle.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BattleSetup {
    /// RNG seed.
    pub seed: u64,
    /// Terrain.
    pub map: MapDescription,
    /// Participating teams, in turn order.
    pub players: Vec<TeamId>,
    /// Warriors, placed in order. Unit ids follow this order.
    #[serde(default)]
    pub roster: Vec<UnitPlacement>,
    /// Scenery.
    #[serde(default)]
    pub props: Vec<PropPlacement>,
}

impl BattleSetup {
    /// Setup with no units on a flat grass map.
    #[must_use]
    pub fn new(seed: u64, width: u32, height: u32, players: Vec<TeamId>) -> Self {
        Self {
            seed,
            map: MapDescription::flat(width, height, Tiles::GRASS),
            players,
            roster: Vec::new(),
            props: Vec::new(),
        }
    }

    /// Add a unit placement.
    #[must_use]
    pub fn with_unit(mut self, team: TeamId, pos: GridPos, template: WarriorTemplate) -> Self {
        self.roster.push(UnitPlacement { team, pos, template });
        self
    }

    /// Add a prop.
    #[must_use]
    pub fn with_prop(mut self, pos: GridPos, obstacle: bool) -> Self {
        self.props.push(PropPlacement { pos, obstacle });
        self
    }

    /// Parse from RON.
    pub fn from_ron_str(text: &str) -> Result<Self> {
        ron::from_str(text).map_err(|e| BattleError::Serialization(e.to_string()))
    }

    /// Check the setup for structural problems before building a battle.
    pub fn validate(&self) -> Result<()> {
        if self.players.is_empty() {
            return Err(BattleError::InvalidSetup("no players".into()));
        }
        if self.players.contains(&0) {
            return Err(BattleError::InvalidSetup("team 0 is reserved".into()));
        }
        let mut seen = self.players.clone();
        seen.sort_unstable();
        seen.dedup();
        if seen.len() != self.players.len() {
            return Err(BattleError::InvalidSetup("duplicate player".into()));
        }

        let map = self.map.build()?;
        let mut cells: Vec<GridPos> = Vec::new();
        let placed = self
            .roster
            .iter()
            .map(|u| u.pos)
            .chain(self.props.iter().map(|p| p.pos));
        for pos in placed {
            if !map.in_bounds(pos) {
                return Err(BattleError::OutOfBounds(pos));
            }
            if cells.contains(&pos) {
                return Err(BattleError::InvalidSetup(format!("two objects placed at {pos}")));
            }
            cells.push(pos);
        }

        for unit in &self.roster {
            if !self.players.contains(&unit.team) {
                return Err(BattleError::UnknownPlayer(unit.team));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_is_row_major() {
        let desc = MapDescription::generate(3, 2, |x, y| if (x, y) == (1, 1) { Tiles::ROCK } else { Tiles::GRASS });
        assert_eq!(desc.tiles.len(), 6);
        assert_eq!(desc.tiles[4], Tiles::ROCK);
        let map = desc.build().unwrap();
        assert_eq!(map.tile(GridPos::new(1, 1)), Some(Tiles::ROCK));
    }

    #[test]
    fn test_template_defaults_from_ron() {
        let template = WarriorTemplate::from_ron_str(r#"(name: "Scout", max_hp: 8)"#).unwrap();
        assert_eq!(template.attack_range, vec![1]);
        assert_eq!(template.standable, Tiles::LAND);

        let warrior = template.instantiate(2).unwrap();
        assert_eq!(warrior.team, 2);
        assert_eq!(warrior.hp, 8);
        assert_eq!(warrior.default_active_skill().unwrap().id, "attack");
    }

    #[test]
    fn test_roster_with_skills_and_buffs() {
        let text = r#"[
            (
                name: "Mage",
                max_hp: 6,
                max_es: 4,
                attack_type: Magical,
                stats: (pow: 5, crit: 10),
                attack_range: [2, 3],
                skills: [
                    (id: "bolt", kind: Strike(percent: 150)),
                    (id: "mend", kind: Heal(amount: 3), range: [1]),
                ],
                buffs: [
                    (id: "reset", kind: Passive, effect: ResetShield),
                ],
            ),
        ]"#;
        let roster = load_roster_ron(text).unwrap();
        assert_eq!(roster.len(), 1);

        let mage = roster[0].instantiate(1).unwrap();
        assert_eq!(mage.es, 4);
        assert_eq!(mage.stats.crit, 10);
        assert_eq!(mage.default_active_skill().unwrap().id, "bolt");
        assert_eq!(roster[0].buffs.len(), 1);
    }

    #[test]
    fn test_instantiate_rejects_non_positive_hp() {
        let mut template = WarriorTemplate::new("Ghost");
        template.max_hp = 0;
        assert!(matches!(template.instantiate(1), Err(BattleError::InvalidSetup(_))));
    }

    #[test]
    fn test_instantiate_rejects_oversized_numbers() {
        let text = r#"(
            name: "Titan",
            skills: [(id: "crush", kind: Strike(percent: 4000000000))],
        )"#;
        let template = WarriorTemplate::from_ron_str(text).unwrap();
        assert!(matches!(template.instantiate(1), Err(BattleError::InvalidSetup(_))));

        let mut template = WarriorTemplate::new("Titan");
        template.stats.atk = i32::MAX;
        assert!(matches!(template.instantiate(1), Err(BattleError::InvalidSetup(_))));

        let mut template = WarriorTemplate::new("Titan");
        template.buffs.push(Buff::overlay("rage", 1, 1000, BuffEffect::AttackBoost { amount: 1 }));
        assert!(matches!(template.instantiate(1), Err(BattleError::InvalidSetup(_))));

        let mut template = WarriorTemplate::new("Titan");
        template.max_hp = STAT_LIMIT;
        template.buffs.push(Buff::overlay("rage", 1, MAX_STACKS, BuffEffect::AttackBoost { amount: STAT_LIMIT }));
        assert!(template.instantiate(1).is_ok());
    }

    #[test]
    fn test_validate() {
        let setup = BattleSetup::new(1, 4, 4, vec![1, 2])
            .with_unit(1, GridPos::new(0, 0), WarriorTemplate::new("A"))
            .with_unit(2, GridPos::new(3, 3), WarriorTemplate::new("B"));
        assert!(setup.validate().is_ok());

        let overlapping = setup.clone().with_prop(GridPos::new(0, 0), true);
        assert!(overlapping.validate().is_err());

        let outside = setup.clone().with_unit(1, GridPos::new(9, 9), WarriorTemplate::new("C"));
        assert_eq!(outside.validate(), Err(BattleError::OutOfBounds(GridPos::new(9, 9))));

        let stranger = setup.with_unit(3, GridPos::new(1, 1), WarriorTemplate::new("D"));
        assert_eq!(stranger.validate(), Err(BattleError::UnknownPlayer(3)));

        assert!(BattleSetup::new(1, 4, 4, vec![]).validate().is_err());
        assert!(BattleSetup::new(1, 4, 4, vec![1, 1]).validate().is_err());
    }
}
