//! Scenario loading and configuration.
//!
//! Scenarios describe a battle for headless play: terrain drawn as text rows,
//! named unit templates, placements, props and an optional opening script.
//! A scenario compiles down to a core [`BattleSetup`].

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tactics_core::battle::Battle;
use tactics_core::command::Command;
use tactics_core::error::BattleError;
use tactics_core::map::GridPos;
use tactics_core::setup::{BattleSetup, MapDescription, PropPlacement, WarriorTemplate};
use tactics_core::skill::{ActiveSkill, ActiveSkillKind, Buff, BuffEffect};
use tactics_core::tile::Tiles;
use tactics_core::warrior::{AttackType, CombatStats, TeamId};
use thiserror::Error;

/// Error type for scenario operations.
#[derive(Error, Debug)]
pub enum ScenarioError {
    /// File not found.
    #[error("Scenario file not found: {0}")]
    FileNotFound(String),
    /// Failed to read file.
    #[error("Failed to read scenario file: {0}")]
    ReadError(#[from] std::io::Error),
    /// Failed to parse RON.
    #[error("Failed to parse scenario: {0}")]
    ParseError(#[from] ron::error::SpannedError),
    /// Terrain rows do not match the declared size or use an unknown glyph.
    #[error("Invalid terrain: {0}")]
    InvalidTerrain(String),
    /// A unit names a template the scenario does not define.
    #[error("Unit {index} uses unknown template '{template}'")]
    UnknownTemplate { index: usize, template: String },
    /// The resulting setup was rejected by the core.
    #[error("Invalid battle setup: {0}")]
    Battle(#[from] BattleError),
}

/// A unit placement referring to a named template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioUnit {
    /// Template name.
    pub template: String,
    /// Owning team.
    pub team: TeamId,
    /// Starting cell.
    pub pos: GridPos,
}

/// One scripted command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptStep {
    /// Issuing player.
    pub player: TeamId,
    /// The command.
    pub command: Command,
}

/// A complete scenario configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scenario {
    /// Scenario name.
    pub name: String,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
    /// RNG seed.
    pub seed: u64,
    /// Map width in cells.
    pub width: u32,
    /// Map height in cells.
    pub height: u32,
    /// Terrain rows, top to bottom. Empty means all grass.
    ///
    /// Glyphs: `.` grass, `,` soil, `^` hill, `#` rock, `~` water, `!` lava.
    #[serde(default)]
    pub terrain: Vec<String>,
    /// Participating teams, in turn order.
    pub players: Vec<TeamId>,
    /// Unit templates by name.
    #[serde(default)]
    pub templates: BTreeMap<String, WarriorTemplate>,
    /// Units, placed in order. Unit ids follow this order.
    #[serde(default)]
    pub units: Vec<ScenarioUnit>,
    /// Scenery.
    #[serde(default)]
    pub props: Vec<PropPlacement>,
    /// Commands applied before the controller takes over.
    #[serde(default)]
    pub script: Vec<ScriptStep>,
}

/// Terrain class for a map glyph.
fn tile_for(glyph: char) -> Option<Tiles> {
    match glyph {
        '.' => Some(Tiles::GRASS),
        ',' => Some(Tiles::SOIL),
        '^' => Some(Tiles::HILL),
        '#' => Some(Tiles::ROCK),
        '~' => Some(Tiles::WATER),
        '!' => Some(Tiles::LAVA),
        _ => None,
    }
}

impl Scenario {
    /// Load a scenario from a RON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ScenarioError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ScenarioError::FileNotFound(path.display().to_string()));
        }
        let contents = std::fs::read_to_string(path)?;
        Self::from_ron_str(&contents)
    }

    /// Load from a RON string (useful for embedded scenarios).
    pub fn from_ron_str(ron: &str) -> Result<Self, ScenarioError> {
        let scenario: Scenario = ron::from_str(ron)?;
        Ok(scenario)
    }

    /// Decode the terrain rows.
    pub fn map_description(&self) -> Result<MapDescription, ScenarioError> {
        if self.terrain.is_empty() {
            return Ok(MapDescription::flat(self.width, self.height, Tiles::GRASS));
        }
        if self.terrain.len() != self.height as usize {
            return Err(ScenarioError::InvalidTerrain(format!(
                "{} rows for height {}",
                self.terrain.len(),
                self.height
            )));
        }

        let mut tiles = Vec::with_capacity((self.width * self.height) as usize);
        for (y, row) in self.terrain.iter().enumerate() {
            let glyphs: Vec<char> = row.chars().collect();
            if glyphs.len() != self.width as usize {
                return Err(ScenarioError::InvalidTerrain(format!(
                    "row {y} has {} cells, expected {}",
                    glyphs.len(),
                    self.width
                )));
            }
            for (x, glyph) in glyphs.into_iter().enumerate() {
                let tile = tile_for(glyph).ok_or_else(|| {
                    ScenarioError::InvalidTerrain(format!("unknown glyph '{glyph}' at ({x}, {y})"))
                })?;
                tiles.push(tile);
            }
        }
        Ok(MapDescription {
            width: self.width,
            height: self.height,
            tiles,
        })
    }

    /// Compile to a core setup.
    pub fn to_setup(&self) -> Result<BattleSetup, ScenarioError> {
        let mut setup = BattleSetup {
            seed: self.seed,
            map: self.map_description()?,
            players: self.players.clone(),
            roster: Vec::new(),
            props: self.props.clone(),
        };
        for (index, unit) in self.units.iter().enumerate() {
            let template = self.templates.get(&unit.template).ok_or_else(|| {
                ScenarioError::UnknownTemplate {
                    index,
                    template: unit.template.clone(),
                }
            })?;
            setup = setup.with_unit(unit.team, unit.pos, template.clone());
        }
        setup.validate()?;
        Ok(setup)
    }

    /// Build the battle in its initial state, before the script.
    pub fn build_battle(&self) -> Result<Battle, ScenarioError> {
        Ok(Battle::from_setup(&self.to_setup()?)?)
    }

    /// The opening script as player-attributed commands.
    pub fn script(&self) -> Vec<(TeamId, Command)> {
        self.script
            .iter()
            .map(|step| (step.player, step.command.clone()))
            .collect()
    }

    /// Built-in two-on-two duel, used when no scenario file is given.
    #[must_use]
    pub fn duel() -> Self {
        let mut templates = BTreeMap::new();

        let mut knight = WarriorTemplate::new("Knight");
        knight.max_hp = 20;
        knight.stats = CombatStats {
            atk: 6,
            arm: 2,
            crit: 10,
            ..CombatStats::default()
        };
        templates.insert("knight".to_string(), knight);

        let mut archer = WarriorTemplate::new("Archer");
        archer.max_hp = 12;
        archer.stats.atk = 4;
        archer.attack_range = vec![2, 3];
        archer.buffs = vec![Buff::countdown(
            "focus",
            3,
            5,
            BuffEffect::AttackBoost { amount: 2 },
        )];
        templates.insert("archer".to_string(), archer);

        let mut mage = WarriorTemplate::new("Mage");
        mage.max_es = 6;
        mage.attack_type = AttackType::Magical;
        mage.stats = CombatStats {
            atk: 2,
            pow: 5,
            res: 3,
            ..CombatStats::default()
        };
        mage.attack_range = vec![2, 3];
        mage.skills = vec![
            ActiveSkill::new("bolt", ActiveSkillKind::Strike { percent: 120 }),
            ActiveSkill::new("ward", ActiveSkillKind::Fortify { amount: 3 }).with_range([0, 1]),
        ];
        mage.buffs = vec![
            Buff::passive("reset", BuffEffect::ResetShield),
            Buff::overlay("regen", 1, 3, BuffEffect::ShieldRegen { amount: 2 }),
        ];
        templates.insert("mage".to_string(), mage);

        let unit = |template: &str, team, x, y| ScenarioUnit {
            template: template.to_string(),
            team,
            pos: GridPos::new(x, y),
        };

        Self {
            name: "Duel".to_string(),
            description: "Knight and archer against knight and mage".to_string(),
            seed: 42,
            width: 8,
            height: 6,
            terrain: vec![
                "^^^^^^^^".to_string(),
                "........".to_string(),
                "........".to_string(),
                "........".to_string(),
                "........".to_string(),
                "...~~...".to_string(),
            ],
            players: vec![1, 2],
            templates,
            units: vec![
                unit("knight", 1, 1, 2),
                unit("archer", 1, 1, 3),
                unit("knight", 2, 6, 2),
                unit("mage", 2, 6, 3),
            ],
            props: vec![PropPlacement {
                pos: GridPos::new(4, 4),
                obstacle: true,
            }],
            script: vec![
                ScriptStep {
                    player: 1,
                    command: Command::PlayerPrepared,
                },
                ScriptStep {
                    player: 2,
                    command: Command::PlayerPrepared,
                },
            ],
        }
    }
}

impl Default for Scenario {
    fn default() -> Self {
        Self::duel()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tactics_core::warrior::UnitId;

    #[test]
    fn test_builtin_duel_builds() {
        let scenario = Scenario::duel();
        let battle = scenario.build_battle().unwrap();
        assert_eq!(battle.warriors().len(), 4);
        assert_eq!(battle.position_of(UnitId(3)), Some(GridPos::new(6, 3)));
        assert_eq!(battle.map().tile(GridPos::new(3, 5)), Some(Tiles::WATER));
        assert_eq!(battle.map().tile(GridPos::new(0, 0)), Some(Tiles::HILL));
        assert_eq!(scenario.script().len(), 2);
    }

    #[test]
    fn test_bundled_duel_file_parses() {
        let scenario = Scenario::from_ron_str(include_str!("../scenarios/duel.ron")).unwrap();
        assert_eq!(scenario.name, "Duel");
        let setup = scenario.to_setup().unwrap();
        assert_eq!(setup, Scenario::duel().to_setup().unwrap());
    }

    #[test]
    fn test_parse_minimal_scenario() {
        let ron = r#"
            Scenario(
                name: "Tiny",
                seed: 1,
                width: 3,
                height: 2,
                players: [1, 2],
                templates: {
                    "grunt": (name: "Grunt", max_hp: 5),
                },
                units: [
                    (template: "grunt", team: 1, pos: (x: 0, y: 0)),
                    (template: "grunt", team: 2, pos: (x: 2, y: 1)),
                ],
                script: [
                    (player: 1, command: PlayerPrepared),
                    (player: 1, command: Attack(attacker: UnitId(0), target: UnitId(1))),
                ],
            )
        "#;
        let scenario = Scenario::from_ron_str(ron).unwrap();
        assert!(scenario.terrain.is_empty());
        assert_eq!(
            scenario.script()[1],
            (
                1,
                Command::Attack {
                    attacker: UnitId(0),
                    target: UnitId(1)
                }
            )
        );
        let battle = scenario.build_battle().unwrap();
        assert_eq!(battle.warrior(UnitId(0)).unwrap().max_hp, 5);
    }

    #[test]
    fn test_terrain_errors() {
        let mut scenario = Scenario::duel();
        scenario.terrain.pop();
        assert!(matches!(
            scenario.map_description(),
            Err(ScenarioError::InvalidTerrain(_))
        ));

        let mut scenario = Scenario::duel();
        scenario.terrain[1] = "...x....".to_string();
        assert!(matches!(
            scenario.map_description(),
            Err(ScenarioError::InvalidTerrain(msg)) if msg.contains('x')
        ));
    }

    #[test]
    fn test_unknown_template() {
        let mut scenario = Scenario::duel();
        scenario.units[2].template = "dragon".to_string();
        assert!(matches!(
            scenario.to_setup(),
            Err(ScenarioError::UnknownTemplate { index: 2, .. })
        ));
    }

    #[test]
    fn test_overlapping_units_are_rejected() {
        let mut scenario = Scenario::duel();
        scenario.units[1].pos = GridPos::new(1, 2);
        assert!(matches!(
            scenario.to_setup(),
            Err(ScenarioError::Battle(BattleError::InvalidSetup(_)))
        ));
    }

    #[test]
    fn test_load_missing_file() {
        assert!(matches!(
            Scenario::load("/nonexistent/scenario.ron"),
            Err(ScenarioError::FileNotFound(_))
        ));
    }
}
