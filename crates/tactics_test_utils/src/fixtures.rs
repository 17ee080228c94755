//! Test fixtures and helpers.
//!
//! Pre-built setups, warriors and command scripts for consistent testing.

use tactics_core::command::Command;
use tactics_core::map::{BattleMap, GridPos};
use tactics_core::setup::{BattleSetup, MapDescription, WarriorTemplate};
use tactics_core::skill::{ActiveSkill, ActiveSkillKind, Buff, BuffEffect};
use tactics_core::tile::Tiles;
use tactics_core::warrior::{AttackType, CombatStats, TeamId, UnitId, Warrior};

/// Shorthand for a grid position.
#[must_use]
pub const fn pos(x: i32, y: i32) -> GridPos {
    GridPos::new(x, y)
}

/// An empty grass map.
#[must_use]
pub fn flat_map(width: u32, height: u32) -> BattleMap {
    BattleMap::new(width, height)
}

/// A physical melee template with the given HP and ATK.
#[must_use]
pub fn template(name: &str, max_hp: i32, atk: i32) -> WarriorTemplate {
    let mut template = WarriorTemplate::new(name);
    template.max_hp = max_hp;
    template.stats.atk = atk;
    template
}

/// A ready-to-place melee warrior with a default basic attack.
///
/// # Panics
///
/// Panics if `max_hp` is not positive.
#[must_use]
pub fn warrior(team: TeamId, max_hp: i32, atk: i32) -> Warrior {
    template(&format!("warrior-{team}"), max_hp, atk)
        .instantiate(team)
        .expect("fixture template must be valid")
}

/// Knight: sturdy melee fighter with a small crit chance.
#[must_use]
pub fn knight() -> WarriorTemplate {
    WarriorTemplate {
        stats: CombatStats {
            atk: 6,
            arm: 2,
            crit: 10,
            ..CombatStats::default()
        },
        ..template("Knight", 20, 6)
    }
}

/// Archer: ranged physical attacker with a timed attack boost.
#[must_use]
pub fn archer() -> WarriorTemplate {
    WarriorTemplate {
        attack_range: vec![2, 3],
        buffs: vec![Buff::countdown("focus", 3, 5, BuffEffect::AttackBoost { amount: 2 })],
        ..template("Archer", 12, 4)
    }
}

/// Mage: shielded caster whose shield is reset and regenerated each round.
#[must_use]
pub fn mage() -> WarriorTemplate {
    WarriorTemplate {
        max_es: 6,
        attack_type: AttackType::Magical,
        stats: CombatStats {
            atk: 2,
            pow: 5,
            res: 3,
            ..CombatStats::default()
        },
        attack_range: vec![2, 3],
        skills: vec![
            ActiveSkill::new("bolt", ActiveSkillKind::Strike { percent: 120 }),
            ActiveSkill::new("ward", ActiveSkillKind::Fortify { amount: 3 }).with_range([0, 1]),
        ],
        buffs: vec![
            Buff::passive("reset", BuffEffect::ResetShield),
            Buff::overlay("regen", 1, 3, BuffEffect::ShieldRegen { amount: 2 }),
        ],
        ..template("Mage", 10, 2)
    }
}

/// Two teams of two on an 8x6 map with a small pond and a rock.
///
/// Unit ids: 0 = team 1 knight at (1,2), 1 = team 1 archer at (1,3),
/// 2 = team 2 knight at (6,2), 3 = team 2 mage at (6,3).
#[must_use]
pub fn duel_setup(seed: u64) -> BattleSetup {
    let map = MapDescription::generate(8, 6, |x, y| {
        if y == 5 && (3..=4).contains(&x) {
            Tiles::WATER
        } else if y == 0 {
            Tiles::HILL
        } else {
            Tiles::GRASS
        }
    });

    BattleSetup {
        seed,
        map,
        players: vec![1, 2],
        roster: Vec::new(),
        props: Vec::new(),
    }
    .with_unit(1, pos(1, 2), knight())
    .with_unit(1, pos(1, 3), archer())
    .with_unit(2, pos(6, 2), knight())
    .with_unit(2, pos(6, 3), mage())
    .with_prop(pos(4, 4), true)
}

/// A valid opening for [`duel_setup`]: both teams prepare, the knights
/// close in and trade blows. No unit dies whatever the crit rolls.
#[must_use]
pub fn opening_script() -> Vec<(TeamId, Command)> {
    vec![
        (1, Command::PlayerPrepared),
        (2, Command::PlayerPrepared),
        (1, Command::StartNextRound),
        (
            1,
            Command::MoveOnPath {
                unit: UnitId(0),
                path: vec![pos(1, 2), pos(2, 2), pos(3, 2), pos(4, 2)],
            },
        ),
        (1, Command::ActionDone),
        (2, Command::StartNextRound),
        (
            2,
            Command::MoveOnPath {
                unit: UnitId(2),
                path: vec![pos(6, 2), pos(5, 2)],
            },
        ),
        (
            2,
            Command::Attack {
                attacker: UnitId(2),
                target: UnitId(0),
            },
        ),
        (2, Command::ActionDone),
        (1, Command::StartNextRound),
        (
            1,
            Command::Attack {
                attacker: UnitId(0),
                target: UnitId(2),
            },
        ),
        (1, Command::ActionDone),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use tactics_core::battle::{Battle, BattlePhase};

    #[test]
    fn test_duel_setup_is_valid() {
        let setup = duel_setup(1);
        assert!(setup.validate().is_ok());

        let battle = Battle::from_setup(&setup).unwrap();
        assert_eq!(battle.warriors().len(), 4);
        assert_eq!(battle.position_of(UnitId(3)), Some(pos(6, 3)));
        assert_eq!(battle.map().tile(pos(3, 5)), Some(Tiles::WATER));
    }

    #[test]
    fn test_opening_script_is_accepted() {
        for seed in [1, 2, 3, 42, 1337] {
            let mut battle = Battle::from_setup(&duel_setup(seed)).unwrap();
            for (player, command) in opening_script() {
                battle.apply(player, command).unwrap();
            }
            assert_eq!(battle.phase(), BattlePhase::InProgress);
            assert_eq!(battle.position_of(UnitId(0)), Some(pos(4, 2)));
        }
    }

    #[test]
    fn test_warrior_fixture() {
        let w = warrior(2, 15, 4);
        assert_eq!(w.team, 2);
        assert_eq!(w.hp, 15);
        assert_eq!(w.basic_attack_value(), 4);
        assert!(w.default_active_skill().is_some());
    }
}
