//! Replay and property tests for tactics_core.
//!
//! Random command scripts are mostly invalid. Rejected commands must not
//! leave a trace, so replaying only the accepted log reproduces the state.

use proptest::prelude::*;
use tactics_core::pathfinding::find_path;
use tactics_core::prelude::*;
use tactics_test_utils::determinism::run_script;
use tactics_test_utils::fixtures::{duel_setup, opening_script, pos, warrior};
use tactics_test_utils::strategies::{arb_command_script, arb_grid_pos};

// =============================================================================
// Replay
// =============================================================================

mod replay {
    use super::*;

    #[test]
    fn test_replay_reproduces_opening_events() {
        let setup = duel_setup(21);
        let mut battle = Battle::from_setup(&setup).unwrap();
        let (live_events, rejected) = run_script(&mut battle, &opening_script());
        assert_eq!(rejected, 0);

        let replay = Replay::record("opening", setup, &battle);
        let decoded = Replay::from_bytes(&replay.to_bytes().unwrap()).unwrap();
        let mut player = ReplayPlayer::new(decoded).unwrap();
        let replayed = player.run_to_end().unwrap();

        assert_eq!(replayed, live_events);
        assert_eq!(player.battle().state_hash(), battle.state_hash());
    }

    #[test]
    fn test_replay_setup_is_ron_portable() {
        let setup = duel_setup(5);
        let text = ron::to_string(&setup).unwrap();
        let parsed = BattleSetup::from_ron_str(&text).unwrap();
        assert_eq!(parsed, setup);

        let a = Battle::from_setup(&setup).unwrap();
        let b = Battle::from_setup(&parsed).unwrap();
        assert_eq!(a.state_hash(), b.state_hash());
    }

    #[test]
    fn test_seek_backwards_rebuilds_state() {
        let setup = duel_setup(8);
        let mut battle = Battle::from_setup(&setup).unwrap();
        run_script(&mut battle, &opening_script());
        let mut player = ReplayPlayer::new(Replay::record("seek", setup, &battle)).unwrap();

        player.seek(4).unwrap();
        let midway = player.battle().state_hash();
        player.run_to_end().unwrap();
        player.seek(4).unwrap();

        assert_eq!(player.battle().state_hash(), midway);
        assert_eq!(player.battle().position_of(UnitId(0)), Some(pos(4, 2)));
    }

    #[test]
    fn test_tampered_log_is_detected() {
        let setup = duel_setup(8);
        let mut battle = Battle::from_setup(&setup).unwrap();
        run_script(&mut battle, &opening_script());
        let mut replay = Replay::record("tamper", setup, &battle);
        replay.commands.truncate(5);

        assert!(matches!(
            ReplayPlayer::new(replay).unwrap().verify(),
            Err(BattleError::DesyncDetected { commands: 5, .. })
        ));
    }
}

// =============================================================================
// Properties
// =============================================================================

mod properties {
    use super::*;

    /// A map with rocks where `rocks` says so.
    fn rocky_map(width: u32, height: u32, rocks: &[bool]) -> BattleMap {
        BattleMap::with_tiles(width, height, |x, y| {
            let i = (y as u32 * width + x as u32) as usize;
            if rocks.get(i).copied().unwrap_or(false) {
                Tiles::ROCK
            } else {
                Tiles::GRASS
            }
        })
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(128))]

        #[test]
        fn prop_paths_are_walkable_and_within_budget(
            rocks in proptest::collection::vec(proptest::bool::weighted(0.25), 64),
            from in arb_grid_pos(8, 8),
            to in arb_grid_pos(8, 8),
            budget in 0u32..12,
        ) {
            let map = rocky_map(8, 8, &rocks);
            if let Some(path) = find_path(&map, from, to, budget, Tiles::LAND) {
                prop_assert!(!path.is_empty());
                prop_assert!(path.len() <= budget as usize);
                prop_assert!(from.is_adjacent(path[0]));
                for pair in path.windows(2) {
                    prop_assert!(pair[0].is_adjacent(pair[1]));
                }
                for cell in &path {
                    prop_assert!(map.is_spare(*cell, Tiles::LAND));
                }
                if path.len() < budget as usize {
                    prop_assert_eq!(path.last(), Some(&to));
                }
            }
        }

        #[test]
        fn prop_buff_ids_stay_unique(
            adds in proptest::collection::vec((0usize..3, 1u32..4), 1..20)
        ) {
            let mut battle = Battle::new(BattleMap::new(3, 3), 1, vec![1]).unwrap();
            let unit = battle.add_warrior_at(pos(1, 1), warrior(1, 10, 2)).unwrap();
            let ids = ["haste", "rage", "ward"];

            for (which, amount) in adds {
                let buff = match which {
                    0 => Buff::countdown(ids[0], amount, 4, BuffEffect::Marker),
                    1 => Buff::overlay(ids[1], amount, 5, BuffEffect::AttackBoost { amount: 1 }),
                    _ => Buff::passive(ids[2], BuffEffect::ResetShield),
                };
                battle.add_buff(unit, buff).unwrap();
            }

            let w = battle.warrior(unit).unwrap();
            let mut seen: Vec<&str> = w.buffs().map(|b| b.id.as_str()).collect();
            let total = seen.len();
            seen.sort_unstable();
            seen.dedup();
            prop_assert_eq!(seen.len(), total);
            if let Some(remaining) = w.buff("haste").and_then(Buff::remaining) {
                prop_assert!(remaining <= 4);
            }
            let rage = w.buff("rage").map_or(0, Buff::stacks);
            prop_assert!(rage <= 5);
            prop_assert_eq!(w.stats.atk_inc, rage as i32);
        }

        #[test]
        fn prop_occupancy_matches_arena(
            script in arb_command_script(8, 6, 5, vec![1, 2], 60)
        ) {
            let mut battle = Battle::from_setup(&duel_setup(13)).unwrap();
            let mut full = opening_script();
            full.extend(script);
            run_script(&mut battle, &full);

            let placed: Vec<UnitId> = battle
                .warriors()
                .iter()
                .filter(|w| w.obj().is_some())
                .map(Warrior::id)
                .collect();
            for unit in &placed {
                let at = battle.position_of(*unit).unwrap();
                prop_assert_eq!(battle.map().unit_at(at), Some(*unit));
                prop_assert!(!battle.warrior(*unit).unwrap().is_dead());
            }
            // Units plus the single rock prop.
            prop_assert_eq!(battle.map().occupied_count(), placed.len() + 1);
        }

        #[test]
        fn prop_accepted_log_replays_to_same_hash(
            script in arb_command_script(8, 6, 4, vec![1, 2], 60)
        ) {
            let setup = duel_setup(17);
            let mut battle = Battle::from_setup(&setup).unwrap();
            let mut full = opening_script();
            full.extend(script);
            let (live, _) = run_script(&mut battle, &full);

            let mut player = ReplayPlayer::new(Replay::record("prop", setup, &battle)).unwrap();
            let replayed = player.run_to_end().unwrap();
            prop_assert_eq!(replayed, live);
            prop_assert_eq!(player.battle().state_hash(), battle.state_hash());
        }
    }
}
