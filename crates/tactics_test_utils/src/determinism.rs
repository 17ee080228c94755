//! Determinism testing utilities.
//!
//! Provides a harness for verifying that a battle produces identical
//! results given an identical setup and command script.
//!
//! # Testing Strategy
//!
//! A battle must be reproducible from its seed and command log alone.
//! Sources of non-determinism include:
//!
//! - **HashMap iteration order**: the default hasher is randomized.
//!   Everything that is iterated lives in `Vec`s or `BTreeMap`s.
//!
//! - **System randomness**: the only random source is the battle's seeded
//!   RNG, drawn in command order.
//!
//! - **Listener side effects**: listeners observe events but cannot reach
//!   the battle.
//!
//! # Test Levels
//!
//! 1. **Unit tests**: individual commands and buffs
//! 2. **Property tests**: random command scripts still replay identically
//! 3. **Integration tests**: full scenarios and replay files are reproducible

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use tactics_core::battle::Battle;
use tactics_core::command::Command;
use tactics_core::events::BattleEvent;
use tactics_core::replay::{Replay, ReplayPlayer};
use tactics_core::setup::BattleSetup;
use tactics_core::warrior::TeamId;
use tracing::warn;

/// Result of a determinism test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeterminismResult {
    /// Whether all runs produced identical results.
    pub is_deterministic: bool,
    /// Hashes from each run.
    pub hashes: Vec<u64>,
    /// Number of steps applied per run.
    pub steps: u64,
}

impl DeterminismResult {
    /// Get all unique hashes (should be 1 for a deterministic battle).
    #[must_use]
    pub fn unique_hashes(&self) -> Vec<u64> {
        let mut unique: Vec<u64> = self.hashes.clone();
        unique.sort_unstable();
        unique.dedup();
        unique
    }

    /// Assert that the runs were deterministic, with a detailed error message.
    ///
    /// # Panics
    ///
    /// Panics if the runs produced different hashes.
    pub fn assert_deterministic(&self) {
        if !self.is_deterministic {
            let unique = self.unique_hashes();
            panic!(
                "Battle is non-deterministic!\n\
                 Runs: {}\n\
                 Steps: {}\n\
                 Unique hashes: {} (expected 1)\n\
                 All hashes: {:?}",
                self.hashes.len(),
                self.steps,
                unique.len(),
                self.hashes
            );
        }
    }
}

/// Run a state machine multiple times and verify determinism.
///
/// # Arguments
///
/// * `runs` - Number of times to run
/// * `steps` - Number of steps per run
/// * `setup` - Function to create the initial state
/// * `step` - Function to advance the state by one step
/// * `hash` - Function to compute the state hash
pub fn verify_determinism<S, Setup, Step, HashFn>(
    runs: usize,
    steps: u64,
    setup: Setup,
    step: Step,
    hash: HashFn,
) -> DeterminismResult
where
    Setup: Fn() -> S,
    Step: Fn(&mut S, u64),
    HashFn: Fn(&S) -> u64,
{
    let mut hashes = Vec::with_capacity(runs);

    for _ in 0..runs {
        let mut state = setup();

        for i in 0..steps {
            step(&mut state, i);
        }

        hashes.push(hash(&state));
    }

    let is_deterministic = hashes.windows(2).all(|w| w[0] == w[1]);

    DeterminismResult {
        is_deterministic,
        hashes,
        steps,
    }
}

/// Apply a script, ignoring rejected commands. Returns every event and the
/// number of rejections.
pub fn run_script(battle: &mut Battle, script: &[(TeamId, Command)]) -> (Vec<BattleEvent>, usize) {
    let mut events = Vec::new();
    let mut rejected = 0;
    for (player, command) in script {
        match battle.apply(*player, command.clone()) {
            Ok(batch) => events.extend(batch),
            Err(_) => rejected += 1,
        }
    }
    (events, rejected)
}

/// Build a battle from `setup` `runs` times, apply `script` to each, and
/// compare final hashes. Rejected commands are part of the script's
/// behaviour and do not fail the check.
///
/// # Panics
///
/// Panics if the setup is invalid.
pub fn verify_battle_determinism(
    setup: &BattleSetup,
    script: &[(TeamId, Command)],
    runs: usize,
) -> DeterminismResult {
    verify_determinism(
        runs,
        script.len() as u64,
        || Battle::from_setup(setup).expect("setup must be valid"),
        |battle, i| {
            let (player, command) = &script[i as usize];
            let _ = battle.apply(*player, command.clone());
        },
        Battle::state_hash,
    )
}

/// Apply a script to two battles in lockstep, finding the first divergence.
///
/// # Returns
///
/// `None` if the battles stay identical, `Some(0)` if they already differ
/// after construction, `Some(n)` if they diverge after the n-th command.
///
/// # Panics
///
/// Panics if the setup is invalid.
pub fn find_first_divergence(setup: &BattleSetup, script: &[(TeamId, Command)]) -> Option<usize> {
    let mut a = Battle::from_setup(setup).expect("setup must be valid");
    let mut b = Battle::from_setup(setup).expect("setup must be valid");

    if a.state_hash() != b.state_hash() {
        return Some(0);
    }

    for (i, (player, command)) in script.iter().enumerate() {
        let ra = a.apply(*player, command.clone());
        let rb = b.apply(*player, command.clone());
        if ra != rb || a.state_hash() != b.state_hash() {
            warn!(step = i + 1, op = command.opcode(), "Battles diverged");
            return Some(i + 1);
        }
    }

    None
}

/// Record a script as a replay, push it through bincode, and verify the
/// decoded replay reproduces the final hash.
///
/// # Panics
///
/// Panics if the setup is invalid.
pub fn verify_replay_roundtrip(setup: &BattleSetup, script: &[(TeamId, Command)]) -> bool {
    let mut battle = Battle::from_setup(setup).expect("setup must be valid");
    run_script(&mut battle, script);
    let replay = Replay::record("roundtrip", setup.clone(), &battle);

    let Ok(bytes) = replay.to_bytes() else {
        return false;
    };
    let Ok(decoded) = Replay::from_bytes(&bytes) else {
        return false;
    };
    ReplayPlayer::new(decoded).and_then(|mut p| p.verify()).is_ok()
}

/// Compute a simple hash for any hashable value.
pub fn compute_hash<T: Hash>(value: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

/// Proptest strategies for determinism testing.
///
/// These strategies generate random but reproducible inputs for
/// property-based testing of battle determinism.
pub mod strategies {
    use proptest::prelude::*;
    use tactics_core::command::Command;
    use tactics_core::map::GridPos;
    use tactics_core::warrior::{TeamId, UnitId};

    /// Generate a cell inside a `width` x `height` grid.
    pub fn arb_grid_pos(width: u32, height: u32) -> impl Strategy<Value = GridPos> {
        (0..width as i32, 0..height as i32).prop_map(|(x, y)| GridPos::new(x, y))
    }

    /// Generate a unit id below `units`.
    pub fn arb_unit_id(units: u32) -> impl Strategy<Value = UnitId> {
        (0..units).prop_map(UnitId)
    }

    /// Generate one of the given teams.
    pub fn arb_team(players: Vec<TeamId>) -> impl Strategy<Value = TeamId> {
        proptest::sample::select(players)
    }

    /// Generate a short 4-connected walk starting anywhere on the grid.
    pub fn arb_walk(width: u32, height: u32, max_len: usize) -> impl Strategy<Value = Vec<GridPos>> {
        (
            arb_grid_pos(width, height),
            proptest::collection::vec(0..4usize, 0..max_len),
        )
            .prop_map(|(start, dirs)| {
                let mut path = vec![start];
                let mut current = start;
                for dir in dirs {
                    current = current.neighbors()[dir];
                    path.push(current);
                }
                path
            })
    }

    /// Generate any command against a grid and unit count. Many generated
    /// commands are invalid; that is the point.
    pub fn arb_command(width: u32, height: u32, units: u32) -> impl Strategy<Value = Command> {
        prop_oneof![
            Just(Command::PlayerPrepared),
            Just(Command::StartNextRound),
            Just(Command::ActionDone),
            (arb_grid_pos(width, height), arb_grid_pos(width, height))
                .prop_map(|(from, to)| Command::ExchangePositions { from, to }),
            (arb_unit_id(units), arb_walk(width, height, 4))
                .prop_map(|(unit, path)| Command::MoveOnPath { unit, path }),
            (arb_unit_id(units), arb_unit_id(units))
                .prop_map(|(attacker, target)| Command::Attack { attacker, target }),
            (
                arb_unit_id(units),
                prop_oneof![Just("attack"), Just("bolt"), Just("ward")],
                arb_grid_pos(width, height)
            )
                .prop_map(|(caster, skill, target)| Command::CastSkill {
                    caster,
                    skill: skill.to_string(),
                    target,
                }),
        ]
    }

    /// Generate a script of player-attributed commands.
    pub fn arb_command_script(
        width: u32,
        height: u32,
        units: u32,
        players: Vec<TeamId>,
        max_len: usize,
    ) -> impl Strategy<Value = Vec<(TeamId, Command)>> {
        proptest::collection::vec(
            (arb_team(players), arb_command(width, height, units)),
            0..max_len,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{duel_setup, opening_script};
    use proptest::prelude::*;
    use strategies::arb_command_script;

    #[test]
    fn test_verify_determinism_simple() {
        let result = verify_determinism(3, 100, || 0u64, |n, _| *n += 1, |n| *n);

        assert!(result.is_deterministic);
        assert_eq!(result.hashes, vec![100, 100, 100]);
    }

    #[test]
    fn test_opening_is_deterministic() {
        let result = verify_battle_determinism(&duel_setup(7), &opening_script(), 4);
        result.assert_deterministic();
        assert_eq!(result.unique_hashes().len(), 1);
    }

    #[test]
    fn test_no_divergence_in_opening() {
        assert_eq!(find_first_divergence(&duel_setup(7), &opening_script()), None);
    }

    #[test]
    fn test_replay_roundtrip_of_opening() {
        assert!(verify_replay_roundtrip(&duel_setup(11), &opening_script()));
    }

    #[test]
    fn test_run_script_counts_rejections() {
        let mut battle = Battle::from_setup(&duel_setup(1)).unwrap();
        let script = vec![(1, Command::ActionDone), (1, Command::PlayerPrepared)];
        let (events, rejected) = run_script(&mut battle, &script);
        assert_eq!(rejected, 1);
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn test_different_seeds_may_differ_but_each_is_stable() {
        for seed in 0..5 {
            verify_battle_determinism(&duel_setup(seed), &opening_script(), 2).assert_deterministic();
        }
    }

    #[test]
    fn test_compute_hash_is_stable() {
        assert_eq!(compute_hash(&(1, "a")), compute_hash(&(1, "a")));
        assert_ne!(compute_hash(&1u32), compute_hash(&2u32));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn prop_random_scripts_are_deterministic(
            script in arb_command_script(8, 6, 5, vec![1, 2], 40)
        ) {
            let setup = duel_setup(3);
            let mut full = opening_script();
            full.extend(script);
            prop_assert_eq!(find_first_divergence(&setup, &full), None);
        }

        #[test]
        fn prop_random_scripts_replay(
            script in arb_command_script(8, 6, 4, vec![1, 2], 30)
        ) {
            let setup = duel_setup(5);
            let mut full = opening_script();
            full.extend(script);
            prop_assert!(verify_replay_roundtrip(&setup, &full));
        }
    }
}
