//! Determinism verification for scenarios and replay files.
//!
//! A scenario plus a command script is played several times from scratch.
//! Every run must end on the same state hash, and the replay recorded from
//! the first run must survive a bincode round trip and reproduce that hash.

use tactics_core::battle::Battle;
use tactics_core::command::Command;
use tactics_core::replay::{Replay, ReplayPlayer};
use tactics_core::warrior::TeamId;
use tracing::{debug, info, warn};

use crate::runner::RunnerError;
use crate::scenario::Scenario;

/// Outcome of a verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyReport {
    /// Final hash of each run.
    pub hashes: Vec<u64>,
    /// Commands accepted per run (identical across deterministic runs).
    pub accepted: usize,
    /// Commands rejected per run.
    pub rejected: usize,
    /// Whether the recorded replay reproduced the live hash.
    pub replay_ok: bool,
}

impl VerifyReport {
    /// All runs agree and the replay matched.
    pub fn is_deterministic(&self) -> bool {
        self.replay_ok && self.hashes.windows(2).all(|w| w[0] == w[1])
    }
}

/// Play the scenario's script followed by `extra`, `runs` times.
pub fn verify_scenario(
    scenario: &Scenario,
    extra: &[(TeamId, Command)],
    runs: usize,
) -> Result<VerifyReport, RunnerError> {
    let setup = scenario.to_setup()?;
    let mut script = scenario.script();
    script.extend_from_slice(extra);

    let mut hashes = Vec::with_capacity(runs);
    let mut accepted = 0;
    let mut rejected = 0;
    let mut first: Option<Battle> = None;

    for run in 0..runs.max(2) {
        let mut battle = Battle::from_setup(&setup)?;
        rejected = 0;
        for (player, command) in &script {
            if let Err(err) = battle.apply(*player, command.clone()) {
                debug!(run, op = command.opcode(), %err, "Scripted command rejected");
                rejected += 1;
            }
        }
        accepted = battle.command_log().len();
        hashes.push(battle.state_hash());
        if first.is_none() {
            first = Some(battle);
        }
    }

    let replay_ok = match first {
        Some(battle) => replay_roundtrip(Replay::record(scenario.name.clone(), setup, &battle)),
        None => false,
    };

    let report = VerifyReport {
        hashes,
        accepted,
        rejected,
        replay_ok,
    };
    if report.is_deterministic() {
        info!(runs = report.hashes.len(), accepted, rejected, "Scenario is deterministic");
    } else {
        warn!(hashes = ?report.hashes, replay_ok, "Scenario diverged");
    }
    Ok(report)
}

/// Encode, decode and verify a replay.
fn replay_roundtrip(replay: Replay) -> bool {
    let decoded = replay.to_bytes().and_then(|bytes| Replay::from_bytes(&bytes));
    match decoded.and_then(ReplayPlayer::new).and_then(|mut p| p.verify()) {
        Ok(()) => true,
        Err(err) => {
            warn!(%err, "Replay did not reproduce the live battle");
            false
        }
    }
}

/// Verify a replay file's bytes against its recorded hash.
pub fn verify_replay_bytes(bytes: &[u8]) -> Result<usize, RunnerError> {
    let replay = Replay::from_bytes(bytes)?;
    let commands = replay.command_count();
    ReplayPlayer::new(replay)?.verify()?;
    info!(commands, "Replay verified");
    Ok(commands)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tactics_core::error::BattleError;
    use tactics_core::warrior::UnitId;

    #[test]
    fn test_builtin_duel_is_deterministic() {
        let extra = vec![
            (1, Command::StartNextRound),
            (1, Command::Attack { attacker: UnitId(0), target: UnitId(2) }),
            (1, Command::ActionDone),
        ];
        let report = verify_scenario(&Scenario::duel(), &extra, 3).unwrap();
        assert!(report.is_deterministic());
        assert_eq!(report.hashes.len(), 3);
        assert_eq!(report.accepted, 4, "out-of-range attack is rejected");
        assert_eq!(report.rejected, 1);
    }

    #[test]
    fn test_at_least_two_runs() {
        let report = verify_scenario(&Scenario::duel(), &[], 0).unwrap();
        assert_eq!(report.hashes.len(), 2);
    }

    #[test]
    fn test_replay_bytes() {
        let scenario = Scenario::duel();
        let battle = {
            let mut battle = scenario.build_battle().unwrap();
            for (player, command) in scenario.script() {
                battle.apply(player, command).unwrap();
            }
            battle
        };
        let mut replay = Replay::record("duel", scenario.to_setup().unwrap(), &battle);
        assert_eq!(verify_replay_bytes(&replay.to_bytes().unwrap()).unwrap(), 2);

        replay.finalize(0);
        assert!(matches!(
            verify_replay_bytes(&replay.to_bytes().unwrap()),
            Err(RunnerError::Battle(BattleError::DesyncDetected { .. }))
        ));
        assert!(verify_replay_bytes(b"garbage").is_err());
    }
}
