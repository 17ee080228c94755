//! Replay recording and playback.
//!
//! A replay is the battle setup (seed included) plus the accepted command
//! log. Re-applying the log to a battle built from the same setup recreates
//! every state and event exactly.

use serde::{Deserialize, Serialize};

use crate::battle::Battle;
use crate::command::{Command, CommandRecord};
use crate::error::{BattleError, Result};
use crate::events::BattleEvent;
use crate::setup::BattleSetup;
use crate::warrior::TeamId;

/// Replay format version for compatibility.
pub const REPLAY_VERSION: u32 = 1;

/// Complete replay data structure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Replay {
    /// Replay format version.
    pub version: u32,
    /// Scenario identifier or name.
    pub scenario_id: String,
    /// Initial state, seed included.
    pub setup: BattleSetup,
    /// Accepted commands in order.
    pub commands: Vec<CommandRecord>,
    /// State hash after the last command.
    pub final_hash: u64,
}

impl Replay {
    /// Start an empty replay for a setup.
    #[must_use]
    pub fn new(scenario_id: impl Into<String>, setup: BattleSetup) -> Self {
        Self {
            version: REPLAY_VERSION,
            scenario_id: scenario_id.into(),
            setup,
            commands: Vec::new(),
            final_hash: 0,
        }
    }

    /// Capture a battle's command log and current hash.
    ///
    /// `setup` must be the one the battle was built from.
    #[must_use]
    pub fn record(scenario_id: impl Into<String>, setup: BattleSetup, battle: &Battle) -> Self {
        let mut replay = Self::new(scenario_id, setup);
        replay.commands = battle.command_log().to_vec();
        replay.finalize(battle.state_hash());
        replay
    }

    /// Append a command.
    pub fn record_command(&mut self, player: TeamId, command: Command) {
        self.commands.push(CommandRecord {
            seq: self.commands.len() as u64,
            player,
            command,
        });
    }

    /// Store the final state hash.
    pub fn finalize(&mut self, final_hash: u64) {
        self.final_hash = final_hash;
    }

    /// Encode with bincode.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        bincode::serialize(self)
            .map_err(|e| BattleError::Serialization(format!("Failed to serialize replay: {e}")))
    }

    /// Decode with bincode and check the version.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let replay: Self = bincode::deserialize(bytes)
            .map_err(|e| BattleError::Serialization(format!("Failed to deserialize replay: {e}")))?;

        if replay.version != REPLAY_VERSION {
            return Err(BattleError::ReplayVersionMismatch {
                expected: REPLAY_VERSION,
                actual: replay.version,
            });
        }
        Ok(replay)
    }

    /// Build the battle in its initial state.
    pub fn restore_initial_state(&self) -> Result<Battle> {
        Battle::from_setup(&self.setup)
    }

    /// Commands issued by one player.
    #[must_use]
    pub fn commands_by(&self, player: TeamId) -> Vec<&CommandRecord> {
        self.commands.iter().filter(|c| c.player == player).collect()
    }

    /// Number of commands.
    #[must_use]
    pub fn command_count(&self) -> usize {
        self.commands.len()
    }
}

/// Steps through a replay one command at a time.
#[derive(Debug)]
pub struct ReplayPlayer {
    replay: Replay,
    battle: Battle,
    cursor: usize,
}

impl ReplayPlayer {
    /// Create a player positioned before the first command.
    pub fn new(replay: Replay) -> Result<Self> {
        let battle = replay.restore_initial_state()?;
        Ok(Self {
            replay,
            battle,
            cursor: 0,
        })
    }

    /// Apply the next command. Returns `None` once every command was applied.
    ///
    /// # Errors
    ///
    /// A recorded command that the rebuilt battle rejects means the replay
    /// does not match this build; the error is returned as is.
    pub fn step(&mut self) -> Result<Option<Vec<BattleEvent>>> {
        let Some(record) = self.replay.commands.get(self.cursor) else {
            return Ok(None);
        };
        let events = self.battle.apply(record.player, record.command.clone())?;
        self.cursor += 1;
        Ok(Some(events))
    }

    /// Rebuild and replay up to (not including) command `index`.
    pub fn seek(&mut self, index: usize) -> Result<()> {
        self.battle = self.replay.restore_initial_state()?;
        self.cursor = 0;
        let target = index.min(self.replay.commands.len());
        while self.cursor < target {
            self.step()?;
        }
        Ok(())
    }

    /// Apply every remaining command, collecting the events.
    pub fn run_to_end(&mut self) -> Result<Vec<BattleEvent>> {
        let mut events = Vec::new();
        while let Some(batch) = self.step()? {
            events.extend(batch);
        }
        Ok(events)
    }

    /// Replay from scratch and compare the final hash.
    ///
    /// # Errors
    ///
    /// [`BattleError::DesyncDetected`] on a hash mismatch.
    pub fn verify(&mut self) -> Result<()> {
        self.seek(self.replay.commands.len())?;
        let actual = self.battle.state_hash();
        if actual == self.replay.final_hash {
            Ok(())
        } else {
            Err(BattleError::DesyncDetected {
                commands: self.cursor,
                expected: self.replay.final_hash,
                actual,
            })
        }
    }

    /// Index of the next command.
    #[must_use]
    pub const fn cursor(&self) -> usize {
        self.cursor
    }

    /// The battle as of the cursor.
    #[must_use]
    pub const fn battle(&self) -> &Battle {
        &self.battle
    }

    /// The replay being played.
    #[must_use]
    pub const fn replay(&self) -> &Replay {
        &self.replay
    }

    /// All commands applied.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.cursor >= self.replay.commands.len()
    }

    /// Progress as a percentage (0-100).
    #[must_use]
    pub fn progress_percent(&self) -> f64 {
        if self.replay.commands.is_empty() {
            100.0
        } else {
            (self.cursor as f64 / self.replay.commands.len() as f64) * 100.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::GridPos;
    use crate::setup::WarriorTemplate;
    use crate::warrior::UnitId;

    fn setup() -> BattleSetup {
        let mut striker = WarriorTemplate::new("Striker");
        striker.stats.atk = 4;
        BattleSetup::new(99, 6, 4, vec![1, 2])
            .with_unit(1, GridPos::new(1, 1), striker.clone())
            .with_unit(2, GridPos::new(4, 1), striker)
    }

    fn script() -> Vec<(TeamId, Command)> {
        vec![
            (1, Command::PlayerPrepared),
            (2, Command::PlayerPrepared),
            (1, Command::StartNextRound),
            (
                1,
                Command::MoveOnPath {
                    unit: UnitId(0),
                    path: vec![GridPos::new(1, 1), GridPos::new(2, 1), GridPos::new(3, 1)],
                },
            ),
            (1, Command::Attack { attacker: UnitId(0), target: UnitId(1) }),
            (1, Command::ActionDone),
        ]
    }

    fn played() -> (Battle, BattleSetup) {
        let setup = setup();
        let mut battle = Battle::from_setup(&setup).unwrap();
        for (player, command) in script() {
            battle.apply(player, command).unwrap();
        }
        (battle, setup)
    }

    #[test]
    fn test_record_captures_log_and_hash() {
        let (battle, setup) = played();
        let replay = Replay::record("duel", setup, &battle);

        assert_eq!(replay.version, REPLAY_VERSION);
        assert_eq!(replay.command_count(), 6);
        assert_eq!(replay.commands_by(2).len(), 1);
        assert_eq!(replay.final_hash, battle.state_hash());
    }

    #[test]
    fn test_bytes_roundtrip() {
        let (battle, setup) = played();
        let replay = Replay::record("duel", setup, &battle);
        let decoded = Replay::from_bytes(&replay.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded, replay);
    }

    #[test]
    fn test_version_mismatch_is_rejected() {
        let mut replay = Replay::new("duel", setup());
        replay.version = 99;
        let bytes = replay.to_bytes().unwrap();
        assert_eq!(
            Replay::from_bytes(&bytes),
            Err(BattleError::ReplayVersionMismatch { expected: REPLAY_VERSION, actual: 99 })
        );
    }

    #[test]
    fn test_verify_detects_desync() {
        let (battle, setup) = played();
        let mut replay = Replay::record("duel", setup, &battle);
        assert!(ReplayPlayer::new(replay.clone()).unwrap().verify().is_ok());

        replay.finalize(replay.final_hash ^ 1);
        assert!(matches!(
            ReplayPlayer::new(replay).unwrap().verify(),
            Err(BattleError::DesyncDetected { commands: 6, .. })
        ));
    }

    #[test]
    fn test_step_and_seek() {
        let (battle, setup) = played();
        let replay = Replay::record("duel", setup, &battle);
        let mut player = ReplayPlayer::new(replay).unwrap();

        assert!(player.step().unwrap().is_some());
        assert_eq!(player.cursor(), 1);

        player.seek(4).unwrap();
        assert_eq!(player.battle().position_of(UnitId(0)), Some(GridPos::new(3, 1)));
        assert!((player.progress_percent() - 66.666).abs() < 0.01);

        player.seek(1).unwrap();
        assert_eq!(player.battle().position_of(UnitId(0)), Some(GridPos::new(1, 1)));

        player.run_to_end().unwrap();
        assert!(player.is_finished());
        assert!(player.step().unwrap().is_none());
        assert_eq!(player.battle().state_hash(), battle.state_hash());
    }

    #[test]
    fn test_record_command_numbers_sequentially() {
        let mut replay = Replay::new("manual", setup());
        replay.record_command(1, Command::PlayerPrepared);
        replay.record_command(2, Command::PlayerPrepared);
        assert_eq!(replay.commands[1].seq, 1);
        assert_eq!(replay.commands[1].player, 2);
    }
}
