//! Battle orchestrator.
//!
//! The [`Battle`] owns the map, the warrior arena, the RNG, the hook
//! registry and the event bus. Every state change goes through a command:
//!
//! ```text
//! Preparing --(all players prepared)--> InProgress --(one team left)--> Ended
//! ```
//!
//! Each command validates all of its preconditions first. If any fails the
//! battle is left untouched and the error is returned. Otherwise the command
//! runs to completion in a fixed order: before hook, mutation, after hook,
//! public events, cascades (deaths, expired buffs), end-of-battle check.

use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeSet;
use std::hash::{Hash, Hasher};
use std::ops::ControlFlow;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, trace, warn};

use crate::command::{Command, CommandRecord};
use crate::error::{BattleError, Result};
use crate::events::{BattleEvent, DamageReport, EventBus, ListenerId, SelectionChanged};
use crate::hooks::{Handler, HookArgs, HookKind, HookPoint, HookRegistry, Stage, Subscription};
use crate::map::{BattleMap, GridPos, ObjId, OccupantKind};
use crate::pathfinding::{find_path, reachable_cells};
use crate::rng::BattleRng;
use crate::setup::BattleSetup;
use crate::skill::{ActiveSkillKind, Buff, BuffEffect};
use crate::warrior::{TeamId, UnitId, Warrior};

/// Battle lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum BattlePhase {
    /// Players arrange units and declare readiness.
    #[default]
    Preparing,
    /// Rounds are being played.
    InProgress,
    /// Terminal. See [`Battle::winner`].
    Ended,
}

/// The authoritative battle state.
#[derive(Debug)]
pub struct Battle {
    map: BattleMap,
    warriors: Vec<Warrior>,
    rng: BattleRng,
    phase: BattlePhase,
    turn: u32,
    players: Vec<TeamId>,
    prepared: BTreeSet<TeamId>,
    winner: TeamId,
    hooks: HookRegistry,
    events: EventBus<BattleEvent>,
    pending: Vec<BattleEvent>,
    log: Vec<CommandRecord>,
    current_unit: Option<UnitId>,
    selection: EventBus<SelectionChanged>,
}

impl Battle {
    /// Create an empty battle on `map`.
    pub fn new(map: BattleMap, seed: u64, players: Vec<TeamId>) -> Result<Self> {
        if players.is_empty() || players.contains(&0) {
            return Err(BattleError::InvalidSetup(
                "players must be non-empty and non-zero".into(),
            ));
        }
        Ok(Self {
            map,
            warriors: Vec::new(),
            rng: BattleRng::new(seed),
            phase: BattlePhase::Preparing,
            turn: 0,
            players,
            prepared: BTreeSet::new(),
            winner: 0,
            hooks: HookRegistry::new(),
            events: EventBus::new(),
            pending: Vec::new(),
            log: Vec::new(),
            current_unit: None,
            selection: EventBus::new(),
        })
    }

    /// Build the initial state described by a setup.
    pub fn from_setup(setup: &BattleSetup) -> Result<Self> {
        setup.validate()?;
        let mut battle = Self::new(setup.map.build()?, setup.seed, setup.players.clone())?;

        for prop in &setup.props {
            battle.add_prop_at(prop.pos, prop.obstacle)?;
        }
        for placement in &setup.roster {
            let warrior = placement.template.instantiate(placement.team)?;
            let unit = battle.add_warrior_at(placement.pos, warrior)?;
            for buff in &placement.template.buffs {
                battle.add_buff(unit, buff.clone())?;
            }
        }
        // Setup-time notifications are not part of any command.
        battle.pending.clear();

        info!(
            seed = setup.seed,
            units = battle.warriors.len(),
            players = ?battle.players,
            "Battle created"
        );
        Ok(battle)
    }

    // --- accessors ---

    /// The grid.
    #[must_use]
    pub const fn map(&self) -> &BattleMap {
        &self.map
    }

    /// Every warrior ever added, dead ones included, in id order.
    #[must_use]
    pub fn warriors(&self) -> &[Warrior] {
        &self.warriors
    }

    /// Warrior by id.
    #[must_use]
    pub fn warrior(&self, unit: UnitId) -> Option<&Warrior> {
        self.warriors.get(unit.index())
    }

    /// Mutable warrior access for setup-time adjustments (skill swaps,
    /// stat tweaks).
    ///
    /// # Errors
    ///
    /// [`BattleError::InvalidPhase`] once the first command was accepted.
    pub fn warrior_mut(&mut self, unit: UnitId) -> Result<&mut Warrior> {
        self.require_setup("warrior_mut")?;
        self.warriors
            .get_mut(unit.index())
            .ok_or(BattleError::UnknownUnit(unit))
    }

    fn get(&self, unit: UnitId) -> Result<&Warrior> {
        self.warrior(unit).ok_or(BattleError::UnknownUnit(unit))
    }

    /// Where a warrior stands, `None` if off the grid.
    #[must_use]
    pub fn position_of(&self, unit: UnitId) -> Option<GridPos> {
        self.map.position_of(unit)
    }

    /// Current phase.
    #[must_use]
    pub const fn phase(&self) -> BattlePhase {
        self.phase
    }

    /// Winning team, 0 while undecided.
    #[must_use]
    pub const fn winner(&self) -> TeamId {
        self.winner
    }

    /// Rounds started so far.
    #[must_use]
    pub const fn turn(&self) -> u32 {
        self.turn
    }

    /// Participating teams.
    #[must_use]
    pub fn players(&self) -> &[TeamId] {
        &self.players
    }

    /// Teams that declared readiness.
    #[must_use]
    pub const fn prepared(&self) -> &BTreeSet<TeamId> {
        &self.prepared
    }

    /// The RNG, for seed and draw diagnostics.
    #[must_use]
    pub const fn rng(&self) -> &BattleRng {
        &self.rng
    }

    /// Buff hook subscriptions.
    #[must_use]
    pub const fn hooks(&self) -> &HookRegistry {
        &self.hooks
    }

    /// Accepted commands, in order.
    #[must_use]
    pub fn command_log(&self) -> &[CommandRecord] {
        &self.log
    }

    /// Subscribe to public battle events.
    pub fn subscribe(&mut self, listener: impl FnMut(&BattleEvent) + 'static) -> ListenerId {
        self.events.subscribe(listener)
    }

    /// Remove a battle event listener.
    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        self.events.unsubscribe(id)
    }

    // --- setup-time population ---
    //
    // Everything below mutates state outside a command, so it is only
    // allowed while preparing and before any command is logged.

    fn require_setup(&self, op: &'static str) -> Result<()> {
        if self.phase == BattlePhase::Preparing && self.log.is_empty() {
            Ok(())
        } else {
            Err(BattleError::InvalidPhase {
                op,
                phase: self.phase,
            })
        }
    }

    /// Adopt a warrior and place it on the grid. Returns its id.
    ///
    /// Placing onto an occupied cell evicts the occupant; an evicted warrior
    /// stays in the arena but is off the grid.
    pub fn add_warrior_at(&mut self, pos: GridPos, mut warrior: Warrior) -> Result<UnitId> {
        self.require_setup("add_warrior_at")?;
        if !self.players.contains(&warrior.team) {
            return Err(BattleError::UnknownPlayer(warrior.team));
        }
        if !self.map.in_bounds(pos) {
            return Err(BattleError::OutOfBounds(pos));
        }
        let id = UnitId(self.warriors.len() as u32);
        let (obj, evicted) = self.map.spawn(pos, OccupantKind::Warrior(id), warrior.obstacle)?;
        warrior.set_id(id);
        warrior.set_obj(Some(obj));
        self.warriors.push(warrior);

        if let Some(unit) = evicted.and_then(|o| o.unit()) {
            warn!(%unit, %pos, "Warrior evicted by placement");
            self.warriors[unit.index()].set_obj(None);
        }
        debug!(unit = %id, %pos, "Warrior placed");
        Ok(id)
    }

    /// Place a prop. Returns its map id.
    pub fn add_prop_at(&mut self, pos: GridPos, obstacle: bool) -> Result<ObjId> {
        self.require_setup("add_prop_at")?;
        let (obj, evicted) = self.map.spawn(pos, OccupantKind::Prop, obstacle)?;
        if let Some(unit) = evicted.and_then(|o| o.unit()) {
            warn!(%unit, %pos, "Warrior evicted by prop");
            self.warriors[unit.index()].set_obj(None);
        }
        Ok(obj)
    }

    /// Take a warrior off the grid. It stays addressable in the arena.
    pub fn remove_warrior(&mut self, unit: UnitId) -> Result<GridPos> {
        self.require_setup("remove_warrior")?;
        self.lift_warrior(unit)
    }

    fn lift_warrior(&mut self, unit: UnitId) -> Result<GridPos> {
        let obj = self
            .get(unit)?
            .obj()
            .ok_or(BattleError::UnitNotOnGrid(unit))?;
        let (pos, _) = self.map.remove(obj)?;
        self.warriors[unit.index()].set_obj(None);
        if self.current_unit == Some(unit) {
            self.select_unit(None);
        }
        Ok(pos)
    }

    // --- buffs ---

    /// Attach a buff, merging into an existing one with the same id.
    pub fn add_buff(&mut self, unit: UnitId, buff: Buff) -> Result<&Buff> {
        self.require_setup("add_buff")?;
        self.attach_buff(unit, buff)
    }

    fn attach_buff(&mut self, unit: UnitId, buff: Buff) -> Result<&Buff> {
        self.get(unit)?;
        let id = buff.id.clone();
        let warrior = &mut self.warriors[unit.index()];

        let merged = if let Some(existing) = warrior.buff_mut(&id) {
            existing.merge_from(&buff);
            let delta = existing.sync_atk_bonus();
            warrior.stats.atk_inc = warrior.stats.atk_inc.saturating_add(delta);
            true
        } else {
            let mut buff = buff;
            buff.mark_attached();
            for (point, handler) in buff.handlers() {
                self.hooks.subscribe(
                    point,
                    Subscription {
                        unit,
                        buff: id.clone(),
                        handler,
                    },
                );
            }
            let delta = buff.sync_atk_bonus();
            warrior.stats.atk_inc = warrior.stats.atk_inc.saturating_add(delta);
            warrior.insert_buff(buff);
            false
        };

        debug!(%unit, buff = %id, merged, "Buff added");
        self.emit(BattleEvent::BuffAdded {
            unit,
            buff: id.clone(),
            merged,
        });
        self.warriors[unit.index()]
            .buff(&id)
            .ok_or(BattleError::UnknownBuff { unit, buff: id })
    }

    /// Detach and remove a buff, reversing exactly what attaching did.
    pub fn remove_buff(&mut self, unit: UnitId, id: &str) -> Result<Buff> {
        self.require_setup("remove_buff")?;
        self.detach_buff(unit, id)
    }

    fn detach_buff(&mut self, unit: UnitId, id: &str) -> Result<Buff> {
        self.get(unit)?;
        let warrior = &mut self.warriors[unit.index()];
        let mut buff = warrior.take_buff(id).ok_or_else(|| BattleError::UnknownBuff {
            unit,
            buff: id.to_string(),
        })?;

        if buff.mark_detached() {
            for (point, handler) in buff.handlers() {
                self.hooks.unsubscribe(
                    point,
                    &Subscription {
                        unit,
                        buff: buff.id.clone(),
                        handler,
                    },
                );
            }
        }
        let delta = buff.sync_atk_bonus();
        warrior.stats.atk_inc = warrior.stats.atk_inc.saturating_add(delta);

        debug!(%unit, buff = id, "Buff removed");
        self.emit(BattleEvent::BuffRemoved {
            unit,
            buff: buff.id.clone(),
        });
        Ok(buff)
    }

    // --- queries ---

    /// Winning team if exactly one team has living units on the grid, else 0.
    #[must_use]
    pub fn check_end_condition(&self) -> TeamId {
        let mut survivor: Option<TeamId> = None;
        let contested = self.map.scan(|_, occupant| {
            let Some(unit) = occupant.unit() else {
                return ControlFlow::Continue(());
            };
            let warrior = &self.warriors[unit.index()];
            if warrior.is_dead() {
                return ControlFlow::Continue(());
            }
            match survivor {
                None => {
                    survivor = Some(warrior.team);
                    ControlFlow::Continue(())
                }
                Some(team) if team == warrior.team => ControlFlow::Continue(()),
                Some(_) => ControlFlow::Break(()),
            }
        });

        match (contested, survivor) {
            (None, Some(team)) => team,
            _ => 0,
        }
    }

    /// Nearest living enemy of `unit` by Manhattan distance. The first in
    /// row-major order wins ties.
    pub fn nearest_target(&self, unit: UnitId) -> Result<Option<UnitId>> {
        let team = self.get(unit)?.team;
        let from = self.map.locate_unit(unit)?;

        let mut best: Option<(u32, UnitId)> = None;
        for (pos, occupant) in self.map.occupants() {
            let Some(other) = occupant.unit() else { continue };
            let warrior = &self.warriors[other.index()];
            if warrior.team == team || warrior.is_dead() {
                continue;
            }
            let distance = from.manhattan(pos);
            if best.map_or(true, |(d, _)| distance < d) {
                best = Some((distance, other));
            }
        }
        Ok(best.map(|(_, id)| id))
    }

    /// Living, placed warriors of a team in row-major order.
    #[must_use]
    pub fn units_of_team(&self, team: TeamId) -> Vec<UnitId> {
        self.map
            .occupants()
            .filter_map(|(_, o)| o.unit())
            .filter(|u| {
                let w = &self.warriors[u.index()];
                w.team == team && !w.is_dead()
            })
            .collect()
    }

    /// Teammates of `unit`, optionally including itself.
    pub fn team_members(&self, unit: UnitId, including_self: bool) -> Result<Vec<UnitId>> {
        let team = self.get(unit)?.team;
        Ok(self
            .units_of_team(team)
            .into_iter()
            .filter(|u| including_self || *u != unit)
            .collect())
    }

    /// Shortest path for a unit to `to`, limited to its move range.
    pub fn find_path_for(&self, unit: UnitId, to: GridPos) -> Result<Option<Vec<GridPos>>> {
        let warrior = self.get(unit)?;
        let from = self.map.locate_unit(unit)?;
        Ok(find_path(&self.map, from, to, warrior.move_range, warrior.standable))
    }

    /// Cells a unit could reach this round.
    pub fn movable_cells(&self, unit: UnitId) -> Result<Vec<GridPos>> {
        let warrior = self.get(unit)?;
        let from = self.map.locate_unit(unit)?;
        Ok(reachable_cells(&self.map, from, warrior.move_range, warrior.standable))
    }

    /// Hash of everything that determines future outcomes.
    #[must_use]
    pub fn state_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.phase.hash(&mut hasher);
        self.turn.hash(&mut hasher);
        self.winner.hash(&mut hasher);
        self.prepared.hash(&mut hasher);
        self.rng.draws().hash(&mut hasher);
        self.warriors.hash(&mut hasher);
        self.map.hash(&mut hasher);
        self.hooks.hash(&mut hasher);
        hasher.finish()
    }

    // --- selection ---

    /// Currently selected unit.
    #[must_use]
    pub const fn current_unit(&self) -> Option<UnitId> {
        self.current_unit
    }

    /// Change the selected unit and notify selection listeners if it changed.
    pub fn select_unit(&mut self, unit: Option<UnitId>) {
        if self.current_unit == unit {
            return;
        }
        let change = SelectionChanged {
            previous: self.current_unit,
            current: unit,
        };
        self.current_unit = unit;
        self.selection.publish(&change);
    }

    /// Subscribe to selection changes.
    pub fn on_selection_changed(
        &mut self,
        listener: impl FnMut(&SelectionChanged) + 'static,
    ) -> ListenerId {
        self.selection.subscribe(listener)
    }

    // --- commands ---

    /// Validate and run a command from `player`.
    ///
    /// On success the command is appended to the log and the events it
    /// produced are returned, in emission order.
    ///
    /// # Errors
    ///
    /// Any precondition failure. The battle is unchanged in that case.
    pub fn apply(&mut self, player: TeamId, command: Command) -> Result<Vec<BattleEvent>> {
        let op = command.opcode();
        self.pending.clear();

        let outcome = self.check_player(player, op).and_then(|()| match &command {
            Command::ExchangePositions { from, to } => self.exchange_positions(player, *from, *to),
            Command::PlayerPrepared => self.player_prepared(player),
            Command::StartNextRound => self.start_next_round(player),
            Command::MoveOnPath { unit, path } => self.move_on_path(player, *unit, path),
            Command::Attack { attacker, target } => self.attack(player, *attacker, *target),
            Command::CastSkill {
                caster,
                skill,
                target,
            } => self.cast_skill(player, *caster, skill, *target),
            Command::ActionDone => self.action_done(player),
        });

        if let Err(err) = outcome {
            error!(player, op, %err, "Command rejected");
            self.pending.clear();
            return Err(err);
        }

        debug!(player, op, seq = self.log.len(), "Command applied");
        self.log.push(CommandRecord {
            seq: self.log.len() as u64,
            player,
            command,
        });

        if self.phase == BattlePhase::InProgress {
            let winner = self.check_end_condition();
            if winner != 0 {
                self.phase = BattlePhase::Ended;
                self.winner = winner;
                info!(winner, turn = self.turn, "Battle ended");
                self.emit(BattleEvent::BattleEnded { winner });
            }
        }

        #[cfg(feature = "debug-validation")]
        debug_assert!(self.map.ids_are_unique(), "map holds a duplicate object id");
        #[cfg(debug_assertions)]
        debug!(hash = self.state_hash(), "State after command");

        Ok(std::mem::take(&mut self.pending))
    }

    fn check_player(&self, player: TeamId, op: &'static str) -> Result<()> {
        if !self.players.contains(&player) {
            return Err(BattleError::UnknownPlayer(player));
        }
        if self.phase == BattlePhase::Ended {
            return Err(BattleError::InvalidPhase {
                op,
                phase: self.phase,
            });
        }
        Ok(())
    }

    fn require_phase(&self, op: &'static str, phase: BattlePhase) -> Result<()> {
        if self.phase == phase {
            Ok(())
        } else {
            Err(BattleError::InvalidPhase {
                op,
                phase: self.phase,
            })
        }
    }

    /// A living, placed unit owned by `player`. Returns its cell.
    fn controlled_unit(&self, player: TeamId, unit: UnitId) -> Result<GridPos> {
        let warrior = self.get(unit)?;
        if warrior.team != player {
            return Err(BattleError::NotOwner { player, unit });
        }
        if warrior.is_dead() {
            return Err(BattleError::UnitDead(unit));
        }
        self.map.locate_unit(unit)
    }

    /// A living, placed unit (any owner). Returns its cell.
    fn living_unit(&self, unit: UnitId) -> Result<GridPos> {
        if self.get(unit)?.is_dead() {
            return Err(BattleError::UnitDead(unit));
        }
        self.map.locate_unit(unit)
    }

    fn emit(&mut self, event: BattleEvent) {
        self.events.publish(&event);
        self.pending.push(event);
    }

    fn exchange_positions(&mut self, player: TeamId, from: GridPos, to: GridPos) -> Result<()> {
        self.require_phase("exchange_positions", BattlePhase::Preparing)?;
        for pos in [from, to] {
            if !self.map.in_bounds(pos) {
                return Err(BattleError::OutOfBounds(pos));
            }
        }

        let mut moving = Vec::new();
        for (cell, dest) in [(from, to), (to, from)] {
            let Some(occupant) = self.map.at(cell) else { continue };
            let Some(unit) = occupant.unit() else {
                return Err(BattleError::NoUnitAt(cell));
            };
            let warrior = self.get(unit)?;
            if warrior.team != player {
                return Err(BattleError::NotOwner { player, unit });
            }
            let accepted = self
                .map
                .tile(dest)
                .is_some_and(|t| t.accepts(warrior.standable));
            if !accepted {
                return Err(BattleError::InvalidPath {
                    unit,
                    reason: format!("cannot stand on {dest}"),
                });
            }
            moving.push(unit);
        }
        if moving.is_empty() {
            return Err(BattleError::NoUnitAt(from));
        }

        let args = HookArgs::Exchange { from, to };
        self.run_hooks(Stage::Before, HookKind::ExchangePositions, args);
        self.map.exchange(from, to)?;
        self.run_hooks(Stage::After, HookKind::ExchangePositions, args);

        self.emit(BattleEvent::PositionExchanged { from, to });
        Ok(())
    }

    fn player_prepared(&mut self, player: TeamId) -> Result<()> {
        self.require_phase("player_prepared", BattlePhase::Preparing)?;

        let args = HookArgs::Player(player);
        self.run_hooks(Stage::Before, HookKind::PlayerPrepared, args);
        self.prepared.insert(player);
        self.run_hooks(Stage::After, HookKind::PlayerPrepared, args);

        self.emit(BattleEvent::PlayerPrepared { player });

        if self.players.iter().all(|p| self.prepared.contains(p)) {
            self.phase = BattlePhase::InProgress;
            info!(players = ?self.players, "All players prepared, battle in progress");
            self.emit(BattleEvent::BattleStarted);
        }
        Ok(())
    }

    fn start_next_round(&mut self, player: TeamId) -> Result<()> {
        self.require_phase("start_next_round", BattlePhase::InProgress)?;

        let args = HookArgs::Player(player);
        self.run_hooks(Stage::Before, HookKind::StartNextRound, args);
        for warrior in self.warriors.iter_mut().filter(|w| w.team == player) {
            warrior.moved = false;
            warrior.action_done = false;
        }
        self.turn += 1;
        self.run_hooks(Stage::After, HookKind::StartNextRound, args);

        info!(player, turn = self.turn, "Round started");
        self.emit(BattleEvent::RoundStarted {
            player,
            turn: self.turn,
        });
        Ok(())
    }

    fn move_on_path(&mut self, player: TeamId, unit: UnitId, path: &[GridPos]) -> Result<()> {
        self.require_phase("move_on_path", BattlePhase::InProgress)?;
        let start = self.controlled_unit(player, unit)?;
        let warrior = self.get(unit)?;
        if warrior.moved {
            return Err(BattleError::AlreadyMoved(unit));
        }

        let (&first, steps) = path.split_first().ok_or_else(|| BattleError::InvalidPath {
            unit,
            reason: "path is empty".into(),
        })?;
        if first != start {
            return Err(BattleError::PathStartMismatch {
                unit,
                expected: first,
                actual: start,
            });
        }
        if steps.len() > warrior.move_range as usize {
            return Err(BattleError::InvalidPath {
                unit,
                reason: format!(
                    "{} steps exceed move range {}",
                    steps.len(),
                    warrior.move_range
                ),
            });
        }
        if let Some(pair) = path.windows(2).find(|w| !w[0].is_adjacent(w[1])) {
            return Err(BattleError::InvalidPath {
                unit,
                reason: format!("{} -> {} is not a single step", pair[0], pair[1]),
            });
        }

        let standable = warrior.standable;
        self.warriors[unit.index()].set_moving_path(path.to_vec());

        let args = HookArgs::Unit(unit);
        self.run_hooks(Stage::Before, HookKind::MoveOnPath, args);

        let mut realized = vec![start];
        let mut current = start;
        for &next in steps {
            if self.map.blocked(next, standable) {
                warn!(%unit, at = %current, blocked = %next, "Move cut short");
                break;
            }
            self.map.exchange(current, next)?;
            realized.push(next);
            current = next;
        }
        let warrior = &mut self.warriors[unit.index()];
        warrior.moved = true;
        warrior.clear_moving_path();

        self.run_hooks(Stage::After, HookKind::MoveOnPath, args);

        self.emit(BattleEvent::MovedOnPath {
            unit,
            path: realized,
        });
        Ok(())
    }

    /// Validate attacker/target for a damaging action. Returns the target cell.
    fn check_strike(
        &self,
        player: TeamId,
        attacker: UnitId,
        target: UnitId,
        range: &[u32],
    ) -> Result<GridPos> {
        let from = self.controlled_unit(player, attacker)?;
        if self.get(attacker)?.action_done {
            return Err(BattleError::ActionAlreadyDone(attacker));
        }
        let to = self.living_unit(target)?;
        if self.get(target)?.team == player {
            return Err(BattleError::FriendlyTarget { attacker, target });
        }
        if !range.contains(&from.manhattan(to)) {
            return Err(BattleError::TargetOutOfRange { unit: attacker, target: to });
        }
        Ok(to)
    }

    fn attack(&mut self, player: TeamId, attacker: UnitId, target: UnitId) -> Result<()> {
        self.require_phase("attack", BattlePhase::InProgress)?;
        let range = self.get(attacker)?.attack_range.clone();
        self.check_strike(player, attacker, target, &range)?;

        let args = HookArgs::Strike { attacker, target };
        self.run_hooks(Stage::Before, HookKind::Attack, args);
        let power = self.warriors[attacker.index()].basic_attack_value();
        let report = self.deal_damage(attacker, target, power);
        self.warriors[attacker.index()].action_done = true;
        self.run_hooks(Stage::After, HookKind::Attack, args);

        debug!(%attacker, %target, power = report.power, critical = report.critical, "Attack resolved");
        self.emit(BattleEvent::Attacked {
            attacker,
            target,
            report,
        });
        self.resolve_death(target)
    }

    /// Roll crit and apply damage, shield first.
    fn deal_damage(&mut self, attacker: UnitId, target: UnitId, power: i32) -> DamageReport {
        let crit = self.warriors[attacker.index()].stats.crit;
        let critical = crit > 0 && self.rng.roll_percent(crit);
        let power = if critical { power.saturating_mul(2) } else { power };
        self.warriors[target.index()].absorb_damage(power, critical)
    }

    fn resolve_death(&mut self, unit: UnitId) -> Result<()> {
        if !self.warriors[unit.index()].is_dead() {
            return Ok(());
        }
        let at = self.map.locate_unit(unit)?;
        info!(%unit, %at, "Warrior died");
        self.emit(BattleEvent::Died { unit, at });
        self.lift_warrior(unit)?;
        Ok(())
    }

    fn cast_skill(
        &mut self,
        player: TeamId,
        caster: UnitId,
        skill_id: &str,
        target: GridPos,
    ) -> Result<()> {
        self.require_phase("cast_skill", BattlePhase::InProgress)?;
        let from = self.controlled_unit(player, caster)?;
        let warrior = self.get(caster)?;
        if warrior.action_done {
            return Err(BattleError::ActionAlreadyDone(caster));
        }
        let skill = warrior
            .active_skill(skill_id)
            .cloned()
            .ok_or_else(|| BattleError::UnknownSkill {
                unit: caster,
                skill: skill_id.to_string(),
            })?;
        let range = if skill.range.is_empty() {
            warrior.attack_range.clone()
        } else {
            skill.range.clone()
        };
        if !self.map.in_bounds(target) {
            return Err(BattleError::OutOfBounds(target));
        }
        let receiver = self.map.unit_at(target).ok_or(BattleError::NoUnitAt(target))?;

        if skill.kind.is_offensive() {
            self.check_strike(player, caster, receiver, &range)?;
        } else {
            if !range.contains(&from.manhattan(target)) {
                return Err(BattleError::TargetOutOfRange { unit: caster, target });
            }
            self.living_unit(receiver)?;
            if self.get(receiver)?.team != player {
                return Err(BattleError::NotOwner {
                    player,
                    unit: receiver,
                });
            }
        }

        let args = HookArgs::Strike {
            attacker: caster,
            target: receiver,
        };
        self.run_hooks(Stage::Before, HookKind::CastSkill, args);

        let outcome = match skill.kind {
            ActiveSkillKind::BasicAttack => {
                let power = self.warriors[caster.index()].basic_attack_value();
                let report = self.deal_damage(caster, receiver, power);
                BattleEvent::Attacked {
                    attacker: caster,
                    target: receiver,
                    report,
                }
            }
            ActiveSkillKind::Strike { percent } => {
                let base = self.warriors[caster.index()].basic_attack_value();
                let percent = i32::try_from(percent).unwrap_or(i32::MAX);
                let power = base.saturating_mul(percent) / 100;
                let report = self.deal_damage(caster, receiver, power);
                BattleEvent::Attacked {
                    attacker: caster,
                    target: receiver,
                    report,
                }
            }
            ActiveSkillKind::Heal { amount } => BattleEvent::Healed {
                unit: receiver,
                amount: self.warriors[receiver.index()].restore_hp(amount),
            },
            ActiveSkillKind::Fortify { amount } => BattleEvent::Shielded {
                unit: receiver,
                amount: self.warriors[receiver.index()].restore_es(amount),
            },
        };
        self.warriors[caster.index()].action_done = true;

        self.run_hooks(Stage::After, HookKind::CastSkill, args);

        debug!(%caster, skill = skill_id, %target, "Skill cast");
        self.emit(BattleEvent::SkillCast {
            caster,
            skill: skill.id,
            target,
        });
        self.emit(outcome);
        self.resolve_death(receiver)
    }

    fn action_done(&mut self, player: TeamId) -> Result<()> {
        self.require_phase("action_done", BattlePhase::InProgress)?;

        let args = HookArgs::Player(player);
        self.run_hooks(Stage::Before, HookKind::ActionDone, args);
        self.run_hooks(Stage::After, HookKind::ActionDone, args);

        self.emit(BattleEvent::ActionDone { player });
        Ok(())
    }

    // --- hook dispatch ---

    fn run_hooks(&mut self, stage: Stage, kind: HookKind, args: HookArgs) {
        let point = HookPoint::new(stage, kind);
        // Handlers may detach buffs, so iterate over a snapshot and skip
        // subscriptions removed along the way.
        let subscribers = self.hooks.subscribers(point).to_vec();
        for subscription in subscribers {
            if !self.hooks.is_subscribed(point, &subscription) {
                continue;
            }
            trace!(?point, unit = %subscription.unit, buff = %subscription.buff, handler = ?subscription.handler, "Hook");
            self.dispatch(&subscription, args);
        }
    }

    fn dispatch(&mut self, subscription: &Subscription, args: HookArgs) {
        let unit = subscription.unit;
        let Some(owner) = self.warriors.get(unit.index()) else {
            return;
        };
        if owner.is_dead() {
            return;
        }
        let owner_team = owner.team;
        let Some(buff) = owner.buff(&subscription.buff) else {
            return;
        };
        let stacks = i32::try_from(buff.stacks()).unwrap_or(i32::MAX);
        let effect = buff.effect;

        match (subscription.handler, args) {
            (Handler::CountDown, HookArgs::Player(player)) if player == owner_team => {
                let expired = self.warriors[unit.index()]
                    .buff_mut(&subscription.buff)
                    .is_some_and(Buff::tick_down);
                if expired {
                    if let Err(err) = self.detach_buff(unit, &subscription.buff) {
                        error!(%unit, buff = %subscription.buff, %err, "Failed to expire buff");
                    }
                }
            }
            (Handler::ResetShield, HookArgs::Player(team)) => {
                for warrior in self
                    .warriors
                    .iter_mut()
                    .filter(|w| w.team == team && !w.is_dead())
                {
                    warrior.es = 0;
                }
            }
            (Handler::ShieldRegen, HookArgs::Player(team)) if team == owner_team => {
                if let BuffEffect::ShieldRegen { amount } = effect {
                    self.warriors[unit.index()].restore_es(amount.saturating_mul(stacks));
                }
            }
            _ => {}
        }
    }
}
