//! One game session on one client.
//!
//! `Session` owns every component of the simulation and is advanced by a
//! single [`Session::tick`] call per frame. Player actions come in through
//! the `request_*`/`confirm_*` methods, remote results through
//! [`Session::apply_remote`](crate::replication), and everything the session
//! wants to broadcast or show is queued for the caller to drain.

use crate::base::{BaseIdAllocator, TowerBase};
use crate::config::SessionConfig;
use crate::economy::Economy;
use crate::enemy::SkillEvent;
use crate::events::{EventQueue, FloatingText, GameEvent, SoundKey};
use crate::grid::{ActorToken, GridArbiter, GridOwner};
use crate::projectile::Projectile;
use crate::registry::{EnemyKey, EntityRegistry};
use crate::replication::Outbox;
use crate::route::{default_lines, Line};
use crate::spawner::EnemySpawner;
use crate::tower::Tower;
use crate::wave::{generate_waves, WaveContext, WaveScheduler, WaveSignal};
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use shared::{
    BaseNetId, BossSkill, EnemyDamage, GameStart, GameTimescale, PlayerIndex, SpawnerId,
    TowerBasePlace, TowerCreate, TowerId, TowerKind, TowerLabUpgrade, TowerMove, Vec3,
    WireMessage,
};
use std::collections::BTreeMap;

pub const BUILD_TOKEN: ActorToken = ActorToken(1);
pub const MOVE_TOKEN: ActorToken = ActorToken(2);

/// What the local player last clicked, resolved once when selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    Base(BaseNetId),
    Tower(TowerId),
    Enemy(EnemyKey),
    Lab,
}

pub struct Session {
    pub(crate) config: SessionConfig,
    pub(crate) registry: EntityRegistry,
    pub(crate) schedulers: BTreeMap<SpawnerId, WaveScheduler>,
    pub(crate) lines: Vec<Line>,
    pub(crate) grid: GridArbiter,
    pub(crate) economy: Economy,
    pub(crate) base_ids: BaseIdAllocator,
    pub(crate) projectiles: Vec<Projectile>,
    pub(crate) outbox: Outbox,
    pub(crate) events: EventQueue,
    pub(crate) rng: StdRng,
    pub(crate) kill_rewards: BTreeMap<EnemyKey, i64>,
    /// Highest lab level heard from each remote player, per tower kind.
    pub(crate) remote_labs: BTreeMap<(PlayerIndex, TowerKind), i32>,
    selection: Option<Selection>,
    build_mode: bool,
    moving_base: Option<BaseNetId>,
    pointer: Option<Vec3>,
    time_scale: f32,
    match_start: Option<f64>,
}

impl Session {
    pub fn new(config: SessionConfig) -> Self {
        let local = config.local_player;
        let lines = default_lines(config.player_count);

        let mut registry = EntityRegistry::new();
        for (index, line) in lines.iter().enumerate() {
            let id = index as SpawnerId;
            let mut spawner = EnemySpawner::new(
                id,
                id,
                line.spawner_position,
                line.forward,
                config.spawn_interval,
                config.spawn_distance,
            );
            spawner.armor = config.difficulty.enemy_armor();
            registry.spawners.insert(id, spawner);
        }

        let mut schedulers = BTreeMap::new();
        schedulers.insert(
            local,
            WaveScheduler::new(
                local,
                local,
                generate_waves(config.total_waves),
                config.wave_rest,
                config.wave_time_limit,
                config.max_death_count,
            ),
        );

        info!(
            "Session for player {} of {} on {:?}",
            local, config.player_count, config.difficulty
        );

        Self {
            grid: GridArbiter::new(config.grid_size),
            economy: Economy::new(config.starting_gold),
            base_ids: BaseIdAllocator::new(local),
            rng: StdRng::seed_from_u64(config.seed),
            registry,
            schedulers,
            lines,
            projectiles: Vec::new(),
            outbox: Outbox::default(),
            events: EventQueue::new(),
            kill_rewards: BTreeMap::new(),
            remote_labs: BTreeMap::new(),
            selection: None,
            build_mode: false,
            moving_base: None,
            pointer: None,
            time_scale: 1.0,
            match_start: None,
            config,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn local_player(&self) -> PlayerIndex {
        self.config.local_player
    }

    pub fn is_local(&self, owner: PlayerIndex) -> bool {
        owner == self.config.local_player
    }

    pub fn registry(&self) -> &EntityRegistry {
        &self.registry
    }

    pub fn grid(&self) -> &GridArbiter {
        &self.grid
    }

    pub fn economy(&self) -> &Economy {
        &self.economy
    }

    pub fn scheduler(&self, spawner_id: SpawnerId) -> Option<&WaveScheduler> {
        self.schedulers.get(&spawner_id)
    }

    pub fn projectiles(&self) -> &[Projectile] {
        &self.projectiles
    }

    pub fn selection(&self) -> Option<Selection> {
        self.selection
    }

    pub fn is_build_mode(&self) -> bool {
        self.build_mode
    }

    pub fn is_move_mode(&self) -> bool {
        self.moving_base.is_some()
    }

    pub fn time_scale(&self) -> f32 {
        self.time_scale
    }

    pub fn is_started(&self) -> bool {
        self.match_start.is_some()
    }

    pub fn match_start(&self) -> Option<f64> {
        self.match_start
    }

    pub fn drain_outbox(&mut self) -> Vec<WireMessage> {
        self.outbox.drain()
    }

    pub fn drain_events(&mut self) -> Vec<GameEvent> {
        self.events.drain()
    }

    pub(crate) fn broadcast(&mut self, message: WireMessage) {
        self.outbox.push(message);
    }

    pub(crate) fn emit(&mut self, event: GameEvent) {
        self.events.push(event);
    }

    fn notice(&mut self, text: &str) {
        debug!("{}", text);
        self.emit(GameEvent::Notice(text.to_string()));
    }

    pub fn status_line(&self) -> String {
        let local = self.config.local_player;
        let (wave, deaths) = self
            .schedulers
            .get(&local)
            .map(|s| (s.current_wave_index() + 1, s.death_count()))
            .unwrap_or((0, 0));
        format!(
            "gold {} | wave {} | alive {}/{} | enemies {} | towers {} | bases {} | x{}",
            self.economy.gold(),
            wave,
            deaths,
            self.config.max_death_count,
            self.registry.enemy_count(),
            self.registry.towers.len(),
            self.registry.bases.len(),
            self.time_scale
        )
    }

    // ---- match lifecycle ----

    /// Host only: announces the match start and starts it locally.
    pub fn broadcast_game_start(&mut self, start_unix: f64) -> bool {
        if self.config.local_player != 0 {
            self.notice("Only the host can start the match");
            return false;
        }
        if self.is_started() {
            return false;
        }
        self.broadcast(WireMessage::GameStart(GameStart { start_unix }));
        self.start_match(start_unix);
        true
    }

    pub(crate) fn start_match(&mut self, start_unix: f64) {
        if self.match_start.is_some() {
            debug!("Match already started, ignoring start at {}", start_unix);
            return;
        }
        info!("Match started at {}", start_unix);
        self.match_start = Some(start_unix);
        self.emit(GameEvent::MatchStarted { start_unix });
    }

    /// Drops the cursor reservation and anything in flight. Called on exit.
    pub fn shutdown(&mut self) {
        self.grid.force_release();
        self.build_mode = false;
        self.moving_base = None;
        self.projectiles.clear();
    }

    // ---- simulation ----

    pub fn tick(&mut self, dt: f32) {
        let dt = dt * self.time_scale;

        self.grid.update_cursor(self.pointer, &self.registry);
        if self.is_started() {
            self.run_waves(dt);
        }
        self.run_spawners(dt);
        self.run_enemies(dt);
        self.update_ranges();
        self.run_towers(dt);
        self.run_projectiles(dt);
        self.resolve_deaths();
    }

    fn run_waves(&mut self, dt: f32) {
        let context = WaveContext {
            stats: &self.config.wave_stats,
            health_multiplier: self.config.difficulty.health_multiplier(),
        };
        let mut fired = Vec::new();
        for (spawner_id, scheduler) in self.schedulers.iter_mut() {
            let Some(spawner) = self.registry.spawners.get_mut(spawner_id) else {
                continue;
            };
            for signal in scheduler.tick(dt, spawner, &context) {
                fired.push((*spawner_id, signal));
            }
        }

        for (spawner_id, signal) in fired {
            match signal {
                WaveSignal::Started {
                    wave_index,
                    announce,
                } => {
                    if let Some(announce) = announce {
                        self.broadcast(WireMessage::WaveStart(announce));
                    }
                    self.emit(GameEvent::WaveStarted {
                        spawner_id,
                        wave_index,
                    });
                }
                WaveSignal::Completed => self.emit(GameEvent::WaveEnded {
                    spawner_id,
                    timed_out: false,
                }),
                WaveSignal::TimedOut => self.emit(GameEvent::WaveEnded {
                    spawner_id,
                    timed_out: true,
                }),
                WaveSignal::Defeated => self.emit(GameEvent::LineDefeated { spawner_id }),
            }
        }
    }

    fn run_spawners(&mut self, dt: f32) {
        let local = self.config.local_player;
        let mut spawned = Vec::new();
        for (spawner_id, spawner) in self.registry.spawners.iter_mut() {
            if spawner.owner_index != local {
                continue;
            }
            let defeated = self
                .schedulers
                .get(spawner_id)
                .map(|scheduler| scheduler.is_defeated())
                .unwrap_or(false);
            if defeated {
                if spawner.queue_len() > 0 {
                    debug!("Line {} is over, discarding its spawn queue", spawner_id);
                    spawner.clear_queue();
                }
                continue;
            }
            if let Some(kind) = spawner.tick(dt) {
                spawned.push(spawner.spawn_local(kind));
            }
        }

        for (enemy, message) in spawned {
            let spawner_id = enemy.spawner_id;
            let event = GameEvent::EnemySpawned {
                spawner_id,
                enemy_id: enemy.id,
                kind: enemy.kind,
            };
            if !self.registry.insert_enemy(enemy) {
                warn!("Spawner {} reused enemy id {}", spawner_id, message.enemy_id);
                continue;
            }
            self.broadcast(WireMessage::EnemySpawn(message));
            self.emit(event);
            let defeated = self
                .schedulers
                .get_mut(&spawner_id)
                .map(|scheduler| scheduler.increment_death_count())
                .unwrap_or(false);
            if defeated {
                self.emit(GameEvent::LineDefeated { spawner_id });
            }
        }
    }

    fn run_enemies(&mut self, dt: f32) {
        let mut reports = Vec::new();
        for (key, enemy) in self.registry.enemies.iter_mut() {
            let Some(line) = self.lines.get(key.spawner_id as usize) else {
                continue;
            };
            let report = enemy.tick(dt, line);
            reports.push((*key, enemy.position, report));
        }

        for (key, position, report) in reports {
            if let Some((gained, hp)) = report.healed {
                self.broadcast(WireMessage::EnemyDamage(EnemyDamage {
                    enemy_id: key.enemy_id,
                    spawner_id: key.spawner_id,
                    remaining_hp: hp,
                }));
                self.emit(GameEvent::FloatingText {
                    at: position,
                    text: FloatingText::Heal(gained),
                });
            }
            if report.invincible == Some(true) {
                self.emit(GameEvent::FloatingText {
                    at: position,
                    text: FloatingText::Invincible,
                });
            }
            match report.skill {
                Some(SkillEvent::Started {
                    origin,
                    forward,
                    grow_duration,
                    max_depth,
                }) => {
                    info!("Boss {:?} started its skill", key);
                    self.broadcast(WireMessage::BossSkill(BossSkill {
                        spawner_id: key.spawner_id,
                        enemy_id: key.enemy_id,
                        start: true,
                        pos: origin,
                        fwd: forward,
                        grow_duration,
                        max_depth,
                    }));
                    self.emit(GameEvent::BossSkillStarted {
                        spawner_id: key.spawner_id,
                        enemy_id: key.enemy_id,
                    });
                }
                Some(SkillEvent::Finished(strip)) => {
                    self.silence_strip(strip);
                    self.broadcast(WireMessage::BossSkill(BossSkill {
                        spawner_id: key.spawner_id,
                        enemy_id: key.enemy_id,
                        start: false,
                        ..BossSkill::default()
                    }));
                    self.emit(GameEvent::BossSkillFinished {
                        spawner_id: key.spawner_id,
                        enemy_id: key.enemy_id,
                    });
                }
                None => {}
            }
        }
    }

    /// Removes dead enemies and settles the line's live count.
    fn resolve_deaths(&mut self) {
        let dead: Vec<EnemyKey> = self
            .registry
            .enemies
            .iter()
            .filter(|(_, enemy)| enemy.is_dead())
            .map(|(key, _)| *key)
            .collect();

        for key in dead {
            self.registry.remove_enemy(key);
            if let Some(scheduler) = self.schedulers.get_mut(&key.spawner_id) {
                scheduler.decrement_death_count();
            }
            let awarded_gold = self.kill_rewards.remove(&key);
            self.emit(GameEvent::EnemyDied {
                spawner_id: key.spawner_id,
                enemy_id: key.enemy_id,
                awarded_gold,
            });
        }
    }

    // ---- player actions ----

    /// Enters or leaves build mode. Denied while a move holds the cursor.
    pub fn request_build_toggle(&mut self) -> bool {
        if self.build_mode {
            self.end_build_mode();
            return true;
        }
        if self.grid.owner() == GridOwner::Move {
            self.notice("Finish moving the base before building");
            return false;
        }
        if !self.grid.begin_reservation(GridOwner::Build, BUILD_TOKEN) {
            self.notice("Placement cursor is busy");
            return false;
        }
        self.build_mode = true;
        self.emit(GameEvent::Sound(SoundKey::UiClick));
        self.emit(GameEvent::CursorChanged { active: true });
        true
    }

    fn end_build_mode(&mut self) {
        if !self.build_mode {
            return;
        }
        self.build_mode = false;
        if self.grid.end_reservation(BUILD_TOKEN) {
            self.emit(GameEvent::CursorChanged { active: false });
        }
    }

    /// Starts relocating the selected base, or stops an ongoing move.
    pub fn request_move_toggle(&mut self) -> bool {
        if self.moving_base.is_some() {
            self.end_move_mode();
            return true;
        }
        let base_id = match self.selection {
            Some(Selection::Base(id)) => id,
            Some(Selection::Tower(id)) => match self.registry.towers.get(&id) {
                Some(tower) => tower.base_net_id,
                None => {
                    self.notice("Select a base to move");
                    return false;
                }
            },
            _ => {
                self.notice("Select a base to move");
                return false;
            }
        };
        let owned = self
            .registry
            .bases
            .get(&base_id)
            .map(|base| self.is_local(base.owner_index))
            .unwrap_or(false);
        if !owned {
            self.notice("Only your own bases can be moved");
            return false;
        }

        self.end_build_mode();
        if !self.grid.begin_reservation(GridOwner::Move, MOVE_TOKEN) {
            self.notice("Placement cursor is busy");
            return false;
        }
        self.moving_base = Some(base_id);
        self.emit(GameEvent::CursorChanged { active: true });
        true
    }

    fn end_move_mode(&mut self) {
        if self.moving_base.take().is_none() {
            return;
        }
        if self.grid.end_reservation(MOVE_TOKEN) {
            self.emit(GameEvent::CursorChanged { active: false });
        }
    }

    /// Latest ground point under the pointer.
    pub fn point_at(&mut self, point: Vec3) {
        self.pointer = Some(point);
    }

    pub fn clear_pointer(&mut self) {
        self.pointer = None;
    }

    /// Places a base in build mode or drops the moving base. The cursor must
    /// be on a buildable cell.
    pub fn confirm_placement(&mut self) -> bool {
        self.grid.update_cursor(self.pointer, &self.registry);
        if !self.build_mode && self.moving_base.is_none() {
            return false;
        }
        let position = match self.grid.cursor_position() {
            Some(position) if self.grid.is_buildable_position() => position,
            _ => {
                self.notice("Cannot place here");
                return false;
            }
        };

        // the cursor holds still until the placement resolves
        self.grid.lock_cursor();
        let placed = match self.moving_base {
            Some(base_id) => self.finish_move(base_id, position),
            None => self.place_base(position),
        };
        self.grid.unlock_cursor();
        placed
    }

    fn place_base(&mut self, position: Vec3) -> bool {
        if !self.economy.spend(self.config.base_cost) {
            self.notice("Not enough gold for a base");
            return false;
        }
        let owner_index = self.config.local_player;
        let base_net_id = self.base_ids.allocate();
        self.registry
            .bases
            .insert(base_net_id, TowerBase::new(base_net_id, owner_index, position));
        debug!("Placed base {} at {:?}", base_net_id, position);

        self.broadcast(WireMessage::TowerBasePlace(TowerBasePlace {
            owner_index,
            base_net_id,
            position,
        }));
        self.emit(GameEvent::Sound(SoundKey::Build));
        self.emit(GameEvent::BasePlaced {
            owner_index,
            base_net_id,
        });
        self.emit(GameEvent::GoldChanged(self.economy.gold()));
        true
    }

    fn finish_move(&mut self, base_id: BaseNetId, target: Vec3) -> bool {
        let Some(base) = self.registry.bases.get_mut(&base_id) else {
            warn!("Moving base {} no longer exists", base_id);
            self.end_move_mode();
            return false;
        };
        base.position.x = target.x;
        base.position.z = target.z;
        let base_position = base.position;

        let tower = base.tower.and_then(|id| self.registry.towers.get_mut(&id));
        let has_tower = tower.is_some();
        let tower_position = match tower {
            Some(tower) => {
                tower.position.x = target.x;
                tower.position.z = target.z;
                tower.position
            }
            None => Vec3::ZERO,
        };

        self.broadcast(WireMessage::TowerMove(TowerMove {
            owner_index: self.config.local_player,
            base_net_id: base_id,
            base_position,
            has_tower,
            tower_position,
        }));
        self.emit(GameEvent::BaseMoved {
            base_net_id: base_id,
        });
        self.end_move_mode();
        true
    }

    /// Leaves whichever placement mode is active and clears the selection.
    pub fn cancel_action(&mut self) {
        self.end_move_mode();
        self.end_build_mode();
        self.selection = None;
    }

    pub fn select(&mut self, selection: Selection) -> bool {
        let exists = match selection {
            Selection::Base(id) => self.registry.bases.contains_key(&id),
            Selection::Tower(id) => self.registry.towers.contains_key(&id),
            Selection::Enemy(key) => self.registry.enemies.contains_key(&key),
            Selection::Lab => true,
        };
        if !exists {
            self.notice("Nothing to select there");
            return false;
        }
        if selection == Selection::Lab {
            self.end_build_mode();
        }
        self.selection = Some(selection);
        self.emit(GameEvent::Sound(SoundKey::UiClick));
        true
    }

    /// Builds a tower of `kind` on the selected base.
    pub fn create_tower(&mut self, kind: TowerKind) -> bool {
        match self.selection {
            Some(Selection::Base(base_id)) => self.build_tower(base_id, kind),
            _ => {
                self.notice("Select a base first");
                false
            }
        }
    }

    pub fn build_tower(&mut self, base_id: BaseNetId, kind: TowerKind) -> bool {
        let Some(base) = self.registry.bases.get(&base_id) else {
            self.notice("Unknown base");
            return false;
        };
        if !self.is_local(base.owner_index) {
            self.notice("That base belongs to another player");
            return false;
        }
        if base.has_tower() {
            self.notice("This base already carries a tower");
            return false;
        }
        let position = base.position;

        let cost = self.economy.build_cost(kind);
        if !self.economy.spend(cost) {
            self.notice("Not enough gold for that tower");
            return false;
        }
        self.economy.record_build(kind);

        let owner_index = self.config.local_player;
        let level = self.economy.lab_level(kind).max(1);
        let tower = Tower::new(
            base_id,
            owner_index,
            kind,
            base_id,
            position,
            level,
            self.config.tower_range,
            &self.config.tower_upgrades,
        );
        self.registry.towers.insert(base_id, tower);
        if let Some(base) = self.registry.bases.get_mut(&base_id) {
            base.tower = Some(base_id);
        }
        info!("Built {:?} level {} on base {} for {}", kind, level, base_id, cost);

        self.broadcast(WireMessage::TowerCreate(TowerCreate {
            owner_index,
            base_net_id: base_id,
            tower_type: kind,
            level,
        }));
        self.emit(GameEvent::Sound(SoundKey::Build));
        self.emit(GameEvent::TowerBuilt {
            tower_id: base_id,
            kind,
            level,
        });
        self.emit(GameEvent::GoldChanged(self.economy.gold()));
        true
    }

    /// Buys the next lab level for `kind` and re-stats the local towers.
    pub fn upgrade_lab(&mut self, kind: TowerKind) -> bool {
        let next = self.economy.lab_level(kind) + 1;
        let Some(row) = self.config.tower_upgrades.level(next).copied() else {
            self.notice("Lab is already at its highest level");
            return false;
        };
        let cost = row.cost(kind).max(0.0) as i64;
        if !self.economy.spend(cost) {
            self.notice("Not enough gold for the upgrade");
            return false;
        }
        self.economy.set_lab_level(kind, next);

        let owner_index = self.config.local_player;
        for tower in self.registry.towers.values_mut() {
            if tower.owner_index == owner_index && tower.kind == kind {
                tower.apply_upgrade(next, &self.config.tower_upgrades);
            }
        }

        self.broadcast(WireMessage::TowerLabUpgrade(TowerLabUpgrade {
            owner_index,
            tower_type: kind,
            level: next,
        }));
        self.emit(GameEvent::LabUpgraded {
            owner_index,
            kind,
            level: next,
        });
        self.emit(GameEvent::GoldChanged(self.economy.gold()));
        true
    }

    /// Host only: flips between normal and double speed for everyone.
    pub fn toggle_timescale(&mut self) -> bool {
        if self.config.local_player != 0 {
            self.notice("Only the host can change the game speed");
            return false;
        }
        let scale = if self.time_scale > 1.0 { 1.0 } else { 2.0 };
        self.set_time_scale(scale);
        self.broadcast(WireMessage::GameTimescale(GameTimescale { scale }));
        true
    }

    pub(crate) fn set_time_scale(&mut self, scale: f32) {
        self.time_scale = if scale <= 1.0 { 1.0 } else { 2.0 };
        self.emit(GameEvent::TimeScaleChanged(self.time_scale));
    }
}
