//! Applying messages from other clients.
//!
//! Every header routes to exactly one handler. Handlers never recompute an
//! outcome the sender is authoritative for; they copy it. Messages naming
//! entities this client does not know about are dropped quietly because UDP
//! gives no ordering or delivery guarantees.

use crate::base::TowerBase;
use crate::events::{GameEvent, SoundKey};
use crate::projectile::Projectile;
use crate::registry::EnemyKey;
use crate::session::Session;
use crate::tower::Tower;
use log::{debug, trace, warn};
use shared::{
    BossSkill, EnemyDamage, EnemyDeath, EnemySpawn, ProtocolError, TowerBasePlace, TowerCreate,
    TowerFire, TowerLabUpgrade, TowerMove, WaveStart, WireMessage, NO_TARGET, RELAY_HELLO,
};

/// Messages waiting to be sent, in the order they were produced.
#[derive(Debug, Default)]
pub struct Outbox {
    messages: Vec<WireMessage>,
}

impl Outbox {
    pub fn push(&mut self, message: WireMessage) {
        self.messages.push(message);
    }

    pub fn drain(&mut self) -> Vec<WireMessage> {
        std::mem::take(&mut self.messages)
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// Decodes one received datagram. Unknown headers and malformed payloads
/// are logged and dropped.
pub fn decode_datagram(bytes: &[u8]) -> Option<WireMessage> {
    if bytes == RELAY_HELLO.as_bytes() {
        return None;
    }
    match WireMessage::decode_bytes(bytes) {
        Ok(message) => Some(message),
        Err(ProtocolError::UnknownHeader(tag)) => {
            debug!("Dropping message with unknown header {}", tag);
            None
        }
        Err(e) => {
            warn!("Dropping undecodable datagram: {}", e);
            None
        }
    }
}

impl Session {
    /// Decodes and applies a raw datagram.
    pub fn receive_datagram(&mut self, bytes: &[u8]) {
        if let Some(message) = decode_datagram(bytes) {
            self.apply_remote(message);
        }
    }

    pub fn apply_remote(&mut self, message: WireMessage) {
        trace!("Applying {}", message.header().as_str());
        match message {
            WireMessage::GameStart(m) => self.start_match(m.start_unix),
            WireMessage::WaveStart(m) => self.on_wave_start(m),
            WireMessage::EnemySpawn(m) => self.on_enemy_spawn(m),
            WireMessage::EnemyDamage(m) => self.on_enemy_damage(m),
            WireMessage::EnemyDeath(m) => self.on_enemy_death(m),
            WireMessage::BossSkill(m) => self.on_boss_skill(m),
            WireMessage::TowerFire(m) => self.on_tower_fire(m),
            WireMessage::TowerBasePlace(m) => self.on_base_place(m),
            WireMessage::TowerCreate(m) => self.on_tower_create(m),
            WireMessage::TowerLabUpgrade(m) => self.on_lab_upgrade(m),
            WireMessage::TowerMove(m) => self.on_tower_move(m),
            WireMessage::GameTimescale(m) => self.set_time_scale(m.scale),
        }
    }

    fn on_wave_start(&mut self, message: WaveStart) {
        if self.is_local(message.owner_index) {
            return;
        }
        let total_waves = self.config.total_waves as i32;
        if message.wave_index < 0 || message.wave_index >= total_waves {
            warn!(
                "Wave index {} from player {} is out of range",
                message.wave_index, message.owner_index
            );
            return;
        }
        let Some(spawner) = self.registry.spawners.get_mut(&message.spawner_id) else {
            warn!("WAVE_START for unknown spawner {}", message.spawner_id);
            return;
        };
        spawner.wave_hp = message.hp;
        spawner.kill_gold = message.kill_gold;
        spawner.wave_index = message.wave_index;
        self.emit(GameEvent::WaveStarted {
            spawner_id: message.spawner_id,
            wave_index: message.wave_index,
        });
    }

    fn on_enemy_spawn(&mut self, message: EnemySpawn) {
        let Some(spawner) = self.registry.spawners.get(&message.spawner_id) else {
            warn!("ENEMY_SPAWN for unknown spawner {}", message.spawner_id);
            return;
        };
        if self.is_local(spawner.owner_index) {
            debug!("Ignoring spawn echo for our own line");
            return;
        }
        let key = EnemyKey::new(message.spawner_id, message.enemy_id);
        if self.registry.enemies.contains_key(&key) {
            debug!("Duplicate spawn for {:?} dropped", key);
            return;
        }
        let enemy = spawner.spawn_remote(&message);
        let kind = enemy.kind;
        self.registry.insert_enemy(enemy);
        self.emit(GameEvent::EnemySpawned {
            spawner_id: key.spawner_id,
            enemy_id: key.enemy_id,
            kind,
        });
    }

    fn on_enemy_damage(&mut self, message: EnemyDamage) {
        let key = EnemyKey::new(message.spawner_id, message.enemy_id);
        let Some(enemy) = self.registry.enemies.get_mut(&key) else {
            trace!("Damage for unknown enemy {:?}", key);
            return;
        };
        if enemy.is_authoritative() {
            return;
        }
        if enemy.apply_network_hp(message.remaining_hp) {
            debug!("{:?} died from replicated damage", key);
        }
    }

    fn on_enemy_death(&mut self, message: EnemyDeath) {
        let key = EnemyKey::new(message.spawner_id, message.enemy_id);
        match self.registry.enemies.get_mut(&key) {
            Some(enemy) if !enemy.is_authoritative() => {
                enemy.die_replicated();
            }
            Some(_) => {}
            None => trace!("Death for unknown enemy {:?}", key),
        }
    }

    fn on_boss_skill(&mut self, message: BossSkill) {
        let key = EnemyKey::new(message.spawner_id, message.enemy_id);
        let Some(enemy) = self.registry.enemies.get_mut(&key) else {
            trace!("Boss skill for unknown enemy {:?}", key);
            return;
        };
        if enemy.is_authoritative() {
            return;
        }
        if message.start {
            enemy.replicate_skill_start(
                message.pos,
                message.fwd,
                message.grow_duration,
                message.max_depth,
            );
            self.emit(GameEvent::BossSkillStarted {
                spawner_id: key.spawner_id,
                enemy_id: key.enemy_id,
            });
        } else {
            let strip = enemy.replicate_skill_stop();
            if let Some(strip) = strip {
                self.silence_strip(strip);
            }
            self.emit(GameEvent::BossSkillFinished {
                spawner_id: key.spawner_id,
                enemy_id: key.enemy_id,
            });
        }
    }

    fn on_tower_fire(&mut self, message: TowerFire) {
        let Some(tower) = self.registry.towers.get_mut(&message.tower_id) else {
            trace!("Fire from unknown tower {}", message.tower_id);
            return;
        };
        if self.config.local_player == tower.owner_index {
            return;
        }
        let launch = tower.replicate_fire(&message);
        let origin = tower.position;

        if message.target_enemy_id != NO_TARGET && message.target_spawner_id != NO_TARGET {
            if let Some((kind, damage)) = launch {
                self.projectiles.push(Projectile::new(
                    kind,
                    message.tower_id,
                    origin,
                    EnemyKey::new(message.target_spawner_id, message.target_enemy_id),
                    damage,
                    true,
                    self.config.projectile_speed,
                ));
            }
        }
        self.emit(GameEvent::Sound(SoundKey::for_tower(message.tower_type)));
        self.emit(GameEvent::TowerFired {
            tower_id: message.tower_id,
            kind: message.tower_type,
            replicated: true,
        });
    }

    fn on_base_place(&mut self, message: TowerBasePlace) {
        if !self.config.is_valid_player(message.owner_index) {
            warn!("Base from unknown player {}", message.owner_index);
            return;
        }
        if self.is_local(message.owner_index) {
            return;
        }
        if self.registry.bases.contains_key(&message.base_net_id) {
            debug!("Duplicate base {} dropped", message.base_net_id);
            return;
        }
        self.registry.bases.insert(
            message.base_net_id,
            TowerBase::new(message.base_net_id, message.owner_index, message.position),
        );
        self.emit(GameEvent::BasePlaced {
            owner_index: message.owner_index,
            base_net_id: message.base_net_id,
        });
    }

    fn on_tower_create(&mut self, message: TowerCreate) {
        if self.is_local(message.owner_index) {
            return;
        }
        if self.registry.tower_on_base(message.base_net_id).is_some() {
            return;
        }
        let lab_level = self
            .remote_labs
            .get(&(message.owner_index, message.tower_type))
            .copied()
            .unwrap_or(0);
        let Some(base) = self.registry.bases.get_mut(&message.base_net_id) else {
            debug!("Tower for unknown base {}", message.base_net_id);
            return;
        };
        let tower_id = message.base_net_id;
        base.tower = Some(tower_id);
        let tower = Tower::new(
            tower_id,
            message.owner_index,
            message.tower_type,
            message.base_net_id,
            base.position,
            message.level.max(lab_level),
            self.config.tower_range,
            &self.config.tower_upgrades,
        );
        let level = tower.level;
        self.registry.towers.insert(tower_id, tower);
        self.emit(GameEvent::TowerBuilt {
            tower_id,
            kind: message.tower_type,
            level,
        });
    }

    fn on_lab_upgrade(&mut self, message: TowerLabUpgrade) {
        if !self.config.is_valid_player(message.owner_index) {
            warn!("Lab upgrade from unknown player {}", message.owner_index);
            return;
        }
        if self.is_local(message.owner_index) {
            return;
        }
        let known = self
            .remote_labs
            .entry((message.owner_index, message.tower_type))
            .or_insert(0);
        *known = (*known).max(message.level);

        let mut raised = 0;
        for tower in self.registry.towers.values_mut() {
            if tower.owner_index == message.owner_index
                && tower.kind == message.tower_type
                && tower.apply_upgrade(message.level, &self.config.tower_upgrades)
            {
                raised += 1;
            }
        }
        debug!(
            "Player {} lab {:?} -> {} raised {} towers",
            message.owner_index, message.tower_type, message.level, raised
        );
        self.emit(GameEvent::LabUpgraded {
            owner_index: message.owner_index,
            kind: message.tower_type,
            level: message.level,
        });
    }

    fn on_tower_move(&mut self, message: TowerMove) {
        if self.is_local(message.owner_index) {
            return;
        }
        let Some(base) = self.registry.bases.get_mut(&message.base_net_id) else {
            debug!("Move for unknown base {}", message.base_net_id);
            return;
        };
        base.position = message.base_position;
        if message.has_tower {
            if let Some(tower) = base.tower.and_then(|id| self.registry.towers.get_mut(&id)) {
                tower.position = message.tower_position;
            }
        }
        self.emit(GameEvent::BaseMoved {
            base_net_id: message.base_net_id,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionConfig;
    use shared::{EnemyKind, GameStart, GameTimescale, PlayerIndex, TowerKind, Vec3};

    fn session(local_player: PlayerIndex) -> Session {
        Session::new(SessionConfig {
            local_player,
            player_count: 2,
            seed: 3,
            ..SessionConfig::default()
        })
    }

    fn remote_spawn(enemy_id: i32) -> WireMessage {
        WireMessage::EnemySpawn(EnemySpawn {
            enemy_id,
            spawner_id: 1,
            enemy_type: EnemyKind::Armor,
            position: Vec3::new(50.0, 0.0, -20.0),
            hp: 100.0,
            armor: 25.0,
            kill_gold: 5,
            owner_index: 1,
        })
    }

    fn damage(enemy_id: i32, remaining_hp: f64) -> WireMessage {
        WireMessage::EnemyDamage(EnemyDamage {
            enemy_id,
            spawner_id: 1,
            remaining_hp,
        })
    }

    #[test]
    fn test_decode_drops_hello_and_unknown_headers() {
        assert!(decode_datagram(RELAY_HELLO.as_bytes()).is_none());
        assert!(decode_datagram(b"GAME_EVENT_BUFF|{}").is_none());
        assert!(decode_datagram(b"ENEMY_DEATH|{oops").is_none());
        assert!(decode_datagram(b"GAME_TIMESCALE|{\"scale\":2.0}").is_some());
    }

    #[test]
    fn test_messages_for_unknown_entities_are_noops() {
        let mut session = session(0);
        session.apply_remote(damage(99, 10.0));
        session.apply_remote(WireMessage::EnemyDeath(EnemyDeath {
            enemy_id: 99,
            spawner_id: 1,
        }));
        session.apply_remote(WireMessage::TowerFire(TowerFire {
            tower_id: 12,
            ..TowerFire::default()
        }));
        session.apply_remote(WireMessage::TowerCreate(TowerCreate {
            owner_index: 1,
            base_net_id: 100_001,
            ..TowerCreate::default()
        }));
        assert_eq!(session.registry().enemy_count(), 0);
        assert!(session.registry().towers.is_empty());
        assert!(session.drain_outbox().is_empty());
    }

    #[test]
    fn test_duplicate_spawn_is_dropped() {
        let mut session = session(0);
        session.apply_remote(remote_spawn(4));
        session.apply_remote(damage(4, 70.0));
        session.apply_remote(remote_spawn(4));
        let enemy = session.registry().enemy(EnemyKey::new(1, 4)).unwrap();
        assert_eq!(enemy.hp, 70.0);
        assert_eq!(enemy.armor, 25.0);
        assert!(!enemy.is_authoritative());
    }

    #[test]
    fn test_damage_is_last_write_wins() {
        let mut session = session(0);
        session.apply_remote(remote_spawn(7));
        session.apply_remote(damage(7, 40.0));
        session.apply_remote(damage(7, 40.0));
        assert_eq!(session.registry().enemy(EnemyKey::new(1, 7)).unwrap().hp, 40.0);
        session.apply_remote(damage(7, 60.0));
        assert_eq!(session.registry().enemy(EnemyKey::new(1, 7)).unwrap().hp, 60.0);
    }

    #[test]
    fn test_replicated_death_pays_nothing() {
        let mut session = session(0);
        session.apply_remote(remote_spawn(2));
        session.apply_remote(WireMessage::EnemyDeath(EnemyDeath {
            enemy_id: 2,
            spawner_id: 1,
        }));
        session.tick(0.0);
        assert_eq!(session.registry().enemy_count(), 0);
        assert_eq!(session.economy().gold(), 1000);
        assert!(session.drain_outbox().is_empty());
    }

    #[test]
    fn test_own_line_echoes_are_ignored() {
        let mut session = session(1);
        session.apply_remote(remote_spawn(1));
        assert_eq!(session.registry().enemy_count(), 0);
    }

    #[test]
    fn test_remote_tower_lifecycle() {
        let mut session = session(0);
        session.apply_remote(WireMessage::TowerBasePlace(TowerBasePlace {
            owner_index: 1,
            base_net_id: 100_001,
            position: Vec3::new(60.0, 0.1, 0.0),
        }));
        session.apply_remote(WireMessage::TowerBasePlace(TowerBasePlace {
            owner_index: 1,
            base_net_id: 100_001,
            position: Vec3::new(0.0, 0.1, 0.0),
        }));
        session.apply_remote(WireMessage::TowerBasePlace(TowerBasePlace {
            owner_index: 7,
            base_net_id: 700_001,
            ..TowerBasePlace::default()
        }));
        assert_eq!(session.registry().bases.len(), 1);
        assert_eq!(session.registry().bases[&100_001].position.x, 60.0);

        let create = TowerCreate {
            owner_index: 1,
            base_net_id: 100_001,
            tower_type: TowerKind::Rocket,
            level: 3,
        };
        session.apply_remote(WireMessage::TowerCreate(create.clone()));
        session.apply_remote(WireMessage::TowerCreate(TowerCreate {
            tower_type: TowerKind::Flame,
            ..create
        }));
        let tower = &session.registry().towers[&100_001];
        assert_eq!(tower.kind, TowerKind::Rocket);
        assert_eq!(tower.level, 3);

        for level in [5, 4, 2] {
            session.apply_remote(WireMessage::TowerLabUpgrade(TowerLabUpgrade {
                owner_index: 1,
                tower_type: TowerKind::Rocket,
                level,
            }));
        }
        assert_eq!(session.registry().towers[&100_001].level, 5);

        session.apply_remote(WireMessage::TowerMove(TowerMove {
            owner_index: 1,
            base_net_id: 100_001,
            base_position: Vec3::new(62.0, 0.1, 4.0),
            has_tower: true,
            tower_position: Vec3::new(62.0, 0.6, 4.0),
        }));
        assert_eq!(session.registry().bases[&100_001].position, Vec3::new(62.0, 0.1, 4.0));
        assert_eq!(session.registry().towers[&100_001].position, Vec3::new(62.0, 0.6, 4.0));
    }

    #[test]
    fn test_lab_upgrade_before_create_is_kept() {
        let mut session = session(0);
        for level in [4, 2] {
            session.apply_remote(WireMessage::TowerLabUpgrade(TowerLabUpgrade {
                owner_index: 1,
                tower_type: TowerKind::Laser,
                level,
            }));
        }
        session.apply_remote(WireMessage::TowerBasePlace(TowerBasePlace {
            owner_index: 1,
            base_net_id: 100_002,
            position: Vec3::new(58.0, 0.1, 2.0),
        }));
        session.apply_remote(WireMessage::TowerCreate(TowerCreate {
            owner_index: 1,
            base_net_id: 100_002,
            tower_type: TowerKind::Laser,
            level: 1,
        }));
        assert_eq!(session.registry().towers[&100_002].level, 4);
        assert!(session.registry().tower_on_base(100_002).is_some());

        // other kinds and other players are unaffected
        session.apply_remote(WireMessage::TowerBasePlace(TowerBasePlace {
            owner_index: 1,
            base_net_id: 100_003,
            position: Vec3::new(58.0, 0.1, 6.0),
        }));
        session.apply_remote(WireMessage::TowerCreate(TowerCreate {
            owner_index: 1,
            base_net_id: 100_003,
            tower_type: TowerKind::Flame,
            level: 1,
        }));
        assert_eq!(session.registry().towers[&100_003].level, 1);
        assert_eq!(session.economy().lab_level(TowerKind::Laser), 1);
    }

    #[test]
    fn test_remote_fire_launches_visual_projectile() {
        let mut session = session(0);
        session.apply_remote(WireMessage::TowerBasePlace(TowerBasePlace {
            owner_index: 1,
            base_net_id: 100_002,
            position: Vec3::new(50.0, 0.1, -10.0),
        }));
        session.apply_remote(WireMessage::TowerCreate(TowerCreate {
            owner_index: 1,
            base_net_id: 100_002,
            tower_type: TowerKind::Multiple,
            level: 1,
        }));
        session.apply_remote(remote_spawn(0));
        session.apply_remote(WireMessage::TowerFire(TowerFire {
            tower_id: 100_002,
            tower_type: TowerKind::Multiple,
            damage: 14.0,
            is_first_shot: true,
            target_enemy_id: 0,
            target_spawner_id: 1,
            ..TowerFire::default()
        }));
        assert_eq!(session.projectiles().len(), 1);
        assert!(session.projectiles()[0].replicated);

        for _ in 0..40 {
            session.tick(0.05);
        }
        assert_eq!(session.registry().enemy(EnemyKey::new(1, 0)).unwrap().hp, 100.0);
        assert!(session.drain_outbox().is_empty());
    }

    #[test]
    fn test_remote_boss_stop_silences_towers() {
        let mut session = session(0);
        session.registry.bases.insert(1, TowerBase::new(1, 0, Vec3::new(0.0, 0.1, 10.0)));
        session.select(crate::session::Selection::Base(1));
        session.create_tower(TowerKind::Laser);
        session.apply_remote(WireMessage::EnemySpawn(EnemySpawn {
            enemy_id: 9,
            spawner_id: 1,
            enemy_type: EnemyKind::Boss,
            hp: 5000.0,
            owner_index: 1,
            ..EnemySpawn::default()
        }));
        session.apply_remote(WireMessage::BossSkill(BossSkill {
            spawner_id: 1,
            enemy_id: 9,
            start: true,
            pos: Vec3::ZERO,
            fwd: Vec3::new(0.0, 0.0, 1.0),
            grow_duration: 20.0,
            max_depth: 50.0,
        }));
        session.tick(10.0);
        session.apply_remote(WireMessage::BossSkill(BossSkill {
            spawner_id: 1,
            enemy_id: 9,
            start: false,
            ..BossSkill::default()
        }));
        assert!(session.registry().towers[&1].is_silenced());
    }

    #[test]
    fn test_start_and_timescale() {
        let mut session = session(1);
        session.apply_remote(WireMessage::GameStart(GameStart { start_unix: 12.0 }));
        session.apply_remote(WireMessage::GameStart(GameStart { start_unix: 99.0 }));
        assert_eq!(session.match_start(), Some(12.0));

        session.apply_remote(WireMessage::GameTimescale(GameTimescale { scale: 3.0 }));
        assert_eq!(session.time_scale(), 2.0);
        session.apply_remote(WireMessage::GameTimescale(GameTimescale { scale: 0.5 }));
        assert_eq!(session.time_scale(), 1.0);
    }

    #[test]
    fn test_remote_wave_start_updates_spawner() {
        let mut session = session(0);
        session.apply_remote(WireMessage::WaveStart(WaveStart {
            spawner_id: 1,
            owner_index: 1,
            wave_index: 4,
            hp: 321.0,
            kill_gold: 9,
        }));
        session.apply_remote(WireMessage::WaveStart(WaveStart {
            spawner_id: 1,
            owner_index: 1,
            wave_index: 500,
            hp: 1.0,
            kill_gold: 1,
        }));
        let spawner = &session.registry().spawners[&1];
        assert_eq!(spawner.wave_index, 4);
        assert_eq!(spawner.wave_hp, 321.0);
    }
}
