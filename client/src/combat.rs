//! Authoritative combat for one session: range tracking, tower attacks,
//! projectile hits and the resulting damage, stuns and silences.
//!
//! Damage and stuns are only applied to enemies whose line this client
//! owns. Hits on anyone else's enemies stay visual; their owner reports the
//! outcome through `ENEMY_DAMAGE` and `ENEMY_DEATH`.

use crate::enemy::{DamageOutcome, SkillStrip};
use crate::events::{FloatingText, GameEvent, SoundKey};
use crate::projectile::{Projectile, ProjectileKind, ProjectileOutcome, STUN_CHANCE};
use crate::registry::EnemyKey;
use crate::session::Session;
use crate::tower::TowerAction;
use log::{debug, trace};
use rand::Rng;
use shared::{EnemyDamage, EnemyDeath, TowerFire, TowerId, TowerKind, Vec3, WireMessage};

impl Session {
    /// Feeds enter and exit events to every local tower's range detector.
    pub(crate) fn update_ranges(&mut self) {
        let local = self.config.local_player;
        let enemies = &self.registry.enemies;
        let position_of = |key: EnemyKey| {
            enemies
                .get(&key)
                .filter(|enemy| !enemy.is_dead())
                .map(|enemy| enemy.position)
        };

        for tower in self.registry.towers.values_mut() {
            if tower.owner_index != local {
                continue;
            }
            for key in tower.detector().keys() {
                let inside = position_of(key)
                    .map(|pos| tower.in_range(pos))
                    .unwrap_or(false);
                if !inside {
                    tower.handle_exit(key, position_of);
                }
            }
            for (key, enemy) in enemies.iter() {
                if !enemy.is_dead()
                    && !tower.detector().contains(*key)
                    && tower.in_range(enemy.position)
                {
                    tower.handle_enter(*key);
                }
            }
        }
    }

    pub(crate) fn run_towers(&mut self, dt: f32) {
        let local = self.config.local_player;
        let enemies = &self.registry.enemies;
        let position_of = |key: EnemyKey| {
            enemies
                .get(&key)
                .filter(|enemy| !enemy.is_dead())
                .map(|enemy| enemy.position)
        };

        let mut fired = Vec::new();
        for tower in self.registry.towers.values_mut() {
            if tower.owner_index != local {
                tower.tick_replicated(dt);
                continue;
            }
            let actions = tower.tick(dt, position_of, &mut self.rng);
            if !actions.is_empty() {
                fired.push((tower.id, tower.kind, tower.position, actions));
            }
        }

        for (tower_id, kind, position, actions) in fired {
            for action in actions {
                self.perform(tower_id, kind, position, action);
            }
        }
    }

    fn perform(&mut self, tower_id: TowerId, kind: TowerKind, position: Vec3, action: TowerAction) {
        match action {
            TowerAction::Shot {
                target,
                damage,
                is_first_shot,
                projectile,
                projectile_damage,
                replicated,
            } => {
                self.announce_fire(tower_id, kind, position, damage, is_first_shot, target);
                self.projectiles.push(Projectile::new(
                    projectile,
                    tower_id,
                    position,
                    target,
                    projectile_damage,
                    replicated,
                    self.config.projectile_speed,
                ));
            }
            TowerAction::Strike {
                target,
                damage,
                true_damage,
            } => {
                self.strike(target, damage, true_damage);
            }
            TowerAction::BeamStarted { target } => {
                let damage = self
                    .registry
                    .towers
                    .get(&tower_id)
                    .map(|tower| tower.damage)
                    .unwrap_or(0.0);
                self.announce_fire(tower_id, kind, position, damage, true, target);
            }
            TowerAction::BeamStopped => {
                trace!("Tower {} beam stopped", tower_id);
            }
        }
    }

    fn announce_fire(
        &mut self,
        tower_id: TowerId,
        kind: TowerKind,
        position: Vec3,
        damage: f32,
        is_first_shot: bool,
        target: EnemyKey,
    ) {
        self.broadcast(WireMessage::TowerFire(TowerFire {
            tower_id,
            tower_type: kind,
            position,
            damage,
            is_first_shot,
            target_enemy_id: target.enemy_id,
            target_spawner_id: target.spawner_id,
        }));
        self.emit(GameEvent::Sound(SoundKey::for_tower(kind)));
        self.emit(GameEvent::TowerFired {
            tower_id,
            kind,
            replicated: false,
        });
    }

    /// Applies damage to an enemy this client is authoritative for and
    /// broadcasts the result. Other enemies are left alone.
    pub(crate) fn strike(
        &mut self,
        key: EnemyKey,
        damage: f32,
        true_damage: bool,
    ) -> DamageOutcome {
        let Some(enemy) = self.registry.enemies.get_mut(&key) else {
            return DamageOutcome::Ignored;
        };
        if !enemy.is_authoritative() {
            trace!("Hit on {:?} is visual only, its line is remote", key);
            return DamageOutcome::Ignored;
        }

        let outcome = enemy.take_damage(damage, true_damage);
        let position = enemy.position;
        let kill_gold = enemy.kill_gold;
        let owner = enemy.owner_index;

        match outcome {
            DamageOutcome::Applied {
                amount,
                remaining,
                killed,
            } => {
                self.broadcast(WireMessage::EnemyDamage(EnemyDamage {
                    enemy_id: key.enemy_id,
                    spawner_id: key.spawner_id,
                    remaining_hp: remaining,
                }));
                self.emit(GameEvent::FloatingText {
                    at: position,
                    text: FloatingText::Damage(amount),
                });
                if killed {
                    self.broadcast(WireMessage::EnemyDeath(EnemyDeath {
                        enemy_id: key.enemy_id,
                        spawner_id: key.spawner_id,
                    }));
                    if self.is_local(owner) {
                        let gold = self.economy.add_gold(kill_gold);
                        self.kill_rewards.insert(key, kill_gold);
                        self.emit(GameEvent::FloatingText {
                            at: position,
                            text: FloatingText::Gold(kill_gold),
                        });
                        self.emit(GameEvent::GoldChanged(gold));
                    }
                }
            }
            DamageOutcome::Blocked => {
                self.emit(GameEvent::FloatingText {
                    at: position,
                    text: FloatingText::Invincible,
                });
            }
            DamageOutcome::Ignored => {}
        }
        outcome
    }

    /// Stuns an enemy this client is authoritative for.
    pub(crate) fn stun(&mut self, key: EnemyKey, duration: f32) {
        if let Some(enemy) = self.registry.enemies.get_mut(&key) {
            if enemy.is_authoritative() && !enemy.is_dead() {
                enemy.stun(duration);
            }
        }
    }

    pub(crate) fn run_projectiles(&mut self, dt: f32) {
        let mut flying = Vec::with_capacity(self.projectiles.len());
        for mut projectile in std::mem::take(&mut self.projectiles) {
            let target_position = self.registry.enemy_position(projectile.target);
            match projectile.tick(dt, target_position) {
                ProjectileOutcome::Flying => flying.push(projectile),
                ProjectileOutcome::Expired => {
                    trace!("Projectile from tower {} expired", projectile.tower_id);
                }
                ProjectileOutcome::Hit { at, target } => {
                    if !projectile.replicated {
                        self.land_hit(projectile.kind, at, target, projectile.damage);
                    }
                }
            }
        }
        self.projectiles = flying;
    }

    fn land_hit(&mut self, kind: ProjectileKind, at: Vec3, target: EnemyKey, damage: f32) {
        let victims: Vec<EnemyKey> = match kind.splash_radius() {
            None => vec![target],
            Some(radius) => self
                .registry
                .living_enemies()
                .filter(|(_, enemy)| {
                    enemy.position.flat().distance_squared(at.flat()) <= radius * radius
                })
                .map(|(key, _)| *key)
                .collect(),
        };
        for key in victims {
            let outcome = self.strike(key, damage, false);
            let landed = matches!(outcome, DamageOutcome::Applied { killed: false, .. });
            if landed && self.rng.gen_bool(STUN_CHANCE) {
                debug!("{:?} stunned by {:?}", key, kind);
                self.stun(key, kind.stun_duration());
            }
        }
    }

    /// Silences every tower standing inside `strip`.
    pub(crate) fn silence_strip(&mut self, strip: SkillStrip) {
        let duration = self.config.silence_duration;
        let mut silenced = Vec::new();
        for tower in self.registry.towers.values_mut() {
            if strip.contains(tower.position) {
                tower.silence(duration);
                silenced.push(tower.id);
            }
        }
        for tower_id in silenced {
            debug!("Tower {} silenced for {}s", tower_id, duration);
            self.emit(GameEvent::TowerSilenced { tower_id });
        }
    }
}
