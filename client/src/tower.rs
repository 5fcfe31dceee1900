//! Towers: range tracking, target selection and the three weapon classes.
//!
//! A tower only computes attacks on its owner's client. Elsewhere it is fed
//! `TOWER_FIRE` messages through [`Tower::replicate_fire`] and produces
//! visuals only.

use crate::config::TowerUpgradeTable;
use crate::projectile::ProjectileKind;
use crate::registry::EnemyKey;
use crate::timer::{Countdown, Repeating};
use log::warn;
use rand::Rng;
use shared::{BaseNetId, PlayerIndex, TowerFire, TowerId, TowerKind, Vec3, NO_TARGET};
use std::collections::BTreeSet;

pub const BURST_SHOTS: u32 = 10;
pub const BURST_GAP: f32 = 0.1;
pub const BURST_RECOVERY: f32 = 3.0;
pub const BEAM_TICK: f32 = 0.25;
pub const NET_AIM: f32 = 0.5;
/// Damage multiplier for every burst shot after the first and for beam ticks.
pub const FOLLOW_UP_MULTIPLIER: f32 = 0.5;
pub const TRUE_DAMAGE_CHANCE: f64 = 0.1;

pub fn attack_delay(kind: TowerKind) -> f32 {
    match kind {
        TowerKind::Flame | TowerKind::Laser => BEAM_TICK,
        TowerKind::Machine | TowerKind::Multiple => BURST_RECOVERY,
        TowerKind::Rocket => 8.0,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeaponClass {
    /// One heavy shot per cooldown.
    Single,
    /// Fixed-length volley followed by a recovery delay.
    Burst,
    /// Continuous damage while a target stays in range.
    Beam,
}

impl WeaponClass {
    pub fn of(kind: TowerKind) -> Self {
        match kind {
            TowerKind::Rocket => WeaponClass::Single,
            TowerKind::Machine | TowerKind::Multiple => WeaponClass::Burst,
            TowerKind::Flame | TowerKind::Laser => WeaponClass::Beam,
        }
    }
}

/// Visual projectile a tower kind launches, if any.
pub fn projectile_for(kind: TowerKind) -> Option<ProjectileKind> {
    match kind {
        TowerKind::Machine => Some(ProjectileKind::Bullet),
        TowerKind::Multiple => Some(ProjectileKind::Rocket),
        TowerKind::Rocket => Some(ProjectileKind::NuclearRocket),
        TowerKind::Flame | TowerKind::Laser => None,
    }
}

/// Enemies currently inside a tower's range.
#[derive(Debug, Clone, Default)]
pub struct RangeDetector {
    in_range: BTreeSet<EnemyKey>,
}

impl RangeDetector {
    pub fn insert(&mut self, key: EnemyKey) -> bool {
        self.in_range.insert(key)
    }

    pub fn remove(&mut self, key: EnemyKey) -> bool {
        self.in_range.remove(&key)
    }

    pub fn contains(&self, key: EnemyKey) -> bool {
        self.in_range.contains(&key)
    }

    pub fn len(&self) -> usize {
        self.in_range.len()
    }

    pub fn is_empty(&self) -> bool {
        self.in_range.is_empty()
    }

    pub fn keys(&self) -> Vec<EnemyKey> {
        self.in_range.iter().copied().collect()
    }

    /// Nearest tracked enemy that still has a position.
    pub fn next_target<F>(&self, from: Vec3, position_of: F) -> Option<EnemyKey>
    where
        F: Fn(EnemyKey) -> Option<Vec3>,
    {
        self.in_range
            .iter()
            .filter_map(|key| position_of(*key).map(|pos| (*key, pos.distance_squared(from))))
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(key, _)| key)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TowerAction {
    /// Announce a shot and launch its projectile.
    Shot {
        target: EnemyKey,
        damage: f32,
        is_first_shot: bool,
        projectile: ProjectileKind,
        projectile_damage: f32,
        /// The projectile is visual only; damage is carried by a `Strike`.
        replicated: bool,
    },
    /// Damage applied directly to the target.
    Strike {
        target: EnemyKey,
        damage: f32,
        true_damage: bool,
    },
    BeamStarted {
        target: EnemyKey,
    },
    BeamStopped,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum BurstPhase {
    Ready,
    Firing { fired: u32, gap: Countdown },
    Recovering(Countdown),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum WeaponState {
    Single { cooldown: Countdown },
    Burst(BurstPhase),
    Beam { firing: bool, ticker: Repeating },
}

impl WeaponState {
    fn for_kind(kind: TowerKind) -> Self {
        match WeaponClass::of(kind) {
            WeaponClass::Single => WeaponState::Single {
                cooldown: Countdown::idle(),
            },
            WeaponClass::Burst => WeaponState::Burst(BurstPhase::Ready),
            WeaponClass::Beam => WeaponState::Beam {
                firing: false,
                ticker: Repeating::new(BEAM_TICK),
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct Tower {
    pub id: TowerId,
    pub owner_index: PlayerIndex,
    pub kind: TowerKind,
    pub base_net_id: BaseNetId,
    pub position: Vec3,
    pub level: i32,
    pub damage: f32,
    pub range: f32,
    detector: RangeDetector,
    target: Option<EnemyKey>,
    silence: Countdown,
    weapon: WeaponState,
    net_aim: Countdown,
    net_target: Option<EnemyKey>,
}

impl Tower {
    pub fn new(
        id: TowerId,
        owner_index: PlayerIndex,
        kind: TowerKind,
        base_net_id: BaseNetId,
        position: Vec3,
        level: i32,
        range: f32,
        upgrades: &TowerUpgradeTable,
    ) -> Self {
        let level = level.max(1);
        let damage = match upgrades.level(level).or_else(|| upgrades.level(1)) {
            Some(row) => row.damage(kind),
            None => {
                warn!("No upgrade row for {:?} level {}, tower deals no damage", kind, level);
                0.0
            }
        };
        Self {
            id,
            owner_index,
            kind,
            base_net_id,
            position,
            level,
            damage,
            range,
            detector: RangeDetector::default(),
            target: None,
            silence: Countdown::idle(),
            weapon: WeaponState::for_kind(kind),
            net_aim: Countdown::idle(),
            net_target: None,
        }
    }

    pub fn target(&self) -> Option<EnemyKey> {
        self.target
    }

    pub fn detector(&self) -> &RangeDetector {
        &self.detector
    }

    pub fn is_silenced(&self) -> bool {
        self.silence.is_running()
    }

    pub fn is_beam_firing(&self) -> bool {
        matches!(self.weapon, WeaponState::Beam { firing: true, .. })
    }

    /// Enemy a replicated shot is aimed at, for as long as the aim lasts.
    pub fn net_target(&self) -> Option<EnemyKey> {
        self.net_target
    }

    pub fn in_range(&self, point: Vec3) -> bool {
        self.position.flat().distance_squared(point.flat()) <= self.range * self.range
    }

    pub fn handle_enter(&mut self, key: EnemyKey) {
        self.detector.insert(key);
        if self.target.is_none() {
            self.target = Some(key);
        }
    }

    /// Forgets `key`; losing the current target falls back to the nearest
    /// enemy still in range.
    pub fn handle_exit<F>(&mut self, key: EnemyKey, position_of: F)
    where
        F: Fn(EnemyKey) -> Option<Vec3>,
    {
        self.detector.remove(key);
        if self.target == Some(key) {
            self.target = self.detector.next_target(self.position, position_of);
        }
    }

    /// Suspends attacks for `duration` and cancels any volley or beam in
    /// progress.
    pub fn silence(&mut self, duration: f32) -> Option<TowerAction> {
        self.silence.restart(duration);
        match &mut self.weapon {
            WeaponState::Burst(phase) => {
                *phase = BurstPhase::Ready;
                None
            }
            WeaponState::Beam { firing, ticker } => {
                ticker.reset();
                if std::mem::take(firing) {
                    Some(TowerAction::BeamStopped)
                } else {
                    None
                }
            }
            WeaponState::Single { .. } => None,
        }
    }

    /// Raises the tower to `level`. Levels at or below the current one are
    /// stale and ignored.
    pub fn apply_upgrade(&mut self, level: i32, upgrades: &TowerUpgradeTable) -> bool {
        if level <= self.level {
            return false;
        }
        match upgrades.level(level) {
            Some(row) => self.damage = row.damage(self.kind),
            None => warn!(
                "No upgrade row for level {}, tower {} keeps {} damage",
                level, self.id, self.damage
            ),
        }
        self.level = level;
        true
    }

    /// Plays back a shot computed on the owner's client. Returns the visual
    /// projectile to launch and the damage it carries.
    pub fn replicate_fire(&mut self, fire: &TowerFire) -> Option<(ProjectileKind, f32)> {
        self.net_aim.restart(NET_AIM);
        self.net_target = (fire.target_enemy_id != NO_TARGET && fire.target_spawner_id != NO_TARGET)
            .then(|| EnemyKey::new(fire.target_spawner_id, fire.target_enemy_id));

        let projectile = projectile_for(self.kind)?;
        let damage = match projectile {
            ProjectileKind::NuclearRocket => fire.damage,
            _ if fire.is_first_shot => fire.damage,
            _ => fire.damage * FOLLOW_UP_MULTIPLIER,
        };
        Some((projectile, damage))
    }

    /// Replicated towers only age their aim and silence.
    pub fn tick_replicated(&mut self, dt: f32) {
        if self.net_aim.tick(dt) {
            self.net_target = None;
        }
        self.silence.tick(dt);
    }

    pub fn tick<F, R>(&mut self, dt: f32, position_of: F, rng: &mut R) -> Vec<TowerAction>
    where
        F: Fn(EnemyKey) -> Option<Vec3>,
        R: Rng + ?Sized,
    {
        let mut actions = Vec::new();
        self.tick_replicated(dt);
        if self.is_silenced() {
            return actions;
        }

        let valid = self
            .target
            .map(|key| self.detector.contains(key) && position_of(key).is_some())
            .unwrap_or(false);
        if !valid {
            self.target = self.detector.next_target(self.position, &position_of);
        }

        let damage = self.damage;
        let kind = self.kind;
        let target = self.target;
        match &mut self.weapon {
            WeaponState::Single { cooldown } => {
                cooldown.tick(dt);
                if let (false, Some(target)) = (cooldown.is_running(), target) {
                    actions.push(TowerAction::Shot {
                        target,
                        damage,
                        is_first_shot: true,
                        projectile: ProjectileKind::NuclearRocket,
                        projectile_damage: damage,
                        replicated: false,
                    });
                    cooldown.restart(attack_delay(kind));
                }
            }
            WeaponState::Burst(phase) => {
                let next = match *phase {
                    BurstPhase::Ready => match target {
                        Some(target) => {
                            burst_shot(&mut actions, kind, target, damage, true);
                            BurstPhase::Firing {
                                fired: 1,
                                gap: Countdown::start(BURST_GAP),
                            }
                        }
                        None => BurstPhase::Ready,
                    },
                    BurstPhase::Firing { fired, mut gap } => {
                        if !gap.tick(dt) {
                            BurstPhase::Firing { fired, gap }
                        } else {
                            match target {
                                None => BurstPhase::Recovering(Countdown::start(BURST_RECOVERY)),
                                Some(target) => {
                                    burst_shot(&mut actions, kind, target, damage, false);
                                    if fired + 1 >= BURST_SHOTS {
                                        BurstPhase::Recovering(Countdown::start(BURST_RECOVERY))
                                    } else {
                                        BurstPhase::Firing {
                                            fired: fired + 1,
                                            gap: Countdown::start(BURST_GAP),
                                        }
                                    }
                                }
                            }
                        }
                    }
                    BurstPhase::Recovering(mut recovery) => {
                        if recovery.tick(dt) {
                            BurstPhase::Ready
                        } else {
                            BurstPhase::Recovering(recovery)
                        }
                    }
                };
                *phase = next;
            }
            WeaponState::Beam { firing, ticker } => match target {
                Some(target) => {
                    // first tick lands on acquisition, the rest every period
                    let ticks = if *firing {
                        ticker.tick(dt)
                    } else {
                        *firing = true;
                        ticker.reset();
                        actions.push(TowerAction::BeamStarted { target });
                        1
                    };
                    for _ in 0..ticks {
                        actions.push(TowerAction::Strike {
                            target,
                            damage: damage * FOLLOW_UP_MULTIPLIER,
                            true_damage: rng.gen_bool(TRUE_DAMAGE_CHANCE),
                        });
                    }
                }
                None => {
                    if std::mem::take(firing) {
                        actions.push(TowerAction::BeamStopped);
                    }
                }
            },
        }
        actions
    }
}

fn burst_shot(
    actions: &mut Vec<TowerAction>,
    kind: TowerKind,
    target: EnemyKey,
    damage: f32,
    first: bool,
) {
    let applied = if first {
        damage
    } else {
        damage * FOLLOW_UP_MULTIPLIER
    };
    if let Some(projectile) = projectile_for(kind) {
        actions.push(TowerAction::Shot {
            target,
            damage,
            is_first_shot: first,
            projectile,
            projectile_damage: applied,
            replicated: true,
        });
    }
    actions.push(TowerAction::Strike {
        target,
        damage: applied,
        true_damage: false,
    });
}
