//! Enemies: movement along a line's route, damage mitigation, status effects
//! and the boss skill.
//!
//! Only the client that owns an enemy's line computes damage and healing for
//! it. Every other client holds a mirror that accepts HP values verbatim
//! through [`Enemy::apply_network_hp`] and replays the boss skill from
//! `BOSS_SKILL` messages.

use crate::registry::EnemyKey;
use crate::route::Line;
use crate::timer::{Countdown, Repeating};
use shared::{EnemyId, EnemyKind, PlayerIndex, SpawnerId, Vec3};

pub const REGEN_PERIOD: f32 = 5.0;
pub const REGEN_FRACTION: f64 = 0.02;
pub const INVINCIBLE_PHASE: f32 = 5.0;

/// Route waypoint whose arrival triggers the boss skill.
pub const SKILL_WAYPOINT: usize = 2;
pub const SKILL_GROW_DURATION: f32 = 20.0;
pub const SKILL_MIN_DEPTH: f32 = 1.0;
pub const SKILL_MAX_DEPTH: f32 = 50.0;
pub const SKILL_SETTLE: f32 = 0.1;
pub const SKILL_HALF_WIDTH: f32 = 2.5;

/// Per-kind movement and ability flags.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnemyProfile {
    pub speed: f32,
    pub type_armor: f32,
    pub regenerates: bool,
    pub cycles_invincibility: bool,
    pub has_skill: bool,
}

impl EnemyProfile {
    pub fn for_kind(kind: EnemyKind) -> Self {
        let base = EnemyProfile {
            speed: 3.0,
            type_armor: 0.0,
            regenerates: false,
            cycles_invincibility: false,
            has_skill: false,
        };
        match kind {
            EnemyKind::HealthRegen => EnemyProfile {
                regenerates: true,
                ..base
            },
            EnemyKind::Invincible => EnemyProfile {
                cycles_invincibility: true,
                ..base
            },
            EnemyKind::MovementSpeed => EnemyProfile { speed: 5.0, ..base },
            EnemyKind::Armor => EnemyProfile {
                speed: 2.5,
                type_armor: 50.0,
                ..base
            },
            EnemyKind::Boss => EnemyProfile {
                speed: 1.5,
                type_armor: 50.0,
                regenerates: true,
                cycles_invincibility: true,
                has_skill: true,
            },
        }
    }
}

/// Damage left after armor. `armor` and `type_armor` are percentages; true
/// damage ignores both. Fully saturated armor still lets 1 point through
/// when the raw hit is at least 1.
pub fn mitigate(raw: f64, armor: f32, type_armor: f32, true_damage: bool) -> f64 {
    let (armor_pct, type_pct) = if true_damage {
        (0.0, 0.0)
    } else {
        (
            (f64::from(armor) / 100.0).clamp(0.0, 1.0),
            (f64::from(type_armor) / 100.0).clamp(0.0, 1.0),
        )
    };
    let applied = raw * (1.0 - armor_pct) * (1.0 - type_pct);
    if armor_pct >= 1.0 && raw >= 1.0 && applied < 1.0 {
        1.0
    } else {
        applied
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DamageOutcome {
    /// Dead target or non-positive damage.
    Ignored,
    /// Invincibility absorbed the hit.
    Blocked,
    Applied {
        amount: f64,
        remaining: f64,
        killed: bool,
    },
}

/// Forward strip swept by the boss skill.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SkillStrip {
    pub origin: Vec3,
    pub forward: Vec3,
    pub depth: f32,
    pub half_width: f32,
}

impl SkillStrip {
    pub fn contains(&self, point: Vec3) -> bool {
        let forward = self.forward.flat().normalized();
        let offset = point.flat().sub(self.origin.flat());
        let along = offset.dot(forward);
        if along < 0.0 || along > self.depth {
            return false;
        }
        let lateral = offset.sub(forward.scale(along));
        lateral.length_squared() <= self.half_width * self.half_width
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SkillEvent {
    Started {
        origin: Vec3,
        forward: Vec3,
        grow_duration: f32,
        max_depth: f32,
    },
    Finished(SkillStrip),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum SkillPhase {
    Ready,
    Growing {
        origin: Vec3,
        forward: Vec3,
        elapsed: f32,
        depth: f32,
    },
    Settling {
        strip: SkillStrip,
        remaining: Countdown,
    },
    Replaying {
        origin: Vec3,
        forward: Vec3,
        elapsed: f32,
        depth: f32,
        grow_duration: f32,
        max_depth: f32,
    },
    Spent,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct EnemyTickReport {
    /// HP gained by regeneration and the resulting HP, to be broadcast.
    pub healed: Option<(f64, f64)>,
    pub invincible: Option<bool>,
    pub skill: Option<SkillEvent>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct InvincibilityCycle {
    active: bool,
    phase: Countdown,
}

/// Values an enemy is created with, either by the local spawner or from an
/// `ENEMY_SPAWN` message.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnemyStats {
    pub id: EnemyId,
    pub spawner_id: SpawnerId,
    pub owner_index: PlayerIndex,
    pub kind: EnemyKind,
    pub hp: f64,
    pub armor: f32,
    pub kill_gold: i64,
    pub position: Vec3,
}

#[derive(Debug, Clone)]
pub struct Enemy {
    pub id: EnemyId,
    pub spawner_id: SpawnerId,
    pub owner_index: PlayerIndex,
    pub kind: EnemyKind,
    pub hp: f64,
    pub max_hp: f64,
    pub armor: f32,
    pub type_armor: f32,
    pub kill_gold: i64,
    pub position: Vec3,
    authoritative: bool,
    dead: bool,
    speed: f32,
    saved_speed: f32,
    stun: Countdown,
    waypoint: usize,
    arrived_at: Option<usize>,
    regen: Option<Repeating>,
    invincibility: Option<InvincibilityCycle>,
    skill: SkillPhase,
    skill_resume_speed: f32,
}

impl Enemy {
    pub fn new(stats: EnemyStats, authoritative: bool) -> Self {
        let profile = EnemyProfile::for_kind(stats.kind);
        Self {
            id: stats.id,
            spawner_id: stats.spawner_id,
            owner_index: stats.owner_index,
            kind: stats.kind,
            hp: stats.hp,
            max_hp: stats.hp,
            armor: stats.armor,
            type_armor: profile.type_armor,
            kill_gold: stats.kill_gold,
            position: stats.position,
            authoritative,
            dead: false,
            speed: profile.speed,
            saved_speed: profile.speed,
            stun: Countdown::idle(),
            waypoint: 0,
            arrived_at: None,
            regen: profile.regenerates.then(|| Repeating::new(REGEN_PERIOD)),
            invincibility: profile.cycles_invincibility.then(|| InvincibilityCycle {
                active: true,
                phase: Countdown::start(INVINCIBLE_PHASE),
            }),
            skill: if profile.has_skill {
                SkillPhase::Ready
            } else {
                SkillPhase::Spent
            },
            skill_resume_speed: profile.speed,
        }
    }

    pub fn key(&self) -> EnemyKey {
        EnemyKey::new(self.spawner_id, self.id)
    }

    pub fn is_dead(&self) -> bool {
        self.dead
    }

    pub fn is_authoritative(&self) -> bool {
        self.authoritative
    }

    pub fn speed(&self) -> f32 {
        self.speed
    }

    pub fn is_stunned(&self) -> bool {
        self.stun.is_running()
    }

    pub fn is_invincible(&self) -> bool {
        self.invincibility.map(|cycle| cycle.active).unwrap_or(false)
    }

    pub fn is_using_skill(&self) -> bool {
        matches!(
            self.skill,
            SkillPhase::Growing { .. } | SkillPhase::Settling { .. } | SkillPhase::Replaying { .. }
        )
    }

    /// Current strip while the skill grows or settles.
    pub fn skill_strip(&self) -> Option<SkillStrip> {
        match self.skill {
            SkillPhase::Growing {
                origin,
                forward,
                depth,
                ..
            }
            | SkillPhase::Replaying {
                origin,
                forward,
                depth,
                ..
            } => Some(SkillStrip {
                origin,
                forward,
                depth,
                half_width: SKILL_HALF_WIDTH,
            }),
            SkillPhase::Settling { strip, .. } => Some(strip),
            SkillPhase::Ready | SkillPhase::Spent => None,
        }
    }

    /// Applies an authoritative hit. The caller broadcasts the outcome.
    pub fn take_damage(&mut self, raw: f32, true_damage: bool) -> DamageOutcome {
        if self.dead || self.hp <= 0.0 || raw <= 0.0 {
            return DamageOutcome::Ignored;
        }
        if self.is_invincible() {
            return DamageOutcome::Blocked;
        }
        let amount = mitigate(f64::from(raw), self.armor, self.type_armor, true_damage);
        self.hp = (self.hp - amount).max(0.0);
        let killed = self.hp <= 0.0;
        if killed {
            self.dead = true;
        }
        DamageOutcome::Applied {
            amount,
            remaining: self.hp,
            killed,
        }
    }

    /// Restores HP up to the maximum and returns the amount actually gained.
    pub fn heal(&mut self, amount: f64) -> f64 {
        if self.dead || amount <= 0.0 {
            return 0.0;
        }
        let before = self.hp;
        self.hp = (self.hp + amount).min(self.max_hp);
        self.hp - before
    }

    /// Mirrors an HP value computed by the line owner. Returns true when the
    /// value kills the enemy.
    pub fn apply_network_hp(&mut self, remaining: f64) -> bool {
        if self.dead {
            return false;
        }
        self.hp = remaining;
        if self.hp <= 0.0 {
            self.hp = 0.0;
            self.dead = true;
            return true;
        }
        false
    }

    /// Marks the enemy dead without awarding anything.
    pub fn die_replicated(&mut self) -> bool {
        if self.dead {
            return false;
        }
        self.hp = 0.0;
        self.dead = true;
        true
    }

    /// Stops movement for `duration`. A second stun restarts the timer but
    /// keeps the speed saved by the first one.
    pub fn stun(&mut self, duration: f32) {
        if self.dead {
            return;
        }
        if !self.stun.is_running() {
            self.saved_speed = self.speed;
            self.speed = 0.0;
        }
        self.stun.restart(duration);
    }

    fn resume_after_skill(&mut self) {
        if self.stun.is_running() {
            self.saved_speed = self.skill_resume_speed;
        } else {
            self.speed = self.skill_resume_speed;
        }
    }

    pub fn tick(&mut self, dt: f32, line: &Line) -> EnemyTickReport {
        let mut report = EnemyTickReport::default();
        if self.dead {
            return report;
        }

        if self.stun.tick(dt) {
            self.speed = self.saved_speed;
        }

        if let Some(cycle) = self.invincibility.as_mut() {
            if cycle.phase.tick(dt) {
                cycle.active = !cycle.active;
                cycle.phase.restart(INVINCIBLE_PHASE);
                report.invincible = Some(cycle.active);
            }
        }

        if self.authoritative {
            let fired = self.regen.as_mut().map(|regen| regen.tick(dt)).unwrap_or(0);
            for _ in 0..fired {
                if self.hp > 0.0 && self.hp < self.max_hp {
                    let gained = self.heal(self.max_hp * REGEN_FRACTION);
                    if gained > 0.0 {
                        let total = report.healed.map(|(sum, _)| sum).unwrap_or(0.0) + gained;
                        report.healed = Some((total, self.hp));
                    }
                }
            }
        }

        report.skill = self.advance_skill(dt);
        self.advance_route(dt, line);
        if report.skill.is_none() {
            report.skill = self.try_trigger_skill(line);
        }
        report
    }

    fn advance_route(&mut self, dt: f32, line: &Line) {
        if self.speed <= 0.0 {
            return;
        }
        let Some(target) = line.route.waypoint(self.waypoint) else {
            return;
        };
        self.position = self.position.move_towards(target, self.speed * dt);
        if self.position == target {
            self.arrived_at = Some(self.waypoint);
            self.waypoint = line.route.next_index(self.waypoint);
        }
    }

    fn try_trigger_skill(&mut self, line: &Line) -> Option<SkillEvent> {
        let arrived = self.arrived_at.take();
        if !self.authoritative
            || self.skill != SkillPhase::Ready
            || arrived != Some(SKILL_WAYPOINT)
        {
            return None;
        }
        let forward = line.spawner_position.sub(self.position).flat().normalized();
        let forward = if forward == Vec3::ZERO { line.forward } else { forward };
        self.skill_resume_speed = self.speed;
        self.speed = 0.0;
        self.skill = SkillPhase::Growing {
            origin: self.position,
            forward,
            elapsed: 0.0,
            depth: SKILL_MIN_DEPTH,
        };
        Some(SkillEvent::Started {
            origin: self.position,
            forward,
            grow_duration: SKILL_GROW_DURATION,
            max_depth: SKILL_MAX_DEPTH,
        })
    }

    fn advance_skill(&mut self, dt: f32) -> Option<SkillEvent> {
        match self.skill {
            SkillPhase::Growing {
                origin,
                forward,
                elapsed,
                ..
            } => {
                let elapsed = elapsed + dt;
                let depth = grow_depth(elapsed, SKILL_GROW_DURATION, SKILL_MAX_DEPTH);
                if self.stun.is_running() || depth >= SKILL_MAX_DEPTH - 0.01 {
                    self.skill = SkillPhase::Settling {
                        strip: SkillStrip {
                            origin,
                            forward,
                            depth,
                            half_width: SKILL_HALF_WIDTH,
                        },
                        remaining: Countdown::start(SKILL_SETTLE),
                    };
                } else {
                    self.skill = SkillPhase::Growing {
                        origin,
                        forward,
                        elapsed,
                        depth,
                    };
                }
                None
            }
            SkillPhase::Settling {
                strip,
                mut remaining,
            } => {
                if remaining.tick(dt) {
                    self.skill = SkillPhase::Spent;
                    self.resume_after_skill();
                    Some(SkillEvent::Finished(strip))
                } else {
                    self.skill = SkillPhase::Settling { strip, remaining };
                    None
                }
            }
            SkillPhase::Replaying {
                origin,
                forward,
                elapsed,
                grow_duration,
                max_depth,
                ..
            } => {
                let elapsed = elapsed + dt;
                self.skill = SkillPhase::Replaying {
                    origin,
                    forward,
                    elapsed,
                    depth: grow_depth(elapsed, grow_duration, max_depth),
                    grow_duration,
                    max_depth,
                };
                None
            }
            SkillPhase::Ready | SkillPhase::Spent => None,
        }
    }

    /// Starts replaying a skill announced by the line owner.
    pub fn replicate_skill_start(
        &mut self,
        origin: Vec3,
        forward: Vec3,
        grow_duration: f32,
        max_depth: f32,
    ) {
        if self.dead {
            return;
        }
        if !matches!(self.skill, SkillPhase::Replaying { .. }) {
            self.skill_resume_speed = self.speed;
            self.speed = 0.0;
        }
        self.position = origin;
        let grow_duration = if grow_duration > 0.0 {
            grow_duration
        } else {
            SKILL_GROW_DURATION
        };
        let max_depth = if max_depth > 0.0 {
            max_depth
        } else {
            SKILL_MAX_DEPTH
        };
        self.skill = SkillPhase::Replaying {
            origin,
            forward: forward.flat().normalized(),
            elapsed: 0.0,
            depth: SKILL_MIN_DEPTH,
            grow_duration,
            max_depth,
        };
    }

    /// Ends a replayed skill and returns the strip whose towers get silenced.
    pub fn replicate_skill_stop(&mut self) -> Option<SkillStrip> {
        let strip = match self.skill {
            SkillPhase::Replaying { .. } => self.skill_strip(),
            _ => return None,
        };
        self.skill = SkillPhase::Spent;
        self.resume_after_skill();
        strip
    }
}

fn grow_depth(elapsed: f32, duration: f32, max_depth: f32) -> f32 {
    let t = if duration > 0.0 {
        (elapsed / duration).clamp(0.0, 1.0)
    } else {
        1.0
    };
    (SKILL_MIN_DEPTH + (max_depth - SKILL_MIN_DEPTH) * t).min(max_depth)
}
