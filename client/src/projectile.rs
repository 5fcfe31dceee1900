//! Homing projectiles.
//!
//! A replicated projectile is the visual copy of a shot computed elsewhere;
//! it flies and lands the same way but its hit is never turned into damage.

use crate::registry::EnemyKey;
use crate::timer::Countdown;
use shared::{TowerId, Vec3};

/// Seconds a projectile survives after its target disappears.
pub const LOST_TARGET_LIFETIME: f32 = 1.5;
pub const HIT_RADIUS: f32 = 0.3;
pub const SPLASH_RADIUS: f32 = 2.0;
pub const STUN_CHANCE: f64 = 0.15;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectileKind {
    Bullet,
    Rocket,
    NuclearRocket,
}

impl ProjectileKind {
    pub fn splash_radius(self) -> Option<f32> {
        match self {
            ProjectileKind::Bullet => None,
            ProjectileKind::Rocket | ProjectileKind::NuclearRocket => Some(SPLASH_RADIUS),
        }
    }

    pub fn stun_duration(self) -> f32 {
        match self {
            ProjectileKind::Bullet => 2.0,
            ProjectileKind::Rocket | ProjectileKind::NuclearRocket => 3.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProjectileOutcome {
    Flying,
    Hit { at: Vec3, target: EnemyKey },
    Expired,
}

#[derive(Debug, Clone)]
pub struct Projectile {
    pub kind: ProjectileKind,
    pub tower_id: TowerId,
    pub position: Vec3,
    pub target: EnemyKey,
    pub damage: f32,
    pub replicated: bool,
    speed: f32,
    lost: Option<Countdown>,
}

impl Projectile {
    pub fn new(
        kind: ProjectileKind,
        tower_id: TowerId,
        position: Vec3,
        target: EnemyKey,
        damage: f32,
        replicated: bool,
        speed: f32,
    ) -> Self {
        Self {
            kind,
            tower_id,
            position,
            target,
            damage,
            replicated,
            speed,
            lost: None,
        }
    }

    /// Advances towards the target's current position. Once the target is
    /// gone the projectile no longer collides and expires after a grace period.
    pub fn tick(&mut self, dt: f32, target_position: Option<Vec3>) -> ProjectileOutcome {
        if self.lost.is_none() {
            match target_position {
                Some(target) => {
                    self.position = self.position.move_towards(target, self.speed * dt);
                    if self.position.distance_squared(target) <= HIT_RADIUS * HIT_RADIUS {
                        return ProjectileOutcome::Hit {
                            at: self.position,
                            target: self.target,
                        };
                    }
                    return ProjectileOutcome::Flying;
                }
                None => self.lost = Some(Countdown::start(LOST_TARGET_LIFETIME)),
            }
        }
        let expired = self.lost.as_mut().map(|timer| timer.tick(dt)).unwrap_or(false);
        if expired {
            ProjectileOutcome::Expired
        } else {
            ProjectileOutcome::Flying
        }
    }

    pub fn has_lost_target(&self) -> bool {
        self.lost.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bullet() -> Projectile {
        Projectile::new(
            ProjectileKind::Bullet,
            1,
            Vec3::ZERO,
            EnemyKey::new(0, 0),
            10.0,
            false,
            10.0,
        )
    }

    #[test]
    fn test_homes_in_and_hits() {
        let mut projectile = bullet();
        let target = Vec3::new(0.0, 0.0, 15.0);
        assert_eq!(projectile.tick(1.0, Some(target)), ProjectileOutcome::Flying);
        match projectile.tick(1.0, Some(target)) {
            ProjectileOutcome::Hit { at, target: key } => {
                assert_eq!(at, target);
                assert_eq!(key, EnemyKey::new(0, 0));
            }
            other => panic!("Unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn test_expires_after_losing_target() {
        let mut projectile = bullet();
        assert_eq!(projectile.tick(1.0, None), ProjectileOutcome::Flying);
        assert!(projectile.has_lost_target());
        // Target reappearing does not revive the projectile.
        assert_eq!(
            projectile.tick(0.25, Some(Vec3::ZERO)),
            ProjectileOutcome::Flying
        );
        assert_eq!(projectile.tick(0.25, None), ProjectileOutcome::Expired);
    }

    #[test]
    fn test_rocket_kinds_splash() {
        assert_eq!(ProjectileKind::Bullet.splash_radius(), None);
        assert_eq!(ProjectileKind::NuclearRocket.splash_radius(), Some(SPLASH_RADIUS));
        assert_eq!(ProjectileKind::Rocket.stun_duration(), 3.0);
    }
}
