//! Presentation events.
//!
//! The simulation decides *that* something should be heard or shown and with
//! what value; whoever drains the queue decides how. The headless binary just
//! logs them.

use shared::{EnemyId, EnemyKind, PlayerIndex, SpawnerId, TowerId, TowerKind, Vec3};
use std::collections::VecDeque;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SoundKey {
    UiClick,
    Build,
    FireLaser,
    FireFlame,
    FireRocket,
    FireBoom,
    FireBullet,
}

impl SoundKey {
    pub fn for_tower(kind: TowerKind) -> SoundKey {
        match kind {
            TowerKind::Flame => SoundKey::FireFlame,
            TowerKind::Laser => SoundKey::FireLaser,
            TowerKind::Machine => SoundKey::FireBullet,
            TowerKind::Multiple => SoundKey::FireRocket,
            TowerKind::Rocket => SoundKey::FireBoom,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FloatingText {
    Damage(f64),
    Heal(f64),
    Gold(i64),
    Invincible,
}

impl fmt::Display for FloatingText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FloatingText::Damage(amount) => write!(f, "-{:.0}", amount),
            FloatingText::Heal(amount) => write!(f, "+{:.0}", amount),
            FloatingText::Gold(amount) => write!(f, "+{}G", amount),
            FloatingText::Invincible => write!(f, "Invincible"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum GameEvent {
    Sound(SoundKey),
    FloatingText {
        at: Vec3,
        text: FloatingText,
    },
    GoldChanged(i64),
    MatchStarted {
        start_unix: f64,
    },
    WaveStarted {
        spawner_id: SpawnerId,
        wave_index: i32,
    },
    WaveEnded {
        spawner_id: SpawnerId,
        timed_out: bool,
    },
    LineDefeated {
        spawner_id: SpawnerId,
    },
    EnemySpawned {
        spawner_id: SpawnerId,
        enemy_id: EnemyId,
        kind: EnemyKind,
    },
    EnemyDied {
        spawner_id: SpawnerId,
        enemy_id: EnemyId,
        awarded_gold: Option<i64>,
    },
    TowerFired {
        tower_id: TowerId,
        kind: TowerKind,
        replicated: bool,
    },
    BossSkillStarted {
        spawner_id: SpawnerId,
        enemy_id: EnemyId,
    },
    BossSkillFinished {
        spawner_id: SpawnerId,
        enemy_id: EnemyId,
    },
    TowerSilenced {
        tower_id: TowerId,
    },
    CursorChanged {
        active: bool,
    },
    BasePlaced {
        owner_index: PlayerIndex,
        base_net_id: i32,
    },
    BaseMoved {
        base_net_id: i32,
    },
    TowerBuilt {
        tower_id: TowerId,
        kind: TowerKind,
        level: i32,
    },
    LabUpgraded {
        owner_index: PlayerIndex,
        kind: TowerKind,
        level: i32,
    },
    TimeScaleChanged(f32),
    Notice(String),
}

#[derive(Debug, Default)]
pub struct EventQueue {
    events: VecDeque<GameEvent>,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: GameEvent) {
        self.events.push_back(event);
    }

    pub fn drain(&mut self) -> Vec<GameEvent> {
        self.events.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_floating_text_format() {
        assert_eq!(FloatingText::Damage(12.4).to_string(), "-12");
        assert_eq!(FloatingText::Heal(3.0).to_string(), "+3");
        assert_eq!(FloatingText::Gold(25).to_string(), "+25G");
    }

    #[test]
    fn test_queue_drains_in_order() {
        let mut queue = EventQueue::new();
        queue.push(GameEvent::GoldChanged(10));
        queue.push(GameEvent::Sound(SoundKey::Build));
        assert_eq!(queue.len(), 2);

        let drained = queue.drain();
        assert_eq!(drained[0], GameEvent::GoldChanged(10));
        assert_eq!(drained[1], GameEvent::Sound(SoundKey::Build));
        assert!(queue.is_empty());
    }
}
