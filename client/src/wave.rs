//! Per-line wave timeline.
//!
//! A line alternates between resting and running. Each wave's units are
//! dripped into the spawner queue one per tick while the spawner drains the
//! queue at its own pace; a wave completes when everything has been enqueued
//! and drained, or when the time limit forces it to end. Units still waiting
//! to be enqueued when a wave times out keep dripping during the rest and
//! ahead of the next wave's units.

use crate::config::WaveStats;
use crate::spawner::EnemySpawner;
use log::{debug, info, warn};
use shared::{EnemyKind, PlayerIndex, SpawnerId, WaveStart};
use std::collections::VecDeque;

/// Normal enemy kinds in the order they take over every ten waves.
pub const ROTATION: [EnemyKind; 4] = [
    EnemyKind::HealthRegen,
    EnemyKind::Invincible,
    EnemyKind::MovementSpeed,
    EnemyKind::Armor,
];

pub const NORMAL_BATCH: u32 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpawnBatch {
    pub kind: EnemyKind,
    pub count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Wave {
    pub spawns: Vec<SpawnBatch>,
}

impl Wave {
    pub fn unit_count(&self) -> u32 {
        self.spawns.iter().map(|batch| batch.count).sum()
    }
}

/// Normal kind for 1-based wave number `wave`; `None` on boss waves and for
/// numbers below 1.
pub fn normal_type_for_wave(wave: i32) -> Option<EnemyKind> {
    if wave <= 0 || wave % 10 == 0 {
        return None;
    }
    let segment = ((wave - 1) / 10) as usize;
    Some(ROTATION[segment % ROTATION.len()])
}

pub fn generate_waves(count: usize) -> Vec<Wave> {
    (1..=count as i32)
        .map(|wave| {
            let batch = match normal_type_for_wave(wave) {
                Some(kind) => SpawnBatch {
                    kind,
                    count: NORMAL_BATCH,
                },
                None => SpawnBatch {
                    kind: EnemyKind::Boss,
                    count: 1,
                },
            };
            Wave {
                spawns: vec![batch],
            }
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WaveState {
    Waiting { rested: f32 },
    Running { elapsed: f32 },
}

#[derive(Debug, Clone, PartialEq)]
pub enum WaveSignal {
    /// A wave began. `announce` is present when the stat table had an entry
    /// for it and should be broadcast as `WAVE_START`.
    Started {
        wave_index: i32,
        announce: Option<WaveStart>,
    },
    Completed,
    TimedOut,
    Defeated,
}

/// Session-wide inputs the scheduler reads when a wave starts.
#[derive(Debug, Clone, Copy)]
pub struct WaveContext<'a> {
    pub stats: &'a crate::config::WaveStatTable,
    pub health_multiplier: f64,
}

#[derive(Debug)]
pub struct WaveScheduler {
    spawner_id: SpawnerId,
    owner_index: PlayerIndex,
    waves: Vec<Wave>,
    state: WaveState,
    next_wave: usize,
    pending: VecDeque<EnemyKind>,
    enqueued_all: bool,
    rest_duration: f32,
    time_limit: f32,
    death_count: i32,
    max_death_count: i32,
    defeated: bool,
}

impl WaveScheduler {
    pub fn new(
        spawner_id: SpawnerId,
        owner_index: PlayerIndex,
        waves: Vec<Wave>,
        rest_duration: f32,
        time_limit: f32,
        max_death_count: i32,
    ) -> Self {
        Self {
            spawner_id,
            owner_index,
            waves,
            state: WaveState::Waiting { rested: 0.0 },
            next_wave: 0,
            pending: VecDeque::new(),
            enqueued_all: false,
            rest_duration,
            time_limit,
            death_count: 0,
            max_death_count,
            defeated: false,
        }
    }

    pub fn state(&self) -> WaveState {
        self.state
    }

    /// Index of the most recently started wave, or -1 before the first one.
    pub fn current_wave_index(&self) -> i32 {
        self.next_wave as i32 - 1
    }

    pub fn total_waves(&self) -> usize {
        self.waves.len()
    }

    pub fn death_count(&self) -> i32 {
        self.death_count
    }

    pub fn is_defeated(&self) -> bool {
        self.defeated
    }

    pub fn pending_units(&self) -> usize {
        self.pending.len()
    }

    /// Counts one more living enemy on the line. Returns true when the line
    /// has just reached its limit.
    pub fn increment_death_count(&mut self) -> bool {
        if self.death_count < self.max_death_count {
            self.death_count += 1;
        }
        self.check_defeat()
    }

    pub fn decrement_death_count(&mut self) {
        if self.death_count > 0 {
            self.death_count -= 1;
        }
    }

    fn check_defeat(&mut self) -> bool {
        if !self.defeated && self.death_count >= self.max_death_count {
            warn!(
                "Line {} reached {} live enemies, match over for player {}",
                self.spawner_id, self.death_count, self.owner_index
            );
            self.defeated = true;
            return true;
        }
        false
    }

    pub fn tick(
        &mut self,
        dt: f32,
        spawner: &mut EnemySpawner,
        context: &WaveContext<'_>,
    ) -> Vec<WaveSignal> {
        let mut signals = Vec::new();
        if self.defeated {
            return signals;
        }

        if let Some(kind) = self.pending.pop_front() {
            spawner.enqueue_enemy(kind);
            if self.pending.is_empty() {
                self.enqueued_all = true;
            }
        }

        match self.state {
            WaveState::Running { elapsed } => {
                let elapsed = elapsed + dt;
                if self.enqueued_all && spawner.queue_len() == 0 {
                    debug!("Line {} cleared its spawn queue", self.spawner_id);
                    self.finish_wave();
                    signals.push(WaveSignal::Completed);
                } else if elapsed >= self.time_limit {
                    info!("Line {} wave timed out", self.spawner_id);
                    self.finish_wave();
                    signals.push(WaveSignal::TimedOut);
                    if self.check_defeat() {
                        signals.push(WaveSignal::Defeated);
                    }
                } else {
                    self.state = WaveState::Running { elapsed };
                }
            }
            WaveState::Waiting { rested } => {
                let rested = rested + dt;
                if rested >= self.rest_duration {
                    self.state = WaveState::Waiting { rested };
                    if let Some(signal) = self.start_wave(spawner, context) {
                        signals.push(signal);
                    }
                } else {
                    self.state = WaveState::Waiting { rested };
                }
            }
        }
        signals
    }

    fn finish_wave(&mut self) {
        if !self.pending.is_empty() {
            debug!(
                "Line {} carries {} units over into the rest",
                self.spawner_id,
                self.pending.len()
            );
        }
        self.enqueued_all = false;
        self.state = WaveState::Waiting { rested: 0.0 };
    }

    /// Starts the next wave. Past the last wave this does nothing.
    pub fn start_wave(
        &mut self,
        spawner: &mut EnemySpawner,
        context: &WaveContext<'_>,
    ) -> Option<WaveSignal> {
        let wave = self.waves.get(self.next_wave)?.clone();
        let wave_index = self.next_wave as i32;

        let announce = match context.stats.get(self.next_wave) {
            Some(stats) => {
                apply_stats(spawner, stats, context.health_multiplier, wave_index);
                Some(WaveStart {
                    spawner_id: spawner.id,
                    owner_index: self.owner_index,
                    wave_index,
                    hp: spawner.wave_hp,
                    kill_gold: spawner.kill_gold,
                })
            }
            None => {
                warn!(
                    "No wave stats for wave {}, spawning with defaults",
                    wave_index
                );
                apply_stats(spawner, WaveStats::default(), context.health_multiplier, wave_index);
                None
            }
        };

        self.pending.extend(
            wave.spawns
                .iter()
                .flat_map(|batch| std::iter::repeat(batch.kind).take(batch.count as usize)),
        );
        self.enqueued_all = self.pending.is_empty();
        self.state = WaveState::Running { elapsed: 0.0 };
        self.next_wave += 1;

        info!(
            "Line {} starting wave {} ({} units)",
            self.spawner_id,
            wave_index + 1,
            wave.unit_count()
        );
        Some(WaveSignal::Started {
            wave_index,
            announce,
        })
    }
}

fn apply_stats(spawner: &mut EnemySpawner, stats: WaveStats, multiplier: f64, wave_index: i32) {
    spawner.wave_hp = stats.hp * multiplier;
    spawner.kill_gold = stats.kill_gold;
    spawner.wave_index = wave_index;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WaveStatTable;
    use shared::Vec3;

    fn spawner() -> EnemySpawner {
        EnemySpawner::new(0, 0, Vec3::ZERO, Vec3::new(0.0, 0.0, 1.0), 2.0, 2.0)
    }

    #[test]
    fn test_normal_type_rotation() {
        assert_eq!(normal_type_for_wave(0), None);
        assert_eq!(normal_type_for_wave(-3), None);
        assert_eq!(normal_type_for_wave(1), Some(EnemyKind::HealthRegen));
        assert_eq!(normal_type_for_wave(9), Some(EnemyKind::HealthRegen));
        assert_eq!(normal_type_for_wave(10), None);
        assert_eq!(normal_type_for_wave(11), Some(EnemyKind::Invincible));
        assert_eq!(normal_type_for_wave(25), Some(EnemyKind::MovementSpeed));
        assert_eq!(normal_type_for_wave(37), Some(EnemyKind::Armor));
        assert_eq!(normal_type_for_wave(41), Some(EnemyKind::HealthRegen));
    }

    #[test]
    fn test_generated_waves() {
        let waves = generate_waves(100);
        assert_eq!(waves.len(), 100);
        assert_eq!(
            waves[9].spawns,
            vec![SpawnBatch {
                kind: EnemyKind::Boss,
                count: 1
            }]
        );
        assert_eq!(
            waves[10].spawns,
            vec![SpawnBatch {
                kind: EnemyKind::Invincible,
                count: 30
            }]
        );
        assert_eq!(
            waves[36].spawns,
            vec![SpawnBatch {
                kind: EnemyKind::Armor,
                count: 30
            }]
        );
    }

    #[test]
    fn test_rest_then_start_with_scaled_stats() {
        let table = WaveStatTable::new(vec![WaveStats {
            hp: 100.0,
            kill_gold: 7,
        }]);
        let context = WaveContext {
            stats: &table,
            health_multiplier: 2.0,
        };
        let mut spawner = spawner();
        let mut scheduler = WaveScheduler::new(0, 0, generate_waves(3), 5.0, 120.0, 80);

        assert!(scheduler.tick(4.0, &mut spawner, &context).is_empty());
        let signals = scheduler.tick(1.0, &mut spawner, &context);
        match &signals[..] {
            [WaveSignal::Started {
                wave_index: 0,
                announce: Some(announce),
            }] => {
                assert_eq!(announce.hp, 200.0);
                assert_eq!(announce.kill_gold, 7);
            }
            other => panic!("Unexpected signals {:?}", other),
        }
        assert_eq!(spawner.wave_hp, 200.0);
        assert_eq!(scheduler.current_wave_index(), 0);
    }

    #[test]
    fn test_missing_stats_start_without_announce() {
        let table = WaveStatTable::new(Vec::new());
        let context = WaveContext {
            stats: &table,
            health_multiplier: 1.0,
        };
        let mut spawner = spawner();
        let mut scheduler = WaveScheduler::new(0, 0, generate_waves(1), 0.0, 120.0, 80);
        let signals = scheduler.tick(0.1, &mut spawner, &context);
        assert_eq!(
            signals,
            vec![WaveSignal::Started {
                wave_index: 0,
                announce: None
            }]
        );
        assert_eq!(spawner.wave_hp, 0.0);
    }

    #[test]
    fn test_drip_then_complete() {
        let table = WaveStatTable::built_in();
        let context = WaveContext {
            stats: &table,
            health_multiplier: 1.0,
        };
        let mut spawner = spawner();
        let mut scheduler = WaveScheduler::new(0, 0, generate_waves(10), 0.0, 120.0, 80);
        scheduler.tick(0.0, &mut spawner, &context);
        assert_eq!(scheduler.pending_units(), 30);

        scheduler.tick(0.0, &mut spawner, &context);
        assert_eq!(spawner.queue_len(), 1);
        assert_eq!(scheduler.pending_units(), 29);

        let mut completed = false;
        for _ in 0..200 {
            while spawner.tick(2.0).is_some() {}
            let signals = scheduler.tick(0.0, &mut spawner, &context);
            if signals.contains(&WaveSignal::Completed) {
                completed = true;
                break;
            }
        }
        assert!(completed);
        assert!(matches!(scheduler.state(), WaveState::Waiting { .. }));
    }

    #[test]
    fn test_timeout_ends_wave_and_checks_defeat() {
        let table = WaveStatTable::built_in();
        let context = WaveContext {
            stats: &table,
            health_multiplier: 1.0,
        };
        let mut spawner = spawner();
        let mut scheduler = WaveScheduler::new(0, 0, generate_waves(5), 0.0, 120.0, 3);
        scheduler.tick(0.0, &mut spawner, &context);
        for _ in 0..2 {
            assert!(!scheduler.increment_death_count());
        }
        scheduler.decrement_death_count();
        scheduler.increment_death_count();
        assert_eq!(scheduler.death_count(), 2);

        let signals = scheduler.tick(120.0, &mut spawner, &context);
        assert_eq!(signals, vec![WaveSignal::TimedOut]);
        assert_eq!(scheduler.pending_units(), 29);

        assert!(scheduler.increment_death_count());
        assert!(scheduler.is_defeated());
        assert!(scheduler.tick(10.0, &mut spawner, &context).is_empty());
    }

    #[test]
    fn test_timed_out_units_keep_dripping() {
        let table = WaveStatTable::built_in();
        let context = WaveContext {
            stats: &table,
            health_multiplier: 1.0,
        };
        let mut spawner = spawner();
        let mut scheduler = WaveScheduler::new(0, 0, generate_waves(5), 5.0, 120.0, 80);
        scheduler.tick(5.0, &mut spawner, &context);
        assert_eq!(scheduler.pending_units(), 30);

        assert_eq!(
            scheduler.tick(120.0, &mut spawner, &context),
            vec![WaveSignal::TimedOut]
        );
        assert_eq!(spawner.queue_len(), 1);
        assert_eq!(scheduler.pending_units(), 29);

        // the rest keeps feeding the spawner
        for _ in 0..4 {
            assert!(scheduler.tick(0.5, &mut spawner, &context).is_empty());
        }
        assert_eq!(spawner.queue_len(), 5);
        assert_eq!(scheduler.pending_units(), 25);

        // the next wave queues behind the leftovers
        let signals = scheduler.tick(3.0, &mut spawner, &context);
        assert!(matches!(signals[..], [WaveSignal::Started { wave_index: 1, .. }]));
        assert_eq!(spawner.queue_len(), 6);
        assert_eq!(scheduler.pending_units(), 54);
    }

    #[test]
    fn test_start_past_last_wave_is_noop() {
        let table = WaveStatTable::built_in();
        let context = WaveContext {
            stats: &table,
            health_multiplier: 1.0,
        };
        let mut spawner = spawner();
        let mut scheduler = WaveScheduler::new(0, 0, Vec::new(), 0.0, 120.0, 80);
        assert!(scheduler.start_wave(&mut spawner, &context).is_none());
        assert!(scheduler.tick(10.0, &mut spawner, &context).is_empty());
        assert_eq!(scheduler.current_wave_index(), -1);
    }
}
