//! Per-line enemy spawner with a throttled FIFO queue.

use crate::enemy::{Enemy, EnemyStats};
use log::debug;
use shared::{EnemyId, EnemyKind, EnemySpawn, PlayerIndex, SpawnerId, Vec3};
use std::collections::VecDeque;

#[derive(Debug, Clone)]
pub struct EnemySpawner {
    pub id: SpawnerId,
    pub owner_index: PlayerIndex,
    pub position: Vec3,
    pub forward: Vec3,
    /// Base HP for the current wave, already scaled by difficulty.
    pub wave_hp: f64,
    pub kill_gold: i64,
    pub wave_index: i32,
    /// Armor percent stamped on every locally spawned enemy.
    pub armor: f32,
    queue: VecDeque<EnemyKind>,
    spawn_interval: f32,
    spawn_distance: f32,
    since_last_spawn: f32,
    next_enemy_id: EnemyId,
}

impl EnemySpawner {
    pub fn new(
        id: SpawnerId,
        owner_index: PlayerIndex,
        position: Vec3,
        forward: Vec3,
        spawn_interval: f32,
        spawn_distance: f32,
    ) -> Self {
        Self {
            id,
            owner_index,
            position,
            forward,
            wave_hp: 0.0,
            kill_gold: 0,
            wave_index: 0,
            armor: 0.0,
            queue: VecDeque::new(),
            spawn_interval,
            spawn_distance,
            since_last_spawn: 0.0,
            next_enemy_id: 0,
        }
    }

    pub fn enqueue_enemy(&mut self, kind: EnemyKind) {
        self.queue.push_back(kind);
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn clear_queue(&mut self) {
        self.queue.clear();
    }

    /// Returns the next kind to instantiate once the spawn interval has
    /// elapsed and something is queued. The interval keeps accumulating while
    /// the queue is empty, so the first enemy of a wave appears immediately.
    pub fn tick(&mut self, dt: f32) -> Option<EnemyKind> {
        self.since_last_spawn += dt;
        if self.since_last_spawn < self.spawn_interval {
            return None;
        }
        let kind = self.queue.pop_front()?;
        self.since_last_spawn = 0.0;
        Some(kind)
    }

    pub fn spawn_position(&self) -> Vec3 {
        self.position.add(self.forward.scale(self.spawn_distance))
    }

    /// Creates an enemy owned by this client and the message announcing it.
    pub fn spawn_local(&mut self, kind: EnemyKind) -> (Enemy, EnemySpawn) {
        let enemy_id = self.next_enemy_id;
        self.next_enemy_id += 1;

        let stats = EnemyStats {
            id: enemy_id,
            spawner_id: self.id,
            owner_index: self.owner_index,
            kind,
            hp: self.wave_hp,
            armor: self.armor,
            kill_gold: self.kill_gold,
            position: self.spawn_position(),
        };
        debug!(
            "Spawner {} spawning {:?} #{} with {} HP",
            self.id, kind, enemy_id, self.wave_hp
        );
        let message = EnemySpawn {
            enemy_id,
            spawner_id: self.id,
            enemy_type: kind,
            position: stats.position,
            hp: stats.hp,
            armor: stats.armor,
            kill_gold: stats.kill_gold,
            owner_index: self.owner_index,
        };
        (Enemy::new(stats, true), message)
    }

    /// Mirrors an enemy announced by the line owner, keeping its id.
    pub fn spawn_remote(&self, message: &EnemySpawn) -> Enemy {
        Enemy::new(
            EnemyStats {
                id: message.enemy_id,
                spawner_id: self.id,
                owner_index: self.owner_index,
                kind: message.enemy_type,
                hp: message.hp,
                armor: message.armor,
                kill_gold: message.kill_gold,
                position: message.position,
            },
            false,
        )
    }
}
