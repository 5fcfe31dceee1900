//! Id-keyed tables for every live entity in a session.
//!
//! Cross references between entities are plain ids resolved through these
//! tables (an enemy names its spawner, a tower names its base). Maps are
//! ordered so iteration is deterministic across runs with the same seed.

use crate::base::TowerBase;
use crate::enemy::Enemy;
use crate::grid::ObstacleProbe;
use crate::spawner::EnemySpawner;
use crate::tower::Tower;
use shared::{BaseNetId, EnemyId, SpawnerId, TowerId, Vec3};
use std::collections::BTreeMap;

/// Enemy ids are only unique within their spawner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EnemyKey {
    pub spawner_id: SpawnerId,
    pub enemy_id: EnemyId,
}

impl EnemyKey {
    pub fn new(spawner_id: SpawnerId, enemy_id: EnemyId) -> Self {
        Self {
            spawner_id,
            enemy_id,
        }
    }
}

#[derive(Debug, Default)]
pub struct EntityRegistry {
    pub spawners: BTreeMap<SpawnerId, EnemySpawner>,
    pub enemies: BTreeMap<EnemyKey, Enemy>,
    pub towers: BTreeMap<TowerId, Tower>,
    pub bases: BTreeMap<BaseNetId, TowerBase>,
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enemy(&self, key: EnemyKey) -> Option<&Enemy> {
        self.enemies.get(&key)
    }

    pub fn enemy_mut(&mut self, key: EnemyKey) -> Option<&mut Enemy> {
        self.enemies.get_mut(&key)
    }

    /// Position of a living enemy, used for targeting and homing.
    pub fn enemy_position(&self, key: EnemyKey) -> Option<Vec3> {
        self.enemies
            .get(&key)
            .filter(|enemy| !enemy.is_dead())
            .map(|enemy| enemy.position)
    }

    pub fn living_enemies(&self) -> impl Iterator<Item = (&EnemyKey, &Enemy)> {
        self.enemies.iter().filter(|(_, enemy)| !enemy.is_dead())
    }

    /// Inserts a new enemy. A key that is already present is left untouched.
    pub fn insert_enemy(&mut self, enemy: Enemy) -> bool {
        let key = enemy.key();
        if self.enemies.contains_key(&key) {
            return false;
        }
        self.enemies.insert(key, enemy);
        true
    }

    pub fn remove_enemy(&mut self, key: EnemyKey) -> Option<Enemy> {
        self.enemies.remove(&key)
    }

    pub fn tower_on_base(&self, base_net_id: BaseNetId) -> Option<&Tower> {
        self.bases
            .get(&base_net_id)
            .and_then(|base| base.tower)
            .and_then(|tower_id| self.towers.get(&tower_id))
    }

    pub fn enemy_count(&self) -> usize {
        self.enemies.len()
    }
}

impl ObstacleProbe for EntityRegistry {
    fn is_blocked(&self, center: Vec3, half_extent: f32) -> bool {
        self.bases.values().any(|base| {
            let p = base.position.flat();
            (p.x - center.x).abs() < half_extent && (p.z - center.z).abs() < half_extent
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enemy::EnemyStats;
    use shared::EnemyKind;

    fn enemy(spawner_id: SpawnerId, enemy_id: EnemyId) -> Enemy {
        Enemy::new(
            EnemyStats {
                id: enemy_id,
                spawner_id,
                owner_index: spawner_id,
                kind: EnemyKind::HealthRegen,
                hp: 100.0,
                armor: 0.0,
                kill_gold: 5,
                position: Vec3::ZERO,
            },
            true,
        )
    }

    #[test]
    fn test_enemy_keys_are_scoped_by_spawner() {
        let mut registry = EntityRegistry::new();
        assert!(registry.insert_enemy(enemy(0, 1)));
        assert!(registry.insert_enemy(enemy(1, 1)));
        assert!(!registry.insert_enemy(enemy(0, 1)));
        assert_eq!(registry.enemy_count(), 2);
    }

    #[test]
    fn test_dead_enemies_have_no_position() {
        let mut registry = EntityRegistry::new();
        registry.insert_enemy(enemy(0, 3));
        let key = EnemyKey::new(0, 3);
        assert!(registry.enemy_position(key).is_some());

        registry.enemy_mut(key).unwrap().die_replicated();
        assert!(registry.enemy_position(key).is_none());
        assert_eq!(registry.living_enemies().count(), 0);
    }

    #[test]
    fn test_bases_block_their_cell() {
        let mut registry = EntityRegistry::new();
        registry.bases.insert(
            7,
            TowerBase::new(7, 0, Vec3::new(2.0, 0.1, 2.0)),
        );
        assert!(registry.is_blocked(Vec3::new(2.0, 0.0, 2.0), 0.5));
        assert!(!registry.is_blocked(Vec3::new(3.0, 0.0, 2.0), 0.5));
    }
}
