//! Gold, escalating build prices and lab levels for the local player.

use shared::TowerKind;
use std::collections::HashMap;

/// Builds after which the price growth softens.
pub const SOFT_CAP_BUILDS: u32 = 45;
const EARLY_GROWTH: f64 = 1.7;
const LATE_GROWTH: f64 = 1.2;

pub fn base_build_cost(kind: TowerKind) -> i64 {
    match kind {
        TowerKind::Flame | TowerKind::Laser => 50,
        TowerKind::Machine | TowerKind::Multiple => 200,
        TowerKind::Rocket => 300,
    }
}

/// Price of the next tower after `count` builds of the same kind.
pub fn escalated_cost(base: i64, count: u32) -> i64 {
    let base = base as f64;
    let cost = if count < SOFT_CAP_BUILDS {
        base * EARLY_GROWTH.powi(count as i32)
    } else {
        base * EARLY_GROWTH.powi(SOFT_CAP_BUILDS as i32)
            * LATE_GROWTH.powi((count - SOFT_CAP_BUILDS) as i32)
    };
    if cost >= i64::MAX as f64 {
        i64::MAX
    } else {
        cost as i64
    }
}

#[derive(Debug, Clone)]
pub struct Economy {
    gold: i64,
    build_counts: HashMap<TowerKind, u32>,
    lab_levels: HashMap<TowerKind, i32>,
}

impl Economy {
    pub fn new(starting_gold: i64) -> Self {
        Self {
            gold: starting_gold,
            build_counts: HashMap::new(),
            lab_levels: HashMap::new(),
        }
    }

    pub fn gold(&self) -> i64 {
        self.gold
    }

    pub fn add_gold(&mut self, amount: i64) -> i64 {
        self.gold = self.gold.saturating_add(amount);
        self.gold
    }

    /// Deducts `amount` when affordable.
    pub fn spend(&mut self, amount: i64) -> bool {
        if amount < 0 || self.gold < amount {
            return false;
        }
        self.gold -= amount;
        true
    }

    pub fn build_count(&self, kind: TowerKind) -> u32 {
        self.build_counts.get(&kind).copied().unwrap_or(0)
    }

    pub fn build_cost(&self, kind: TowerKind) -> i64 {
        escalated_cost(base_build_cost(kind), self.build_count(kind))
    }

    pub fn record_build(&mut self, kind: TowerKind) {
        *self.build_counts.entry(kind).or_insert(0) += 1;
    }

    pub fn lab_level(&self, kind: TowerKind) -> i32 {
        self.lab_levels.get(&kind).copied().unwrap_or(1)
    }

    /// Raises the lab level of `kind`; lower values are ignored.
    pub fn set_lab_level(&mut self, kind: TowerKind, level: i32) -> bool {
        if level <= self.lab_level(kind) {
            return false;
        }
        self.lab_levels.insert(kind, level);
        true
    }
}
