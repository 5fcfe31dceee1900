//! Session configuration and balance data.
//!
//! Timing constants are gathered into one [`SessionConfig`] built once per
//! session. Balance tables (per-wave enemy stats and per-level tower stats)
//! are JSON documents; when a file is absent the built-in tables are used and
//! a warning is logged.

use crate::error::ConfigError;
use log::{info, warn};
use serde::Deserialize;
use shared::{PlayerIndex, TowerKind};
use std::path::Path;

/// Highest supported player count; one enemy line per player.
pub const MAX_PLAYERS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum Difficulty {
    Easy,
    #[default]
    Normal,
    Hard,
}

impl Difficulty {
    /// Multiplier applied to every wave's base HP.
    pub fn health_multiplier(self) -> f64 {
        match self {
            Difficulty::Easy => 0.5,
            Difficulty::Normal => 1.0,
            Difficulty::Hard => 2.0,
        }
    }

    /// Armor percent stamped on every enemy a local spawner creates.
    pub fn enemy_armor(self) -> f32 {
        match self {
            Difficulty::Easy => 0.0,
            Difficulty::Normal => 25.0,
            Difficulty::Hard => 50.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
pub struct WaveStats {
    #[serde(rename = "HP", default)]
    pub hp: f64,
    #[serde(rename = "KillGold", default)]
    pub kill_gold: i64,
}

#[derive(Debug, Deserialize)]
struct WaveStatsFile {
    #[serde(rename = "EnemyStatus", default)]
    enemy_status: Vec<WaveStats>,
}

/// Base HP and kill gold per wave index.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WaveStatTable {
    entries: Vec<WaveStats>,
}

impl WaveStatTable {
    pub fn new(entries: Vec<WaveStats>) -> Self {
        Self { entries }
    }

    pub fn from_json(text: &str, path: &str) -> Result<Self, ConfigError> {
        let file: WaveStatsFile =
            serde_json::from_str(text).map_err(|source| ConfigError::Parse {
                path: path.to_string(),
                source,
            })?;
        Ok(Self::new(file.enemy_status))
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = read_file(path)?;
        let table = Self::from_json(&text, &path.display().to_string())?;
        info!("Loaded {} wave stat entries from {}", table.len(), path.display());
        Ok(table)
    }

    /// Loads `path` when given, falling back to the built-in table if the
    /// file is missing. A file that exists but does not parse is an error.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) if path.exists() => Self::load(path),
            Some(path) => {
                warn!(
                    "Wave stat table {} not found, using built-in stats",
                    path.display()
                );
                Ok(Self::built_in())
            }
            None => Ok(Self::built_in()),
        }
    }

    /// Gentle exponential curve with a spike on every boss wave.
    pub fn built_in() -> Self {
        let entries = (0..100)
            .map(|index: i32| {
                let mut hp = (60.0 * 1.06f64.powi(index)).round();
                let mut kill_gold = 5 + i64::from(index / 5);
                if (index + 1) % 10 == 0 {
                    hp *= 25.0;
                    kill_gold *= 20;
                }
                WaveStats { hp, kill_gold }
            })
            .collect();
        Self { entries }
    }

    pub fn get(&self, wave_index: usize) -> Option<WaveStats> {
        self.entries.get(wave_index).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// One row of the tower upgrade table: damage and lab cost per tower kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct UpgradeLevel {
    pub level: i32,
    pub rocket: f32,
    pub rocket_cost: f32,
    pub multiple: f32,
    pub multiple_cost: f32,
    pub machine: f32,
    pub machine_cost: f32,
    pub laser: f32,
    pub laser_cost: f32,
    pub flame: f32,
    pub flame_cost: f32,
}

impl UpgradeLevel {
    pub fn damage(&self, kind: TowerKind) -> f32 {
        match kind {
            TowerKind::Rocket => self.rocket,
            TowerKind::Multiple => self.multiple,
            TowerKind::Machine => self.machine,
            TowerKind::Laser => self.laser,
            TowerKind::Flame => self.flame,
        }
    }

    pub fn cost(&self, kind: TowerKind) -> f32 {
        match kind {
            TowerKind::Rocket => self.rocket_cost,
            TowerKind::Multiple => self.multiple_cost,
            TowerKind::Machine => self.machine_cost,
            TowerKind::Laser => self.laser_cost,
            TowerKind::Flame => self.flame_cost,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TowerUpgradeFile {
    #[serde(rename = "TowerUpgrade", default)]
    tower_upgrade: Vec<UpgradeLevel>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct TowerUpgradeTable {
    levels: Vec<UpgradeLevel>,
}

impl TowerUpgradeTable {
    pub fn new(levels: Vec<UpgradeLevel>) -> Self {
        Self { levels }
    }

    pub fn from_json(text: &str, path: &str) -> Result<Self, ConfigError> {
        let file: TowerUpgradeFile =
            serde_json::from_str(text).map_err(|source| ConfigError::Parse {
                path: path.to_string(),
                source,
            })?;
        Ok(Self::new(file.tower_upgrade))
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = read_file(path)?;
        let table = Self::from_json(&text, &path.display().to_string())?;
        info!("Loaded {} tower upgrade levels from {}", table.len(), path.display());
        Ok(table)
    }

    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) if path.exists() => Self::load(path),
            Some(path) => {
                warn!(
                    "Tower upgrade table {} not found, using built-in levels",
                    path.display()
                );
                Ok(Self::built_in())
            }
            None => Ok(Self::built_in()),
        }
    }

    /// Ten levels; damage grows 35% per level and lab cost grows linearly.
    pub fn built_in() -> Self {
        let levels = (1..=10)
            .map(|level: i32| {
                let growth = 1.0 + 0.35 * (level - 1) as f32;
                let price = if level == 1 { 0.0 } else { level as f32 };
                UpgradeLevel {
                    level,
                    rocket: 120.0 * growth,
                    rocket_cost: 250.0 * price,
                    multiple: 14.0 * growth,
                    multiple_cost: 150.0 * price,
                    machine: 10.0 * growth,
                    machine_cost: 150.0 * price,
                    laser: 6.0 * growth,
                    laser_cost: 80.0 * price,
                    flame: 4.0 * growth,
                    flame_cost: 80.0 * price,
                }
            })
            .collect();
        Self { levels }
    }

    pub fn level(&self, level: i32) -> Option<&UpgradeLevel> {
        self.levels.iter().find(|row| row.level == level)
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }
}

fn read_file(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })
}

/// Every tunable of one game session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub local_player: PlayerIndex,
    pub player_count: usize,
    pub difficulty: Difficulty,
    pub seed: u64,

    pub total_waves: usize,
    pub wave_rest: f32,
    pub wave_time_limit: f32,
    pub max_death_count: i32,

    pub spawn_interval: f32,
    pub spawn_distance: f32,

    pub grid_size: f32,
    pub starting_gold: i64,
    pub base_cost: i64,

    pub tower_range: f32,
    pub projectile_speed: f32,
    pub silence_duration: f32,

    pub wave_stats: WaveStatTable,
    pub tower_upgrades: TowerUpgradeTable,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            local_player: 0,
            player_count: 1,
            difficulty: Difficulty::Normal,
            seed: 0,
            total_waves: 100,
            wave_rest: 5.0,
            wave_time_limit: 120.0,
            max_death_count: 80,
            spawn_interval: 2.0,
            spawn_distance: 2.0,
            grid_size: 1.0,
            starting_gold: 1000,
            base_cost: 100,
            tower_range: 8.0,
            projectile_speed: 40.0,
            silence_duration: 5.0,
            wave_stats: WaveStatTable::built_in(),
            tower_upgrades: TowerUpgradeTable::built_in(),
        }
    }
}

impl SessionConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.player_count == 0 || self.player_count > MAX_PLAYERS {
            return Err(ConfigError::PlayerCount {
                players: self.player_count,
                max: MAX_PLAYERS,
            });
        }
        if self.local_player < 0 || self.local_player as usize >= self.player_count {
            return Err(ConfigError::PlayerIndex {
                index: self.local_player,
                players: self.player_count,
            });
        }
        Ok(())
    }

    pub fn is_valid_player(&self, index: PlayerIndex) -> bool {
        index >= 0 && (index as usize) < self.player_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_difficulty_tiers() {
        assert_approx_eq!(Difficulty::Easy.health_multiplier(), 0.5, 1e-9);
        assert_approx_eq!(Difficulty::Hard.health_multiplier(), 2.0, 1e-9);
        assert_eq!(Difficulty::Easy.enemy_armor(), 0.0);
        assert_eq!(Difficulty::Normal.enemy_armor(), 25.0);
        assert_eq!(Difficulty::Hard.enemy_armor(), 50.0);
    }

    #[test]
    fn test_wave_table_parses_row_layout() {
        let text = r#"{"EnemyStatus":[{"HP":100,"KillGold":5},{"HP":150,"KillGold":6}]}"#;
        let table = WaveStatTable::from_json(text, "inline").unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.get(1), Some(WaveStats { hp: 150.0, kill_gold: 6 }));
        assert_eq!(table.get(2), None);
    }

    #[test]
    fn test_wave_table_parse_error_names_path() {
        let err = WaveStatTable::from_json("{broken", "waves.json").unwrap_err();
        assert!(err.to_string().contains("waves.json"));
    }

    #[test]
    fn test_upgrade_table_parses_pascal_case() {
        let text = r#"{"TowerUpgrade":[{"Level":2,"Flame":7.5,"FlameCost":120,"Rocket":200,"RocketCost":500}]}"#;
        let table = TowerUpgradeTable::from_json(text, "inline").unwrap();
        let row = table.level(2).unwrap();
        assert_approx_eq!(row.damage(TowerKind::Flame), 7.5, 1e-6);
        assert_approx_eq!(row.cost(TowerKind::Rocket), 500.0, 1e-6);
        assert_eq!(row.damage(TowerKind::Laser), 0.0);
        assert!(table.level(3).is_none());
    }

    #[test]
    fn test_missing_file_falls_back_to_built_in() {
        let path = Path::new("definitely/not/here.json");
        let waves = WaveStatTable::load_or_default(Some(path)).unwrap();
        assert_eq!(waves.len(), 100);
        let upgrades = TowerUpgradeTable::load_or_default(Some(path)).unwrap();
        assert_eq!(upgrades.len(), 10);
    }

    #[test]
    fn test_built_in_boss_waves_are_tougher() {
        let table = WaveStatTable::built_in();
        let normal = table.get(8).unwrap();
        let boss = table.get(9).unwrap();
        assert!(boss.hp > normal.hp * 10.0);
        assert!(boss.kill_gold > normal.kill_gold);
    }

    #[test]
    fn test_validate_rejects_bad_player_index() {
        let config = SessionConfig {
            local_player: 2,
            player_count: 2,
            ..SessionConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::PlayerIndex { index: 2, players: 2 })
        ));
        assert!(SessionConfig::default().validate().is_ok());
    }
}
