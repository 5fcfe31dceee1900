//! Text commands for the headless client, one per line on stdin.

use crate::registry::EnemyKey;
use crate::session::{Selection, Session};
use log::info;
use shared::{TowerKind, Vec3};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlayerAction {
    ToggleBuild,
    ToggleMove,
    Confirm,
    Cancel,
    PointAt { x: f32, z: f32 },
    Select(Selection),
    CreateTower(TowerKind),
    UpgradeLab(TowerKind),
    ToggleSpeed,
    Start,
    Status,
    Quit,
}

#[derive(Debug, Error, PartialEq)]
pub enum InputError {
    #[error("empty command")]
    Empty,
    #[error("unknown command '{0}'")]
    UnknownCommand(String),
    #[error("'{command}' expects {expected}")]
    Usage {
        command: &'static str,
        expected: &'static str,
    },
    #[error("unknown tower kind '{0}'")]
    TowerKind(String),
}

/// What the caller should do after an action ran.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionResult {
    Done(bool),
    Status(String),
    Quit,
}

/// Parses stdin lines into actions and counts how many were accepted.
#[derive(Debug, Default)]
pub struct InputManager {
    parsed: u64,
}

impl InputManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parsed(&self) -> u64 {
        self.parsed
    }

    pub fn parse_line(&mut self, line: &str) -> Result<PlayerAction, InputError> {
        let action = parse_action(line)?;
        self.parsed += 1;
        Ok(action)
    }
}

fn parse_action(line: &str) -> Result<PlayerAction, InputError> {
    let words: Vec<&str> = line.split_whitespace().collect();
    let Some((command, args)) = words.split_first() else {
        return Err(InputError::Empty);
    };

    let action = match (command.to_ascii_lowercase().as_str(), args) {
        ("build", []) => PlayerAction::ToggleBuild,
        ("move", []) => PlayerAction::ToggleMove,
        ("confirm" | "place", []) => PlayerAction::Confirm,
        ("cancel" | "esc", []) => PlayerAction::Cancel,
        ("point", [x, z]) => PlayerAction::PointAt {
            x: number(x, "point", "<x> <z>")?,
            z: number(z, "point", "<x> <z>")?,
        },
        ("point", _) => return Err(usage("point", "<x> <z>")),
        ("select", [what, rest @ ..]) => PlayerAction::Select(parse_selection(what, rest)?),
        ("select", []) => return Err(usage("select", "base|tower|enemy|lab")),
        ("tower", [kind]) => PlayerAction::CreateTower(tower_kind(kind)?),
        ("tower", _) => return Err(usage("tower", "<kind>")),
        ("lab", [kind]) => PlayerAction::UpgradeLab(tower_kind(kind)?),
        ("lab", _) => return Err(usage("lab", "<kind>")),
        ("speed", []) => PlayerAction::ToggleSpeed,
        ("start", []) => PlayerAction::Start,
        ("status", []) => PlayerAction::Status,
        ("quit" | "exit", []) => PlayerAction::Quit,
        (other, _) => return Err(InputError::UnknownCommand(other.to_string())),
    };
    Ok(action)
}

fn parse_selection(what: &str, args: &[&str]) -> Result<Selection, InputError> {
    const EXPECTED: &str = "base <id> | tower <id> | enemy <spawner> <id> | lab";
    match (what, args) {
        ("base", [id]) => Ok(Selection::Base(number(id, "select", EXPECTED)?)),
        ("tower", [id]) => Ok(Selection::Tower(number(id, "select", EXPECTED)?)),
        ("enemy", [spawner, id]) => Ok(Selection::Enemy(EnemyKey::new(
            number(spawner, "select", EXPECTED)?,
            number(id, "select", EXPECTED)?,
        ))),
        ("lab", []) => Ok(Selection::Lab),
        _ => Err(usage("select", EXPECTED)),
    }
}

fn number<T: std::str::FromStr>(
    word: &str,
    command: &'static str,
    expected: &'static str,
) -> Result<T, InputError> {
    word.parse().map_err(|_| usage(command, expected))
}

fn usage(command: &'static str, expected: &'static str) -> InputError {
    InputError::Usage { command, expected }
}

fn tower_kind(word: &str) -> Result<TowerKind, InputError> {
    TowerKind::parse(word).ok_or_else(|| InputError::TowerKind(word.to_string()))
}

fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_secs_f64()
}

/// Runs one action against the session.
pub fn apply_action(session: &mut Session, action: PlayerAction) -> ActionResult {
    let done = match action {
        PlayerAction::ToggleBuild => session.request_build_toggle(),
        PlayerAction::ToggleMove => session.request_move_toggle(),
        PlayerAction::Confirm => session.confirm_placement(),
        PlayerAction::Cancel => {
            session.cancel_action();
            true
        }
        PlayerAction::PointAt { x, z } => {
            session.point_at(Vec3::new(x, 0.0, z));
            true
        }
        PlayerAction::Select(selection) => session.select(selection),
        PlayerAction::CreateTower(kind) => session.create_tower(kind),
        PlayerAction::UpgradeLab(kind) => session.upgrade_lab(kind),
        PlayerAction::ToggleSpeed => session.toggle_timescale(),
        PlayerAction::Start => {
            let started = session.broadcast_game_start(unix_now());
            if started {
                info!("Match start announced");
            }
            started
        }
        PlayerAction::Status => return ActionResult::Status(session.status_line()),
        PlayerAction::Quit => return ActionResult::Quit,
    };
    ActionResult::Done(done)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionConfig;

    #[test]
    fn test_parse_commands() {
        let mut input = InputManager::new();
        assert_eq!(input.parse_line("build"), Ok(PlayerAction::ToggleBuild));
        assert_eq!(
            input.parse_line("  point 3.5 -2 "),
            Ok(PlayerAction::PointAt { x: 3.5, z: -2.0 })
        );
        assert_eq!(
            input.parse_line("select enemy 1 42"),
            Ok(PlayerAction::Select(Selection::Enemy(EnemyKey::new(1, 42))))
        );
        assert_eq!(
            input.parse_line("select base 100001"),
            Ok(PlayerAction::Select(Selection::Base(100_001)))
        );
        assert_eq!(
            input.parse_line("tower Rocket"),
            Ok(PlayerAction::CreateTower(TowerKind::Rocket))
        );
        assert_eq!(input.parse_line("QUIT"), Ok(PlayerAction::Quit));
        assert_eq!(input.parsed(), 6);
    }

    #[test]
    fn test_rejects_bad_input() {
        let mut input = InputManager::new();
        assert_eq!(input.parse_line("   "), Err(InputError::Empty));
        assert!(matches!(
            input.parse_line("jump"),
            Err(InputError::UnknownCommand(_))
        ));
        assert!(matches!(
            input.parse_line("point 1"),
            Err(InputError::Usage { command: "point", .. })
        ));
        assert!(matches!(
            input.parse_line("select base x"),
            Err(InputError::Usage { .. })
        ));
        assert_eq!(
            input.parse_line("lab cannon"),
            Err(InputError::TowerKind("cannon".to_string()))
        );
        assert_eq!(input.parsed(), 0);
    }

    #[test]
    fn test_apply_build_flow() {
        let mut session = Session::new(SessionConfig::default());
        let mut input = InputManager::new();
        for line in ["build", "point 2.2 3.9", "confirm", "cancel"] {
            let action = input.parse_line(line).unwrap();
            assert_eq!(apply_action(&mut session, action), ActionResult::Done(true));
        }
        assert_eq!(session.registry().bases.len(), 1);
        let base = session.registry().bases.values().next().unwrap();
        assert_eq!((base.position.x, base.position.z), (2.0, 4.0));

        let action = input.parse_line("status").unwrap();
        assert!(matches!(apply_action(&mut session, action), ActionResult::Status(_)));
        assert_eq!(apply_action(&mut session, PlayerAction::Quit), ActionResult::Quit);
    }
}
