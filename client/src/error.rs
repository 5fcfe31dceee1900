use thiserror::Error;

/// Failures while assembling a session from flags and data files.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse '{path}': {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("player index {index} is outside 0..{players}")]
    PlayerIndex { index: i32, players: usize },

    #[error("a session needs between 1 and {max} players, got {players}")]
    PlayerCount { players: usize, max: usize },

    #[error("tick rate must be positive")]
    TickRate,
}
