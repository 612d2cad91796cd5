// Error taxonomy shared by the engine, the runner and the binary.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::engine::arena::Node;

/// Problems building or querying an arena.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ArenaError {
    #[error("malformed arena: {0}")]
    Malformed(String),
    #[error("no node with coordinates [{x}, {y}]")]
    OutOfBounds { x: i32, y: i32 },
}

/// Broken collectible bookkeeping. Always an engine bug when raised mid-game.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("node {node} already holds a collectible")]
    Occupied { node: Node },
    #[error("collectible {id} is not on the board")]
    NotFound { id: u32 },
    #[error("collectible {id} is already placed")]
    AlreadyPlaced { id: u32 },
}

/// Fatal problems detected before turn 0.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error(transparent)]
    Arena(#[from] ArenaError),
    #[error("invalid value '{value}' for '{key}': {reason}")]
    Config {
        key: String,
        value: String,
        reason: String,
    },
    #[error("the arena doesn't support {requested} players, only {supported}")]
    TooManyPlayers { requested: usize, supported: usize },
    #[error("a game needs at least one player")]
    NotEnoughPlayers,
    #[error("unknown strategy '{0}'")]
    UnknownStrategy(String),
    #[error("cannot start decision module for {0}")]
    Worker(String),
    #[error("missing required setting '{0}'")]
    MissingSetting(String),
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Why a participant's answer was replaced by STAY.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecisionError {
    #[error("no decision within {0:?}")]
    Timeout(Duration),
    #[error("decision module failed: {0}")]
    Malfunction(String),
    #[error("invalid decision: {0}")]
    Invalid(String),
    #[error("decision module is gone")]
    Disconnected,
}

impl DecisionError {
    /// Short label used for metrics and report output.
    pub fn reason(&self) -> &'static str {
        match self {
            DecisionError::Timeout(_) => "timeout",
            DecisionError::Malfunction(_) => "malfunction",
            DecisionError::Invalid(_) => "invalid",
            DecisionError::Disconnected => "disconnected",
        }
    }
}

/// Errors that abort a game.
#[derive(Debug, Error)]
pub enum GameError {
    #[error(transparent)]
    Setup(#[from] SetupError),
    #[error("engine invariant broken: {0}")]
    Invariant(String),
}

impl From<LedgerError> for GameError {
    fn from(e: LedgerError) -> Self {
        GameError::Invariant(e.to_string())
    }
}
