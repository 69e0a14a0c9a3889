//! Game record parse errors

use thiserror::Error;

/// Failure to turn a game-record string into a `GameRecord`.
/// No partial record is ever produced alongside one of these.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PgnError {
    #[error("Game record contains no game")]
    Empty,

    #[error("Invalid FEN: {0}")]
    InvalidFen(String),

    #[error("Unsupported starting position: {0}")]
    UnsupportedPosition(String),

    #[error("Invalid SAN '{san}' at ply {ply}")]
    InvalidSan { ply: usize, san: String },

    #[error("Illegal move '{san}' at ply {ply}")]
    IllegalMove { ply: usize, san: String },

    #[error("Failed to read game record: {0}")]
    Io(String),
}
