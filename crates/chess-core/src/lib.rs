//! Chess game records: PGN loading, position replay, evaluation scores and
//! move-quality annotation.

pub mod annotation;
pub mod error;
pub mod game_data;
pub mod pgn;
pub mod replay;
pub mod score;

pub use annotation::Annotation;
pub use error::PgnError;
pub use game_data::{GameMetadata, GameMove, GameRecord, Snapshot};
pub use pgn::load_pgn;
pub use replay::{position_at, INITIAL_PLY};
pub use score::{bar_position, bar_position_with_cap, normalize, EvaluationScore, DEFAULT_EVAL_BAR_CAP};
