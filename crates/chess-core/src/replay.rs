//! Position replay: moves are applied once at load time, and every ply keeps
//! the snapshot it produced so lookups never replay.

use shakmaty::fen::Fen;
use shakmaty::san::{San, SanPlus};
use shakmaty::uci::UciMove;
use shakmaty::{CastlingMode, Chess, Position};

use crate::error::PgnError;
use crate::game_data::{GameMetadata, GameMove, GameRecord, Snapshot};

/// Cursor value that denotes the initial position.
pub const INITIAL_PLY: isize = -1;

/// Board state at `index`: the initial position for -1, otherwise the
/// snapshot stored on that ply. `None` when `index` is out of range.
pub fn position_at(record: &GameRecord, index: isize) -> Option<&Snapshot> {
    if index == INITIAL_PLY {
        return Some(record.initial());
    }
    usize::try_from(index)
        .ok()
        .and_then(|i| record.moves().get(i))
        .map(|m| &m.snapshot)
}

/// Parse a FEN into a standard chess position.
pub fn position_from_fen(fen: &str) -> Result<Chess, PgnError> {
    let parsed: Fen = fen
        .trim()
        .parse()
        .map_err(|e| PgnError::InvalidFen(format!("{fen}: {e}")))?;
    parsed
        .into_position::<Chess>(CastlingMode::Standard)
        .map_err(|e| PgnError::UnsupportedPosition(e.to_string()))
}

/// Render a UCI move (e.g. from an engine) as SAN in the given position.
/// Returns `None` if the move is not legal there.
pub fn uci_to_san(position: &Chess, uci: &str) -> Option<String> {
    let parsed: UciMove = uci.parse().ok()?;
    let mv = parsed.to_move(position).ok()?;
    let mut pos = position.clone();
    Some(SanPlus::from_move_and_play_unchecked(&mut pos, mv).to_string())
}

/// Sequentially applies moves from a starting position, recording a
/// snapshot after each one.
#[derive(Debug, Clone)]
pub struct Replayer {
    initial: Snapshot,
    position: Chess,
    moves: Vec<GameMove>,
}

impl Replayer {
    pub fn new(start: Chess) -> Self {
        Self {
            initial: Snapshot::new(start.clone()),
            position: start,
            moves: Vec::new(),
        }
    }

    pub fn from_fen(fen: &str) -> Result<Self, PgnError> {
        Ok(Self::new(position_from_fen(fen)?))
    }

    pub fn ply(&self) -> usize {
        self.moves.len()
    }

    /// Apply a parsed SAN move. Illegal or ambiguous moves leave the
    /// replayer untouched.
    pub fn push_san(&mut self, san: &San) -> Result<(), PgnError> {
        let ply = self.moves.len();
        let mv = san.to_move(&self.position).map_err(|_| PgnError::IllegalMove {
            ply,
            san: san.to_string(),
        })?;

        let (from, to, promotion) = match mv.to_uci(CastlingMode::Standard) {
            UciMove::Normal {
                from,
                to,
                promotion,
            } => (from, to, promotion),
            _ => {
                return Err(PgnError::IllegalMove {
                    ply,
                    san: san.to_string(),
                })
            }
        };
        let uci = mv.to_uci(CastlingMode::Standard).to_string();
        let color = self.position.turn();
        let san_plus = SanPlus::from_move_and_play_unchecked(&mut self.position, mv);

        self.moves.push(GameMove {
            ply,
            san: san_plus.to_string(),
            uci,
            from,
            to,
            promotion,
            color,
            snapshot: Snapshot::new(self.position.clone()),
        });
        Ok(())
    }

    /// Parse and apply a SAN string such as `Nf3` or `exd8=Q+`.
    pub fn push_san_str(&mut self, san: &str) -> Result<(), PgnError> {
        let san_plus: SanPlus = san.trim().parse().map_err(|_| PgnError::InvalidSan {
            ply: self.moves.len(),
            san: san.to_string(),
        })?;
        self.push_san(&san_plus.san)
    }

    pub fn finish(self, metadata: GameMetadata) -> GameRecord {
        GameRecord::new(metadata, self.initial, self.moves)
    }
}

impl GameRecord {
    /// Build a record from a bare SAN list. `initial_fen` of `None` means the
    /// standard starting position. Result tokens are skipped.
    pub fn from_san_moves(initial_fen: Option<&str>, san_moves: &[String]) -> Result<Self, PgnError> {
        let mut replayer = match initial_fen {
            Some(fen) => Replayer::from_fen(fen)?,
            None => Replayer::new(Chess::default()),
        };
        for san in san_moves {
            let san = san.trim();
            if san.is_empty() || matches!(san, "1-0" | "0-1" | "1/2-1/2" | "*") {
                continue;
            }
            replayer.push_san_str(san)?;
        }
        Ok(replayer.finish(GameMetadata::default()))
    }
}
