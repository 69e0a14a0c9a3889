use serde::{Deserialize, Serialize};
use shakmaty::fen::Fen;
use shakmaty::{Chess, Color, EnPassantMode, Position, Role, Square};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameMetadata {
    pub white: String,
    pub black: String,
    pub result: String, // "1-0", "0-1", "1/2-1/2", "*"
    pub date: Option<String>,
    pub time_control: Option<String>,
    pub eco: Option<String>,
    pub event: Option<String>,
    pub link: Option<String>,
}

/// A complete board state plus its FEN rendering.
#[derive(Debug, Clone)]
pub struct Snapshot {
    fen: String,
    position: Chess,
}

impl Snapshot {
    pub fn new(position: Chess) -> Self {
        let fen = Fen::from_position(&position, EnPassantMode::Legal).to_string();
        Self { fen, position }
    }

    pub fn fen(&self) -> &str {
        &self.fen
    }

    pub fn position(&self) -> &Chess {
        &self.position
    }

    pub fn turn(&self) -> Color {
        self.position.turn()
    }

    /// Strips move counters from FEN, keeping only position + side + castling + ep.
    pub fn normalized_fen(&self) -> String {
        self.fen.split_whitespace().take(4).collect::<Vec<_>>().join(" ")
    }
}

impl Default for Snapshot {
    fn default() -> Self {
        Self::new(Chess::default())
    }
}

impl PartialEq for Snapshot {
    fn eq(&self, other: &Self) -> bool {
        self.fen == other.fen
    }
}

impl Eq for Snapshot {}

/// One ply of a loaded game, with the position it produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameMove {
    /// 0-based ply index.
    pub ply: usize,
    /// SAN including check/mate suffix.
    pub san: String,
    pub uci: String,
    pub from: Square,
    pub to: Square,
    pub promotion: Option<Role>,
    /// Side that played the move.
    pub color: Color,
    /// Position after the move.
    pub snapshot: Snapshot,
}

impl GameMove {
    /// Full-move number as printed in PGN (1-based).
    pub fn move_number(&self) -> usize {
        self.ply / 2 + 1
    }
}

/// The initial position plus the ordered mainline.
///
/// Records are built once by the loader and never mutated afterwards; a
/// reload produces a new record. The default record is the standard
/// starting position with no moves.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GameRecord {
    pub metadata: GameMetadata,
    initial: Snapshot,
    moves: Vec<GameMove>,
}

impl GameRecord {
    pub(crate) fn new(metadata: GameMetadata, initial: Snapshot, moves: Vec<GameMove>) -> Self {
        Self {
            metadata,
            initial,
            moves,
        }
    }

    pub fn initial(&self) -> &Snapshot {
        &self.initial
    }

    pub fn moves(&self) -> &[GameMove] {
        &self.moves
    }

    pub fn len(&self) -> usize {
        self.moves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.moves.is_empty()
    }

    /// Index of the final ply, or -1 when the record has no moves.
    pub fn last_ply(&self) -> isize {
        self.moves.len() as isize - 1
    }

    pub fn san_moves(&self) -> Vec<String> {
        self.moves.iter().map(|m| m.san.clone()).collect()
    }
}
