//! Full-game review: evaluate positions along the main line and annotate
//! every move with its centipawn loss.

use std::collections::BTreeMap;

use chess_core::annotation::{calculate_accuracy, calculate_cp_loss, classify_move, is_mate_blunder};
use chess_core::{position_at, Annotation, EvaluationScore, GameRecord, INITIAL_PLY};
use shakmaty::{Color, Position};
use tracing::{debug, info};

use crate::clients::PositionAnalyzer;
use crate::error::TransportError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlyEvaluation {
    /// `-1` for the initial position.
    pub ply: isize,
    /// White-relative.
    pub score: EvaluationScore,
    /// Engine's preferred move in this position, UCI.
    pub best_move: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReviewedMove {
    pub ply: usize,
    pub san: String,
    pub uci: String,
    pub color: Color,
    pub annotation: Annotation,
    /// `None` when either neighbouring position was skipped.
    pub cp_loss: Option<i32>,
    /// Engine's preferred alternative, if it differs from the move played.
    pub best_move: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SideSummary {
    pub accuracy: f64,
    pub inaccuracies: u32,
    pub mistakes: u32,
    pub blunders: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GameReview {
    pub evaluations: Vec<PlyEvaluation>,
    pub moves: Vec<ReviewedMove>,
    pub white: SideSummary,
    pub black: SideSummary,
}

impl GameReview {
    pub fn summary(&self, color: Color) -> &SideSummary {
        match color {
            Color::White => &self.white,
            Color::Black => &self.black,
        }
    }
}

/// Plies to evaluate: the initial position, every `interval`-th ply, and
/// the final position.
fn sampled_plies(len: usize, interval: usize) -> Vec<isize> {
    let interval = interval.max(1);
    let mut plies = vec![INITIAL_PLY];
    plies.extend((0..len).filter(|i| (i + 1) % interval == 0 || i + 1 == len).map(|i| i as isize));
    plies
}

/// Evaluate the game and annotate each move. Moves whose neighbouring
/// positions were not both evaluated are marked `Unknown`.
pub async fn review_game(
    record: &GameRecord,
    analyzer: &dyn PositionAnalyzer,
    depth: u32,
    interval: usize,
) -> Result<GameReview, TransportError> {
    let plies = sampled_plies(record.len(), interval);
    info!(moves = record.len(), positions = plies.len(), depth, "Starting game review");

    let mut evaluations: BTreeMap<isize, PlyEvaluation> = BTreeMap::new();
    for ply in plies {
        let Some(snapshot) = position_at(record, ply) else {
            continue;
        };
        let position = snapshot.position();

        let evaluation = if position.is_checkmate() {
            // The side to move has been mated.
            let score = match snapshot.turn() {
                Color::White => EvaluationScore::Mate(-1),
                Color::Black => EvaluationScore::Mate(1),
            };
            PlyEvaluation {
                ply,
                score,
                best_move: None,
            }
        } else if position.is_stalemate() || position.is_insufficient_material() {
            PlyEvaluation {
                ply,
                score: EvaluationScore::Centipawn(0),
                best_move: None,
            }
        } else {
            let result = analyzer.analyze_position(snapshot.fen(), depth).await?;
            PlyEvaluation {
                ply,
                score: result.evaluation,
                best_move: result.best_move().map(|m| m.uci.clone()),
            }
        };
        debug!(ply, score = ?evaluation.score, "Position evaluated");
        evaluations.insert(ply, evaluation);
    }

    let mut moves = Vec::with_capacity(record.len());
    let mut totals = [(0i32, 0u32); 2];
    let mut white = SideSummary::default();
    let mut black = SideSummary::default();

    for mv in record.moves() {
        let ply = mv.ply as isize;
        let before = evaluations.get(&(ply - 1));
        let after = evaluations.get(&ply);
        let is_white = mv.color == Color::White;

        let forced = position_at(record, ply - 1)
            .map(|s| s.position().legal_moves().len() == 1)
            .unwrap_or(false);
        let is_checkmate = mv.snapshot.position().is_checkmate();

        let (annotation, cp_loss) = match (before, after) {
            (Some(before), Some(after)) => {
                let cp_loss = calculate_cp_loss(before.score, after.score, is_white, is_checkmate);
                let mate_blunder = is_mate_blunder(before.score, after.score, is_white, is_checkmate);
                let annotation = if forced {
                    Annotation::Forced
                } else {
                    classify_move(cp_loss, mate_blunder)
                };
                (annotation, Some(cp_loss))
            }
            _ if forced => (Annotation::Forced, None),
            _ => (Annotation::Unknown, None),
        };

        let best_move = before
            .and_then(|e| e.best_move.clone())
            .filter(|best| *best != mv.uci);

        let summary = if is_white { &mut white } else { &mut black };
        match annotation {
            Annotation::Inaccuracy => summary.inaccuracies += 1,
            Annotation::Mistake => summary.mistakes += 1,
            Annotation::Blunder => summary.blunders += 1,
            _ => {}
        }
        if let Some(loss) = cp_loss {
            let total = &mut totals[usize::from(!is_white)];
            total.0 += loss;
            total.1 += 1;
        }

        moves.push(ReviewedMove {
            ply: mv.ply,
            san: mv.san.clone(),
            uci: mv.uci.clone(),
            color: mv.color,
            annotation,
            cp_loss,
            best_move,
        });
    }

    white.accuracy = calculate_accuracy(totals[0].0, totals[0].1);
    black.accuracy = calculate_accuracy(totals[1].0, totals[1].1);
    info!(
        white_accuracy = white.accuracy,
        black_accuracy = black.accuracy,
        "Game review complete"
    );

    Ok(GameReview {
        evaluations: evaluations.into_values().collect(),
        moves,
        white,
        black,
    })
}
