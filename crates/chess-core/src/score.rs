//! Evaluation scores and their display forms. Pure functions only.

use serde::{Deserialize, Serialize};
use shakmaty::Color;

/// Default saturation cap (centipawns) for the evaluation bar.
pub const DEFAULT_EVAL_BAR_CAP: i32 = 800;

/// Centipawn-equivalent base for mate scores. Every mate outranks every
/// centipawn score, and shorter mates rank higher than longer ones.
pub const MATE_SCORE_BASE: i32 = 10_000;

/// Anything beyond this magnitude came from a mate score.
pub const MATE_THRESHOLD: i32 = 9_000;

/// Mate distances beyond this rank the same as this.
const MAX_MATE_DISTANCE: i32 = 99;

/// A typed engine evaluation.
///
/// Scores stored by the engine layer are white-relative: a positive value
/// favors White, a negative value favors Black.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "unit", content = "value", rename_all = "snake_case")]
pub enum EvaluationScore {
    Centipawn(i32),
    /// Signed plies to mate; the sign names the side favored.
    Mate(i32),
}

impl EvaluationScore {
    /// Convert a score reported from the side to move's point of view
    /// (as UCI engines do) into white's perspective.
    pub fn from_side_to_move(score: EvaluationScore, turn: Color) -> EvaluationScore {
        // `mate 0`: the side to move is already mated.
        let score = match score {
            EvaluationScore::Mate(0) => EvaluationScore::Mate(-1),
            other => other,
        };
        match turn {
            Color::White => score,
            Color::Black => score.flipped(),
        }
    }

    pub fn flipped(self) -> EvaluationScore {
        match self {
            EvaluationScore::Centipawn(cp) => EvaluationScore::Centipawn(cp.saturating_neg()),
            EvaluationScore::Mate(n) => EvaluationScore::Mate(n.saturating_neg()),
        }
    }

    /// Single signed magnitude usable for comparisons across units.
    pub fn magnitude(self) -> i32 {
        match self {
            EvaluationScore::Centipawn(cp) => cp.clamp(-MATE_THRESHOLD, MATE_THRESHOLD),
            EvaluationScore::Mate(n) if n > 0 => MATE_SCORE_BASE - n.min(MAX_MATE_DISTANCE) * 10,
            EvaluationScore::Mate(n) if n < 0 => -MATE_SCORE_BASE - n.max(-MAX_MATE_DISTANCE) * 10,
            // Mate already delivered: treat as saturated against the side to move.
            EvaluationScore::Mate(_) => -MATE_SCORE_BASE,
        }
    }

    pub fn is_mate(self) -> bool {
        matches!(self, EvaluationScore::Mate(_))
    }
}

/// Display text: `+1.25`, `-0.40`, `0.00`, `M3`, `M-2`.
pub fn normalize(score: EvaluationScore) -> String {
    match score {
        EvaluationScore::Centipawn(cp) => {
            let pawns = cp as f64 / 100.0;
            if cp > 0 {
                format!("+{pawns:.2}")
            } else {
                format!("{pawns:.2}")
            }
        }
        EvaluationScore::Mate(n) => format!("M{n}"),
    }
}

/// Evaluation bar fill in `[0, 100]` using the default cap.
pub fn bar_position(score: EvaluationScore) -> f64 {
    bar_position_with_cap(score, DEFAULT_EVAL_BAR_CAP)
}

/// Evaluation bar fill in `[0, 100]`. Mate scores saturate; centipawn
/// scores are clamped to `[-cap, cap]` and mapped linearly.
pub fn bar_position_with_cap(score: EvaluationScore, cap: i32) -> f64 {
    let cap = cap.max(1);
    match score {
        EvaluationScore::Mate(n) => {
            if n > 0 {
                100.0
            } else {
                0.0
            }
        }
        EvaluationScore::Centipawn(cp) => {
            let clamped = cp.clamp(-cap, cap) as f64;
            50.0 + (clamped / (2.0 * cap as f64)) * 100.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_centipawns() {
        assert_eq!(normalize(EvaluationScore::Centipawn(125)), "+1.25");
        assert_eq!(normalize(EvaluationScore::Centipawn(-40)), "-0.40");
        assert_eq!(normalize(EvaluationScore::Centipawn(0)), "0.00");
        assert_eq!(normalize(EvaluationScore::Centipawn(7)), "+0.07");
    }

    #[test]
    fn test_normalize_mate() {
        assert_eq!(normalize(EvaluationScore::Mate(3)), "M3");
        assert_eq!(normalize(EvaluationScore::Mate(-2)), "M-2");
    }

    #[test]
    fn test_bar_position_saturates() {
        assert_eq!(bar_position(EvaluationScore::Mate(3)), 100.0);
        assert_eq!(bar_position(EvaluationScore::Mate(-2)), 0.0);
        assert_eq!(bar_position(EvaluationScore::Centipawn(0)), 50.0);
        assert_eq!(bar_position(EvaluationScore::Centipawn(1600)), 100.0);
        assert_eq!(bar_position(EvaluationScore::Centipawn(-1600)), 0.0);
        assert_eq!(bar_position(EvaluationScore::Centipawn(400)), 75.0);
    }

    #[test]
    fn test_bar_position_is_monotonic() {
        let mut last = -1.0;
        for cp in (-1000..=1000).step_by(50) {
            let pos = bar_position(EvaluationScore::Centipawn(cp));
            assert!(pos >= last);
            last = pos;
        }
    }

    #[test]
    fn test_custom_cap() {
        assert_eq!(bar_position_with_cap(EvaluationScore::Centipawn(200), 200), 100.0);
        assert_eq!(bar_position_with_cap(EvaluationScore::Centipawn(-100), 200), 25.0);
    }

    #[test]
    fn test_magnitude_orders_mates_above_centipawns() {
        let mate_in_2 = EvaluationScore::Mate(2).magnitude();
        let mate_in_5 = EvaluationScore::Mate(5).magnitude();
        assert!(mate_in_2 > mate_in_5);
        assert!(mate_in_5 > EvaluationScore::Centipawn(5000).magnitude());
        assert_eq!(EvaluationScore::Mate(-1).magnitude(), -9990);
    }

    #[test]
    fn test_side_to_move_conversion() {
        let engine = EvaluationScore::Centipawn(35);
        assert_eq!(
            EvaluationScore::from_side_to_move(engine, Color::Black),
            EvaluationScore::Centipawn(-35)
        );
        assert_eq!(
            EvaluationScore::from_side_to_move(EvaluationScore::Mate(2), Color::White),
            EvaluationScore::Mate(2)
        );
    }

    #[test]
    fn test_mate_zero_loses_for_side_to_move() {
        let mated_black = EvaluationScore::from_side_to_move(EvaluationScore::Mate(0), Color::Black);
        assert_eq!(mated_black, EvaluationScore::Mate(1));
        assert_eq!(bar_position(mated_black), 100.0);

        let mated_white = EvaluationScore::from_side_to_move(EvaluationScore::Mate(0), Color::White);
        assert_eq!(mated_white, EvaluationScore::Mate(-1));
        assert_eq!(bar_position(mated_white), 0.0);
    }

    #[test]
    fn test_extreme_mate_distances_do_not_overflow() {
        let far = EvaluationScore::Mate(i32::MAX).magnitude();
        let near = EvaluationScore::Mate(1).magnitude();
        assert!(far > MATE_THRESHOLD);
        assert!(far < near);
        assert!(EvaluationScore::Mate(i32::MIN).magnitude() < -MATE_THRESHOLD);
        assert_eq!(EvaluationScore::Mate(i32::MIN).flipped(), EvaluationScore::Mate(i32::MAX));
        assert_eq!(
            EvaluationScore::Centipawn(i32::MIN).flipped(),
            EvaluationScore::Centipawn(i32::MAX)
        );
    }

    #[test]
    fn test_wire_shape() {
        let json = serde_json::to_string(&EvaluationScore::Mate(-3)).unwrap();
        assert_eq!(json, r#"{"unit":"mate","value":-3}"#);
    }
}
