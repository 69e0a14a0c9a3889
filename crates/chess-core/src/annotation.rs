/// Move quality annotation. Pure functions only
/// (no engine, no I/O)

use serde::{Deserialize, Serialize};

use crate::score::{EvaluationScore, MATE_THRESHOLD};

/// Annotation thresholds (centipawn loss)
const THRESHOLD_BEST: i32 = 0;
const THRESHOLD_EXCELLENT: i32 = 10;
const THRESHOLD_GOOD: i32 = 50;
const THRESHOLD_INACCURACY: i32 = 100;
const THRESHOLD_MISTAKE: i32 = 200;

/// Maximum CP loss to cap at
pub const MAX_CP_LOSS: i32 = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Annotation {
    Best,
    Excellent,
    Good,
    Inaccuracy,
    Mistake,
    Blunder,
    /// Only one legal move was available.
    Forced,
    /// Neighbouring positions were not evaluated.
    Unknown,
}

impl Annotation {
    pub fn as_str(self) -> &'static str {
        match self {
            Annotation::Best => "best",
            Annotation::Excellent => "excellent",
            Annotation::Good => "good",
            Annotation::Inaccuracy => "inaccuracy",
            Annotation::Mistake => "mistake",
            Annotation::Blunder => "blunder",
            Annotation::Forced => "forced",
            Annotation::Unknown => "unknown",
        }
    }

    /// PGN-style suffix glyph, if any.
    pub fn glyph(self) -> Option<&'static str> {
        match self {
            Annotation::Inaccuracy => Some("?!"),
            Annotation::Mistake => Some("?"),
            Annotation::Blunder => Some("??"),
            _ => None,
        }
    }
}

fn is_mate_value(eval: i32) -> bool {
    eval.abs() > MATE_THRESHOLD
}

/// Whether the mover threw away a forced mate, or walked into one.
/// Scores are white-relative.
pub fn is_mate_blunder(
    before: EvaluationScore,
    after: EvaluationScore,
    is_white: bool,
    is_checkmate: bool,
) -> bool {
    if is_checkmate {
        return false;
    }

    let before = before.magnitude();
    let after = after.magnitude();
    let before_is_mate = is_mate_value(before);
    let after_is_mate = is_mate_value(after);

    if before_is_mate && !after_is_mate {
        // Only a blunder if the lost mate belonged to the mover.
        return if is_white { before > 0 } else { before < 0 };
    }

    if !before_is_mate && after_is_mate {
        return if is_white { after < 0 } else { after > 0 };
    }

    false
}

/// Centipawn loss of a move, from the mover's point of view, capped at
/// `MAX_CP_LOSS`.
pub fn calculate_cp_loss(
    before: EvaluationScore,
    after: EvaluationScore,
    is_white: bool,
    is_checkmate: bool,
) -> i32 {
    if is_checkmate {
        return 0;
    }

    let before = before.magnitude();
    let after = after.magnitude();

    if is_mate_value(before) && is_mate_value(after) {
        return if (before > 0) == (after > 0) { 0 } else { MAX_CP_LOSS };
    }

    let cp_loss = if is_white { before - after } else { after - before };
    cp_loss.clamp(0, MAX_CP_LOSS)
}

pub fn classify_move(cp_loss: i32, is_mate_blunder: bool) -> Annotation {
    if is_mate_blunder {
        return Annotation::Blunder;
    }
    if cp_loss <= THRESHOLD_BEST {
        Annotation::Best
    } else if cp_loss < THRESHOLD_EXCELLENT {
        Annotation::Excellent
    } else if cp_loss < THRESHOLD_GOOD {
        Annotation::Good
    } else if cp_loss < THRESHOLD_INACCURACY {
        Annotation::Inaccuracy
    } else if cp_loss < THRESHOLD_MISTAKE {
        Annotation::Mistake
    } else {
        Annotation::Blunder
    }
}

pub fn calculate_accuracy(total_cp_loss: i32, move_count: u32) -> f64 {
    if move_count == 0 {
        return 100.0;
    }
    let acpl = total_cp_loss as f64 / move_count as f64;
    let accuracy = 100.0 * (1.0 / (1.0 + acpl / 100.0)).sqrt();
    accuracy.clamp(0.0, 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    use EvaluationScore::{Centipawn, Mate};

    #[test]
    fn test_classify_move() {
        assert_eq!(classify_move(0, false), Annotation::Best);
        assert_eq!(classify_move(5, false), Annotation::Excellent);
        assert_eq!(classify_move(25, false), Annotation::Good);
        assert_eq!(classify_move(75, false), Annotation::Inaccuracy);
        assert_eq!(classify_move(150, false), Annotation::Mistake);
        assert_eq!(classify_move(250, false), Annotation::Blunder);
        assert_eq!(classify_move(0, true), Annotation::Blunder);
    }

    #[test]
    fn test_calculate_accuracy() {
        assert!((calculate_accuracy(0, 20) - 100.0).abs() < 0.1);
        assert!((calculate_accuracy(500, 20) - 89.4).abs() < 1.0);
        assert!((calculate_accuracy(2000, 20) - 70.7).abs() < 1.0);
    }

    #[test]
    fn test_cp_loss_calculation() {
        assert_eq!(calculate_cp_loss(Centipawn(100), Centipawn(80), true, false), 20);
        assert_eq!(calculate_cp_loss(Centipawn(100), Centipawn(120), false, false), 20);
        assert_eq!(calculate_cp_loss(Centipawn(100), Mate(1), true, true), 0);
        assert_eq!(calculate_cp_loss(Mate(1), Mate(2), true, false), 0);
        assert_eq!(calculate_cp_loss(Mate(1), Mate(-1), true, false), 500);
        assert_eq!(calculate_cp_loss(Centipawn(300), Centipawn(-900), true, false), 500);
    }

    #[test]
    fn test_mate_blunder_detection() {
        assert!(!is_mate_blunder(Mate(1), Mate(1), true, true));
        assert!(is_mate_blunder(Mate(1), Centipawn(100), true, false));
        assert!(is_mate_blunder(Centipawn(100), Mate(-1), true, false));
        assert!(!is_mate_blunder(Centipawn(100), Centipawn(80), true, false));
        // Black escaping a mate against it is not a blunder.
        assert!(!is_mate_blunder(Mate(3), Centipawn(200), false, false));
    }

    #[test]
    fn test_glyphs() {
        assert_eq!(Annotation::Blunder.glyph(), Some("??"));
        assert_eq!(Annotation::Best.glyph(), None);
        assert_eq!(Annotation::Inaccuracy.as_str(), "inaccuracy");
    }
}
