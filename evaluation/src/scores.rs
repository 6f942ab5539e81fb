// Scores are reported in pawns from White's perspective. Positive = White advantage.

use std::collections::HashMap;

use ahash::RandomState;
use cozy_chess::Color;

/// Magnitude reported for any forced mate, regardless of distance.
pub const MATE_SCORE: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawScore {
    /// Centipawns, already from White's perspective.
    Centipawns(i32),
    /// Moves to mate from the perspective of the side to move.
    /// Negative when the side to move is getting mated.
    Mate(i32),
}

/// One analysis update as reported by an engine.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Analysis {
    pub score: Option<RawScore>,
    /// End-of-search report rather than a mid-search update.
    pub best_move: bool,
    /// The engine recognised the position from its opening book.
    pub book_move: bool,
    pub depth: Option<u8>,
    /// Moves played from the starting board to the analysed position.
    pub variation: Vec<String>,
    /// Principal variation from the analysed position.
    pub pv: Vec<String>,
}

impl Analysis {
    pub fn centipawns(cp: i32) -> Self {
        Self {
            score: Some(RawScore::Centipawns(cp)),
            ..Default::default()
        }
    }

    pub fn mate(moves: i32, variation: Vec<String>) -> Self {
        Self {
            score: Some(RawScore::Mate(moves)),
            variation,
            ..Default::default()
        }
    }

    /// Score in pawns from White's perspective, if this update carries one.
    pub fn pawns(&self, starting_side: Color) -> Option<f64> {
        match self.score? {
            RawScore::Centipawns(cp) => Some(cp as f64 / 100.0),
            RawScore::Mate(moves) => Some(normalize_mate(
                moves,
                self.variation.len(),
                starting_side,
            )),
        }
    }
}

/// Saturates a mate score and flips it to White's perspective.
///
/// `ply_from_root` is the number of moves played since the starting board and
/// `starting_side` the side to move there; together they give the side to move
/// in the analysed position.
pub fn normalize_mate(moves: i32, ply_from_root: usize, starting_side: Color) -> f64 {
    let sign = if moves < 0 { -1.0 } else { 1.0 };
    let black_to_move = (ply_from_root % 2 == 1) ^ (starting_side == Color::Black);

    if black_to_move {
        -sign * MATE_SCORE
    } else {
        sign * MATE_SCORE
    }
}

/// Latest score per move index, captured once per scheduler tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScoreSnapshot {
    scores: HashMap<usize, f64, RandomState>,
}

impl ScoreSnapshot {
    pub(crate) fn insert(&mut self, move_number: usize, score: f64) {
        self.scores.insert(move_number, score);
    }

    pub fn get(&self, move_number: usize) -> Option<f64> {
        self.scores.get(&move_number).copied()
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.scores.iter().map(|(&k, &v)| (k, v))
    }
}

impl FromIterator<(usize, f64)> for ScoreSnapshot {
    fn from_iter<I: IntoIterator<Item = (usize, f64)>>(iter: I) -> Self {
        Self {
            scores: iter.into_iter().collect(),
        }
    }
}
