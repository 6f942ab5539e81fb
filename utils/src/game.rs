use std::fmt;
use std::str::FromStr;

use cozy_chess::{util::parse_uci_move, Board, Move};
use thiserror::Error;

use crate::notation::move_to_uci;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GameError {
    #[error("invalid FEN: {0}")]
    InvalidFen(String),
    #[error("illegal or malformed move '{mv}' at ply {ply}")]
    IllegalMove { mv: String, ply: usize },
    #[error("expected 'startpos' or 'fen <FEN>', got '{0}'")]
    InvalidPosition(String),
}

/// Identifies a position in a game by its ply from the starting board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct MoveId(pub usize);

impl fmt::Display for MoveId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A recorded game: the board it started from and the legal moves played.
#[derive(Debug, Clone)]
pub struct Game {
    start: Board,
    moves: Vec<Move>,
    end: Board,
}

impl Default for Game {
    fn default() -> Self {
        Self::new(Board::default())
    }
}

impl Game {
    pub fn new(start: Board) -> Self {
        Self {
            end: start.clone(),
            start,
            moves: Vec::new(),
        }
    }

    /// Parses `startpos [moves ..]` or `fen <FEN> [moves ..]`, with or
    /// without a leading `position` keyword.
    pub fn from_position(input: &str) -> Result<Self, GameError> {
        let input = input.trim();
        let input = input.strip_prefix("position").unwrap_or(input).trim();

        let (setup, moves) = match input.split_once("moves") {
            Some((setup, moves)) => (setup.trim(), moves),
            None => (input, ""),
        };

        let start = if setup == "startpos" {
            Board::default()
        } else if let Some(fen) = setup.strip_prefix("fen") {
            let fen = fen.trim();
            Board::from_str(fen).map_err(|_| GameError::InvalidFen(fen.to_string()))?
        } else {
            return Err(GameError::InvalidPosition(setup.to_string()));
        };

        let mut game = Self::new(start);
        for mv in moves.split_whitespace() {
            game.push_uci(mv)?;
        }

        Ok(game)
    }

    pub fn push_uci(&mut self, mv: &str) -> Result<(), GameError> {
        let illegal = || GameError::IllegalMove {
            mv: mv.to_string(),
            ply: self.moves.len(),
        };

        let parsed = parse_uci_move(&self.end, mv).map_err(|_| illegal())?;
        self.end.try_play(parsed).map_err(|_| illegal())?;
        self.moves.push(parsed);

        Ok(())
    }

    pub fn start(&self) -> &Board {
        &self.start
    }

    pub fn moves(&self) -> &[Move] {
        &self.moves
    }

    pub fn len(&self) -> usize {
        self.moves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.moves.is_empty()
    }

    pub fn cursor(&self) -> GameCursor {
        GameCursor::new(self.clone())
    }
}

/// Walks a game forward one position at a time.
#[derive(Debug, Clone)]
pub struct GameCursor {
    game: Game,
    ply: usize,
    board: Board,
    last_move: Option<String>,
}

impl GameCursor {
    pub fn new(game: Game) -> Self {
        Self {
            board: game.start.clone(),
            game,
            ply: 0,
            last_move: None,
        }
    }

    pub fn move_to_start(&mut self) {
        self.ply = 0;
        self.board = self.game.start.clone();
        self.last_move = None;
    }

    /// Steps to the next position. Returns false at the end of the game.
    pub fn forward(&mut self) -> bool {
        let Some(&mv) = self.game.moves.get(self.ply) else {
            return false;
        };

        self.last_move = Some(move_to_uci(&self.board, mv));
        // Moves were validated when the game was recorded.
        self.board.play_unchecked(mv);
        self.ply += 1;

        true
    }

    pub fn current_move(&self) -> MoveId {
        MoveId(self.ply)
    }

    pub fn starting_board(&self) -> &Board {
        &self.game.start
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn count_moves(&self) -> usize {
        self.game.moves.len()
    }

    /// Notation of the move that led to the current position.
    pub fn last_move_notation(&self) -> Option<&str> {
        self.last_move.as_deref()
    }
}
