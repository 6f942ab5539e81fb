use cozy_chess::Board;
use utils::{GameCursor, MoveId};

/// Ordered walk over the positions of a game.
pub trait PositionSource {
    fn move_to_start(&mut self);
    /// Advances one position. Returns false if none remain.
    fn forward(&mut self) -> bool;
    fn current_move(&self) -> MoveId;
    fn starting_board(&self) -> &Board;
    fn board(&self) -> &Board;
    fn count_moves(&self) -> usize;
    /// Notation of the move most recently stepped over.
    fn last_move_notation(&self) -> Option<&str>;
}

impl PositionSource for GameCursor {
    fn move_to_start(&mut self) {
        GameCursor::move_to_start(self)
    }

    fn forward(&mut self) -> bool {
        GameCursor::forward(self)
    }

    fn current_move(&self) -> MoveId {
        GameCursor::current_move(self)
    }

    fn starting_board(&self) -> &Board {
        GameCursor::starting_board(self)
    }

    fn board(&self) -> &Board {
        GameCursor::board(self)
    }

    fn count_moves(&self) -> usize {
        GameCursor::count_moves(self)
    }

    fn last_move_notation(&self) -> Option<&str> {
        GameCursor::last_move_notation(self)
    }
}
