mod game;
mod notation;

pub use game::{Game, GameCursor, GameError, MoveId};
pub use notation::{move_to_uci, moves_to_uci};
