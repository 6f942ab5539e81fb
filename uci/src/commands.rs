/// Commands sent from us to an engine process.
#[derive(Debug, Clone, PartialEq)]
pub enum GuiCommand {
    Uci,
    IsReady,

    UciNewGame,
    Position {
        fen: String,
        moves: Vec<String>,
    },
    Go(GoParams),

    Stop,
    Quit,
    SetOption {
        name: String,
        value: String,
    },
}

/// Lines received from an engine process.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineMessage {
    IdName(String),
    IdAuthor(String),
    UciOk,
    ReadyOk,
    BestMove {
        best_move: String,
        ponder: Option<String>,
    },
    Info(Info),
    Option(super::UciOption),
    Unknown(String),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Info {
    pub depth: Option<u8>,
    pub sel_depth: Option<u8>,
    pub multi_pv: Option<u16>,
    pub nodes: Option<u64>,
    pub nodes_per_second: Option<u64>,
    pub time: Option<u64>,
    pub pv: Vec<String>,
    pub score: Option<Score>,
    /// Free text following `string`; always the last token group on the line.
    pub string: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Score {
    Centipawns(i32), // side to move
    Mate(i32),       // Positive for mate-in-n, negative for mated-in-n
}

impl Default for Score {
    fn default() -> Self {
        Score::Centipawns(0)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GoParams {
    // Search in the background until a stop command is received.
    pub infinite: bool,

    // Search depth ply only.
    pub depth: Option<u8>,

    // Search exactly movetime milliseconds.
    pub move_time: Option<u64>,
}
