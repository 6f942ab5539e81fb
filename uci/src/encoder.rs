use super::commands::{GoParams, GuiCommand};

pub struct Encoder {}

impl Encoder {
    pub fn encode(&self, command: &GuiCommand) -> String {
        match command {
            GuiCommand::Uci => "uci".to_string(),
            GuiCommand::IsReady => "isready".to_string(),
            GuiCommand::UciNewGame => "ucinewgame".to_string(),

            GuiCommand::Position { fen, moves } => {
                if moves.is_empty() {
                    format!("position fen {}", fen)
                } else {
                    format!("position fen {} moves {}", fen, moves.join(" "))
                }
            }
            GuiCommand::Go(params) => encode_go(params),

            GuiCommand::Stop => "stop".to_string(),
            GuiCommand::Quit => "quit".to_string(),
            GuiCommand::SetOption { name, value } => {
                if value.is_empty() {
                    format!("setoption name {}", name)
                } else {
                    format!("setoption name {} value {}", name, value)
                }
            }
        }
    }
}

fn encode_go(params: &GoParams) -> String {
    let mut line = String::from("go");

    if let Some(depth) = params.depth {
        line.push_str(&format!(" depth {}", depth));
    }
    if let Some(move_time) = params.move_time {
        line.push_str(&format!(" movetime {}", move_time));
    }
    if params.infinite {
        line.push_str(" infinite");
    }

    line
}
