use super::commands::{EngineMessage, Info, Score};
use super::options::UciOption;

pub struct Decoder;

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder {
    pub fn new() -> Self {
        Self
    }

    pub fn decode(&self, input: &str) -> EngineMessage {
        match input {
            "uciok" => EngineMessage::UciOk,
            "readyok" => EngineMessage::ReadyOk,

            _ if input.starts_with("id name ") => {
                EngineMessage::IdName(input["id name ".len()..].trim().to_string())
            }
            _ if input.starts_with("id author ") => {
                EngineMessage::IdAuthor(input["id author ".len()..].trim().to_string())
            }
            _ if input.starts_with("bestmove") => self.decode_best_move(input),
            _ if input.starts_with("info") => EngineMessage::Info(self.decode_info(input)),
            _ if input.starts_with("option") => match UciOption::parse(input) {
                Some(option) => EngineMessage::Option(option),
                None => EngineMessage::Unknown(input.to_string()),
            },

            _ => EngineMessage::Unknown(input.to_string()),
        }
    }

    fn decode_best_move(&self, input: &str) -> EngineMessage {
        let tokens: Vec<&str> = input.split_whitespace().collect();

        let best_move = tokens.get(1).copied().unwrap_or("0000").to_string();
        let ponder = tokens
            .windows(2)
            .find(|w| w[0] == "ponder")
            .map(|w| w[1].to_string());

        EngineMessage::BestMove { best_move, ponder }
    }

    fn decode_info(&self, input: &str) -> Info {
        // Everything after "string" is free text and must not be tokenized as fields.
        let (fields, string) = match input.split_once(" string") {
            Some((fields, text)) => (fields, Some(text.trim().to_string())),
            None => (input, None),
        };

        let tokens: Vec<&str> = fields.split_whitespace().collect();

        Info {
            depth: extract_numeric_param(&tokens, "depth")
                .and_then(|d| u8::try_from(d).ok()),
            sel_depth: extract_numeric_param(&tokens, "seldepth")
                .and_then(|d| u8::try_from(d).ok()),
            multi_pv: extract_numeric_param(&tokens, "multipv")
                .and_then(|d| u16::try_from(d).ok()),
            nodes: extract_numeric_param(&tokens, "nodes").map(|n| n as u64),
            nodes_per_second: extract_numeric_param(&tokens, "nps").map(|n| n as u64),
            time: extract_numeric_param(&tokens, "time").map(|t| t as u64),
            pv: extract_pv(&tokens),
            score: extract_score(&tokens),
            string,
        }
    }
}

fn extract_numeric_param(tokens: &[&str], param: &str) -> Option<i64> {
    tokens
        .windows(2)
        .find(|w| w[0] == param)
        .and_then(|w| w[1].parse().ok())
}

fn extract_score(tokens: &[&str]) -> Option<Score> {
    let at = tokens.iter().position(|t| *t == "score")?;
    let kind = tokens.get(at + 1)?;
    let value = tokens.get(at + 2)?.parse::<i32>().ok()?;

    match *kind {
        "cp" => Some(Score::Centipawns(value)),
        "mate" => Some(Score::Mate(value)),
        _ => None,
    }
}

fn extract_pv(tokens: &[&str]) -> Vec<String> {
    // pv is the last field on standard info lines.
    match tokens.iter().position(|t| *t == "pv") {
        Some(at) => tokens[at + 1..].iter().map(|m| m.to_string()).collect(),
        None => Vec::new(),
    }
}
