use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use evaluation::EvaluationConfig;

#[derive(Parser, Debug)]
#[command(name = "gameeval")]
#[command(author = "Jørgen Hanssen <jorgen@hanssen.io>")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Scores every position of a chess game with external UCI engines")]
pub struct Args {
    /// Path to a UCI engine. May be given more than once.
    #[arg(short, long = "engine", required = true)]
    pub engines: Vec<PathBuf>,

    /// Which of the given engines analyses the game.
    #[arg(long, default_value_t = 0)]
    pub engine_index: usize,

    /// Game to evaluate, as `startpos|fen <FEN> [moves <m1> <m2> ...]`.
    #[arg(short, long, default_value = "startpos")]
    pub position: String,

    /// Analysis time per position in milliseconds.
    #[arg(short, long, default_value_t = 1000)]
    pub move_time: u64,

    /// Scheduler tick interval in milliseconds.
    #[arg(long, default_value_t = 100)]
    pub tick: u64,

    /// Number of engines running at once. Defaults to the number of cores,
    /// leaving one free on larger machines.
    #[arg(short, long)]
    pub threads: Option<usize>,

    /// Give up on an engine that has not started analysing after this many
    /// milliseconds. 0 waits forever.
    #[arg(long, default_value_t = 30000)]
    pub start_timeout: u64,

    /// Milliseconds to wait for an engine to complete the `uci` handshake.
    #[arg(long, default_value_t = 5000)]
    pub handshake_timeout: u64,

    /// Where to write the scores. Defaults to a timestamped file under `evaluations/`.
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Log engine communication to a file for debugging.
    #[arg(short, long)]
    pub log_file: Option<PathBuf>,
}

impl Args {
    pub fn evaluation_config(&self) -> EvaluationConfig {
        EvaluationConfig {
            engine: self.engine_index,
            move_time: Duration::from_millis(self.move_time),
            tick_interval: Duration::from_millis(self.tick.max(1)),
            threads: self.threads,
            start_timeout: match self.start_timeout {
                0 => None,
                ms => Some(Duration::from_millis(ms)),
            },
        }
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout)
    }
}
