use std::collections::BTreeMap;
use std::error::Error;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::mpsc::Receiver;
use std::thread::{self, JoinHandle};

use chrono::Local;
use evaluation::EvaluationEvent;
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info};
use utils::{moves_to_uci, Game};

const OUTPUT_DIR: &str = "evaluations";

/// How the event stream ended.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Complete,
    Failed(String),
    /// The channel closed without a final event.
    Abandoned,
}

/// Follows an evaluation's events on its own thread, showing progress.
pub struct ProgressReporter {
    handle: JoinHandle<Outcome>,
}

impl ProgressReporter {
    pub fn spawn(positions: usize, rx: Receiver<EvaluationEvent>) -> Self {
        let handle = thread::spawn(move || {
            let bar = ProgressBar::new(positions as u64);
            bar.set_style(
                ProgressStyle::default_bar()
                    .template(
                        "{spinner:.cyan} {pos}/{len} [{wide_bar:.cyan/blue}] {eta_precise} | {msg}",
                    )
                    .unwrap_or_else(|_| ProgressStyle::default_bar()),
            );

            let mut progress = Progress::default();
            let outcome = progress.follow(rx, |progress| {
                bar.set_position(progress.seen() as u64);
                if let Some((move_number, score)) = progress.latest() {
                    bar.set_message(format!("move {}: {:+.2}", move_number, score));
                }
            });

            match &outcome {
                Outcome::Failed(reason) => bar.abandon_with_message(reason.clone()),
                _ => bar.finish(),
            }
            outcome
        });

        Self { handle }
    }

    pub fn join(self) -> Outcome {
        self.handle.join().unwrap_or(Outcome::Abandoned)
    }
}

/// Scores seen so far, per move number.
#[derive(Debug, Default)]
struct Progress {
    scores: BTreeMap<usize, f64>,
    latest: Option<usize>,
}

impl Progress {
    fn follow<F>(&mut self, rx: Receiver<EvaluationEvent>, mut on_change: F) -> Outcome
    where
        F: FnMut(&Self),
    {
        for event in rx {
            match event {
                EvaluationEvent::Changed(snapshot) => {
                    for (move_number, score) in snapshot.iter() {
                        self.scores.insert(move_number, score);
                        self.latest = self.latest.max(Some(move_number));
                    }
                    on_change(self);
                }
                EvaluationEvent::Complete => return Outcome::Complete,
                EvaluationEvent::Failed(reason) => return Outcome::Failed(reason),
            }
        }
        Outcome::Abandoned
    }

    fn seen(&self) -> usize {
        self.scores.len()
    }

    fn latest(&self) -> Option<(usize, f64)> {
        let move_number = self.latest?;
        Some((move_number, *self.scores.get(&move_number)?))
    }
}

/// Default output file, named after the current time.
pub fn default_output() -> PathBuf {
    let timestamp = Local::now().format("%Y-%m-%d-%H:%M:%S");
    Path::new(OUTPUT_DIR).join(format!("{}.csv", timestamp))
}

/// Writes one `ply,move,score` row per evaluated position.
///
/// `move` is the move that led to the position, empty for the starting one.
pub fn write_scores<W: Write>(
    out: &mut W,
    game: &Game,
    scores: &BTreeMap<usize, f64>,
) -> std::io::Result<()> {
    let moves = moves_to_uci(game.start(), game.moves());

    writeln!(out, "ply,move,score")?;
    for (&ply, score) in scores {
        let mv = ply
            .checked_sub(1)
            .and_then(|i| moves.get(i))
            .map(String::as_str)
            .unwrap_or("");
        writeln!(out, "{},{},{:.2}", ply, mv, score)?;
    }
    Ok(())
}

pub fn save_scores(
    path: &Path,
    game: &Game,
    scores: &BTreeMap<usize, f64>,
) -> Result<(), Box<dyn Error>> {
    if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }

    debug!("Writing {} scores", scores.len());
    let mut file = BufWriter::new(File::create(path)?);
    write_scores(&mut file, game, scores)?;
    file.flush()?;

    info!("Wrote scores to {}", path.display());
    Ok(())
}
