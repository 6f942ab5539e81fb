mod args;
mod engine;
mod report;

use args::Args;
use clap::Parser;
use engine::EngineRegistry;
use evaluation::GameEvaluation;
use log::{error, info, warn, LevelFilter};
use report::{Outcome, ProgressReporter};
use simplelog::{Config, SimpleLogger, WriteLogger};
use std::error::Error;
use std::fs::File;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use utils::Game;

fn main() -> Result<(), Box<dyn Error>> {
    let args = init()?;

    let cancel = Arc::new(AtomicBool::new(false));
    {
        let cancel = Arc::clone(&cancel);
        ctrlc::set_handler(move || cancel.store(true, Ordering::Relaxed))?;
    }

    let game = Game::from_position(&args.position)?;
    let registry = EngineRegistry::probe(&args.engines, args.handshake_timeout())?;
    let Some(spec) = registry.get(args.engine_index) else {
        return Err(format!(
            "engine index {} out of range ({} engines given)",
            args.engine_index,
            registry.engines().len()
        )
        .into());
    };
    info!(
        "Evaluating {} positions with {}",
        game.len() + 1,
        spec.name
    );

    let (tx, rx) = mpsc::channel();
    let reporter = ProgressReporter::spawn(game.len() + 1, rx);

    let mut evaluation =
        GameEvaluation::new(args.evaluation_config(), game.cursor(), registry, tx);
    info!(
        "Running up to {} engines at once",
        evaluation.target_concurrency()
    );
    let result = match evaluation.start() {
        Ok(()) => evaluation.run(&cancel),
        Err(e) => Err(e),
    };
    let scores = evaluation.scores().clone();
    drop(evaluation);

    let outcome = reporter.join();
    match (&result, &outcome) {
        (Err(e), _) => error!("Evaluation failed: {}", e),
        (Ok(()), Outcome::Complete) if cancel.load(Ordering::Relaxed) => {
            warn!("Evaluation interrupted, saving partial results")
        }
        (Ok(()), Outcome::Complete) => info!("Evaluation complete"),
        (Ok(()), other) => warn!("Evaluation ended early: {:?}", other),
    }

    if !scores.is_empty() {
        let output = args.output.clone().unwrap_or_else(report::default_output);
        report::save_scores(&output, &game, &scores)?;
        println!("Scores written to {}", output.display());
    }

    result.map_err(Into::into)
}

fn init() -> Result<Args, Box<dyn Error>> {
    let args = Args::parse();

    match &args.log_file {
        Some(log_file) => WriteLogger::init(
            LevelFilter::Debug,
            Config::default(),
            File::create(log_file)?,
        )?,
        // Keep the terminal for the progress bar.
        None => SimpleLogger::init(LevelFilter::Warn, Config::default())?,
    }

    Ok(args)
}
