use std::sync::mpsc::{self, Receiver};
use std::time::{Duration, Instant};

use cozy_chess::{Board, Color};
use log::{debug, warn};
use utils::MoveId;

use crate::config::EvaluationConfig;
use crate::engine::{AnalysisRequest, EngineError, EngineEvent, EngineFactory, EngineHandle};
use crate::scores::Analysis;

const THREADS_OPTION: &str = "Threads";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// Waiting for the engine to report it is ready.
    Created,
    /// Analysis requested, waiting for the engine to confirm.
    Activated,
    Analyzing,
    Finished,
}

/// A position handed to a worker by the scheduler.
#[derive(Debug, Clone)]
pub struct Assignment {
    pub move_number: usize,
    pub move_id: MoveId,
    pub start: Board,
    pub board: Board,
    /// Moves leading to `board`, each followed by a space.
    pub line: String,
}

/// Analyses one position with its own engine instance.
///
/// The worker owns the engine for its whole lifetime and releases it on drop.
pub struct Worker {
    assignment: Assignment,
    budget: Duration,
    start_timeout: Option<Duration>,
    engine: Option<Box<dyn EngineHandle>>,
    events: Receiver<EngineEvent>,

    state: WorkerState,
    last_score: f64,
    created_at: Instant,
    started_at: Option<Instant>,
}

impl Worker {
    pub fn new(
        factory: &dyn EngineFactory,
        config: &EvaluationConfig,
        assignment: Assignment,
        now: Instant,
    ) -> Result<Self, EngineError> {
        let (tx, rx) = mpsc::channel();
        let mut engine = factory.new_instance(config.engine, tx)?;

        // Engines get a single thread each, parallelism is the scheduler's business.
        if let Err(e) = configure(&mut *engine, &assignment.start) {
            let _ = engine.close();
            return Err(e);
        }

        debug!(
            "[{}] worker created for move {} ({})",
            assignment.move_number,
            assignment.move_id,
            engine.name()
        );

        Ok(Self {
            assignment,
            budget: config.move_time,
            start_timeout: config.start_timeout,
            engine: Some(engine),
            events: rx,
            state: WorkerState::Created,
            last_score: 0.0,
            created_at: now,
            started_at: None,
        })
    }

    pub fn move_number(&self) -> usize {
        self.assignment.move_number
    }

    pub fn move_id(&self) -> MoveId {
        self.assignment.move_id
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    pub fn last_score(&self) -> f64 {
        self.last_score
    }

    pub fn is_running(&self) -> bool {
        self.state != WorkerState::Finished
    }

    /// Processes pending engine events, then finishes the worker once its
    /// time budget has been used up.
    pub fn update(&mut self, now: Instant) {
        self.drain_events(now);

        if !self.is_running() {
            return;
        }

        match self.started_at {
            Some(started) => {
                if now.duration_since(started) >= self.budget {
                    self.finish();
                }
            }
            None => {
                let Some(timeout) = self.start_timeout else {
                    return;
                };
                if now.duration_since(self.created_at) >= timeout {
                    warn!(
                        "[{}] engine did not start analysing within {:?}, giving up",
                        self.move_number(),
                        timeout
                    );
                    self.finish();
                }
            }
        }
    }

    fn drain_events(&mut self, now: Instant) {
        while let Ok(event) = self.events.try_recv() {
            self.handle_event(event, now);
        }
    }

    fn handle_event(&mut self, event: EngineEvent, now: Instant) {
        let id = self.move_number();

        match event {
            EngineEvent::Activated => {
                debug!("[{}] engine activated, starting analysis", id);
                if self.state == WorkerState::Created {
                    self.start_analysis();
                }
            }
            EngineEvent::Deactivated => debug!("[{}] engine deactivated", id),
            EngineEvent::Error(e) => warn!("[{}] engine error: {}", id, e),
            EngineEvent::AnalysisStarted => {
                debug!("[{}] analysis started", id);
                if self.is_running() && self.started_at.is_none() {
                    self.started_at = Some(now);
                    self.state = WorkerState::Analyzing;
                }
            }
            EngineEvent::AnalysisStopped => debug!("[{}] analysis stopped", id),
            EngineEvent::AnalysisUpdated(analysis) => self.capture(&analysis),
            EngineEvent::LogUpdated(line) => debug!("[{}] engine log: {}", id, line),
        }
    }

    fn start_analysis(&mut self) {
        let request = AnalysisRequest {
            board: self.assignment.board.clone(),
            start: self.assignment.start.clone(),
            moves: self
                .assignment
                .line
                .split_whitespace()
                .map(str::to_string)
                .collect(),
            depth: None,
            budget: self.budget,
            background: false,
            hint: String::new(),
        };

        let Some(engine) = self.engine.as_mut() else {
            return;
        };
        match engine.start_analysis(&request) {
            Ok(()) => self.state = WorkerState::Activated,
            // Left to the start watchdog, if any.
            Err(e) => warn!("[{}] failed to start analysis: {}", self.move_number(), e),
        }
    }

    fn capture(&mut self, analysis: &Analysis) {
        // End-of-search reports carry no score of their own.
        if analysis.best_move && analysis.score.is_none() {
            return;
        }

        if let Some(score) = analysis.pawns(self.starting_side()) {
            self.last_score = score;
        }

        debug!(
            "[{}] analysis updated: move {} score {} depth {:?} book {}",
            self.move_number(),
            self.move_id(),
            self.last_score,
            analysis.depth,
            analysis.book_move
        );

        if analysis.book_move && self.is_running() {
            debug!("[{}] book move, stopping early", self.move_number());
            self.finish();
        }
    }

    #[inline]
    fn starting_side(&self) -> Color {
        self.assignment.start.side_to_move()
    }

    fn finish(&mut self) {
        if let Some(engine) = self.engine.as_mut() {
            if let Err(e) = engine.deactivate() {
                warn!("[{}] failed to deactivate engine: {}", self.move_number(), e);
            }
        }
        self.state = WorkerState::Finished;
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        let Some(mut engine) = self.engine.take() else {
            return;
        };

        let id = self.assignment.move_number;
        if self.state != WorkerState::Finished {
            if let Err(e) = engine.deactivate() {
                debug!("[{}] deactivate during teardown failed: {}", id, e);
            }
        }
        if let Err(e) = engine.close() {
            warn!("[{}] failed to release engine: {}", id, e);
        }
    }
}

fn configure(engine: &mut dyn EngineHandle, start: &Board) -> Result<(), EngineError> {
    if !engine.has_option(THREADS_OPTION) {
        return Err(EngineError::UnsupportedOption(THREADS_OPTION.to_string()));
    }
    engine.set_option(THREADS_OPTION, "1")?;
    engine.set_start_position(start);
    engine.activate()
}
