use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::time::Instant;

use log::{debug, error, info};

use crate::clock::{Clock, SystemClock};
use crate::config::EvaluationConfig;
use crate::engine::EngineFactory;
use crate::error::EvaluationError;
use crate::scores::ScoreSnapshot;
use crate::source::PositionSource;
use crate::worker::{Assignment, Worker};

/// Notifications sent to whoever owns the evaluation.
#[derive(Debug, Clone, PartialEq)]
pub enum EvaluationEvent {
    /// Latest score of every live worker, sent once per tick.
    Changed(ScoreSnapshot),
    /// Every position has been analysed, or the run was stopped.
    Complete,
    /// A worker could not be started. The run is abandoned.
    Failed(String),
}

/// Evaluates every position of a game, running a bounded number of engines
/// at once.
///
/// Nothing here blocks on an engine. All work happens on tick boundaries:
/// scores are harvested from the live workers first, then new workers are
/// admitted while there is capacity and positions left.
pub struct GameEvaluation<S, F, C = SystemClock>
where
    S: PositionSource,
    F: EngineFactory,
    C: Clock,
{
    config: EvaluationConfig,
    source: S,
    factory: F,
    clock: C,
    events: Sender<EvaluationEvent>,

    target_concurrency: usize,
    running: bool,
    /// No run in progress, or its final event (`Complete` or `Failed`) was sent.
    settled: bool,
    next_tick: Option<Instant>,
    move_numbers: usize,
    line: String,
    workers: Vec<Worker>,
    scores: BTreeMap<usize, f64>,
}

impl<S, F> GameEvaluation<S, F, SystemClock>
where
    S: PositionSource,
    F: EngineFactory,
{
    pub fn new(
        config: EvaluationConfig,
        source: S,
        factory: F,
        events: Sender<EvaluationEvent>,
    ) -> Self {
        Self::with_clock(config, source, factory, SystemClock, events)
    }
}

impl<S, F, C> GameEvaluation<S, F, C>
where
    S: PositionSource,
    F: EngineFactory,
    C: Clock,
{
    pub fn with_clock(
        config: EvaluationConfig,
        source: S,
        factory: F,
        clock: C,
        events: Sender<EvaluationEvent>,
    ) -> Self {
        Self {
            target_concurrency: config.concurrency(),
            config,
            source,
            factory,
            clock,
            events,
            running: false,
            settled: true,
            next_tick: None,
            move_numbers: 0,
            line: String::new(),
            workers: Vec::new(),
            scores: BTreeMap::new(),
        }
    }

    /// Seeds a worker for the current position and starts ticking.
    pub fn start(&mut self) -> Result<(), EvaluationError> {
        if self.running {
            return Err(EvaluationError::AlreadyRunning);
        }

        self.workers.clear();
        self.scores.clear();
        self.line.clear();
        self.move_numbers = 0;
        self.target_concurrency = self.config.concurrency();

        info!(
            "Game evaluation starting with {} moves on {} engines",
            self.source.count_moves(),
            self.target_concurrency
        );

        self.source.move_to_start();
        let now = self.clock.now();
        let worker = self.spawn_worker(now)?;
        self.workers.push(worker);

        self.running = true;
        self.settled = false;
        self.next_tick = Some(now + self.config.tick_interval);

        Ok(())
    }

    /// Tears down every worker and signals completion of the run in
    /// progress, if any. Safe to call at any time.
    pub fn stop(&mut self) {
        if !self.workers.is_empty() {
            info!("Stopping game evaluation with {} live workers", self.workers.len());
        }
        self.workers.clear();
        self.next_tick = None;
        self.running = false;
        self.signal_complete();
    }

    /// Runs a tick if one is due.
    pub fn poll(&mut self) -> Result<bool, EvaluationError> {
        let Some(next_tick) = self.next_tick else {
            return Ok(false);
        };

        let now = self.clock.now();
        if now < next_tick {
            return Ok(false);
        }

        self.next_tick = Some(now + self.config.tick_interval);
        self.tick()?;

        Ok(true)
    }

    /// Drives ticks on the calling thread until the run completes, fails, or
    /// `cancel` is raised.
    pub fn run(&mut self, cancel: &AtomicBool) -> Result<(), EvaluationError> {
        while let Some(next_tick) = self.next_tick {
            if cancel.load(Ordering::Relaxed) {
                info!("Game evaluation cancelled");
                self.stop();
                break;
            }

            let wait = next_tick.saturating_duration_since(self.clock.now());
            if !wait.is_zero() {
                self.clock.sleep(wait);
            }
            self.poll()?;
        }

        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn live_workers(&self) -> usize {
        self.workers.len()
    }

    pub fn target_concurrency(&self) -> usize {
        self.target_concurrency
    }

    /// Last known score of every position seen so far in this run.
    pub fn scores(&self) -> &BTreeMap<usize, f64> {
        &self.scores
    }

    pub(crate) fn tick(&mut self) -> Result<(), EvaluationError> {
        let now = self.clock.now();

        let mut snapshot = ScoreSnapshot::default();
        let scores = &mut self.scores;
        // Dropping a worker releases its engine, so read the score first.
        self.workers.retain_mut(|worker| {
            worker.update(now);
            snapshot.insert(worker.move_number(), worker.last_score());
            scores.insert(worker.move_number(), worker.last_score());
            worker.is_running()
        });

        debug!(
            "Tick: {} scores, {} live workers",
            snapshot.len(),
            self.workers.len()
        );
        self.send(EvaluationEvent::Changed(snapshot));

        let mut exhausted = false;
        while self.workers.len() < self.target_concurrency {
            if !self.source.forward() {
                exhausted = true;
                break;
            }

            if let Some(notation) = self.source.last_move_notation() {
                self.line.push_str(notation);
                self.line.push(' ');
            }

            match self.spawn_worker(now) {
                Ok(worker) => self.workers.push(worker),
                Err(e) => {
                    error!("{}, abandoning evaluation", e);
                    self.workers.clear();
                    self.next_tick = None;
                    self.running = false;
                    self.settled = true;
                    self.send(EvaluationEvent::Failed(e.to_string()));
                    return Err(e);
                }
            }
        }

        if self.workers.is_empty() && exhausted {
            info!("Game evaluation complete");
            self.next_tick = None;
            self.running = false;
            self.signal_complete();
        }

        Ok(())
    }

    fn spawn_worker(&mut self, now: Instant) -> Result<Worker, EvaluationError> {
        let move_number = self.move_numbers;
        self.move_numbers += 1;

        let assignment = Assignment {
            move_number,
            move_id: self.source.current_move(),
            start: self.source.starting_board().clone(),
            board: self.source.board().clone(),
            line: self.line.clone(),
        };
        debug!(
            "Creating worker {} for move {}",
            move_number, assignment.move_id
        );

        Worker::new(&self.factory, &self.config, assignment, now)
            .map_err(|source| EvaluationError::Admission {
                move_number,
                source,
            })
    }

    fn signal_complete(&mut self) {
        if !self.settled {
            self.settled = true;
            self.send(EvaluationEvent::Complete);
        }
    }

    fn send(&self, event: EvaluationEvent) {
        if self.events.send(event).is_err() {
            debug!("Evaluation listener has gone away");
        }
    }
}

impl<S, F, C> Drop for GameEvaluation<S, F, C>
where
    S: PositionSource,
    F: EngineFactory,
    C: Clock,
{
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::testing::{Journal, MockFactory, Script};
    use std::sync::mpsc::{channel, Receiver};
    use std::sync::Arc;
    use std::time::Duration;
    use utils::{Game, GameCursor};

    const TICK: Duration = Duration::from_millis(100);
    const BUDGET: Duration = Duration::from_millis(300);
    const FIVE_MOVES: &str = "startpos moves e2e4 e7e5 g1f3 b8c6 f1b5";

    type TestEvaluation = GameEvaluation<GameCursor, MockFactory, ManualClock>;

    struct Harness {
        evaluation: TestEvaluation,
        events: Receiver<EvaluationEvent>,
        journal: Arc<Journal>,
        clock: ManualClock,
    }

    fn harness(position: &str, threads: usize, script: Script) -> Harness {
        let config = EvaluationConfig {
            move_time: BUDGET,
            tick_interval: TICK,
            threads: Some(threads),
            ..Default::default()
        };
        let cursor = Game::from_position(position).unwrap().cursor();
        let factory = MockFactory::new(script);
        let journal = Arc::clone(&factory.journal);
        let clock = ManualClock::new();
        let (tx, rx) = channel();

        Harness {
            evaluation: GameEvaluation::with_clock(config, cursor, factory, clock.clone(), tx),
            events: rx,
            journal,
            clock,
        }
    }

    fn drain(events: &Receiver<EvaluationEvent>) -> Vec<EvaluationEvent> {
        events.try_iter().collect()
    }

    fn completions(events: &[EvaluationEvent]) -> usize {
        events
            .iter()
            .filter(|e| matches!(e, EvaluationEvent::Complete))
            .count()
    }

    #[test]
    fn test_start_seeds_one_worker() {
        let mut h = harness(FIVE_MOVES, 2, Script::default());
        h.evaluation.start().unwrap();

        assert!(h.evaluation.is_running());
        assert_eq!(h.evaluation.live_workers(), 1);
        assert_eq!(h.journal.created(), 1);
        assert!(drain(&h.events).is_empty());
    }

    #[test]
    fn test_start_twice_fails() {
        let mut h = harness(FIVE_MOVES, 2, Script::default());
        h.evaluation.start().unwrap();

        let result = h.evaluation.start();
        assert!(matches!(result, Err(EvaluationError::AlreadyRunning)));
        assert_eq!(h.evaluation.live_workers(), 1);
        assert_eq!(h.journal.created(), 1);
    }

    #[test]
    fn test_stop_before_first_tick() {
        let mut h = harness(FIVE_MOVES, 2, Script::default());
        h.evaluation.start().unwrap();

        h.evaluation.stop();
        assert_eq!(h.evaluation.live_workers(), 0);
        assert_eq!(h.journal.live(), 0);
        assert!(!h.evaluation.is_running());

        h.evaluation.stop();
        assert_eq!(drain(&h.events), vec![EvaluationEvent::Complete]);
    }

    #[test]
    fn test_first_tick_fills_capacity() {
        let mut h = harness(FIVE_MOVES, 3, Script::default());
        h.evaluation.start().unwrap();

        h.clock.advance(TICK);
        h.evaluation.tick().unwrap();

        assert_eq!(h.evaluation.live_workers(), 3);
        let events = drain(&h.events);
        assert_eq!(events.len(), 1);
        let EvaluationEvent::Changed(snapshot) = &events[0] else {
            panic!("Expected Changed")
        };
        // Only the seeded worker existed when scores were harvested.
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.get(0), Some(0.25));
    }

    #[test]
    fn test_full_run_respects_concurrency() {
        let mut h = harness(FIVE_MOVES, 2, Script::default());
        h.evaluation.start().unwrap();

        let mut ticks = 0;
        while h.evaluation.is_running() {
            h.clock.advance(TICK);
            h.evaluation.tick().unwrap();
            assert!(h.evaluation.live_workers() <= 2);

            ticks += 1;
            assert!(ticks < 100, "evaluation never completed");
        }

        let events = drain(&h.events);
        assert_eq!(completions(&events), 1);
        assert_eq!(events.last(), Some(&EvaluationEvent::Complete));
        assert_eq!(events.len(), ticks + 1);

        // Every position got exactly one worker, in order.
        assert_eq!(h.journal.created(), 6);
        assert_eq!(h.journal.live(), 0);
        let plies: Vec<usize> = h
            .journal
            .requests
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.moves.len())
            .collect();
        assert_eq!(plies, vec![0, 1, 2, 3, 4, 5]);

        let scores = h.evaluation.scores();
        assert_eq!(scores.keys().copied().collect::<Vec<_>>(), vec![0, 1, 2, 3, 4, 5]);
        assert!(scores.values().all(|&s| s == 0.25));
    }

    #[test]
    fn test_run_until_complete() {
        let mut h = harness(FIVE_MOVES, 4, Script::default());
        h.evaluation.start().unwrap();

        h.evaluation.run(&AtomicBool::new(false)).unwrap();

        assert!(!h.evaluation.is_running());
        assert_eq!(h.evaluation.live_workers(), 0);
        assert_eq!(completions(&drain(&h.events)), 1);
        assert_eq!(h.evaluation.scores().len(), 6);
    }

    #[test]
    fn test_game_without_moves() {
        let mut h = harness("startpos", 2, Script::default());
        h.evaluation.start().unwrap();
        h.evaluation.run(&AtomicBool::new(false)).unwrap();

        assert_eq!(h.journal.created(), 1);
        assert_eq!(h.evaluation.scores().get(&0), Some(&0.25));
        assert_eq!(completions(&drain(&h.events)), 1);
    }

    #[test]
    fn test_cancel() {
        let mut h = harness(FIVE_MOVES, 2, Script::default());
        h.evaluation.start().unwrap();

        h.evaluation.run(&AtomicBool::new(true)).unwrap();

        assert_eq!(h.evaluation.live_workers(), 0);
        assert_eq!(h.journal.live(), 0);
        assert_eq!(drain(&h.events), vec![EvaluationEvent::Complete]);
    }

    #[test]
    fn test_seed_failure() {
        let mut h = harness(
            FIVE_MOVES,
            2,
            Script {
                fail_at: Some(0),
                ..Default::default()
            },
        );

        let result = h.evaluation.start();
        assert!(matches!(
            result,
            Err(EvaluationError::Admission { move_number: 0, .. })
        ));
        assert!(!h.evaluation.is_running());
        assert_eq!(h.evaluation.live_workers(), 0);
    }

    #[test]
    fn test_admission_failure_discards_workers() {
        let mut h = harness(
            FIVE_MOVES,
            3,
            Script {
                fail_at: Some(2),
                ..Default::default()
            },
        );
        h.evaluation.start().unwrap();

        h.clock.advance(TICK);
        let result = h.evaluation.tick();

        assert!(matches!(
            result,
            Err(EvaluationError::Admission { move_number: 2, .. })
        ));
        assert_eq!(h.evaluation.live_workers(), 0);
        assert_eq!(h.journal.live(), 0);
        assert!(!h.evaluation.is_running());
        assert!(!h.evaluation.poll().unwrap());

        let events = drain(&h.events);
        assert!(matches!(events.as_slice(), [EvaluationEvent::Changed(_), EvaluationEvent::Failed(_)]));
    }

    #[test]
    fn test_no_completion_after_failure() {
        let Harness {
            mut evaluation,
            events,
            clock,
            ..
        } = harness(
            FIVE_MOVES,
            3,
            Script {
                fail_at: Some(2),
                ..Default::default()
            },
        );
        evaluation.start().unwrap();
        clock.advance(TICK);
        assert!(evaluation.tick().is_err());

        evaluation.stop();
        drop(evaluation);

        let events = drain(&events);
        assert_eq!(completions(&events), 0);
        assert!(matches!(events.last(), Some(EvaluationEvent::Failed(_))));
    }

    #[test]
    fn test_no_completion_after_seed_failure() {
        let Harness {
            mut evaluation,
            events,
            ..
        } = harness(
            FIVE_MOVES,
            2,
            Script {
                fail_at: Some(0),
                ..Default::default()
            },
        );
        assert!(evaluation.start().is_err());

        drop(evaluation);
        assert!(drain(&events).is_empty());
    }

    #[test]
    fn test_idle_drop_is_silent() {
        let Harness {
            evaluation, events, ..
        } = harness(FIVE_MOVES, 2, Script::default());

        drop(evaluation);
        assert!(drain(&events).is_empty());
    }

    #[test]
    fn test_restart_after_completion() {
        let mut h = harness("startpos moves d2d4", 2, Script::default());
        h.evaluation.start().unwrap();
        h.evaluation.run(&AtomicBool::new(false)).unwrap();
        assert_eq!(completions(&drain(&h.events)), 1);

        h.evaluation.start().unwrap();
        h.evaluation.run(&AtomicBool::new(false)).unwrap();
        assert_eq!(completions(&drain(&h.events)), 1);
        assert_eq!(h.journal.created(), 4);
    }

    #[test]
    fn test_drop_releases_engines() {
        let h = harness(FIVE_MOVES, 3, Script::default());
        let Harness {
            mut evaluation,
            journal,
            clock,
            events: _events,
        } = h;
        evaluation.start().unwrap();
        clock.advance(TICK);
        evaluation.tick().unwrap();
        assert_eq!(journal.live(), 3);

        drop(evaluation);
        assert_eq!(journal.live(), 0);
    }
}
