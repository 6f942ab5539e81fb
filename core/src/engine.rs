// External UCI engines behind the evaluation engine interface.
//
// Each instance is its own process. Its output is decoded on the
// connection's reader thread, translated into engine events and pushed onto
// the owning worker's channel.

use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use ahash::AHashMap;
use cozy_chess::{Board, Color};
use evaluation::{
    Analysis, AnalysisRequest, EngineError, EngineEvent, EngineFactory, EngineHandle, RawScore,
};
use log::{debug, info};
use uci::{EngineConnection, EngineMessage, GoParams, GuiCommand, Info, Score, UciOption};

/// An engine binary together with what it advertised during the handshake.
#[derive(Debug, Clone)]
pub struct EngineSpec {
    pub path: PathBuf,
    pub name: String,
    pub options: Vec<UciOption>,
}

impl EngineSpec {
    /// Starts the engine, runs the `uci` handshake and shuts it down again.
    pub fn probe(path: &Path, timeout: Duration) -> Result<Self, EngineError> {
        let (tx, rx) = mpsc::channel();
        let mut connection = EngineConnection::spawn(
            path,
            &[],
            move |message| {
                let _ = tx.send(message);
            },
            || {},
        )
        .map_err(|e| EngineError::Spawn(format!("{}: {}", path.display(), e)))?;

        connection
            .send(&GuiCommand::Uci)
            .map_err(|e| EngineError::Process(e.to_string()))?;

        let mut name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let mut options = Vec::new();

        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let message = rx.recv_timeout(remaining).map_err(|_| {
                EngineError::Spawn(format!(
                    "{}: no uciok within {:?}",
                    path.display(),
                    timeout
                ))
            })?;

            match message {
                EngineMessage::IdName(id) => name = id,
                EngineMessage::Option(option) => options.push(option),
                EngineMessage::UciOk => break,
                _ => {}
            }
        }

        if let Err(e) = connection.close() {
            debug!("{} did not shut down cleanly: {}", name, e);
        }

        info!(
            "Found engine '{}' at {} ({} options)",
            name,
            path.display(),
            options.len()
        );

        Ok(Self {
            path: path.to_path_buf(),
            name,
            options,
        })
    }
}

/// The engines available to an evaluation, addressed by index.
#[derive(Debug, Default)]
pub struct EngineRegistry {
    engines: Vec<EngineSpec>,
}

impl EngineRegistry {
    pub fn probe(paths: &[PathBuf], timeout: Duration) -> Result<Self, EngineError> {
        let engines = paths
            .iter()
            .map(|path| EngineSpec::probe(path, timeout))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { engines })
    }

    pub fn engines(&self) -> &[EngineSpec] {
        &self.engines
    }

    pub fn get(&self, index: usize) -> Option<&EngineSpec> {
        self.engines.get(index)
    }
}

impl EngineFactory for EngineRegistry {
    fn new_instance(
        &self,
        selector: usize,
        events: Sender<EngineEvent>,
    ) -> Result<Box<dyn EngineHandle>, EngineError> {
        let spec = self
            .get(selector)
            .ok_or(EngineError::UnknownEngine(selector))?;

        Ok(Box::new(UciEngine::spawn(spec, events)?))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    /// `isready` sent, waiting for `readyok`.
    Activating,
    Ready,
    Analyzing,
    Closed,
}

/// What the reader thread needs to know to interpret engine output.
#[derive(Debug)]
struct Session {
    phase: Phase,
    /// Side to move in the analysed position, for flipping centipawn scores.
    side_to_move: Color,
    variation: Vec<String>,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            phase: Phase::Idle,
            side_to_move: Color::White,
            variation: Vec::new(),
        }
    }
}

/// One engine process analysing one position at a time.
pub struct UciEngine {
    name: String,
    options: AHashMap<String, UciOption>,
    pending_options: Vec<(String, String)>,
    start: Option<Board>,

    connection: EngineConnection,
    session: Arc<Mutex<Session>>,
    events: Sender<EngineEvent>,
}

impl UciEngine {
    fn spawn(spec: &EngineSpec, events: Sender<EngineEvent>) -> Result<Self, EngineError> {
        let session = Arc::new(Mutex::new(Session::default()));

        let on_message = {
            let session = Arc::clone(&session);
            let events = events.clone();
            move |message: EngineMessage| {
                let translated = translate(&mut lock(&session), message);
                for event in translated {
                    let _ = events.send(event);
                }
            }
        };
        let on_exit = {
            let session = Arc::clone(&session);
            let events = events.clone();
            move || {
                let mut session = lock(&session);
                if session.phase != Phase::Closed {
                    session.phase = Phase::Closed;
                    let _ = events.send(EngineEvent::Error(EngineError::Process(
                        "engine exited unexpectedly".to_string(),
                    )));
                }
            }
        };

        let connection = EngineConnection::spawn(&spec.path, &[], on_message, on_exit)
            .map_err(|e| EngineError::Spawn(format!("{}: {}", spec.path.display(), e)))?;

        debug!("Started {} (pid {})", spec.name, connection.id());

        Ok(Self {
            name: spec.name.clone(),
            options: spec
                .options
                .iter()
                .map(|option| (option.name.to_ascii_lowercase(), option.clone()))
                .collect(),
            pending_options: Vec::new(),
            start: None,
            connection,
            session,
            events,
        })
    }

    fn send(&mut self, command: GuiCommand) -> Result<(), EngineError> {
        self.connection
            .send(&command)
            .map_err(|e| EngineError::Process(format!("{}: {}", self.name, e)))
    }

    fn emit(&self, event: EngineEvent) {
        let _ = self.events.send(event);
    }
}

impl EngineHandle for UciEngine {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn has_option(&self, name: &str) -> bool {
        self.options.contains_key(&name.to_ascii_lowercase())
    }

    fn set_option(&mut self, name: &str, value: &str) -> Result<(), EngineError> {
        let option = self
            .options
            .get(&name.to_ascii_lowercase())
            .ok_or_else(|| EngineError::UnsupportedOption(name.to_string()))?;

        option
            .option_type
            .validate(value)
            .map_err(|reason| EngineError::InvalidOption {
                name: name.to_string(),
                reason,
            })?;

        // Sent on activation, after the handshake.
        self.pending_options
            .push((option.name.clone(), value.to_string()));
        Ok(())
    }

    fn set_start_position(&mut self, board: &Board) {
        self.start = Some(board.clone());
    }

    fn activate(&mut self) -> Result<(), EngineError> {
        self.send(GuiCommand::Uci)?;
        for (name, value) in std::mem::take(&mut self.pending_options) {
            self.send(GuiCommand::SetOption { name, value })?;
        }
        self.send(GuiCommand::UciNewGame)?;

        lock(&self.session).phase = Phase::Activating;
        self.send(GuiCommand::IsReady)
    }

    fn deactivate(&mut self) -> Result<(), EngineError> {
        let was_analyzing = {
            let mut session = lock(&self.session);
            let analyzing = session.phase == Phase::Analyzing;
            if session.phase != Phase::Closed {
                session.phase = Phase::Idle;
            }
            analyzing
        };

        if was_analyzing {
            self.send(GuiCommand::Stop)?;
            self.emit(EngineEvent::AnalysisStopped);
        }
        self.emit(EngineEvent::Deactivated);
        Ok(())
    }

    fn start_analysis(&mut self, request: &AnalysisRequest) -> Result<(), EngineError> {
        let start = self.start.clone().unwrap_or_else(|| request.start.clone());

        {
            let mut session = lock(&self.session);
            if session.phase == Phase::Closed {
                return Err(EngineError::Process(format!("{} has exited", self.name)));
            }
            session.phase = Phase::Analyzing;
            session.side_to_move = request.board.side_to_move();
            session.variation = request.moves.clone();
        }

        self.send(GuiCommand::Position {
            fen: start.to_string(),
            moves: request.moves.clone(),
        })?;
        self.send(GuiCommand::Go(GoParams {
            infinite: request.background,
            depth: request.depth,
            move_time: (!request.background).then(|| request.budget.as_millis() as u64),
        }))?;

        self.emit(EngineEvent::AnalysisStarted);
        Ok(())
    }

    fn close(mut self: Box<Self>) -> Result<(), EngineError> {
        lock(&self.session).phase = Phase::Closed;
        self.connection
            .close()
            .map_err(|e| EngineError::Process(format!("{}: {}", self.name, e)))
    }
}

fn lock(session: &Mutex<Session>) -> MutexGuard<'_, Session> {
    session.lock().unwrap_or_else(|e| e.into_inner())
}

/// Turns one line of engine output into the events it implies.
fn translate(session: &mut Session, message: EngineMessage) -> Vec<EngineEvent> {
    match message {
        EngineMessage::ReadyOk if session.phase == Phase::Activating => {
            session.phase = Phase::Ready;
            vec![EngineEvent::Activated]
        }
        EngineMessage::Info(info) if session.phase == Phase::Analyzing => {
            translate_info(session, info)
        }
        EngineMessage::BestMove { best_move, .. } if session.phase == Phase::Analyzing => {
            session.phase = Phase::Ready;
            vec![
                EngineEvent::AnalysisUpdated(Analysis {
                    best_move: true,
                    variation: session.variation.clone(),
                    pv: vec![best_move],
                    ..Default::default()
                }),
                EngineEvent::AnalysisStopped,
            ]
        }
        EngineMessage::Unknown(line) => vec![EngineEvent::LogUpdated(line)],
        _ => Vec::new(),
    }
}

fn translate_info(session: &Session, info: Info) -> Vec<EngineEvent> {
    // Only the main line counts.
    if info.multi_pv.is_some_and(|pv| pv > 1) {
        return Vec::new();
    }

    let book_move = info
        .string
        .as_deref()
        .is_some_and(|text| text.to_ascii_lowercase().contains("book"));

    let score = info.score.map(|score| match score {
        Score::Centipawns(cp) if session.side_to_move == Color::Black => {
            RawScore::Centipawns(-cp)
        }
        Score::Centipawns(cp) => RawScore::Centipawns(cp),
        // Normalised by the worker, which knows the ply.
        Score::Mate(moves) => RawScore::Mate(moves),
    });

    if score.is_none() && !book_move {
        return match info.string {
            Some(text) => vec![EngineEvent::LogUpdated(text)],
            None => Vec::new(),
        };
    }

    vec![EngineEvent::AnalysisUpdated(Analysis {
        score,
        best_move: false,
        book_move,
        depth: info.depth,
        variation: session.variation.clone(),
        pv: info.pv,
    })]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analyzing(side_to_move: Color, variation: &[&str]) -> Session {
        Session {
            phase: Phase::Analyzing,
            side_to_move,
            variation: variation.iter().map(|m| m.to_string()).collect(),
        }
    }

    fn info_with(score: Score) -> EngineMessage {
        EngineMessage::Info(Info {
            depth: Some(12),
            score: Some(score),
            pv: vec!["e7e5".to_string()],
            ..Default::default()
        })
    }

    #[test]
    fn test_readyok_activates_once() {
        let mut session = Session {
            phase: Phase::Activating,
            ..Default::default()
        };

        assert_eq!(
            translate(&mut session, EngineMessage::ReadyOk),
            vec![EngineEvent::Activated]
        );
        assert_eq!(session.phase, Phase::Ready);
        assert!(translate(&mut session, EngineMessage::ReadyOk).is_empty());
    }

    #[test]
    fn test_centipawns_flip_to_white() {
        let mut session = analyzing(Color::Black, &["e2e4"]);

        let events = translate(&mut session, info_with(Score::Centipawns(30)));
        let [EngineEvent::AnalysisUpdated(analysis)] = events.as_slice() else {
            panic!("unexpected events: {:?}", events);
        };

        assert_eq!(analysis.score, Some(RawScore::Centipawns(-30)));
        assert_eq!(analysis.depth, Some(12));
        assert_eq!(analysis.variation, vec!["e2e4".to_string()]);
        assert_eq!(analysis.pv, vec!["e7e5".to_string()]);
        assert!(!analysis.best_move);

        let mut session = analyzing(Color::White, &[]);
        let events = translate(&mut session, info_with(Score::Centipawns(30)));
        let [EngineEvent::AnalysisUpdated(analysis)] = events.as_slice() else {
            panic!("unexpected events: {:?}", events);
        };
        assert_eq!(analysis.score, Some(RawScore::Centipawns(30)));
    }

    #[test]
    fn test_mate_kept_for_the_worker() {
        let mut session = analyzing(Color::Black, &["f2f3", "e7e5", "g2g4"]);

        let events = translate(&mut session, info_with(Score::Mate(1)));
        let [EngineEvent::AnalysisUpdated(analysis)] = events.as_slice() else {
            panic!("unexpected events: {:?}", events);
        };

        assert_eq!(analysis.score, Some(RawScore::Mate(1)));
        assert_eq!(analysis.pawns(Color::White), Some(-10.0));
    }

    #[test]
    fn test_bestmove_ends_analysis() {
        let mut session = analyzing(Color::White, &[]);

        let events = translate(
            &mut session,
            EngineMessage::BestMove {
                best_move: "e2e4".to_string(),
                ponder: None,
            },
        );

        assert_eq!(events.len(), 2);
        let EngineEvent::AnalysisUpdated(analysis) = &events[0] else {
            panic!("unexpected event: {:?}", events[0]);
        };
        assert!(analysis.best_move);
        assert_eq!(analysis.score, None);
        assert_eq!(events[1], EngineEvent::AnalysisStopped);
        assert_eq!(session.phase, Phase::Ready);
    }

    #[test]
    fn test_book_move() {
        let mut session = analyzing(Color::White, &[]);
        let message = EngineMessage::Info(Info {
            string: Some("Book move e2e4".to_string()),
            ..Default::default()
        });

        let events = translate(&mut session, message);
        let [EngineEvent::AnalysisUpdated(analysis)] = events.as_slice() else {
            panic!("unexpected events: {:?}", events);
        };
        assert!(analysis.book_move);
        assert_eq!(analysis.score, None);
    }

    #[test]
    fn test_output_outside_analysis_is_ignored() {
        let mut session = Session::default();

        assert!(translate(&mut session, info_with(Score::Centipawns(5))).is_empty());
        assert!(translate(
            &mut session,
            EngineMessage::BestMove {
                best_move: "e2e4".to_string(),
                ponder: None,
            }
        )
        .is_empty());
        assert_eq!(session.phase, Phase::Idle);
    }

    #[test]
    fn test_secondary_lines_and_chatter() {
        let mut session = analyzing(Color::White, &[]);

        let secondary = EngineMessage::Info(Info {
            multi_pv: Some(2),
            score: Some(Score::Centipawns(10)),
            ..Default::default()
        });
        assert!(translate(&mut session, secondary).is_empty());

        let text = EngineMessage::Info(Info {
            string: Some("NNUE evaluation enabled".to_string()),
            ..Default::default()
        });
        assert_eq!(
            translate(&mut session, text),
            vec![EngineEvent::LogUpdated("NNUE evaluation enabled".to_string())]
        );

        assert_eq!(
            translate(&mut session, EngineMessage::Unknown("hello".to_string())),
            vec![EngineEvent::LogUpdated("hello".to_string())]
        );
    }

    #[test]
    fn test_high_multipv_is_not_the_main_line() {
        let mut session = analyzing(Color::White, &[]);
        let message = uci::Decoder::new().decode("info depth 8 multipv 257 score cp 40 pv d2d4");

        assert!(translate(&mut session, message).is_empty());
    }

    #[test]
    fn test_unknown_engine_index() {
        let registry = EngineRegistry::default();
        let (tx, _rx) = mpsc::channel();

        assert_eq!(
            registry.new_instance(3, tx).err(),
            Some(EngineError::UnknownEngine(3))
        );
    }
}
