// Capability interface for external analysis engines.
//
// An engine instance pushes its events onto a channel owned by the worker
// that created it. The worker drains that channel on the scheduler's control
// path, so engine events never touch scheduler state directly.

use std::sync::mpsc::Sender;
use std::time::Duration;

use cozy_chess::Board;
use thiserror::Error;

use crate::scores::Analysis;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("no engine registered at index {0}")]
    UnknownEngine(usize),
    #[error("failed to start engine: {0}")]
    Spawn(String),
    #[error("engine does not support option '{0}'")]
    UnsupportedOption(String),
    #[error("invalid value for option '{name}': {reason}")]
    InvalidOption { name: String, reason: String },
    #[error("engine process failure: {0}")]
    Process(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    Activated,
    Deactivated,
    Error(EngineError),
    AnalysisStarted,
    AnalysisStopped,
    AnalysisUpdated(Analysis),
    LogUpdated(String),
}

#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    /// Position to analyse.
    pub board: Board,
    /// Board the game started from, for engines that replay the moves.
    pub start: Board,
    /// Moves leading from `start` to `board`.
    pub moves: Vec<String>,
    /// Depth limit; `None` searches until the budget runs out.
    pub depth: Option<u8>,
    pub budget: Duration,
    /// Keep searching after the budget (until deactivated).
    pub background: bool,
    pub hint: String,
}

/// One engine instance, owned by exactly one worker.
pub trait EngineHandle: Send {
    fn name(&self) -> String;
    fn has_option(&self, name: &str) -> bool;
    fn set_option(&mut self, name: &str, value: &str) -> Result<(), EngineError>;
    fn set_start_position(&mut self, board: &Board);
    fn activate(&mut self) -> Result<(), EngineError>;
    fn deactivate(&mut self) -> Result<(), EngineError>;
    fn start_analysis(&mut self, request: &AnalysisRequest) -> Result<(), EngineError>;
    /// Releases the instance. Failures are reported but the instance is gone either way.
    fn close(self: Box<Self>) -> Result<(), EngineError>;
}

pub trait EngineFactory {
    fn new_instance(
        &self,
        selector: usize,
        events: Sender<EngineEvent>,
    ) -> Result<Box<dyn EngineHandle>, EngineError>;
}
