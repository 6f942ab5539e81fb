// Scripted engines for exercising workers and the scheduler without processes.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};

use cozy_chess::Board;

use crate::engine::{AnalysisRequest, EngineError, EngineEvent, EngineFactory, EngineHandle};
use crate::scores::Analysis;

#[derive(Debug, Clone)]
pub struct Script {
    pub supports_threads: bool,
    /// Reply to `activate` with `Activated`.
    pub activates: bool,
    /// Reply to `start_analysis` with `AnalysisStarted`.
    pub starts: bool,
    /// Updates sent right after analysis starts.
    pub updates: Vec<Analysis>,
    /// Extra events sent on activation, before `Activated`.
    pub on_activate: Vec<EngineEvent>,
    /// Instance number (0-based) at which `new_instance` fails.
    pub fail_at: Option<usize>,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            supports_threads: true,
            activates: true,
            starts: true,
            updates: vec![Analysis::centipawns(25)],
            on_activate: Vec::new(),
            fail_at: None,
        }
    }
}

/// Shared record of what the mock engines were asked to do.
#[derive(Debug, Default)]
pub struct Journal {
    pub created: AtomicUsize,
    pub closed: AtomicUsize,
    pub deactivations: AtomicUsize,
    pub requests: Mutex<Vec<AnalysisRequest>>,
    pub options: Mutex<Vec<(String, String)>>,
}

impl Journal {
    pub fn live(&self) -> usize {
        self.created.load(Ordering::SeqCst) - self.closed.load(Ordering::SeqCst)
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }
}

pub struct MockFactory {
    pub script: Script,
    pub journal: Arc<Journal>,
}

impl MockFactory {
    pub fn new(script: Script) -> Self {
        Self {
            script,
            journal: Arc::new(Journal::default()),
        }
    }
}

impl EngineFactory for MockFactory {
    fn new_instance(
        &self,
        selector: usize,
        events: Sender<EngineEvent>,
    ) -> Result<Box<dyn EngineHandle>, EngineError> {
        if selector != 0 {
            return Err(EngineError::UnknownEngine(selector));
        }

        let instance = self.journal.created();
        if self.script.fail_at == Some(instance) {
            return Err(EngineError::Spawn("scripted failure".to_string()));
        }
        self.journal.created.fetch_add(1, Ordering::SeqCst);

        Ok(Box::new(MockEngine {
            script: self.script.clone(),
            journal: Arc::clone(&self.journal),
            events,
        }))
    }
}

struct MockEngine {
    script: Script,
    journal: Arc<Journal>,
    events: Sender<EngineEvent>,
}

impl MockEngine {
    fn emit(&self, event: EngineEvent) {
        let _ = self.events.send(event);
    }
}

impl EngineHandle for MockEngine {
    fn name(&self) -> String {
        "mock".to_string()
    }

    fn has_option(&self, name: &str) -> bool {
        name != "Threads" || self.script.supports_threads
    }

    fn set_option(&mut self, name: &str, value: &str) -> Result<(), EngineError> {
        self.journal
            .options
            .lock()
            .unwrap()
            .push((name.to_string(), value.to_string()));
        Ok(())
    }

    fn set_start_position(&mut self, _board: &Board) {}

    fn activate(&mut self) -> Result<(), EngineError> {
        for event in self.script.on_activate.clone() {
            self.emit(event);
        }
        if self.script.activates {
            self.emit(EngineEvent::Activated);
        }
        Ok(())
    }

    fn deactivate(&mut self) -> Result<(), EngineError> {
        self.journal.deactivations.fetch_add(1, Ordering::SeqCst);
        self.emit(EngineEvent::AnalysisStopped);
        self.emit(EngineEvent::Deactivated);
        Ok(())
    }

    fn start_analysis(&mut self, request: &AnalysisRequest) -> Result<(), EngineError> {
        self.journal.requests.lock().unwrap().push(request.clone());
        if self.script.starts {
            self.emit(EngineEvent::AnalysisStarted);
            for update in self.script.updates.clone() {
                self.emit(EngineEvent::AnalysisUpdated(Analysis {
                    variation: request.moves.clone(),
                    ..update
                }));
            }
        }
        Ok(())
    }

    fn close(self: Box<Self>) -> Result<(), EngineError> {
        self.journal.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
