mod clock;
mod config;
mod error;
mod scheduler;
mod source;
mod worker;

pub mod engine;
pub mod scores;

#[cfg(test)]
mod testing;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{target_concurrency, EvaluationConfig};
pub use engine::{AnalysisRequest, EngineError, EngineEvent, EngineFactory, EngineHandle};
pub use error::EvaluationError;
pub use scheduler::{EvaluationEvent, GameEvaluation};
pub use scores::{Analysis, RawScore, ScoreSnapshot, MATE_SCORE};
pub use source::PositionSource;
pub use worker::{Assignment, Worker, WorkerState};
