use thiserror::Error;

use crate::engine::EngineError;

#[derive(Debug, Error)]
pub enum EvaluationError {
    #[error("game evaluation already running")]
    AlreadyRunning,

    #[error("failed to start worker for move {move_number}: {source}")]
    Admission {
        move_number: usize,
        #[source]
        source: EngineError,
    },
}
