use core_types::RunStatus;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum ExecutorError {
    #[error("Run {0} not found")]
    NotFound(Uuid),

    #[error("Run {0} already has a live execution unit")]
    AlreadyRunning(Uuid),

    #[error("Execution pool is at capacity ({0} concurrent runs)")]
    PoolExhausted(usize),

    #[error("Run {run_id} is {status} and cannot accept this operation")]
    InvalidState { run_id: Uuid, status: RunStatus },

    #[error("Store error: {0}")]
    Store(#[from] database::StoreError),

    #[error("Strategy error: {0}")]
    Strategy(#[from] strategies::StrategyError),

    #[error("Dispatch error: {0}")]
    Dispatch(#[from] dispatch::DispatchError),
}
