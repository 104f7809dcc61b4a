use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Store(#[from] repopilot_db::StoreError),
}

pub type ExecutorResult<T> = Result<T, ExecutorError>;
