use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("failed to allocate a unique id within the retry window")]
    IdSpaceExhausted,
    #[error("repo not found: {0}")]
    RepoNotFound(String),
    #[error("task not found: {0}")]
    TaskNotFound(String),
    #[error("run not found: {0}")]
    RunNotFound(String),
    #[error("notification not found: {0}")]
    NotificationNotFound(String),
    #[error("task {0} is not in status REVIEW")]
    InvalidStatus(String),
}

pub type StoreResult<T> = Result<T, StoreError>;
