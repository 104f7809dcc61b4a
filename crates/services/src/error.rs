use thiserror::Error;

/// Errors from shelling out to `git` or its surrounding pipeline steps.
/// Best-effort cleanup calls (`worktree remove`, `branch -D`, `fetch`) never
/// surface through this type — callers swallow those directly.
#[derive(Debug, Error)]
pub enum GitError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("command failed: {0}\n{1}")]
    CommandFailed(String, String),
    #[error("no base ref worked for worktree creation; tried {candidates:?}: {last_error}")]
    NoBaseRef { candidates: Vec<String>, last_error: String },
    #[error("{0}")]
    TestsFailed(String),
    #[error("{0}")]
    PrCredentialsMissing(String),
    #[error("GitHub API error ({status}): {body}")]
    GitHubApi { status: u16, body: String },
}

pub type GitResult<T> = Result<T, GitError>;
