pub mod error;
mod merged_stdio;
pub mod process_registry;
pub mod runner;

pub use error::{ExecutorError, ExecutorResult};
pub use process_registry::ProcessRegistry;
pub use runner::{
    build_claude_cmd, extract_text_from_stream_line, is_resume_recoverable_error, AgentOutcome,
    AgentRunner,
};
