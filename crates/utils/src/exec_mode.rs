use std::env;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU8, Ordering};

use serde::{Deserialize, Serialize};

/// Which side owns the Git pipeline during an EXEC run.
///
/// Modeled as a single process-wide atomic cell (no other globals belong in
/// the core): the settings handler can flip it at runtime, and every new EXEC
/// run reads the current value at dispatch time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ExecMode {
    Agentic,
    Fixed,
}

impl Default for ExecMode {
    fn default() -> Self {
        Self::Agentic
    }
}

impl fmt::Display for ExecMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Agentic => "AGENTIC",
            Self::Fixed => "FIXED",
        })
    }
}

impl FromStr for ExecMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "AGENTIC" => Ok(Self::Agentic),
            "FIXED" => Ok(Self::Fixed),
            other => Err(format!("unknown exec mode: {other}")),
        }
    }
}

impl ExecMode {
    fn as_u8(self) -> u8 {
        match self {
            Self::Agentic => 0,
            Self::Fixed => 1,
        }
    }

    fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::Fixed,
            _ => Self::Agentic,
        }
    }
}

static EXEC_MODE_CELL: AtomicU8 = AtomicU8::new(u8::MAX);

/// Current process-wide exec mode: the runtime override if one has been set
/// via `set`, otherwise `REPOPILOT_EXEC_MODE`, otherwise `ExecMode::Agentic`.
pub fn current() -> ExecMode {
    let stored = EXEC_MODE_CELL.load(Ordering::SeqCst);
    if stored != u8::MAX {
        return ExecMode::from_u8(stored);
    }
    env::var("REPOPILOT_EXEC_MODE")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or_default()
}

/// Set the runtime override, taking precedence over the environment variable
/// until the process restarts.
pub fn set(mode: ExecMode) {
    EXEC_MODE_CELL.store(mode.as_u8(), Ordering::SeqCst);
}

#[cfg(test)]
mod tests {
    use serial_test::serial;

    use super::*;

    #[test]
    #[serial]
    fn defaults_to_agentic_without_env_or_override() {
        // SAFETY: test is serialized against other tests touching this env var.
        unsafe { env::remove_var("REPOPILOT_EXEC_MODE") };
        EXEC_MODE_CELL.store(u8::MAX, Ordering::SeqCst);
        assert_eq!(current(), ExecMode::Agentic);
    }

    #[test]
    #[serial]
    fn runtime_override_wins_over_env() {
        // SAFETY: test is serialized against other tests touching this env var.
        unsafe { env::set_var("REPOPILOT_EXEC_MODE", "FIXED") };
        set(ExecMode::Agentic);
        assert_eq!(current(), ExecMode::Agentic);
        // SAFETY: test is serialized against other tests touching this env var.
        unsafe { env::remove_var("REPOPILOT_EXEC_MODE") };
        EXEC_MODE_CELL.store(u8::MAX, Ordering::SeqCst);
    }
}
