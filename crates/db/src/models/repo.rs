use serde::{Deserialize, Serialize};
use ts_rs::TS;

pub const DEFAULT_TEST_COMMAND: &str = "npm run test:ci --if-present || echo skip-tests";

fn default_true() -> bool {
    true
}

fn default_main_branch() -> String {
    "main".to_string()
}

fn default_test_command() -> String {
    DEFAULT_TEST_COMMAND.to_string()
}

fn default_forbidden_symlink_paths() -> Vec<String> {
    vec!["PROGRESS.md".to_string()]
}

/// A git repository registered for task orchestration.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct RepoConfig {
    pub id: String,
    pub name: String,
    pub root_path: String,
    #[serde(default = "default_main_branch")]
    pub main_branch: String,
    #[serde(default = "default_test_command")]
    pub test_command: String,
    #[serde(default)]
    pub github_repo: String,
    #[serde(default)]
    pub shared_symlink_paths: Vec<String>,
    #[serde(default = "default_forbidden_symlink_paths")]
    pub forbidden_symlink_paths: Vec<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

/// Fields a caller may patch on a repo. `None` leaves the field untouched.
#[derive(Debug, Clone, Default, Deserialize, TS)]
pub struct RepoPatchInput {
    pub enabled: Option<bool>,
    pub test_command: Option<String>,
    pub main_branch: Option<String>,
}

impl RepoConfig {
    pub fn apply_patch(&mut self, patch: RepoPatchInput) {
        if let Some(v) = patch.enabled {
            self.enabled = v;
        }
        if let Some(v) = patch.test_command {
            self.test_command = v;
        }
        if let Some(v) = patch.main_branch {
            self.main_branch = v;
        }
    }
}
