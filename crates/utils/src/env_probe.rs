use std::collections::HashMap;
use std::path::Path;
use std::process::Command;

use crate::settings::Settings;

/// `which`-style lookup: true iff `name` resolves to something executable on `PATH`.
pub fn has_command(name: &str) -> bool {
    which::which(name).is_ok()
}

/// Pick a conda environment for agent runs: `preferred` if present, else
/// `fallback`, else `None`. Returns `None` outright when `conda` itself isn't
/// on `PATH`.
pub fn select_conda_env(preferred: &str, fallback: &str) -> Option<String> {
    if !has_command("conda") {
        return None;
    }

    let output = Command::new("conda").args(["env", "list"]).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let text = String::from_utf8_lossy(&output.stdout);

    let mut names = Vec::new();
    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        if let Some(first) = trimmed.split_whitespace().next() {
            let name = first.trim_end_matches('*');
            if !name.is_empty() {
                names.push(name.to_string());
            }
        }
    }

    if names.iter().any(|n| n == preferred) {
        Some(preferred.to_string())
    } else if names.iter().any(|n| n == fallback) {
        Some(fallback.to_string())
    } else {
        None
    }
}

/// Default-parameterized `select_conda_env("dl2", "base")`.
pub fn select_default_conda_env() -> Option<String> {
    select_conda_env("dl2", "base")
}

/// Command prefix that routes an invocation through the selected conda
/// environment; empty when no environment was selected.
pub fn conda_run_prefix(env: Option<&str>) -> Vec<String> {
    match env {
        Some(name) if !name.is_empty() => {
            vec!["conda".to_string(), "run".to_string(), "-n".to_string(), name.to_string()]
        }
        _ => Vec::new(),
    }
}

/// Response shape for `GET /api/health`.
#[derive(Debug, Clone)]
pub struct HealthReport {
    pub status: String,
    pub python_env_selected: String,
    pub dependencies: HashMap<String, bool>,
    pub paths: HashMap<String, String>,
}

pub fn get_health(root_dir: &Path) -> HealthReport {
    let settings = Settings {
        root_dir: root_dir.to_path_buf(),
        workers: crate::settings::DEFAULT_WORKERS,
        logs_retention_days: crate::settings::DEFAULT_LOGS_RETENTION_DAYS,
    };

    let mut dependencies = HashMap::new();
    for name in ["claude", "git", "python3", "node", "npm", "gh", "conda"] {
        dependencies.insert(name.to_string(), has_command(name));
    }

    let status = if dependencies.get("claude").copied().unwrap_or(false)
        && dependencies.get("git").copied().unwrap_or(false)
        && dependencies.get("python3").copied().unwrap_or(false)
    {
        "ok"
    } else {
        "degraded"
    };

    let python_env_selected = select_default_conda_env().unwrap_or_else(|| "none".to_string());

    let paths = settings
        .path_strings()
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();

    HealthReport {
        status: status.to_string(),
        python_env_selected,
        dependencies,
        paths,
    }
}
