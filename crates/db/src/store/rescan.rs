use std::path::{Path, PathBuf};
use std::process::Command;

use regex_lite::Regex;

/// A directory under the repos root that looks like a usable Git repository:
/// it has a `.git` entry and an `origin` remote that hosts on GitHub.
#[derive(Debug, Clone)]
pub struct ScannedRepo {
    pub name: String,
    pub root_path: PathBuf,
    pub github_repo: String,
    pub main_branch: String,
}

/// Scan `repos_dir` in name order, keeping only qualifying children.
pub fn scan(repos_dir: &Path) -> Vec<ScannedRepo> {
    let Ok(entries) = std::fs::read_dir(repos_dir) else {
        return Vec::new();
    };

    let mut names: Vec<(String, PathBuf)> = entries
        .filter_map(|e| e.ok())
        .filter(|e| e.path().is_dir())
        .map(|e| (e.file_name().to_string_lossy().into_owned(), e.path()))
        .collect();
    names.sort_by(|a, b| a.0.cmp(&b.0));

    let mut out = Vec::new();
    for (name, path) in names {
        if !path.join(".git").exists() {
            continue;
        }
        let Some(origin) = origin_url(&path) else {
            continue;
        };
        let Some(github_repo) = derive_github_repo(&origin) else {
            continue;
        };
        let main_branch = detect_main_branch(&path);
        out.push(ScannedRepo {
            name,
            root_path: path,
            github_repo,
            main_branch,
        });
    }
    out
}

fn origin_url(repo_path: &Path) -> Option<String> {
    let output = Command::new("git")
        .args(["remote", "get-url", "origin"])
        .current_dir(repo_path)
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let url = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if url.is_empty() { None } else { Some(url) }
}

/// `git@github.com:owner/repo(.git)?` and `https://github.com/owner/repo(.git)?`
/// both resolve to `owner/repo`.
pub fn derive_github_repo(origin_url: &str) -> Option<String> {
    if !origin_url.contains("github.com") {
        return None;
    }
    #[allow(clippy::unwrap_used)]
    let ssh = Regex::new(r"github\.com[:/]([^/]+)/([^/]+?)(\.git)?/?$").unwrap();
    let caps = ssh.captures(origin_url.trim())?;
    let owner = caps.get(1)?.as_str();
    let repo = caps.get(2)?.as_str();
    if owner.is_empty() || repo.is_empty() {
        None
    } else {
        Some(format!("{owner}/{repo}"))
    }
}

/// `git symbolic-ref refs/remotes/origin/HEAD`, falling back to probing
/// `main` then `master`, defaulting to `main`.
pub fn detect_main_branch(repo_path: &Path) -> String {
    if let Some(branch) = symbolic_ref_head(repo_path) {
        return branch;
    }
    for candidate in ["main", "master"] {
        if remote_branch_exists(repo_path, candidate) {
            return candidate.to_string();
        }
    }
    "main".to_string()
}

fn symbolic_ref_head(repo_path: &Path) -> Option<String> {
    let output = Command::new("git")
        .args(["symbolic-ref", "refs/remotes/origin/HEAD"])
        .current_dir(repo_path)
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let reference = String::from_utf8_lossy(&output.stdout).trim().to_string();
    reference.strip_prefix("refs/remotes/origin/").map(str::to_string)
}

fn remote_branch_exists(repo_path: &Path, branch: &str) -> bool {
    Command::new("git")
        .args(["show-ref", "--verify", "--quiet", &format!("refs/remotes/origin/{branch}")])
        .current_dir(repo_path)
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// True iff `branch` is a remote-tracking branch of `origin` in this repo.
pub fn is_remote_tracking_branch(repo_path: &Path, branch: &str) -> bool {
    if branch.is_empty() {
        return false;
    }
    remote_branch_exists(repo_path, branch)
}

pub fn slugify(name: &str) -> String {
    let mut slug = String::new();
    let mut last_was_dash = false;
    for ch in name.to_ascii_lowercase().chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch);
            last_was_dash = false;
        } else if !last_was_dash && !slug.is_empty() {
            slug.push('-');
            last_was_dash = true;
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    if slug.is_empty() {
        "repo".to_string()
    } else {
        slug
    }
}
