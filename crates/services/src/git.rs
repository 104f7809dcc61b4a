use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use repopilot_db::models::RepoConfig;

use crate::error::{GitError, GitResult};

/// Where a task's worktree lives and which branch it's checked out to.
#[derive(Debug, Clone)]
pub struct WorktreeInfo {
    pub path: PathBuf,
    pub branch: String,
}

fn run(repo_path: &Path, args: &[&str]) -> std::io::Result<Output> {
    Command::new("git").args(args).current_dir(repo_path).output()
}

/// Run a git command and turn a non-zero exit into `GitError::CommandFailed`.
fn run_checked(repo_path: &Path, args: &[&str]) -> GitResult<String> {
    let output = run(repo_path, args)?;
    if !output.status.success() {
        return Err(GitError::CommandFailed(
            args.join(" "),
            String::from_utf8_lossy(&output.stderr).trim().to_string(),
        ));
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Best-effort: run and discard the result entirely, success or not.
fn run_best_effort(repo_path: &Path, args: &[&str]) {
    let _ = run(repo_path, args);
}

/// Lowercase alphanumeric/dash/underscore slug, defaulting to `"task"` when
/// the input has nothing usable in it.
fn slug(text: &str) -> String {
    let cleaned: String = text
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '-' })
        .collect();
    let trimmed = cleaned.trim_matches('-').to_ascii_lowercase();
    if trimmed.is_empty() {
        "task".to_string()
    } else {
        trimmed
    }
}

/// Dedup preserving first-seen order, dropping empty entries.
fn unique(items: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for item in items {
        if item.is_empty() || !seen.insert(item.clone()) {
            continue;
        }
        out.push(item);
    }
    out
}

fn detect_remote_default_branch(repo_path: &Path) -> String {
    let Ok(output) = run(repo_path, &["symbolic-ref", "refs/remotes/origin/HEAD"]) else {
        return String::new();
    };
    if !output.status.success() {
        return String::new();
    }
    let reference = String::from_utf8_lossy(&output.stdout).trim().to_string();
    reference.rsplit('/').next().unwrap_or_default().to_string()
}

fn candidate_base_refs(repo_path: &Path, preferred: &str) -> Vec<String> {
    let default_branch = detect_remote_default_branch(repo_path);
    unique([
        format!("origin/{preferred}"),
        preferred.to_string(),
        if default_branch.is_empty() { String::new() } else { format!("origin/{default_branch}") },
        default_branch,
    ])
}

/// Create an isolated worktree for a task: `root/<repo.id>/<task_id>` on
/// branch `task/<task_id>-<slug(title)[:36]>`. Pre-cleans any stale worktree
////branch for the same task (best-effort), fetches origin (best-effort),
/// then tries candidate base refs until one lets `worktree add` succeed.
pub fn create_worktree(repo: &RepoConfig, worktrees_root: &Path, task_id: &str, title: &str) -> GitResult<WorktreeInfo> {
    let repo_path = Path::new(&repo.root_path);
    let mut title_slug = slug(title);
    title_slug.truncate(36);
    let branch = format!("task/{task_id}-{title_slug}");
    let target = worktrees_root.join(&repo.id).join(task_id);

    run_best_effort(repo_path, &["worktree", "remove", "--force", &target.to_string_lossy()]);
    run_best_effort(repo_path, &["worktree", "prune"]);
    run_best_effort(repo_path, &["branch", "-D", &branch]);
    if target.exists() {
        let _ = std::fs::remove_dir_all(&target);
    }
    run_best_effort(repo_path, &["fetch", "origin"]);

    let candidates = candidate_base_refs(repo_path, &repo.main_branch);
    let mut last_stderr = String::new();
    for base_ref in &candidates {
        let target_str = target.to_string_lossy().into_owned();
        let output = run(repo_path, &["worktree", "add", "-b", &branch, &target_str, base_ref])?;
        if output.status.success() {
            return Ok(WorktreeInfo { path: target, branch });
        }
        last_stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    }

    Err(GitError::NoBaseRef { candidates, last_error: last_stderr })
}

/// Ensure `worktree/data` exists, then symlink each configured shared path
/// (that isn't forbidden and actually exists in the source repo) into the
/// worktree, replacing whatever was there.
pub fn setup_isolated_data(worktree: &Path, repo: &RepoConfig) -> GitResult<()> {
    std::fs::create_dir_all(worktree.join("data"))?;
    let forbidden: HashSet<&str> = repo.forbidden_symlink_paths.iter().map(String::as_str).collect();
    let repo_root = Path::new(&repo.root_path);

    for rel in &repo.shared_symlink_paths {
        if forbidden.contains(rel.as_str()) {
            continue;
        }
        let source = repo_root.join(rel);
        if !source.exists() {
            continue;
        }
        let dest = worktree.join(rel);
        if dest.is_symlink() {
            std::fs::remove_file(&dest)?;
        } else if dest.is_dir() {
            std::fs::remove_dir_all(&dest)?;
        } else if dest.exists() {
            std::fs::remove_file(&dest)?;
        }
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }
        #[cfg(unix)]
        std::os::unix::fs::symlink(&source, &dest)?;
        #[cfg(not(unix))]
        std::os::windows::fs::symlink_file(&source, &dest)?;
    }
    Ok(())
}

pub fn current_commit(worktree: &Path) -> GitResult<String> {
    run_checked(worktree, &["rev-parse", "HEAD"])
}

/// Dirty working tree or HEAD has moved from `baseline_commit`.
pub fn has_material_changes(worktree: &Path, baseline_commit: &str) -> bool {
    let dirty = run(worktree, &["status", "--porcelain"])
        .map(|o| !String::from_utf8_lossy(&o.stdout).trim().is_empty())
        .unwrap_or(false);
    if dirty {
        return true;
    }
    current_commit(worktree).map(|head| head != baseline_commit).unwrap_or(false)
}

/// `git add -A`; if nothing ends up staged, returns the current HEAD
/// unchanged, else commits and returns the new HEAD.
pub fn commit_all(worktree: &Path, message: &str) -> GitResult<String> {
    run_checked(worktree, &["add", "-A"])?;
    let nothing_staged =
        run(worktree, &["diff", "--cached", "--quiet"])?.status.success();
    if nothing_staged {
        return current_commit(worktree);
    }
    run_checked(worktree, &["commit", "-m", message])?;
    current_commit(worktree)
}

pub fn rebase_with_main(worktree: &Path, main_branch: &str) -> GitResult<()> {
    run_checked(worktree, &["fetch", "origin", main_branch])?;
    run_checked(worktree, &["rebase", &format!("origin/{main_branch}")])?;
    Ok(())
}

const MISSING_TEST_SCRIPT_MARKER: &str = "Missing script: \"test\"";

/// Default wall-clock budget for a `run_tests` invocation.
pub const DEFAULT_TEST_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(1200);

/// Run `cmd` through the shell with a wall-clock `timeout`; a non-zero exit
/// raises a `GitError` carrying the combined output, upgraded to a more
/// instructive message when npm's "no test script" marker is present. A
/// command still running at `timeout` is killed and raises a `GitError` of
/// its own rather than blocking the worker forever.
pub fn run_tests(worktree: &Path, cmd: &str, repo_id: &str, timeout: std::time::Duration) -> GitResult<()> {
    if cmd.trim().is_empty() {
        return Ok(());
    }
    let mut child = Command::new("sh")
        .arg("-c")
        .arg(cmd)
        .current_dir(worktree)
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .spawn()?;

    // Drain stdout/stderr on their own threads while polling for exit so a
    // chatty command can't fill the pipe buffer and deadlock the wait loop.
    let mut stdout_pipe = child.stdout.take().expect("stdout was piped");
    let mut stderr_pipe = child.stderr.take().expect("stderr was piped");
    let stdout_reader = std::thread::spawn(move || {
        let mut buf = String::new();
        let _ = std::io::Read::read_to_string(&mut stdout_pipe, &mut buf);
        buf
    });
    let stderr_reader = std::thread::spawn(move || {
        let mut buf = String::new();
        let _ = std::io::Read::read_to_string(&mut stderr_pipe, &mut buf);
        buf
    });

    let start = std::time::Instant::now();
    let status = loop {
        if let Some(status) = child.try_wait()? {
            break Some(status);
        }
        if start.elapsed() >= timeout {
            let _ = child.kill();
            let _ = child.wait();
            break None;
        }
        std::thread::sleep(std::time::Duration::from_millis(100));
    };

    let stdout = stdout_reader.join().unwrap_or_default();
    let stderr = stderr_reader.join().unwrap_or_default();
    let combined = format!("{stdout}{stderr}");

    let Some(status) = status else {
        return Err(GitError::TestsFailed(format!(
            "test command timed out after {}s: {cmd}\n{combined}",
            timeout.as_secs()
        )));
    };
    if status.success() {
        return Ok(());
    }
    if combined.contains(MISSING_TEST_SCRIPT_MARKER) {
        return Err(GitError::TestsFailed(format!(
            "no test script configured for this repo; set one via PATCH /api/repos/{repo_id} \
             (e.g. {{\"test_command\": \"npm run test:ci --if-present || echo skip-tests\"}})"
        )));
    }
    Err(GitError::TestsFailed(combined))
}

pub fn push_branch(worktree: &Path, branch: &str) -> GitResult<()> {
    run_checked(worktree, &["push", "-u", "origin", branch])?;
    Ok(())
}

/// `https://github.com/<repo>/compare/<base>...<head>?expand=1`, URL-encoding
/// both ref names. Empty string if `github_repo` doesn't look like
/// `owner/name`.
pub fn build_compare_url(github_repo: &str, base: &str, head: &str) -> String {
    let repo = github_repo.trim_matches('/');
    if repo.is_empty() || !repo.contains('/') {
        return String::new();
    }
    let base = urlencoding::encode(base);
    let head = urlencoding::encode(head);
    format!("https://github.com/{repo}/compare/{base}...{head}?expand=1")
}

/// Copy the worktree into `artifacts_root/<task_id>/<run_id>`, excluding
/// `.git`, replacing any prior snapshot at that path.
pub fn snapshot_worktree(worktree: &Path, artifacts_root: &Path, task_id: &str, run_id: &str) -> GitResult<PathBuf> {
    let target = artifacts_root.join(task_id).join(run_id);
    if target.exists() {
        std::fs::remove_dir_all(&target)?;
    }
    copy_dir_excluding_git(worktree, &target)?;
    Ok(target)
}

fn copy_dir_excluding_git(src: &Path, dst: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(dst)?;
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let file_name = entry.file_name();
        if file_name == ".git" {
            continue;
        }
        let src_path = entry.path();
        let dst_path = dst.join(&file_name);
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            copy_dir_excluding_git(&src_path, &dst_path)?;
        } else if file_type.is_symlink() {
            let link_target = std::fs::read_link(&src_path)?;
            #[cfg(unix)]
            std::os::unix::fs::symlink(link_target, &dst_path)?;
            #[cfg(not(unix))]
            {
                let _ = link_target;
            }
        } else {
            std::fs::copy(&src_path, &dst_path)?;
        }
    }
    Ok(())
}

/// Best-effort worktree + branch teardown; never fails.
pub fn cleanup_worktree(repo: &RepoConfig, worktree: &Path, branch: &str) {
    let repo_path = Path::new(&repo.root_path);
    run_best_effort(repo_path, &["worktree", "remove", "--force", &worktree.to_string_lossy()]);
    run_best_effort(repo_path, &["worktree", "prune"]);
    if !branch.is_empty() {
        run_best_effort(repo_path, &["branch", "-D", branch]);
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    fn init_repo() -> TempDir {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path();
        let run = |args: &[&str]| {
            let status = Command::new("git").args(args).current_dir(path).status().expect("git available");
            assert!(status.success(), "git {args:?} failed");
        };
        run(&["init", "-q", "-b", "main"]);
        run(&["config", "user.email", "test@example.com"]);
        run(&["config", "user.name", "test"]);
        std::fs::write(path.join("README.md"), "hello\n").expect("write");
        run(&["add", "-A"]);
        run(&["commit", "-q", "-m", "initial"]);
        dir
    }

    #[test]
    fn slug_lowercases_and_strips_punctuation() {
        assert_eq!(slug("Fix the Bug!!"), "fix-the-bug");
        assert_eq!(slug("   "), "task");
    }

    #[test]
    fn build_compare_url_encodes_non_ascii_and_slashes() {
        let url = build_compare_url("octocat/hello", "main", "task/中文-branch");
        assert!(url.starts_with("https://github.com/octocat/hello/compare/main..."));
        assert!(url.contains("task%2F"));
        assert!(url.ends_with("?expand=1"));
    }

    #[test]
    fn build_compare_url_empty_without_slash() {
        assert_eq!(build_compare_url("not-a-repo", "main", "head"), "");
        assert_eq!(build_compare_url("", "main", "head"), "");
    }

    #[test]
    fn has_material_changes_detects_dirty_tree_and_new_commits() {
        let dir = init_repo();
        let baseline = current_commit(dir.path()).expect("head");
        assert!(!has_material_changes(dir.path(), &baseline));

        std::fs::write(dir.path().join("new.txt"), "x").expect("write");
        assert!(has_material_changes(dir.path(), &baseline));
    }

    #[test]
    fn commit_all_is_noop_when_nothing_staged() {
        let dir = init_repo();
        let baseline = current_commit(dir.path()).expect("head");
        let after = commit_all(dir.path(), "no-op").expect("commit_all");
        assert_eq!(after, baseline);
    }

    #[test]
    fn commit_all_commits_new_changes() {
        let dir = init_repo();
        let baseline = current_commit(dir.path()).expect("head");
        std::fs::write(dir.path().join("new.txt"), "x").expect("write");
        let after = commit_all(dir.path(), "add new file").expect("commit_all");
        assert_ne!(after, baseline);
    }

    #[test]
    fn create_worktree_builds_expected_branch_and_path() {
        let origin = init_repo();
        let worktrees_root = TempDir::new().expect("tempdir");
        let repo = RepoConfig {
            id: "demo".to_string(),
            name: "demo".to_string(),
            root_path: origin.path().to_string_lossy().into_owned(),
            main_branch: "main".to_string(),
            test_command: String::new(),
            github_repo: String::new(),
            shared_symlink_paths: Vec::new(),
            forbidden_symlink_paths: Vec::new(),
            enabled: true,
        };
        let info = create_worktree(&repo, worktrees_root.path(), "250101-001", "Fix the bug").expect("worktree");
        assert_eq!(info.branch, "task/250101-001-fix-the-bug");
        assert!(info.path.join("README.md").exists());
    }

    #[test]
    fn setup_isolated_data_symlinks_shared_paths_and_respects_forbidden() {
        let origin = init_repo();
        std::fs::write(origin.path().join("PROGRESS.md"), "secret").expect("write");
        std::fs::write(origin.path().join("shared.json"), "{}").expect("write");
        let worktrees_root = TempDir::new().expect("tempdir");
        let repo = RepoConfig {
            id: "demo".to_string(),
            name: "demo".to_string(),
            root_path: origin.path().to_string_lossy().into_owned(),
            main_branch: "main".to_string(),
            test_command: String::new(),
            github_repo: String::new(),
            shared_symlink_paths: vec!["shared.json".to_string(), "PROGRESS.md".to_string()],
            forbidden_symlink_paths: vec!["PROGRESS.md".to_string()],
            enabled: true,
        };
        let info = create_worktree(&repo, worktrees_root.path(), "250101-002", "data test").expect("worktree");
        setup_isolated_data(&info.path, &repo).expect("setup");
        assert!(info.path.join("data").is_dir());
        assert!(info.path.join("shared.json").is_symlink());
        assert!(!info.path.join("PROGRESS.md").exists());
    }
}
