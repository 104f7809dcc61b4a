use crate::models::{ExecStrategy, RepoConfig, StrategyStep, StrategyStepStatus, StrategyStepType};

/// The fixed AGENTIC-mode template: coding, commit, rebase, test, push,
/// create-pr, parameterized by what the repo actually has configured. Steps
/// the repo can't support (no GitHub remote, no test command) are marked
/// skipped with a reason rather than omitted, so the record always shows the
/// agent's full intended sequence.
pub fn build_default_strategy(repo: &RepoConfig) -> ExecStrategy {
    let steps = vec![
        StrategyStep {
            step_type: StrategyStepType::Coding,
            label: "由 Claude 自主完成编码".to_string(),
            params: Default::default(),
            skip: false,
            reason: String::new(),
            status: StrategyStepStatus::Pending,
        },
        StrategyStep {
            step_type: StrategyStepType::Commit,
            label: "提交改动".to_string(),
            params: Default::default(),
            skip: false,
            reason: String::new(),
            status: StrategyStepStatus::Pending,
        },
        StrategyStep {
            step_type: StrategyStepType::Rebase,
            label: format!("与 {} 变基", repo.main_branch),
            params: Default::default(),
            skip: repo.github_repo.is_empty(),
            reason: if repo.github_repo.is_empty() { "仓库未配置 GitHub 远程".to_string() } else { String::new() },
            status: StrategyStepStatus::Pending,
        },
        StrategyStep {
            step_type: StrategyStepType::Test,
            label: format!("运行测试 {}", repo.test_command),
            params: Default::default(),
            skip: repo.test_command.trim().is_empty(),
            reason: if repo.test_command.trim().is_empty() { "未配置 test_command".to_string() } else { String::new() },
            status: StrategyStepStatus::Pending,
        },
        StrategyStep {
            step_type: StrategyStepType::Push,
            label: "推送分支".to_string(),
            params: Default::default(),
            skip: false,
            reason: String::new(),
            status: StrategyStepStatus::Pending,
        },
        StrategyStep {
            step_type: StrategyStepType::CreatePr,
            label: "创建 PR".to_string(),
            params: Default::default(),
            skip: repo.github_repo.is_empty(),
            reason: if repo.github_repo.is_empty() { "仓库未配置 GitHub 远程".to_string() } else { String::new() },
            status: StrategyStepStatus::Pending,
        },
    ];

    ExecStrategy {
        template: "AGENTIC".to_string(),
        steps,
        decisions: Vec::new(),
        rationale: "Claude 全权执行：编码后自行完成提交、变基、测试、推送并创建 PR（按仓库配置）".to_string(),
        raw_text: String::new(),
        valid: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo(github_repo: &str, test_command: &str) -> RepoConfig {
        RepoConfig {
            id: "demo".to_string(),
            name: "demo".to_string(),
            root_path: "/repos/demo".to_string(),
            main_branch: "main".to_string(),
            test_command: test_command.to_string(),
            github_repo: github_repo.to_string(),
            shared_symlink_paths: Vec::new(),
            forbidden_symlink_paths: Vec::new(),
            enabled: true,
        }
    }

    #[test]
    fn skips_rebase_and_pr_without_github_repo() {
        let strategy = build_default_strategy(&repo("", "npm test"));
        assert!(strategy.steps[2].skip);
        assert!(strategy.steps[5].skip);
        assert!(!strategy.steps[3].skip);
    }

    #[test]
    fn skips_test_step_without_test_command() {
        let strategy = build_default_strategy(&repo("o/r", ""));
        assert!(strategy.steps[3].skip);
        assert!(!strategy.steps[2].skip);
    }

    #[test]
    fn valid_and_template_are_fixed() {
        let strategy = build_default_strategy(&repo("o/r", "npm test"));
        assert!(strategy.valid);
        assert_eq!(strategy.template, "AGENTIC");
    }
}
