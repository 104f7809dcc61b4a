use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum_macros::{Display, EnumString};
use ts_rs::TS;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, TS)]
pub enum StrategyStepType {
    #[strum(serialize = "CODING")]
    Coding,
    #[strum(serialize = "COMMIT")]
    Commit,
    #[strum(serialize = "REBASE")]
    Rebase,
    #[strum(serialize = "TEST")]
    Test,
    #[strum(serialize = "PUSH")]
    Push,
    #[strum(serialize = "CREATE_PR")]
    CreatePr,
}

/// Lower-case by design: mirrors the run-time lifecycle of a single step,
/// distinct from the upper-case `TaskStatus` vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString, TS)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum StrategyStepStatus {
    #[default]
    Pending,
    Running,
    Done,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
pub struct StrategyDecision {
    pub key: String,
    #[serde(default)]
    pub question: String,
    #[serde(default)]
    pub choice: String,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct StrategyStep {
    #[serde(rename = "type")]
    pub step_type: StrategyStepType,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub params: HashMap<String, Value>,
    #[serde(default)]
    pub skip: bool,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub status: StrategyStepStatus,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
pub struct ExecStrategy {
    #[serde(default)]
    pub template: String,
    #[serde(default)]
    pub steps: Vec<StrategyStep>,
    #[serde(default)]
    pub decisions: Vec<StrategyDecision>,
    #[serde(default)]
    pub rationale: String,
    #[serde(default)]
    pub raw_text: String,
    #[serde(default)]
    pub valid: bool,
}
