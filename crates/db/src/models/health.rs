use std::collections::HashMap;

use serde::Serialize;
use ts_rs::TS;

#[derive(Debug, Clone, Serialize, TS)]
pub struct HealthResponse {
    pub status: String,
    pub python_env_selected: String,
    pub dependencies: HashMap<String, bool>,
    pub paths: HashMap<String, String>,
}
