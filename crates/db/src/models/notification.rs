use serde::{Deserialize, Serialize};
use ts_rs::TS;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
pub enum NotificationType {
    #[serde(rename = "INFO")]
    Info,
    #[serde(rename = "SUCCESS")]
    Success,
    #[serde(rename = "ERROR")]
    Error,
}

impl Default for NotificationType {
    fn default() -> Self {
        Self::Info
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct Notification {
    pub id: String,
    pub task_id: String,
    #[serde(rename = "type", default)]
    pub kind: NotificationType,
    pub title: String,
    #[serde(default)]
    pub body: String,
    pub created_at: String,
    #[serde(default)]
    pub read: bool,
}

impl Notification {
    pub fn new(id: String, task_id: String, kind: NotificationType, title: String, body: String, created_at: String) -> Self {
        Self {
            id,
            task_id,
            kind,
            title,
            body,
            created_at,
            read: false,
        }
    }
}
