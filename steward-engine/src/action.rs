use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One executed (or in-flight) cluster operation, recorded for audit.
///
/// Pending and running rows double as the planner's idempotency window:
/// while an app has unsettled actions, no new ones are planned for it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    pub id: String,
    pub app: String,
    pub kind: ActionKind,
    pub image: Option<String>,
    pub instance_id: Option<String>,
    pub status: ActionStatus,
    pub attempts: i64,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
pub enum ActionKind {
    Start,
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
pub enum ActionStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl ActionStatus {
    /// Whether the action still occupies the idempotency window.
    pub fn is_settled(&self) -> bool {
        matches!(self, ActionStatus::Succeeded | ActionStatus::Failed)
    }
}
