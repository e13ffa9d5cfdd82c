use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::new_id;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuditAction {
    TaskDeleted,
}

/// Append-only record of events whose subject no longer exists.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    #[serde(rename = "_id")]
    pub id: String,
    pub action: AuditAction,
    pub subject_id: String,
    pub subject_title: String,
    pub actor_id: String,
    #[serde(with = "crate::models::timestamp")]
    pub timestamp: DateTime<Utc>,
}

impl AuditEntry {
    pub fn task_deleted(task_id: &str, title: &str, actor_id: &str, now: DateTime<Utc>) -> Self {
        Self {
            id: new_id(),
            action: AuditAction::TaskDeleted,
            subject_id: task_id.to_string(),
            subject_title: title.to_string(),
            actor_id: actor_id.to_string(),
            timestamp: now,
        }
    }
}
