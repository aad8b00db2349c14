use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    TaskReminder,
    EventReminder,
    Generic,
}

/// A fired reminder (or other notice) with read state.
///
/// Lives independently of the entity that produced it; deleting the source
/// task or event does not remove notifications already fired for it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub kind: NotificationKind,
    pub subject_id: String,
    pub title: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub read: bool,
}

impl Notification {
    pub fn new(kind: NotificationKind, subject_id: &str, title: &str, message: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind,
            subject_id: subject_id.to_string(),
            title: title.to_string(),
            message: message.to_string(),
            created_at: Utc::now(),
            read: false,
        }
    }
}
