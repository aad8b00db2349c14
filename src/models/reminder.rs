use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Reminder configuration carried by both tasks and events.
///
/// `trigger_time` is only meaningful while `enabled` is true; the caller may
/// set any trigger time, there is no enforced relation to due dates or start
/// times.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReminderSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub trigger_time: Option<DateTime<Utc>>,
}

impl ReminderSettings {
    pub fn at(trigger_time: DateTime<Utc>) -> Self {
        Self {
            enabled: true,
            trigger_time: Some(trigger_time),
        }
    }
}
