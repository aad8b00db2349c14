pub mod event;
pub mod notification;
pub mod reminder;
pub mod task;

pub use event::{CalendarEvent, EventDraft, EventPatch};
pub use notification::{Notification, NotificationKind};
pub use reminder::ReminderSettings;
pub use task::{Priority, Task, TaskDraft, TaskPatch, TaskStatus};

use serde::{Deserialize, Serialize};

/// Client-side confirmation state of a cached record.
///
/// `Pending` until the durable store acknowledges the mutation, `Synced`
/// for anything confirmed or received from the change feed, `Failed` when
/// the durable call errored and the optimistic entry was kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncState {
    Pending,
    Synced,
    Failed,
}

impl Default for SyncState {
    fn default() -> Self {
        SyncState::Pending
    }
}
