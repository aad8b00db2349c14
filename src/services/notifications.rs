use std::sync::{Mutex, MutexGuard};

use tracing::info;

use crate::models::Notification;

/// Best-effort delivery to whatever notification surface the embedding
/// application has (system tray, push, toast). May be a no-op when the
/// surface is unavailable or permission was denied; core correctness
/// never depends on it. `tag` lets the surface collapse repeats for the
/// same subject.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, title: &str, body: &str, tag: &str);
}

/// Sink that only logs. Used when no platform surface is attached.
pub struct LogSink;

impl NotificationSink for LogSink {
    fn notify(&self, title: &str, body: &str, tag: &str) {
        info!("notification [{}] {}: {}", tag, title, body);
    }
}

/// Ordered in-memory log of fired notifications, most recent first.
///
/// Lives independently of the entity cache: notifications survive the
/// deletion of the task or event that produced them. No durability beyond
/// the current session.
#[derive(Default)]
pub struct NotificationRegistry {
    inner: Mutex<Vec<Notification>>,
}

impl NotificationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, Vec<Notification>> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn append(&self, notification: Notification) {
        self.state().insert(0, notification);
    }

    /// Snapshot, newest first.
    pub fn list(&self) -> Vec<Notification> {
        self.state().clone()
    }

    pub fn unread_count(&self) -> usize {
        self.state().iter().filter(|n| !n.read).count()
    }

    pub fn mark_read(&self, id: &str) -> bool {
        let mut notifications = self.state();
        match notifications.iter_mut().find(|n| n.id == id) {
            Some(notification) => {
                notification.read = true;
                true
            }
            None => false,
        }
    }

    pub fn mark_all_read(&self) {
        for notification in self.state().iter_mut() {
            notification.read = true;
        }
    }

    pub fn remove(&self, id: &str) -> bool {
        let mut notifications = self.state();
        let before = notifications.len();
        notifications.retain(|n| n.id != id);
        notifications.len() < before
    }

    pub fn clear_all(&self) {
        self.state().clear();
    }
}
