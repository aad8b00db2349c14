use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::CoreError;
use crate::models::{CalendarEvent, EventPatch, SyncState, Task, TaskPatch};

use super::{ChangeEvent, ChangeFeed, ChangeOp, DurableStore, SubscriptionHandle};

/// In-process durable store with per-owner change broadcast.
///
/// Stands in for the network backend in the demo binary and the test
/// suite. Change events are delivered to every subscriber on the owner's
/// channel, including the client that issued the write, matching the
/// backend's echo behavior.
#[derive(Default)]
pub struct InMemoryStore {
    inner: Mutex<StoreState>,
}

#[derive(Default)]
struct StoreState {
    tasks: HashMap<String, Task>,
    events: HashMap<String, CalendarEvent>,
    subscribers: Vec<Subscriber>,
    next_handle: u64,
}

struct Subscriber {
    handle: SubscriptionHandle,
    owner_id: String,
    sender: mpsc::UnboundedSender<ChangeEvent>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, StoreState> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn broadcast(state: &StoreState, owner_id: &str, event: ChangeEvent) {
    for subscriber in &state.subscribers {
        if subscriber.owner_id == owner_id {
            // a closed receiver just means that session is gone
            let _ = subscriber.sender.send(event.clone());
        }
    }
}

#[async_trait::async_trait]
impl DurableStore for InMemoryStore {
    async fn create_task(&self, task: &Task) -> Result<Task, CoreError> {
        let mut record = task.clone();
        record.sync_state = SyncState::Synced;
        let mut state = self.state();
        if state.tasks.contains_key(&record.id) {
            return Err(CoreError::DurableOperationFailed(format!(
                "task id {} already exists",
                record.id
            )));
        }
        state.tasks.insert(record.id.clone(), record.clone());
        broadcast(&state, &record.owner_id, ChangeEvent::Task(ChangeOp::Insert(record.clone())));
        Ok(record)
    }

    async fn update_task(&self, id: &str, patch: &TaskPatch) -> Result<Task, CoreError> {
        let mut state = self.state();
        let record = state
            .tasks
            .get_mut(id)
            .ok_or_else(|| CoreError::NotFound(format!("task {id}")))?;
        record.apply(patch);
        record.updated_at = Utc::now();
        let record = record.clone();
        broadcast(&state, &record.owner_id, ChangeEvent::Task(ChangeOp::Update(record.clone())));
        Ok(record)
    }

    async fn delete_task(&self, id: &str) -> Result<(), CoreError> {
        let mut state = self.state();
        if let Some(record) = state.tasks.remove(id) {
            broadcast(&state, &record.owner_id, ChangeEvent::Task(ChangeOp::Delete(record.id)));
        }
        Ok(())
    }

    async fn list_tasks(&self, owner_id: &str) -> Result<Vec<Task>, CoreError> {
        let state = self.state();
        Ok(state
            .tasks
            .values()
            .filter(|t| t.owner_id == owner_id)
            .cloned()
            .collect())
    }

    async fn create_event(&self, event: &CalendarEvent) -> Result<CalendarEvent, CoreError> {
        let mut record = event.clone();
        record.sync_state = SyncState::Synced;
        let mut state = self.state();
        if state.events.contains_key(&record.id) {
            return Err(CoreError::DurableOperationFailed(format!(
                "event id {} already exists",
                record.id
            )));
        }
        state.events.insert(record.id.clone(), record.clone());
        broadcast(&state, &record.owner_id, ChangeEvent::Event(ChangeOp::Insert(record.clone())));
        Ok(record)
    }

    async fn update_event(&self, id: &str, patch: &EventPatch) -> Result<CalendarEvent, CoreError> {
        let mut state = self.state();
        let record = state
            .events
            .get_mut(id)
            .ok_or_else(|| CoreError::NotFound(format!("event {id}")))?;
        record.apply(patch);
        record.updated_at = Utc::now();
        let record = record.clone();
        broadcast(&state, &record.owner_id, ChangeEvent::Event(ChangeOp::Update(record.clone())));
        Ok(record)
    }

    async fn delete_event(&self, id: &str) -> Result<(), CoreError> {
        let mut state = self.state();
        if let Some(record) = state.events.remove(id) {
            broadcast(&state, &record.owner_id, ChangeEvent::Event(ChangeOp::Delete(record.id)));
        }
        Ok(())
    }

    async fn list_events(&self, owner_id: &str) -> Result<Vec<CalendarEvent>, CoreError> {
        let state = self.state();
        Ok(state
            .events
            .values()
            .filter(|e| e.owner_id == owner_id)
            .cloned()
            .collect())
    }

    async fn subscribe(&self, owner_id: &str) -> Result<ChangeFeed, CoreError> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let mut state = self.state();
        state.next_handle += 1;
        let handle = SubscriptionHandle(state.next_handle);
        state.subscribers.push(Subscriber {
            handle,
            owner_id: owner_id.to_string(),
            sender,
        });
        debug!("opened change feed {:?} for owner {}", handle, owner_id);
        Ok(ChangeFeed { handle, receiver })
    }

    async fn unsubscribe(&self, handle: SubscriptionHandle) {
        let mut state = self.state();
        state.subscribers.retain(|s| s.handle != handle);
        debug!("closed change feed {:?}", handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Priority, ReminderSettings, TaskStatus};

    fn task(id: &str, owner_id: &str) -> Task {
        let now = Utc::now();
        Task {
            id: id.to_string(),
            owner_id: owner_id.to_string(),
            description: format!("task {id}"),
            status: TaskStatus::Pending,
            priority: Priority::Medium,
            due_date: None,
            reminder: ReminderSettings::default(),
            tags: Vec::new(),
            estimated_duration: None,
            created_at: now,
            updated_at: now,
            sync_state: SyncState::Pending,
        }
    }

    #[tokio::test]
    async fn create_echoes_insert_to_subscriber() {
        let store = InMemoryStore::new();
        let mut feed = store.subscribe("alice").await.expect("subscribe");

        store.create_task(&task("t1", "alice")).await.expect("create");

        match feed.receiver.try_recv().expect("event") {
            ChangeEvent::Task(ChangeOp::Insert(record)) => {
                assert_eq!(record.id, "t1");
                assert_eq!(record.sync_state, SyncState::Synced);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn changes_are_scoped_to_owner_channel() {
        let store = InMemoryStore::new();
        let mut alice_feed = store.subscribe("alice").await.expect("subscribe");
        let mut bob_feed = store.subscribe("bob").await.expect("subscribe");

        store.create_task(&task("t1", "alice")).await.expect("create");

        assert!(alice_feed.receiver.try_recv().is_ok());
        assert!(bob_feed.receiver.try_recv().is_err());
    }

    #[tokio::test]
    async fn unsubscribe_stops_delivery() {
        let store = InMemoryStore::new();
        let mut feed = store.subscribe("alice").await.expect("subscribe");
        store.unsubscribe(feed.handle).await;

        store.create_task(&task("t1", "alice")).await.expect("create");

        // sender side was dropped, so the channel reports disconnect
        assert!(feed.receiver.try_recv().is_err());
    }

    #[tokio::test]
    async fn list_filters_by_owner() {
        let store = InMemoryStore::new();
        store.create_task(&task("t1", "alice")).await.expect("create");
        store.create_task(&task("t2", "bob")).await.expect("create");

        let tasks = store.list_tasks("alice").await.expect("list");
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].id, "t1");
    }

    #[tokio::test]
    async fn duplicate_create_is_rejected() {
        let store = InMemoryStore::new();
        store.create_task(&task("t1", "alice")).await.expect("create");
        let err = store.create_task(&task("t1", "alice")).await;
        assert!(matches!(err, Err(CoreError::DurableOperationFailed(_))));
    }

    #[tokio::test]
    async fn delete_absent_is_a_no_op() {
        let store = InMemoryStore::new();
        store.delete_task("missing").await.expect("delete");
    }
}
