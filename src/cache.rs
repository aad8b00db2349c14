use std::cmp::Ordering;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::CoreError;
use crate::models::{
    CalendarEvent, EventDraft, EventPatch, SyncState, Task, TaskDraft, TaskPatch,
};
use crate::store::{ChangeOp, DurableStore};

/// Owner-scoped in-memory view of tasks and events.
///
/// The single source of truth the UI reads. Local mutations apply
/// optimistically before the durable store confirms; remote changes come
/// in through the `apply_remote_*` entry points driven by the reconciler.
/// All in-memory mutation happens synchronously under the inner lock,
/// which is never held across an await point; suspension only occurs at
/// durable-store calls.
pub struct EntityCache {
    store: Arc<dyn DurableStore>,
    inner: Mutex<CacheState>,
}

struct CacheState {
    owner_id: String,
    /// Bumped on `clear`. A durable completion captured under an older
    /// epoch is discarded instead of being applied to the next owner's
    /// cache (stale-response guard).
    epoch: u64,
    /// Newest first. `prioritize_tasks` reorders in place; the sequence
    /// order IS the list order handed to callers.
    tasks: Vec<Task>,
    /// Kept ascending by `start_time`.
    events: Vec<CalendarEvent>,
}

impl EntityCache {
    pub fn new(store: Arc<dyn DurableStore>, owner_id: &str) -> Self {
        Self {
            store,
            inner: Mutex::new(CacheState {
                owner_id: owner_id.to_string(),
                epoch: 0,
                tasks: Vec::new(),
                events: Vec::new(),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, CacheState> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn owner_id(&self) -> String {
        self.state().owner_id.clone()
    }

    /// Replace the cache contents with the durable store's view, e.g. on
    /// session start. Records arriving here are confirmed by definition.
    pub(crate) fn load(&self, mut tasks: Vec<Task>, mut events: Vec<CalendarEvent>) {
        for task in &mut tasks {
            task.sync_state = SyncState::Synced;
        }
        for event in &mut events {
            event.sync_state = SyncState::Synced;
        }
        tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        events.sort_by(|a, b| a.start_time.cmp(&b.start_time));

        let mut state = self.state();
        state.tasks = tasks;
        state.events = events;
    }

    /// Drop everything and invalidate in-flight durable completions.
    /// Called on logout/teardown; durable data is untouched.
    pub fn clear(&self) {
        let mut state = self.state();
        state.epoch += 1;
        state.tasks.clear();
        state.events.clear();
    }

    // ---- tasks ----

    pub async fn create_task(&self, draft: TaskDraft) -> Result<Task, CoreError> {
        if draft.description.trim().is_empty() {
            return Err(CoreError::Validation(
                "task description must not be empty".to_string(),
            ));
        }

        let now = Utc::now();
        let (task, epoch) = {
            let mut state = self.state();
            let task = Task {
                id: Uuid::new_v4().to_string(),
                owner_id: state.owner_id.clone(),
                description: draft.description,
                status: draft.status,
                priority: draft.priority,
                due_date: draft.due_date,
                reminder: draft.reminder,
                tags: draft.tags,
                estimated_duration: draft.estimated_duration,
                created_at: now,
                updated_at: now,
                sync_state: SyncState::Pending,
            };
            state.tasks.insert(0, task.clone());
            (task, state.epoch)
        };
        let client_id = task.id.clone();

        match self.store.create_task(&task).await {
            Ok(mut canonical) => {
                canonical.sync_state = SyncState::Synced;
                let mut state = self.state();
                if state.epoch != epoch {
                    debug!("discarding stale create confirmation for task {}", client_id);
                    return Err(CoreError::StaleCallback);
                }
                // Replace by the client-chosen key; the canonical record may
                // carry a different (server-assigned) id.
                if let Some(slot) = state.tasks.iter_mut().find(|t| t.id == client_id) {
                    *slot = canonical.clone();
                } else {
                    debug!("task {} vanished before create confirmation", client_id);
                }
                Ok(canonical)
            }
            Err(err) => {
                let mut state = self.state();
                if state.epoch == epoch {
                    if let Some(task) = state.tasks.iter_mut().find(|t| t.id == client_id) {
                        task.sync_state = SyncState::Failed;
                    }
                }
                warn!("durable create failed for task {}: {}", client_id, err);
                Err(err)
            }
        }
    }

    /// Apply the patch in memory immediately, then confirm durably. On
    /// durable failure the patched entity stays (flagged failed); there is
    /// no automatic revert.
    pub async fn update_task(&self, id: &str, patch: TaskPatch) -> Result<Task, CoreError> {
        if let Some(description) = &patch.description {
            if description.trim().is_empty() {
                return Err(CoreError::Validation(
                    "task description must not be empty".to_string(),
                ));
            }
        }

        let epoch = {
            let mut state = self.state();
            let Some(task) = state.tasks.iter_mut().find(|t| t.id == id) else {
                return Err(CoreError::NotFound(format!("task {id}")));
            };
            task.apply(&patch);
            task.sync_state = SyncState::Pending;
            state.epoch
        };

        match self.store.update_task(id, &patch).await {
            Ok(mut canonical) => {
                canonical.sync_state = SyncState::Synced;
                let mut state = self.state();
                if state.epoch != epoch {
                    debug!("discarding stale update confirmation for task {}", id);
                    return Err(CoreError::StaleCallback);
                }
                if let Some(slot) = state.tasks.iter_mut().find(|t| t.id == canonical.id) {
                    *slot = canonical.clone();
                }
                Ok(canonical)
            }
            Err(err) => {
                let mut state = self.state();
                if state.epoch == epoch {
                    if let Some(task) = state.tasks.iter_mut().find(|t| t.id == id) {
                        task.sync_state = SyncState::Failed;
                    }
                }
                warn!("durable update failed for task {}: {}", id, err);
                Err(err)
            }
        }
    }

    /// Remove from the cache immediately, then delete durably. A durable
    /// failure is reported but does not restore the entity.
    pub async fn delete_task(&self, id: &str) -> Result<(), CoreError> {
        {
            let mut state = self.state();
            let before = state.tasks.len();
            state.tasks.retain(|t| t.id != id);
            if state.tasks.len() == before {
                return Err(CoreError::NotFound(format!("task {id}")));
            }
        }

        if let Err(err) = self.store.delete_task(id).await {
            warn!("durable delete failed for task {}: {}", id, err);
            return Err(err);
        }
        Ok(())
    }

    /// Snapshot in reverse creation order (newest first), or whatever
    /// order a prior `prioritize_tasks` left behind.
    pub fn list_tasks(&self) -> Vec<Task> {
        self.state().tasks.clone()
    }

    pub fn get_task(&self, id: &str) -> Option<Task> {
        self.state().tasks.iter().find(|t| t.id == id).cloned()
    }

    /// Reorder the task sequence: anything with a due date sorts before
    /// anything without one; within each group higher priority first, with
    /// the earlier due date breaking priority ties. Pure in-memory
    /// reorder; nothing is persisted. Premium gating is the caller's
    /// business.
    pub fn prioritize_tasks(&self) -> Vec<Task> {
        let mut state = self.state();
        state.tasks.sort_by(|a, b| match (a.due_date, b.due_date) {
            (Some(a_due), Some(b_due)) => b
                .priority
                .rank()
                .cmp(&a.priority.rank())
                .then(a_due.cmp(&b_due)),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => b.priority.rank().cmp(&a.priority.rank()),
        });
        state.tasks.clone()
    }

    // ---- events ----

    pub async fn create_event(&self, draft: EventDraft) -> Result<CalendarEvent, CoreError> {
        if draft.title.trim().is_empty() {
            return Err(CoreError::Validation(
                "event title must not be empty".to_string(),
            ));
        }
        if let Some(end) = draft.end_time {
            if end < draft.start_time {
                return Err(CoreError::Validation(
                    "event end_time must not precede start_time".to_string(),
                ));
            }
        }

        let now = Utc::now();
        let (event, epoch) = {
            let mut state = self.state();
            let event = CalendarEvent {
                id: Uuid::new_v4().to_string(),
                owner_id: state.owner_id.clone(),
                title: draft.title,
                description: draft.description,
                start_time: draft.start_time,
                end_time: draft.end_time,
                location: draft.location,
                attendees: draft.attendees,
                reminder: draft.reminder,
                created_at: now,
                updated_at: now,
                sync_state: SyncState::Pending,
            };
            state.events.push(event.clone());
            state.events.sort_by(|a, b| a.start_time.cmp(&b.start_time));
            (event, state.epoch)
        };
        let client_id = event.id.clone();

        match self.store.create_event(&event).await {
            Ok(mut canonical) => {
                canonical.sync_state = SyncState::Synced;
                let mut state = self.state();
                if state.epoch != epoch {
                    debug!("discarding stale create confirmation for event {}", client_id);
                    return Err(CoreError::StaleCallback);
                }
                if let Some(slot) = state.events.iter_mut().find(|e| e.id == client_id) {
                    *slot = canonical.clone();
                    state.events.sort_by(|a, b| a.start_time.cmp(&b.start_time));
                } else {
                    debug!("event {} vanished before create confirmation", client_id);
                }
                Ok(canonical)
            }
            Err(err) => {
                let mut state = self.state();
                if state.epoch == epoch {
                    if let Some(event) = state.events.iter_mut().find(|e| e.id == client_id) {
                        event.sync_state = SyncState::Failed;
                    }
                }
                warn!("durable create failed for event {}: {}", client_id, err);
                Err(err)
            }
        }
    }

    pub async fn update_event(&self, id: &str, patch: EventPatch) -> Result<CalendarEvent, CoreError> {
        if let Some(title) = &patch.title {
            if title.trim().is_empty() {
                return Err(CoreError::Validation(
                    "event title must not be empty".to_string(),
                ));
            }
        }

        let epoch = {
            let mut state = self.state();
            let Some(event) = state.events.iter_mut().find(|e| e.id == id) else {
                return Err(CoreError::NotFound(format!("event {id}")));
            };
            // check the time invariant against the patched values before
            // mutating anything
            let start = patch.start_time.unwrap_or(event.start_time);
            let end = patch.end_time.or(event.end_time);
            if let Some(end) = end {
                if end < start {
                    return Err(CoreError::Validation(
                        "event end_time must not precede start_time".to_string(),
                    ));
                }
            }
            event.apply(&patch);
            event.sync_state = SyncState::Pending;
            state.events.sort_by(|a, b| a.start_time.cmp(&b.start_time));
            state.epoch
        };

        match self.store.update_event(id, &patch).await {
            Ok(mut canonical) => {
                canonical.sync_state = SyncState::Synced;
                let mut state = self.state();
                if state.epoch != epoch {
                    debug!("discarding stale update confirmation for event {}", id);
                    return Err(CoreError::StaleCallback);
                }
                if let Some(slot) = state.events.iter_mut().find(|e| e.id == canonical.id) {
                    *slot = canonical.clone();
                    state.events.sort_by(|a, b| a.start_time.cmp(&b.start_time));
                }
                Ok(canonical)
            }
            Err(err) => {
                let mut state = self.state();
                if state.epoch == epoch {
                    if let Some(event) = state.events.iter_mut().find(|e| e.id == id) {
                        event.sync_state = SyncState::Failed;
                    }
                }
                warn!("durable update failed for event {}: {}", id, err);
                Err(err)
            }
        }
    }

    pub async fn delete_event(&self, id: &str) -> Result<(), CoreError> {
        {
            let mut state = self.state();
            let before = state.events.len();
            state.events.retain(|e| e.id != id);
            if state.events.len() == before {
                return Err(CoreError::NotFound(format!("event {id}")));
            }
        }

        if let Err(err) = self.store.delete_event(id).await {
            warn!("durable delete failed for event {}: {}", id, err);
            return Err(err);
        }
        Ok(())
    }

    /// Snapshot, always non-decreasing by `start_time`.
    pub fn list_events(&self) -> Vec<CalendarEvent> {
        self.state().events.clone()
    }

    pub fn get_event(&self, id: &str) -> Option<CalendarEvent> {
        self.state().events.iter().find(|e| e.id == id).cloned()
    }

    // ---- remote reconciliation ----

    /// Whole-record upsert/remove from the change feed. The incoming
    /// record replaces any local entity with the same id, confirmed or
    /// not: last write observed wins, there is no field-level merge.
    pub(crate) fn apply_remote_task(&self, op: ChangeOp<Task>) {
        let mut state = self.state();
        match op {
            ChangeOp::Insert(mut record) | ChangeOp::Update(mut record) => {
                record.sync_state = SyncState::Synced;
                if let Some(slot) = state.tasks.iter_mut().find(|t| t.id == record.id) {
                    *slot = record;
                } else {
                    state.tasks.insert(0, record);
                }
            }
            ChangeOp::Delete(id) => {
                state.tasks.retain(|t| t.id != id);
            }
        }
    }

    pub(crate) fn apply_remote_event(&self, op: ChangeOp<CalendarEvent>) {
        let mut state = self.state();
        match op {
            ChangeOp::Insert(mut record) | ChangeOp::Update(mut record) => {
                record.sync_state = SyncState::Synced;
                if let Some(slot) = state.events.iter_mut().find(|e| e.id == record.id) {
                    *slot = record;
                } else {
                    state.events.push(record);
                }
                state.events.sort_by(|a, b| a.start_time.cmp(&b.start_time));
            }
            ChangeOp::Delete(id) => {
                state.events.retain(|e| e.id != id);
            }
        }
    }
}
