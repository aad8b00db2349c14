pub mod memory;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::CoreError;
use crate::models::{CalendarEvent, EventPatch, Task, TaskPatch};

/// A single remote change. The loosely-shaped payload of the backend's
/// change feed is converted into this tagged form once, at the store
/// boundary; everything past it works with typed records.
#[derive(Debug, Clone)]
pub enum ChangeOp<T> {
    Insert(T),
    Update(T),
    Delete(String),
}

#[derive(Debug, Clone)]
pub enum ChangeEvent {
    Task(ChangeOp<Task>),
    Event(ChangeOp<CalendarEvent>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(pub u64);

/// Live change feed for one owner's collections. Events arrive in the
/// order the backend committed them. Dropping the receiver does not
/// release the store-side sender; call [`DurableStore::unsubscribe`].
pub struct ChangeFeed {
    pub handle: SubscriptionHandle,
    pub receiver: mpsc::UnboundedReceiver<ChangeEvent>,
}

/// Network-backed CRUD plus change subscription for the two collections.
///
/// The core only consumes this interface; implementations live with the
/// embedding application. [`memory::InMemoryStore`] is the in-process
/// implementation used by the demo binary and the test suite.
#[async_trait]
pub trait DurableStore: Send + Sync {
    /// Persist a new task. The returned record is canonical: the store may
    /// rewrite the id and timestamps of the client draft.
    async fn create_task(&self, task: &Task) -> Result<Task, CoreError>;
    async fn update_task(&self, id: &str, patch: &TaskPatch) -> Result<Task, CoreError>;
    async fn delete_task(&self, id: &str) -> Result<(), CoreError>;
    async fn list_tasks(&self, owner_id: &str) -> Result<Vec<Task>, CoreError>;

    async fn create_event(&self, event: &CalendarEvent) -> Result<CalendarEvent, CoreError>;
    async fn update_event(&self, id: &str, patch: &EventPatch) -> Result<CalendarEvent, CoreError>;
    async fn delete_event(&self, id: &str) -> Result<(), CoreError>;
    async fn list_events(&self, owner_id: &str) -> Result<Vec<CalendarEvent>, CoreError>;

    /// Open a change feed covering both collections for one owner.
    async fn subscribe(&self, owner_id: &str) -> Result<ChangeFeed, CoreError>;
    async fn unsubscribe(&self, handle: SubscriptionHandle);
}
