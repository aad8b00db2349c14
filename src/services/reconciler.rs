use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::cache::EntityCache;
use crate::store::{ChangeEvent, ChangeOp};

/// Merges remote change events into the cache.
///
/// Insert and update are whole-record upserts: the incoming record
/// replaces the local one at record granularity (last write observed
/// wins, no field-level merge), which also makes re-delivery of the same
/// event a no-op. A delete for an id the cache does not hold is ignored.
/// Events are applied in arrival order; the backend delivers them in
/// commit order per owner channel, and the reconciler neither reorders
/// nor buffers.
pub struct Reconciler {
    cache: Arc<EntityCache>,
}

impl Reconciler {
    pub fn new(cache: Arc<EntityCache>) -> Self {
        Self { cache }
    }

    /// Drain the change feed until the sender goes away. A malformed
    /// event is logged and skipped, never raised: one bad payload must
    /// not kill the merge loop.
    pub async fn run(self, mut receiver: mpsc::UnboundedReceiver<ChangeEvent>) {
        while let Some(event) = receiver.recv().await {
            self.apply(event);
        }
        warn!(
            "change feed closed for owner {}; cache will not converge until resubscribed",
            self.cache.owner_id()
        );
    }

    pub fn apply(&self, event: ChangeEvent) {
        match event {
            ChangeEvent::Task(op) => self.apply_task(op),
            ChangeEvent::Event(op) => self.apply_event(op),
        }
    }

    fn apply_task(&self, op: ChangeOp<crate::models::Task>) {
        match &op {
            ChangeOp::Insert(record) | ChangeOp::Update(record) => {
                if record.id.is_empty() {
                    warn!("skipping task change event with empty id");
                    return;
                }
                if record.owner_id != self.cache.owner_id() {
                    warn!(
                        "skipping task change event for foreign owner {}",
                        record.owner_id
                    );
                    return;
                }
                debug!("applying remote task upsert {}", record.id);
            }
            ChangeOp::Delete(id) => {
                if id.is_empty() {
                    warn!("skipping task delete event with empty id");
                    return;
                }
                debug!("applying remote task delete {}", id);
            }
        }
        self.cache.apply_remote_task(op);
    }

    fn apply_event(&self, op: ChangeOp<crate::models::CalendarEvent>) {
        match &op {
            ChangeOp::Insert(record) | ChangeOp::Update(record) => {
                if record.id.is_empty() {
                    warn!("skipping event change event with empty id");
                    return;
                }
                if record.owner_id != self.cache.owner_id() {
                    warn!(
                        "skipping event change event for foreign owner {}",
                        record.owner_id
                    );
                    return;
                }
                debug!("applying remote event upsert {}", record.id);
            }
            ChangeOp::Delete(id) => {
                if id.is_empty() {
                    warn!("skipping event delete event with empty id");
                    return;
                }
                debug!("applying remote event delete {}", id);
            }
        }
        self.cache.apply_remote_event(op);
    }
}
