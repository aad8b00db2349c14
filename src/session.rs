use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::info;

use crate::cache::EntityCache;
use crate::config::CoreConfig;
use crate::error::CoreError;
use crate::services::notifications::{NotificationRegistry, NotificationSink};
use crate::services::reconciler::Reconciler;
use crate::services::scheduler::ReminderScheduler;
use crate::store::{DurableStore, SubscriptionHandle};

/// One authenticated owner's live state: the entity cache, the
/// notification log, the change-feed pump, and the reminder tick task.
///
/// Built explicitly and passed by reference to callers; there is no
/// ambient global. `shutdown` releases the timer and the subscription
/// deterministically; the two background tasks hold only this session's
/// handles, so nothing leaks into a later session for another owner.
pub struct Session {
    owner_id: String,
    cache: Arc<EntityCache>,
    notifications: Arc<NotificationRegistry>,
    store: Arc<dyn DurableStore>,
    sink: Arc<dyn NotificationSink>,
    config: CoreConfig,
    subscription: SubscriptionHandle,
    feed_task: JoinHandle<()>,
    scheduler_task: JoinHandle<()>,
}

impl Session {
    /// Subscribe to the change feed, seed the cache from the durable
    /// store, and start the background tasks. Subscribing before the
    /// initial list means a change committed in between is delivered on
    /// the feed and merged idempotently instead of being missed.
    pub async fn start(
        store: Arc<dyn DurableStore>,
        sink: Arc<dyn NotificationSink>,
        config: CoreConfig,
        owner_id: &str,
    ) -> Result<Self, CoreError> {
        let cache = Arc::new(EntityCache::new(store.clone(), owner_id));
        let notifications = Arc::new(NotificationRegistry::new());

        let feed = store.subscribe(owner_id).await?;
        let subscription = feed.handle;

        let tasks = store.list_tasks(owner_id).await?;
        let events = store.list_events(owner_id).await?;
        cache.load(tasks, events);

        let feed_task = tokio::spawn(Reconciler::new(cache.clone()).run(feed.receiver));
        let scheduler = ReminderScheduler::new(
            cache.clone(),
            notifications.clone(),
            sink.clone(),
            &config,
        );
        let scheduler_task = tokio::spawn(scheduler.run());

        info!("session started for owner {}", owner_id);
        Ok(Self {
            owner_id: owner_id.to_string(),
            cache,
            notifications,
            store,
            sink,
            config,
            subscription,
            feed_task,
            scheduler_task,
        })
    }

    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    pub fn cache(&self) -> &EntityCache {
        &self.cache
    }

    pub fn notifications(&self) -> &NotificationRegistry {
        &self.notifications
    }

    /// Tear down the current change feed and open a fresh one, then
    /// re-seed from the durable store so anything missed while the feed
    /// was down is picked up. Call after a `SubscriptionLost` report;
    /// until then convergence is not guaranteed.
    pub async fn resubscribe(&mut self) -> Result<(), CoreError> {
        self.feed_task.abort();
        self.store.unsubscribe(self.subscription).await;

        let feed = self.store.subscribe(&self.owner_id).await?;
        self.subscription = feed.handle;
        self.feed_task = tokio::spawn(Reconciler::new(self.cache.clone()).run(feed.receiver));

        let tasks = self.store.list_tasks(&self.owner_id).await?;
        let events = self.store.list_events(&self.owner_id).await?;
        self.cache.load(tasks, events);

        info!("resubscribed change feed for owner {}", self.owner_id);
        Ok(())
    }

    /// Stop the scheduler and the feed pump, release the subscription,
    /// and clear the cache. The epoch bump in `clear` makes any still
    /// in-flight durable completion a discarded stale callback. Durable
    /// data is untouched, and so is the notification log: its lifetime is
    /// independent of the cache, it simply drops with the session.
    pub async fn shutdown(self) {
        self.scheduler_task.abort();
        self.feed_task.abort();
        self.store.unsubscribe(self.subscription).await;
        self.cache.clear();
        info!("session for owner {} shut down", self.owner_id);
    }

    /// The sink handed to the scheduler at start; exposed so embedders
    /// can route ad-hoc notices through the same surface.
    pub fn sink(&self) -> &Arc<dyn NotificationSink> {
        &self.sink
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }
}
