use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::cache::EntityCache;
use crate::config::CoreConfig;
use crate::models::{Notification, NotificationKind, ReminderSettings};
use crate::services::notifications::{NotificationRegistry, NotificationSink};

/// Fires each due reminder exactly once.
///
/// Every tick scans the cache for reminders whose trigger time falls in
/// the open interval `(now, now + look_ahead)`. The look-ahead window is
/// wider than the tick period, so each trigger time is seen by at least
/// two consecutive scans; the fired set keyed by `(subject_id,
/// trigger_time)` keeps the second sighting from firing again. A trigger
/// time already in the past when first observed never fires.
pub struct ReminderScheduler {
    cache: Arc<EntityCache>,
    registry: Arc<NotificationRegistry>,
    sink: Arc<dyn NotificationSink>,
    tick_interval: Duration,
    look_ahead: chrono::Duration,
    fired: HashSet<(String, DateTime<Utc>)>,
}

impl ReminderScheduler {
    pub fn new(
        cache: Arc<EntityCache>,
        registry: Arc<NotificationRegistry>,
        sink: Arc<dyn NotificationSink>,
        config: &CoreConfig,
    ) -> Self {
        Self {
            cache,
            registry,
            sink,
            tick_interval: config.tick_interval,
            look_ahead: chrono::Duration::from_std(config.look_ahead)
                .unwrap_or_else(|_| chrono::Duration::seconds(60)),
            fired: HashSet::new(),
        }
    }

    /// Tick loop. The first evaluation happens immediately, then one per
    /// interval. Runs until the owning task is aborted at session
    /// teardown.
    pub async fn run(mut self) {
        info!(
            "starting reminder scheduler (tick: {:?}, window: {}s)",
            self.tick_interval,
            self.look_ahead.num_seconds()
        );
        let mut ticker = tokio::time::interval(self.tick_interval);
        loop {
            ticker.tick().await;
            let fired = self.scan(Utc::now());
            if fired > 0 {
                debug!("reminder scan fired {} notification(s)", fired);
            }
        }
    }

    /// One evaluation pass over every task and event. Returns how many
    /// notifications were fired. No single entity's reminder data can
    /// stop the scan: anything unusable is skipped entity by entity.
    pub fn scan(&mut self, now: DateTime<Utc>) -> usize {
        let window_end = now + self.look_ahead;
        let mut fired = 0;

        for task in self.cache.list_tasks() {
            let Some(trigger) = due_trigger(&task.reminder, now, window_end) else {
                continue;
            };
            let key = (task.id.clone(), trigger);
            if self.fired.contains(&key) {
                continue;
            }
            self.registry.append(Notification::new(
                NotificationKind::TaskReminder,
                &task.id,
                "Task reminder",
                &task.description,
            ));
            self.sink
                .notify("Task reminder", &task.description, &format!("task-{}", task.id));
            self.fired.insert(key);
            fired += 1;
        }

        for event in self.cache.list_events() {
            let Some(trigger) = due_trigger(&event.reminder, now, window_end) else {
                continue;
            };
            let key = (event.id.clone(), trigger);
            if self.fired.contains(&key) {
                continue;
            }
            let body = match &event.location {
                Some(location) => format!("{} at {}", event.title, location),
                None => event.title.clone(),
            };
            self.registry.append(Notification::new(
                NotificationKind::EventReminder,
                &event.id,
                "Event reminder",
                &event.title,
            ));
            self.sink
                .notify("Event reminder", &body, &format!("event-{}", event.id));
            self.fired.insert(key);
            fired += 1;
        }

        // keys at or before `now` can never pass the forward-looking
        // window test again, so the set stays bounded
        self.fired.retain(|(_, trigger)| *trigger > now);

        fired
    }
}

fn due_trigger(
    reminder: &ReminderSettings,
    now: DateTime<Utc>,
    window_end: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    if !reminder.enabled {
        return None;
    }
    let trigger = reminder.trigger_time?;
    (trigger > now && trigger < window_end).then_some(trigger)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use chrono::Duration as ChronoDuration;

    use super::*;
    use crate::models::{
        CalendarEvent, Priority, SyncState, Task, TaskStatus,
    };
    use crate::store::memory::InMemoryStore;

    const OWNER: &str = "alice";

    struct CountingSink {
        delivered: AtomicUsize,
    }

    impl CountingSink {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                delivered: AtomicUsize::new(0),
            })
        }
        fn count(&self) -> usize {
            self.delivered.load(Ordering::SeqCst)
        }
    }

    impl NotificationSink for CountingSink {
        fn notify(&self, _title: &str, _body: &str, _tag: &str) {
            self.delivered.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn task_with_reminder(id: &str, reminder: ReminderSettings) -> Task {
        let now = Utc::now();
        Task {
            id: id.to_string(),
            owner_id: OWNER.to_string(),
            description: format!("task {id}"),
            status: TaskStatus::Pending,
            priority: Priority::Medium,
            due_date: None,
            reminder,
            tags: Vec::new(),
            estimated_duration: None,
            created_at: now,
            updated_at: now,
            sync_state: SyncState::Synced,
        }
    }

    fn event_with_reminder(id: &str, reminder: ReminderSettings) -> CalendarEvent {
        let now = Utc::now();
        CalendarEvent {
            id: id.to_string(),
            owner_id: OWNER.to_string(),
            title: format!("event {id}"),
            description: None,
            start_time: now + ChronoDuration::hours(1),
            end_time: None,
            location: Some("Room 2".to_string()),
            attendees: Vec::new(),
            reminder,
            created_at: now,
            updated_at: now,
            sync_state: SyncState::Synced,
        }
    }

    fn scheduler_over(
        tasks: Vec<Task>,
        events: Vec<CalendarEvent>,
    ) -> (ReminderScheduler, Arc<NotificationRegistry>, Arc<CountingSink>) {
        let cache = Arc::new(EntityCache::new(Arc::new(InMemoryStore::new()), OWNER));
        cache.load(tasks, events);
        let registry = Arc::new(NotificationRegistry::new());
        let sink = CountingSink::new();
        let scheduler = ReminderScheduler::new(
            cache,
            registry.clone(),
            sink.clone(),
            &CoreConfig::default(),
        );
        (scheduler, registry, sink)
    }

    #[tokio::test]
    async fn fires_once_across_overlapping_windows() {
        // trigger at t0+40s, window 60s, tick 30s: both the t0 scan and
        // the t0+30s scan see the trigger inside their window
        let t0 = Utc::now();
        let trigger = t0 + ChronoDuration::seconds(40);
        let (mut scheduler, registry, sink) = scheduler_over(
            vec![task_with_reminder("t1", ReminderSettings::at(trigger))],
            Vec::new(),
        );

        assert_eq!(scheduler.scan(t0), 1);
        assert_eq!(scheduler.scan(t0 + ChronoDuration::seconds(30)), 0);

        assert_eq!(registry.list().len(), 1);
        assert_eq!(registry.list()[0].subject_id, "t1");
        assert_eq!(sink.count(), 1);
    }

    #[tokio::test]
    async fn repeated_scans_at_the_same_instant_fire_once() {
        let t0 = Utc::now();
        let trigger = t0 + ChronoDuration::seconds(30);
        let (mut scheduler, registry, _sink) = scheduler_over(
            vec![task_with_reminder("t1", ReminderSettings::at(trigger))],
            Vec::new(),
        );

        for _ in 0..5 {
            scheduler.scan(t0);
        }
        assert_eq!(registry.list().len(), 1);
    }

    #[tokio::test]
    async fn window_bounds_are_open() {
        let t0 = Utc::now();
        let (mut scheduler, registry, _sink) = scheduler_over(
            vec![
                task_with_reminder("at-now", ReminderSettings::at(t0)),
                task_with_reminder(
                    "at-window-end",
                    ReminderSettings::at(t0 + ChronoDuration::seconds(60)),
                ),
                task_with_reminder(
                    "inside",
                    ReminderSettings::at(t0 + ChronoDuration::seconds(30)),
                ),
            ],
            Vec::new(),
        );

        assert_eq!(scheduler.scan(t0), 1);
        let listed = registry.list();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].subject_id, "inside");
    }

    #[tokio::test]
    async fn overdue_trigger_never_fires() {
        let t0 = Utc::now();
        let (mut scheduler, registry, _sink) = scheduler_over(
            vec![task_with_reminder(
                "overdue",
                ReminderSettings::at(t0 - ChronoDuration::seconds(10)),
            )],
            Vec::new(),
        );

        assert_eq!(scheduler.scan(t0), 0);
        assert_eq!(scheduler.scan(t0 + ChronoDuration::seconds(30)), 0);
        assert!(registry.list().is_empty());
    }

    #[tokio::test]
    async fn disabled_or_unset_reminders_are_skipped() {
        let t0 = Utc::now();
        let inside = t0 + ChronoDuration::seconds(30);
        let disabled = ReminderSettings {
            enabled: false,
            trigger_time: Some(inside),
        };
        let no_trigger = ReminderSettings {
            enabled: true,
            trigger_time: None,
        };
        let (mut scheduler, registry, _sink) = scheduler_over(
            vec![
                task_with_reminder("disabled", disabled),
                task_with_reminder("no-trigger", no_trigger),
            ],
            Vec::new(),
        );

        assert_eq!(scheduler.scan(t0), 0);
        assert!(registry.list().is_empty());
    }

    #[tokio::test]
    async fn new_trigger_time_fires_again() {
        let t0 = Utc::now();
        let first = t0 + ChronoDuration::seconds(20);
        let (mut scheduler, registry, _sink) = scheduler_over(
            vec![task_with_reminder("t1", ReminderSettings::at(first))],
            Vec::new(),
        );
        assert_eq!(scheduler.scan(t0), 1);

        // the reminder is reconfigured to a later trigger; the new key
        // fires independently of the consumed one
        let second = t0 + ChronoDuration::seconds(45);
        scheduler
            .cache
            .load(vec![task_with_reminder("t1", ReminderSettings::at(second))], Vec::new());

        assert_eq!(scheduler.scan(t0 + ChronoDuration::seconds(25)), 1);
        assert_eq!(registry.list().len(), 2);
    }

    #[tokio::test]
    async fn event_reminders_fire_with_kind_and_location_body() {
        let t0 = Utc::now();
        let trigger = t0 + ChronoDuration::seconds(30);
        let (mut scheduler, registry, sink) = scheduler_over(
            Vec::new(),
            vec![event_with_reminder("e1", ReminderSettings::at(trigger))],
        );

        assert_eq!(scheduler.scan(t0), 1);
        let listed = registry.list();
        assert_eq!(listed[0].kind, NotificationKind::EventReminder);
        assert_eq!(listed[0].subject_id, "e1");
        assert_eq!(sink.count(), 1);
    }

    #[tokio::test]
    async fn consumed_keys_are_pruned_once_past() {
        let t0 = Utc::now();
        let trigger = t0 + ChronoDuration::seconds(10);
        let (mut scheduler, _registry, _sink) = scheduler_over(
            vec![task_with_reminder("t1", ReminderSettings::at(trigger))],
            Vec::new(),
        );

        assert_eq!(scheduler.scan(t0), 1);
        assert_eq!(scheduler.fired.len(), 1);

        // once the trigger is in the past the key is dropped and the
        // window test alone keeps it from re-firing
        assert_eq!(scheduler.scan(t0 + ChronoDuration::seconds(11)), 0);
        assert!(scheduler.fired.is_empty());
        assert_eq!(scheduler.scan(t0 + ChronoDuration::seconds(12)), 0);
    }
}
