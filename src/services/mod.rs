pub mod notifications;
pub mod reconciler;
pub mod scheduler;

pub use notifications::{LogSink, NotificationRegistry, NotificationSink};
pub use reconciler::Reconciler;
pub use scheduler::ReminderScheduler;
