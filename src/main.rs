use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use agenda_core::config::CoreConfig;
use agenda_core::models::{EventDraft, ReminderSettings, TaskDraft};
use agenda_core::services::LogSink;
use agenda_core::session::Session;
use agenda_core::store::memory::InMemoryStore;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "agenda_core=debug".to_string()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = CoreConfig::new_from_env()?;
    // a demo-friendly cadence so something fires within a few seconds
    config.tick_interval = Duration::from_millis(500);
    config.look_ahead = Duration::from_secs(5);

    let store = Arc::new(InMemoryStore::new());
    let session = Session::start(store, Arc::new(LogSink), config, "demo-user").await?;

    let task = session
        .cache()
        .create_task(TaskDraft {
            description: "Submit the quarterly report".to_string(),
            reminder: ReminderSettings::at(Utc::now() + chrono::Duration::seconds(2)),
            ..TaskDraft::default()
        })
        .await?;
    info!("created task {}", task.id);

    let event = session
        .cache()
        .create_event(EventDraft {
            title: "Team standup".to_string(),
            description: None,
            start_time: Utc::now() + chrono::Duration::minutes(30),
            end_time: Some(Utc::now() + chrono::Duration::minutes(45)),
            location: Some("Room 2".to_string()),
            attendees: vec!["bob".to_string()],
            reminder: ReminderSettings::at(Utc::now() + chrono::Duration::seconds(3)),
        })
        .await?;
    info!("created event {}", event.id);

    tokio::time::sleep(Duration::from_secs(4)).await;

    for notification in session.notifications().list() {
        info!(
            "fired: [{:?}] {}: {}",
            notification.kind, notification.title, notification.message
        );
    }
    info!("unread notifications: {}", session.notifications().unread_count());

    session.shutdown().await;
    Ok(())
}
