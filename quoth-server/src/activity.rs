//! Activity Log (C13, §4.13).
//!
//! `log(event)` is fire-and-forget: the write is handed to a detached
//! `tokio::spawn` task so tool handlers never block on it, and a failed
//! write is reported only to the server's own logs (§4.13: "never
//! propagates to the caller").
//!
//! Grounded on `session::run_reaper`'s background-task idiom; there is no
//! teacher equivalent of an activity log, so this module is built directly
//! from spec.md §4.13 in the crate's established style.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use quoth_core::models::{ActivityEvent, ActivityEventType};
use quoth_core::store::Store;

#[derive(Clone)]
pub struct ActivityLogger {
    store: Arc<dyn Store>,
}

impl ActivityLogger {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Enqueue `event` for persistence without waiting on it.
    pub fn log(&self, event: ActivityEvent) {
        let store = self.store.clone();
        let event_type = event.event_type;
        tokio::spawn(async move {
            if let Err(err) = store.append_activity(event).await {
                tracing::error!(error = %err, ?event_type, "activity log write failed");
            }
        });
    }

    pub async fn since(
        &self,
        project_id: Uuid,
        since: DateTime<Utc>,
    ) -> anyhow::Result<Vec<ActivityEvent>> {
        self.store.activity_since(project_id, since).await
    }
}

/// Build an event with the fields every call site sets, leaving the
/// type-specific ones (`query`, `document_id`, ...) to be filled in by the
/// caller.
pub fn new_event(project_id: Uuid, user_id: Option<Uuid>, event_type: ActivityEventType) -> ActivityEvent {
    ActivityEvent {
        id: Uuid::new_v4(),
        project_id,
        user_id,
        event_type,
        query: None,
        document_id: None,
        tool_name: None,
        patterns_matched: None,
        drift_detected: false,
        result_count: None,
        relevance_score: None,
        response_time_ms: None,
        file_path: None,
        context: serde_json::Value::Null,
        created_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quoth_core::store::memory::InMemoryStore;
    use tokio::time::{sleep, Duration};

    #[tokio::test]
    async fn logged_event_is_eventually_visible() {
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        let logger = ActivityLogger::new(store.clone());
        let project_id = Uuid::new_v4();

        logger.log(new_event(project_id, None, ActivityEventType::Search));
        sleep(Duration::from_millis(20)).await;

        let events = logger
            .since(project_id, Utc::now() - chrono::Duration::minutes(1))
            .await
            .unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, ActivityEventType::Search);
    }
}
