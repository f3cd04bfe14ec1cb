//! Session-title recording: watches for the `plan` tool's declared
//! title and renames the session in the background (§4.6 step 3, §5).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use fulcrum_core::{Event, EventBody};
use fulcrum_events::EventListener;
use fulcrum_proto::SessionId;

use crate::ports::SessionTitleUpdater;

/// Deadline for one title-update attempt (§5: "session title update
/// runs with a 2-second deadline").
const TITLE_UPDATE_TIMEOUT: Duration = Duration::from_secs(2);

/// An `EventListener` decorator that watches the `plan` tool's
/// completion for a declared title, renames the session through a
/// [`SessionTitleUpdater`] at most once per run, and forwards every
/// event unchanged to `inner`.
///
/// Sits between the router and the translator in the composition
/// chain (`caller <- translator <- title recorder <- router`) so it
/// observes raw domain events before they're shaped into wire
/// envelopes, and is only ever constructed for top-level runs — §4.6
/// step 3 calls this out as "non-subagent only".
///
/// The extracted title is also mirrored into `captured`, a cell the
/// coordinator reads back at persist time so the session record's own
/// `title` metadata key reflects it even if the out-of-band rename
/// never completes.
pub struct PlanSessionTitleRecorder {
    inner: Arc<dyn EventListener>,
    updater: Arc<dyn SessionTitleUpdater>,
    session_id: SessionId,
    captured: Arc<Mutex<Option<String>>>,
    recorded: AtomicBool,
}

impl PlanSessionTitleRecorder {
    /// Wrap `inner`, renaming `session_id` through `updater` the first
    /// time a `plan` tool call completes with a `title` field, and
    /// recording that title into `captured`.
    pub fn new(
        inner: Arc<dyn EventListener>,
        updater: Arc<dyn SessionTitleUpdater>,
        session_id: SessionId,
        captured: Arc<Mutex<Option<String>>>,
    ) -> Self {
        Self {
            inner,
            updater,
            session_id,
            captured,
            recorded: AtomicBool::new(false),
        }
    }

    fn extract_title(event: &Event) -> Option<String> {
        let EventBody::ToolCompleted {
            tool_name,
            output,
            is_error,
            ..
        } = &event.body
        else {
            return None;
        };
        if tool_name != "plan" || *is_error {
            return None;
        }
        let parsed: serde_json::Value = serde_json::from_str(output).ok()?;
        parsed
            .get("title")
            .and_then(|v| v.as_str())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }

    fn spawn_rename(&self, title: String) {
        let updater = self.updater.clone();
        let session_id = self.session_id.clone();
        tokio::spawn(async move {
            match tokio::time::timeout(
                TITLE_UPDATE_TIMEOUT,
                updater.rename(&session_id, &title),
            )
            .await
            {
                Ok(Ok(())) => {}
                Ok(Err(err)) => warn!(session_id = %session_id, %err, "session title update failed"),
                Err(_) => warn!(session_id = %session_id, "session title update timed out"),
            }
        });
    }
}

#[async_trait]
impl EventListener for PlanSessionTitleRecorder {
    async fn on_event(&self, event: Event) {
        if !self.recorded.load(Ordering::Relaxed) {
            if let Some(title) = Self::extract_title(&event) {
                self.recorded.store(true, Ordering::Relaxed);
                *self.captured.lock().unwrap() = Some(title.clone());
                self.spawn_rename(title);
            }
        }
        self.inner.on_event(event).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fulcrum_core::{AgentLevel, EventHeader};
    use fulcrum_proto::{CausationId, CorrelationId, EventId, RunId};
    use std::sync::Mutex;
    use tokio::sync::Notify;

    struct RecordingListener {
        events: Mutex<Vec<Event>>,
    }

    #[async_trait]
    impl EventListener for RecordingListener {
        async fn on_event(&self, event: Event) {
            self.events.lock().unwrap().push(event);
        }
    }

    struct RecordingUpdater {
        calls: Mutex<Vec<(SessionId, String)>>,
        notify: Notify,
    }

    #[async_trait]
    impl SessionTitleUpdater for RecordingUpdater {
        async fn rename(&self, session_id: &SessionId, title: &str) -> Result<(), crate::error::CoordinatorError> {
            self.calls
                .lock()
                .unwrap()
                .push((session_id.clone(), title.to_string()));
            self.notify.notify_one();
            Ok(())
        }
    }

    fn header() -> EventHeader {
        EventHeader {
            agent_level: AgentLevel::Core,
            session_id: SessionId::new("s-1"),
            run_id: RunId::new("r-1"),
            parent_run_id: None,
            correlation_id: CorrelationId::new("r-1"),
            causation_id: CausationId::new("r-1"),
            event_id: EventId::new("r-1:0"),
            seq: 0,
            timestamp: chrono::Utc::now(),
        }
    }

    fn plan_completed(title: &str) -> Event {
        Event::new(
            header(),
            EventBody::ToolCompleted {
                node_id: "react:iter:1:tool:plan:0".into(),
                tool_name: "plan".into(),
                output: serde_json::json!({"title": title}).to_string(),
                is_error: false,
            },
        )
    }

    #[tokio::test]
    async fn renames_once_on_plan_completion() {
        let inner = Arc::new(RecordingListener {
            events: Mutex::new(Vec::new()),
        });
        let updater = Arc::new(RecordingUpdater {
            calls: Mutex::new(Vec::new()),
            notify: Notify::new(),
        });
        let captured = Arc::new(Mutex::new(None));
        let recorder = PlanSessionTitleRecorder::new(
            inner.clone(),
            updater.clone(),
            SessionId::new("s-1"),
            captured.clone(),
        );

        recorder.on_event(plan_completed("Plan the migration")).await;
        updater.notify.notified().await;
        recorder.on_event(plan_completed("Plan something else")).await;

        assert_eq!(inner.events.lock().unwrap().len(), 2);
        let calls = updater.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].1, "Plan the migration");
        assert_eq!(captured.lock().unwrap().as_deref(), Some("Plan the migration"));
    }

    #[tokio::test]
    async fn ignores_non_plan_tool_completion() {
        let inner = Arc::new(RecordingListener {
            events: Mutex::new(Vec::new()),
        });
        let updater = Arc::new(RecordingUpdater {
            calls: Mutex::new(Vec::new()),
            notify: Notify::new(),
        });
        let captured = Arc::new(Mutex::new(None));
        let recorder = PlanSessionTitleRecorder::new(inner, updater.clone(), SessionId::new("s-1"), captured);

        let mut event = plan_completed("ignored");
        if let EventBody::ToolCompleted { tool_name, .. } = &mut event.body {
            *tool_name = "file_read".to_string();
        }
        recorder.on_event(event).await;

        assert!(updater.calls.lock().unwrap().is_empty());
    }
}
