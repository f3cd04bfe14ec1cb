//! The serializing event router (C3): one ordered delivery queue per
//! run, so concurrent producers (the tracker, tool callbacks, a
//! subflow's forwarded events) never interleave deliveries for the
//! same run out of sequence order, while different runs proceed fully
//! in parallel (§4.3).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use fulcrum_core::Event;
use fulcrum_proto::RunId;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, warn};

/// Default bound on a single run's pending-event queue. A producer that
/// outruns the consumer past this many buffered events blocks rather
/// than unbounded-growing memory.
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// A run's queue is retired if no event arrives for this long, in case
/// a run's terminal event is lost (e.g. the runtime panics mid-flight).
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(600);

struct QueueHandle {
    sender: mpsc::Sender<Event>,
}

/// Routes events to a single-consumer-per-run queue so each run's
/// events are delivered to `inner` in strict sequence order, while
/// distinct runs are delivered fully concurrently.
///
/// A run's queue and consumer task are created lazily on first event
/// and retired after delivering a terminal event or sitting idle past
/// `idle_timeout`. A retired run is never revived: a later event for
/// the same `RunId` after retirement starts a brand-new queue (this
/// can only happen if a producer sends after the run's own terminal
/// event, which is a producer bug, not something the router papers over).
pub struct SerializingEventRouter {
    inner: Arc<dyn crate::listener::EventListener>,
    queues: Arc<Mutex<HashMap<RunId, QueueHandle>>>,
    capacity: usize,
    idle_timeout: Duration,
}

impl SerializingEventRouter {
    /// Build a router with the default queue capacity and idle timeout.
    pub fn new(inner: Arc<dyn crate::listener::EventListener>) -> Self {
        Self::with_options(inner, DEFAULT_QUEUE_CAPACITY, DEFAULT_IDLE_TIMEOUT)
    }

    /// Build a router with explicit queue capacity and idle timeout.
    pub fn with_options(
        inner: Arc<dyn crate::listener::EventListener>,
        capacity: usize,
        idle_timeout: Duration,
    ) -> Self {
        Self {
            inner,
            queues: Arc::new(Mutex::new(HashMap::new())),
            capacity,
            idle_timeout,
        }
    }

    /// Number of runs currently holding an active queue.
    pub async fn active_run_count(&self) -> usize {
        self.queues.lock().await.len()
    }

    async fn enqueue(&self, event: Event) {
        let run_id = event.header.run_id.clone();
        let mut queues = self.queues.lock().await;

        let handle = match queues.get(&run_id) {
            Some(handle) => handle.sender.clone(),
            None => {
                let (tx, rx) = mpsc::channel(self.capacity);
                queues.insert(
                    run_id.clone(),
                    QueueHandle {
                        sender: tx.clone(),
                    },
                );
                Self::spawn_consumer(
                    run_id.clone(),
                    rx,
                    self.inner.clone(),
                    self.queues.clone(),
                    self.idle_timeout,
                );
                tx
            }
        };
        drop(queues);

        if handle.send(event).await.is_err() {
            warn!(run_id = %run_id, "event router: queue consumer gone, dropping event");
        }
    }

    fn spawn_consumer(
        run_id: RunId,
        mut rx: mpsc::Receiver<Event>,
        inner: Arc<dyn crate::listener::EventListener>,
        queues: Arc<Mutex<HashMap<RunId, QueueHandle>>>,
        idle_timeout: Duration,
    ) {
        tokio::spawn(async move {
            loop {
                let next = tokio::time::timeout(idle_timeout, rx.recv()).await;
                let event = match next {
                    Ok(Some(event)) => event,
                    Ok(None) => break,
                    Err(_) => {
                        debug!(run_id = %run_id, "event router: idle timeout, retiring queue");
                        break;
                    }
                };
                let terminal = event.is_terminal();
                inner.on_event(event).await;
                if terminal {
                    debug!(run_id = %run_id, "event router: terminal event delivered, retiring queue");
                    break;
                }
            }
            queues.lock().await.remove(&run_id);
        });
    }
}

#[async_trait]
impl crate::listener::EventListener for SerializingEventRouter {
    async fn on_event(&self, event: Event) {
        self.enqueue(event).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fulcrum_core::{AgentLevel, EventBody, EventHeader};
    use fulcrum_proto::{CausationId, CorrelationId, EventId, SessionId};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Mutex as AsyncMutex;

    fn header(run: &str, seq: u64) -> EventHeader {
        EventHeader {
            agent_level: AgentLevel::Core,
            session_id: SessionId::new("s-1"),
            run_id: RunId::new(run),
            parent_run_id: None,
            correlation_id: CorrelationId::new(run),
            causation_id: CausationId::new(run),
            event_id: EventId::new(format!("{run}-{seq}")),
            seq,
            timestamp: chrono::Utc::now(),
        }
    }

    struct RecordingListener {
        seen: AsyncMutex<Vec<(RunId, u64)>>,
    }

    impl RecordingListener {
        fn new() -> Self {
            Self {
                seen: AsyncMutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl crate::listener::EventListener for RecordingListener {
        async fn on_event(&self, event: Event) {
            // Simulate uneven processing latency to exercise ordering.
            tokio::task::yield_now().await;
            self.seen
                .lock()
                .await
                .push((event.header.run_id.clone(), event.header.seq));
        }
    }

    fn result_event(run: &str, seq: u64, stream_finished: bool) -> Event {
        Event::new(
            header(run, seq),
            EventBody::ResultFinal {
                content: format!("chunk-{seq}"),
                stream_finished,
            },
        )
    }

    #[tokio::test]
    async fn events_for_one_run_deliver_in_order() {
        let listener = Arc::new(RecordingListener::new());
        let router = SerializingEventRouter::new(listener.clone());

        for seq in 1..=5 {
            router
                .enqueue(result_event("run-a", seq, seq == 5))
                .await;
        }

        tokio::time::sleep(Duration::from_millis(50)).await;
        let seen = listener.seen.lock().await;
        let seqs: Vec<u64> = seen
            .iter()
            .filter(|(run, _)| run.as_str() == "run-a")
            .map(|(_, seq)| *seq)
            .collect();
        assert_eq!(seqs, vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn distinct_runs_do_not_block_each_other() {
        let counter = Arc::new(AtomicUsize::new(0));

        struct SlowListener {
            counter: Arc<AtomicUsize>,
        }
        #[async_trait]
        impl crate::listener::EventListener for SlowListener {
            async fn on_event(&self, event: Event) {
                if event.header.run_id.as_str() == "slow-run" {
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
                self.counter.fetch_add(1, Ordering::SeqCst);
            }
        }

        let listener = Arc::new(SlowListener {
            counter: counter.clone(),
        });
        let router = SerializingEventRouter::new(listener);

        router.enqueue(result_event("slow-run", 1, true)).await;
        router.enqueue(result_event("fast-run", 1, true)).await;

        tokio::time::sleep(Duration::from_millis(30)).await;
        // the fast run's event should have landed well before the slow one
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn queue_is_created_lazily_and_is_present_while_active() {
        let listener = Arc::new(RecordingListener::new());
        let router = SerializingEventRouter::new(listener);
        assert_eq!(router.active_run_count().await, 0);

        router.enqueue(result_event("run-x", 1, false)).await;
        assert_eq!(router.active_run_count().await, 1);
    }
}
