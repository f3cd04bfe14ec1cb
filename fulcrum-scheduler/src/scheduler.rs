//! `JobScheduler` (C7): cron-driven trigger evaluation, cooldown,
//! concurrency caps, and recovery with backoff.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use cron::Schedule;
use fulcrum_core::{Job, JobStatus};
use fulcrum_proto::{CancellationToken, JobId, SessionId};
use tokio::sync::Mutex;
use tokio::time::interval;
use tracing::{info, warn};

use crate::cron_expr;
use crate::error::SchedulerError;
use crate::ports::{CoordinatorInvoker, FireOutcome, JobSource, JobStore, Notifier};

/// How an overlapping fire is handled when the job is already at its
/// concurrency cap (§4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConcurrencyPolicy {
    /// Drop the overlapping fire.
    #[default]
    Skip,
    /// Enqueue exactly one fire to run once capacity frees up.
    Delay,
}

/// Tunables shared by every job unless overridden (§4.7).
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Minimum gap between the start of two consecutive fires of the
    /// same job.
    pub cooldown: Duration,
    /// Maximum in-flight runs per job.
    pub max_concurrent: u32,
    /// Retries attempted on failure before a job pauses. `0` means a
    /// job pauses on its first failure.
    pub recovery_max_retries: u32,
    /// Backoff unit; the actual wait is `failure_count * recovery_backoff`.
    pub recovery_backoff: Duration,
    /// How often OKR-derived jobs are reconciled (§4.7, default 5 min).
    pub okr_sync_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            cooldown: Duration::from_secs(0),
            max_concurrent: 1,
            recovery_max_retries: 3,
            recovery_backoff: Duration::from_secs(30),
            okr_sync_interval: Duration::from_secs(5 * 60),
        }
    }
}

/// Where a job's definition came from. OKR-derived jobs are pruned
/// when they disappear from a reconciliation sync; statically
/// registered jobs never are (§4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JobOrigin {
    Static,
    OkrDerived,
}

struct JobEntry {
    job: Job,
    schedule: Schedule,
    policy: ConcurrencyPolicy,
    origin: JobOrigin,
    in_flight: u32,
    delayed: bool,
}

struct SharedState {
    jobs: Mutex<HashMap<JobId, JobEntry>>,
    store: Arc<dyn JobStore>,
    coordinator: Arc<dyn CoordinatorInvoker>,
    notifier: Arc<dyn Notifier>,
    config: SchedulerConfig,
    run_seq: AtomicU64,
    root_cancel: CancellationToken,
}

/// Fires registered jobs on their cron schedule, honoring per-job
/// cooldown and concurrency caps, and recovers from failure with
/// backoff (§4.7). Cheaply cloneable: every clone shares the same job
/// table and collaborators.
#[derive(Clone)]
pub struct JobScheduler {
    state: Arc<SharedState>,
}

impl JobScheduler {
    /// Build a scheduler. Call [`JobScheduler::load`] before
    /// evaluating any fires to populate the table from the store.
    pub fn new(
        store: Arc<dyn JobStore>,
        coordinator: Arc<dyn CoordinatorInvoker>,
        notifier: Arc<dyn Notifier>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            state: Arc::new(SharedState {
                jobs: Mutex::new(HashMap::new()),
                store,
                coordinator,
                notifier,
                config,
                run_seq: AtomicU64::new(0),
                root_cancel: CancellationToken::new(),
            }),
        }
    }

    /// Cancel in-flight fires' cancellation tokens and any pending
    /// recovery-retry timers. Already-fired coordinator invocations
    /// observe cancellation cooperatively; this does not block for them.
    pub fn shutdown(&self) {
        self.state.root_cancel.cancel();
    }

    /// Load every persisted job and compute its schedule. Malformed
    /// cron expressions are logged and the job is skipped rather than
    /// failing the whole load.
    pub async fn load(&self) -> Result<(), SchedulerError> {
        let persisted = self.state.store.load_all().await?;
        let mut jobs = self.state.jobs.lock().await;
        for job in persisted {
            match cron_expr::parse(&job.cron_expr) {
                Ok(schedule) => {
                    jobs.insert(
                        job.id.clone(),
                        JobEntry {
                            job,
                            schedule,
                            policy: ConcurrencyPolicy::default(),
                            origin: JobOrigin::Static,
                            in_flight: 0,
                            delayed: false,
                        },
                    );
                }
                Err(err) => warn!(job = %job.name, error = %err, "scheduler: dropping job with invalid cron expression"),
            }
        }
        Ok(())
    }

    /// Register (or replace) a statically-configured job.
    pub async fn register(&self, mut job: Job, policy: ConcurrencyPolicy) -> Result<(), SchedulerError> {
        let schedule = cron_expr::parse(&job.cron_expr)?;
        job.next_run = cron_expr::next_after(&schedule, Utc::now());
        self.state.store.save(&job).await?;
        self.state.jobs.lock().await.insert(
            job.id.clone(),
            JobEntry {
                job,
                schedule,
                policy,
                origin: JobOrigin::Static,
                in_flight: 0,
                delayed: false,
            },
        );
        Ok(())
    }

    /// Resume a paused job, clearing its failure count and
    /// recomputing its next fire.
    pub async fn resume(&self, id: &JobId) -> Result<(), SchedulerError> {
        let mut jobs = self.state.jobs.lock().await;
        let entry = jobs
            .get_mut(id)
            .ok_or_else(|| SchedulerError::JobNotFound(id.to_string()))?;
        entry.job.status = JobStatus::Active;
        entry.job.failure_count = 0;
        entry.job.next_run = cron_expr::next_after(&entry.schedule, Utc::now());
        entry.job.updated_at = Utc::now();
        self.state.store.save(&entry.job).await?;
        Ok(())
    }

    /// A snapshot of every currently-registered job.
    pub async fn jobs(&self) -> Vec<Job> {
        self.state
            .jobs
            .lock()
            .await
            .values()
            .map(|entry| entry.job.clone())
            .collect()
    }

    /// Evaluate every active job against `now` and fire the ones that
    /// are due. Safe to call on a fixed tick (e.g. every second).
    pub async fn tick(&self, now: chrono::DateTime<Utc>) {
        let due: Vec<JobId> = {
            let jobs = self.state.jobs.lock().await;
            jobs.values()
                .filter(|entry| entry.job.status == JobStatus::Active)
                .filter(|entry| entry.job.next_run.map(|next| next <= now).unwrap_or(true))
                .map(|entry| entry.job.id.clone())
                .collect()
        };
        for id in due {
            self.fire(&id, now, false).await;
        }
    }

    /// Spawn a background loop that calls [`JobScheduler::tick`] every
    /// `period` until `cancel` fires.
    pub fn spawn_loop(&self, period: Duration, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
        let scheduler = self.clone();
        tokio::spawn(async move {
            let mut ticker = interval(period);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => scheduler.tick(Utc::now()).await,
                }
            }
        })
    }

    /// Reconcile OKR-derived jobs from `source`: upsert every job it
    /// currently lists, and prune any previously OKR-derived job that
    /// no longer appears (§4.7, run on a 5-minute sync by convention).
    pub async fn reconcile_okr(&self, source: &dyn JobSource) -> Result<(), SchedulerError> {
        let latest = source.list_jobs().await?;
        let latest_ids: HashSet<JobId> = latest.iter().map(|job| job.id.clone()).collect();

        let mut jobs = self.state.jobs.lock().await;

        for job in latest {
            let schedule = cron_expr::parse(&job.cron_expr)?;
            self.state.store.save(&job).await?;
            jobs.insert(
                job.id.clone(),
                JobEntry {
                    job,
                    schedule,
                    policy: ConcurrencyPolicy::default(),
                    origin: JobOrigin::OkrDerived,
                    in_flight: 0,
                    delayed: false,
                },
            );
        }

        let stale: Vec<JobId> = jobs
            .iter()
            .filter(|(id, entry)| entry.origin == JobOrigin::OkrDerived && !latest_ids.contains(id))
            .map(|(id, _)| id.clone())
            .collect();
        for id in &stale {
            jobs.remove(id);
            self.state.store.delete(id).await?;
        }
        Ok(())
    }

    async fn fire(&self, id: &JobId, now: chrono::DateTime<Utc>, bypass_cooldown: bool) {
        let fire_input = {
            let mut jobs = self.state.jobs.lock().await;
            let Some(entry) = jobs.get_mut(id) else {
                return;
            };
            if entry.job.status != JobStatus::Active {
                return;
            }
            if !bypass_cooldown {
                if let Some(last_run) = entry.job.last_run {
                    let elapsed = (now - last_run).to_std().unwrap_or(Duration::ZERO);
                    if elapsed < self.state.config.cooldown {
                        return;
                    }
                }
            }
            if entry.in_flight >= self.state.config.max_concurrent {
                if entry.policy == ConcurrencyPolicy::Delay {
                    entry.delayed = true;
                }
                return;
            }

            entry.in_flight += 1;
            entry.job.last_run = Some(now);
            entry.job.next_run = cron_expr::next_after(&entry.schedule, now);
            entry.job.updated_at = now;
            (entry.job.clone(), entry.job.name.clone())
        };

        let (job, name) = fire_input;
        if let Err(err) = self.state.store.save(&job).await {
            warn!(job = %name, error = %err, "scheduler: failed to persist job after fire");
        }

        let run_seq = self.state.run_seq.fetch_add(1, Ordering::Relaxed);
        let session_id = SessionId::new(format!("scheduler-{}-{run_seq:x}", job.name));
        let cancel = self.state.root_cancel.child_token();
        let state = self.state.clone();
        let id = id.clone();
        tokio::spawn(async move {
            let outcome = state
                .coordinator
                .execute_task(session_id, job.trigger.clone(), cancel)
                .await;
            Self::finish_on(&state, &id, outcome).await;
        });
    }

    async fn finish_on(state: &Arc<SharedState>, id: &JobId, outcome: Result<String, String>) {
        let (job, name, retry_after, should_retry, delayed_ready) = {
            let mut jobs = state.jobs.lock().await;
            let Some(entry) = jobs.get_mut(id) else {
                return;
            };
            entry.in_flight = entry.in_flight.saturating_sub(1);

            match &outcome {
                Ok(_) => {
                    entry.job.failure_count = 0;
                    entry.job.last_failure = None;
                    entry.job.last_error = None;
                }
                Err(message) => {
                    entry.job.failure_count += 1;
                    entry.job.last_failure = Some(Utc::now());
                    entry.job.last_error = Some(message.clone());
                    if entry.job.failure_count > state.config.recovery_max_retries {
                        entry.job.status = JobStatus::Paused;
                    }
                }
            }
            entry.job.updated_at = Utc::now();

            let should_retry =
                outcome.is_err() && entry.job.status == JobStatus::Active && state.config.recovery_max_retries > 0;
            let retry_after = state.config.recovery_backoff * entry.job.failure_count;

            let delayed_ready = entry.delayed && entry.in_flight < state.config.max_concurrent;
            if delayed_ready {
                entry.delayed = false;
            }

            (entry.job.clone(), entry.job.name.clone(), retry_after, should_retry, delayed_ready)
        };

        if let Err(err) = state.store.save(&job).await {
            warn!(job = %name, error = %err, "scheduler: failed to persist job after finish");
        }

        if delayed_ready {
            let state = state.clone();
            let id = id.clone();
            tokio::spawn(async move {
                JobScheduler { state }.fire_bypass(&id).await;
            });
        }

        match &outcome {
            Ok(summary) => {
                state
                    .notifier
                    .notify(&name, &FireOutcome::Success { summary: summary.clone() })
                    .await
            }
            Err(error) => {
                state
                    .notifier
                    .notify(&name, &FireOutcome::Failure { error: error.clone() })
                    .await
            }
        }

        if should_retry {
            let state = state.clone();
            let id = id.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = tokio::time::sleep(retry_after) => {
                        JobScheduler { state }.fire_bypass(&id).await;
                    }
                    _ = state.root_cancel.cancelled() => {}
                }
            });
            info!(job = %name, retry_after_secs = retry_after.as_secs(), "scheduler: recovery retry scheduled");
        }
    }

    async fn fire_bypass(&self, id: &JobId) {
        self.fire(id, Utc::now(), true).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use fulcrum_proto::JobId as JId;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Mutex as TokioMutex;

    struct MemoryJobStore {
        jobs: TokioMutex<HashMap<JId, Job>>,
    }

    impl MemoryJobStore {
        fn new() -> Self {
            Self {
                jobs: TokioMutex::new(HashMap::new()),
            }
        }
    }

    #[async_trait]
    impl JobStore for MemoryJobStore {
        async fn load_all(&self) -> Result<Vec<Job>, SchedulerError> {
            Ok(self.jobs.lock().await.values().cloned().collect())
        }
        async fn save(&self, job: &Job) -> Result<(), SchedulerError> {
            self.jobs.lock().await.insert(job.id.clone(), job.clone());
            Ok(())
        }
        async fn delete(&self, id: &JId) -> Result<(), SchedulerError> {
            self.jobs.lock().await.remove(id);
            Ok(())
        }
    }

    struct CountingCoordinator {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl CoordinatorInvoker for CountingCoordinator {
        async fn execute_task(
            &self,
            _session_id: SessionId,
            _trigger: serde_json::Value,
            _cancel: CancellationToken,
        ) -> Result<String, String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err("boom".to_string())
            } else {
                Ok("ok".to_string())
            }
        }
    }

    fn job(id: &str, cron_expr: &str) -> Job {
        Job::new(JobId::new(id), id, cron_expr, serde_json::json!({}), Utc::now())
    }

    #[tokio::test]
    async fn due_job_fires_and_records_success() {
        let store = Arc::new(MemoryJobStore::new());
        let coordinator = Arc::new(CountingCoordinator {
            calls: AtomicUsize::new(0),
            fail: false,
        });
        let scheduler = JobScheduler::new(
            store,
            coordinator.clone(),
            Arc::new(crate::ports::NullNotifier),
            SchedulerConfig::default(),
        );
        scheduler
            .register(job("j-1", "* * * * *"), ConcurrencyPolicy::Skip)
            .await
            .unwrap();

        scheduler.tick(Utc::now() + chrono::Duration::minutes(2)).await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(coordinator.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failure_past_retry_cap_pauses_job() {
        let store = Arc::new(MemoryJobStore::new());
        let coordinator = Arc::new(CountingCoordinator {
            calls: AtomicUsize::new(0),
            fail: true,
        });
        let scheduler = JobScheduler::new(
            store,
            coordinator,
            Arc::new(crate::ports::NullNotifier),
            SchedulerConfig {
                recovery_max_retries: 0,
                ..SchedulerConfig::default()
            },
        );
        scheduler
            .register(job("j-1", "* * * * *"), ConcurrencyPolicy::Skip)
            .await
            .unwrap();

        scheduler.tick(Utc::now() + chrono::Duration::minutes(2)).await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        let jobs = scheduler.jobs().await;
        assert_eq!(jobs[0].status, JobStatus::Paused);
    }

    #[tokio::test]
    async fn cooldown_suppresses_back_to_back_fires() {
        let store = Arc::new(MemoryJobStore::new());
        let coordinator = Arc::new(CountingCoordinator {
            calls: AtomicUsize::new(0),
            fail: false,
        });
        let scheduler = JobScheduler::new(
            store,
            coordinator.clone(),
            Arc::new(crate::ports::NullNotifier),
            SchedulerConfig {
                cooldown: Duration::from_secs(3600),
                ..SchedulerConfig::default()
            },
        );
        scheduler
            .register(job("j-1", "* * * * *"), ConcurrencyPolicy::Skip)
            .await
            .unwrap();

        let now = Utc::now() + chrono::Duration::minutes(2);
        scheduler.tick(now).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        // Still within the cron schedule's next occurrence, so the
        // cron check alone would allow this fire; only the cooldown
        // should suppress it.
        scheduler.tick(now + chrono::Duration::minutes(2)).await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(coordinator.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn resume_clears_paused_status() {
        let store = Arc::new(MemoryJobStore::new());
        let coordinator = Arc::new(CountingCoordinator {
            calls: AtomicUsize::new(0),
            fail: true,
        });
        let scheduler = JobScheduler::new(
            store,
            coordinator,
            Arc::new(crate::ports::NullNotifier),
            SchedulerConfig {
                recovery_max_retries: 0,
                ..SchedulerConfig::default()
            },
        );
        scheduler
            .register(job("j-1", "* * * * *"), ConcurrencyPolicy::Skip)
            .await
            .unwrap();
        scheduler.tick(Utc::now() + chrono::Duration::minutes(2)).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(scheduler.jobs().await[0].status, JobStatus::Paused);

        scheduler.resume(&JobId::new("j-1")).await.unwrap();
        assert_eq!(scheduler.jobs().await[0].status, JobStatus::Active);
    }

    #[tokio::test]
    async fn reconcile_prunes_stale_okr_jobs_but_keeps_static_ones() {
        let store = Arc::new(MemoryJobStore::new());
        let coordinator = Arc::new(CountingCoordinator {
            calls: AtomicUsize::new(0),
            fail: false,
        });
        let scheduler = JobScheduler::new(
            store,
            coordinator,
            Arc::new(crate::ports::NullNotifier),
            SchedulerConfig::default(),
        );
        scheduler
            .register(job("static-1", "* * * * *"), ConcurrencyPolicy::Skip)
            .await
            .unwrap();

        struct FirstSync;
        #[async_trait]
        impl JobSource for FirstSync {
            async fn list_jobs(&self) -> Result<Vec<Job>, SchedulerError> {
                Ok(vec![job("okr-1", "0 0 * * *")])
            }
        }
        scheduler.reconcile_okr(&FirstSync).await.unwrap();
        assert_eq!(scheduler.jobs().await.len(), 2);

        struct SecondSync;
        #[async_trait]
        impl JobSource for SecondSync {
            async fn list_jobs(&self) -> Result<Vec<Job>, SchedulerError> {
                Ok(vec![])
            }
        }
        scheduler.reconcile_okr(&SecondSync).await.unwrap();

        let remaining = scheduler.jobs().await;
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].name, "static-1");
    }
}
