use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use agency_core::Clock;
use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    error::{Result, SchedulerError},
    job::JobHandler,
    ledger::JobLedger,
    schedule::CronSchedule,
    types::{JobContext, RunOutcome, RunStatus, TriggerInfo},
};

const DEFAULT_LOCK_TTL_SECS: i64 = 3600;

struct RegisteredJob {
    name: String,
    schedule: CronSchedule,
    handler: Arc<dyn JobHandler>,
    /// Set while a run of this trigger is in flight inside this process.
    running: AtomicBool,
    next_fire: Mutex<Option<DateTime<Utc>>>,
}

/// Clears the in-process running flag when a firing ends, even by panic.
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Cron-driven job runner.
///
/// Each registered trigger fires at its next cron instant. A firing is skipped
/// when the previous run of the same trigger is still executing here, or when
/// another instance holds the trigger's lease in the [`JobLedger`]. Handler
/// errors and panics are recorded as failed runs and never stop the loop.
pub struct SchedulerEngine {
    ledger: JobLedger,
    clock: Arc<dyn Clock>,
    instance_id: String,
    lock_ttl: Duration,
    tick_interval: std::time::Duration,
    jobs: BTreeMap<String, Arc<RegisteredJob>>,
}

impl SchedulerEngine {
    pub fn new(ledger: JobLedger, clock: Arc<dyn Clock>) -> Self {
        Self {
            ledger,
            clock,
            instance_id: format!("worker-{}", Uuid::new_v4()),
            lock_ttl: Duration::seconds(DEFAULT_LOCK_TTL_SECS),
            tick_interval: std::time::Duration::from_secs(1),
            jobs: BTreeMap::new(),
        }
    }

    pub fn with_instance_id(mut self, id: impl Into<String>) -> Self {
        self.instance_id = id.into();
        self
    }

    /// Lease length. Must exceed the longest expected run.
    pub fn with_lock_ttl(mut self, ttl: Duration) -> Self {
        self.lock_ttl = ttl;
        self
    }

    pub fn with_tick_interval(mut self, every: std::time::Duration) -> Self {
        self.tick_interval = every;
        self
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    pub fn ledger(&self) -> &JobLedger {
        &self.ledger
    }

    /// Register `handler` under `name`. Names are unique.
    pub fn register(
        &mut self,
        name: &str,
        schedule: CronSchedule,
        handler: Arc<dyn JobHandler>,
    ) -> Result<()> {
        if self.jobs.contains_key(name) {
            return Err(SchedulerError::DuplicateJob {
                name: name.to_string(),
            });
        }
        let next = schedule.next_after(self.clock.now());
        info!(
            job = %name,
            cron = %schedule.expression(),
            tz = %schedule.timezone(),
            next_fire = ?next,
            "trigger registered"
        );
        self.jobs.insert(
            name.to_string(),
            Arc::new(RegisteredJob {
                name: name.to_string(),
                schedule,
                handler,
                running: AtomicBool::new(false),
                next_fire: Mutex::new(next),
            }),
        );
        Ok(())
    }

    pub fn register_cron(
        &mut self,
        name: &str,
        expression: &str,
        tz: Tz,
        handler: Arc<dyn JobHandler>,
    ) -> Result<()> {
        let schedule = CronSchedule::parse(expression, tz)?;
        self.register(name, schedule, handler)
    }

    pub fn job_names(&self) -> Vec<String> {
        self.jobs.keys().cloned().collect()
    }

    /// Registered triggers with their next fire time, sorted by name.
    pub fn list(&self) -> Vec<TriggerInfo> {
        self.jobs
            .values()
            .map(|job| TriggerInfo {
                name: job.name.clone(),
                expression: job.schedule.expression().to_string(),
                timezone: job.schedule.timezone().to_string(),
                next_fire: next_fire_of(job),
            })
            .collect()
    }

    /// Fire `name` immediately, outside its schedule. Still subject to the
    /// running guard and the lease lock.
    pub async fn run_now(&self, name: &str) -> Result<RunOutcome> {
        let job = self
            .jobs
            .get(name)
            .cloned()
            .ok_or_else(|| SchedulerError::JobNotFound {
                name: name.to_string(),
            })?;
        let now = self.clock.now();
        Ok(self.fire(&job, now, true).await)
    }

    /// Main event loop. Checks triggers every tick until `shutdown` broadcasts
    /// `true`, then waits for in-flight runs to finish.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        info!(instance = %self.instance_id, jobs = self.jobs.len(), "scheduler engine started");

        let mut in_flight = JoinSet::new();
        let mut interval = tokio::time::interval(self.tick_interval);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    for (job, scheduled_for) in self.due_jobs() {
                        let engine = Arc::clone(&self);
                        in_flight.spawn(async move {
                            engine.fire(&job, scheduled_for, false).await;
                        });
                    }
                    while in_flight.try_join_next().is_some() {}
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!(pending = in_flight.len(), "scheduler engine shutting down");
                        break;
                    }
                }
            }
        }
        while in_flight.join_next().await.is_some() {}
        info!("scheduler engine stopped");
    }

    /// Triggers whose next fire time has arrived. Advances each to its next
    /// instant after now; missed instants collapse into a single firing.
    fn due_jobs(&self) -> Vec<(Arc<RegisteredJob>, DateTime<Utc>)> {
        let now = self.clock.now();
        let mut due = Vec::new();
        for job in self.jobs.values() {
            let Ok(mut slot) = job.next_fire.lock() else {
                error!(job = %job.name, "next-fire slot poisoned");
                continue;
            };
            if let Some(at) = *slot {
                if at <= now {
                    *slot = job.schedule.next_after(now);
                    due.push((Arc::clone(job), at));
                }
            }
        }
        due
    }

    async fn fire(&self, job: &RegisteredJob, scheduled_for: DateTime<Utc>, manual: bool) -> RunOutcome {
        let started_at = self.clock.now();

        if job.running.swap(true, Ordering::AcqRel) {
            warn!(job = %job.name, "previous run still in progress, skipping");
            self.record(job, RunStatus::SkippedRunning, scheduled_for, started_at, None);
            return RunOutcome::skipped(RunStatus::SkippedRunning);
        }
        let _guard = RunningGuard(&job.running);

        match self
            .ledger
            .try_acquire(&job.name, &self.instance_id, started_at, self.lock_ttl)
        {
            Ok(true) => {}
            Ok(false) => {
                info!(job = %job.name, "lock held by another instance, skipping");
                self.record(job, RunStatus::SkippedLocked, scheduled_for, started_at, None);
                return RunOutcome::skipped(RunStatus::SkippedLocked);
            }
            Err(e) => {
                error!(job = %job.name, "lock acquisition failed: {e}");
                let detail = e.to_string();
                self.record(job, RunStatus::Failed, scheduled_for, started_at, Some(&detail));
                return RunOutcome {
                    status: RunStatus::Failed,
                    report: None,
                    error: Some(detail),
                };
            }
        }

        let ctx = JobContext {
            job: job.name.clone(),
            scheduled_for,
            started_at,
            manual,
        };
        info!(job = %job.name, manual, "job started");

        let handler = Arc::clone(&job.handler);
        let task_ctx = ctx.clone();
        let joined = tokio::spawn(async move { handler.run(&task_ctx).await }).await;

        let outcome = match joined {
            Ok(Ok(report)) => {
                info!(job = %job.name, %report, "job completed");
                RunOutcome {
                    status: RunStatus::Completed,
                    report: Some(report),
                    error: None,
                }
            }
            Ok(Err(e)) => {
                error!(job = %job.name, code = e.code(), "job failed: {e}");
                RunOutcome {
                    status: RunStatus::Failed,
                    report: None,
                    error: Some(e.to_string()),
                }
            }
            Err(join_err) => {
                let msg = if join_err.is_panic() {
                    "job panicked".to_string()
                } else {
                    format!("job aborted: {join_err}")
                };
                error!(job = %job.name, "{msg}");
                RunOutcome {
                    status: RunStatus::Failed,
                    report: None,
                    error: Some(msg),
                }
            }
        };

        if let Err(e) = self.ledger.release(&job.name, &self.instance_id) {
            error!(job = %job.name, "lock release failed: {e}");
        }

        let detail = match (&outcome.report, &outcome.error) {
            (Some(report), _) => serde_json::to_string(report).ok(),
            (None, Some(err)) => Some(err.clone()),
            (None, None) => None,
        };
        self.record(job, outcome.status, scheduled_for, started_at, detail.as_deref());
        outcome
    }

    fn record(
        &self,
        job: &RegisteredJob,
        status: RunStatus,
        scheduled_for: DateTime<Utc>,
        started_at: DateTime<Utc>,
        detail: Option<&str>,
    ) {
        let finished_at = self.clock.now();
        if let Err(e) = self.ledger.record_run(
            &job.name,
            &self.instance_id,
            status,
            scheduled_for,
            started_at,
            finished_at,
            detail,
        ) {
            error!(job = %job.name, "failed to record run: {e}");
        }
    }
}

fn next_fire_of(job: &RegisteredJob) -> Option<DateTime<Utc>> {
    job.next_fire.lock().ok().and_then(|slot| *slot)
}
