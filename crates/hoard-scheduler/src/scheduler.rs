//! Cron-driven dispatch of backup executions.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use hoard_backup::{BackupResult, BackupRunner, tmp_cleanup};
use hoard_config::{AppConfig, Plan};
use tokio::sync::{Mutex, RwLock, watch};
use tokio::task::JoinSet;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::{
    BackupJob, EntryKind, ExecutionRegistry, MAINTENANCE, Metrics, Notifier, ScheduleEntry,
    SchedulerError, Status, StatusStore, Trigger,
};

/// Minimum sleep duration between scheduler checks.
const MIN_SLEEP_SECS: u64 = 1;

/// Maximum sleep duration between scheduler checks.
const MAX_SLEEP_SECS: u64 = 60;

/// Collaborators shared by every execution.
pub struct JobContext {
    pub runner: Arc<dyn BackupRunner>,
    pub store: Arc<StatusStore>,
    pub notifier: Arc<dyn Notifier>,
    pub metrics: Arc<dyn Metrics>,
    pub app: Arc<AppConfig>,
}

/// The backup scheduler.
pub struct Scheduler {
    ctx: Arc<JobContext>,
    plans: Vec<Arc<Plan>>,
    entries: Arc<RwLock<Vec<ScheduleEntry>>>,
    registry: ExecutionRegistry,
    tasks: Mutex<JoinSet<()>>,
    accepting: AtomicBool,
}

impl Scheduler {
    /// Create a scheduler for `plans`. Nothing is scheduled until [`start`](Self::start).
    pub fn new(ctx: JobContext, plans: Vec<Plan>) -> Self {
        Self {
            ctx: Arc::new(ctx),
            plans: plans.into_iter().map(Arc::new).collect(),
            entries: Arc::new(RwLock::new(Vec::new())),
            registry: ExecutionRegistry::new(),
            tasks: Mutex::new(JoinSet::new()),
            accepting: AtomicBool::new(true),
        }
    }

    /// Parse every plan's schedule and record the initial next runs.
    ///
    /// Fails on the first invalid cron expression.
    pub async fn start(&self) -> Result<(), SchedulerError> {
        self.start_at(Utc::now()).await
    }

    #[tracing::instrument(skip(self))]
    async fn start_at(&self, now: DateTime<Utc>) -> Result<(), SchedulerError> {
        let mut entries = Vec::with_capacity(self.plans.len() + 1);
        for plan in &self.plans {
            let entry = ScheduleEntry::backup(Arc::clone(plan), now)?;
            info!(
                plan = %plan.name,
                cron = %plan.scheduler.cron,
                next_run = ?entry.next_run,
                "scheduled plan"
            );
            entries.push(entry);
        }
        entries.push(ScheduleEntry::maintenance(now)?);

        let next_runs = next_run_snapshot(&entries);
        *self.entries.write().await = entries;
        self.ctx.store.sync(&next_runs).await?;

        info!(plans = self.plans.len(), "scheduler started");
        Ok(())
    }

    pub fn plans(&self) -> &[Arc<Plan>] {
        &self.plans
    }

    pub fn registry(&self) -> &ExecutionRegistry {
        &self.registry
    }

    /// Persisted status of every plan.
    pub async fn status(&self) -> Vec<Status> {
        self.ctx.store.list().await
    }

    /// Run the scheduler loop until shutdown, then wait for in-flight executions.
    pub async fn run(&self, mut shutdown_rx: watch::Receiver<bool>) {
        info!("scheduler starting");

        loop {
            // Check for shutdown
            if *shutdown_rx.borrow() {
                info!("scheduler shutting down");
                break;
            }

            self.dispatch_due_at(Utc::now()).await;
            self.reap().await;

            let sleep_duration = self.calculate_sleep_duration().await;
            debug!(secs = sleep_duration.as_secs(), "scheduler sleeping");

            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("scheduler received shutdown signal");
                    }
                }
                _ = sleep(sleep_duration) => {}
            }
        }

        self.shutdown().await;
        info!("scheduler shut down gracefully");
    }

    /// Stop accepting executions and wait for those in flight.
    pub async fn shutdown(&self) {
        self.accepting.store(false, Ordering::SeqCst);
        let in_flight = self.registry.running();
        if !in_flight.is_empty() {
            info!(count = in_flight.len(), "waiting for in-flight executions");
        }
        self.join_all().await;
    }

    /// Start every entry due at `now`. Returns the names of entries started.
    pub async fn dispatch_due_at(&self, now: DateTime<Utc>) -> Vec<String> {
        if !self.accepting.load(Ordering::SeqCst) {
            return Vec::new();
        }

        let (due, next_runs) = {
            let mut entries = self.entries.write().await;
            let due: Vec<EntryKind> = entries
                .iter_mut()
                .filter(|e| e.is_due(now))
                .map(|e| {
                    e.advance(now);
                    e.kind.clone()
                })
                .collect();
            (due, next_run_snapshot(&entries))
        };

        if !due.is_empty() {
            if let Err(e) = self.ctx.store.sync(&next_runs).await {
                error!(error = %e, "failed to record next runs");
            }
        }

        let mut started = Vec::new();
        let mut tasks = self.tasks.lock().await;
        for kind in due {
            match kind {
                EntryKind::Backup(plan) => {
                    let Some(guard) = self.registry.try_claim(&plan.name) else {
                        warn!(plan = %plan.name, "previous execution still running, skipping tick");
                        continue;
                    };
                    started.push(plan.name.clone());
                    let ctx = Arc::clone(&self.ctx);
                    let entries = Arc::clone(&self.entries);
                    let job = BackupJob {
                        plan,
                        trigger: Trigger::Scheduled,
                    };
                    tasks.spawn(async move {
                        let _guard = guard;
                        run_job(&ctx, &entries, job).await;
                    });
                }
                EntryKind::Maintenance => {
                    started.push(MAINTENANCE.to_string());
                    let app = Arc::clone(&self.ctx.app);
                    tasks.spawn(async move {
                        if let Err(e) = tmp_cleanup(&app).await {
                            error!(error = %e, "tmp cleanup failed");
                        }
                    });
                }
            }
        }
        started
    }

    /// Run `plan` now and wait for the result.
    #[tracing::instrument(skip(self))]
    pub async fn trigger_on_demand(&self, plan: &str) -> Result<BackupResult, SchedulerError> {
        if !self.accepting.load(Ordering::SeqCst) {
            return Err(SchedulerError::ShuttingDown);
        }
        let plan = self
            .plans
            .iter()
            .find(|p| p.name == plan)
            .cloned()
            .ok_or_else(|| SchedulerError::PlanNotFound(plan.to_string()))?;
        let _guard = self
            .registry
            .try_claim(&plan.name)
            .ok_or_else(|| SchedulerError::PlanBusy(plan.name.clone()))?;

        let job = BackupJob {
            plan,
            trigger: Trigger::OnDemand,
        };
        Ok(run_job(&self.ctx, &self.entries, job).await)
    }

    /// Calculate how long to sleep until the next entry is due.
    pub async fn calculate_sleep_duration(&self) -> std::time::Duration {
        let entries = self.entries.read().await;
        let next_due = entries.iter().filter_map(|e| e.next_run).min();
        sleep_duration(next_due, Utc::now())
    }

    async fn reap(&self) {
        let mut tasks = self.tasks.lock().await;
        while let Some(result) = tasks.try_join_next() {
            if let Err(e) = result {
                error!(error = %e, "execution task failed");
            }
        }
    }

    async fn join_all(&self) {
        let mut tasks = self.tasks.lock().await;
        while let Some(result) = tasks.join_next().await {
            if let Err(e) = result {
                error!(error = %e, "execution task failed");
            }
        }
    }
}

/// Next run of every backup entry, keyed by plan name.
fn next_run_snapshot(entries: &[ScheduleEntry]) -> Vec<(String, Option<DateTime<Utc>>)> {
    entries
        .iter()
        .filter_map(|e| e.plan().map(|p| (p.name.clone(), e.next_run)))
        .collect()
}

/// Time until `next_due`, rounded up to whole seconds and bounded to
/// [`MIN_SLEEP_SECS`, `MAX_SLEEP_SECS`].
fn sleep_duration(next_due: Option<DateTime<Utc>>, now: DateTime<Utc>) -> std::time::Duration {
    let secs = match next_due {
        Some(next) => {
            let millis = (next - now).num_milliseconds();
            let diff = millis.div_euclid(1000) + i64::from(millis.rem_euclid(1000) > 0);
            (diff.max(MIN_SLEEP_SECS as i64) as u64).min(MAX_SLEEP_SECS)
        }
        None => MAX_SLEEP_SECS,
    };
    std::time::Duration::from_secs(secs)
}

/// Execute one job and record its outcome.
///
/// The status row is written first, then the notification is sent, then
/// metrics are recorded. Store and notifier failures are logged only.
#[tracing::instrument(skip_all, fields(plan = %job.plan.name, trigger = ?job.trigger))]
pub async fn run_job(
    ctx: &JobContext,
    entries: &RwLock<Vec<ScheduleEntry>>,
    job: BackupJob,
) -> BackupResult {
    info!(plan = %job.plan.name, trigger = ?job.trigger, "backup started");
    let result = ctx.runner.run(&job.plan).await;

    if let Some(failure) = &result.failure {
        error!(
            plan = %result.plan,
            stage = %failure.stage,
            error = %failure.message,
            "backup failed"
        );
    } else {
        info!(
            plan = %result.plan,
            archive = %result.name,
            size = result.size,
            duration_secs = result.duration.as_secs_f64(),
            "backup finished"
        );
    }

    let scheduled = entries
        .read()
        .await
        .iter()
        .find(|e| e.plan().is_some_and(|p| p.name == job.plan.name))
        .map(|e| e.next_run);
    // No entry before start(); the stored row may be stale.
    let next_run = match scheduled {
        Some(next_run) => next_run,
        None => match ScheduleEntry::backup(Arc::clone(&job.plan), Utc::now()) {
            Ok(entry) => entry.next_run,
            Err(e) => {
                warn!(plan = %job.plan.name, error = %e, "cannot compute next run");
                ctx.store.get(&job.plan.name).await.and_then(|s| s.next_run)
            }
        },
    };

    if let Err(e) = ctx.store.put(Status::from_result(&result, next_run)).await {
        error!(plan = %result.plan, error = %e, "failed to record status");
    }

    let subject = job.subject(&result);
    if let Err(e) = ctx
        .notifier
        .send(&job.plan, &subject, &result.log_line(), !result.is_success())
        .await
    {
        warn!(plan = %result.plan, error = %e, "notification failed");
    }

    ctx.metrics.record_execution(
        &result.plan,
        result.status,
        result.size,
        result.duration.as_secs_f64(),
    );

    result
}
