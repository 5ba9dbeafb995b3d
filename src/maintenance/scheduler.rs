use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use crate::core::config::OverlapPolicy;
use crate::core::error::Result;

/// Periodic bulk jobs the manager runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MaintenanceTask {
    Sync,
    Backup,
    Optimize,
    Compact,
    Validate,
}

impl MaintenanceTask {
    pub const ALL: [MaintenanceTask; 5] = [
        MaintenanceTask::Sync,
        MaintenanceTask::Backup,
        MaintenanceTask::Optimize,
        MaintenanceTask::Compact,
        MaintenanceTask::Validate,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            MaintenanceTask::Sync => "sync",
            MaintenanceTask::Backup => "backup",
            MaintenanceTask::Optimize => "optimize",
            MaintenanceTask::Compact => "compact",
            MaintenanceTask::Validate => "validate",
        }
    }
}

impl fmt::Display for MaintenanceTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.name())
    }
}

pub type JobFuture = Pin<Box<dyn Future<Output = Result<()>> + Send>>;

/// Runs one pass of a task. Called once per accepted tick.
pub type JobFn = Arc<dyn Fn(MaintenanceTask) -> JobFuture + Send + Sync>;

/// Per-task counters
#[derive(Debug, Clone, Serialize)]
pub struct TaskStats {
    pub task: MaintenanceTask,
    pub interval_ms: u64,
    pub policy: OverlapPolicy,
    pub runs: u64,
    pub skipped_overlaps: u64,
    pub failures: u64,
    pub last_run: Option<DateTime<Utc>>,
    pub last_duration_ms: u64,
    pub last_error: Option<String>,
    pub in_flight: usize,
}

struct TaskState {
    task: MaintenanceTask,
    interval: Duration,
    policy: OverlapPolicy,
    runs: AtomicU64,
    skipped: AtomicU64,
    failures: AtomicU64,
    in_flight: AtomicUsize,
    last_duration_ms: AtomicU64,
    last_run: Mutex<Option<DateTime<Utc>>>,
    last_error: Mutex<Option<String>>,
}

impl TaskState {
    fn new(task: MaintenanceTask, interval: Duration, policy: OverlapPolicy) -> Self {
        TaskState {
            task,
            interval,
            policy,
            runs: AtomicU64::new(0),
            skipped: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            in_flight: AtomicUsize::new(0),
            last_duration_ms: AtomicU64::new(0),
            last_run: Mutex::new(None),
            last_error: Mutex::new(None),
        }
    }

    /// Claim a run slot. Under `Skip` only one run may be in flight.
    fn try_begin(&self) -> bool {
        match self.policy {
            OverlapPolicy::Skip => self
                .in_flight
                .compare_exchange(0, 1, Ordering::AcqRel, Ordering::Acquire)
                .is_ok(),
            OverlapPolicy::Allow => {
                self.in_flight.fetch_add(1, Ordering::AcqRel);
                true
            }
        }
    }

    fn finish(&self, started: Instant, result: &Result<()>) {
        self.runs.fetch_add(1, Ordering::Relaxed);
        self.last_duration_ms
            .store(started.elapsed().as_millis() as u64, Ordering::Relaxed);
        *self.last_run.lock() = Some(Utc::now());

        match result {
            Ok(()) => *self.last_error.lock() = None,
            Err(e) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                *self.last_error.lock() = Some(e.to_string());
            }
        }
        self.in_flight.fetch_sub(1, Ordering::AcqRel);
    }

    fn stats(&self) -> TaskStats {
        TaskStats {
            task: self.task,
            interval_ms: self.interval.as_millis() as u64,
            policy: self.policy,
            runs: self.runs.load(Ordering::Relaxed),
            skipped_overlaps: self.skipped.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            last_run: *self.last_run.lock(),
            last_duration_ms: self.last_duration_ms.load(Ordering::Relaxed),
            last_error: self.last_error.lock().clone(),
            in_flight: self.in_flight.load(Ordering::Relaxed),
        }
    }
}

/// One tokio interval loop per enabled task, all stopped by a shared token.
pub struct MaintenanceScheduler {
    cancel: CancellationToken,
    tasks: Vec<Arc<TaskState>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl MaintenanceScheduler {
    /// Spawn the loops. Must be called inside a tokio runtime.
    ///
    /// The first tick of each task fires one full interval after start.
    pub fn start(
        schedule: &[(MaintenanceTask, Duration)],
        policy: OverlapPolicy,
        cancel: CancellationToken,
        job: JobFn,
    ) -> Self {
        let mut tasks = Vec::with_capacity(schedule.len());
        let mut handles = Vec::with_capacity(schedule.len());

        for &(task, period) in schedule {
            if period.is_zero() {
                continue;
            }
            let state = Arc::new(TaskState::new(task, period, policy));
            handles.push(tokio::spawn(Self::run_loop(
                state.clone(),
                cancel.clone(),
                job.clone(),
            )));
            tasks.push(state);
            debug!(%task, interval_ms = period.as_millis() as u64, "maintenance task scheduled");
        }

        MaintenanceScheduler {
            cancel,
            tasks,
            handles: Mutex::new(handles),
        }
    }

    async fn run_loop(state: Arc<TaskState>, cancel: CancellationToken, job: JobFn) {
        let mut ticker = tokio::time::interval_at(Instant::now() + state.interval, state.interval);
        // Don't burst ticks if a run falls behind
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            if !state.try_begin() {
                state.skipped.fetch_add(1, Ordering::Relaxed);
                debug!(task = %state.task, "tick skipped, previous run still in flight");
                continue;
            }

            let state = state.clone();
            let job = job.clone();
            tokio::spawn(async move {
                let started = Instant::now();
                let result = job(state.task).await;
                if let Err(e) = &result {
                    warn!(task = %state.task, error = %e, "maintenance run failed");
                }
                state.finish(started, &result);
            });
        }

        debug!(task = %state.task, "maintenance loop stopped");
    }

    pub fn stats(&self) -> Vec<TaskStats> {
        self.tasks.iter().map(|t| t.stats()).collect()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Cancel the token and wait for every loop to exit. Runs already
    /// spawned finish on their own.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let handles: Vec<_> = self.handles.lock().drain(..).collect();
        for handle in handles {
            let _ = handle.await;
        }
    }
}

impl Drop for MaintenanceScheduler {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::Error;

    fn counting_job(counter: Arc<AtomicU64>, delay: Duration) -> JobFn {
        Arc::new(move |_task: MaintenanceTask| -> JobFuture {
            let counter = counter.clone();
            Box::pin(async move {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        })
    }

    #[tokio::test(start_paused = true)]
    async fn first_tick_waits_one_interval() {
        let counter = Arc::new(AtomicU64::new(0));
        let scheduler = MaintenanceScheduler::start(
            &[(MaintenanceTask::Compact, Duration::from_millis(100))],
            OverlapPolicy::Skip,
            CancellationToken::new(),
            counting_job(counter.clone(), Duration::ZERO),
        );

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(260)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 3);
        scheduler.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn zero_interval_disables_task() {
        let scheduler = MaintenanceScheduler::start(
            &[
                (MaintenanceTask::Sync, Duration::ZERO),
                (MaintenanceTask::Backup, Duration::from_secs(1)),
            ],
            OverlapPolicy::Skip,
            CancellationToken::new(),
            counting_job(Arc::new(AtomicU64::new(0)), Duration::ZERO),
        );
        let tasks: Vec<_> = scheduler.stats().into_iter().map(|s| s.task).collect();
        assert_eq!(tasks, vec![MaintenanceTask::Backup]);
        scheduler.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn skip_policy_counts_overlaps() {
        let counter = Arc::new(AtomicU64::new(0));
        let scheduler = MaintenanceScheduler::start(
            &[(MaintenanceTask::Validate, Duration::from_millis(10))],
            OverlapPolicy::Skip,
            CancellationToken::new(),
            counting_job(counter.clone(), Duration::from_millis(35)),
        );

        tokio::time::sleep(Duration::from_millis(100)).await;
        let stats = scheduler.stats().remove(0);
        assert!(stats.skipped_overlaps > 0);
        assert!(stats.in_flight <= 1);
        scheduler.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn failures_are_recorded() {
        let job: JobFn = Arc::new(|_task: MaintenanceTask| -> JobFuture {
            Box::pin(async { Err(Error::invalid_state("nothing to do")) })
        });
        let scheduler = MaintenanceScheduler::start(
            &[(MaintenanceTask::Optimize, Duration::from_millis(10))],
            OverlapPolicy::Allow,
            CancellationToken::new(),
            job,
        );

        tokio::time::sleep(Duration::from_millis(25)).await;
        let stats = scheduler.stats().remove(0);
        assert_eq!(stats.failures, stats.runs);
        assert!(stats.failures >= 1);
        assert!(stats.last_error.as_deref().unwrap().contains("nothing to do"));
        scheduler.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn no_runs_after_shutdown() {
        let counter = Arc::new(AtomicU64::new(0));
        let scheduler = MaintenanceScheduler::start(
            &[(MaintenanceTask::Compact, Duration::from_millis(10))],
            OverlapPolicy::Skip,
            CancellationToken::new(),
            counting_job(counter.clone(), Duration::ZERO),
        );

        tokio::time::sleep(Duration::from_millis(35)).await;
        scheduler.shutdown().await;
        let seen = counter.load(Ordering::SeqCst);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(counter.load(Ordering::SeqCst), seen);
        assert!(scheduler.is_cancelled());
    }
}
