//! One-shot job scheduling and the daily usage rollover.
//!
//! The rollover does not re-arm a timer from inside its own callback.
//! Instead it is expressed against the [`Scheduler`] port (schedule once,
//! cancel) and [`DayRollover`] owns the re-arming. In production the port is
//! backed by tokio timers; tests drive it with a virtual clock.

use std::collections::HashMap;
use std::sync::{
    Arc, Mutex, MutexGuard, PoisonError,
    atomic::{AtomicU64, Ordering},
};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt};
use tokio::task::AbortHandle;

use crate::services::{clock::Clock, usage_tracker::UsageTracker};

/// Work to run when a scheduled time is reached.
pub type Job = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JobId(u64);

pub trait Scheduler: Send + Sync {
    /// Run `job` once at (or as soon as possible after) `at`.
    fn schedule_once(&self, at: DateTime<Utc>, job: Job) -> JobId;

    /// Cancel a pending job. Returns `false` if it already ran or is unknown.
    fn cancel(&self, id: JobId) -> bool;
}

/// Scheduler backed by spawned tokio tasks.
///
/// The delay is computed from the clock at scheduling time and then slept
/// on the runtime's monotonic timer.
pub struct TokioScheduler {
    clock: Arc<dyn Clock>,
    next_id: AtomicU64,
    jobs: Arc<JobRegistry>,
}

impl TokioScheduler {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            next_id: AtomicU64::new(1),
            jobs: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

type JobRegistry = Mutex<HashMap<JobId, AbortHandle>>;

fn lock_jobs(jobs: &JobRegistry) -> MutexGuard<'_, HashMap<JobId, AbortHandle>> {
    jobs.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Scheduler for TokioScheduler {
    fn schedule_once(&self, at: DateTime<Utc>, job: Job) -> JobId {
        let id = JobId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let delay = (at - self.clock.now()).to_std().unwrap_or(Duration::ZERO);

        // Hold the map while spawning so the task cannot remove its entry
        // before it was inserted
        let mut jobs = lock_jobs(&self.jobs);
        let registry = Arc::clone(&self.jobs);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            lock_jobs(&registry).remove(&id);
            job().await;
        });
        jobs.insert(id, handle.abort_handle());

        id
    }

    fn cancel(&self, id: JobId) -> bool {
        match lock_jobs(&self.jobs).remove(&id) {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }
}

/// Resets daily usage at every reference-timezone midnight.
///
/// The first reset is armed at the next midnight after `start`. Each reset
/// schedules the following one exactly 24 hours after its own due time,
/// without re-deriving midnight (the offset is fixed, so the two agree).
pub struct DayRollover {
    tracker: Arc<UsageTracker>,
    scheduler: Arc<dyn Scheduler>,
    pending: Mutex<Option<JobId>>,
}

impl DayRollover {
    pub fn new(tracker: Arc<UsageTracker>, scheduler: Arc<dyn Scheduler>) -> Arc<Self> {
        Arc::new(Self {
            tracker,
            scheduler,
            pending: Mutex::new(None),
        })
    }

    /// Arm the next rollover, replacing any pending one. Returns its due time.
    pub fn start(self: &Arc<Self>) -> DateTime<Utc> {
        self.stop();

        let at = self.tracker.next_rollover_at();
        self.arm(at);
        tracing::info!(next_rollover = %at, "API key usage reset scheduled");

        at
    }

    /// Cancel the pending rollover, if any.
    pub fn stop(&self) {
        if let Some(id) = self.pending().take() {
            self.scheduler.cancel(id);
        }
    }

    fn arm(self: &Arc<Self>, at: DateTime<Utc>) {
        let this = Arc::clone(self);
        let id = self
            .scheduler
            .schedule_once(at, Box::new(move || this.fire(at).boxed()));
        *self.pending() = Some(id);
    }

    async fn fire(self: Arc<Self>, due: DateTime<Utc>) {
        self.pending().take();

        self.tracker.roll_over().await;

        let next = due + chrono::Duration::hours(24);
        self.arm(next);
        tracing::info!(next_rollover = %next, "API key usage reset, next reset scheduled");
    }

    fn pending(&self) -> MutexGuard<'_, Option<JobId>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
pub use manual::ManualScheduler;

#[cfg(test)]
mod manual {
    use std::sync::{
        Arc, Mutex,
        atomic::{AtomicU64, Ordering},
    };

    use chrono::{DateTime, Utc};

    use super::{Job, JobId, Scheduler};
    use crate::services::clock::ManualClock;

    /// Scheduler on virtual time: jobs run only inside [`advance_to`].
    ///
    /// [`advance_to`]: ManualScheduler::advance_to
    pub struct ManualScheduler {
        clock: Arc<ManualClock>,
        next_id: AtomicU64,
        pending: Mutex<Vec<(DateTime<Utc>, JobId, Job)>>,
    }

    impl ManualScheduler {
        pub fn new(clock: Arc<ManualClock>) -> Self {
            Self {
                clock,
                next_id: AtomicU64::new(1),
                pending: Mutex::new(Vec::new()),
            }
        }

        pub fn pending_times(&self) -> Vec<DateTime<Utc>> {
            let mut times: Vec<_> = self
                .pending
                .lock()
                .unwrap()
                .iter()
                .map(|(at, _, _)| *at)
                .collect();
            times.sort();
            times
        }

        /// Move the clock to `target`, running due jobs in time order with
        /// the clock set to each job's due time. Jobs scheduled by those jobs
        /// run too if they fall before `target`.
        pub async fn advance_to(&self, target: DateTime<Utc>) {
            loop {
                let due = {
                    let mut pending = self.pending.lock().unwrap();
                    let next = pending
                        .iter()
                        .enumerate()
                        .filter(|(_, (at, _, _))| *at <= target)
                        .min_by_key(|(_, (at, _, _))| *at)
                        .map(|(index, _)| index);
                    next.map(|index| pending.remove(index))
                };

                match due {
                    Some((at, _, job)) => {
                        self.clock.set(at);
                        job().await;
                    }
                    None => break,
                }
            }
            self.clock.set(target);
        }
    }

    impl Scheduler for ManualScheduler {
        fn schedule_once(&self, at: DateTime<Utc>, job: Job) -> JobId {
            let id = JobId(self.next_id.fetch_add(1, Ordering::Relaxed));
            self.pending.lock().unwrap().push((at, id, job));
            id
        }

        fn cancel(&self, id: JobId) -> bool {
            let mut pending = self.pending.lock().unwrap();
            let before = pending.len();
            pending.retain(|(_, job_id, _)| *job_id != id);
            pending.len() != before
        }
    }
}
