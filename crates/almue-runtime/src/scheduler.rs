//! Daily jobs on the Tokio runtime.
//!
//! Every [`TokioScheduler::schedule_daily`] call spawns one task that sleeps
//! until the next local occurrence of the requested time of day, checks its
//! cancellation flag, fires the job and goes back to sleep.  A job is never
//! fired on the day it is created if that time has already passed, nor
//! immediately when the time equals "now".

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use almue_types::{AlmueError, Job, JobHandle, Scheduler};
use chrono::{DateTime, Local, NaiveTime, TimeZone};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// [`Scheduler`] backed by `tokio::time::sleep`, in the host's local time
/// zone.
#[derive(Debug, Clone)]
pub struct TokioScheduler {
    runtime: Handle,
}

impl TokioScheduler {
    /// Bind to the runtime the caller is running on.
    ///
    /// # Errors
    ///
    /// Returns [`AlmueError::Runtime`] outside a Tokio runtime.
    pub fn new() -> Result<Self, AlmueError> {
        let runtime = Handle::try_current().map_err(|e| AlmueError::Runtime(e.to_string()))?;
        Ok(Self { runtime })
    }

    /// Bind to an explicit runtime handle.
    pub fn with_handle(runtime: Handle) -> Self {
        Self { runtime }
    }
}

impl Scheduler for TokioScheduler {
    fn schedule_daily(
        &self,
        hour: u32,
        minute: u32,
        job: Job,
    ) -> Result<Box<dyn JobHandle>, AlmueError> {
        let at = NaiveTime::from_hms_opt(hour, minute, 0)
            .ok_or_else(|| AlmueError::Schedule(format!("invalid time of day {hour:02}:{minute:02}")))?;

        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cancelled);
        let task = self.runtime.spawn(async move {
            loop {
                let now = Local::now();
                let Some(delay) = delay_until(&now, at) else {
                    warn!(%at, "no upcoming local occurrence; daily job ends");
                    return;
                };
                tokio::time::sleep(delay).await;
                if flag.load(Ordering::Acquire) {
                    return;
                }
                debug!(%at, "daily job firing");
                job();
            }
        });

        debug!(hour, minute, "daily job scheduled");
        Ok(Box::new(TokioJobHandle { cancelled, task }))
    }
}

/// Handle returned by [`TokioScheduler`].  Dropping it does not cancel the
/// job; call [`JobHandle::cancel`].
pub struct TokioJobHandle {
    cancelled: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl TokioJobHandle {
    /// Whether [`cancel`][JobHandle::cancel] has been called.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

impl JobHandle for TokioJobHandle {
    fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
        self.task.abort();
    }
}

/// The first instant strictly after `now` whose local wall-clock time is
/// `at`.  Nonexistent local times (DST gaps) move on to the next day;
/// ambiguous ones resolve to the earlier instant.
pub fn next_occurrence<Tz: TimeZone>(now: &DateTime<Tz>, at: NaiveTime) -> Option<DateTime<Tz>> {
    let tz = now.timezone();
    let mut date = now.date_naive();
    for _ in 0..3 {
        if let Some(candidate) = tz.from_local_datetime(&date.and_time(at)).earliest()
            && candidate > *now
        {
            return Some(candidate);
        }
        date = date.succ_opt()?;
    }
    None
}

fn delay_until<Tz: TimeZone>(now: &DateTime<Tz>, at: NaiveTime) -> Option<std::time::Duration> {
    let next = next_occurrence(now, at)?;
    next.signed_duration_since(now.clone()).to_std().ok()
}
