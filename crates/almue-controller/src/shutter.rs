//! Shutter actuator: two output lines, an estimated opening and at most one
//! running drive.
//!
//! A full traversal takes `complete_way` and is tracked in
//! [`STEPS`] steps of 5 points.  Driving towards an end position the
//! shutter already believes it is at becomes a reference drive instead: a
//! single timer for the full duration that re-synchronises the estimate
//! with the physical end stop and reports no percentages.
//!
//! All mutation happens under one mutex.  Every drive carries the
//! generation number it was started with; cancelling bumps the generation,
//! so a tick or timer that was already waiting on the lock sees the
//! mismatch and does nothing.
//!
//! State-store reports are queued under the mutex and written after it is
//! released.  A second, reporting-only lock keeps them in order.
//!
//! Once unregistered or retired a shutter refuses every command with
//! [`AlmueError::NotRegistered`], so a caller still holding the `Arc` can
//! neither drive it nor give it new daily jobs.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use almue_hal::{Level, Pin};
use almue_types::{AlmueError, DeviceId, DeviceKind, ShutterDescriptor, ShutterState, StateStore};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{Instant, interval_at, sleep_until};
use tracing::{debug, error, info, warn};

use crate::jobs::DailyJobs;

/// Ticks in a full traversal.
pub(crate) const STEPS: u32 = 20;

const STEP: u8 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Opening,
    Closing,
}

impl Direction {
    fn phase(self) -> ShutterState {
        match self {
            Direction::Opening => ShutterState::Opening,
            Direction::Closing => ShutterState::Closing,
        }
    }

    fn end_position(self) -> u8 {
        match self {
            Direction::Opening => 100,
            Direction::Closing => 0,
        }
    }

    fn advance(self, percent: u8) -> u8 {
        match self {
            Direction::Opening => percent.saturating_add(STEP).min(100),
            Direction::Closing => percent.saturating_sub(STEP),
        }
    }
}

/// The single timer or ticker of a shutter.
enum Motion {
    Reference(JoinHandle<()>),
    Tracking(JoinHandle<()>),
}

impl Motion {
    fn abort(self) {
        match self {
            Motion::Reference(task) | Motion::Tracking(task) => task.abort(),
        }
    }
}

/// A queued state-store notification.
enum Report {
    State(ShutterState),
    Opening(u8),
}

/// Which background drive, if any, a shutter is running.
#[cfg(test)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MotionKind {
    Idle,
    Timer,
    Ticker,
}

/// Clamp a stored opening into range and snap it to the 5-point grid.
pub(crate) fn seed_opening(percent: u8) -> u8 {
    let percent = percent.min(100);
    (percent + STEP / 2) / STEP * STEP
}

/// The opposite line always goes low before the driving line goes high.
fn switch_lines(inner: &mut ShutterInner, direction: Direction) -> Result<(), AlmueError> {
    let (idle, driving) = match direction {
        Direction::Opening => (&mut inner.close_pin, &mut inner.open_pin),
        Direction::Closing => (&mut inner.open_pin, &mut inner.close_pin),
    };
    idle.set_level(Level::Low)?;
    driving.set_level(Level::High)
}

struct ShutterInner {
    open_pin: Box<dyn Pin>,
    close_pin: Box<dyn Pin>,
    complete_way: Duration,
    opening_in_prc: u8,
    phase: ShutterState,
    motion: Option<Motion>,
    generation: u64,
    jobs: DailyJobs,
    retired: bool,
    reports: Vec<Report>,
}

pub(crate) struct Shutter {
    id: DeviceId,
    label: String,
    runtime: Handle,
    store: Arc<dyn StateStore>,
    this: Weak<Shutter>,
    inner: Mutex<ShutterInner>,
    reporting: Mutex<()>,
}

impl Shutter {
    pub(crate) fn new(
        descriptor: &ShutterDescriptor,
        open_pin: Box<dyn Pin>,
        close_pin: Box<dyn Pin>,
        runtime: Handle,
        store: Arc<dyn StateStore>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            id: descriptor.id,
            label: descriptor.description.clone(),
            runtime,
            store,
            this: this.clone(),
            inner: Mutex::new(ShutterInner {
                open_pin,
                close_pin,
                complete_way: descriptor.complete_way(),
                opening_in_prc: seed_opening(descriptor.opening_in_prc),
                phase: ShutterState::Stopped,
                motion: None,
                generation: 0,
                jobs: DailyJobs::default(),
                retired: false,
                reports: Vec::new(),
            }),
            reporting: Mutex::new(()),
        })
    }

    fn lock(&self) -> MutexGuard<'_, ShutterInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Lock for a command.  A retired shutter accepts none.
    fn lock_active(&self) -> Result<MutexGuard<'_, ShutterInner>, AlmueError> {
        let inner = self.lock();
        if inner.retired {
            return Err(AlmueError::NotRegistered {
                kind: DeviceKind::Shutter,
                id: self.id,
            });
        }
        Ok(inner)
    }

    /// Release the actuator lock, then send the queued reports.  The
    /// reporting lock is taken before the actuator lock is dropped.
    fn release(&self, mut inner: MutexGuard<'_, ShutterInner>) {
        if inner.reports.is_empty() {
            return;
        }
        let reports = std::mem::take(&mut inner.reports);
        let _ordered = self.reporting.lock().unwrap_or_else(PoisonError::into_inner);
        drop(inner);

        for report in reports {
            let recorded = match report {
                Report::State(state) => self.store.update_shutter_state(self.id, state),
                Report::Opening(percent) => self.store.update_shutter_opening(self.id, percent),
            };
            if let Err(e) = recorded {
                warn!(shutter = self.id, error = %e, "failed to record shutter state");
            }
        }
    }

    // ── Drives ──────────────────────────────────────────────────────────────

    pub(crate) fn open(&self) -> Result<(), AlmueError> {
        self.drive(Direction::Opening)
    }

    pub(crate) fn close(&self) -> Result<(), AlmueError> {
        self.drive(Direction::Closing)
    }

    /// Cancel any drive, pull both lines low and report `stopped`.
    /// Idempotent.
    pub(crate) fn stop(&self) -> Result<(), AlmueError> {
        let mut inner = self.lock_active()?;
        let stopped = self.stop_locked(&mut inner);
        self.release(inner);
        stopped
    }

    fn drive(&self, direction: Direction) -> Result<(), AlmueError> {
        let mut inner = self.lock_active()?;
        let driven = self.drive_locked(&mut inner, direction);
        self.release(inner);
        driven
    }

    fn drive_locked(&self, inner: &mut ShutterInner, direction: Direction) -> Result<(), AlmueError> {
        self.halt(inner);

        if let Err(e) = switch_lines(inner, direction) {
            if let Err(release) = self.stop_locked(inner) {
                warn!(shutter = self.id, error = %release, "could not release lines after failed drive");
            }
            return Err(e);
        }

        if inner.opening_in_prc == direction.end_position() {
            self.start_reference(inner);
        } else {
            self.start_tracking(inner, direction);
        }
        Ok(())
    }

    fn stop_locked(&self, inner: &mut ShutterInner) -> Result<(), AlmueError> {
        self.halt(inner);
        let open = inner.open_pin.set_level(Level::Low);
        let close = inner.close_pin.set_level(Level::Low);
        open.and(close)?;
        self.set_phase(inner, ShutterState::Stopped);
        Ok(())
    }

    /// Cancel the running drive.  No tick or timer of it fires afterwards.
    fn halt(&self, inner: &mut ShutterInner) {
        inner.generation = inner.generation.wrapping_add(1);
        if let Some(motion) = inner.motion.take() {
            motion.abort();
            debug!(shutter = self.id, "running drive cancelled");
        }
    }

    fn start_reference(&self, inner: &mut ShutterInner) {
        let generation = inner.generation;
        let deadline = Instant::now() + inner.complete_way;
        self.set_phase(inner, ShutterState::Referencing);

        let this = self.this.clone();
        let task = self.runtime.spawn(async move {
            sleep_until(deadline).await;
            if let Some(shutter) = this.upgrade() {
                shutter.finish_reference(generation);
            }
        });
        inner.motion = Some(Motion::Reference(task));
    }

    fn finish_reference(&self, generation: u64) {
        let mut inner = self.lock();
        if inner.generation != generation {
            return;
        }
        if let Err(e) = self.stop_locked(&mut inner) {
            error!(shutter = self.id, error = %e, "failed to stop shutter after reference drive");
        }
        self.release(inner);
    }

    fn start_tracking(&self, inner: &mut ShutterInner, direction: Direction) {
        let generation = inner.generation;
        let period = inner.complete_way / STEPS;
        let first_tick = Instant::now() + period;
        self.set_phase(inner, direction.phase());

        let this = self.this.clone();
        let task = self.runtime.spawn(async move {
            let mut ticker = interval_at(first_tick, period);
            loop {
                ticker.tick().await;
                let Some(shutter) = this.upgrade() else {
                    return;
                };
                if !shutter.step(generation, direction) {
                    return;
                }
            }
        });
        inner.motion = Some(Motion::Tracking(task));
    }

    /// One tick of a tracked drive.  Returns `false` once the drive is over.
    fn step(&self, generation: u64, direction: Direction) -> bool {
        let mut inner = self.lock();
        if inner.generation != generation {
            return false;
        }

        inner.opening_in_prc = direction.advance(inner.opening_in_prc);
        let percent = inner.opening_in_prc;
        debug!(shutter = self.id, percent, "shutter position tick");
        inner.reports.push(Report::Opening(percent));

        let running = percent != direction.end_position();
        if !running && let Err(e) = self.stop_locked(&mut inner) {
            error!(shutter = self.id, error = %e, "failed to stop shutter at end position");
        }
        self.release(inner);
        running
    }

    fn set_phase(&self, inner: &mut ShutterInner, phase: ShutterState) {
        inner.phase = phase;
        info!(shutter = self.id, device = %self.label, state = %phase, "shutter state changed");
        inner.reports.push(Report::State(phase));
    }

    // ── Reconfiguration ─────────────────────────────────────────────────────

    /// Stop, then swap in the replacement line(s).  The lines are swapped
    /// even when stopping failed; the stop error is returned afterwards.
    pub(crate) fn rebind_pins(
        &self,
        open_pin: Option<Box<dyn Pin>>,
        close_pin: Option<Box<dyn Pin>>,
    ) -> Result<(), AlmueError> {
        let mut inner = self.lock_active()?;
        let stopped = self.stop_locked(&mut inner);
        if let Some(pin) = open_pin {
            info!(shutter = self.id, from = inner.open_pin.number(), to = pin.number(), "open pin rebound");
            inner.open_pin = pin;
        }
        if let Some(pin) = close_pin {
            info!(shutter = self.id, from = inner.close_pin.number(), to = pin.number(), "close pin rebound");
            inner.close_pin = pin;
        }
        self.release(inner);
        stopped
    }

    pub(crate) fn set_complete_way(&self, complete_way: Duration) -> Result<(), AlmueError> {
        let mut inner = self.lock_active()?;
        let stopped = self.stop_locked(&mut inner);
        inner.complete_way = complete_way;
        debug!(shutter = self.id, seconds = complete_way.as_secs(), "traversal duration updated");
        self.release(inner);
        stopped
    }

    /// Cancel the current daily jobs and install the ones `schedule`
    /// returns.  The lock is held throughout, so concurrent callers never
    /// leave more than one pair behind, and a retired shutter gets none.
    pub(crate) fn replace_jobs(
        &self,
        schedule: impl FnOnce() -> Result<DailyJobs, AlmueError>,
    ) -> Result<(), AlmueError> {
        let mut inner = self.lock_active()?;
        inner.jobs.cancel();
        inner.jobs = schedule()?;
        Ok(())
    }

    /// Cancel the daily jobs; `true` when there were any.
    pub(crate) fn cancel_jobs(&self) -> bool {
        let mut inner = self.lock();
        let scheduled = inner.jobs.is_scheduled();
        inner.jobs.cancel();
        scheduled
    }

    /// Stop, cancel the daily jobs and refuse every later command.  When
    /// the lines cannot be released the shutter stays active and the error
    /// is returned.
    pub(crate) fn unregister(&self) -> Result<(), AlmueError> {
        let mut inner = self.lock_active()?;
        let stopped = self.stop_locked(&mut inner);
        if stopped.is_ok() {
            inner.retired = true;
            inner.jobs.cancel();
        }
        self.release(inner);
        stopped
    }

    /// Like [`unregister`][Self::unregister] but best-effort: a failed stop
    /// is logged and the shutter is retired anyway.  Used when an entry is
    /// replaced or torn down at shutdown.
    pub(crate) fn retire(&self) {
        let mut inner = self.lock();
        if let Err(e) = self.stop_locked(&mut inner) {
            warn!(shutter = self.id, error = %e, "failed to stop retired shutter");
        }
        inner.retired = true;
        inner.jobs.cancel();
        self.release(inner);
    }

    // ── Queries ─────────────────────────────────────────────────────────────

    pub(crate) fn opening(&self) -> u8 {
        self.lock().opening_in_prc
    }

    pub(crate) fn phase(&self) -> ShutterState {
        self.lock().phase
    }

    #[cfg(test)]
    pub(crate) fn motion(&self) -> MotionKind {
        match self.lock().motion {
            None => MotionKind::Idle,
            Some(Motion::Reference(_)) => MotionKind::Timer,
            Some(Motion::Tracking(_)) => MotionKind::Ticker,
        }
    }

    pub(crate) fn pins(&self) -> [u8; 2] {
        let inner = self.lock();
        [inner.open_pin.number(), inner.close_pin.number()]
    }

    #[cfg(test)]
    pub(crate) fn jobs_scheduled(&self) -> bool {
        self.lock().jobs.is_scheduled()
    }
}
