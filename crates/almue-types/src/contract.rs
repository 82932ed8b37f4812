//! Collaborator contracts consumed by the device controller.
//!
//! The controller never talks to a database or a timer wheel directly.  It
//! is handed a [`StateStore`] for observability and a [`Scheduler`] for the
//! daily jobs; both must be safe to call from several background tasks at
//! once.

use std::sync::Arc;

use crate::{AlmueError, DeviceId, LightingState, ShutterState};

/// Best-effort sink for the last observed state of every device.
///
/// The controller logs failures and carries on: a physical motion that has
/// already started is never rolled back because a write failed.
pub trait StateStore: Send + Sync {
    /// Record the current phase of a shutter.
    fn update_shutter_state(&self, id: DeviceId, state: ShutterState) -> Result<(), AlmueError>;

    /// Record the estimated opening of a shutter (0–100).
    fn update_shutter_opening(&self, id: DeviceId, percent: u8) -> Result<(), AlmueError>;

    /// Record whether a lighting is on or off.
    fn update_lighting_state(&self, id: DeviceId, state: LightingState) -> Result<(), AlmueError>;
}

/// Callback fired by a scheduled job.
pub type Job = Arc<dyn Fn() + Send + Sync>;

/// Handle to a scheduled daily job.
pub trait JobHandle: Send + Sync {
    /// Stop all future firings.  A firing already in progress completes.
    fn cancel(&self);
}

/// Runs a callback every day at a fixed local time of day.
pub trait Scheduler: Send + Sync {
    /// Schedule `job` to fire daily at `hour:minute`.
    ///
    /// # Errors
    ///
    /// Returns [`AlmueError::Schedule`] when the time is out of range or the
    /// job cannot be installed.
    fn schedule_daily(
        &self,
        hour: u32,
        minute: u32,
        job: Job,
    ) -> Result<Box<dyn JobHandle>, AlmueError>;
}
