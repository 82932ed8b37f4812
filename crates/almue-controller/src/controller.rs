//! [`DeviceController`] – the single entry point of the control plane.
//!
//! The controller owns one [`Registry`] per device family and wires every
//! actuator to the collaborators it was built with: the [`PinFactory`]
//! (real or simulated lines), the [`StateStore`] that receives observed
//! state, and the [`Scheduler`] that runs the daily jobs.
//!
//! Daily jobs hold a weak reference to the controller plus a device ID.  A
//! job that fires after its device was removed logs the
//! [`AlmueError::NotRegistered`] error and does nothing else.

use std::sync::{Arc, Weak};

use almue_hal::PinFactory;
use almue_runtime::TokioScheduler;
use almue_types::{
    AlmueError, DeviceId, DeviceKind, DifferenceType, Job, LightingAction, LightingDescriptor,
    Scheduler, ShutterAction, ShutterDescriptor, ShutterState, StateStore,
};
use chrono::{NaiveTime, Timelike};
use tokio::runtime::Handle;
use tracing::{debug, error, info, warn};

use crate::jobs::DailyJobs;
use crate::lighting::Lighting;
use crate::reconcile::{LightingOps, ShutterOps, reconcile};
use crate::registry::Registry;
use crate::shutter::Shutter;

type DeviceAction = fn(&DeviceController, DeviceId) -> Result<(), AlmueError>;

/// Registry and operations for every shutter and lighting of the building.
pub struct DeviceController {
    this: Weak<DeviceController>,
    runtime: Handle,
    pins: Arc<dyn PinFactory>,
    store: Arc<dyn StateStore>,
    scheduler: Arc<dyn Scheduler>,
    pub(crate) shutters: Registry<Shutter>,
    pub(crate) lightings: Registry<Lighting>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Builder
// ─────────────────────────────────────────────────────────────────────────────

/// Builder for [`DeviceController`].
///
/// Only the state store is mandatory.  Without overrides the pin factory
/// follows the `simulate` flag (default `true`) and jobs run on a
/// [`TokioScheduler`] bound to the current runtime.
pub struct DeviceControllerBuilder {
    simulate: bool,
    pins: Option<Arc<dyn PinFactory>>,
    store: Arc<dyn StateStore>,
    scheduler: Option<Arc<dyn Scheduler>>,
    runtime: Option<Handle>,
}

impl DeviceControllerBuilder {
    /// Drive simulated lines instead of GPIO.
    pub fn simulate(mut self, simulate: bool) -> Self {
        self.simulate = simulate;
        self
    }

    /// Use `pins` regardless of the simulate flag.
    pub fn pin_factory(mut self, pins: Arc<dyn PinFactory>) -> Self {
        self.pins = Some(pins);
        self
    }

    pub fn scheduler(mut self, scheduler: Arc<dyn Scheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    /// Spawn drives on `runtime` instead of the runtime `build` runs on.
    pub fn runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// # Errors
    ///
    /// Returns [`AlmueError::Runtime`] when no runtime handle was given and
    /// `build` runs outside a Tokio runtime, or [`AlmueError::Io`] when real
    /// GPIO is requested but unavailable.
    pub fn build(self) -> Result<Arc<DeviceController>, AlmueError> {
        let runtime = match self.runtime {
            Some(runtime) => runtime,
            None => Handle::try_current().map_err(|e| AlmueError::Runtime(e.to_string()))?,
        };
        let pins = match self.pins {
            Some(pins) => pins,
            None => almue_hal::pin_factory(self.simulate)?,
        };
        let scheduler = self
            .scheduler
            .unwrap_or_else(|| Arc::new(TokioScheduler::with_handle(runtime.clone())));

        info!(simulate = self.simulate, "device controller ready");
        Ok(Arc::new_cyclic(|this| DeviceController {
            this: this.clone(),
            runtime,
            pins,
            store: self.store,
            scheduler,
            shutters: Registry::new(DeviceKind::Shutter),
            lightings: Registry::new(DeviceKind::Lighting),
        }))
    }
}

impl DeviceController {
    /// Start building a controller that reports to `store`.
    pub fn builder(store: Arc<dyn StateStore>) -> DeviceControllerBuilder {
        DeviceControllerBuilder {
            simulate: true,
            pins: None,
            store,
            scheduler: None,
            runtime: None,
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Shutters
    // ─────────────────────────────────────────────────────────────────────────

    /// Register every enabled descriptor.  Disabled descriptors are skipped.
    ///
    /// # Errors
    ///
    /// Stops at the first failing descriptor.  Shutters registered before it
    /// stay registered; a shutter whose job scheduling failed stays
    /// registered without jobs.
    pub fn register_shutters(&self, descriptors: &[ShutterDescriptor]) -> Result<(), AlmueError> {
        for descriptor in descriptors {
            if descriptor.disabled {
                debug!(shutter = descriptor.id, "skipping disabled shutter");
                continue;
            }
            self.register_shutter(descriptor)?;
        }
        Ok(())
    }

    pub(crate) fn register_shutter(&self, descriptor: &ShutterDescriptor) -> Result<(), AlmueError> {
        descriptor.validate()?;
        self.warn_pin_conflicts(
            DeviceKind::Shutter,
            descriptor.id,
            &[descriptor.open_pin, descriptor.close_pin],
        );

        let open_pin = self.pins.output(descriptor.open_pin, &descriptor.description)?;
        let close_pin = self
            .pins
            .output(descriptor.close_pin, &descriptor.description)?;
        let shutter = Shutter::new(
            descriptor,
            open_pin,
            close_pin,
            self.runtime.clone(),
            Arc::clone(&self.store),
        );
        if let Some(previous) = self.shutters.insert(descriptor.id, shutter) {
            debug!(shutter = descriptor.id, "replacing registered shutter");
            previous.retire();
        }
        info!(
            shutter = descriptor.id,
            device = %descriptor.description,
            open_pin = descriptor.open_pin,
            close_pin = descriptor.close_pin,
            "shutter registered"
        );

        if descriptor.jobs_enabled {
            self.schedule_shutter_jobs(descriptor)?;
        }
        Ok(())
    }

    /// Stop the shutter, cancel its jobs and remove it.  A caller still
    /// holding the removed actuator can no longer drive it or schedule jobs
    /// on it.
    pub fn unregister_shutter(&self, id: DeviceId) -> Result<(), AlmueError> {
        let shutter = self.shutters.get(id)?;
        shutter.unregister()?;
        self.shutters.remove_entry(id, &shutter);
        info!(shutter = id, "shutter unregistered");
        Ok(())
    }

    /// Apply the changed fields of `descriptor` to the live shutter.
    ///
    /// `diff` names the fields that differ from the descriptor the shutter
    /// was registered or last updated with (see
    /// [`ShutterDescriptor::differences`]).
    pub fn update_shutter(
        &self,
        diff: DifferenceType,
        descriptor: &ShutterDescriptor,
    ) -> Result<(), AlmueError> {
        reconcile::<ShutterOps>(self, diff, descriptor)
    }

    pub fn open_shutter(&self, id: DeviceId) -> Result<(), AlmueError> {
        self.shutters.get(id)?.open()
    }

    pub fn close_shutter(&self, id: DeviceId) -> Result<(), AlmueError> {
        self.shutters.get(id)?.close()
    }

    pub fn stop_shutter(&self, id: DeviceId) -> Result<(), AlmueError> {
        self.shutters.get(id)?.stop()
    }

    pub fn control_shutter(&self, id: DeviceId, action: ShutterAction) -> Result<(), AlmueError> {
        match action {
            ShutterAction::Open => self.open_shutter(id),
            ShutterAction::Close => self.close_shutter(id),
            ShutterAction::Stop => self.stop_shutter(id),
        }
    }

    /// Install the daily open and close jobs, replacing any present.
    ///
    /// # Errors
    ///
    /// [`AlmueError::NotRegistered`] for an unknown shutter and
    /// [`AlmueError::Schedule`] when either job is rejected; in that case
    /// neither job stays scheduled.
    pub fn schedule_shutter_jobs(&self, descriptor: &ShutterDescriptor) -> Result<(), AlmueError> {
        let shutter = self.shutters.get(descriptor.id)?;
        shutter.replace_jobs(|| {
            self.schedule_pair(
                descriptor.open_time,
                self.device_job(descriptor.id, "open", DeviceController::open_shutter),
                descriptor.close_time,
                self.device_job(descriptor.id, "close", DeviceController::close_shutter),
            )
        })?;
        info!(
            shutter = descriptor.id,
            open = %descriptor.open_time.format("%H:%M"),
            close = %descriptor.close_time.format("%H:%M"),
            "shutter jobs scheduled"
        );
        Ok(())
    }

    /// Cancel both daily jobs.  Succeeds when none are scheduled.
    pub fn unschedule_shutter_jobs(&self, id: DeviceId) -> Result<(), AlmueError> {
        let cancelled = self.shutters.get(id)?.cancel_jobs();
        debug!(shutter = id, cancelled, "shutter jobs unscheduled");
        Ok(())
    }

    pub(crate) fn reschedule_shutter_jobs(
        &self,
        descriptor: &ShutterDescriptor,
    ) -> Result<(), AlmueError> {
        self.unschedule_shutter_jobs(descriptor.id)?;
        self.schedule_shutter_jobs(descriptor)
    }

    pub(crate) fn rebind_shutter_pins(
        &self,
        diff: DifferenceType,
        descriptor: &ShutterDescriptor,
    ) -> Result<(), AlmueError> {
        let shutter = self.shutters.get(descriptor.id)?;
        let mut changed = Vec::with_capacity(2);
        let open_pin = if diff.contains(DifferenceType::OPEN_PIN) {
            changed.push(descriptor.open_pin);
            Some(self.pins.output(descriptor.open_pin, &descriptor.description)?)
        } else {
            None
        };
        let close_pin = if diff.contains(DifferenceType::CLOSE_PIN) {
            changed.push(descriptor.close_pin);
            Some(self.pins.output(descriptor.close_pin, &descriptor.description)?)
        } else {
            None
        };
        self.warn_pin_conflicts(DeviceKind::Shutter, descriptor.id, &changed);
        shutter.rebind_pins(open_pin, close_pin)
    }

    pub(crate) fn set_shutter_complete_way(
        &self,
        descriptor: &ShutterDescriptor,
    ) -> Result<(), AlmueError> {
        descriptor.validate()?;
        self.shutters
            .get(descriptor.id)?
            .set_complete_way(descriptor.complete_way())
    }

    /// Estimated opening (0–100) of a registered shutter.
    pub fn shutter_opening(&self, id: DeviceId) -> Result<u8, AlmueError> {
        Ok(self.shutters.get(id)?.opening())
    }

    /// Current phase of a registered shutter.
    pub fn shutter_phase(&self, id: DeviceId) -> Result<ShutterState, AlmueError> {
        Ok(self.shutters.get(id)?.phase())
    }

    pub fn shutter_ids(&self) -> Vec<DeviceId> {
        self.shutters.ids()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Lightings
    // ─────────────────────────────────────────────────────────────────────────

    /// Register every enabled descriptor.  Same failure behaviour as
    /// [`register_shutters`][Self::register_shutters].
    pub fn register_lightings(&self, descriptors: &[LightingDescriptor]) -> Result<(), AlmueError> {
        for descriptor in descriptors {
            if descriptor.disabled {
                debug!(lighting = descriptor.id, "skipping disabled lighting");
                continue;
            }
            self.register_lighting(descriptor)?;
        }
        Ok(())
    }

    pub(crate) fn register_lighting(&self, descriptor: &LightingDescriptor) -> Result<(), AlmueError> {
        self.warn_pin_conflicts(DeviceKind::Lighting, descriptor.id, &[descriptor.switch_pin]);

        let switch_pin = self
            .pins
            .output(descriptor.switch_pin, &descriptor.description)?;
        let lighting = Lighting::new(descriptor, switch_pin, Arc::clone(&self.store));
        if let Some(previous) = self.lightings.insert(descriptor.id, lighting) {
            debug!(lighting = descriptor.id, "replacing registered lighting");
            previous.retire();
        }
        info!(
            lighting = descriptor.id,
            device = %descriptor.description,
            switch_pin = descriptor.switch_pin,
            "lighting registered"
        );

        if descriptor.jobs_enabled {
            self.schedule_lighting_jobs(descriptor)?;
        }
        Ok(())
    }

    /// Switch the lighting off, cancel its jobs and remove it.
    pub fn unregister_lighting(&self, id: DeviceId) -> Result<(), AlmueError> {
        let lighting = self.lightings.get(id)?;
        lighting.unregister()?;
        self.lightings.remove_entry(id, &lighting);
        info!(lighting = id, "lighting unregistered");
        Ok(())
    }

    /// Apply the changed fields of `descriptor` to the live lighting.
    pub fn update_lighting(
        &self,
        diff: DifferenceType,
        descriptor: &LightingDescriptor,
    ) -> Result<(), AlmueError> {
        reconcile::<LightingOps>(self, diff, descriptor)
    }

    pub fn turn_lighting_on(&self, id: DeviceId) -> Result<(), AlmueError> {
        self.lightings.get(id)?.turn_on()
    }

    pub fn turn_lighting_off(&self, id: DeviceId) -> Result<(), AlmueError> {
        self.lightings.get(id)?.turn_off()
    }

    pub fn control_lighting(&self, id: DeviceId, action: LightingAction) -> Result<(), AlmueError> {
        match action {
            LightingAction::On => self.turn_lighting_on(id),
            LightingAction::Off => self.turn_lighting_off(id),
        }
    }

    /// Install the daily on and off jobs, replacing any present.  Same
    /// errors as [`schedule_shutter_jobs`][Self::schedule_shutter_jobs].
    pub fn schedule_lighting_jobs(&self, descriptor: &LightingDescriptor) -> Result<(), AlmueError> {
        let lighting = self.lightings.get(descriptor.id)?;
        lighting.replace_jobs(|| {
            self.schedule_pair(
                descriptor.on_time,
                self.device_job(descriptor.id, "on", DeviceController::turn_lighting_on),
                descriptor.off_time,
                self.device_job(descriptor.id, "off", DeviceController::turn_lighting_off),
            )
        })?;
        info!(
            lighting = descriptor.id,
            on = %descriptor.on_time.format("%H:%M"),
            off = %descriptor.off_time.format("%H:%M"),
            "lighting jobs scheduled"
        );
        Ok(())
    }

    pub fn unschedule_lighting_jobs(&self, id: DeviceId) -> Result<(), AlmueError> {
        let cancelled = self.lightings.get(id)?.cancel_jobs();
        debug!(lighting = id, cancelled, "lighting jobs unscheduled");
        Ok(())
    }

    pub(crate) fn reschedule_lighting_jobs(
        &self,
        descriptor: &LightingDescriptor,
    ) -> Result<(), AlmueError> {
        self.unschedule_lighting_jobs(descriptor.id)?;
        self.schedule_lighting_jobs(descriptor)
    }

    pub(crate) fn rebind_lighting_pin(&self, descriptor: &LightingDescriptor) -> Result<(), AlmueError> {
        let lighting = self.lightings.get(descriptor.id)?;
        let switch_pin = self
            .pins
            .output(descriptor.switch_pin, &descriptor.description)?;
        self.warn_pin_conflicts(DeviceKind::Lighting, descriptor.id, &[descriptor.switch_pin]);
        lighting.rebind_pin(switch_pin)
    }

    pub fn lighting_is_on(&self, id: DeviceId) -> Result<bool, AlmueError> {
        Ok(self.lightings.get(id)?.is_on())
    }

    pub fn lighting_ids(&self) -> Vec<DeviceId> {
        self.lightings.ids()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Lifecycle
    // ─────────────────────────────────────────────────────────────────────────

    /// Unregister every device: motion stopped, lines low, jobs cancelled.
    /// Devices whose lines cannot be released are still removed.
    pub fn shutdown(&self) {
        for id in self.shutters.ids() {
            if let Some(shutter) = self.shutters.remove(id) {
                shutter.retire();
            }
        }
        for id in self.lightings.ids() {
            if let Some(lighting) = self.lightings.remove(id) {
                lighting.retire();
            }
        }
        info!("device controller shut down");
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Helpers
    // ─────────────────────────────────────────────────────────────────────────

    /// Schedule both jobs or neither.
    fn schedule_pair(
        &self,
        start: NaiveTime,
        start_job: Job,
        end: NaiveTime,
        end_job: Job,
    ) -> Result<DailyJobs, AlmueError> {
        let first = self
            .scheduler
            .schedule_daily(start.hour(), start.minute(), start_job)?;
        match self.scheduler.schedule_daily(end.hour(), end.minute(), end_job) {
            Ok(second) => Ok(DailyJobs::new(first, second)),
            Err(e) => {
                first.cancel();
                Err(e)
            }
        }
    }

    fn device_job(&self, id: DeviceId, name: &'static str, action: DeviceAction) -> Job {
        let controller = self.this.clone();
        Arc::new(move || {
            let Some(controller) = controller.upgrade() else {
                debug!(device = id, job = name, "controller gone; job skipped");
                return;
            };
            info!(device = id, job = name, "daily job fired");
            if let Err(e) = action(&controller, id) {
                error!(device = id, job = name, error = %e, "daily job failed");
            }
        })
    }

    /// Pin numbers are not required to be unique; overlaps are only logged.
    fn warn_pin_conflicts(&self, kind: DeviceKind, id: DeviceId, pins: &[u8]) {
        let same_kind = |k: DeviceKind| (k == kind).then_some(id);
        for (other, shutter) in self.shutters.others(same_kind(DeviceKind::Shutter)) {
            for pin in shutter.pins() {
                if pins.contains(&pin) {
                    warn!(%kind, device = id, shutter = other, pin, "pin already used by another shutter");
                }
            }
        }
        for (other, lighting) in self.lightings.others(same_kind(DeviceKind::Lighting)) {
            let pin = lighting.pin();
            if pins.contains(&pin) {
                warn!(%kind, device = id, lighting = other, pin, "pin already used by another lighting");
            }
        }
    }
}
