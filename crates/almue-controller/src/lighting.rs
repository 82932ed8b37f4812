//! Lighting actuator: one switched output line.
//!
//! Like the shutter, a lighting reports to the state store only after its
//! lock is released, and refuses every command once unregistered.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use almue_hal::{Level, Pin};
use almue_types::{AlmueError, DeviceId, DeviceKind, LightingDescriptor, LightingState, StateStore};
use tracing::{info, warn};

use crate::jobs::DailyJobs;

struct LightingInner {
    switch_pin: Box<dyn Pin>,
    state: LightingState,
    jobs: DailyJobs,
    retired: bool,
    reports: Vec<LightingState>,
}

pub(crate) struct Lighting {
    id: DeviceId,
    label: String,
    store: Arc<dyn StateStore>,
    inner: Mutex<LightingInner>,
    reporting: Mutex<()>,
}

impl Lighting {
    pub(crate) fn new(
        descriptor: &LightingDescriptor,
        switch_pin: Box<dyn Pin>,
        store: Arc<dyn StateStore>,
    ) -> Arc<Self> {
        Arc::new(Self {
            id: descriptor.id,
            label: descriptor.description.clone(),
            store,
            inner: Mutex::new(LightingInner {
                switch_pin,
                state: LightingState::Off,
                jobs: DailyJobs::default(),
                retired: false,
                reports: Vec::new(),
            }),
            reporting: Mutex::new(()),
        })
    }

    fn lock(&self) -> MutexGuard<'_, LightingInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_active(&self) -> Result<MutexGuard<'_, LightingInner>, AlmueError> {
        let inner = self.lock();
        if inner.retired {
            return Err(AlmueError::NotRegistered {
                kind: DeviceKind::Lighting,
                id: self.id,
            });
        }
        Ok(inner)
    }

    fn release(&self, mut inner: MutexGuard<'_, LightingInner>) {
        if inner.reports.is_empty() {
            return;
        }
        let reports = std::mem::take(&mut inner.reports);
        let _ordered = self.reporting.lock().unwrap_or_else(PoisonError::into_inner);
        drop(inner);

        for state in reports {
            if let Err(e) = self.store.update_lighting_state(self.id, state) {
                warn!(lighting = self.id, error = %e, "failed to record lighting state");
            }
        }
    }

    pub(crate) fn turn_on(&self) -> Result<(), AlmueError> {
        self.command(LightingState::On)
    }

    pub(crate) fn turn_off(&self) -> Result<(), AlmueError> {
        self.command(LightingState::Off)
    }

    fn command(&self, state: LightingState) -> Result<(), AlmueError> {
        let mut inner = self.lock_active()?;
        let switched = self.switch(&mut inner, state);
        self.release(inner);
        switched
    }

    fn switch(&self, inner: &mut LightingInner, state: LightingState) -> Result<(), AlmueError> {
        inner
            .switch_pin
            .set_level(Level::from(state == LightingState::On))?;
        inner.state = state;
        info!(lighting = self.id, device = %self.label, %state, "lighting switched");
        inner.reports.push(state);
        Ok(())
    }

    /// Switch off, then swap in the new line.  The line is swapped even when
    /// switching off failed.
    pub(crate) fn rebind_pin(&self, switch_pin: Box<dyn Pin>) -> Result<(), AlmueError> {
        let mut inner = self.lock_active()?;
        let switched_off = self.switch(&mut inner, LightingState::Off);
        info!(
            lighting = self.id,
            from = inner.switch_pin.number(),
            to = switch_pin.number(),
            "switch pin rebound"
        );
        inner.switch_pin = switch_pin;
        self.release(inner);
        switched_off
    }

    /// See [`Shutter::replace_jobs`][crate::shutter::Shutter::replace_jobs].
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

    /// Switch off, cancel the daily jobs and refuse every later command.
    /// A failed switch-off leaves the lighting active.
    pub(crate) fn unregister(&self) -> Result<(), AlmueError> {
        let mut inner = self.lock_active()?;
        let switched_off = self.switch(&mut inner, LightingState::Off);
        if switched_off.is_ok() {
            inner.retired = true;
            inner.jobs.cancel();
        }
        self.release(inner);
        switched_off
    }

    pub(crate) fn retire(&self) {
        let mut inner = self.lock();
        if let Err(e) = self.switch(&mut inner, LightingState::Off) {
            warn!(lighting = self.id, error = %e, "failed to switch off retired lighting");
        }
        inner.retired = true;
        inner.jobs.cancel();
        self.release(inner);
    }

    pub(crate) fn is_on(&self) -> bool {
        self.lock().state == LightingState::On
    }

    pub(crate) fn pin(&self) -> u8 {
        self.lock().switch_pin.number()
    }
}

#[cfg(test)]
mod tests {
    use almue_hal::PinFactory;
    use chrono::NaiveTime;

    use super::*;
    use crate::testing::{RecordingPinFactory, RecordingStateStore};

    fn lighting() -> (Arc<Lighting>, RecordingPinFactory, Arc<RecordingStateStore>) {
        let pins = RecordingPinFactory::default();
        let store = Arc::new(RecordingStateStore::default());
        let d = LightingDescriptor {
            id: 4,
            floor_id: 1,
            description: "Porch".to_string(),
            switch_pin: 22,
            jobs_enabled: false,
            on_time: NaiveTime::from_hms_opt(18, 0, 0).unwrap(),
            off_time: NaiveTime::from_hms_opt(23, 0, 0).unwrap(),
            emergency_enabled: false,
            disabled: false,
        };
        let lighting = Lighting::new(&d, pins.output(22, "Porch").unwrap(), store.clone());
        (lighting, pins, store)
    }

    #[test]
    fn switching_drives_line_and_reports() {
        let (lighting, pins, store) = lighting();
        lighting.turn_on().unwrap();
        assert!(lighting.is_on());
        assert_eq!(pins.level(22), Some(Level::High));

        lighting.turn_off().unwrap();
        assert!(!lighting.is_on());
        assert_eq!(pins.level(22), Some(Level::Low));
        assert_eq!(
            store.lighting_states(4),
            vec![LightingState::On, LightingState::Off]
        );
    }

    #[test]
    fn failed_write_keeps_previous_state() {
        let (lighting, pins, store) = lighting();
        pins.fail(22);
        assert!(matches!(
            lighting.turn_on(),
            Err(AlmueError::Io { pin: 22, .. })
        ));
        assert!(!lighting.is_on());
        assert!(store.lighting_states(4).is_empty());
    }

    #[test]
    fn rebind_switches_off_first() {
        let (lighting, pins, _store) = lighting();
        lighting.turn_on().unwrap();
        lighting.rebind_pin(pins.output(23, "Porch").unwrap()).unwrap();
        assert_eq!(pins.level(22), Some(Level::Low));
        assert_eq!(lighting.pin(), 23);
        assert!(!lighting.is_on());
    }

    #[test]
    fn unregistered_lighting_refuses_commands() {
        let (lighting, pins, store) = lighting();
        lighting.turn_on().unwrap();
        lighting.unregister().unwrap();
        assert_eq!(pins.level(22), Some(Level::Low));

        assert!(matches!(
            lighting.turn_on(),
            Err(AlmueError::NotRegistered { id: 4, .. })
        ));
        assert!(lighting
            .replace_jobs(|| Ok(DailyJobs::default()))
            .is_err());
        assert_eq!(pins.level(22), Some(Level::Low));
        assert_eq!(
            store.lighting_states(4),
            vec![LightingState::On, LightingState::Off]
        );
    }
}
