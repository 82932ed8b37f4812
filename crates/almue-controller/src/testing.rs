//! Recording doubles for the controller's collaborators.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use almue_hal::{Level, Pin, PinFactory};
use almue_types::{
    AlmueError, DeviceId, Job, JobHandle, LightingDescriptor, LightingState, Scheduler,
    ShutterDescriptor, ShutterState, StateStore,
};
use chrono::NaiveTime;
use tokio::time::Instant;

use crate::DeviceController;

// ─────────────────────────────────────────────────────────────────────────────
// Pins
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
struct PinBoard {
    levels: HashMap<u8, Level>,
    history: Vec<(u8, Level)>,
    failing: HashSet<u8>,
    refused: HashSet<u8>,
}

/// Hands out pins that write into one shared board.  Claiming a line sets
/// it low without adding to the history.
#[derive(Clone, Default)]
pub(crate) struct RecordingPinFactory {
    board: Arc<Mutex<PinBoard>>,
}

impl RecordingPinFactory {
    pub(crate) fn level(&self, number: u8) -> Option<Level> {
        self.board.lock().unwrap().levels.get(&number).copied()
    }

    pub(crate) fn history(&self) -> Vec<(u8, Level)> {
        self.board.lock().unwrap().history.clone()
    }

    /// Make every later write to `number` fail.
    pub(crate) fn fail(&self, number: u8) {
        self.board.lock().unwrap().failing.insert(number);
    }

    /// Make every later claim of `number` fail.
    pub(crate) fn refuse(&self, number: u8) {
        self.board.lock().unwrap().refused.insert(number);
    }
}

impl PinFactory for RecordingPinFactory {
    fn output(&self, number: u8, _label: &str) -> Result<Box<dyn Pin>, AlmueError> {
        let mut board = self.board.lock().unwrap();
        if board.refused.contains(&number) {
            return Err(AlmueError::Io {
                pin: number,
                details: "line busy".to_string(),
            });
        }
        board.levels.insert(number, Level::Low);
        drop(board);
        Ok(Box::new(RecordingPin {
            number,
            board: Arc::clone(&self.board),
        }))
    }
}

struct RecordingPin {
    number: u8,
    board: Arc<Mutex<PinBoard>>,
}

impl Pin for RecordingPin {
    fn number(&self) -> u8 {
        self.number
    }

    fn set_level(&mut self, level: Level) -> Result<(), AlmueError> {
        let mut board = self.board.lock().unwrap();
        if board.failing.contains(&self.number) {
            return Err(AlmueError::Io {
                pin: self.number,
                details: "injected failure".to_string(),
            });
        }
        board.levels.insert(self.number, level);
        board.history.push((self.number, level));
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// State store
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum StoreEvent {
    Shutter(DeviceId, ShutterState),
    Opening(DeviceId, u8),
    Lighting(DeviceId, LightingState),
}

/// Records every notification with the (virtual) time it arrived.
pub(crate) struct RecordingStateStore {
    origin: Instant,
    events: Mutex<Vec<(Duration, StoreEvent)>>,
    failing: AtomicBool,
}

impl Default for RecordingStateStore {
    fn default() -> Self {
        Self {
            origin: Instant::now(),
            events: Mutex::new(Vec::new()),
            failing: AtomicBool::new(false),
        }
    }
}

impl RecordingStateStore {
    fn record(&self, event: StoreEvent) -> Result<(), AlmueError> {
        self.events
            .lock()
            .unwrap()
            .push((self.origin.elapsed(), event));
        if self.failing.load(Ordering::SeqCst) {
            return Err(AlmueError::StateStore("injected failure".to_string()));
        }
        Ok(())
    }

    /// Answer every later notification with an error (still recorded).
    pub(crate) fn fail(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }

    pub(crate) fn events(&self) -> Vec<(Duration, StoreEvent)> {
        self.events.lock().unwrap().clone()
    }

    pub(crate) fn shutter_states(&self, id: DeviceId) -> Vec<ShutterState> {
        self.events()
            .into_iter()
            .filter_map(|(_, e)| match e {
                StoreEvent::Shutter(i, s) if i == id => Some(s),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn openings(&self, id: DeviceId) -> Vec<(Duration, u8)> {
        self.events()
            .into_iter()
            .filter_map(|(at, e)| match e {
                StoreEvent::Opening(i, p) if i == id => Some((at, p)),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn lighting_states(&self, id: DeviceId) -> Vec<LightingState> {
        self.events()
            .into_iter()
            .filter_map(|(_, e)| match e {
                StoreEvent::Lighting(i, s) if i == id => Some(s),
                _ => None,
            })
            .collect()
    }
}

impl StateStore for RecordingStateStore {
    fn update_shutter_state(&self, id: DeviceId, state: ShutterState) -> Result<(), AlmueError> {
        self.record(StoreEvent::Shutter(id, state))
    }

    fn update_shutter_opening(&self, id: DeviceId, percent: u8) -> Result<(), AlmueError> {
        self.record(StoreEvent::Opening(id, percent))
    }

    fn update_lighting_state(&self, id: DeviceId, state: LightingState) -> Result<(), AlmueError> {
        self.record(StoreEvent::Lighting(id, state))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Scheduler
// ─────────────────────────────────────────────────────────────────────────────

struct ScheduledJob {
    hour: u32,
    minute: u32,
    job: Job,
    cancelled: Arc<AtomicBool>,
}

/// Scheduler whose jobs only fire when a test says so.
#[derive(Default)]
pub(crate) struct ManualScheduler {
    jobs: Mutex<Vec<ScheduledJob>>,
    fail_on_call: Mutex<Option<usize>>,
}

impl ManualScheduler {
    /// Fail the `n`-th call to `schedule_daily` (0-based, counting all calls).
    pub(crate) fn fail_on_call(&self, n: usize) {
        *self.fail_on_call.lock().unwrap() = Some(n);
    }

    /// Every `(hour, minute)` ever scheduled, in call order.
    pub(crate) fn calls(&self) -> Vec<(u32, u32)> {
        self.jobs
            .lock()
            .unwrap()
            .iter()
            .map(|j| (j.hour, j.minute))
            .collect()
    }

    /// `(hour, minute)` of the jobs that have not been cancelled.
    pub(crate) fn active(&self) -> Vec<(u32, u32)> {
        self.jobs
            .lock()
            .unwrap()
            .iter()
            .filter(|j| !j.cancelled.load(Ordering::SeqCst))
            .map(|j| (j.hour, j.minute))
            .collect()
    }

    /// Run every active job scheduled at `hour:minute`.
    pub(crate) fn fire(&self, hour: u32, minute: u32) -> usize {
        let due: Vec<Job> = self
            .jobs
            .lock()
            .unwrap()
            .iter()
            .filter(|j| j.hour == hour && j.minute == minute && !j.cancelled.load(Ordering::SeqCst))
            .map(|j| Arc::clone(&j.job))
            .collect();
        for job in &due {
            job();
        }
        due.len()
    }
}

impl Scheduler for ManualScheduler {
    fn schedule_daily(
        &self,
        hour: u32,
        minute: u32,
        job: Job,
    ) -> Result<Box<dyn JobHandle>, AlmueError> {
        let mut jobs = self.jobs.lock().unwrap();
        let call = jobs.len();
        if *self.fail_on_call.lock().unwrap() == Some(call) {
            // Count the failed call so later indices stay stable.
            let cancelled = Arc::new(AtomicBool::new(true));
            jobs.push(ScheduledJob {
                hour,
                minute,
                job,
                cancelled,
            });
            return Err(AlmueError::Schedule("injected failure".to_string()));
        }
        let cancelled = Arc::new(AtomicBool::new(false));
        jobs.push(ScheduledJob {
            hour,
            minute,
            job,
            cancelled: Arc::clone(&cancelled),
        });
        Ok(Box::new(ManualHandle(cancelled)))
    }
}

struct ManualHandle(Arc<AtomicBool>);

impl JobHandle for ManualHandle {
    fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Fixtures
// ─────────────────────────────────────────────────────────────────────────────

/// A controller wired to recording doubles.  Must be built inside a Tokio
/// runtime.
pub(crate) struct Rig {
    pub(crate) controller: Arc<DeviceController>,
    pub(crate) pins: RecordingPinFactory,
    pub(crate) store: Arc<RecordingStateStore>,
    pub(crate) scheduler: Arc<ManualScheduler>,
}

impl Rig {
    pub(crate) fn new() -> Self {
        let pins = RecordingPinFactory::default();
        let store = Arc::new(RecordingStateStore::default());
        let scheduler = Arc::new(ManualScheduler::default());
        let controller = DeviceController::builder(store.clone())
            .pin_factory(Arc::new(pins.clone()))
            .scheduler(scheduler.clone())
            .build()
            .unwrap();
        Self {
            controller,
            pins,
            store,
            scheduler,
        }
    }
}

pub(crate) fn at(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).unwrap()
}

/// Shutter on lines 17/27, 20 s traversal, closed, jobs at 07:00/21:00 off.
pub(crate) fn shutter_descriptor(id: DeviceId) -> ShutterDescriptor {
    ShutterDescriptor {
        id,
        floor_id: 1,
        description: format!("Shutter {id}"),
        open_pin: 17,
        close_pin: 27,
        complete_way_in_seconds: 20,
        jobs_enabled: false,
        open_time: at(7, 0),
        close_time: at(21, 0),
        emergency_enabled: false,
        disabled: false,
        opening_in_prc: 0,
    }
}

/// Lighting on line 22, jobs at 18:00/23:00 off.
pub(crate) fn lighting_descriptor(id: DeviceId) -> LightingDescriptor {
    LightingDescriptor {
        id,
        floor_id: 1,
        description: format!("Lighting {id}"),
        switch_pin: 22,
        jobs_enabled: false,
        on_time: at(18, 0),
        off_time: at(23, 0),
        emergency_enabled: false,
        disabled: false,
    }
}
