//! The pair of daily jobs a device owns (open/close or on/off).

use almue_types::JobHandle;

/// Handles of the two daily jobs of one device.  Both slots are filled or
/// both are empty.
#[derive(Default)]
pub(crate) struct DailyJobs {
    pair: Option<(Box<dyn JobHandle>, Box<dyn JobHandle>)>,
}

impl DailyJobs {
    pub(crate) fn new(start: Box<dyn JobHandle>, end: Box<dyn JobHandle>) -> Self {
        Self {
            pair: Some((start, end)),
        }
    }

    /// Cancel both jobs and clear the slots.  Safe when nothing is scheduled.
    pub(crate) fn cancel(&mut self) {
        if let Some((start, end)) = self.pair.take() {
            start.cancel();
            end.cancel();
        }
    }

    pub(crate) fn is_scheduled(&self) -> bool {
        self.pair.is_some()
    }
}
