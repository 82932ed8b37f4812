//! Real GPIO output lines backed by `rppal` (Raspberry Pi, Linux only).
//!
//! `rppal` hands out each line once per process.  Claimed lines are kept in
//! a [`LineTable`] so that two devices configured on the same number, or a
//! device re-registered while its previous actuator still holds the line,
//! share one handle instead of failing.  A line is released once the last
//! handle to it is dropped.

#[cfg(any(target_os = "linux", test))]
use std::collections::HashMap;
#[cfg(any(target_os = "linux", test))]
use std::sync::{Arc, Mutex, PoisonError, Weak};

use almue_types::AlmueError;

use crate::pin::{Pin, PinFactory};

/// Claimed lines by number.
#[cfg(any(target_os = "linux", test))]
struct LineTable<L> {
    lines: Mutex<HashMap<u8, Weak<Mutex<L>>>>,
}

#[cfg(any(target_os = "linux", test))]
impl<L> LineTable<L> {
    fn new() -> Self {
        Self {
            lines: Mutex::new(HashMap::new()),
        }
    }

    /// Return the live handle for `number`, or claim the line with `open`.
    fn claim(
        &self,
        number: u8,
        open: impl FnOnce() -> Result<L, AlmueError>,
    ) -> Result<Arc<Mutex<L>>, AlmueError> {
        let mut lines = self.lines.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(line) = lines.get(&number).and_then(Weak::upgrade) {
            return Ok(line);
        }
        let line = Arc::new(Mutex::new(open()?));
        lines.insert(number, Arc::downgrade(&line));
        Ok(line)
    }
}

#[cfg(target_os = "linux")]
mod hw {
    use std::sync::{Arc, Mutex, PoisonError};

    use almue_types::AlmueError;
    use rppal::gpio::{Gpio, OutputPin};
    use tracing::debug;

    use super::LineTable;
    use crate::pin::{Level, Pin};

    /// An output line claimed from the GPIO peripheral.  The line is reset
    /// to its previous mode when the last handle to it is dropped.
    pub struct GpioPin {
        label: String,
        number: u8,
        line: Arc<Mutex<OutputPin>>,
    }

    impl Pin for GpioPin {
        fn number(&self) -> u8 {
            self.number
        }

        fn set_level(&mut self, level: Level) -> Result<(), AlmueError> {
            debug!(device = %self.label, pin = self.number, %level, "driving gpio line");
            let mut line = self.line.lock().unwrap_or_else(PoisonError::into_inner);
            match level {
                Level::High => line.set_high(),
                Level::Low => line.set_low(),
            }
            Ok(())
        }
    }

    pub struct Lines {
        gpio: Gpio,
        table: LineTable<OutputPin>,
    }

    pub fn open() -> Result<Lines, AlmueError> {
        let gpio = Gpio::new().map_err(|e| AlmueError::Io {
            pin: 0,
            details: format!("GPIO peripheral unavailable: {e}"),
        })?;
        Ok(Lines {
            gpio,
            table: LineTable::new(),
        })
    }

    pub fn claim(lines: &Lines, number: u8, label: &str) -> Result<GpioPin, AlmueError> {
        let line = lines.table.claim(number, || {
            let pin = lines.gpio.get(number).map_err(|e| AlmueError::Io {
                pin: number,
                details: e.to_string(),
            })?;
            Ok(pin.into_output_low())
        })?;
        Ok(GpioPin {
            label: label.to_string(),
            number,
            line,
        })
    }
}

#[cfg(target_os = "linux")]
pub use hw::GpioPin;

/// Claims real GPIO lines.  Construction fails when the peripheral cannot
/// be opened (wrong platform, missing permissions).
pub struct GpioPinFactory {
    #[cfg(target_os = "linux")]
    lines: hw::Lines,
}

impl GpioPinFactory {
    /// Open the GPIO peripheral.
    ///
    /// # Errors
    ///
    /// Returns [`AlmueError::Io`] if the peripheral is not available.
    #[cfg(target_os = "linux")]
    pub fn new() -> Result<Self, AlmueError> {
        Ok(Self { lines: hw::open()? })
    }

    /// GPIO access is only implemented for Linux hosts.
    #[cfg(not(target_os = "linux"))]
    pub fn new() -> Result<Self, AlmueError> {
        Err(AlmueError::Io {
            pin: 0,
            details: "GPIO access requires a Linux host; enable simulation mode".to_string(),
        })
    }
}

impl PinFactory for GpioPinFactory {
    #[cfg(target_os = "linux")]
    fn output(&self, number: u8, label: &str) -> Result<Box<dyn Pin>, AlmueError> {
        Ok(Box::new(hw::claim(&self.lines, number, label)?))
    }

    #[cfg(not(target_os = "linux"))]
    fn output(&self, number: u8, _label: &str) -> Result<Box<dyn Pin>, AlmueError> {
        Err(AlmueError::Io {
            pin: number,
            details: "GPIO access requires a Linux host".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;

    #[test]
    fn a_claimed_line_is_shared() {
        let table = LineTable::new();
        let opened = Cell::new(0);
        let open = || {
            opened.set(opened.get() + 1);
            Ok(opened.get())
        };

        let first = table.claim(17, open).unwrap();
        let second = table.claim(17, open).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(opened.get(), 1);

        let other = table.claim(27, open).unwrap();
        assert!(!Arc::ptr_eq(&first, &other));
        assert_eq!(opened.get(), 2);
    }

    #[test]
    fn a_released_line_is_claimed_again() {
        let table = LineTable::new();
        let first = table.claim(17, || Ok("first")).unwrap();
        drop(first);
        let again = table.claim(17, || Ok("second")).unwrap();
        assert_eq!(*again.lock().unwrap(), "second");
    }

    #[test]
    fn a_failed_claim_is_not_remembered() {
        let table: LineTable<u8> = LineTable::new();
        let busy = table.claim(5, || {
            Err(AlmueError::Io {
                pin: 5,
                details: "busy".to_string(),
            })
        });
        assert!(matches!(busy, Err(AlmueError::Io { pin: 5, .. })));
        assert_eq!(*table.claim(5, || Ok(1)).unwrap().lock().unwrap(), 1);
    }
}
