//! Simulated output lines for running without GPIO hardware.
//!
//! [`SimulatedPin`] logs every requested level instead of touching a line
//! and never fails.  [`SimulatedPinFactory`] hands them out for any pin
//! number, which lets the whole controller run on a development machine or
//! in CI.

use almue_types::AlmueError;
use tracing::info;

use crate::pin::{Level, Pin, PinFactory};

/// A simulated output line.  Records the last level it was driven to.
#[derive(Debug)]
pub struct SimulatedPin {
    label: String,
    number: u8,
    level: Level,
}

impl SimulatedPin {
    /// Create a simulated line labelled with the owning device's name.
    pub fn new(label: impl Into<String>, number: u8) -> Self {
        Self {
            label: label.into(),
            number,
            level: Level::Low,
        }
    }

    /// The level most recently requested.
    pub fn level(&self) -> Level {
        self.level
    }
}

impl Pin for SimulatedPin {
    fn number(&self) -> u8 {
        self.number
    }

    fn set_level(&mut self, level: Level) -> Result<(), AlmueError> {
        info!(device = %self.label, pin = self.number, %level, "simulated pin switching level");
        self.level = level;
        Ok(())
    }
}

/// Hands out a [`SimulatedPin`] for every requested line.
#[derive(Debug, Default, Clone, Copy)]
pub struct SimulatedPinFactory;

impl PinFactory for SimulatedPinFactory {
    fn output(&self, number: u8, label: &str) -> Result<Box<dyn Pin>, AlmueError> {
        Ok(Box::new(SimulatedPin::new(label, number)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simulated_pin_records_level() {
        let mut pin = SimulatedPin::new("Living room", 17);
        assert_eq!(pin.level(), Level::Low);
        pin.set_level(Level::High).unwrap();
        assert_eq!(pin.level(), Level::High);
        pin.set_level(Level::Low).unwrap();
        assert_eq!(pin.level(), Level::Low);
    }

    #[test]
    fn factory_hands_out_requested_number() {
        let pin = SimulatedPinFactory.output(22, "Porch").unwrap();
        assert_eq!(pin.number(), 22);
    }

    #[test]
    fn simulated_pin_never_fails() {
        let mut pin = SimulatedPinFactory.output(5, "Bedroom").unwrap();
        for _ in 0..3 {
            assert!(pin.set_level(Level::High).is_ok());
            assert!(pin.set_level(Level::Low).is_ok());
        }
    }
}
