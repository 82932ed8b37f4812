//! `almue-hal` – Output Line Abstraction
//!
//! Everything the controller needs to know about the physical world is a
//! digital output line that can be driven high or low.
//!
//! # Modules
//!
//! - [`pin`] – the [`Pin`][pin::Pin] capability and the
//!   [`PinFactory`][pin::PinFactory] that resolves pin numbers into lines.
//! - [`sim`] – [`SimulatedPin`][sim::SimulatedPin]: logs the requested level
//!   instead of touching hardware and never fails.
//! - [`gpio`] – [`GpioPinFactory`][gpio::GpioPinFactory]: real output lines
//!   on a Raspberry Pi via `rppal`.
//!
//! The factory is picked once per process from the `simulate` flag with
//! [`pin_factory`].

use std::sync::Arc;

use almue_types::AlmueError;

pub mod gpio;
pub mod pin;
pub mod sim;

pub use gpio::GpioPinFactory;
pub use pin::{Level, Pin, PinFactory};
pub use sim::{SimulatedPin, SimulatedPinFactory};

/// Select the pin factory for the whole controller.
///
/// # Errors
///
/// Returns [`AlmueError::Io`] when real GPIO access is requested but the
/// peripheral cannot be opened.
pub fn pin_factory(simulate: bool) -> Result<Arc<dyn PinFactory>, AlmueError> {
    if simulate {
        Ok(Arc::new(SimulatedPinFactory))
    } else {
        Ok(Arc::new(GpioPinFactory::new()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simulate_flag_selects_simulated_lines() {
        let factory = pin_factory(true).unwrap();
        let mut pin = factory.output(4, "Kitchen").unwrap();
        assert_eq!(pin.number(), 4);
        assert!(pin.set_level(Level::High).is_ok());
    }
}
