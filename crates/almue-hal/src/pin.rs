//! Generic `Pin` trait for digital output lines.
//!
//! Shutters and lightings are wired to plain on/off output lines.  The
//! controller only ever talks to this trait, so a real GPIO line and a
//! simulated one are interchangeable.

use std::fmt;

use almue_types::AlmueError;

/// Logic level of a digital output line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Level {
    Low,
    High,
}

impl From<bool> for Level {
    fn from(high: bool) -> Self {
        if high { Level::High } else { Level::Low }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Level::Low => write!(f, "low"),
            Level::High => write!(f, "high"),
        }
    }
}

/// A digital output line.
pub trait Pin: Send {
    /// Line number (BCM numbering on a Raspberry Pi).
    fn number(&self) -> u8;

    /// Drive the line to `level`.
    ///
    /// # Errors
    ///
    /// Returns [`AlmueError::Io`] if the line cannot be driven.  Callers do
    /// not retry.
    fn set_level(&mut self, level: Level) -> Result<(), AlmueError>;
}

/// Resolves pin numbers into output lines.
///
/// One factory is chosen per controller (real or simulated) and used for
/// every registration and pin reassignment.
pub trait PinFactory: Send + Sync {
    /// Claim line `number` as an output.  `label` names the device the line
    /// belongs to and shows up in log output.
    fn output(&self, number: u8, label: &str) -> Result<Box<dyn Pin>, AlmueError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_display() {
        assert_eq!(Level::High.to_string(), "high");
        assert_eq!(Level::from(true), Level::High);
        assert_eq!(Level::from(false).to_string(), "low");
    }
}
