//! [`DifferenceType`] – set of descriptor fields that changed.
//!
//! The control plane compares the stored descriptor with the submitted one
//! (see [`ShutterDescriptor::differences`][crate::ShutterDescriptor::differences])
//! and hands the resulting set to the controller, which reconciles only the
//! parts of the live device that are affected.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

/// Bit set of changed descriptor fields.  The empty set means "no change".
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct DifferenceType(u16);

impl DifferenceType {
    /// No field changed.
    pub const NONE: Self = Self(0);
    /// The emergency participation flag changed.
    pub const EMERGENCY_ENABLED: Self = Self(1 << 0);
    /// The device was disabled or re-enabled.
    pub const DISABLED: Self = Self(1 << 1);
    /// Daily jobs were switched on or off.
    pub const JOBS_ENABLED: Self = Self(1 << 2);
    /// The shutter's open pin moved to another line.
    pub const OPEN_PIN: Self = Self(1 << 3);
    /// The shutter's close pin moved to another line.
    pub const CLOSE_PIN: Self = Self(1 << 4);
    /// The shutter's traversal time changed.
    pub const COMPLETE_WAY_IN_SECONDS: Self = Self(1 << 5);
    /// The shutter's daily open time changed.
    pub const OPEN_TIME: Self = Self(1 << 6);
    /// The shutter's daily close time changed.
    pub const CLOSE_TIME: Self = Self(1 << 7);
    /// The lighting's switch pin moved to another line.
    pub const SWITCH_PIN: Self = Self(1 << 8);
    /// The lighting's daily on time changed.
    pub const ON_TIME: Self = Self(1 << 9);
    /// The lighting's daily off time changed.
    pub const OFF_TIME: Self = Self(1 << 10);

    const NAMES: [(Self, &'static str); 11] = [
        (Self::EMERGENCY_ENABLED, "EMERGENCY_ENABLED"),
        (Self::DISABLED, "DISABLED"),
        (Self::JOBS_ENABLED, "JOBS_ENABLED"),
        (Self::OPEN_PIN, "OPEN_PIN"),
        (Self::CLOSE_PIN, "CLOSE_PIN"),
        (Self::COMPLETE_WAY_IN_SECONDS, "COMPLETE_WAY_IN_SECONDS"),
        (Self::OPEN_TIME, "OPEN_TIME"),
        (Self::CLOSE_TIME, "CLOSE_TIME"),
        (Self::SWITCH_PIN, "SWITCH_PIN"),
        (Self::ON_TIME, "ON_TIME"),
        (Self::OFF_TIME, "OFF_TIME"),
    ];

    /// `true` when no field changed.
    pub fn is_none(self) -> bool {
        self.0 == 0
    }

    /// `true` when every flag in `other` is set.
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// `true` when at least one flag in `other` is set.
    pub fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    /// Raw bit representation.
    pub const fn bits(self) -> u16 {
        self.0
    }

    /// Both sets combined; usable in constants.
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }
}

impl BitOr for DifferenceType {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

impl BitOrAssign for DifferenceType {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for DifferenceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            return write!(f, "NONE");
        }
        let names: Vec<&str> = Self::NAMES
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect();
        write!(f, "{}", names.join(" | "))
    }
}
