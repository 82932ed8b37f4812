//! Stored device definitions.
//!
//! Descriptors are owned by the persistent store and handed to the
//! controller by value or reference.  They are plain data: the controller
//! builds its own live actuator from a descriptor and never keeps the
//! descriptor itself.

use std::time::Duration;

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

use crate::diff::DifferenceType;
use crate::{AlmueError, DeviceId};

/// Definition of a motorized window shutter driven by two output lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShutterDescriptor {
    pub id: DeviceId,
    #[serde(default)]
    pub floor_id: DeviceId,
    #[serde(default)]
    pub description: String,
    pub open_pin: u8,
    pub close_pin: u8,
    /// Time in seconds the motor needs to move from fully closed to fully open.
    pub complete_way_in_seconds: u32,
    #[serde(default)]
    pub jobs_enabled: bool,
    pub open_time: NaiveTime,
    pub close_time: NaiveTime,
    #[serde(default)]
    pub emergency_enabled: bool,
    #[serde(default)]
    pub disabled: bool,
    /// Last known position, 0 = fully closed, 100 = fully open.
    #[serde(default)]
    pub opening_in_prc: u8,
}

impl ShutterDescriptor {
    /// Duration of a full traversal between the two end positions.
    pub fn complete_way(&self) -> Duration {
        Duration::from_secs(u64::from(self.complete_way_in_seconds))
    }

    /// Check the descriptor for values the controller cannot drive.
    ///
    /// # Errors
    ///
    /// Returns [`AlmueError::InvalidDescriptor`] when both pins are the same
    /// line, the traversal time is zero or the opening exceeds 100 percent.
    pub fn validate(&self) -> Result<(), AlmueError> {
        let invalid = |details: &str| AlmueError::InvalidDescriptor {
            id: self.id,
            details: details.to_string(),
        };
        if self.open_pin == self.close_pin {
            return Err(invalid("open and close pin must be different lines"));
        }
        if self.complete_way_in_seconds == 0 {
            return Err(invalid("complete way in seconds must be greater than zero"));
        }
        if self.opening_in_prc > 100 {
            return Err(invalid("opening in percent must be between 0 and 100"));
        }
        Ok(())
    }

    /// Compute the fields that differ between `self` (the stored version) and
    /// `updated` (the newly submitted version).
    pub fn differences(&self, updated: &ShutterDescriptor) -> DifferenceType {
        let mut diffs = DifferenceType::NONE;
        if self.open_pin != updated.open_pin {
            diffs |= DifferenceType::OPEN_PIN;
        }
        if self.close_pin != updated.close_pin {
            diffs |= DifferenceType::CLOSE_PIN;
        }
        if self.complete_way_in_seconds != updated.complete_way_in_seconds {
            diffs |= DifferenceType::COMPLETE_WAY_IN_SECONDS;
        }
        if self.jobs_enabled != updated.jobs_enabled {
            diffs |= DifferenceType::JOBS_ENABLED;
        }
        if self.open_time != updated.open_time {
            diffs |= DifferenceType::OPEN_TIME;
        }
        if self.close_time != updated.close_time {
            diffs |= DifferenceType::CLOSE_TIME;
        }
        if self.emergency_enabled != updated.emergency_enabled {
            diffs |= DifferenceType::EMERGENCY_ENABLED;
        }
        if self.disabled != updated.disabled {
            diffs |= DifferenceType::DISABLED;
        }
        diffs
    }
}

/// Definition of a switched lighting circuit driven by one output line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LightingDescriptor {
    pub id: DeviceId,
    #[serde(default)]
    pub floor_id: DeviceId,
    #[serde(default)]
    pub description: String,
    pub switch_pin: u8,
    #[serde(default)]
    pub jobs_enabled: bool,
    pub on_time: NaiveTime,
    pub off_time: NaiveTime,
    #[serde(default)]
    pub emergency_enabled: bool,
    #[serde(default)]
    pub disabled: bool,
}

impl LightingDescriptor {
    /// Compute the fields that differ between `self` and `updated`.
    pub fn differences(&self, updated: &LightingDescriptor) -> DifferenceType {
        let mut diffs = DifferenceType::NONE;
        if self.switch_pin != updated.switch_pin {
            diffs |= DifferenceType::SWITCH_PIN;
        }
        if self.jobs_enabled != updated.jobs_enabled {
            diffs |= DifferenceType::JOBS_ENABLED;
        }
        if self.on_time != updated.on_time {
            diffs |= DifferenceType::ON_TIME;
        }
        if self.off_time != updated.off_time {
            diffs |= DifferenceType::OFF_TIME;
        }
        if self.emergency_enabled != updated.emergency_enabled {
            diffs |= DifferenceType::EMERGENCY_ENABLED;
        }
        if self.disabled != updated.disabled {
            diffs |= DifferenceType::DISABLED;
        }
        diffs
    }
}
