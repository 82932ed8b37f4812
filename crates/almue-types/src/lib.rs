//! `almue-types` – shared vocabulary of the almue workspace.
//!
//! # Modules
//!
//! - [`descriptor`] – [`ShutterDescriptor`] and [`LightingDescriptor`], the
//!   stored device definitions handed to the controller.
//! - [`diff`] – [`DifferenceType`], the set of descriptor fields that changed
//!   between two snapshots.
//! - [`state`] – observable device states and the control actions accepted
//!   from the control plane.
//! - [`contract`] – the collaborator traits the controller consumes
//!   ([`StateStore`], [`Scheduler`], [`JobHandle`]).

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod contract;
pub mod descriptor;
pub mod diff;
pub mod state;

pub use contract::{Job, JobHandle, Scheduler, StateStore};
pub use descriptor::{LightingDescriptor, ShutterDescriptor};
pub use diff::DifferenceType;
pub use state::{LightingAction, LightingState, ShutterAction, ShutterState};

/// Identifier of a device as assigned by the persistent store.
pub type DeviceId = i64;

/// The two families of devices the controller drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    Shutter,
    Lighting,
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceKind::Shutter => write!(f, "shutter"),
            DeviceKind::Lighting => write!(f, "lighting"),
        }
    }
}

/// Error type shared by the controller, the pin layer and the collaborators.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AlmueError {
    #[error("{kind} with id {id} is not registered in the device controller")]
    NotRegistered { kind: DeviceKind, id: DeviceId },

    #[error("Pin {pin} failed: {details}")]
    Io { pin: u8, details: String },

    #[error("Scheduling failed: {0}")]
    Schedule(String),

    #[error("Invalid descriptor for device {id}: {details}")]
    InvalidDescriptor { id: DeviceId, details: String },

    #[error("State store error: {0}")]
    StateStore(String),

    #[error("Runtime unavailable: {0}")]
    Runtime(String),
}

impl AlmueError {
    /// HTTP status code the REST layer should answer with for this error.
    pub fn http_status(&self) -> u16 {
        match self {
            AlmueError::NotRegistered { .. } => 404,
            AlmueError::InvalidDescriptor { .. } => 400,
            AlmueError::Io { .. }
            | AlmueError::Schedule(_)
            | AlmueError::StateStore(_)
            | AlmueError::Runtime(_) => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_registered_display_names_kind_and_id() {
        let err = AlmueError::NotRegistered {
            kind: DeviceKind::Shutter,
            id: 42,
        };
        let msg = err.to_string();
        assert!(msg.contains("shutter"));
        assert!(msg.contains("42"));
    }

    #[test]
    fn http_status_mapping() {
        let missing = AlmueError::NotRegistered {
            kind: DeviceKind::Lighting,
            id: 1,
        };
        assert_eq!(missing.http_status(), 404);

        let io = AlmueError::Io {
            pin: 17,
            details: "line busy".to_string(),
        };
        assert_eq!(io.http_status(), 500);
        assert_eq!(AlmueError::Schedule("bad time".into()).http_status(), 500);

        let invalid = AlmueError::InvalidDescriptor {
            id: 3,
            details: "open and close pin are identical".to_string(),
        };
        assert_eq!(invalid.http_status(), 400);
    }

    #[test]
    fn device_kind_serializes_lowercase() {
        let json = serde_json::to_string(&DeviceKind::Lighting).unwrap();
        assert_eq!(json, "\"lighting\"");
    }
}
