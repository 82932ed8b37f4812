//! Observable device states and control-plane actions.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Phase of a shutter as reported to the state store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShutterState {
    /// Both pins are low; the motor is idle.
    Stopped,
    /// A full-duration homing drive towards an end position the shutter is
    /// already believed to be at.
    Referencing,
    /// Percentage-tracked drive towards fully open.
    Opening,
    /// Percentage-tracked drive towards fully closed.
    Closing,
}

impl ShutterState {
    /// Label stored by the state store.
    pub fn as_str(&self) -> &'static str {
        match self {
            ShutterState::Stopped => "stopped",
            ShutterState::Referencing => "referencing",
            ShutterState::Opening => "opening",
            ShutterState::Closing => "closing",
        }
    }

    /// Inverse of [`as_str`][Self::as_str].
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "stopped" => Some(ShutterState::Stopped),
            "referencing" => Some(ShutterState::Referencing),
            "opening" => Some(ShutterState::Opening),
            "closing" => Some(ShutterState::Closing),
            _ => None,
        }
    }
}

impl fmt::Display for ShutterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Switching state of a lighting circuit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LightingState {
    On,
    Off,
}

impl LightingState {
    /// Label stored by the state store.
    pub fn as_str(&self) -> &'static str {
        match self {
            LightingState::On => "on",
            LightingState::Off => "off",
        }
    }

    /// Inverse of [`as_str`][Self::as_str].
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "on" => Some(LightingState::On),
            "off" => Some(LightingState::Off),
            _ => None,
        }
    }
}

impl fmt::Display for LightingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Command accepted for a shutter (`POST …/shutters/{id}/{action}`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShutterAction {
    Open,
    Close,
    Stop,
}

impl FromStr for ShutterAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(ShutterAction::Open),
            "close" => Ok(ShutterAction::Close),
            "stop" => Ok(ShutterAction::Stop),
            other => Err(format!("invalid shutter action '{other}'")),
        }
    }
}

/// Command accepted for a lighting (`POST …/lightings/{id}/{action}`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LightingAction {
    On,
    Off,
}

impl FromStr for LightingAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "on" => Ok(LightingAction::On),
            "off" => Ok(LightingAction::Off),
            other => Err(format!("invalid lighting action '{other}'")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shutter_state_labels() {
        for state in [
            ShutterState::Stopped,
            ShutterState::Referencing,
            ShutterState::Opening,
            ShutterState::Closing,
        ] {
            assert_eq!(ShutterState::from_label(state.as_str()), Some(state));
        }
        assert_eq!(ShutterState::from_label("moving"), None);
    }

    #[test]
    fn lighting_state_display() {
        assert_eq!(LightingState::On.to_string(), "on");
        assert_eq!(LightingState::from_label("off"), Some(LightingState::Off));
    }

    #[test]
    fn actions_parse_from_path_segment() {
        assert_eq!("open".parse::<ShutterAction>(), Ok(ShutterAction::Open));
        assert_eq!("stop".parse::<ShutterAction>(), Ok(ShutterAction::Stop));
        assert!("on".parse::<ShutterAction>().is_err());
        assert_eq!("off".parse::<LightingAction>(), Ok(LightingAction::Off));
        assert!("toggle".parse::<LightingAction>().is_err());
    }
}
