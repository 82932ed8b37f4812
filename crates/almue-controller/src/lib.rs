//! `almue-controller` – Device Actuation
//!
//! Drives the shutters and lightings of a building through digital output
//! lines and keeps each live device in step with its stored definition.
//!
//! # Modules
//!
//! - [`controller`] – [`DeviceController`]: registration, control actions,
//!   daily job management and the queries the control plane needs.  Build
//!   one with [`DeviceController::builder`].
//! - `shutter` – the shutter actuator: open/close/stop, percentage tracking
//!   in 5-point ticks and full-duration reference drives.
//! - `lighting` – the lighting actuator: one switched line.
//! - `reconcile` – applies a [`DifferenceType`][almue_types::DifferenceType]
//!   to a live device in a fixed, load-bearing order.
//! - `registry` – the per-family ID → actuator maps.
//!
//! # Concurrency
//!
//! Control-plane calls, shutter tickers and scheduler callbacks run
//! concurrently.  Each actuator serialises its own operations behind a
//! mutex that is never held across an `.await`; different devices never
//! contend.  Locks are always taken registry first, actuator second.

pub mod controller;

mod jobs;
mod lighting;
mod reconcile;
mod registry;
mod shutter;

#[cfg(test)]
mod testing;

pub use controller::{DeviceController, DeviceControllerBuilder};
