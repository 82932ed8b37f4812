//! `almue-runtime` – Process Services
//!
//! The pieces of the daemon that live on the Tokio runtime and are not
//! specific to a device.
//!
//! # Modules
//!
//! - [`scheduler`] – [`TokioScheduler`][scheduler::TokioScheduler]: fires a
//!   callback every day at a fixed local time of day, with cancellable
//!   handles.  Implements [`almue_types::Scheduler`].
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: installs the
//!   global `tracing` subscriber with an optional OTLP span exporter.  Set
//!   `OTEL_EXPORTER_OTLP_ENDPOINT` to enable live trace export.

pub mod scheduler;
pub mod telemetry;

pub use scheduler::{TokioJobHandle, TokioScheduler, next_occurrence};
pub use telemetry::{LogFormat, TracerProviderGuard, init_tracing};
