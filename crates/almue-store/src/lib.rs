//! `almue-store` – Observed Device State
//!
//! Persists what the controller last saw of every device, on a local SQLite
//! substrate.
//!
//! # Modules
//!
//! - [`state_store`] – [`SqliteStateStore`][state_store::SqliteStateStore]:
//!   implements [`almue_types::StateStore`] with upserted rows per device and
//!   answers last-known-state queries, including the shutter openings used
//!   to seed the controller at startup.

pub mod state_store;

pub use state_store::{LightingStatus, ShutterStatus, SqliteStateStore, StoreError};
