//! SQLite-backed record of the last observed state of every device.
//!
//! The controller reports every phase change, every position tick and every
//! lighting switch here.  At startup the daemon reads the last known
//! openings back to seed its shutters, so a restart does not forget where a
//! shutter was left.
//!
//! # Storage layout
//!
//! | table | columns |
//! |---|---|
//! | `shutter_states` | `id` (PK), `state`, `opening_in_prc` (NULL until the first tick), `updated_at` |
//! | `lighting_states` | `id` (PK), `state`, `updated_at` |
//!
//! Rows are upserted; `updated_at` is an RFC-3339 UTC timestamp.
//!
//! # Example
//!
//! ```rust
//! use almue_store::SqliteStateStore;
//! use almue_types::{ShutterState, StateStore};
//!
//! let store = SqliteStateStore::open_in_memory().unwrap();
//! store.update_shutter_opening(1, 35).unwrap();
//! store.update_shutter_state(1, ShutterState::Stopped).unwrap();
//!
//! let status = store.shutter_status(1).unwrap().unwrap();
//! assert_eq!(status.opening_in_prc, Some(35));
//! ```

use std::sync::{Mutex, MutexGuard, PoisonError};

use almue_types::{
    AlmueError, DeviceId, LightingState, ShutterDescriptor, ShutterState, StateStore,
};
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

// ─────────────────────────────────────────────────────────────────────────────
// Error type
// ─────────────────────────────────────────────────────────────────────────────

/// Errors raised by the state store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Unknown {kind} state '{label}' stored for device {id}")]
    UnknownState {
        kind: &'static str,
        id: DeviceId,
        label: String,
    },
}

impl From<StoreError> for AlmueError {
    fn from(e: StoreError) -> Self {
        AlmueError::StateStore(e.to_string())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Query results
// ─────────────────────────────────────────────────────────────────────────────

/// Last recorded status of a shutter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShutterStatus {
    pub state: ShutterState,
    /// `None` until the shutter reported its first position tick.
    pub opening_in_prc: Option<u8>,
    pub updated_at: String,
}

/// Last recorded status of a lighting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LightingStatus {
    pub state: LightingState,
    pub updated_at: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// SqliteStateStore
// ─────────────────────────────────────────────────────────────────────────────

/// [`StateStore`] on a single SQLite connection.
pub struct SqliteStateStore {
    conn: Mutex<Connection>,
}

impl SqliteStateStore {
    /// Open (or create) the database at `path`.
    pub fn open(path: &str) -> Result<Self, StoreError> {
        let store = Self {
            conn: Mutex::new(Connection::open(path)?),
        };
        store.init_schema()?;
        info!(path, "state store opened");
        Ok(store)
    }

    /// Open a temporary in-memory database (useful for testing).
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let store = Self {
            conn: Mutex::new(Connection::open_in_memory()?),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn init_schema(&self) -> Result<(), StoreError> {
        self.conn().execute_batch(
            "CREATE TABLE IF NOT EXISTS shutter_states (
                id             INTEGER NOT NULL PRIMARY KEY,
                state          TEXT    NOT NULL,
                opening_in_prc INTEGER,
                updated_at     TEXT    NOT NULL
            );
            CREATE TABLE IF NOT EXISTS lighting_states (
                id         INTEGER NOT NULL PRIMARY KEY,
                state      TEXT    NOT NULL,
                updated_at TEXT    NOT NULL
            );",
        )?;
        Ok(())
    }

    fn record_shutter_state(&self, id: DeviceId, state: ShutterState) -> Result<(), StoreError> {
        self.conn().execute(
            "INSERT INTO shutter_states (id, state, opening_in_prc, updated_at)
             VALUES (?1, ?2, NULL, ?3)
             ON CONFLICT(id) DO UPDATE SET state = excluded.state, updated_at = excluded.updated_at",
            params![id, state.as_str(), Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    fn record_shutter_opening(&self, id: DeviceId, percent: u8) -> Result<(), StoreError> {
        self.conn().execute(
            "INSERT INTO shutter_states (id, state, opening_in_prc, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(id) DO UPDATE SET
                 opening_in_prc = excluded.opening_in_prc,
                 updated_at = excluded.updated_at",
            params![
                id,
                ShutterState::Stopped.as_str(),
                percent,
                Utc::now().to_rfc3339()
            ],
        )?;
        Ok(())
    }

    fn record_lighting_state(&self, id: DeviceId, state: LightingState) -> Result<(), StoreError> {
        self.conn().execute(
            "INSERT INTO lighting_states (id, state, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET state = excluded.state, updated_at = excluded.updated_at",
            params![id, state.as_str(), Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    /// Last recorded status of shutter `id`, if it ever reported.
    pub fn shutter_status(&self, id: DeviceId) -> Result<Option<ShutterStatus>, StoreError> {
        let row = self
            .conn()
            .query_row(
                "SELECT state, opening_in_prc, updated_at FROM shutter_states WHERE id = ?1",
                params![id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, Option<u8>>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                },
            )
            .optional()?;
        let Some((label, opening_in_prc, updated_at)) = row else {
            return Ok(None);
        };
        let state = ShutterState::from_label(&label).ok_or(StoreError::UnknownState {
            kind: "shutter",
            id,
            label,
        })?;
        Ok(Some(ShutterStatus {
            state,
            opening_in_prc,
            updated_at,
        }))
    }

    /// Last recorded status of lighting `id`, if it ever reported.
    pub fn lighting_state(&self, id: DeviceId) -> Result<Option<LightingStatus>, StoreError> {
        let row = self
            .conn()
            .query_row(
                "SELECT state, updated_at FROM lighting_states WHERE id = ?1",
                params![id],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
            )
            .optional()?;
        let Some((label, updated_at)) = row else {
            return Ok(None);
        };
        let state = LightingState::from_label(&label).ok_or(StoreError::UnknownState {
            kind: "lighting",
            id,
            label,
        })?;
        Ok(Some(LightingStatus { state, updated_at }))
    }

    /// Replace each descriptor's `opening_in_prc` with the last recorded
    /// opening, where one exists.  Returns how many were seeded.
    pub fn seed_openings(&self, shutters: &mut [ShutterDescriptor]) -> Result<usize, StoreError> {
        let mut seeded = 0;
        for shutter in shutters.iter_mut() {
            if let Some(opening) = self
                .shutter_status(shutter.id)?
                .and_then(|status| status.opening_in_prc)
            {
                debug!(shutter = shutter.id, opening, "seeding opening from state store");
                shutter.opening_in_prc = opening;
                seeded += 1;
            }
        }
        Ok(seeded)
    }
}

impl StateStore for SqliteStateStore {
    fn update_shutter_state(&self, id: DeviceId, state: ShutterState) -> Result<(), AlmueError> {
        Ok(self.record_shutter_state(id, state)?)
    }

    fn update_shutter_opening(&self, id: DeviceId, percent: u8) -> Result<(), AlmueError> {
        Ok(self.record_shutter_opening(id, percent)?)
    }

    fn update_lighting_state(&self, id: DeviceId, state: LightingState) -> Result<(), AlmueError> {
        Ok(self.record_lighting_state(id, state)?)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::NaiveTime;

    use super::*;

    fn store() -> SqliteStateStore {
        SqliteStateStore::open_in_memory().unwrap()
    }

    fn descriptor(id: DeviceId, opening_in_prc: u8) -> ShutterDescriptor {
        ShutterDescriptor {
            id,
            floor_id: 1,
            description: format!("Shutter {id}"),
            open_pin: 17,
            close_pin: 27,
            complete_way_in_seconds: 20,
            jobs_enabled: false,
            open_time: NaiveTime::from_hms_opt(7, 0, 0).unwrap(),
            close_time: NaiveTime::from_hms_opt(21, 0, 0).unwrap(),
            emergency_enabled: false,
            disabled: false,
            opening_in_prc,
        }
    }

    #[test]
    fn unknown_devices_have_no_status() {
        let store = store();
        assert_eq!(store.shutter_status(1).unwrap(), None);
        assert_eq!(store.lighting_state(1).unwrap(), None);
    }

    #[test]
    fn state_without_ticks_has_no_opening() {
        let store = store();
        store.update_shutter_state(3, ShutterState::Referencing).unwrap();
        let status = store.shutter_status(3).unwrap().unwrap();
        assert_eq!(status.state, ShutterState::Referencing);
        assert_eq!(status.opening_in_prc, None);
    }

    #[test]
    fn state_and_opening_update_independently() {
        let store = store();
        store.update_shutter_state(1, ShutterState::Opening).unwrap();
        store.update_shutter_opening(1, 5).unwrap();
        store.update_shutter_opening(1, 10).unwrap();

        let status = store.shutter_status(1).unwrap().unwrap();
        assert_eq!(status.state, ShutterState::Opening);
        assert_eq!(status.opening_in_prc, Some(10));

        store.update_shutter_state(1, ShutterState::Stopped).unwrap();
        let status = store.shutter_status(1).unwrap().unwrap();
        assert_eq!(status.state, ShutterState::Stopped);
        assert_eq!(status.opening_in_prc, Some(10));
    }

    #[test]
    fn opening_before_state_defaults_to_stopped() {
        let store = store();
        store.update_shutter_opening(2, 55).unwrap();
        let status = store.shutter_status(2).unwrap().unwrap();
        assert_eq!(status.state, ShutterState::Stopped);
        assert_eq!(status.opening_in_prc, Some(55));
    }

    #[test]
    fn lighting_state_upserts() {
        let store = store();
        store.update_lighting_state(4, LightingState::On).unwrap();
        store.update_lighting_state(4, LightingState::Off).unwrap();
        assert_eq!(
            store.lighting_state(4).unwrap().unwrap().state,
            LightingState::Off
        );
    }

    #[test]
    fn unknown_label_is_reported() {
        let store = store();
        store
            .conn()
            .execute(
                "INSERT INTO lighting_states (id, state, updated_at) VALUES (9, 'dimmed', 'now')",
                [],
            )
            .unwrap();
        let err = store.lighting_state(9).unwrap_err();
        assert!(matches!(err, StoreError::UnknownState { id: 9, .. }));
        assert!(AlmueError::from(err).to_string().contains("dimmed"));
    }

    #[test]
    fn seed_openings_uses_recorded_positions_only() {
        let store = store();
        store.update_shutter_opening(1, 70).unwrap();
        store.update_shutter_state(2, ShutterState::Stopped).unwrap();

        let mut shutters = vec![descriptor(1, 0), descriptor(2, 30), descriptor(3, 100)];
        assert_eq!(store.seed_openings(&mut shutters).unwrap(), 1);
        assert_eq!(shutters[0].opening_in_prc, 70);
        assert_eq!(shutters[1].opening_in_prc, 30);
        assert_eq!(shutters[2].opening_in_prc, 100);
    }

    #[test]
    fn usable_as_shared_state_store() {
        let store: Arc<dyn StateStore> = Arc::new(store());
        let handles: Vec<_> = (0..4)
            .map(|id| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for percent in (0..=100).step_by(5) {
                        store.update_shutter_opening(id, percent).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
    }

    #[test]
    fn file_database_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("almue.db");
        let path = path.to_str().unwrap();
        {
            let store = SqliteStateStore::open(path).unwrap();
            store.update_shutter_opening(1, 45).unwrap();
        }
        let store = SqliteStateStore::open(path).unwrap();
        assert_eq!(
            store.shutter_status(1).unwrap().unwrap().opening_in_prc,
            Some(45)
        );
    }
}
