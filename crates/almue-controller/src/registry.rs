//! [`Registry`] – the ID → actuator map of one device family.
//!
//! Lookups clone the `Arc` and release the map lock before the caller
//! touches the actuator, so the lock order is always registry first,
//! actuator second, and a lookup racing a removal sees either the old entry
//! or [`AlmueError::NotRegistered`].

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use almue_types::{AlmueError, DeviceId, DeviceKind};

pub(crate) struct Registry<T> {
    kind: DeviceKind,
    devices: RwLock<HashMap<DeviceId, Arc<T>>>,
}

impl<T> Registry<T> {
    pub(crate) fn new(kind: DeviceKind) -> Self {
        Self {
            kind,
            devices: RwLock::new(HashMap::new()),
        }
    }

    /// # Errors
    ///
    /// Returns [`AlmueError::NotRegistered`] for an unknown `id`.
    pub(crate) fn get(&self, id: DeviceId) -> Result<Arc<T>, AlmueError> {
        self.devices
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
            .ok_or(AlmueError::NotRegistered {
                kind: self.kind,
                id,
            })
    }

    pub(crate) fn contains(&self, id: DeviceId) -> bool {
        self.devices
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&id)
    }

    /// Insert `device`, returning whatever was registered under `id` before.
    pub(crate) fn insert(&self, id: DeviceId, device: Arc<T>) -> Option<Arc<T>> {
        self.devices
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, device)
    }

    pub(crate) fn remove(&self, id: DeviceId) -> Option<Arc<T>> {
        self.devices
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id)
    }

    /// Remove `id` only while it still maps to `device`, so an entry
    /// registered concurrently under the same ID survives.
    pub(crate) fn remove_entry(&self, id: DeviceId, device: &Arc<T>) -> Option<Arc<T>> {
        let mut devices = self.devices.write().unwrap_or_else(PoisonError::into_inner);
        match devices.get(&id) {
            Some(current) if Arc::ptr_eq(current, device) => devices.remove(&id),
            _ => None,
        }
    }

    /// Registered IDs in ascending order.
    pub(crate) fn ids(&self) -> Vec<DeviceId> {
        let mut ids: Vec<DeviceId> = self
            .devices
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .copied()
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Every entry except `skip`, for cross-device checks.
    pub(crate) fn others(&self, skip: Option<DeviceId>) -> Vec<(DeviceId, Arc<T>)> {
        self.devices
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(id, _)| Some(**id) != skip)
            .map(|(id, device)| (*id, Arc::clone(device)))
            .collect()
    }
}
