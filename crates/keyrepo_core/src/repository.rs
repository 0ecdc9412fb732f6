//! Boundary to the byte-level persistence engine.
//!
//! A [`Repository`] stores opaque values addressed by keys, grouped by unit.
//! Units open implicitly on first key traffic; every open and close is
//! reported to the registered [`RepositoryListener`], and every failure to
//! its exception callback before the error is returned.

use crate::error::{KeyRepoError, Result};
use crate::key::Key;
use crate::unit::UnitId;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};
use tracing::debug;

/// Receives repository failures.
pub trait RepositoryExceptionListener: Send + Sync {
    /// A repository operation on `unit` failed with `error`.
    fn an_exception_happened(&self, unit: UnitId, error: &KeyRepoError);
}

/// Receives unit open/close notifications and failures.
pub trait RepositoryListener: RepositoryExceptionListener {
    /// `unit` went from closed to open, explicitly or by key traffic.
    fn unit_opened(&self, unit: UnitId);

    /// `unit` was closed.
    fn unit_closed(&self, unit: UnitId);
}

/// Byte-level store addressed by keys.
pub trait Repository: Send + Sync {
    /// Value stored under `key`; hung values shadow persisted ones.
    fn get(&self, key: &Key) -> Result<Option<Vec<u8>>>;

    /// Persists `value` under `key`, replacing any hung value.
    fn put(&self, key: &Key, value: &[u8]) -> Result<()>;

    /// Keeps `value` under `key` in memory until the unit closes.
    fn hang(&self, key: &Key, value: &[u8]) -> Result<()>;

    /// Drops whatever is stored under `key`.
    fn remove(&self, key: &Key) -> Result<()>;

    /// Opens `unit` if it is closed.
    fn open_unit(&self, unit: UnitId) -> Result<()>;

    /// Closes `unit`, deleting its persisted entries when `wipe` is set.
    /// `required_units` are library units the unit depends on; they stay open.
    fn close_unit(&self, unit: UnitId, wipe: bool, required_units: &[UnitId]) -> Result<()>;

    /// Closes `unit` and forgets everything about it.
    fn remove_unit(&self, unit: UnitId) -> Result<()>;

    /// Whether `unit` is currently open.
    fn is_unit_open(&self, unit: UnitId) -> bool;

    /// Registers the listener; replaces any previous one.
    fn register_listener(&self, listener: Weak<dyn RepositoryListener>);
}

/// Weakly held listener shared by repository implementations.
#[derive(Default)]
pub struct ListenerSlot {
    listener: RwLock<Option<Weak<dyn RepositoryListener>>>,
}

impl ListenerSlot {
    /// Replaces the listener.
    pub fn set(&self, listener: Weak<dyn RepositoryListener>) {
        *self.listener.write() = Some(listener);
    }

    fn current(&self) -> Option<Arc<dyn RepositoryListener>> {
        self.listener.read().as_ref().and_then(Weak::upgrade)
    }

    /// Reports an opened unit.
    pub fn opened(&self, unit: UnitId) {
        if let Some(listener) = self.current() {
            listener.unit_opened(unit);
        }
    }

    /// Reports a closed unit.
    pub fn closed(&self, unit: UnitId) {
        if let Some(listener) = self.current() {
            listener.unit_closed(unit);
        }
    }

    /// Passes `result` through, reporting an error to the listener first.
    pub fn report<T>(&self, unit: UnitId, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            if let Some(listener) = self.current() {
                listener.an_exception_happened(unit, e);
            }
        }
        result
    }
}

/// Open units and their hung values.
#[derive(Default)]
pub struct UnitSessions {
    open: HashSet<UnitId>,
    hung: HashMap<UnitId, HashMap<Key, Arc<[u8]>>>,
}

impl UnitSessions {
    /// Marks `unit` open; true if it was closed.
    pub fn open(&mut self, unit: UnitId) -> bool {
        let newly = self.open.insert(unit);
        if newly {
            debug!(unit = %unit, "unit opened");
        }
        newly
    }

    /// Marks `unit` closed and drops its hung values; true if it was open.
    pub fn close(&mut self, unit: UnitId) -> bool {
        let dropped = self.hung.remove(&unit).map_or(0, |m| m.len());
        let was_open = self.open.remove(&unit);
        if was_open {
            debug!(unit = %unit, dropped_hung = dropped, "unit closed");
        }
        was_open
    }

    /// Whether `unit` is open.
    pub fn is_open(&self, unit: UnitId) -> bool {
        self.open.contains(&unit)
    }

    /// Open units, unordered.
    pub fn open_units(&self) -> impl Iterator<Item = UnitId> + '_ {
        self.open.iter().copied()
    }

    /// Hangs `value` under `key`.
    pub fn hang(&mut self, key: &Key, value: &[u8]) {
        self.hung
            .entry(key.unit())
            .or_default()
            .insert(key.clone(), Arc::from(value));
    }

    /// Hung value under `key`.
    pub fn hung(&self, key: &Key) -> Option<Arc<[u8]>> {
        self.hung.get(&key.unit())?.get(key).cloned()
    }

    /// Drops the hung value under `key`.
    pub fn unhang(&mut self, key: &Key) {
        if let Some(unit) = self.hung.get_mut(&key.unit()) {
            unit.remove(key);
        }
    }
}
