//! In-memory repository for non-persistent mode and tests.

use crate::error::{KeyRepoError, Result};
use crate::key::Key;
use crate::repository::{ListenerSlot, Repository, RepositoryListener, UnitSessions};
use crate::unit::UnitId;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tracing::{debug, info};

#[derive(Default)]
struct State {
    sessions: UnitSessions,
    stored: HashMap<UnitId, HashMap<Key, Arc<[u8]>>>,
    #[cfg(test)]
    injected: HashMap<UnitId, KeyRepoError>,
}

impl State {
    #[cfg(test)]
    fn take_injected(&mut self, unit: UnitId) -> Option<KeyRepoError> {
        self.injected.remove(&unit)
    }

    #[cfg(not(test))]
    fn take_injected(&mut self, _unit: UnitId) -> Option<KeyRepoError> {
        None
    }
}

/// Repository keeping every value in process memory.
///
/// Persisted values survive unit close unless the close wipes the unit.
/// Failures can only be injected from this crate's own tests:
///
/// ```compile_fail
/// use keyrepo_core::{KeyRepoError, MemoryRepository, UnitId};
///
/// let repo = MemoryRepository::new();
/// repo.fail_next(UnitId::new(10001), KeyRepoError::Storage("disk".into()));
/// ```
#[derive(Default)]
pub struct MemoryRepository {
    state: Mutex<State>,
    listener: ListenerSlot,
}

impl MemoryRepository {
    /// Creates an empty repository.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next key operation on `unit` fail with `error`.
    #[cfg(test)]
    pub(crate) fn fail_next(&self, unit: UnitId, error: KeyRepoError) {
        self.state.lock().injected.insert(unit, error);
    }

    /// Number of persisted entries of `unit`.
    pub fn entry_count(&self, unit: UnitId) -> usize {
        self.state.lock().stored.get(&unit).map_or(0, HashMap::len)
    }

    /// Runs `op` on the state of `key`'s unit, opening the unit first.
    fn with_unit<T>(&self, key: &Key, op: impl FnOnce(&mut State) -> T) -> Result<T> {
        let unit = key.unit();
        let (newly_opened, result) = {
            let mut state = self.state.lock();
            let newly_opened = state.sessions.open(unit);
            let result = match state.take_injected(unit) {
                Some(error) => Err(error),
                None => Ok(op(&mut state)),
            };
            (newly_opened, result)
        };
        if newly_opened {
            self.listener.opened(unit);
        }
        self.listener.report(unit, result)
    }
}

impl Repository for MemoryRepository {
    fn get(&self, key: &Key) -> Result<Option<Vec<u8>>> {
        self.with_unit(key, |state| {
            state
                .sessions
                .hung(key)
                .or_else(|| state.stored.get(&key.unit())?.get(key).cloned())
                .map(|v| v.to_vec())
        })
    }

    fn put(&self, key: &Key, value: &[u8]) -> Result<()> {
        self.with_unit(key, |state| {
            state.sessions.unhang(key);
            state
                .stored
                .entry(key.unit())
                .or_default()
                .insert(key.clone(), Arc::from(value));
        })
    }

    fn hang(&self, key: &Key, value: &[u8]) -> Result<()> {
        self.with_unit(key, |state| state.sessions.hang(key, value))
    }

    fn remove(&self, key: &Key) -> Result<()> {
        self.with_unit(key, |state| {
            state.sessions.unhang(key);
            if let Some(unit) = state.stored.get_mut(&key.unit()) {
                unit.remove(key);
            }
        })
    }

    fn open_unit(&self, unit: UnitId) -> Result<()> {
        let newly_opened = self.state.lock().sessions.open(unit);
        if newly_opened {
            self.listener.opened(unit);
        }
        Ok(())
    }

    fn close_unit(&self, unit: UnitId, wipe: bool, required_units: &[UnitId]) -> Result<()> {
        let was_open = {
            let mut state = self.state.lock();
            if wipe {
                let wiped = state.stored.remove(&unit).map_or(0, |m| m.len());
                info!(unit = %unit, entries = wiped, "wiped unit");
            }
            state.sessions.close(unit)
        };
        if !required_units.is_empty() {
            debug!(unit = %unit, required = ?required_units, "required units stay open");
        }
        if was_open {
            self.listener.closed(unit);
        }
        Ok(())
    }

    fn remove_unit(&self, unit: UnitId) -> Result<()> {
        self.close_unit(unit, true, &[])?;
        #[cfg(test)]
        self.state.lock().injected.remove(&unit);
        Ok(())
    }

    fn is_unit_open(&self, unit: UnitId) -> bool {
        self.state.lock().sessions.is_open(unit)
    }

    fn register_listener(&self, listener: Weak<dyn RepositoryListener>) {
        self.listener.set(listener);
    }
}
