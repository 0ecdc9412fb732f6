use keyrepo_core::{
    Key, KeyRepoError, ListenerSlot, Repository, RepositoryListener, Result, UnitId,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, Weak};

/// Unit-level call that reached the wrapped repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepoCall {
    OpenUnit(UnitId),
    CloseUnit { unit: UnitId, wipe: bool },
    RemoveUnit(UnitId),
}

/// Repository wrapper that records unit-level calls and injects failures
pub struct RecordingRepository {
    inner: Arc<dyn Repository>,
    calls: Mutex<Vec<RepoCall>>,
    injected: Mutex<HashMap<UnitId, KeyRepoError>>,
    listener: ListenerSlot,
}

impl RecordingRepository {
    pub fn wrap(inner: Arc<dyn Repository>) -> Arc<Self> {
        Arc::new(Self {
            inner,
            calls: Mutex::new(Vec::new()),
            injected: Mutex::new(HashMap::new()),
            listener: ListenerSlot::default(),
        })
    }

    /// Every recorded call, oldest first
    pub fn calls(&self) -> Vec<RepoCall> {
        self.calls.lock().clone()
    }

    /// Wipe flags of every close of `unit` that reached the repository
    pub fn closes(&self, unit: UnitId) -> Vec<bool> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                RepoCall::CloseUnit { unit: u, wipe } if *u == unit => Some(*wipe),
                _ => None,
            })
            .collect()
    }

    /// Make the next key operation on `unit` fail with `error`
    pub fn fail_next(&self, unit: UnitId, error: KeyRepoError) {
        self.injected.lock().insert(unit, error);
    }

    fn check_injected(&self, key: &Key) -> Result<()> {
        let unit = key.unit();
        let injected = self.injected.lock().remove(&unit);
        match injected {
            Some(error) => self.listener.report(unit, Err(error)),
            None => Ok(()),
        }
    }
}

impl Repository for RecordingRepository {
    fn get(&self, key: &Key) -> Result<Option<Vec<u8>>> {
        self.check_injected(key)?;
        self.inner.get(key)
    }

    fn put(&self, key: &Key, value: &[u8]) -> Result<()> {
        self.check_injected(key)?;
        self.inner.put(key, value)
    }

    fn hang(&self, key: &Key, value: &[u8]) -> Result<()> {
        self.check_injected(key)?;
        self.inner.hang(key, value)
    }

    fn remove(&self, key: &Key) -> Result<()> {
        self.check_injected(key)?;
        self.inner.remove(key)
    }

    fn open_unit(&self, unit: UnitId) -> Result<()> {
        self.calls.lock().push(RepoCall::OpenUnit(unit));
        self.inner.open_unit(unit)
    }

    fn close_unit(&self, unit: UnitId, wipe: bool, required_units: &[UnitId]) -> Result<()> {
        self.calls.lock().push(RepoCall::CloseUnit { unit, wipe });
        self.inner.close_unit(unit, wipe, required_units)
    }

    fn remove_unit(&self, unit: UnitId) -> Result<()> {
        self.calls.lock().push(RepoCall::RemoveUnit(unit));
        self.inner.remove_unit(unit)
    }

    fn is_unit_open(&self, unit: UnitId) -> bool {
        self.inner.is_unit_open(unit)
    }

    fn register_listener(&self, listener: Weak<dyn RepositoryListener>) {
        self.listener.set(listener.clone());
        self.inner.register_listener(listener);
    }
}
