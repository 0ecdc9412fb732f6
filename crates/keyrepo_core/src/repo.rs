//! Repository handle providing the main key repository API.

use crate::config::Config;
use crate::error::Result;
use crate::key::{Key, SharedKey};
use crate::lifecycle::UnitLifecycleManager;
use crate::memory_repository::MemoryRepository;
use crate::pool::{KeyPool, NamePool, PoolStats};
use crate::registry::KeyRegistry;
use crate::repository::Repository;
use crate::storage::RedbRepository;
use crate::unit::UnitId;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::{debug, warn};

/// Key repository handle.
///
/// Bundles the interning pools, the serialization registry, the byte-level
/// repository and the unit lifecycle manager behind one API.
pub struct KeyRepo {
    config: Config,
    /// Root directory of a persistent repository.
    root: Option<PathBuf>,
    keys: Arc<KeyPool>,
    names: Arc<NamePool>,
    registry: Arc<KeyRegistry>,
    repository: Arc<dyn Repository>,
    /// Set when the repository is backed by redb.
    storage: Option<Arc<RedbRepository>>,
    lifecycle: Arc<UnitLifecycleManager>,
}

impl KeyRepo {
    /// Opens the repository under `root`, reading `<root>/config.toml`.
    ///
    /// With `storage.persistent = false` in the config, values are kept in
    /// memory and nothing but the config is read from `root`.
    ///
    /// # Errors
    ///
    /// Returns an error if the config can't be parsed, the repository is
    /// locked by another process, or the database can't be opened.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use keyrepo_core::KeyRepo;
    ///
    /// let runtime = tokio::runtime::Runtime::new().unwrap();
    /// let repo = KeyRepo::open(".keyrepo", runtime.handle().clone()).unwrap();
    /// ```
    pub fn open(root: impl AsRef<Path>, runtime: Handle) -> Result<Self> {
        let root = root.as_ref();
        let config = Config::load(root)?;
        let (keys, names, registry) = Self::build_registry(&config);

        let (repository, storage): (Arc<dyn Repository>, _) = if config.storage.persistent {
            let storage = Arc::new(RedbRepository::open(
                root,
                registry.clone(),
                &config.storage,
            )?);
            (storage.clone(), Some(storage))
        } else {
            debug!(root = %root.display(), "non-persistent repository, values stay in memory");
            (Arc::new(MemoryRepository::new()), None)
        };

        let lifecycle = UnitLifecycleManager::new(repository.clone(), &config.lifecycle, runtime);
        Ok(Self {
            config,
            root: Some(root.to_path_buf()),
            keys,
            names,
            registry,
            repository,
            storage,
            lifecycle,
        })
    }

    /// Creates `root` with a default config and opens it.
    ///
    /// # Errors
    ///
    /// Returns an error if a config already exists under `root`, or if
    /// opening fails.
    pub fn init(root: impl AsRef<Path>, runtime: Handle) -> Result<Self> {
        let root = root.as_ref();
        if root.join(crate::config::CONFIG_FILE).exists() {
            return Err(crate::KeyRepoError::Io(std::io::Error::new(
                std::io::ErrorKind::AlreadyExists,
                "key repository already exists in this directory",
            )));
        }
        fs::create_dir_all(root)?;
        Config::default().save(root)?;
        Self::open(root, runtime)
    }

    /// Creates a repository keeping every value in memory.
    pub fn in_memory(config: Config, runtime: Handle) -> Self {
        Self::with_repository(config, Arc::new(MemoryRepository::new()), runtime)
    }

    /// Creates a handle over an existing `repository`.
    pub fn with_repository(
        config: Config,
        repository: Arc<dyn Repository>,
        runtime: Handle,
    ) -> Self {
        let (keys, names, registry) = Self::build_registry(&config);
        let lifecycle = UnitLifecycleManager::new(repository.clone(), &config.lifecycle, runtime);
        Self {
            config,
            root: None,
            keys,
            names,
            registry,
            repository,
            storage: None,
            lifecycle,
        }
    }

    fn build_registry(config: &Config) -> (Arc<KeyPool>, Arc<NamePool>, Arc<KeyRegistry>) {
        let keys = Arc::new(KeyPool::new(&config.pool, config.trace.pool_distribution));
        let names = Arc::new(NamePool::new(&config.pool));
        let registry = Arc::new(
            KeyRegistry::new(keys.clone(), names.clone())
                .with_key_filter(config.trace.key_filter.clone()),
        );
        (keys, names, registry)
    }

    /// Configuration this handle was opened with.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Root directory, if the handle was opened from disk.
    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    /// Serialization registry.
    pub fn registry(&self) -> &Arc<KeyRegistry> {
        &self.registry
    }

    /// Unit lifecycle manager.
    pub fn lifecycle(&self) -> &Arc<UnitLifecycleManager> {
        &self.lifecycle
    }

    /// The redb backend, when the repository is persistent.
    pub fn storage(&self) -> Option<&Arc<RedbRepository>> {
        self.storage.as_ref()
    }

    /// Canonical instance equal to `key`.
    pub fn intern(&self, key: Key) -> SharedKey {
        self.registry.intern(key)
    }

    /// Encodes `key` into a standalone byte buffer.
    pub fn encode_key(&self, key: &Key) -> Result<Vec<u8>> {
        self.registry.encode_key(key)
    }

    /// Decodes a key written by [`KeyRepo::encode_key`], interning it.
    pub fn decode_key(&self, bytes: &[u8]) -> Result<SharedKey> {
        self.registry.decode_key(bytes)
    }

    /// Value stored under `key`.
    ///
    /// Repository failures have already been tallied against the key's unit
    /// when this returns `None` for them.
    pub fn get(&self, key: &Key) -> Option<Vec<u8>> {
        match self.repository.get(key) {
            Ok(value) => value,
            Err(e) => {
                warn!(unit = %key.unit(), error = %e, "get failed, treating as absent");
                None
            }
        }
    }

    /// Persists `value` under `key`.
    pub fn put(&self, key: &Key, value: &[u8]) -> Result<()> {
        if self.registry.is_tracing_key(key) {
            tracing::trace!(key = ?key, len = value.len(), "put");
        }
        self.repository.put(key, value)
    }

    /// Keeps `value` under `key` until the key's unit closes.
    pub fn hang(&self, key: &Key, value: &[u8]) -> Result<()> {
        self.repository.hang(key, value)
    }

    /// Drops whatever is stored under `key`.
    pub fn remove(&self, key: &Key) -> Result<()> {
        self.repository.remove(key)
    }

    /// Opens `unit` explicitly; it stays open until released.
    pub fn open_unit(&self, unit: UnitId) -> Result<()> {
        self.lifecycle.on_explicit_open(unit);
        self.repository.open_unit(unit)
    }

    /// Ends an explicit open of `unit` and closes it.
    pub fn release_unit(&self, unit: UnitId, wipe: bool) -> Result<()> {
        self.lifecycle.on_explicit_close(unit);
        self.lifecycle.close_unit(unit, wipe, &[])
    }

    /// Closes `unit`; a unit with tallied repository errors is wiped.
    pub fn close_unit(&self, unit: UnitId, wipe: bool, required_units: &[UnitId]) -> Result<()> {
        self.lifecycle.close_unit(unit, wipe, required_units)
    }

    /// Closes `unit` with a wipe and opens it again.
    pub fn reopen_unit(&self, unit: UnitId) -> Result<()> {
        self.lifecycle.reopen_unit(unit)
    }

    /// Closes `unit` and forgets everything stored for it.
    pub fn remove_unit(&self, unit: UnitId) -> Result<()> {
        self.lifecycle.on_explicit_close(unit);
        self.repository.remove_unit(unit)
    }

    /// Whether `unit` is open.
    pub fn is_unit_open(&self, unit: UnitId) -> bool {
        self.repository.is_unit_open(unit)
    }

    /// Waits until queued close jobs have run.
    pub async fn flush(&self) {
        self.lifecycle.flush().await;
    }

    /// Population of the key pool.
    pub fn pool_stats(&self) -> PoolStats {
        self.keys.stats()
    }

    /// Population of the name pool.
    pub fn name_pool_stats(&self) -> PoolStats {
        self.names.stats()
    }

    /// Stops pending timers and empties the pools.
    pub fn dispose(&self) {
        self.lifecycle.shutdown();
        self.keys.dispose();
        self.names.dispose();
    }
}
