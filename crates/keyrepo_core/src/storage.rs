//! On-disk repository backed by redb.
//!
//! # Layout
//!
//! ```text
//! <root>/
//!   config.toml        repository configuration
//!   repository.redb    entries, unit names, format metadata
//!   LOCK               held exclusively while a process has the repository open
//! ```
//!
//! Entry keys are the 4-byte big-endian unit id followed by the encoded key
//! identity (end offset left unset), so all entries of a unit are one
//! contiguous range. Values are stored
//! zstd-compressed.
//!
//! The persistence version is stored in the metadata table. A repository
//! written by a different version is never read partially: on open every
//! entry and unit name is deleted and the repository starts empty.

use crate::config::StorageConfig;
use crate::error::{KeyRepoError, Result};
use crate::handler::persistence_version;
use crate::key::Key;
use crate::registry::KeyRegistry;
use crate::repository::{ListenerSlot, Repository, RepositoryListener, UnitSessions};
use crate::unit::UnitId;
use fs2::FileExt;
use parking_lot::Mutex;
use redb::{Database, ReadableTable, ReadableTableMetadata, TableDefinition};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};

/// File name of the database inside the repository root.
pub const DB_FILE: &str = "repository.redb";

/// File name of the lock file inside the repository root.
pub const LOCK_FILE: &str = "LOCK";

const ENTRIES_TABLE: TableDefinition<&[u8], &[u8]> = TableDefinition::new("entries");
const UNITS_TABLE: TableDefinition<&str, i32> = TableDefinition::new("units");
const METADATA_TABLE: TableDefinition<&str, i32> = TableDefinition::new("metadata");

const VERSION_KEY: &str = "version";
const NEXT_UNIT_KEY: &str = "next_unit";

/// A stored entry as raw bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredEntry {
    /// Encoded key, without the unit prefix.
    pub key: Vec<u8>,
    /// Compressed value.
    pub value: Vec<u8>,
}

/// Entry count and sizes of one unit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UnitStats {
    /// Number of persisted entries.
    pub entries: usize,
    /// Total encoded key bytes.
    pub key_bytes: usize,
    /// Total compressed value bytes.
    pub value_bytes: usize,
}

/// Redb-backed [`Repository`].
pub struct RedbRepository {
    db: Database,
    root: PathBuf,
    registry: Arc<KeyRegistry>,
    compression_level: i32,
    sessions: Mutex<UnitSessions>,
    listener: ListenerSlot,
    _lock: LockGuard,
}

impl RedbRepository {
    /// Opens or creates the repository under `root`.
    ///
    /// # Errors
    ///
    /// Returns [`KeyRepoError::RepositoryLocked`] if another process holds
    /// the repository, or a storage error if the database can't be opened.
    pub fn open(root: &Path, registry: Arc<KeyRegistry>, config: &StorageConfig) -> Result<Self> {
        fs::create_dir_all(root)?;
        let lock = LockGuard::acquire(&root.join(LOCK_FILE))?;
        let db = Database::create(root.join(DB_FILE))?;
        let repo = Self {
            db,
            root: root.to_path_buf(),
            registry,
            compression_level: config.compression_level,
            sessions: Mutex::new(UnitSessions::default()),
            listener: ListenerSlot::default(),
            _lock: lock,
        };
        repo.check_version(persistence_version(config.experimental))?;
        Ok(repo)
    }

    /// Persistence version recorded under `root`, read without rebuilding
    /// a mismatched repository.
    pub fn peek_version(root: &Path) -> Result<Option<i32>> {
        let path = root.join(DB_FILE);
        if !path.exists() {
            return Ok(None);
        }
        let _lock = LockGuard::acquire(&root.join(LOCK_FILE))?;
        let db = Database::open(path)?;
        let txn = db.begin_read()?;
        match txn.open_table(METADATA_TABLE) {
            Ok(table) => Ok(table.get(VERSION_KEY)?.map(|v| v.value())),
            Err(redb::TableError::TableDoesNotExist(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Root directory of the repository.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Persistence version recorded in the database.
    pub fn stored_version(&self) -> Result<Option<i32>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(METADATA_TABLE)?;
        let version = table.get(VERSION_KEY)?.map(|v| v.value());
        Ok(version)
    }

    fn check_version(&self, expected: i32) -> Result<()> {
        let txn = self.db.begin_write()?;
        {
            let mut metadata = txn.open_table(METADATA_TABLE)?;
            let found = metadata.get(VERSION_KEY)?.map(|v| v.value());
            match found {
                Some(found) if found == expected => {}
                Some(found) => {
                    let mismatch = KeyRepoError::VersionMismatch { found, expected };
                    warn!(root = %self.root.display(), "{mismatch}, rebuilding repository");
                    txn.delete_table(ENTRIES_TABLE)?;
                    txn.delete_table(UNITS_TABLE)?;
                    metadata.remove(NEXT_UNIT_KEY)?;
                    metadata.insert(VERSION_KEY, expected)?;
                }
                None => {
                    metadata.insert(VERSION_KEY, expected)?;
                }
            }
        }
        // make sure both tables exist for readers
        txn.open_table(ENTRIES_TABLE)?;
        txn.open_table(UNITS_TABLE)?;
        txn.commit()?;
        Ok(())
    }

    /// Unit name table.
    pub fn units(&self) -> UnitTable<'_> {
        UnitTable { db: &self.db }
    }

    fn storage_key(&self, key: &Key) -> Result<Vec<u8>> {
        let encoded = self.registry.encode_identity(key)?;
        let mut storage_key = Vec::with_capacity(4 + encoded.len());
        storage_key.extend_from_slice(&key.unit().to_prefix());
        storage_key.extend_from_slice(&encoded);
        Ok(storage_key)
    }

    fn compress(&self, value: &[u8]) -> Result<Vec<u8>> {
        zstd::encode_all(value, self.compression_level)
            .map_err(|e| KeyRepoError::Compression(e.to_string()))
    }

    /// Decompresses a stored value.
    pub fn decompress(&self, compressed: &[u8]) -> Result<Vec<u8>> {
        zstd::decode_all(compressed).map_err(|e| KeyRepoError::Compression(e.to_string()))
    }

    /// Opens the unit of `key` if needed, then runs `op` and reports its
    /// failure to the listener.
    fn with_unit<T>(&self, key: &Key, op: impl FnOnce() -> Result<T>) -> Result<T> {
        let unit = key.unit();
        let newly_opened = self.sessions.lock().open(unit);
        if newly_opened {
            self.listener.opened(unit);
        }
        self.listener.report(unit, op())
    }

    fn read_persisted(&self, key: &Key) -> Result<Option<Vec<u8>>> {
        let storage_key = self.storage_key(key)?;
        let txn = self.db.begin_read()?;
        let table = txn.open_table(ENTRIES_TABLE)?;
        let compressed = table.get(storage_key.as_slice())?.map(|v| v.value().to_vec());
        compressed.map(|c| self.decompress(&c)).transpose()
    }

    fn write_persisted(&self, key: &Key, value: Option<&[u8]>) -> Result<()> {
        let storage_key = self.storage_key(key)?;
        let compressed = value.map(|v| self.compress(v)).transpose()?;
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(ENTRIES_TABLE)?;
            match &compressed {
                Some(c) => {
                    table.insert(storage_key.as_slice(), c.as_slice())?;
                }
                None => {
                    table.remove(storage_key.as_slice())?;
                }
            }
        }
        txn.commit()?;
        Ok(())
    }

    /// Deletes every persisted entry of `unit`; returns how many.
    pub fn wipe_unit(&self, unit: UnitId) -> Result<usize> {
        let prefix = unit.to_prefix();
        let txn = self.db.begin_write()?;
        let wiped = {
            let mut table = txn.open_table(ENTRIES_TABLE)?;
            let mut doomed = Vec::new();
            for entry in table.range(prefix.as_slice()..)? {
                let (key, _) = entry?;
                if !key.value().starts_with(&prefix) {
                    break;
                }
                doomed.push(key.value().to_vec());
            }
            for key in &doomed {
                table.remove(key.as_slice())?;
            }
            doomed.len()
        };
        txn.commit()?;
        info!(unit = %unit, entries = wiped, "wiped unit");
        Ok(wiped)
    }

    /// Every persisted entry of `unit`, in key order.
    pub fn scan_unit(&self, unit: UnitId) -> Result<Vec<StoredEntry>> {
        let prefix = unit.to_prefix();
        let txn = self.db.begin_read()?;
        let table = txn.open_table(ENTRIES_TABLE)?;
        let mut entries = Vec::new();
        for entry in table.range(prefix.as_slice()..)? {
            let (key, value) = entry?;
            let key = key.value();
            if !key.starts_with(&prefix) {
                break;
            }
            entries.push(StoredEntry {
                key: key[prefix.len()..].to_vec(),
                value: value.value().to_vec(),
            });
        }
        Ok(entries)
    }

    /// Entry count and sizes of `unit`.
    pub fn unit_stats(&self, unit: UnitId) -> Result<UnitStats> {
        let entries = self.scan_unit(unit)?;
        Ok(UnitStats {
            entries: entries.len(),
            key_bytes: entries.iter().map(|e| e.key.len()).sum(),
            value_bytes: entries.iter().map(|e| e.value.len()).sum(),
        })
    }

    /// Total number of persisted entries.
    pub fn entry_count(&self) -> Result<u64> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(ENTRIES_TABLE)?;
        Ok(table.len()?)
    }

    /// Units that have at least one persisted entry, in id order.
    pub fn stored_units(&self) -> Result<Vec<UnitId>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(ENTRIES_TABLE)?;
        let mut units: Vec<UnitId> = Vec::new();
        for entry in table.iter()? {
            let (key, _) = entry?;
            let key = key.value();
            let prefix: [u8; 4] = key
                .get(..4)
                .and_then(|p| p.try_into().ok())
                .ok_or_else(|| KeyRepoError::Corrupted("entry key shorter than unit prefix".into()))?;
            let raw = i32::from_be_bytes(prefix);
            let unit = UnitId::checked(raw)
                .ok_or_else(|| KeyRepoError::Corrupted(format!("entry under reserved unit {raw}")))?;
            if units.last() != Some(&unit) {
                units.push(unit);
            }
        }
        Ok(units)
    }
}

impl Repository for RedbRepository {
    fn get(&self, key: &Key) -> Result<Option<Vec<u8>>> {
        self.with_unit(key, || {
            if let Some(hung) = self.sessions.lock().hung(key) {
                return Ok(Some(hung.to_vec()));
            }
            self.read_persisted(key)
        })
    }

    fn put(&self, key: &Key, value: &[u8]) -> Result<()> {
        self.with_unit(key, || {
            self.sessions.lock().unhang(key);
            self.write_persisted(key, Some(value))
        })
    }

    fn hang(&self, key: &Key, value: &[u8]) -> Result<()> {
        self.with_unit(key, || {
            self.sessions.lock().hang(key, value);
            Ok(())
        })
    }

    fn remove(&self, key: &Key) -> Result<()> {
        self.with_unit(key, || {
            self.sessions.lock().unhang(key);
            self.write_persisted(key, None)
        })
    }

    fn open_unit(&self, unit: UnitId) -> Result<()> {
        let newly_opened = self.sessions.lock().open(unit);
        if newly_opened {
            self.listener.opened(unit);
        }
        Ok(())
    }

    fn close_unit(&self, unit: UnitId, wipe: bool, required_units: &[UnitId]) -> Result<()> {
        if wipe {
            let wiped = self.wipe_unit(unit);
            self.listener.report(unit, wiped)?;
        }
        if !required_units.is_empty() {
            debug!(unit = %unit, required = ?required_units, "required units stay open");
        }
        let was_open = self.sessions.lock().close(unit);
        if was_open {
            self.listener.closed(unit);
        }
        Ok(())
    }

    fn remove_unit(&self, unit: UnitId) -> Result<()> {
        self.close_unit(unit, true, &[])?;
        let removed = self.units().forget(unit);
        self.listener.report(unit, removed)
    }

    fn is_unit_open(&self, unit: UnitId) -> bool {
        self.sessions.lock().is_open(unit)
    }

    fn register_listener(&self, listener: Weak<dyn RepositoryListener>) {
        self.listener.set(listener);
    }
}

/// Names of the units of a repository.
///
/// Ids are handed out from [`UnitId::FIRST_ALLOCATED`] upward and never
/// reused while the repository keeps its persistence version.
pub struct UnitTable<'a> {
    db: &'a Database,
}

impl UnitTable<'_> {
    /// Id of `name`, allocating one if the name is new.
    pub fn id_for(&self, name: &str) -> Result<UnitId> {
        if let Some(unit) = self.lookup(name)? {
            return Ok(unit);
        }
        let txn = self.db.begin_write()?;
        let unit = {
            let mut units = txn.open_table(UNITS_TABLE)?;
            let existing = units.get(name)?.map(|v| v.value());
            match existing {
                Some(raw) => UnitId::new(raw),
                None => {
                    let mut metadata = txn.open_table(METADATA_TABLE)?;
                    let next = metadata
                        .get(NEXT_UNIT_KEY)?
                        .map(|v| v.value())
                        .unwrap_or(UnitId::FIRST_ALLOCATED);
                    metadata.insert(NEXT_UNIT_KEY, next + 1)?;
                    units.insert(name, next)?;
                    debug!(unit = next, unit_name = name, "allocated unit id");
                    UnitId::new(next)
                }
            }
        };
        txn.commit()?;
        Ok(unit)
    }

    /// Id of `name`, if known.
    pub fn lookup(&self, name: &str) -> Result<Option<UnitId>> {
        let txn = self.db.begin_read()?;
        let units = txn.open_table(UNITS_TABLE)?;
        let raw = units.get(name)?.map(|v| v.value());
        raw.map(|raw| {
            UnitId::checked(raw)
                .ok_or_else(|| KeyRepoError::Corrupted(format!("unit {name} has reserved id {raw}")))
        })
        .transpose()
    }

    /// Id of `name`, failing for unknown names.
    pub fn require(&self, name: &str) -> Result<UnitId> {
        self.lookup(name)?
            .ok_or_else(|| KeyRepoError::UnitNotFound(name.to_string()))
    }

    /// Name of `unit`, if known.
    pub fn name_of(&self, unit: UnitId) -> Result<Option<String>> {
        Ok(self
            .list()?
            .into_iter()
            .find(|(_, id)| *id == unit)
            .map(|(name, _)| name))
    }

    /// All units, ordered by name.
    pub fn list(&self) -> Result<Vec<(String, UnitId)>> {
        let txn = self.db.begin_read()?;
        let units = txn.open_table(UNITS_TABLE)?;
        let mut out = Vec::new();
        for entry in units.iter()? {
            let (name, raw) = entry?;
            let raw = raw.value();
            let unit = UnitId::checked(raw).ok_or_else(|| {
                KeyRepoError::Corrupted(format!("unit {} has reserved id {raw}", name.value()))
            })?;
            out.push((name.value().to_string(), unit));
        }
        Ok(out)
    }

    /// Drops the name of `unit`.
    pub fn forget(&self, unit: UnitId) -> Result<()> {
        let Some(name) = self.name_of(unit)? else {
            return Ok(());
        };
        let txn = self.db.begin_write()?;
        {
            let mut units = txn.open_table(UNITS_TABLE)?;
            units.remove(name.as_str())?;
        }
        txn.commit()?;
        Ok(())
    }
}

/// RAII guard for the repository lock.
///
/// Holds an exclusive lock on the LOCK file and removes it when dropped.
struct LockGuard {
    file: Option<File>,
    path: PathBuf,
}

impl LockGuard {
    fn acquire(path: &Path) -> Result<Self> {
        let mut file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(path)?;
        file.try_lock_exclusive()
            .map_err(|_| KeyRepoError::RepositoryLocked {
                path: path.to_path_buf(),
            })?;
        file.set_len(0)?;
        writeln!(file, "{}", std::process::id())?;
        file.flush()?;
        Ok(Self {
            file: Some(file),
            path: path.to_path_buf(),
        })
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        // closing the file releases the lock
        if let Some(file) = self.file.take() {
            drop(file);
        }
        let _ = fs::remove_file(&self.path);
    }
}
