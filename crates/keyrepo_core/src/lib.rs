//! Keyrepo Core Library
//!
//! Persistent identity keys for code-model entities, providing:
//! - Value-semantic keys with cached offsets
//! - Sharded weak interning of canonical key instances
//! - A versioned, append-only binary codec for keys and auxiliary values
//! - Unit-scoped repositories with implicit open and idle close
//!
//! # Quick Start
//!
//! ```
//! use keyrepo_core::{Config, Key, KeyRepo, OffsetKind, UnitId};
//!
//! let runtime = tokio::runtime::Runtime::new().unwrap();
//! let repo = KeyRepo::in_memory(Config::default(), runtime.handle().clone());
//!
//! let unit = UnitId::new(10001);
//! let key = Key::offset(unit, OffsetKind::Macro, "a.cpp", "FOO", 10, 42);
//!
//! repo.put(&key, b"macro body").unwrap();
//! assert_eq!(repo.get(&key).as_deref(), Some(&b"macro body"[..]));
//! ```
//!
//! # Features
//!
//! ## Interning
//!
//! Equal keys intern to one shared instance, and keys decoded from a stream
//! are interned on the way in:
//!
//! ```
//! use keyrepo_core::{Config, Key, KeyRepo, OffsetKind, UnitId};
//! use std::sync::Arc;
//!
//! let runtime = tokio::runtime::Runtime::new().unwrap();
//! let repo = KeyRepo::in_memory(Config::default(), runtime.handle().clone());
//!
//! let key = Key::offset(UnitId::new(10001), OffsetKind::Include, "a.cpp", "b.h", 0, 18);
//! let canonical = repo.intern(key.clone());
//! let bytes = repo.encode_key(&key).unwrap();
//! let decoded = repo.decode_key(&bytes).unwrap();
//! assert!(Arc::ptr_eq(&canonical, &decoded));
//! ```
//!
//! ## Unit Lifecycle
//!
//! Key traffic opens a unit implicitly. An implicitly opened unit closes once
//! it has been idle for `lifecycle.implicit_close_secs`; an explicit open
//! keeps it open until [`KeyRepo::release_unit`].
//!
//! ```
//! use keyrepo_core::{Config, KeyRepo, UnitId};
//!
//! let runtime = tokio::runtime::Runtime::new().unwrap();
//! let repo = KeyRepo::in_memory(Config::default(), runtime.handle().clone());
//!
//! let unit = UnitId::new(10001);
//! repo.open_unit(unit).unwrap();
//! assert!(repo.lifecycle().is_explicitly_open(unit));
//! repo.release_unit(unit, false).unwrap();
//! assert!(!repo.is_unit_open(unit));
//! ```

mod codec;
mod config;
mod error;
mod handler;
mod key;
mod lifecycle;
mod memory_repository;
mod pool;
mod registry;
mod repo;
mod repository;
mod storage;
mod task_queue;
mod unit;
mod values;

pub use codec::{KeyInput, KeyOutput};
pub use config::{
    Config, LifecycleConfig, PoolConfig, StorageConfig, TraceConfig, CONFIG_FILE,
};
pub use error::{KeyRepoError, Result};
pub use handler::{
    persistence_version, HandlerCode, KeyShape, EXPERIMENTAL_VERSION_OFFSET, PERSISTENCE_VERSION,
};
pub use key::{
    disambiguated, display_name, CachedOffset, ContainerKind, DeclarationKind, Key, KeyData,
    KeyPresentation, OffsetData, OffsetKind, PresentationSnapshot, SharedKey, SourceEntity,
    Visibility, DISAMBIGUATION_DELIMITER, NON_INITIALIZED,
};
pub use lifecycle::UnitLifecycleManager;
pub use memory_repository::MemoryRepository;
pub use pool::{
    KeyPool, NamePool, PoolMember, PoolSizing, PoolStats, ShardStats, ShardedPool,
};
pub use registry::{is_tracing_key, KeyRegistry, OffsetSortedKey};
pub use repo::KeyRepo;
pub use repository::{
    ListenerSlot, Repository, RepositoryExceptionListener, RepositoryListener, UnitSessions,
};
pub use storage::{RedbRepository, StoredEntry, UnitStats, UnitTable, DB_FILE, LOCK_FILE};
pub use task_queue::ModelTaskQueue;
pub use unit::UnitId;
pub use values::{
    AuxValue, CompoundBody, Expression, Param, ParamList, SpecializationDescriptor,
    TemplateDescriptor, TypeRef, ValueTag,
};
