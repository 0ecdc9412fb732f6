//! CLI commands.

pub mod dump;
pub mod init;
pub mod units;
pub mod verify;
pub mod version;
pub mod wipe;

use anyhow::{bail, Context, Result};
use keyrepo_core::{KeyRepo, RedbRepository, UnitId};
use std::path::Path;
use std::sync::Arc;
use tokio::runtime::Runtime;
use tracing::debug;

/// An opened repository and the runtime its lifecycle timers run on.
///
/// Fields drop in order, so the repository goes before its runtime.
pub struct Workspace {
    pub repo: KeyRepo,
    _runtime: Runtime,
}

impl Workspace {
    /// Opens the repository under `dir`.
    pub fn open(dir: &Path) -> Result<Self> {
        if !dir.join(keyrepo_core::CONFIG_FILE).exists() {
            bail!(
                "Not a key repository: {} (run 'keyrepo init' first)",
                dir.display()
            );
        }
        debug!(dir = %dir.display(), "opening repository");
        let runtime = runtime()?;
        let repo = KeyRepo::open(dir, runtime.handle().clone())
            .map_err(with_suggestion)
            .with_context(|| format!("Failed to open repository at {}", dir.display()))?;
        Ok(Self {
            repo,
            _runtime: runtime,
        })
    }

    /// The redb backend; fails for non-persistent repositories.
    pub fn storage(&self) -> Result<&Arc<RedbRepository>> {
        match self.repo.storage() {
            Some(storage) => Ok(storage),
            None => bail!("Repository is configured with storage.persistent = false"),
        }
    }

    /// Resolves a unit given by name or by numeric id.
    pub fn resolve_unit(&self, unit: &str) -> Result<UnitId> {
        if let Ok(raw) = unit.parse::<i32>() {
            return UnitId::checked(raw)
                .with_context(|| format!("Unit id {raw} is in the reserved range"));
        }
        self.storage()?
            .units()
            .require(unit)
            .map_err(with_suggestion)
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        self.repo.dispose();
    }
}

pub fn runtime() -> Result<Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .enable_time()
        .build()
        .context("Failed to start runtime")
}

/// Attaches the error's recovery suggestion, if it has one.
pub fn with_suggestion(e: keyrepo_core::KeyRepoError) -> anyhow::Error {
    match e.recovery_suggestion() {
        Some(hint) => anyhow::anyhow!("{e}\nhint: {hint}"),
        None => anyhow::Error::new(e),
    }
}
