use super::assertions::Assertion;
use super::recording::RecordingRepository;
use super::scenario::Backend;
use super::steps::ScenarioStep;
use super::workspace::TestWorkspace;
use anyhow::{anyhow, bail, ensure, Context, Result};
use keyrepo_core::{
    Config, Key, KeyPool, KeyRegistry, KeyRepo, KeyRepoError, MemoryRepository, NamePool,
    OffsetKind, RedbRepository, Repository, SharedKey, UnitId, NON_INITIALIZED,
};
use std::sync::Arc;
use tokio::runtime::Handle;

/// Macro key of main.cpp named `name`, the key every scenario step uses
pub fn scenario_key(unit: UnitId, name: &str) -> Key {
    Key::offset(unit, OffsetKind::Macro, "main.cpp", name, 0, name.len() as i32)
}

/// [`scenario_key`] with the end offset not known yet
pub fn unresolved_key(unit: UnitId, name: &str) -> Key {
    Key::offset(unit, OffsetKind::Macro, "main.cpp", name, 0, NON_INITIALIZED)
}

/// Executes scenarios against a real repository
pub struct ScenarioRunner {
    workspace: TestWorkspace,
    backend: Backend,
    config: Config,
    recorder: Option<Arc<RecordingRepository>>,
    storage: Option<Arc<RedbRepository>>,
    repo: Option<KeyRepo>,
    held: Vec<SharedKey>,
    current_step: usize,
}

impl ScenarioRunner {
    /// Create a runner; must be called inside a tokio runtime
    pub fn new(backend: Backend, config: Config) -> Result<Self> {
        let workspace = TestWorkspace::with_config(&config)?;
        let mut runner = Self {
            workspace,
            backend,
            config,
            recorder: None,
            storage: None,
            repo: None,
            held: Vec::new(),
            current_step: 0,
        };
        runner.connect()?;
        Ok(runner)
    }

    fn connect(&mut self) -> Result<()> {
        let inner = match self.backend {
            Backend::Memory => Arc::new(MemoryRepository::new()) as Arc<dyn Repository>,
            Backend::Redb => {
                let registry = Arc::new(KeyRegistry::new(
                    Arc::new(KeyPool::new(&self.config.pool, false)),
                    Arc::new(NamePool::new(&self.config.pool)),
                ));
                let storage = Arc::new(RedbRepository::open(
                    self.workspace.path(),
                    registry,
                    &self.config.storage,
                )?);
                self.storage = Some(storage.clone());
                storage as Arc<dyn Repository>
            }
        };
        let recorder = RecordingRepository::wrap(inner);
        let repo = KeyRepo::with_repository(self.config.clone(), recorder.clone(), Handle::current());
        self.recorder = Some(recorder);
        self.repo = Some(repo);
        Ok(())
    }

    /// Get current step number
    pub fn current_step(&self) -> usize {
        self.current_step
    }

    fn repo(&self) -> Result<&KeyRepo> {
        self.repo
            .as_ref()
            .ok_or_else(|| anyhow!("Repository not available"))
    }

    fn recorder(&self) -> Result<&Arc<RecordingRepository>> {
        self.recorder
            .as_ref()
            .ok_or_else(|| anyhow!("Repository not available"))
    }

    /// Execute all steps in sequence
    pub async fn execute(&mut self, steps: &[ScenarioStep]) -> Result<()> {
        for (i, step) in steps.iter().enumerate() {
            self.current_step = i;
            self.execute_step(step)
                .await
                .with_context(|| format!("Step {}: {:?}", i, step))?;
        }
        Ok(())
    }

    /// Dispose the repository and release the workspace lock
    pub fn shutdown(&mut self) {
        if let Some(repo) = self.repo.take() {
            repo.dispose();
        }
        self.held.clear();
        self.recorder = None;
        self.storage = None;
    }

    async fn execute_step(&mut self, step: &ScenarioStep) -> Result<()> {
        match step {
            ScenarioStep::Put { unit, name, value } => {
                Ok(self.repo()?.put(&scenario_key(*unit, name), value)?)
            }
            ScenarioStep::PutUnresolved { unit, name, value } => {
                let repo = self.repo()?;
                let key = repo.intern(unresolved_key(*unit, name));
                repo.put(&key, value)?;
                // keep the canonical instance alive so a later intern resolves it
                self.held.push(key);
                Ok(())
            }
            ScenarioStep::ResolveEnd { unit, name } => {
                let resolved = self.repo()?.intern(scenario_key(*unit, name));
                let expected = name.len() as i32;
                ensure!(
                    resolved.end_offset() == Some(expected),
                    "End offset of {} in unit {} not resolved to {}",
                    name,
                    unit,
                    expected
                );
                Ok(())
            }
            ScenarioStep::Hang { unit, name, value } => {
                Ok(self.repo()?.hang(&scenario_key(*unit, name), value)?)
            }
            ScenarioStep::Remove { unit, name } => {
                Ok(self.repo()?.remove(&scenario_key(*unit, name))?)
            }
            ScenarioStep::Read { unit, name } => {
                let _ = self.repo()?.get(&scenario_key(*unit, name));
                Ok(())
            }

            ScenarioStep::OpenUnit(unit) => Ok(self.repo()?.open_unit(*unit)?),
            ScenarioStep::ReleaseUnit { unit, wipe } => {
                Ok(self.repo()?.release_unit(*unit, *wipe)?)
            }
            ScenarioStep::CloseUnit { unit, wipe } => {
                Ok(self.repo()?.close_unit(*unit, *wipe, &[])?)
            }
            ScenarioStep::ReopenUnit(unit) => Ok(self.repo()?.reopen_unit(*unit)?),
            ScenarioStep::RemoveUnit(unit) => Ok(self.repo()?.remove_unit(*unit)?),

            ScenarioStep::FailNext { unit, intentional } => {
                let error = if *intentional {
                    KeyRepoError::Intentional("scenario".to_string())
                } else {
                    KeyRepoError::Storage("injected by scenario".to_string())
                };
                self.recorder()?.fail_next(*unit, error);
                Ok(())
            }

            ScenarioStep::Idle { duration } => {
                tokio::time::sleep(*duration).await;
                self.repo()?.flush().await;
                Ok(())
            }

            ScenarioStep::Restart => self.handle_restart(),

            ScenarioStep::Assert { assertion } => self.handle_assertion(assertion),
        }
    }

    fn handle_restart(&mut self) -> Result<()> {
        if self.backend == Backend::Memory {
            bail!("Restart needs a persistent backend");
        }
        self.shutdown();
        self.connect()
    }

    fn handle_assertion(&self, assertion: &Assertion) -> Result<()> {
        let repo = self.repo()?;
        match assertion {
            Assertion::Value {
                unit,
                name,
                expected,
            } => {
                let actual = repo.get(&scenario_key(*unit, name));
                ensure!(
                    actual == *expected,
                    "Value of {} in unit {}: expected {:?}, got {:?}",
                    name,
                    unit,
                    expected,
                    actual
                );
            }
            Assertion::StoredEntries { unit, count } => {
                let storage = self
                    .storage
                    .as_ref()
                    .ok_or_else(|| anyhow!("Stored entries need the redb backend"))?;
                let actual = storage.unit_stats(*unit)?.entries;
                ensure!(
                    actual == *count,
                    "Unit {} stores {} entries, expected {}",
                    unit,
                    actual,
                    count
                );
            }
            Assertion::UnitOpen(unit) => {
                ensure!(repo.is_unit_open(*unit), "Unit {} should be open", unit);
            }
            Assertion::UnitClosed(unit) => {
                ensure!(!repo.is_unit_open(*unit), "Unit {} should be closed", unit);
            }
            Assertion::ExplicitlyOpen(unit) => {
                ensure!(
                    repo.lifecycle().is_explicitly_open(*unit),
                    "Unit {} should be explicitly open",
                    unit
                );
            }
            Assertion::PendingClose(unit) => {
                ensure!(
                    repo.lifecycle().has_pending_close(*unit),
                    "Unit {} should have a pending implicit close",
                    unit
                );
            }
            Assertion::NoPendingClose(unit) => {
                ensure!(
                    !repo.lifecycle().has_pending_close(*unit),
                    "Unit {} should have no pending implicit close",
                    unit
                );
            }
            Assertion::ErrorCount { unit, count } => {
                let actual = repo.lifecycle().repository_error_count(*unit);
                ensure!(
                    actual == *count,
                    "Unit {} has {} tallied errors, expected {}",
                    unit,
                    actual,
                    count
                );
            }
            Assertion::Closes { unit, wipes } => {
                let actual = self.recorder()?.closes(*unit);
                ensure!(
                    actual == *wipes,
                    "Closes of unit {}: expected wipe flags {:?}, got {:?}",
                    unit,
                    wipes,
                    actual
                );
            }
            Assertion::Custom(check) => check(repo)?,
        }
        Ok(())
    }
}
