use anyhow::{Context, Result};
use keyrepo_core::{Config, KeyRepo};
use std::path::Path;
use tempfile::TempDir;
use tokio::runtime::Handle;

/// Manages isolated test environments with tempfile
pub struct TestWorkspace {
    dir: TempDir,
}

impl TestWorkspace {
    /// Create an empty workspace
    pub fn empty() -> Result<Self> {
        let dir = TempDir::new().context("Failed to create temp directory")?;
        Ok(Self { dir })
    }

    /// Create a workspace whose repository uses `config`
    pub fn with_config(config: &Config) -> Result<Self> {
        let workspace = Self::empty()?;
        config
            .save(workspace.path())
            .context("Failed to write config")?;
        Ok(workspace)
    }

    /// Get workspace path
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Initialize a key repository in the workspace
    pub fn init_repo(&self, runtime: Handle) -> Result<KeyRepo> {
        Ok(KeyRepo::init(self.path(), runtime)?)
    }

    /// Open the existing key repository
    pub fn open_repo(&self, runtime: Handle) -> Result<KeyRepo> {
        Ok(KeyRepo::open(self.path(), runtime)?)
    }

    /// Check whether a file exists in the workspace
    pub fn file_exists(&self, path: &str) -> bool {
        self.path().join(path).exists()
    }
}
