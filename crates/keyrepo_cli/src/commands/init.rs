//! Initialize a new key repository.

use super::{runtime, with_suggestion};
use anyhow::{Context, Result};
use console::style;
use keyrepo_core::{KeyRepo, CONFIG_FILE, DB_FILE, LOCK_FILE};
use std::path::Path;

/// Initialize a new key repository in `dir`.
pub fn run(dir: &Path) -> Result<()> {
    let runtime = runtime()?;
    let repo = KeyRepo::init(dir, runtime.handle().clone())
        .map_err(with_suggestion)
        .context("Failed to initialize key repository")?;

    println!(
        "{} Initialized key repository in {}",
        style("✓").green(),
        style(dir.display()).cyan()
    );
    println!();
    println!("Files:");
    println!("  {:<18} - Pool, lifecycle and storage settings", CONFIG_FILE);
    println!("  {:<18} - Keys and compressed values, per unit", DB_FILE);
    println!("  {:<18} - Held while a process has the repository open", LOCK_FILE);
    println!();
    println!(
        "Persistence version: {}",
        style(repo.config().persistence_version()).cyan()
    );

    repo.dispose();
    Ok(())
}
