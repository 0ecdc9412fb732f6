//! Wipe the persisted entries of a unit.

use super::{with_suggestion, Workspace};
use anyhow::Result;
use console::style;
use std::path::Path;

/// Close `unit` with a wipe, deleting every entry persisted for it.
pub fn run(dir: &Path, unit: &str) -> Result<()> {
    let workspace = Workspace::open(dir)?;
    let unit = workspace.resolve_unit(unit)?;
    let before = workspace
        .storage()?
        .unit_stats(unit)
        .map_err(with_suggestion)?;

    workspace
        .repo
        .close_unit(unit, true, &[])
        .map_err(with_suggestion)?;

    println!(
        "{} Wiped unit {} ({} entries, {} value bytes)",
        style("✓").green(),
        style(unit).cyan(),
        before.entries,
        before.value_bytes
    );
    Ok(())
}
