//! Print persistence versions.

use super::with_suggestion;
use anyhow::Result;
use console::style;
use keyrepo_core::{Config, RedbRepository, PERSISTENCE_VERSION};
use std::path::Path;

/// Print the persistence version the config selects, and the one on disk.
pub fn run(dir: &Path) -> Result<()> {
    let config = Config::load(dir).map_err(with_suggestion)?;
    let expected = config.persistence_version();

    println!("Format version:       {}", PERSISTENCE_VERSION);
    println!(
        "Persistence version:  {}{}",
        style(expected).cyan(),
        if config.storage.experimental {
            " (experimental)"
        } else {
            ""
        }
    );

    let Some(stored) = RedbRepository::peek_version(dir).map_err(with_suggestion)? else {
        return Ok(());
    };
    if stored == expected {
        println!("Stored version:       {}", style(stored).green());
    } else {
        println!(
            "Stored version:       {} {}",
            style(stored).yellow(),
            style("(repository will be rebuilt on next open)").dim()
        );
    }
    Ok(())
}
