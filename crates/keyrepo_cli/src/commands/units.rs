//! List the units of a repository.

use super::{with_suggestion, Workspace};
use anyhow::Result;
use console::style;
use std::path::Path;

/// Print every unit with its id and entry count.
pub fn run(dir: &Path, json: bool) -> Result<()> {
    let workspace = Workspace::open(dir)?;
    let storage = workspace.storage()?;

    let named = storage.units().list().map_err(with_suggestion)?;
    let mut rows = Vec::with_capacity(named.len());
    for (name, unit) in &named {
        let stats = storage.unit_stats(*unit).map_err(with_suggestion)?;
        rows.push((Some(name.as_str()), *unit, stats));
    }
    // entries written under ids that were never named
    for unit in storage.stored_units().map_err(with_suggestion)? {
        if !named.iter().any(|(_, id)| *id == unit) {
            let stats = storage.unit_stats(unit).map_err(with_suggestion)?;
            rows.push((None, unit, stats));
        }
    }
    rows.sort_by_key(|(_, unit, _)| *unit);

    if json {
        let units: Vec<_> = rows
            .iter()
            .map(|(name, unit, stats)| {
                serde_json::json!({
                    "name": name,
                    "id": unit.get(),
                    "entries": stats.entries,
                    "key_bytes": stats.key_bytes,
                    "value_bytes": stats.value_bytes,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&units)?);
        return Ok(());
    }

    if rows.is_empty() {
        println!("No units.");
        return Ok(());
    }

    println!(
        "{}",
        style(format!(
            "{:>8}  {:>8}  {:>12}  {}",
            "ID", "ENTRIES", "VALUE BYTES", "NAME"
        ))
        .bold()
    );
    for (name, unit, stats) in &rows {
        println!(
            "{:>8}  {:>8}  {:>12}  {}",
            unit.get(),
            stats.entries,
            stats.value_bytes,
            match name {
                Some(name) => style(name.to_string()).cyan(),
                None => style("<unnamed>".to_string()).dim(),
            }
        );
    }

    Ok(())
}
