//! Print the keys of one unit.

use super::verify::header_problem;
use super::{with_suggestion, Workspace};
use anyhow::Result;
use console::style;
use std::path::Path;

/// Decode and print every key stored for `unit`.
pub fn run(dir: &Path, unit: &str, values: bool) -> Result<()> {
    let workspace = Workspace::open(dir)?;
    let storage = workspace.storage()?;
    let unit = workspace.resolve_unit(unit)?;
    let registry = workspace.repo.registry();

    let entries = storage.scan_unit(unit).map_err(with_suggestion)?;
    let name = storage.units().name_of(unit).map_err(with_suggestion)?;
    println!(
        "{} {} ({} entries)",
        style("Unit").bold(),
        style(format!("{} {}", unit, name.as_deref().unwrap_or("<unnamed>"))).cyan(),
        entries.len()
    );

    for entry in &entries {
        if let Some(problem) = header_problem(&entry.key) {
            println!("  {} {}", style("×").red(), problem);
            continue;
        }
        match registry.decode_key(&entry.key) {
            Ok(key) => {
                println!("  {}  {}", key, style(format!("{} B", entry.value.len())).dim());
                if values {
                    match storage.decompress(&entry.value) {
                        Ok(value) => println!("    {}", hex::encode(value)),
                        Err(e) => println!("    {} {}", style("×").red(), e),
                    }
                }
            }
            Err(e) => println!("  {} {}", style("×").red(), e),
        }
    }

    Ok(())
}
