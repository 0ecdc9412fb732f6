//! Repository verification command.

use super::{with_suggestion, Workspace};
use anyhow::Result;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use keyrepo_core::{HandlerCode, UnitId};
use std::path::Path;

/// Checks the handler code and unit id at the head of an encoded key.
///
/// Decoding panics on either being invalid, so stored bytes are probed
/// before they reach the registry.
pub fn header_problem(key: &[u8]) -> Option<String> {
    let Some(code) = key.get(..2).map(|b| i16::from_be_bytes([b[0], b[1]])) else {
        return Some(format!("key of {} bytes has no handler code", key.len()));
    };
    match HandlerCode::from_code(code) {
        None => return Some(format!("unknown handler code {code}")),
        Some(handler) if handler.shape().is_none() => {
            return Some("null key stored as an entry".to_string());
        }
        Some(_) => {}
    }
    let Some(raw) = key.get(2..6).map(|b| i32::from_be_bytes([b[0], b[1], b[2], b[3]])) else {
        return Some("key has no unit id".to_string());
    };
    if UnitId::checked(raw).is_none() {
        return Some(format!("key carries reserved unit id {raw}"));
    }
    None
}

/// Decode every stored key and decompress every value.
pub fn run(dir: &Path) -> Result<()> {
    let workspace = Workspace::open(dir)?;
    let storage = workspace.storage()?;
    let registry = workspace.repo.registry();

    let units = storage.stored_units().map_err(with_suggestion)?;
    let total = storage.entry_count().map_err(with_suggestion)?;

    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
            .progress_chars("=>-"),
    );

    let mut checked = 0u64;
    let mut failures: Vec<(UnitId, String)> = Vec::new();
    for unit in &units {
        pb.set_message(format!("unit {unit}"));
        for entry in storage.scan_unit(*unit).map_err(with_suggestion)? {
            checked += 1;
            pb.inc(1);
            if let Some(problem) = header_problem(&entry.key) {
                failures.push((*unit, problem));
                continue;
            }
            match registry.decode_key(&entry.key) {
                Ok(key) if key.unit() != *unit => {
                    failures.push((*unit, format!("{key} stored under unit {unit}")));
                }
                Ok(key) => {
                    if let Err(e) = storage.decompress(&entry.value) {
                        failures.push((*unit, format!("{key}: {e}")));
                    }
                }
                Err(e) => failures.push((*unit, e.to_string())),
            }
        }
    }
    pb.finish_and_clear();

    report(units.len(), checked, &failures)
}

/// Prints the verification report; fails when any entry is damaged.
fn report(units: usize, checked: u64, failures: &[(UnitId, String)]) -> Result<()> {
    println!();
    println!("{}", style("Verification Report:").bold());
    println!("  Units checked:      {}", style(units).cyan());
    println!("  Entries checked:    {}", style(checked).cyan());

    if failures.is_empty() {
        println!();
        println!("{} {}", style("✓").green(), style("All entries decode").green());
        return Ok(());
    }

    println!("  Damaged entries:    {}", style(failures.len()).red());
    for (unit, problem) in failures {
        println!("    {} [{}] {}", style("×").red(), unit, problem);
    }

    println!();
    println!("{}", style("Recommendations:").bold());
    let mut damaged: Vec<UnitId> = failures.iter().map(|(unit, _)| *unit).collect();
    damaged.dedup();
    for unit in damaged {
        println!(
            "  {} Run {} to reindex the unit",
            style("→").cyan(),
            style(format!("keyrepo wipe {unit}")).cyan()
        );
    }

    anyhow::bail!("{} damaged entries", failures.len())
}
