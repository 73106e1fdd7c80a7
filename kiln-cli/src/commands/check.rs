//! Report which reps would be recompiled, and why, without compiling.

use super::{compiler_for, load_config};
use anyhow::{Context, Result};
use kiln_incremental::ExternalChanges;
use serde_json::json;
use std::path::Path;

pub fn check_site(config_path: &Path, json: bool) -> Result<()> {
    let config = load_config(config_path)?;
    let mut compiler = compiler_for(config, ExternalChanges::default())?;
    let total = compiler.run_until_reps_built().context("Failed to build reps")?.len();
    let outdated = compiler
        .run_until_outdatedness_determined()
        .context("Failed to determine outdatedness")?;

    if json {
        let entries: Vec<_> = outdated
            .iter()
            .map(|(rep, reasons)| {
                json!({
                    "item": rep.item.as_str(),
                    "rep": rep.name,
                    "reasons": reasons.iter().map(ToString::to_string).collect::<Vec<_>>(),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if outdated.is_empty() {
        println!("✓ All {} reps are up to date", total);
        return Ok(());
    }
    println!("{} of {} reps are outdated:", outdated.len(), total);
    for (rep, reasons) in outdated {
        let reasons: Vec<String> = reasons.iter().map(ToString::to_string).collect();
        println!("  {}: {}", rep, reasons.join(", "));
    }
    Ok(())
}
