//! Build command implementation.

use super::{compiler_for, load_config};
use anyhow::{bail, Context, Result};
use kiln_core::{CompileSummary, CompilerError, SiteConfig};
use kiln_incremental::ExternalChanges;
use std::path::Path;

/// Compile every outdated rep of the site
pub fn build_site(config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    build_with_changes(config, ExternalChanges::default()).map(|_| ())
}

/// Compile with changes reported since the previous run
pub fn build_with_changes(config: SiteConfig, changes: ExternalChanges) -> Result<CompileSummary> {
    let mut compiler = compiler_for(config, changes)?;

    match compiler.run() {
        Ok(summary) => {
            print_summary(&summary);
            Ok(summary)
        }
        Err(CompilerError::RepsFailed(failures)) => {
            for failure in &failures {
                eprintln!("✗ {}", failure);
            }
            bail!("{} rep(s) failed to compile", failures.len())
        }
        Err(e) => Err(e).context("Failed to compile site"),
    }
}

fn print_summary(summary: &CompileSummary) {
    println!(
        "✓ Compiled {} of {} reps ({} from cache)",
        summary.compiled, summary.reps, summary.cached
    );
    println!(
        "  {} files written, {} unchanged, {} pruned",
        summary.written, summary.unchanged, summary.pruned
    );
    tracing::debug!(
        "Cache: {} hits, {} misses ({:.1}% hit rate), {} entries",
        summary.cache.hits,
        summary.cache.misses,
        summary.cache.hit_rate() * 100.0,
        summary.cache.entries
    );
}
