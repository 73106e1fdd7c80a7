//! CLI command implementations.

pub mod build;
pub mod check;
pub mod init;
pub mod watch;

pub use build::build_site;
pub use check::check_site;
pub use init::init_project;
pub use watch::watch_site;

use crate::filters::SiteFilters;
use anyhow::{Context, Result};
use kiln_core::{Compiler, Rules, Site, SiteConfig};
use kiln_incremental::ExternalChanges;
use std::path::{Path, PathBuf};

/// Rules file, next to the configuration file
pub const RULES_FILE: &str = "rules.yml";

pub(crate) fn load_config(config_path: &Path) -> Result<SiteConfig> {
    tracing::info!("Loading config from {:?}", config_path);
    SiteConfig::from_file(config_path).context("Failed to load configuration")
}

pub(crate) fn rules_path(config: &SiteConfig) -> PathBuf {
    config.root_dir().join(RULES_FILE)
}

/// Load the site and rules and assemble a compiler for one run
pub(crate) fn compiler_for(config: SiteConfig, changes: ExternalChanges) -> Result<Compiler> {
    let rules_path = rules_path(&config);
    let rules = Rules::from_file(&rules_path)
        .with_context(|| format!("Failed to load rules from {:?}", rules_path))?;
    let site = Site::load(config).context("Failed to load site")?;

    Compiler::builder(site)
        .action_provider(rules)
        .transformer(SiteFilters::new())
        .changes(changes)
        .build()
        .context("Failed to set up compiler")
}
