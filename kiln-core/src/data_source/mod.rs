//! Document sources
//!
//! A data source provides the site's items and layouts and, optionally,
//! streams of changes to them.

mod filesystem;
mod memory;
mod prefixed;

pub use filesystem::FilesystemDataSource;
pub use memory::InMemoryDataSource;
pub use prefixed::PrefixedDataSource;

use crate::changes::ChangesStream;
use crate::config::{DataSourceConfig, SiteConfig};
use crate::document::{Document, DocumentError};
use crate::frontmatter::FrontmatterError;
use kiln_types::IdentifierError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DataSourceError {
    #[error("Failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to walk directory: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("Invalid frontmatter in {path:?}: {source}")]
    Frontmatter {
        path: PathBuf,
        #[source]
        source: FrontmatterError,
    },

    #[error(transparent)]
    Identifier(#[from] IdentifierError),

    #[error(transparent)]
    Document(#[from] DocumentError),
}

pub trait DataSource: Send + Sync {
    /// Human-readable name used in errors and logs
    fn name(&self) -> &str;

    fn items(&self) -> Result<Vec<Document>, DataSourceError>;

    fn layouts(&self) -> Result<Vec<Document>, DataSourceError>;

    fn item_changes(&self) -> ChangesStream {
        ChangesStream::empty()
    }

    fn layout_changes(&self) -> ChangesStream {
        ChangesStream::empty()
    }
}

/// Instantiate the data sources listed in the configuration
pub fn from_config(config: &SiteConfig) -> Vec<Box<dyn DataSource>> {
    config
        .data_sources
        .iter()
        .map(|source| -> Box<dyn DataSource> {
            match source {
                DataSourceConfig::Filesystem {
                    content_dir,
                    layouts_dir,
                    items_root,
                    layouts_root,
                } => {
                    let fs = FilesystemDataSource::new(
                        config.resolve_relative(content_dir),
                        config.resolve_relative(layouts_dir),
                        config.text_extensions.clone(),
                    );
                    if items_root == "/" && layouts_root == "/" {
                        Box::new(fs)
                    } else {
                        Box::new(PrefixedDataSource::new(
                            Box::new(fs),
                            items_root.clone(),
                            layouts_root.clone(),
                        ))
                    }
                }
            }
        })
        .collect()
}
