//! Configuration parsing and management.

use crate::attributes::attribute_from_json;
use kiln_incremental::{Aspect, Checksummable, Digest};
use kiln_types::{AttributeValue, ObjectRef};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    ParseError(#[from] serde_yaml::Error),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

/// Main configuration struct matching the kiln.yml schema
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteConfig {
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Where the compiler keeps state between runs
    #[serde(default = "default_tmp_dir")]
    pub tmp_dir: PathBuf,

    /// Number of reps compiled concurrently (defaults to the CPU count)
    #[serde(default)]
    pub parallelism: Option<usize>,

    #[serde(default)]
    pub prune: PruneConfig,

    #[serde(default = "default_data_sources")]
    pub data_sources: Vec<DataSourceConfig>,

    /// Extensions of files loaded as text; everything else is binary
    #[serde(default = "default_text_extensions")]
    pub text_extensions: Vec<String>,

    /// Site-specific settings, readable from filters
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,

    // Internal: path to config file (for relative path resolution)
    #[serde(skip)]
    config_path: Option<PathBuf>,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

fn default_tmp_dir() -> PathBuf {
    PathBuf::from("tmp/kiln")
}

fn default_data_sources() -> Vec<DataSourceConfig> {
    vec![DataSourceConfig::default()]
}

fn default_text_extensions() -> Vec<String> {
    [
        "adoc", "asciidoc", "atom", "css", "erb", "haml", "htm", "html", "js", "json", "less",
        "markdown", "md", "mkd", "rb", "rss", "sass", "scss", "slim", "svg", "txt", "xhtml",
        "xml", "yaml", "yml",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PruneConfig {
    /// Delete files in the output directory that no rep writes
    #[serde(default)]
    pub auto_prune: bool,

    /// Top-level entries of the output directory that are never pruned
    #[serde(default)]
    pub exclude: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DataSourceConfig {
    Filesystem {
        #[serde(default = "default_content_dir")]
        content_dir: PathBuf,
        #[serde(default = "default_layouts_dir")]
        layouts_dir: PathBuf,
        /// Prefix for the identifiers of items from this source
        #[serde(default = "default_root")]
        items_root: String,
        #[serde(default = "default_root")]
        layouts_root: String,
    },
}

fn default_content_dir() -> PathBuf {
    PathBuf::from("content")
}

fn default_layouts_dir() -> PathBuf {
    PathBuf::from("layouts")
}

fn default_root() -> String {
    String::from("/")
}

impl Default for DataSourceConfig {
    fn default() -> Self {
        DataSourceConfig::Filesystem {
            content_dir: default_content_dir(),
            layouts_dir: default_layouts_dir(),
            items_root: default_root(),
            layouts_root: default_root(),
        }
    }
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            tmp_dir: default_tmp_dir(),
            parallelism: None,
            prune: PruneConfig::default(),
            data_sources: default_data_sources(),
            text_extensions: default_text_extensions(),
            extra: BTreeMap::new(),
            config_path: None,
        }
    }
}

impl SiteConfig {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        let mut config = Self::parse(&contents)?;

        // Store config file path for relative path resolution
        config.config_path = Some(path.to_path_buf());

        Ok(config)
    }

    /// Parse configuration from YAML text; relative paths resolve against
    /// the working directory
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let config: SiteConfig = if yaml.trim().is_empty() {
            SiteConfig::default()
        } else {
            serde_yaml::from_str(yaml)?
        };
        config.validate()?;
        Ok(config)
    }

    /// Resolve relative paths against the given directory
    pub fn with_root(mut self, root: &Path) -> Self {
        self.config_path = Some(root.join("kiln.yml"));
        self
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.parallelism == Some(0) {
            return Err(ConfigError::InvalidValue {
                field: "parallelism".into(),
                message: "must be at least 1".into(),
            });
        }
        for source in &self.data_sources {
            let DataSourceConfig::Filesystem {
                items_root,
                layouts_root,
                ..
            } = source;
            for (field, root) in [("items_root", items_root), ("layouts_root", layouts_root)] {
                if !root.starts_with('/') {
                    return Err(ConfigError::InvalidValue {
                        field: field.into(),
                        message: format!("{root:?} does not start with a slash"),
                    });
                }
            }
        }
        Ok(())
    }

    /// Get the output directory, resolved relative to config file
    pub fn output_dir(&self) -> PathBuf {
        self.resolve_path(&self.output_dir)
    }

    /// Get the state directory, resolved relative to config file
    pub fn tmp_dir(&self) -> PathBuf {
        self.resolve_path(&self.tmp_dir)
    }

    /// Directory the config file lives in
    pub fn root_dir(&self) -> PathBuf {
        self.config_path
            .as_ref()
            .and_then(|p| p.parent())
            .map(Path::to_path_buf)
            .unwrap_or_default()
    }

    /// Resolve an arbitrary path relative to the config file location
    pub fn resolve_relative(&self, path: &Path) -> PathBuf {
        self.resolve_path(path)
    }

    /// Resolve a path relative to the config file location
    fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else if let Some(config_path) = &self.config_path {
            if let Some(parent) = config_path.parent() {
                parent.join(path)
            } else {
                path.to_path_buf()
            }
        } else {
            path.to_path_buf()
        }
    }

    pub fn is_text_extension(&self, ext: &str) -> bool {
        self.text_extensions
            .iter()
            .any(|known| known.eq_ignore_ascii_case(ext))
    }

    /// Get a nested config value using dotted path (e.g., "site.title")
    pub fn get(&self, key: &str) -> Option<AttributeValue> {
        let mut value = serde_json::to_value(self).ok()?;
        for part in key.split('.') {
            value = match value {
                serde_json::Value::Object(mut map) => map.remove(part)?,
                serde_json::Value::Array(mut list) => {
                    let index: usize = part.parse().ok()?;
                    if index >= list.len() {
                        return None;
                    }
                    list.swap_remove(index)
                }
                _ => return None,
            };
        }
        Some(attribute_from_json(value))
    }
}

impl Checksummable for SiteConfig {
    fn object_ref(&self) -> ObjectRef {
        ObjectRef::Config
    }

    fn digest(&self, aspect: Aspect) -> Option<Digest> {
        match aspect {
            Aspect::Other => Digest::of_json(self),
            _ => None,
        }
    }
}
