//! Frontmatter parsing for text documents.

use crate::attributes::attributes_from_mapping;
use kiln_types::Attributes;
use regex::Regex;
use std::sync::OnceLock;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FrontmatterError {
    #[error("Invalid YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Frontmatter must be a mapping")]
    NotAMapping,
}

static FRONTMATTER_REGEX: OnceLock<Regex> = OnceLock::new();

fn frontmatter_regex() -> &'static Regex {
    FRONTMATTER_REGEX.get_or_init(|| Regex::new(r"(?s)^---\s*\n(.*?)\n---\s*\n(.*)$").unwrap())
}

/// Split a document into its frontmatter attributes and body
///
/// Returns empty attributes and the full text when no frontmatter is present.
///
/// # Example
///
/// ```
/// use kiln_core::frontmatter::parse_frontmatter;
///
/// let content = "---\ntitle: My Post\n---\n# Hello World\n";
///
/// let (attributes, body) = parse_frontmatter(content).unwrap();
/// assert_eq!(attributes["title"].as_str(), Some("My Post"));
/// assert_eq!(body, "# Hello World\n");
/// ```
pub fn parse_frontmatter(content: &str) -> Result<(Attributes, String), FrontmatterError> {
    let Some(captures) = frontmatter_regex().captures(content) else {
        return Ok((Attributes::new(), content.to_string()));
    };
    let yaml = captures.get(1).map_or("", |m| m.as_str());
    let body = captures.get(2).map_or("", |m| m.as_str());

    let attributes = match serde_yaml::from_str::<serde_yaml::Value>(yaml)? {
        serde_yaml::Value::Null => Attributes::new(),
        serde_yaml::Value::Mapping(map) => attributes_from_mapping(map),
        _ => return Err(FrontmatterError::NotAMapping),
    };

    Ok((attributes, body.to_string()))
}
