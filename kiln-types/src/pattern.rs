//! Identifier patterns
//!
//! Rules select documents either with a path-aware glob (`/posts/*.md`,
//! `/**/*.{css,scss}`) or with a regular expression whose capture groups can
//! feed output-path templates.

use crate::error::PatternError;
use crate::identifier::Identifier;
use regex::Regex;
use std::fmt;

/// A glob or regular-expression pattern over identifier strings
#[derive(Debug, Clone)]
pub enum Pattern {
    /// Path-aware glob: `*` and `?` never cross `/`, `**` spans directories,
    /// `{a,b}` alternates. Case-sensitive.
    Glob(String),
    /// Unanchored regular expression
    Regex(Regex),
}

impl Pattern {
    pub fn glob(pattern: impl Into<String>) -> Self {
        Pattern::Glob(pattern.into())
    }

    pub fn regex(pattern: &str) -> Result<Self, PatternError> {
        Regex::new(pattern)
            .map(Pattern::Regex)
            .map_err(|source| PatternError::InvalidRegex {
                pattern: pattern.to_string(),
                source,
            })
    }

    /// Whether the pattern matches the given identifier (or raw string)
    pub fn matches(&self, target: impl AsRef<str>) -> bool {
        let target = target.as_ref();
        match self {
            Pattern::Glob(glob) => glob_match::glob_match(glob, target),
            Pattern::Regex(regex) => regex.is_match(target),
        }
    }

    /// Capture groups of a regex match.
    ///
    /// Globs never capture and return `None`, as does a regex that does not
    /// match. Groups that did not participate in the match are empty strings.
    pub fn captures(&self, target: impl AsRef<str>) -> Option<Vec<String>> {
        match self {
            Pattern::Glob(_) => None,
            Pattern::Regex(regex) => regex.captures(target.as_ref()).map(|caps| {
                caps.iter()
                    .skip(1)
                    .map(|group| group.map(|m| m.as_str().to_string()).unwrap_or_default())
                    .collect()
            }),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Pattern::Glob(glob) => glob,
            Pattern::Regex(regex) => regex.as_str(),
        }
    }

    pub fn is_glob(&self) -> bool {
        matches!(self, Pattern::Glob(_))
    }
}

impl From<&Identifier> for Pattern {
    fn from(id: &Identifier) -> Self {
        Pattern::Glob(id.as_str().to_string())
    }
}

impl From<&str> for Pattern {
    fn from(glob: &str) -> Self {
        Pattern::Glob(glob.to_string())
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
