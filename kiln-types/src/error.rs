//! Errors raised when constructing identifiers, patterns and attributes.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdentifierError {
    #[error("Invalid identifier (does not start with a slash): {0:?}")]
    InvalidIdentifier(String),

    #[error("Invalid full identifier (ends with a slash): {0:?}")]
    InvalidFullIdentifier(String),

    #[error("Invalid type for identifier: {0:?} (can be \"full\" or \"legacy\")")]
    InvalidIdentifierType(String),

    #[error("Invalid prefix (does not start with a slash): {0:?}")]
    InvalidPrefix(String),

    #[error("Cannot use this method on legacy identifiers")]
    UnsupportedOnLegacyIdentifier,
}

#[derive(Error, Debug)]
pub enum PatternError {
    #[error("Invalid regular expression {pattern:?}: {source}")]
    InvalidRegex {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AttributeError {
    #[error("The {key:?} attribute cannot be set to {kind}; reference it by identifier instead")]
    DisallowedAttributeValue { key: String, kind: String },
}
