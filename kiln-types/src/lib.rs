//! Shared types for kiln
//!
//! This crate provides the vocabulary used across the kiln workspace:
//! document identifiers and patterns, the object references that key every
//! persisted store, document content and attribute values, and the action
//! sequences that describe how a representation is compiled.

pub mod action;
pub mod attribute;
pub mod content;
pub mod error;
pub mod identifier;
pub mod object;
pub mod pattern;

pub use action::{Action, ActionSequence, SnapshotDef};
pub use attribute::{AttributeValue, Attributes, IntoAttribute};
pub use content::Content;
pub use error::{AttributeError, IdentifierError, PatternError};
pub use identifier::{Identifier, IdentifierKind};
pub use object::{ObjectRef, RepKey};
pub use pattern::Pattern;
