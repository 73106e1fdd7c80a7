//! Object references
//!
//! Every persisted store is keyed by an [`ObjectRef`]. Each object class has
//! its own variant, so an item and a layout with the same identifier never
//! share a checksum or dependency record.

use crate::identifier::Identifier;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of one compiled variant of an item
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RepKey {
    pub item: Identifier,
    pub name: String,
}

impl RepKey {
    pub fn new(item: Identifier, name: impl Into<String>) -> Self {
        Self {
            item,
            name: name.into(),
        }
    }
}

impl fmt::Display for RepKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.item, self.name)
    }
}

/// Reference to any object the compiler tracks
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum ObjectRef {
    Item(Identifier),
    Layout(Identifier),
    Rep(RepKey),
    /// The site configuration
    Config,
    /// A code snippet, keyed by its source path
    CodeSnippet(String),
    /// The set of all items (membership, not contents)
    Items,
    /// The set of all layouts
    Layouts,
}

impl ObjectRef {
    pub fn item(id: &Identifier) -> Self {
        ObjectRef::Item(id.clone())
    }

    pub fn layout(id: &Identifier) -> Self {
        ObjectRef::Layout(id.clone())
    }

    /// The document identifier, for items and layouts
    pub fn identifier(&self) -> Option<&Identifier> {
        match self {
            ObjectRef::Item(id) | ObjectRef::Layout(id) => Some(id),
            ObjectRef::Rep(key) => Some(&key.item),
            _ => None,
        }
    }

    /// Config and code snippets feed every compilation implicitly
    pub fn is_global(&self) -> bool {
        matches!(self, ObjectRef::Config | ObjectRef::CodeSnippet(_))
    }
}

impl From<RepKey> for ObjectRef {
    fn from(key: RepKey) -> Self {
        ObjectRef::Rep(key)
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObjectRef::Item(id) => write!(f, "item {id}"),
            ObjectRef::Layout(id) => write!(f, "layout {id}"),
            ObjectRef::Rep(key) => write!(f, "rep {key}"),
            ObjectRef::Config => write!(f, "config"),
            ObjectRef::CodeSnippet(path) => write!(f, "code snippet {path}"),
            ObjectRef::Items => write!(f, "item collection"),
            ObjectRef::Layouts => write!(f, "layout collection"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyspaces_are_disjoint() {
        let id = Identifier::full("/default.html").unwrap();
        assert_ne!(ObjectRef::item(&id), ObjectRef::layout(&id));
    }

    #[test]
    fn test_serde_round_trip() {
        let key = RepKey::new(Identifier::full("/a.md").unwrap(), "default");
        for obj in [
            ObjectRef::Rep(key),
            ObjectRef::Config,
            ObjectRef::CodeSnippet("rules.yml".into()),
            ObjectRef::Items,
        ] {
            let json = serde_json::to_string(&obj).unwrap();
            let back: ObjectRef = serde_json::from_str(&json).unwrap();
            assert_eq!(back, obj);
        }
    }

    #[test]
    fn test_display() {
        let id = Identifier::full("/a.md").unwrap();
        assert_eq!(ObjectRef::item(&id).to_string(), "item /a.md");
        assert_eq!(
            ObjectRef::Rep(RepKey::new(id, "print")).to_string(),
            "rep /a.md (print)"
        );
    }
}
