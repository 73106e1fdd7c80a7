//! Action sequences
//!
//! An action sequence is the ordered list of steps that turns an item's raw
//! content into a representation: filters, layouts and snapshots. It is
//! persisted between runs so that a change in the rules can be detected by
//! plain equality.

use crate::attribute::Attributes;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Action {
    Filter {
        name: String,
        #[serde(default)]
        params: Attributes,
    },
    Layout {
        identifier: String,
        #[serde(default)]
        params: Attributes,
    },
    Snapshot {
        name: String,
        #[serde(default)]
        path: Option<String>,
    },
}

impl Action {
    /// Output path routed by a snapshot step
    pub fn path(&self) -> Option<&str> {
        match self {
            Action::Snapshot { path, .. } => path.as_deref(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionSequence(Vec<Action>);

impl ActionSequence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_filter(&mut self, name: impl Into<String>, params: Attributes) -> &mut Self {
        self.0.push(Action::Filter {
            name: name.into(),
            params,
        });
        self
    }

    pub fn add_layout(&mut self, identifier: impl Into<String>, params: Attributes) -> &mut Self {
        self.0.push(Action::Layout {
            identifier: identifier.into(),
            params,
        });
        self
    }

    pub fn add_snapshot(&mut self, name: impl Into<String>, path: Option<String>) -> &mut Self {
        self.0.push(Action::Snapshot {
            name: name.into(),
            path,
        });
        self
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Action> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Snapshot names in the order they are taken
    pub fn snapshot_names(&self) -> Vec<&str> {
        self.0
            .iter()
            .filter_map(|action| match action {
                Action::Snapshot { name, .. } => Some(name.as_str()),
                _ => None,
            })
            .collect()
    }

    /// `(snapshot name, output path)` for every routed snapshot
    pub fn paths(&self) -> Vec<(&str, &str)> {
        self.0
            .iter()
            .filter_map(|action| match action {
                Action::Snapshot {
                    name,
                    path: Some(path),
                } => Some((name.as_str(), path.as_str())),
                _ => None,
            })
            .collect()
    }
}

impl From<Vec<Action>> for ActionSequence {
    fn from(actions: Vec<Action>) -> Self {
        Self(actions)
    }
}

impl<'a> IntoIterator for &'a ActionSequence {
    type Item = &'a Action;
    type IntoIter = std::slice::Iter<'a, Action>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// A snapshot declared by the rules, with whether its content is binary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotDef {
    pub name: String,
    #[serde(default)]
    pub binary: bool,
}

impl SnapshotDef {
    pub fn new(name: impl Into<String>, binary: bool) -> Self {
        Self {
            name: name.into(),
            binary,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ActionSequence {
        let mut seq = ActionSequence::new();
        seq.add_filter("markdown", Attributes::new())
            .add_snapshot("pre", None)
            .add_layout("/default.html", Attributes::new())
            .add_snapshot("last", Some("/index.html".into()));
        seq
    }

    #[test]
    fn test_paths_and_snapshots() {
        let seq = sample();
        assert_eq!(seq.len(), 4);
        assert_eq!(seq.snapshot_names(), vec!["pre", "last"]);
        assert_eq!(seq.paths(), vec![("last", "/index.html")]);
    }

    #[test]
    fn test_equality_detects_rule_changes() {
        let mut changed = ActionSequence::new();
        changed
            .add_filter("markdown", Attributes::new())
            .add_snapshot("pre", None)
            .add_layout("/other.html", Attributes::new())
            .add_snapshot("last", Some("/index.html".into()));
        assert_eq!(sample(), sample());
        assert_ne!(sample(), changed);
    }

    #[test]
    fn test_serialized_form() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(json[0]["kind"], "filter");
        assert_eq!(json[3]["path"], "/index.html");
        let back: ActionSequence = serde_json::from_value(json).unwrap();
        assert_eq!(back, sample());
    }
}
