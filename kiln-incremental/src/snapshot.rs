//! Snapshot repository
//!
//! In-memory home of every snapshot taken while compiling. Filters and
//! layouts read other reps' compiled content from here; nothing in it is
//! persisted (the compiled content cache holds the durable copy).

use dashmap::DashMap;
use kiln_types::{Content, RepKey};
use std::collections::BTreeMap;

#[derive(Debug, Default)]
pub struct SnapshotRepo {
    snapshots: DashMap<RepKey, BTreeMap<String, Content>>,
}

impl SnapshotRepo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a snapshot, replacing any earlier one with the same name
    pub fn capture(&self, rep: &RepKey, name: &str, content: Content) {
        self.snapshots
            .entry(rep.clone())
            .or_default()
            .insert(name.to_string(), content);
    }

    pub fn get(&self, rep: &RepKey, name: &str) -> Option<Content> {
        self.snapshots
            .get(rep)
            .and_then(|snapshots| snapshots.get(name).cloned())
    }

    /// All snapshots of a rep, by name
    pub fn get_all(&self, rep: &RepKey) -> BTreeMap<String, Content> {
        self.snapshots
            .get(rep)
            .map(|snapshots| snapshots.clone())
            .unwrap_or_default()
    }

    /// Replace all snapshots of a rep at once
    pub fn set_all(&self, rep: &RepKey, snapshots: BTreeMap<String, Content>) {
        self.snapshots.insert(rep.clone(), snapshots);
    }

    pub fn clear(&self) {
        self.snapshots.clear();
    }
}
