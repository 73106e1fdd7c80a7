//! Dependency graph between compiled representations and what they read
//!
//! Edges point from a dependent (a rep, or a layout) to the object it read
//! and carry the aspects that were read. Objects are interned into an arena
//! so edges are stored as pairs of small ids in both directions.

use crate::error::StoreError;
use crate::persist::StoreFile;
use kiln_types::ObjectRef;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;

const VERSION: u32 = 1;

/// Aspects of a dependency that were read
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DependencyProps {
    #[serde(default)]
    pub raw_content: bool,
    #[serde(default)]
    pub attributes: bool,
    #[serde(default)]
    pub compiled_content: bool,
    #[serde(default)]
    pub path: bool,
}

impl DependencyProps {
    pub const NONE: DependencyProps = DependencyProps {
        raw_content: false,
        attributes: false,
        compiled_content: false,
        path: false,
    };

    pub const ALL: DependencyProps = DependencyProps {
        raw_content: true,
        attributes: true,
        compiled_content: true,
        path: true,
    };

    pub fn raw_content() -> Self {
        Self {
            raw_content: true,
            ..Self::NONE
        }
    }

    pub fn attributes() -> Self {
        Self {
            attributes: true,
            ..Self::NONE
        }
    }

    pub fn compiled_content() -> Self {
        Self {
            compiled_content: true,
            ..Self::NONE
        }
    }

    pub fn path() -> Self {
        Self {
            path: true,
            ..Self::NONE
        }
    }

    pub fn union(self, other: Self) -> Self {
        Self {
            raw_content: self.raw_content || other.raw_content,
            attributes: self.attributes || other.attributes,
            compiled_content: self.compiled_content || other.compiled_content,
            path: self.path || other.path,
        }
    }

    pub fn intersect(self, other: Self) -> Self {
        Self {
            raw_content: self.raw_content && other.raw_content,
            attributes: self.attributes && other.attributes,
            compiled_content: self.compiled_content && other.compiled_content,
            path: self.path && other.path,
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::NONE
    }
}

/// One outgoing edge as seen by callers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    pub to: ObjectRef,
    pub props: DependencyProps,
    /// Recorded speculatively (for example while probing an attribute that
    /// might not exist); still honored when deciding outdatedness
    pub conditional: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
struct ObjectId(u32);

#[derive(Debug, Clone, Copy)]
struct Edge {
    props: DependencyProps,
    conditional: bool,
}

#[derive(Debug, Default)]
struct Graph {
    objects: Vec<ObjectRef>,
    index: HashMap<ObjectRef, ObjectId>,
    forward: HashMap<ObjectId, BTreeMap<ObjectId, Edge>>,
    reverse: HashMap<ObjectId, BTreeSet<ObjectId>>,
}

impl Graph {
    fn intern(&mut self, obj: &ObjectRef) -> ObjectId {
        if let Some(id) = self.index.get(obj) {
            return *id;
        }
        let id = ObjectId(self.objects.len() as u32);
        self.objects.push(obj.clone());
        self.index.insert(obj.clone(), id);
        id
    }

    fn object(&self, id: ObjectId) -> &ObjectRef {
        &self.objects[id.0 as usize]
    }

    fn add_edge(&mut self, from: ObjectId, to: ObjectId, edge: Edge) {
        self.forward
            .entry(from)
            .or_default()
            .entry(to)
            .and_modify(|existing| {
                existing.props = existing.props.union(edge.props);
                existing.conditional = existing.conditional && edge.conditional;
            })
            .or_insert(edge);
        self.reverse.entry(to).or_default().insert(from);
    }

    fn remove_outgoing(&mut self, from: ObjectId) {
        if let Some(targets) = self.forward.remove(&from) {
            for to in targets.keys() {
                if let Some(sources) = self.reverse.get_mut(to) {
                    sources.remove(&from);
                    if sources.is_empty() {
                        self.reverse.remove(to);
                    }
                }
            }
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct EdgeRecord {
    from: ObjectRef,
    to: ObjectRef,
    props: DependencyProps,
    #[serde(default)]
    conditional: bool,
}

/// Persisted dependency graph
#[derive(Debug)]
pub struct DependencyStore {
    file: StoreFile,
    graph: RwLock<Graph>,
}

impl DependencyStore {
    pub fn new(dir: &Path) -> Self {
        Self {
            file: StoreFile::new(dir, "dependencies", VERSION),
            graph: RwLock::new(Graph::default()),
        }
    }

    /// Replace the in-memory graph with the persisted one
    pub fn load(&mut self) {
        let records: Vec<EdgeRecord> = self.file.load();
        let mut graph = Graph::default();
        for record in &records {
            let from = graph.intern(&record.from);
            let to = graph.intern(&record.to);
            graph.add_edge(
                from,
                to,
                Edge {
                    props: record.props,
                    conditional: record.conditional,
                },
            );
        }
        *self.graph.get_mut() = graph;
        tracing::debug!("Loaded {} dependency edges", records.len());
    }

    /// Record that `from` read the given aspects of `to`.
    ///
    /// Recording the same edge again merges aspects; an unconditional
    /// recording makes the edge unconditional.
    pub fn record_dependency(
        &self,
        from: &ObjectRef,
        to: &ObjectRef,
        props: DependencyProps,
        conditional: bool,
    ) {
        if from == to {
            return;
        }
        let mut graph = self.graph.write();
        let from = graph.intern(from);
        let to = graph.intern(to);
        graph.add_edge(from, to, Edge { props, conditional });
    }

    /// Outgoing edges of an object, ordered by target
    pub fn dependencies_of(&self, object: &ObjectRef) -> Vec<Dependency> {
        let graph = self.graph.read();
        let Some(id) = graph.index.get(object) else {
            return Vec::new();
        };
        let mut deps: Vec<Dependency> = graph
            .forward
            .get(id)
            .map(|targets| {
                targets
                    .iter()
                    .map(|(to, edge)| Dependency {
                        to: graph.object(*to).clone(),
                        props: edge.props,
                        conditional: edge.conditional,
                    })
                    .collect()
            })
            .unwrap_or_default();
        deps.sort_by(|a, b| a.to.cmp(&b.to));
        deps
    }

    /// Objects with an edge pointing at `object`
    pub fn objects_depending_on(&self, object: &ObjectRef) -> Vec<ObjectRef> {
        let graph = self.graph.read();
        let Some(id) = graph.index.get(object) else {
            return Vec::new();
        };
        graph
            .reverse
            .get(id)
            .map(|sources| {
                let mut objects: Vec<ObjectRef> =
                    sources.iter().map(|s| graph.object(*s).clone()).collect();
                objects.sort();
                objects
            })
            .unwrap_or_default()
    }

    /// Drop every outgoing edge of an object. Used before an object is
    /// recompiled, so the edges recorded during compilation replace the old
    /// set instead of accumulating.
    pub fn forget_dependencies_for(&self, object: &ObjectRef) {
        let mut graph = self.graph.write();
        if let Some(id) = graph.index.get(object).copied() {
            graph.remove_outgoing(id);
        }
    }

    /// Drop the outgoing edges of every object the predicate rejects
    pub fn retain_sources(&self, mut keep: impl FnMut(&ObjectRef) -> bool) {
        let mut graph = self.graph.write();
        let doomed: Vec<ObjectId> = graph
            .forward
            .keys()
            .copied()
            .filter(|id| !keep(graph.object(*id)))
            .collect();
        for id in doomed {
            graph.remove_outgoing(id);
        }
    }

    pub fn edge_count(&self) -> usize {
        self.graph.read().forward.values().map(BTreeMap::len).sum()
    }

    pub fn save(&self) -> Result<(), StoreError> {
        let graph = self.graph.read();
        let mut records: Vec<EdgeRecord> = graph
            .forward
            .iter()
            .flat_map(|(from, targets)| {
                let graph = &*graph;
                targets.iter().map(move |(to, edge)| EdgeRecord {
                    from: graph.object(*from).clone(),
                    to: graph.object(*to).clone(),
                    props: edge.props,
                    conditional: edge.conditional,
                })
            })
            .collect();
        records.sort_by(|a, b| (&a.from, &a.to).cmp(&(&b.from, &b.to)));
        self.file.save(&records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_types::{Identifier, RepKey};

    fn rep(path: &str) -> ObjectRef {
        ObjectRef::Rep(RepKey::new(Identifier::full(path).unwrap(), "default"))
    }

    fn item(path: &str) -> ObjectRef {
        ObjectRef::item(&Identifier::full(path).unwrap())
    }

    #[test]
    fn test_record_is_idempotent_and_merges_props() {
        let dir = tempfile::tempdir().unwrap();
        let store = DependencyStore::new(dir.path());
        let from = rep("/a.md");
        let to = item("/b.md");

        store.record_dependency(&from, &to, DependencyProps::attributes(), true);
        store.record_dependency(&from, &to, DependencyProps::attributes(), true);
        store.record_dependency(&from, &to, DependencyProps::raw_content(), false);

        let deps = store.dependencies_of(&from);
        assert_eq!(deps.len(), 1);
        assert!(deps[0].props.attributes);
        assert!(deps[0].props.raw_content);
        assert!(!deps[0].conditional);
        assert_eq!(store.objects_depending_on(&to), vec![from]);
    }

    #[test]
    fn test_forget_replaces_edge_set() {
        let dir = tempfile::tempdir().unwrap();
        let store = DependencyStore::new(dir.path());
        let from = rep("/a.md");

        store.record_dependency(&from, &item("/b.md"), DependencyProps::ALL, false);
        store.forget_dependencies_for(&from);
        store.record_dependency(&from, &item("/c.md"), DependencyProps::ALL, false);

        let targets: Vec<_> = store.dependencies_of(&from).into_iter().map(|d| d.to).collect();
        assert_eq!(targets, vec![item("/c.md")]);
        assert!(store.objects_depending_on(&item("/b.md")).is_empty());
    }

    #[test]
    fn test_self_edges_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let store = DependencyStore::new(dir.path());
        store.record_dependency(&rep("/a.md"), &rep("/a.md"), DependencyProps::ALL, false);
        assert_eq!(store.edge_count(), 0);
    }

    #[test]
    fn test_persistence_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = DependencyStore::new(dir.path());
        store.record_dependency(&rep("/a.md"), &item("/b.md"), DependencyProps::path(), true);
        store.record_dependency(&rep("/a.md"), &ObjectRef::Config, DependencyProps::attributes(), false);
        store.save().unwrap();

        let mut loaded = DependencyStore::new(dir.path());
        loaded.load();
        assert_eq!(loaded.dependencies_of(&rep("/a.md")), store.dependencies_of(&rep("/a.md")));
    }

    #[test]
    fn test_retain_sources() {
        let dir = tempfile::tempdir().unwrap();
        let store = DependencyStore::new(dir.path());
        store.record_dependency(&rep("/a.md"), &item("/x.md"), DependencyProps::ALL, false);
        store.record_dependency(&rep("/gone.md"), &item("/x.md"), DependencyProps::ALL, false);

        store.retain_sources(|obj| obj != &rep("/gone.md"));
        assert_eq!(store.objects_depending_on(&item("/x.md")), vec![rep("/a.md")]);
    }
}
