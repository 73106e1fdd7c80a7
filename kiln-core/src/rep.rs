//! Item representations
//!
//! A rep is one compiled variant of an item, built from the action sequence
//! the rules give it. Reps exist only for the duration of a run.

use crate::compiler::CompileError;
use dashmap::DashSet;
use kiln_incremental::RepDescriptor;
use kiln_types::{ActionSequence, RepKey, SnapshotDef};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

/// Snapshot every rep ends with
pub const LAST_SNAPSHOT: &str = "last";

#[derive(Debug, Clone)]
pub struct ItemRep {
    pub key: RepKey,
    pub sequence: ActionSequence,
    pub snapshot_defs: Vec<SnapshotDef>,
    /// Snapshot name -> output path, relative to the output directory and
    /// starting with `/`
    pub paths: BTreeMap<String, String>,
}

impl ItemRep {
    pub fn new(
        key: RepKey,
        sequence: ActionSequence,
        snapshot_defs: Vec<SnapshotDef>,
    ) -> Result<Self, CompileError> {
        let mut paths = BTreeMap::new();
        for (snapshot, path) in sequence.paths() {
            if !path.starts_with('/') {
                return Err(CompileError::InvalidPath {
                    rep: key,
                    path: path.to_string(),
                });
            }
            paths.insert(snapshot.to_string(), path.to_string());
        }
        Ok(Self {
            key,
            sequence,
            snapshot_defs,
            paths,
        })
    }

    /// Snapshots a compilation of this rep produces
    pub fn snapshot_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .sequence
            .snapshot_names()
            .into_iter()
            .map(str::to_string)
            .collect();
        names.push(LAST_SNAPSHOT.to_string());
        names.sort();
        names.dedup();
        names
    }

    pub fn path(&self, snapshot: &str) -> Option<&str> {
        self.paths.get(snapshot).map(String::as_str)
    }

    /// Location on disk of a routed snapshot
    pub fn raw_path(&self, output_dir: &Path, snapshot: &str) -> Option<PathBuf> {
        self.path(snapshot)
            .map(|path| output_dir.join(path.trim_start_matches('/')))
    }

    pub fn output_files(&self, output_dir: &Path) -> Vec<PathBuf> {
        self.paths
            .keys()
            .filter_map(|snapshot| self.raw_path(output_dir, snapshot))
            .collect()
    }

    pub fn is_binary(&self, snapshot: &str) -> bool {
        self.snapshot_defs
            .iter()
            .any(|def| def.name == snapshot && def.binary)
    }
}

/// All reps of a run
#[derive(Debug, Default)]
pub struct RepRepo {
    reps: Vec<ItemRep>,
    index: HashMap<RepKey, usize>,
    routes: HashMap<String, RepKey>,
    /// Directory -> one route below it
    route_dirs: HashMap<String, (RepKey, String)>,
    compiled: DashSet<RepKey>,
}

impl RepRepo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a rep, rejecting output paths another rep already claimed and
    /// paths that would have to be both a file and a directory
    pub fn insert(&mut self, rep: ItemRep) -> Result<(), CompileError> {
        for path in rep.paths.values() {
            if let Some(other) = self.routes.get(path) {
                if other != &rep.key {
                    return Err(CompileError::DuplicateOutputPath {
                        rep: rep.key.clone(),
                        other: other.clone(),
                        path: path.clone(),
                    });
                }
            }
            self.check_nesting(&rep, path)?;
        }
        for path in rep.paths.values() {
            self.routes.insert(path.clone(), rep.key.clone());
            for dir in parent_dirs(path) {
                self.route_dirs
                    .entry(dir.to_string())
                    .or_insert_with(|| (rep.key.clone(), path.clone()));
            }
        }
        match self.index.get(&rep.key) {
            Some(&i) => self.reps[i] = rep,
            None => {
                self.index.insert(rep.key.clone(), self.reps.len());
                self.reps.push(rep);
            }
        }
        Ok(())
    }

    fn check_nesting(&self, rep: &ItemRep, path: &str) -> Result<(), CompileError> {
        let nested = |other: &RepKey, other_path: &str| CompileError::NestedOutputPath {
            rep: rep.key.clone(),
            path: path.to_string(),
            other: other.clone(),
            other_path: other_path.to_string(),
        };

        for dir in parent_dirs(path) {
            if let Some(other) = self.routes.get(dir) {
                return Err(nested(other, dir));
            }
            if rep.paths.values().any(|own| own == dir) {
                return Err(nested(&rep.key, dir));
            }
        }
        if let Some((other, other_path)) = self.route_dirs.get(path) {
            return Err(nested(other, other_path.as_str()));
        }
        Ok(())
    }

    pub fn get(&self, key: &RepKey) -> Option<&ItemRep> {
        self.index.get(key).map(|&i| &self.reps[i])
    }

    pub fn contains(&self, key: &RepKey) -> bool {
        self.index.contains_key(key)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ItemRep> {
        self.reps.iter()
    }

    pub fn len(&self) -> usize {
        self.reps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reps.is_empty()
    }

    pub fn set_compiled(&self, key: &RepKey) {
        self.compiled.insert(key.clone());
    }

    pub fn is_compiled(&self, key: &RepKey) -> bool {
        self.compiled.contains(key)
    }

    /// Every file some rep writes
    pub fn output_files(&self, output_dir: &Path) -> Vec<PathBuf> {
        self.reps
            .iter()
            .flat_map(|rep| rep.output_files(output_dir))
            .collect()
    }

    /// What the outdatedness checker needs per rep
    pub fn descriptors(&self, output_dir: &Path) -> HashMap<RepKey, RepDescriptor> {
        self.reps
            .iter()
            .map(|rep| {
                let descriptor = RepDescriptor {
                    key: rep.key.clone(),
                    snapshot_names: rep.snapshot_names(),
                    output_files: rep.output_files(output_dir),
                };
                (rep.key.clone(), descriptor)
            })
            .collect()
    }
}

/// Directories a route's file lives in, outermost first
fn parent_dirs(path: &str) -> impl Iterator<Item = &str> {
    path.match_indices('/')
        .map(move |(i, _)| &path[..i])
        .filter(|dir| !dir.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_types::Identifier;

    fn key(path: &str, name: &str) -> RepKey {
        RepKey::new(Identifier::full(path).unwrap(), name)
    }

    fn routed(path: &str) -> ActionSequence {
        let mut sequence = ActionSequence::new();
        sequence
            .add_filter("markdown", Default::default())
            .add_snapshot(LAST_SNAPSHOT, Some(path.to_string()));
        sequence
    }

    #[test]
    fn test_paths_must_start_with_slash() {
        let err = ItemRep::new(key("/a.md", "default"), routed("a.html"), vec![]).unwrap_err();
        assert!(matches!(err, CompileError::InvalidPath { .. }));
    }

    #[test]
    fn test_duplicate_output_paths_are_rejected() {
        let mut repo = RepRepo::new();
        repo.insert(ItemRep::new(key("/a.md", "default"), routed("/index.html"), vec![]).unwrap())
            .unwrap();
        let err = repo
            .insert(ItemRep::new(key("/b.md", "default"), routed("/index.html"), vec![]).unwrap())
            .unwrap_err();
        assert!(matches!(err, CompileError::DuplicateOutputPath { .. }));
        assert_eq!(repo.len(), 1);
    }

    #[test]
    fn test_nested_output_paths_are_rejected() {
        let mut repo = RepRepo::new();
        repo.insert(ItemRep::new(key("/a.md", "default"), routed("/posts"), vec![]).unwrap())
            .unwrap();
        let err = repo
            .insert(ItemRep::new(key("/b.md", "default"), routed("/posts/b.html"), vec![]).unwrap())
            .unwrap_err();
        assert!(matches!(err, CompileError::NestedOutputPath { .. }));

        repo.insert(ItemRep::new(key("/c.md", "default"), routed("/docs/c/index.html"), vec![]).unwrap())
            .unwrap();
        let err = repo
            .insert(ItemRep::new(key("/d.md", "default"), routed("/docs/c"), vec![]).unwrap())
            .unwrap_err();
        assert!(matches!(err, CompileError::NestedOutputPath { .. }));

        // Sharing a directory is fine
        repo.insert(ItemRep::new(key("/e.md", "default"), routed("/docs/c/e.html"), vec![]).unwrap())
            .unwrap();
        assert_eq!(repo.len(), 3);
    }

    #[test]
    fn test_rep_cannot_nest_its_own_outputs() {
        let mut sequence = routed("/blocker/x.html");
        sequence.add_snapshot("pre", Some("/blocker".to_string()));
        let rep = ItemRep::new(key("/a.md", "default"), sequence, vec![]).unwrap();

        let err = RepRepo::new().insert(rep).unwrap_err();
        assert!(matches!(err, CompileError::NestedOutputPath { .. }));
    }

    #[test]
    fn test_parent_dirs() {
        assert_eq!(parent_dirs("/a/b/c.html").collect::<Vec<_>>(), vec!["/a", "/a/b"]);
        assert!(parent_dirs("/index.html").next().is_none());
    }

    #[test]
    fn test_raw_path_and_snapshot_names() {
        let mut sequence = routed("/posts/a/index.html");
        sequence.add_snapshot("pre", None);
        let rep = ItemRep::new(key("/posts/a.md", "default"), sequence, vec![]).unwrap();

        assert_eq!(
            rep.raw_path(Path::new("/out"), LAST_SNAPSHOT),
            Some(PathBuf::from("/out/posts/a/index.html"))
        );
        assert_eq!(rep.raw_path(Path::new("/out"), "pre"), None);
        assert_eq!(rep.snapshot_names(), vec!["last".to_string(), "pre".to_string()]);
    }

    #[test]
    fn test_compiled_flag() {
        let mut repo = RepRepo::new();
        let k = key("/a.md", "default");
        repo.insert(ItemRep::new(k.clone(), ActionSequence::new(), vec![]).unwrap())
            .unwrap();
        assert!(!repo.is_compiled(&k));
        repo.set_compiled(&k);
        assert!(repo.is_compiled(&k));
    }
}
