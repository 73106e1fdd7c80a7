//! Outdatedness marks
//!
//! A rep found outdated is marked before compilation starts and unmarked only
//! once its compiled result has been stored. A run that is interrupted (or
//! whose rep fails) leaves the mark in place, and the next run recompiles
//! the rep even though its checksums were already saved.

use crate::error::StoreError;
use crate::persist::StoreFile;
use kiln_types::RepKey;
use parking_lot::RwLock;
use std::collections::{BTreeSet, HashSet};
use std::path::Path;

const VERSION: u32 = 1;

#[derive(Debug)]
pub struct OutdatednessStore {
    file: StoreFile,
    marks: RwLock<HashSet<RepKey>>,
}

impl OutdatednessStore {
    pub fn new(dir: &Path) -> Self {
        Self {
            file: StoreFile::new(dir, "outdatedness", VERSION),
            marks: RwLock::new(HashSet::new()),
        }
    }

    pub fn load(&mut self) {
        let marks: Vec<RepKey> = self.file.load();
        *self.marks.get_mut() = marks.into_iter().collect();
    }

    pub fn add(&self, rep: RepKey) {
        self.marks.write().insert(rep);
    }

    pub fn remove(&self, rep: &RepKey) {
        self.marks.write().remove(rep);
    }

    pub fn contains(&self, rep: &RepKey) -> bool {
        self.marks.read().contains(rep)
    }

    pub fn len(&self) -> usize {
        self.marks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.marks.read().is_empty()
    }

    /// Drop marks of reps that no longer exist
    pub fn retain(&self, mut keep: impl FnMut(&RepKey) -> bool) {
        self.marks.write().retain(|rep| keep(rep));
    }

    pub fn save(&self) -> Result<(), StoreError> {
        let sorted: BTreeSet<RepKey> = self.marks.read().iter().cloned().collect();
        self.file.save(&sorted)
    }
}
