//! Checksum store
//!
//! Holds two views: the checksums recorded by the previous run (loaded from
//! disk, read-only) and the checksums computed during this run. Comparing
//! them is how the compiler detects that a document, the configuration or a
//! code snippet changed.

use crate::digest::{Aspect, Checksummable, Digest};
use crate::error::StoreError;
use crate::persist::StoreFile;
use kiln_types::ObjectRef;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;

const VERSION: u32 = 1;

type Key = (ObjectRef, Aspect);

#[derive(Debug, Serialize, Deserialize)]
struct ChecksumRecord {
    object: ObjectRef,
    aspect: Aspect,
    digest: Digest,
}

#[derive(Debug)]
pub struct ChecksumStore {
    file: StoreFile,
    previous: HashMap<Key, Digest>,
    previous_objects: HashSet<ObjectRef>,
    current: RwLock<HashMap<Key, Digest>>,
}

impl ChecksumStore {
    /// Create an empty store persisted under `dir`
    pub fn new(dir: &Path) -> Self {
        Self {
            file: StoreFile::new(dir, "checksums", VERSION),
            previous: HashMap::new(),
            previous_objects: HashSet::new(),
            current: RwLock::new(HashMap::new()),
        }
    }

    /// Load the previous run's checksums, replacing both views
    pub fn load(&mut self) {
        let records: Vec<ChecksumRecord> = self.file.load();
        self.previous_objects = records.iter().map(|r| r.object.clone()).collect();
        self.previous = records
            .into_iter()
            .map(|r| ((r.object, r.aspect), r.digest))
            .collect();
        self.current.write().clear();
        tracing::debug!("Loaded {} checksums", self.previous.len());
    }

    /// Compute a digest without recording it
    pub fn digest_of(object: &dyn Checksummable, aspect: Aspect) -> Option<Digest> {
        object.digest(aspect)
    }

    /// Record every applicable aspect of an object into the current view
    pub fn record(&self, object: &dyn Checksummable) {
        let obj = object.object_ref();
        let digests = Aspect::ALL.map(|aspect| (aspect, object.digest(aspect)));

        let mut current = self.current.write();
        for (aspect, digest) in digests {
            match digest {
                Some(digest) => {
                    current.insert((obj.clone(), aspect), digest);
                }
                None => {
                    current.remove(&(obj.clone(), aspect));
                }
            }
        }
    }

    /// Checksum recorded by the previous run
    pub fn previous(&self, object: &ObjectRef, aspect: Aspect) -> Option<&Digest> {
        self.previous.get(&(object.clone(), aspect))
    }

    /// Checksum recorded during this run
    pub fn current(&self, object: &ObjectRef, aspect: Aspect) -> Option<Digest> {
        self.current.read().get(&(object.clone(), aspect)).cloned()
    }

    /// Whether the previous run recorded anything for this object
    pub fn has_previous(&self, object: &ObjectRef) -> bool {
        self.previous_objects.contains(object)
    }

    /// Every object the previous run recorded
    pub fn previous_objects(&self) -> impl Iterator<Item = &ObjectRef> {
        self.previous_objects.iter()
    }

    /// Whether an aspect differs between the two views.
    ///
    /// An aspect missing from exactly one view counts as changed.
    pub fn changed(&self, object: &ObjectRef, aspect: Aspect) -> bool {
        let current = self.current(object, aspect);
        match (self.previous(object, aspect), current.as_ref()) {
            (Some(prev), Some(cur)) => prev != cur,
            (None, None) => false,
            _ => true,
        }
    }

    /// Persist the current view
    pub fn save(&self) -> Result<(), StoreError> {
        let mut records: Vec<ChecksumRecord> = self
            .current
            .read()
            .iter()
            .map(|((object, aspect), digest)| ChecksumRecord {
                object: object.clone(),
                aspect: *aspect,
                digest: digest.clone(),
            })
            .collect();
        records.sort_by(|a, b| (&a.object, a.aspect).cmp(&(&b.object, b.aspect)));
        self.file.save(&records)
    }
}
