//! Action sequence store
//!
//! Remembers the action sequence each rep and layout was compiled with, so a
//! change in the rules can be detected without comparing rule sources.

use crate::error::StoreError;
use crate::persist::StoreFile;
use kiln_types::{ActionSequence, ObjectRef};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

const VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct SequenceRecord {
    object: ObjectRef,
    sequence: ActionSequence,
}

#[derive(Debug)]
pub struct ActionSequenceStore {
    file: StoreFile,
    previous: HashMap<ObjectRef, ActionSequence>,
    current: RwLock<HashMap<ObjectRef, ActionSequence>>,
}

impl ActionSequenceStore {
    pub fn new(dir: &Path) -> Self {
        Self {
            file: StoreFile::new(dir, "action_sequences", VERSION),
            previous: HashMap::new(),
            current: RwLock::new(HashMap::new()),
        }
    }

    pub fn load(&mut self) {
        let records: Vec<SequenceRecord> = self.file.load();
        self.previous = records.into_iter().map(|r| (r.object, r.sequence)).collect();
        self.current.write().clear();
    }

    /// Sequence recorded by the previous run; empty if there was none
    pub fn previous(&self, object: &ObjectRef) -> ActionSequence {
        self.previous.get(object).cloned().unwrap_or_default()
    }

    /// Whether the previous run recorded a sequence for this object
    pub fn has_previous(&self, object: &ObjectRef) -> bool {
        self.previous.contains_key(object)
    }

    pub fn store(&self, object: ObjectRef, sequence: ActionSequence) {
        self.current.write().insert(object, sequence);
    }

    pub fn save(&self) -> Result<(), StoreError> {
        let mut records: Vec<SequenceRecord> = self
            .current
            .read()
            .iter()
            .map(|(object, sequence)| SequenceRecord {
                object: object.clone(),
                sequence: sequence.clone(),
            })
            .collect();
        records.sort_by(|a, b| a.object.cmp(&b.object));
        self.file.save(&records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_types::{Attributes, Identifier};

    #[test]
    fn test_previous_defaults_to_empty() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = ActionSequenceStore::new(dir.path());
        store.load();
        let obj = ObjectRef::layout(&Identifier::full("/default.html").unwrap());
        assert!(store.previous(&obj).is_empty());
        assert!(!store.has_previous(&obj));
    }

    #[test]
    fn test_stored_sequence_is_previous_next_run() {
        let dir = tempfile::tempdir().unwrap();
        let obj = ObjectRef::layout(&Identifier::full("/default.html").unwrap());
        let mut seq = ActionSequence::new();
        seq.add_filter("erb", Attributes::new());

        let mut store = ActionSequenceStore::new(dir.path());
        store.load();
        store.store(obj.clone(), seq.clone());
        assert!(store.previous(&obj).is_empty());
        store.save().unwrap();

        let mut store = ActionSequenceStore::new(dir.path());
        store.load();
        assert_eq!(store.previous(&obj), seq);
    }
}
