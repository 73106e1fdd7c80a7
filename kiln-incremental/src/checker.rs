//! Outdatedness checker
//!
//! Decides, for each rep, whether its cached compiled content can be reused.
//! A rep is outdated when any reason applies to it directly (first build,
//! persisted mark, changed rules, changed item, changed configuration or
//! code, external change, missing cache entry or output file) or when a
//! dependency it recorded during its last compilation is affected in an
//! aspect it read. Reasons are an unordered disjunction: the checker reports
//! all direct reasons but stops at the first dependency that causes
//! outdatedness.

use crate::action_sequence::ActionSequenceStore;
use crate::cache::CompiledContentCache;
use crate::checksum::ChecksumStore;
use crate::dependency::{DependencyProps, DependencyStore};
use crate::digest::Aspect;
use crate::marks::OutdatednessStore;
use kiln_types::{ActionSequence, ObjectRef, RepKey};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::PathBuf;

/// Why an object is considered outdated
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reason {
    /// Nothing was recorded for the object by a previous run
    NotEnoughData,
    /// A previous run found the rep outdated and did not finish compiling it
    MarkedOutdated,
    RulesModified,
    ContentModified,
    AttributesModified,
    CodeSnippetsModified,
    ConfigurationModified,
    /// The change stream reported the object (or everything) as changed
    ExternallyChanged,
    CompiledContentMissing,
    OutputMissing(PathBuf),
    CollectionModified,
    DependencyOutdated(ObjectRef),
    DependencyDeleted(ObjectRef),
}

impl Reason {
    /// Aspects of the object this reason affects, as seen by dependents
    pub fn props(&self) -> DependencyProps {
        match self {
            Reason::NotEnoughData
            | Reason::CodeSnippetsModified
            | Reason::ConfigurationModified
            | Reason::ExternallyChanged => DependencyProps::ALL,
            Reason::MarkedOutdated
            | Reason::CompiledContentMissing
            | Reason::OutputMissing(_)
            | Reason::DependencyOutdated(_)
            | Reason::DependencyDeleted(_) => DependencyProps::compiled_content(),
            Reason::RulesModified => {
                DependencyProps::compiled_content().union(DependencyProps::path())
            }
            Reason::ContentModified => {
                DependencyProps::raw_content().union(DependencyProps::compiled_content())
            }
            Reason::AttributesModified => {
                DependencyProps::attributes().union(DependencyProps::compiled_content())
            }
            Reason::CollectionModified => DependencyProps::raw_content(),
        }
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reason::NotEnoughData => write!(f, "not enough data from the previous run"),
            Reason::MarkedOutdated => write!(f, "marked outdated by an unfinished run"),
            Reason::RulesModified => write!(f, "rules modified"),
            Reason::ContentModified => write!(f, "content modified"),
            Reason::AttributesModified => write!(f, "attributes modified"),
            Reason::CodeSnippetsModified => write!(f, "code snippets modified"),
            Reason::ConfigurationModified => write!(f, "configuration modified"),
            Reason::ExternallyChanged => write!(f, "changed externally"),
            Reason::CompiledContentMissing => write!(f, "compiled content not cached"),
            Reason::OutputMissing(path) => write!(f, "output file {:?} missing", path),
            Reason::CollectionModified => write!(f, "collection modified"),
            Reason::DependencyOutdated(obj) => write!(f, "dependency {obj} outdated"),
            Reason::DependencyDeleted(obj) => write!(f, "dependency {obj} deleted"),
        }
    }
}

/// Direct reasons for one object, with the union of their affected aspects
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Status {
    pub reasons: Vec<Reason>,
    pub props: DependencyProps,
}

impl Status {
    fn add(&mut self, reason: Reason) {
        self.props = self.props.union(reason.props());
        self.reasons.push(reason);
    }

    pub fn is_outdated(&self) -> bool {
        !self.reasons.is_empty()
    }
}

/// Change notifications gathered from the document sources
#[derive(Debug, Clone, Default)]
pub struct ExternalChanges {
    /// Something outside any known document changed
    pub everything: bool,
    pub objects: HashSet<ObjectRef>,
}

impl ExternalChanges {
    pub fn affects(&self, object: &ObjectRef) -> bool {
        self.everything || self.objects.contains(object)
    }
}

/// What the checker needs to know about each rep of this run
#[derive(Debug, Clone)]
pub struct RepDescriptor {
    pub key: RepKey,
    pub snapshot_names: Vec<String>,
    /// Files on disk this rep writes
    pub output_files: Vec<PathBuf>,
}

/// Everything the checker reads
#[derive(Debug, Clone, Copy)]
pub struct CheckerInputs<'a> {
    pub checksums: &'a ChecksumStore,
    pub dependencies: &'a DependencyStore,
    pub action_sequences: &'a ActionSequenceStore,
    /// Sequences computed for this run, for reps and layouts
    pub current_sequences: &'a HashMap<ObjectRef, ActionSequence>,
    pub marks: &'a OutdatednessStore,
    pub cache: &'a CompiledContentCache,
    pub changes: &'a ExternalChanges,
    /// Objects that exist in this run
    pub live: &'a HashSet<ObjectRef>,
    pub reps: &'a HashMap<RepKey, RepDescriptor>,
}

pub struct OutdatednessChecker<'a> {
    inputs: CheckerInputs<'a>,
    globals_changed: Vec<Reason>,
    basic: Mutex<HashMap<ObjectRef, Status>>,
    via_dependencies: Mutex<HashMap<ObjectRef, Option<Reason>>>,
}

impl fmt::Debug for OutdatednessChecker<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutdatednessChecker")
            .field("reps", &self.inputs.reps.len())
            .field("globals_changed", &self.globals_changed)
            .finish_non_exhaustive()
    }
}

impl<'a> OutdatednessChecker<'a> {
    pub fn new(inputs: CheckerInputs<'a>) -> Self {
        let mut globals_changed = Vec::new();
        if inputs.checksums.changed(&ObjectRef::Config, Aspect::Other) {
            globals_changed.push(Reason::ConfigurationModified);
        }
        if code_snippets_changed(&inputs) {
            globals_changed.push(Reason::CodeSnippetsModified);
        }

        Self {
            inputs,
            globals_changed,
            basic: Mutex::new(HashMap::new()),
            via_dependencies: Mutex::new(HashMap::new()),
        }
    }

    /// Direct reasons for an object, ignoring its dependencies
    pub fn basic_status(&self, object: &ObjectRef) -> Status {
        if let Some(status) = self.basic.lock().get(object) {
            return status.clone();
        }
        let status = self.compute_basic_status(object);
        self.basic.lock().insert(object.clone(), status.clone());
        status
    }

    fn compute_basic_status(&self, object: &ObjectRef) -> Status {
        let inputs = &self.inputs;
        let checksums = inputs.checksums;
        let mut status = Status::default();

        match object {
            ObjectRef::Rep(key) => {
                let item = ObjectRef::Item(key.item.clone());
                if !checksums.has_previous(&item) || !inputs.action_sequences.has_previous(object) {
                    status.add(Reason::NotEnoughData);
                }
                if inputs.marks.contains(key) {
                    status.add(Reason::MarkedOutdated);
                }
                if self.rules_modified(object) {
                    status.add(Reason::RulesModified);
                }
                self.add_document_reasons(&item, &mut status);
                for reason in &self.globals_changed {
                    status.add(reason.clone());
                }
                if let Some(rep) = inputs.reps.get(key) {
                    let names = rep.snapshot_names.iter().map(String::as_str);
                    if !inputs.cache.contains_all(key, names) {
                        status.add(Reason::CompiledContentMissing);
                    }
                    if let Some(path) = rep.output_files.iter().find(|p| !p.is_file()) {
                        status.add(Reason::OutputMissing(path.clone()));
                    }
                }
            }
            ObjectRef::Item(_) => {
                if !checksums.has_previous(object) {
                    status.add(Reason::NotEnoughData);
                }
                self.add_document_reasons(object, &mut status);
            }
            ObjectRef::Layout(_) => {
                if !checksums.has_previous(object) {
                    status.add(Reason::NotEnoughData);
                }
                if self.rules_modified(object) {
                    status.add(Reason::RulesModified);
                }
                self.add_document_reasons(object, &mut status);
            }
            ObjectRef::Config => {
                if checksums.changed(object, Aspect::Other) {
                    status.add(Reason::ConfigurationModified);
                }
            }
            ObjectRef::CodeSnippet(_) => {
                if checksums.changed(object, Aspect::Other) {
                    status.add(Reason::CodeSnippetsModified);
                }
            }
            ObjectRef::Items | ObjectRef::Layouts => {
                if checksums.changed(object, Aspect::Other) {
                    status.add(Reason::CollectionModified);
                }
            }
        }

        status
    }

    fn add_document_reasons(&self, document: &ObjectRef, status: &mut Status) {
        let checksums = self.inputs.checksums;
        if checksums.changed(document, Aspect::Content) {
            status.add(Reason::ContentModified);
        }
        if checksums.changed(document, Aspect::Attributes) {
            status.add(Reason::AttributesModified);
        }
        if self.inputs.changes.affects(document) {
            status.add(Reason::ExternallyChanged);
        }
    }

    fn rules_modified(&self, object: &ObjectRef) -> bool {
        let current = self
            .inputs
            .current_sequences
            .get(object)
            .cloned()
            .unwrap_or_default();
        self.inputs.action_sequences.previous(object) != current
    }

    /// First dependency (searched transitively through compiled content
    /// edges) that makes the object outdated
    pub fn dependency_reason(&self, object: &ObjectRef) -> Option<Reason> {
        let mut visited = HashSet::new();
        self.dependency_reason_inner(object, &mut visited)
    }

    fn dependency_reason_inner(
        &self,
        object: &ObjectRef,
        visited: &mut HashSet<ObjectRef>,
    ) -> Option<Reason> {
        if let Some(known) = self.via_dependencies.lock().get(object) {
            return known.clone();
        }
        // A cycle back into the current search contributes nothing new
        if !visited.insert(object.clone()) {
            return None;
        }
        let top_level = visited.len() == 1;

        let mut found = None;
        for dep in self.inputs.dependencies.dependencies_of(object) {
            if !self.inputs.live.contains(&dep.to) {
                found = Some(Reason::DependencyDeleted(dep.to));
                break;
            }
            let status = self.basic_status(&dep.to);
            if !status.props.intersect(dep.props).is_empty() {
                found = Some(Reason::DependencyOutdated(dep.to));
                break;
            }
            if dep.props.compiled_content
                && self.dependency_reason_inner(&dep.to, visited).is_some()
            {
                found = Some(Reason::DependencyOutdated(dep.to));
                break;
            }
        }

        // Negative answers depend on what was already visited, so only the
        // outermost one is final
        if found.is_some() || top_level {
            self.via_dependencies
                .lock()
                .insert(object.clone(), found.clone());
        }
        found
    }

    /// All reasons a rep is outdated; empty when it is fresh
    pub fn outdatedness_reasons_for(&self, rep: &RepKey) -> Vec<Reason> {
        let object = ObjectRef::Rep(rep.clone());
        let mut reasons = self.basic_status(&object).reasons;
        if let Some(reason) = self.dependency_reason(&object) {
            reasons.push(reason);
        }
        reasons
    }

    pub fn is_outdated(&self, rep: &RepKey) -> bool {
        let object = ObjectRef::Rep(rep.clone());
        self.basic_status(&object).is_outdated() || self.dependency_reason(&object).is_some()
    }
}

fn code_snippets_changed(inputs: &CheckerInputs<'_>) -> bool {
    let checksums = inputs.checksums;
    let removed = checksums
        .previous_objects()
        .any(|obj| matches!(obj, ObjectRef::CodeSnippet(_)) && !inputs.live.contains(obj));
    let modified = inputs
        .live
        .iter()
        .filter(|obj| matches!(obj, ObjectRef::CodeSnippet(_)))
        .any(|obj| checksums.changed(obj, Aspect::Other));
    removed || modified
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reason_props() {
        assert!(Reason::AttributesModified.props().attributes);
        assert!(!Reason::AttributesModified.props().raw_content);
        assert!(Reason::RulesModified.props().path);
        assert_eq!(Reason::NotEnoughData.props(), DependencyProps::ALL);
        assert_eq!(Reason::CollectionModified.props(), DependencyProps::raw_content());
    }

    #[test]
    fn test_status_unions_props() {
        let mut status = Status::default();
        assert!(!status.is_outdated());
        status.add(Reason::ContentModified);
        status.add(Reason::AttributesModified);
        assert!(status.is_outdated());
        assert!(status.props.raw_content && status.props.attributes);
        assert!(!status.props.path);
    }

    #[test]
    fn test_external_changes() {
        let id = kiln_types::Identifier::full("/a.md").unwrap();
        let mut changes = ExternalChanges::default();
        assert!(!changes.affects(&ObjectRef::item(&id)));
        changes.objects.insert(ObjectRef::item(&id));
        assert!(changes.affects(&ObjectRef::item(&id)));
        assert!(!changes.affects(&ObjectRef::layout(&id)));
        changes.everything = true;
        assert!(changes.affects(&ObjectRef::Config));
    }
}
