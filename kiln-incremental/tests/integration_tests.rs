//! Integration tests for the stores and the outdatedness checker
//!
//! Each test drives several simulated runs against the same temporary
//! directory: load stores, record checksums, check outdatedness, "compile"
//! the outdated reps by recording their dependencies and caching a result,
//! then persist everything.

use kiln_incremental::{
    ActionSequenceStore, Aspect, CheckerInputs, Checksummable, ChecksumStore,
    CompiledContentCache, DependencyProps, DependencyStore, Digest, ExternalChanges,
    OutdatednessChecker, OutdatednessStore, Reason, RepDescriptor,
};
use kiln_types::{ActionSequence, Attributes, Content, Identifier, ObjectRef, RepKey};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;

#[derive(Clone)]
struct Doc {
    object: ObjectRef,
    content: String,
    attributes: String,
}

impl Checksummable for Doc {
    fn object_ref(&self) -> ObjectRef {
        self.object.clone()
    }

    fn digest(&self, aspect: Aspect) -> Option<Digest> {
        match aspect {
            Aspect::Content => Some(Digest::of_bytes(self.content.as_bytes())),
            Aspect::Attributes => Some(Digest::of_bytes(self.attributes.as_bytes())),
            Aspect::Other => None,
        }
    }
}

struct Config(String);

impl Checksummable for Config {
    fn object_ref(&self) -> ObjectRef {
        ObjectRef::Config
    }

    fn digest(&self, aspect: Aspect) -> Option<Digest> {
        (aspect == Aspect::Other).then(|| Digest::of_bytes(self.0.as_bytes()))
    }
}

fn id(path: &str) -> Identifier {
    Identifier::full(path).unwrap()
}

fn rep(path: &str) -> RepKey {
    RepKey::new(id(path), "default")
}

fn default_sequence() -> ActionSequence {
    let mut seq = ActionSequence::new();
    seq.add_filter("markdown", Attributes::new())
        .add_snapshot("last", None);
    seq
}

/// The state of the "site" for one run
struct World {
    items: Vec<Doc>,
    config: String,
    rules: HashMap<String, ActionSequence>,
    /// Dependencies each rep records when it is compiled
    edges: Vec<(RepKey, ObjectRef, DependencyProps)>,
    changes: ExternalChanges,
}

impl World {
    fn new(paths: &[&str]) -> Self {
        Self {
            items: paths
                .iter()
                .map(|p| Doc {
                    object: ObjectRef::item(&id(p)),
                    content: format!("content of {p}"),
                    attributes: "title: x".into(),
                })
                .collect(),
            config: "output_dir: output".into(),
            rules: HashMap::new(),
            edges: Vec::new(),
            changes: ExternalChanges::default(),
        }
    }

    fn item_mut(&mut self, path: &str) -> &mut Doc {
        let object = ObjectRef::item(&id(path));
        self.items
            .iter_mut()
            .find(|d| d.object == object)
            .unwrap()
    }

    fn depends(&mut self, from: &str, to: ObjectRef, props: DependencyProps) {
        self.edges.push((rep(from), to, props));
    }
}

/// Run one build; returns the outdatedness reasons of every rep
fn run(dir: &Path, world: &World) -> BTreeMap<String, Vec<Reason>> {
    let mut checksums = ChecksumStore::new(dir);
    let mut dependencies = DependencyStore::new(dir);
    let mut action_sequences = ActionSequenceStore::new(dir);
    let mut marks = OutdatednessStore::new(dir);
    let mut cache = CompiledContentCache::new(dir);
    checksums.load();
    dependencies.load();
    action_sequences.load();
    marks.load();
    cache.load();

    for doc in &world.items {
        checksums.record(doc);
    }
    checksums.record(&Config(world.config.clone()));

    let mut live: HashSet<ObjectRef> = HashSet::from([ObjectRef::Config]);
    let mut reps = HashMap::new();
    let mut current_sequences = HashMap::new();
    for doc in &world.items {
        let identifier = doc.object.identifier().unwrap().clone();
        let key = RepKey::new(identifier.clone(), "default");
        let sequence = world
            .rules
            .get(identifier.as_str())
            .cloned()
            .unwrap_or_else(default_sequence);
        live.insert(doc.object.clone());
        live.insert(ObjectRef::Rep(key.clone()));
        current_sequences.insert(ObjectRef::Rep(key.clone()), sequence);
        reps.insert(
            key.clone(),
            RepDescriptor {
                key,
                snapshot_names: vec!["last".into()],
                output_files: Vec::new(),
            },
        );
    }

    let reasons: BTreeMap<String, Vec<Reason>> = {
        let checker = OutdatednessChecker::new(CheckerInputs {
            checksums: &checksums,
            dependencies: &dependencies,
            action_sequences: &action_sequences,
            current_sequences: &current_sequences,
            marks: &marks,
            cache: &cache,
            changes: &world.changes,
            live: &live,
            reps: &reps,
        });
        reps.keys()
            .map(|key| (key.item.to_string(), checker.outdatedness_reasons_for(key)))
            .collect()
    };

    for (key, sequence) in &current_sequences {
        action_sequences.store(key.clone(), sequence.clone());
    }

    for key in reps.keys() {
        if reasons[key.item.as_str()].is_empty() {
            continue;
        }
        let object = ObjectRef::Rep(key.clone());
        dependencies.forget_dependencies_for(&object);
        for (from, to, props) in &world.edges {
            if from == key {
                dependencies.record_dependency(&object, to, *props, false);
            }
        }
        let doc = world
            .items
            .iter()
            .find(|d| d.object.identifier() == Some(&key.item))
            .unwrap();
        cache.store(key, "last", &Content::textual(doc.content.to_uppercase()));
    }
    dependencies.retain_sources(|obj| live.contains(obj));
    cache.prune(|key| reps.contains_key(key));

    checksums.save().unwrap();
    dependencies.save().unwrap();
    action_sequences.save().unwrap();
    marks.save().unwrap();
    cache.save().unwrap();

    reasons
}

fn outdated(reasons: &BTreeMap<String, Vec<Reason>>) -> Vec<&str> {
    reasons
        .iter()
        .filter(|(_, r)| !r.is_empty())
        .map(|(k, _)| k.as_str())
        .collect()
}

#[test]
fn test_first_build_everything_outdated() {
    let dir = tempfile::tempdir().unwrap();
    let world = World::new(&["/a.md", "/b.md"]);

    let reasons = run(dir.path(), &world);
    assert_eq!(outdated(&reasons), vec!["/a.md", "/b.md"]);
    assert!(reasons["/a.md"].contains(&Reason::NotEnoughData));
    assert!(reasons["/a.md"].contains(&Reason::CompiledContentMissing));
}

#[test]
fn test_unchanged_rebuild_is_fresh() {
    let dir = tempfile::tempdir().unwrap();
    let mut world = World::new(&["/a.md", "/b.md"]);
    world.depends("/a.md", ObjectRef::item(&id("/b.md")), DependencyProps::ALL);

    run(dir.path(), &world);
    let reasons = run(dir.path(), &world);
    assert!(outdated(&reasons).is_empty(), "{reasons:?}");
}

#[test]
fn test_content_change_only_affects_changed_item() {
    let dir = tempfile::tempdir().unwrap();
    let mut world = World::new(&["/a.md", "/b.md"]);
    run(dir.path(), &world);

    world.item_mut("/b.md").content = "new".into();
    let reasons = run(dir.path(), &world);
    assert_eq!(outdated(&reasons), vec!["/b.md"]);
    assert_eq!(reasons["/b.md"], vec![Reason::ContentModified]);
}

#[test]
fn test_attribute_dependency_propagates() {
    let dir = tempfile::tempdir().unwrap();
    let mut world = World::new(&["/a.md", "/b.md"]);
    world.depends("/a.md", ObjectRef::item(&id("/b.md")), DependencyProps::attributes());
    run(dir.path(), &world);

    // A content-only change of B does not touch what A read
    world.item_mut("/b.md").content = "new body".into();
    let reasons = run(dir.path(), &world);
    assert_eq!(outdated(&reasons), vec!["/b.md"]);

    world.item_mut("/b.md").attributes = "title: y".into();
    let reasons = run(dir.path(), &world);
    assert_eq!(outdated(&reasons), vec!["/a.md", "/b.md"]);
    assert_eq!(
        reasons["/a.md"],
        vec![Reason::DependencyOutdated(ObjectRef::item(&id("/b.md")))]
    );
}

#[test]
fn test_compiled_content_dependency_is_transitive() {
    let dir = tempfile::tempdir().unwrap();
    let mut world = World::new(&["/a.md", "/b.md", "/c.md"]);
    world.depends("/a.md", ObjectRef::Rep(rep("/b.md")), DependencyProps::compiled_content());
    world.depends("/b.md", ObjectRef::Rep(rep("/c.md")), DependencyProps::compiled_content());
    run(dir.path(), &world);

    world.item_mut("/c.md").content = "changed".into();
    let reasons = run(dir.path(), &world);
    assert_eq!(outdated(&reasons), vec!["/a.md", "/b.md", "/c.md"]);
}

#[test]
fn test_rules_change_is_detected() {
    let dir = tempfile::tempdir().unwrap();
    let mut world = World::new(&["/a.md", "/b.md"]);
    run(dir.path(), &world);

    let mut seq = default_sequence();
    seq.add_layout("/default.html", Attributes::new());
    world.rules.insert("/a.md".into(), seq);

    let reasons = run(dir.path(), &world);
    assert_eq!(outdated(&reasons), vec!["/a.md"]);
    assert_eq!(reasons["/a.md"], vec![Reason::RulesModified]);
}

#[test]
fn test_configuration_change_outdates_everything() {
    let dir = tempfile::tempdir().unwrap();
    let mut world = World::new(&["/a.md", "/b.md"]);
    run(dir.path(), &world);

    world.config = "output_dir: public".into();
    let reasons = run(dir.path(), &world);
    assert_eq!(outdated(&reasons), vec!["/a.md", "/b.md"]);
    assert!(reasons["/b.md"].contains(&Reason::ConfigurationModified));
}

#[test]
fn test_cycle_terminates_and_is_fresh() {
    let dir = tempfile::tempdir().unwrap();
    let mut world = World::new(&["/a.md", "/b.md"]);
    world.depends("/a.md", ObjectRef::Rep(rep("/b.md")), DependencyProps::compiled_content());
    world.depends("/b.md", ObjectRef::Rep(rep("/a.md")), DependencyProps::compiled_content());
    run(dir.path(), &world);

    let reasons = run(dir.path(), &world);
    assert!(outdated(&reasons).is_empty());

    world.item_mut("/a.md").content = "changed".into();
    let reasons = run(dir.path(), &world);
    assert_eq!(outdated(&reasons), vec!["/a.md", "/b.md"]);
}

#[test]
fn test_deleted_dependency_outdates_dependent() {
    let dir = tempfile::tempdir().unwrap();
    let mut world = World::new(&["/a.md", "/b.md"]);
    world.depends("/a.md", ObjectRef::item(&id("/b.md")), DependencyProps::raw_content());
    run(dir.path(), &world);

    world.items.retain(|d| d.object != ObjectRef::item(&id("/b.md")));
    let reasons = run(dir.path(), &world);
    assert_eq!(
        reasons["/a.md"],
        vec![Reason::DependencyDeleted(ObjectRef::item(&id("/b.md")))]
    );
}

#[test]
fn test_external_change_outdates_item_and_dependents() {
    let dir = tempfile::tempdir().unwrap();
    let mut world = World::new(&["/a.md", "/b.md", "/c.md"]);
    world.depends("/a.md", ObjectRef::item(&id("/b.md")), DependencyProps::attributes());
    run(dir.path(), &world);

    world.changes.objects.insert(ObjectRef::item(&id("/b.md")));
    let reasons = run(dir.path(), &world);
    assert_eq!(outdated(&reasons), vec!["/a.md", "/b.md"]);
}

#[test]
fn test_persisted_mark_forces_recompile() {
    let dir = tempfile::tempdir().unwrap();
    let world = World::new(&["/a.md"]);
    run(dir.path(), &world);

    let mut marks = OutdatednessStore::new(dir.path());
    marks.load();
    marks.add(rep("/a.md"));
    marks.save().unwrap();

    let reasons = run(dir.path(), &world);
    assert_eq!(reasons["/a.md"], vec![Reason::MarkedOutdated]);
}

#[test]
fn test_missing_cache_entry_forces_recompile() {
    let dir = tempfile::tempdir().unwrap();
    let world = World::new(&["/a.md", "/b.md"]);
    run(dir.path(), &world);

    std::fs::remove_dir_all(dir.path().join("compiled_content")).unwrap();
    let reasons = run(dir.path(), &world);
    assert_eq!(outdated(&reasons), vec!["/a.md", "/b.md"]);
    assert_eq!(reasons["/a.md"], vec![Reason::CompiledContentMissing]);
}

#[test]
fn test_corrupt_stores_fall_back_to_full_rebuild() {
    let dir = tempfile::tempdir().unwrap();
    let world = World::new(&["/a.md"]);
    run(dir.path(), &world);

    std::fs::write(dir.path().join("checksums.json"), b"garbage").unwrap();
    let reasons = run(dir.path(), &world);
    assert!(reasons["/a.md"].contains(&Reason::NotEnoughData));
}

#[test]
fn test_forgotten_dependencies_are_replaced() {
    let dir = tempfile::tempdir().unwrap();
    let mut world = World::new(&["/a.md", "/b.md", "/c.md"]);
    world.depends("/a.md", ObjectRef::item(&id("/b.md")), DependencyProps::raw_content());
    run(dir.path(), &world);

    // A is recompiled and now reads C instead of B
    world.edges.clear();
    world.depends("/a.md", ObjectRef::item(&id("/c.md")), DependencyProps::raw_content());
    world.item_mut("/a.md").content = "rewritten".into();
    run(dir.path(), &world);

    world.item_mut("/b.md").content = "changed".into();
    let reasons = run(dir.path(), &world);
    assert_eq!(outdated(&reasons), vec!["/b.md"]);

    let mut dependencies = DependencyStore::new(dir.path());
    dependencies.load();
    let targets: Vec<_> = dependencies
        .dependencies_of(&ObjectRef::Rep(rep("/a.md")))
        .into_iter()
        .map(|d| d.to)
        .collect();
    assert_eq!(targets, vec![ObjectRef::item(&id("/c.md"))]);
}
