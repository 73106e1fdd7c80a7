//! The compiler
//!
//! A run is a fixed sequence of [`Stage`]s. Each stage's result is kept on
//! the compiler, so asking for an earlier stage twice does not redo it:
//!
//! ```text
//! preprocess -> build_reps -> load_stores -> calculate_checksums
//!   -> determine_outdatedness -> forget_outdated_dependencies
//!   -> store_pre_compilation_state -> prune -> compile_reps
//!   -> store_post_compilation_state -> postprocess -> cleanup
//! ```
//!
//! Cleanup runs whether or not the stages before it succeeded.

mod cancel;
mod compile;
mod error;
mod observer;
mod prune;
mod stage;

pub use cancel::CancellationToken;
pub use error::{CompileError, CompilerError, RepFailure};
pub use observer::{CompilerObserver, TracingObserver};
pub use stage::{Stage, StageState};

use crate::action_provider::ActionProvider;
use crate::filter::Transformer;
use crate::rep::{ItemRep, RepRepo};
use crate::site::Site;
use compile::CompileReport;
use kiln_incremental::{
    ActionSequenceStore, CacheStats, CheckerInputs, ChecksumStore, CompiledContentCache,
    DependencyStore, ExternalChanges, OutdatednessChecker, OutdatednessStore, Reason,
    SnapshotRepo,
};
use kiln_types::{ActionSequence, ObjectRef, RepKey};
use rayon::prelude::*;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

/// State persisted between runs
#[derive(Debug)]
pub struct Stores {
    pub checksums: ChecksumStore,
    pub dependencies: DependencyStore,
    pub action_sequences: ActionSequenceStore,
    pub marks: OutdatednessStore,
    pub cache: CompiledContentCache,
}

impl Stores {
    pub fn new(tmp_dir: &Path) -> Self {
        Self {
            checksums: ChecksumStore::new(tmp_dir),
            dependencies: DependencyStore::new(tmp_dir),
            action_sequences: ActionSequenceStore::new(tmp_dir),
            marks: OutdatednessStore::new(tmp_dir),
            cache: CompiledContentCache::new(tmp_dir),
        }
    }

    fn load(&mut self) {
        self.checksums.load();
        self.dependencies.load();
        self.action_sequences.load();
        self.marks.load();
        self.cache.load();
    }
}

/// Reps of this run plus the sequences of reps and layouts
#[derive(Debug, Default)]
struct BuiltReps {
    reps: RepRepo,
    sequences: HashMap<ObjectRef, ActionSequence>,
}

#[derive(Debug, Default)]
struct CompilerState {
    preprocess: StageState<()>,
    build_reps: StageState<BuiltReps>,
    load_stores: StageState<()>,
    checksums: StageState<HashSet<ObjectRef>>,
    outdatedness: StageState<BTreeMap<RepKey, Vec<Reason>>>,
    forget: StageState<()>,
    store_pre: StageState<()>,
    prune: StageState<Vec<PathBuf>>,
    compile: StageState<CompileReport>,
    store_post: StageState<()>,
    postprocess: StageState<()>,
    cleanup: StageState<()>,
}

/// Outcome of a successful run
#[derive(Debug, Clone, Default)]
pub struct CompileSummary {
    pub reps: usize,
    pub outdated: usize,
    pub compiled: usize,
    pub cached: usize,
    pub written: usize,
    pub unchanged: usize,
    pub pruned: usize,
    pub cache: CacheStats,
}

impl fmt::Display for CompileSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} reps: {} compiled, {} cached; {} files written, {} unchanged, {} pruned",
            self.reps, self.compiled, self.cached, self.written, self.unchanged, self.pruned
        )
    }
}

pub struct CompilerBuilder {
    site: Site,
    provider: Option<Box<dyn ActionProvider>>,
    transformer: Option<Box<dyn Transformer>>,
    observers: Vec<Arc<dyn CompilerObserver>>,
    changes: ExternalChanges,
    cancellation: CancellationToken,
}

impl CompilerBuilder {
    pub fn action_provider(mut self, provider: impl ActionProvider + 'static) -> Self {
        self.provider = Some(Box::new(provider));
        self
    }

    pub fn transformer(mut self, transformer: impl Transformer + 'static) -> Self {
        self.transformer = Some(Box::new(transformer));
        self
    }

    /// Add an observer next to the default tracing one
    pub fn observer(mut self, observer: Arc<dyn CompilerObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Changes reported by data sources since the previous run
    pub fn changes(mut self, changes: ExternalChanges) -> Self {
        self.changes = changes;
        self
    }

    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    pub fn build(self) -> Result<Compiler, CompilerError> {
        let provider = self
            .provider
            .ok_or(CompilerError::MissingComponent("action provider"))?;
        let transformer = self
            .transformer
            .ok_or(CompilerError::MissingComponent("transformer"))?;

        let config = &self.site.config;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.parallelism.unwrap_or(0))
            .thread_name(|i| format!("kiln-worker-{}", i))
            .build()?;
        let output_dir = config.output_dir();
        let tmp_dir = config.tmp_dir();

        Ok(Compiler {
            stores: Stores::new(&tmp_dir),
            site: self.site,
            provider,
            transformer,
            observers: self.observers,
            changes: self.changes,
            cancellation: self.cancellation,
            snapshots: SnapshotRepo::new(),
            pool,
            output_dir,
            tmp_dir,
            state: CompilerState::default(),
        })
    }
}

pub struct Compiler {
    site: Site,
    provider: Box<dyn ActionProvider>,
    transformer: Box<dyn Transformer>,
    observers: Vec<Arc<dyn CompilerObserver>>,
    changes: ExternalChanges,
    cancellation: CancellationToken,
    stores: Stores,
    snapshots: SnapshotRepo,
    pool: rayon::ThreadPool,
    output_dir: PathBuf,
    tmp_dir: PathBuf,
    state: CompilerState,
}

impl fmt::Debug for Compiler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Compiler")
            .field("output_dir", &self.output_dir)
            .field("tmp_dir", &self.tmp_dir)
            .field("items", &self.site.items.len())
            .field("layouts", &self.site.layouts.len())
            .finish_non_exhaustive()
    }
}

impl Compiler {
    pub fn builder(site: Site) -> CompilerBuilder {
        CompilerBuilder {
            site,
            provider: None,
            transformer: None,
            observers: vec![Arc::new(TracingObserver)],
            changes: ExternalChanges::default(),
            cancellation: CancellationToken::new(),
        }
    }

    pub fn site(&self) -> &Site {
        &self.site
    }

    pub fn stores(&self) -> &Stores {
        &self.stores
    }

    /// Reps of this run, once built
    pub fn reps(&self) -> Option<&RepRepo> {
        self.state.build_reps.result().map(|built| &built.reps)
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub fn run_until_preprocessed(&mut self) -> Result<(), CompilerError> {
        if !self.state.preprocess.is_completed() {
            self.stage(Stage::Preprocess, |c| {
                c.provider
                    .preprocess(&mut c.site)
                    .map_err(CompilerError::Preprocess)
            })?;
            self.state.preprocess = StageState::Completed(());
        }
        Ok(())
    }

    pub fn run_until_reps_built(&mut self) -> Result<&RepRepo, CompilerError> {
        self.run_until_preprocessed()?;
        if !self.state.build_reps.is_completed() {
            let built = self.stage(Stage::BuildReps, |c| c.build_reps())?;
            self.state.build_reps = StageState::Completed(built);
        }
        Ok(&self.built()?.reps)
    }

    /// Run up to and including outdatedness detection; returns the outdated
    /// reps and why
    pub fn run_until_outdatedness_determined(
        &mut self,
    ) -> Result<&BTreeMap<RepKey, Vec<Reason>>, CompilerError> {
        self.run_until_reps_built()?;
        if !self.state.load_stores.is_completed() {
            self.stage(Stage::LoadStores, |c| {
                c.stores.load();
                Ok(())
            })?;
            self.state.load_stores = StageState::Completed(());
        }
        if !self.state.checksums.is_completed() {
            let live = self.stage(Stage::CalculateChecksums, |c| c.calculate_checksums())?;
            self.state.checksums = StageState::Completed(live);
        }
        if !self.state.outdatedness.is_completed() {
            let outdated = self.stage(Stage::DetermineOutdatedness, |c| c.determine_outdatedness())?;
            self.state.outdatedness = StageState::Completed(outdated);
        }
        self.outdated()
    }

    /// Run everything before compilation itself
    pub fn run_until_precompiled(&mut self) -> Result<(), CompilerError> {
        self.run_until_outdatedness_determined()?;
        if !self.state.forget.is_completed() {
            self.stage(Stage::ForgetOutdatedDependencies, |c| {
                c.forget_outdated_dependencies()
            })?;
            self.state.forget = StageState::Completed(());
        }
        if !self.state.store_pre.is_completed() {
            self.stage(Stage::StorePreCompilationState, |c| {
                c.store_pre_compilation_state()
            })?;
            self.state.store_pre = StageState::Completed(());
        }
        if !self.state.prune.is_completed() {
            let pruned = self.stage(Stage::Prune, |c| c.prune())?;
            self.state.prune = StageState::Completed(pruned);
        }
        Ok(())
    }

    /// Run all stages. Cleanup runs even when an earlier stage fails.
    pub fn run(&mut self) -> Result<CompileSummary, CompilerError> {
        let result = self.run_main();
        let cleanup = self.run_cleanup();
        let summary = result?;
        cleanup?;
        tracing::info!("{}", summary);
        Ok(summary)
    }

    fn run_main(&mut self) -> Result<CompileSummary, CompilerError> {
        self.run_until_precompiled()?;
        if !self.state.compile.is_completed() {
            let report = self.stage(Stage::CompileReps, |c| c.compile_reps())?;
            self.state.compile = StageState::Completed(report);
        }
        if !self.state.store_post.is_completed() {
            self.stage(Stage::StorePostCompilationState, |c| {
                c.store_post_compilation_state()
            })?;
            self.state.store_post = StageState::Completed(());
        }

        let failures = self.report()?.failures.clone();
        if !failures.is_empty() {
            return Err(CompilerError::RepsFailed(failures));
        }

        if !self.state.postprocess.is_completed() {
            self.stage(Stage::Postprocess, |c| {
                let built = c.built()?;
                c.provider
                    .postprocess(&c.site, &built.reps)
                    .map_err(CompilerError::Postprocess)
            })?;
            self.state.postprocess = StageState::Completed(());
        }

        self.summary()
    }

    fn run_cleanup(&mut self) -> Result<(), CompilerError> {
        if self.state.cleanup.is_completed() {
            return Ok(());
        }
        self.timed(Stage::Cleanup, |c| {
            c.snapshots.clear();
            let scratch = c.scratch_dir();
            if scratch.exists() {
                if let Err(e) = std::fs::remove_dir_all(&scratch) {
                    tracing::warn!(
                        "Stage {}: failed to remove {:?}: {}",
                        Stage::Cleanup,
                        scratch,
                        e
                    );
                }
            }
            Ok(())
        })?;
        self.state.cleanup = StageState::Completed(());
        Ok(())
    }

    fn summary(&self) -> Result<CompileSummary, CompilerError> {
        let report = self.report()?;
        Ok(CompileSummary {
            reps: self.built()?.reps.len(),
            outdated: self.outdated()?.len(),
            compiled: report.compiled.len(),
            cached: report.cached.len(),
            written: report.written,
            unchanged: report.unchanged,
            pruned: self
                .state
                .prune
                .result()
                .map(Vec::len)
                .unwrap_or_default(),
            cache: self.stores.cache.stats(),
        })
    }

    fn stage<T>(
        &mut self,
        stage: Stage,
        run: impl FnOnce(&mut Self) -> Result<T, CompilerError>,
    ) -> Result<T, CompilerError> {
        self.cancellation.check()?;
        self.timed(stage, run)
    }

    fn timed<T>(
        &mut self,
        stage: Stage,
        run: impl FnOnce(&mut Self) -> Result<T, CompilerError>,
    ) -> Result<T, CompilerError> {
        for observer in &self.observers {
            observer.stage_started(stage);
        }
        let start = Instant::now();
        let result = run(self);
        let elapsed = start.elapsed();
        // Ended fires for failed stages too
        for observer in &self.observers {
            observer.stage_ended(stage, elapsed);
        }
        result
    }

    fn build_reps(&self) -> Result<BuiltReps, CompilerError> {
        let mut built = BuiltReps::default();

        for item in &self.site.items {
            for name in self.provider.rep_names_for(item) {
                let key = RepKey::new(item.identifier().clone(), name.as_str());
                let rules_error = |source| CompilerError::Rules {
                    object: ObjectRef::Rep(key.clone()),
                    source,
                };
                let sequence = self
                    .provider
                    .action_sequence_for_rep(item, &name)
                    .map_err(rules_error)?;
                let defs = self
                    .provider
                    .snapshot_defs_for(item, &name)
                    .map_err(rules_error)?;
                built
                    .sequences
                    .insert(ObjectRef::Rep(key.clone()), sequence.clone());
                built.reps.insert(ItemRep::new(key, sequence, defs)?)?;
            }
        }

        for layout in &self.site.layouts {
            let object = layout.object_ref();
            let sequence = self
                .provider
                .action_sequence_for_layout(layout)
                .map_err(|source| CompilerError::Rules {
                    object: object.clone(),
                    source,
                })?;
            built.sequences.insert(object, sequence);
        }

        tracing::debug!(
            "Built {} reps for {} items",
            built.reps.len(),
            self.site.items.len()
        );
        Ok(built)
    }

    /// Record current checksums; returns every object that exists this run
    fn calculate_checksums(&self) -> Result<HashSet<ObjectRef>, CompilerError> {
        let built = self.built()?;
        let checksums = &self.stores.checksums;
        let items = self.site.items.as_slice();
        let layouts = self.site.layouts.as_slice();

        self.pool.install(|| {
            items
                .par_iter()
                .chain(layouts.par_iter())
                .for_each(|document| checksums.record(document));
        });

        let snippets = self.provider.code_snippets();
        checksums.record(&self.site.config);
        for snippet in &snippets {
            checksums.record(snippet);
        }
        let items_membership = self.site.items.membership();
        let layouts_membership = self.site.layouts.membership();
        checksums.record(&items_membership);
        checksums.record(&layouts_membership);

        let mut live: HashSet<ObjectRef> = items
            .iter()
            .chain(layouts.iter())
            .map(|document| document.object_ref())
            .collect();
        live.extend(built.reps.iter().map(|rep| ObjectRef::Rep(rep.key.clone())));
        live.extend(snippets.iter().map(|snippet| ObjectRef::CodeSnippet(snippet.path.clone())));
        live.insert(ObjectRef::Config);
        live.insert(ObjectRef::Items);
        live.insert(ObjectRef::Layouts);
        Ok(live)
    }

    fn determine_outdatedness(&self) -> Result<BTreeMap<RepKey, Vec<Reason>>, CompilerError> {
        let built = self.built()?;
        let live = self.live()?;
        let descriptors = built.reps.descriptors(&self.output_dir);
        let checker = OutdatednessChecker::new(CheckerInputs {
            checksums: &self.stores.checksums,
            dependencies: &self.stores.dependencies,
            action_sequences: &self.stores.action_sequences,
            current_sequences: &built.sequences,
            marks: &self.stores.marks,
            cache: &self.stores.cache,
            changes: &self.changes,
            live,
            reps: &descriptors,
        });

        let keys: Vec<&RepKey> = built.reps.iter().map(|rep| &rep.key).collect();
        let outdated: BTreeMap<RepKey, Vec<Reason>> = self.pool.install(|| {
            keys.par_iter()
                .filter_map(|key| {
                    let reasons = checker.outdatedness_reasons_for(key);
                    (!reasons.is_empty()).then(|| ((*key).clone(), reasons))
                })
                .collect()
        });

        let marks = &self.stores.marks;
        for (key, reasons) in &outdated {
            for observer in &self.observers {
                observer.rep_outdated(key, reasons);
            }
            marks.add(key.clone());
        }
        marks.retain(|key| built.reps.contains(key));
        marks.save()?;

        tracing::info!("{} of {} reps are outdated", outdated.len(), built.reps.len());
        Ok(outdated)
    }

    fn forget_outdated_dependencies(&self) -> Result<(), CompilerError> {
        for key in self.outdated()?.keys() {
            self.stores
                .dependencies
                .forget_dependencies_for(&ObjectRef::Rep(key.clone()));
        }
        Ok(())
    }

    fn store_pre_compilation_state(&self) -> Result<(), CompilerError> {
        let built = self.built()?;
        self.stores.checksums.save()?;
        for (object, sequence) in &built.sequences {
            self.stores
                .action_sequences
                .store(object.clone(), sequence.clone());
        }
        self.stores.action_sequences.save()?;
        Ok(())
    }

    fn prune(&self) -> Result<Vec<PathBuf>, CompilerError> {
        let settings = &self.site.config.prune;
        if !settings.auto_prune {
            return Ok(Vec::new());
        }
        let keep: HashSet<PathBuf> = self
            .built()?
            .reps
            .output_files(&self.output_dir)
            .into_iter()
            .collect();
        let pruned = prune::prune_output(&self.output_dir, &keep, &settings.exclude)?;
        for path in &pruned {
            for observer in &self.observers {
                observer.pruned(path);
            }
        }
        Ok(pruned)
    }

    fn store_post_compilation_state(&self) -> Result<(), CompilerError> {
        let built = self.built()?;
        let live = self.live()?;
        let stores = &self.stores;

        stores.dependencies.retain_sources(|object| live.contains(object));
        stores.dependencies.save()?;
        stores.cache.prune(|key| built.reps.contains(key));
        stores.cache.save()?;
        stores.marks.retain(|key| built.reps.contains(key));
        stores.marks.save()?;
        Ok(())
    }

    fn scratch_dir(&self) -> PathBuf {
        self.tmp_dir.join("scratch")
    }

    fn built(&self) -> Result<&BuiltReps, CompilerError> {
        self.state
            .build_reps
            .result()
            .ok_or(CompilerError::StageNotCompleted(Stage::BuildReps))
    }

    fn live(&self) -> Result<&HashSet<ObjectRef>, CompilerError> {
        self.state
            .checksums
            .result()
            .ok_or(CompilerError::StageNotCompleted(Stage::CalculateChecksums))
    }

    fn outdated(&self) -> Result<&BTreeMap<RepKey, Vec<Reason>>, CompilerError> {
        self.state
            .outdatedness
            .result()
            .ok_or(CompilerError::StageNotCompleted(Stage::DetermineOutdatedness))
    }

    fn report(&self) -> Result<&CompileReport, CompilerError> {
        self.state
            .compile
            .result()
            .ok_or(CompilerError::StageNotCompleted(Stage::CompileReps))
    }
}
