//! Compiling reps
//!
//! Fresh reps are restored from the compiled content cache. Outdated reps
//! are compiled in waves on the worker pool: a rep that asks for compiled
//! content not yet available is put back for the next wave. A wave that
//! makes no progress means the remaining reps wait on each other.

use super::{BuiltReps, CompileError, Compiler, CompilerError, RepFailure};
use crate::filter::{FilterContext, FilterError, TransformStep};
use crate::rep::{ItemRep, RepRepo, LAST_SNAPSHOT};
use kiln_incremental::{tmp_path, DependencyProps, StoreError};
use kiln_types::{Action, Content, Identifier, ObjectRef, RepKey};
use rayon::prelude::*;
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

type Snapshots = BTreeMap<String, Content>;

#[derive(Debug, Default)]
pub(crate) struct CompileReport {
    pub compiled: Vec<RepKey>,
    pub cached: Vec<RepKey>,
    pub failures: Vec<RepFailure>,
    pub written: usize,
    pub unchanged: usize,
}

impl Compiler {
    pub(super) fn compile_reps(&self) -> Result<CompileReport, CompilerError> {
        let built = self.built()?;
        let outdated = self.outdated()?;
        let mut report = CompileReport::default();
        let mut pending: Vec<RepKey> = outdated.keys().cloned().collect();

        for rep in built.reps.iter() {
            if outdated.contains_key(&rep.key) {
                continue;
            }
            if self.restore_from_cache(rep, &built.reps) {
                for observer in &self.observers {
                    observer.rep_cached(&rep.key);
                }
                report.cached.push(rep.key.clone());
            } else {
                tracing::warn!("Cached content of {} is unusable, recompiling", rep.key);
                self.stores.marks.add(rep.key.clone());
                self.stores
                    .dependencies
                    .forget_dependencies_for(&ObjectRef::Rep(rep.key.clone()));
                pending.push(rep.key.clone());
            }
        }
        pending.sort();

        let mut failed: HashSet<RepKey> = HashSet::new();
        while !pending.is_empty() {
            self.cancellation.check()?;

            let results: Vec<(RepKey, Result<Snapshots, CompileError>)> = self.pool.install(|| {
                pending
                    .par_iter()
                    .map(|key| (key.clone(), self.compile_rep(built, key)))
                    .collect()
            });

            let mut waiting = Vec::new();
            let mut progressed = false;
            for (key, result) in results {
                match result {
                    Ok(snapshots) => {
                        progressed = true;
                        match self.finish_rep(&built.reps, &key, snapshots, &mut report) {
                            Ok(()) => report.compiled.push(key),
                            Err(error) => self.fail(&mut report, &mut failed, key, error),
                        }
                    }
                    Err(CompileError::Filter(FilterError::UnmetDependency { rep: dependency, .. })) => {
                        if failed.contains(&dependency) {
                            progressed = true;
                            let error = CompileError::DependencyFailed {
                                rep: key.clone(),
                                dependency,
                            };
                            self.fail(&mut report, &mut failed, key, error);
                        } else {
                            waiting.push(key);
                        }
                    }
                    Err(error) => {
                        progressed = true;
                        self.fail(&mut report, &mut failed, key, error);
                    }
                }
            }

            if !progressed {
                for key in waiting {
                    let error = CompileError::DependencyCycle { rep: key.clone() };
                    self.fail(&mut report, &mut failed, key, error);
                }
                break;
            }
            pending = waiting;
        }

        Ok(report)
    }

    fn restore_from_cache(&self, rep: &ItemRep, reps: &RepRepo) -> bool {
        let Some(cached) = self.stores.cache.fetch_all(&rep.key) else {
            return false;
        };
        if !rep.snapshot_names().iter().all(|name| cached.contains_key(name)) {
            return false;
        }
        self.snapshots.set_all(&rep.key, cached);
        reps.set_compiled(&rep.key);
        true
    }

    /// Run a rep's action sequence; returns its snapshots
    fn compile_rep(&self, built: &BuiltReps, key: &RepKey) -> Result<Snapshots, CompileError> {
        let rep = built
            .reps
            .get(key)
            .ok_or_else(|| FilterError::UnknownRep(key.clone()))?;
        let item = self
            .site
            .items
            .get(&key.item)
            .ok_or_else(|| CompileError::UnknownItem(key.item.clone()))?;

        for observer in &self.observers {
            observer.rep_compilation_started(key);
        }
        let start = Instant::now();

        self.stores
            .dependencies
            .forget_dependencies_for(&ObjectRef::Rep(key.clone()));
        let scratch_dir = self.scratch_dir();
        let ctx = FilterContext::new(
            key,
            item,
            &self.site,
            &built.reps,
            &self.snapshots,
            &self.stores.dependencies,
            &scratch_dir,
        );

        let mut content = item.content().clone();
        let mut snapshots = Snapshots::new();
        for action in rep.sequence.iter() {
            match action {
                Action::Filter { name, params } => {
                    let step = TransformStep::Filter {
                        name,
                        params,
                        content: &content,
                    };
                    content = self.transformer.apply(step, &ctx)?;
                }
                Action::Layout { identifier, params } => {
                    let exact = Identifier::full(identifier.as_str())
                        .ok()
                        .is_some_and(|id| self.site.layouts.contains(&id));
                    if !exact {
                        ctx.record_dependency(&ObjectRef::Layouts, DependencyProps::raw_content());
                    }
                    let layout = self
                        .site
                        .layouts
                        .find(identifier)
                        .ok_or_else(|| CompileError::UnknownLayout(identifier.clone()))?;
                    let layout_ref = layout.object_ref();
                    ctx.record_dependency(
                        &layout_ref,
                        DependencyProps::raw_content()
                            .union(DependencyProps::attributes())
                            .union(DependencyProps::compiled_content()),
                    );

                    let (filter, layout_params) = built
                        .sequences
                        .get(&layout_ref)
                        .and_then(|sequence| {
                            sequence.iter().find_map(|action| match action {
                                Action::Filter { name, params } => Some((name, params)),
                                _ => None,
                            })
                        })
                        .ok_or_else(|| CompileError::LayoutWithoutFilter(layout.identifier().clone()))?;

                    let mut merged = layout_params.clone();
                    merged.extend(params.iter().map(|(k, v)| (k.clone(), v.clone())));
                    let step = TransformStep::Layout {
                        layout,
                        filter,
                        params: &merged,
                        content: &content,
                    };
                    content = self.transformer.apply(step, &ctx)?;
                }
                Action::Snapshot { name, .. } => {
                    snapshots.insert(name.clone(), content.clone());
                }
            }
        }
        snapshots.insert(LAST_SNAPSHOT.to_string(), content);

        let elapsed = start.elapsed();
        for observer in &self.observers {
            observer.rep_compilation_ended(key, elapsed);
        }
        Ok(snapshots)
    }

    /// Write routed snapshots and make the rep's content available.
    ///
    /// Every changed output is staged next to its destination first and
    /// only renamed into place once all of them were written.
    fn finish_rep(
        &self,
        reps: &RepRepo,
        key: &RepKey,
        snapshots: Snapshots,
        report: &mut CompileReport,
    ) -> Result<(), CompileError> {
        let rep = reps
            .get(key)
            .ok_or_else(|| FilterError::UnknownRep(key.clone()))?;

        let mut outputs = Vec::new();
        for snapshot in rep.paths.keys() {
            let content = snapshots
                .get(snapshot)
                .ok_or_else(|| CompileError::NoSuchSnapshot {
                    rep: key.clone(),
                    snapshot: snapshot.clone(),
                })?;
            if let Some(path) = rep.raw_path(&self.output_dir, snapshot) {
                outputs.push((path, content.as_bytes()));
            }
        }

        let written = publish_outputs(&outputs)?;
        for (path, _) in &outputs {
            let modified = written.contains(path);
            if modified {
                report.written += 1;
            } else {
                report.unchanged += 1;
            }
            for observer in &self.observers {
                observer.rep_written(key, path, modified);
            }
        }

        self.stores.cache.store_all(key, &snapshots);
        self.stores.marks.remove(key);
        self.snapshots.set_all(key, snapshots);
        reps.set_compiled(key);
        Ok(())
    }

    fn fail(
        &self,
        report: &mut CompileReport,
        failed: &mut HashSet<RepKey>,
        key: RepKey,
        error: CompileError,
    ) {
        self.stores
            .dependencies
            .forget_dependencies_for(&ObjectRef::Rep(key.clone()));
        for observer in &self.observers {
            observer.rep_failed(&key, &error);
        }
        failed.insert(key.clone());
        report.failures.push(RepFailure {
            rep: key,
            error: Arc::new(error),
        });
    }
}

/// Write every output whose bytes differ from what is on disk; returns the
/// paths that were written. Either all changed outputs are replaced or, on
/// error, none are.
fn publish_outputs(outputs: &[(PathBuf, &[u8])]) -> Result<Vec<PathBuf>, CompileError> {
    let mut staged: Vec<(PathBuf, PathBuf)> = Vec::new();
    for (path, bytes) in outputs {
        if fs::read(path).is_ok_and(|existing| existing == *bytes) {
            continue;
        }
        match stage_output(path, bytes) {
            Ok(tmp) => staged.push((tmp, path.clone())),
            Err(error) => {
                discard(&staged);
                return Err(error);
            }
        }
    }

    for (i, (tmp, path)) in staged.iter().enumerate() {
        if let Err(source) = fs::rename(tmp, path) {
            discard(&staged[i..]);
            return Err(CompileError::Write {
                path: path.clone(),
                source: StoreError::Write {
                    path: path.clone(),
                    source,
                },
            });
        }
    }
    Ok(staged.into_iter().map(|(_, path)| path).collect())
}

fn stage_output(path: &Path, bytes: &[u8]) -> Result<PathBuf, CompileError> {
    let write_error = |source| CompileError::Write {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| {
            write_error(StoreError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })
        })?;
    }
    let tmp = tmp_path(path);
    fs::write(&tmp, bytes).map_err(|source| {
        write_error(StoreError::Write {
            path: tmp.clone(),
            source,
        })
    })?;
    Ok(tmp)
}

fn discard(staged: &[(PathBuf, PathBuf)]) {
    for (tmp, _) in staged {
        if let Err(e) = fs::remove_file(tmp) {
            tracing::warn!("Failed to remove staged output {:?}: {}", tmp, e);
        }
    }
}
