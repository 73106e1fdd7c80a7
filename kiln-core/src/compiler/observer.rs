//! Compiler notifications
//!
//! Observers are passed to the compiler explicitly. Every method has an
//! empty default, so an observer implements only what it cares about.
//! Rep notifications may arrive from worker threads.

use super::{CompileError, Stage};
use kiln_incremental::Reason;
use kiln_types::RepKey;
use std::path::Path;
use std::time::Duration;

pub trait CompilerObserver: Send + Sync {
    fn stage_started(&self, _stage: Stage) {}

    fn stage_ended(&self, _stage: Stage, _duration: Duration) {}

    fn rep_outdated(&self, _rep: &RepKey, _reasons: &[Reason]) {}

    fn rep_compilation_started(&self, _rep: &RepKey) {}

    fn rep_compilation_ended(&self, _rep: &RepKey, _duration: Duration) {}

    /// A fresh rep was restored from the compiled content cache
    fn rep_cached(&self, _rep: &RepKey) {}

    /// An output file was written, or left alone because it was unchanged
    fn rep_written(&self, _rep: &RepKey, _path: &Path, _modified: bool) {}

    fn rep_failed(&self, _rep: &RepKey, _error: &CompileError) {}

    fn pruned(&self, _path: &Path) {}
}

/// Reports compiler progress as tracing events
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl CompilerObserver for TracingObserver {
    fn stage_started(&self, stage: Stage) {
        tracing::debug!("Stage {} started", stage);
    }

    fn stage_ended(&self, stage: Stage, duration: Duration) {
        tracing::debug!("Stage {} finished in {:?}", stage, duration);
    }

    fn rep_outdated(&self, rep: &RepKey, reasons: &[Reason]) {
        let reasons: Vec<String> = reasons.iter().map(ToString::to_string).collect();
        tracing::debug!("{} is outdated: {}", rep, reasons.join(", "));
    }

    fn rep_compilation_ended(&self, rep: &RepKey, duration: Duration) {
        tracing::debug!("Compiled {} in {:?}", rep, duration);
    }

    fn rep_written(&self, _rep: &RepKey, path: &Path, modified: bool) {
        if modified {
            tracing::info!("Wrote {:?}", path);
        } else {
            tracing::debug!("Unchanged {:?}", path);
        }
    }

    fn rep_failed(&self, rep: &RepKey, error: &CompileError) {
        tracing::error!("Failed to compile {}: {}", rep, error);
    }

    fn pruned(&self, path: &Path) {
        tracing::info!("Pruned {:?}", path);
    }
}
