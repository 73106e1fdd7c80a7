use super::Stage;
use crate::filter::FilterError;
use crate::site::SiteError;
use kiln_incremental::StoreError;
use kiln_types::{Identifier, ObjectRef, RepKey};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Failure of one rep
#[derive(Error, Debug)]
pub enum CompileError {
    #[error("Output path {path:?} of {rep} does not start with a slash")]
    InvalidPath { rep: RepKey, path: String },

    #[error("{rep} and {other} are both routed to {path:?}")]
    DuplicateOutputPath {
        rep: RepKey,
        other: RepKey,
        path: String,
    },

    #[error("{path:?} of {rep} and {other_path:?} of {other} need the same path as a file and a directory")]
    NestedOutputPath {
        rep: RepKey,
        path: String,
        other: RepKey,
        other_path: String,
    },

    #[error("No item {0}")]
    UnknownItem(Identifier),

    #[error("No layout matches {0:?}")]
    UnknownLayout(String),

    #[error("Layout {0} has no filter")]
    LayoutWithoutFilter(Identifier),

    #[error("{rep} has no snapshot named {snapshot:?}")]
    NoSuchSnapshot { rep: RepKey, snapshot: String },

    #[error(transparent)]
    Filter(#[from] FilterError),

    #[error("{rep} needs {dependency}, which failed to compile")]
    DependencyFailed { rep: RepKey, dependency: RepKey },

    #[error("{rep} waits on compiled content that can never become available")]
    DependencyCycle { rep: RepKey },

    #[error("Failed to write output {path:?}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: StoreError,
    },
}

#[derive(Debug, Clone)]
pub struct RepFailure {
    pub rep: RepKey,
    pub error: Arc<CompileError>,
}

impl fmt::Display for RepFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.rep, self.error)
    }
}

/// Failure of a compiler run
#[derive(Error, Debug)]
pub enum CompilerError {
    #[error("Preprocessing failed: {0}")]
    Preprocess(#[source] anyhow::Error),

    #[error("Postprocessing failed: {0}")]
    Postprocess(#[source] anyhow::Error),

    #[error("Rules failed for {object}: {source}")]
    Rules {
        object: ObjectRef,
        #[source]
        source: anyhow::Error,
    },

    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error("Failed to persist compiler state: {0}")]
    Store(#[from] StoreError),

    #[error("Failed to prune {path:?}: {source}")]
    Prune {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to start worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("{} rep(s) failed to compile", .0.len())]
    RepsFailed(Vec<RepFailure>),

    #[error("Compilation was cancelled")]
    Cancelled,

    #[error("Stage {0} has not completed")]
    StageNotCompleted(Stage),

    #[error("No {0} was configured")]
    MissingComponent(&'static str),

    #[error(transparent)]
    Site(#[from] SiteError),
}
