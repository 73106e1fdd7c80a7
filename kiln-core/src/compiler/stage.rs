use std::fmt;

/// Stages of a compiler run, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Stage {
    Preprocess,
    BuildReps,
    LoadStores,
    CalculateChecksums,
    DetermineOutdatedness,
    ForgetOutdatedDependencies,
    StorePreCompilationState,
    Prune,
    CompileReps,
    StorePostCompilationState,
    Postprocess,
    Cleanup,
}

impl Stage {
    pub const ALL: [Stage; 12] = [
        Stage::Preprocess,
        Stage::BuildReps,
        Stage::LoadStores,
        Stage::CalculateChecksums,
        Stage::DetermineOutdatedness,
        Stage::ForgetOutdatedDependencies,
        Stage::StorePreCompilationState,
        Stage::Prune,
        Stage::CompileReps,
        Stage::StorePostCompilationState,
        Stage::Postprocess,
        Stage::Cleanup,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Stage::Preprocess => "preprocess",
            Stage::BuildReps => "build_reps",
            Stage::LoadStores => "load_stores",
            Stage::CalculateChecksums => "calculate_checksums",
            Stage::DetermineOutdatedness => "determine_outdatedness",
            Stage::ForgetOutdatedDependencies => "forget_outdated_dependencies",
            Stage::StorePreCompilationState => "store_pre_compilation_state",
            Stage::Prune => "prune",
            Stage::CompileReps => "compile_reps",
            Stage::StorePostCompilationState => "store_post_compilation_state",
            Stage::Postprocess => "postprocess",
            Stage::Cleanup => "cleanup",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Result slot of a memoized stage
#[derive(Debug, Clone)]
pub enum StageState<T> {
    NotStarted,
    Completed(T),
}

impl<T> Default for StageState<T> {
    fn default() -> Self {
        StageState::NotStarted
    }
}

impl<T> StageState<T> {
    pub fn is_completed(&self) -> bool {
        matches!(self, StageState::Completed(_))
    }

    pub fn result(&self) -> Option<&T> {
        match self {
            StageState::Completed(value) => Some(value),
            StageState::NotStarted => None,
        }
    }
}
