//! Kiln Incremental Compilation State
//!
//! This crate holds everything the compiler remembers between runs and the
//! procedure that uses it to decide what must be recompiled.
//!
//! # Architecture
//!
//! Each store keeps the state recorded by the previous run separately from
//! the state computed during the current run, and persists independently
//! under the compiler's temporary directory:
//!
//! ```text
//! tmp/kiln/
//!   checksums.json          object + aspect -> digest
//!   dependencies.json       dependent -> dependency edges with aspects
//!   action_sequences.json   rep/layout -> action sequence
//!   outdatedness.json       reps still awaiting recompilation
//!   compiled_content.json   rep + snapshot -> blob digest
//!   compiled_content/       content-addressed blobs
//! ```
//!
//! ## Key Features
//!
//! - **Fail toward recompiling**: a missing, corrupt or version-mismatched
//!   store loads as empty
//! - **Aspect-aware dependencies**: an edge only propagates invalidation for
//!   the aspects the dependent actually read
//! - **Content-addressed cache**: compiled snapshots are verified on read
//!
//! # Example
//!
//! ```rust,ignore
//! use kiln_incremental::{CheckerInputs, OutdatednessChecker};
//!
//! let checker = OutdatednessChecker::new(CheckerInputs { /* stores */ });
//! for rep in reps {
//!     if checker.is_outdated(&rep) {
//!         // recompile
//!     }
//! }
//! ```

#![warn(missing_debug_implementations)]

pub mod action_sequence;
pub mod cache;
pub mod checker;
pub mod checksum;
pub mod dependency;
pub mod digest;
pub mod error;
pub mod marks;
pub mod persist;
pub mod snapshot;

pub use action_sequence::ActionSequenceStore;
pub use cache::{CacheStats, CompiledContentCache};
pub use checker::{
    CheckerInputs, ExternalChanges, OutdatednessChecker, Reason, RepDescriptor, Status,
};
pub use checksum::ChecksumStore;
pub use dependency::{Dependency, DependencyProps, DependencyStore};
pub use digest::{Aspect, Checksummable, Collection, Digest};
pub use error::StoreError;
pub use marks::OutdatednessStore;
pub use persist::{tmp_path, write_atomic, StoreFile};
pub use snapshot::SnapshotRepo;
