//! # kiln-core
//!
//! Core library for the kiln incremental site compiler.
//!
//! This crate loads a site's items and layouts from its data sources,
//! turns rules into reps, and compiles only the reps whose inputs changed
//! since the previous run.

pub mod action_provider;
pub mod attributes;
pub mod changes;
pub mod code_snippet;
pub mod compiler;
pub mod config;
pub mod data_source;
pub mod document;
pub mod filter;
pub mod frontmatter;
pub mod rep;
pub mod rules;
pub mod site;

pub use action_provider::ActionProvider;
pub use changes::{collect_changes, ChangeEvent, ChangesListener, ChangesStream};
pub use code_snippet::CodeSnippet;
pub use compiler::{
    CancellationToken, CompileError, CompileSummary, Compiler, CompilerBuilder, CompilerError,
    CompilerObserver, RepFailure, Stage, TracingObserver,
};
pub use config::{ConfigError, SiteConfig};
pub use data_source::{DataSource, DataSourceError};
pub use document::{Document, DocumentKind};
pub use filter::{FilterContext, FilterError, TransformStep, Transformer};
pub use rep::{ItemRep, RepRepo, LAST_SNAPSHOT};
pub use rules::{Rules, RulesError};
pub use site::{DocumentCollection, Site, SiteError};
