//! The transformation callback and what it can see
//!
//! Filters and layouts are applied by a [`Transformer`] supplied by the
//! embedder. Everything a transformation reads about other documents goes
//! through its [`FilterContext`], which records the read as a dependency of
//! the rep being compiled.

use crate::document::Document;
use crate::rep::RepRepo;
use crate::site::Site;
use kiln_incremental::{DependencyProps, DependencyStore, SnapshotRepo};
use kiln_types::{AttributeValue, Attributes, Content, Identifier, ObjectRef, Pattern, RepKey};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FilterError {
    #[error("Unknown filter {0:?}")]
    UnknownFilter(String),

    #[error("Filter {filter:?} cannot process binary content")]
    BinaryInput { filter: String },

    #[error("No rep {0}")]
    UnknownRep(RepKey),

    /// The compiled content of another rep is not available yet. The rep is
    /// retried once its dependency has been compiled, so transformations must
    /// propagate this error unchanged.
    #[error("{rep} is not compiled yet")]
    UnmetDependency { rep: RepKey, snapshot: String },

    #[error("{rep} has no snapshot named {snapshot:?}")]
    NoSuchSnapshot { rep: RepKey, snapshot: String },

    #[error(transparent)]
    Failed(#[from] anyhow::Error),
}

/// One step of an action sequence handed to the transformer
#[derive(Debug, Clone, Copy)]
pub enum TransformStep<'a> {
    Filter {
        name: &'a str,
        params: &'a Attributes,
        content: &'a Content,
    },
    Layout {
        layout: &'a Document,
        /// Filter the rules assign to this layout
        filter: &'a str,
        params: &'a Attributes,
        content: &'a Content,
    },
}

impl<'a> TransformStep<'a> {
    pub fn content(&self) -> &'a Content {
        match self {
            TransformStep::Filter { content, .. } | TransformStep::Layout { content, .. } => content,
        }
    }

    pub fn params(&self) -> &'a Attributes {
        match self {
            TransformStep::Filter { params, .. } | TransformStep::Layout { params, .. } => params,
        }
    }
}

pub trait Transformer: Send + Sync {
    fn apply(&self, step: TransformStep<'_>, ctx: &FilterContext<'_>) -> Result<Content, FilterError>;
}

/// Dependency-tracking view of the site for one rep
pub struct FilterContext<'a> {
    rep: &'a RepKey,
    item: &'a Document,
    site: &'a Site,
    reps: &'a RepRepo,
    snapshots: &'a SnapshotRepo,
    dependencies: &'a DependencyStore,
    scratch_dir: &'a Path,
}

impl std::fmt::Debug for FilterContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterContext")
            .field("rep", self.rep)
            .finish_non_exhaustive()
    }
}

impl<'a> FilterContext<'a> {
    pub(crate) fn new(
        rep: &'a RepKey,
        item: &'a Document,
        site: &'a Site,
        reps: &'a RepRepo,
        snapshots: &'a SnapshotRepo,
        dependencies: &'a DependencyStore,
        scratch_dir: &'a Path,
    ) -> Self {
        Self {
            rep,
            item,
            site,
            reps,
            snapshots,
            dependencies,
            scratch_dir,
        }
    }

    /// The rep being compiled
    pub fn rep(&self) -> &RepKey {
        self.rep
    }

    /// The item being compiled; reading it records nothing
    pub fn item(&self) -> &Document {
        self.item
    }

    /// Directory for temporary files, removed after the run
    pub fn scratch_dir(&self) -> &Path {
        self.scratch_dir
    }

    pub fn record_dependency(&self, to: &ObjectRef, props: DependencyProps) {
        self.dependencies
            .record_dependency(&ObjectRef::Rep(self.rep.clone()), to, props, false);
    }

    fn record_conditional(&self, to: &ObjectRef, props: DependencyProps) {
        self.dependencies
            .record_dependency(&ObjectRef::Rep(self.rep.clone()), to, props, true);
    }

    fn lookup_item(&self, id: &Identifier) -> Option<&'a Document> {
        let found = self.site.items.get(id);
        if found.is_none() {
            // Depend on membership so the item appearing later is noticed
            self.record_dependency(&ObjectRef::Items, DependencyProps::raw_content());
        }
        found
    }

    /// An attribute of another item
    pub fn item_attribute(&self, id: &Identifier, key: &str) -> Option<AttributeValue> {
        let item = self.lookup_item(id)?;
        let value = item.attribute(key).cloned();
        if value.is_some() {
            self.record_dependency(&item.object_ref(), DependencyProps::attributes());
        } else {
            self.record_conditional(&item.object_ref(), DependencyProps::attributes());
        }
        value
    }

    /// All attributes of another item
    pub fn item_attributes(&self, id: &Identifier) -> Option<&'a Attributes> {
        let item = self.lookup_item(id)?;
        self.record_dependency(&item.object_ref(), DependencyProps::attributes());
        Some(item.attributes())
    }

    /// Raw (uncompiled) content of another item
    pub fn item_raw_content(&self, id: &Identifier) -> Option<&'a Content> {
        let item = self.lookup_item(id)?;
        self.record_dependency(&item.object_ref(), DependencyProps::raw_content());
        Some(item.content())
    }

    /// Output path of a rep's snapshot, relative to the output directory
    pub fn rep_path(&self, id: &Identifier, rep: &str, snapshot: &str) -> Result<Option<String>, FilterError> {
        let key = RepKey::new(id.clone(), rep);
        let target = self
            .reps
            .get(&key)
            .ok_or_else(|| FilterError::UnknownRep(key.clone()))?;
        self.record_dependency(&ObjectRef::Rep(key), DependencyProps::path());
        Ok(target.path(snapshot).map(str::to_string))
    }

    /// Compiled content of a rep's snapshot.
    ///
    /// Fails with [`FilterError::UnmetDependency`] while that rep has not
    /// been compiled; the compiler retries the current rep later.
    pub fn compiled_content(
        &self,
        id: &Identifier,
        rep: &str,
        snapshot: &str,
    ) -> Result<Content, FilterError> {
        let key = RepKey::new(id.clone(), rep);
        if !self.reps.contains(&key) {
            return Err(FilterError::UnknownRep(key));
        }
        self.record_dependency(&ObjectRef::Rep(key.clone()), DependencyProps::compiled_content());

        if !self.reps.is_compiled(&key) {
            return Err(FilterError::UnmetDependency {
                rep: key,
                snapshot: snapshot.to_string(),
            });
        }
        self.snapshots
            .get(&key, snapshot)
            .ok_or_else(|| FilterError::NoSuchSnapshot {
                rep: key,
                snapshot: snapshot.to_string(),
            })
    }

    /// Every item. Depends on membership only; reading an item's
    /// attributes or content through this context records that separately.
    pub fn items(&self) -> Vec<&'a Document> {
        self.record_dependency(&ObjectRef::Items, DependencyProps::raw_content());
        self.site.items.iter().collect()
    }

    pub fn items_matching(&self, pattern: &Pattern) -> Vec<&'a Document> {
        self.record_dependency(&ObjectRef::Items, DependencyProps::raw_content());
        self.site.items.find_all(pattern)
    }

    pub fn layouts(&self) -> Vec<&'a Document> {
        self.record_dependency(&ObjectRef::Layouts, DependencyProps::raw_content());
        self.site.layouts.iter().collect()
    }

    /// A configuration value by dotted key
    pub fn config_value(&self, key: &str) -> Option<AttributeValue> {
        self.record_dependency(&ObjectRef::Config, DependencyProps::attributes());
        self.site.config.get(key)
    }
}
