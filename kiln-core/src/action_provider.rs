//! Where reps and their action sequences come from

use crate::code_snippet::CodeSnippet;
use crate::document::Document;
use crate::rep::{RepRepo, LAST_SNAPSHOT};
use crate::site::Site;
use kiln_types::{ActionSequence, SnapshotDef};

pub trait ActionProvider: Send + Sync {
    /// Names of the reps to build for an item
    fn rep_names_for(&self, item: &Document) -> Vec<String>;

    fn action_sequence_for_rep(&self, item: &Document, rep_name: &str) -> anyhow::Result<ActionSequence>;

    /// Sequence of a layout; its first filter action names the filter
    /// that renders the layout
    fn action_sequence_for_layout(&self, layout: &Document) -> anyhow::Result<ActionSequence>;

    /// Snapshots a rep declares. Defaults to the snapshots of its action
    /// sequence plus `last`, binary when the item is.
    fn snapshot_defs_for(&self, item: &Document, rep_name: &str) -> anyhow::Result<Vec<SnapshotDef>> {
        let sequence = self.action_sequence_for_rep(item, rep_name)?;
        let binary = item.content().is_binary();
        let mut names: Vec<&str> = sequence.snapshot_names();
        if !names.contains(&LAST_SNAPSHOT) {
            names.push(LAST_SNAPSHOT);
        }
        Ok(names
            .into_iter()
            .map(|name| SnapshotDef::new(name, binary))
            .collect())
    }

    /// Source code whose changes outdate everything
    fn code_snippets(&self) -> Vec<CodeSnippet> {
        Vec::new()
    }

    fn preprocess(&self, _site: &mut Site) -> anyhow::Result<()> {
        Ok(())
    }

    fn postprocess(&self, _site: &Site, _reps: &RepRepo) -> anyhow::Result<()> {
        Ok(())
    }
}
