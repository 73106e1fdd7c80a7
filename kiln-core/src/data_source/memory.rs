use super::{DataSource, DataSourceError};
use crate::changes::{ChangeEvent, ChangesStream};
use crate::document::Document;

/// Serves a fixed set of documents
#[derive(Debug, Clone, Default)]
pub struct InMemoryDataSource {
    name: String,
    items: Vec<Document>,
    layouts: Vec<Document>,
    item_events: Vec<ChangeEvent>,
    layout_events: Vec<ChangeEvent>,
}

impl InMemoryDataSource {
    pub fn new(name: impl Into<String>, items: Vec<Document>, layouts: Vec<Document>) -> Self {
        Self {
            name: name.into(),
            items,
            layouts,
            ..Default::default()
        }
    }

    /// Events replayed by `item_changes`
    pub fn with_item_events(mut self, events: Vec<ChangeEvent>) -> Self {
        self.item_events = events;
        self
    }

    /// Events replayed by `layout_changes`
    pub fn with_layout_events(mut self, events: Vec<ChangeEvent>) -> Self {
        self.layout_events = events;
        self
    }
}

impl DataSource for InMemoryDataSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn items(&self) -> Result<Vec<Document>, DataSourceError> {
        Ok(self.items.clone())
    }

    fn layouts(&self) -> Result<Vec<Document>, DataSourceError> {
        Ok(self.layouts.clone())
    }

    fn item_changes(&self) -> ChangesStream {
        ChangesStream::from_events(self.item_events.clone())
    }

    fn layout_changes(&self) -> ChangesStream {
        ChangesStream::from_events(self.layout_events.clone())
    }
}
