use super::{DataSource, DataSourceError};
use crate::changes::ChangesStream;
use crate::document::Document;

/// Mounts another data source under identifier prefixes
pub struct PrefixedDataSource {
    inner: Box<dyn DataSource>,
    items_prefix: String,
    layouts_prefix: String,
}

impl std::fmt::Debug for PrefixedDataSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrefixedDataSource")
            .field("inner", &self.inner.name())
            .field("items_prefix", &self.items_prefix)
            .field("layouts_prefix", &self.layouts_prefix)
            .finish()
    }
}

impl PrefixedDataSource {
    pub fn new(
        inner: Box<dyn DataSource>,
        items_prefix: impl Into<String>,
        layouts_prefix: impl Into<String>,
    ) -> Self {
        Self {
            inner,
            items_prefix: items_prefix.into(),
            layouts_prefix: layouts_prefix.into(),
        }
    }

    fn prefix_all(docs: Vec<Document>, prefix: &str) -> Result<Vec<Document>, DataSourceError> {
        docs.iter()
            .map(|doc| Ok(doc.with_identifier_prefix(prefix)?))
            .collect()
    }

    fn prefix_stream(stream: ChangesStream, prefix: &str) -> ChangesStream {
        let prefix = prefix.to_string();
        stream.map(move |event| {
            event.map_identifier(|id| match id.prefix(&prefix) {
                Ok(prefixed) => prefixed,
                Err(err) => {
                    tracing::warn!("Cannot prefix changed identifier {}: {}", id, err);
                    id
                }
            })
        })
    }
}

impl DataSource for PrefixedDataSource {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn items(&self) -> Result<Vec<Document>, DataSourceError> {
        Self::prefix_all(self.inner.items()?, &self.items_prefix)
    }

    fn layouts(&self) -> Result<Vec<Document>, DataSourceError> {
        Self::prefix_all(self.inner.layouts()?, &self.layouts_prefix)
    }

    fn item_changes(&self) -> ChangesStream {
        Self::prefix_stream(self.inner.item_changes(), &self.items_prefix)
    }

    fn layout_changes(&self) -> ChangesStream {
        Self::prefix_stream(self.inner.layout_changes(), &self.layouts_prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::changes::ChangeEvent;
    use crate::data_source::InMemoryDataSource;
    use crate::document::DocumentKind;
    use kiln_types::{Attributes, Identifier};

    fn id(path: &str) -> Identifier {
        Identifier::full(path).unwrap()
    }

    fn source() -> PrefixedDataSource {
        let inner = InMemoryDataSource::new(
            "memory",
            vec![Document::item(id("/a.md"), "a", Attributes::new())],
            vec![Document::layout(id("/default.html"), "", Attributes::new())],
        )
        .with_item_events(vec![
            ChangeEvent::DocumentModified(DocumentKind::Item, id("/a.md")),
            ChangeEvent::Lib,
        ]);
        PrefixedDataSource::new(Box::new(inner), "/blog/", "/themes/blog")
    }

    #[test]
    fn test_documents_are_prefixed() {
        let source = source();
        let items = source.items().unwrap();
        assert_eq!(items[0].identifier(), &id("/blog/a.md"));
        assert_eq!(items[0].content().as_text(), Some("a"));

        let layouts = source.layouts().unwrap();
        assert_eq!(layouts[0].identifier(), &id("/themes/blog/default.html"));
    }

    #[test]
    fn test_changes_are_prefixed() {
        let events: Vec<_> = source().item_changes().collect();
        assert_eq!(
            events,
            vec![
                ChangeEvent::DocumentModified(DocumentKind::Item, id("/blog/a.md")),
                ChangeEvent::Lib,
            ]
        );
    }
}
