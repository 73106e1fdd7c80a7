//! The site: configuration plus every item and layout

use crate::config::SiteConfig;
use crate::data_source::{self, DataSource, DataSourceError};
use crate::document::{Document, DocumentKind};
use kiln_incremental::Collection;
use kiln_types::{Identifier, ObjectRef, Pattern};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SiteError {
    #[error("Duplicate {kind} identifier: {identifier}")]
    DuplicateIdentifier {
        kind: DocumentKind,
        identifier: Identifier,
    },

    #[error("Cannot add {actual} {identifier} to the {expected} collection")]
    WrongKind {
        expected: DocumentKind,
        actual: DocumentKind,
        identifier: Identifier,
    },

    #[error("Data source {name} failed: {source}")]
    DataSource {
        name: String,
        #[source]
        source: DataSourceError,
    },
}

/// Ordered documents of one kind, unique by identifier
#[derive(Debug, Clone)]
pub struct DocumentCollection {
    kind: DocumentKind,
    documents: Vec<Document>,
    index: HashMap<Identifier, usize>,
}

impl DocumentCollection {
    pub fn new(kind: DocumentKind) -> Self {
        Self {
            kind,
            documents: Vec::new(),
            index: HashMap::new(),
        }
    }

    pub fn kind(&self) -> DocumentKind {
        self.kind
    }

    pub fn add(&mut self, document: Document) -> Result<(), SiteError> {
        if document.kind() != self.kind {
            return Err(SiteError::WrongKind {
                expected: self.kind,
                actual: document.kind(),
                identifier: document.identifier().clone(),
            });
        }
        if self.index.contains_key(document.identifier()) {
            return Err(SiteError::DuplicateIdentifier {
                kind: self.kind,
                identifier: document.identifier().clone(),
            });
        }
        self.index
            .insert(document.identifier().clone(), self.documents.len());
        self.documents.push(document);
        Ok(())
    }

    pub fn remove(&mut self, identifier: &Identifier) -> Option<Document> {
        let position = self.index.remove(identifier)?;
        let removed = self.documents.remove(position);
        for slot in self.index.values_mut() {
            if *slot > position {
                *slot -= 1;
            }
        }
        Some(removed)
    }

    pub fn get(&self, identifier: &Identifier) -> Option<&Document> {
        self.index.get(identifier).map(|&i| &self.documents[i])
    }

    pub fn get_mut(&mut self, identifier: &Identifier) -> Option<&mut Document> {
        match self.index.get(identifier) {
            Some(&i) => Some(&mut self.documents[i]),
            None => None,
        }
    }

    pub fn contains(&self, identifier: &Identifier) -> bool {
        self.index.contains_key(identifier)
    }

    /// Documents whose identifier matches the pattern, in collection order
    pub fn find_all(&self, pattern: &Pattern) -> Vec<&Document> {
        self.documents
            .iter()
            .filter(|doc| doc.identifier().matches(pattern))
            .collect()
    }

    /// Look up by exact identifier, falling back to the first pattern match
    pub fn find(&self, reference: &str) -> Option<&Document> {
        if let Ok(id) = Identifier::full(reference) {
            if let Some(doc) = self.get(&id) {
                return Some(doc);
            }
        }
        let pattern = Pattern::glob(reference);
        self.documents
            .iter()
            .find(|doc| doc.identifier().matches(&pattern))
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Document> {
        self.documents.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, Document> {
        self.documents.iter_mut()
    }

    pub fn as_slice(&self) -> &[Document] {
        &self.documents
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Membership checksum: identifiers only, contents excluded
    pub fn membership(&self) -> Collection {
        let object = match self.kind {
            DocumentKind::Item => ObjectRef::Items,
            DocumentKind::Layout => ObjectRef::Layouts,
        };
        Collection::new(object, self.documents.iter().map(|d| d.identifier().as_str()))
    }
}

impl<'a> IntoIterator for &'a DocumentCollection {
    type Item = &'a Document;
    type IntoIter = std::slice::Iter<'a, Document>;

    fn into_iter(self) -> Self::IntoIter {
        self.documents.iter()
    }
}

#[derive(Debug, Clone)]
pub struct Site {
    pub config: SiteConfig,
    pub items: DocumentCollection,
    pub layouts: DocumentCollection,
}

impl Site {
    /// An empty site
    pub fn new(config: SiteConfig) -> Self {
        Self {
            config,
            items: DocumentCollection::new(DocumentKind::Item),
            layouts: DocumentCollection::new(DocumentKind::Layout),
        }
    }

    /// Load every document from the data sources named in the configuration
    pub fn load(config: SiteConfig) -> Result<Self, SiteError> {
        let sources = data_source::from_config(&config);
        Self::from_sources(config, &sources)
    }

    pub fn from_sources(
        config: SiteConfig,
        sources: &[Box<dyn DataSource>],
    ) -> Result<Self, SiteError> {
        let mut site = Site::new(config);
        for source in sources {
            let wrap = |source_err| SiteError::DataSource {
                name: source.name().to_string(),
                source: source_err,
            };
            for item in source.items().map_err(wrap)? {
                site.items.add(item)?;
            }
            for layout in source.layouts().map_err(wrap)? {
                site.layouts.add(layout)?;
            }
        }
        tracing::info!(
            "Loaded {} items and {} layouts",
            site.items.len(),
            site.layouts.len()
        );
        Ok(site)
    }

    pub fn documents(&self, kind: DocumentKind) -> &DocumentCollection {
        match kind {
            DocumentKind::Item => &self.items,
            DocumentKind::Layout => &self.layouts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_incremental::{Aspect, Checksummable};
    use kiln_types::Attributes;

    fn item(path: &str) -> Document {
        Document::item(Identifier::full(path).unwrap(), "", Attributes::new())
    }

    #[test]
    fn test_duplicate_identifiers_are_rejected() {
        let mut items = DocumentCollection::new(DocumentKind::Item);
        items.add(item("/a.md")).unwrap();
        assert!(matches!(
            items.add(item("/a.md")),
            Err(SiteError::DuplicateIdentifier { .. })
        ));
    }

    #[test]
    fn test_wrong_kind_is_rejected() {
        let mut layouts = DocumentCollection::new(DocumentKind::Layout);
        assert!(matches!(
            layouts.add(item("/a.html")),
            Err(SiteError::WrongKind { .. })
        ));
    }

    #[test]
    fn test_find_all_and_remove() {
        let mut items = DocumentCollection::new(DocumentKind::Item);
        for path in ["/posts/a.md", "/posts/b.md", "/about.md"] {
            items.add(item(path)).unwrap();
        }

        let posts = items.find_all(&Pattern::glob("/posts/*.md"));
        assert_eq!(posts.len(), 2);

        let a = Identifier::full("/posts/a.md").unwrap();
        assert!(items.remove(&a).is_some());
        assert!(!items.contains(&a));
        let about = Identifier::full("/about.md").unwrap();
        assert_eq!(items.get(&about).map(|d| d.identifier()), Some(&about));
    }

    #[test]
    fn test_find_by_pattern() {
        let mut layouts = DocumentCollection::new(DocumentKind::Layout);
        layouts
            .add(Document::layout(
                Identifier::full("/default.html").unwrap(),
                "",
                Attributes::new(),
            ))
            .unwrap();

        assert!(layouts.find("/default.html").is_some());
        assert!(layouts.find("/default.*").is_some());
        assert!(layouts.find("/other.*").is_none());
    }

    #[test]
    fn test_membership_ignores_content() {
        let mut a = DocumentCollection::new(DocumentKind::Item);
        a.add(item("/a.md")).unwrap();
        let mut b = DocumentCollection::new(DocumentKind::Item);
        b.add(Document::item(
            Identifier::full("/a.md").unwrap(),
            "changed",
            Attributes::new(),
        ))
        .unwrap();

        assert_eq!(
            a.membership().digest(Aspect::Other),
            b.membership().digest(Aspect::Other)
        );
        b.add(item("/b.md")).unwrap();
        assert_ne!(
            a.membership().digest(Aspect::Other),
            b.membership().digest(Aspect::Other)
        );
    }
}
