//! Items and layouts
//!
//! A document is content plus attributes under an identifier. Digests are
//! memoized and dropped whenever the document is mutated, so a checksum
//! computed after `set_attribute` always reflects the new state.

use kiln_incremental::{Aspect, Checksummable, Digest};
use kiln_types::{
    AttributeError, AttributeValue, Attributes, Content, IdentifierError, Identifier,
    IntoAttribute, ObjectRef,
};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DocumentError {
    #[error(transparent)]
    Attribute(#[from] AttributeError),

    #[error(transparent)]
    Identifier(#[from] IdentifierError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    Item,
    Layout,
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentKind::Item => write!(f, "item"),
            DocumentKind::Layout => write!(f, "layout"),
        }
    }
}

#[derive(Debug, Clone)]
struct Digests {
    content: Digest,
    attributes: Option<Digest>,
}

#[derive(Debug, Clone)]
pub struct Document {
    kind: DocumentKind,
    identifier: Identifier,
    content: Content,
    attributes: Attributes,
    digests: OnceCell<Digests>,
}

impl Document {
    pub fn new(
        kind: DocumentKind,
        identifier: Identifier,
        content: impl Into<Content>,
        attributes: Attributes,
    ) -> Self {
        Self {
            kind,
            identifier,
            content: content.into(),
            attributes,
            digests: OnceCell::new(),
        }
    }

    pub fn item(identifier: Identifier, content: impl Into<Content>, attributes: Attributes) -> Self {
        Self::new(DocumentKind::Item, identifier, content, attributes)
    }

    pub fn layout(
        identifier: Identifier,
        content: impl Into<Content>,
        attributes: Attributes,
    ) -> Self {
        Self::new(DocumentKind::Layout, identifier, content, attributes)
    }

    pub fn kind(&self) -> DocumentKind {
        self.kind
    }

    pub fn identifier(&self) -> &Identifier {
        &self.identifier
    }

    pub fn content(&self) -> &Content {
        &self.content
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    pub fn attribute(&self, key: &str) -> Option<&AttributeValue> {
        self.attributes.get(key)
    }

    pub fn set_content(&mut self, content: impl Into<Content>) {
        self.content = content.into();
        self.digests.take();
    }

    /// Set one attribute. Documents cannot be stored as values.
    pub fn set_attribute(
        &mut self,
        key: impl Into<String>,
        value: impl IntoAttribute,
    ) -> Result<(), DocumentError> {
        let key = key.into();
        let value = value.into_attribute(&key)?;
        self.attributes.insert(key, value);
        self.digests.take();
        Ok(())
    }

    /// Merge attributes into the existing ones
    pub fn update_attributes(&mut self, attributes: Attributes) {
        self.attributes.extend(attributes);
        self.digests.take();
    }

    pub fn remove_attribute(&mut self, key: &str) -> Option<AttributeValue> {
        let removed = self.attributes.remove(key);
        if removed.is_some() {
            self.digests.take();
        }
        removed
    }

    /// A copy of this document with its identifier prefixed
    pub fn with_identifier_prefix(&self, prefix: &str) -> Result<Document, DocumentError> {
        let identifier = self.identifier.prefix(prefix)?;
        Ok(Document::new(
            self.kind,
            identifier,
            self.content.clone(),
            self.attributes.clone(),
        ))
    }

    pub fn object_ref(&self) -> ObjectRef {
        match self.kind {
            DocumentKind::Item => ObjectRef::item(&self.identifier),
            DocumentKind::Layout => ObjectRef::layout(&self.identifier),
        }
    }

    fn digests(&self) -> &Digests {
        self.digests.get_or_init(|| Digests {
            content: Digest::of_content(&self.content),
            attributes: Digest::of_json(&self.attributes),
        })
    }
}

impl Checksummable for Document {
    fn object_ref(&self) -> ObjectRef {
        Document::object_ref(self)
    }

    fn digest(&self, aspect: Aspect) -> Option<Digest> {
        match aspect {
            Aspect::Content => Some(self.digests().content.clone()),
            Aspect::Attributes => self.digests().attributes.clone(),
            Aspect::Other => None,
        }
    }
}

impl IntoAttribute for &Document {
    fn into_attribute(self, key: &str) -> Result<AttributeValue, AttributeError> {
        Err(AttributeError::DisallowedAttributeValue {
            key: key.to_string(),
            kind: self.kind.to_string(),
        })
    }
}
