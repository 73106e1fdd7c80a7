//! Digests over canonical encodings
//!
//! Every checksum the compiler records is a BLAKE3 digest, hex encoded so the
//! persisted stores stay readable. Structured values are hashed through their
//! JSON encoding; attribute maps are `BTreeMap`s, so the encoding is
//! independent of insertion order.

use blake3::Hasher;
use kiln_types::{Content, ObjectRef};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Hex-encoded BLAKE3 digest
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Digest(String);

impl Digest {
    /// Digest of raw bytes
    pub fn of_bytes(bytes: &[u8]) -> Self {
        Digest(blake3::hash(bytes).to_hex().to_string())
    }

    /// Digest of several byte strings, length-prefixed so that component
    /// boundaries cannot be shifted without changing the result
    pub fn of_parts<'a>(parts: impl IntoIterator<Item = &'a [u8]>) -> Self {
        let mut hasher = Hasher::new();
        for part in parts {
            hasher.update(&(part.len() as u64).to_le_bytes());
            hasher.update(part);
        }
        Digest(hasher.finalize().to_hex().to_string())
    }

    /// Digest of a value's canonical JSON encoding.
    ///
    /// Values that cannot be encoded (maps with non-string keys) have no
    /// digest, which callers treat as "changed".
    pub fn of_json<T: Serialize + ?Sized>(value: &T) -> Option<Self> {
        match serde_json::to_vec(value) {
            Ok(bytes) => Some(Self::of_bytes(&bytes)),
            Err(err) => {
                tracing::warn!("Could not encode value for checksumming: {}", err);
                None
            }
        }
    }

    /// Digest of document content; text and binary with identical bytes differ
    pub fn of_content(content: &Content) -> Self {
        let tag: &[u8] = if content.is_binary() { b"binary" } else { b"text" };
        Self::of_parts([tag, content.as_bytes()])
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Which part of an object a checksum covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aspect {
    Content,
    Attributes,
    /// Everything about objects that are not split into content and
    /// attributes: configuration, code snippets, document collections
    Other,
}

impl Aspect {
    pub const ALL: [Aspect; 3] = [Aspect::Content, Aspect::Attributes, Aspect::Other];
}

/// An object whose state can be checksummed between runs
pub trait Checksummable {
    /// Key under which checksums of this object are stored
    fn object_ref(&self) -> ObjectRef;

    /// Digest of one aspect, or `None` when the aspect does not apply
    fn digest(&self, aspect: Aspect) -> Option<Digest>;
}

/// A set of identifiers (all items, all layouts) checksummed by membership
#[derive(Debug, Clone)]
pub struct Collection {
    object: ObjectRef,
    members: Vec<String>,
}

impl Collection {
    pub fn new<I, S>(object: ObjectRef, members: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut members: Vec<String> = members.into_iter().map(Into::into).collect();
        members.sort();
        Self { object, members }
    }
}

impl Checksummable for Collection {
    fn object_ref(&self) -> ObjectRef {
        self.object.clone()
    }

    fn digest(&self, aspect: Aspect) -> Option<Digest> {
        match aspect {
            Aspect::Other => Some(Digest::of_parts(self.members.iter().map(|m| m.as_bytes()))),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_is_stable_hex() {
        let a = Digest::of_bytes(b"hello");
        let b = Digest::of_bytes(b"hello");
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 64);
        assert!(a.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_parts_are_length_prefixed() {
        let ab_c = Digest::of_parts([b"ab".as_slice(), b"c".as_slice()]);
        let a_bc = Digest::of_parts([b"a".as_slice(), b"bc".as_slice()]);
        assert_ne!(ab_c, a_bc);
    }

    #[test]
    fn test_content_kind_affects_digest() {
        let text = Digest::of_content(&Content::textual("abc"));
        let binary = Digest::of_content(&Content::binary(b"abc".to_vec()));
        assert_ne!(text, binary);
    }

    #[test]
    fn test_collection_ignores_order() {
        let a = Collection::new(ObjectRef::Items, ["/b.md", "/a.md"]);
        let b = Collection::new(ObjectRef::Items, ["/a.md", "/b.md"]);
        let c = Collection::new(ObjectRef::Items, ["/a.md"]);
        assert_eq!(a.digest(Aspect::Other), b.digest(Aspect::Other));
        assert_ne!(a.digest(Aspect::Other), c.digest(Aspect::Other));
        assert_eq!(a.digest(Aspect::Content), None);
    }
}
