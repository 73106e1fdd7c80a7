//! Document and snapshot content

use serde::{Deserialize, Serialize};
use std::fmt;

/// Either text (subject to further text filters) or opaque bytes
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Content {
    Textual(String),
    Binary(Vec<u8>),
}

impl Content {
    pub fn textual(text: impl Into<String>) -> Self {
        Content::Textual(text.into())
    }

    pub fn binary(bytes: impl Into<Vec<u8>>) -> Self {
        Content::Binary(bytes.into())
    }

    /// Rebuild content from stored bytes and its binary flag.
    ///
    /// Textual bytes that are not valid UTF-8 are kept as binary rather than
    /// lossily converted.
    pub fn from_bytes(bytes: Vec<u8>, binary: bool) -> Self {
        if binary {
            return Content::Binary(bytes);
        }
        match String::from_utf8(bytes) {
            Ok(text) => Content::Textual(text),
            Err(err) => Content::Binary(err.into_bytes()),
        }
    }

    pub fn is_binary(&self) -> bool {
        matches!(self, Content::Binary(_))
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Content::Textual(text) => text.as_bytes(),
            Content::Binary(bytes) => bytes,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Content::Textual(text) => Some(text),
            Content::Binary(_) => None,
        }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            Content::Textual(text) => text.into_bytes(),
            Content::Binary(bytes) => bytes,
        }
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for Content {
    fn default() -> Self {
        Content::Textual(String::new())
    }
}

impl From<&str> for Content {
    fn from(text: &str) -> Self {
        Content::Textual(text.to_string())
    }
}

impl From<String> for Content {
    fn from(text: String) -> Self {
        Content::Textual(text)
    }
}

impl fmt::Debug for Content {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Content::Textual(text) if text.len() <= 40 => write!(f, "Textual({text:?})"),
            Content::Textual(text) => write!(f, "Textual({} bytes)", text.len()),
            Content::Binary(bytes) => write!(f, "Binary({} bytes)", bytes.len()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_bytes_respects_flag() {
        assert_eq!(
            Content::from_bytes(b"hi".to_vec(), false),
            Content::textual("hi")
        );
        assert!(Content::from_bytes(b"hi".to_vec(), true).is_binary());
        assert!(Content::from_bytes(vec![0xff, 0xfe], false).is_binary());
    }

    #[test]
    fn test_debug_is_abbreviated() {
        let long = Content::textual("x".repeat(100));
        assert_eq!(format!("{long:?}"), "Textual(100 bytes)");
    }
}
