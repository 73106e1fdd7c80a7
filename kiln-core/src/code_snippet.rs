//! Code that participates in compilation (rules files, helpers)
//!
//! Any change to a code snippet outdates every rep.

use kiln_incremental::{Aspect, Checksummable, Digest};
use kiln_types::ObjectRef;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeSnippet {
    pub path: String,
    pub data: String,
}

impl CodeSnippet {
    pub fn new(path: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            data: data.into(),
        }
    }

    pub fn from_file(path: &Path) -> std::io::Result<Self> {
        let data = std::fs::read_to_string(path)?;
        Ok(Self::new(path.to_string_lossy(), data))
    }
}

impl Checksummable for CodeSnippet {
    fn object_ref(&self) -> ObjectRef {
        ObjectRef::CodeSnippet(self.path.clone())
    }

    fn digest(&self, aspect: Aspect) -> Option<Digest> {
        match aspect {
            Aspect::Other => Some(Digest::of_bytes(self.data.as_bytes())),
            _ => None,
        }
    }
}
