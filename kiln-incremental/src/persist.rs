//! Versioned store files
//!
//! Each store is a JSON envelope `{ "version": N, "data": ... }` at
//! `<dir>/<kind>.json`. Loading never fails: a missing file, unparseable data
//! or a different version all produce the default (empty) value, which makes
//! the compiler treat everything as changed.

use crate::error::StoreError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

#[derive(Serialize)]
struct EnvelopeRef<'a, T> {
    version: u32,
    data: &'a T,
}

#[derive(Deserialize)]
struct Envelope {
    version: u32,
    data: serde_json::Value,
}

/// Location and format version of one persisted store
#[derive(Debug, Clone)]
pub struct StoreFile {
    path: PathBuf,
    kind: &'static str,
    version: u32,
}

impl StoreFile {
    pub fn new(dir: &Path, kind: &'static str, version: u32) -> Self {
        Self {
            path: dir.join(format!("{kind}.json")),
            kind,
            version,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn kind(&self) -> &'static str {
        self.kind
    }

    /// Load the stored data, or the default when it is unusable
    pub fn load<T: DeserializeOwned + Default>(&self) -> T {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                tracing::debug!(store = self.kind, "No stored data at {:?}", self.path);
                return T::default();
            }
            Err(err) => {
                tracing::warn!(store = self.kind, "Failed to read {:?}: {}", self.path, err);
                return T::default();
            }
        };

        let envelope = match serde_json::from_slice::<Envelope>(&bytes) {
            Ok(envelope) => envelope,
            Err(err) => {
                tracing::warn!(store = self.kind, "Failed to parse {:?}: {}", self.path, err);
                return T::default();
            }
        };

        if envelope.version != self.version {
            tracing::warn!(
                store = self.kind,
                "Ignoring {:?}: version {} does not match {}",
                self.path,
                envelope.version,
                self.version
            );
            return T::default();
        }

        match serde_json::from_value(envelope.data) {
            Ok(data) => data,
            Err(err) => {
                tracing::warn!(store = self.kind, "Failed to decode {:?}: {}", self.path, err);
                T::default()
            }
        }
    }

    /// Persist data atomically
    pub fn save<T: Serialize>(&self, data: &T) -> Result<(), StoreError> {
        let envelope = EnvelopeRef {
            version: self.version,
            data,
        };
        let json = serde_json::to_vec(&envelope).map_err(|source| StoreError::Serialize {
            kind: self.kind,
            source,
        })?;
        write_atomic(&self.path, &json)
    }
}

/// Sibling a file is written to before being renamed into place
pub fn tmp_path(path: &Path) -> PathBuf {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    PathBuf::from(tmp)
}

/// Write a file through a temporary sibling and a rename, so readers see
/// either the old or the new bytes and never a partial write
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| StoreError::CreateDir {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let tmp = tmp_path(path);
    fs::write(&tmp, bytes).map_err(|source| StoreError::Write {
        path: tmp.clone(),
        source,
    })?;
    fs::rename(&tmp, path).map_err(|source| StoreError::Write {
        path: path.to_path_buf(),
        source,
    })
}
