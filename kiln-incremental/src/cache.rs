//! Content-addressed cache of compiled snapshots
//!
//! The index maps each rep and snapshot name to the BLAKE3 digest of the
//! snapshot's bytes; the bytes themselves live in
//! `<dir>/compiled_content/<digest>.bin`. Blobs are verified against their
//! name when read, so a damaged file is a cache miss rather than stale output.
//!
//! Whether a cached entry may be used is decided by the outdatedness checker,
//! not by the cache: entries are keyed by rep and snapshot only.

use crate::digest::Digest;
use crate::error::StoreError;
use crate::persist::{write_atomic, StoreFile};
use dashmap::DashMap;
use kiln_types::{Content, RepKey};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

const VERSION: u32 = 1;
const BLOB_DIR: &str = "compiled_content";
const BLOB_EXT: &str = "bin";

/// Pointer from the index to a stored blob
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct BlobRef {
    digest: Digest,
    binary: bool,
    size: u64,
}

#[derive(Debug, Serialize, Deserialize)]
struct IndexRecord {
    rep: RepKey,
    snapshots: BTreeMap<String, BlobRef>,
}

/// Statistics about cache usage
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Snapshots whose stored bytes changed during this run
    pub writes: u64,
    pub entries: usize,
    pub total_size_bytes: u64,
}

impl CacheStats {
    /// Get cache hit rate (0.0 to 1.0)
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

impl std::fmt::Display for CacheStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Compiled content cache:")?;
        writeln!(
            f,
            "  Hits: {} | Misses: {} | Hit Rate: {:.1}%",
            self.hits,
            self.misses,
            self.hit_rate() * 100.0
        )?;
        writeln!(f, "  Writes: {}", self.writes)?;
        writeln!(f, "  Entries: {}", self.entries)?;
        writeln!(
            f,
            "  Total Size: {:.2} MB",
            self.total_size_bytes as f64 / 1_048_576.0
        )?;
        Ok(())
    }
}

/// Persistent compiled content cache
#[derive(Debug)]
pub struct CompiledContentCache {
    file: StoreFile,
    blob_dir: PathBuf,

    /// rep -> snapshot name -> blob
    index: DashMap<RepKey, BTreeMap<String, BlobRef>>,

    /// Blobs stored during this run and not yet written to disk
    pending: DashMap<Digest, Vec<u8>>,

    hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
}

impl CompiledContentCache {
    pub fn new(dir: &Path) -> Self {
        Self {
            file: StoreFile::new(dir, "compiled_content", VERSION),
            blob_dir: dir.join(BLOB_DIR),
            index: DashMap::new(),
            pending: DashMap::new(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            writes: AtomicU64::new(0),
        }
    }

    /// Load the index; blobs are read lazily
    pub fn load(&mut self) {
        let records: Vec<IndexRecord> = self.file.load();
        self.index.clear();
        self.pending.clear();
        for record in records {
            self.index.insert(record.rep, record.snapshots);
        }
        tracing::debug!("Loaded compiled content index with {} reps", self.index.len());
    }

    fn blob_path(&self, digest: &Digest) -> PathBuf {
        self.blob_dir.join(format!("{digest}.{BLOB_EXT}"))
    }

    fn blob_available(&self, blob: &BlobRef) -> bool {
        self.pending.contains_key(&blob.digest) || self.blob_path(&blob.digest).is_file()
    }

    fn read_blob(&self, blob: &BlobRef) -> Option<Vec<u8>> {
        if let Some(bytes) = self.pending.get(&blob.digest) {
            return Some(bytes.clone());
        }

        let path = self.blob_path(&blob.digest);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) => {
                tracing::warn!("Compiled content blob {:?} is unreadable: {}", path, err);
                return None;
            }
        };

        if Digest::of_bytes(&bytes) != blob.digest {
            tracing::warn!("Compiled content blob {:?} is corrupt", path);
            return None;
        }
        Some(bytes)
    }

    /// Whether an entry exists for every named snapshot of a rep
    pub fn contains_all<'a>(&self, rep: &RepKey, snapshots: impl IntoIterator<Item = &'a str>) -> bool {
        let Some(entry) = self.index.get(rep) else {
            return false;
        };
        snapshots.into_iter().all(|name| {
            entry
                .get(name)
                .is_some_and(|blob| self.blob_available(blob))
        })
    }

    /// Cached content of one snapshot
    pub fn fetch(&self, rep: &RepKey, snapshot: &str) -> Option<Content> {
        let blob = self
            .index
            .get(rep)
            .and_then(|entry| entry.get(snapshot).cloned());

        let content = blob.and_then(|blob| {
            self.read_blob(&blob)
                .map(|bytes| Content::from_bytes(bytes, blob.binary))
        });

        match content {
            Some(content) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(content)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Cached content of every snapshot of a rep, or `None` if any is
    /// missing or damaged
    pub fn fetch_all(&self, rep: &RepKey) -> Option<BTreeMap<String, Content>> {
        let names: Vec<String> = self.index.get(rep)?.keys().cloned().collect();
        let mut snapshots = BTreeMap::new();
        for name in names {
            let content = self.fetch(rep, &name)?;
            snapshots.insert(name, content);
        }
        Some(snapshots)
    }

    /// Store one snapshot. Storing identical content again is a no-op.
    pub fn store(&self, rep: &RepKey, snapshot: &str, content: &Content) {
        let digest = Digest::of_bytes(content.as_bytes());
        let blob = BlobRef {
            digest: digest.clone(),
            binary: content.is_binary(),
            size: content.len() as u64,
        };

        let mut entry = self.index.entry(rep.clone()).or_default();
        if entry.get(snapshot) == Some(&blob) && self.blob_available(&blob) {
            return;
        }

        if !self.blob_path(&digest).is_file() {
            self.pending
                .entry(digest)
                .or_insert_with(|| content.as_bytes().to_vec());
        }
        entry.insert(snapshot.to_string(), blob);
        self.writes.fetch_add(1, Ordering::Relaxed);
    }

    /// Replace all snapshots of a rep
    pub fn store_all(&self, rep: &RepKey, snapshots: &BTreeMap<String, Content>) {
        for (name, content) in snapshots {
            self.store(rep, name, content);
        }
        if let Some(mut entry) = self.index.get_mut(rep) {
            entry.retain(|name, _| snapshots.contains_key(name));
        }
    }

    /// Drop entries for reps the predicate rejects
    pub fn prune(&self, mut keep: impl FnMut(&RepKey) -> bool) {
        self.index.retain(|rep, _| keep(rep));
    }

    pub fn stats(&self) -> CacheStats {
        let mut total_size_bytes = 0;
        let mut entries = 0;
        for entry in self.index.iter() {
            entries += entry.len();
            total_size_bytes += entry.values().map(|blob| blob.size).sum::<u64>();
        }
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            entries,
            total_size_bytes,
        }
    }

    /// Write pending blobs and the index, then delete blobs nothing refers to
    pub fn save(&self) -> Result<(), StoreError> {
        let referenced: HashSet<Digest> = self
            .index
            .iter()
            .flat_map(|entry| {
                entry
                    .values()
                    .map(|blob| blob.digest.clone())
                    .collect::<Vec<_>>()
            })
            .collect();

        for pending in self.pending.iter() {
            if referenced.contains(pending.key()) {
                write_atomic(&self.blob_path(pending.key()), pending.value())?;
            }
        }
        self.pending.clear();

        let mut records: Vec<IndexRecord> = self
            .index
            .iter()
            .map(|entry| IndexRecord {
                rep: entry.key().clone(),
                snapshots: entry.value().clone(),
            })
            .collect();
        records.sort_by(|a, b| a.rep.cmp(&b.rep));
        self.file.save(&records)?;

        self.collect_garbage(&referenced);
        Ok(())
    }

    fn collect_garbage(&self, referenced: &HashSet<Digest>) {
        let entries = match fs::read_dir(&self.blob_dir) {
            Ok(entries) => entries,
            Err(_) => return,
        };

        let live: HashSet<&str> = referenced.iter().map(Digest::as_str).collect();
        let mut removed = 0;
        for entry in entries.flatten() {
            let path = entry.path();
            let is_blob = path.extension().is_some_and(|ext| ext == BLOB_EXT);
            let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
            if is_blob && !live.contains(stem) {
                match fs::remove_file(&path) {
                    Ok(()) => removed += 1,
                    Err(err) => tracing::warn!("Failed to remove stale blob {:?}: {}", path, err),
                }
            }
        }
        if removed > 0 {
            tracing::debug!("Removed {} unreferenced compiled content blobs", removed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_types::Identifier;

    fn rep(path: &str) -> RepKey {
        RepKey::new(Identifier::full(path).unwrap(), "default")
    }

    #[test]
    fn test_store_and_fetch() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CompiledContentCache::new(dir.path());

        cache.store(&rep("/a.md"), "last", &Content::textual("<p>hi</p>"));
        assert_eq!(
            cache.fetch(&rep("/a.md"), "last"),
            Some(Content::textual("<p>hi</p>"))
        );
        assert_eq!(cache.fetch(&rep("/a.md"), "pre"), None);

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.writes, 1);
    }

    #[test]
    fn test_store_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CompiledContentCache::new(dir.path());
        let content = Content::binary(vec![1, 2, 3]);

        cache.store(&rep("/a.png"), "last", &content);
        cache.store(&rep("/a.png"), "last", &content);
        assert_eq!(cache.stats().writes, 1);
        assert_eq!(cache.fetch(&rep("/a.png"), "last"), Some(content));
    }

    #[test]
    fn test_persists_across_runs() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CompiledContentCache::new(dir.path());
        cache.store(&rep("/a.md"), "last", &Content::textual("done"));
        cache.save().unwrap();

        let mut cache = CompiledContentCache::new(dir.path());
        cache.load();
        assert!(cache.contains_all(&rep("/a.md"), ["last"]));
        assert_eq!(cache.fetch(&rep("/a.md"), "last"), Some(Content::textual("done")));

        cache.store(&rep("/a.md"), "last", &Content::textual("done"));
        assert_eq!(cache.stats().writes, 0);
    }

    #[test]
    fn test_corrupt_blob_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CompiledContentCache::new(dir.path());
        cache.store(&rep("/a.md"), "last", &Content::textual("original"));
        cache.save().unwrap();

        let digest = Digest::of_bytes(b"original");
        fs::write(cache.blob_path(&digest), b"tampered").unwrap();

        let mut cache = CompiledContentCache::new(dir.path());
        cache.load();
        assert_eq!(cache.fetch(&rep("/a.md"), "last"), None);
        assert_eq!(cache.fetch_all(&rep("/a.md")), None);
    }

    #[test]
    fn test_prune_and_garbage_collection() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CompiledContentCache::new(dir.path());
        cache.store(&rep("/a.md"), "last", &Content::textual("a"));
        cache.store(&rep("/b.md"), "last", &Content::textual("b"));
        cache.save().unwrap();

        cache.prune(|r| r == &rep("/a.md"));
        cache.save().unwrap();

        assert!(cache.blob_path(&Digest::of_bytes(b"a")).is_file());
        assert!(!cache.blob_path(&Digest::of_bytes(b"b")).exists());
        assert_eq!(cache.stats().entries, 1);
    }

    #[test]
    fn test_store_all_drops_stale_snapshots() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CompiledContentCache::new(dir.path());
        cache.store(&rep("/a.md"), "pre", &Content::textual("x"));

        let mut snapshots = BTreeMap::new();
        snapshots.insert("last".to_string(), Content::textual("y"));
        cache.store_all(&rep("/a.md"), &snapshots);

        assert_eq!(cache.fetch_all(&rep("/a.md")), Some(snapshots));
    }
}
