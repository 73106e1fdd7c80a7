use super::{DataSource, DataSourceError};
use crate::changes::{ChangesListener, ChangesStream};
use crate::document::{Document, DocumentKind};
use crate::frontmatter::parse_frontmatter;
use crossbeam_channel::RecvTimeoutError;
use kiln_types::{Attributes, Content, Identifier};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use walkdir::WalkDir;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Loads items and layouts from two directory trees.
///
/// A file's identifier is its path relative to the tree root. Files with a
/// text extension are read as text and may start with YAML frontmatter;
/// everything else is binary.
#[derive(Debug, Clone)]
pub struct FilesystemDataSource {
    content_dir: PathBuf,
    layouts_dir: PathBuf,
    text_extensions: Vec<String>,
}

impl FilesystemDataSource {
    pub fn new(content_dir: PathBuf, layouts_dir: PathBuf, text_extensions: Vec<String>) -> Self {
        Self {
            content_dir,
            layouts_dir,
            text_extensions,
        }
    }

    fn is_text(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| {
                self.text_extensions
                    .iter()
                    .any(|known| known.eq_ignore_ascii_case(ext))
            })
    }

    fn load_dir(&self, dir: &Path, kind: DocumentKind) -> Result<Vec<Document>, DataSourceError> {
        if !dir.is_dir() {
            tracing::debug!("{} directory {:?} does not exist", kind, dir);
            return Ok(Vec::new());
        }

        let mut documents = Vec::new();
        for entry in WalkDir::new(dir).sort_by_file_name() {
            let entry = entry?;
            if !entry.file_type().is_file() || is_ignored(entry.path()) {
                continue;
            }
            documents.push(self.load_file(dir, entry.path(), kind)?);
        }

        tracing::debug!("Loaded {} {}s from {:?}", documents.len(), kind, dir);
        Ok(documents)
    }

    fn load_file(
        &self,
        root: &Path,
        path: &Path,
        kind: DocumentKind,
    ) -> Result<Document, DataSourceError> {
        let identifier = identifier_for(root, path)?;
        let bytes = fs::read(path).map_err(|source| DataSourceError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let (content, attributes) = if self.is_text(path) {
            match String::from_utf8(bytes) {
                Ok(text) => {
                    let (attributes, body) =
                        parse_frontmatter(&text).map_err(|source| DataSourceError::Frontmatter {
                            path: path.to_path_buf(),
                            source,
                        })?;
                    (Content::Textual(body), attributes)
                }
                Err(err) => {
                    tracing::warn!("{:?} is not valid UTF-8; loading it as binary", path);
                    (Content::Binary(err.into_bytes()), Attributes::new())
                }
            }
        } else {
            (Content::Binary(bytes), Attributes::new())
        };

        Ok(Document::new(kind, identifier, content, attributes))
    }

    fn watch(&self, dir: PathBuf, kind: DocumentKind) -> ChangesStream {
        ChangesStream::new(move |listener| watch_dir(&dir, kind, &listener))
    }
}

impl DataSource for FilesystemDataSource {
    fn name(&self) -> &str {
        "filesystem"
    }

    fn items(&self) -> Result<Vec<Document>, DataSourceError> {
        self.load_dir(&self.content_dir, DocumentKind::Item)
    }

    fn layouts(&self) -> Result<Vec<Document>, DataSourceError> {
        self.load_dir(&self.layouts_dir, DocumentKind::Layout)
    }

    fn item_changes(&self) -> ChangesStream {
        self.watch(self.content_dir.clone(), DocumentKind::Item)
    }

    fn layout_changes(&self) -> ChangesStream {
        self.watch(self.layouts_dir.clone(), DocumentKind::Layout)
    }
}

/// Editor backups and lock files
fn is_ignored(path: &Path) -> bool {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();
    name.ends_with('~') || name.starts_with(".#") || name.ends_with(".swp")
}

fn identifier_for(root: &Path, path: &Path) -> Result<Identifier, DataSourceError> {
    let relative = path.strip_prefix(root).unwrap_or(path);
    let joined = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/");
    Ok(Identifier::full(&format!("/{joined}"))?)
}

fn watch_dir(dir: &Path, kind: DocumentKind, listener: &ChangesListener) {
    let (tx, rx) = crossbeam_channel::unbounded();
    let mut watcher = match RecommendedWatcher::new(
        move |res| {
            let _ = tx.send(res);
        },
        notify::Config::default(),
    ) {
        Ok(watcher) => watcher,
        Err(err) => {
            tracing::warn!("Failed to initialize watcher: {}", err);
            return;
        }
    };
    if let Err(err) = watcher.watch(dir, RecursiveMode::Recursive) {
        tracing::warn!("Failed to watch {:?}: {}", dir, err);
        return;
    }
    tracing::debug!("Watching {:?} for {} changes", dir, kind);

    while !listener.is_stopped() {
        match rx.recv_timeout(POLL_INTERVAL) {
            Ok(Ok(event)) => dispatch(dir, kind, &event, listener),
            Ok(Err(err)) => {
                tracing::warn!("Watcher error: {}", err);
                listener.unknown();
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
}

fn dispatch(dir: &Path, kind: DocumentKind, event: &notify::Event, listener: &ChangesListener) {
    use notify::event::ModifyKind;

    for path in &event.paths {
        if is_ignored(path) {
            continue;
        }
        let Ok(identifier) = identifier_for(dir, path) else {
            listener.unknown();
            continue;
        };
        match event.kind {
            EventKind::Create(_) => listener.document_added(kind, [identifier]),
            EventKind::Modify(ModifyKind::Name(_)) => {
                if path.exists() {
                    listener.document_added(kind, [identifier]);
                } else {
                    listener.document_deleted(kind, [identifier]);
                }
            }
            EventKind::Modify(_) => listener.document_modified(kind, [identifier]),
            EventKind::Remove(_) => listener.document_deleted(kind, [identifier]),
            EventKind::Access(_) => {}
            EventKind::Any | EventKind::Other => listener.unknown(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(path: &Path, contents: &[u8]) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    fn source(root: &Path) -> FilesystemDataSource {
        FilesystemDataSource::new(
            root.join("content"),
            root.join("layouts"),
            vec!["md".into(), "html".into()],
        )
    }

    #[test]
    fn test_loads_items_with_frontmatter() {
        let dir = tempfile::tempdir().unwrap();
        write(
            &dir.path().join("content/posts/hello.md"),
            b"---\ntitle: Hello\n---\nBody\n",
        );
        write(&dir.path().join("content/logo.png"), &[0x89, 0x50, 0x4e, 0x47]);
        write(&dir.path().join("content/notes.md~"), b"backup");

        let items = source(dir.path()).items().unwrap();
        let ids: Vec<_> = items.iter().map(|d| d.identifier().as_str()).collect();
        assert_eq!(ids, vec!["/logo.png", "/posts/hello.md"]);

        let hello = &items[1];
        assert_eq!(hello.content().as_text(), Some("Body\n"));
        assert_eq!(hello.attribute("title").and_then(|v| v.as_str()), Some("Hello"));
        assert!(items[0].content().is_binary());
    }

    #[test]
    fn test_missing_directories_are_empty() {
        let dir = tempfile::tempdir().unwrap();
        let source = source(dir.path());
        assert!(source.items().unwrap().is_empty());
        assert!(source.layouts().unwrap().is_empty());
    }

    #[test]
    fn test_layouts_are_layouts() {
        let dir = tempfile::tempdir().unwrap();
        write(&dir.path().join("layouts/default.html"), b"<main>{{ content }}</main>");

        let layouts = source(dir.path()).layouts().unwrap();
        assert_eq!(layouts.len(), 1);
        assert_eq!(layouts[0].kind(), DocumentKind::Layout);
        assert_eq!(layouts[0].identifier().as_str(), "/default.html");
    }

    #[test]
    fn test_invalid_frontmatter_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        write(&dir.path().join("content/bad.md"), b"---\n- a\n- b\n---\nBody");
        assert!(matches!(
            source(dir.path()).items(),
            Err(DataSourceError::Frontmatter { .. })
        ));
    }
}
