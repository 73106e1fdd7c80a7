//! Rebuild the site whenever its documents, rules or configuration change.

use super::build::build_with_changes;
use super::{load_config, rules_path};
use anyhow::{Context, Result};
use crossbeam_channel::RecvTimeoutError;
use kiln_core::data_source;
use kiln_core::{collect_changes, ChangeEvent, ChangesListener, ChangesStream};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

/// Quiet period after a change before rebuilding
const DEBOUNCE: Duration = Duration::from_millis(200);

pub fn watch_site(config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;

    if let Err(e) = build_with_changes(config.clone(), Default::default()) {
        eprintln!("Build failed: {:#}", e);
    }

    let (tx, rx) = crossbeam_channel::unbounded::<ChangeEvent>();
    let mut streams = Vec::new();
    for source in data_source::from_config(&config) {
        streams.push(source.item_changes());
        streams.push(source.layout_changes());
    }
    streams.push(lib_changes(vec![
        config_path.to_path_buf(),
        rules_path(&config),
    ]));

    for stream in streams {
        let tx = tx.clone();
        thread::Builder::new()
            .name("kiln-watch".into())
            .spawn(move || {
                for event in stream {
                    if tx.send(event).is_err() {
                        break;
                    }
                }
            })
            .context("Failed to start change forwarder")?;
    }
    drop(tx);

    println!("Watching for changes (Ctrl+C to stop)...");

    while let Ok(first) = rx.recv() {
        let mut events = vec![first];
        loop {
            match rx.recv_timeout(DEBOUNCE) {
                Ok(event) => events.push(event),
                Err(RecvTimeoutError::Timeout) => break,
                Err(RecvTimeoutError::Disconnected) => return Ok(()),
            }
        }
        for event in &events {
            tracing::debug!("Change: {:?}", event);
        }

        let config = match load_config(config_path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("{:#}", e);
                continue;
            }
        };
        if let Err(e) = build_with_changes(config, collect_changes(events)) {
            eprintln!("Build failed: {:#}", e);
        }
    }

    Ok(())
}

/// Changes to files that affect every rep, reported as `lib` events
fn lib_changes(files: Vec<PathBuf>) -> ChangesStream {
    ChangesStream::new(move |listener| {
        if let Err(e) = watch_files(&files, &listener) {
            tracing::warn!("Not watching {:?}: {}", files, e);
        }
    })
}

fn watch_files(files: &[PathBuf], listener: &ChangesListener) -> notify::Result<()> {
    let (tx, rx) = crossbeam_channel::unbounded();
    let mut watcher = RecommendedWatcher::new(
        move |res| {
            let _ = tx.send(res);
        },
        notify::Config::default(),
    )?;

    // Editors often replace files, so watch the directories and filter names
    let mut names: Vec<OsString> = Vec::new();
    for file in files {
        let dir = match file.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        watcher.watch(&dir, RecursiveMode::NonRecursive)?;
        names.extend(file.file_name().map(ToOwned::to_owned));
    }

    while !listener.is_stopped() {
        match rx.recv_timeout(Duration::from_millis(100)) {
            Ok(Ok(event)) => {
                let relevant = event
                    .paths
                    .iter()
                    .any(|path| path.file_name().is_some_and(|name| names.iter().any(|n| n == name)));
                if relevant && !matches!(event.kind, EventKind::Access(_)) {
                    tracing::debug!("{} {:?}", describe_event(&event.kind), event.paths);
                    listener.lib();
                }
            }
            Ok(Err(e)) => tracing::warn!("Watcher error: {}", e),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    Ok(())
}

fn describe_event(kind: &EventKind) -> &'static str {
    use notify::event::ModifyKind;

    match kind {
        EventKind::Create(_) => "create",
        EventKind::Modify(ModifyKind::Name(_)) => "rename",
        EventKind::Modify(_) => "modify",
        EventKind::Remove(_) => "remove",
        _ => "unknown",
    }
}
