//! Change streams
//!
//! A data source reports changes to its documents through a [`ChangesStream`].
//! The stream is lazy: its producer starts on a background thread the first
//! time the stream is polled, and hands events over one at a time, so a
//! consumer that stops polling pauses the producer. Stopping the stream runs
//! the producer's stop callback and disconnects it.

use crate::document::DocumentKind;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use kiln_incremental::ExternalChanges;
use kiln_types::{Identifier, ObjectRef};
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    /// Something changed, but the source cannot tell what
    Unknown,
    /// Code that participates in compilation changed
    Lib,
    DocumentAdded(DocumentKind, Identifier),
    DocumentModified(DocumentKind, Identifier),
    DocumentDeleted(DocumentKind, Identifier),
}

impl ChangeEvent {
    pub fn identifier(&self) -> Option<&Identifier> {
        match self {
            ChangeEvent::DocumentAdded(_, id)
            | ChangeEvent::DocumentModified(_, id)
            | ChangeEvent::DocumentDeleted(_, id) => Some(id),
            ChangeEvent::Unknown | ChangeEvent::Lib => None,
        }
    }

    /// Rewrite the identifier of a document event
    pub fn map_identifier(self, f: impl FnOnce(Identifier) -> Identifier) -> Self {
        match self {
            ChangeEvent::DocumentAdded(kind, id) => ChangeEvent::DocumentAdded(kind, f(id)),
            ChangeEvent::DocumentModified(kind, id) => ChangeEvent::DocumentModified(kind, f(id)),
            ChangeEvent::DocumentDeleted(kind, id) => ChangeEvent::DocumentDeleted(kind, f(id)),
            other => other,
        }
    }
}

type StopCallback = Box<dyn FnOnce() + Send>;

#[derive(Default)]
struct StopState {
    stopped: AtomicBool,
    callback: Mutex<Option<StopCallback>>,
}

impl StopState {
    fn stop(&self) {
        let callback = {
            let mut slot = self.callback.lock();
            self.stopped.store(true, Ordering::SeqCst);
            slot.take()
        };
        if let Some(callback) = callback {
            callback();
        }
    }

    /// Keep `callback` for `stop`, or hand it back if already stopped
    fn register(&self, callback: StopCallback) -> Option<StopCallback> {
        let mut slot = self.callback.lock();
        if self.stopped.load(Ordering::SeqCst) {
            return Some(callback);
        }
        *slot = Some(callback);
        None
    }
}

/// Producer side of a change stream
#[derive(Clone)]
pub struct ChangesListener {
    tx: Sender<ChangeEvent>,
    stop: Arc<StopState>,
}

impl fmt::Debug for ChangesListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangesListener")
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

impl ChangesListener {
    fn send(&self, event: ChangeEvent) {
        if self.is_stopped() {
            return;
        }
        // The consumer is gone; nothing left to deliver to
        if self.tx.send(event).is_err() {
            self.stop.stopped.store(true, Ordering::SeqCst);
        }
    }

    pub fn unknown(&self) {
        self.send(ChangeEvent::Unknown);
    }

    pub fn lib(&self) {
        self.send(ChangeEvent::Lib);
    }

    pub fn document_added(&self, kind: DocumentKind, identifiers: impl IntoIterator<Item = Identifier>) {
        for id in identifiers {
            self.send(ChangeEvent::DocumentAdded(kind, id));
        }
    }

    pub fn document_modified(
        &self,
        kind: DocumentKind,
        identifiers: impl IntoIterator<Item = Identifier>,
    ) {
        for id in identifiers {
            self.send(ChangeEvent::DocumentModified(kind, id));
        }
    }

    pub fn document_deleted(
        &self,
        kind: DocumentKind,
        identifiers: impl IntoIterator<Item = Identifier>,
    ) {
        for id in identifiers {
            self.send(ChangeEvent::DocumentDeleted(kind, id));
        }
    }

    /// Register what to do when the consumer stops the stream.
    ///
    /// If the stream was already stopped, the callback runs immediately.
    pub fn to_stop(&self, callback: impl FnOnce() + Send + 'static) {
        if let Some(callback) = self.stop.register(Box::new(callback)) {
            callback();
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.stopped.load(Ordering::SeqCst)
    }
}

type Producer = Box<dyn FnOnce(ChangesListener) + Send>;
type Mapper = Box<dyn Fn(ChangeEvent) -> ChangeEvent + Send>;

/// Consumer side of a change stream
pub struct ChangesStream {
    producer: Option<Producer>,
    receiver: Option<Receiver<ChangeEvent>>,
    stop: Arc<StopState>,
    mapper: Option<Mapper>,
}

impl fmt::Debug for ChangesStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangesStream")
            .field("started", &self.receiver.is_some())
            .field("stopped", &self.stop.stopped.load(Ordering::SeqCst))
            .finish()
    }
}

impl ChangesStream {
    /// A stream whose events come from `producer`, run on its own thread
    pub fn new(producer: impl FnOnce(ChangesListener) + Send + 'static) -> Self {
        Self {
            producer: Some(Box::new(producer)),
            receiver: None,
            stop: Arc::new(StopState::default()),
            mapper: None,
        }
    }

    /// A stream that ends immediately
    pub fn empty() -> Self {
        Self::new(|_| {})
    }

    /// A stream replaying fixed events
    pub fn from_events(events: Vec<ChangeEvent>) -> Self {
        Self::new(move |listener| {
            for event in events {
                if listener.is_stopped() {
                    break;
                }
                listener.send(event);
            }
        })
    }

    /// Transform every event of this stream
    pub fn map(mut self, f: impl Fn(ChangeEvent) -> ChangeEvent + Send + 'static) -> Self {
        let mapper: Mapper = match self.mapper.take() {
            Some(inner) => Box::new(move |event| f(inner(event))),
            None => Box::new(f),
        };
        // `self` is dropped (and stopped) on return, so it must not keep the
        // shared stop state
        let stop = std::mem::take(&mut self.stop);
        Self {
            producer: self.producer.take(),
            receiver: self.receiver.take(),
            stop,
            mapper: Some(mapper),
        }
    }

    fn start(&mut self) {
        let Some(producer) = self.producer.take() else {
            return;
        };
        let (tx, rx) = crossbeam_channel::bounded(0);
        let listener = ChangesListener {
            tx,
            stop: Arc::clone(&self.stop),
        };
        self.receiver = Some(rx);

        let spawned = thread::Builder::new()
            .name("kiln-changes".into())
            .spawn(move || producer(listener));
        if let Err(err) = spawned {
            tracing::warn!("Failed to start change stream: {}", err);
            self.receiver = None;
        }
    }

    fn deliver(&self, event: ChangeEvent) -> ChangeEvent {
        match &self.mapper {
            Some(mapper) => mapper(event),
            None => event,
        }
    }

    /// Wait up to `timeout` for the next event
    pub fn next_timeout(&mut self, timeout: Duration) -> Option<ChangeEvent> {
        self.start();
        let event = match self.receiver.as_ref()?.recv_timeout(timeout) {
            Ok(event) => event,
            Err(RecvTimeoutError::Timeout) => return None,
            Err(RecvTimeoutError::Disconnected) => {
                self.receiver = None;
                return None;
            }
        };
        Some(self.deliver(event))
    }

    /// Stop the producer and disconnect from it
    pub fn stop(&mut self) {
        self.producer = None;
        self.receiver = None;
        self.stop.stop();
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.stopped.load(Ordering::SeqCst)
    }
}

impl Iterator for ChangesStream {
    type Item = ChangeEvent;

    fn next(&mut self) -> Option<ChangeEvent> {
        self.start();
        let event = self.receiver.as_ref()?.recv().ok();
        match event {
            Some(event) => Some(self.deliver(event)),
            None => {
                self.receiver = None;
                None
            }
        }
    }
}

impl Drop for ChangesStream {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Fold change events into the compiler's external-change input
pub fn collect_changes(events: impl IntoIterator<Item = ChangeEvent>) -> ExternalChanges {
    let mut changes = ExternalChanges::default();
    for event in events {
        match event {
            ChangeEvent::Unknown | ChangeEvent::Lib => changes.everything = true,
            ChangeEvent::DocumentAdded(kind, id)
            | ChangeEvent::DocumentModified(kind, id)
            | ChangeEvent::DocumentDeleted(kind, id) => {
                let object = match kind {
                    DocumentKind::Item => ObjectRef::Item(id),
                    DocumentKind::Layout => ObjectRef::Layout(id),
                };
                changes.objects.insert(object);
            }
        }
    }
    changes
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn id(path: &str) -> Identifier {
        Identifier::full(path).unwrap()
    }

    #[test]
    fn test_stream_is_lazy() {
        let started = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&started);
        let mut stream = ChangesStream::new(move |listener| {
            flag.store(true, Ordering::SeqCst);
            listener.lib();
        });

        thread::sleep(Duration::from_millis(20));
        assert!(!started.load(Ordering::SeqCst));

        assert_eq!(stream.next(), Some(ChangeEvent::Lib));
        assert!(started.load(Ordering::SeqCst));
        assert_eq!(stream.next(), None);
    }

    #[test]
    fn test_from_events_and_map() {
        let stream = ChangesStream::from_events(vec![
            ChangeEvent::DocumentAdded(DocumentKind::Item, id("/a.md")),
            ChangeEvent::Unknown,
        ]);
        let mapped = stream.map(|event| {
            event.map_identifier(|id| id.prefix("/blog").unwrap())
        });

        let events: Vec<_> = mapped.collect();
        assert_eq!(
            events,
            vec![
                ChangeEvent::DocumentAdded(DocumentKind::Item, id("/blog/a.md")),
                ChangeEvent::Unknown,
            ]
        );
    }

    #[test]
    fn test_stop_runs_callback() {
        let stops = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&stops);
        let mut stream = ChangesStream::new(move |listener| {
            listener.to_stop(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
            let mut n = 0;
            while !listener.is_stopped() {
                listener.document_modified(DocumentKind::Item, [id(&format!("/{n}.md"))]);
                n += 1;
            }
        });

        assert!(stream.next().is_some());
        stream.stop();
        assert!(stream.is_stopped());
        assert_eq!(stream.next(), None);
        assert_eq!(stops.load(Ordering::SeqCst), 1);

        drop(stream);
        assert_eq!(stops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_stop_racing_registration_runs_callback_once() {
        for _ in 0..50 {
            let stops = Arc::new(AtomicUsize::new(0));
            let counter = Arc::clone(&stops);
            let (ready, wait) = crossbeam_channel::bounded::<()>(1);
            let mut stream = ChangesStream::new(move |listener| {
                let _ = ready.send(());
                listener.to_stop(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                });
            });

            assert_eq!(stream.next_timeout(Duration::from_millis(1)), None);
            wait.recv().unwrap();
            stream.stop();

            // The producer registers either before or after the stop
            let deadline = std::time::Instant::now() + Duration::from_secs(5);
            while stops.load(Ordering::SeqCst) == 0 && std::time::Instant::now() < deadline {
                thread::sleep(Duration::from_millis(1));
            }
            assert_eq!(stops.load(Ordering::SeqCst), 1);
        }
    }

    #[test]
    fn test_register_after_stop_hands_callback_back() {
        let state = StopState::default();
        state.stop();
        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);
        let returned = state.register(Box::new(move || flag.store(true, Ordering::SeqCst)));
        assert!(returned.is_some());
        assert!(!ran.load(Ordering::SeqCst));

        let state = StopState::default();
        assert!(state.register(Box::new(|| {})).is_none());
    }

    #[test]
    fn test_next_timeout() {
        let (release, gate) = crossbeam_channel::bounded::<()>(0);
        let mut stream = ChangesStream::new(move |listener| {
            let _ = gate.recv();
            listener.lib();
        });

        assert_eq!(stream.next_timeout(Duration::from_millis(20)), None);
        release.send(()).unwrap();
        assert_eq!(
            stream.next_timeout(Duration::from_secs(5)),
            Some(ChangeEvent::Lib)
        );
        assert_eq!(stream.next_timeout(Duration::from_secs(5)), None);
    }

    #[test]
    fn test_collect_changes() {
        let changes = collect_changes(vec![
            ChangeEvent::DocumentModified(DocumentKind::Item, id("/a.md")),
            ChangeEvent::DocumentDeleted(DocumentKind::Layout, id("/default.html")),
        ]);
        assert!(!changes.everything);
        assert!(changes.affects(&ObjectRef::Item(id("/a.md"))));
        assert!(changes.affects(&ObjectRef::Layout(id("/default.html"))));
        assert!(!changes.affects(&ObjectRef::Item(id("/default.html"))));

        let changes = collect_changes(vec![ChangeEvent::Lib]);
        assert!(changes.everything);
    }
}
