//! Notification channel observed by the host
//!
//! One emitter per viewer. Handlers are called synchronously on the emitting
//! thread; channel subscribers receive a clone of every event.

use std::sync::{Arc, Mutex, PoisonError};

use flume::{Receiver, Sender};

use crate::pdf::{PasswordReason, PasswordResponder, SharedError};

#[derive(Clone, Debug)]
pub enum Event {
    /// Document parsed and ready for page requests
    Loaded,
    /// Page count of the current document, `None` while nothing is loaded
    NumPages(Option<usize>),
    /// 1-based number of the page that finished loading
    PageLoaded(usize),
    PageSize { width: f64, height: f64, scale: f64 },
    /// Load progress in `0..=1`
    Progress(f64),
    /// The document is encrypted. Loading waits until a copy of `responder`
    /// answers, every copy is dropped, or the session is destroyed.
    Password {
        responder: PasswordResponder,
        reason: PasswordReason,
    },
    /// An internal link to this 1-based page was followed
    LinkClicked(usize),
    Error(SharedError),
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::Loaded => "loaded",
            Event::NumPages(_) => "num-pages",
            Event::PageLoaded(_) => "page-loaded",
            Event::PageSize { .. } => "page-size",
            Event::Progress(_) => "progress",
            Event::Password { .. } => "password",
            Event::LinkClicked(_) => "link-clicked",
            Event::Error(_) => "error",
        }
    }
}

/// Identifies a registered handler for [`Emitter::off`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

type Handler = Arc<dyn Fn(&Event) + Send + Sync>;

#[derive(Default)]
struct Registry {
    next_id: u64,
    handlers: Vec<(HandlerId, Handler)>,
    channels: Vec<Sender<Event>>,
}

/// One-to-many event fan-out. Clones share the same registry.
#[derive(Clone, Default)]
pub struct Emitter {
    registry: Arc<Mutex<Registry>>,
}

impl Emitter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler
    pub fn on(&self, handler: impl Fn(&Event) + Send + Sync + 'static) -> HandlerId {
        let mut registry = self.lock();
        let id = HandlerId(registry.next_id);
        registry.next_id += 1;
        registry.handlers.push((id, Arc::new(handler)));
        id
    }

    /// Remove a handler; returns false if it was not registered
    pub fn off(&self, id: HandlerId) -> bool {
        let mut registry = self.lock();
        let before = registry.handlers.len();
        registry.handlers.retain(|(hid, _)| *hid != id);
        registry.handlers.len() != before
    }

    /// Receive every future event on a channel.
    ///
    /// Queued [`Event::Password`] events keep their responder alive, so a
    /// receiver left unread holds a password prompt open until the session is
    /// destroyed.
    #[must_use]
    pub fn subscribe(&self) -> Receiver<Event> {
        let (tx, rx) = flume::unbounded();
        self.lock().channels.push(tx);
        rx
    }

    pub fn emit(&self, event: Event) {
        log::debug!("emit {}", event.name());

        // Handlers run outside the lock so they may register or emit themselves
        let handlers: Vec<Handler> = {
            let mut registry = self.lock();
            registry
                .channels
                .retain(|tx| tx.send(event.clone()).is_ok());
            registry.handlers.iter().map(|(_, h)| h.clone()).collect()
        };

        for handler in handlers {
            handler(&event);
        }
    }

    pub fn error(&self, err: impl Into<SharedError>) {
        let err = err.into();
        log::error!("{err}");
        self.emit(Event::Error(err));
    }

    pub fn handler_count(&self) -> usize {
        self.lock().handlers.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for Emitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let registry = self.lock();
        f.debug_struct("Emitter")
            .field("handlers", &registry.handlers.len())
            .field("channels", &registry.channels.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::pdf::ViewerError;

    #[test]
    fn handlers_and_channels_all_receive() {
        let emitter = Emitter::new();
        let hits = Arc::new(AtomicUsize::new(0));
        for _ in 0..2 {
            let hits = hits.clone();
            emitter.on(move |_| {
                hits.fetch_add(1, Ordering::SeqCst);
            });
        }
        let rx = emitter.subscribe();

        emitter.emit(Event::PageLoaded(3));

        assert_eq!(hits.load(Ordering::SeqCst), 2);
        assert!(matches!(rx.try_recv(), Ok(Event::PageLoaded(3))));
    }

    #[test]
    fn off_removes_handler() {
        let emitter = Emitter::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let id = emitter.on(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(emitter.off(id));
        assert!(!emitter.off(id));
        emitter.emit(Event::Loaded);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn dropped_subscribers_are_pruned() {
        let emitter = Emitter::new();
        let rx = emitter.subscribe();
        drop(rx);
        emitter.emit(Event::Loaded);
        assert!(format!("{emitter:?}").contains("channels: 0"));
    }

    #[test]
    fn handler_may_emit_reentrantly() {
        let emitter = Emitter::new();
        let inner = emitter.clone();
        emitter.on(move |event| {
            if matches!(event, Event::Loaded) {
                inner.emit(Event::NumPages(Some(1)));
            }
        });
        let rx = emitter.subscribe();

        emitter.emit(Event::Loaded);

        let names: Vec<_> = rx.try_iter().map(|e| e.name()).collect();
        assert_eq!(names, vec!["loaded", "num-pages"]);
    }

    #[test]
    fn error_wraps_into_event() {
        let emitter = Emitter::new();
        let rx = emitter.subscribe();
        emitter.error(ViewerError::print_failure("no printer"));
        match rx.try_recv() {
            Ok(Event::Error(err)) => assert!(err.to_string().contains("no printer")),
            other => panic!("unexpected {other:?}"),
        }
    }
}
