//! Callback registries shared by the session engine and the channel actors.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_LISTENER_ID: AtomicU64 = AtomicU64::new(1);

/// Handle identifying one registered callback.
///
/// Ids are unique for the lifetime of the process, so a handle can pick its id
/// before the owning actor has processed the registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl ListenerId {
    pub fn next() -> Self {
        ListenerId(NEXT_LISTENER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

pub type Callback<T> = Box<dyn FnMut(&T) + Send + 'static>;

struct Entry<T> {
    id: ListenerId,
    once: bool,
    callback: Callback<T>,
}

/// An ordered set of callbacks for one event.
///
/// There is no cap on the number of registrations.
pub struct Listeners<T> {
    entries: Vec<Entry<T>>,
}

impl<T> Listeners<T> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Registers a repeating callback under a caller-chosen id.
    pub fn add(&mut self, id: ListenerId, callback: Callback<T>) {
        self.entries.push(Entry {
            id,
            once: false,
            callback,
        });
    }

    /// Registers a callback that is removed after its first invocation.
    pub fn add_once(&mut self, id: ListenerId, callback: Callback<T>) {
        self.entries.push(Entry {
            id,
            once: true,
            callback,
        });
    }

    pub fn on<F>(&mut self, callback: F) -> ListenerId
    where
        F: FnMut(&T) + Send + 'static,
    {
        let id = ListenerId::next();
        self.add(id, Box::new(callback));
        id
    }

    pub fn once<F>(&mut self, callback: F) -> ListenerId
    where
        F: FnMut(&T) + Send + 'static,
    {
        let id = ListenerId::next();
        self.add_once(id, Box::new(callback));
        id
    }

    /// Returns `true` if a callback was removed.
    pub fn remove(&mut self, id: ListenerId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|entry| entry.id != id);
        before != self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn contains(&self, id: ListenerId) -> bool {
        self.entries.iter().any(|entry| entry.id == id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Invokes every callback in registration order and drops the one-shot
    /// ones. Returns the number of callbacks invoked.
    pub fn emit(&mut self, value: &T) -> usize {
        for entry in self.entries.iter_mut() {
            (entry.callback)(value);
        }
        let invoked = self.entries.len();
        self.entries.retain(|entry| !entry.once);
        invoked
    }
}

impl<T> Default for Listeners<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Listeners<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listeners")
            .field("ids", &self.entries.iter().map(|e| e.id).collect::<Vec<_>>())
            .finish()
    }
}
