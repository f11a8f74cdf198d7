use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::warn;

pub type ListenerId = u64;

type Listener<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Registry<T> {
    next_id: ListenerId,
    listeners: Vec<(ListenerId, Listener<T>)>,
}

pub struct ListenerRegistry<T> {
    inner: Arc<Mutex<Registry<T>>>,
}

impl<T> Clone for ListenerRegistry<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: 'static> Default for ListenerRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: 'static> ListenerRegistry<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Registry {
                next_id: 1,
                listeners: Vec::new(),
            })),
        }
    }

    pub fn add<F>(&self, listener: F) -> Subscription<T>
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let mut registry = self.inner.lock();
        let id = registry.next_id;
        registry.next_id += 1;
        registry.listeners.push((id, Arc::new(listener)));

        Subscription {
            id,
            registry: Arc::downgrade(&self.inner),
        }
    }

    pub fn remove(&self, id: ListenerId) -> bool {
        let mut registry = self.inner.lock();
        let before = registry.listeners.len();
        registry.listeners.retain(|(listener_id, _)| *listener_id != id);
        registry.listeners.len() != before
    }

    pub fn len(&self) -> usize {
        self.inner.lock().listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn notify(&self, value: &T) -> usize {
        let listeners: Vec<(ListenerId, Listener<T>)> = self.inner.lock().listeners.clone();

        listeners
            .iter()
            .filter(|(id, listener)| !invoke_isolated(*id, listener.as_ref(), value))
            .count()
    }

    pub fn notify_one(&self, id: ListenerId, value: &T) -> bool {
        let listener = self
            .inner
            .lock()
            .listeners
            .iter()
            .find(|(listener_id, _)| *listener_id == id)
            .map(|(_, listener)| listener.clone());

        match listener {
            Some(listener) => invoke_isolated(id, listener.as_ref(), value),
            None => false,
        }
    }
}

fn invoke_isolated<T>(id: ListenerId, listener: &(dyn Fn(&T) + Send + Sync), value: &T) -> bool {
    match panic::catch_unwind(AssertUnwindSafe(|| listener(value))) {
        Ok(()) => true,
        Err(_) => {
            warn!(listener_id = id, "listener panicked; continuing with the rest");
            false
        }
    }
}

/// Handle returned by `add`. Dropping it keeps the listener registered;
/// call [`Subscription::unsubscribe`] to remove it.
pub struct Subscription<T> {
    id: ListenerId,
    registry: Weak<Mutex<Registry<T>>>,
}

impl<T> Subscription<T> {
    pub fn id(&self) -> ListenerId {
        self.id
    }

    pub fn unsubscribe(self) -> bool {
        match self.registry.upgrade() {
            Some(registry) => {
                let mut registry = registry.lock();
                let before = registry.listeners.len();
                registry.listeners.retain(|(id, _)| *id != self.id);
                registry.listeners.len() != before
            }
            None => false,
        }
    }
}
