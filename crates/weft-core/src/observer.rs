//! Observer registries
//!
//! Each component owns its own registry. Emission iterates over a snapshot
//! of the registered callbacks taken without holding the lock, so callbacks
//! may subscribe or unsubscribe while an event is being delivered.

use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

type Callback<E> = Arc<dyn Fn(&E) + Send + Sync>;

struct Registry<E> {
    next_id: u64,
    callbacks: Vec<(u64, Callback<E>)>,
}

/// Instance-owned list of event callbacks
pub struct Observers<E> {
    registry: Arc<Mutex<Registry<E>>>,
}

impl<E: 'static> Observers<E> {
    pub fn new() -> Self {
        Observers {
            registry: Arc::new(Mutex::new(Registry {
                next_id: 0,
                callbacks: Vec::new(),
            })),
        }
    }

    /// Register a callback. It stays registered until the returned handle
    /// is used to unsubscribe.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        let id = {
            let mut registry = self.registry.lock();
            let id = registry.next_id;
            registry.next_id += 1;
            registry.callbacks.push((id, Arc::new(callback)));
            id
        };

        let weak: Weak<Mutex<Registry<E>>> = Arc::downgrade(&self.registry);
        Subscription {
            cancel: Some(Box::new(move || {
                if let Some(registry) = weak.upgrade() {
                    registry.lock().callbacks.retain(|(i, _)| *i != id);
                }
            })),
        }
    }

    /// Deliver an event to every callback registered at the time of the call
    pub fn emit(&self, event: &E) {
        let snapshot: Vec<Callback<E>> = self
            .registry
            .lock()
            .callbacks
            .iter()
            .map(|(_, cb)| Arc::clone(cb))
            .collect();

        for callback in snapshot {
            callback(event);
        }
    }

    pub fn len(&self) -> usize {
        self.registry.lock().callbacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<E: 'static> Default for Observers<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> Clone for Observers<E> {
    fn clone(&self) -> Self {
        Observers {
            registry: Arc::clone(&self.registry),
        }
    }
}

impl<E> fmt::Debug for Observers<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observers")
            .field("count", &self.registry.lock().callbacks.len())
            .finish()
    }
}

/// Handle returned by [`Observers::subscribe`].
///
/// Dropping the handle leaves the callback registered.
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    pub fn unsubscribe(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_emit_reaches_all_observers() {
        let observers = Observers::<u32>::new();
        let total = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let total = Arc::clone(&total);
            let _sub = observers.subscribe(move |n| {
                total.fetch_add(*n as usize, Ordering::SeqCst);
            });
        }

        observers.emit(&2);
        assert_eq!(total.load(Ordering::SeqCst), 6);
    }

    #[test]
    fn test_unsubscribe() {
        let observers = Observers::<()>::new();
        let count = Arc::new(AtomicUsize::new(0));

        let c = Arc::clone(&count);
        let sub = observers.subscribe(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        observers.emit(&());
        sub.unsubscribe();
        observers.emit(&());

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(observers.is_empty());
    }

    #[test]
    fn test_unsubscribe_from_inside_callback() {
        let observers = Observers::<()>::new();
        let count = Arc::new(AtomicUsize::new(0));
        let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));

        let c = Arc::clone(&count);
        let s = Arc::clone(&slot);
        let sub = observers.subscribe(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
            if let Some(sub) = s.lock().take() {
                sub.unsubscribe();
            }
        });
        *slot.lock() = Some(sub);

        observers.emit(&());
        observers.emit(&());
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_subscribe_during_emit_takes_effect_next_time() {
        let observers = Observers::<()>::new();
        let count = Arc::new(AtomicUsize::new(0));

        let inner = observers.clone();
        let c = Arc::clone(&count);
        let _sub = observers.subscribe(move |_| {
            let c = Arc::clone(&c);
            let _late = inner.subscribe(move |_| {
                c.fetch_add(1, Ordering::SeqCst);
            });
        });

        observers.emit(&());
        assert_eq!(count.load(Ordering::SeqCst), 0);
        observers.emit(&());
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
