//! Typed subscriber registries with stable unsubscribe tokens.
//!
//! One registry per event keeps payload types checked per event rather
//! than funnelling everything through a string-keyed bus. Subscribers
//! fire synchronously in registration order on the driver task.

use std::sync::{Arc, Mutex, Weak};

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Entries<T> {
    next_token: u64,
    entries: Vec<(u64, Callback<T>)>,
}

/// Registry of callbacks for one event type.
pub struct ListenerSet<T> {
    inner: Arc<Mutex<Entries<T>>>,
}

impl<T> Default for ListenerSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ListenerSet<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Entries {
                next_token: 0,
                entries: Vec::new(),
            })),
        }
    }

    /// Register a callback. The returned [`Subscription`] removes it on
    /// `cancel()`; dropping the subscription keeps it registered.
    pub fn subscribe(&self, callback: impl Fn(&T) + Send + Sync + 'static) -> Subscription
    where
        T: 'static,
    {
        let token = {
            let mut inner = self.inner.lock().expect("listener registry poisoned");
            let token = inner.next_token;
            inner.next_token += 1;
            inner.entries.push((token, Arc::new(callback)));
            token
        };

        let weak: Weak<Mutex<Entries<T>>> = Arc::downgrade(&self.inner);
        Subscription {
            cancel: Some(Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner
                        .lock()
                        .expect("listener registry poisoned")
                        .entries
                        .retain(|(t, _)| *t != token);
                }
            })),
        }
    }

    /// Invoke every subscriber in registration order. The entry list is
    /// snapshotted first so callbacks may subscribe or cancel
    /// reentrantly.
    pub fn notify(&self, value: &T) {
        let snapshot: Vec<Callback<T>> = self
            .inner
            .lock()
            .expect("listener registry poisoned")
            .entries
            .iter()
            .map(|(_, cb)| cb.clone())
            .collect();

        for callback in snapshot {
            callback(value);
        }
    }

    pub fn clear(&self) {
        self.inner
            .lock()
            .expect("listener registry poisoned")
            .entries
            .clear();
    }

    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .expect("listener registry poisoned")
            .entries
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Handle to a registered callback.
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    /// Remove the subscriber from its registry.
    pub fn cancel(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}
