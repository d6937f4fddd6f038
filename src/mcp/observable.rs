//! Observable values with explicit subscriptions.
//!
//! Used for the bridge's connection status and last error. A subscriber is
//! called once with the current value when it subscribes, then after every
//! change. Setting an equal value does not notify.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Shared<T> {
    value: T,
    next_id: u64,
    subscribers: Vec<(u64, Callback<T>)>,
}

/// A value plus the callbacks interested in it.
pub struct Observable<T> {
    shared: Arc<Mutex<Shared<T>>>,
}

impl<T> Clone for Observable<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

fn lock<T>(shared: &Mutex<Shared<T>>) -> MutexGuard<'_, Shared<T>> {
    // A panicking subscriber runs outside the lock, so poisoning only
    // happens if `T::clone` panics; the data is still consistent.
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<T: Clone + PartialEq + Send + 'static> Observable<T> {
    /// Creates an observable holding `value`.
    #[must_use]
    pub fn new(value: T) -> Self {
        Self {
            shared: Arc::new(Mutex::new(Shared {
                value,
                next_id: 0,
                subscribers: Vec::new(),
            })),
        }
    }

    /// Returns a copy of the current value.
    #[must_use]
    pub fn get(&self) -> T {
        lock(&self.shared).value.clone()
    }

    /// Replaces the value and notifies subscribers if it changed.
    ///
    /// Returns `true` if the value changed.
    pub fn set(&self, value: T) -> bool {
        let callbacks: Vec<Callback<T>> = {
            let mut shared = lock(&self.shared);
            if shared.value == value {
                return false;
            }
            shared.value = value.clone();
            shared.subscribers.iter().map(|(_, cb)| Arc::clone(cb)).collect()
        };

        for callback in callbacks {
            callback(&value);
        }
        true
    }

    /// Registers `callback`, calling it immediately with the current value.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let callback: Callback<T> = Arc::new(callback);
        let (id, current) = {
            let mut shared = lock(&self.shared);
            let id = shared.next_id;
            shared.next_id += 1;
            shared.subscribers.push((id, Arc::clone(&callback)));
            (id, shared.value.clone())
        };

        callback(&current);

        let weak: Weak<Mutex<Shared<T>>> = Arc::downgrade(&self.shared);
        Subscription {
            remove: Some(Box::new(move || {
                if let Some(shared) = weak.upgrade() {
                    lock(&shared).subscribers.retain(|(sid, _)| *sid != id);
                }
            })),
        }
    }

    /// Number of live subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        lock(&self.shared).subscribers.len()
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Observable<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let shared = self.shared.lock().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("Observable")
            .field("value", &shared.value)
            .field("subscribers", &shared.subscribers.len())
            .finish()
    }
}

/// Handle returned by [`Observable::subscribe`].
///
/// Dropping the handle leaves the subscription in place; call
/// [`Subscription::unsubscribe`] to remove it.
pub struct Subscription {
    remove: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    /// Stops further notifications to this subscriber.
    pub fn unsubscribe(mut self) {
        if let Some(remove) = self.remove.take() {
            remove();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").finish_non_exhaustive()
    }
}
