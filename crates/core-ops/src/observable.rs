//! Mask-filtered observer registry with ticket-scoped subscriptions.
//!
//! A ticket unsubscribes its callback when dropped; unticketed observers
//! live as long as the observable.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

type Callback = Arc<dyn Fn() + Send + Sync>;

struct Entry {
    id: u64,
    mask: u64,
    callback: Callback,
}

#[derive(Default)]
struct Inner {
    entries: Mutex<Vec<Entry>>,
}

pub struct Observable {
    inner: Arc<Inner>,
    next_id: AtomicU64,
}

impl Default for Observable {
    fn default() -> Self {
        Self::new()
    }
}

impl Observable {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner::default()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn observe(&self, mask: u64, callback: impl Fn() + Send + Sync + 'static) -> ObservationTicket {
        let id = self.insert(mask, callback);
        ObservationTicket {
            inner: Arc::downgrade(&self.inner),
            id,
        }
    }

    pub fn observe_unticketed(&self, mask: u64, callback: impl Fn() + Send + Sync + 'static) {
        self.insert(mask, callback);
    }

    fn insert(&self, mask: u64, callback: impl Fn() + Send + Sync + 'static) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.entries.lock().unwrap().push(Entry {
            id,
            mask,
            callback: Arc::new(callback),
        });
        id
    }

    /// Invokes every observer whose mask intersects `events`. Callbacks
    /// run outside the registry lock.
    pub fn fire(&self, events: u64) {
        let callbacks: Vec<Callback> = self
            .inner
            .entries
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.mask & events != 0)
            .map(|e| Arc::clone(&e.callback))
            .collect();
        for callback in callbacks {
            callback();
        }
    }
}

/// Subscription handle; dropping it removes the observer.
#[must_use = "dropping the ticket unsubscribes immediately"]
pub struct ObservationTicket {
    inner: Weak<Inner>,
    id: u64,
}

impl Drop for ObservationTicket {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.upgrade() {
            inner.entries.lock().unwrap().retain(|e| e.id != self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn fires_only_matching_masks() {
        let observable = Observable::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let hits2 = Arc::clone(&hits);
        observable.observe_unticketed(0b01, move || {
            hits2.fetch_add(1, Ordering::SeqCst);
        });
        observable.fire(0b10);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        observable.fire(0b11);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dropping_a_ticket_unsubscribes() {
        let observable = Observable::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let hits2 = Arc::clone(&hits);
        let ticket = observable.observe(u64::MAX, move || {
            hits2.fetch_add(1, Ordering::SeqCst);
        });
        observable.fire(1);
        drop(ticket);
        observable.fire(1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
