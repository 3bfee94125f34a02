//! Multi-subscriber change broadcast.
//!
//! [`ChangeNotifier`] fans a change value out to every registered subscriber.
//! Subscribers are either callbacks or unbounded channels. A subscriber added
//! later only sees later changes; nothing is replayed.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tokio::sync::mpsc;
use tracing::trace;

use crate::identifiers::ListenerToken;

// ============================================================================
// Types
// ============================================================================

/// Change callback type.
pub type ChangeCallback<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// A registered subscriber.
enum Subscriber<T> {
    /// Invoked synchronously by the posting thread.
    Callback(ChangeCallback<T>),
    /// Receives a clone of every change.
    Channel(mpsc::UnboundedSender<T>),
}

impl<T> Clone for Subscriber<T> {
    fn clone(&self) -> Self {
        match self {
            Self::Callback(callback) => Self::Callback(Arc::clone(callback)),
            Self::Channel(tx) => Self::Channel(tx.clone()),
        }
    }
}

// ============================================================================
// ChangeNotifier
// ============================================================================

/// Broadcasts changes to registered subscribers.
///
/// # Thread Safety
///
/// Subscribers may be added, removed and notified from any thread. Callbacks
/// run outside the internal lock, so a callback may itself add or remove
/// subscribers.
pub struct ChangeNotifier<T> {
    /// Registered subscribers by token.
    subscribers: Mutex<FxHashMap<ListenerToken, Subscriber<T>>>,
}

impl<T> Default for ChangeNotifier<T> {
    fn default() -> Self {
        Self {
            subscribers: Mutex::new(FxHashMap::default()),
        }
    }
}

impl<T> fmt::Debug for ChangeNotifier<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeNotifier")
            .field("subscribers", &self.subscribers.lock().len())
            .finish()
    }
}

impl<T: Clone + Send + 'static> ChangeNotifier<T> {
    /// Creates a notifier with no subscribers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a callback subscriber.
    pub fn add_change_listener<F>(&self, callback: F) -> ListenerToken
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let token = ListenerToken::next();
        self.subscribers
            .lock()
            .insert(token, Subscriber::Callback(Arc::new(callback)));
        token
    }

    /// Registers a channel subscriber.
    ///
    /// The subscriber is dropped automatically once the receiver is dropped.
    pub fn add_change_channel(&self) -> (ListenerToken, mpsc::UnboundedReceiver<T>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let token = ListenerToken::next();
        self.subscribers.lock().insert(token, Subscriber::Channel(tx));
        (token, rx)
    }

    /// Removes a subscriber.
    ///
    /// Returns `false` if the token was unknown.
    pub fn remove_change_listener(&self, token: ListenerToken) -> bool {
        self.subscribers.lock().remove(&token).is_some()
    }

    /// Returns the number of subscribers.
    #[inline]
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    /// Delivers `change` to every current subscriber.
    pub fn post_change(&self, change: T) {
        let subscribers: Vec<(ListenerToken, Subscriber<T>)> = self
            .subscribers
            .lock()
            .iter()
            .map(|(token, subscriber)| (*token, subscriber.clone()))
            .collect();

        let mut closed = Vec::new();
        for (token, subscriber) in subscribers {
            match subscriber {
                Subscriber::Callback(callback) => callback(&change),
                Subscriber::Channel(tx) => {
                    if tx.send(change.clone()).is_err() {
                        closed.push(token);
                    }
                }
            }
        }

        if !closed.is_empty() {
            trace!(count = closed.len(), "Pruning closed change channels");
            let mut map = self.subscribers.lock();
            for token in closed {
                map.remove(&token);
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_callbacks_receive_changes() {
        let notifier = ChangeNotifier::<u32>::new();
        let total = Arc::new(AtomicUsize::new(0));

        let sum = Arc::clone(&total);
        notifier.add_change_listener(move |v| {
            sum.fetch_add(*v as usize, Ordering::SeqCst);
        });

        notifier.post_change(3);
        notifier.post_change(4);
        assert_eq!(total.load(Ordering::SeqCst), 7);
    }

    #[test]
    fn test_remove_listener() {
        let notifier = ChangeNotifier::<u32>::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&calls);
        let token = notifier.add_change_listener(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        notifier.post_change(1);
        assert!(notifier.remove_change_listener(token));
        assert!(!notifier.remove_change_listener(token));
        notifier.post_change(2);

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(notifier.listener_count(), 0);
    }

    #[test]
    fn test_no_replay_for_late_subscribers() {
        let notifier = ChangeNotifier::<&'static str>::new();
        notifier.post_change("early");

        let (_token, mut rx) = notifier.add_change_channel();
        notifier.post_change("late");

        assert_eq!(rx.try_recv().ok(), Some("late"));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_dropped_channel_is_pruned() {
        let notifier = ChangeNotifier::<u8>::new();
        let (_token, rx) = notifier.add_change_channel();
        assert_eq!(notifier.listener_count(), 1);

        drop(rx);
        notifier.post_change(1);
        assert_eq!(notifier.listener_count(), 0);
    }

    #[test]
    fn test_callback_may_unsubscribe_itself() {
        let notifier = Arc::new(ChangeNotifier::<u8>::new());
        let slot = Arc::new(Mutex::new(None::<ListenerToken>));

        let inner = Arc::clone(&notifier);
        let token_slot = Arc::clone(&slot);
        let token = notifier.add_change_listener(move |_| {
            if let Some(token) = token_slot.lock().take() {
                inner.remove_change_listener(token);
            }
        });
        *slot.lock() = Some(token);

        notifier.post_change(1);
        assert_eq!(notifier.listener_count(), 0);
    }
}
