//! Type-safe identifiers for transport entities.
//!
//! Newtype wrappers prevent mixing incompatible IDs at compile time.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`ConnectionId`] | Process-unique connection identity |
//! | [`ListenerToken`] | Handle for removing a change subscriber |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

// ============================================================================
// ConnectionId
// ============================================================================

/// Unique identifier of a [`Connection`](crate::Connection).
///
/// Allocated from a monotonically increasing counter, never zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

impl ConnectionId {
    /// Allocates the next connection ID.
    #[inline]
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Creates an ID from a raw value.
    ///
    /// Returns `None` for zero.
    #[inline]
    #[must_use]
    pub fn from_u64(value: u64) -> Option<Self> {
        (value > 0).then_some(Self(value))
    }

    /// Returns the raw value.
    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// ============================================================================
// ListenerToken
// ============================================================================

/// Token returned when registering a change listener.
///
/// Pass it back to `remove_change_listener` to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerToken(u64);

static NEXT_LISTENER_TOKEN: AtomicU64 = AtomicU64::new(1);

impl ListenerToken {
    /// Allocates the next token.
    #[inline]
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_LISTENER_TOKEN.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ListenerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "token-{}", self.0)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_ids_are_unique() {
        let a = ConnectionId::next();
        let b = ConnectionId::next();
        assert_ne!(a, b);
        assert!(b > a);
    }

    #[test]
    fn test_connection_id_from_u64() {
        assert!(ConnectionId::from_u64(0).is_none());
        let id = ConnectionId::from_u64(42).expect("non-zero");
        assert_eq!(id.as_u64(), 42);
        assert_eq!(id.to_string(), "#42");
    }

    #[test]
    fn test_listener_tokens_are_unique() {
        assert_ne!(ListenerToken::next(), ListenerToken::next());
    }
}
