//! Deterministic fault injection.
//!
//! An [`ErrorPolicy`] decides, per [`LifecycleLocation`], whether an Initiator
//! connection fails an operation. Policies are owned by a single connection and
//! only touched from that connection's worker, so they need no locking.
//!
//! | Policy | Behavior |
//! |--------|----------|
//! | [`NoFailure`] | Never fails (default) |
//! | [`CountedFailure`] | Fails at one location while `occurrences < total` |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::Error;

// ============================================================================
// LifecycleLocation
// ============================================================================

/// Point in the connection lifecycle where a fault may be injected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LifecycleLocation {
    /// Opening the connection.
    Connect,
    /// Sending a message.
    Send,
    /// Delivering a received message to the sink.
    Receive,
    /// Closing the connection.
    Close,
}

impl LifecycleLocation {
    /// All locations, in lifecycle order.
    pub const ALL: [Self; 4] = [Self::Connect, Self::Send, Self::Receive, Self::Close];

    /// Returns the upper-case name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Connect => "CONNECT",
            Self::Send => "SEND",
            Self::Receive => "RECEIVE",
            Self::Close => "CLOSE",
        }
    }
}

impl fmt::Display for LifecycleLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// ErrorPolicy
// ============================================================================

/// Pluggable fault injector consulted by Initiator connections.
pub trait ErrorPolicy: Send + fmt::Debug {
    /// Returns `true` if the operation at `location` should fail.
    fn should_fail(&self, location: LifecycleLocation) -> bool;

    /// Produces the error for a failing operation and records the occurrence.
    fn make_error(&mut self, location: LifecycleLocation) -> Error;
}

// ============================================================================
// NoFailure
// ============================================================================

/// Policy that never fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NoFailure;

impl ErrorPolicy for NoFailure {
    fn should_fail(&self, _location: LifecycleLocation) -> bool {
        false
    }

    fn make_error(&mut self, location: LifecycleLocation) -> Error {
        Error::fault(location, "no failure configured", false)
    }
}

// ============================================================================
// CountedFailure
// ============================================================================

/// Fails at one location for the first `total` occurrences.
///
/// `total = 1` fails once then succeeds; [`CountedFailure::always`] never stops
/// failing. The counter belongs to this instance: cloning a configured policy
/// for a fresh connection starts from the clone's own count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountedFailure {
    /// Location that fails.
    location: LifecycleLocation,
    /// Number of failures to inject.
    total: u32,
    /// Recoverable flag attached to produced errors.
    recoverable: bool,
    /// Failures injected so far.
    occurrences: u32,
}

impl CountedFailure {
    /// Fails the first `total` operations at `location`.
    #[must_use]
    pub const fn times(location: LifecycleLocation, total: u32) -> Self {
        Self {
            location,
            total,
            recoverable: false,
            occurrences: 0,
        }
    }

    /// Fails the first operation at `location`, then passes.
    #[inline]
    #[must_use]
    pub const fn once(location: LifecycleLocation) -> Self {
        Self::times(location, 1)
    }

    /// Fails every operation at `location`.
    #[inline]
    #[must_use]
    pub const fn always(location: LifecycleLocation) -> Self {
        Self::times(location, u32::MAX)
    }

    /// Sets the recoverable flag of produced errors.
    #[inline]
    #[must_use]
    pub const fn recoverable(mut self, recoverable: bool) -> Self {
        self.recoverable = recoverable;
        self
    }

    /// Returns the failing location.
    #[inline]
    #[must_use]
    pub const fn location(&self) -> LifecycleLocation {
        self.location
    }

    /// Returns the number of failures injected so far.
    #[inline]
    #[must_use]
    pub const fn occurrences(&self) -> u32 {
        self.occurrences
    }

    /// Returns `true` if this policy never stops failing.
    #[inline]
    #[must_use]
    pub const fn is_permanent(&self) -> bool {
        self.total == u32::MAX
    }
}

impl ErrorPolicy for CountedFailure {
    fn should_fail(&self, location: LifecycleLocation) -> bool {
        self.occurrences < self.total && location == self.location
    }

    fn make_error(&mut self, location: LifecycleLocation) -> Error {
        self.occurrences = self.occurrences.saturating_add(1);
        Error::fault(
            location,
            format!("injected {location} failure"),
            self.recoverable,
        )
    }
}

// ============================================================================
// Tests
// ============================================================================
