//! Connection state and status types.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::identifiers::ConnectionId;

// ============================================================================
// ConnectionState
// ============================================================================

/// Transport-level lifecycle state of a connection.
///
/// `New -> Opening -> Open -> Closing -> Closed`. A failed open returns to
/// `New`; a disconnect before open goes straight to `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// Created, not yet opened.
    #[default]
    New,
    /// Open in progress.
    Opening,
    /// Open; messages flow.
    Open,
    /// Teardown in progress.
    Closing,
    /// Terminal.
    Closed,
}

impl ConnectionState {
    /// Returns `true` for the terminal state.
    #[inline]
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Closed)
    }

    /// Returns the lower-case name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Opening => "opening",
            Self::Open => "open",
            Self::Closing => "closing",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// StateChange
// ============================================================================

/// A state transition published by a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateChange {
    /// Connection that changed.
    pub connection: ConnectionId,
    /// State before the transition.
    pub previous: ConnectionState,
    /// State after the transition.
    pub current: ConnectionState,
}

// ============================================================================
// ActivityLevel
// ============================================================================

/// Replication activity level reported for a listener connection.
///
/// Computed by the replication engine; the listener only passes it through,
/// except for `Connecting`, `Idle` and `Stopped`, which mark accept, open and
/// teardown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ActivityLevel {
    /// Stopped; terminal.
    Stopped,
    /// Offline, waiting to reconnect.
    Offline,
    /// Connecting.
    Connecting,
    /// Connected and idle.
    Idle,
    /// Connected and transferring.
    Busy,
}

impl fmt::Display for ActivityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Stopped => "STOPPED",
            Self::Offline => "OFFLINE",
            Self::Connecting => "CONNECTING",
            Self::Idle => "IDLE",
            Self::Busy => "BUSY",
        };
        f.write_str(name)
    }
}

// ============================================================================
// ConnectionStatus
// ============================================================================

/// Activity level plus the error that accompanied it, if any.
#[derive(Debug, Clone)]
pub struct ConnectionStatus {
    /// Activity level.
    pub activity: ActivityLevel,
    /// Error reported with the level.
    pub error: Option<Error>,
}

impl ConnectionStatus {
    /// Creates a status without an error.
    #[inline]
    #[must_use]
    pub const fn new(activity: ActivityLevel) -> Self {
        Self {
            activity,
            error: None,
        }
    }

    /// Creates a `Stopped` status carrying `error`.
    #[inline]
    #[must_use]
    pub fn stopped(error: Option<Error>) -> Self {
        Self {
            activity: ActivityLevel::Stopped,
            error,
        }
    }

    /// Returns `true` if the level is `Stopped`.
    #[inline]
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.activity == ActivityLevel::Stopped
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_display() {
        assert_eq!(ConnectionState::Closing.to_string(), "closing");
        assert!(ConnectionState::Closed.is_terminal());
        assert!(!ConnectionState::Open.is_terminal());
    }

    #[test]
    fn test_stopped_status() {
        let status = ConnectionStatus::stopped(Some(Error::ConnectionClosed));
        assert!(status.is_stopped());
        assert!(status.error.is_some());
        assert!(!ConnectionStatus::new(ActivityLevel::Idle).is_stopped());
    }

    #[test]
    fn test_activity_display() {
        assert_eq!(ActivityLevel::Connecting.to_string(), "CONNECTING");
    }
}
