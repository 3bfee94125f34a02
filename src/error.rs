//! Error types for the message endpoint transport.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use message_endpoint::{Result, Error};
//!
//! async fn example(connection: &Connection) -> Result<()> {
//!     connection.send_async("hello").await?;
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Lifecycle faults | [`Error::Connect`], [`Error::Send`], [`Error::Receive`], [`Error::Close`] |
//! | Connection | [`Error::ConnectionClosed`], [`Error::InvalidState`] |
//! | Factory / Listener | [`Error::TooManyConnections`], [`Error::ListenerStopped`] |
//! | Configuration | [`Error::Config`], [`Error::Json`] |
//! | Execution | [`Error::ChannelClosed`] |
//!
//! Errors are `Clone`: one error value is reported to the caller's completion,
//! forwarded to the peer's disconnect and handed to the sink's close.

// ============================================================================
// Imports
// ============================================================================

use std::result::Result as StdResult;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::oneshot::error::RecvError;

use crate::fault::LifecycleLocation;
use crate::protocol::ConnectionState;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Each variant includes relevant context for debugging.
#[derive(Error, Debug, Clone)]
pub enum Error {
    // ========================================================================
    // Lifecycle Faults
    // ========================================================================
    /// Opening the connection failed.
    ///
    /// Reported through the `open` completion. The connection never becomes open.
    #[error("Connect failed: {message}")]
    Connect {
        /// Description of the failure.
        message: String,
        /// Whether the upper layer may retry.
        recoverable: bool,
    },

    /// Sending a message failed.
    ///
    /// Reported through the `send` completion; the connection is torn down.
    #[error("Send failed: {message}")]
    Send {
        /// Description of the failure.
        message: String,
        /// Whether the upper layer may retry.
        recoverable: bool,
    },

    /// Receiving a message failed.
    ///
    /// Never reported to a caller. Escalated by closing the sink with this error.
    #[error("Receive failed: {message}")]
    Receive {
        /// Description of the failure.
        message: String,
        /// Whether the upper layer may retry.
        recoverable: bool,
    },

    /// Closing the connection failed.
    ///
    /// Reported to the peer as the disconnect reason.
    #[error("Close failed: {message}")]
    Close {
        /// Description of the failure.
        message: String,
        /// Whether the upper layer may retry.
        recoverable: bool,
    },

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// Connection closed or its worker stopped.
    ///
    /// Returned when an operation is rejected or abandoned during teardown.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Operation not valid in the connection's current state.
    #[error("Cannot {operation} while connection is {state}")]
    InvalidState {
        /// The rejected operation.
        operation: &'static str,
        /// State at the time of the call.
        state: ConnectionState,
    },

    // ========================================================================
    // Factory / Listener Errors
    // ========================================================================
    /// The connection factory reached its connection cap.
    #[error("Too many connections: {attempted} (limit {limit})")]
    TooManyConnections {
        /// Configured maximum.
        limit: usize,
        /// Connection number that was attempted.
        attempted: usize,
    },

    /// The listener has been stopped and accepts no more connections.
    #[error("Listener stopped")]
    ListenerStopped,

    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when an endpoint, factory or options value is invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(Arc<serde_json::Error>),

    // ========================================================================
    // Execution Errors
    // ========================================================================
    /// Channel receive error.
    #[error("Channel closed")]
    ChannelClosed(#[from] RecvError),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(Arc::new(err))
    }
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates the fault error for a lifecycle location.
    #[must_use]
    pub fn fault(location: LifecycleLocation, message: impl Into<String>, recoverable: bool) -> Self {
        let message = message.into();
        match location {
            LifecycleLocation::Connect => Self::Connect { message, recoverable },
            LifecycleLocation::Send => Self::Send { message, recoverable },
            LifecycleLocation::Receive => Self::Receive { message, recoverable },
            LifecycleLocation::Close => Self::Close { message, recoverable },
        }
    }

    /// Creates a connect error.
    #[inline]
    pub fn connect(message: impl Into<String>, recoverable: bool) -> Self {
        Self::fault(LifecycleLocation::Connect, message, recoverable)
    }

    /// Creates a send error.
    #[inline]
    pub fn send(message: impl Into<String>, recoverable: bool) -> Self {
        Self::fault(LifecycleLocation::Send, message, recoverable)
    }

    /// Creates a receive error.
    #[inline]
    pub fn receive(message: impl Into<String>, recoverable: bool) -> Self {
        Self::fault(LifecycleLocation::Receive, message, recoverable)
    }

    /// Creates a close error.
    #[inline]
    pub fn close(message: impl Into<String>, recoverable: bool) -> Self {
        Self::fault(LifecycleLocation::Close, message, recoverable)
    }

    /// Creates an invalid state error.
    #[inline]
    pub fn invalid_state(operation: &'static str, state: ConnectionState) -> Self {
        Self::InvalidState { operation, state }
    }

    /// Creates a too many connections error.
    #[inline]
    pub fn too_many_connections(limit: usize, attempted: usize) -> Self {
        Self::TooManyConnections { limit, attempted }
    }

    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns the lifecycle location of a fault error.
    #[must_use]
    pub fn location(&self) -> Option<LifecycleLocation> {
        match self {
            Self::Connect { .. } => Some(LifecycleLocation::Connect),
            Self::Send { .. } => Some(LifecycleLocation::Send),
            Self::Receive { .. } => Some(LifecycleLocation::Receive),
            Self::Close { .. } => Some(LifecycleLocation::Close),
            _ => None,
        }
    }

    /// Returns `true` if this is a lifecycle fault.
    #[inline]
    #[must_use]
    pub fn is_fault(&self) -> bool {
        self.location().is_some()
    }

    /// Returns `true` if this is a connection error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Connect { .. } | Self::ConnectionClosed | Self::ChannelClosed(_)
        )
    }

    /// Returns `true` if this error is recoverable.
    ///
    /// Advisory only: the transport tears the connection down either way.
    #[inline]
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Connect { recoverable, .. }
            | Self::Send { recoverable, .. }
            | Self::Receive { recoverable, .. }
            | Self::Close { recoverable, .. } => *recoverable,
            _ => false,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::connect("peer unreachable", false);
        assert_eq!(err.to_string(), "Connect failed: peer unreachable");
    }

    #[test]
    fn test_invalid_state_display() {
        let err = Error::invalid_state("send", ConnectionState::New);
        assert_eq!(err.to_string(), "Cannot send while connection is new");
    }

    #[test]
    fn test_fault_by_location() {
        for location in LifecycleLocation::ALL {
            let err = Error::fault(location, "boom", true);
            assert_eq!(err.location(), Some(location));
            assert!(err.is_fault());
            assert!(err.is_recoverable());
        }
    }

    #[test]
    fn test_is_recoverable() {
        assert!(Error::send("x", true).is_recoverable());
        assert!(!Error::send("x", false).is_recoverable());
        assert!(!Error::ConnectionClosed.is_recoverable());
        assert!(!Error::config("x").is_recoverable());
    }

    #[test]
    fn test_is_connection_error() {
        assert!(Error::connect("x", true).is_connection_error());
        assert!(Error::ConnectionClosed.is_connection_error());
        assert!(!Error::ListenerStopped.is_connection_error());
    }

    #[test]
    fn test_too_many_connections_display() {
        let err = Error::too_many_connections(2, 3);
        assert_eq!(err.to_string(), "Too many connections: 3 (limit 2)");
        assert!(err.location().is_none());
    }

    #[test]
    fn test_from_json_error() {
        let json_err = serde_json::from_str::<String>("invalid").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Json(_)));
    }
}
