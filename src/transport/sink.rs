//! Replication engine contracts.
//!
//! A connection talks to the replication engine above it through exactly two
//! calls on a [`ReplicationSink`]: `receive` for every delivered message and
//! `close` when the link goes away. A [`ReplicationTarget`] is the local
//! collaborator a [`Listener`](super::Listener) routes accepted connections to:
//! an opaque identity plus a per-connection sink factory.
//!
//! # Close Acknowledgement
//!
//! When a sink is closed with a remote disconnect, the engine acknowledges the
//! teardown by calling [`Connection::close`] on the same connection. That
//! acknowledgement is what lets the remote side's own close complete.
//!
//! [`ChannelSink`] and [`ChannelTarget`] forward everything into a tokio channel
//! as [`SinkEvent`]s. They back the integration tests and are a reasonable
//! starting point for an engine that prefers pulling events over callbacks.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::trace;

use crate::completion::CloseCompletion;
use crate::error::Error;
use crate::identifiers::ConnectionId;
use crate::protocol::Message;

use super::connection::{Connection, WeakConnection};

// ============================================================================
// ReplicationSink
// ============================================================================

/// Replication engine end of a connection.
///
/// Called from the connection's worker; implementations must not block.
pub trait ReplicationSink: Send + Sync {
    /// Delivers one message, in send order.
    fn receive(&self, message: Message);

    /// Reports that the link is gone, with the reason if it failed.
    fn close(&self, error: Option<Error>);
}

// ============================================================================
// ReplicationTarget
// ============================================================================

/// Local collaborator that accepted connections are routed to.
pub trait ReplicationTarget: Send + Sync {
    /// Opaque identity of the target.
    fn id(&self) -> &str;

    /// Creates the sink for a newly accepted connection.
    fn attach(&self, connection: &Connection) -> Arc<dyn ReplicationSink>;
}

// ============================================================================
// SinkEvent
// ============================================================================

/// Event forwarded by a [`ChannelSink`].
#[derive(Debug, Clone)]
pub enum SinkEvent {
    /// A message was delivered.
    Received {
        /// Connection the message arrived on.
        connection: ConnectionId,
        /// The message.
        message: Message,
    },
    /// The sink was closed.
    Closed {
        /// Connection that closed.
        connection: ConnectionId,
        /// Reason, if the link failed.
        error: Option<Error>,
    },
}

impl SinkEvent {
    /// Returns the connection the event belongs to.
    #[must_use]
    pub fn connection(&self) -> ConnectionId {
        match self {
            Self::Received { connection, .. } | Self::Closed { connection, .. } => *connection,
        }
    }

    /// Returns the message of a `Received` event.
    #[must_use]
    pub fn message(&self) -> Option<&Message> {
        match self {
            Self::Received { message, .. } => Some(message),
            Self::Closed { .. } => None,
        }
    }
}

// ============================================================================
// ChannelSink
// ============================================================================

/// Sink that forwards events into an unbounded channel.
pub struct ChannelSink {
    /// Connection events are tagged with.
    connection: ConnectionId,
    /// Connection to acknowledge `close` on, if any.
    acknowledge: Option<WeakConnection>,
    /// Event channel.
    event_tx: mpsc::UnboundedSender<SinkEvent>,
}

impl ChannelSink {
    /// Creates a sink for `connection` that acknowledges `close` the way a
    /// replication engine does, by closing the connection.
    #[must_use]
    pub fn attach(connection: &Connection) -> (Arc<Self>, mpsc::UnboundedReceiver<SinkEvent>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let sink = Self {
            connection: connection.id(),
            acknowledge: Some(connection.downgrade()),
            event_tx,
        };
        (Arc::new(sink), event_rx)
    }

    /// Creates a sink that only records events.
    #[must_use]
    pub fn detached(
        connection: ConnectionId,
        event_tx: mpsc::UnboundedSender<SinkEvent>,
    ) -> Arc<Self> {
        Arc::new(Self {
            connection,
            acknowledge: None,
            event_tx,
        })
    }

    /// Forwards an event, ignoring a dropped receiver.
    fn forward(&self, event: SinkEvent) {
        if self.event_tx.send(event).is_err() {
            trace!(connection = %self.connection, "Sink event receiver dropped");
        }
    }
}

impl ReplicationSink for ChannelSink {
    fn receive(&self, message: Message) {
        self.forward(SinkEvent::Received {
            connection: self.connection,
            message,
        });
    }

    fn close(&self, error: Option<Error>) {
        self.forward(SinkEvent::Closed {
            connection: self.connection,
            error: error.clone(),
        });

        if let Some(connection) = self.acknowledge.as_ref().and_then(WeakConnection::upgrade) {
            connection.close(error, CloseCompletion::noop());
        }
    }
}

impl fmt::Debug for ChannelSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelSink")
            .field("connection", &self.connection)
            .field("acknowledges", &self.acknowledge.is_some())
            .finish()
    }
}

// ============================================================================
// ChannelTarget
// ============================================================================

/// Target whose per-connection sinks share one event channel.
#[derive(Debug, Clone)]
pub struct ChannelTarget {
    /// Target identity.
    id: String,
    /// Shared event channel.
    event_tx: mpsc::UnboundedSender<SinkEvent>,
}

impl ChannelTarget {
    /// Creates a target and the receiver for all of its sinks' events.
    #[must_use]
    pub fn new(id: impl Into<String>) -> (Self, mpsc::UnboundedReceiver<SinkEvent>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let target = Self {
            id: id.into(),
            event_tx,
        };
        (target, event_rx)
    }
}

impl ReplicationTarget for ChannelTarget {
    fn id(&self) -> &str {
        &self.id
    }

    fn attach(&self, connection: &Connection) -> Arc<dyn ReplicationSink> {
        ChannelSink::detached(connection.id(), self.event_tx.clone())
    }
}

// ============================================================================
// Tests
// ============================================================================
