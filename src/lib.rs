//! Message Endpoint - ordered, paired transport over in-process channels.
//!
//! This library carries a bidirectional replication protocol between two
//! endpoints without an OS socket, reproducing real connection semantics in
//! user code.
//!
//! # Architecture
//!
//! The transport follows an initiator/acceptor model:
//!
//! - **Initiator**: Created from an [`Endpoint`], opens the link, may inject faults
//! - **Acceptor**: Created standalone or by a [`Listener`], joins on pairing
//!
//! Key design principles:
//!
//! - Each [`Connection`] owns one serial worker task ("the wire")
//! - Every operation returns immediately and reports through a one-shot completion
//! - Messages that arrive before open are buffered and flushed in order
//! - Teardown is a handshake: the remote engine acknowledges by closing
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use message_endpoint::{
//!     ChannelSink, ChannelTarget, Endpoint, Listener, ListenerConfiguration,
//!     PairedConnectionFactory, Result,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let (target, mut server_events) = ChannelTarget::new("db");
//!     let listener = Listener::new(ListenerConfiguration::new(Arc::new(target)));
//!
//!     let endpoint = Endpoint::new(listener.clone(), Arc::new(PairedConnectionFactory::new()));
//!     let connection = endpoint.connect()?;
//!
//!     let (sink, _client_events) = ChannelSink::attach(&connection);
//!     connection.open_async(sink).await?;
//!     connection.send_async("hello").await?;
//!
//!     let event = server_events.recv().await;
//!     println!("Acceptor received: {event:?}");
//!
//!     connection.close_async(None).await?;
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`completion`] | One-shot [`Completion`] and [`CloseCompletion`] callbacks |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`fault`] | Fault injection: [`ErrorPolicy`], [`CountedFailure`] |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`notifier`] | Multi-subscriber change broadcast |
//! | [`options`] | Serializable [`TransportOptions`] |
//! | [`protocol`] | Message and status value types |
//! | [`transport`] | Connections, endpoints, listeners |

// ============================================================================
// Modules
// ============================================================================

/// One-shot completion callbacks.
pub mod completion;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Deterministic fault injection.
pub mod fault;

/// Type-safe identifiers.
pub mod identifiers;

/// Multi-subscriber change broadcast.
pub mod notifier;

/// Transport configuration options.
pub mod options;

/// Message and status value types.
pub mod protocol;

/// Paired in-process transport.
///
/// Connections, their serial workers, endpoints, factories and listeners.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Completion types
pub use completion::{CloseCompletion, Completion};

// Error types
pub use error::{Error, Result};

// Fault injection
pub use fault::{CountedFailure, ErrorPolicy, LifecycleLocation, NoFailure};

// Identifier types
pub use identifiers::{ConnectionId, ListenerToken};

// Notification
pub use notifier::{ChangeCallback, ChangeNotifier};

// Configuration
pub use options::{FaultSpec, TransportOptions};

// Protocol types
pub use protocol::{
    ActivityLevel, ConnectionState, ConnectionStatus, Message, ProtocolType, StateChange,
};

// Transport types
pub use transport::{
    ChannelSink, ChannelTarget, Connection, ConnectionFactory, ConnectionRegistry, Endpoint,
    EndpointTarget, Listener, ListenerChange, ListenerConfiguration, PairedConnectionFactory,
    PairedConnectionFactoryBuilder, ReplicationSink, ReplicationTarget, Role, SinkEvent,
    WeakConnection,
};
