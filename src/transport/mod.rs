//! Paired in-process transport.
//!
//! This module carries opaque messages between an initiator and its acceptor
//! without any socket underneath, while keeping the semantics of a real
//! connection: per-connection ordering, asynchronous completions, buffering
//! across open races and a symmetric teardown handshake.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐                          ┌──────────────────┐
//! │ Replication      │                          │ ReplicationTarget│
//! │ engine (sink)    │                          │ (sink per conn)  │
//! │        ▲         │                          │        ▲         │
//! │  Initiator wire  │ ── Accept / Disconnect ─►│  Acceptor wire   │
//! │  (serial task)   │ ◄─ Accept / Disconnect ──│  (serial task)   │
//! └──────────────────┘                          └──────────────────┘
//!        ▲                                               ▲
//!    Endpoint + ConnectionFactory                    Listener
//! ```
//!
//! # Connection Lifecycle
//!
//! 1. `Endpoint::connect` - Factory creates an initiator paired with an acceptor
//! 2. `Connection::open` - Initiator opens; the acceptor joins its `Listener`
//! 3. `Connection::send` - Both sides exchange messages
//! 4. `Connection::close` - Either side tears the link down; the other side's
//!    engine acknowledges
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `connection` | Connection handle, roles and async wrappers |
//! | `endpoint` | Endpoints and connection factories |
//! | `listener` | Listener owning acceptor connections |
//! | `registry` | Test-scoped connection registry |
//! | `sink` | Replication engine contracts and channel adapters |
//! | `wire` | Per-connection serial worker (internal) |

// ============================================================================
// Submodules
// ============================================================================

/// Connection handle and command queue.
pub mod connection;

/// Endpoints and connection factories.
pub mod endpoint;

/// Listener owning acceptor connections.
pub mod listener;

/// Test-scoped connection registry.
pub mod registry;

/// Replication engine contracts.
pub mod sink;

/// Per-connection serial worker.
mod wire;

// ============================================================================
// Re-exports
// ============================================================================

pub use connection::{Connection, Role, WeakConnection};
pub use endpoint::{
    ConnectionCreatedHook, ConnectionFactory, Endpoint, EndpointTarget, PairedConnectionFactory,
    PairedConnectionFactoryBuilder,
};
pub use listener::{Listener, ListenerChange, ListenerConfiguration};
pub use registry::ConnectionRegistry;
pub use sink::{ChannelSink, ChannelTarget, ReplicationSink, ReplicationTarget, SinkEvent};
