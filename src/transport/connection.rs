//! Connection handle and command queue.
//!
//! A [`Connection`] is a cheap, cloneable handle to one end of a paired
//! in-process link. Every operation is turned into a `Command` and pushed onto
//! the connection's unbounded command channel; the connection's worker task
//! (the `wire` module) drains the channel one command at a time. This
//! gives every connection head-of-line ordering without any locking inside the
//! state machine.
//!
//! # Roles
//!
//! | Role | Created by | Fault injection | Peer reference |
//! |------|------------|-----------------|----------------|
//! | [`Role::Initiator`] | [`ConnectionFactory`](super::ConnectionFactory) | consults its [`ErrorPolicy`] | strong |
//! | [`Role::Acceptor`] | [`Connection::acceptor`] or a [`Listener`](super::Listener) | never | weak, set on pairing |
//!
//! # Example
//!
//! ```ignore
//! let acceptor = Connection::acceptor("server");
//! let connection = endpoint.connect()?;
//!
//! let (sink, mut events) = ChannelSink::attach(&connection);
//! connection.open_async(sink).await?;
//! connection.send_async("hello").await?;
//! connection.close_async(None).await?;
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::{trace, warn};

use crate::completion::{CloseCompletion, Completion};
use crate::error::{Error, Result};
use crate::fault::{ErrorPolicy, NoFailure};
use crate::identifiers::{ConnectionId, ListenerToken};
use crate::notifier::ChangeNotifier;
use crate::protocol::{ConnectionState, Message, StateChange};

use super::listener::WeakListener;
use super::sink::ReplicationSink;
use super::wire::{Peer, Wire};

// ============================================================================
// Role
// ============================================================================

/// Which end of the link a connection is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Dialing side; opens the link and pairs with its acceptor.
    Initiator,
    /// Listening side; created in response to an inbound open.
    Acceptor,
}

impl Role {
    /// Returns `true` if this role consults its error policy.
    #[inline]
    #[must_use]
    pub const fn injects_faults(self) -> bool {
        matches!(self, Self::Initiator)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Initiator => f.write_str("initiator"),
            Self::Acceptor => f.write_str("acceptor"),
        }
    }
}

// ============================================================================
// Command
// ============================================================================

/// Work item processed by a connection's worker.
pub(crate) enum Command {
    /// Open against a replication sink.
    Open {
        sink: Arc<dyn ReplicationSink>,
        completion: Completion,
    },
    /// Send bytes to the peer.
    Send {
        data: Vec<u8>,
        completion: Completion,
    },
    /// Local, graceful close.
    Close {
        reason: Option<Error>,
        completion: CloseCompletion,
    },
    /// Bytes pushed by the peer.
    Accept { message: Message },
    /// Remote teardown pushed by the peer.
    Disconnect {
        error: Option<Error>,
        completion: CloseCompletion,
    },
    /// The initiator at the other end finished opening.
    ClientOpened { client: WeakConnection },
    /// The peer acknowledged our disconnect.
    TeardownComplete,
    /// Stop the worker.
    Terminate,
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open { .. } => f.write_str("Open"),
            Self::Send { data, .. } => write!(f, "Send({} bytes)", data.len()),
            Self::Close { reason, .. } => write!(f, "Close({reason:?})"),
            Self::Accept { message } => write!(f, "Accept({} bytes)", message.len()),
            Self::Disconnect { error, .. } => write!(f, "Disconnect({error:?})"),
            Self::ClientOpened { client } => write!(f, "ClientOpened({})", client.id()),
            Self::TeardownComplete => f.write_str("TeardownComplete"),
            Self::Terminate => f.write_str("Terminate"),
        }
    }
}

// ============================================================================
// Shared
// ============================================================================

/// State readable from any handle, written only by the worker.
pub(crate) struct Shared {
    /// Current lifecycle state.
    pub(crate) state: RwLock<ConnectionState>,
    /// Last fault or disconnect reason.
    pub(crate) last_error: RwLock<Option<Error>>,
    /// Paired connection, once known.
    pub(crate) peer: RwLock<Option<ConnectionId>>,
    /// State change subscribers.
    pub(crate) notifier: ChangeNotifier<StateChange>,
}

impl Shared {
    fn new(peer: Option<ConnectionId>) -> Self {
        Self {
            state: RwLock::new(ConnectionState::New),
            last_error: RwLock::new(None),
            peer: RwLock::new(peer),
            notifier: ChangeNotifier::new(),
        }
    }
}

// ============================================================================
// ConnectionInner
// ============================================================================

struct ConnectionInner {
    id: ConnectionId,
    role: Role,
    name: String,
    command_tx: mpsc::UnboundedSender<Command>,
    shared: Arc<Shared>,
}

impl Drop for ConnectionInner {
    fn drop(&mut self) {
        let state = *self.shared.state.read();
        if !matches!(state, ConnectionState::New | ConnectionState::Closed) {
            warn!(
                connection = %self.id,
                role = %self.role,
                name = %self.name,
                %state,
                "Connection released without being closed"
            );
        }
    }
}

// ============================================================================
// Connection
// ============================================================================

/// Handle to one end of a paired in-process link.
///
/// All operations return immediately and report through a completion invoked
/// on the connection's worker, in submission order.
///
/// # Thread Safety
///
/// `Connection` is `Send + Sync`; clones share the same worker.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

// ============================================================================
// Connection - Constructors
// ============================================================================

impl Connection {
    /// Creates a standalone acceptor.
    ///
    /// Inbound messages are buffered until [`open`](Self::open) is called.
    /// Requires a tokio runtime.
    #[must_use]
    pub fn acceptor(name: impl Into<String>) -> Self {
        Self::spawn(Role::Acceptor, name.into(), Box::new(NoFailure), None, None)
    }

    /// Creates an acceptor bound to a listener.
    pub(crate) fn listener_acceptor(name: String, listener: WeakListener) -> Self {
        Self::spawn(Role::Acceptor, name, Box::new(NoFailure), None, Some(listener))
    }

    /// Creates an initiator paired with `acceptor`.
    pub(crate) fn initiator(
        name: String,
        acceptor: Connection,
        policy: Box<dyn ErrorPolicy>,
    ) -> Self {
        Self::spawn(Role::Initiator, name, policy, Some(acceptor), None)
    }

    /// Spawns the worker and returns the handle.
    fn spawn(
        role: Role,
        name: String,
        policy: Box<dyn ErrorPolicy>,
        peer: Option<Connection>,
        listener: Option<WeakListener>,
    ) -> Self {
        let id = ConnectionId::next();
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared::new(peer.as_ref().map(Connection::id)));

        let connection = Self {
            inner: Arc::new(ConnectionInner {
                id,
                role,
                name,
                command_tx,
                shared: Arc::clone(&shared),
            }),
        };

        let wire = Wire::new(
            connection.downgrade(),
            role,
            policy,
            peer.map(Peer::Strong),
            listener,
            shared,
        );
        tokio::spawn(wire.run(command_rx));

        connection
    }
}

// ============================================================================
// Connection - Accessors
// ============================================================================

impl Connection {
    /// Returns the connection id.
    #[inline]
    #[must_use]
    pub fn id(&self) -> ConnectionId {
        self.inner.id
    }

    /// Returns the role.
    #[inline]
    #[must_use]
    pub fn role(&self) -> Role {
        self.inner.role
    }

    /// Returns the name given at construction.
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Returns the current state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.inner.shared.state.read()
    }

    /// Returns the last injected fault or disconnect reason.
    #[must_use]
    pub fn last_error(&self) -> Option<Error> {
        self.inner.shared.last_error.read().clone()
    }

    /// Returns the paired connection's id, once paired.
    #[must_use]
    pub fn peer_id(&self) -> Option<ConnectionId> {
        *self.inner.shared.peer.read()
    }

    /// Returns `true` if the connection is open.
    #[inline]
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// Creates a weak handle.
    #[must_use]
    pub fn downgrade(&self) -> WeakConnection {
        WeakConnection {
            id: self.inner.id,
            inner: Arc::downgrade(&self.inner),
        }
    }
}

// ============================================================================
// Connection - Operations
// ============================================================================

impl Connection {
    /// Opens the connection against `sink`.
    ///
    /// Completes with the injected connect fault, or with
    /// [`Error::InvalidState`] if the connection is not new. Messages buffered
    /// before the open are delivered right after the completion fires.
    pub fn open(&self, sink: Arc<dyn ReplicationSink>, completion: Completion) {
        self.enqueue(Command::Open { sink, completion });
    }

    /// Sends a copy of `data` to the peer.
    ///
    /// Success means the message was handed to the peer's queue, not that the
    /// peer's engine received it. An injected send fault completes with the
    /// error and tears the connection down.
    pub fn send(&self, data: impl AsRef<[u8]>, completion: Completion) {
        self.enqueue(Command::Send {
            data: data.as_ref().to_vec(),
            completion,
        });
    }

    /// Closes the connection gracefully.
    ///
    /// Only the first close runs the teardown handshake; later calls complete
    /// once the connection is closed.
    pub fn close(&self, reason: Option<Error>, completion: CloseCompletion) {
        self.enqueue(Command::Close { reason, completion });
    }

    /// Pushes a message into this connection as if the peer had sent it.
    ///
    /// Normally invoked by the paired connection.
    pub fn accept(&self, message: Message) {
        self.enqueue(Command::Accept { message });
    }

    /// Tears the connection down on behalf of the peer.
    ///
    /// Normally invoked by the paired connection. An open connection closes its
    /// sink with `error` and completes once the engine acknowledges with
    /// [`close`](Self::close).
    pub fn disconnect(&self, error: Option<Error>, completion: CloseCompletion) {
        self.enqueue(Command::Disconnect { error, completion });
    }

    /// Disconnects locally and stops the worker.
    ///
    /// Commands queued after this call are discarded; their completions fire
    /// with [`Error::ConnectionClosed`].
    pub fn stop(&self) {
        self.enqueue(Command::Disconnect {
            error: None,
            completion: CloseCompletion::noop(),
        });
        self.enqueue(Command::Terminate);
    }

    /// Enqueues a command; a stopped worker drops it, firing its completions.
    pub(crate) fn enqueue(&self, command: Command) {
        if let Err(mpsc::error::SendError(command)) = self.inner.command_tx.send(command) {
            trace!(connection = %self.inner.id, ?command, "Worker stopped; discarding command");
        }
    }
}

// ============================================================================
// Connection - Async Wrappers
// ============================================================================

impl Connection {
    /// Opens the connection and waits for the result.
    ///
    /// # Errors
    ///
    /// - [`Error::Connect`] if a connect fault was injected
    /// - [`Error::InvalidState`] if the connection is not new
    /// - [`Error::ConnectionClosed`] if the worker stopped
    pub async fn open_async(&self, sink: Arc<dyn ReplicationSink>) -> Result<()> {
        let (completion, rx) = Completion::channel();
        self.open(sink, completion);
        rx.await?
    }

    /// Sends `data` and waits for the result.
    ///
    /// # Errors
    ///
    /// - [`Error::Send`] if a send fault was injected
    /// - [`Error::InvalidState`] if the connection is not open
    /// - [`Error::ConnectionClosed`] if the connection is closing or closed
    pub async fn send_async(&self, data: impl AsRef<[u8]>) -> Result<()> {
        let (completion, rx) = Completion::channel();
        self.send(data, completion);
        rx.await?
    }

    /// Closes the connection and waits for the teardown to finish.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ChannelClosed`] only if the completion is lost.
    pub async fn close_async(&self, reason: Option<Error>) -> Result<()> {
        let (completion, rx) = CloseCompletion::channel();
        self.close(reason, completion);
        rx.await?;
        Ok(())
    }
}

// ============================================================================
// Connection - Change Listeners
// ============================================================================

impl Connection {
    /// Registers a callback for state transitions.
    ///
    /// The callback runs on the connection's worker and must not block.
    pub fn add_change_listener<F>(&self, callback: F) -> ListenerToken
    where
        F: Fn(&StateChange) + Send + Sync + 'static,
    {
        self.inner.shared.notifier.add_change_listener(callback)
    }

    /// Registers a channel for state transitions.
    pub fn add_change_channel(&self) -> (ListenerToken, mpsc::UnboundedReceiver<StateChange>) {
        self.inner.shared.notifier.add_change_channel()
    }

    /// Removes a state transition subscriber.
    pub fn remove_change_listener(&self, token: ListenerToken) -> bool {
        self.inner.shared.notifier.remove_change_listener(token)
    }
}

// ============================================================================
// Trait Implementations
// ============================================================================

impl PartialEq for Connection {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for Connection {}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.inner.id)
            .field("role", &self.inner.role)
            .field("name", &self.inner.name)
            .field("state", &self.state())
            .finish()
    }
}

// ============================================================================
// WeakConnection
// ============================================================================

/// Non-owning connection handle.
#[derive(Clone)]
pub struct WeakConnection {
    id: ConnectionId,
    inner: Weak<ConnectionInner>,
}

impl WeakConnection {
    /// Returns the connection id, even if the connection is gone.
    #[inline]
    #[must_use]
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Upgrades to a strong handle.
    #[must_use]
    pub fn upgrade(&self) -> Option<Connection> {
        self.inner.upgrade().map(|inner| Connection { inner })
    }
}

impl fmt::Debug for WeakConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("WeakConnection").field(&self.id).finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
