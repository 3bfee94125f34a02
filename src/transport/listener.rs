//! Listener owning a set of acceptor connections.
//!
//! A [`Listener`] routes every acceptor created through it to one local
//! [`ReplicationTarget`]. Pairing drives the lifecycle: once an initiator
//! finishes opening, its acceptor hands itself to [`Listener::accept`], which
//! opens the acceptor against a sink obtained from the target.
//!
//! # Status Events
//!
//! | Activity | Posted when |
//! |----------|-------------|
//! | `Connecting` | the acceptor is accepted |
//! | `Idle` | the acceptor's open completes |
//! | `Stopped` | the acceptor reaches `Closed` (exactly once, with the error) |
//! | any | the engine calls [`Listener::report_status`] |
//!
//! Events are never coalesced: closing two connections yields two `Stopped`
//! events. Subscribers only see events posted after they subscribe.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::completion::{CloseCompletion, Completion};
use crate::error::Error;
use crate::identifiers::{ConnectionId, ListenerToken};
use crate::notifier::ChangeNotifier;
use crate::protocol::{ActivityLevel, ConnectionStatus, Message, ProtocolType};

use super::connection::{Connection, Role, WeakConnection};
use super::registry::ConnectionRegistry;
use super::sink::{ReplicationSink, ReplicationTarget};

// ============================================================================
// ListenerConfiguration
// ============================================================================

/// Configuration of a [`Listener`].
#[derive(Clone)]
pub struct ListenerConfiguration {
    /// Local collaborator accepted connections are routed to.
    target: Arc<dyn ReplicationTarget>,
    /// Protocol kind advertised to initiators.
    protocol: ProtocolType,
    /// Registry acceptors are recorded in.
    registry: Option<ConnectionRegistry>,
}

impl ListenerConfiguration {
    /// Creates a configuration routing to `target`.
    #[must_use]
    pub fn new(target: Arc<dyn ReplicationTarget>) -> Self {
        Self {
            target,
            protocol: ProtocolType::default(),
            registry: None,
        }
    }

    /// Sets the protocol kind.
    #[inline]
    #[must_use]
    pub fn with_protocol(mut self, protocol: ProtocolType) -> Self {
        self.protocol = protocol;
        self
    }

    /// Records every acceptor in `registry`.
    #[inline]
    #[must_use]
    pub fn with_registry(mut self, registry: ConnectionRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Returns the target.
    #[inline]
    #[must_use]
    pub fn target(&self) -> &Arc<dyn ReplicationTarget> {
        &self.target
    }

    /// Returns the protocol kind.
    #[inline]
    #[must_use]
    pub fn protocol(&self) -> ProtocolType {
        self.protocol
    }
}

impl fmt::Debug for ListenerConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerConfiguration")
            .field("target", &self.target.id())
            .field("protocol", &self.protocol)
            .field("registry", &self.registry.is_some())
            .finish()
    }
}

// ============================================================================
// ListenerChange
// ============================================================================

/// Status change of one listener connection.
#[derive(Debug, Clone)]
pub struct ListenerChange {
    /// Connection the status belongs to.
    pub connection: Connection,
    /// The new status.
    pub status: ConnectionStatus,
}

// ============================================================================
// Members
// ============================================================================

/// Connections owned by a listener.
#[derive(Default)]
struct Members {
    /// Accepted and not being closed by the listener.
    active: FxHashMap<ConnectionId, Connection>,
    /// Closed by the listener, waiting to reach `Closed`.
    closing: FxHashMap<ConnectionId, Connection>,
}

impl Members {
    fn contains(&self, id: ConnectionId) -> bool {
        self.active.contains_key(&id) || self.closing.contains_key(&id)
    }

    fn remove(&mut self, id: ConnectionId) -> Option<Connection> {
        self.active.remove(&id).or_else(|| self.closing.remove(&id))
    }

    fn is_empty(&self) -> bool {
        self.active.is_empty() && self.closing.is_empty()
    }
}

// ============================================================================
// Listener
// ============================================================================

pub(crate) struct ListenerInner {
    config: ListenerConfiguration,
    members: Mutex<Members>,
    notifier: ChangeNotifier<ListenerChange>,
    stopped: AtomicBool,
}

/// Owns the acceptor connections routed to one replication target.
///
/// # Thread Safety
///
/// `Listener` is `Send + Sync`; the connection set is mutated from many
/// connections' workers and is guarded by a mutex.
#[derive(Clone)]
pub struct Listener {
    inner: Arc<ListenerInner>,
}

// ============================================================================
// Listener - Constructor & Accessors
// ============================================================================

impl Listener {
    /// Creates an accepting listener.
    #[must_use]
    pub fn new(config: ListenerConfiguration) -> Self {
        info!(target_id = config.target.id(), protocol = %config.protocol, "Listener created");
        Self {
            inner: Arc::new(ListenerInner {
                config,
                members: Mutex::new(Members::default()),
                notifier: ChangeNotifier::new(),
                stopped: AtomicBool::new(false),
            }),
        }
    }

    /// Returns the configuration.
    #[inline]
    #[must_use]
    pub fn config(&self) -> &ListenerConfiguration {
        &self.inner.config
    }

    /// Returns the accepted connections not being closed.
    #[must_use]
    pub fn connections(&self) -> Vec<Connection> {
        self.inner.members.lock().active.values().cloned().collect()
    }

    /// Returns the number of connections not being closed.
    #[inline]
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.inner.members.lock().active.len()
    }

    /// Returns `true` once stopped and every connection has closed.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::Acquire) && self.inner.members.lock().is_empty()
    }

    pub(crate) fn downgrade(&self) -> WeakListener {
        WeakListener {
            inner: Arc::downgrade(&self.inner),
        }
    }
}

// ============================================================================
// Listener - Accepting
// ============================================================================

impl Listener {
    /// Creates an acceptor bound to this listener.
    ///
    /// The acceptor joins the listener when its initiator finishes opening.
    #[must_use]
    pub fn acceptor(&self) -> Connection {
        let name = format!("{}-acceptor", self.inner.config.target.id());
        let connection = Connection::listener_acceptor(name, self.downgrade());
        if let Some(registry) = &self.inner.config.registry {
            registry.register(&connection);
        }
        connection
    }

    /// Registers `connection` and opens it against the target.
    ///
    /// A stopped listener closes the connection with
    /// [`Error::ListenerStopped`] instead.
    pub fn accept(&self, connection: &Connection) {
        let id = connection.id();

        if connection.role() != Role::Acceptor {
            warn!(connection = %id, "Listener ignoring non-acceptor connection");
            return;
        }

        if self.inner.stopped.load(Ordering::Acquire) {
            debug!(connection = %id, "Listener stopped; refusing connection");
            connection.close(Some(Error::ListenerStopped), CloseCompletion::noop());
            return;
        }

        {
            let mut members = self.inner.members.lock();
            if members.contains(id) {
                debug!(connection = %id, "Connection already accepted");
                return;
            }
            members.active.insert(id, connection.clone());
        }

        info!(target_id = self.inner.config.target.id(), connection = %id, "Accepted connection");
        self.post_status(connection, ConnectionStatus::new(ActivityLevel::Connecting));

        let sink = ListenerSink {
            listener: self.downgrade(),
            connection: connection.downgrade(),
            target: self.inner.config.target.attach(connection),
        };

        let listener = self.downgrade();
        connection.open(
            Arc::new(sink),
            Completion::new(move |result| {
                let Some(listener) = listener.upgrade() else {
                    return;
                };
                match result {
                    Ok(()) => listener.connection_idle(id),
                    Err(error) => listener.connection_stopped(id, Some(error)),
                }
            }),
        );
    }
}

// ============================================================================
// Listener - Closing
// ============================================================================

impl Listener {
    /// Removes `connection` from the set and closes it.
    ///
    /// A `Stopped` event follows once it reaches `Closed`.
    pub fn close(&self, connection: &Connection) {
        let id = connection.id();
        let moved = {
            let mut members = self.inner.members.lock();
            match members.active.remove(&id) {
                Some(member) => {
                    members.closing.insert(id, member);
                    true
                }
                None => false,
            }
        };

        if !moved {
            debug!(connection = %id, "Not an active listener connection");
            return;
        }

        debug!(connection = %id, "Closing listener connection");
        let listener = self.downgrade();
        connection.close(
            None,
            CloseCompletion::new(move || {
                if let Some(listener) = listener.upgrade() {
                    listener.connection_stopped(id, None);
                }
            }),
        );
    }

    /// Closes every active connection.
    ///
    /// Each connection posts its own `Stopped` event.
    pub fn close_all(&self) {
        let connections = self.connections();
        info!(count = connections.len(), "Closing all listener connections");
        for connection in &connections {
            self.close(connection);
        }
    }

    /// Refuses further connections and closes every active one.
    pub fn stop(&self) {
        if self.inner.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        info!(target_id = self.inner.config.target.id(), "Listener stopping");
        self.close_all();
    }
}

// ============================================================================
// Listener - Status
// ============================================================================

impl Listener {
    /// Registers a callback for status changes.
    pub fn add_change_listener<F>(&self, callback: F) -> ListenerToken
    where
        F: Fn(&ListenerChange) + Send + Sync + 'static,
    {
        self.inner.notifier.add_change_listener(callback)
    }

    /// Registers a channel for status changes.
    pub fn add_change_channel(&self) -> (ListenerToken, mpsc::UnboundedReceiver<ListenerChange>) {
        self.inner.notifier.add_change_channel()
    }

    /// Removes a status change subscriber.
    pub fn remove_change_listener(&self, token: ListenerToken) -> bool {
        self.inner.notifier.remove_change_listener(token)
    }

    /// Publishes a status computed by the replication engine.
    ///
    /// A `Stopped` status also removes the connection.
    pub fn report_status(&self, connection: &Connection, status: ConnectionStatus) {
        if status.is_stopped() {
            self.connection_stopped(connection.id(), status.error);
            return;
        }

        if self.inner.members.lock().contains(connection.id()) {
            self.post_status(connection, status);
        }
    }

    fn post_status(&self, connection: &Connection, status: ConnectionStatus) {
        debug!(connection = %connection.id(), activity = %status.activity, "Listener status");
        self.inner.notifier.post_change(ListenerChange {
            connection: connection.clone(),
            status,
        });
    }

    fn connection_idle(&self, id: ConnectionId) {
        let connection = self.inner.members.lock().active.get(&id).cloned();
        if let Some(connection) = connection {
            self.post_status(&connection, ConnectionStatus::new(ActivityLevel::Idle));
        }
    }

    /// Removes a closed connection; only the first call posts `Stopped`.
    fn connection_stopped(&self, id: ConnectionId, error: Option<Error>) {
        let removed = self.inner.members.lock().remove(id);
        if let Some(connection) = removed {
            info!(connection = %id, error = ?error, "Listener connection stopped");
            self.post_status(&connection, ConnectionStatus::stopped(error));
        }
    }
}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listener")
            .field("config", &self.inner.config)
            .field("connections", &self.connection_count())
            .field("stopped", &self.inner.stopped.load(Ordering::Acquire))
            .finish()
    }
}

// ============================================================================
// WeakListener
// ============================================================================

/// Non-owning listener handle held by acceptors.
#[derive(Clone)]
pub(crate) struct WeakListener {
    inner: Weak<ListenerInner>,
}

impl WeakListener {
    pub(crate) fn upgrade(&self) -> Option<Listener> {
        self.inner.upgrade().map(|inner| Listener { inner })
    }
}

// ============================================================================
// ListenerSink
// ============================================================================

/// Sink installed on accepted connections.
///
/// Forwards to the target's sink and acknowledges remote disconnects on the
/// target's behalf.
struct ListenerSink {
    listener: WeakListener,
    connection: WeakConnection,
    target: Arc<dyn ReplicationSink>,
}

impl ReplicationSink for ListenerSink {
    fn receive(&self, message: Message) {
        self.target.receive(message);
    }

    fn close(&self, error: Option<Error>) {
        self.target.close(error.clone());

        let Some(connection) = self.connection.upgrade() else {
            return;
        };
        let id = connection.id();
        let listener = self.listener.clone();
        connection.close(
            error.clone(),
            CloseCompletion::new(move || {
                if let Some(listener) = listener.upgrade() {
                    listener.connection_stopped(id, error);
                }
            }),
        );
    }
}

// ============================================================================
// Tests
// ============================================================================
