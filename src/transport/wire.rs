//! Connection worker.
//!
//! Each connection owns one [`Wire`], a tokio task that drains the connection's
//! command channel in FIFO order. All mutable connection state (sink, backlog,
//! closing flag, pending close, error policy) lives here and is only touched by
//! this task.
//!
//! # Teardown Handshake
//!
//! ```text
//!   local side                          remote side
//!   ----------                          -----------
//!   close(reason)
//!     state = Closing
//!     peer.disconnect(error) ─────────► state = Closing
//!                                       sink.close(error)
//!                                       engine acknowledges: close()
//!     TeardownComplete ◄─────────────── state = Closed
//!     state = Closed
//! ```
//!
//! A connection that is already closing answers a disconnect immediately, so
//! two sides closing at once both finish.

// ============================================================================
// Imports
// ============================================================================

use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use crate::completion::{CloseCompletion, Completion};
use crate::error::Error;
use crate::fault::{ErrorPolicy, LifecycleLocation};
use crate::identifiers::ConnectionId;
use crate::protocol::{ConnectionState, Message, StateChange};

use super::connection::{Command, Connection, Role, Shared, WeakConnection};
use super::listener::WeakListener;
use super::sink::ReplicationSink;

// ============================================================================
// Peer
// ============================================================================

/// Reference to the paired connection.
///
/// Initiators own their acceptor; acceptors only observe their initiator.
pub(crate) enum Peer {
    Strong(Connection),
    Weak(WeakConnection),
}

impl Peer {
    fn get(&self) -> Option<Connection> {
        match self {
            Self::Strong(connection) => Some(connection.clone()),
            Self::Weak(connection) => connection.upgrade(),
        }
    }
}

// ============================================================================
// Wire
// ============================================================================

/// Serial worker state of one connection.
pub(crate) struct Wire {
    /// Handle of the owning connection.
    this: WeakConnection,
    /// Owning connection id.
    id: ConnectionId,
    /// Role; fixed at construction.
    role: Role,
    /// Fault injector, consulted by initiators only.
    policy: Box<dyn ErrorPolicy>,
    /// Paired connection.
    peer: Option<Peer>,
    /// Listener this acceptor reports pairing to.
    listener: Option<WeakListener>,
    /// Replication engine, set by open.
    sink: Option<Arc<dyn ReplicationSink>>,
    /// Inbound messages waiting for open.
    backlog: VecDeque<Message>,
    /// Set by the first close or disconnect.
    closing: bool,
    /// Sink was closed by a receive fault; drop further deliveries.
    aborted: bool,
    /// Remote disconnect waiting for the engine's close.
    pending_close: Option<CloseCompletion>,
    /// Close completions fired on reaching `Closed`.
    close_waiters: Vec<CloseCompletion>,
    /// State shared with handles.
    shared: Arc<Shared>,
}

impl Wire {
    pub(crate) fn new(
        this: WeakConnection,
        role: Role,
        policy: Box<dyn ErrorPolicy>,
        peer: Option<Peer>,
        listener: Option<WeakListener>,
        shared: Arc<Shared>,
    ) -> Self {
        Self {
            id: this.id(),
            this,
            role,
            policy,
            peer,
            listener,
            sink: None,
            backlog: VecDeque::new(),
            closing: false,
            aborted: false,
            pending_close: None,
            close_waiters: Vec::new(),
            shared,
        }
    }

    /// Drains commands until terminated or every handle is gone.
    ///
    /// Commands still queued when the loop ends are dropped with the receiver,
    /// which fires their completions.
    pub(crate) async fn run(mut self, mut command_rx: mpsc::UnboundedReceiver<Command>) {
        debug!(connection = %self.id, role = %self.role, "Wire started");

        while let Some(command) = command_rx.recv().await {
            trace!(connection = %self.id, ?command, "Processing command");

            match command {
                Command::Open { sink, completion } => self.handle_open(sink, completion),
                Command::Send { data, completion } => self.handle_send(data, completion),
                Command::Close { reason, completion } => self.handle_close(reason, completion),
                Command::Accept { message } => self.handle_accept(message),
                Command::Disconnect { error, completion } => {
                    self.handle_disconnect(error, completion);
                }
                Command::ClientOpened { client } => self.handle_client_opened(client),
                Command::TeardownComplete => self.handle_teardown_complete(),
                Command::Terminate => {
                    self.handle_terminate();
                    break;
                }
            }
        }

        debug!(connection = %self.id, state = %self.state(), "Wire terminated");
    }
}

// ============================================================================
// Wire - Command Handlers
// ============================================================================

impl Wire {
    fn handle_open(&mut self, sink: Arc<dyn ReplicationSink>, completion: Completion) {
        let state = self.state();
        if state != ConnectionState::New {
            completion.fail(Error::invalid_state("open", state));
            return;
        }

        self.sink = Some(sink);
        *self.shared.last_error.write() = None;
        self.closing = false;
        self.aborted = false;
        self.set_state(ConnectionState::Opening);

        if let Some(error) = self.check_fault(LifecycleLocation::Connect) {
            debug!(connection = %self.id, %error, "Open failed");
            self.sink = None;
            self.set_state(ConnectionState::New);
            completion.fail(error);
            return;
        }

        self.set_state(ConnectionState::Open);

        if self.role == Role::Initiator
            && let Some(peer) = self.peer_connection()
        {
            peer.enqueue(Command::ClientOpened {
                client: self.this.clone(),
            });
        }

        completion.succeed();

        // The backlog lands before anything queued after the open.
        if !self.backlog.is_empty() {
            debug!(connection = %self.id, count = self.backlog.len(), "Flushing backlog");
        }
        while let Some(message) = self.backlog.pop_front() {
            self.deliver(message);
        }
    }

    fn handle_send(&mut self, data: Vec<u8>, completion: Completion) {
        let state = self.state();
        if self.closing || matches!(state, ConnectionState::Closing | ConnectionState::Closed) {
            completion.fail(Error::ConnectionClosed);
            return;
        }
        if state != ConnectionState::Open {
            completion.fail(Error::invalid_state("send", state));
            return;
        }

        if let Some(error) = self.check_fault(LifecycleLocation::Send) {
            debug!(connection = %self.id, %error, "Send failed; tearing down");
            completion.fail(error.clone());
            self.closing = true;
            self.begin_close(Some(error), CloseCompletion::noop());
            return;
        }

        match self.peer_connection() {
            Some(peer) => {
                trace!(connection = %self.id, peer = %peer.id(), bytes = data.len(), "Message sent");
                peer.accept(Message::from(data));
            }
            None => {
                debug!(connection = %self.id, bytes = data.len(), "No peer; message discarded");
            }
        }

        completion.succeed();
    }

    fn handle_accept(&mut self, message: Message) {
        match self.state() {
            ConnectionState::Open | ConnectionState::Closing if self.sink.is_some() => {
                self.deliver(message);
            }
            ConnectionState::Closed => {
                debug!(connection = %self.id, bytes = message.len(), "Closed; message dropped");
            }
            _ => {
                trace!(connection = %self.id, bytes = message.len(), "Not open; message buffered");
                self.backlog.push_back(message);
            }
        }
    }

    fn handle_close(&mut self, reason: Option<Error>, completion: CloseCompletion) {
        if self.state() == ConnectionState::Closed {
            completion.complete();
            return;
        }

        // The engine acknowledging a remote disconnect.
        if let Some(pending) = self.pending_close.take() {
            self.close_waiters.push(completion);
            self.finish_close();
            pending.complete();
            return;
        }

        if self.closing {
            trace!(connection = %self.id, "Already closing; waiting for teardown");
            self.close_waiters.push(completion);
            return;
        }

        self.closing = true;

        if !self.is_paired() {
            self.close_waiters.push(completion);
            self.finish_close();
            return;
        }

        self.begin_close(reason, completion);
    }

    fn handle_disconnect(&mut self, error: Option<Error>, completion: CloseCompletion) {
        let state = self.state();
        if state == ConnectionState::Closed {
            completion.complete();
            return;
        }

        // A clean disconnect keeps an earlier fault.
        if let Some(error) = &error {
            *self.shared.last_error.write() = Some(error.clone());
        }

        if self.closing {
            trace!(connection = %self.id, "Disconnect while closing; acknowledging");
            completion.complete();
            return;
        }

        self.closing = true;

        match (state, self.sink.clone()) {
            (ConnectionState::Open, Some(sink)) => {
                debug!(connection = %self.id, ?error, "Disconnected by peer");
                self.pending_close = Some(completion);
                self.set_state(ConnectionState::Closing);
                if self.aborted {
                    trace!(connection = %self.id, "Sink already closed by receive fault");
                } else {
                    sink.close(error);
                }
            }
            _ => {
                completion.complete();
                self.finish_close();
            }
        }
    }

    fn handle_client_opened(&mut self, client: WeakConnection) {
        if self.role != Role::Acceptor {
            warn!(connection = %self.id, client = %client.id(), "Initiator cannot accept a client");
            return;
        }

        if self.state() == ConnectionState::Closed {
            debug!(connection = %self.id, client = %client.id(), "Client opened after close");
            if let Some(client) = client.upgrade() {
                client.disconnect(Some(Error::ConnectionClosed), CloseCompletion::noop());
            }
            return;
        }

        if self.peer.is_some() {
            warn!(connection = %self.id, client = %client.id(), "Already paired; ignoring client");
            return;
        }

        debug!(connection = %self.id, client = %client.id(), "Client opened");
        *self.shared.peer.write() = Some(client.id());
        self.peer = Some(Peer::Weak(client));

        if let Some(listener) = self.listener.as_ref().and_then(WeakListener::upgrade)
            && let Some(this) = self.this.upgrade()
        {
            listener.accept(&this);
        }
    }

    fn handle_teardown_complete(&mut self) {
        if self.state() != ConnectionState::Closed {
            trace!(connection = %self.id, "Peer acknowledged teardown");
            self.finish_close();
        }
    }

    fn handle_terminate(&mut self) {
        let pending = self.pending_close.take();
        if self.state() != ConnectionState::Closed {
            self.finish_close();
        }
        if let Some(pending) = pending {
            pending.complete();
        }
    }
}

// ============================================================================
// Wire - Helpers
// ============================================================================

impl Wire {
    fn state(&self) -> ConnectionState {
        *self.shared.state.read()
    }

    fn set_state(&self, current: ConnectionState) {
        let previous = std::mem::replace(&mut *self.shared.state.write(), current);
        if previous != current {
            debug!(connection = %self.id, %previous, %current, "State changed");
            self.shared.notifier.post_change(StateChange {
                connection: self.id,
                previous,
                current,
            });
        }
    }

    fn peer_connection(&self) -> Option<Connection> {
        self.peer.as_ref().and_then(Peer::get)
    }

    /// Whether a close must run the handshake with the peer.
    fn is_paired(&self) -> bool {
        match self.role {
            Role::Initiator => self.state() == ConnectionState::Open,
            Role::Acceptor => self.peer.is_some(),
        }
    }

    /// Consults the policy; a fault sticks in `last_error` until the next open.
    fn check_fault(&mut self, location: LifecycleLocation) -> Option<Error> {
        if !self.role.injects_faults() {
            return None;
        }

        if self.policy.should_fail(location) {
            let error = self.policy.make_error(location);
            debug!(
                connection = %self.id,
                %location,
                recoverable = error.is_recoverable(),
                "Injecting fault"
            );
            *self.shared.last_error.write() = Some(error);
        }

        self.shared.last_error.read().clone()
    }

    fn deliver(&mut self, message: Message) {
        if self.aborted {
            trace!(connection = %self.id, "Sink aborted; message dropped");
            return;
        }
        let Some(sink) = self.sink.clone() else {
            self.backlog.push_back(message);
            return;
        };

        if let Some(error) = self.check_fault(LifecycleLocation::Receive) {
            debug!(connection = %self.id, %error, "Receive failed; closing sink");
            self.aborted = true;
            sink.close(Some(error));
            return;
        }

        sink.receive(message);
    }

    /// Starts the teardown handshake with the peer.
    fn begin_close(&mut self, reason: Option<Error>, completion: CloseCompletion) {
        self.set_state(ConnectionState::Closing);
        self.close_waiters.push(completion);

        let error = match self.role {
            Role::Initiator => self.check_fault(LifecycleLocation::Close).or(reason),
            Role::Acceptor => reason,
        };

        let Some(peer) = self.peer_connection() else {
            self.finish_close();
            return;
        };

        debug!(connection = %self.id, peer = %peer.id(), ?error, "Disconnecting peer");
        let this = self.this.clone();
        peer.disconnect(
            error,
            CloseCompletion::new(move || {
                if let Some(connection) = this.upgrade() {
                    connection.enqueue(Command::TeardownComplete);
                }
            }),
        );
    }

    fn finish_close(&mut self) {
        self.closing = true;
        self.set_state(ConnectionState::Closed);

        if !self.backlog.is_empty() {
            debug!(connection = %self.id, count = self.backlog.len(), "Discarding backlog");
            self.backlog.clear();
        }
        self.sink = None;
        self.peer = None;

        for waiter in self.close_waiters.drain(..) {
            waiter.complete();
        }
    }
}
