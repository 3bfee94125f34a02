//! Shared helpers for integration tests.

#![allow(dead_code)]

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, anyhow};
use message_endpoint::{
    ChannelSink, Connection, ConnectionState, ListenerChange, Message, SinkEvent,
};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::timeout;
use tracing_subscriber::EnvFilter;

/// Upper bound for any single wait in a test.
pub const DEADLINE: Duration = Duration::from_secs(5);

/// Installs a test subscriber honoring `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Awaits `future`, failing after [`DEADLINE`].
pub async fn within<T>(future: impl Future<Output = T>) -> anyhow::Result<T> {
    timeout(DEADLINE, future)
        .await
        .map_err(|_| anyhow!("deadline of {DEADLINE:?} exceeded"))
}

/// Opens `connection` against an acknowledging channel sink.
pub async fn open_with_channel(
    connection: &Connection,
) -> anyhow::Result<UnboundedReceiver<SinkEvent>> {
    let (sink, events) = ChannelSink::attach(connection);
    within(connection.open_async(sink))
        .await?
        .with_context(|| format!("opening {}", connection.name()))?;
    Ok(events)
}

/// Receives the next sink event.
pub async fn next_event(events: &mut UnboundedReceiver<SinkEvent>) -> anyhow::Result<SinkEvent> {
    within(events.recv())
        .await?
        .ok_or_else(|| anyhow!("sink event channel closed"))
}

/// Receives the next `n` messages, failing on any other event.
pub async fn next_messages(
    events: &mut UnboundedReceiver<SinkEvent>,
    n: usize,
) -> anyhow::Result<Vec<Message>> {
    let mut messages = Vec::with_capacity(n);
    while messages.len() < n {
        match next_event(events).await? {
            SinkEvent::Received { message, .. } => messages.push(message),
            other => return Err(anyhow!("expected message, got {other:?}")),
        }
    }
    Ok(messages)
}

/// Receives the next listener change.
pub async fn next_change(
    changes: &mut UnboundedReceiver<ListenerChange>,
) -> anyhow::Result<ListenerChange> {
    within(changes.recv())
        .await?
        .ok_or_else(|| anyhow!("listener change channel closed"))
}

/// Waits until `connection` reaches `state`.
pub async fn wait_for_state(connection: &Connection, state: ConnectionState) -> anyhow::Result<()> {
    let (token, mut changes) = connection.add_change_channel();

    let reached = within(async {
        if connection.state() == state {
            return true;
        }
        while let Some(change) = changes.recv().await {
            if change.current == state {
                return true;
            }
        }
        false
    })
    .await;

    connection.remove_change_listener(token);
    match reached {
        Ok(true) => Ok(()),
        Ok(false) => Err(anyhow!("change channel closed before {state}")),
        Err(error) => Err(error.context(format!(
            "{} stuck in {} waiting for {state}",
            connection.name(),
            connection.state()
        ))),
    }
}

/// Counts invocations of a shared callback.
pub fn counter() -> Arc<std::sync::atomic::AtomicUsize> {
    Arc::new(std::sync::atomic::AtomicUsize::new(0))
}
