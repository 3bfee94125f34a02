//! Delivery ordering across open races.

mod common;

use std::sync::Arc;

use message_endpoint::{Completion, Connection, Endpoint, Message, PairedConnectionFactory};
use proptest::prelude::*;
use tokio::runtime::Runtime;

use common::{next_messages, open_with_channel, within};

/// Sends `before` while the acceptor is unopened, opens it, then sends `after`.
///
/// Returns the payloads in the order the acceptor's sink received them.
async fn deliver(before: Vec<Vec<u8>>, after: Vec<Vec<u8>>) -> anyhow::Result<Vec<Vec<u8>>> {
    let acceptor = Connection::acceptor("server");
    let initiator =
        Endpoint::new(acceptor.clone(), Arc::new(PairedConnectionFactory::new())).connect()?;
    let _client_events = open_with_channel(&initiator).await?;

    for payload in &before {
        within(initiator.send_async(payload)).await??;
    }

    let mut events = open_with_channel(&acceptor).await?;

    // Fire-and-forget: ordering must hold without waiting on each send.
    for payload in &after {
        initiator.send(payload, Completion::noop());
    }

    let total = before.len() + after.len();
    let received = next_messages(&mut events, total).await?;

    within(initiator.close_async(None)).await??;
    Ok(received.into_iter().map(Message::into_data).collect())
}

fn payloads() -> impl Strategy<Value = Vec<Vec<u8>>> {
    prop::collection::vec(prop::collection::vec(any::<u8>(), 0..32), 0..24)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_messages_arrive_in_send_order(messages in payloads()) {
        let runtime = Runtime::new().unwrap();
        let received = runtime.block_on(deliver(Vec::new(), messages.clone())).unwrap();
        prop_assert_eq!(received, messages);
    }

    #[test]
    fn prop_backlog_flushes_before_later_messages(
        before in payloads(),
        after in payloads(),
    ) {
        let runtime = Runtime::new().unwrap();
        let received = runtime.block_on(deliver(before.clone(), after.clone())).unwrap();

        let expected: Vec<Vec<u8>> = before.into_iter().chain(after).collect();
        prop_assert_eq!(received, expected);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_ordering_holds_on_multi_thread_runtime() -> anyhow::Result<()> {
    let before: Vec<Vec<u8>> = (0..50u32).map(|i| i.to_be_bytes().to_vec()).collect();
    let after: Vec<Vec<u8>> = (50..500u32).map(|i| i.to_be_bytes().to_vec()).collect();

    let received = deliver(before.clone(), after.clone()).await?;
    let expected: Vec<Vec<u8>> = before.into_iter().chain(after).collect();
    assert_eq!(received, expected);
    Ok(())
}
