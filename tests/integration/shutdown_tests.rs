//! Integration tests for teardown: EOF, stream errors, and close with
//! requests still pending.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use agent_duplex::control::{ControlHandler, OutboundRequest};
use agent_duplex::errors::AgentError;

use super::support::MockTransport;

/// Stream EOF closes the data channel and fails pending requests with a
/// connection error.
#[tokio::test]
async fn eof_fails_pending_and_closes_channel() {
    let (transport, tool) = MockTransport::new();
    let handler = Arc::new(ControlHandler::new(transport.clone(), HashMap::new(), None));
    handler.start().expect("start");

    let pending = tokio::spawn({
        let handler = Arc::clone(&handler);
        async move { handler.send_request(OutboundRequest::McpStatus).await }
    });
    transport.wait_for_request(0).await;

    tool.close_stream();

    let err = pending.await.expect("join").expect_err("must fail at EOF");
    assert!(matches!(err, AgentError::ConnectionLost(_)), "got {err:?}");
    assert!(handler.next_record().await.is_none(), "data channel closed");
}

/// A terminal read error is forwarded to the data channel, then the
/// channel closes and pending requests fail with the same error.
#[tokio::test]
async fn stream_error_propagates_to_consumer_and_pending() {
    let (transport, tool) = MockTransport::new();
    let handler = Arc::new(ControlHandler::new(transport.clone(), HashMap::new(), None));
    handler.start().expect("start");

    let pending = tokio::spawn({
        let handler = Arc::clone(&handler);
        async move { handler.send_request(OutboundRequest::Interrupt).await }
    });
    transport.wait_for_request(0).await;

    tool.send_err(AgentError::decode("xxxx", "buffer exceeded 1048576 bytes"));

    let forwarded = handler
        .next_record()
        .await
        .expect("error item")
        .expect_err("must be the decode error");
    assert!(matches!(forwarded, AgentError::Decode { .. }), "got {forwarded:?}");
    assert!(handler.next_record().await.is_none(), "channel closes after error");

    let err = pending.await.expect("join").expect_err("pending must fail");
    assert!(matches!(err, AgentError::Decode { .. }), "got {err:?}");

    drop(tool);
}

/// Closing the handler resolves every pending request within a bounded
/// time and renders the handler unusable.
#[tokio::test]
async fn close_cancels_pending_and_is_terminal() {
    let (transport, tool) = MockTransport::new();
    let handler = Arc::new(ControlHandler::new(transport.clone(), HashMap::new(), None));
    handler.start().expect("start");

    let pending = tokio::spawn({
        let handler = Arc::clone(&handler);
        async move { handler.send_request(OutboundRequest::McpStatus).await }
    });
    transport.wait_for_request(0).await;

    let resolved = tokio::time::timeout(Duration::from_secs(2), async {
        handler.close().await.expect("close");
        pending.await.expect("join")
    })
    .await
    .expect("pending must resolve within a bounded time");

    let err = resolved.expect_err("must be cancelled");
    assert!(matches!(err, AgentError::Cancelled(_)), "got {err:?}");

    // Closed is terminal.
    let err = handler
        .send_request(OutboundRequest::Interrupt)
        .await
        .expect_err("closed handler rejects requests");
    assert!(matches!(err, AgentError::NotConnected), "got {err:?}");
    assert!(transport.is_closed(), "transport must be closed with the handler");

    // Idempotent.
    handler.close().await.expect("second close is a no-op");

    drop(tool);
}

/// Starting twice is rejected; sending before start is rejected.
#[tokio::test]
async fn lifecycle_misuse_is_rejected() {
    let (transport, tool) = MockTransport::new();
    let handler = ControlHandler::new(transport, HashMap::new(), None);

    let err = handler
        .send_request(OutboundRequest::Interrupt)
        .await
        .expect_err("send before start must fail");
    assert!(matches!(err, AgentError::Sdk(_)), "got {err:?}");

    handler.start().expect("first start");
    let err = handler.start().expect_err("second start must fail");
    assert!(matches!(err, AgentError::Sdk(_)), "got {err:?}");

    drop(tool);
}
