//! Integration tests for stdin-close gating: with callbacks registered,
//! stdin stays open until the first result record arrives so control
//! traffic during generation remains answerable.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use agent_duplex::control::ControlHandler;
use agent_duplex::hooks::{HookCallback, HookEvent, HookMatcher, HookOutput};

use super::support::MockTransport;

fn counting_hook() -> HookCallback {
    Arc::new(|_input, _tool_use_id, _context| Box::pin(async { Ok(HookOutput::default()) }))
}

/// With a hook registered, `finish_input` blocks until the first result
/// record arrives; an inbound `hook_callback` in that window is still
/// answered.
#[tokio::test]
async fn gate_holds_stdin_open_until_first_result() {
    let mut hooks = HashMap::new();
    hooks.insert(
        HookEvent::PreToolUse,
        vec![HookMatcher::new(Some("Bash"), vec![counting_hook()])],
    );

    let (transport, tool) = MockTransport::new();
    let handler = Arc::new(ControlHandler::new(transport.clone(), HashMap::new(), None));
    handler.start().expect("start");

    // Handshake with the hook configuration.
    let init = tokio::spawn({
        let handler = Arc::clone(&handler);
        async move { handler.initialize(&hooks).await }
    });
    let (request_id, _) = transport.wait_for_request(0).await;
    tool.send(json!({
        "type": "control_response",
        "response": { "subtype": "success", "request_id": request_id, "response": {} },
    }));
    init.await.expect("join").expect("handshake");

    // Caller finishes writing prompts; the gate must hold.
    let finish = tokio::spawn({
        let handler = Arc::clone(&handler);
        async move { handler.finish_input().await }
    });

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(
        !transport.input_ended(),
        "stdin must stay open before the first result"
    );

    // A hook callback arriving in the window is still answerable.
    tool.send(json!({
        "type": "control_request",
        "request_id": "req_hook_gate",
        "request": { "subtype": "hook_callback", "callback_id": "hook_0", "input": {} },
    }));
    let written = transport.wait_for_written(2).await;
    assert_eq!(written[1]["response"]["subtype"], "success");
    assert_eq!(written[1]["response"]["request_id"], "req_hook_gate");
    assert!(!transport.input_ended(), "answering hooks must not close stdin");

    // The first result releases the gate.
    tool.send(json!({ "type": "result", "subtype": "success" }));
    finish.await.expect("join").expect("finish_input");
    assert!(transport.input_ended(), "stdin closes once the result arrives");
}

/// Without callbacks, stdin closes immediately after the prompt stream
/// is drained.
#[tokio::test]
async fn no_callbacks_closes_stdin_immediately() {
    let (transport, tool) = MockTransport::new();
    let handler = ControlHandler::new(transport.clone(), HashMap::new(), None);
    handler.start().expect("start");

    handler.finish_input().await.expect("finish_input");
    assert!(transport.input_ended(), "no callbacks, no gate");

    drop(tool);
}

/// The latch is single-shot: it stays raised across later results and
/// never lowers.
#[tokio::test]
async fn first_result_latch_never_lowers() {
    let (transport, tool) = MockTransport::new();
    let handler = ControlHandler::new(transport, HashMap::new(), None);
    handler.start().expect("start");

    tool.send(json!({ "type": "result", "num": 1 }));
    handler.next_record().await.expect("record").expect("ok");
    assert!(handler.first_result_seen());

    tool.send(json!({ "type": "assistant" }));
    handler.next_record().await.expect("record").expect("ok");
    assert!(handler.first_result_seen(), "latch must stay raised");
}
