//! Tests for session-mode validation: combinations the client rejects
//! before any process is spawned.

use std::collections::HashMap;
use std::sync::Arc;

use agent_duplex::client::AgentClient;
use agent_duplex::errors::AgentError;
use agent_duplex::hooks::{HookCallback, HookEvent, HookMatcher, HookOutput};
use agent_duplex::options::AgentOptions;
use agent_duplex::permissions::{CanUseToolCallback, PermissionResult};
use agent_duplex::query::query;
use agent_duplex::transport::PromptInput;

fn allow_all() -> CanUseToolCallback {
    Arc::new(|_tool_name, _input, _context| Box::pin(async { Ok(PermissionResult::allow()) }))
}

/// A permission callback cannot ride on a one-shot string prompt — the
/// control channel would be closed before the first request.
#[tokio::test]
async fn permission_callback_with_string_prompt_is_rejected() {
    let options = AgentOptions {
        can_use_tool: Some(allow_all()),
        ..AgentOptions::default()
    };
    let err = AgentClient::connect(options, PromptInput::Text("hi".into()))
        .await
        .expect_err("must be rejected");
    match err {
        AgentError::Sdk(message) => {
            assert!(message.contains("streaming"), "got: {message}");
        }
        other => panic!("expected Sdk error, got {other:?}"),
    }
}

/// A permission callback and a caller-supplied permission prompt tool
/// are mutually exclusive.
#[tokio::test]
async fn permission_callback_with_prompt_tool_is_rejected() {
    let options = AgentOptions {
        can_use_tool: Some(allow_all()),
        permission_prompt_tool_name: Some("mcp__approver__ask".into()),
        ..AgentOptions::default()
    };
    let err = AgentClient::connect(options, PromptInput::Interactive)
        .await
        .expect_err("must be rejected");
    assert!(matches!(err, AgentError::Sdk(_)), "got {err:?}");
}

/// The one-shot entry refuses every bidirectional callback: permission
/// callbacks, hooks, and in-process MCP servers all need the control
/// plane.
#[tokio::test]
async fn one_shot_refuses_bidirectional_callbacks() {
    let with_permission = AgentOptions {
        can_use_tool: Some(allow_all()),
        ..AgentOptions::default()
    };
    assert!(query("hi", Some(with_permission)).await.is_err());

    let hook: HookCallback = Arc::new(|_input, _tool_use_id, _context| {
        Box::pin(async { Ok(HookOutput::default()) })
    });
    let mut hooks = HashMap::new();
    hooks.insert(HookEvent::PreToolUse, vec![HookMatcher::new(None, vec![hook])]);
    let with_hooks = AgentOptions {
        hooks,
        ..AgentOptions::default()
    };
    assert!(query("hi", Some(with_hooks)).await.is_err());

    let mut mcp_servers = HashMap::new();
    mcp_servers.insert(
        "calc".to_owned(),
        agent_duplex::options::McpServerConfig::Sdk(agent_duplex::SdkMcpServer::new("calc")),
    );
    let with_sdk_server = AgentOptions {
        mcp_servers,
        ..AgentOptions::default()
    };
    assert!(query("hi", Some(with_sdk_server)).await.is_err());
}
