//! One-shot entry point.
//!
//! When no permission callback, no hooks, and no in-process MCP server
//! are configured, no control plane is required: the tool is launched
//! with `--print -- <prompt>`, stdin closed, and parsed messages stream
//! straight off stdout until EOF. The control-protocol handler is never
//! instantiated on this path.

use std::sync::Arc;

use futures_util::{stream, Stream};
use serde_json::Value;
use tracing::debug;

use crate::errors::{AgentError, Result};
use crate::message::{parse_message, Message};
use crate::options::AgentOptions;
use crate::transport::{LaunchMode, SubprocessTransport, Transport};

/// Run one prompt to completion and stream the tool's messages.
///
/// # Errors
///
/// - [`AgentError::Sdk`] when bidirectional callbacks are configured —
///   those need the control plane; use
///   [`AgentClient`](crate::AgentClient) instead.
/// - Any transport spawn failure.
pub async fn query(
    prompt: impl Into<String>,
    options: Option<AgentOptions>,
) -> Result<impl Stream<Item = Result<Message>>> {
    let options = options.unwrap_or_default();
    if options.has_bidirectional_callbacks() {
        return Err(AgentError::Sdk(
            "hooks, can_use_tool, and in-process MCP servers require AgentClient".into(),
        ));
    }

    let transport = Arc::new(
        SubprocessTransport::connect(
            &options,
            LaunchMode::OneShot {
                prompt: prompt.into(),
            },
            "sdk-rust",
        )
        .await?,
    );

    Ok(stream::unfold(
        OneShotState {
            transport,
            done: false,
        },
        |mut state| async move {
            if state.done {
                return None;
            }
            loop {
                match state.transport.read_record().await {
                    None => {
                        state.done = true;
                        state.transport.close().await.ok();
                        debug!("query: stream complete");
                        return None;
                    }
                    Some(Err(err)) => {
                        return Some((Err(err), state));
                    }
                    Some(Ok(record)) => {
                        // Control-plane records cannot occur without a
                        // control plane; skip them if the tool emits any.
                        if is_control_record(&record) {
                            continue;
                        }
                        return Some((parse_message(record), state));
                    }
                }
            }
        },
    ))
}

struct OneShotState {
    transport: Arc<SubprocessTransport>,
    done: bool,
}

fn is_control_record(record: &Value) -> bool {
    matches!(
        record.get("type").and_then(Value::as_str),
        Some(crate::control::CONTROL_REQUEST
            | crate::control::CONTROL_RESPONSE
            | crate::control::CONTROL_CANCEL_REQUEST)
    )
}
