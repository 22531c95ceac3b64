//! Stateful session client.
//!
//! [`AgentClient`] composes the subprocess transport, the
//! control-protocol handler, and the in-process MCP bridges behind one
//! facade: connect, send prompts, receive responses, issue control
//! operations, disconnect.
//!
//! The client exclusively owns the transport and handler. Streams
//! handed to callers are views over the data channel; dropping them
//! never tears the session down.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures_util::{stream, Stream, StreamExt};
use serde_json::{json, Value};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::control::{ControlHandler, OutboundRequest};
use crate::errors::{AgentError, Result};
use crate::mcp::McpBridge;
use crate::message::{parse_message, Message};
use crate::options::{AgentOptions, McpServerConfig};
use crate::permissions::PermissionMode;
use crate::transport::{LaunchMode, PromptInput, SubprocessTransport, Transport};

/// Session id used when the caller does not name one.
const DEFAULT_SESSION_ID: &str = "default";

/// A connected, stateful session with the agent tool.
pub struct AgentClient {
    transport: Arc<SubprocessTransport>,
    handler: Arc<ControlHandler>,
    prompt_task: std::sync::Mutex<Option<JoinHandle<()>>>,
    disconnected: AtomicBool,
}

impl AgentClient {
    /// Spawn the tool and establish the session.
    ///
    /// `prompt` selects the launch shape: a string prompt launches
    /// one-shot (`--print`, stdin closed, no handshake), a stream feeds
    /// stdin asynchronously, and [`PromptInput::Interactive`] leaves
    /// stdin open for later [`Self::query`] calls.
    ///
    /// # Errors
    ///
    /// - [`AgentError::Sdk`] for invalid mode combinations: a permission
    ///   callback with a string prompt, or a permission callback with a
    ///   caller-supplied `permission_prompt_tool_name`.
    /// - Any transport spawn or handshake failure.
    pub async fn connect(mut options: AgentOptions, prompt: PromptInput) -> Result<Self> {
        if options.can_use_tool.is_some() {
            if matches!(prompt, PromptInput::Text(_)) {
                return Err(AgentError::Sdk(
                    "can_use_tool requires streaming mode; pass a prompt stream or \
                     PromptInput::Interactive"
                        .into(),
                ));
            }
            if options.permission_prompt_tool_name.is_some() {
                return Err(AgentError::Sdk(
                    "can_use_tool cannot be combined with permission_prompt_tool_name".into(),
                ));
            }
            // Route permission prompts over the control protocol.
            options.permission_prompt_tool_name = Some("stdio".into());
        }

        let mode = match &prompt {
            PromptInput::Text(text) => LaunchMode::OneShot {
                prompt: text.clone(),
            },
            PromptInput::Stream(_) | PromptInput::Interactive => LaunchMode::Streaming,
        };
        let streaming = matches!(mode, LaunchMode::Streaming);

        let mut bridges: HashMap<String, Arc<McpBridge>> = HashMap::new();
        for (name, config) in &options.mcp_servers {
            if let McpServerConfig::Sdk(server) = config {
                bridges.insert(name.clone(), Arc::new(McpBridge::from_server(server)));
            }
        }

        let transport =
            Arc::new(SubprocessTransport::connect(&options, mode, "sdk-rust-client").await?);
        let handler = Arc::new(ControlHandler::new(
            Arc::clone(&transport) as Arc<dyn Transport>,
            bridges,
            options.can_use_tool.clone(),
        ));
        handler.start()?;

        if streaming {
            if let Err(err) = handler.initialize(&options.hooks).await {
                warn!(error = %err, "client: initialize handshake failed");
                handler.close().await.ok();
                return Err(err);
            }
        }

        let client = Self {
            transport,
            handler,
            prompt_task: std::sync::Mutex::new(None),
            disconnected: AtomicBool::new(false),
        };

        if let PromptInput::Stream(mut records) = prompt {
            let transport = Arc::clone(&client.transport);
            let handler = Arc::clone(&client.handler);
            let task = tokio::spawn(async move {
                while let Some(record) = records.next().await {
                    if let Err(err) = transport.write_record(record).await {
                        warn!(error = %err, "client: prompt stream write failed");
                        return;
                    }
                }
                if let Err(err) = handler.finish_input().await {
                    debug!(error = %err, "client: finish_input after prompt drain failed");
                }
            });
            *client
                .prompt_task
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(task);
        }

        Ok(client)
    }

    /// Send one user prompt into the session.
    pub async fn query(&self, text: impl Into<String>, session_id: Option<&str>) -> Result<()> {
        let record = json!({
            "type": "user",
            "message": { "role": "user", "content": text.into() },
            "parent_tool_use_id": null,
            "session_id": session_id.unwrap_or(DEFAULT_SESSION_ID),
        });
        self.transport.write_record(record).await
    }

    /// Stream every data-plane message until the channel closes.
    pub fn receive_messages(&self) -> impl Stream<Item = Result<Message>> + '_ {
        stream::unfold(self.handler.as_ref(), |handler| async move {
            handler
                .next_record()
                .await
                .map(|record| (record.and_then(parse_message), handler))
        })
    }

    /// Stream messages for one response turn, ending after the first
    /// `Result` message (inclusive).
    pub fn receive_response(&self) -> impl Stream<Item = Result<Message>> + '_ {
        stream::unfold(
            (self.handler.as_ref(), false),
            |(handler, done)| async move {
                if done {
                    return None;
                }
                let record = handler.next_record().await?;
                let message = record.and_then(parse_message);
                let ends_turn = matches!(message, Ok(Message::Result(_)));
                Some((message, (handler, ends_turn)))
            },
        )
    }

    /// Stop the current generation.
    pub async fn interrupt(&self) -> Result<()> {
        self.handler
            .send_request(OutboundRequest::Interrupt)
            .await
            .map(|_| ())
    }

    /// Change the permission policy live.
    pub async fn set_permission_mode(&self, mode: PermissionMode) -> Result<()> {
        self.handler
            .send_request(OutboundRequest::SetPermissionMode { mode })
            .await
            .map(|_| ())
    }

    /// Hot-swap the active model; `None` reverts to the tool default.
    pub async fn set_model(&self, model: Option<&str>) -> Result<()> {
        self.handler
            .send_request(OutboundRequest::SetModel {
                model: model.map(str::to_owned),
            })
            .await
            .map(|_| ())
    }

    /// Restore tracked files to the snapshot taken at `user_message_id`.
    pub async fn rewind_files(&self, user_message_id: &str) -> Result<Option<Value>> {
        self.handler
            .send_request(OutboundRequest::RewindFiles {
                user_message_id: user_message_id.to_owned(),
            })
            .await
    }

    /// Query connected MCP server health.
    pub async fn mcp_status(&self) -> Result<Option<Value>> {
        self.handler.send_request(OutboundRequest::McpStatus).await
    }

    /// The initialize payload (advertised tools, commands, agents,
    /// plugins), once the handshake has completed.
    #[must_use]
    pub fn server_info(&self) -> Option<Value> {
        self.handler.server_info()
    }

    /// Close stdin after all interactive prompts have been sent,
    /// honoring the first-result gate when callbacks are registered.
    pub async fn end_input(&self) -> Result<()> {
        self.handler.finish_input().await
    }

    /// Tear the session down. Idempotent.
    pub async fn disconnect(&self) -> Result<()> {
        if self.disconnected.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        if let Some(task) = self
            .prompt_task
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take()
        {
            task.abort();
        }
        self.handler.close().await
    }
}

impl Drop for AgentClient {
    fn drop(&mut self) {
        if self.disconnected.load(Ordering::SeqCst) {
            return;
        }
        if let Some(task) = self
            .prompt_task
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take()
        {
            task.abort();
        }
        // Best-effort teardown when dropped inside a runtime; the child
        // process itself is reaped by kill_on_drop either way.
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            let handler = Arc::clone(&self.handler);
            runtime.spawn(async move {
                handler.close().await.ok();
            });
        }
    }
}

impl std::fmt::Debug for AgentClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentClient")
            .field("disconnected", &self.disconnected.load(Ordering::SeqCst))
            .field("transport", &self.transport)
            .finish_non_exhaustive()
    }
}
