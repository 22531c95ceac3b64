#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! `agent-duplex` — bidirectional control-protocol multiplexer for an
//! agent CLI subprocess.
//!
//! The tool speaks newline-delimited JSON on its standard streams: in
//! one direction a stream of conversational messages (user echoes,
//! assistant output, system notices, a terminating result record); in
//! the other, user prompts and out-of-band control requests. The tool
//! may also *send* control requests that must be answered synchronously:
//! permission checks, hook invocations, and JSON-RPC traffic for
//! in-process MCP servers.
//!
//! # One-shot
//!
//! ```no_run
//! use agent_duplex::{query, Message};
//! use futures_util::StreamExt;
//!
//! # async fn run() -> agent_duplex::Result<()> {
//! let mut messages = std::pin::pin!(query("What is 2+2?", None).await?);
//! while let Some(message) = messages.next().await {
//!     if let Message::Assistant(reply) = message? {
//!         println!("{:?}", reply.content);
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Interactive session
//!
//! ```no_run
//! use agent_duplex::{AgentClient, AgentOptions, PromptInput};
//! use futures_util::StreamExt;
//!
//! # async fn run() -> agent_duplex::Result<()> {
//! let client = AgentClient::connect(AgentOptions::default(), PromptInput::Interactive).await?;
//! client.query("Summarize this repository.", None).await?;
//!
//! let mut turn = std::pin::pin!(client.receive_response());
//! while let Some(message) = turn.next().await {
//!     println!("{:?}", message?);
//! }
//! client.disconnect().await?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod control;
pub mod errors;
pub mod hooks;
pub mod mcp;
pub mod message;
pub mod options;
pub mod permissions;
pub mod query;
pub mod transport;

pub use client::AgentClient;
pub use errors::{AgentError, Result};
pub use message::{
    parse_message, AssistantMessage, ContentBlock, Message, ResultMessage, StreamEvent,
    SystemMessage, UserContent, UserMessage,
};
pub use options::{
    AgentDefinition, AgentOptions, EffortLevel, McpServerConfig, PluginConfig, SettingSource,
};
pub use permissions::{
    CanUseToolCallback, PermissionMode, PermissionResult, PermissionResultAllow,
    PermissionResultDeny, PermissionRuleValue, PermissionUpdate, PermissionUpdateDestination,
    ToolPermissionContext,
};
pub use hooks::{HookCallback, HookContext, HookEvent, HookMatcher, HookOutput};
pub use mcp::{McpBridge, SdkMcpServer, SdkMcpTool, ToolOutput};
pub use query::query;
pub use transport::{PromptInput, SubprocessTransport, Transport};

/// Crate version, for observability variables and diagnostics.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
