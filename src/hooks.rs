//! Hook surface: events, matchers, callbacks, and structured output.
//!
//! Hooks are application functions the tool invokes at well-known points
//! of its execution (pre/post tool use, prompt submission, stop, …).
//! Matchers are registered per event before connect; callback identifiers
//! are allocated during the initialize handshake and the registry is
//! immutable afterwards.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

use crate::Result;

// ── Events ────────────────────────────────────────────────────────────────────

/// Well-known points in the tool's execution where hooks fire.
///
/// Variant names match the wire spelling exactly.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HookEvent {
    /// Before a tool invocation.
    PreToolUse,
    /// After a tool invocation completes.
    PostToolUse,
    /// When the user submits a prompt.
    UserPromptSubmit,
    /// When the main agent stops.
    Stop,
    /// When a subagent stops.
    SubagentStop,
    /// Before conversation compaction.
    PreCompact,
}

impl HookEvent {
    /// Wire spelling of the event name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PreToolUse => "PreToolUse",
            Self::PostToolUse => "PostToolUse",
            Self::UserPromptSubmit => "UserPromptSubmit",
            Self::Stop => "Stop",
            Self::SubagentStop => "SubagentStop",
            Self::PreCompact => "PreCompact",
        }
    }
}

// ── Callbacks ─────────────────────────────────────────────────────────────────

/// Context handed to a hook callback.
///
/// Currently carries an optional cancellation handle so long-running
/// hooks can observe session shutdown.
#[derive(Debug, Clone, Default)]
pub struct HookContext {
    /// Fires when the session is closing.
    pub signal: Option<CancellationToken>,
}

/// Application-supplied hook callback.
///
/// Invoked with the raw event payload, the originating `tool_use_id`
/// (when the event is tied to a tool invocation), and a [`HookContext`].
pub type HookCallback = Arc<
    dyn Fn(
            Value,
            Option<String>,
            HookContext,
        ) -> Pin<Box<dyn Future<Output = Result<HookOutput>> + Send>>
        + Send
        + Sync,
>;

/// A matcher record: which tool invocations an event's hooks apply to.
#[derive(Clone)]
pub struct HookMatcher {
    /// Optional matcher pattern (e.g. a tool name); `None` matches all.
    pub matcher: Option<String>,
    /// Callbacks fired when the matcher applies, in registration order.
    pub hooks: Vec<HookCallback>,
    /// Optional per-matcher timeout in seconds, forwarded to the tool.
    pub timeout: Option<f64>,
}

impl HookMatcher {
    /// Build a matcher over `hooks` with no pattern and no timeout.
    #[must_use]
    pub fn new(matcher: Option<&str>, hooks: Vec<HookCallback>) -> Self {
        Self {
            matcher: matcher.map(str::to_owned),
            hooks,
            timeout: None,
        }
    }
}

impl std::fmt::Debug for HookMatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookMatcher")
            .field("matcher", &self.matcher)
            .field("hooks", &format_args!("<{} callbacks>", self.hooks.len()))
            .field("timeout", &self.timeout)
            .finish()
    }
}

// ── Output ────────────────────────────────────────────────────────────────────

/// Structured output returned by a hook callback.
///
/// Every field is optional; `None` fields are omitted from the wire.
/// Keys the tool defines but this crate does not model flow through
/// `extra` untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct HookOutput {
    /// Whether the tool should continue processing.
    #[serde(rename = "continue", skip_serializing_if = "Option::is_none")]
    pub continue_: Option<bool>,
    /// Suppress the hook's stdout from the transcript.
    #[serde(rename = "suppressOutput", skip_serializing_if = "Option::is_none")]
    pub suppress_output: Option<bool>,
    /// Reason shown when `continue` is false.
    #[serde(rename = "stopReason", skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<String>,
    /// Decision verdict (e.g. `"block"`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decision: Option<String>,
    /// Message surfaced to the user.
    #[serde(rename = "systemMessage", skip_serializing_if = "Option::is_none")]
    pub system_message: Option<String>,
    /// Reason accompanying the decision.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Event-specific payload, passed through opaquely.
    #[serde(rename = "hookSpecificOutput", skip_serializing_if = "Option::is_none")]
    pub hook_specific_output: Option<Value>,
    /// Marks the hook as asynchronous.
    #[serde(rename = "async", skip_serializing_if = "Option::is_none")]
    pub async_: Option<bool>,
    /// Timeout for asynchronous completion, in milliseconds.
    #[serde(rename = "asyncTimeout", skip_serializing_if = "Option::is_none")]
    pub async_timeout: Option<u64>,
    /// Unrecognized keys, preserved on the wire rather than rejected.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// ── Tests ─────────────────────────────────────────────────────────────────────
