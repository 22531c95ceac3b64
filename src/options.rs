//! Session configuration DTOs.
//!
//! [`AgentOptions`] drives argument assembly, environment setup, and
//! callback registration. The structs here carry no behavior of their
//! own — their contract is to serialize to the wire shapes the agent
//! CLI expects.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::hooks::{HookEvent, HookMatcher};
use crate::mcp::SdkMcpServer;
use crate::permissions::{CanUseToolCallback, PermissionMode};

/// Callback invoked with each line of the tool's stderr.
pub type StderrCallback = Arc<dyn Fn(&str) + Send + Sync>;

// ── Satellite DTOs ────────────────────────────────────────────────────────────

/// Configuration for one MCP server the tool should connect to.
#[derive(Clone)]
pub enum McpServerConfig {
    /// External server spawned over stdio.
    Stdio {
        /// Executable to spawn.
        command: String,
        /// Arguments for the executable.
        args: Vec<String>,
        /// Environment for the spawned server.
        env: HashMap<String, String>,
    },
    /// External server reached over server-sent events.
    Sse {
        /// Endpoint URL.
        url: String,
        /// Extra request headers.
        headers: HashMap<String, String>,
    },
    /// External server reached over streamable HTTP.
    Http {
        /// Endpoint URL.
        url: String,
        /// Extra request headers.
        headers: HashMap<String, String>,
    },
    /// In-process server hosted by this crate's JSON-RPC bridge.
    Sdk(SdkMcpServer),
}

impl McpServerConfig {
    /// Serialize to the `--mcp-config` entry for this server.
    ///
    /// In-process servers are advertised as `{"type": "sdk", "name": …}`;
    /// their request traffic is routed back through the control protocol
    /// rather than an external transport.
    #[must_use]
    pub fn to_config_value(&self, name: &str) -> Value {
        match self {
            Self::Stdio { command, args, env } => serde_json::json!({
                "type": "stdio",
                "command": command,
                "args": args,
                "env": env,
            }),
            Self::Sse { url, headers } => serde_json::json!({
                "type": "sse",
                "url": url,
                "headers": headers,
            }),
            Self::Http { url, headers } => serde_json::json!({
                "type": "http",
                "url": url,
                "headers": headers,
            }),
            Self::Sdk(_) => serde_json::json!({
                "type": "sdk",
                "name": name,
            }),
        }
    }
}

impl std::fmt::Debug for McpServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stdio { command, args, .. } => f
                .debug_struct("Stdio")
                .field("command", command)
                .field("args", args)
                .finish_non_exhaustive(),
            Self::Sse { url, .. } => f.debug_struct("Sse").field("url", url).finish_non_exhaustive(),
            Self::Http { url, .. } => {
                f.debug_struct("Http").field("url", url).finish_non_exhaustive()
            }
            Self::Sdk(server) => f.debug_struct("Sdk").field("name", &server.name()).finish(),
        }
    }
}

/// Which filesystem settings layers the tool loads.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SettingSource {
    /// User-level settings.
    User,
    /// Project settings checked into the repository.
    Project,
    /// Local gitignored settings.
    Local,
}

impl SettingSource {
    /// Wire spelling used in the `--setting-sources` CSV.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Project => "project",
            Self::Local => "local",
        }
    }
}

/// Definition of a subagent passed via `--agents`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentDefinition {
    /// What the agent is for.
    pub description: String,
    /// The agent's system prompt.
    pub prompt: String,
    /// Tools available to the agent; `None` inherits the session's set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<String>>,
    /// Model override for the agent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

/// Reasoning effort requested from the model.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EffortLevel {
    /// Minimal reasoning.
    Low,
    /// Moderate reasoning.
    Medium,
    /// Thorough reasoning.
    High,
    /// Maximum reasoning.
    Max,
}

impl EffortLevel {
    /// Wire spelling for the `--effort` flag.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Max => "max",
        }
    }
}

/// A plugin loaded from a local directory via `--plugin-dir`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginConfig {
    /// Directory containing the plugin.
    pub path: PathBuf,
}

// ── AgentOptions ──────────────────────────────────────────────────────────────

/// Full configuration for one agent session.
///
/// Every field is optional; `Default` produces a session with the tool's
/// own defaults. See the transport's argument assembly for how each knob
/// reaches the command line.
#[derive(Clone, Default)]
pub struct AgentOptions {
    /// Explicit path to the agent CLI executable, bypassing discovery.
    pub cli_path: Option<PathBuf>,
    /// Working directory for the tool process.
    pub cwd: Option<PathBuf>,
    /// Extra environment variables for the tool process.
    pub env: HashMap<String, String>,

    /// System prompt override (`--system-prompt`).
    pub system_prompt: Option<String>,
    /// Base tool set (`--tools`); `Some(vec![])` disables all tools.
    pub tools: Option<Vec<String>>,
    /// Allowed tool patterns (`--allowedTools`).
    pub allowed_tools: Vec<String>,
    /// Disallowed tool patterns (`--disallowedTools`).
    pub disallowed_tools: Vec<String>,
    /// Maximum conversational turns (`--max-turns`).
    pub max_turns: Option<u32>,
    /// Budget ceiling in USD (`--max-budget-usd`).
    pub max_budget_usd: Option<f64>,
    /// Model override (`--model`).
    pub model: Option<String>,
    /// Fallback model when the primary is overloaded (`--fallback-model`).
    pub fallback_model: Option<String>,
    /// Beta feature flags (`--betas`).
    pub betas: Vec<String>,
    /// MCP tool used for permission prompting (`--permission-prompt-tool`).
    pub permission_prompt_tool_name: Option<String>,
    /// Initial permission mode (`--permission-mode`).
    pub permission_mode: Option<PermissionMode>,
    /// Continue the most recent conversation (`--continue`).
    pub continue_conversation: bool,
    /// Resume a specific session by identifier (`--resume`).
    pub resume: Option<String>,
    /// Fork the resumed session instead of appending (`--fork-session`).
    pub fork_session: bool,
    /// Settings: literal JSON or a file path (`--settings`).
    pub settings: Option<String>,
    /// Sandbox configuration merged into settings under key `sandbox`.
    pub sandbox: Option<Value>,
    /// Additional directories the tool may access (`--add-dir`).
    pub add_dirs: Vec<PathBuf>,
    /// MCP servers, keyed by name (`--mcp-config`).
    pub mcp_servers: HashMap<String, McpServerConfig>,
    /// Emit partial-message stream events (`--include-partial-messages`).
    pub include_partial_messages: bool,
    /// Subagent definitions (`--agents`).
    pub agents: Option<HashMap<String, AgentDefinition>>,
    /// Settings layers to load (`--setting-sources`); empty = none.
    pub setting_sources: Option<Vec<SettingSource>>,
    /// Local plugins (`--plugin-dir`, repeated).
    pub plugins: Vec<PluginConfig>,
    /// Thinking-token ceiling (`--max-thinking-tokens`).
    pub max_thinking_tokens: Option<u32>,
    /// Reasoning effort (`--effort`).
    pub effort: Option<EffortLevel>,
    /// JSON schema constraining structured output (`--json-schema`).
    pub json_schema: Option<Value>,
    /// Escape hatch: extra flags appended verbatim, sorted by flag name.
    /// `None` values emit the flag alone. A flag already owned by a
    /// canonical field here (e.g. `model`) is rejected at argument
    /// assembly rather than emitted twice with unspecified precedence.
    pub extra_args: HashMap<String, Option<String>>,

    /// Permission callback answering `can_use_tool` control requests.
    pub can_use_tool: Option<CanUseToolCallback>,
    /// Hook matchers, registered per event during the handshake.
    pub hooks: HashMap<HookEvent, Vec<HookMatcher>>,
    /// Stderr line consumer.
    pub stderr: Option<StderrCallback>,
    /// Opt the tool into file checkpointing so `rewind_files` works.
    pub enable_file_checkpointing: bool,
    /// Maximum NDJSON reassembly buffer in bytes (default 1 MiB).
    pub max_buffer_size: Option<usize>,
}

impl AgentOptions {
    /// Whether any bidirectional callback is configured: hooks, a
    /// permission callback, or an in-process MCP server.
    ///
    /// When false, the one-shot entry point may bypass the control plane
    /// entirely.
    #[must_use]
    pub fn has_bidirectional_callbacks(&self) -> bool {
        self.can_use_tool.is_some()
            || self.hooks.values().any(|matchers| !matchers.is_empty())
            || self
                .mcp_servers
                .values()
                .any(|server| matches!(server, McpServerConfig::Sdk(_)))
    }
}

impl std::fmt::Debug for AgentOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentOptions")
            .field("cli_path", &self.cli_path)
            .field("cwd", &self.cwd)
            .field("model", &self.model)
            .field("permission_mode", &self.permission_mode)
            .field("mcp_servers", &self.mcp_servers.keys().collect::<Vec<_>>())
            .field("hooks", &self.hooks.keys().collect::<Vec<_>>())
            .field("can_use_tool", &self.can_use_tool.is_some())
            .finish_non_exhaustive()
    }
}
