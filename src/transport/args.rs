//! Command-line assembly for the agent CLI.
//!
//! Produces a flat ordered token list from [`AgentOptions`], one token
//! per element. One-shot sessions terminate the list with
//! `--print -- <prompt>`; streaming sessions with
//! `--input-format stream-json`.
//!
//! When the assembled line exceeds the platform limit and an `--agents`
//! argument is present, the agents JSON is spilled to a temp file and
//! the argument becomes `@<path>`; the caller must delete the file at
//! close.

use std::io::Write;
use std::path::PathBuf;

use serde_json::{json, Map, Value};
use tracing::debug;

use crate::errors::{AgentError, Result};
use crate::options::AgentOptions;
use crate::transport::LaunchMode;

/// Windows command lines are capped near 8 KiB; elsewhere the practical
/// ceiling is far higher.
const WINDOWS_COMMAND_LIMIT: usize = 8_000;
const DEFAULT_COMMAND_LIMIT: usize = 100_000;

/// Flags owned by canonical [`AgentOptions`] fields. `extra_args` may
/// not name these — a duplicate flag on the command line has
/// unspecified last-wins/first-wins behavior in the tool.
const RESERVED_FLAGS: &[&str] = &[
    "output-format",
    "verbose",
    "input-format",
    "print",
    "system-prompt",
    "tools",
    "allowedTools",
    "disallowedTools",
    "max-turns",
    "max-budget-usd",
    "model",
    "fallback-model",
    "betas",
    "permission-prompt-tool",
    "permission-mode",
    "continue",
    "resume",
    "settings",
    "add-dir",
    "mcp-config",
    "include-partial-messages",
    "fork-session",
    "agents",
    "setting-sources",
    "plugin-dir",
    "max-thinking-tokens",
    "effort",
    "json-schema",
];

/// Assembled argument vector plus any spill file to clean up at close.
#[derive(Debug)]
pub struct AssembledArgs {
    /// Ordered argument tokens.
    pub tokens: Vec<String>,
    /// Temp file backing a spilled `--agents` value, if any.
    pub temp_files: Vec<PathBuf>,
}

/// Assemble the CLI argument vector for `options` in `mode`.
///
/// # Errors
///
/// - [`AgentError::Sdk`] when a JSON-valued option fails to serialize,
///   a settings file cannot be read for the sandbox merge, or an
///   `extra_args` entry names a flag in [`RESERVED_FLAGS`].
pub fn assemble(options: &AgentOptions, mode: &LaunchMode) -> Result<AssembledArgs> {
    let limit = if cfg!(windows) {
        WINDOWS_COMMAND_LIMIT
    } else {
        DEFAULT_COMMAND_LIMIT
    };
    assemble_with_limit(options, mode, limit)
}

/// [`assemble`] with an explicit command-line length limit, so the spill
/// branch is exercisable on every platform.
pub fn assemble_with_limit(
    options: &AgentOptions,
    mode: &LaunchMode,
    limit: usize,
) -> Result<AssembledArgs> {
    let mut tokens: Vec<String> = vec![
        "--output-format".into(),
        "stream-json".into(),
        "--verbose".into(),
    ];

    if let Some(prompt) = &options.system_prompt {
        push_pair(&mut tokens, "--system-prompt", prompt);
    }
    if let Some(tools) = &options.tools {
        // An empty CSV is meaningful: it disables all tools.
        push_pair(&mut tokens, "--tools", &tools.join(","));
    }
    if !options.allowed_tools.is_empty() {
        push_pair(&mut tokens, "--allowedTools", &options.allowed_tools.join(","));
    }
    if !options.disallowed_tools.is_empty() {
        push_pair(
            &mut tokens,
            "--disallowedTools",
            &options.disallowed_tools.join(","),
        );
    }
    if let Some(max_turns) = options.max_turns {
        push_pair(&mut tokens, "--max-turns", &max_turns.to_string());
    }
    if let Some(budget) = options.max_budget_usd {
        push_pair(&mut tokens, "--max-budget-usd", &budget.to_string());
    }
    if let Some(model) = &options.model {
        push_pair(&mut tokens, "--model", model);
    }
    if let Some(fallback) = &options.fallback_model {
        push_pair(&mut tokens, "--fallback-model", fallback);
    }
    if !options.betas.is_empty() {
        push_pair(&mut tokens, "--betas", &options.betas.join(","));
    }
    if let Some(tool_name) = &options.permission_prompt_tool_name {
        push_pair(&mut tokens, "--permission-prompt-tool", tool_name);
    }
    if let Some(mode) = options.permission_mode {
        push_pair(&mut tokens, "--permission-mode", mode.as_str());
    }
    if options.continue_conversation {
        tokens.push("--continue".into());
    }
    if let Some(resume) = &options.resume {
        push_pair(&mut tokens, "--resume", resume);
    }
    if let Some(settings) = merged_settings(options.settings.as_deref(), options.sandbox.as_ref())? {
        push_pair(&mut tokens, "--settings", &settings);
    }
    for dir in &options.add_dirs {
        push_pair(&mut tokens, "--add-dir", &dir.display().to_string());
    }
    if !options.mcp_servers.is_empty() {
        push_pair(&mut tokens, "--mcp-config", &mcp_config_json(options)?);
    }
    if options.include_partial_messages {
        tokens.push("--include-partial-messages".into());
    }
    if options.fork_session {
        tokens.push("--fork-session".into());
    }
    if let Some(agents) = &options.agents {
        let value = serde_json::to_string(agents)
            .map_err(|e| AgentError::Sdk(format!("failed to serialize agents: {e}")))?;
        push_pair(&mut tokens, "--agents", &value);
    }
    if let Some(sources) = &options.setting_sources {
        let csv = sources
            .iter()
            .map(|s| s.as_str())
            .collect::<Vec<_>>()
            .join(",");
        // The empty string is meaningful: it loads no settings layers.
        push_pair(&mut tokens, "--setting-sources", &csv);
    }
    for plugin in &options.plugins {
        push_pair(&mut tokens, "--plugin-dir", &plugin.path.display().to_string());
    }
    if let Some(thinking) = options.max_thinking_tokens {
        push_pair(&mut tokens, "--max-thinking-tokens", &thinking.to_string());
    }
    if let Some(effort) = options.effort {
        push_pair(&mut tokens, "--effort", effort.as_str());
    }
    if let Some(schema) = &options.json_schema {
        push_pair(&mut tokens, "--json-schema", &schema.to_string());
    }

    let mut extra: Vec<_> = options.extra_args.iter().collect();
    extra.sort_by(|a, b| a.0.cmp(b.0));
    for (flag, value) in extra {
        if RESERVED_FLAGS.contains(&flag.as_str()) {
            return Err(AgentError::Sdk(format!(
                "extra_args flag '--{flag}' collides with a canonical option; \
                 use the dedicated AgentOptions field instead"
            )));
        }
        tokens.push(format!("--{flag}"));
        if let Some(value) = value {
            tokens.push(value.clone());
        }
    }

    match mode {
        LaunchMode::OneShot { prompt } => {
            tokens.push("--print".into());
            tokens.push("--".into());
            tokens.push(prompt.clone());
        }
        LaunchMode::Streaming => {
            push_pair(&mut tokens, "--input-format", "stream-json");
        }
    }

    let mut temp_files = Vec::new();
    if command_length(&tokens) > limit {
        if let Some(path) = spill_agents(&mut tokens)? {
            debug!(path = %path.display(), "args: spilled --agents value to temp file");
            temp_files.push(path);
        }
    }

    Ok(AssembledArgs { tokens, temp_files })
}

// ── Private helpers ───────────────────────────────────────────────────────────

fn push_pair(tokens: &mut Vec<String>, flag: &str, value: &str) {
    tokens.push(flag.to_owned());
    tokens.push(value.to_owned());
}

/// Total command-line length: tokens joined by single spaces.
fn command_length(tokens: &[String]) -> usize {
    let spaces = tokens.len().saturating_sub(1);
    tokens.iter().map(String::len).sum::<usize>() + spaces
}

/// Build the `--mcp-config` JSON: `{"mcpServers": {name: config, …}}`.
fn mcp_config_json(options: &AgentOptions) -> Result<String> {
    let mut servers = Map::new();
    let mut names: Vec<_> = options.mcp_servers.keys().collect();
    names.sort();
    for name in names {
        let config = &options.mcp_servers[name];
        servers.insert(name.clone(), config.to_config_value(name));
    }
    serde_json::to_string(&json!({ "mcpServers": Value::Object(servers) }))
        .map_err(|e| AgentError::Sdk(format!("failed to serialize mcp config: {e}")))
}

/// Merge a configured sandbox object into the settings value under key
/// `"sandbox"`. Settings may be literal JSON or a file path; a file path
/// is read and merged into literal JSON so the sandbox is not lost.
fn merged_settings(settings: Option<&str>, sandbox: Option<&Value>) -> Result<Option<String>> {
    let Some(sandbox) = sandbox else {
        return Ok(settings.map(str::to_owned));
    };

    let mut object = match settings {
        None => Map::new(),
        Some(literal) if literal.trim_start().starts_with('{') => {
            let parsed: Value = serde_json::from_str(literal)
                .map_err(|e| AgentError::Sdk(format!("invalid settings JSON: {e}")))?;
            match parsed {
                Value::Object(map) => map,
                _ => return Err(AgentError::Sdk("settings JSON must be an object".into())),
            }
        }
        Some(path) => {
            let contents = std::fs::read_to_string(path).map_err(|e| {
                AgentError::Sdk(format!("failed to read settings file '{path}': {e}"))
            })?;
            let parsed: Value = serde_json::from_str(&contents)
                .map_err(|e| AgentError::Sdk(format!("invalid settings file '{path}': {e}")))?;
            match parsed {
                Value::Object(map) => map,
                _ => {
                    return Err(AgentError::Sdk(format!(
                        "settings file '{path}' must contain a JSON object"
                    )))
                }
            }
        }
    };

    object.insert("sandbox".into(), sandbox.clone());
    serde_json::to_string(&Value::Object(object))
        .map(Some)
        .map_err(|e| AgentError::Sdk(format!("failed to serialize settings: {e}")))
}

/// Replace the `--agents` value with `@<temp-file>`; returns the file
/// path to track for cleanup, or `None` when no `--agents` is present.
fn spill_agents(tokens: &mut [String]) -> Result<Option<PathBuf>> {
    let Some(flag_index) = tokens.iter().position(|t| t == "--agents") else {
        return Ok(None);
    };
    let value_index = flag_index + 1;
    if value_index >= tokens.len() {
        return Ok(None);
    }

    let mut file = tempfile::Builder::new()
        .prefix("agent-duplex-agents-")
        .suffix(".json")
        .tempfile()
        .map_err(|e| AgentError::Sdk(format!("failed to create agents spill file: {e}")))?;
    file.write_all(tokens[value_index].as_bytes())
        .map_err(|e| AgentError::Sdk(format!("failed to write agents spill file: {e}")))?;

    let (_file, path) = file
        .keep()
        .map_err(|e| AgentError::Sdk(format!("failed to persist agents spill file: {e}")))?;

    tokens[value_index] = format!("@{}", path.display());
    Ok(Some(path))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
