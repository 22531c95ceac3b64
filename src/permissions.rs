//! Permission callback surface and permission-update DTOs.
//!
//! When the agent tool wants to invoke a tool it may first ask the
//! application via a `can_use_tool` control request. The application's
//! [`CanUseToolCallback`] answers with a [`PermissionResult`]: allow
//! (optionally rewriting the input and attaching permission updates) or
//! deny (optionally interrupting the current generation).
//!
//! [`PermissionUpdate`] values serialize to the tool's camelCase wire
//! schema and round-trip losslessly through JSON.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::Result;

// ── Permission mode ───────────────────────────────────────────────────────────

/// Permission policy the tool applies to tool invocations.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PermissionMode {
    /// Prompt for dangerous tools.
    #[serde(rename = "default")]
    Default,
    /// Auto-accept file edits.
    #[serde(rename = "acceptEdits")]
    AcceptEdits,
    /// Plan mode — no execution.
    #[serde(rename = "plan")]
    Plan,
    /// Allow everything without prompting.
    #[serde(rename = "bypassPermissions")]
    BypassPermissions,
}

impl PermissionMode {
    /// Wire string for this mode.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::AcceptEdits => "acceptEdits",
            Self::Plan => "plan",
            Self::BypassPermissions => "bypassPermissions",
        }
    }
}

// ── Permission updates ────────────────────────────────────────────────────────

/// Behavior a permission rule applies to matching tool invocations.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PermissionBehavior {
    /// Permit the invocation.
    Allow,
    /// Reject the invocation.
    Deny,
    /// Prompt the operator.
    Ask,
}

/// Where a permission update is persisted by the tool.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PermissionUpdateDestination {
    /// User-level settings file.
    #[serde(rename = "userSettings")]
    UserSettings,
    /// Project-level settings file.
    #[serde(rename = "projectSettings")]
    ProjectSettings,
    /// Local (gitignored) settings file.
    #[serde(rename = "localSettings")]
    LocalSettings,
    /// Current session only.
    #[serde(rename = "session")]
    Session,
}

/// A single permission rule: a tool name plus an optional content matcher.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PermissionRuleValue {
    /// Tool the rule applies to.
    #[serde(rename = "toolName")]
    pub tool_name: String,
    /// Optional matcher over the tool input (e.g. a command prefix).
    #[serde(rename = "ruleContent", skip_serializing_if = "Option::is_none")]
    pub rule_content: Option<String>,
}

/// A live change to the tool's permission configuration.
///
/// Carried on `can_use_tool` responses (`updatedPermissions`) and in
/// permission suggestions from the tool. The wire encoding is tagged by
/// `type` and round-trips losslessly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum PermissionUpdate {
    /// Append rules with the given behavior.
    #[serde(rename = "addRules")]
    AddRules {
        /// Rules to add.
        rules: Vec<PermissionRuleValue>,
        /// Behavior the rules enforce.
        behavior: PermissionBehavior,
        /// Persistence destination.
        #[serde(skip_serializing_if = "Option::is_none")]
        destination: Option<PermissionUpdateDestination>,
    },
    /// Replace all rules with the given behavior.
    #[serde(rename = "replaceRules")]
    ReplaceRules {
        /// Replacement rule set.
        rules: Vec<PermissionRuleValue>,
        /// Behavior the rules enforce.
        behavior: PermissionBehavior,
        /// Persistence destination.
        #[serde(skip_serializing_if = "Option::is_none")]
        destination: Option<PermissionUpdateDestination>,
    },
    /// Remove matching rules.
    #[serde(rename = "removeRules")]
    RemoveRules {
        /// Rules to remove.
        rules: Vec<PermissionRuleValue>,
        /// Behavior of the rules being removed.
        behavior: PermissionBehavior,
        /// Persistence destination.
        #[serde(skip_serializing_if = "Option::is_none")]
        destination: Option<PermissionUpdateDestination>,
    },
    /// Switch the active permission mode.
    #[serde(rename = "setMode")]
    SetMode {
        /// Mode to switch to.
        mode: PermissionMode,
        /// Persistence destination.
        #[serde(skip_serializing_if = "Option::is_none")]
        destination: Option<PermissionUpdateDestination>,
    },
    /// Grant access to additional directories.
    #[serde(rename = "addDirectories")]
    AddDirectories {
        /// Directories to add.
        directories: Vec<String>,
        /// Persistence destination.
        #[serde(skip_serializing_if = "Option::is_none")]
        destination: Option<PermissionUpdateDestination>,
    },
    /// Revoke access to directories.
    #[serde(rename = "removeDirectories")]
    RemoveDirectories {
        /// Directories to remove.
        directories: Vec<String>,
        /// Persistence destination.
        #[serde(skip_serializing_if = "Option::is_none")]
        destination: Option<PermissionUpdateDestination>,
    },
}

// ── Permission results ────────────────────────────────────────────────────────

/// Context passed to the permission callback alongside the tool request.
#[derive(Debug, Clone, Default)]
pub struct ToolPermissionContext {
    /// Permission suggestions offered by the tool, if any.
    pub suggestions: Vec<PermissionUpdate>,
}

/// Allow outcome of a permission decision.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PermissionResultAllow {
    /// Replacement tool input, when the callback rewrites it.
    pub updated_input: Option<Value>,
    /// Permission updates to apply alongside the allow.
    pub updated_permissions: Option<Vec<PermissionUpdate>>,
}

/// Deny outcome of a permission decision.
#[derive(Debug, Clone, PartialEq)]
pub struct PermissionResultDeny {
    /// Reason shown to the model.
    pub message: String,
    /// Whether to interrupt the current generation.
    pub interrupt: bool,
}

/// Outcome of the application's permission callback.
#[derive(Debug, Clone, PartialEq)]
pub enum PermissionResult {
    /// Permit the tool invocation.
    Allow(PermissionResultAllow),
    /// Reject the tool invocation.
    Deny(PermissionResultDeny),
}

impl PermissionResult {
    /// Convenience allow with no input rewrite.
    #[must_use]
    pub fn allow() -> Self {
        Self::Allow(PermissionResultAllow::default())
    }

    /// Convenience deny without interrupt.
    #[must_use]
    pub fn deny(message: impl Into<String>) -> Self {
        Self::Deny(PermissionResultDeny {
            message: message.into(),
            interrupt: false,
        })
    }

    /// Serialize to the `can_use_tool` response wire shape:
    /// `{behavior, updatedInput?, updatedPermissions?, message?, interrupt?}`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::AgentError::Sdk`] if a permission update fails to
    /// serialize (should not occur for well-formed updates).
    pub fn to_wire(&self) -> Result<Value> {
        match self {
            Self::Allow(allow) => {
                let mut out = json!({ "behavior": "allow" });
                if let Some(input) = &allow.updated_input {
                    out["updatedInput"] = input.clone();
                }
                if let Some(updates) = &allow.updated_permissions {
                    out["updatedPermissions"] = serde_json::to_value(updates)
                        .map_err(|e| crate::AgentError::Sdk(format!(
                            "failed to serialize permission updates: {e}"
                        )))?;
                }
                Ok(out)
            }
            Self::Deny(deny) => Ok(json!({
                "behavior": "deny",
                "message": deny.message,
                "interrupt": deny.interrupt,
            })),
        }
    }
}

/// Application-supplied permission callback.
///
/// Invoked with the tool name, the proposed tool input, and the
/// permission context. The returned future resolves to the decision.
pub type CanUseToolCallback = Arc<
    dyn Fn(
            String,
            Value,
            ToolPermissionContext,
        ) -> Pin<Box<dyn Future<Output = Result<PermissionResult>> + Send>>
        + Send
        + Sync,
>;

// ── Tests ─────────────────────────────────────────────────────────────────────
