//! Agent CLI discovery and version probing.
//!
//! Resolution order: explicit path from the options → `CLAUDE_CLI_PATH`
//! → `PATH` search (on Windows also `.cmd`/`.exe` variants) → a fixed
//! list of common install locations. A missing executable is the
//! distinguished [`AgentError::CliNotFound`]; a missing working
//! directory is [`AgentError::WorkingDirectoryNotFound`].

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::process::Command;
use tracing::{debug, warn};

use crate::errors::{AgentError, Result};

/// Environment variable overriding CLI discovery.
pub const CLI_PATH_ENV: &str = "CLAUDE_CLI_PATH";

/// Environment variable that skips the version probe entirely.
pub const SKIP_VERSION_CHECK_ENV: &str = "CLAUDE_AGENT_SDK_SKIP_VERSION_CHECK";

/// Minimum supported version of the agent CLI.
pub const MINIMUM_CLI_VERSION: (u64, u64, u64) = (2, 0, 0);

/// Executable name searched for on `PATH` and in install locations.
const CLI_NAME: &str = "claude";

/// Deadline for the best-effort `-v` probe.
const VERSION_PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Resolve the agent CLI executable.
///
/// # Errors
///
/// - [`AgentError::CliNotFound`] when no candidate exists; the error
///   names the explicit path that was attempted, or the search that was
///   performed.
pub fn find_cli(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        if path.is_file() {
            return Ok(path.to_owned());
        }
        return Err(AgentError::CliNotFound {
            attempted: path.display().to_string(),
        });
    }

    if let Ok(from_env) = env::var(CLI_PATH_ENV) {
        let path = PathBuf::from(&from_env);
        if path.is_file() {
            return Ok(path);
        }
        return Err(AgentError::CliNotFound { attempted: from_env });
    }

    if let Some(path) = search_path() {
        return Ok(path);
    }

    for candidate in install_locations() {
        if candidate.is_file() {
            debug!(path = %candidate.display(), "cli discovery: found in install location");
            return Ok(candidate);
        }
    }

    Err(AgentError::CliNotFound {
        attempted: format!("'{CLI_NAME}' on PATH and common install locations"),
    })
}

/// Check that the configured working directory exists.
///
/// # Errors
///
/// Returns [`AgentError::WorkingDirectoryNotFound`] when it does not.
pub fn check_working_dir(cwd: Option<&Path>) -> Result<()> {
    if let Some(dir) = cwd {
        if !dir.is_dir() {
            return Err(AgentError::WorkingDirectoryNotFound(dir.to_owned()));
        }
    }
    Ok(())
}

/// Best-effort `-v` probe against [`MINIMUM_CLI_VERSION`].
///
/// A version mismatch — or any probe failure — is a warning, never an
/// error. Skipped entirely when [`SKIP_VERSION_CHECK_ENV`] is set.
pub async fn probe_version(cli: &Path) {
    if env::var_os(SKIP_VERSION_CHECK_ENV).is_some() {
        debug!("cli discovery: version check skipped via env");
        return;
    }

    let output = tokio::time::timeout(
        VERSION_PROBE_TIMEOUT,
        Command::new(cli).arg("-v").kill_on_drop(true).output(),
    )
    .await;

    let stdout = match output {
        Ok(Ok(out)) => String::from_utf8_lossy(&out.stdout).into_owned(),
        Ok(Err(err)) => {
            warn!(error = %err, "cli discovery: version probe failed to run");
            return;
        }
        Err(_elapsed) => {
            warn!("cli discovery: version probe timed out");
            return;
        }
    };

    match parse_version(&stdout) {
        Some(version) if version < MINIMUM_CLI_VERSION => {
            let (maj, min, patch) = MINIMUM_CLI_VERSION;
            warn!(
                found = %stdout.trim(),
                minimum = %format!("{maj}.{min}.{patch}"),
                "cli discovery: agent CLI older than supported minimum"
            );
        }
        Some(_) => {}
        None => {
            warn!(output = %stdout.trim(), "cli discovery: unparseable version output");
        }
    }
}

// ── Private helpers ───────────────────────────────────────────────────────────

/// Search `PATH` for the CLI, honoring Windows launcher extensions.
fn search_path() -> Option<PathBuf> {
    let path_var = env::var_os("PATH")?;

    let names: Vec<String> = if cfg!(windows) {
        vec![
            format!("{CLI_NAME}.cmd"),
            format!("{CLI_NAME}.exe"),
            CLI_NAME.to_owned(),
        ]
    } else {
        vec![CLI_NAME.to_owned()]
    };

    for dir in env::split_paths(&path_var) {
        for name in &names {
            let candidate = dir.join(name);
            if candidate.is_file() {
                return Some(candidate);
            }
        }
    }
    None
}

/// Common install locations tried after `PATH`.
fn install_locations() -> Vec<PathBuf> {
    let home = env::var_os("HOME")
        .or_else(|| env::var_os("USERPROFILE"))
        .map(PathBuf::from);

    let mut candidates = Vec::new();
    if let Some(home) = home {
        candidates.push(home.join(".npm-global/bin").join(CLI_NAME));
        candidates.push(home.join(".local/bin").join(CLI_NAME));
        candidates.push(home.join("node_modules/.bin").join(CLI_NAME));
        candidates.push(home.join(".yarn/bin").join(CLI_NAME));
        candidates.push(home.join(".claude/local").join(CLI_NAME));
        candidates.push(home.join(".bun/bin").join(CLI_NAME));
    }
    candidates.push(PathBuf::from("/usr/local/bin").join(CLI_NAME));
    candidates
}

/// Extract a leading `major.minor.patch` triple from probe output.
fn parse_version(output: &str) -> Option<(u64, u64, u64)> {
    let token = output.split_whitespace().next()?;
    let numeric: String = token
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    let mut parts = numeric.split('.');
    let major = parts.next()?.parse().ok()?;
    let minor = parts.next()?.parse().ok()?;
    let patch = parts.next().and_then(|p| p.parse().ok()).unwrap_or(0);
    Some((major, minor, patch))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
