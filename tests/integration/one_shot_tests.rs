//! End-to-end one-shot tests against a fake agent CLI (a shell script),
//! covering the happy path, buffer overflow, and nonzero exits.

#![cfg(unix)]

use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;

use futures_util::StreamExt;
use serde_json::json;

use agent_duplex::errors::AgentError;
use agent_duplex::message::{ContentBlock, Message, UserContent};
use agent_duplex::options::AgentOptions;
use agent_duplex::query::query;
use agent_duplex::transport::{LaunchMode, SubprocessTransport, Transport};

/// Write an executable shell script acting as the agent CLI.
fn fake_cli(dir: &tempfile::TempDir, body: &str) -> PathBuf {
    let path = dir.path().join("claude");
    let mut file = std::fs::File::create(&path).expect("create script");
    writeln!(file, "#!/bin/sh").expect("write shebang");
    writeln!(file, "{body}").expect("write body");
    drop(file);

    let mut perms = std::fs::metadata(&path).expect("metadata").permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).expect("chmod");
    path
}

fn options_for(cli: PathBuf) -> AgentOptions {
    std::env::set_var("CLAUDE_AGENT_SDK_SKIP_VERSION_CHECK", "1");
    AgentOptions {
        cli_path: Some(cli),
        ..AgentOptions::default()
    }
}

// ── Happy path ───────────────────────────────────────────────────────────────

/// One-shot success: the session yields exactly the assistant message
/// and the result, in order, then ends.
#[tokio::test]
async fn one_shot_yields_messages_then_eof() {
    let dir = tempfile::tempdir().expect("tempdir");
    let cli = fake_cli(
        &dir,
        r#"cat <<'EOF'
{"type":"assistant","message":{"content":[{"type":"text","text":"4"}],"model":"fake-model"}}
{"type":"result","subtype":"success","duration_ms":5,"duration_api_ms":3,"is_error":false,"num_turns":1,"session_id":"s1","total_cost_usd":0.0012}
EOF"#,
    );

    let stream = query("What is 2+2?", Some(options_for(cli))).await.expect("spawn");
    let messages: Vec<Message> = stream
        .map(|m| m.expect("message parses"))
        .collect::<Vec<_>>()
        .await;

    assert_eq!(messages.len(), 2, "exactly two messages, then EOF");
    match &messages[0] {
        Message::Assistant(assistant) => {
            assert_eq!(assistant.model, "fake-model");
            assert_eq!(
                assistant.content,
                vec![ContentBlock::Text { text: "4".into() }]
            );
        }
        other => panic!("expected Assistant first, got {other:?}"),
    }
    match &messages[1] {
        Message::Result(result) => {
            assert!(!result.is_error);
            assert_eq!(result.num_turns, 1);
            assert_eq!(result.total_cost_usd, Some(0.0012));
        }
        other => panic!("expected Result second, got {other:?}"),
    }
}

/// The user echo with string content flows through the same path.
#[tokio::test]
async fn one_shot_parses_user_echo() {
    let dir = tempfile::tempdir().expect("tempdir");
    let cli = fake_cli(
        &dir,
        r#"cat <<'EOF'
{"type":"user","message":{"role":"user","content":"hi"},"uuid":"u1"}
{"type":"result","subtype":"success","duration_ms":1,"duration_api_ms":1,"is_error":false,"num_turns":1,"session_id":"s1"}
EOF"#,
    );

    let stream = query("hi", Some(options_for(cli))).await.expect("spawn");
    let messages: Vec<Message> = stream.map(|m| m.expect("parses")).collect().await;
    match &messages[0] {
        Message::User(user) => assert_eq!(user.content, UserContent::Text("hi".into())),
        other => panic!("expected User, got {other:?}"),
    }
}

// ── Failure mapping ──────────────────────────────────────────────────────────

/// An oversized line raises a decode error naming the limit, and a
/// subsequent write fails with a lost connection.
#[tokio::test]
async fn buffer_overflow_then_connection_lost() {
    let dir = tempfile::tempdir().expect("tempdir");
    let cli = fake_cli(&dir, "head -c 4097 /dev/zero | tr '\\0' 'a'; echo; sleep 2");
    let mut options = options_for(cli);
    options.max_buffer_size = Some(4096);

    let transport = SubprocessTransport::connect(&options, LaunchMode::Streaming, "sdk-rust")
        .await
        .expect("spawn");

    let err = transport
        .read_record()
        .await
        .expect("one item")
        .expect_err("must be a decode error");
    match &err {
        AgentError::Decode { reason, .. } => {
            assert!(reason.contains("4096"), "reason must name the limit: {reason}");
        }
        other => panic!("expected Decode, got {other:?}"),
    }

    let write_err = transport
        .write_record(json!({ "type": "user" }))
        .await
        .expect_err("poisoned transport rejects writes");
    assert!(
        matches!(write_err, AgentError::ConnectionLost(_)),
        "got {write_err:?}"
    );

    transport.close().await.expect("close");
}

/// A nonzero exit surfaces as `ProcessFailed` with the exit code once
/// the stream drains.
#[tokio::test]
async fn nonzero_exit_surfaces_process_failed() {
    let dir = tempfile::tempdir().expect("tempdir");
    let cli = fake_cli(
        &dir,
        r#"echo '{"type":"system","subtype":"init","data":{}}'
echo boom >&2
exit 3"#,
    );

    let transport =
        SubprocessTransport::connect(&options_for(cli), LaunchMode::Streaming, "sdk-rust")
            .await
            .expect("spawn");

    let first = transport
        .read_record()
        .await
        .expect("record")
        .expect("valid record");
    assert_eq!(first["subtype"], "init");

    let err = transport
        .read_record()
        .await
        .expect("final item")
        .expect_err("exit 3 must surface");
    match err {
        AgentError::ProcessFailed { exit_code, .. } => assert_eq!(exit_code, Some(3)),
        other => panic!("expected ProcessFailed, got {other:?}"),
    }
    assert!(transport.read_record().await.is_none(), "then EOF");

    transport.close().await.expect("close");
}

/// A clean zero exit produces EOF with no error.
#[tokio::test]
async fn clean_exit_is_plain_eof() {
    let dir = tempfile::tempdir().expect("tempdir");
    let cli = fake_cli(&dir, r#"echo '{"type":"result","subtype":"success","duration_ms":1,"duration_api_ms":1,"is_error":false,"num_turns":1,"session_id":"s"}'"#);

    let transport =
        SubprocessTransport::connect(&options_for(cli), LaunchMode::Streaming, "sdk-rust")
            .await
            .expect("spawn");

    transport.read_record().await.expect("record").expect("ok");
    assert!(transport.read_record().await.is_none());
    transport.close().await.expect("close");
}

/// A missing executable is the distinguished `CliNotFound`.
#[tokio::test]
async fn missing_cli_is_distinguished() {
    let options = AgentOptions {
        cli_path: Some(PathBuf::from("/nonexistent/claude")),
        ..AgentOptions::default()
    };
    let err = SubprocessTransport::connect(&options, LaunchMode::Streaming, "sdk-rust")
        .await
        .expect_err("must fail");
    assert!(matches!(err, AgentError::CliNotFound { .. }), "got {err:?}");
}
