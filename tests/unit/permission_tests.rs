//! Unit tests for permission DTOs: wire shapes and the round-trip
//! property across every update type, rule shape, mode, and destination.

use serde_json::json;

use agent_duplex::permissions::{
    PermissionBehavior, PermissionMode, PermissionResult, PermissionResultAllow,
    PermissionResultDeny, PermissionRuleValue, PermissionUpdate, PermissionUpdateDestination,
};

fn rule(tool: &str, content: Option<&str>) -> PermissionRuleValue {
    PermissionRuleValue {
        tool_name: tool.into(),
        rule_content: content.map(str::to_owned),
    }
}

// ── Round-trip property ──────────────────────────────────────────────────────

/// `from_json(to_json(u)) == u` for every combination of update type,
/// rule content, mode, and destination.
#[test]
fn every_update_combination_round_trips() {
    let behaviors = [
        PermissionBehavior::Allow,
        PermissionBehavior::Deny,
        PermissionBehavior::Ask,
    ];
    let destinations = [
        None,
        Some(PermissionUpdateDestination::UserSettings),
        Some(PermissionUpdateDestination::ProjectSettings),
        Some(PermissionUpdateDestination::LocalSettings),
        Some(PermissionUpdateDestination::Session),
    ];
    let modes = [
        PermissionMode::Default,
        PermissionMode::AcceptEdits,
        PermissionMode::Plan,
        PermissionMode::BypassPermissions,
    ];
    let rules = vec![rule("Bash", Some("git *")), rule("Write", None)];

    let mut updates = Vec::new();
    for behavior in behaviors {
        for destination in destinations {
            updates.push(PermissionUpdate::AddRules {
                rules: rules.clone(),
                behavior,
                destination,
            });
            updates.push(PermissionUpdate::ReplaceRules {
                rules: rules.clone(),
                behavior,
                destination,
            });
            updates.push(PermissionUpdate::RemoveRules {
                rules: rules.clone(),
                behavior,
                destination,
            });
        }
    }
    for mode in modes {
        for destination in destinations {
            updates.push(PermissionUpdate::SetMode { mode, destination });
        }
    }
    for destination in destinations {
        updates.push(PermissionUpdate::AddDirectories {
            directories: vec!["/srv/app".into()],
            destination,
        });
        updates.push(PermissionUpdate::RemoveDirectories {
            directories: vec!["/srv/app".into()],
            destination,
        });
    }

    for update in updates {
        let wire = serde_json::to_value(&update).expect("serialize");
        let back: PermissionUpdate = serde_json::from_value(wire.clone())
            .unwrap_or_else(|e| panic!("deserialize {wire}: {e}"));
        assert_eq!(back, update, "round-trip must be lossless for {wire}");
    }
}

// ── Wire shapes ──────────────────────────────────────────────────────────────

#[test]
fn rule_values_use_camel_case_keys() {
    let wire = serde_json::to_value(rule("Bash", Some("npm *"))).expect("serialize");
    assert_eq!(
        wire,
        json!({ "toolName": "Bash", "ruleContent": "npm *" })
    );

    let wire = serde_json::to_value(rule("Write", None)).expect("serialize");
    assert_eq!(wire, json!({ "toolName": "Write" }), "absent content is omitted");
}

#[test]
fn allow_with_updates_serializes_updated_permissions() {
    let result = PermissionResult::Allow(PermissionResultAllow {
        updated_input: Some(json!({ "command": "git status" })),
        updated_permissions: Some(vec![PermissionUpdate::AddRules {
            rules: vec![rule("Bash", Some("git status"))],
            behavior: PermissionBehavior::Allow,
            destination: Some(PermissionUpdateDestination::Session),
        }]),
    });

    let wire = result.to_wire().expect("serialize");
    assert_eq!(wire["behavior"], "allow");
    assert_eq!(wire["updatedInput"]["command"], "git status");
    assert_eq!(wire["updatedPermissions"][0]["type"], "addRules");
    assert_eq!(wire["updatedPermissions"][0]["destination"], "session");
}

#[test]
fn deny_wire_shape_is_exact() {
    let result = PermissionResult::Deny(PermissionResultDeny {
        message: "tool disabled".into(),
        interrupt: false,
    });
    assert_eq!(
        result.to_wire().expect("serialize"),
        json!({ "behavior": "deny", "message": "tool disabled", "interrupt": false })
    );
}
