// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Approval request construction (§4.8.1): context-key extraction,
//! stable request id generation, and required-scope derivation. The
//! dispatch and response-parsing halves live in
//! `infrastructure::approval_providers`; this module only builds the
//! request and reasons about what scopes it demands.

use sha2::{Digest, Sha256};

use crate::domain::tool::ToolRecord;

/// Tool-specific context key extraction, collapsed from the two parallel
/// implementations the source carried (middleware.rs's version is
/// authoritative; see SPEC_FULL.md §11 / spec §9).
pub fn extract_context_key(tool_name: &str, arguments: &serde_json::Value) -> Option<String> {
    let get_str = |key: &str| arguments.get(key).and_then(|v| v.as_str());

    match tool_name {
        "move_file" => get_str("source").map(str::to_string),
        "read_file" | "write_file" | "delete_file" | "list_directory" => {
            get_str("path").map(str::to_string)
        }
        "run_command" | "execute_shell" => get_str("command").map(|c| {
            c.chars().take(50).collect::<String>()
        }),
        "git_commit" | "git_push" | "git_status" => get_str("working_directory").map(str::to_string),
        "update_admin_policy" | "rotate_secret" | "set_governance_mode" => {
            Some(tool_name.to_string())
        }
        _ => get_str("path")
            .or_else(|| get_str("command"))
            .map(str::to_string),
    }
}

/// `{session_hash[:8]}_{tool}_{context_hash[:8]}_{monotonic_ms}`. The
/// monotonic component is supplied by the caller (see
/// SPEC_FULL.md §10.4 — this module never calls the clock itself so tests
/// can pin the value) rather than sampled here.
pub fn generate_request_id(
    session_id: &str,
    tool_name: &str,
    context_key: Option<&str>,
    monotonic_ms: u64,
) -> String {
    let session_hash = short_hash(session_id);
    let context_hash = short_hash(context_key.unwrap_or(""));
    format!("{session_hash}_{tool_name}_{context_hash}_{monotonic_ms}")
}

fn short_hash(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())[..8].to_string()
}

/// Union of the tool's registered base scopes and argument-derived
/// resource scopes. `move_file` adds scopes for BOTH the source and the
/// destination, distinct from its single-path context key.
pub fn required_scopes(tool: Option<&ToolRecord>, tool_name: &str, arguments: &serde_json::Value) -> Vec<String> {
    let mut scopes: Vec<String> = match tool {
        Some(record) => record.required_scopes.clone(),
        None => {
            tracing::warn!(tool = tool_name, "tool not found in registry, falling back to a coarse scope");
            vec![format!("tool:{tool_name}")]
        }
    };

    let get_str = |key: &str| arguments.get(key).and_then(|v| v.as_str());

    match tool_name {
        "move_file" => {
            if let Some(source) = get_str("source") {
                scopes.push(format!("resource:path:{source}"));
            }
            if let Some(dest) = get_str("destination") {
                scopes.push(format!("resource:path:{dest}"));
            }
        }
        "read_file" | "write_file" | "delete_file" | "list_directory" => {
            if let Some(path) = get_str("path") {
                scopes.push(format!("resource:path:{path}"));
            }
        }
        "run_command" | "execute_shell" => {
            if let Some(command) = get_str("command") {
                let truncated: String = command.chars().take(50).collect();
                scopes.push(format!("resource:command:{truncated}"));
            }
        }
        _ => {}
    }

    scopes.sort();
    scopes.dedup();
    scopes
}

/// Renders the human-facing Markdown approval message.
pub fn render_message(tool_name: &str, arguments: &serde_json::Value) -> String {
    let arguments_display = serde_json::to_string_pretty(arguments).unwrap_or_default();
    let truncated: String = arguments_display.chars().take(1000).collect();
    format!(
        "## Approval requested: `{tool_name}`\n\n\
         **Arguments:**\n```json\n{truncated}\n```\n\n\
         Approve only if you recognize and intend this action. \
         Reply with the scopes you grant; partial or extra scopes are rejected."
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn move_file_uses_source_as_context_key() {
        let args = serde_json::json!({ "source": "/a/b", "destination": "/a/c" });
        assert_eq!(extract_context_key("move_file", &args), Some("/a/b".to_string()));
    }

    #[test]
    fn run_command_truncates_to_fifty_chars() {
        let long_command = "x".repeat(100);
        let args = serde_json::json!({ "command": long_command });
        let key = extract_context_key("run_command", &args).unwrap();
        assert_eq!(key.len(), 50);
    }

    #[test]
    fn admin_tools_use_tool_name_itself() {
        let args = serde_json::json!({});
        assert_eq!(
            extract_context_key("set_governance_mode", &args),
            Some("set_governance_mode".to_string())
        );
    }

    #[test]
    fn request_id_has_four_underscore_separated_parts() {
        let id = generate_request_id("session-1", "write_file", Some("/a/b"), 42);
        let parts: Vec<&str> = id.split('_').collect();
        assert!(parts.len() >= 4);
        assert!(id.ends_with("_42"));
    }

    #[test]
    fn move_file_scopes_include_both_source_and_destination() {
        let args = serde_json::json!({ "source": "/a/b", "destination": "/a/c" });
        let scopes = required_scopes(None, "move_file", &args);
        assert!(scopes.iter().any(|s| s.contains("/a/b")));
        assert!(scopes.iter().any(|s| s.contains("/a/c")));
    }

    #[test]
    fn unregistered_tool_falls_back_to_coarse_scope() {
        let scopes = required_scopes(None, "mystery_tool", &serde_json::json!({}));
        assert_eq!(scopes, vec!["tool:mystery_tool".to_string()]);
    }
}
