// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! The three bootstrap tool handlers driving progressive discovery
//! (§4.9, §6, §11.3): `search_tools`, `get_tool_schema`,
//! `expand_tool_schema`.

use thiserror::Error;

use crate::domain::approval::{validate_scope_laws, ApprovalDecision, ApprovalRequest};
use crate::domain::audit::AuditEventTag;
use crate::domain::lease::ToolLease;
use crate::domain::policy::{evaluate_policy, GovernanceMode, PolicyAction};
use crate::domain::tool::{RiskLevel, ToolCandidate};
use crate::infrastructure::approval_providers::{select_provider, ApprovalProvider};
use crate::infrastructure::audit_log::AuditLog;
use crate::infrastructure::config::Config;
use crate::infrastructure::lease_store::LeaseStore;
use crate::infrastructure::registry::Registry;
use crate::infrastructure::state_store::StateStore;
use crate::infrastructure::token_service::TokenService;

use super::approval_pipeline::{generate_request_id, render_message, required_scopes};
use super::search::{search, SearchIndex};

const MIN_TOP_K: usize = 1;
const MAX_TOP_K: usize = 25;

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("unknown tool: {0}")]
    UnknownTool(String),
    #[error("blocked by policy")]
    Blocked,
    #[error("approval was denied")]
    ApprovalDenied,
    #[error("approval timed out")]
    ApprovalTimeout,
    #[error("approval response violated the scope laws: {0}")]
    ScopeLawViolation(&'static str),
    #[error("no approval provider is available")]
    NoProviderAvailable,
    #[error("requires an existing lease")]
    NoLease,
}

fn fields(pairs: &[(&str, serde_json::Value)]) -> serde_json::Map<String, serde_json::Value> {
    pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
}

pub struct SearchToolsResult {
    pub candidates: Vec<ToolCandidate>,
}

pub fn search_tools(
    index: &SearchIndex,
    registry: &Registry,
    query: &str,
    mode: GovernanceMode,
    top_k: Option<usize>,
) -> SearchToolsResult {
    let clamped = top_k.map(|k| k.clamp(MIN_TOP_K, MAX_TOP_K));
    let records: Vec<_> = registry.get_all().collect();
    SearchToolsResult {
        candidates: search(index, &records, query, mode, clamped),
    }
}

pub struct SchemaResult {
    pub schema: serde_json::Value,
    pub expires_at: chrono::DateTime<chrono::Utc>,
    pub calls_remaining: i64,
}

/// Evaluates policy at schema-exposure time. `block` never leaks the
/// schema. `require_approval` elicits via the provider chain — a
/// `write_file`-class tool's lease is born here, not later in the
/// middleware, since `get_tool_schema` is the sole lease-granting route
/// (§4.9). `allow` and an approved elicitation both fall through to the
/// same lease grant below.
#[allow(clippy::too_many_arguments)]
pub async fn get_tool_schema(
    registry: &Registry,
    lease_store: &dyn LeaseStore,
    token_service: &TokenService,
    config: &Config,
    audit_log: &AuditLog,
    approval_providers: &[Box<dyn ApprovalProvider>],
    client_id: &str,
    session_id: &str,
    tool_name: &str,
    mode: GovernanceMode,
) -> Result<SchemaResult, DiscoveryError> {
    let record = registry
        .get(tool_name)
        .ok_or_else(|| DiscoveryError::UnknownTool(tool_name.to_string()))?;

    let decision = evaluate_policy(mode, record.risk_level, tool_name);
    match decision.action {
        PolicyAction::Block => return Err(DiscoveryError::Blocked),
        PolicyAction::Allow => {}
        PolicyAction::RequireApproval => {
            elicit_schema_approval(audit_log, approval_providers, record, session_id, tool_name).await?;
        }
    }

    let profile = config
        .lease_profiles
        .get(&record.risk_level)
        .cloned()
        .unwrap_or(crate::infrastructure::config::LeaseProfile {
            ttl_seconds: 300,
            calls: 1,
        });

    let token = token_service
        .generate(client_id, tool_name, profile.ttl_seconds, None)
        .ok();

    let lease = ToolLease::new(
        client_id,
        tool_name,
        profile.ttl_seconds,
        profile.calls,
        mode.as_str(),
        token,
    )
    .map_err(|_| DiscoveryError::Blocked)?;

    lease_store
        .grant(&lease)
        .await
        .map_err(|_| DiscoveryError::Blocked)?;

    Ok(SchemaResult {
        schema: record.schema_min.clone(),
        expires_at: lease.expires_at,
        calls_remaining: lease.calls_remaining,
    })
}

/// Elicits approval for granting a lease on a `require_approval` tool.
/// There are no call arguments yet at schema-exposure time, so the
/// request carries an empty argument object and no context key — it
/// approves exposing the tool at all, not any one invocation of it.
async fn elicit_schema_approval(
    audit_log: &AuditLog,
    approval_providers: &[Box<dyn ApprovalProvider>],
    record: &crate::domain::tool::ToolRecord,
    session_id: &str,
    tool_name: &str,
) -> Result<(), DiscoveryError> {
    let empty_arguments = serde_json::json!({});
    let required = required_scopes(Some(record), tool_name, &empty_arguments);
    let request_id = generate_request_id(
        session_id,
        tool_name,
        None,
        chrono::Utc::now().timestamp_millis() as u64,
    );
    let request = ApprovalRequest {
        request_id: request_id.clone(),
        tool_name: tool_name.to_string(),
        message: render_message(tool_name, &empty_arguments),
        required_scopes: required.clone(),
        artifact_path: None,
        timeout_seconds: 300,
        session_id: session_id.to_string(),
        arguments: empty_arguments.clone(),
        context_key: None,
    };

    audit_log.log_event(
        AuditEventTag::ApprovalRequested,
        Some(session_id),
        Some(&request_id),
        fields(&[("tool", tool_name.into())]),
    );

    let provider = select_provider(approval_providers, None)
        .await
        .ok_or(DiscoveryError::NoProviderAvailable)?;
    let response = provider.request_approval(&request).await;

    match response.decision {
        ApprovalDecision::Timeout => {
            audit_log.log_event(
                AuditEventTag::ApprovalTimeout,
                Some(session_id),
                Some(&response.request_id),
                fields(&[("tool", tool_name.into())]),
            );
            Err(DiscoveryError::ApprovalTimeout)
        }
        ApprovalDecision::Denied | ApprovalDecision::Error => {
            audit_log.log_event(
                AuditEventTag::ApprovalDenied,
                Some(session_id),
                Some(&response.request_id),
                fields(&[("tool", tool_name.into())]),
            );
            Err(DiscoveryError::ApprovalDenied)
        }
        ApprovalDecision::Approved => {
            if let Err(violation) = validate_scope_laws(&response.selected_scopes, &required) {
                audit_log.log_event(
                    AuditEventTag::ApprovalDenied,
                    Some(session_id),
                    Some(&response.request_id),
                    fields(&[
                        ("tool", tool_name.into()),
                        ("reason", violation.reason().into()),
                    ]),
                );
                return Err(DiscoveryError::ScopeLawViolation(violation.reason()));
            }

            audit_log.log_event(
                AuditEventTag::ApprovalGranted,
                Some(session_id),
                Some(&response.request_id),
                fields(&[("tool", tool_name.into())]),
            );
            Ok(())
        }
    }
}

/// Requires an already-live lease; performs no new policy check — the
/// lease already authorized exposure of a schema for this tool.
pub async fn expand_tool_schema(
    registry: &Registry,
    lease_store: &dyn LeaseStore,
    client_id: &str,
    tool_name: &str,
) -> Result<serde_json::Value, DiscoveryError> {
    let record = registry
        .get(tool_name)
        .ok_or_else(|| DiscoveryError::UnknownTool(tool_name.to_string()))?;

    if lease_store.validate(client_id, tool_name).await.is_none() {
        return Err(DiscoveryError::NoLease);
    }

    if record.schema_full.is_null() || record.schema_full == record.schema_min {
        tracing::warn!(tool = tool_name, "no distinct schema_full, falling back to schema_min");
        return Ok(record.schema_min.clone());
    }
    Ok(record.schema_full.clone())
}

/// Intersects the transport's advertised tool list with bootstrap tools
/// plus whatever the client holds a live lease for (§4.9 list-tools
/// filtering).
pub async fn visible_tools(
    registry: &Registry,
    lease_store: &dyn LeaseStore,
    client_id: &str,
) -> Vec<String> {
    let mut visible: Vec<String> = Registry::get_bootstrap_tools().iter().map(|s| s.to_string()).collect();
    for record in registry.get_all() {
        if record.is_bootstrap() {
            continue;
        }
        if lease_store.validate(client_id, &record.tool_id).await.is_some() {
            visible.push(record.tool_id.clone());
        }
    }
    visible
}

pub async fn read_mode(store: &dyn StateStore) -> GovernanceMode {
    store.get_mode().await
}
