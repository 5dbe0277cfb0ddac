// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Governance middleware (§4.9): the ordered pipeline every non-bootstrap
//! tool call passes through between the transport and the downstream tool
//! server. Lease possession, policy, scoped elevation, and approval
//! elicitation all get decided here before a call is ever forwarded.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::approval::{
    validate_scope_laws, ApprovalDecision, ApprovalRequest, ApprovalResponse,
};
use crate::domain::audit::AuditEventTag;
use crate::domain::policy::{evaluate_policy, GovernanceMode, PolicyAction};
use crate::domain::tool::{RiskLevel, ToolRecord};
use crate::infrastructure::approval_providers::{select_provider, ApprovalProvider};
use crate::infrastructure::audit_log::AuditLog;
use crate::infrastructure::lease_store::LeaseStore;
use crate::infrastructure::registry::Registry;
use crate::infrastructure::state_store::{compute_elevation_hash, StateStore};
use crate::infrastructure::token_service::TokenService;

use super::approval_pipeline::{extract_context_key, generate_request_id, render_message, required_scopes};
use super::compressor::encode_best_effort;

#[derive(Debug, Error)]
pub enum MiddlewareError {
    #[error("tool {0} is not registered")]
    UnknownTool(String),
    #[error("no active lease for this tool")]
    NoLease,
    #[error("capability token is invalid or does not match this call")]
    InvalidToken,
    #[error("lease was exhausted by a concurrent call")]
    LeaseExhausted,
    #[error("blocked by governance policy in read-only mode")]
    BlockedReadOnly,
    #[error("approval was denied")]
    ApprovalDenied,
    #[error("approval timed out")]
    ApprovalTimeout,
    #[error("approval response violated the scope laws: {0}")]
    ScopeLawViolation(&'static str),
    #[error("no approval provider is available")]
    NoProviderAvailable,
    #[error("downstream tool call failed: {0}")]
    Forward(String),
}

/// The downstream collaborator that actually executes a tool call. Real
/// dispatch to an MCP tool server is outside this crate's scope; callers
/// supply an implementation that bridges to it.
#[async_trait]
pub trait ToolForwarder: Send + Sync {
    async fn forward(
        &self,
        tool_name: &str,
        arguments: &serde_json::Value,
    ) -> Result<serde_json::Value, String>;
}

pub struct GovernanceMiddleware {
    registry: Arc<Registry>,
    lease_store: Arc<dyn LeaseStore>,
    state_store: Arc<dyn StateStore>,
    token_service: TokenService,
    audit_log: Arc<AuditLog>,
    approval_providers: Arc<Vec<Box<dyn ApprovalProvider>>>,
    toon_threshold: usize,
}

impl GovernanceMiddleware {
    pub fn new(
        registry: Arc<Registry>,
        lease_store: Arc<dyn LeaseStore>,
        state_store: Arc<dyn StateStore>,
        token_service: TokenService,
        audit_log: Arc<AuditLog>,
        approval_providers: Arc<Vec<Box<dyn ApprovalProvider>>>,
        toon_threshold: usize,
    ) -> Self {
        Self {
            registry,
            lease_store,
            state_store,
            token_service,
            audit_log,
            approval_providers,
            toon_threshold,
        }
    }

    /// Runs the full 9-step pipeline and, on a forward, shapes the response
    /// through the output compressor before handing it back.
    pub async fn invoke_tool(
        &self,
        forwarder: &dyn ToolForwarder,
        client_id: &str,
        session_id: &str,
        tool_name: &str,
        arguments: serde_json::Value,
        capability_token: Option<&str>,
    ) -> Result<serde_json::Value, MiddlewareError> {
        let record = self
            .registry
            .get(tool_name)
            .ok_or_else(|| MiddlewareError::UnknownTool(tool_name.to_string()))?;
        let context_key = extract_context_key(tool_name, &arguments);

        // Step 1: lease gate. Bootstrap tools carry no lease. Validation
        // only checks existence/expiry/token here — the call budget is
        // consumed later, only on the path that actually forwards, so a
        // blocked/denied/timed-out call never costs the client a use.
        if !record.is_bootstrap() {
            let lease = self
                .lease_store
                .validate(client_id, tool_name)
                .await
                .ok_or(MiddlewareError::NoLease)?;

            if let Some(token) = &lease.capability_token {
                let presented = capability_token.unwrap_or(token.as_str());
                // The token was minted against the lease itself (client,
                // tool), never against a particular call's context key, so
                // it's verified against that same binding here.
                if !self.token_service.verify(presented, client_id, tool_name, None) {
                    self.lease_store.revoke(client_id, tool_name).await;
                    return Err(MiddlewareError::InvalidToken);
                }
            }
        }

        // Step 2: mode read, unconditionally audited.
        let mode = self.state_store.get_mode().await;
        self.audit_log.log_event(
            AuditEventTag::ToolInvoked,
            Some(session_id),
            None,
            fields(&[("tool", tool_name.into()), ("mode", mode.as_str().into())]),
        );

        // Step 3: bypass path.
        if mode == GovernanceMode::Bypass {
            self.audit_log.log_event(
                AuditEventTag::BypassExecuted,
                Some(session_id),
                None,
                fields(&[("tool", tool_name.into())]),
            );
            return self.consume_and_forward(forwarder, record, client_id, tool_name, &arguments).await;
        }

        // Step 4: safe risk passes through regardless of mode.
        if record.risk_level == RiskLevel::Safe {
            return self.consume_and_forward(forwarder, record, client_id, tool_name, &arguments).await;
        }

        let decision = evaluate_policy(mode, record.risk_level, tool_name);

        // Step 5: read-only block.
        if decision.action == PolicyAction::Block {
            self.audit_log.log_event(
                AuditEventTag::BlockedReadOnly,
                Some(session_id),
                None,
                fields(&[("tool", tool_name.into()), ("reason", decision.reason.into())]),
            );
            return Err(MiddlewareError::BlockedReadOnly);
        }

        if decision.action == PolicyAction::Allow {
            return self.consume_and_forward(forwarder, record, client_id, tool_name, &arguments).await;
        }

        // Step 6: scoped elevation shortcut.
        if let Some(key) = &context_key {
            let elevation_key = compute_elevation_hash(tool_name, key, session_id);
            if self.state_store.check_elevation(&elevation_key).await {
                self.audit_log.log_event(
                    AuditEventTag::ScopedElevationUsed,
                    Some(session_id),
                    None,
                    fields(&[("tool", tool_name.into()), ("context_key", key.as_str().into())]),
                );
                return self.consume_and_forward(forwarder, record, client_id, tool_name, &arguments).await;
            }
        }

        // Step 7: elicit approval.
        let required = required_scopes(Some(record), tool_name, &arguments);
        let request_id = generate_request_id(
            session_id,
            tool_name,
            context_key.as_deref(),
            chrono::Utc::now().timestamp_millis() as u64,
        );
        let request = ApprovalRequest {
            request_id: request_id.clone(),
            tool_name: tool_name.to_string(),
            message: render_message(tool_name, &arguments),
            required_scopes: required.clone(),
            artifact_path: None,
            timeout_seconds: 300,
            session_id: session_id.to_string(),
            arguments: arguments.clone(),
            context_key: context_key.clone(),
        };

        self.audit_log.log_event(
            AuditEventTag::ApprovalRequested,
            Some(session_id),
            Some(&request_id),
            fields(&[("tool", tool_name.into())]),
        );

        let provider = select_provider(&self.approval_providers, None)
            .await
            .ok_or(MiddlewareError::NoProviderAvailable)?;
        let response = provider.request_approval(&request).await;

        self.handle_approval_response(session_id, tool_name, &context_key, &required, response)
            .await?;

        // Step 8: consume and forward. Only reached once every block/deny/
        // timeout/scope-violation exit above has already returned.
        self.consume_and_forward(forwarder, record, client_id, tool_name, &arguments).await
    }

    async fn handle_approval_response(
        &self,
        session_id: &str,
        tool_name: &str,
        context_key: &Option<String>,
        required: &[String],
        response: ApprovalResponse,
    ) -> Result<(), MiddlewareError> {
        match response.decision {
            ApprovalDecision::Timeout => {
                self.audit_log.log_event(
                    AuditEventTag::ApprovalTimeout,
                    Some(session_id),
                    Some(&response.request_id),
                    fields(&[("tool", tool_name.into())]),
                );
                Err(MiddlewareError::ApprovalTimeout)
            }
            ApprovalDecision::Denied | ApprovalDecision::Error => {
                self.audit_log.log_event(
                    AuditEventTag::ApprovalDenied,
                    Some(session_id),
                    Some(&response.request_id),
                    fields(&[("tool", tool_name.into())]),
                );
                Err(MiddlewareError::ApprovalDenied)
            }
            ApprovalDecision::Approved => {
                if let Err(violation) = validate_scope_laws(&response.selected_scopes, required) {
                    self.audit_log.log_event(
                        AuditEventTag::ApprovalDenied,
                        Some(session_id),
                        Some(&response.request_id),
                        fields(&[
                            ("tool", tool_name.into()),
                            ("reason", violation.reason().into()),
                        ]),
                    );
                    return Err(MiddlewareError::ScopeLawViolation(violation.reason()));
                }

                self.audit_log.log_event(
                    AuditEventTag::ApprovalGranted,
                    Some(session_id),
                    Some(&response.request_id),
                    fields(&[("tool", tool_name.into())]),
                );

                // `lease_seconds == 0` means single-use, no standing
                // elevation: the current call proceeds but nothing is
                // cached for next time.
                if response.lease_seconds > 0 {
                    if let Some(key) = context_key {
                        let elevation_key = compute_elevation_hash(tool_name, key, session_id);
                        self.state_store
                            .grant_elevation(&elevation_key, response.lease_seconds as i64)
                            .await;
                        self.audit_log.log_event(
                            AuditEventTag::ScopedElevationGranted,
                            Some(session_id),
                            Some(&response.request_id),
                            fields(&[
                                ("tool", tool_name.into()),
                                ("lease_seconds", (response.lease_seconds as i64).into()),
                            ]),
                        );
                    }
                }

                Ok(())
            }
        }
    }

    /// Consumes a call from the lease's budget and forwards, in that
    /// order, so the budget is only spent on a call that actually reaches
    /// this point — every block/deny/timeout/scope-violation exit above
    /// returns before ever calling this.
    async fn consume_and_forward(
        &self,
        forwarder: &dyn ToolForwarder,
        record: &ToolRecord,
        client_id: &str,
        tool_name: &str,
        arguments: &serde_json::Value,
    ) -> Result<serde_json::Value, MiddlewareError> {
        if !record.is_bootstrap()
            && self.lease_store.consume(client_id, tool_name).await.is_none()
        {
            return Err(MiddlewareError::LeaseExhausted);
        }
        self.forward_and_compress(forwarder, tool_name, arguments).await
    }

    async fn forward_and_compress(
        &self,
        forwarder: &dyn ToolForwarder,
        tool_name: &str,
        arguments: &serde_json::Value,
    ) -> Result<serde_json::Value, MiddlewareError> {
        let result = forwarder
            .forward(tool_name, arguments)
            .await
            .map_err(MiddlewareError::Forward)?;
        Ok(encode_best_effort(&result, self.toon_threshold))
    }
}

fn fields(pairs: &[(&str, serde_json::Value)]) -> serde_json::Map<String, serde_json::Value> {
    pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
}
