// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! The ephemeral, Redis-backed grant authorizing a client to call a tool.
//!
//! This module only holds the value type and its invariants. Storage,
//! atomicity, and notification live in `infrastructure::lease_store`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LeaseError {
    #[error("client_id must not be empty")]
    EmptyClientId,
    #[error("tool_id must not be empty")]
    EmptyToolId,
    #[error("ttl_seconds must be positive, got {0}")]
    NonPositiveTtl(i64),
    #[error("calls_remaining must not be negative, got {0}")]
    NegativeCalls(i64),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolLease {
    pub client_id: String,
    pub tool_id: String,
    pub granted_at: chrono::DateTime<chrono::Utc>,
    pub expires_at: chrono::DateTime<chrono::Utc>,
    pub calls_remaining: i64,
    pub mode_at_issue: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capability_token: Option<String>,
}

impl ToolLease {
    pub fn new(
        client_id: impl Into<String>,
        tool_id: impl Into<String>,
        ttl_seconds: i64,
        calls_remaining: i64,
        mode_at_issue: impl Into<String>,
        capability_token: Option<String>,
    ) -> Result<Self, LeaseError> {
        let client_id = client_id.into();
        let tool_id = tool_id.into();
        if client_id.trim().is_empty() {
            return Err(LeaseError::EmptyClientId);
        }
        if tool_id.trim().is_empty() {
            return Err(LeaseError::EmptyToolId);
        }
        if ttl_seconds <= 0 {
            return Err(LeaseError::NonPositiveTtl(ttl_seconds));
        }
        if calls_remaining < 0 {
            return Err(LeaseError::NegativeCalls(calls_remaining));
        }
        let granted_at = chrono::Utc::now();
        Ok(Self {
            client_id,
            tool_id,
            granted_at,
            expires_at: granted_at + chrono::Duration::seconds(ttl_seconds),
            calls_remaining,
            mode_at_issue: mode_at_issue.into(),
            capability_token,
        })
    }

    pub fn store_key(client_id: &str, tool_id: &str) -> String {
        format!("lease:{client_id}:{tool_id}")
    }

    pub fn is_expired_at(&self, now: chrono::DateTime<chrono::Utc>) -> bool {
        now > self.expires_at
    }

    pub fn has_calls(&self) -> bool {
        self.calls_remaining > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_client_id() {
        let err = ToolLease::new("", "read_file", 300, 3, "permission", None).unwrap_err();
        assert_eq!(err, LeaseError::EmptyClientId);
    }

    #[test]
    fn rejects_non_positive_ttl() {
        let err = ToolLease::new("c1", "read_file", 0, 3, "permission", None).unwrap_err();
        assert_eq!(err, LeaseError::NonPositiveTtl(0));
    }

    #[test]
    fn rejects_negative_calls() {
        let err = ToolLease::new("c1", "read_file", 300, -1, "permission", None).unwrap_err();
        assert_eq!(err, LeaseError::NegativeCalls(-1));
    }

    #[test]
    fn store_key_scopes_by_client_and_tool() {
        assert_eq!(ToolLease::store_key("c1", "read_file"), "lease:c1:read_file");
    }

    #[test]
    fn expiry_is_relative_to_wall_clock() {
        let lease = ToolLease::new("c1", "read_file", 300, 3, "permission", None).unwrap();
        assert!(!lease.is_expired_at(lease.granted_at));
        assert!(lease.is_expired_at(lease.expires_at + chrono::Duration::seconds(1)));
    }
}
