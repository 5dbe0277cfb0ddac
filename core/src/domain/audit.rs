// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! The closed set of governance audit event tags and the record shape
//! written to the append-only log. Serialization and rotation live in
//! `infrastructure::audit_log`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventTag {
    ToolInvoked,
    ApprovalRequested,
    ApprovalGranted,
    ApprovalDenied,
    ApprovalTimeout,
    ScopedElevationUsed,
    ScopedElevationGranted,
    ElevationsRevoked,
    ModeChanged,
    BlockedReadOnly,
    BypassExecuted,
}

impl AuditEventTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditEventTag::ToolInvoked => "tool_invoked",
            AuditEventTag::ApprovalRequested => "approval_requested",
            AuditEventTag::ApprovalGranted => "approval_granted",
            AuditEventTag::ApprovalDenied => "approval_denied",
            AuditEventTag::ApprovalTimeout => "approval_timeout",
            AuditEventTag::ScopedElevationUsed => "scoped_elevation_used",
            AuditEventTag::ScopedElevationGranted => "scoped_elevation_granted",
            AuditEventTag::ElevationsRevoked => "elevations_revoked",
            AuditEventTag::ModeChanged => "mode_changed",
            AuditEventTag::BlockedReadOnly => "blocked_read_only",
            AuditEventTag::BypassExecuted => "bypass_executed",
        }
    }
}

/// One line of the audit log. `fields` carries event-specific data;
/// string values inside it are truncated recursively before being
/// written (see `infrastructure::audit_log::truncate_strings`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub event: AuditEventTag,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(flatten)]
    pub fields: serde_json::Map<String, serde_json::Value>,
}

impl AuditRecord {
    pub fn new(
        event: AuditEventTag,
        session_id: Option<&str>,
        request_id: Option<&str>,
        fields: serde_json::Map<String, serde_json::Value>,
    ) -> Self {
        Self {
            timestamp: chrono::Utc::now(),
            event,
            session_id: session_id.map(str::to_string),
            request_id: request_id.map(str::to_string),
            fields,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_tags_serialize_to_closed_set_strings() {
        assert_eq!(AuditEventTag::ToolInvoked.as_str(), "tool_invoked");
        assert_eq!(AuditEventTag::ScopedElevationUsed.as_str(), "scoped_elevation_used");
        assert_eq!(AuditEventTag::BypassExecuted.as_str(), "bypass_executed");
    }

    #[test]
    fn record_carries_correlation_ids() {
        let record = AuditRecord::new(
            AuditEventTag::ToolInvoked,
            Some("session-1"),
            Some("req-1"),
            serde_json::Map::new(),
        );
        assert_eq!(record.session_id.as_deref(), Some("session-1"));
        assert_eq!(record.request_id.as_deref(), Some("req-1"));
    }
}
