// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Approval request/response value types and the scope-subset laws that
//! turn a loosely-parsed human response into a governance decision.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub request_id: String,
    pub tool_name: String,
    pub message: String,
    pub required_scopes: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact_path: Option<String>,
    pub timeout_seconds: u64,
    pub session_id: String,
    pub arguments: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_key: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalDecision {
    Approved,
    Denied,
    Timeout,
    Error,
}

impl ApprovalDecision {
    /// Normalizes the source's many accepted spellings:
    /// `{approved, approve, yes, y}`, `{denied, deny, no, n}`, `timeout`,
    /// `error` — case-insensitive.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "approved" | "approve" | "yes" | "y" => Some(Self::Approved),
            "denied" | "deny" | "no" | "n" => Some(Self::Denied),
            "timeout" => Some(Self::Timeout),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalResponse {
    pub request_id: String,
    pub decision: ApprovalDecision,
    #[serde(default)]
    pub selected_scopes: Vec<String>,
    #[serde(default)]
    pub lease_seconds: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeLawViolation {
    NoScopesSelected,
    MissingRequired,
    ExtraScopes,
}

impl ScopeLawViolation {
    pub fn reason(&self) -> &'static str {
        match self {
            ScopeLawViolation::NoScopesSelected => "no_scopes_selected",
            ScopeLawViolation::MissingRequired => "missing_required_scopes",
            ScopeLawViolation::ExtraScopes => "invalid_extra_scopes",
        }
    }
}

/// Enforces §4.8.3's three scope laws. An `approved` decision whose
/// selected scopes don't satisfy all three must be converted to a denial
/// by the caller — this function only judges the set relationship.
pub fn validate_scope_laws(
    selected: &[String],
    required: &[String],
) -> Result<(), ScopeLawViolation> {
    if selected.is_empty() {
        return Err(ScopeLawViolation::NoScopesSelected);
    }
    let selected_set: BTreeSet<&str> = selected.iter().map(String::as_str).collect();
    let required_set: BTreeSet<&str> = required.iter().map(String::as_str).collect();

    if !required_set.is_subset(&selected_set) {
        return Err(ScopeLawViolation::MissingRequired);
    }
    if !selected_set.is_subset(&required_set) {
        return Err(ScopeLawViolation::ExtraScopes);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(scopes: &[&str]) -> Vec<String> {
        scopes.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn exact_match_passes() {
        assert!(validate_scope_laws(&v(&["a", "b"]), &v(&["b", "a"])).is_ok());
    }

    #[test]
    fn empty_selection_fails() {
        assert_eq!(
            validate_scope_laws(&v(&[]), &v(&["a"])).unwrap_err(),
            ScopeLawViolation::NoScopesSelected
        );
    }

    #[test]
    fn subset_selection_fails() {
        assert_eq!(
            validate_scope_laws(&v(&["a"]), &v(&["a", "b"])).unwrap_err(),
            ScopeLawViolation::MissingRequired
        );
    }

    #[test]
    fn superset_selection_fails() {
        assert_eq!(
            validate_scope_laws(&v(&["a", "b", "c"]), &v(&["a", "b"])).unwrap_err(),
            ScopeLawViolation::ExtraScopes
        );
    }

    #[test]
    fn decision_parsing_accepts_synonyms() {
        assert_eq!(ApprovalDecision::parse("YES"), Some(ApprovalDecision::Approved));
        assert_eq!(ApprovalDecision::parse("n"), Some(ApprovalDecision::Denied));
        assert_eq!(ApprovalDecision::parse("timeout"), Some(ApprovalDecision::Timeout));
        assert_eq!(ApprovalDecision::parse("gibberish"), None);
    }
}
