// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! The tri-state policy engine: a pure function from (mode, risk, tool) to
//! an action. No I/O, no hidden state — safe to call on every tool call.

use serde::{Deserialize, Serialize};

use crate::domain::tool::{is_bootstrap_tool, RiskLevel};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GovernanceMode {
    ReadOnly,
    Permission,
    Bypass,
}

impl GovernanceMode {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "read_only" => Some(Self::ReadOnly),
            "permission" => Some(Self::Permission),
            "bypass" => Some(Self::Bypass),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GovernanceMode::ReadOnly => "read_only",
            GovernanceMode::Permission => "permission",
            GovernanceMode::Bypass => "bypass",
        }
    }

    /// Fail-safe default used whenever the store can't answer
    /// authoritatively (absence, error, or an unrecognized stored value).
    pub fn fail_safe_default() -> Self {
        Self::Permission
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyAction {
    Allow,
    Block,
    RequireApproval,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyDecision {
    pub action: PolicyAction,
    pub reason: &'static str,
}

/// The §4.6 matrix. Bootstrap tools and unknown modes short-circuit before
/// the table is consulted.
pub fn evaluate_policy(mode: GovernanceMode, risk: RiskLevel, tool_id: &str) -> PolicyDecision {
    if is_bootstrap_tool(tool_id) {
        return PolicyDecision {
            action: PolicyAction::Allow,
            reason: "bootstrap tool is always allowed",
        };
    }

    match (mode, risk) {
        (GovernanceMode::Bypass, _) => PolicyDecision {
            action: PolicyAction::Allow,
            reason: "bypass mode allows everything",
        },
        (_, RiskLevel::Safe) => PolicyDecision {
            action: PolicyAction::Allow,
            reason: "safe risk is always allowed",
        },
        (GovernanceMode::ReadOnly, RiskLevel::Sensitive) => PolicyDecision {
            action: PolicyAction::Block,
            reason: "read-only mode blocks sensitive tools",
        },
        (GovernanceMode::ReadOnly, RiskLevel::Dangerous) => PolicyDecision {
            action: PolicyAction::Block,
            reason: "read-only mode blocks dangerous tools",
        },
        (GovernanceMode::ReadOnly, RiskLevel::Unknown) => PolicyDecision {
            action: PolicyAction::RequireApproval,
            reason: "unknown risk in read-only mode fails safe to approval",
        },
        (GovernanceMode::Permission, RiskLevel::Sensitive) => PolicyDecision {
            action: PolicyAction::RequireApproval,
            reason: "permission mode requires approval for sensitive tools",
        },
        (GovernanceMode::Permission, RiskLevel::Dangerous) => PolicyDecision {
            action: PolicyAction::RequireApproval,
            reason: "permission mode requires approval for dangerous tools",
        },
        (GovernanceMode::Permission, RiskLevel::Unknown) => PolicyDecision {
            action: PolicyAction::RequireApproval,
            reason: "unknown risk requires approval",
        },
    }
}

/// Penalty applied to a raw relevance score before ranking, per §4.5.
pub fn governance_penalty(action: PolicyAction) -> f32 {
    match action {
        PolicyAction::Allow => 0.0,
        PolicyAction::RequireApproval => 0.20,
        PolicyAction::Block => 0.80,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bootstrap_tools_always_allow() {
        for mode in [
            GovernanceMode::ReadOnly,
            GovernanceMode::Permission,
            GovernanceMode::Bypass,
        ] {
            for risk in [
                RiskLevel::Safe,
                RiskLevel::Sensitive,
                RiskLevel::Dangerous,
                RiskLevel::Unknown,
            ] {
                let d = evaluate_policy(mode, risk, "search_tools");
                assert_eq!(d.action, PolicyAction::Allow);
            }
        }
    }

    #[test]
    fn bypass_never_blocks_or_requires_approval() {
        for risk in [
            RiskLevel::Safe,
            RiskLevel::Sensitive,
            RiskLevel::Dangerous,
            RiskLevel::Unknown,
        ] {
            let d = evaluate_policy(GovernanceMode::Bypass, risk, "write_file");
            assert_eq!(d.action, PolicyAction::Allow);
        }
    }

    #[test]
    fn read_only_blocks_sensitive_and_dangerous() {
        assert_eq!(
            evaluate_policy(GovernanceMode::ReadOnly, RiskLevel::Sensitive, "write_file").action,
            PolicyAction::Block
        );
        assert_eq!(
            evaluate_policy(GovernanceMode::ReadOnly, RiskLevel::Dangerous, "delete_file").action,
            PolicyAction::Block
        );
    }

    #[test]
    fn read_only_unknown_risk_fails_safe_to_approval() {
        assert_eq!(
            evaluate_policy(GovernanceMode::ReadOnly, RiskLevel::Unknown, "mystery_tool").action,
            PolicyAction::RequireApproval
        );
    }

    #[test]
    fn permission_mode_requires_approval_for_non_safe() {
        assert_eq!(
            evaluate_policy(GovernanceMode::Permission, RiskLevel::Sensitive, "write_file")
                .action,
            PolicyAction::RequireApproval
        );
        assert_eq!(
            evaluate_policy(GovernanceMode::Permission, RiskLevel::Dangerous, "delete_file")
                .action,
            PolicyAction::RequireApproval
        );
    }

    #[test]
    fn penalty_values_match_spec() {
        assert_eq!(governance_penalty(PolicyAction::Allow), 0.0);
        assert_eq!(governance_penalty(PolicyAction::RequireApproval), 0.20);
        assert_eq!(governance_penalty(PolicyAction::Block), 0.80);
    }

    #[test]
    fn mode_parse_roundtrip() {
        assert_eq!(GovernanceMode::parse("permission"), Some(GovernanceMode::Permission));
        assert_eq!(GovernanceMode::parse("nonsense"), None);
    }
}
