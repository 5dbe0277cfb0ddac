// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Tool and server catalog types.
//!
//! `ToolRecord` is the authoritative, load-time-validated description of
//! an invocable tool; `ToolCandidate` is the stripped-down view handed
//! back from search, deliberately missing the schema fields so that
//! discovery never leaks a schema before it is authorized.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ToolRecordError {
    #[error("tool_id must not be empty")]
    EmptyToolId,
    #[error("description_1line must not be empty for tool {0}")]
    EmptyDescription(String),
    #[error("tags must not be empty for tool {0}")]
    EmptyTags(String),
    #[error("schema_min for tool {tool_id} exceeds the token budget ({actual} > {budget})")]
    SchemaMinTooLarge {
        tool_id: String,
        actual: usize,
        budget: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Safe,
    Sensitive,
    Dangerous,
    /// Not part of the registry's closed set, but the policy engine and
    /// search ranking must still handle it as a fail-safe input.
    Unknown,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Safe => "safe",
            RiskLevel::Sensitive => "sensitive",
            RiskLevel::Dangerous => "dangerous",
            RiskLevel::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolRecord {
    pub tool_id: String,
    pub server_id: String,
    pub description_1line: String,
    pub description_full: String,
    pub tags: Vec<String>,
    pub risk_level: RiskLevel,
    #[serde(default)]
    pub required_scopes: Vec<String>,
    pub schema_min: serde_json::Value,
    pub schema_full: serde_json::Value,
    #[serde(default)]
    pub registered_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl ToolRecord {
    /// Validates the §3 invariants, plus the §9/§11.1 schema_min token
    /// budget enforcement added at load time.
    pub fn validate(&self, schema_min_token_budget: usize) -> Result<(), ToolRecordError> {
        if self.tool_id.trim().is_empty() {
            return Err(ToolRecordError::EmptyToolId);
        }
        if self.description_1line.trim().is_empty() {
            return Err(ToolRecordError::EmptyDescription(self.tool_id.clone()));
        }
        if self.tags.is_empty() {
            return Err(ToolRecordError::EmptyTags(self.tool_id.clone()));
        }
        let approx_tokens = count_tokens(&self.schema_min.to_string());
        if approx_tokens > schema_min_token_budget {
            return Err(ToolRecordError::SchemaMinTooLarge {
                tool_id: self.tool_id.clone(),
                actual: approx_tokens,
                budget: schema_min_token_budget,
            });
        }
        Ok(())
    }

    pub fn is_bootstrap(&self) -> bool {
        is_bootstrap_tool(&self.tool_id)
    }
}

/// Cheap token-count approximation: whitespace- and punctuation-delimited
/// run count. Good enough to bound schema_min without pulling in a real
/// tokenizer for a load-time sanity check.
fn count_tokens(text: &str) -> usize {
    text.split(|c: char| c.is_whitespace() || ",:{}[]\"".contains(c))
        .filter(|s| !s.is_empty())
        .count()
}

pub const BOOTSTRAP_TOOLS: [&str; 3] = ["search_tools", "get_tool_schema", "expand_tool_schema"];

pub fn is_bootstrap_tool(tool_id: &str) -> bool {
    BOOTSTRAP_TOOLS.contains(&tool_id)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerRecord {
    pub server_id: String,
    pub description: String,
    pub risk_level: RiskLevel,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllowedInMode {
    Allowed,
    RequiresApproval,
    Blocked,
}

/// Search result view. Deliberately lacks `schema_min`/`schema_full` —
/// discovery must never hand out a schema before it is authorized.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCandidate {
    pub tool_id: String,
    pub server_id: String,
    pub description_1line: String,
    pub tags: Vec<String>,
    pub risk_level: RiskLevel,
    pub relevance_score: f32,
    pub allowed_in_mode: AllowedInMode,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(tool_id: &str, schema_min: serde_json::Value) -> ToolRecord {
        ToolRecord {
            tool_id: tool_id.to_string(),
            server_id: "fs".to_string(),
            description_1line: "reads a file".to_string(),
            description_full: "reads a file from the workspace".to_string(),
            tags: vec!["filesystem".to_string()],
            risk_level: RiskLevel::Safe,
            required_scopes: vec![],
            schema_min,
            schema_full: serde_json::json!({}),
            registered_at: None,
        }
    }

    #[test]
    fn rejects_empty_tool_id() {
        let mut r = sample("read_file", serde_json::json!({}));
        r.tool_id = "".to_string();
        assert_eq!(
            r.validate(50).unwrap_err(),
            ToolRecordError::EmptyToolId
        );
    }

    #[test]
    fn rejects_empty_tags() {
        let mut r = sample("read_file", serde_json::json!({}));
        r.tags = vec![];
        assert!(matches!(r.validate(50), Err(ToolRecordError::EmptyTags(_))));
    }

    #[test]
    fn enforces_schema_min_budget() {
        let huge: Vec<String> = (0..100).map(|i| format!("field_{i}")).collect();
        let r = sample("read_file", serde_json::json!({ "properties": huge }));
        assert!(matches!(
            r.validate(50),
            Err(ToolRecordError::SchemaMinTooLarge { .. })
        ));
    }

    #[test]
    fn bootstrap_set_is_exactly_three() {
        assert!(is_bootstrap_tool("search_tools"));
        assert!(is_bootstrap_tool("get_tool_schema"));
        assert!(is_bootstrap_tool("expand_tool_schema"));
        assert!(!is_bootstrap_tool("write_file"));
    }
}
