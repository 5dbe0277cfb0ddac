// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! The read-mostly tool/server catalog. Loaded once at startup from a
//! declarative YAML file; immutable thereafter in production builds.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

use crate::domain::tool::{is_bootstrap_tool, ServerRecord, ToolRecord, BOOTSTRAP_TOOLS};

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("registry file not found: {0}")]
    NotFound(String),
    #[error("failed to read registry file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse registry file: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("duplicate tool_id in registry: {0}")]
    DuplicateToolId(String),
    #[error("invalid record for tool {tool_id}: {source}")]
    InvalidRecord {
        tool_id: String,
        source: crate::domain::tool::ToolRecordError,
    },
}

#[derive(Debug, Deserialize)]
struct RegistryFile {
    #[serde(default)]
    servers: Vec<ServerRecord>,
    #[serde(default)]
    tools: Vec<ToolRecord>,
}

/// Authoritative, read-mostly catalog. Production code obtains one via
/// `Registry::load` and never mutates it; `insert` exists for tests only.
pub struct Registry {
    tools: HashMap<String, ToolRecord>,
    servers: HashMap<String, ServerRecord>,
}

impl Registry {
    pub fn load(path: &Path, schema_min_token_budget: usize) -> Result<Self, RegistryError> {
        if !path.exists() {
            return Err(RegistryError::NotFound(path.display().to_string()));
        }
        let raw = std::fs::read_to_string(path)?;
        let parsed: RegistryFile = serde_yaml::from_str(&raw)?;

        let mut tools = HashMap::new();
        for tool in parsed.tools {
            tool.validate(schema_min_token_budget)
                .map_err(|source| RegistryError::InvalidRecord {
                    tool_id: tool.tool_id.clone(),
                    source,
                })?;
            if tools.insert(tool.tool_id.clone(), tool.clone()).is_some() {
                return Err(RegistryError::DuplicateToolId(tool.tool_id));
            }
        }

        let servers = parsed
            .servers
            .into_iter()
            .map(|s| (s.server_id.clone(), s))
            .collect();

        Ok(Self { tools, servers })
    }

    #[cfg(test)]
    pub fn from_tools(tools: Vec<ToolRecord>) -> Self {
        Self {
            tools: tools.into_iter().map(|t| (t.tool_id.clone(), t)).collect(),
            servers: HashMap::new(),
        }
    }

    pub fn get(&self, tool_id: &str) -> Option<&ToolRecord> {
        self.tools.get(tool_id)
    }

    pub fn is_registered(&self, tool_id: &str) -> bool {
        self.tools.contains_key(tool_id)
    }

    pub fn get_server(&self, server_id: &str) -> Option<&ServerRecord> {
        self.servers.get(server_id)
    }

    pub fn get_all(&self) -> impl Iterator<Item = &ToolRecord> {
        self.tools.values()
    }

    pub fn get_bootstrap_tools() -> &'static [&'static str; 3] {
        &BOOTSTRAP_TOOLS
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::tool::RiskLevel;

    fn sample(tool_id: &str) -> ToolRecord {
        ToolRecord {
            tool_id: tool_id.to_string(),
            server_id: "fs".to_string(),
            description_1line: "reads a file".to_string(),
            description_full: "reads a file from the workspace".to_string(),
            tags: vec!["filesystem".to_string()],
            risk_level: RiskLevel::Safe,
            required_scopes: vec![],
            schema_min: serde_json::json!({}),
            schema_full: serde_json::json!({}),
            registered_at: None,
        }
    }

    #[test]
    fn lookup_by_tool_id() {
        let registry = Registry::from_tools(vec![sample("read_file")]);
        assert!(registry.is_registered("read_file"));
        assert!(!registry.is_registered("write_file"));
        assert_eq!(registry.get("read_file").unwrap().server_id, "fs");
    }

    #[test]
    fn bootstrap_tools_are_constant() {
        assert_eq!(Registry::get_bootstrap_tools().len(), 3);
        assert!(is_bootstrap_tool("search_tools"));
    }

    #[test]
    fn missing_file_is_fatal() {
        let result = Registry::load(Path::new("/nonexistent/registry.yaml"), 50);
        assert!(matches!(result, Err(RegistryError::NotFound(_))));
    }
}
