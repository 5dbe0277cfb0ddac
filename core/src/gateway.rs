// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Top-level facade wiring the registry, search index, Redis-backed
//! stores, token service, audit log, and governance middleware into one
//! object the presentation layer can drive. Construction is fail-fast:
//! anything that can't come up (missing registry file, bad config,
//! unreachable Redis) surfaces as an error from `connect`, never a
//! half-initialized `ToolGate`.

use std::path::Path;
use std::sync::Arc;

use thiserror::Error;

use crate::application::discovery::{self, DiscoveryError, SchemaResult, SearchToolsResult};
use crate::application::middleware::{GovernanceMiddleware, MiddlewareError, ToolForwarder};
use crate::application::search::SearchIndex;
use crate::domain::audit::AuditEventTag;
use crate::domain::policy::GovernanceMode;
use crate::infrastructure::approval_providers::{
    ApprovalProvider, DbusGuiProvider, TerminalProvider,
};
use crate::infrastructure::audit_log::AuditLog;
use crate::infrastructure::config::{Config, ConfigError};
use crate::infrastructure::lease_store::{LeaseStore, RedisLeaseStore};
use crate::infrastructure::registry::{Registry, RegistryError};
use crate::infrastructure::state_store::{RedisStateStore, StateStore};
use crate::infrastructure::token_service::TokenService;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error("failed to connect to Redis: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("failed to open audit log: {0}")]
    AuditLog(#[from] std::io::Error),
}

pub struct ToolGate {
    pub config: Arc<Config>,
    registry: Arc<Registry>,
    search_index: SearchIndex,
    lease_store: Arc<dyn LeaseStore>,
    state_store: Arc<dyn StateStore>,
    token_service: TokenService,
    audit_log: Arc<AuditLog>,
    approval_providers: Arc<Vec<Box<dyn ApprovalProvider>>>,
    middleware: GovernanceMiddleware,
}

impl ToolGate {
    /// Wires every collaborator from environment configuration: loads the
    /// registry file, connects to Redis for lease and mode storage, opens
    /// the audit log, and builds the default provider chain (GUI bus →
    /// terminal; client-side elicitation is added by callers that have a
    /// live transport to elicit over).
    pub async fn connect(registry_path: &Path) -> Result<Self, GatewayError> {
        let config = Config::load()?;
        let registry = Registry::load(registry_path, config.schema_min_token_budget)?;
        let search_index = SearchIndex::build(registry.get_all());

        let lease_store: Arc<dyn LeaseStore> =
            Arc::new(RedisLeaseStore::connect(&config.redis_url).await?);
        let state_store: Arc<dyn StateStore> =
            Arc::new(RedisStateStore::connect(&config.redis_url).await?);
        let audit_log = Arc::new(AuditLog::open(
            Path::new(&config.audit_log_path),
            config.audit_rotate_bytes,
            config.audit_retention_days,
        )?);
        let token_service = TokenService::new(config.hmac_secret.clone());

        let providers: Vec<Box<dyn ApprovalProvider>> = vec![
            Box::new(DbusGuiProvider::new(std::env::var("DBUS_SESSION_BUS_ADDRESS").ok())),
            Box::new(TerminalProvider),
        ];
        let approval_providers = Arc::new(providers);

        let config = Arc::new(config);
        let registry = Arc::new(registry);

        let middleware = GovernanceMiddleware::new(
            registry.clone(),
            lease_store.clone(),
            state_store.clone(),
            token_service.clone(),
            audit_log.clone(),
            approval_providers.clone(),
            config.toon_array_threshold,
        );

        Ok(Self {
            config,
            registry,
            search_index,
            lease_store,
            state_store,
            token_service,
            audit_log,
            approval_providers,
            middleware,
        })
    }

    pub async fn current_mode(&self) -> GovernanceMode {
        self.state_store.get_mode().await
    }

    pub async fn set_mode(&self, mode: GovernanceMode) -> bool {
        let changed = self.state_store.set_mode(mode).await;
        if changed {
            self.audit_log.log_event(
                AuditEventTag::ModeChanged,
                None,
                None,
                fields(&[("mode", mode.as_str().into())]),
            );
        }
        changed
    }

    pub async fn search_tools(
        &self,
        query: &str,
        top_k: Option<usize>,
    ) -> SearchToolsResult {
        let mode = self.current_mode().await;
        discovery::search_tools(&self.search_index, &self.registry, query, mode, top_k)
    }

    pub async fn get_tool_schema(
        &self,
        client_id: &str,
        tool_name: &str,
    ) -> Result<SchemaResult, DiscoveryError> {
        let mode = self.current_mode().await;
        discovery::get_tool_schema(
            &self.registry,
            self.lease_store.as_ref(),
            &self.token_service,
            &self.config,
            &self.audit_log,
            &self.approval_providers,
            client_id,
            client_id,
            tool_name,
            mode,
        )
        .await
    }

    pub async fn expand_tool_schema(
        &self,
        client_id: &str,
        tool_name: &str,
    ) -> Result<serde_json::Value, DiscoveryError> {
        discovery::expand_tool_schema(&self.registry, self.lease_store.as_ref(), client_id, tool_name).await
    }

    pub async fn visible_tools(&self, client_id: &str) -> Vec<String> {
        discovery::visible_tools(&self.registry, self.lease_store.as_ref(), client_id).await
    }

    pub async fn invoke_tool(
        &self,
        forwarder: &dyn ToolForwarder,
        client_id: &str,
        session_id: &str,
        tool_name: &str,
        arguments: serde_json::Value,
        capability_token: Option<&str>,
    ) -> Result<serde_json::Value, MiddlewareError> {
        self.middleware
            .invoke_tool(forwarder, client_id, session_id, tool_name, arguments, capability_token)
            .await
    }

    pub async fn purge_expired_leases(&self) -> u64 {
        self.lease_store.purge_expired().await
    }

    pub async fn revoke_lease(&self, client_id: &str, tool_name: &str) -> bool {
        self.lease_store.revoke(client_id, tool_name).await
    }

    pub async fn revoke_elevation(&self, tool_name: &str, context_key: &str, session_id: &str) -> bool {
        let key = crate::infrastructure::state_store::compute_elevation_hash(tool_name, context_key, session_id);
        let revoked = self.state_store.revoke_elevation(&key).await;
        if revoked {
            self.audit_log.log_event(
                AuditEventTag::ElevationsRevoked,
                Some(session_id),
                None,
                fields(&[("tool", tool_name.into()), ("context_key", context_key.into())]),
            );
        }
        revoked
    }

    pub fn audit_log(&self) -> &AuditLog {
        &self.audit_log
    }
}

fn fields(pairs: &[(&str, serde_json::Value)]) -> serde_json::Map<String, serde_json::Value> {
    pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
}
