// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Environment-driven configuration. Field names and defaults are grounded
//! on the original implementation's `Config` class; see SPEC_FULL.md §10.3.

use std::collections::HashMap;
use std::env;

use thiserror::Error;

use crate::domain::tool::RiskLevel;

const DEV_SECRET_PLACEHOLDER: &str =
    "default_dev_secret_change_in_production_32bytes_minimum";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field} environment variable: {source}")]
    InvalidEnvVar {
        field: &'static str,
        source: std::num::ParseIntError,
    },
    #[error("invalid PORT: must be 1-65535, got {0}")]
    InvalidPort(u32),
    #[error("configuration validation failed: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone)]
pub struct LeaseProfile {
    pub ttl_seconds: i64,
    pub calls: i64,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub workspace_root: String,
    pub registry_path: String,
    pub audit_log_path: String,
    pub audit_rotate_bytes: u64,
    pub audit_retention_days: i64,

    pub redis_url: String,
    pub redis_max_connections: u32,
    pub redis_connect_timeout_secs: u64,
    pub redis_command_timeout_secs: u64,

    pub default_mode: String,
    pub default_elevation_ttl_secs: i64,
    pub elicitation_timeout_secs: u64,

    pub hmac_secret: String,
    pub environment: String,

    pub schema_min_token_budget: usize,

    pub enable_toon_outputs: bool,
    pub toon_array_threshold: usize,

    pub enable_progressive_schemas: bool,

    pub lease_profiles: HashMap<RiskLevel, LeaseProfile>,
}

fn env_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn parse_u64(field: &'static str, raw: String) -> Result<u64, ConfigError> {
    raw.parse()
        .map_err(|source| ConfigError::InvalidEnvVar { field, source })
}

fn parse_i64(field: &'static str, raw: String) -> Result<i64, ConfigError> {
    raw.parse()
        .map_err(|source| ConfigError::InvalidEnvVar { field, source })
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        let port_raw = env_or("PORT", "8001");
        let port: u32 = port_raw
            .parse()
            .map_err(|source| ConfigError::InvalidEnvVar { field: "PORT", source })?;
        if !(1..=65535).contains(&port) {
            return Err(ConfigError::InvalidPort(port));
        }

        let mut lease_profiles = HashMap::new();
        lease_profiles.insert(RiskLevel::Safe, LeaseProfile { ttl_seconds: 300, calls: 3 });
        lease_profiles.insert(RiskLevel::Sensitive, LeaseProfile { ttl_seconds: 300, calls: 1 });
        lease_profiles.insert(RiskLevel::Dangerous, LeaseProfile { ttl_seconds: 120, calls: 1 });

        let config = Config {
            host: env_or("HOST", "0.0.0.0"),
            port: port as u16,
            workspace_root: env_or("WORKSPACE_ROOT", "./workspace"),
            registry_path: env_or("REGISTRY_PATH", "./registry.yaml"),
            audit_log_path: env_or("AUDIT_LOG_PATH", "./audit.jsonl"),
            audit_rotate_bytes: parse_u64("AUDIT_ROTATE_BYTES", env_or("AUDIT_ROTATE_BYTES", "10000000"))?,
            audit_retention_days: parse_i64("AUDIT_RETENTION_DAYS", env_or("AUDIT_RETENTION_DAYS", "30"))?,

            redis_url: env_or("REDIS_URL", "redis://localhost:6379"),
            redis_max_connections: parse_u64("REDIS_MAX_CONNECTIONS", env_or("REDIS_MAX_CONNECTIONS", "100"))? as u32,
            redis_connect_timeout_secs: parse_u64(
                "REDIS_SOCKET_CONNECT_TIMEOUT",
                env_or("REDIS_SOCKET_CONNECT_TIMEOUT", "2"),
            )?,
            redis_command_timeout_secs: parse_u64(
                "REDIS_SOCKET_TIMEOUT",
                env_or("REDIS_SOCKET_TIMEOUT", "2"),
            )?,

            default_mode: env_or("DEFAULT_MODE", "permission").to_lowercase(),
            default_elevation_ttl_secs: parse_i64(
                "DEFAULT_ELEVATION_TTL",
                env_or("DEFAULT_ELEVATION_TTL", "300"),
            )?,
            elicitation_timeout_secs: parse_u64(
                "ELICITATION_TIMEOUT",
                env_or("ELICITATION_TIMEOUT", "300"),
            )?,

            hmac_secret: env_or("HMAC_SECRET", DEV_SECRET_PLACEHOLDER),
            environment: env_or("ENVIRONMENT", "development").to_lowercase(),

            schema_min_token_budget: parse_u64(
                "SCHEMA_MIN_TOKEN_BUDGET",
                env_or("SCHEMA_MIN_TOKEN_BUDGET", "50"),
            )? as usize,

            enable_toon_outputs: env_or("ENABLE_TOON_OUTPUTS", "true") != "false",
            toon_array_threshold: parse_u64(
                "TOON_ARRAY_THRESHOLD",
                env_or("TOON_ARRAY_THRESHOLD", "5"),
            )? as usize,

            enable_progressive_schemas: env_or("ENABLE_PROGRESSIVE_SCHEMAS", "true") != "false",

            lease_profiles,
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();
        let is_production = self.environment == "production";
        let is_default_secret = self.hmac_secret == DEV_SECRET_PLACEHOLDER;

        if is_production && (self.hmac_secret.is_empty() || is_default_secret) {
            errors.push(
                "HMAC_SECRET must be set to a strong secret in production".to_string(),
            );
        } else if self.hmac_secret.is_empty() {
            tracing::warn!("HMAC_SECRET not set — capability tokens will fail to verify");
        } else if is_default_secret {
            tracing::warn!("HMAC_SECRET is using the default development placeholder");
        } else if self.hmac_secret.len() < 32 {
            tracing::warn!(
                length = self.hmac_secret.len(),
                "HMAC_SECRET is shorter than the recommended 32 bytes"
            );
        }

        for (risk, profile) in &self.lease_profiles {
            if profile.ttl_seconds <= 0 {
                errors.push(format!("lease TTL for {} must be > 0", risk.as_str()));
            }
        }
        if self.default_elevation_ttl_secs <= 0 {
            errors.push("DEFAULT_ELEVATION_TTL must be > 0".to_string());
        }
        if self.elicitation_timeout_secs == 0 {
            errors.push("ELICITATION_TIMEOUT must be > 0".to_string());
        }
        if self.redis_max_connections == 0 {
            errors.push("REDIS_MAX_CONNECTIONS must be > 0".to_string());
        }
        if self.redis_connect_timeout_secs == 0 {
            errors.push("REDIS_SOCKET_CONNECT_TIMEOUT must be > 0".to_string());
        }
        if self.redis_command_timeout_secs == 0 {
            errors.push("REDIS_SOCKET_TIMEOUT must be > 0".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(errors.join("; ")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn loads_with_defaults() {
        let _guard = ENV_LOCK.lock().unwrap();
        for var in ["PORT", "ENVIRONMENT", "HMAC_SECRET"] {
            env::remove_var(var);
        }
        let config = Config::load().unwrap();
        assert_eq!(config.port, 8001);
        assert_eq!(config.default_mode, "permission");
        assert_eq!(config.lease_profiles[&RiskLevel::Dangerous].calls, 1);
    }

    #[test]
    fn rejects_default_secret_in_production() {
        let _guard = ENV_LOCK.lock().unwrap();
        env::set_var("ENVIRONMENT", "production");
        env::remove_var("HMAC_SECRET");
        let result = Config::load();
        assert!(result.is_err());
        env::remove_var("ENVIRONMENT");
    }

    #[test]
    fn rejects_out_of_range_port() {
        let _guard = ENV_LOCK.lock().unwrap();
        env::set_var("PORT", "70000");
        let result = Config::load();
        assert!(matches!(result, Err(ConfigError::InvalidPort(_))));
        env::remove_var("PORT");
    }
}
