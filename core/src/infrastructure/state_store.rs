// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Durable governance mode and ephemeral scoped-elevation cache, both
//! Redis-backed per §4.2. Every read fails safe: a store error or an
//! absent/unrecognized value never blocks a decision, it degrades it.

use async_trait::async_trait;
use redis::AsyncCommands;
use sha2::{Digest, Sha256};

use crate::domain::policy::GovernanceMode;

#[async_trait]
pub trait StateStore: Send + Sync {
    async fn get_mode(&self) -> GovernanceMode;
    async fn set_mode(&self, mode: GovernanceMode) -> bool;
    async fn grant_elevation(&self, key: &str, ttl_seconds: i64) -> bool;
    async fn check_elevation(&self, key: &str) -> bool;
    async fn revoke_elevation(&self, key: &str) -> bool;
}

pub fn compute_elevation_hash(tool_id: &str, context_key: &str, session_id: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(tool_id.as_bytes());
    hasher.update(b":");
    hasher.update(context_key.as_bytes());
    hasher.update(b":");
    hasher.update(session_id.as_bytes());
    format!("elevation:{}", hex::encode(hasher.finalize()))
}

const MODE_KEY: &str = "governance:mode";

pub struct RedisStateStore {
    manager: redis::aio::ConnectionManager,
}

impl RedisStateStore {
    pub async fn connect(redis_url: &str) -> redis::RedisResult<Self> {
        let client = redis::Client::open(redis_url)?;
        let manager = client.get_connection_manager().await?;
        Ok(Self { manager })
    }
}

#[async_trait]
impl StateStore for RedisStateStore {
    async fn get_mode(&self) -> GovernanceMode {
        let mut conn = self.manager.clone();
        match conn.get::<_, Option<String>>(MODE_KEY).await {
            Ok(Some(raw)) => GovernanceMode::parse(&raw).unwrap_or_else(|| {
                tracing::warn!(raw = %raw, "unrecognized governance mode in store, failing safe");
                GovernanceMode::fail_safe_default()
            }),
            Ok(None) => GovernanceMode::fail_safe_default(),
            Err(err) => {
                tracing::warn!(error = %err, "governance mode read failed, failing safe");
                GovernanceMode::fail_safe_default()
            }
        }
    }

    async fn set_mode(&self, mode: GovernanceMode) -> bool {
        let mut conn = self.manager.clone();
        match conn.set::<_, _, ()>(MODE_KEY, mode.as_str()).await {
            Ok(()) => true,
            Err(err) => {
                tracing::error!(error = %err, "governance mode write failed");
                false
            }
        }
    }

    async fn grant_elevation(&self, key: &str, ttl_seconds: i64) -> bool {
        if ttl_seconds <= 0 {
            tracing::error!(ttl_seconds, "rejected non-positive elevation ttl");
            return false;
        }
        let mut conn = self.manager.clone();
        match conn
            .set_ex::<_, _, ()>(key, "granted", ttl_seconds as u64)
            .await
        {
            Ok(()) => true,
            Err(err) => {
                tracing::error!(error = %err, "elevation grant failed");
                false
            }
        }
    }

    async fn check_elevation(&self, key: &str) -> bool {
        let mut conn = self.manager.clone();
        conn.exists::<_, bool>(key).await.unwrap_or(false)
    }

    async fn revoke_elevation(&self, key: &str) -> bool {
        let mut conn = self.manager.clone();
        // Idempotent: DEL on an absent key succeeds with a count of 0.
        conn.del::<_, ()>(key).await.is_ok()
    }
}

#[cfg(test)]
pub mod fake {
    use super::*;
    use std::collections::HashMap;
    use tokio::sync::Mutex;

    /// In-memory double used by tests that would otherwise need a live
    /// Redis instance; implements the same trait as the real store.
    #[derive(Default)]
    pub struct FakeStateStore {
        mode: Mutex<Option<GovernanceMode>>,
        elevations: Mutex<HashMap<String, ()>>,
    }

    #[async_trait]
    impl StateStore for FakeStateStore {
        async fn get_mode(&self) -> GovernanceMode {
            self.mode.lock().await.unwrap_or_else(GovernanceMode::fail_safe_default)
        }

        async fn set_mode(&self, mode: GovernanceMode) -> bool {
            *self.mode.lock().await = Some(mode);
            true
        }

        async fn grant_elevation(&self, key: &str, ttl_seconds: i64) -> bool {
            if ttl_seconds <= 0 {
                return false;
            }
            self.elevations.lock().await.insert(key.to_string(), ());
            true
        }

        async fn check_elevation(&self, key: &str) -> bool {
            self.elevations.lock().await.contains_key(key)
        }

        async fn revoke_elevation(&self, key: &str) -> bool {
            self.elevations.lock().await.remove(key);
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fake::FakeStateStore;
    use super::*;

    #[test]
    fn elevation_hash_is_namespaced_and_deterministic() {
        let a = compute_elevation_hash("write_file", "/tmp/x", "session-1");
        let b = compute_elevation_hash("write_file", "/tmp/x", "session-1");
        assert_eq!(a, b);
        assert!(a.starts_with("elevation:"));
    }

    #[test]
    fn elevation_hash_differs_on_any_component() {
        let a = compute_elevation_hash("write_file", "/tmp/x", "session-1");
        let b = compute_elevation_hash("write_file", "/tmp/y", "session-1");
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn fake_store_defaults_to_permission() {
        let store = FakeStateStore::default();
        assert_eq!(store.get_mode().await, GovernanceMode::Permission);
    }

    #[tokio::test]
    async fn fake_store_rejects_non_positive_ttl() {
        let store = FakeStateStore::default();
        assert!(!store.grant_elevation("elevation:abc", 0).await);
        assert!(!store.check_elevation("elevation:abc").await);
    }

    #[tokio::test]
    async fn fake_store_revoke_is_idempotent() {
        let store = FakeStateStore::default();
        store.grant_elevation("elevation:abc", 60).await;
        assert!(store.check_elevation("elevation:abc").await);
        assert!(store.revoke_elevation("elevation:abc").await);
        assert!(store.revoke_elevation("elevation:abc").await);
        assert!(!store.check_elevation("elevation:abc").await);
    }
}
