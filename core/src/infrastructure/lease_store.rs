// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Redis-backed lease storage. `consume` is the one operation in this
//! whole system that must be linearizable under concurrency (§5), so it
//! runs as a single Lua script on the server rather than a
//! read-then-write round trip from the client.

use async_trait::async_trait;
use redis::AsyncCommands;
use thiserror::Error;
use tokio::sync::broadcast;

use crate::domain::lease::ToolLease;

#[derive(Debug, Error)]
pub enum LeaseStoreError {
    #[error("store error: {0}")]
    Store(String),
}

#[derive(Debug, Clone)]
pub struct ClientNotification {
    pub client_id: String,
    pub kind: NotificationKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    ListChanged,
}

/// Atomic "decrement if positive, delete at zero" script. Returns the
/// post-decrement lease JSON, or a sentinel when calls_remaining was
/// already zero (or the key is gone) — a plain GET-then-SET could race
/// N concurrent callers past a 1-call lease; this can't.
const CONSUME_SCRIPT: &str = r#"
local raw = redis.call("GET", KEYS[1])
if not raw then
    return false
end
local lease = cjson.decode(raw)
if lease.calls_remaining <= 0 then
    redis.call("DEL", KEYS[1])
    return false
end
lease.calls_remaining = lease.calls_remaining - 1
local ttl = redis.call("TTL", KEYS[1])
if lease.calls_remaining <= 0 then
    redis.call("DEL", KEYS[1])
else
    local encoded = cjson.encode(lease)
    if ttl and ttl > 0 then
        redis.call("SET", KEYS[1], encoded, "EX", ttl)
    else
        redis.call("SET", KEYS[1], encoded)
    end
end
return cjson.encode(lease)
"#;

#[async_trait]
pub trait LeaseStore: Send + Sync {
    async fn grant(&self, lease: &ToolLease) -> Result<(), LeaseStoreError>;
    async fn validate(&self, client_id: &str, tool_id: &str) -> Option<ToolLease>;
    async fn consume(&self, client_id: &str, tool_id: &str) -> Option<ToolLease>;
    async fn revoke(&self, client_id: &str, tool_id: &str) -> bool;
    async fn purge_expired(&self) -> u64;
    fn subscribe(&self) -> broadcast::Receiver<ClientNotification>;
}

pub struct RedisLeaseStore {
    manager: redis::aio::ConnectionManager,
    notifications: broadcast::Sender<ClientNotification>,
}

impl RedisLeaseStore {
    pub async fn connect(redis_url: &str) -> redis::RedisResult<Self> {
        let client = redis::Client::open(redis_url)?;
        let manager = client.get_connection_manager().await?;
        let (notifications, _) = broadcast::channel(256);
        Ok(Self { manager, notifications })
    }

    fn notify(&self, client_id: &str, kind: NotificationKind) {
        // A dropped broadcast receiver must never fail the caller; that's
        // the whole point of fire-and-forget notification fan-out.
        let _ = self.notifications.send(ClientNotification {
            client_id: client_id.to_string(),
            kind,
        });
    }
}

#[async_trait]
impl LeaseStore for RedisLeaseStore {
    async fn grant(&self, lease: &ToolLease) -> Result<(), LeaseStoreError> {
        let key = ToolLease::store_key(&lease.client_id, &lease.tool_id);
        let ttl = (lease.expires_at - lease.granted_at).num_seconds().max(1) as u64;
        let encoded = serde_json::to_string(lease).map_err(|e| LeaseStoreError::Store(e.to_string()))?;
        let mut conn = self.manager.clone();
        conn.set_ex::<_, _, ()>(&key, encoded, ttl)
            .await
            .map_err(|e| LeaseStoreError::Store(e.to_string()))?;
        self.notify(&lease.client_id, NotificationKind::ListChanged);
        Ok(())
    }

    async fn validate(&self, client_id: &str, tool_id: &str) -> Option<ToolLease> {
        let key = ToolLease::store_key(client_id, tool_id);
        let mut conn = self.manager.clone();
        let raw: Option<String> = conn.get(&key).await.ok().flatten();
        let lease: ToolLease = serde_json::from_str(&raw?).ok()?;

        if lease.is_expired_at(chrono::Utc::now()) {
            let _: Result<(), _> = conn.del(&key).await;
            return None;
        }
        if !lease.has_calls() {
            return None;
        }
        Some(lease)
    }

    async fn consume(&self, client_id: &str, tool_id: &str) -> Option<ToolLease> {
        let key = ToolLease::store_key(client_id, tool_id);
        let mut conn = self.manager.clone();
        let script = redis::Script::new(CONSUME_SCRIPT);
        let result: Option<String> = script
            .key(&key)
            .invoke_async(&mut conn)
            .await
            .ok()
            .flatten();
        let lease: ToolLease = serde_json::from_str(&result?).ok()?;
        if !lease.has_calls() {
            self.notify(client_id, NotificationKind::ListChanged);
        }
        Some(lease)
    }

    async fn revoke(&self, client_id: &str, tool_id: &str) -> bool {
        let key = ToolLease::store_key(client_id, tool_id);
        let mut conn = self.manager.clone();
        let removed: i64 = conn.del(&key).await.unwrap_or(0);
        if removed > 0 {
            self.notify(client_id, NotificationKind::ListChanged);
        }
        true
    }

    async fn purge_expired(&self) -> u64 {
        // The store's own TTL already reaps the overwhelming majority of
        // expired leases; this is maintenance for whatever lags behind
        // (e.g. a TTL that was extended past a stale `expires_at` field).
        let mut conn = self.manager.clone();
        let keys: Vec<String> = conn.keys("lease:*").await.unwrap_or_default();
        let mut purged = 0u64;
        for key in keys {
            let raw: Option<String> = conn.get(&key).await.unwrap_or(None);
            let Some(raw) = raw else { continue };
            let Ok(lease) = serde_json::from_str::<ToolLease>(&raw) else { continue };
            if lease.is_expired_at(chrono::Utc::now()) {
                let _: Result<(), _> = conn.del(&key).await;
                purged += 1;
            }
        }
        purged
    }

    fn subscribe(&self) -> broadcast::Receiver<ClientNotification> {
        self.notifications.subscribe()
    }
}

#[cfg(test)]
pub mod fake {
    use super::*;
    use std::collections::HashMap;
    use tokio::sync::Mutex;

    #[derive(Default)]
    pub struct FakeLeaseStore {
        leases: Mutex<HashMap<String, ToolLease>>,
        notifications: Option<broadcast::Sender<ClientNotification>>,
    }

    impl FakeLeaseStore {
        pub fn new() -> Self {
            let (tx, _) = broadcast::channel(256);
            Self {
                leases: Mutex::new(HashMap::new()),
                notifications: Some(tx),
            }
        }

        fn notify(&self, client_id: &str, kind: NotificationKind) {
            if let Some(tx) = &self.notifications {
                let _ = tx.send(ClientNotification {
                    client_id: client_id.to_string(),
                    kind,
                });
            }
        }
    }

    #[async_trait]
    impl LeaseStore for FakeLeaseStore {
        async fn grant(&self, lease: &ToolLease) -> Result<(), LeaseStoreError> {
            let key = ToolLease::store_key(&lease.client_id, &lease.tool_id);
            self.leases.lock().await.insert(key, lease.clone());
            self.notify(&lease.client_id, NotificationKind::ListChanged);
            Ok(())
        }

        async fn validate(&self, client_id: &str, tool_id: &str) -> Option<ToolLease> {
            let key = ToolLease::store_key(client_id, tool_id);
            let mut leases = self.leases.lock().await;
            let lease = leases.get(&key)?.clone();
            if lease.is_expired_at(chrono::Utc::now()) {
                leases.remove(&key);
                return None;
            }
            if !lease.has_calls() {
                return None;
            }
            Some(lease)
        }

        /// Deliberately uses a lock-held critical section to model the
        /// atomicity the Redis Lua script gives us in production: this is
        /// a test double, but it must not let a burst of concurrent
        /// consumers race past the Kth call either.
        async fn consume(&self, client_id: &str, tool_id: &str) -> Option<ToolLease> {
            let key = ToolLease::store_key(client_id, tool_id);
            let mut leases = self.leases.lock().await;
            let lease = leases.get_mut(&key)?;
            if lease.calls_remaining <= 0 {
                leases.remove(&key);
                return None;
            }
            lease.calls_remaining -= 1;
            let result = lease.clone();
            if result.calls_remaining <= 0 {
                leases.remove(&key);
                self.notify(client_id, NotificationKind::ListChanged);
            }
            Some(result)
        }

        async fn revoke(&self, client_id: &str, tool_id: &str) -> bool {
            let key = ToolLease::store_key(client_id, tool_id);
            let removed = self.leases.lock().await.remove(&key).is_some();
            if removed {
                self.notify(client_id, NotificationKind::ListChanged);
            }
            true
        }

        async fn purge_expired(&self) -> u64 {
            let mut leases = self.leases.lock().await;
            let now = chrono::Utc::now();
            let before = leases.len();
            leases.retain(|_, lease| !lease.is_expired_at(now));
            (before - leases.len()) as u64
        }

        fn subscribe(&self) -> broadcast::Receiver<ClientNotification> {
            self.notifications.as_ref().unwrap().subscribe()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fake::FakeLeaseStore;
    use super::*;
    use tokio::task::JoinSet;

    fn lease(calls: i64) -> ToolLease {
        ToolLease::new("client-1", "write_file", 300, calls, "permission", None).unwrap()
    }

    #[tokio::test]
    async fn validate_rejects_other_clients_lease() {
        let store = FakeLeaseStore::new();
        store.grant(&lease(3)).await.unwrap();
        assert!(store.validate("client-2", "write_file").await.is_none());
        assert!(store.validate("client-1", "write_file").await.is_some());
    }

    #[tokio::test]
    async fn burst_consume_yields_min_n_k() {
        for k in [1, 2, 3, 5] {
            let store = std::sync::Arc::new(FakeLeaseStore::new());
            store.grant(&lease(k)).await.unwrap();

            let n = 8;
            let mut joinset = JoinSet::new();
            for _ in 0..n {
                let store = store.clone();
                joinset.spawn(async move { store.consume("client-1", "write_file").await });
            }
            let mut successes = 0;
            while let Some(res) = joinset.join_next().await {
                if res.unwrap().is_some() {
                    successes += 1;
                }
            }
            assert_eq!(successes, std::cmp::min(n, k as usize));
        }
    }

    #[tokio::test]
    async fn revoke_is_idempotent() {
        let store = FakeLeaseStore::new();
        store.grant(&lease(3)).await.unwrap();
        assert!(store.revoke("client-1", "write_file").await);
        assert!(store.revoke("client-1", "write_file").await);
        assert!(store.validate("client-1", "write_file").await.is_none());
    }
}
