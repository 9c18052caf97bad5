//! Session-token cache over a shared key/value backend.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::GatewayError;
use crate::identity::Identity;

/// Process-shared key/value store with per-entry TTL.
///
/// This is the seam an external cache (memcached, redis) plugs into.
#[async_trait::async_trait]
pub trait CacheClient: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, GatewayError>;
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), GatewayError>;
    async fn delete(&self, key: &str) -> Result<(), GatewayError>;
}

/// In-process backend, suitable for a single-node deployment.
#[derive(Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, (i64, Vec<u8>)>>,
}

#[async_trait::async_trait]
impl CacheClient for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, GatewayError> {
        let entries = self.entries.read().await;
        Ok(entries
            .get(key)
            .filter(|(deadline, _)| *deadline > Utc::now().timestamp())
            .map(|(_, value)| value.clone()))
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), GatewayError> {
        let deadline = Utc::now().timestamp() + ttl.as_secs() as i64;
        self.entries
            .write()
            .await
            .insert(key.to_string(), (deadline, value));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), GatewayError> {
        self.entries.write().await.remove(key);
        Ok(())
    }
}

/// Payload stored under a token's cache key.
#[derive(Serialize, Deserialize)]
struct CacheEntry {
    expires: i64,
    identity: Identity,
}

/// Maps bearer session tokens to identities.
///
/// No locking: concurrent writes for the same token during a refresh race
/// both re-derive the same identity, so last-writer-wins is harmless.
#[derive(Clone)]
pub struct TokenCache {
    backend: Arc<dyn CacheClient>,
    namespace: String,
}

impl TokenCache {
    /// Authentication cannot function without a backend; a missing one is
    /// a deployment fault, not a request error.
    pub fn new(
        backend: Option<Arc<dyn CacheClient>>,
        namespace: &str,
    ) -> Result<Self, GatewayError> {
        let backend = backend.ok_or_else(|| {
            GatewayError::Configuration("no token cache backend configured".to_string())
        })?;
        Ok(Self {
            backend,
            namespace: namespace.to_string(),
        })
    }

    fn key(&self, token: &str) -> String {
        format!("{}/token/{}", self.namespace, token)
    }

    pub async fn put(
        &self,
        token: &str,
        identity: &Identity,
        ttl_seconds: i64,
    ) -> Result<(), GatewayError> {
        let entry = CacheEntry {
            expires: Utc::now().timestamp() + ttl_seconds,
            identity: identity.clone(),
        };
        let value = serde_json::to_vec(&entry)?;
        self.backend
            .set(
                &self.key(token),
                value,
                Duration::from_secs(ttl_seconds.max(0) as u64),
            )
            .await
    }

    /// An entry the backend still holds past its recorded expiry is
    /// treated as absent; backend TTL enforcement and our clock may
    /// disagree.
    pub async fn get(&self, token: &str) -> Result<Option<Identity>, GatewayError> {
        let Some(raw) = self.backend.get(&self.key(token)).await? else {
            return Ok(None);
        };
        let entry: CacheEntry = match serde_json::from_slice(&raw) {
            Ok(entry) => entry,
            Err(err) => {
                debug!(error = %err, "Discarding undecodable token cache entry");
                return Ok(None);
            }
        };
        if entry.expires < Utc::now().timestamp() {
            return Ok(None);
        }
        Ok(Some(entry.identity))
    }

    /// Unconditional removal, used by logout.
    pub async fn delete(&self, token: &str) -> Result<(), GatewayError> {
        self.backend.delete(&self.key(token)).await
    }
}
