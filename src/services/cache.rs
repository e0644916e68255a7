use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use lru::LruCache;
use serde_json::{Map, Value};
use tokio::sync::Mutex;

use crate::error::Result;
use crate::services::request::RequestClient;

const DEFAULT_CAPACITY: usize = 256;

/// Remembers successful argument-less per-cluster queries (module lists and the like).
#[derive(Clone)]
pub struct CachedClient {
    client: RequestClient,
    timeout: Duration,
    cache: Arc<Mutex<LruCache<(String, u16), Value>>>,
}

impl CachedClient {
    pub fn new(client: RequestClient, timeout: Duration) -> Self {
        Self::with_capacity(client, timeout, DEFAULT_CAPACITY)
    }

    pub fn with_capacity(client: RequestClient, timeout: Duration, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            client,
            timeout,
            cache: Arc::new(Mutex::new(LruCache::new(capacity))),
        }
    }

    pub fn client(&self) -> &RequestClient {
        &self.client
    }

    pub async fn get(&self, action: &str, cluster_id: u16) -> Result<Value> {
        let key = (action.to_string(), cluster_id);
        if let Some(value) = self.cache.lock().await.get(&key) {
            return Ok(value.clone());
        }
        let value = self
            .client
            .request_one(action, Map::new(), cluster_id, self.timeout)
            .await?;
        self.cache.lock().await.put(key, value.clone());
        Ok(value)
    }

    pub async fn invalidate(&self, action: &str, cluster_id: u16) -> bool {
        self.cache
            .lock()
            .await
            .pop(&(action.to_string(), cluster_id))
            .is_some()
    }

    pub async fn invalidate_cluster(&self, cluster_id: u16) {
        let mut cache = self.cache.lock().await;
        let stale: Vec<(String, u16)> = cache
            .iter()
            .filter(|((_, id), _)| *id == cluster_id)
            .map(|(key, _)| key.clone())
            .collect();
        for key in stale {
            cache.pop(&key);
        }
    }

    pub async fn len(&self) -> usize {
        self.cache.lock().await.len()
    }
}
