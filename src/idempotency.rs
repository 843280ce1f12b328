use redis::AsyncCommands;
use serde_json::Value;
use std::{collections::HashMap, sync::Arc};
use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};
use tracing::warn;

/// Replay cache for commit endpoints. Redis when `REDIS_URL` is set, otherwise
/// an in-process map with the same TTL.
#[derive(Clone)]
pub struct IdempotencyStore {
    memory: Arc<Mutex<HashMap<String, (Instant, Value)>>>,
    redis: Option<redis::Client>,
    ttl: Duration,
}

impl IdempotencyStore {
    pub fn new(redis: Option<redis::Client>, ttl: Duration) -> Self {
        Self {
            memory: Arc::new(Mutex::new(HashMap::new())),
            redis,
            ttl,
        }
    }

    pub fn from_env() -> Self {
        let redis = std::env::var("REDIS_URL")
            .ok()
            .and_then(|u| redis::Client::open(u).ok());
        let ttl = std::env::var("IDEMPOTENCY_TTL_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|v| *v > 0)
            .unwrap_or(3600);
        Self::new(redis, Duration::from_secs(ttl))
    }

    pub async fn get(&self, key: &str) -> Option<Value> {
        if let Some(client) = &self.redis {
            return redis_get(client, key).await;
        }
        let mut guard = self.memory.lock().await;
        match guard.get(key) {
            Some((stored_at, value)) if stored_at.elapsed() < self.ttl => Some(value.clone()),
            Some(_) => {
                guard.remove(key);
                None
            }
            None => None,
        }
    }

    pub async fn put(&self, key: String, value: &Value) {
        if let Some(client) = &self.redis {
            redis_set(client, &key, value, self.ttl.as_secs()).await;
            return;
        }
        self.memory
            .lock()
            .await
            .insert(key, (Instant::now(), value.clone()));
    }
}

async fn redis_get(client: &redis::Client, key: &str) -> Option<Value> {
    let mut conn = match client.get_multiplexed_async_connection().await {
        Ok(c) => c,
        Err(err) => {
            warn!(target = "hermes.api", error = %err, "idempotency_redis_unavailable");
            return None;
        }
    };
    let s: Option<String> = conn.get(key).await.ok();
    s.and_then(|v| serde_json::from_str(&v).ok())
}

async fn redis_set(client: &redis::Client, key: &str, value: &Value, ttl_secs: u64) {
    if let Ok(mut conn) = client.get_multiplexed_async_connection().await
        && let Ok(json) = serde_json::to_string(value)
    {
        let _: Result<(), _> = conn.set_ex(key, json, ttl_secs).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test(start_paused = true)]
    async fn memory_entries_replay_until_ttl() {
        let store = IdempotencyStore::new(None, Duration::from_secs(60));
        assert!(store.get("k").await.is_none());
        store.put("k".into(), &json!({ "approved_count": 1 })).await;
        assert_eq!(store.get("k").await, Some(json!({ "approved_count": 1 })));
        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(store.get("k").await.is_none());
    }
}
