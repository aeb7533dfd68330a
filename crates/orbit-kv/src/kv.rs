use async_trait::async_trait;
use orbit_core::OrbitResult;
use std::collections::HashMap;
use std::sync::Mutex as StdMutex;
use tokio::sync::{broadcast, Mutex};

/// Fast shared state: circuit-breaker counters, per-task progress
/// snapshots, and a pub/sub channel for progress events.
///
/// Production deployments back this with Redis or an equivalent; this
/// workspace ships an in-process implementation that is linearizable by
/// construction (one mutex guards all reads and writes), which satisfies
/// the atomicity requirements the Circuit Breaker and Progress Bus place on
/// this trait without requiring an external dependency for tests.
#[async_trait]
pub trait Kv: Send + Sync {
    /// Read a value.
    async fn get(&self, key: &str) -> OrbitResult<Option<serde_json::Value>>;

    /// Write a value unconditionally.
    async fn set(&self, key: &str, value: serde_json::Value) -> OrbitResult<()>;

    /// Atomically add `by` to the integer stored at `key` (starting from 0)
    /// and return the new value.
    async fn incr(&self, key: &str, by: i64) -> OrbitResult<i64>;

    /// Remove a key.
    async fn delete(&self, key: &str) -> OrbitResult<()>;

    /// Atomically replace the value at `key` with `new` iff the current
    /// value equals `expected` (`None` means "key must be absent").
    /// Returns whether the swap happened.
    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<serde_json::Value>,
        new: serde_json::Value,
    ) -> OrbitResult<bool>;

    /// Publish `message` to a named channel. Subscribers that are not
    /// currently listening miss it (at-least-once only applies to live
    /// subscribers, per the Progress Bus guarantee).
    fn publish(&self, channel: &str, message: serde_json::Value);

    /// Subscribe to a named channel, receiving messages published from this
    /// point forward.
    fn subscribe(&self, channel: &str) -> broadcast::Receiver<serde_json::Value>;
}

/// In-memory [`Kv`] implementation: one mutex-guarded map plus a registry
/// of broadcast channels, one per pub/sub channel name.
pub struct InMemoryKv {
    values: Mutex<HashMap<String, serde_json::Value>>,
    channels: StdMutex<HashMap<String, broadcast::Sender<serde_json::Value>>>,
}

impl InMemoryKv {
    /// Construct an empty store.
    pub fn new() -> Self {
        Self {
            values: Mutex::new(HashMap::new()),
            channels: StdMutex::new(HashMap::new()),
        }
    }

    fn channel_capacity() -> usize {
        256
    }
}

impl Default for InMemoryKv {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Kv for InMemoryKv {
    async fn get(&self, key: &str) -> OrbitResult<Option<serde_json::Value>> {
        Ok(self.values.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: serde_json::Value) -> OrbitResult<()> {
        self.values.lock().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn incr(&self, key: &str, by: i64) -> OrbitResult<i64> {
        let mut values = self.values.lock().await;
        let current = values
            .get(key)
            .and_then(|v| v.as_i64())
            .unwrap_or(0);
        let next = current + by;
        values.insert(key.to_string(), serde_json::json!(next));
        Ok(next)
    }

    async fn delete(&self, key: &str) -> OrbitResult<()> {
        self.values.lock().await.remove(key);
        Ok(())
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<serde_json::Value>,
        new: serde_json::Value,
    ) -> OrbitResult<bool> {
        let mut values = self.values.lock().await;
        let current = values.get(key).cloned();
        if current == expected {
            values.insert(key.to_string(), new);
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn publish(&self, channel: &str, message: serde_json::Value) {
        let channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(tx) = channels.get(channel) {
            let _ = tx.send(message);
        }
    }

    fn subscribe(&self, channel: &str) -> broadcast::Receiver<serde_json::Value> {
        let mut channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
        channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(Self::channel_capacity()).0)
            .subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn incr_accumulates() {
        let kv = InMemoryKv::new();
        assert_eq!(kv.incr("c", 1).await.unwrap(), 1);
        assert_eq!(kv.incr("c", 1).await.unwrap(), 2);
        assert_eq!(kv.incr("c", 5).await.unwrap(), 7);
    }

    #[tokio::test]
    async fn compare_and_swap_rejects_mismatch() {
        let kv = InMemoryKv::new();
        kv.set("k", serde_json::json!("a")).await.unwrap();
        let ok = kv
            .compare_and_swap("k", Some(serde_json::json!("wrong")), serde_json::json!("b"))
            .await
            .unwrap();
        assert!(!ok);
        assert_eq!(kv.get("k").await.unwrap(), Some(serde_json::json!("a")));

        let ok = kv
            .compare_and_swap("k", Some(serde_json::json!("a")), serde_json::json!("b"))
            .await
            .unwrap();
        assert!(ok);
        assert_eq!(kv.get("k").await.unwrap(), Some(serde_json::json!("b")));
    }

    #[tokio::test]
    async fn publish_reaches_live_subscriber() {
        let kv = InMemoryKv::new();
        let mut rx = kv.subscribe("task:1:events");
        kv.publish("task:1:events", serde_json::json!({"stage": "scanning"}));
        let msg = rx.recv().await.unwrap();
        assert_eq!(msg["stage"], "scanning");
    }
}
