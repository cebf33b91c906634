//! Durable FIFO queues over Redis (spec §6.1).
//!
//! Spec §6.1 describes a plain at-least-once FIFO list: a single payload per
//! pop, no acknowledgement, no consumer group bookkeeping. Redis Streams
//! consumer groups (`XREADGROUP`) would be a reasonable choice for an
//! ack'd/replayable queue, but they're the wrong shape for this contract, so
//! this module follows the plain list primitives (`LPUSH` / `BRPOP`) instead,
//! while keeping the same `redis` + `deadpool-redis` crate pairing used
//! elsewhere in this stack.

use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::Pool as RedisPool;

use crate::error::{CoreError, CoreResult};

/// A durable, at-least-once FIFO queue keyed by a single Redis list.
#[async_trait]
pub trait DurableQueue: Send + Sync {
    /// Push a payload onto the tail of the queue.
    async fn push(&self, payload: &str) -> CoreResult<()>;

    /// Block-pop the head of the queue, waiting up to `timeout`. Returns
    /// `None` on timeout (the caller should treat this as "wake up and do
    /// periodic work", per spec §4.4/§4.5).
    async fn blocking_pop(&self, timeout: Duration) -> CoreResult<Option<String>>;
}

/// Redis-backed `DurableQueue`.
pub struct RedisQueue {
    pool: RedisPool,
    key: String,
}

impl RedisQueue {
    pub fn new(pool: RedisPool, key: impl Into<String>) -> Self {
        Self {
            pool,
            key: key.into(),
        }
    }
}

#[async_trait]
impl DurableQueue for RedisQueue {
    async fn push(&self, payload: &str) -> CoreResult<()> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| CoreError::RedisPool(e.to_string()))?;

        redis::cmd("LPUSH")
            .arg(&self.key)
            .arg(payload)
            .query_async::<i64>(&mut *conn)
            .await?;

        Ok(())
    }

    async fn blocking_pop(&self, timeout: Duration) -> CoreResult<Option<String>> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| CoreError::RedisPool(e.to_string()))?;

        // BRPOP timeout is whole seconds in Redis; round up so callers don't
        // busy-loop on sub-second timeouts.
        let timeout_secs = timeout.as_secs().max(1);

        let result: Option<(String, String)> = redis::cmd("BRPOP")
            .arg(&self.key)
            .arg(timeout_secs)
            .query_async(&mut *conn)
            .await?;

        Ok(result.map(|(_key, value)| value))
    }
}

#[cfg(test)]
pub mod test_support {
    use super::*;
    use tokio::sync::Mutex;

    /// In-memory `DurableQueue` double for unit tests that don't want a
    /// live Redis instance.
    #[derive(Default)]
    pub struct InMemoryQueue {
        items: Mutex<std::collections::VecDeque<String>>,
    }

    impl InMemoryQueue {
        pub fn new() -> Self {
            Self::default()
        }
    }

    #[async_trait]
    impl DurableQueue for InMemoryQueue {
        async fn push(&self, payload: &str) -> CoreResult<()> {
            self.items.lock().await.push_back(payload.to_string());
            Ok(())
        }

        async fn blocking_pop(&self, _timeout: Duration) -> CoreResult<Option<String>> {
            Ok(self.items.lock().await.pop_front())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::InMemoryQueue;
    use super::*;

    #[tokio::test]
    async fn fifo_order_is_preserved() {
        let q = InMemoryQueue::new();
        q.push("1").await.unwrap();
        q.push("2").await.unwrap();
        assert_eq!(q.blocking_pop(Duration::from_millis(1)).await.unwrap(), Some("1".to_string()));
        assert_eq!(q.blocking_pop(Duration::from_millis(1)).await.unwrap(), Some("2".to_string()));
        assert_eq!(q.blocking_pop(Duration::from_millis(1)).await.unwrap(), None);
    }
}
