//! Per-OJ in-memory queue (spec §2, §5): cheap fan-out owned by a handler
//! and drained by one or more workers for the same OJ. Unlike the durable
//! queue, this never survives a restart.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex as AsyncMutex};

/// A multi-producer, multi-consumer FIFO built on an `mpsc` channel whose
/// receiver is shared behind a mutex, so several competing workers (e.g.
/// several `Submitter`s for the same OJ) can drain the same queue.
pub struct MemQueue<T> {
    tx: mpsc::UnboundedSender<T>,
    rx: Arc<AsyncMutex<mpsc::UnboundedReceiver<T>>>,
}

impl<T> Clone for MemQueue<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            rx: self.rx.clone(),
        }
    }
}

impl<T> Default for MemQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> MemQueue<T> {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Arc::new(AsyncMutex::new(rx)),
        }
    }

    /// Push onto the tail. Re-enqueues (e.g. after `LoginExpired`) use this
    /// same method, which is why they land at the tail rather than jumping
    /// the line (spec §4.1, §5 ordering guarantee).
    pub fn push(&self, item: T) {
        // The receiver is only ever dropped together with every sender, so
        // this can't fail in practice; ignore a send to a torn-down queue.
        let _ = self.tx.send(item);
    }

    /// Block-pop with a timeout; `None` means "timed out, check the stop
    /// flag and loop" (spec §4.1: "wakes every 60s to observe the stop
    /// flag").
    pub async fn pop(&self, timeout: Duration) -> Option<T> {
        let mut rx = self.rx.lock().await;
        match tokio::time::timeout(timeout, rx.recv()).await {
            Ok(Some(item)) => Some(item),
            _ => None,
        }
    }

    /// Non-blocking drain used when winding down (spec §4.1: "drains
    /// outstanding in-flight work" before stopping).
    pub async fn try_pop(&self) -> Option<T> {
        self.rx.lock().await.try_recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn push_then_pop_is_fifo() {
        let q: MemQueue<i32> = MemQueue::new();
        q.push(1);
        q.push(2);
        assert_eq!(q.pop(Duration::from_millis(50)).await, Some(1));
        assert_eq!(q.pop(Duration::from_millis(50)).await, Some(2));
    }

    #[tokio::test]
    async fn pop_times_out_on_empty_queue() {
        let q: MemQueue<i32> = MemQueue::new();
        assert_eq!(q.pop(Duration::from_millis(10)).await, None);
    }

    #[tokio::test]
    async fn clones_share_the_same_underlying_queue() {
        let q: MemQueue<i32> = MemQueue::new();
        let q2 = q.clone();
        q.push(42);
        assert_eq!(q2.pop(Duration::from_millis(50)).await, Some(42));
    }
}
