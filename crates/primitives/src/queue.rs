//! Bounded handoff queue
//!
//! A fixed-capacity channel between producers and a consumer such as a
//! background worker. `push` waits while the queue is full and `pop` waits
//! while it is empty; both give up with [`Error::Cancelled`] when the
//! caller's cancellation token fires. The `try_` variants never wait.

use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use trellis_core::{Error, Result};

/// Capacity used when none is configured
pub const DEFAULT_CAPACITY: usize = 10;

/// Bounded queue of typed items
pub struct Queue<T> {
    tx: mpsc::Sender<T>,
    rx: Mutex<mpsc::Receiver<T>>,
    capacity: usize,
}

impl<T: Send> Queue<T> {
    /// Create a queue holding at most `capacity` items (minimum 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, rx) = mpsc::channel(capacity);
        Queue {
            tx,
            rx: Mutex::new(rx),
            capacity,
        }
    }

    /// Enqueue, waiting for space
    pub async fn push(&self, item: T, cancel: &CancellationToken) -> Result<()> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Error::cancelled("queue push")),
            sent = self.tx.send(item) => sent.map_err(|_| Error::backend("queue closed")),
        }
    }

    /// Enqueue without waiting. Returns false if the queue is full.
    pub fn try_push(&self, item: T) -> Result<bool> {
        match self.tx.try_send(item) {
            Ok(()) => Ok(true),
            Err(mpsc::error::TrySendError::Full(_)) => Ok(false),
            Err(mpsc::error::TrySendError::Closed(_)) => Err(Error::backend("queue closed")),
        }
    }

    /// Dequeue, waiting for an item
    pub async fn pop(&self, cancel: &CancellationToken) -> Result<T> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Error::cancelled("queue pop")),
            item = async { self.rx.lock().await.recv().await } => {
                item.ok_or_else(|| Error::backend("queue closed"))
            }
        }
    }

    /// Dequeue without waiting. Returns `None` if the queue is empty.
    pub fn try_pop(&self) -> Result<Option<T>> {
        let Ok(mut rx) = self.rx.try_lock() else {
            // another consumer is waiting in pop, so nothing is available
            return Ok(None);
        };
        match rx.try_recv() {
            Ok(item) => Ok(Some(item)),
            Err(mpsc::error::TryRecvError::Empty) => Ok(None),
            Err(mpsc::error::TryRecvError::Disconnected) => Err(Error::backend("queue closed")),
        }
    }

    /// Number of queued items
    pub fn len(&self) -> usize {
        self.capacity - self.tx.capacity()
    }

    /// True if nothing is queued
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of queued items
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl<T: Send> Default for Queue<T> {
    fn default() -> Self {
        Queue::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_fifo() {
        let q = Queue::new(4);
        let token = CancellationToken::new();
        q.push(1, &token).await.unwrap();
        q.push(2, &token).await.unwrap();
        assert_eq!(q.len(), 2);
        assert_eq!(q.pop(&token).await.unwrap(), 1);
        assert_eq!(q.pop(&token).await.unwrap(), 2);
        assert!(q.is_empty());
    }

    #[tokio::test]
    async fn test_try_variants() {
        let q = Queue::new(1);
        assert_eq!(q.try_pop().unwrap(), None);
        assert!(q.try_push("a").unwrap());
        assert!(!q.try_push("b").unwrap());
        assert_eq!(q.try_pop().unwrap(), Some("a"));
    }

    #[tokio::test]
    async fn test_default_capacity() {
        let q: Queue<u8> = Queue::default();
        assert_eq!(q.capacity(), DEFAULT_CAPACITY);
    }

    #[tokio::test]
    async fn test_cancel_unblocks_pop() {
        let q: Arc<Queue<u32>> = Arc::new(Queue::new(1));
        let token = CancellationToken::new();
        let waiter = {
            let q = q.clone();
            let token = token.clone();
            tokio::spawn(async move { q.pop(&token).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        token.cancel();
        let err = waiter.await.unwrap().unwrap_err();
        assert!(err.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancel_unblocks_push_when_full() {
        let q = Queue::new(1);
        let token = CancellationToken::new();
        q.push(1, &token).await.unwrap();
        let child = token.child_token();
        let canceller = {
            let token = token.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                token.cancel();
            })
        };
        let err = q.push(2, &child).await.unwrap_err();
        assert!(err.is_cancelled());
        canceller.await.unwrap();
    }

    #[tokio::test]
    async fn test_push_waits_for_space() {
        let q = Arc::new(Queue::new(1));
        let token = CancellationToken::new();
        q.push(1, &token).await.unwrap();
        let producer = {
            let q = q.clone();
            let token = token.clone();
            tokio::spawn(async move { q.push(2, &token).await })
        };
        assert_eq!(q.pop(&token).await.unwrap(), 1);
        producer.await.unwrap().unwrap();
        assert_eq!(q.pop(&token).await.unwrap(), 2);
    }
}
