//! Delivery worker
//!
//! Orders hand deliveries to a [`Queue`]; a [`DeliveryWorker`] running in
//! the namespace drains it into the `delivery` collection until the
//! namespace shuts down.

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use trellis_core::Result;
use trellis_engine::Runnable;
use trellis_primitives::Queue;
use trellis_storage::{CollectionExt, NoSqlCollection};

use crate::model::Delivery;

/// Persists queued deliveries
pub struct DeliveryWorker {
    queue: Arc<Queue<Delivery>>,
    deliveries: Arc<dyn NoSqlCollection>,
    stored: AtomicU64,
    failed: AtomicU64,
}

impl DeliveryWorker {
    /// Worker draining `queue` into `deliveries`
    pub fn new(queue: Arc<Queue<Delivery>>, deliveries: Arc<dyn NoSqlCollection>) -> Self {
        DeliveryWorker {
            queue,
            deliveries,
            stored: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        }
    }

    /// The queue this worker drains
    pub fn queue(&self) -> &Arc<Queue<Delivery>> {
        &self.queue
    }

    /// Deliveries persisted so far
    pub fn stored(&self) -> u64 {
        self.stored.load(Ordering::Relaxed)
    }

    /// Deliveries that could not be persisted
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    async fn persist(&self, delivery: &Delivery) {
        match self.deliveries.insert(delivery).await {
            Ok(_) => {
                self.stored.fetch_add(1, Ordering::Relaxed);
                debug!(target: "trellis::services", order_id = %delivery.order_id, "Stored delivery");
            }
            Err(e) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                error!(target: "trellis::services", order_id = %delivery.order_id, error = %e, "Failed to store delivery");
            }
        }
    }
}

#[async_trait]
impl Runnable for DeliveryWorker {
    async fn run(&self, cancel: CancellationToken) -> Result<()> {
        info!(target: "trellis::services", capacity = self.queue.capacity(), "Delivery worker started");
        loop {
            match self.queue.pop(&cancel).await {
                Ok(delivery) => self.persist(&delivery).await,
                Err(e) if e.is_cancelled() => break,
                Err(e) => {
                    error!(target: "trellis::services", error = %e, "Delivery queue failed");
                    return Err(e);
                }
            }
        }
        info!(target: "trellis::services", stored = self.stored(), "Delivery worker stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use trellis_storage::MemoryCollection;

    fn delivery(order: &str) -> Delivery {
        Delivery {
            order_id: order.into(),
            food_name: "noodles".into(),
            store_name: "shop".into(),
            station_name: "east".into(),
        }
    }

    #[tokio::test]
    async fn test_worker_drains_queue_until_cancelled() {
        let queue = Arc::new(Queue::new(4));
        let coll = Arc::new(MemoryCollection::new("delivery"));
        let worker = Arc::new(DeliveryWorker::new(queue.clone(), coll.clone()));
        let token = CancellationToken::new();

        let handle = {
            let worker = worker.clone();
            let token = token.clone();
            tokio::spawn(async move { worker.run(token).await })
        };

        for order in ["o1", "o2", "o3"] {
            queue.push(delivery(order), &token).await.unwrap();
        }
        for _ in 0..100 {
            if worker.stored() == 3 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(worker.stored(), 3);
        assert_eq!(coll.len(), 3);

        token.cancel();
        handle.await.unwrap().unwrap();
    }
}
