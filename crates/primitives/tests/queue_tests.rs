//! Producer/consumer behavior of the bounded queue

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use trellis_primitives::Queue;

#[tokio::test]
async fn test_full_queue_blocks_producer_until_pop() {
    let queue = Arc::new(Queue::<u32>::new(1));
    let cancel = CancellationToken::new();
    queue.push(1, &cancel).await.unwrap();
    assert!(!queue.try_push(2).unwrap());

    let producer = {
        let queue = queue.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { queue.push(2, &cancel).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!producer.is_finished());

    assert_eq!(queue.pop(&cancel).await.unwrap(), 1);
    producer.await.unwrap().unwrap();
    assert_eq!(queue.try_pop().unwrap(), Some(2));
}

#[tokio::test]
async fn test_many_producers_one_consumer() {
    let queue = Arc::new(Queue::<u32>::new(4));
    let cancel = CancellationToken::new();

    let producers: Vec<_> = (0..8)
        .map(|p| {
            let queue = queue.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                for i in 0..25 {
                    queue.push(p * 100 + i, &cancel).await.unwrap();
                }
            })
        })
        .collect();

    let mut received = Vec::new();
    while received.len() < 200 {
        received.push(queue.pop(&cancel).await.unwrap());
    }
    for producer in producers {
        producer.await.unwrap();
    }

    received.sort_unstable();
    let expected: Vec<u32> = (0..8).flat_map(|p| (0..25).map(move |i| p * 100 + i)).collect();
    assert_eq!(received, expected);
    assert!(queue.is_empty());
}

#[tokio::test]
async fn test_cancel_unblocks_waiting_consumer() {
    let queue = Arc::new(Queue::<u32>::default());
    let cancel = CancellationToken::new();

    let consumer = {
        let queue = queue.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { queue.pop(&cancel).await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;
    cancel.cancel();

    let err = consumer.await.unwrap().unwrap_err();
    assert!(err.is_cancelled());
}
