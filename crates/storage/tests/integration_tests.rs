//! Document engine integration tests
//!
//! End-to-end behaviour of a collection opened through `NoSqlDatabase`:
//! filters, dotted-path updates with broadcast, cursors and upserts.

use serde::Deserialize;
use std::sync::Arc;
use trellis_core::{doc, Value};
use trellis_storage::{CollectionExt, MemoryDatabase, NoSqlCollection, NoSqlDatabase};

#[derive(Debug, Deserialize, PartialEq)]
struct Rating {
    r#type: String,
    rating: i32,
}

#[derive(Debug, Deserialize, PartialEq)]
struct Tea {
    r#type: String,
    size: i32,
}

#[derive(Debug, Deserialize, PartialEq)]
struct Customer {
    name: String,
    teas: Vec<Tea>,
}

async fn collection(name: &str) -> Arc<dyn NoSqlCollection> {
    let db = MemoryDatabase::new();
    db.collection("test", name).await.unwrap()
}

#[tokio::test]
async fn test_comparison_and_or_filters() {
    let c = collection("ratings").await;
    c.insert_many(vec![
        doc! { "type": "A", "rating": 5 },
        doc! { "type": "B", "rating": 7 },
    ])
    .await
    .unwrap();

    let high: Vec<Rating> = c.find_many_as(&doc! { "rating": { "$gt": 6 } }).await.unwrap();
    assert_eq!(
        high,
        vec![Rating {
            r#type: "B".into(),
            rating: 7
        }]
    );

    let both: Vec<Rating> = c
        .find_many_as(&doc! { "$or": [{ "rating": 5 }, { "rating": 7 }] })
        .await
        .unwrap();
    assert_eq!(both.len(), 2);
    assert_eq!(both[0].r#type, "A");
    assert_eq!(both[1].r#type, "B");
}

#[tokio::test]
async fn test_pull_with_query_over_subdocuments() {
    let c = collection("customers").await;
    c.insert_one(doc! {
        "name": "c1",
        "teas": [{ "type": "Masala", "size": 4 }, { "type": "Earl", "size": 16 }]
    })
    .await
    .unwrap();

    let updated = c
        .update_many(&doc! {}, &doc! { "$pull": { "teas": { "size": 4 } } })
        .await
        .unwrap();
    assert_eq!(updated, 1);

    let customer: Customer = c.find_one_as(&doc! { "name": "c1" }).await.unwrap().unwrap();
    assert_eq!(
        customer.teas,
        vec![Tea {
            r#type: "Earl".into(),
            size: 16
        }]
    );
}

#[tokio::test]
async fn test_set_then_find_returns_value() {
    let c = collection("kv").await;
    c.insert_one(doc! { "k": "a" }).await.unwrap();
    for _ in 0..2 {
        c.update_one(&doc! { "k": "a" }, &doc! { "$set": { "v.w": 3 } })
            .await
            .unwrap();
    }
    let found = c.find_one(&doc! { "v.w": 3 }, None).await.unwrap();
    assert_eq!(found.len(), 1);
}

#[tokio::test]
async fn test_unset_then_exists_is_false() {
    let c = collection("kv").await;
    c.insert_one(doc! { "k": "a", "gone": 1 }).await.unwrap();
    c.update_one(&doc! {}, &doc! { "$unset": { "gone": "" } })
        .await
        .unwrap();
    assert_eq!(c.count(&doc! { "gone": { "$exists": true } }).await.unwrap(), 0);
    assert_eq!(c.count(&doc! { "gone": { "$exists": false } }).await.unwrap(), 1);
}

#[tokio::test]
async fn test_follow_edges_as_array_of_subdocuments() {
    let c = collection("social-graph").await;
    c.insert_one(doc! { "user_id": 1, "followers": [], "followees": [] })
        .await
        .unwrap();
    c.update_many(
        &doc! { "user_id": 1 },
        &doc! { "$push": { "followers": { "follower_id": 2, "timestamp": 100 } } },
    )
    .await
    .unwrap();

    let hit = c
        .count(&doc! { "user_id": 1, "followers.follower_id": 2 })
        .await
        .unwrap();
    assert_eq!(hit, 1);

    c.update_many(
        &doc! { "user_id": 1 },
        &doc! { "$pull": { "followers": { "follower_id": 2 } } },
    )
    .await
    .unwrap();
    let hit = c
        .count(&doc! { "followers.follower_id": 2 })
        .await
        .unwrap();
    assert_eq!(hit, 0);
}

#[tokio::test]
async fn test_projection_slices_timeline() {
    let c = collection("user-timeline").await;
    c.insert_one(doc! { "user_id": 1, "posts": [
        { "post_id": 1, "timestamp": 1 },
        { "post_id": 2, "timestamp": 2 },
        { "post_id": 3, "timestamp": 3 }
    ] })
    .await
    .unwrap();

    let cursor = c
        .find_one(
            &doc! { "user_id": 1 },
            Some(&doc! { "_id": 0, "posts": { "$slice": [1, 1] } }),
        )
        .await
        .unwrap();
    let doc = &cursor.documents()[0];
    assert!(doc.get("_id").is_none());
    let posts = doc.get("posts").and_then(Value::as_array).unwrap();
    assert_eq!(posts.len(), 1);
    assert_eq!(
        posts[0].as_document().and_then(|p| p.get("post_id")),
        Some(&Value::Int32(2))
    );
}

#[tokio::test]
async fn test_concurrent_inserts_are_serialized() {
    let c = collection("counter").await;
    let mut handles = Vec::new();
    for i in 0..16 {
        let c = c.clone();
        handles.push(tokio::spawn(async move {
            c.insert_one(doc! { "i": i }).await.unwrap();
        }));
    }
    for h in handles {
        h.await.unwrap();
    }
    assert_eq!(c.count(&doc! {}).await.unwrap(), 16);
}
