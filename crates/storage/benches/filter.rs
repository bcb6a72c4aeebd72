//! Filter evaluation benchmarks
//!
//! Measures parse-once/evaluate-many over a timeline-shaped collection,
//! the hot path of every find.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use trellis_core::{doc, Document};
use trellis_storage::parse_filter;

fn timelines(n: usize) -> Vec<Document> {
    (0..n)
        .map(|i| {
            let mut d = doc! {
                "posts": [
                    { "post_id": 1, "timestamp": 10 },
                    { "post_id": 2, "timestamp": 20 }
                ],
                "teas": [{ "type": "Masala", "size": 4 }, { "type": "Earl", "size": 16 }]
            };
            d.insert_front("user_id", i as i64);
            d
        })
        .collect()
}

fn bench_filter_eval(c: &mut Criterion) {
    let docs = timelines(1000);
    let mut group = c.benchmark_group("filter");
    group.throughput(Throughput::Elements(docs.len() as u64));

    let eq = parse_filter(&doc! { "user_id": 500 }).unwrap();
    group.bench_function("equality", |b| {
        b.iter(|| docs.iter().filter(|d| eq.matches(black_box(d))).count())
    });

    let broadcast = parse_filter(&doc! { "teas.size": { "$gt": 8 } }).unwrap();
    group.bench_function("dotted_broadcast", |b| {
        b.iter(|| docs.iter().filter(|d| broadcast.matches(black_box(d))).count())
    });

    let elem = parse_filter(&doc! {
        "teas": { "$elemMatch": { "type": "Earl", "size": { "$gte": 16 } } }
    })
    .unwrap();
    group.bench_function("elem_match", |b| {
        b.iter(|| docs.iter().filter(|d| elem.matches(black_box(d))).count())
    });
    group.finish();
}

fn bench_filter_parse(c: &mut Criterion) {
    let filter = doc! {
        "$or": [{ "rating": { "$gt": 6, "$lt": 9 } }, { "type": { "$in": ["A", "B"] } }]
    };
    c.bench_function("filter/parse", |b| b.iter(|| parse_filter(black_box(&filter)).unwrap()));
}

criterion_group!(benches, bench_filter_eval, bench_filter_parse);
criterion_main!(benches);
