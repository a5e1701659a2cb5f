//! Benchmarks for queue operations
//!
//! - Sending messages of varying size
//! - A full send, receive and complete cycle
//! - Scheduling into the future, which exercises the ordered schedule index
#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::{hint::black_box, time::Duration};

use chrono::{TimeDelta, Utc};
use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use tripwire_queue::{MemoryQueue, Message, MessageReceiver, MessageScheduler};

fn create_test_message(size: usize) -> Message {
    Message::new(vec![b'X'; size])
        .with_property("retry_count", 0_i64)
        .with_property("tenant", "bench")
}

fn bench_send(c: &mut Criterion) {
    let mut group = c.benchmark_group("queue_send");

    let runtime = tokio::runtime::Runtime::new().expect("Failed to create runtime");

    let sizes = vec![(1024, "1KB"), (10 * 1024, "10KB"), (100 * 1024, "100KB")];

    for (size, desc) in sizes {
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(desc), &size, |b, &size| {
            b.to_async(&runtime).iter(|| async move {
                let queue = MemoryQueue::new("bench");
                let sequence = queue
                    .send(create_test_message(black_box(size)))
                    .await
                    .expect("Send succeeds");
                black_box(sequence)
            });
        });
    }

    group.finish();
}

fn bench_send_receive_complete(c: &mut Criterion) {
    let mut group = c.benchmark_group("queue_lifecycle");

    let runtime = tokio::runtime::Runtime::new().expect("Failed to create runtime");

    for count in [10, 100, 1000] {
        group.throughput(Throughput::Elements(count));
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{count}_messages")),
            &count,
            |b, &count| {
                b.to_async(&runtime).iter(|| async move {
                    let queue = MemoryQueue::new("bench");
                    for _ in 0..count {
                        queue
                            .send(create_test_message(1024))
                            .await
                            .expect("Send succeeds");
                    }

                    while let Some(message) = queue
                        .receive(Duration::ZERO)
                        .await
                        .expect("Receive succeeds")
                    {
                        let token = message.lock_token().expect("Locked message");
                        queue.complete(&token).await.expect("Complete succeeds");
                    }
                    black_box(queue.is_empty())
                });
            },
        );
    }

    group.finish();
}

fn bench_schedule(c: &mut Criterion) {
    let mut group = c.benchmark_group("queue_schedule");

    let runtime = tokio::runtime::Runtime::new().expect("Failed to create runtime");

    group.bench_function("schedule_future", |b| {
        b.to_async(&runtime).iter(|| async {
            let queue = MemoryQueue::new("bench");
            for delay in 1..=50 {
                queue
                    .schedule(
                        create_test_message(256),
                        Utc::now() + TimeDelta::seconds(delay),
                    )
                    .await
                    .expect("Schedule succeeds");
            }
            black_box(queue.len())
        });
    });

    group.finish();
}

criterion_group!(benches, bench_send, bench_send_receive_complete, bench_schedule);
criterion_main!(benches);
