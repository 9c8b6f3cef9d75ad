use criterion::{black_box, criterion_group, criterion_main, Criterion};
use serde_json::json;
use std::sync::Arc;
use tandem_core::{CompletionCoordinator, Group, GroupLink, Pipeline};
use tandem_store::{InMemoryBroker, InMemoryCounterBackend, Message};

fn stages(n: usize) -> Vec<Message> {
    (0..n).map(|i| Message::new("add", vec![json!(i)])).collect()
}

fn pipeline_compose_benchmark(c: &mut Criterion) {
    c.bench_function("pipeline compose 16 stages", |b| {
        b.iter(|| Pipeline::compose(black_box(stages(16))).unwrap());
    });
}

fn group_dispatch_benchmark(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("group dispatch 32 children", |b| {
        b.to_async(&runtime).iter(|| async {
            let broker = InMemoryBroker::new();
            let coordinator = CompletionCoordinator::new(Arc::new(InMemoryCounterBackend::new()));
            let group = Group::new(stages(32))
                .with_completion_callback(Message::new("finalize", vec![]))
                .unwrap();

            group.run(&broker, Some(&coordinator)).await.unwrap();
        });
    });
}

fn group_completion_benchmark(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("complete group of 32", |b| {
        b.to_async(&runtime).iter(|| async {
            let broker = InMemoryBroker::new();
            let coordinator = CompletionCoordinator::new(Arc::new(InMemoryCounterBackend::new()));
            let link = GroupLink::new("bench", Some(Message::new("finalize", vec![])), None);
            coordinator.initialize("bench", 32).await.unwrap();

            for i in 0..32 {
                coordinator
                    .complete_child(&broker, &link, black_box(&i.to_string()))
                    .await
                    .unwrap();
            }
        });
    });
}

criterion_group!(
    benches,
    pipeline_compose_benchmark,
    group_dispatch_benchmark,
    group_completion_benchmark
);
criterion_main!(benches);
