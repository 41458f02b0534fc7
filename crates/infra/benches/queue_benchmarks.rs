use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};

use std::sync::Arc;
use std::time::Duration;

use ripple_core::UserId;
use ripple_tasks::{
    InMemoryJobBroker, InMemoryTaskStore, JobBroker, JobRequest, TaskLauncher, TaskStore, Worker,
    WorkerConfig, WorkRegistry,
};

fn rt() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .expect("failed to build benchmark runtime")
}

/// Raw broker throughput: enqueue + dequeue round trip, no durable store.
fn bench_broker_round_trip(c: &mut Criterion) {
    let rt = rt();
    let mut group = c.benchmark_group("broker");
    group.throughput(Throughput::Elements(1));

    group.bench_function("enqueue_dequeue", |b| {
        let broker = InMemoryJobBroker::new();
        let owner = UserId::new();
        let queues = vec!["default".to_string()];

        b.iter(|| {
            rt.block_on(async {
                let handle = broker
                    .enqueue(
                        "default",
                        JobRequest {
                            name: "bench.noop".into(),
                            owner,
                            args: serde_json::Value::Null,
                        },
                    )
                    .await
                    .unwrap();
                let job = broker
                    .dequeue(&queues, Duration::from_millis(1))
                    .await
                    .unwrap()
                    .unwrap();
                black_box((handle.id, job.id));
            })
        });
    });

    group.finish();
}

/// Full path: launch (enqueue + staged record + commit), then one worker
/// iteration executing a job that reports completion through the bridge.
fn bench_launch_and_execute(c: &mut Criterion) {
    let rt = rt();
    let mut group = c.benchmark_group("task_subsystem");
    group.throughput(Throughput::Elements(1));

    group.bench_function("launch_execute_complete", |b| {
        let broker = Arc::new(InMemoryJobBroker::new());
        let store = Arc::new(InMemoryTaskStore::new());
        let launcher = TaskLauncher::new(broker.clone(), "default");

        let mut registry = WorkRegistry::new();
        registry.register("bench.finish", |ctx, _job| async move {
            ctx.set_progress(100).await?;
            Ok(())
        });
        let worker = Worker::new(
            broker.clone(),
            store.clone(),
            Arc::new(registry),
            WorkerConfig {
                poll_timeout: Duration::from_millis(1),
                ..WorkerConfig::default()
            },
        );

        let owner = UserId::new();
        b.iter(|| {
            rt.block_on(async {
                let mut tx = store.begin().await.unwrap();
                let task = launcher
                    .launch(tx.as_mut(), owner, "bench.finish", "", serde_json::Value::Null)
                    .await
                    .unwrap();
                tx.commit().await.unwrap();

                assert!(worker.run_one().await.unwrap());
                black_box(task.id);
            })
        });
    });

    group.finish();
}

criterion_group!(benches, bench_broker_round_trip, bench_launch_and_execute);
criterion_main!(benches);
