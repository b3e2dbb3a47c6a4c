//! Snapshot and request handling benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;
use workflowd_core::{ActionDef, DefinitionSpec, StateDef, WorkflowEngine};
use workflowd_server::handler::{ApiHandler, ApiRequest, Method};
use workflowd_storage::{Snapshot, SnapshotStore};

fn populated_engine(instances: usize) -> WorkflowEngine {
    let engine = WorkflowEngine::new();
    engine
        .create_definition(
            DefinitionSpec::new("Order")
                .with_id("order")
                .with_state(StateDef::new("Draft", "Draft").initial())
                .with_state(StateDef::new("Submitted", "Submitted"))
                .with_state(StateDef::new("Shipped", "Shipped").terminal())
                .with_action(ActionDef::new("submit", "Submit", ["Draft"], "Submitted"))
                .with_action(ActionDef::new("ship", "Ship", ["Submitted"], "Shipped")),
        )
        .unwrap();

    for i in 0..instances {
        let id = format!("o-{}", i);
        engine.start_instance("order", Some(&id)).unwrap();
        engine.execute_action(&id, "submit").unwrap();
    }
    engine
}

fn bench_capture_restore(c: &mut Criterion) {
    let mut group = c.benchmark_group("snapshot");
    group.sample_size(20);

    for size in [100, 1000] {
        let engine = populated_engine(size);
        let snapshot = Snapshot::capture(&engine);
        let json = snapshot.to_json_pretty().unwrap();

        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::new("capture", size), &engine, |b, engine| {
            b.iter(|| black_box(Snapshot::capture(engine)))
        });
        group.bench_with_input(BenchmarkId::new("restore", size), &json, |b, json| {
            b.iter(|| {
                let target = WorkflowEngine::new();
                let report = Snapshot::from_json(json)
                    .unwrap()
                    .restore_into(&target)
                    .unwrap();
                black_box(report)
            })
        });
    }

    group.finish();
}

fn bench_store_save(c: &mut Criterion) {
    let mut group = c.benchmark_group("snapshot_store");
    group.sample_size(20);

    let dir = TempDir::new().unwrap();
    let store = SnapshotStore::open(dir.path()).unwrap();
    let snapshot = Snapshot::capture(&populated_engine(1000));

    group.bench_function("save_and_prune", |b| {
        b.iter(|| {
            black_box(store.save(&snapshot).unwrap());
            store.prune(3).unwrap();
        })
    });

    group.finish();
}

fn bench_handler(c: &mut Criterion) {
    let mut group = c.benchmark_group("handler");

    let handler = ApiHandler::new(Arc::new(populated_engine(100)));
    let get = ApiRequest::new(Method::GET, "/workflow-instances/o-42");
    let list = ApiRequest::new(Method::GET, "/workflow-instances")
        .with_query("definitionId=order");

    group.throughput(Throughput::Elements(1));
    group.bench_function("get_instance", |b| b.iter(|| black_box(handler.handle(&get))));
    group.bench_function("list_instances", |b| {
        b.iter(|| black_box(handler.handle(&list)))
    });

    let mut counter = 0u64;
    group.bench_function("start_instance", |b| {
        b.iter(|| {
            counter += 1;
            let request = ApiRequest::new(Method::POST, "/workflow-instances")
                .with_json(&json!({"definitionId": "order", "id": format!("bench-{}", counter)}));
            black_box(handler.handle(&request))
        })
    });

    group.finish();
}

criterion_group!(benches, bench_capture_restore, bench_store_save, bench_handler);

criterion_main!(benches);
