//! Workflow engine benchmarks.

use criterion::{
    black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion, Throughput,
};
use std::sync::atomic::{AtomicU64, Ordering};
use workflowd_core::{ActionDef, DefinitionSpec, StateDef, WorkflowEngine};

// Global counter to ensure unique ids across all benchmark iterations
static ID_COUNTER: AtomicU64 = AtomicU64::new(0);

fn next_id(prefix: &str) -> String {
    format!("{}-{}", prefix, ID_COUNTER.fetch_add(1, Ordering::Relaxed))
}

/// Two-state loop, so an instance can transition forever.
fn loop_spec(id: &str) -> DefinitionSpec {
    DefinitionSpec::new("Loop")
        .with_id(id)
        .with_state(StateDef::new("idle", "Idle").initial())
        .with_state(StateDef::new("busy", "Busy"))
        .with_action(ActionDef::new("start", "Start", ["idle"], "busy"))
        .with_action(ActionDef::new("finish", "Finish", ["busy"], "idle"))
}

/// Linear chain of `n` states joined by `n - 1` actions.
fn chain_spec(id: &str, n: usize) -> DefinitionSpec {
    let mut spec = DefinitionSpec::new("Chain").with_id(id);
    for i in 0..n {
        let state = StateDef::new(format!("state_{}", i), format!("State {}", i));
        spec = spec.with_state(if i == 0 { state.initial() } else { state });
    }
    for i in 0..n - 1 {
        spec = spec.with_action(ActionDef::new(
            format!("next_{}", i),
            "Next",
            [format!("state_{}", i)],
            format!("state_{}", i + 1),
        ));
    }
    spec
}

fn bench_create_definition(c: &mut Criterion) {
    let mut group = c.benchmark_group("engine_create_definition");
    let engine = WorkflowEngine::new();

    group.bench_function("simple", |b| {
        b.iter(|| black_box(engine.create_definition(loop_spec(&next_id("simple"))).unwrap()))
    });

    for size in [20, 200] {
        group.bench_with_input(BenchmarkId::new("chain", size), &size, |b, &n| {
            b.iter(|| {
                black_box(
                    engine
                        .create_definition(chain_spec(&next_id("chain"), n))
                        .unwrap(),
                )
            })
        });
    }

    group.finish();
}

fn bench_start_instance(c: &mut Criterion) {
    let mut group = c.benchmark_group("engine_start_instance");
    let engine = WorkflowEngine::new();
    engine.create_definition(loop_spec("loop")).unwrap();

    group.throughput(Throughput::Elements(1));
    group.bench_function("explicit_id", |b| {
        b.iter(|| black_box(engine.start_instance("loop", Some(&next_id("inst"))).unwrap()))
    });
    group.bench_function("generated_id", |b| {
        b.iter(|| black_box(engine.start_instance("loop", None).unwrap()))
    });

    group.finish();
}

fn bench_get_instance(c: &mut Criterion) {
    let mut group = c.benchmark_group("engine_get_instance");
    let engine = WorkflowEngine::new();
    engine.create_definition(loop_spec("loop")).unwrap();

    for i in 0..1000 {
        engine
            .start_instance("loop", Some(&format!("get-inst-{}", i)))
            .unwrap();
    }

    group.throughput(Throughput::Elements(1));
    group.bench_function("get", |b| {
        let mut id = 0usize;
        b.iter(|| {
            id = (id + 1) % 1000;
            black_box(engine.get_instance(&format!("get-inst-{}", id)).unwrap())
        });
    });

    group.finish();
}

fn bench_execute_action(c: &mut Criterion) {
    let mut group = c.benchmark_group("engine_execute_action");
    let engine = WorkflowEngine::new();
    engine.create_definition(loop_spec("loop")).unwrap();

    // Outcomes carry a copy of the history, so every iteration gets a fresh instance.
    let fresh = || {
        let id = next_id("exec");
        engine.start_instance("loop", Some(&id)).unwrap();
        id
    };

    group.throughput(Throughput::Elements(1));
    group.bench_function("transition", |b| {
        b.iter_batched(
            fresh,
            |id| black_box(engine.execute_action(&id, "start").unwrap()),
            BatchSize::SmallInput,
        )
    });
    group.bench_function("rejected", |b| {
        b.iter_batched(
            fresh,
            |id| black_box(engine.execute_action(&id, "finish").is_err()),
            BatchSize::SmallInput,
        )
    });

    group.finish();
}

fn bench_contended_execute(c: &mut Criterion) {
    let mut group = c.benchmark_group("engine_contention");
    group.sample_size(20);

    let engine = WorkflowEngine::new();
    engine.create_definition(loop_spec("loop")).unwrap();

    const THREADS: usize = 4;
    const OPS: usize = 100;
    group.throughput(Throughput::Elements((THREADS * OPS * 2) as u64));

    let fresh_instances = |count: usize| {
        (0..count)
            .map(|_| {
                let id = next_id("contended");
                engine.start_instance("loop", Some(&id)).unwrap();
                id
            })
            .collect::<Vec<_>>()
    };

    let run = |ids: &[String]| {
        std::thread::scope(|s| {
            for t in 0..THREADS {
                let id = &ids[t % ids.len()];
                let engine = &engine;
                s.spawn(move || {
                    for _ in 0..OPS {
                        let _ = engine.execute_action(id, "start");
                        let _ = engine.execute_action(id, "finish");
                    }
                });
            }
        })
    };

    group.bench_function("distinct_instances", |b| {
        b.iter_batched(
            || fresh_instances(THREADS),
            |ids| run(&ids),
            BatchSize::PerIteration,
        )
    });
    group.bench_function("same_instance", |b| {
        b.iter_batched(|| fresh_instances(1), |ids| run(&ids), BatchSize::PerIteration)
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_create_definition,
    bench_start_instance,
    bench_get_instance,
    bench_execute_action,
    bench_contended_execute,
);

criterion_main!(benches);
