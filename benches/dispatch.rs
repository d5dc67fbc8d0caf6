use std::time::{Duration, Instant};

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use statewatch::{compile, EngineConfig, FilterSpec, Logger, StateChangeEvent, StateSnapshot, WatchEngine};

fn filter(i: usize) -> FilterSpec {
    FilterSpec::from_json(serde_json::json!({
        "id": format!("/^hm-rpc\\.0\\.LEQ{:04}\\./", i),
        "valGt": 20,
        "ack": true,
        "change": "ne"
    }))
    .unwrap()
}

fn event(i: usize) -> StateChangeEvent {
    StateChangeEvent::new(
        format!("hm-rpc.0.LEQ{:04}.1.TEMPERATURE", i),
        StateSnapshot::new(21.0).with_ack(true),
        StateSnapshot::new(22.5).with_ack(true),
    )
}

fn bench_compile(c: &mut Criterion) {
    let spec = filter(7);
    c.bench_function("filter/compile", |b| b.iter(|| compile(&spec)));
}

fn bench_evaluate(c: &mut Criterion) {
    let predicate = compile(&filter(7));
    let hit = event(7);
    let miss = event(8);

    c.bench_function("filter/evaluate_hit", |b| b.iter(|| predicate.matches(&hit)));
    c.bench_function("filter/evaluate_miss", |b| b.iter(|| predicate.matches(&miss)));
}

fn bench_dispatch(c: &mut Criterion) {
    let mut group = c.benchmark_group("dispatch/pass");
    for subscriptions in [10usize, 100, 1_000] {
        group.throughput(Throughput::Elements(1));
        group.bench_with_input(
            BenchmarkId::from_parameter(subscriptions),
            &subscriptions,
            |b, &n| {
                b.iter_custom(|iters| {
                    // Fresh engine per sample so mailboxes do not carry over.
                    let engine = WatchEngine::with_logger(EngineConfig::default(), Logger::disabled());
                    for i in 0..n {
                        engine.subscribe(filter(i), |_, _| Ok(()));
                    }
                    let ev = event(n / 2);

                    let start = Instant::now();
                    for _ in 0..iters {
                        engine.dispatch(&ev);
                    }
                    let elapsed = start.elapsed();
                    engine.wait_idle(Duration::from_secs(30));
                    elapsed
                });
            },
        );
    }
    group.finish();
}

criterion_group!(benches, bench_compile, bench_evaluate, bench_dispatch);
criterion_main!(benches);
