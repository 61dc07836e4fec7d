//! Benchmarks for the collision search paths

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use hashcash_core::{Backend, Engine, count_bits, find_collision};

fn bench_backends(c: &mut Criterion) {
    let mut group = c.benchmark_group("backend_search");
    for backend in Backend::ALL.into_iter().filter(|b| b.probe()) {
        let Some(engine) = Engine::with_backend(backend) else {
            continue;
        };
        group.bench_with_input(BenchmarkId::from_parameter(backend.name()), &engine, |b, engine| {
            b.iter(|| engine.fast_mint(black_box(12), "1:12:040404:foo::", 100))
        });
    }
    group.finish();

    c.bench_function("count_bits", |b| {
        b.iter(|| count_bits(black_box("1:22:040404:foo::0123456789abcdef:00000000000")))
    });
}

fn bench_find_collision(c: &mut Criterion) {
    c.bench_function("find_collision_1024", |b| {
        b.iter(|| find_collision("040404", "foo@example.com", black_box(160), 1024, "0000000000000000"))
    });
}

criterion_group!(benches, bench_backends, bench_find_collision);
criterion_main!(benches);
