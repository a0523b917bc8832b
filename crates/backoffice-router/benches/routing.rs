//! Routing benchmarks.
//!
//! Run with: `cargo bench -p backoffice-router`

use backoffice_router::{PathTemplate, Router};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use http::Method;

fn build_router(num_routes: usize) -> Router {
    let mut router = Router::new();
    let mut add = |template: String, contract: String| {
        let template = PathTemplate::parse(&template).expect("valid template");
        router
            .insert(&Method::GET, &template, contract)
            .expect("unique route");
    };

    for i in 0..num_routes / 3 {
        add(format!("resource{i}"), format!("listResource{i}"));
        add(format!("resource{i}/[id]"), format!("getResource{i}"));
        add(
            format!("store/[store_id]/resource{i}/[id]"),
            format!("getStoreResource{i}"),
        );
    }

    router
}

fn bench_static_match(c: &mut Criterion) {
    let router = build_router(99);
    c.bench_function("static_match", |b| {
        b.iter(|| black_box(router.match_route(&Method::GET, "/resource20")));
    });
}

fn bench_param_match(c: &mut Criterion) {
    let router = build_router(99);
    c.bench_function("param_match", |b| {
        b.iter(|| black_box(router.match_route(&Method::GET, "/resource20/12345")));
    });
}

fn bench_store_scoped_match(c: &mut Criterion) {
    let router = build_router(99);
    c.bench_function("store_scoped_match", |b| {
        b.iter(|| {
            black_box(router.match_route(&Method::GET, "/store/42/resource10/12345"));
        });
    });
}

fn bench_miss(c: &mut Criterion) {
    let router = build_router(99);
    c.bench_function("miss", |b| {
        b.iter(|| black_box(router.match_route(&Method::GET, "/nonexistent/path")));
    });
}

fn bench_scaling(c: &mut Criterion) {
    let mut group = c.benchmark_group("scaling");
    for size in [30, 150, 600] {
        let router = build_router(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &router, |b, router| {
            b.iter(|| black_box(router.match_route(&Method::GET, "/store/42/resource5/1")));
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_static_match,
    bench_param_match,
    bench_store_scoped_match,
    bench_miss,
    bench_scaling
);
criterion_main!(benches);
