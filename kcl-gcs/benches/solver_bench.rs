//! Benchmarks for the kcl-gcs solver.
use std::{hint::black_box, str::FromStr};

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use kcl_gcs::{ConstraintGraph, textual::Sketch};

/// General benchmark template.
/// Opens a given test case from the `test_cases`/ dir,
/// benchmarks solving it.
fn bench_case(c: &mut Criterion, test_case: &'static str) {
    let txt = std::fs::read_to_string(format!("test_cases/{test_case}/problem.md")).unwrap();
    c.bench_function(&format!("solve_{test_case}"), |b| {
        let sketch = Sketch::from_str(txt.as_str()).unwrap();
        b.iter(|| {
            // Solving caches its result, so start from a fresh copy each time.
            let mut sketch = sketch.clone();
            let _actual = black_box(sketch.solve());
        });
    });
}

/// Only decomposes, without solving.
fn bench_decompose(c: &mut Criterion, test_case: &'static str) {
    let txt = std::fs::read_to_string(format!("test_cases/{test_case}/problem.md")).unwrap();
    c.bench_function(&format!("decompose_{test_case}"), |b| {
        let sketch = Sketch::from_str(txt.as_str()).unwrap();
        b.iter(|| {
            let mut graph = sketch.graph().clone();
            graph.build_clusters();
            let _actual = black_box(graph.clusters().len());
        });
    });
}

fn solve_pentagon(c: &mut Criterion) {
    bench_case(c, "pentagon");
}

fn solve_prism(c: &mut Criterion) {
    bench_case(c, "prism");
}

fn decompose_pentagon(c: &mut Criterion) {
    bench_decompose(c, "pentagon");
}

/// A strip of `n` triangles, each sharing an edge with the one before.
/// Points zigzag between y = 0 and y = 1.
fn triangle_strip(n: usize) -> ConstraintGraph {
    let spot = |i: usize| (i as f64 * 0.5, (i % 2) as f64);
    let mut g = ConstraintGraph::new();
    let mut points = vec![g.add_fixed_point(0.0, 0.0)];
    for i in 1..n + 2 {
        let (x, y) = spot(i);
        // Start a little off, so there's work to do.
        points.push(g.add_point(x + 0.1, y - 0.05));
    }
    let cross = libm::hypot(0.5, 1.0);
    g.add_distance(points[0], points[1], cross).unwrap();
    for i in 2..points.len() {
        g.add_distance(points[i - 1], points[i], cross).unwrap();
        g.add_distance(points[i - 2], points[i], 1.0).unwrap();
    }
    g
}

fn solve_strip(c: &mut Criterion) {
    let mut group = c.benchmark_group("triangle_strip");
    for triangles in [50, 150] {
        // Each new triangle places one point, which is two unknowns.
        group.throughput(Throughput::Elements(2 * triangles as u64));
        group.bench_with_input(BenchmarkId::from_parameter(triangles), &triangles, |b, &n| {
            let graph = triangle_strip(n);
            b.iter(|| {
                let mut graph = graph.clone();
                let _actual = black_box(graph.solve());
            });
        });
    }
    group.finish();
}

criterion_group!(benches, solve_pentagon, solve_prism, decompose_pentagon, solve_strip);
criterion_main!(benches);
