//! End-to-end compilation latency: one representative class, source text in,
//! VM text out.

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use jackc::compile_source;

const POINT: &str = "class Point {
    field int x, y;

    constructor Point new(int ax, int ay) {
        let x = ax;
        let y = ay;
        return this;
    }

    method int distanceSq(Point other) {
        var int dx, dy;
        let dx = x - other.getX();
        let dy = y - other.getY();
        return (dx * dx) + (dy * dy);
    }

    method int getX() { return x; }
    method int getY() { return y; }

    method void print() {
        do Output.printString(\"(\");
        do Output.printInt(x);
        do Output.printString(\", \");
        do Output.printInt(y);
        do Output.printString(\")\");
        return;
    }
}";

/// Build a directory-sized workload by repeating the class under fresh names.
fn synthetic_batch(n: usize) -> Vec<String> {
    (0..n)
        .map(|i| POINT.replace("Point", &format!("Point{}", i)))
        .collect()
}

fn bench_compile_class(c: &mut Criterion) {
    c.bench_function("compile_point_class", |b| {
        b.iter(|| compile_source(black_box(POINT)).unwrap())
    });
}

fn bench_compile_batch(c: &mut Criterion) {
    let units_10 = synthetic_batch(10);
    let units_50 = synthetic_batch(50);

    let mut group = c.benchmark_group("compile_batch");
    group.bench_function("10_classes", |b| {
        b.iter(|| {
            for unit in &units_10 {
                compile_source(black_box(unit)).unwrap();
            }
        })
    });
    group.bench_function("50_classes", |b| {
        b.iter(|| {
            for unit in &units_50 {
                compile_source(black_box(unit)).unwrap();
            }
        })
    });
    group.finish();
}

criterion_group!(benches, bench_compile_class, bench_compile_batch);
criterion_main!(benches);
