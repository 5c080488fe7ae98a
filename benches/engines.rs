//! Benchmark comparing the tree-walking interpreter and the bytecode VM.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use solisp::{run, Engine};

/// Recursive fibonacci: dominated by call overhead, which is where the
/// two engines differ most.
const FIBONACCI: &str = "
(def fibonacci (lambda (n)
    (if (or (= n 0)
            (= n 1))
        n
        (+ (fibonacci (- n 1))
           (fibonacci (- n 2))))))
(fibonacci 20)
";

/// Closure-heavy list traversal.
const MAP_REDUCE: &str = "
(def reduce (lambda (lst f acc)
    (if (= 0 (len lst))
        acc
        (reduce (rest lst) f (f acc (first lst))))))
(def map (lambda (lst f)
    (reduce lst (lambda (acc n) (push acc (f n))) '())))
(map '(1 2 3 4 5 6 7 8) (lambda (n) (* 2 n)))
";

fn fibonacci_comparison(c: &mut Criterion) {
    let mut group = c.benchmark_group("fib_recursive");

    group.bench_function("eval", |b| {
        b.iter(|| run(black_box(FIBONACCI), Engine::Eval).expect("eval error"))
    });
    group.bench_function("vm", |b| {
        b.iter(|| run(black_box(FIBONACCI), Engine::Vm).expect("vm error"))
    });

    group.finish();
}

fn map_reduce_comparison(c: &mut Criterion) {
    let mut group = c.benchmark_group("map_reduce");

    group.bench_function("eval", |b| {
        b.iter(|| run(black_box(MAP_REDUCE), Engine::Eval).expect("eval error"))
    });
    group.bench_function("vm", |b| {
        b.iter(|| run(black_box(MAP_REDUCE), Engine::Vm).expect("vm error"))
    });

    group.finish();
}

criterion_group!(benches, fibonacci_comparison, map_reduce_comparison);
criterion_main!(benches);
