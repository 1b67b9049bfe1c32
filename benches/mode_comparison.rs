//! Benchmarks comparing the tree-walking interpreter with the bytecode VM.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use monkey_lang::{run_with_options, ExecutionMode};
use std::fs;

/// Run via tree-walking interpreter.
fn run_treewalk(source: &str) {
    run_with_options(source, ExecutionMode::TreeWalk, false).expect("runtime error");
}

/// Run via bytecode VM (compile + execute).
fn run_vm(source: &str) {
    run_with_options(source, ExecutionMode::Bytecode, false).expect("vm runtime error");
}

fn load_program(name: &str) -> String {
    let path = format!("benches/programs/{}.monkey", name);
    fs::read_to_string(&path).unwrap_or_else(|_| panic!("failed to read {}", path))
}

fn fibonacci_comparison(c: &mut Criterion) {
    let mut group = c.benchmark_group("fib_recursive_comparison");
    let source = load_program("fib_recursive");

    group.bench_function("treewalk", |b| b.iter(|| run_treewalk(black_box(&source))));
    group.bench_function("vm", |b| b.iter(|| run_vm(black_box(&source))));

    group.finish();
}

fn loop_sum_comparison(c: &mut Criterion) {
    let mut group = c.benchmark_group("loop_sum_comparison");
    let source = load_program("loop_sum");

    group.bench_function("treewalk", |b| b.iter(|| run_treewalk(black_box(&source))));
    group.bench_function("vm", |b| b.iter(|| run_vm(black_box(&source))));

    group.finish();
}

fn higher_order_comparison(c: &mut Criterion) {
    let mut group = c.benchmark_group("higher_order_comparison");
    let source = load_program("higher_order");

    group.bench_function("treewalk", |b| b.iter(|| run_treewalk(black_box(&source))));
    group.bench_function("vm", |b| b.iter(|| run_vm(black_box(&source))));

    group.finish();
}

criterion_group!(
    benches,
    fibonacci_comparison,
    loop_sum_comparison,
    higher_order_comparison
);
criterion_main!(benches);
