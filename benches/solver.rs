//! Solver benchmarks.
//!
//! These measure generation plus solving over synthesized programs with
//! the shapes that dominate real workloads: deep copy chains and wide
//! fan-in through a single memory cell.
//!
//! Run with:
//! ```bash
//! cargo bench --bench solver
//! ```

use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use pta_rs::analysis::analyze;
use pta_rs::config::Config;
use pta_rs::ssa::{Program, ProgramBuilder};
use pta_rs::types::Signature;

fn void_sig() -> Signature {
    Signature {
        recv: None,
        params: vec![],
        results: vec![],
    }
}

/// `a := new(int)` followed by a chain of `n` copies.
fn chain_program(n: usize) -> Program {
    let mut pb = ProgramBuilder::new();
    let int = pb.types().int_type();
    let main = pb.declare("main", "main", void_sig());
    {
        let mut f = pb.body(main);
        let mut prev = f.alloc(int);
        for _ in 0..n {
            prev = f.phi(&[prev]);
        }
        f.ret(&[]);
    }
    pb.finish()
}

/// `n` allocations stored through one cell and loaded back out `n`
/// times: a star-shaped copy graph with a wide delta.
fn fan_program(n: usize) -> Program {
    let mut pb = ProgramBuilder::new();
    let int = pb.types().int_type();
    let ptr_int = pb.types().pointer_to(int);
    let main = pb.declare("main", "main", void_sig());
    {
        let mut f = pb.body(main);
        let cell = f.alloc(ptr_int);
        for _ in 0..n {
            let x = f.alloc(int);
            f.store(cell, x);
        }
        for _ in 0..n {
            f.load(cell);
        }
        f.ret(&[]);
    }
    pb.finish()
}

fn bench_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("solver/chain");
    for n in [64usize, 256, 1024] {
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, &n| {
            b.iter_batched(
                || chain_program(n),
                |prog| analyze(prog, Config::entry("main")).unwrap(),
                BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

fn bench_fan(c: &mut Criterion) {
    let mut group = c.benchmark_group("solver/fan");
    for n in [32usize, 128] {
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, &n| {
            b.iter_batched(
                || fan_program(n),
                |prog| analyze(prog, Config::entry("main")).unwrap(),
                BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

criterion_group!(benches, bench_chain, bench_fan);
criterion_main!(benches);
