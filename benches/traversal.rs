//! Traversal benchmarks
//!
//! Compares sequential `map` with `pmap` on a recompute-sized pool, for a cheap and an
//! expensive per-node function, and measures cycle-safe tree building over a dense graph.
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use degraphmalizer::trees::{build_tree, map, pmap, NodeAlreadyVisitedTracker, Tree};
use rayon::ThreadPoolBuilder;

/// Complete tree with `fanout` children per node, `depth` levels below the root.
fn complete_tree(fanout: usize, depth: usize) -> Tree<u64> {
    fn go(value: u64, fanout: usize, depth: usize) -> Tree<u64> {
        if depth == 0 {
            return Tree::leaf(value);
        }
        let children = (0..fanout as u64)
            .map(|i| go(value * fanout as u64 + i + 1, fanout, depth - 1))
            .collect();
        Tree::node(value, children)
    }
    go(0, fanout, depth)
}

fn busy(value: &u64, rounds: u64) -> u64 {
    let mut acc = *value;
    for i in 0..rounds {
        acc = acc.wrapping_mul(6364136223846793005).wrapping_add(i);
    }
    acc
}

fn bench_map_vs_pmap(c: &mut Criterion) {
    let pool = ThreadPoolBuilder::new()
        .num_threads(8)
        .thread_name(|i| format!("bench-{i}"))
        .build()
        .unwrap();
    let tree = complete_tree(4, 5);

    let mut group = c.benchmark_group("map_vs_pmap");
    for rounds in [10u64, 10_000] {
        group.bench_with_input(BenchmarkId::new("map", rounds), &rounds, |b, &rounds| {
            b.iter(|| map(|v| busy(v, rounds), black_box(&tree)))
        });
        group.bench_with_input(BenchmarkId::new("pmap", rounds), &rounds, |b, &rounds| {
            b.iter(|| {
                pmap(
                    &pool,
                    |v| Ok::<_, ()>(busy(v, rounds)),
                    black_box(&tree),
                )
                .unwrap()
            })
        });
    }
    group.finish();
}

fn bench_build_tree(c: &mut Criterion) {
    // every node links to the next 3, modulo 500: dense and cyclic
    let viewer = |n: &u64| (1..=3).map(|i| (n + i) % 500).collect::<Vec<u64>>();

    c.bench_function("build_tree_cyclic", |b| {
        b.iter(|| {
            build_tree(
                black_box(0u64),
                &viewer,
                NodeAlreadyVisitedTracker::default(),
                64,
            )
        })
    });
}

criterion_group! {
    name = benches;
    config = Criterion::default().sample_size(30);
    targets = bench_map_vs_pmap, bench_build_tree
}

criterion_main!(benches);
