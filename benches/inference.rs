//! Benchmarks for engine construction, cached marginal queries, and
//! cross-clique joins.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use juncture::{CptRow, CptSpec, Event, InferenceEngine, JunctionTreeSpec, NetworkSpec, VariableDef};

/// A binary chain X0→X1→…→Xn-1 with one clique per edge.
fn chain(length: usize) -> (NetworkSpec, JunctionTreeSpec) {
    let mut network = NetworkSpec::new().variable(
        VariableDef::new("X0", ["T", "F"]).with_cpt(CptSpec::root([("T", 0.3), ("F", 0.7)])),
    );
    let mut junction = JunctionTreeSpec::new();
    for i in 1..length {
        let parent = format!("X{}", i - 1);
        let name = format!("X{}", i);
        network = network.variable(
            VariableDef::new(name.clone(), ["T", "F"])
                .with_parents([parent.clone()])
                .with_cpt(CptSpec::Conditioned(vec![
                    CptRow::new(&[(parent.as_str(), "T")], &[("T", 0.8), ("F", 0.2)]),
                    CptRow::new(&[(parent.as_str(), "F")], &[("T", 0.1), ("F", 0.9)]),
                ])),
        );
        junction = junction.clique([parent.as_str(), name.as_str()]);
        if i > 1 {
            junction = junction.edge(i - 2, i - 1, [parent.as_str()]);
        }
    }
    (network, junction)
}

fn event(pairs: &[(&str, &str)]) -> Event {
    pairs
        .iter()
        .map(|(name, level)| (name.to_string(), vec![level.to_string()]))
        .collect()
}

fn bench_construction(c: &mut Criterion) {
    let (network, junction) = chain(16);
    c.bench_function("construct_chain16", |b| {
        b.iter(|| InferenceEngine::new(black_box(&network), black_box(&junction)).unwrap())
    });
}

fn bench_cached_marginal(c: &mut Criterion) {
    let (network, junction) = chain(16);
    let mut engine = InferenceEngine::new(&network, &junction).unwrap();
    let query = event(&[("X15", "T")]);
    engine.infer(&query).unwrap();
    c.bench_function("cached_marginal_chain16", |b| {
        b.iter(|| engine.infer(black_box(&query)).unwrap())
    });
}

fn bench_cross_clique_join(c: &mut Criterion) {
    let (network, junction) = chain(16);
    let mut engine = InferenceEngine::new(&network, &junction).unwrap();
    let query = event(&[("X0", "T"), ("X15", "T")]);
    c.bench_function("cross_clique_join_chain16", |b| {
        b.iter(|| engine.infer(black_box(&query)).unwrap())
    });
}

criterion_group!(
    benches,
    bench_construction,
    bench_cached_marginal,
    bench_cross_clique_join
);
criterion_main!(benches);
