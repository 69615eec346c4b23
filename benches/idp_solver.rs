//! Join enumeration benchmarks on chain and star shaped query graphs.
#![forbid(unsafe_code)]
#![allow(missing_docs)]

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use penumbra::query::graph::SemanticDirection;
use penumbra::query::metadata::InMemoryMetadata;
use penumbra::query::{
    InterestingOrder, PlannerConfig, PlanningContext, QueryGraph, QueryGraphBuilder,
    QueryPlannerKit, SingleComponentPlanner,
};

const SIZES: [usize; 4] = [2, 4, 8, 12];

fn metadata() -> Arc<InMemoryMetadata> {
    Arc::new(
        InMemoryMetadata::new()
            .with_nodes(100_000)
            .with_relationships(1_000_000)
            .with_relationship_type("LINK", 250_000),
    )
}

fn chain(len: usize) -> QueryGraph {
    (0..len)
        .fold(QueryGraphBuilder::new(), |builder, i| {
            builder.relationship(
                format!("r{i}"),
                format!("n{i}"),
                format!("n{}", i + 1),
                SemanticDirection::Outgoing,
                ["LINK"],
            )
        })
        .build()
        .expect("chain query graph")
}

fn star(arms: usize) -> QueryGraph {
    (0..arms)
        .fold(QueryGraphBuilder::new(), |builder, i| {
            builder.relationship(
                format!("r{i}"),
                "hub",
                format!("leaf{i}"),
                SemanticDirection::Outgoing,
                ["LINK"],
            )
        })
        .build()
        .expect("star query graph")
}

fn bench_shape(c: &mut Criterion, name: &str, build: fn(usize) -> QueryGraph) {
    let mut group = c.benchmark_group(format!("idp/{name}"));
    group.sample_size(20);
    let kit = QueryPlannerKit::default();
    let planner = SingleComponentPlanner::new();
    let order = InterestingOrder::empty();

    for size in SIZES {
        let qg = build(size);
        group.bench_with_input(BenchmarkId::new("default_budget", size), &qg, |b, qg| {
            b.iter(|| {
                let ctx = PlanningContext::new(metadata(), PlannerConfig::default());
                let plan = planner
                    .plan_component(qg, &ctx, &kit, &order)
                    .expect("plan");
                black_box(plan.id.0);
            });
        });
        group.bench_with_input(BenchmarkId::new("table_size_16", size), &qg, |b, qg| {
            b.iter(|| {
                let config = PlannerConfig::default().idp_max_table_size(16);
                let ctx = PlanningContext::new(metadata(), config);
                let plan = planner
                    .plan_component(qg, &ctx, &kit, &order)
                    .expect("plan");
                black_box(plan.id.0);
            });
        });
    }
    group.finish();
}

fn idp_chain(c: &mut Criterion) {
    bench_shape(c, "chain", chain);
}

fn idp_star(c: &mut Criterion) {
    bench_shape(c, "star", star);
}

criterion_group!(benches, idp_chain, idp_star);
criterion_main!(benches);
