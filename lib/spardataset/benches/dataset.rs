#![allow(clippy::panic)]

use codspeed_criterion_compat::{Criterion, Throughput, criterion_group, criterion_main};
use oxrdf::{GraphName, Literal, NamedNode, Triple};
use spardataset::{
    MemoryProvider, MemoryQuadStorage, QuadDataset, QuadStorage, SparqlDataset,
    TransactionalStorage,
};

const NUMBER_OF_GRAPHS: usize = 10;
const TRIPLES_PER_GRAPH: usize = 1_000;

fn quads() -> Vec<(GraphName, Triple)> {
    let p = NamedNode::new_unchecked("http://example.com/p");
    (0..NUMBER_OF_GRAPHS)
        .flat_map(|g| {
            let p = p.clone();
            (0..TRIPLES_PER_GRAPH).map(move |i| {
                (
                    NamedNode::new_unchecked(format!("http://example.com/g{g}")).into(),
                    Triple::new(
                        NamedNode::new_unchecked(format!("http://example.com/s{}", i % 100)),
                        p.clone(),
                        Literal::new_simple_literal(i.to_string()),
                    ),
                )
            })
        })
        .collect()
}

fn memory_storage(quads: &[(GraphName, Triple)]) -> MemoryQuadStorage {
    let storage = MemoryQuadStorage::new();
    for (graph_name, triple) in quads {
        storage
            .add_quad(graph_name.as_ref(), triple.as_ref())
            .unwrap();
    }
    storage
}

fn load(c: &mut Criterion) {
    let quads = quads();
    let mut group = c.benchmark_group("load");
    group.throughput(Throughput::Elements(quads.len() as u64));
    group.sample_size(10);
    group.bench_function("load in memory", |b| {
        b.iter(|| memory_storage(&quads));
    });
    group.bench_function("load through transactional storage", |b| {
        b.iter(|| {
            let storage = TransactionalStorage::new(MemoryProvider::new());
            for (graph_name, triple) in &quads {
                storage
                    .add_quad(graph_name.as_ref(), triple.as_ref())
                    .unwrap();
            }
            storage.flush().unwrap();
        })
    });
}

fn lookup(c: &mut Criterion) {
    let quads = quads();
    let dataset = QuadDataset::new(memory_storage(&quads));
    let subject = NamedNode::new_unchecked("http://example.com/s42");
    let g1 = GraphName::from(NamedNode::new_unchecked("http://example.com/g1"));
    let mut group = c.benchmark_group("lookup");
    group.bench_function("subject in union default graph", |b| {
        let context = dataset.context().unwrap();
        b.iter(|| {
            for triple in dataset.triples_with_subject(&context, subject.as_ref()) {
                triple.unwrap();
            }
        })
    });
    group.bench_function("subject in active graph", |b| {
        let mut context = dataset.context().unwrap();
        b.iter(|| {
            dataset
                .set_active_graph(&mut context, std::slice::from_ref(&g1))
                .unwrap();
            for triple in dataset.triples_with_subject(&context, subject.as_ref()) {
                triple.unwrap();
            }
            dataset.reset_active_graph(&mut context).unwrap();
        })
    });
}

criterion_group!(dataset, load, lookup);

criterion_main!(dataset);
