//! Benchmarks for dependency lookup and build planning.

use std::collections::{BTreeMap, BTreeSet};
use std::hint::black_box;

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use kiln_build::{
    BuildInputs, BundleKind, CompilationUnit, DependencyTracker, DiffEngine, Fingerprint, Page,
    PageSpec, entity,
};
use kiln_source::NodeId;

/// Pages reading one node each plus one shared node per hundred pages.
fn generate_pages(count: usize) -> Vec<Page> {
    (0..count)
        .map(|i| {
            let spec = PageSpec {
                path: format!("/posts/{i}"),
                template: "src/templates/post.js".to_owned(),
                query: Some("query Post($id: ID!) { post(id: $id) { title body } }".to_owned()),
                dependencies: vec![
                    NodeId::new(format!("post-{i}")),
                    NodeId::new(format!("author-{}", i / 100)),
                ],
                static_queries: vec!["{ site { siteMetadata { title } } }".to_owned()],
            };
            Page::resolve(&spec, 0)
        })
        .collect()
}

fn generate_inputs(pages: Vec<Page>) -> BuildInputs {
    let entity_fingerprints: BTreeMap<String, Fingerprint> = pages
        .iter()
        .flat_map(|page| page.dependency_ids.iter())
        .map(|key| (key.clone(), Fingerprint::of_bytes(key.as_bytes())))
        .collect();
    let bundle = |kind| {
        CompilationUnit::from_inputs(
            kind,
            BTreeMap::from([("src/app.js".to_owned(), Fingerprint::of_bytes(b"app"))]),
        )
    };

    BuildInputs {
        pages,
        entity_fingerprints,
        changed_entities: BTreeSet::new(),
        browser: bundle(BundleKind::Browser),
        ssr: bundle(BundleKind::Ssr),
    }
}

fn bench_changed_since(c: &mut Criterion) {
    let mut group = c.benchmark_group("changed_since");

    for count in [100, 1_000, 10_000] {
        let pages = generate_pages(count);
        let mut tracker = DependencyTracker::new();
        for page in &pages {
            tracker.record_page(&page.path, &page.dependency_ids);
        }
        let changed: Vec<String> = (0..10)
            .map(|i| entity::node(&NodeId::new(format!("post-{i}"))))
            .chain([entity::node(&NodeId::new("author-0"))])
            .collect();

        group.bench_with_input(BenchmarkId::new("pages", count), &changed, |b, changed| {
            b.iter(|| black_box(tracker.changed_since(changed)));
        });
    }

    group.finish();
}

fn bench_diff(c: &mut Criterion) {
    let mut group = c.benchmark_group("diff");

    for count in [100, 1_000, 10_000] {
        let inputs = generate_inputs(generate_pages(count));
        let previous = inputs.snapshot();
        let existing: BTreeSet<String> = inputs.pages.iter().map(|p| p.path.clone()).collect();

        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::new("pages", count), &inputs, |b, inputs| {
            b.iter(|| DiffEngine::diff(Some(&previous), inputs, &existing));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_changed_since, bench_diff);
criterion_main!(benches);
