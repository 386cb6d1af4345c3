use chrono::Utc;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use quillrec::algorithms::{content_similarity, score_candidate};
use quillrec::services::similarity::SimilarityEstimator;
use quillrec::services::store::MemoryStore;
use quillrec::*;
use std::sync::Arc;
use uuid::Uuid;

const TAGS: [&str; 8] = ["rust", "go", "web", "async", "db", "ml", "ops", "security"];

fn catalog(size: usize, authors: &[Uuid]) -> Vec<ContentItem> {
    (0..size)
        .map(|i| {
            let tags = vec![
                TAGS[i % TAGS.len()].to_string(),
                TAGS[(i / 3) % TAGS.len()].to_string(),
            ];
            ContentItem::new(
                &format!("Post number {} about {}", i, TAGS[i % TAGS.len()]),
                "A reasonably long body with several distinct words for overlap scoring",
                authors[i % authors.len()],
                tags,
            )
            .with_engagement((i * 7 % 300) as u64, (i % 40) as u64, (i % 9) as u64)
        })
        .collect()
}

fn benchmark_similarity(c: &mut Criterion) {
    let authors: Vec<Uuid> = (0..10).map(|_| Uuid::new_v4()).collect();
    let items = catalog(2, &authors);

    c.bench_function("content_similarity_pair", |b| {
        b.iter(|| black_box(content_similarity(&items[0], &items[1])));
    });

    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = Arc::new(MemoryStore::new());
    let seeded = catalog(1000, &authors);
    for item in &seeded {
        store.insert_item(item.clone());
    }
    let estimator = SimilarityEstimator::new(store.clone(), store.clone(), Arc::new(Config::default()));
    let source = seeded[0].id;

    c.bench_function("find_similar_1000_items", |b| {
        b.iter(|| black_box(rt.block_on(estimator.find_similar(source, 10))))
    });
}

fn benchmark_scoring(c: &mut Criterion) {
    let authors: Vec<Uuid> = (0..10).map(|_| Uuid::new_v4()).collect();
    let items = catalog(1000, &authors);
    let user = Uuid::new_v4();
    let now = Utc::now();
    let interests: Vec<UserInterest> = TAGS
        .iter()
        .take(4)
        .enumerate()
        .map(|(i, tag)| UserInterest::new(user, tag.to_string(), 0.4 - i as f64 * 0.1, now))
        .chain(std::iter::once(UserInterest::new(
            user,
            Topic::Author(authors[0]).key(),
            0.2,
            now,
        )))
        .collect();

    c.bench_function("score_candidates_1000", |b| {
        b.iter(|| {
            let total: f64 = items
                .iter()
                .map(|item| score_candidate(item, &interests, now).score)
                .sum();
            black_box(total)
        });
    });
}

criterion_group!(benches, benchmark_similarity, benchmark_scoring);
criterion_main!(benches);
