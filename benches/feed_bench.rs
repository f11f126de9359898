//! Benchmarks for the feed's hot paths.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use feedcore::feed::{
    build_tree, FeedStorage, KarmaAggregator, KarmaQuery, LikeSubject, PostId, SubjectKind, UserId,
};
use rand::Rng;
use std::sync::Arc;
use tempfile::TempDir;

fn seeded_post(storage: &FeedStorage, comments: usize) -> feedcore::feed::PostId {
    let mut rng = rand::thread_rng();
    let author = storage.register_user(&format!("author{}", comments)).unwrap().id;
    let post = storage.create_post(author, "bench").unwrap();
    let mut ids = Vec::with_capacity(comments);
    for _ in 0..comments {
        let parent = if ids.is_empty() || rng.gen_bool(0.3) {
            None
        } else {
            Some(ids[rng.gen_range(0..ids.len())])
        };
        ids.push(storage.create_comment(post.id, author, parent, "c").unwrap().id);
    }
    post.id
}

fn bench_comment_tree(c: &mut Criterion) {
    let temp = TempDir::new().unwrap();
    let storage = FeedStorage::new(temp.path()).unwrap();
    let mut group = c.benchmark_group("comment_tree");

    for size in [10usize, 100, 1000] {
        let post = seeded_post(&storage, size);
        let comments = storage.comments_for_post(post).unwrap();

        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::new("read_and_build", size), &post, |b, post| {
            b.iter(|| build_tree(storage.comments_for_post(black_box(*post)).unwrap()).unwrap())
        });
        group.bench_with_input(BenchmarkId::new("build_only", size), &comments, |b, comments| {
            b.iter(|| build_tree(black_box(comments.clone())).unwrap())
        });
    }

    group.finish();
}

fn bench_like_toggle(c: &mut Criterion) {
    let temp = TempDir::new().unwrap();
    let storage = FeedStorage::new(temp.path()).unwrap();
    let ledger = storage.ledger(SubjectKind::Post);
    let subject = LikeSubject::new(1, PostId(1), UserId(1));
    let mut group = c.benchmark_group("like_toggle");

    group.bench_function("like_unlike", |b| {
        b.iter(|| {
            ledger.like(subject, UserId(2)).unwrap();
            ledger.unlike(1, UserId(2)).unwrap();
        })
    });
    ledger.like(subject, UserId(2)).unwrap();
    group.bench_function("already_liked", |b| {
        b.iter(|| ledger.like(black_box(subject), UserId(2)).unwrap())
    });

    group.finish();
}

fn bench_leaderboard(c: &mut Criterion) {
    let mut group = c.benchmark_group("leaderboard");

    for likes in [1_000u64, 10_000] {
        let temp = TempDir::new().unwrap();
        let storage = Arc::new(FeedStorage::new(temp.path()).unwrap());
        let aggregator = KarmaAggregator::new(Arc::clone(&storage));
        let now = 1_800_000_000_000u64;
        let mut rng = rand::thread_rng();

        for i in 0..likes {
            let kind = if i % 3 == 0 {
                SubjectKind::Post
            } else {
                SubjectKind::Comment
            };
            storage
                .ledger(kind)
                .like_at(
                    LikeSubject::new(i / 10, PostId(i / 100), UserId(rng.gen_range(1..200))),
                    UserId(i % 10),
                    now - rng.gen_range(0..2 * 86_400_000),
                )
                .unwrap();
        }

        let query = KarmaQuery::default();
        group.throughput(Throughput::Elements(likes));
        group.bench_with_input(BenchmarkId::new("compute", likes), &query, |b, query| {
            b.iter(|| aggregator.leaderboard_at(black_box(query), now).unwrap())
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_comment_tree,
    bench_like_toggle,
    bench_leaderboard
);
criterion_main!(benches);
