//! Randomized property tests over stored comment trees and leaderboards.
//!
//! Each property runs against many randomly shaped inputs persisted through
//! the real storage layer.

use feedcore::feed::{
    build_tree, flatten, rank, Comment, CommentId, CommentPath, FeedStorage, KarmaAggregator,
    KarmaQuery, KarmaWeights, LikeSubject, PostId, SubjectKind, UserId,
};
use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;
use tempfile::TempDir;

fn create_test_storage() -> (FeedStorage, TempDir) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let storage = FeedStorage::new(temp_dir.path()).expect("Failed to open storage");
    (storage, temp_dir)
}

/// Property: every stored path is its parent's path plus one segment, and
/// flattening the rebuilt forest reproduces the stored path order.
#[test]
fn property_stored_paths_rebuild_in_order() {
    let mut rng = rand::thread_rng();
    let (storage, _temp) = create_test_storage();
    let author = storage.register_user("alice").unwrap().id;

    for _ in 0..10 {
        let post = storage.create_post(author, "post").unwrap();
        let mut created: Vec<Comment> = Vec::new();

        for i in 0..rng.gen_range(1..120) {
            let parent = if created.is_empty() || rng.gen_bool(0.25) {
                None
            } else {
                Some(created[rng.gen_range(0..created.len())].id)
            };
            let comment = storage
                .create_comment(post.id, author, parent, &format!("c{}", i))
                .unwrap();
            created.push(comment);
        }

        let by_id: HashMap<CommentId, &Comment> = created.iter().map(|c| (c.id, c)).collect();
        for comment in &created {
            match comment.parent_id {
                Some(parent) => {
                    assert_eq!(comment.path.parent().as_ref(), Some(&by_id[&parent].path));
                }
                None => assert_eq!(comment.path.depth(), 0),
            }
            assert_eq!(comment.depth, comment.path.depth());
        }

        let stored = storage.comments_for_post(post.id).unwrap();
        assert_eq!(stored.len(), created.len());
        let stored_paths: Vec<CommentPath> = stored.iter().map(|c| c.path.clone()).collect();

        let forest = build_tree(stored).unwrap();
        let flattened: Vec<CommentPath> =
            flatten(&forest).iter().map(|c| c.path.clone()).collect();
        assert_eq!(flattened, stored_paths);

        // Siblings appear in creation (id) order.
        let ids: Vec<CommentId> = forest.iter().map(|n| n.comment.id).collect();
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids, sorted);
    }
}

/// Property: the stored aggregation equals a brute-force recount of the
/// same likes, for random weights, windows and sizes.
#[test]
fn property_leaderboard_matches_brute_force() {
    let mut rng = rand::thread_rng();

    for _ in 0..10 {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let storage = Arc::new(FeedStorage::new(temp_dir.path()).unwrap());
        let aggregator = KarmaAggregator::new(Arc::clone(&storage));
        let now = 1_800_000_000_000u64;
        let query = KarmaQuery {
            window: std::time::Duration::from_secs(rng.gen_range(60..200_000)),
            weights: KarmaWeights {
                post: rng.gen_range(0..10),
                comment: rng.gen_range(0..10),
            },
            top_n: rng.gen_range(1..8),
        };
        let cutoff = query.cutoff(now);

        let mut post_counts: HashMap<UserId, u64> = HashMap::new();
        let mut comment_counts: HashMap<UserId, u64> = HashMap::new();

        for subject in 0..rng.gen_range(1..40u64) {
            let kind = if rng.gen_bool(0.5) {
                SubjectKind::Post
            } else {
                SubjectKind::Comment
            };
            let author = UserId(rng.gen_range(1..12));
            let target = LikeSubject::new(subject, PostId(subject), author);
            for liker in 0..rng.gen_range(0..6u64) {
                let at = now - rng.gen_range(0..250_000_000u64);
                storage
                    .ledger(kind)
                    .like_at(target, UserId(1_000 + liker), at)
                    .unwrap();
                if at >= cutoff {
                    let counts = match kind {
                        SubjectKind::Post => &mut post_counts,
                        SubjectKind::Comment => &mut comment_counts,
                    };
                    *counts.entry(author).or_insert(0) += 1;
                }
            }
        }

        let expected = rank(&post_counts, &comment_counts, query.weights, query.top_n);
        let actual = aggregator.leaderboard_at(&query, now).unwrap();
        assert_eq!(actual, expected);

        assert!(actual.len() <= query.top_n);
        assert!(actual.iter().all(|e| e.karma > 0));
        assert!(actual.windows(2).all(|w| {
            w[0].karma > w[1].karma || (w[0].karma == w[1].karma && w[0].user < w[1].user)
        }));
    }
}
