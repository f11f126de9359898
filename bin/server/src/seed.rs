//! Demo data for a fresh database.
//!
//! Creates a handful of users, posts and threaded comments, then scatters
//! likes over the last two days so the leaderboard window has something to
//! include and something to exclude.

use chrono::{Duration as ChronoDuration, Utc};
use feedcore::feed::{Comment, FeedService, LikeSubject, SubjectKind, UserId};
use rand::seq::SliceRandom;
use rand::Rng;
use tracing::info;

const USERNAMES: &[&str] = &["alice", "bob", "carol", "dave", "erin", "frank"];

const POSTS: &[&str] = &[
    "What is everyone reading this week?",
    "Show and tell: my weekend project",
    "Tips for writing good commit messages",
    "Favourite keyboard shortcuts?",
];

const REPLIES: &[&str] = &[
    "Great point!",
    "I disagree, here's why.",
    "Same here.",
    "Can you share more details?",
    "Thanks for posting this.",
    "This reminds me of something I read last year.",
];

/// Seeds demo data unless the first demo user already exists.
pub fn seed(feed: &FeedService) -> feedcore::Result<()> {
    if feed.storage().find_user_by_name(USERNAMES[0])?.is_some() {
        info!("Seed data already present, skipping");
        return Ok(());
    }

    let mut rng = rand::thread_rng();
    let users: Vec<UserId> = USERNAMES
        .iter()
        .map(|name| feed.register_user(name).map(|u| u.id))
        .collect::<feedcore::Result<_>>()?;

    let mut comments: Vec<Comment> = Vec::new();
    let mut post_ids = Vec::new();

    for content in POSTS {
        let author = pick(&users, &mut rng);
        let post = feed.create_post(author, content)?.post;
        post_ids.push(post.id);

        let mut thread: Vec<Comment> = Vec::new();
        for _ in 0..rng.gen_range(3..8) {
            let parent = if thread.is_empty() || rng.gen_bool(0.4) {
                None
            } else {
                thread.choose(&mut rng).map(|c| c.id)
            };
            let reply = REPLIES[rng.gen_range(0..REPLIES.len())];
            let comment = feed.create_comment(post.id, pick(&users, &mut rng), parent, reply)?;
            thread.push(comment);
        }
        comments.extend(thread);
    }

    // Likes spread over 48 hours; roughly half fall outside a 24 hour window.
    let now = Utc::now();
    let mut likes = 0usize;
    for user in &users {
        for post_id in &post_ids {
            if rng.gen_bool(0.5) {
                let subject = feed
                    .storage()
                    .like_subject(SubjectKind::Post, post_id.get())?;
                if subject.author == *user {
                    continue;
                }
                let at = now - ChronoDuration::minutes(rng.gen_range(0..48 * 60));
                let outcome = feed.storage().ledger(SubjectKind::Post).like_at(
                    subject,
                    *user,
                    at.timestamp_millis() as u64,
                )?;
                likes += outcome.changed() as usize;
            }
        }
        for comment in &comments {
            if comment.author != *user && rng.gen_bool(0.3) {
                let at = now - ChronoDuration::minutes(rng.gen_range(0..48 * 60));
                let outcome = feed.storage().ledger(SubjectKind::Comment).like_at(
                    LikeSubject::of_comment(comment),
                    *user,
                    at.timestamp_millis() as u64,
                )?;
                likes += outcome.changed() as usize;
            }
        }
    }

    info!(
        users = users.len(),
        posts = post_ids.len(),
        comments = comments.len(),
        likes = likes,
        "Seeded demo data"
    );
    Ok(())
}

fn pick<R: Rng>(users: &[UserId], rng: &mut R) -> UserId {
    users[rng.gen_range(0..users.len())]
}
