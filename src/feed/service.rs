//! The feed's public operations.
//!
//! [`FeedService`] is what calling layers (the HTTP server, the seeder,
//! tests) talk to. It validates input, applies policy (self-likes, reply
//! depth) and derives display data (like counts, comment counts, viewer
//! flags, usernames) from the ledgers on every read.

use crate::config::FeedConfig;
use crate::error::{FeedError, Result};
use crate::feed::karma::{CachedLeaderboard, KarmaAggregator, KarmaQuery, LeaderboardSource};
use crate::feed::ledger::LikeOutcome;
use crate::feed::storage::FeedStorage;
use crate::feed::tree::{build_tree, CommentNode};
use crate::feed::types::{
    Comment, CommentId, LikeAction, Post, PostId, SubjectKind, UserId, UserProfile,
};
use crate::feed::validation::Validator;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// A post with its derived counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PostView {
    #[serde(flatten)]
    pub post: Post,
    pub like_count: u64,
    pub comment_count: u64,
    pub liked_by_viewer: bool,
}

/// Result of a like toggle, with the count after the toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ToggleResult {
    pub kind: SubjectKind,
    pub subject_id: u64,
    pub outcome: LikeOutcome,
    pub like_count: u64,
}

/// One leaderboard row as shown to users.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RankedUser {
    pub rank: usize,
    pub user_id: UserId,
    /// `None` if the user has no registered profile.
    pub username: Option<String>,
    pub karma: u64,
}

/// A computed leaderboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Leaderboard {
    pub entries: Vec<RankedUser>,
    /// When the ranking was computed (ms since epoch). A cached snapshot keeps
    /// the time it was taken.
    pub calculated_at: u64,
    pub window_secs: u64,
}

/// Feed operations over shared storage.
pub struct FeedService {
    storage: Arc<FeedStorage>,
    config: FeedConfig,
    leaderboard: Box<dyn LeaderboardSource>,
}

impl fmt::Debug for FeedService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeedService")
            .field("storage", &self.storage)
            .field("config", &self.config)
            .field("leaderboard", &"dyn LeaderboardSource { ... }")
            .finish()
    }
}

impl FeedService {
    /// Opens storage at `config.data_dir` and builds the service.
    pub fn open(config: FeedConfig) -> Result<Self> {
        config.validate()?;
        let storage = Arc::new(FeedStorage::with_config(&config.data_dir, &config.rocksdb)?);
        Ok(Self::with_storage(storage, config))
    }

    /// Builds the service over existing storage. The leaderboard is computed
    /// live, or through a snapshot cache when `leaderboard_cache_ttl` is set.
    pub fn with_storage(storage: Arc<FeedStorage>, config: FeedConfig) -> Self {
        let live = KarmaAggregator::new(Arc::clone(&storage));
        let leaderboard: Box<dyn LeaderboardSource> = match config.leaderboard_cache_ttl {
            Some(ttl) => Box::new(CachedLeaderboard::new(live, ttl)),
            None => Box::new(live),
        };
        Self::with_leaderboard_source(storage, config, leaderboard)
    }

    /// Builds the service with a caller-provided leaderboard source.
    pub fn with_leaderboard_source(
        storage: Arc<FeedStorage>,
        config: FeedConfig,
        leaderboard: Box<dyn LeaderboardSource>,
    ) -> Self {
        Self {
            storage,
            config,
            leaderboard,
        }
    }

    pub fn storage(&self) -> &Arc<FeedStorage> {
        &self.storage
    }

    pub fn config(&self) -> &FeedConfig {
        &self.config
    }

    // =========================================================================
    // Users
    // =========================================================================

    pub fn register_user(&self, username: &str) -> Result<UserProfile> {
        Validator::validate_username(username)?;
        self.storage.register_user(username)
    }

    pub fn get_user(&self, id: UserId) -> Result<UserProfile> {
        self.storage
            .get_user(id)?
            .ok_or_else(|| FeedError::not_found(format!("user {}", id)))
    }

    // =========================================================================
    // Posts
    // =========================================================================

    pub fn create_post(&self, author: UserId, content: &str) -> Result<PostView> {
        Validator::validate_post_content(content)?;
        self.get_user(author)?;
        let post = self.storage.create_post(author, content)?;
        self.post_view(post, Some(author))
    }

    pub fn get_post(&self, id: PostId, viewer: Option<UserId>) -> Result<PostView> {
        let post = self
            .storage
            .get_post(id)?
            .ok_or_else(|| FeedError::not_found(format!("post {}", id)))?;
        self.post_view(post, viewer)
    }

    /// Newest posts first, at most `limit` (default page size if `None`).
    pub fn list_posts(
        &self,
        limit: Option<usize>,
        viewer: Option<UserId>,
    ) -> Result<Vec<PostView>> {
        let limit = limit.unwrap_or(crate::feed::constants::DEFAULT_PAGE_SIZE);
        Validator::validate_page_size(limit)?;
        self.storage
            .list_posts(limit)?
            .into_iter()
            .map(|post| self.post_view(post, viewer))
            .collect()
    }

    fn post_view(&self, post: Post, viewer: Option<UserId>) -> Result<PostView> {
        let likes = self
            .storage
            .ledger(SubjectKind::Post)
            .summaries_for_post(post.id, viewer)?
            .remove(&post.id.get())
            .unwrap_or_default();
        let comment_count = self.storage.comment_count(post.id)?;
        Ok(PostView {
            post,
            like_count: likes.like_count,
            comment_count,
            liked_by_viewer: likes.liked_by_viewer,
        })
    }

    // =========================================================================
    // Comments
    // =========================================================================

    /// Creates a comment on `post_id`, optionally replying to `parent_id`.
    pub fn create_comment(
        &self,
        post_id: PostId,
        author: UserId,
        parent_id: Option<CommentId>,
        content: &str,
    ) -> Result<Comment> {
        Validator::validate_comment_content(content)?;
        self.get_user(author)?;

        if let (Some(max_depth), Some(parent_id)) = (self.config.max_reply_depth, parent_id) {
            let parent = self
                .storage
                .get_comment(parent_id)?
                .ok_or_else(|| FeedError::not_found(format!("comment {}", parent_id)))?;
            if parent.depth >= max_depth {
                return Err(FeedError::validation(format!(
                    "replies are limited to depth {}",
                    max_depth
                )));
            }
        }

        self.storage.create_comment(post_id, author, parent_id, content)
    }

    /// The post's comments as a forest, with like data for `viewer`.
    ///
    /// Comments come from one path-ordered scan and their like data from one
    /// scan of the comment ledger's post index, whatever the tree's shape.
    pub fn get_comment_tree(
        &self,
        post_id: PostId,
        viewer: Option<UserId>,
    ) -> Result<Vec<CommentNode>> {
        if self.storage.get_post(post_id)?.is_none() {
            return Err(FeedError::not_found(format!("post {}", post_id)));
        }

        let comments = self.storage.comments_for_post(post_id)?;
        let count = comments.len();
        let mut forest = build_tree(comments)?;

        let likes = self
            .storage
            .ledger(SubjectKind::Comment)
            .summaries_for_post(post_id, viewer)?;
        for root in &mut forest {
            root.visit_mut(&mut |node| {
                if let Some(summary) = likes.get(&node.comment.id.get()) {
                    node.likes = *summary;
                }
            });
        }

        debug!(post = %post_id, comments = count, roots = forest.len(), "comment tree built");
        Ok(forest)
    }

    // =========================================================================
    // Likes
    // =========================================================================

    /// Likes or unlikes a post or comment on behalf of `user`.
    ///
    /// Already being in the requested state is reported through the outcome,
    /// not as an error.
    pub fn toggle_like(
        &self,
        kind: SubjectKind,
        subject_id: u64,
        user: UserId,
        action: LikeAction,
    ) -> Result<ToggleResult> {
        let subject = self.storage.like_subject(kind, subject_id)?;
        let ledger = self.storage.ledger(kind);

        let outcome = match action {
            LikeAction::Like => {
                if subject.author == user && !self.config.allow_self_likes {
                    warn!(kind = %kind, subject = subject_id, user = %user, "self-like rejected");
                    return Err(FeedError::validation(format!(
                        "cannot like your own {}",
                        kind
                    )));
                }
                ledger.like(subject, user)?
            }
            LikeAction::Unlike => ledger.unlike(subject_id, user)?,
        };

        if !outcome.changed() {
            info!(
                kind = %kind,
                subject = subject_id,
                user = %user,
                outcome = ?outcome,
                "toggle left ledger unchanged"
            );
        }

        Ok(ToggleResult {
            kind,
            subject_id,
            outcome,
            like_count: ledger.like_count(subject_id)?,
        })
    }

    // =========================================================================
    // Leaderboard
    // =========================================================================

    /// Top users by karma over `window` (config default if `None`).
    pub fn get_leaderboard(
        &self,
        window: Option<Duration>,
        top_n: Option<usize>,
    ) -> Result<Leaderboard> {
        let mut query = self.config.karma_query();
        if let Some(window) = window {
            if window.is_zero() {
                return Err(FeedError::invalid_input("window must be positive"));
            }
            query.window = window;
        }
        if let Some(top_n) = top_n {
            Validator::validate_top_n(top_n)?;
            query.top_n = top_n;
        }

        self.leaderboard_for(&query)
    }

    fn leaderboard_for(&self, query: &KarmaQuery) -> Result<Leaderboard> {
        let snapshot = self.leaderboard.leaderboard(query)?;
        let entries = snapshot
            .entries
            .into_iter()
            .map(|entry| {
                let username = self.storage.get_user(entry.user)?.map(|u| u.username);
                Ok(RankedUser {
                    rank: entry.rank,
                    user_id: entry.user,
                    username,
                    karma: entry.karma,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Leaderboard {
            entries,
            calculated_at: snapshot.computed_at,
            window_secs: query.window.as_secs(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::flatten;
    use crate::feed::tree::LikeSummary;
    use tempfile::TempDir;

    fn create_test_service(config: FeedConfig) -> (FeedService, TempDir) {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config = FeedConfig {
            data_dir: temp_dir.path().to_path_buf(),
            ..config
        };
        let service = FeedService::open(config).expect("Failed to open service");
        (service, temp_dir)
    }

    #[test]
    fn test_post_view_counts() {
        let (service, _temp) = create_test_service(FeedConfig::default());
        let alice = service.register_user("alice").unwrap().id;
        let bob = service.register_user("bob").unwrap().id;

        let post = service.create_post(alice, "hello").unwrap();
        assert_eq!(post.like_count, 0);
        service
            .create_comment(post.post.id, bob, None, "hi")
            .unwrap();
        service
            .toggle_like(SubjectKind::Post, post.post.id.get(), bob, LikeAction::Like)
            .unwrap();

        let as_bob = service.get_post(post.post.id, Some(bob)).unwrap();
        assert_eq!(as_bob.like_count, 1);
        assert_eq!(as_bob.comment_count, 1);
        assert!(as_bob.liked_by_viewer);
        assert!(!service.get_post(post.post.id, Some(alice)).unwrap().liked_by_viewer);
        assert!(!service.get_post(post.post.id, None).unwrap().liked_by_viewer);
    }

    #[test]
    fn test_self_like_policy() {
        let (service, _temp) = create_test_service(FeedConfig::default());
        let alice = service.register_user("alice").unwrap().id;
        let post = service.create_post(alice, "mine").unwrap().post;

        let err = service
            .toggle_like(SubjectKind::Post, post.id.get(), alice, LikeAction::Like)
            .unwrap_err();
        assert!(matches!(err, FeedError::Validation(_)));

        let (service, _temp) = create_test_service(FeedConfig {
            allow_self_likes: true,
            ..FeedConfig::default()
        });
        let alice = service.register_user("alice").unwrap().id;
        let post = service.create_post(alice, "mine").unwrap().post;
        let result = service
            .toggle_like(SubjectKind::Post, post.id.get(), alice, LikeAction::Like)
            .unwrap();
        assert_eq!(result.outcome, LikeOutcome::Liked);
        assert_eq!(result.like_count, 1);
    }

    #[test]
    fn test_toggle_reports_count_and_outcome() {
        let (service, _temp) = create_test_service(FeedConfig::default());
        let alice = service.register_user("alice").unwrap().id;
        let bob = service.register_user("bob").unwrap().id;
        let post = service.create_post(alice, "p").unwrap().post;
        let comment = service.create_comment(post.id, alice, None, "c").unwrap();
        let id = comment.id.get();

        let liked = service
            .toggle_like(SubjectKind::Comment, id, bob, LikeAction::Like)
            .unwrap();
        assert_eq!((liked.outcome, liked.like_count), (LikeOutcome::Liked, 1));

        let again = service
            .toggle_like(SubjectKind::Comment, id, bob, LikeAction::Like)
            .unwrap();
        assert_eq!((again.outcome, again.like_count), (LikeOutcome::AlreadyLiked, 1));

        let unliked = service
            .toggle_like(SubjectKind::Comment, id, bob, LikeAction::Unlike)
            .unwrap();
        assert_eq!((unliked.outcome, unliked.like_count), (LikeOutcome::Unliked, 0));

        let missing = service.toggle_like(SubjectKind::Comment, 999, bob, LikeAction::Like);
        assert!(matches!(missing, Err(FeedError::NotFound(_))));
    }

    #[test]
    fn test_comment_tree_annotated_for_viewer() {
        let (service, _temp) = create_test_service(FeedConfig::default());
        let alice = service.register_user("alice").unwrap().id;
        let bob = service.register_user("bob").unwrap().id;
        let post = service.create_post(alice, "p").unwrap().post;
        let root = service.create_comment(post.id, alice, None, "root").unwrap();
        let reply = service
            .create_comment(post.id, alice, Some(root.id), "reply")
            .unwrap();
        service
            .toggle_like(SubjectKind::Comment, reply.id.get(), bob, LikeAction::Like)
            .unwrap();

        let forest = service.get_comment_tree(post.id, Some(bob)).unwrap();
        assert_eq!(forest.len(), 1);
        assert_eq!(forest[0].likes, LikeSummary::default());
        assert_eq!(
            forest[0].replies[0].likes,
            LikeSummary {
                like_count: 1,
                liked_by_viewer: true
            }
        );

        assert!(matches!(
            service.get_comment_tree(PostId(404), None),
            Err(FeedError::NotFound(_))
        ));
    }

    #[test]
    fn test_tree_annotation_matches_ledger() {
        let (service, _temp) = create_test_service(FeedConfig::default());
        let alice = service.register_user("alice").unwrap().id;
        let users: Vec<UserId> = ["bob", "carol", "dave"]
            .iter()
            .map(|name| service.register_user(name).unwrap().id)
            .collect();
        let post = service.create_post(alice, "p").unwrap().post;
        let other = service.create_post(alice, "other").unwrap().post;

        let mut parent = None;
        for i in 0..6 {
            let comment = service
                .create_comment(post.id, alice, parent, &format!("c{}", i))
                .unwrap();
            for user in users.iter().take(i % 4) {
                service
                    .toggle_like(SubjectKind::Comment, comment.id.get(), *user, LikeAction::Like)
                    .unwrap();
            }
            parent = if i % 2 == 0 { Some(comment.id) } else { None };
        }
        let elsewhere = service.create_comment(other.id, alice, None, "x").unwrap();
        service
            .toggle_like(SubjectKind::Comment, elsewhere.id.get(), users[0], LikeAction::Like)
            .unwrap();

        let ledger = service.storage().ledger(SubjectKind::Comment);
        for viewer in [None, Some(users[0]), Some(users[2])] {
            let forest = service.get_comment_tree(post.id, viewer).unwrap();
            let flat = flatten(&forest);
            assert_eq!(flat.len(), 6);
            let mut counts = Vec::new();
            for root in &forest {
                let mut root = root.clone();
                root.visit_mut(&mut |node| counts.push((node.comment.id, node.likes)));
            }
            for (id, likes) in counts {
                assert_eq!(likes.like_count, ledger.like_count(id.get()).unwrap());
                let expected = match viewer {
                    Some(user) => ledger.has_liked(id.get(), user).unwrap(),
                    None => false,
                };
                assert_eq!(likes.liked_by_viewer, expected);
            }
        }
    }

    #[test]
    fn test_reply_depth_cap() {
        let (service, _temp) = create_test_service(FeedConfig {
            max_reply_depth: Some(1),
            ..FeedConfig::default()
        });
        let alice = service.register_user("alice").unwrap().id;
        let post = service.create_post(alice, "p").unwrap().post;
        let root = service.create_comment(post.id, alice, None, "0").unwrap();
        let depth_one = service
            .create_comment(post.id, alice, Some(root.id), "1")
            .unwrap();
        assert_eq!(depth_one.depth, 1);

        let err = service
            .create_comment(post.id, alice, Some(depth_one.id), "2")
            .unwrap_err();
        assert!(matches!(err, FeedError::Validation(_)));
    }

    #[test]
    fn test_unknown_author_rejected() {
        let (service, _temp) = create_test_service(FeedConfig::default());
        assert!(matches!(
            service.create_post(UserId(77), "ghost"),
            Err(FeedError::NotFound(_))
        ));
        assert!(matches!(
            service.create_post(UserId(77), " "),
            Err(FeedError::Validation(_))
        ));
    }

    #[test]
    fn test_leaderboard_carries_usernames() {
        let (service, _temp) = create_test_service(FeedConfig::default());
        let alice = service.register_user("alice").unwrap().id;
        let bob = service.register_user("bob").unwrap().id;
        let post = service.create_post(alice, "p").unwrap().post;
        service
            .toggle_like(SubjectKind::Post, post.id.get(), bob, LikeAction::Like)
            .unwrap();

        let board = service.get_leaderboard(None, None).unwrap();
        assert_eq!(board.window_secs, 86_400);
        assert_eq!(board.entries.len(), 1);
        assert_eq!(board.entries[0].rank, 1);
        assert_eq!(board.entries[0].user_id, alice);
        assert_eq!(board.entries[0].username.as_deref(), Some("alice"));
        assert_eq!(board.entries[0].karma, 5);

        assert!(service.get_leaderboard(None, Some(0)).is_err());
        assert!(service.get_leaderboard(Some(Duration::ZERO), None).is_err());
    }

    #[test]
    fn test_cached_leaderboard_reports_snapshot_time() {
        let (service, _temp) = create_test_service(FeedConfig {
            leaderboard_cache_ttl: Some(Duration::from_secs(3600)),
            ..FeedConfig::default()
        });
        let alice = service.register_user("alice").unwrap().id;
        let bob = service.register_user("bob").unwrap().id;
        let post = service.create_post(alice, "p").unwrap().post;

        let first = service.get_leaderboard(None, None).unwrap();
        assert!(first.entries.is_empty());

        std::thread::sleep(Duration::from_millis(5));
        service
            .toggle_like(SubjectKind::Post, post.id.get(), bob, LikeAction::Like)
            .unwrap();

        let cached = service.get_leaderboard(None, None).unwrap();
        assert_eq!(cached.calculated_at, first.calculated_at);
        assert!(cached.entries.is_empty());
    }
}
