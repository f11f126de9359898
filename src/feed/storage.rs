//! Feed data persistence using RocksDB.
//!
//! ## Storage Layout
//!
//! Uses column families for logical separation. All ids and timestamps are
//! big-endian so that byte order is numeric order.
//! - `users`: `{user_id}` -> [`UserProfile`]
//! - `usernames`: `{username}` -> user id (uniqueness index)
//! - `posts`: `{post_id}` -> [`Post`]
//! - `comments`: `{comment_id}` -> [`Comment`]
//! - `comment_paths`: `{post_id}:{path segments}` -> [`Comment`]
//! - `path_counters`: sibling group key -> largest segment handed out
//! - like ledgers, see [`crate::feed::ledger`]
//!
//! `comment_paths` holds a copy of each comment keyed by its materialized
//! path, so one prefix scan returns a post's whole comment set already in
//! depth-first order. Comments are immutable, so the copy cannot diverge.
//!
//! ## Path allocation
//!
//! Creating a comment runs in one pessimistic transaction that locks the
//! sibling group's counter key, reads the largest segment, derives the new
//! path, and writes the comment, its path index entry and the counter. Two
//! replies to the same parent therefore serialize on that row lock, while
//! replies to different parents proceed in parallel.

use crate::error::{FeedError, Result};
use crate::feed::ledger::{
    LikeLedger, CF_COMMENT_LIKES, CF_COMMENT_LIKES_BY_POST, CF_COMMENT_LIKES_BY_TIME,
    CF_POST_LIKES, CF_POST_LIKES_BY_TIME,
};
use crate::feed::path::{allocate, SiblingGroup};
use crate::feed::types::{
    current_timestamp_millis, Comment, CommentId, CommentPath, LikeSubject, Post, PostId,
    SubjectKind, UserId, UserProfile,
};
use crate::storage::{composite_key, id_key, key_id, RocksDbConfig, RocksDbHandle};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{error, info};

/// Default data directory name.
pub const DEFAULT_DATA_DIR: &str = "feedcore_data";

/// Database subdirectory.
const DB_DIR: &str = "feed_db";

/// Column family names.
const CF_USERS: &str = "users";
const CF_USERNAMES: &str = "usernames";
const CF_POSTS: &str = "posts";
const CF_COMMENTS: &str = "comments";
const CF_COMMENT_PATHS: &str = "comment_paths";
const CF_PATH_COUNTERS: &str = "path_counters";

const COLUMN_FAMILIES: &[&str] = &[
    CF_USERS,
    CF_USERNAMES,
    CF_POSTS,
    CF_COMMENTS,
    CF_COMMENT_PATHS,
    CF_PATH_COUNTERS,
    CF_POST_LIKES,
    CF_POST_LIKES_BY_TIME,
    CF_COMMENT_LIKES,
    CF_COMMENT_LIKES_BY_TIME,
    CF_COMMENT_LIKES_BY_POST,
];

/// RocksDB-backed feed storage.
#[derive(Debug)]
pub struct FeedStorage {
    db: RocksDbHandle,
    next_user_id: AtomicU64,
    next_post_id: AtomicU64,
    next_comment_id: AtomicU64,
}

impl FeedStorage {
    /// Opens storage in the default data directory.
    pub fn new_default() -> Result<Self> {
        Self::new(DEFAULT_DATA_DIR)
    }

    /// Opens storage under `data_dir` with the default RocksDB configuration.
    pub fn new(data_dir: impl AsRef<Path>) -> Result<Self> {
        Self::with_config(data_dir, &RocksDbConfig::default())
    }

    /// Opens storage under `data_dir`.
    ///
    /// Id sequences resume after the largest id already stored.
    pub fn with_config(data_dir: impl AsRef<Path>, config: &RocksDbConfig) -> Result<Self> {
        let db_path = data_dir.as_ref().join(DB_DIR);
        let db = RocksDbHandle::open(&db_path, config, COLUMN_FAMILIES)?;

        let next_user_id = Self::next_id_after_last(&db, CF_USERS)?;
        let next_post_id = Self::next_id_after_last(&db, CF_POSTS)?;
        let next_comment_id = Self::next_id_after_last(&db, CF_COMMENTS)?;

        info!(
            path = ?db_path,
            next_user_id = next_user_id.load(Ordering::Relaxed),
            next_post_id = next_post_id.load(Ordering::Relaxed),
            next_comment_id = next_comment_id.load(Ordering::Relaxed),
            "Opened feed RocksDB"
        );

        Ok(Self {
            db,
            next_user_id,
            next_post_id,
            next_comment_id,
        })
    }

    fn next_id_after_last(db: &RocksDbHandle, cf: &str) -> Result<AtomicU64> {
        let last = db.last_key(cf)?.as_deref().and_then(key_id).unwrap_or(0);
        Ok(AtomicU64::new(last + 1))
    }

    // =========================================================================
    // Users
    // =========================================================================

    /// Registers a display name. Usernames are unique.
    pub fn register_user(&self, username: &str) -> Result<UserProfile> {
        let txn = self.db.transaction();
        if txn
            .get_raw_for_update(CF_USERNAMES, username.as_bytes())?
            .is_some()
        {
            return Err(FeedError::validation(format!(
                "username '{}' is already taken",
                username
            )));
        }

        let profile = UserProfile {
            id: UserId(self.next_user_id.fetch_add(1, Ordering::SeqCst)),
            username: username.to_string(),
            created_at: current_timestamp_millis(),
        };
        txn.put(CF_USERS, &id_key(profile.id.get()), &profile)?;
        txn.put(CF_USERNAMES, username.as_bytes(), &profile.id.get())?;
        txn.commit()?;

        info!(user = %profile.id, username = %profile.username, "user registered");
        Ok(profile)
    }

    pub fn get_user(&self, id: UserId) -> Result<Option<UserProfile>> {
        self.db.get(CF_USERS, &id_key(id.get()))
    }

    pub fn find_user_by_name(&self, username: &str) -> Result<Option<UserProfile>> {
        match self.db.get::<u64>(CF_USERNAMES, username.as_bytes())? {
            Some(id) => self.get_user(UserId(id)),
            None => Ok(None),
        }
    }

    // =========================================================================
    // Posts
    // =========================================================================

    pub fn create_post(&self, author: UserId, content: &str) -> Result<Post> {
        self.create_post_at(author, content, current_timestamp_millis())
    }

    /// Stores a post with an explicit creation time (ms since epoch).
    pub fn create_post_at(&self, author: UserId, content: &str, created_at: u64) -> Result<Post> {
        let post = Post {
            id: PostId(self.next_post_id.fetch_add(1, Ordering::SeqCst)),
            author,
            content: content.to_string(),
            created_at,
        };
        self.db.put(CF_POSTS, &id_key(post.id.get()), &post)?;

        info!(post = %post.id, author = %author, "post created");
        Ok(post)
    }

    pub fn get_post(&self, id: PostId) -> Result<Option<Post>> {
        self.db.get(CF_POSTS, &id_key(id.get()))
    }

    /// Newest posts first. Ids are assigned in creation order.
    pub fn list_posts(&self, limit: usize) -> Result<Vec<Post>> {
        let mut posts = Vec::with_capacity(limit.min(128));
        let mut failure = None;

        self.db.iterate_reverse(CF_POSTS, |_, value| {
            if posts.len() >= limit {
                return false;
            }
            match bincode::deserialize::<Post>(value) {
                Ok(post) => {
                    posts.push(post);
                    true
                }
                Err(e) => {
                    failure = Some(FeedError::serialization(format!(
                        "Failed to deserialize post: {}",
                        e
                    )));
                    false
                }
            }
        })?;

        match failure {
            Some(e) => Err(e),
            None => Ok(posts),
        }
    }

    // =========================================================================
    // Comments
    // =========================================================================

    fn post_prefix(post: PostId) -> Vec<u8> {
        composite_key(&id_key(post.get()), &[])
    }

    fn comment_path_key(post: PostId, path: &CommentPath) -> Vec<u8> {
        composite_key(&id_key(post.get()), &path.to_key_bytes())
    }

    /// Creates a comment, allocating its path under the sibling-group lock.
    ///
    /// The post and the parent (if any) must exist, and the parent must belong
    /// to the same post.
    pub fn create_comment(
        &self,
        post_id: PostId,
        author: UserId,
        parent_id: Option<CommentId>,
        content: &str,
    ) -> Result<Comment> {
        if self.get_post(post_id)?.is_none() {
            return Err(FeedError::not_found(format!("post {}", post_id)));
        }

        let parent = match parent_id {
            Some(id) => {
                let parent = self
                    .get_comment(id)?
                    .ok_or_else(|| FeedError::not_found(format!("comment {}", id)))?;
                if parent.post_id != post_id {
                    return Err(FeedError::validation(format!(
                        "parent comment {} belongs to post {}, not post {}",
                        id, parent.post_id, post_id
                    )));
                }
                Some(parent)
            }
            None => None,
        };

        let group = SiblingGroup::for_parent(post_id, parent_id);
        let group_key = group.key();

        let txn = self.db.transaction();
        let max_segment: u32 = txn
            .get_for_update(CF_PATH_COUNTERS, &group_key)?
            .unwrap_or(0);
        let path = allocate(parent.as_ref().map(|p| &p.path), max_segment)?;
        let path_key = Self::comment_path_key(post_id, &path);

        if txn.get_raw_for_update(CF_COMMENT_PATHS, &path_key)?.is_some() {
            error!(
                post = %post_id,
                path = %path,
                "create_comment: allocated path already exists"
            );
            return Err(FeedError::AllocationConflict {
                post: post_id.get(),
                path: path.to_string(),
            });
        }

        let comment = Comment {
            id: CommentId(self.next_comment_id.fetch_add(1, Ordering::SeqCst)),
            post_id,
            author,
            parent_id,
            content: content.to_string(),
            created_at: current_timestamp_millis(),
            depth: path.depth(),
            path,
        };

        txn.put(CF_COMMENTS, &id_key(comment.id.get()), &comment)?;
        txn.put(CF_COMMENT_PATHS, &path_key, &comment)?;
        txn.put(CF_PATH_COUNTERS, &group_key, &comment.path.last_segment())?;
        txn.commit()?;

        info!(
            post = %post_id,
            comment = %comment.id,
            path = %comment.path,
            "comment created"
        );
        Ok(comment)
    }

    pub fn get_comment(&self, id: CommentId) -> Result<Option<Comment>> {
        self.db.get(CF_COMMENTS, &id_key(id.get()))
    }

    /// Every comment of a post, ascending by path, in one range read.
    pub fn comments_for_post(&self, post_id: PostId) -> Result<Vec<Comment>> {
        self.db
            .prefix_collect(CF_COMMENT_PATHS, &Self::post_prefix(post_id))
    }

    pub fn comment_count(&self, post_id: PostId) -> Result<u64> {
        Ok(self
            .db
            .prefix_count(CF_COMMENT_PATHS, &Self::post_prefix(post_id))? as u64)
    }

    // =========================================================================
    // Likes
    // =========================================================================

    /// The like ledger for a subject kind.
    pub fn ledger(&self, kind: SubjectKind) -> LikeLedger<'_> {
        LikeLedger::new(&self.db, kind)
    }

    /// Resolves a post or comment id to a like target.
    pub fn like_subject(&self, kind: SubjectKind, subject_id: u64) -> Result<LikeSubject> {
        let subject = match kind {
            SubjectKind::Post => self
                .get_post(PostId(subject_id))?
                .map(|p| LikeSubject::of_post(&p)),
            SubjectKind::Comment => self
                .get_comment(CommentId(subject_id))?
                .map(|c| LikeSubject::of_comment(&c)),
        };
        subject.ok_or_else(|| FeedError::not_found(format!("{} {}", kind, subject_id)))
    }
}
