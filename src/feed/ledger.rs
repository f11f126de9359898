//! Like ledgers.
//!
//! A ledger is the only record of who likes what. It holds at most one row
//! per (subject, user) pair; liking inserts that row and unliking deletes it.
//! Display counts, "liked by viewer" flags and karma are all derived from the
//! rows, so there is no counter that could drift from them.
//!
//! ## Storage Layout
//!
//! Each ledger owns two column families:
//! - `{kind}_likes`: `{subject}:{user}` -> [`LikeRecord`]
//! - `{kind}_likes_by_time`: `{created_at}{subject}{user}` -> subject author id
//!
//! The comment ledger also keeps `comment_likes_by_post`:
//! `{post}{comment}{user}` -> `()`.
//!
//! The time index lets karma aggregation seek straight to the window start.
//! The post index lets a whole comment tree be annotated with one prefix scan.
//! Post likes need no extra index: their `{post}:` prefix already is one.
//!
//! ## Exactly-once
//!
//! Both mutations run in a pessimistic transaction that first takes an
//! exclusive row lock on the `{subject}:{user}` key (the key need not exist).
//! Concurrent togglers of the same pair queue on that lock, and each one sees
//! the committed result of the previous one, so of N concurrent likes exactly
//! one inserts and the rest observe the row and report
//! [`LikeOutcome::AlreadyLiked`]. A lock wait that times out surfaces as a
//! transient [`crate::FeedError::Storage`] and leaves nothing behind.

use crate::error::{FeedError, Result};
use crate::feed::tree::LikeSummary;
use crate::feed::types::{
    current_timestamp_millis, LikeRecord, LikeSubject, PostId, SubjectKind, UserId,
};
use crate::storage::{composite_key, id_key, key_id, RocksDbHandle};
use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, info};

pub(crate) const CF_POST_LIKES: &str = "post_likes";
pub(crate) const CF_POST_LIKES_BY_TIME: &str = "post_likes_by_time";
pub(crate) const CF_COMMENT_LIKES: &str = "comment_likes";
pub(crate) const CF_COMMENT_LIKES_BY_TIME: &str = "comment_likes_by_time";
pub(crate) const CF_COMMENT_LIKES_BY_POST: &str = "comment_likes_by_post";

/// Result of a like or unlike request.
///
/// `AlreadyLiked` and `NotLiked` mean the ledger was already in the requested
/// state; they are normal results, not failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LikeOutcome {
    Liked,
    Unliked,
    AlreadyLiked,
    NotLiked,
}

impl LikeOutcome {
    /// True if the ledger changed.
    pub fn changed(self) -> bool {
        matches!(self, LikeOutcome::Liked | LikeOutcome::Unliked)
    }
}

/// One ledger (post likes or comment likes) over the shared database.
#[derive(Debug, Clone, Copy)]
pub struct LikeLedger<'a> {
    db: &'a RocksDbHandle,
    kind: SubjectKind,
}

impl<'a> LikeLedger<'a> {
    pub(crate) fn new(db: &'a RocksDbHandle, kind: SubjectKind) -> Self {
        Self { db, kind }
    }

    pub fn kind(&self) -> SubjectKind {
        self.kind
    }

    fn likes_cf(&self) -> &'static str {
        match self.kind {
            SubjectKind::Post => CF_POST_LIKES,
            SubjectKind::Comment => CF_COMMENT_LIKES,
        }
    }

    fn by_time_cf(&self) -> &'static str {
        match self.kind {
            SubjectKind::Post => CF_POST_LIKES_BY_TIME,
            SubjectKind::Comment => CF_COMMENT_LIKES_BY_TIME,
        }
    }

    fn by_post_cf(&self) -> Option<&'static str> {
        match self.kind {
            SubjectKind::Post => None,
            SubjectKind::Comment => Some(CF_COMMENT_LIKES_BY_POST),
        }
    }

    fn like_key(subject_id: u64, user: UserId) -> Vec<u8> {
        composite_key(&id_key(subject_id), &id_key(user.get()))
    }

    fn subject_prefix(subject_id: u64) -> Vec<u8> {
        let mut prefix = id_key(subject_id).to_vec();
        prefix.push(b':');
        prefix
    }

    fn time_key(record: &LikeRecord) -> Vec<u8> {
        let mut key = Vec::with_capacity(24);
        key.extend_from_slice(&id_key(record.created_at));
        key.extend_from_slice(&id_key(record.subject_id));
        key.extend_from_slice(&id_key(record.user.get()));
        key
    }

    fn post_key(record: &LikeRecord) -> Vec<u8> {
        let mut key = Vec::with_capacity(24);
        key.extend_from_slice(&id_key(record.post_id.get()));
        key.extend_from_slice(&id_key(record.subject_id));
        key.extend_from_slice(&id_key(record.user.get()));
        key
    }

    /// Records that `user` likes `subject`, now.
    pub fn like(&self, subject: LikeSubject, user: UserId) -> Result<LikeOutcome> {
        self.like_at(subject, user, current_timestamp_millis())
    }

    /// Records a like with an explicit timestamp (ms since epoch).
    pub fn like_at(
        &self,
        subject: LikeSubject,
        user: UserId,
        created_at: u64,
    ) -> Result<LikeOutcome> {
        let subject_id = subject.id;
        let key = Self::like_key(subject_id, user);
        let txn = self.db.transaction();

        if txn.get_raw_for_update(self.likes_cf(), &key)?.is_some() {
            debug!(
                kind = %self.kind,
                subject = subject_id,
                user = %user,
                "like: row already present"
            );
            return Ok(LikeOutcome::AlreadyLiked);
        }

        let record = LikeRecord {
            subject_id,
            post_id: subject.post,
            user,
            author: subject.author,
            created_at,
        };
        txn.put(self.likes_cf(), &key, &record)?;
        txn.put(self.by_time_cf(), &Self::time_key(&record), &record.author.get())?;
        if let Some(cf) = self.by_post_cf() {
            txn.put(cf, &Self::post_key(&record), &())?;
        }
        txn.commit()?;

        info!(kind = %self.kind, subject = subject_id, user = %user, "like recorded");
        Ok(LikeOutcome::Liked)
    }

    /// Removes `user`'s like of `subject_id`, if there is one.
    pub fn unlike(&self, subject_id: u64, user: UserId) -> Result<LikeOutcome> {
        let key = Self::like_key(subject_id, user);
        let txn = self.db.transaction();

        let Some(record) = txn.get_for_update::<LikeRecord>(self.likes_cf(), &key)? else {
            debug!(
                kind = %self.kind,
                subject = subject_id,
                user = %user,
                "unlike: no row to remove"
            );
            return Ok(LikeOutcome::NotLiked);
        };

        txn.delete(self.likes_cf(), &key)?;
        txn.delete(self.by_time_cf(), &Self::time_key(&record))?;
        if let Some(cf) = self.by_post_cf() {
            txn.delete(cf, &Self::post_key(&record))?;
        }
        txn.commit()?;

        info!(kind = %self.kind, subject = subject_id, user = %user, "like removed");
        Ok(LikeOutcome::Unliked)
    }

    /// The live like row for a pair, if any.
    pub fn get(&self, subject_id: u64, user: UserId) -> Result<Option<LikeRecord>> {
        self.db.get(self.likes_cf(), &Self::like_key(subject_id, user))
    }

    pub fn has_liked(&self, subject_id: u64, user: UserId) -> Result<bool> {
        self.db
            .exists(self.likes_cf(), &Self::like_key(subject_id, user))
    }

    /// Number of live likes on a subject.
    pub fn like_count(&self, subject_id: u64) -> Result<u64> {
        Ok(self
            .db
            .prefix_count(self.likes_cf(), &Self::subject_prefix(subject_id))? as u64)
    }

    /// All live like rows on a subject, ordered by user id.
    pub fn likes_for(&self, subject_id: u64) -> Result<Vec<LikeRecord>> {
        self.db
            .prefix_collect(self.likes_cf(), &Self::subject_prefix(subject_id))
    }

    /// Like count and viewer flag for every liked subject under `post`, from
    /// one prefix scan. Subjects with no likes are absent from the map.
    pub fn summaries_for_post(
        &self,
        post: PostId,
        viewer: Option<UserId>,
    ) -> Result<HashMap<u64, LikeSummary>> {
        let mut summaries: HashMap<u64, LikeSummary> = HashMap::new();
        let mut tally = |subject: u64, user: u64| {
            let summary = summaries.entry(subject).or_default();
            summary.like_count += 1;
            summary.liked_by_viewer |= viewer.map(UserId::get) == Some(user);
        };
        let mut malformed = 0usize;

        match self.by_post_cf() {
            // `{post}{subject}{user}`
            Some(cf) => self.db.prefix_iterate(cf, &id_key(post.get()), |key, _| {
                match (key.get(8..).and_then(key_id), key.get(16..).and_then(key_id)) {
                    (Some(subject), Some(user)) => tally(subject, user),
                    _ => malformed += 1,
                }
                true
            })?,
            // `{post}:{user}`
            None => {
                let prefix = Self::subject_prefix(post.get());
                self.db.prefix_iterate(self.likes_cf(), &prefix, |key, _| {
                    match key.get(prefix.len()..).and_then(key_id) {
                        Some(user) => tally(post.get(), user),
                        None => malformed += 1,
                    }
                    true
                })?
            }
        }

        if malformed > 0 {
            return Err(FeedError::serialization(format!(
                "{} malformed keys in {} post index",
                malformed, self.kind
            )));
        }

        Ok(summaries)
    }

    /// Number of likes created at or after `cutoff`, grouped by subject author.
    pub fn counts_by_author_since(&self, cutoff: u64) -> Result<HashMap<UserId, u64>> {
        let mut counts: HashMap<UserId, u64> = HashMap::new();
        let mut malformed = 0usize;

        self.db
            .seek_iterate(self.by_time_cf(), &id_key(cutoff), &[], |_, value| {
                match bincode::deserialize::<u64>(value) {
                    Ok(author) => *counts.entry(UserId(author)).or_insert(0) += 1,
                    Err(_) => malformed += 1,
                }
                true
            })?;

        if malformed > 0 {
            return Err(FeedError::serialization(format!(
                "{} malformed entries in {}",
                malformed,
                self.by_time_cf()
            )));
        }

        debug!(
            kind = %self.kind,
            cutoff = cutoff,
            authors = counts.len(),
            "counts_by_author_since: grouped window"
        );

        Ok(counts)
    }
}
