//! Core records of the feed: posts, comments, users and like ledger rows.
//!
//! Records are created once and never updated. Counts (likes, comments) and
//! karma are derived from the ledgers on read and never stored on a record.

use crate::error::{FeedError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

/// Returns the current time in milliseconds since the Unix epoch.
pub fn current_timestamp_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl $name {
            /// Returns the raw id.
            pub fn get(self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            fn from(id: u64) -> Self {
                Self(id)
            }
        }
    };
}

id_type!(
    /// Identifier of a post.
    PostId
);
id_type!(
    /// Identifier of a comment.
    CommentId
);
id_type!(
    /// Stable identifier of a user, supplied by the identity provider.
    UserId
);

// =============================================================================
// Materialized paths
// =============================================================================

/// Materialized path of a comment: its full ancestry as positive segments.
///
/// The derived `Ord` is lexicographic over the integer segments with a
/// prefix sorting before its extensions, which is exactly depth-first
/// pre-order. `[2]` sorts before `[10]`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<u32>", into = "Vec<u32>")]
pub struct CommentPath(Vec<u32>);

impl CommentPath {
    /// Builds a path from raw segments. Segments must be non-empty and positive.
    pub fn from_segments(segments: Vec<u32>) -> Result<Self> {
        if segments.is_empty() {
            return Err(FeedError::invalid_input("comment path cannot be empty"));
        }
        if segments.contains(&0) {
            return Err(FeedError::invalid_input(
                "comment path segments must be positive",
            ));
        }
        Ok(Self(segments))
    }

    /// Single-segment path of a root comment.
    pub fn root(segment: u32) -> Result<Self> {
        Self::from_segments(vec![segment])
    }

    /// This path extended by one trailing segment.
    pub fn child(&self, segment: u32) -> Result<Self> {
        if segment == 0 {
            return Err(FeedError::invalid_input(
                "comment path segments must be positive",
            ));
        }
        let mut segments = Vec::with_capacity(self.0.len() + 1);
        segments.extend_from_slice(&self.0);
        segments.push(segment);
        Ok(Self(segments))
    }

    pub fn segments(&self) -> &[u32] {
        &self.0
    }

    /// Reply depth: number of segments minus one.
    pub fn depth(&self) -> u32 {
        (self.0.len() - 1) as u32
    }

    pub fn first_segment(&self) -> u32 {
        self.0[0]
    }

    pub fn last_segment(&self) -> u32 {
        self.0[self.0.len() - 1]
    }

    /// Path of the parent, or `None` for a root path.
    pub fn parent(&self) -> Option<Self> {
        if self.0.len() > 1 {
            Some(Self(self.0[..self.0.len() - 1].to_vec()))
        } else {
            None
        }
    }

    /// True if `self` is a strict ancestor of `other`.
    pub fn is_ancestor_of(&self, other: &CommentPath) -> bool {
        other.0.len() > self.0.len() && other.0.starts_with(&self.0)
    }

    /// Big-endian key encoding; byte order matches `Ord`.
    pub fn to_key_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.0.len() * 4);
        for segment in &self.0 {
            bytes.extend_from_slice(&segment.to_be_bytes());
        }
        bytes
    }

    /// Decodes [`CommentPath::to_key_bytes`] output.
    pub fn from_key_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() % 4 != 0 {
            return Err(FeedError::serialization(format!(
                "path key length {} is not a multiple of 4",
                bytes.len()
            )));
        }
        let segments = bytes
            .chunks_exact(4)
            .map(|chunk| u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect();
        Self::from_segments(segments)
    }
}

impl TryFrom<Vec<u32>> for CommentPath {
    type Error = FeedError;

    fn try_from(segments: Vec<u32>) -> Result<Self> {
        Self::from_segments(segments)
    }
}

impl From<CommentPath> for Vec<u32> {
    fn from(path: CommentPath) -> Self {
        path.0
    }
}

impl fmt::Display for CommentPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "{:04}", segment)?;
        }
        Ok(())
    }
}

impl FromStr for CommentPath {
    type Err = FeedError;

    fn from_str(s: &str) -> Result<Self> {
        let segments = s
            .split('.')
            .map(|part| {
                part.parse::<u32>()
                    .map_err(|_| FeedError::invalid_input(format!("bad path segment '{}'", part)))
            })
            .collect::<Result<Vec<_>>>()?;
        Self::from_segments(segments)
    }
}

// =============================================================================
// Records
// =============================================================================

/// A registered user's display profile. Authentication lives elsewhere.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: UserId,
    pub username: String,
    pub created_at: u64,
}

/// A text post in the feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub id: PostId,
    pub author: UserId,
    pub content: String,
    pub created_at: u64,
}

/// A threaded comment on a post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: CommentId,
    pub post_id: PostId,
    pub author: UserId,
    /// `None` for root comments.
    pub parent_id: Option<CommentId>,
    pub content: String,
    pub created_at: u64,
    /// Assigned once at creation, never recomputed.
    pub path: CommentPath,
    /// Always `path.depth()`; stored for display.
    pub depth: u32,
}

/// Which ledger a like belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubjectKind {
    Post,
    Comment,
}

impl fmt::Display for SubjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubjectKind::Post => write!(f, "post"),
            SubjectKind::Comment => write!(f, "comment"),
        }
    }
}

impl FromStr for SubjectKind {
    type Err = FeedError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "post" => Ok(SubjectKind::Post),
            "comment" => Ok(SubjectKind::Comment),
            other => Err(FeedError::invalid_input(format!(
                "unknown subject type '{}'",
                other
            ))),
        }
    }
}

/// Requested toggle direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LikeAction {
    Like,
    Unlike,
}

/// One live like in a ledger.
///
/// `author` is the subject's author, copied at like time (authorship never
/// changes) so karma can be grouped without a join.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LikeRecord {
    pub subject_id: u64,
    /// Post the subject belongs to (the subject itself for post likes).
    pub post_id: PostId,
    pub user: UserId,
    pub author: UserId,
    pub created_at: u64,
}

/// The target of a like: subject id, owning post and author.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LikeSubject {
    pub id: u64,
    pub post: PostId,
    pub author: UserId,
}

impl LikeSubject {
    pub fn new(id: u64, post: PostId, author: UserId) -> Self {
        Self { id, post, author }
    }

    pub fn of_post(post: &Post) -> Self {
        Self::new(post.id.get(), post.id, post.author)
    }

    pub fn of_comment(comment: &Comment) -> Self {
        Self::new(comment.id.get(), comment.post_id, comment.author)
    }
}
