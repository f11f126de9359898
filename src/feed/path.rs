//! Materialized path allocation.
//!
//! A new comment's path is its parent's path plus one segment that is one
//! greater than the largest segment already used in its sibling group (the
//! post's roots, or the parent's direct children). Segments are never reused
//! and the allocator does not assume they are dense.
//!
//! [`allocate`] is pure. Making "read max, compute next, insert" indivisible
//! is the storage layer's job: it holds an exclusive row lock on the sibling
//! group's counter for the whole sequence (see
//! [`crate::feed::FeedStorage::create_comment`]).

use crate::error::{FeedError, Result};
use crate::feed::types::{CommentId, CommentPath, PostId};
use crate::storage::{id_key, prefixed_key};

/// Identifies a sibling group: the roots of a post, or one comment's replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SiblingGroup {
    Roots(PostId),
    Replies(PostId, CommentId),
}

impl SiblingGroup {
    /// The group a new comment joins.
    pub fn for_parent(post: PostId, parent: Option<CommentId>) -> Self {
        match parent {
            Some(parent) => SiblingGroup::Replies(post, parent),
            None => SiblingGroup::Roots(post),
        }
    }

    pub fn post(&self) -> PostId {
        match self {
            SiblingGroup::Roots(post) | SiblingGroup::Replies(post, _) => *post,
        }
    }

    /// Lock/counter key: `{post}{tag}{parent}`, big-endian.
    pub fn key(&self) -> Vec<u8> {
        match self {
            SiblingGroup::Roots(post) => prefixed_key(&id_key(post.get()), b'r', &[]),
            SiblingGroup::Replies(post, parent) => {
                prefixed_key(&id_key(post.get()), b'c', &id_key(parent.get()))
            }
        }
    }
}

/// Computes the next path in a sibling group.
///
/// `max_sibling_segment` is the largest last segment among existing siblings,
/// or 0 when the group is empty.
pub fn allocate(
    parent_path: Option<&CommentPath>,
    max_sibling_segment: u32,
) -> Result<CommentPath> {
    let next = max_sibling_segment
        .checked_add(1)
        .ok_or_else(|| FeedError::invalid_input("sibling segment space exhausted"))?;

    match parent_path {
        Some(parent) => parent.child(next),
        None => CommentPath::root(next),
    }
}
