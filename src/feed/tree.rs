//! Comment tree reconstruction.
//!
//! All comments of a post are fetched in one ordered read (ascending by
//! path) and nested here without further queries. Because the input is in
//! path order, every parent is seen before any of its replies, so one
//! left-to-right pass with an id -> node index is enough to attach every
//! comment. Nodes are then assembled bottom-up from the index, which keeps
//! the whole build O(n) in time and space.

use crate::error::{FeedError, Result};
use crate::feed::types::{Comment, CommentId};
use serde::Serialize;
use std::collections::HashMap;
use tracing::error;

/// Like data derived from the comment ledger for one comment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LikeSummary {
    pub like_count: u64,
    pub liked_by_viewer: bool,
}

/// A comment with its replies in creation order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommentNode {
    #[serde(flatten)]
    pub comment: Comment,
    #[serde(flatten)]
    pub likes: LikeSummary,
    pub replies: Vec<CommentNode>,
}

impl CommentNode {
    fn leaf(comment: Comment) -> Self {
        Self {
            comment,
            likes: LikeSummary::default(),
            replies: Vec::new(),
        }
    }

    /// Number of comments in this subtree, including this one.
    pub fn subtree_len(&self) -> usize {
        1 + self.replies.iter().map(CommentNode::subtree_len).sum::<usize>()
    }

    /// Applies `f` to every node of this subtree in pre-order.
    pub fn visit_mut<F: FnMut(&mut CommentNode)>(&mut self, f: &mut F) {
        f(self);
        for reply in &mut self.replies {
            reply.visit_mut(f);
        }
    }
}

/// Nests a path-ordered comment sequence into a forest of root comments.
///
/// The input must hold every comment of one post, ascending by path. A
/// comment whose parent has not been seen earlier in the sequence is an
/// [`FeedError::OrphanReference`]; it is never promoted to a root.
pub fn build_tree(comments: Vec<Comment>) -> Result<Vec<CommentNode>> {
    let count = comments.len();
    let mut index: HashMap<CommentId, usize> = HashMap::with_capacity(count);
    let mut children: Vec<Vec<usize>> = Vec::with_capacity(count);
    let mut roots = Vec::new();

    for (position, comment) in comments.iter().enumerate() {
        match comment.parent_id {
            None => roots.push(position),
            Some(parent) => match index.get(&parent) {
                Some(&parent_position) => children[parent_position].push(position),
                None => {
                    error!(
                        post = %comment.post_id,
                        comment = %comment.id,
                        parent = %parent,
                        "build_tree: parent missing from comment set"
                    );
                    return Err(FeedError::OrphanReference {
                        comment: comment.id.get(),
                        parent: parent.get(),
                    });
                }
            },
        }
        index.insert(comment.id, position);
        children.push(Vec::new());
    }

    // Replies always sit after their parent, so walking backwards finishes
    // every subtree before its parent collects it.
    let mut slots: Vec<Option<CommentNode>> =
        comments.into_iter().map(|c| Some(CommentNode::leaf(c))).collect();

    for position in (0..count).rev() {
        if children[position].is_empty() {
            continue;
        }
        let replies: Vec<CommentNode> = children[position]
            .iter()
            .filter_map(|&child| slots[child].take())
            .collect();
        if let Some(node) = slots[position].as_mut() {
            node.replies = replies;
        }
    }

    Ok(roots
        .into_iter()
        .filter_map(|position| slots[position].take())
        .collect())
}

/// Pre-order traversal of a forest.
pub fn flatten(forest: &[CommentNode]) -> Vec<&Comment> {
    fn walk<'a>(node: &'a CommentNode, out: &mut Vec<&'a Comment>) {
        out.push(&node.comment);
        for reply in &node.replies {
            walk(reply, out);
        }
    }

    let mut out = Vec::new();
    for root in forest {
        walk(root, &mut out);
    }
    out
}
