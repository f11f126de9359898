//! Threaded discussion feed with a rolling karma leaderboard.
//!
//! Durable state is a handful of append-mostly records: posts, comments and
//! two like ledgers. Everything shown to users (comment trees, like counts,
//! "liked by me" flags, karma) is derived from those records on read.
//!
//! ## Components
//!
//! ```text
//! path      materialized path allocation (pure)
//! tree      path-ordered comments -> nested forest, one pass
//! ledger    exactly-once likes per (subject, user)
//! karma     weighted window counts -> ranked leaderboard
//! storage   RocksDB persistence and the two serialization points
//! service   validation, policy and derived views
//! ```
//!
//! ## Serialization points
//!
//! Only two writes need mutual exclusion, and both use RocksDB row locks:
//! path allocation locks the sibling group's counter key, and like toggling
//! locks the `(subject, user)` key. Reads take no locks.

pub mod constants;
pub mod karma;
pub mod ledger;
pub mod path;
pub mod service;
pub mod storage;
pub mod tree;
pub mod types;
pub mod validation;

pub use karma::{
    rank, CachedLeaderboard, KarmaAggregator, KarmaEntry, KarmaQuery, KarmaSnapshot,
    KarmaWeights, LeaderboardSource,
};
pub use ledger::{LikeLedger, LikeOutcome};
pub use path::{allocate, SiblingGroup};
pub use service::{FeedService, Leaderboard, PostView, RankedUser, ToggleResult};
pub use storage::FeedStorage;
pub use tree::{build_tree, flatten, CommentNode, LikeSummary};
pub use types::{
    current_timestamp_millis, Comment, CommentId, CommentPath, LikeAction, LikeRecord, LikeSubject,
    Post, PostId, SubjectKind, UserId, UserProfile,
};
pub use validation::Validator;
