//! # feedcore
//!
//! Storage and domain core of a threaded discussion forum: posts, nested
//! comments, likes, and a rolling 24 hour karma leaderboard, persisted in
//! RocksDB.
//!
//! ## Features
//!
//! - **Single-read comment trees**: comments carry a materialized path whose
//!   key encoding sorts depth-first, so a post's whole thread is one range scan
//! - **Exactly-once likes**: toggles run under a row lock on `(subject, user)`
//! - **Derived counters**: like counts and karma are computed from the ledgers
//!   on read, never stored
//!
//! ## Example
//!
//! ```rust,no_run
//! use feedcore::config::FeedConfig;
//! use feedcore::feed::{FeedService, LikeAction, SubjectKind};
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let service = FeedService::open(FeedConfig::from_env()?)?;
//! let alice = service.register_user("alice")?.id;
//! let bob = service.register_user("bob")?.id;
//!
//! let post = service.create_post(alice, "Hello")?.post;
//! let root = service.create_comment(post.id, bob, None, "Hi!")?;
//! service.create_comment(post.id, alice, Some(root.id), "Welcome")?;
//! service.toggle_like(SubjectKind::Post, post.id.get(), bob, LikeAction::Like)?;
//!
//! let tree = service.get_comment_tree(post.id, Some(bob))?;
//! let board = service.get_leaderboard(None, None)?;
//! println!("{} threads, leader: {:?}", tree.len(), board.entries.first());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod feed;
pub mod storage;

pub use error::{FeedError, Result};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
