//! Shared constants for feed validation, karma and limits.
//!
//! These constants are used by both the library and the HTTP server to ensure
//! consistent validation across all entry points.

// =============================================================================
// Content Size Limits
// =============================================================================

/// Maximum post body size (100KB).
pub const MAX_POST_SIZE: usize = 100 * 1024;

/// Maximum comment body size (10KB).
pub const MAX_COMMENT_SIZE: usize = 10 * 1024;

/// Maximum username size (150 bytes).
pub const MAX_USERNAME_SIZE: usize = 150;

// =============================================================================
// Karma
// =============================================================================

/// Karma awarded to a post's author per like.
pub const DEFAULT_POST_WEIGHT: u64 = 5;

/// Karma awarded to a comment's author per like.
pub const DEFAULT_COMMENT_WEIGHT: u64 = 1;

/// Default rolling leaderboard window (24 hours in seconds).
pub const DEFAULT_WINDOW_SECS: u64 = 24 * 60 * 60;

/// Default number of leaderboard entries.
pub const DEFAULT_TOP_N: usize = 5;

/// Upper bound on requested leaderboard size.
pub const MAX_TOP_N: usize = 100;

// =============================================================================
// Listing Limits
// =============================================================================

/// Default number of posts per listing.
pub const DEFAULT_PAGE_SIZE: usize = 20;

/// Maximum number of posts per listing.
pub const MAX_PAGE_SIZE: usize = 100;
