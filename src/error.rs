//! Error types for feed operations.

use thiserror::Error;

/// Result type alias for feed operations.
pub type Result<T> = std::result::Result<T, FeedError>;

/// Main error type for feed operations.
///
/// Expected like-toggle outcomes (`AlreadyLiked`, `NotLiked`) are not errors;
/// they are reported through [`crate::feed::LikeOutcome`].
#[derive(Error, Debug)]
pub enum FeedError {
    /// Backing store failures (I/O, lock timeouts, busy transactions)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid input or arguments
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Business rule violations (self-likes, cross-post replies, ...)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// A referenced post, comment or user does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// A comment names a parent that is absent from its post's comment set.
    #[error("Orphan reference: comment {comment} names missing parent {parent}")]
    OrphanReference { comment: u64, parent: u64 },

    /// Two allocations produced the same path. Only possible when the
    /// sibling-group lock was bypassed.
    #[error("Allocation conflict: path {path} already taken on post {post}")]
    AllocationConflict { post: u64, path: String },
}

impl FeedError {
    /// Creates a new storage error.
    pub fn storage<T: ToString>(msg: T) -> Self {
        Self::Storage(msg.to_string())
    }

    /// Creates a new serialization error.
    pub fn serialization<T: ToString>(msg: T) -> Self {
        Self::Serialization(msg.to_string())
    }

    /// Creates a new invalid input error.
    pub fn invalid_input<T: ToString>(msg: T) -> Self {
        Self::InvalidInput(msg.to_string())
    }

    /// Creates a new validation error.
    pub fn validation<T: ToString>(msg: T) -> Self {
        Self::Validation(msg.to_string())
    }

    /// Creates a new configuration error.
    pub fn config<T: ToString>(msg: T) -> Self {
        Self::Config(msg.to_string())
    }

    /// Creates a new not-found error.
    pub fn not_found<T: ToString>(msg: T) -> Self {
        Self::NotFound(msg.to_string())
    }

    /// Returns true for store-level failures the caller may retry.
    ///
    /// Orphans and allocation conflicts are data/implementation faults and are
    /// never transient.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Storage(_) | Self::Io(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(FeedError::storage("lock timeout").is_transient());
        assert!(!FeedError::OrphanReference {
            comment: 2,
            parent: 1
        }
        .is_transient());
        assert!(!FeedError::AllocationConflict {
            post: 1,
            path: "1.1".into()
        }
        .is_transient());
        assert!(!FeedError::validation("nope").is_transient());
    }

    #[test]
    fn test_display_messages() {
        let err = FeedError::OrphanReference {
            comment: 7,
            parent: 3,
        };
        assert_eq!(
            err.to_string(),
            "Orphan reference: comment 7 names missing parent 3"
        );
        assert_eq!(FeedError::not_found("post 9").to_string(), "Not found: post 9");
    }
}
