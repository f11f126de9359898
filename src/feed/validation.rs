//! Input validation for feed content and query parameters.
//!
//! Used by both the library and the HTTP server so limits are enforced the
//! same way at every entry point.

use crate::error::{FeedError, Result};
use crate::feed::constants::{
    MAX_COMMENT_SIZE, MAX_PAGE_SIZE, MAX_POST_SIZE, MAX_TOP_N, MAX_USERNAME_SIZE,
};

/// Validation functions for feed input.
pub struct Validator;

impl Validator {
    fn validate_text(kind: &str, text: &str, max: usize) -> Result<()> {
        if text.len() > max {
            return Err(FeedError::validation(format!(
                "{} too large: {} bytes exceeds maximum of {} bytes",
                kind,
                text.len(),
                max
            )));
        }
        if text.trim().is_empty() {
            return Err(FeedError::validation(format!("{} cannot be empty", kind)));
        }
        if text.contains('\0') {
            return Err(FeedError::validation(format!("{} contains null bytes", kind)));
        }
        Ok(())
    }

    /// Validate a post body.
    pub fn validate_post_content(content: &str) -> Result<()> {
        Self::validate_text("Post", content, MAX_POST_SIZE)
    }

    /// Validate a comment body.
    pub fn validate_comment_content(content: &str) -> Result<()> {
        Self::validate_text("Comment", content, MAX_COMMENT_SIZE)
    }

    /// Validate a display name.
    pub fn validate_username(username: &str) -> Result<()> {
        Self::validate_text("Username", username, MAX_USERNAME_SIZE)?;

        if username.chars().any(|c| c.is_control() || c.is_whitespace()) {
            return Err(FeedError::validation(
                "Username cannot contain whitespace or control characters",
            ));
        }
        Ok(())
    }

    /// Validate a requested leaderboard size.
    pub fn validate_top_n(top_n: usize) -> Result<()> {
        if top_n == 0 || top_n > MAX_TOP_N {
            return Err(FeedError::invalid_input(format!(
                "top_n must be between 1 and {}, got {}",
                MAX_TOP_N, top_n
            )));
        }
        Ok(())
    }

    /// Validate a requested listing size.
    pub fn validate_page_size(limit: usize) -> Result<()> {
        if limit == 0 || limit > MAX_PAGE_SIZE {
            return Err(FeedError::invalid_input(format!(
                "limit must be between 1 and {}, got {}",
                MAX_PAGE_SIZE, limit
            )));
        }
        Ok(())
    }
}
