//! HTTP handlers for the feed API.
//!
//! Handlers are thin: they parse the request, run the library call on the
//! blocking pool (RocksDB calls may wait on row locks), and map the result to
//! a status code. Caller identity comes from the `x-user-id` header, which
//! stands in for an authenticating proxy.

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use feedcore::feed::{
    CommentId, CommentNode, FeedService, LikeAction, PostId, SubjectKind, UserId,
};
use feedcore::FeedError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, instrument, warn};

/// Header carrying the caller's user id.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Shared server state.
pub type SharedFeed = Arc<FeedService>;

// =============================================================================
// Responses and errors
// =============================================================================

/// Generic API response for errors and acknowledgements.
#[derive(Debug, Serialize)]
pub struct ApiResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ApiResponse {
    fn error(error: impl Into<String>) -> Self {
        Self {
            success: false,
            message: None,
            error: Some(error.into()),
        }
    }
}

/// A failed request: status plus message.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    fn unauthorized() -> Self {
        Self::new(
            StatusCode::UNAUTHORIZED,
            format!("missing or invalid {} header", USER_ID_HEADER),
        )
    }
}

impl From<FeedError> for ApiError {
    fn from(err: FeedError) -> Self {
        let status = match &err {
            FeedError::Validation(_) | FeedError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            FeedError::NotFound(_) => StatusCode::NOT_FOUND,
            e if e.is_transient() => StatusCode::SERVICE_UNAVAILABLE,
            FeedError::OrphanReference { .. } | FeedError::AllocationConflict { .. } => {
                error!(error = %err, "feed integrity error");
                StatusCode::INTERNAL_SERVER_ERROR
            }
            _ => {
                error!(error = %err, "request failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        Self::new(status, err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ApiResponse::error(self.message))).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

/// Runs a feed call on the blocking pool.
async fn run_blocking<T, F>(feed: &SharedFeed, call: F) -> ApiResult<T>
where
    T: Send + 'static,
    F: FnOnce(&FeedService) -> feedcore::Result<T> + Send + 'static,
{
    let feed = Arc::clone(feed);
    tokio::task::spawn_blocking(move || call(&feed))
        .await
        .map_err(|e| {
            error!("Feed task panicked or was cancelled: {}", e);
            ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
        })?
        .map_err(ApiError::from)
}

/// The caller's id, if the identity header is present and well formed.
fn viewer(headers: &HeaderMap) -> Option<UserId> {
    headers
        .get(USER_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
        .map(UserId)
}

fn require_user(headers: &HeaderMap) -> ApiResult<UserId> {
    viewer(headers).ok_or_else(ApiError::unauthorized)
}

// =============================================================================
// System
// =============================================================================

/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "feedcore-server",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

// =============================================================================
// Users
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct RegisterUserRequest {
    pub username: String,
}

#[instrument(skip(feed, request))]
pub async fn register_user(
    State(feed): State<SharedFeed>,
    Json(request): Json<RegisterUserRequest>,
) -> ApiResult<impl IntoResponse> {
    let profile = run_blocking(&feed, move |f| f.register_user(&request.username)).await?;
    Ok((StatusCode::CREATED, Json(profile)))
}

#[instrument(skip(feed))]
pub async fn get_user(
    State(feed): State<SharedFeed>,
    Path(user_id): Path<u64>,
) -> ApiResult<impl IntoResponse> {
    let profile = run_blocking(&feed, move |f| f.get_user(UserId(user_id))).await?;
    Ok(Json(profile))
}

/// The caller's own profile.
#[instrument(skip(feed, headers))]
pub async fn me(
    State(feed): State<SharedFeed>,
    headers: HeaderMap,
) -> ApiResult<impl IntoResponse> {
    let user = require_user(&headers)?;
    let profile = run_blocking(&feed, move |f| f.get_user(user)).await?;
    Ok(Json(profile))
}

// =============================================================================
// Posts
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct ListPostsParams {
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct CreatePostRequest {
    pub content: String,
}

#[instrument(skip(feed, headers))]
pub async fn list_posts(
    State(feed): State<SharedFeed>,
    Query(params): Query<ListPostsParams>,
    headers: HeaderMap,
) -> ApiResult<impl IntoResponse> {
    let viewer = viewer(&headers);
    let posts = run_blocking(&feed, move |f| f.list_posts(params.limit, viewer)).await?;
    Ok(Json(posts))
}

#[instrument(skip(feed, headers, request))]
pub async fn create_post(
    State(feed): State<SharedFeed>,
    headers: HeaderMap,
    Json(request): Json<CreatePostRequest>,
) -> ApiResult<impl IntoResponse> {
    let author = require_user(&headers)?;
    let post = run_blocking(&feed, move |f| f.create_post(author, &request.content)).await?;
    Ok((StatusCode::CREATED, Json(post)))
}

#[instrument(skip(feed, headers))]
pub async fn get_post(
    State(feed): State<SharedFeed>,
    Path(post_id): Path<u64>,
    headers: HeaderMap,
) -> ApiResult<impl IntoResponse> {
    let viewer = viewer(&headers);
    let post = run_blocking(&feed, move |f| f.get_post(PostId(post_id), viewer)).await?;
    Ok(Json(post))
}

// =============================================================================
// Comments
// =============================================================================

#[derive(Debug, Serialize)]
pub struct CommentTreeResponse {
    pub post_id: PostId,
    pub total: usize,
    pub comments: Vec<CommentNode>,
}

#[derive(Debug, Deserialize)]
pub struct CreateCommentRequest {
    pub content: String,
    #[serde(default)]
    pub parent_id: Option<u64>,
}

#[instrument(skip(feed, headers))]
pub async fn list_comments(
    State(feed): State<SharedFeed>,
    Path(post_id): Path<u64>,
    headers: HeaderMap,
) -> ApiResult<impl IntoResponse> {
    let viewer = viewer(&headers);
    let post_id = PostId(post_id);
    let comments = run_blocking(&feed, move |f| f.get_comment_tree(post_id, viewer)).await?;
    Ok(Json(CommentTreeResponse {
        post_id,
        total: comments.iter().map(CommentNode::subtree_len).sum(),
        comments,
    }))
}

#[instrument(skip(feed, headers, request))]
pub async fn create_comment(
    State(feed): State<SharedFeed>,
    Path(post_id): Path<u64>,
    headers: HeaderMap,
    Json(request): Json<CreateCommentRequest>,
) -> ApiResult<impl IntoResponse> {
    let author = require_user(&headers)?;
    let comment = run_blocking(&feed, move |f| {
        f.create_comment(
            PostId(post_id),
            author,
            request.parent_id.map(CommentId),
            &request.content,
        )
    })
    .await?;
    Ok((StatusCode::CREATED, Json(comment)))
}

// =============================================================================
// Likes
// =============================================================================

async fn toggle(
    feed: SharedFeed,
    headers: HeaderMap,
    kind: SubjectKind,
    subject_id: u64,
    action: LikeAction,
) -> ApiResult<Response> {
    let user = require_user(&headers)?;
    let result =
        run_blocking(&feed, move |f| f.toggle_like(kind, subject_id, user, action)).await?;

    // Already in the requested state: report it with the current count.
    let status = if result.outcome.changed() {
        StatusCode::OK
    } else {
        warn!(
            kind = %kind,
            subject = subject_id,
            user = %user,
            outcome = ?result.outcome,
            "toggle was a no-op"
        );
        StatusCode::CONFLICT
    };
    Ok((status, Json(result)).into_response())
}

#[instrument(skip(feed, headers))]
pub async fn like_post(
    State(feed): State<SharedFeed>,
    Path(post_id): Path<u64>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    toggle(feed, headers, SubjectKind::Post, post_id, LikeAction::Like).await
}

#[instrument(skip(feed, headers))]
pub async fn unlike_post(
    State(feed): State<SharedFeed>,
    Path(post_id): Path<u64>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    toggle(feed, headers, SubjectKind::Post, post_id, LikeAction::Unlike).await
}

#[instrument(skip(feed, headers))]
pub async fn like_comment(
    State(feed): State<SharedFeed>,
    Path(comment_id): Path<u64>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    toggle(feed, headers, SubjectKind::Comment, comment_id, LikeAction::Like).await
}

#[instrument(skip(feed, headers))]
pub async fn unlike_comment(
    State(feed): State<SharedFeed>,
    Path(comment_id): Path<u64>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    toggle(
        feed,
        headers,
        SubjectKind::Comment,
        comment_id,
        LikeAction::Unlike,
    )
    .await
}

// =============================================================================
// Leaderboard
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct LeaderboardParams {
    pub window_secs: Option<u64>,
    pub top_n: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct LeaderboardResponse {
    /// Window length, e.g. `24h`.
    pub period: String,
    /// RFC 3339 time the ranking was computed.
    pub calculated_at: String,
    pub leaderboard: Vec<feedcore::feed::RankedUser>,
}

fn format_period(secs: u64) -> String {
    if secs % 3600 == 0 {
        format!("{}h", secs / 3600)
    } else if secs % 60 == 0 {
        format!("{}m", secs / 60)
    } else {
        format!("{}s", secs)
    }
}

#[instrument(skip(feed))]
pub async fn leaderboard(
    State(feed): State<SharedFeed>,
    Query(params): Query<LeaderboardParams>,
) -> ApiResult<impl IntoResponse> {
    let window = params.window_secs.map(Duration::from_secs);
    let board = run_blocking(&feed, move |f| f.get_leaderboard(window, params.top_n)).await?;

    let calculated_at = chrono::DateTime::<chrono::Utc>::from_timestamp_millis(
        board.calculated_at as i64,
    )
    .map(|t| t.to_rfc3339())
    .unwrap_or_default();

    Ok(Json(LeaderboardResponse {
        period: format_period(board.window_secs),
        calculated_at,
        leaderboard: board.entries,
    }))
}
