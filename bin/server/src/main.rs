//! feedcore HTTP server
//!
//! Serves the discussion feed: users, posts, threaded comments, likes and the
//! rolling karma leaderboard, backed by a local RocksDB directory.
//!
//! ## Usage
//!
//! ```bash
//! # Run with default settings (localhost:3002, ./feedcore_data)
//! feedcore-server
//!
//! # Run on custom address with a custom data directory
//! feedcore-server --bind 0.0.0.0:8080 --data-dir /var/lib/feedcore
//!
//! # Populate an empty database with demo content
//! feedcore-server --seed
//!
//! # Enable debug logging
//! RUST_LOG=debug feedcore-server
//! ```
//!
//! Leaderboard weights, window and size are read from `FEEDCORE_*`
//! environment variables (see `feedcore::config`).

mod handlers;
mod seed;

use axum::{
    http::{header, HeaderValue},
    routing::{get, post},
    Router,
};
use feedcore::config::FeedConfig;
use feedcore::feed::FeedService;
use handlers::SharedFeed;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Default listen address.
const DEFAULT_BIND_ADDR: &str = "127.0.0.1:3002";

/// Command line options.
#[derive(Debug, Clone)]
struct ServerArgs {
    bind_addr: String,
    data_dir: Option<PathBuf>,
    seed: bool,
}

impl ServerArgs {
    fn from_args() -> Self {
        let flag_value = |flag: &str| {
            std::env::args()
                .position(|arg| arg == flag)
                .and_then(|pos| std::env::args().nth(pos + 1))
        };

        Self {
            bind_addr: flag_value("--bind").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
            data_dir: flag_value("--data-dir").map(PathBuf::from),
            seed: std::env::args().any(|arg| arg == "--seed"),
        }
    }
}

fn router(feed: SharedFeed) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/users", post(handlers::register_user))
        .route("/users/:id", get(handlers::get_user))
        .route("/me", get(handlers::me))
        .route("/posts", get(handlers::list_posts).post(handlers::create_post))
        .route("/posts/:id", get(handlers::get_post))
        .route(
            "/posts/:id/comments",
            get(handlers::list_comments).post(handlers::create_comment),
        )
        .route("/posts/:id/like", post(handlers::like_post))
        .route("/posts/:id/unlike", post(handlers::unlike_post))
        .route("/comments/:id/like", post(handlers::like_comment))
        .route("/comments/:id/unlike", post(handlers::unlike_comment))
        .route("/leaderboard", get(handlers::leaderboard))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(feed)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "feedcore=info,feedcore_server=info,tower_http=debug".into()
            }),
        )
        .init();

    let args = ServerArgs::from_args();

    let mut config = FeedConfig::for_server().with_env()?;
    if let Some(dir) = args.data_dir.clone() {
        config.data_dir = dir;
    }

    info!(
        data_dir = ?config.data_dir,
        post_weight = config.weights.post,
        comment_weight = config.weights.comment,
        window_secs = config.window.as_secs(),
        top_n = config.top_n,
        cache_ttl = ?config.leaderboard_cache_ttl,
        "Opening feed"
    );

    let feed: SharedFeed = match FeedService::open(config) {
        Ok(service) => Arc::new(service),
        Err(e) => {
            error!("Failed to open feed storage: {}", e);
            return Err(e.into());
        }
    };

    if args.seed {
        let seed_feed = Arc::clone(&feed);
        tokio::task::spawn_blocking(move || seed::seed(&seed_feed)).await??;
    }

    let app = router(feed);

    let listener = TcpListener::bind(&args.bind_addr).await?;
    info!("feedcore server running on http://{}", args.bind_addr);
    info!("");
    info!("Endpoints (identity via x-user-id header):");
    info!("  GET    /health                  - Health check");
    info!("  POST   /users                   - Register a username");
    info!("  GET    /users/:id               - Get a user");
    info!("  GET    /me                      - Get the calling user");
    info!("  GET    /posts                   - List newest posts");
    info!("  POST   /posts                   - Create a post");
    info!("  GET    /posts/:id               - Get a post");
    info!("  GET    /posts/:id/comments      - Comment tree for a post");
    info!("  POST   /posts/:id/comments      - Comment or reply on a post");
    info!("  POST   /posts/:id/like|unlike   - Toggle a post like");
    info!("  POST   /comments/:id/like|unlike - Toggle a comment like");
    info!("  GET    /leaderboard             - Top users by karma");

    axum::serve(listener, app).await?;

    Ok(())
}
