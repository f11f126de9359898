//! Runtime configuration.
//!
//! Defaults match the production leaderboard (weights 5/1, 24 hour window,
//! top 5). Every field can be overridden from `FEEDCORE_*` environment
//! variables; a variable that is set but unparsable is a configuration error
//! rather than a silent fallback.

use crate::error::{FeedError, Result};
use crate::feed::karma::{KarmaQuery, KarmaWeights};
use crate::feed::storage::DEFAULT_DATA_DIR;
use crate::storage::RocksDbConfig;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const ENV_DATA_DIR: &str = "FEEDCORE_DATA_DIR";
pub const ENV_POST_WEIGHT: &str = "FEEDCORE_POST_WEIGHT";
pub const ENV_COMMENT_WEIGHT: &str = "FEEDCORE_COMMENT_WEIGHT";
pub const ENV_WINDOW_SECS: &str = "FEEDCORE_WINDOW_SECS";
pub const ENV_TOP_N: &str = "FEEDCORE_TOP_N";
pub const ENV_ALLOW_SELF_LIKES: &str = "FEEDCORE_ALLOW_SELF_LIKES";
pub const ENV_LEADERBOARD_TTL_SECS: &str = "FEEDCORE_LEADERBOARD_TTL_SECS";
pub const ENV_MAX_REPLY_DEPTH: &str = "FEEDCORE_MAX_REPLY_DEPTH";

/// Feed service configuration.
#[derive(Debug, Clone)]
pub struct FeedConfig {
    /// Directory holding the RocksDB instance.
    pub data_dir: PathBuf,
    pub rocksdb: RocksDbConfig,
    pub weights: KarmaWeights,
    /// Default leaderboard window.
    pub window: Duration,
    /// Default leaderboard size.
    pub top_n: usize,
    /// Whether users may like their own posts and comments.
    pub allow_self_likes: bool,
    /// Serve leaderboard snapshots up to this old. `None` computes live.
    pub leaderboard_cache_ttl: Option<Duration>,
    /// Deepest reply accepted (root comments are depth 0). `None` is unlimited.
    pub max_reply_depth: Option<u32>,
}

impl Default for FeedConfig {
    fn default() -> Self {
        let query = KarmaQuery::default();
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            rocksdb: RocksDbConfig::default(),
            weights: query.weights,
            window: query.window,
            top_n: query.top_n,
            allow_self_likes: false,
            leaderboard_cache_ttl: None,
            max_reply_depth: None,
        }
    }
}

impl FeedConfig {
    /// Server defaults: larger RocksDB caches, otherwise the same.
    pub fn for_server() -> Self {
        Self {
            rocksdb: RocksDbConfig::for_server(),
            ..Self::default()
        }
    }

    /// Reads overrides from the process environment on top of `self`.
    pub fn with_env(self) -> Result<Self> {
        self.with_lookup(|key| std::env::var(key).ok())
    }

    /// Default configuration with environment overrides.
    pub fn from_env() -> Result<Self> {
        Self::default().with_env()
    }

    /// Applies overrides from an arbitrary key lookup.
    pub fn with_lookup<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup(ENV_DATA_DIR) {
            self.data_dir = PathBuf::from(dir);
        }
        if let Some(weight) = parse_var(&lookup, ENV_POST_WEIGHT)? {
            self.weights.post = weight;
        }
        if let Some(weight) = parse_var(&lookup, ENV_COMMENT_WEIGHT)? {
            self.weights.comment = weight;
        }
        if let Some(secs) = parse_var::<u64, _>(&lookup, ENV_WINDOW_SECS)? {
            self.window = Duration::from_secs(secs);
        }
        if let Some(top_n) = parse_var(&lookup, ENV_TOP_N)? {
            self.top_n = top_n;
        }
        if let Some(flag) = lookup(ENV_ALLOW_SELF_LIKES) {
            self.allow_self_likes = parse_bool(ENV_ALLOW_SELF_LIKES, &flag)?;
        }
        if let Some(secs) = parse_var::<u64, _>(&lookup, ENV_LEADERBOARD_TTL_SECS)? {
            self.leaderboard_cache_ttl = (secs > 0).then(|| Duration::from_secs(secs));
        }
        if let Some(depth) = parse_var(&lookup, ENV_MAX_REPLY_DEPTH)? {
            self.max_reply_depth = Some(depth);
        }

        self.validate()?;
        Ok(self)
    }

    /// Checks cross-field constraints.
    pub fn validate(&self) -> Result<()> {
        if self.window.is_zero() {
            return Err(FeedError::config("leaderboard window must be positive"));
        }
        if self.top_n == 0 {
            return Err(FeedError::config("leaderboard top_n must be positive"));
        }
        Ok(())
    }

    /// The leaderboard query this configuration serves by default.
    pub fn karma_query(&self) -> KarmaQuery {
        KarmaQuery {
            window: self.window,
            weights: self.weights,
            top_n: self.top_n,
        }
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| FeedError::config(format!("{} has invalid value '{}'", key, raw))),
        None => Ok(None),
    }
}

fn parse_bool(key: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" => Ok(false),
        _ => Err(FeedError::config(format!(
            "{} has invalid value '{}'",
            key, raw
        ))),
    }
}
