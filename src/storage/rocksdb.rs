//! Shared RocksDB storage utilities.
//!
//! This module provides generic utilities and patterns for RocksDB-based
//! storage. It contains no domain-specific logic - just RocksDB helpers.
//!
//! ## Key Features
//!
//! - Configurable RocksDB setup with sensible defaults
//! - Generic key-value operations with serialization
//! - Prefix and seek iteration patterns
//! - Pessimistic transactions with row locks (`get_for_update`)
//!
//! The database is opened as a `TransactionDB`, so every write outside an
//! explicit transaction is still atomic, and explicit transactions can lock
//! individual keys - including keys that do not exist yet. Dropping a
//! [`TxnHandle`] without committing rolls it back.

use crate::error::{FeedError, Result};
use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, ErrorKind, MultiThreaded, Options, Transaction,
    TransactionDB, TransactionDBOptions,
};
use serde::{de::DeserializeOwned, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, trace};

type Db = TransactionDB<MultiThreaded>;

// =============================================================================
// RocksDB Configuration
// =============================================================================

/// Configuration for RocksDB storage.
#[derive(Debug, Clone)]
pub struct RocksDbConfig {
    /// Maximum number of open files.
    pub max_open_files: i32,
    /// Number of log files to keep.
    pub keep_log_file_num: usize,
    /// Maximum WAL size in bytes.
    pub max_wal_size: u64,
    /// Write buffer size in bytes.
    pub write_buffer_size: usize,
    /// Maximum number of write buffers.
    pub max_write_buffer_number: i32,
    /// Target file size for SST files.
    pub target_file_size_base: u64,
    /// How long a transaction waits for a row lock before failing (ms).
    pub lock_timeout_ms: i64,
}

impl Default for RocksDbConfig {
    fn default() -> Self {
        Self {
            max_open_files: 128,
            keep_log_file_num: 2,
            max_wal_size: 32 * 1024 * 1024,      // 32MB
            write_buffer_size: 32 * 1024 * 1024, // 32MB
            max_write_buffer_number: 2,
            target_file_size_base: 32 * 1024 * 1024, // 32MB
            lock_timeout_ms: 5_000,
        }
    }
}

impl RocksDbConfig {
    /// Creates a configuration optimized for server workloads.
    ///
    /// Uses larger buffers and more files for higher throughput.
    pub fn for_server() -> Self {
        Self {
            max_open_files: 256,
            keep_log_file_num: 3,
            max_wal_size: 64 * 1024 * 1024,      // 64MB
            write_buffer_size: 64 * 1024 * 1024, // 64MB
            max_write_buffer_number: 3,
            target_file_size_base: 64 * 1024 * 1024, // 64MB
            lock_timeout_ms: 2_000,
        }
    }

    /// Builds RocksDB Options from this configuration.
    pub fn build_options(&self) -> Options {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);
        opts.set_max_open_files(self.max_open_files);
        opts.set_keep_log_file_num(self.keep_log_file_num);
        opts.set_max_total_wal_size(self.max_wal_size);
        opts.increase_parallelism(num_cpus::get() as i32);
        opts.set_write_buffer_size(self.write_buffer_size);
        opts.set_max_write_buffer_number(self.max_write_buffer_number);
        opts.set_target_file_size_base(self.target_file_size_base);
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        opts
    }

    /// Builds the transaction options (row-lock timeouts).
    pub fn build_txn_options(&self) -> TransactionDBOptions {
        let mut txn_opts = TransactionDBOptions::default();
        txn_opts.set_txn_lock_timeout(self.lock_timeout_ms);
        txn_opts.set_default_lock_timeout(self.lock_timeout_ms);
        txn_opts
    }
}

// =============================================================================
// Key Generation Utilities
// =============================================================================

/// Creates a prefixed key with a separator.
///
/// Format: `{prefix}{separator}{suffix}`
pub fn prefixed_key(prefix: &[u8], separator: u8, suffix: &[u8]) -> Vec<u8> {
    let mut key = Vec::with_capacity(prefix.len() + 1 + suffix.len());
    key.extend_from_slice(prefix);
    key.push(separator);
    key.extend_from_slice(suffix);
    key
}

/// Creates a composite key from two byte slices.
///
/// Format: `{part1}:{part2}` (using colon separator)
pub fn composite_key(part1: &[u8], part2: &[u8]) -> Vec<u8> {
    prefixed_key(part1, b':', part2)
}

/// Encodes an id big-endian so byte order equals numeric order.
pub fn id_key(id: u64) -> [u8; 8] {
    id.to_be_bytes()
}

/// Decodes the leading 8 bytes of a key as a big-endian id.
pub fn key_id(key: &[u8]) -> Option<u64> {
    let bytes: [u8; 8] = key.get(..8)?.try_into().ok()?;
    Some(u64::from_be_bytes(bytes))
}

fn db_error(action: &str, e: rocksdb::Error) -> FeedError {
    match e.kind() {
        ErrorKind::Busy | ErrorKind::TimedOut | ErrorKind::TryAgain => {
            FeedError::storage(format!("{} (lock contention): {}", action, e))
        }
        _ => FeedError::storage(format!("{}: {}", action, e)),
    }
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    bincode::serialize(value)
        .map_err(|e| FeedError::serialization(format!("Failed to serialize: {}", e)))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    bincode::deserialize(bytes)
        .map_err(|e| FeedError::serialization(format!("Failed to deserialize: {}", e)))
}

// =============================================================================
// Database Handle Wrapper
// =============================================================================

/// A wrapper around a RocksDB `TransactionDB` that provides common operations.
///
/// This is designed to be embedded in storage structs to provide
/// shared functionality while allowing storage-specific extensions.
pub struct RocksDbHandle {
    db: Arc<Db>,
}

impl RocksDbHandle {
    /// Opens a RocksDB database with the given column families.
    pub fn open(
        db_path: impl AsRef<Path>,
        config: &RocksDbConfig,
        column_families: &[&str],
    ) -> Result<Self> {
        let opts = config.build_options();
        let txn_opts = config.build_txn_options();
        let cf_opts = Options::default();

        let cf_descriptors: Vec<_> = column_families
            .iter()
            .map(|cf| ColumnFamilyDescriptor::new(*cf, cf_opts.clone()))
            .collect();

        let db = Db::open_cf_descriptors(&opts, &txn_opts, db_path.as_ref(), cf_descriptors)
            .map_err(|e| db_error("Failed to open RocksDB", e))?;

        Ok(Self { db: Arc::new(db) })
    }

    /// Gets a column family handle.
    pub fn cf(&self, name: &str) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| FeedError::storage(format!("Column family '{}' not found", name)))
    }

    /// Stores a serializable value at the given key.
    pub fn put<T: Serialize>(&self, cf_name: &str, key: &[u8], value: &T) -> Result<()> {
        let cf = self.cf(cf_name)?;
        let bytes = encode(value)?;

        trace!(
            cf = cf_name,
            key_len = key.len(),
            value_bytes = bytes.len(),
            "db_put: storing serialized value"
        );

        self.db
            .put_cf(&cf, key, &bytes)
            .map_err(|e| db_error("Failed to write", e))
    }

    /// Loads and deserializes a value from the given key.
    pub fn get<T: DeserializeOwned>(&self, cf_name: &str, key: &[u8]) -> Result<Option<T>> {
        match self.get_raw(cf_name, key)? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Loads raw bytes from the given key.
    pub fn get_raw(&self, cf_name: &str, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let cf = self.cf(cf_name)?;

        match self.db.get_cf(&cf, key) {
            Ok(Some(bytes)) => {
                trace!(
                    cf = cf_name,
                    key_len = key.len(),
                    value_bytes = bytes.len(),
                    "db_get: found record"
                );
                Ok(Some(bytes))
            }
            Ok(None) => {
                trace!(cf = cf_name, key_len = key.len(), "db_get: key not found");
                Ok(None)
            }
            Err(e) => Err(db_error("Failed to read", e)),
        }
    }

    /// Checks if a key exists.
    pub fn exists(&self, cf_name: &str, key: &[u8]) -> Result<bool> {
        Ok(self.get_raw(cf_name, key)?.is_some())
    }

    /// Iterates over entries starting from a seek position, filtering by a prefix.
    ///
    /// - `seek_key`: The key to seek to (start iteration from this position)
    /// - `filter_prefix`: Only process keys that start with this prefix
    ///
    /// The callback receives (key, value) pairs and should return true to continue
    /// or false to stop iteration.
    pub fn seek_iterate<F>(
        &self,
        cf_name: &str,
        seek_key: &[u8],
        filter_prefix: &[u8],
        mut callback: F,
    ) -> Result<()>
    where
        F: FnMut(&[u8], &[u8]) -> bool,
    {
        let cf = self.cf(cf_name)?;
        let mut iter = self.db.raw_iterator_cf(&cf);
        iter.seek(seek_key);

        let mut count: usize = 0;
        while iter.valid() {
            let (Some(key), Some(value)) = (iter.key(), iter.value()) else {
                break;
            };
            if !key.starts_with(filter_prefix) {
                break;
            }
            count += 1;
            if !callback(key, value) {
                break;
            }
            iter.next();
        }
        iter.status().map_err(|e| db_error("Iterator failed", e))?;

        debug!(
            cf = cf_name,
            seek_key_len = seek_key.len(),
            filter_prefix_len = filter_prefix.len(),
            records_iterated = count,
            "db_seek_iterate: completed seek iteration"
        );

        Ok(())
    }

    /// Iterates over all entries with the given prefix, in key order.
    pub fn prefix_iterate<F>(&self, cf_name: &str, prefix: &[u8], callback: F) -> Result<()>
    where
        F: FnMut(&[u8], &[u8]) -> bool,
    {
        self.seek_iterate(cf_name, prefix, prefix, callback)
    }

    /// Collects all values with the given prefix, deserializing each.
    ///
    /// Unlike a best-effort scan, a record that fails to decode aborts the
    /// collection: callers rely on the result being complete.
    pub fn prefix_collect<T: DeserializeOwned>(
        &self,
        cf_name: &str,
        prefix: &[u8],
    ) -> Result<Vec<T>> {
        let mut results = Vec::new();
        let mut failure = None;

        self.prefix_iterate(cf_name, prefix, |_, value| match decode(value) {
            Ok(item) => {
                results.push(item);
                true
            }
            Err(e) => {
                failure = Some(e);
                false
            }
        })?;

        if let Some(e) = failure {
            return Err(e);
        }

        debug!(
            cf = cf_name,
            prefix_len = prefix.len(),
            records_collected = results.len(),
            "db_prefix_collect: collected records"
        );

        Ok(results)
    }

    /// Counts entries with the given prefix.
    pub fn prefix_count(&self, cf_name: &str, prefix: &[u8]) -> Result<usize> {
        let mut count = 0;
        self.prefix_iterate(cf_name, prefix, |_, _| {
            count += 1;
            true
        })?;
        Ok(count)
    }

    /// Iterates over all entries in a column family, last key first.
    pub fn iterate_reverse<F>(&self, cf_name: &str, mut callback: F) -> Result<()>
    where
        F: FnMut(&[u8], &[u8]) -> bool,
    {
        let cf = self.cf(cf_name)?;
        let mut iter = self.db.raw_iterator_cf(&cf);
        iter.seek_to_last();

        while iter.valid() {
            let (Some(key), Some(value)) = (iter.key(), iter.value()) else {
                break;
            };
            if !callback(key, value) {
                break;
            }
            iter.prev();
        }
        iter.status().map_err(|e| db_error("Iterator failed", e))
    }

    /// Returns the greatest key in a column family, if any.
    pub fn last_key(&self, cf_name: &str) -> Result<Option<Vec<u8>>> {
        let cf = self.cf(cf_name)?;
        let mut iter = self.db.raw_iterator_cf(&cf);
        iter.seek_to_last();
        let key = if iter.valid() {
            iter.key().map(|k| k.to_vec())
        } else {
            None
        };
        iter.status().map_err(|e| db_error("Iterator failed", e))?;
        Ok(key)
    }

    /// Starts a pessimistic transaction.
    pub fn transaction(&self) -> TxnHandle<'_> {
        TxnHandle {
            handle: self,
            txn: self.db.transaction(),
        }
    }
}

impl std::fmt::Debug for RocksDbHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RocksDbHandle")
            .field("db", &"RocksDB")
            .finish()
    }
}

// =============================================================================
// Transactions
// =============================================================================

/// A pessimistic transaction over a [`RocksDbHandle`].
///
/// Keys read with [`TxnHandle::get_for_update`] stay exclusively locked until
/// the transaction commits or is dropped, so a read-check-write sequence on
/// those keys is indivisible with respect to other transactions.
pub struct TxnHandle<'a> {
    handle: &'a RocksDbHandle,
    txn: Transaction<'a, Db>,
}

impl<'a> TxnHandle<'a> {
    /// Locks `key` exclusively and returns its raw value, if any.
    pub fn get_raw_for_update(&self, cf_name: &str, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let cf = self.handle.cf(cf_name)?;
        let value = self
            .txn
            .get_for_update_cf(&cf, key, true)
            .map_err(|e| db_error("Failed to lock key", e))?;

        trace!(
            cf = cf_name,
            key_len = key.len(),
            found = value.is_some(),
            "txn_get_for_update: locked key"
        );

        Ok(value)
    }

    /// Locks `key` exclusively and returns its decoded value, if any.
    pub fn get_for_update<T: DeserializeOwned>(
        &self,
        cf_name: &str,
        key: &[u8],
    ) -> Result<Option<T>> {
        match self.get_raw_for_update(cf_name, key)? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Stages a serializable value.
    pub fn put<T: Serialize>(&self, cf_name: &str, key: &[u8], value: &T) -> Result<()> {
        let cf = self.handle.cf(cf_name)?;
        let bytes = encode(value)?;
        self.txn
            .put_cf(&cf, key, bytes)
            .map_err(|e| db_error("Failed to stage write", e))
    }

    /// Stages a deletion.
    pub fn delete(&self, cf_name: &str, key: &[u8]) -> Result<()> {
        let cf = self.handle.cf(cf_name)?;
        self.txn
            .delete_cf(&cf, key)
            .map_err(|e| db_error("Failed to stage delete", e))
    }

    /// Commits every staged write atomically and releases the locks.
    pub fn commit(self) -> Result<()> {
        self.txn
            .commit()
            .map_err(|e| db_error("Failed to commit transaction", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use tempfile::TempDir;

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    struct Counter {
        label: String,
        value: u64,
    }

    fn create_test_db() -> (RocksDbHandle, TempDir) {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("test_db");
        let config = RocksDbConfig::default();
        let db =
            RocksDbHandle::open(&db_path, &config, &["data", "meta"]).expect("Failed to open db");
        (db, temp_dir)
    }

    #[test]
    fn test_composite_key() {
        let key = composite_key(&id_key(1), &id_key(2));
        assert_eq!(key.len(), 17);
        assert_eq!(key[8], b':');
        assert_eq!(key_id(&key), Some(1));
    }

    #[test]
    fn test_id_key_orders_numerically() {
        assert!(id_key(2) < id_key(10));
        assert!(id_key(255) < id_key(256));
        assert_eq!(key_id(&id_key(u64::MAX)), Some(u64::MAX));
        assert_eq!(key_id(b"short"), None);
    }

    #[test]
    fn test_put_and_get() {
        let (db, _temp) = create_test_db();

        let data = Counter {
            label: "likes".to_string(),
            value: 12345,
        };

        db.put("data", b"key1", &data).unwrap();

        let loaded: Counter = db.get("data", b"key1").unwrap().unwrap();
        assert_eq!(loaded, data);
        assert!(db.exists("data", b"key1").unwrap());
        assert!(!db.exists("meta", b"key1").unwrap());
    }

    #[test]
    fn test_prefix_iterate_and_count() {
        let (db, _temp) = create_test_db();

        db.put("data", b"prefix1:a", &1u32).unwrap();
        db.put("data", b"prefix1:b", &2u32).unwrap();
        db.put("data", b"prefix2:a", &3u32).unwrap();

        let found: Vec<u32> = db.prefix_collect("data", b"prefix1:").unwrap();
        assert_eq!(found, vec![1, 2]);
        assert_eq!(db.prefix_count("data", b"prefix2:").unwrap(), 1);
        assert_eq!(db.prefix_count("data", b"prefix3:").unwrap(), 0);
    }

    #[test]
    fn test_reverse_iteration_and_last_key() {
        let (db, _temp) = create_test_db();
        assert_eq!(db.last_key("data").unwrap(), None);

        for id in [3u64, 1, 2] {
            db.put("data", &id_key(id), &id).unwrap();
        }

        let mut seen = Vec::new();
        db.iterate_reverse("data", |key, _| {
            seen.push(key_id(key).unwrap());
            true
        })
        .unwrap();
        assert_eq!(seen, vec![3, 2, 1]);
        assert_eq!(db.last_key("data").unwrap(), Some(id_key(3).to_vec()));
    }

    #[test]
    fn test_transaction_commit_and_rollback() {
        let (db, _temp) = create_test_db();

        let txn = db.transaction();
        assert_eq!(txn.get_for_update::<u64>("meta", b"n").unwrap(), None);
        txn.put("meta", b"n", &1u64).unwrap();
        txn.commit().unwrap();
        assert_eq!(db.get::<u64>("meta", b"n").unwrap(), Some(1));

        {
            let txn = db.transaction();
            txn.put("meta", b"n", &2u64).unwrap();
            txn.delete("meta", b"n").unwrap();
            // dropped without commit
        }
        assert_eq!(db.get::<u64>("meta", b"n").unwrap(), Some(1));
    }

    #[test]
    fn test_server_config() {
        let config = RocksDbConfig::for_server();
        assert_eq!(config.max_open_files, 256);
        assert_eq!(config.max_wal_size, 64 * 1024 * 1024);
    }
}
