//! Storage utilities and abstractions.
//!
//! This module provides shared storage infrastructure that can be used
//! across different parts of the codebase.
//!
//! ## Modules
//!
//! - `rocksdb`: Generic RocksDB utilities (configuration, handle, iteration, transactions)

pub mod rocksdb;

pub use self::rocksdb::{
    composite_key, id_key, key_id, prefixed_key, RocksDbConfig, RocksDbHandle, TxnHandle,
};
