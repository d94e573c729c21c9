//! Local caching for offline directory access.
//!
//! `CacheStore` keeps one `DirectoryPayload` plus its write time in a
//! `KeyValueStore`. On disk that is two files under the cache directory,
//! `offline_data.json` and `cache_timestamp.json`, each replaced atomically.
//! Freshness is decided by the caller (see `crate::freshness`).

pub mod error;
pub mod manager;
pub mod storage;

pub use error::CacheError;
pub use manager::{CacheEntry, CacheStore, PAYLOAD_KEY, TIMESTAMP_KEY};
pub use storage::{FileStore, KeyValueStore, MemoryStore};
