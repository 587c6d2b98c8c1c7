//! Geo Cache Store
//!
//! Durable key/value store for geolocation data, persisted in RocksDB so
//! lookups against rate-limited external services survive restarts.
//! Holds one entry per peer IP and a single entry with every resolved
//! coordinate. Entries are never evicted.

mod storage;

pub use storage::GeoCacheStore;

/// Key of the entry holding the full coordinate mapping
pub const COORDINATE_CACHE_KEY: &str = "__geoCoordinateCache";
