//! Geo Cache Storage (RocksDB)
//!
//! Every value is stored in one canonical form: a JSON document, written
//! synchronously so a completed `set` survives a crash.

use rocksdb::{IteratorMode, Options, WriteOptions, DB};
use std::path::Path;
use tracing::{debug, info};

use super::COORDINATE_CACHE_KEY;
use crate::error::{PeerMapError, Result};
use crate::types::{CoordinateCache, GeoRecord};

/// Durable key/value cache backed by RocksDB
///
/// Shared across poll cycles and in-flight lookups through an `Arc`.
/// Writes to distinct keys never interfere; concurrent writes to the same
/// key are last-writer-wins.
pub struct GeoCacheStore {
    db: DB,
}

impl GeoCacheStore {
    /// Open or create the store at the given path
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.set_max_open_files(100);
        opts.set_keep_log_file_num(3);

        let db = DB::open(&opts, path.as_ref())?;
        let store = Self { db };

        info!(
            "📦 Geo cache opened with {} cached IPs, {} resolved locations",
            store.ip_entry_count(),
            store.load_coordinates()?.len()
        );

        Ok(store)
    }

    /// Read the raw JSON stored under `key`
    pub fn get(&self, key: &str) -> Result<Option<String>> {
        match self.db.get(key.as_bytes())? {
            Some(bytes) => String::from_utf8(bytes)
                .map(Some)
                .map_err(|_| PeerMapError::CorruptEntry { key: key.to_string() }),
            None => Ok(None),
        }
    }

    /// Write raw JSON under `key`, durably
    pub fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut write_opts = WriteOptions::default();
        write_opts.set_sync(true);

        self.db.put_opt(key.as_bytes(), value.as_bytes(), &write_opts)?;
        Ok(())
    }

    /// Cached geolocation for an IP
    pub fn get_geo(&self, ip: &str) -> Result<Option<GeoRecord>> {
        self.get(ip)?.map(GeoRecord::parse).transpose()
    }

    /// Cache the geolocation for an IP, stored as the service's response body
    pub fn set_geo(&self, ip: &str, geo: &GeoRecord) -> Result<()> {
        self.set(ip, geo.body())?;
        debug!("Cached geolocation for {}", ip);
        Ok(())
    }

    /// Full coordinate mapping, empty if nothing was resolved yet
    pub fn load_coordinates(&self) -> Result<CoordinateCache> {
        match self.get(COORDINATE_CACHE_KEY)? {
            Some(json) => Ok(serde_json::from_str(&json)?),
            None => Ok(CoordinateCache::new()),
        }
    }

    /// Replace the coordinate mapping in a single write
    pub fn save_coordinates(&self, coordinates: &CoordinateCache) -> Result<()> {
        let json = serde_json::to_string(coordinates)?;
        self.set(COORDINATE_CACHE_KEY, &json)
    }

    /// Number of cached IP entries
    pub fn ip_entry_count(&self) -> usize {
        self.db
            .iterator(IteratorMode::Start)
            .filter_map(|item| item.ok())
            .filter(|(key, _)| &key[..] != COORDINATE_CACHE_KEY.as_bytes())
            .count()
    }

    /// Flush all changes to disk
    pub fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }
}
