//! Core types for the peer map
//!
//! Peer records as reported by the peer list endpoint, the cached
//! geolocation data joined onto them, and the views published after
//! every poll cycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

use crate::error::Result;

/// Deserialize an explicit `null` as the type's default
fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

// =============================================================================
// PEERS
// =============================================================================

/// Time of the most recent contact with a peer
///
/// Ordering compares seconds first, then the sub-second remainder.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LastSeen {
    #[serde(alias = "secs", alias = "secsSinceEpoch")]
    pub secs_since_epoch: u64,

    #[serde(default, alias = "nanos", alias = "nanosSinceEpoch")]
    pub nanos_since_epoch: u32,
}

/// One discovered network node as reported by the peer list endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Peer {
    #[serde(default, deserialize_with = "null_as_default")]
    pub id: u64,

    /// Network address, used as the geolocation cache key
    pub ip: String,

    /// Full client version, e.g. `0.109.0 (bd8937b 2023-04-19)`
    #[serde(default, deserialize_with = "null_as_default")]
    pub version: String,

    /// Short client version, e.g. `0.109.0`
    #[serde(default, alias = "versionShort", deserialize_with = "null_as_default")]
    pub version_short: String,

    /// Advertised address (opaque)
    #[serde(default, deserialize_with = "null_as_default")]
    pub address: String,

    #[serde(default, alias = "lastSeen", deserialize_with = "null_as_default")]
    pub last_seen: LastSeen,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
}

impl Peer {
    /// `(city, country)` when both are known and non-empty
    pub fn location(&self) -> Option<(&str, &str)> {
        let city = self.city.as_deref().filter(|c| !c.is_empty())?;
        let country = self.country.as_deref().filter(|c| !c.is_empty())?;
        Some((city, country))
    }

    pub fn is_located(&self) -> bool {
        self.location().is_some()
    }

    /// `"<city>,<country>"` grouping key, if the peer is located
    #[cfg(test)]
    pub fn location_key(&self) -> Option<String> {
        self.location()
            .map(|(city, country)| location_key(city, country))
    }

    /// Copy country and city from a geolocation result
    pub fn apply_geo(&mut self, geo: &GeoInfo) {
        self.country = geo.country.clone();
        self.city = geo.city.clone();
    }
}

/// Build the `"<city>,<country>"` key used to group peers geographically
pub fn location_key(city: &str, country: &str) -> String {
    format!("{},{}", city, country)
}

// =============================================================================
// GEO CACHE ENTRIES
// =============================================================================

/// Parsed view of an IP geolocation response
///
/// Fields other than `country` and `city` are collected into `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeoInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// A geolocation response as the service returned it
///
/// `body` is what gets cached, byte for byte; `info` is its parsed view.
#[derive(Debug, Clone, PartialEq)]
pub struct GeoRecord {
    body: String,
    info: GeoInfo,
}

impl GeoRecord {
    /// Parse a response body, rejecting bodies that are not a geolocation object
    pub fn parse(body: String) -> Result<Self> {
        let info = serde_json::from_str(&body)?;
        Ok(Self { body, info })
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn info(&self) -> &GeoInfo {
        &self.info
    }
}

/// Coordinates of a location, kept as the decimal strings the geocoder returned
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: String,
    pub lon: String,
}

/// Coordinates keyed by `"<city>,<country>"`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CoordinateCache(BTreeMap<String, Coordinate>);

impl CoordinateCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Coordinate> {
        self.0.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn insert(&mut self, key: String, coordinate: Coordinate) {
        self.0.insert(key, coordinate);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

// =============================================================================
// PRESENTATION OUTPUTS
// =============================================================================

/// One ranking entry: peers at a single city/country pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankingRow {
    /// Country
    pub region: String,

    /// Number of peers
    pub value: u64,

    /// City
    pub label: String,
}

/// Heat map point, serialized as `[lat, lon, weight]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeatPoint(pub String, pub String, pub u64);

/// One bar of the version distribution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionBar {
    pub version: String,
    pub value: u64,
}

/// Table view, published as soon as peers are normalized
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerTable {
    pub network: String,

    /// Located peers, most recently seen first
    pub peers: Vec<Peer>,

    pub total: usize,

    /// Top client versions across every fetched peer
    pub versions: Vec<VersionBar>,

    /// Peers whose geolocation was still in flight at publish time
    pub pending_lookups: usize,

    pub updated_at: DateTime<Utc>,
}

/// Map view, published once coordinates are resolved
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapView {
    pub network: String,

    pub heat_points: Vec<HeatPoint>,

    /// Busiest locations, top entries only
    pub rankings: Vec<RankingRow>,

    /// Distinct locations on the map
    pub locations: usize,

    /// Peers left off the map because their coordinates are unresolved
    pub unlocated: usize,

    pub updated_at: DateTime<Utc>,
}

/// Latest published views
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Dashboard {
    pub table: Option<PeerTable>,
    pub map: Option<MapView>,
}
