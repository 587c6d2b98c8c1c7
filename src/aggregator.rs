//! Aggregator
//!
//! Turns a located peer list and the coordinate cache into the version
//! distribution, heat map and location ranking views.
//!
//! Heat weights are nonlinear: the first peer at a location weighs 1 and
//! every further peer adds `HEAT_WEIGHT_INCREMENT`.

use std::collections::HashMap;
use tracing::debug;

use crate::types::{CoordinateCache, HeatPoint, Peer, RankingRow, VersionBar};

/// Weight added per additional peer at a location
pub const HEAT_WEIGHT_INCREMENT: u64 = 5000;

/// Entries kept in the ranking and version lists
pub const TOP_ENTRIES: usize = 10;

/// Histogram bucket for a peer's client version
///
/// Uses `version_short`, falling back to `version`, cut before any
/// `(commit date)` annotation.
pub fn version_bucket(peer: &Peer) -> Option<String> {
    [peer.version_short.as_str(), peer.version.as_str()]
        .into_iter()
        .map(|v| v.split('(').next().unwrap_or_default().trim())
        .find(|v| !v.is_empty())
        .map(str::to_string)
}

/// Peer counts per version bucket, in first-seen order
#[derive(Debug, Default)]
pub struct VersionHistogram {
    buckets: Vec<(String, u64)>,
    index: HashMap<String, usize>,
}

impl VersionHistogram {
    pub fn from_peers(peers: &[Peer]) -> Self {
        let mut histogram = Self::default();
        for bucket in peers.iter().filter_map(version_bucket) {
            histogram.record(bucket);
        }
        histogram
    }

    pub fn record(&mut self, bucket: String) {
        match self.index.get(&bucket) {
            Some(&i) => self.buckets[i].1 += 1,
            None => {
                self.index.insert(bucket.clone(), self.buckets.len());
                self.buckets.push((bucket, 1));
            }
        }
    }

    #[cfg(test)]
    pub fn count(&self, bucket: &str) -> u64 {
        self.index.get(bucket).map(|&i| self.buckets[i].1).unwrap_or(0)
    }

    /// Sum of all counts
    #[cfg(test)]
    pub fn total(&self) -> u64 {
        self.buckets.iter().map(|(_, count)| count).sum()
    }

    /// Most common versions, ties in first-seen order
    pub fn top(&self, n: usize) -> Vec<VersionBar> {
        let mut bars: Vec<VersionBar> = self
            .buckets
            .iter()
            .map(|(version, value)| VersionBar { version: version.clone(), value: *value })
            .collect();
        bars.sort_by(|a, b| b.value.cmp(&a.value));
        bars.truncate(n);
        bars
    }
}

/// Per-location row: coordinates, heat weight and peer count
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocationRow {
    pub key: String,
    pub city: String,
    pub country: String,
    pub lat: String,
    pub lon: String,
    pub weight: u64,
    pub count: u64,
}

/// Heat map and ranking data for one peer batch
#[derive(Debug, Default)]
pub struct LocationAggregate {
    rows: Vec<LocationRow>,
    index: HashMap<String, usize>,

    /// Peers skipped because their location has no coordinates yet
    pub unlocated: usize,
}

impl LocationAggregate {
    /// Group located peers by location
    ///
    /// Peers whose location is missing from the cache are skipped and
    /// counted in `unlocated`; the rest of the pass is unaffected.
    pub fn build(peers: &[Peer], coordinates: &CoordinateCache) -> Self {
        let mut aggregate = Self::default();

        for peer in peers {
            let Some((city, country)) = peer.location() else {
                continue;
            };
            let key = crate::types::location_key(city, country);

            if let Some(&i) = aggregate.index.get(&key) {
                let row = &mut aggregate.rows[i];
                row.weight += HEAT_WEIGHT_INCREMENT;
                row.count += 1;
                continue;
            }

            let Some(coordinate) = coordinates.get(&key) else {
                debug!("Coordinates for {} not resolved yet, skipping {}", key, peer.ip);
                aggregate.unlocated += 1;
                continue;
            };

            aggregate.index.insert(key.clone(), aggregate.rows.len());
            aggregate.rows.push(LocationRow {
                key,
                city: city.to_string(),
                country: country.to_string(),
                lat: coordinate.lat.clone(),
                lon: coordinate.lon.clone(),
                weight: 1,
                count: 1,
            });
        }

        aggregate
    }

    #[cfg(test)]
    pub fn row(&self, key: &str) -> Option<&LocationRow> {
        self.index.get(key).map(|&i| &self.rows[i])
    }

    /// Number of distinct locations
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// One `[lat, lon, weight]` point per location
    pub fn heat_points(&self) -> Vec<HeatPoint> {
        self.rows
            .iter()
            .map(|row| HeatPoint(row.lat.clone(), row.lon.clone(), row.weight))
            .collect()
    }

    /// Busiest locations, ties in first-seen order
    pub fn top_rankings(&self, n: usize) -> Vec<RankingRow> {
        let mut rankings: Vec<RankingRow> = self
            .rows
            .iter()
            .map(|row| RankingRow {
                region: row.country.clone(),
                value: row.count,
                label: row.city.clone(),
            })
            .collect();
        rankings.sort_by(|a, b| b.value.cmp(&a.value));
        rankings.truncate(n);
        rankings
    }
}
