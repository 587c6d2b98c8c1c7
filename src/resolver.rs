//! Coordinate Resolver
//!
//! Makes sure every location present in a peer batch has coordinates in the
//! cache. Missing locations are geocoded one request at a time. Locations
//! without a hit stay unresolved and are retried every cycle.

use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::api::Metrics;
use crate::error::Result;
use crate::sources::Geocoder;
use crate::store::GeoCacheStore;
use crate::types::{location_key, CoordinateCache, Peer};

/// A distinct location found in a peer batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub key: String,
    pub city: String,
    pub country: String,
}

/// Distinct locations in first-occurrence order
pub fn distinct_locations(peers: &[Peer]) -> Vec<Location> {
    let mut seen = HashSet::new();

    peers
        .iter()
        .filter_map(|peer| peer.location())
        .filter_map(|(city, country)| {
            let key = location_key(city, country);
            seen.insert(key.clone()).then(|| Location {
                key,
                city: city.to_string(),
                country: country.to_string(),
            })
        })
        .collect()
}

/// Resolves missing coordinates into the geo cache
pub struct CoordinateResolver {
    store: Arc<GeoCacheStore>,
    geocoder: Arc<dyn Geocoder>,
    metrics: Arc<Metrics>,
}

impl CoordinateResolver {
    pub fn new(store: Arc<GeoCacheStore>, geocoder: Arc<dyn Geocoder>, metrics: Arc<Metrics>) -> Self {
        Self { store, geocoder, metrics }
    }

    /// Geocode the batch's unresolved locations and return the updated cache
    ///
    /// The cache is written once, after the whole batch, even when some
    /// locations stayed unresolved. Store errors abort the call.
    pub async fn resolve(&self, peers: &[Peer]) -> Result<CoordinateCache> {
        let mut coordinates = self.store.load_coordinates()?;

        let missing: Vec<Location> = distinct_locations(peers)
            .into_iter()
            .filter(|location| !coordinates.contains(&location.key))
            .collect();

        if missing.is_empty() {
            self.metrics.set_coordinate_cache_size(coordinates.len() as u64);
            return Ok(coordinates);
        }

        let mut resolved = 0;

        for location in &missing {
            self.metrics.inc_geocode_requests();

            match self.geocoder.search(&location.city, &location.country).await {
                Ok(hits) => match hits.into_iter().next() {
                    Some(coordinate) => {
                        debug!("Resolved {} to {},{}", location.key, coordinate.lat, coordinate.lon);
                        coordinates.insert(location.key.clone(), coordinate);
                        resolved += 1;
                    }
                    None => {
                        self.metrics.inc_geocode_misses();
                        debug!("No coordinates found for {}", location.key);
                    }
                },
                Err(e) => {
                    self.metrics.inc_geocode_misses();
                    warn!("Geocoding {} failed: {}", location.key, e);
                }
            }
        }

        self.store.save_coordinates(&coordinates)?;
        self.metrics.set_coordinate_cache_size(coordinates.len() as u64);

        info!(
            "🗺️  Resolved {}/{} new locations ({} cached)",
            resolved,
            missing.len(),
            coordinates.len()
        );

        Ok(coordinates)
    }
}
