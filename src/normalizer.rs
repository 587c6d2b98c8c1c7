//! Peer Normalizer
//!
//! Fills in `country`/`city` for raw peers. Peers take one of two paths:
//!
//! - **Synchronous**: already annotated by the endpoint, or the IP is in the
//!   geo cache. These are returned in `ready` and published this cycle.
//! - **Pending**: cache miss. A geolocation lookup is spawned and not
//!   awaited; the peer is left out of this cycle's publish. When the lookup
//!   lands the result is cached, so the peer is published from the next
//!   cycle on. A failed lookup leaves the cache untouched and the peer is
//!   retried by the next cycle.
//!
//! A peer first seen in a cycle appears one cycle later, never in the
//! snapshot that triggered its lookup.

use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::api::Metrics;
use crate::error::Result;
use crate::sources::IpGeolocator;
use crate::store::GeoCacheStore;
use crate::types::Peer;

/// Outcome of normalizing one peer batch
pub struct Normalized {
    /// Located peers, ready to publish
    pub ready: Vec<Peer>,

    /// Geolocation lookups spawned for cache misses
    pub pending: PendingLookups,

    /// Peers whose cached geolocation lacks a country or city
    pub unknown: usize,
}

/// Handles of in-flight geolocation lookups
///
/// Dropping this detaches the lookups; they still complete and fill the
/// cache.
#[derive(Default)]
pub struct PendingLookups {
    handles: Vec<JoinHandle<Option<Peer>>>,
}

impl PendingLookups {
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Wait for every lookup and return the peers they located
    #[cfg(test)]
    pub async fn settle(self) -> Vec<Peer> {
        let mut located = Vec::new();
        for handle in self.handles {
            if let Ok(Some(peer)) = handle.await {
                located.push(peer);
            }
        }
        located
    }
}

/// Joins raw peers against the geo cache
pub struct PeerNormalizer {
    store: Arc<GeoCacheStore>,
    geolocator: Arc<dyn IpGeolocator>,

    /// IPs with a lookup in flight, shared by overlapping cycles
    in_flight: Arc<Mutex<HashSet<String>>>,

    metrics: Arc<Metrics>,
}

impl PeerNormalizer {
    pub fn new(
        store: Arc<GeoCacheStore>,
        geolocator: Arc<dyn IpGeolocator>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            store,
            geolocator,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
            metrics,
        }
    }

    /// Split a raw batch into ready peers and pending lookups
    ///
    /// Fails only when the geo cache cannot be read.
    pub async fn normalize(&self, peers: Vec<Peer>) -> Result<Normalized> {
        let mut ready = Vec::with_capacity(peers.len());
        let mut pending = PendingLookups::default();
        let mut unknown = 0;

        for mut peer in peers {
            if peer.is_located() {
                ready.push(peer);
                continue;
            }

            match self.store.get_geo(&peer.ip)? {
                Some(geo) => {
                    self.metrics.inc_geo_cache_hits();
                    peer.apply_geo(geo.info());

                    if peer.is_located() {
                        ready.push(peer);
                    } else {
                        debug!("No city/country known for {}", peer.ip);
                        unknown += 1;
                    }
                }
                None => {
                    if !self.in_flight.lock().await.insert(peer.ip.clone()) {
                        debug!("Geolocation for {} already in flight", peer.ip);
                        continue;
                    }
                    pending.handles.push(self.spawn_lookup(peer));
                }
            }
        }

        Ok(Normalized { ready, pending, unknown })
    }

    /// Number of lookups currently in flight
    #[cfg(test)]
    pub async fn in_flight_count(&self) -> usize {
        self.in_flight.lock().await.len()
    }

    fn spawn_lookup(&self, mut peer: Peer) -> JoinHandle<Option<Peer>> {
        let store = self.store.clone();
        let geolocator = self.geolocator.clone();
        let in_flight = self.in_flight.clone();
        let metrics = self.metrics.clone();

        tokio::spawn(async move {
            metrics.inc_geolocation_lookups();
            let result = geolocator.locate(&peer.ip).await;

            let located = match result {
                Ok(geo) => {
                    if let Err(e) = store.set_geo(&peer.ip, &geo) {
                        warn!("Failed to cache geolocation for {}: {}", peer.ip, e);
                    }
                    peer.apply_geo(geo.info());
                    peer.is_located()
                }
                Err(e) => {
                    metrics.inc_geolocation_failures();
                    debug!("Geolocation for {} failed: {}", peer.ip, e);
                    false
                }
            };

            // Cache write happens before release: a concurrent cycle never
            // sees a miss for an IP that was just resolved
            in_flight.lock().await.remove(&peer.ip);

            located.then_some(peer)
        })
    }
}
