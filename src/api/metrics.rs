//! Metrics Collection
//!
//! Counters and gauges for the poll loop and the external lookups.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Metrics collector for the peer map
#[derive(Default)]
pub struct Metrics {
    /// Start time for uptime calculation
    start_time: Option<Instant>,

    /// Poll cycles that published a map view
    pub poll_cycles: AtomicU64,

    /// Poll cycles aborted by an error
    pub poll_failures: AtomicU64,

    /// Peers in the latest table view
    pub peers_published: AtomicU64,

    /// Peers whose geolocation was in flight at the latest publish
    pub pending_lookups: AtomicU64,

    /// Peers located from the geo cache
    pub geo_cache_hits: AtomicU64,

    /// IP geolocation requests issued
    pub geolocation_lookups: AtomicU64,

    /// IP geolocation requests that failed
    pub geolocation_failures: AtomicU64,

    /// Forward geocoding requests issued
    pub geocode_requests: AtomicU64,

    /// Forward geocoding requests without a usable hit
    pub geocode_misses: AtomicU64,

    /// Resolved locations in the coordinate cache
    pub coordinate_cache_size: AtomicU64,

    /// Peers left off the latest map view
    pub unlocated_peers: AtomicU64,
}

impl Metrics {
    /// Create new metrics collector
    pub fn new() -> Self {
        Self {
            start_time: Some(Instant::now()),
            ..Default::default()
        }
    }

    /// Get uptime in seconds
    pub fn uptime_secs(&self) -> u64 {
        self.start_time
            .map(|t| t.elapsed().as_secs())
            .unwrap_or(0)
    }

    pub fn inc_poll_cycles(&self) {
        self.poll_cycles.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_poll_failures(&self) {
        self.poll_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_geo_cache_hits(&self) {
        self.geo_cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_geolocation_lookups(&self) {
        self.geolocation_lookups.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_geolocation_failures(&self) {
        self.geolocation_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_geocode_requests(&self) {
        self.geocode_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_geocode_misses(&self) {
        self.geocode_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_peers_published(&self, count: u64) {
        self.peers_published.store(count, Ordering::Relaxed);
    }

    pub fn set_pending_lookups(&self, count: u64) {
        self.pending_lookups.store(count, Ordering::Relaxed);
    }

    pub fn set_coordinate_cache_size(&self, count: u64) {
        self.coordinate_cache_size.store(count, Ordering::Relaxed);
    }

    pub fn set_unlocated_peers(&self, count: u64) {
        self.unlocated_peers.store(count, Ordering::Relaxed);
    }

    /// Export metrics in Prometheus format
    pub fn to_prometheus(&self) -> String {
        let entries: [(&str, &str, &str, u64); 12] = [
            ("uptime_seconds", "gauge", "Peer map uptime in seconds", self.uptime_secs()),
            ("poll_cycles_total", "counter", "Completed poll cycles", self.load(&self.poll_cycles)),
            ("poll_failures_total", "counter", "Aborted poll cycles", self.load(&self.poll_failures)),
            ("peers_published", "gauge", "Peers in the latest table view", self.load(&self.peers_published)),
            ("pending_lookups", "gauge", "Geolocation lookups in flight at the latest publish", self.load(&self.pending_lookups)),
            ("geo_cache_hits_total", "counter", "Peers located from the geo cache", self.load(&self.geo_cache_hits)),
            ("geolocation_lookups_total", "counter", "IP geolocation requests issued", self.load(&self.geolocation_lookups)),
            ("geolocation_failures_total", "counter", "Failed IP geolocation requests", self.load(&self.geolocation_failures)),
            ("geocode_requests_total", "counter", "Forward geocoding requests issued", self.load(&self.geocode_requests)),
            ("geocode_misses_total", "counter", "Forward geocoding requests without a hit", self.load(&self.geocode_misses)),
            ("coordinate_cache_size", "gauge", "Resolved locations in the coordinate cache", self.load(&self.coordinate_cache_size)),
            ("unlocated_peers", "gauge", "Peers left off the latest map view", self.load(&self.unlocated_peers)),
        ];

        let mut output = String::new();
        for (name, kind, help, value) in entries {
            output.push_str(&format!(
                "# HELP kratos_peer_map_{name} {help}\n\
                 # TYPE kratos_peer_map_{name} {kind}\n\
                 kratos_peer_map_{name} {value}\n\n"
            ));
        }

        output
    }

    /// Export metrics as JSON
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "uptime_secs": self.uptime_secs(),
            "poll": {
                "cycles": self.load(&self.poll_cycles),
                "failures": self.load(&self.poll_failures),
            },
            "peers": {
                "published": self.load(&self.peers_published),
                "pending_lookups": self.load(&self.pending_lookups),
                "unlocated": self.load(&self.unlocated_peers),
            },
            "geolocation": {
                "cache_hits": self.load(&self.geo_cache_hits),
                "lookups": self.load(&self.geolocation_lookups),
                "failures": self.load(&self.geolocation_failures),
            },
            "geocoding": {
                "requests": self.load(&self.geocode_requests),
                "misses": self.load(&self.geocode_misses),
                "cached_locations": self.load(&self.coordinate_cache_size),
            },
        })
    }

    fn load(&self, counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }
}
