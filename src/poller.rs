//! Poll Loop
//!
//! Runs fetch → normalize → resolve coordinates → aggregate on a fixed
//! interval and publishes the result into the shared `Dashboard`.
//!
//! A cycle publishes twice: the peer table as soon as peers are normalized,
//! then the map once coordinates are resolved. If the cycle fails in
//! between, the previous map stays in place.
//!
//! Every cycle runs as its own task. A slow cycle never delays the next
//! tick, so cycles may overlap and race on the geo cache (last writer wins).

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::aggregator::{LocationAggregate, VersionHistogram, TOP_ENTRIES};
use crate::api::Metrics;
use crate::error::Result;
use crate::normalizer::{Normalized, PeerNormalizer, PendingLookups};
use crate::resolver::CoordinateResolver;
use crate::sources::PeerSource;
use crate::types::{Dashboard, MapView, PeerTable};

/// Summary of one poll cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Peers returned by the endpoint
    pub fetched: usize,

    /// Peers in the published table
    pub published: usize,

    /// Geolocation lookups spawned this cycle
    pub pending: usize,

    /// Peers with a cached geolocation lacking country or city
    pub unknown: usize,

    /// Distinct locations on the map
    pub locations: usize,

    /// Located peers left off the map
    pub unlocated: usize,
}

/// Result of a completed cycle
pub struct CycleOutcome {
    pub report: CycleReport,

    /// Lookups still running; dropping them is fine
    pub pending: PendingLookups,
}

/// Drives the pipeline and owns the published views
pub struct Poller {
    source: Arc<dyn PeerSource>,
    normalizer: PeerNormalizer,
    resolver: CoordinateResolver,
    dashboard: Arc<RwLock<Dashboard>>,
    metrics: Arc<Metrics>,
}

impl Poller {
    pub fn new(
        source: Arc<dyn PeerSource>,
        normalizer: PeerNormalizer,
        resolver: CoordinateResolver,
        dashboard: Arc<RwLock<Dashboard>>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            source,
            normalizer,
            resolver,
            dashboard,
            metrics,
        }
    }

    /// Shared handle to the published views
    pub fn dashboard(&self) -> Arc<RwLock<Dashboard>> {
        self.dashboard.clone()
    }

    /// Run one poll cycle for `network`
    ///
    /// Collaborator and store failures abort the cycle; whatever was
    /// already published stays.
    pub async fn run_cycle(&self, network: &str) -> Result<CycleOutcome> {
        let peers = self.source.fetch_peers(network).await?;
        let fetched = peers.len();

        // Versions cover every fetched peer, located or not
        let versions = VersionHistogram::from_peers(&peers).top(TOP_ENTRIES);

        let Normalized { mut ready, pending, unknown } = self.normalizer.normalize(peers).await?;
        ready.sort_by(|a, b| b.last_seen.cmp(&a.last_seen));

        let published = ready.len();
        self.metrics.set_peers_published(published as u64);
        self.metrics.set_pending_lookups(pending.len() as u64);

        {
            let mut dashboard = self.dashboard.write().await;
            dashboard.table = Some(PeerTable {
                network: network.to_string(),
                peers: ready.clone(),
                total: published,
                versions,
                pending_lookups: pending.len(),
                updated_at: Utc::now(),
            });
        }

        let coordinates = self.resolver.resolve(&ready).await?;
        let aggregate = LocationAggregate::build(&ready, &coordinates);
        self.metrics.set_unlocated_peers(aggregate.unlocated as u64);

        {
            let mut dashboard = self.dashboard.write().await;
            dashboard.map = Some(MapView {
                network: network.to_string(),
                heat_points: aggregate.heat_points(),
                rankings: aggregate.top_rankings(TOP_ENTRIES),
                locations: aggregate.len(),
                unlocated: aggregate.unlocated,
                updated_at: Utc::now(),
            });
        }

        let report = CycleReport {
            fetched,
            published,
            pending: pending.len(),
            unknown,
            locations: aggregate.len(),
            unlocated: aggregate.unlocated,
        };

        Ok(CycleOutcome { report, pending })
    }
}

/// Poll on a fixed interval, and immediately whenever the network changes
///
/// Returns when the network sender is dropped. Cycles already spawned keep
/// running to completion.
pub async fn run_poll_loop(
    poller: Arc<Poller>,
    mut network_rx: watch::Receiver<String>,
    interval_secs: u64,
) {
    info!("🔄 Starting poll loop (every {}s)", interval_secs);

    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));

    loop {
        tokio::select! {
            _ = interval.tick() => {}
            changed = network_rx.changed() => {
                if changed.is_err() {
                    info!("Network selector closed, stopping poll loop");
                    break;
                }
                info!("🔀 Switched to network {}", *network_rx.borrow());
                interval.reset();
            }
        }

        let network = network_rx.borrow().clone();
        spawn_cycle(poller.clone(), network);
    }
}

/// Run a cycle in its own task, logging instead of propagating failures
fn spawn_cycle(poller: Arc<Poller>, network: String) -> JoinHandle<()> {
    tokio::spawn(async move {
        match poller.run_cycle(&network).await {
            Ok(outcome) => {
                poller.metrics.inc_poll_cycles();
                let report = outcome.report;
                info!(
                    "📊 {}: {}/{} peers published, {} lookups pending, {} locations, {} unlocated",
                    network,
                    report.published,
                    report.fetched,
                    report.pending,
                    report.locations,
                    report.unlocated
                );
                if report.unknown > 0 {
                    debug!("{} peers have no known city/country", report.unknown);
                }
                // outcome.pending is dropped here: lookups finish in the background
            }
            Err(e) => {
                poller.metrics.inc_poll_failures();
                warn!("Poll cycle for {} failed: {}", network, e);
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PeerMapError;
    use crate::store::{GeoCacheStore, COORDINATE_CACHE_KEY};
    use crate::testing::{coordinate, geo, peer, FakeGeocoder, FakeGeolocator, FakePeerSource};
    use crate::types::{HeatPoint, Peer, RankingRow};
    use async_trait::async_trait;
    use tempfile::{tempdir, TempDir};

    struct Harness {
        _dir: TempDir,
        store: Arc<GeoCacheStore>,
        source: Arc<FakePeerSource>,
        geolocator: Arc<FakeGeolocator>,
        geocoder: Arc<FakeGeocoder>,
        poller: Arc<Poller>,
    }

    fn harness(peers: Vec<Peer>, geolocator: FakeGeolocator, geocoder: FakeGeocoder) -> Harness {
        let dir = tempdir().unwrap();
        let store = Arc::new(GeoCacheStore::open(dir.path()).unwrap());
        let metrics = Arc::new(Metrics::new());
        let source = Arc::new(FakePeerSource::new(peers));
        let geolocator = Arc::new(geolocator);
        let geocoder = Arc::new(geocoder);

        let poller = Arc::new(Poller::new(
            source.clone(),
            PeerNormalizer::new(store.clone(), geolocator.clone(), metrics.clone()),
            CoordinateResolver::new(store.clone(), geocoder.clone(), metrics.clone()),
            Arc::new(RwLock::new(Dashboard::default())),
            metrics,
        ));

        Harness { _dir: dir, store, source, geolocator, geocoder, poller }
    }

    #[tokio::test]
    async fn test_new_peers_published_on_next_cycle() {
        let h = harness(
            vec![peer(1, "1.1.1.1", "0.109.0", 100), peer(2, "2.2.2.2", "0.109.0", 200)],
            FakeGeolocator::new(&[("1.1.1.1", geo("NYC", "US")), ("2.2.2.2", geo("LA", "US"))]),
            FakeGeocoder::new(&[
                ("NYC,US", vec![coordinate("40.71", "-74.00")]),
                ("LA,US", vec![coordinate("34.05", "-118.24")]),
            ]),
        );

        let first = h.poller.run_cycle("mirana").await.unwrap();
        assert_eq!(h.geolocator.call_count(), 2);
        assert_eq!(first.report.published, 0);
        {
            let dashboard = h.poller.dashboard();
            let dashboard = dashboard.read().await;
            let table = dashboard.table.as_ref().unwrap();
            assert!(table.peers.is_empty());
            assert_eq!(table.pending_lookups, 2);
            // Versions count peers still waiting on geolocation
            assert_eq!(table.versions[0].value, 2);
        }

        first.pending.settle().await;

        let second = h.poller.run_cycle("mirana").await.unwrap();
        assert_eq!(second.report.published, 2);
        assert_eq!(second.report.pending, 0);
        assert_eq!(h.geolocator.call_count(), 2);

        let dashboard = h.poller.dashboard();
        let dashboard = dashboard.read().await;
        let table = dashboard.table.as_ref().unwrap();
        let ips: Vec<&str> = table.peers.iter().map(|p| p.ip.as_str()).collect();
        assert_eq!(ips, vec!["2.2.2.2", "1.1.1.1"]);
        assert_eq!(table.total, 2);

        let map = dashboard.map.as_ref().unwrap();
        assert_eq!(map.locations, 2);
        assert_eq!(map.unlocated, 0);
        assert_eq!(h.geocoder.queried(), vec!["LA,US", "NYC,US"]);
    }

    #[tokio::test]
    async fn test_map_view_groups_same_city() {
        let h = harness(
            vec![peer(1, "1.1.1.1", "0.109.0", 100), peer(2, "2.2.2.2", "0.109.0", 200)],
            FakeGeolocator::default(),
            FakeGeocoder::new(&[("NYC,US", vec![coordinate("40.71", "-74.00")])]),
        );
        h.store.set_geo("1.1.1.1", &geo("NYC", "US")).unwrap();
        h.store.set_geo("2.2.2.2", &geo("NYC", "US")).unwrap();

        let outcome = h.poller.run_cycle("mirana").await.unwrap();
        assert_eq!(outcome.report.locations, 1);
        assert_eq!(h.geolocator.call_count(), 0);

        let dashboard = h.poller.dashboard();
        let dashboard = dashboard.read().await;
        let map = dashboard.map.as_ref().unwrap();
        assert_eq!(
            map.rankings,
            vec![RankingRow { region: "US".to_string(), value: 2, label: "NYC".to_string() }]
        );
        assert_eq!(map.heat_points, vec![HeatPoint("40.71".to_string(), "-74.00".to_string(), 5001)]);
    }

    #[tokio::test]
    async fn test_unresolved_coordinates_leave_peer_off_map() {
        let h = harness(
            vec![peer(1, "1.1.1.1", "0.109.0", 100)],
            FakeGeolocator::default(),
            FakeGeocoder::default(),
        );
        h.store.set_geo("1.1.1.1", &geo("Atlantis", "ZZ")).unwrap();

        let outcome = h.poller.run_cycle("mirana").await.unwrap();

        assert_eq!(outcome.report.published, 1);
        assert_eq!(outcome.report.locations, 0);
        assert_eq!(outcome.report.unlocated, 1);
    }

    #[tokio::test]
    async fn test_store_error_keeps_previous_map() {
        let h = harness(
            vec![peer(1, "1.1.1.1", "0.109.0", 100)],
            FakeGeolocator::default(),
            FakeGeocoder::new(&[("NYC,US", vec![coordinate("40.71", "-74.00")])]),
        );
        h.store.set_geo("1.1.1.1", &geo("NYC", "US")).unwrap();

        h.poller.run_cycle("mirana").await.unwrap();
        let (previous_map_at, previous_points) = {
            let dashboard = h.poller.dashboard();
            let dashboard = dashboard.read().await;
            let map = dashboard.map.as_ref().unwrap();
            (map.updated_at, map.heat_points.clone())
        };

        h.store.set(COORDINATE_CACHE_KEY, "not json").unwrap();
        let err = h.poller.run_cycle("pudge").await.err().unwrap();
        assert!(matches!(err, PeerMapError::Serialization(_)));

        let dashboard = h.poller.dashboard();
        let dashboard = dashboard.read().await;

        // Table from the failed cycle is already out
        let table = dashboard.table.as_ref().unwrap();
        assert_eq!(table.network, "pudge");
        assert_eq!(table.total, 1);

        let map = dashboard.map.as_ref().unwrap();
        assert_eq!(map.network, "mirana");
        assert_eq!(map.updated_at, previous_map_at);
        assert_eq!(map.heat_points, previous_points);
    }

    #[tokio::test]
    async fn test_failed_fetch_keeps_previous_views() {
        struct FailingSource;

        #[async_trait]
        impl PeerSource for FailingSource {
            async fn fetch_peers(&self, _network: &str) -> Result<Vec<Peer>> {
                Err(PeerMapError::UnexpectedStatus { status: 503, url: "fake://peer".to_string() })
            }
        }

        let dir = tempdir().unwrap();
        let store = Arc::new(GeoCacheStore::open(dir.path()).unwrap());
        let metrics = Arc::new(Metrics::new());
        let poller = Poller::new(
            Arc::new(FailingSource),
            PeerNormalizer::new(store.clone(), Arc::new(FakeGeolocator::default()), metrics.clone()),
            CoordinateResolver::new(store, Arc::new(FakeGeocoder::default()), metrics.clone()),
            Arc::new(RwLock::new(Dashboard::default())),
            metrics,
        );

        assert!(poller.run_cycle("mirana").await.is_err());
        let dashboard = poller.dashboard();
        let dashboard = dashboard.read().await;
        assert!(dashboard.table.is_none());
        assert!(dashboard.map.is_none());
    }

    #[tokio::test]
    async fn test_loop_polls_on_network_switch() {
        let h = harness(vec![], FakeGeolocator::default(), FakeGeocoder::default());
        let (network_tx, network_rx) = watch::channel("mirana".to_string());

        let handle = tokio::spawn(run_poll_loop(h.poller.clone(), network_rx, 3600));

        wait_for(|| h.source.requests.lock().unwrap().contains(&"mirana".to_string())).await;

        network_tx.send("pudge".to_string()).unwrap();
        wait_for(|| h.source.requests.lock().unwrap().contains(&"pudge".to_string())).await;

        drop(network_tx);
        handle.await.unwrap();

        let requests = h.source.requests.lock().unwrap().clone();
        assert_eq!(requests, vec!["mirana".to_string(), "pudge".to_string()]);
    }

    async fn wait_for(mut condition: impl FnMut() -> bool) {
        for _ in 0..500 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached in time");
    }
}
