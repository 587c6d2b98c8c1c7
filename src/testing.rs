//! In-memory collaborators for unit tests

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::error::{PeerMapError, Result};
use crate::sources::{Geocoder, IpGeolocator, PeerSource};
use crate::types::{Coordinate, GeoRecord, LastSeen, Peer};

pub fn peer(id: u64, ip: &str, version_short: &str, secs: u64) -> Peer {
    Peer {
        id,
        ip: ip.to_string(),
        version: format!("{} (bd8937b 2023-04-19)", version_short),
        version_short: version_short.to_string(),
        address: format!("/ip4/{}/tcp/8115", ip),
        last_seen: LastSeen { secs_since_epoch: secs, nanos_since_epoch: 0 },
        country: None,
        city: None,
    }
}

pub fn located_peer(id: u64, ip: &str, city: &str, country: &str) -> Peer {
    let mut p = peer(id, ip, "0.109.0", 100 + id);
    p.city = Some(city.to_string());
    p.country = Some(country.to_string());
    p
}

pub fn geo(city: &str, country: &str) -> GeoRecord {
    let body = serde_json::json!({ "city": city, "country": country }).to_string();
    GeoRecord::parse(body).unwrap()
}

pub fn coordinate(lat: &str, lon: &str) -> Coordinate {
    Coordinate { lat: lat.to_string(), lon: lon.to_string() }
}

/// Peer source returning a replaceable fixed list
#[derive(Default)]
pub struct FakePeerSource {
    peers: Mutex<Vec<Peer>>,
    pub requests: Mutex<Vec<String>>,
}

impl FakePeerSource {
    pub fn new(peers: Vec<Peer>) -> Self {
        Self { peers: Mutex::new(peers), requests: Mutex::new(Vec::new()) }
    }
}

#[async_trait]
impl PeerSource for FakePeerSource {
    async fn fetch_peers(&self, network: &str) -> Result<Vec<Peer>> {
        self.requests.lock().unwrap().push(network.to_string());
        Ok(self.peers.lock().unwrap().clone())
    }
}

/// Geolocator answering from a fixed table; unknown IPs fail
#[derive(Default)]
pub struct FakeGeolocator {
    answers: HashMap<String, GeoRecord>,
    pub calls: AtomicUsize,
}

impl FakeGeolocator {
    pub fn new(answers: &[(&str, GeoRecord)]) -> Self {
        Self {
            answers: answers
                .iter()
                .map(|(ip, geo)| (ip.to_string(), geo.clone()))
                .collect(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IpGeolocator for FakeGeolocator {
    async fn locate(&self, ip: &str) -> Result<GeoRecord> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.answers.get(ip).cloned().ok_or(PeerMapError::UnexpectedStatus {
            status: 404,
            url: format!("fake://{}/json", ip),
        })
    }
}

/// Geocoder answering from a fixed table; unknown locations return no hits
#[derive(Default)]
pub struct FakeGeocoder {
    answers: HashMap<String, Vec<Coordinate>>,
    pub queries: Mutex<Vec<String>>,
}

impl FakeGeocoder {
    pub fn new(answers: &[(&str, Vec<Coordinate>)]) -> Self {
        Self {
            answers: answers
                .iter()
                .map(|(key, hits)| (key.to_string(), hits.clone()))
                .collect(),
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn queried(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl Geocoder for FakeGeocoder {
    async fn search(&self, city: &str, country: &str) -> Result<Vec<Coordinate>> {
        let key = format!("{},{}", city, country);
        self.queries.lock().unwrap().push(key.clone());
        Ok(self.answers.get(&key).cloned().unwrap_or_default())
    }
}
