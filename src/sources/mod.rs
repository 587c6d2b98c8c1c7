//! External Collaborators
//!
//! The peer list endpoint, the IP geolocation service and the forward
//! geocoding service. Each sits behind an async trait so the pipeline can
//! run against any implementation; the HTTP implementations share one
//! `reqwest` client carrying the configured timeout and user agent.

mod geocoding;
mod geolocation;
mod peers;

pub use geocoding::NominatimClient;
pub use geolocation::IpInfoClient;
pub use peers::HttpPeerSource;

use async_trait::async_trait;
use std::time::Duration;

use crate::config::PeerMapConfig;
use crate::error::{PeerMapError, Result};
use crate::types::{Coordinate, GeoRecord, Peer};

/// Source of raw peer records for a network
#[async_trait]
pub trait PeerSource: Send + Sync {
    async fn fetch_peers(&self, network: &str) -> Result<Vec<Peer>>;
}

/// IP address to country/city lookup
///
/// The returned record carries the response body unchanged.
#[async_trait]
pub trait IpGeolocator: Send + Sync {
    async fn locate(&self, ip: &str) -> Result<GeoRecord>;
}

/// City/country to coordinate lookup
///
/// Returns every candidate the service found, best match first. An empty
/// list means the location is unknown to the service.
#[async_trait]
pub trait Geocoder: Send + Sync {
    async fn search(&self, city: &str, country: &str) -> Result<Vec<Coordinate>>;
}

/// Build the HTTP client shared by all collaborators
pub fn build_http_client(config: &PeerMapConfig) -> Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.request_timeout_secs))
        .user_agent(config.user_agent.clone())
        .build()?;
    Ok(client)
}

/// Reject non-2xx responses
fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if !status.is_success() {
        return Err(PeerMapError::UnexpectedStatus {
            status: status.as_u16(),
            url: response.url().to_string(),
        });
    }
    Ok(response)
}

/// Join a base URL and a path without doubling the slash
fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}
