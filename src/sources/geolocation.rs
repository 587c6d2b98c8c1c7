//! IP geolocation client (ipinfo-compatible)

use async_trait::async_trait;

use super::{ensure_success, join_url, IpGeolocator};
use crate::error::Result;
use crate::types::GeoRecord;

/// Looks up `GET <base>/<ip>/json`
pub struct IpInfoClient {
    client: reqwest::Client,
    base_url: String,
}

impl IpInfoClient {
    pub fn new(client: reqwest::Client, base_url: String) -> Self {
        Self { client, base_url }
    }
}

#[async_trait]
impl IpGeolocator for IpInfoClient {
    async fn locate(&self, ip: &str) -> Result<GeoRecord> {
        let url = join_url(&self.base_url, &format!("{}/json", ip));

        let response = self.client.get(&url).send().await?;
        let body = ensure_success(response)?.text().await?;
        GeoRecord::parse(body)
    }
}
