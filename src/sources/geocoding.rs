//! Forward geocoding client (Nominatim-compatible)

use async_trait::async_trait;
use serde::Deserialize;

use super::{ensure_success, join_url, Geocoder};
use crate::error::{PeerMapError, Result};
use crate::types::Coordinate;

/// Searches `GET <base>/search?q=<city>,<country>&format=json`
pub struct NominatimClient {
    client: reqwest::Client,
    base_url: String,
}

/// The only fields used from a search hit
#[derive(Debug, Deserialize)]
struct Place {
    lat: String,
    lon: String,
}

impl Place {
    fn is_numeric(&self) -> bool {
        self.lat.trim().parse::<f64>().is_ok() && self.lon.trim().parse::<f64>().is_ok()
    }
}

impl NominatimClient {
    pub fn new(client: reqwest::Client, base_url: String) -> Self {
        Self { client, base_url }
    }
}

#[async_trait]
impl Geocoder for NominatimClient {
    async fn search(&self, city: &str, country: &str) -> Result<Vec<Coordinate>> {
        let url = join_url(&self.base_url, "search");
        let query = format!("{},{}", city, country);

        let response = self
            .client
            .get(&url)
            .query(&[("q", query.as_str()), ("format", "json")])
            .send()
            .await?;
        let places: Vec<Place> = ensure_success(response)?.json().await?;
        let total = places.len();

        let coordinates: Vec<Coordinate> = places
            .into_iter()
            .filter(Place::is_numeric)
            .map(|place| Coordinate { lat: place.lat, lon: place.lon })
            .collect();

        if total > 0 && coordinates.is_empty() {
            return Err(PeerMapError::MalformedResponse {
                source_name: "geocoder",
                reason: format!("no usable coordinates in {} hits for {}", total, query),
            });
        }

        Ok(coordinates)
    }
}
