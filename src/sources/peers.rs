//! Peer list endpoint client

use async_trait::async_trait;
use tracing::{debug, warn};

use super::{ensure_success, join_url, PeerSource};
use crate::error::Result;
use crate::types::Peer;

/// Fetches `GET <base>/peer?network=<name>`
pub struct HttpPeerSource {
    client: reqwest::Client,
    base_url: String,
}

impl HttpPeerSource {
    pub fn new(client: reqwest::Client, base_url: String) -> Self {
        Self { client, base_url }
    }
}

#[async_trait]
impl PeerSource for HttpPeerSource {
    async fn fetch_peers(&self, network: &str) -> Result<Vec<Peer>> {
        let url = join_url(&self.base_url, "peer");

        let response = self
            .client
            .get(&url)
            .query(&[("network", network)])
            .send()
            .await?;
        let entries: Vec<serde_json::Value> = ensure_success(response)?.json().await?;
        let total = entries.len();

        // One malformed record must not hide the rest of the network
        let peers: Vec<Peer> = entries
            .into_iter()
            .filter_map(|entry| match serde_json::from_value(entry) {
                Ok(peer) => Some(peer),
                Err(e) => {
                    warn!("Skipping malformed peer entry: {}", e);
                    None
                }
            })
            .collect();

        debug!("Fetched {}/{} peers for network {}", peers.len(), total, network);
        Ok(peers)
    }
}
