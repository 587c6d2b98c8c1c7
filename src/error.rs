//! Error types shared by the store, the external lookups and the poll loop.

/// Errors raised while polling, resolving or caching peer data
#[derive(Debug, thiserror::Error)]
pub enum PeerMapError {
    #[error("Storage error: {0}")]
    Storage(#[from] rocksdb::Error),

    #[error("Corrupt cache entry for key {key}")]
    CorruptEntry { key: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected HTTP status {status} from {url}")]
    UnexpectedStatus { status: u16, url: String },

    #[error("Malformed response from {source_name}: {reason}")]
    MalformedResponse {
        source_name: &'static str,
        reason: String,
    },
}

pub type Result<T> = std::result::Result<T, PeerMapError>;
