//! Units of crawl work handed out by the frontier

use sha2::{Digest, Sha256};
use url::Url;

/// One URL to capture, as produced by the frontier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    /// The URL to capture
    pub url: Url,

    /// Link distance from the seed this item was discovered from
    pub hop: u32,

    /// Hex SHA-256 of the URL, used to identify the item in logs
    pub hash: String,
}

impl Item {
    /// Creates an item, deriving its hash from the URL
    pub fn new(url: Url, hop: u32) -> Self {
        let hash = url_hash(&url);
        Self { url, hop, hash }
    }

    /// A seed item (hop 0)
    pub fn seed(url: Url) -> Self {
        Self::new(url, 0)
    }
}

/// Hex-encoded SHA-256 of the serialized URL
pub fn url_hash(url: &Url) -> String {
    hex::encode(Sha256::digest(url.as_str().as_bytes()))
}
