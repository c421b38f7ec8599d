//! Key record returned by `Client::get`

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::api::Response;

/// Snapshot of one key or directory
///
/// Each read produces a fresh snapshot. For a directory `value` is empty
/// and `ttl`/`expiration` describe the directory node itself.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Key {
    pub cluster_id: String,

    pub name: String,

    /// True if this is a directory
    pub dir: bool,

    pub value: String,

    pub created_index: u64,

    pub modified_index: u64,

    /// When the key expires, if it has a TTL
    pub expiration: Option<DateTime<Utc>>,

    /// Seconds left to live (zero = no TTL)
    pub ttl: i64,
}

impl Key {
    /// Build a key record from a response carrying a node
    pub(crate) fn from_response(resp: Response) -> Option<Self> {
        let node = resp.node?;
        Some(Self {
            cluster_id: resp.cluster_id,
            name: if node.key.is_empty() { "/".to_string() } else { node.key },
            dir: node.dir,
            value: if node.dir { String::new() } else { node.value },
            created_index: node.created_index,
            modified_index: node.modified_index,
            expiration: node.expiration,
            ttl: node.ttl,
        })
    }
}
