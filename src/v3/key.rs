//! Key record returned by `Client::get`

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Snapshot of one key, or of a directory prefix
///
/// A directory has `dir == true`, an empty value and zero revisions.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Key {
    pub cluster_id: u64,

    pub name: String,

    pub dir: bool,

    pub value: String,

    /// Revision that created the key
    pub create_revision: i64,

    /// Revision of the last change
    pub mod_revision: i64,

    /// Number of changes since creation
    pub version: i64,

    /// Attached lease (zero = none)
    pub lease: i64,

    /// When the lease runs out
    pub expiration: Option<DateTime<Utc>>,

    /// Seconds left on the lease (zero = no lease)
    pub ttl: i64,
}
