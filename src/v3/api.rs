//! KV API contract
//!
//! The handful of v3 calls the client is built on. Revisions replace the
//! legacy indices; there are no directories, only key prefixes.

use async_trait::async_trait;

use crate::error::Result;

/// A backend speaking the v3 KV and lease APIs
#[async_trait]
pub trait KvApi: Send + Sync {
    /// Read one key, or every key starting with `key` when `opts.prefix`
    async fn range(&self, key: &str, opts: RangeOptions) -> Result<RangeResult>;

    /// Unconditionally write a key
    async fn put(&self, key: &str, value: &str, lease: PutLease) -> Result<Header>;

    /// Write a key only if `cond` holds, in one transaction
    async fn put_if(&self, key: &str, value: &str, lease: PutLease, cond: Condition) -> Result<TxnResult>;

    /// Delete one key, or every key starting with `key` when `prefix`
    async fn delete_range(&self, key: &str, prefix: bool) -> Result<DeleteResult>;

    /// Grant a lease of `ttl` seconds and return its ID
    async fn lease_grant(&self, ttl: i64) -> Result<i64>;

    /// Seconds left on a lease; negative once it has expired
    async fn lease_ttl(&self, id: i64) -> Result<i64>;
}

#[async_trait]
impl<T: KvApi + ?Sized> KvApi for Box<T> {
    async fn range(&self, key: &str, opts: RangeOptions) -> Result<RangeResult> {
        (**self).range(key, opts).await
    }

    async fn put(&self, key: &str, value: &str, lease: PutLease) -> Result<Header> {
        (**self).put(key, value, lease).await
    }

    async fn put_if(&self, key: &str, value: &str, lease: PutLease, cond: Condition) -> Result<TxnResult> {
        (**self).put_if(key, value, lease, cond).await
    }

    async fn delete_range(&self, key: &str, prefix: bool) -> Result<DeleteResult> {
        (**self).delete_range(key, prefix).await
    }

    async fn lease_grant(&self, ttl: i64) -> Result<i64> {
        (**self).lease_grant(ttl).await
    }

    async fn lease_ttl(&self, id: i64) -> Result<i64> {
        (**self).lease_ttl(id).await
    }
}

// =============================================================================
// Request Types
// =============================================================================

#[derive(Debug, Clone, Copy, Default)]
pub struct RangeOptions {
    pub prefix: bool,

    /// Return only the count, no key-values
    pub count_only: bool,

    /// Maximum number of key-values (zero = no limit)
    pub limit: i64,
}

/// What lease a put attaches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutLease {
    /// Detach any lease
    None,

    /// Attach this lease
    Lease(i64),

    /// Keep whatever lease the key already has
    Keep,
}

/// Guard for `put_if`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Condition {
    /// The key has never been created (create revision is zero)
    Absent,

    /// The key exists (version above zero)
    Present,
}

// =============================================================================
// Response Types
// =============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Header {
    pub cluster_id: u64,

    /// Store revision when the request was served
    pub revision: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyValue {
    pub key: String,
    pub value: String,
    pub create_revision: i64,
    pub mod_revision: i64,
    pub version: i64,
    pub lease: i64,
}

impl KeyValue {
    /// Bytes this key-value takes on the wire, near enough
    pub fn size(&self) -> usize {
        self.key.len() + self.value.len()
    }
}

#[derive(Debug, Clone, Default)]
pub struct RangeResult {
    pub header: Header,
    pub kvs: Vec<KeyValue>,

    /// Number of matching keys, even when `kvs` is limited or omitted
    pub count: i64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TxnResult {
    pub header: Header,
    pub succeeded: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DeleteResult {
    pub header: Header,
    pub deleted: i64,
}
