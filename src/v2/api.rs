//! Keys API contract
//!
//! The operations a v2 backend must provide, their options, and the
//! response model shared by every backend.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A backend speaking the v2 keys API
///
/// Implementations must be safe to share between threads; the client adds
/// no synchronization of its own.
pub trait KeysApi: Send + Sync {
    /// Create a key that must not exist yet
    fn create(&self, key: &str, value: &str) -> Result<Response>;

    /// Create a uniquely named, ordered child of `dir`
    fn create_in_order(&self, dir: &str, value: &str, opts: &CreateInOrderOptions) -> Result<Response>;

    /// Set a key, optionally guarded by the comparisons in `opts`
    fn set(&self, key: &str, value: &str, opts: &SetOptions) -> Result<Response>;

    /// Read a key or directory
    fn get(&self, key: &str, opts: &GetOptions) -> Result<Response>;

    /// Overwrite a key that must already exist
    fn update(&self, key: &str, value: &str) -> Result<Response>;

    /// Delete a key or directory
    fn delete(&self, key: &str, opts: &DeleteOptions) -> Result<Response>;
}

impl<T: KeysApi + ?Sized> KeysApi for Box<T> {
    fn create(&self, key: &str, value: &str) -> Result<Response> {
        (**self).create(key, value)
    }

    fn create_in_order(&self, dir: &str, value: &str, opts: &CreateInOrderOptions) -> Result<Response> {
        (**self).create_in_order(dir, value, opts)
    }

    fn set(&self, key: &str, value: &str, opts: &SetOptions) -> Result<Response> {
        (**self).set(key, value, opts)
    }

    fn get(&self, key: &str, opts: &GetOptions) -> Result<Response> {
        (**self).get(key, opts)
    }

    fn update(&self, key: &str, value: &str) -> Result<Response> {
        (**self).update(key, value)
    }

    fn delete(&self, key: &str, opts: &DeleteOptions) -> Result<Response> {
        (**self).delete(key, opts)
    }
}

// =============================================================================
// Options
// =============================================================================

/// Existence precondition for a set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PrevExist {
    #[default]
    Ignore,
    Exist,
    NoExist,
}

#[derive(Debug, Clone, Default)]
pub struct SetOptions {
    /// Only succeed if the current value equals this
    pub prev_value: Option<String>,

    /// Only succeed if the current modified index equals this
    pub prev_index: Option<u64>,

    pub prev_exist: PrevExist,

    /// Zero means no expiration
    pub ttl: Duration,

    /// Only extend the TTL of an existing key, leaving its value alone
    pub refresh: bool,

    /// Create or replace a directory instead of a leaf
    pub dir: bool,

    /// Ask the store to omit the node from a successful response
    pub no_value_on_success: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CreateInOrderOptions {
    /// Zero means no expiration
    pub ttl: Duration,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct GetOptions {
    /// Include all descendants of a directory, not only its children
    pub recursive: bool,

    /// Sort children by key
    pub sorted: bool,

    /// Read through consensus instead of from the local member
    pub quorum: bool,
}

#[derive(Debug, Clone, Default)]
pub struct DeleteOptions {
    pub prev_value: Option<String>,

    pub prev_index: Option<u64>,

    /// Delete a directory and everything under it
    pub recursive: bool,

    /// Allow the target to be a directory
    pub dir: bool,
}

// =============================================================================
// Response Model
// =============================================================================

/// One API response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// `get`, `set`, `create`, `update`, `delete`, `compareAndSwap`, ...
    pub action: String,

    #[serde(default)]
    pub node: Option<Node>,

    #[serde(rename = "prevNode", default, skip_serializing_if = "Option::is_none")]
    pub prev_node: Option<Node>,

    /// Store index after the operation, from `X-Etcd-Index`
    #[serde(skip)]
    pub index: u64,

    /// From `X-Etcd-Cluster-Id`
    #[serde(skip)]
    pub cluster_id: String,
}

/// A key or directory as returned by the store
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Node {
    /// Empty for the root directory
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub key: String,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub dir: bool,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub value: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nodes: Vec<Node>,

    #[serde(rename = "createdIndex", default, skip_serializing_if = "is_zero")]
    pub created_index: u64,

    #[serde(rename = "modifiedIndex", default, skip_serializing_if = "is_zero")]
    pub modified_index: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "is_zero")]
    pub ttl: i64,
}

fn is_zero<T: Default + PartialEq>(v: &T) -> bool {
    *v == T::default()
}

/// Normalize a key to the store's absolute form
///
/// Resolves the key against the root the way the store cleans paths:
/// empty and `.` segments are dropped, `..` removes the segment before it
/// and never climbs above the root. The result has a leading `/` and no
/// trailing one, except for the root itself.
pub fn normalize_key(key: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in key.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }
    format!("/{}", segments.join("/"))
}
