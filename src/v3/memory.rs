//! In-process KV API
//!
//! A `KvApi` holding keys, revisions and leases in memory. A lease that runs
//! out takes its keys with it, checked lazily on every call against the
//! injected `Clock`.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::Mutex;

use crate::clock::{remaining_ttl, Clock, SystemClock};
use crate::error::{BridgeError, Result};

use super::api::{Condition, DeleteResult, Header, KeyValue, KvApi, PutLease, RangeOptions, RangeResult, TxnResult};

/// Cluster ID reported by a fresh single-member store
pub const DEFAULT_CLUSTER_ID: u64 = 14841639068965178418;

/// First lease ID handed out
const FIRST_LEASE_ID: i64 = 0x1000;

#[derive(Debug, Clone, Copy)]
struct Lease {
    expires_at: DateTime<Utc>,
}

#[derive(Debug)]
struct Store {
    kvs: BTreeMap<String, KeyValue>,
    revision: i64,
    leases: HashMap<i64, Lease>,
    next_lease: i64,
}

impl Store {
    fn matching(&self, key: &str, prefix: bool) -> Vec<String> {
        if prefix {
            self.kvs
                .range(key.to_string()..)
                .take_while(|(k, _)| k.starts_with(key))
                .map(|(k, _)| k.clone())
                .collect()
        } else {
            self.kvs.get(key).map(|kv| vec![kv.key.clone()]).unwrap_or_default()
        }
    }

    /// Revoke expired leases and delete their keys
    fn expire(&mut self, now: DateTime<Utc>) {
        let expired: Vec<i64> = self
            .leases
            .iter()
            .filter(|(_, lease)| lease.expires_at <= now)
            .map(|(id, _)| *id)
            .collect();

        for id in expired {
            self.leases.remove(&id);
            let before = self.kvs.len();
            self.kvs.retain(|_, kv| kv.lease != id);
            if self.kvs.len() != before {
                self.revision += 1;
            }
            tracing::trace!("Lease {:x} expired", id);
        }
    }

    fn write(&mut self, key: &str, value: &str, lease: PutLease) -> Result<()> {
        let existing = self.kvs.get(key).cloned();
        let lease = match lease {
            PutLease::None => 0,
            PutLease::Lease(id) if self.leases.contains_key(&id) => id,
            PutLease::Lease(id) => return Err(BridgeError::LeaseNotFound(id)),
            PutLease::Keep => existing.as_ref().map_or(0, |kv| kv.lease),
        };

        self.revision += 1;
        let kv = match existing {
            Some(prev) => KeyValue {
                value: value.to_string(),
                mod_revision: self.revision,
                version: prev.version + 1,
                lease,
                ..prev
            },
            None => KeyValue {
                key: key.to_string(),
                value: value.to_string(),
                create_revision: self.revision,
                mod_revision: self.revision,
                version: 1,
                lease,
            },
        };
        self.kvs.insert(key.to_string(), kv);
        Ok(())
    }
}

fn require_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(BridgeError::EmptyKey);
    }
    Ok(())
}

/// In-memory KV API
pub struct MemoryKvApi {
    store: Mutex<Store>,
    clock: Arc<dyn Clock>,
    cluster_id: u64,
}

impl MemoryKvApi {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            store: Mutex::new(Store {
                kvs: BTreeMap::new(),
                revision: 1,
                leases: HashMap::new(),
                next_lease: FIRST_LEASE_ID,
            }),
            clock,
            cluster_id: DEFAULT_CLUSTER_ID,
        }
    }

    /// Current store revision
    pub fn revision(&self) -> i64 {
        self.store.lock().revision
    }

    fn header(&self, store: &Store) -> Header {
        Header {
            cluster_id: self.cluster_id,
            revision: store.revision,
        }
    }

    fn locked(&self) -> parking_lot::MutexGuard<'_, Store> {
        let now = self.clock.now();
        let mut store = self.store.lock();
        store.expire(now);
        store
    }
}

impl Default for MemoryKvApi {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KvApi for MemoryKvApi {
    async fn range(&self, key: &str, opts: RangeOptions) -> Result<RangeResult> {
        require_key(key)?;
        let store = self.locked();
        let keys = store.matching(key, opts.prefix);
        let count = keys.len() as i64;

        let kvs = if opts.count_only {
            Vec::new()
        } else {
            let limit = if opts.limit > 0 { opts.limit as usize } else { keys.len() };
            keys.iter()
                .take(limit)
                .filter_map(|k| store.kvs.get(k).cloned())
                .collect()
        };

        Ok(RangeResult {
            header: self.header(&store),
            kvs,
            count,
        })
    }

    async fn put(&self, key: &str, value: &str, lease: PutLease) -> Result<Header> {
        require_key(key)?;
        let mut store = self.locked();
        store.write(key, value, lease)?;
        Ok(self.header(&store))
    }

    async fn put_if(&self, key: &str, value: &str, lease: PutLease, cond: Condition) -> Result<TxnResult> {
        require_key(key)?;
        let mut store = self.locked();
        let exists = store.kvs.contains_key(key);
        let succeeded = match cond {
            Condition::Absent => !exists,
            Condition::Present => exists,
        };

        if succeeded {
            store.write(key, value, lease)?;
        }

        Ok(TxnResult {
            header: self.header(&store),
            succeeded,
        })
    }

    async fn delete_range(&self, key: &str, prefix: bool) -> Result<DeleteResult> {
        require_key(key)?;
        let mut store = self.locked();
        let keys = store.matching(key, prefix);
        for k in &keys {
            store.kvs.remove(k);
        }
        if !keys.is_empty() {
            store.revision += 1;
        }

        Ok(DeleteResult {
            header: self.header(&store),
            deleted: keys.len() as i64,
        })
    }

    async fn lease_grant(&self, ttl: i64) -> Result<i64> {
        let now = self.clock.now();
        let mut store = self.locked();
        let id = store.next_lease;
        store.next_lease += 1;
        let expires_at = now
            .checked_add_signed(ChronoDuration::seconds(ttl.max(1)))
            .unwrap_or(now);
        store.leases.insert(id, Lease { expires_at });
        Ok(id)
    }

    async fn lease_ttl(&self, id: i64) -> Result<i64> {
        let now = self.clock.now();
        let store = self.locked();
        Ok(store
            .leases
            .get(&id)
            .map_or(-1, |lease| remaining_ttl(lease.expires_at, now)))
    }
}
