//! Current client
//!
//! The legacy key/directory operations expressed with v3 primitives:
//! guarded puts are transactions, TTLs are leases and a directory is the
//! set of keys under `dir/`.

use std::future::Future;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use tracing::instrument::WithSubscriber;
use tracing::Dispatch;

use crate::error::{BridgeError, Result};
use crate::logging::LogConfig;

use super::api::{Condition, KeyValue, KvApi, PutLease, RangeOptions};
use super::config::Config;
use super::grpc::GrpcKvApi;
use super::key::Key;

/// Client for the v3 API
///
/// Each operation issues its requests in sequence and waits for them; the
/// client never retries. Cancelling the config's token fails every pending
/// and future call with `Cancelled`.
pub struct Client<K: KvApi = GrpcKvApi> {
    config: Config,
    api: K,

    /// Client-scoped subscriber from `config.log_config`
    dispatch: Option<Dispatch>,
}

impl Client<GrpcKvApi> {
    /// Dial the cluster and build a client
    ///
    /// Fails if no endpoint answers within `config.dial_timeout`, if TLS or
    /// authentication fails, or if the cluster is too old under
    /// `reject_old_cluster`.
    pub async fn new(config: Config) -> Result<Self> {
        let dispatch = config.log_config.as_ref().map(LogConfig::dispatch).transpose()?;

        let connect = GrpcKvApi::connect(&config);
        let api = match &dispatch {
            Some(d) => connect.with_subscriber(d.clone()).await?,
            None => connect.await?,
        };

        Ok(Self { config, api, dispatch })
    }
}

impl<K: KvApi> Client<K> {
    /// Create a client over any backend
    pub fn with_api(config: Config, api: K) -> Result<Self> {
        let dispatch = config.log_config.as_ref().map(LogConfig::dispatch).transpose()?;
        Ok(Self { config, api, dispatch })
    }

    /// Create a key; fails if it already exists, as a key or as a
    /// directory with children
    pub async fn create(&self, key: &str, value: &str) -> Result<()> {
        self.run(self.create_op(key, value)).await
    }

    /// Create `dir/<next revision>`, zero padded so children sort in order
    ///
    /// Fails with `KeyExists` if a concurrent writer took the name first.
    pub async fn create_in_order(&self, dir: &str, value: &str, ttl: Duration) -> Result<()> {
        self.run(self.create_in_order_op(dir, value, ttl)).await
    }

    /// Set a key's value and TTL, creating it if absent
    pub async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        self.run(self.set_op(key, value, ttl)).await
    }

    /// Always fails with `Unsupported`
    ///
    /// Directories are key prefixes in v3. One exists while a key under
    /// `key/` exists, so there is nothing to create ahead of its children.
    pub async fn set_dir(&self, key: &str, ttl: Duration) -> Result<()> {
        tracing::debug!("set_dir {} ttl={:?}", key, ttl);
        Err(BridgeError::Unsupported(format!(
            "set_dir {}: directories are key prefixes",
            key
        )))
    }

    /// Read a key, or the directory of keys under `key/`
    pub async fn get(&self, key: &str) -> Result<Key> {
        self.run(self.get_op(key)).await
    }

    /// Overwrite an existing key's value, keeping its lease
    pub async fn update(&self, key: &str, value: &str) -> Result<()> {
        self.run(self.update_op(key, value)).await
    }

    /// Delete a single key; fails on a directory
    pub async fn delete(&self, key: &str) -> Result<()> {
        self.run(self.delete_op(key)).await
    }

    /// Delete everything under `dir/`
    ///
    /// Without `force` a directory with children is refused. The check and
    /// the delete are separate requests.
    pub async fn delete_dir(&self, dir: &str, force: bool) -> Result<()> {
        self.run(self.delete_dir_op(dir, force)).await
    }

    // =========================================================================
    // Operations
    // =========================================================================

    async fn create_op(&self, key: &str, value: &str) -> Result<()> {
        tracing::debug!("create {}", key);
        self.check_send(key, value)?;

        // The children check and the put are separate requests
        if self.child_count(key).await? > 0 {
            return Err(BridgeError::KeyExists(key.to_string()));
        }

        let txn = self.api.put_if(key, value, PutLease::None, Condition::Absent).await?;
        if !txn.succeeded {
            return Err(BridgeError::KeyExists(key.to_string()));
        }
        Ok(())
    }

    async fn create_in_order_op(&self, dir: &str, value: &str, ttl: Duration) -> Result<()> {
        tracing::debug!("create_in_order {} ttl={:?}", dir, ttl);
        let dir = dir_key(dir);

        // A plain key at `dir` means it is a file, not a directory
        let head = self.api.range(dir, RangeOptions::default()).await?;
        if head.count > 0 {
            return Err(BridgeError::NotADirectory(dir.to_string()));
        }

        let child = format!("{}{:020}", dir_prefix(dir), head.header.revision + 1);
        self.check_send(&child, value)?;

        let lease = self.lease_for(ttl).await?;
        let txn = self.api.put_if(&child, value, lease, Condition::Absent).await?;
        if !txn.succeeded {
            return Err(BridgeError::KeyExists(child));
        }
        Ok(())
    }

    async fn set_op(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        tracing::debug!("set {} ttl={:?}", key, ttl);
        self.check_send(key, value)?;
        let lease = self.lease_for(ttl).await?;
        self.api.put(key, value, lease).await?;
        Ok(())
    }

    async fn get_op(&self, key: &str) -> Result<Key> {
        tracing::debug!("get {}", key);
        let exact = self.api.range(key, RangeOptions::default()).await?;
        self.check_recv(&exact.kvs)?;
        let cluster_id = exact.header.cluster_id;

        if let Some(kv) = exact.kvs.into_iter().next() {
            let ttl = if kv.lease != 0 {
                self.api.lease_ttl(kv.lease).await?.max(0)
            } else {
                0
            };
            let expiration = if ttl > 0 {
                Utc::now().checked_add_signed(ChronoDuration::seconds(ttl))
            } else {
                None
            };

            return Ok(Key {
                cluster_id,
                name: kv.key,
                dir: false,
                value: kv.value,
                create_revision: kv.create_revision,
                mod_revision: kv.mod_revision,
                version: kv.version,
                lease: kv.lease,
                expiration,
                ttl,
            });
        }

        if self.child_count(key).await? > 0 {
            return Ok(Key {
                cluster_id,
                name: dir_key(key).to_string(),
                dir: true,
                value: String::new(),
                create_revision: 0,
                mod_revision: 0,
                version: 0,
                lease: 0,
                expiration: None,
                ttl: 0,
            });
        }

        Err(BridgeError::KeyNotFound(key.to_string()))
    }

    async fn update_op(&self, key: &str, value: &str) -> Result<()> {
        tracing::debug!("update {}", key);
        self.check_send(key, value)?;
        let txn = self.api.put_if(key, value, PutLease::Keep, Condition::Present).await?;
        if !txn.succeeded {
            return Err(BridgeError::KeyNotFound(key.to_string()));
        }
        Ok(())
    }

    async fn delete_op(&self, key: &str) -> Result<()> {
        tracing::debug!("delete {}", key);
        let resp = self.api.delete_range(key, false).await?;
        if resp.deleted > 0 {
            return Ok(());
        }
        if self.child_count(key).await? > 0 {
            return Err(BridgeError::NotAFile(key.to_string()));
        }
        Err(BridgeError::KeyNotFound(key.to_string()))
    }

    async fn delete_dir_op(&self, dir: &str, force: bool) -> Result<()> {
        tracing::debug!("delete_dir {} force={}", dir, force);
        if !force && self.child_count(dir).await? > 0 {
            return Err(BridgeError::DirNotEmpty(dir.to_string()));
        }

        let children = self.api.delete_range(&dir_prefix(dir), true).await?;
        let itself = self.api.delete_range(dir_key(dir), false).await?;
        if children.deleted + itself.deleted == 0 {
            return Err(BridgeError::KeyNotFound(dir.to_string()));
        }
        Ok(())
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// The configuration this client was built from
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The backend, for calls beyond the simplified surface
    pub fn api(&self) -> &K {
        &self.api
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    /// Run `op` under the client's subscriber, racing the cancel token
    async fn run<T>(&self, op: impl Future<Output = Result<T>>) -> Result<T> {
        let cancel = &self.config.cancel;
        let raced = async {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(BridgeError::Cancelled),
                out = op => out,
            }
        };

        match &self.dispatch {
            Some(d) => raced.with_subscriber(d.clone()).await,
            None => raced.await,
        }
    }

    async fn lease_for(&self, ttl: Duration) -> Result<PutLease> {
        match ttl.as_secs() {
            0 => Ok(PutLease::None),
            secs => Ok(PutLease::Lease(self.api.lease_grant(secs as i64).await?)),
        }
    }

    async fn child_count(&self, key: &str) -> Result<i64> {
        let opts = RangeOptions {
            prefix: true,
            count_only: true,
            ..RangeOptions::default()
        };
        Ok(self.api.range(&dir_prefix(key), opts).await?.count)
    }

    fn check_send(&self, key: &str, value: &str) -> Result<()> {
        let size = key.len() + value.len();
        let limit = self.config.send_limit();
        if size > limit {
            return Err(BridgeError::RequestTooLarge { size, limit });
        }
        Ok(())
    }

    fn check_recv(&self, kvs: &[KeyValue]) -> Result<()> {
        let size: usize = kvs.iter().map(KeyValue::size).sum();
        let limit = self.config.recv_limit();
        if size > limit {
            return Err(BridgeError::ResponseTooLarge { size, limit });
        }
        Ok(())
    }
}

/// `dir` without trailing slashes; the root stays `/`
fn dir_key(dir: &str) -> &str {
    match dir.trim_end_matches('/') {
        "" => "/",
        trimmed => trimmed,
    }
}

/// `dir/`, the prefix every child of `dir` shares
fn dir_prefix(dir: &str) -> String {
    format!("{}/", dir.trim_end_matches('/'))
}
