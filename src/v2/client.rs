//! Legacy client
//!
//! Forwards each call to a `KeysApi` backend with the options the operation
//! implies. Errors come back exactly as the backend reported them.

use std::time::Duration;

use crate::error::{BridgeError, Result};

use super::api::{CreateInOrderOptions, DeleteOptions, GetOptions, KeysApi, SetOptions};
use super::config::Config;
use super::http::HttpKeysApi;
use super::key::Key;

/// Client for the v2 keys API
///
/// Every operation is a single blocking request. The client never retries.
pub struct Client<K: KeysApi = HttpKeysApi> {
    config: Config,
    api: K,
}

impl Client<HttpKeysApi> {
    /// Create a client that talks HTTP to the configured endpoints
    ///
    /// Fails if the endpoint list is empty or malformed. No request is sent.
    pub fn new(config: Config) -> Result<Self> {
        let api = HttpKeysApi::new(&config)?;
        tracing::debug!("v2 client for {:?}", config.endpoints);
        Ok(Self { config, api })
    }

    /// Refresh the endpoint list from the cluster's member list
    pub fn sync(&self) -> Result<()> {
        self.api.sync()
    }
}

impl<K: KeysApi> Client<K> {
    /// Create a client over any backend
    pub fn with_api(config: Config, api: K) -> Self {
        Self { config, api }
    }

    /// Create a key; fails if it already exists
    pub fn create(&self, key: &str, value: &str) -> Result<()> {
        tracing::debug!("create {}", key);
        self.api.create(key, value)?;
        Ok(())
    }

    /// Create an ordered child of `dir`; fails if `dir` is not a directory
    pub fn create_in_order(&self, dir: &str, value: &str, ttl: Duration) -> Result<()> {
        tracing::debug!("create_in_order {} ttl={:?}", dir, ttl);
        self.api.create_in_order(dir, value, &CreateInOrderOptions { ttl })?;
        Ok(())
    }

    /// Set a key's value and TTL, creating it if absent
    pub fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        tracing::debug!("set {} ttl={:?}", key, ttl);
        let opts = SetOptions {
            ttl,
            refresh: false,
            no_value_on_success: false,
            ..SetOptions::default()
        };
        self.api.set(key, value, &opts)?;
        Ok(())
    }

    /// Set a directory with a TTL, creating it if absent
    pub fn set_dir(&self, key: &str, ttl: Duration) -> Result<()> {
        tracing::debug!("set_dir {} ttl={:?}", key, ttl);
        let opts = SetOptions {
            ttl,
            dir: true,
            ..SetOptions::default()
        };
        self.api.set(key, "", &opts)?;
        Ok(())
    }

    /// Read a key or directory
    pub fn get(&self, key: &str) -> Result<Key> {
        tracing::debug!("get {}", key);
        let resp = self.api.get(key, &GetOptions::default())?;
        Key::from_response(resp)
            .ok_or_else(|| BridgeError::Serialization(format!("response for {} carried no node", key)))
    }

    /// Overwrite an existing key's value; fails if it does not exist
    pub fn update(&self, key: &str, value: &str) -> Result<()> {
        tracing::debug!("update {}", key);
        self.api.update(key, value)?;
        Ok(())
    }

    /// Delete a leaf key; fails on a directory
    pub fn delete(&self, key: &str) -> Result<()> {
        tracing::debug!("delete {}", key);
        let opts = DeleteOptions {
            dir: false,
            ..DeleteOptions::default()
        };
        self.api.delete(key, &opts)?;
        Ok(())
    }

    /// Delete a directory
    ///
    /// Without `force` a non-empty directory is refused; with it everything
    /// below the directory goes too.
    pub fn delete_dir(&self, key: &str, force: bool) -> Result<()> {
        tracing::debug!("delete_dir {} force={}", key, force);
        let opts = DeleteOptions {
            dir: true,
            recursive: force,
            ..DeleteOptions::default()
        };
        self.api.delete(key, &opts)?;
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
}
