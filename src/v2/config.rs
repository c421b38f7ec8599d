//! Configuration for the legacy (v2) client
//!
//! Centralized configuration with sensible defaults.

use std::time::Duration;

use reqwest::Url;

use crate::error::{BridgeError, Result};

/// Default endpoint of a local store
pub const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:2379";

/// Main configuration for a v2 client
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Cluster
    // -------------------------------------------------------------------------
    /// Endpoints to send requests to. When one is unreachable the next is
    /// tried. A `sync` may replace this list with the cluster's members.
    pub endpoints: Vec<String>,

    /// How the first endpoint is picked
    pub selection_mode: EndpointSelectionMode,

    // -------------------------------------------------------------------------
    // Authentication
    // -------------------------------------------------------------------------
    pub username: Option<String>,

    pub password: Option<String>,

    // -------------------------------------------------------------------------
    // Transport
    // -------------------------------------------------------------------------
    /// Timeout for each request until response headers arrive (zero = none)
    pub header_timeout_per_request: Duration,

    /// TCP connect timeout (zero = transport default)
    pub connect_timeout: Duration,

    /// What to do when the store answers with a redirect
    pub redirect_policy: RedirectPolicy,
}

/// Endpoint selection strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EndpointSelectionMode {
    /// Shuffle the endpoints once at construction
    #[default]
    Random,

    /// Put the cluster leader first whenever endpoints are synced
    PrioritizeLeader,
}

/// Redirect handling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectPolicy {
    /// Follow at most this many redirects
    Limited(usize),

    /// Never follow redirects
    None,
}

impl Default for RedirectPolicy {
    fn default() -> Self {
        RedirectPolicy::Limited(10)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoints: vec![DEFAULT_ENDPOINT.to_string()],
            selection_mode: EndpointSelectionMode::default(),
            username: None,
            password: None,
            header_timeout_per_request: Duration::ZERO,
            connect_timeout: Duration::ZERO,
            redirect_policy: RedirectPolicy::default(),
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Parse every endpoint into a URL
    ///
    /// Fails on an empty list or on anything that is not an absolute
    /// `http`/`https` URL.
    pub fn parsed_endpoints(&self) -> Result<Vec<Url>> {
        if self.endpoints.is_empty() {
            return Err(BridgeError::Config("endpoint list is empty".to_string()));
        }

        self.endpoints
            .iter()
            .map(|raw| {
                let url = Url::parse(raw)
                    .map_err(|e| BridgeError::Config(format!("invalid endpoint {:?}: {}", raw, e)))?;
                match url.scheme() {
                    "http" | "https" => Ok(url),
                    other => Err(BridgeError::Config(format!(
                        "unsupported scheme {:?} in endpoint {:?}",
                        other, raw
                    ))),
                }
            })
            .collect()
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Replace the endpoint list
    pub fn endpoints<I, S>(mut self, endpoints: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.endpoints = endpoints.into_iter().map(Into::into).collect();
        self
    }

    /// Set the endpoint selection mode
    pub fn selection_mode(mut self, mode: EndpointSelectionMode) -> Self {
        self.config.selection_mode = mode;
        self
    }

    /// Set basic-auth credentials
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.config.username = Some(username.into());
        self.config.password = Some(password.into());
        self
    }

    /// Set the per-request header timeout
    pub fn header_timeout_per_request(mut self, timeout: Duration) -> Self {
        self.config.header_timeout_per_request = timeout;
        self
    }

    /// Set the connect timeout
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Set the redirect policy
    pub fn redirect_policy(mut self, policy: RedirectPolicy) -> Self {
        self.config.redirect_policy = policy;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
