//! Configuration for the current (v3) client
//!
//! Centralized configuration with sensible defaults. Optional pieces (TLS,
//! logging, dial hook) are `None` unless set; every zero duration or size
//! means "use the default" as documented per field.

use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use etcd_client::ConnectOptions;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::logging::LogConfig;

/// Default endpoint of a local store
pub const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:2379";

/// Send limit applied when `max_call_send_msg_size` is zero (2 MiB)
pub const DEFAULT_MAX_CALL_SEND_MSG_SIZE: usize = 2 * 1024 * 1024;

/// Receive limit applied when `max_call_recv_msg_size` is zero
pub const DEFAULT_MAX_CALL_RECV_MSG_SIZE: usize = i32::MAX as usize;

/// Main configuration for a v3 client
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Cluster
    // -------------------------------------------------------------------------
    pub endpoints: Vec<String>,

    /// How often to refresh endpoints from the member list (zero = never)
    pub auto_sync_interval: Duration,

    /// Refuse clusters older than the minimum supported version
    pub reject_old_cluster: bool,

    // -------------------------------------------------------------------------
    // Authentication
    // -------------------------------------------------------------------------
    pub username: Option<String>,

    pub password: Option<String>,

    // -------------------------------------------------------------------------
    // Transport
    // -------------------------------------------------------------------------
    /// Timeout for each request (zero = none)
    pub header_timeout_per_request: Duration,

    /// How long construction may take to reach the cluster (zero = no limit)
    pub dial_timeout: Duration,

    /// Keep-alive ping interval (zero = keep-alive off)
    pub dial_keep_alive_time: Duration,

    /// How long to wait for a keep-alive reply before closing the connection
    pub dial_keep_alive_timeout: Duration,

    /// Send keep-alive pings even when no call is in flight
    pub permit_without_stream: bool,

    /// Request size limit in bytes (zero = 2 MiB). Keep it below the
    /// server's `--max-request-bytes`.
    pub max_call_send_msg_size: usize,

    /// Response size limit in bytes (zero = `i32::MAX`)
    pub max_call_recv_msg_size: usize,

    /// TLS material (none = plaintext)
    pub tls: Option<TlsConfig>,

    /// Last word on the connect options, applied after everything above
    pub dial_options: Option<DialOptions>,

    // -------------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------------
    /// Client-scoped logging (none = process-wide subscriber)
    pub log_config: Option<LogConfig>,

    /// Cancelling this token aborts dialing and every operation
    pub cancel: CancellationToken,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoints: vec![DEFAULT_ENDPOINT.to_string()],
            auto_sync_interval: Duration::ZERO,
            reject_old_cluster: false,
            username: None,
            password: None,
            header_timeout_per_request: Duration::ZERO,
            dial_timeout: Duration::from_secs(5),
            dial_keep_alive_time: Duration::ZERO,
            dial_keep_alive_timeout: Duration::from_secs(20),
            permit_without_stream: false,
            max_call_send_msg_size: 0,
            max_call_recv_msg_size: 0,
            tls: None,
            dial_options: None,
            log_config: None,
            cancel: CancellationToken::new(),
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Send limit with the zero default resolved
    pub fn send_limit(&self) -> usize {
        match self.max_call_send_msg_size {
            0 => DEFAULT_MAX_CALL_SEND_MSG_SIZE,
            n => n,
        }
    }

    /// Receive limit with the zero default resolved
    pub fn recv_limit(&self) -> usize {
        match self.max_call_recv_msg_size {
            0 => DEFAULT_MAX_CALL_RECV_MSG_SIZE,
            n => n,
        }
    }
}

/// Hook that adjusts the mapped `ConnectOptions` before dialing
#[derive(Clone)]
pub struct DialOptions(Arc<dyn Fn(ConnectOptions) -> ConnectOptions + Send + Sync>);

impl DialOptions {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(ConnectOptions) -> ConnectOptions + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    pub fn apply(&self, options: ConnectOptions) -> ConnectOptions {
        (self.0)(options)
    }
}

impl fmt::Debug for DialOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DialOptions(..)")
    }
}

/// TLS material, PEM encoded
#[derive(Clone, Default)]
pub struct TlsConfig {
    /// CA bundle to verify the server with (none = system roots)
    pub ca_pem: Option<Vec<u8>>,

    /// Client certificate and key for mutual TLS
    pub identity: Option<(Vec<u8>, Vec<u8>)>,

    /// Name to verify the server certificate against
    pub domain_name: Option<String>,
}

impl TlsConfig {
    /// Load PEM files from disk; pass `None` to skip a piece
    pub fn from_files(
        ca: Option<&Path>,
        cert_and_key: Option<(&Path, &Path)>,
        domain_name: Option<String>,
    ) -> Result<Self> {
        let ca_pem = ca.map(std::fs::read).transpose()?;
        let identity = match cert_and_key {
            Some((cert, key)) => Some((std::fs::read(cert)?, std::fs::read(key)?)),
            None => None,
        };

        Ok(Self {
            ca_pem,
            identity,
            domain_name,
        })
    }
}

impl fmt::Debug for TlsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsConfig")
            .field("ca_pem", &self.ca_pem.as_ref().map(|p| p.len()))
            .field("identity", &self.identity.is_some())
            .field("domain_name", &self.domain_name)
            .finish()
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

    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.config.username = Some(username.into());
        self.config.password = Some(password.into());
        self
    }

    pub fn header_timeout_per_request(mut self, timeout: Duration) -> Self {
        self.config.header_timeout_per_request = timeout;
        self
    }

    pub fn auto_sync_interval(mut self, interval: Duration) -> Self {
        self.config.auto_sync_interval = interval;
        self
    }

    pub fn dial_timeout(mut self, timeout: Duration) -> Self {
        self.config.dial_timeout = timeout;
        self
    }

    /// Enable keep-alive pings every `time`, giving up after `timeout`
    pub fn keep_alive(mut self, time: Duration, timeout: Duration) -> Self {
        self.config.dial_keep_alive_time = time;
        self.config.dial_keep_alive_timeout = timeout;
        self
    }

    pub fn permit_without_stream(mut self, permit: bool) -> Self {
        self.config.permit_without_stream = permit;
        self
    }

    pub fn max_call_send_msg_size(mut self, bytes: usize) -> Self {
        self.config.max_call_send_msg_size = bytes;
        self
    }

    pub fn max_call_recv_msg_size(mut self, bytes: usize) -> Self {
        self.config.max_call_recv_msg_size = bytes;
        self
    }

    pub fn tls(mut self, tls: TlsConfig) -> Self {
        self.config.tls = Some(tls);
        self
    }

    pub fn reject_old_cluster(mut self, reject: bool) -> Self {
        self.config.reject_old_cluster = reject;
        self
    }

    pub fn dial_options(mut self, hook: DialOptions) -> Self {
        self.config.dial_options = Some(hook);
        self
    }

    pub fn log_config(mut self, log: LogConfig) -> Self {
        self.config.log_config = Some(log);
        self
    }

    /// Tie the client's lifetime to `token`
    pub fn cancel(mut self, token: CancellationToken) -> Self {
        self.config.cancel = token;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
