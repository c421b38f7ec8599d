//! gRPC KV API
//!
//! `KvApi` on top of the `etcd-client` crate. Connection settings come from
//! the client `Config`; everything past dialing is one RPC per call.

use async_trait::async_trait;
use etcd_client::{
    Certificate, Client as EtcdClient, Compare, CompareOp, ConnectOptions, DeleteOptions, GetOptions, Identity,
    PutOptions, ResponseHeader, TlsOptions, Txn, TxnOp,
};

use crate::error::{BridgeError, Result};

use super::api::{Condition, DeleteResult, Header, KeyValue, KvApi, PutLease, RangeOptions, RangeResult, TxnResult};
use super::config::{Config, TlsConfig};

/// Oldest server version accepted under `reject_old_cluster`
pub const MIN_CLUSTER_VERSION: (u32, u32) = (3, 2);

/// KV API over gRPC
#[derive(Clone)]
pub struct GrpcKvApi {
    client: EtcdClient,
}

impl GrpcKvApi {
    /// Dial the cluster described by `config`
    ///
    /// Connects, then probes the cluster status, all within
    /// `config.dial_timeout`. Cancelling `config.cancel` aborts the dial.
    pub async fn connect(config: &Config) -> Result<Self> {
        let options = connect_options(config);
        let endpoints = config.endpoints.clone();

        let dial = async move {
            let mut client = EtcdClient::connect(endpoints, Some(options)).await?;
            let status = client.status().await?;
            Ok::<_, BridgeError>((client, status.version().to_string()))
        };

        let bounded = async {
            if config.dial_timeout.is_zero() {
                dial.await
            } else {
                tokio::time::timeout(config.dial_timeout, dial)
                    .await
                    .unwrap_or_else(|_| Err(BridgeError::DialTimeout(config.dial_timeout)))
            }
        };

        let (client, version) = tokio::select! {
            biased;
            _ = config.cancel.cancelled() => return Err(BridgeError::Cancelled),
            dialed = bounded => dialed?,
        };

        tracing::debug!("Connected to cluster version {}", version);

        if config.reject_old_cluster && !version_supported(&version) {
            return Err(BridgeError::UnsupportedCluster(format!(
                "server version {} is older than {}.{}",
                version, MIN_CLUSTER_VERSION.0, MIN_CLUSTER_VERSION.1
            )));
        }

        if !config.auto_sync_interval.is_zero() {
            tracing::warn!(
                "auto_sync_interval of {:?} ignored: endpoints are balanced by the gRPC channel",
                config.auto_sync_interval
            );
        }

        Ok(Self { client })
    }

    /// The underlying etcd-client handle
    pub fn inner(&self) -> &EtcdClient {
        &self.client
    }
}

/// Map a `Config` onto `ConnectOptions`, finishing with the dial hook
pub fn connect_options(config: &Config) -> ConnectOptions {
    let mut options = ConnectOptions::new();

    if let Some(user) = &config.username {
        options = options.with_user(user.clone(), config.password.clone().unwrap_or_default());
    }
    if !config.header_timeout_per_request.is_zero() {
        options = options.with_timeout(config.header_timeout_per_request);
    }
    if !config.dial_timeout.is_zero() {
        options = options.with_connect_timeout(config.dial_timeout);
    }
    if !config.dial_keep_alive_time.is_zero() {
        options = options.with_keep_alive(config.dial_keep_alive_time, config.dial_keep_alive_timeout);
    }
    options = options.with_keep_alive_while_idle(config.permit_without_stream);

    if let Some(tls) = &config.tls {
        options = options.with_tls(tls_options(tls));
    }
    if let Some(hook) = &config.dial_options {
        options = hook.apply(options);
    }

    options
}

fn tls_options(tls: &TlsConfig) -> TlsOptions {
    let mut options = TlsOptions::new();
    if let Some(ca) = &tls.ca_pem {
        options = options.ca_certificate(Certificate::from_pem(ca));
    }
    if let Some((cert, key)) = &tls.identity {
        options = options.identity(Identity::from_pem(cert, key));
    }
    if let Some(domain) = &tls.domain_name {
        options = options.domain_name(domain.clone());
    }
    options
}

/// True if `version` ("3.5.9") is at least `MIN_CLUSTER_VERSION`
pub fn version_supported(version: &str) -> bool {
    let mut parts = version.split('.').map(|p| p.parse::<u32>());
    match (parts.next(), parts.next()) {
        (Some(Ok(major)), Some(Ok(minor))) => (major, minor) >= MIN_CLUSTER_VERSION,
        _ => false,
    }
}

fn header(h: Option<&ResponseHeader>) -> Header {
    h.map(|h| Header {
        cluster_id: h.cluster_id(),
        revision: h.revision(),
    })
    .unwrap_or_default()
}

fn key_value(kv: &etcd_client::KeyValue) -> KeyValue {
    KeyValue {
        key: String::from_utf8_lossy(kv.key()).into_owned(),
        value: String::from_utf8_lossy(kv.value()).into_owned(),
        create_revision: kv.create_revision(),
        mod_revision: kv.mod_revision(),
        version: kv.version(),
        lease: kv.lease(),
    }
}

fn put_options(lease: PutLease) -> Option<PutOptions> {
    match lease {
        PutLease::None => None,
        PutLease::Lease(id) => Some(PutOptions::new().with_lease(id)),
        PutLease::Keep => Some(PutOptions::new().with_ignore_lease()),
    }
}

// =============================================================================
// KvApi
// =============================================================================

#[async_trait]
impl KvApi for GrpcKvApi {
    async fn range(&self, key: &str, opts: RangeOptions) -> Result<RangeResult> {
        let mut get = GetOptions::new();
        if opts.prefix {
            get = get.with_prefix();
        }
        if opts.count_only {
            get = get.with_count_only();
        }
        if opts.limit > 0 {
            get = get.with_limit(opts.limit);
        }

        let resp = self.client.kv_client().get(key, Some(get)).await?;
        Ok(RangeResult {
            header: header(resp.header()),
            kvs: resp.kvs().iter().map(key_value).collect(),
            count: resp.count(),
        })
    }

    async fn put(&self, key: &str, value: &str, lease: PutLease) -> Result<Header> {
        let resp = self.client.kv_client().put(key, value, put_options(lease)).await?;
        Ok(header(resp.header()))
    }

    async fn put_if(&self, key: &str, value: &str, lease: PutLease, cond: Condition) -> Result<TxnResult> {
        let compare = match cond {
            Condition::Absent => Compare::create_revision(key, CompareOp::Equal, 0),
            Condition::Present => Compare::version(key, CompareOp::Greater, 0),
        };
        let txn = Txn::new()
            .when(vec![compare])
            .and_then(vec![TxnOp::put(key, value, put_options(lease))]);

        let resp = self.client.kv_client().txn(txn).await?;
        Ok(TxnResult {
            header: header(resp.header()),
            succeeded: resp.succeeded(),
        })
    }

    async fn delete_range(&self, key: &str, prefix: bool) -> Result<DeleteResult> {
        let options = prefix.then(|| DeleteOptions::new().with_prefix());
        let resp = self.client.kv_client().delete(key, options).await?;
        Ok(DeleteResult {
            header: header(resp.header()),
            deleted: resp.deleted(),
        })
    }

    async fn lease_grant(&self, ttl: i64) -> Result<i64> {
        let resp = self.client.lease_client().grant(ttl, None).await?;
        Ok(resp.id())
    }

    async fn lease_ttl(&self, id: i64) -> Result<i64> {
        let resp = self.client.lease_client().time_to_live(id, None).await?;
        Ok(resp.ttl())
    }
}
