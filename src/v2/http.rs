//! HTTP keys API
//!
//! Talks to the store's `/v2/keys` endpoint with a blocking reqwest client.
//!
//! ## Endpoint Selection
//! Requests go to a pinned endpoint. If the connection to it cannot be
//! established, refused or timed out after `connect_timeout`, the pin moves
//! to the next endpoint and the request is sent there, at most once per
//! endpoint. Any HTTP response ends the attempt, whatever its status. A
//! header timeout is returned as is: the store may already have applied the
//! request.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::RwLock;
use rand::seq::SliceRandom;
use reqwest::blocking::{Client as HttpClient, RequestBuilder, Response as HttpResponse};
use reqwest::header::HeaderMap;
use reqwest::redirect::Policy;
use reqwest::{Method, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::{ApiError, BridgeError, Result};

use super::api::{
    normalize_key, CreateInOrderOptions, DeleteOptions, GetOptions, KeysApi, PrevExist, Response, SetOptions,
};
use super::config::{Config, EndpointSelectionMode, RedirectPolicy};

const INDEX_HEADER: &str = "X-Etcd-Index";
const CLUSTER_ID_HEADER: &str = "X-Etcd-Cluster-Id";

/// Keys API over HTTP
pub struct HttpKeysApi {
    http: HttpClient,

    /// Current endpoint list, replaced by `sync`
    endpoints: RwLock<Vec<Url>>,

    /// Index into `endpoints` of the endpoint that last answered
    pinned: AtomicUsize,

    selection_mode: EndpointSelectionMode,

    credentials: Option<(String, Option<String>)>,
}

/// A cluster member as listed by `/v2/members`
#[derive(Debug, Clone, Deserialize)]
struct Member {
    #[serde(default)]
    name: String,

    #[serde(rename = "clientURLs", default)]
    client_urls: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct Members {
    members: Vec<Member>,
}

impl HttpKeysApi {
    /// Build the HTTP client described by `config`
    ///
    /// Validates the endpoints but does not contact them.
    pub fn new(config: &Config) -> Result<Self> {
        let mut endpoints = config.parsed_endpoints()?;
        if config.selection_mode == EndpointSelectionMode::Random {
            endpoints.shuffle(&mut rand::thread_rng());
        }

        let redirect = match config.redirect_policy {
            RedirectPolicy::Limited(max) => Policy::limited(max),
            RedirectPolicy::None => Policy::none(),
        };

        let timeout = if config.header_timeout_per_request.is_zero() {
            None
        } else {
            Some(config.header_timeout_per_request)
        };

        // Members are always dialed directly
        let mut builder = HttpClient::builder()
            .redirect(redirect)
            .timeout(timeout)
            .no_proxy();
        if !config.connect_timeout.is_zero() {
            builder = builder.connect_timeout(config.connect_timeout);
        }

        let credentials = config
            .username
            .clone()
            .map(|user| (user, config.password.clone()));

        Ok(Self {
            http: builder.build()?,
            endpoints: RwLock::new(endpoints),
            pinned: AtomicUsize::new(0),
            selection_mode: config.selection_mode,
            credentials,
        })
    }

    /// Endpoints in the order they will be tried
    pub fn endpoints(&self) -> Vec<String> {
        let endpoints = self.endpoints.read();
        let start = self.pinned.load(Ordering::Relaxed) % endpoints.len().max(1);
        endpoints[start..]
            .iter()
            .chain(endpoints[..start].iter())
            .map(|u| u.to_string())
            .collect()
    }

    /// Replace the endpoint list with the cluster members' client URLs
    ///
    /// Under `PrioritizeLeader` the leader's URLs go first.
    pub fn sync(&self) -> Result<()> {
        let members: Members = decode_json(self.execute(Method::GET, &["members"], |req| req)?)?;
        let mut urls: Vec<Url> = members
            .members
            .iter()
            .flat_map(|m| m.client_urls.iter())
            .filter_map(|raw| Url::parse(raw).ok())
            .collect();

        if urls.is_empty() {
            return Err(BridgeError::Config("cluster reported no client URLs".to_string()));
        }

        match self.selection_mode {
            EndpointSelectionMode::Random => urls.shuffle(&mut rand::thread_rng()),
            EndpointSelectionMode::PrioritizeLeader => {
                let leader: Member = decode_json(self.execute(Method::GET, &["members", "leader"], |req| req)?)?;
                tracing::debug!("Leader is {}", leader.name);
                let leader_urls: Vec<Url> = leader
                    .client_urls
                    .iter()
                    .filter_map(|raw| Url::parse(raw).ok())
                    .collect();
                urls.sort_by_key(|u| !leader_urls.contains(u));
            }
        }

        tracing::debug!("Synced endpoints: {:?}", urls);
        *self.endpoints.write() = urls;
        self.pinned.store(0, Ordering::Relaxed);
        Ok(())
    }

    // =========================================================================
    // Request Plumbing
    // =========================================================================

    /// Send a request to `/v2/<path...>`, moving to the next endpoint on
    /// connection failures
    fn execute<F>(&self, method: Method, path: &[&str], customize: F) -> Result<HttpResponse>
    where
        F: Fn(RequestBuilder) -> RequestBuilder,
    {
        let endpoints = self.endpoints.read().clone();
        if endpoints.is_empty() {
            return Err(BridgeError::Config("endpoint list is empty".to_string()));
        }

        let start = self.pinned.load(Ordering::Relaxed) % endpoints.len();
        let mut failures = Vec::new();

        for offset in 0..endpoints.len() {
            let i = (start + offset) % endpoints.len();
            let url = api_url(&endpoints[i], path)?;

            let mut request = self.http.request(method.clone(), url);
            if let Some((user, pass)) = &self.credentials {
                request = request.basic_auth(user, pass.as_ref());
            }

            match customize(request).send() {
                Ok(resp) => {
                    if i != start {
                        self.pinned.store(i, Ordering::Relaxed);
                    }
                    return Ok(resp);
                }
                // Connect timeouts are reported as connect errors too
                Err(e) if e.is_connect() => {
                    tracing::warn!("Endpoint {} unreachable: {}", endpoints[i], e);
                    failures.push(format!("{}: {}", endpoints[i], e));
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(BridgeError::ClusterUnavailable(failures))
    }

    fn keys_request<F>(&self, method: Method, key: &str, customize: F) -> Result<Response>
    where
        F: Fn(RequestBuilder) -> RequestBuilder,
    {
        let key = normalize_key(key);
        let mut path = vec!["keys"];
        path.extend(key.split('/').filter(|s| !s.is_empty()));
        if path.len() == 1 {
            path.push("");
        }

        tracing::trace!("{} {}", method, key);
        let resp = self.execute(method, &path, customize)?;
        decode_keys_response(resp)
    }
}

/// `{endpoint}/v2/<segments...>`, keeping any path prefix of the endpoint
fn api_url(endpoint: &Url, segments: &[&str]) -> Result<Url> {
    let mut url = endpoint.clone();
    url.path_segments_mut()
        .map_err(|_| BridgeError::Config(format!("endpoint {} cannot be a base URL", endpoint)))?
        .pop_if_empty()
        .push("v2")
        .extend(segments);
    Ok(url)
}

fn header_str(headers: &HeaderMap, name: &str) -> String {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

/// Decode a keys API response, turning error bodies into `ApiError`
fn decode_keys_response(resp: HttpResponse) -> Result<Response> {
    let status = resp.status();
    let index = header_str(resp.headers(), INDEX_HEADER).parse().unwrap_or(0);
    let cluster_id = header_str(resp.headers(), CLUSTER_ID_HEADER);
    let body = resp.bytes()?;

    if status.is_success() {
        let mut out: Response = serde_json::from_slice(&body)?;
        out.index = index;
        out.cluster_id = cluster_id;
        return Ok(out);
    }

    match serde_json::from_slice::<ApiError>(&body) {
        Ok(api) => Err(BridgeError::Api(api)),
        Err(_) => Err(BridgeError::UnexpectedResponse {
            status: status.as_u16(),
            body: String::from_utf8_lossy(&body).into_owned(),
        }),
    }
}

fn decode_json<T: DeserializeOwned>(resp: HttpResponse) -> Result<T> {
    let status = resp.status();
    let body = resp.bytes()?;
    if !status.is_success() {
        return Err(BridgeError::UnexpectedResponse {
            status: status.as_u16(),
            body: String::from_utf8_lossy(&body).into_owned(),
        });
    }
    Ok(serde_json::from_slice(&body)?)
}

fn ttl_param(ttl: Duration) -> Option<String> {
    match ttl.as_secs() {
        0 => None,
        secs => Some(secs.to_string()),
    }
}

// =============================================================================
// KeysApi
// =============================================================================

impl KeysApi for HttpKeysApi {
    fn create(&self, key: &str, value: &str) -> Result<Response> {
        let opts = SetOptions {
            prev_exist: PrevExist::NoExist,
            ..SetOptions::default()
        };
        self.set(key, value, &opts)
    }

    fn create_in_order(&self, dir: &str, value: &str, opts: &CreateInOrderOptions) -> Result<Response> {
        let mut form = vec![("value", value.to_string())];
        if let Some(ttl) = ttl_param(opts.ttl) {
            form.push(("ttl", ttl));
        }
        self.keys_request(Method::POST, dir, |req| req.form(&form))
    }

    fn set(&self, key: &str, value: &str, opts: &SetOptions) -> Result<Response> {
        let mut query: Vec<(&str, String)> = Vec::new();
        if let Some(prev) = &opts.prev_value {
            query.push(("prevValue", prev.clone()));
        }
        if let Some(prev) = opts.prev_index {
            query.push(("prevIndex", prev.to_string()));
        }
        match opts.prev_exist {
            PrevExist::Exist => query.push(("prevExist", "true".to_string())),
            PrevExist::NoExist => query.push(("prevExist", "false".to_string())),
            PrevExist::Ignore => {}
        }
        if let Some(ttl) = ttl_param(opts.ttl) {
            query.push(("ttl", ttl));
        }
        if opts.refresh {
            query.push(("refresh", "true".to_string()));
        }
        if opts.dir {
            query.push(("dir", "true".to_string()));
        }
        if opts.no_value_on_success {
            query.push(("noValueOnSuccess", "true".to_string()));
        }

        let mut form = Vec::new();
        if !opts.refresh && !(opts.dir && value.is_empty()) {
            form.push(("value", value.to_string()));
        }

        self.keys_request(Method::PUT, key, |req| req.query(&query).form(&form))
    }

    fn get(&self, key: &str, opts: &GetOptions) -> Result<Response> {
        let mut query = Vec::new();
        if opts.recursive {
            query.push(("recursive", "true"));
        }
        if opts.sorted {
            query.push(("sorted", "true"));
        }
        if opts.quorum {
            query.push(("quorum", "true"));
        }
        self.keys_request(Method::GET, key, |req| req.query(&query))
    }

    fn update(&self, key: &str, value: &str) -> Result<Response> {
        let opts = SetOptions {
            prev_exist: PrevExist::Exist,
            ..SetOptions::default()
        };
        self.set(key, value, &opts)
    }

    fn delete(&self, key: &str, opts: &DeleteOptions) -> Result<Response> {
        let mut query: Vec<(&str, String)> = Vec::new();
        if let Some(prev) = &opts.prev_value {
            query.push(("prevValue", prev.clone()));
        }
        if let Some(prev) = opts.prev_index {
            query.push(("prevIndex", prev.to_string()));
        }
        if opts.recursive {
            query.push(("recursive", "true".to_string()));
        }
        if opts.dir {
            query.push(("dir", "true".to_string()));
        }
        self.keys_request(Method::DELETE, key, |req| req.query(&query))
    }
}
