//! Legacy API Module
//!
//! Client for the store's HTTP keys API (`/v2/keys`).
//!
//! ## Layout
//! - `Client` maps the simplified operations onto a `KeysApi`
//! - `HttpKeysApi` is the network backend
//! - `MemoryKeysApi` keeps the tree in process, for tests and embedding
//!
//! ## Example
//! ```no_run
//! use std::time::Duration;
//! use etcd_bridge::v2::{Client, Config};
//!
//! let client = Client::new(Config::default())?;
//! client.set_dir("/app", Duration::from_secs(30))?;
//! client.create("/app/name", "demo")?;
//! assert_eq!(client.get("/app/name")?.value, "demo");
//! # Ok::<(), etcd_bridge::BridgeError>(())
//! ```

mod api;
mod client;
mod config;
mod http;
mod key;
mod memory;

pub use api::{
    normalize_key, CreateInOrderOptions, DeleteOptions, GetOptions, KeysApi, Node, PrevExist, Response,
    SetOptions,
};
pub use client::Client;
pub use config::{Config, ConfigBuilder, EndpointSelectionMode, RedirectPolicy, DEFAULT_ENDPOINT};
pub use http::HttpKeysApi;
pub use key::Key;
pub use memory::{MemoryKeysApi, DEFAULT_CLUSTER_ID};
