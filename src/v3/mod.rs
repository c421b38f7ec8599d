//! Current API Module
//!
//! Client for the store's gRPC API, built on `etcd-client`.
//!
//! ## Layout
//! - `Client` offers the legacy key/directory operations over a `KvApi`
//! - `GrpcKvApi` is the network backend
//! - `MemoryKvApi` keeps keys and leases in process
//!
//! ## Mapping
//! | Operation         | v3 requests                                    |
//! |-------------------|------------------------------------------------|
//! | `create`          | txn: `create_revision == 0` → put              |
//! | `create_in_order` | range (revision), txn put `dir/<rev+1>`        |
//! | `set`             | lease grant (if TTL), put                      |
//! | `get`             | range, lease TTL or prefix count               |
//! | `update`          | txn: `version > 0` → put keeping the lease     |
//! | `delete`          | delete, prefix count on miss                   |
//! | `delete_dir`      | prefix count, prefix delete, delete            |

mod api;
mod client;
mod config;
mod grpc;
mod key;
mod memory;

pub use api::{Condition, DeleteResult, Header, KeyValue, KvApi, PutLease, RangeOptions, RangeResult, TxnResult};
pub use client::Client;
pub use config::{
    Config, ConfigBuilder, DialOptions, TlsConfig, DEFAULT_ENDPOINT, DEFAULT_MAX_CALL_RECV_MSG_SIZE,
    DEFAULT_MAX_CALL_SEND_MSG_SIZE,
};
pub use grpc::{connect_options, version_supported, GrpcKvApi, MIN_CLUSTER_VERSION};
pub use key::Key;
pub use memory::{MemoryKvApi, DEFAULT_CLUSTER_ID};

pub use crate::logging::LogConfig;
