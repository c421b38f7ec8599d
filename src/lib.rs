//! # etcd-bridge
//!
//! Thin clients for an etcd-compatible key-value store:
//! - `v2`: the legacy HTTP keys API, blocking
//! - `v3`: the gRPC API, async
//!
//! Both expose the same small surface (create, set, get, update, delete on
//! keys and directories) and pass store errors through untouched.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────┐      ┌──────────────────────────┐
//! │      v2::Client<K>       │      │      v3::Client<K>       │
//! │   (Config → KeysApi)     │      │    (Config → KvApi)      │
//! └────────────┬─────────────┘      └────────────┬─────────────┘
//!              │                                 │
//!       ┌──────┴──────┐                   ┌──────┴──────┐
//!       ▼             ▼                   ▼             ▼
//! ┌───────────┐ ┌───────────┐       ┌───────────┐ ┌───────────┐
//! │   HTTP    │ │  Memory   │       │   gRPC    │ │  Memory   │
//! │ (reqwest) │ │  (tree)   │       │(etcd-cli.)│ │ (leases)  │
//! └───────────┘ └───────────┘       └───────────┘ └───────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod clock;
pub mod logging;

pub mod v2;
pub mod v3;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{ApiError, BridgeError, Result};
pub use clock::{Clock, ManualClock, SystemClock};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of etcd-bridge
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
