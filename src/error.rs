//! Error types for etcd-bridge
//!
//! Provides a unified error type for both API generations. Errors reported by
//! the store are carried unmodified; callers inspect the store's codes.

use std::fmt;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

/// Result type alias using BridgeError
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Unified error type for etcd-bridge operations
#[derive(Debug, Error)]
pub enum BridgeError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Legacy (v2) Errors
    // -------------------------------------------------------------------------
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("All endpoints failed: {}", .0.join("; "))]
    ClusterUnavailable(Vec<String>),

    #[error("{0}")]
    Api(#[from] ApiError),

    #[error("Unexpected response ({status}): {body}")]
    UnexpectedResponse { status: u16, body: String },

    // -------------------------------------------------------------------------
    // Current (v3) Errors
    // -------------------------------------------------------------------------
    #[error("gRPC error: {0}")]
    Grpc(#[from] etcd_client::Error),

    #[error("Key not found: {0}")]
    KeyNotFound(String),

    #[error("Key already exists: {0}")]
    KeyExists(String),

    #[error("Not a file: {0}")]
    NotAFile(String),

    #[error("Not a directory: {0}")]
    NotADirectory(String),

    #[error("Directory not empty: {0}")]
    DirNotEmpty(String),

    #[error("Lease not found: {0}")]
    LeaseNotFound(i64),

    #[error("Request of {size} bytes exceeds send limit of {limit} bytes")]
    RequestTooLarge { size: usize, limit: usize },

    #[error("Response of {size} bytes exceeds receive limit of {limit} bytes")]
    ResponseTooLarge { size: usize, limit: usize },

    #[error("Dial timed out after {0:?}")]
    DialTimeout(Duration),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Unsupported cluster: {0}")]
    UnsupportedCluster(String),

    /// A legacy operation with no v3 counterpart
    #[error("Not supported by the v3 API: {0}")]
    Unsupported(String),

    /// The store rejects requests on the empty key
    #[error("Key is not provided")]
    EmptyKey,
}

impl From<serde_json::Error> for BridgeError {
    fn from(e: serde_json::Error) -> Self {
        BridgeError::Serialization(e.to_string())
    }
}

/// An error reported by the v2 keys API
///
/// Decoded from the store's JSON error body, e.g.
/// `{"errorCode":100,"message":"Key not found","cause":"/foo","index":12}`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ApiError {
    #[serde(rename = "errorCode")]
    pub code: u32,

    pub message: String,

    #[serde(default)]
    pub cause: String,

    /// Store index at the time of the error
    #[serde(default)]
    pub index: u64,
}

impl ApiError {
    pub const KEY_NOT_FOUND: u32 = 100;
    pub const TEST_FAILED: u32 = 101;
    pub const NOT_FILE: u32 = 102;
    pub const NOT_DIR: u32 = 104;
    pub const NODE_EXIST: u32 = 105;
    pub const ROOT_RONLY: u32 = 107;
    pub const DIR_NOT_EMPTY: u32 = 108;
    pub const UNAUTHORIZED: u32 = 110;
    pub const VALUE_REQUIRED: u32 = 200;
    pub const PREV_VALUE_REQUIRED: u32 = 201;
    pub const TTL_NAN: u32 = 202;
    pub const INDEX_NAN: u32 = 203;
    pub const REFRESH_VALUE: u32 = 212;
    pub const REFRESH_TTL_REQUIRED: u32 = 213;
    pub const RAFT_INTERNAL: u32 = 300;
    pub const LEADER_ELECT: u32 = 301;

    /// Build an error with the store's canonical message for `code`
    pub fn new(code: u32, cause: impl Into<String>, index: u64) -> Self {
        Self {
            code,
            message: Self::message_for(code).to_string(),
            cause: cause.into(),
            index,
        }
    }

    fn message_for(code: u32) -> &'static str {
        match code {
            Self::KEY_NOT_FOUND => "Key not found",
            Self::TEST_FAILED => "Compare failed",
            Self::NOT_FILE => "Not a file",
            Self::NOT_DIR => "Not a directory",
            Self::NODE_EXIST => "Key already exists",
            Self::ROOT_RONLY => "Root is read only",
            Self::DIR_NOT_EMPTY => "Directory not empty",
            Self::UNAUTHORIZED => "The request requires user authentication",
            Self::VALUE_REQUIRED => "Value is Required in POST form",
            Self::PREV_VALUE_REQUIRED => "PrevValue is Required in POST form",
            Self::TTL_NAN => "The given TTL in POST form is not a number",
            Self::INDEX_NAN => "The given index in POST form is not a number",
            Self::REFRESH_VALUE => "Value provided on refresh",
            Self::REFRESH_TTL_REQUIRED => "A TTL must be provided on refresh",
            Self::RAFT_INTERNAL => "Raft Internal Error",
            Self::LEADER_ELECT => "During Leader Election",
            _ => "Unknown error",
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} ({}) [{}]", self.code, self.message, self.cause, self.index)
    }
}

impl std::error::Error for ApiError {}

impl BridgeError {
    /// The store's error code, when this is a v2 API error
    pub fn api_code(&self) -> Option<u32> {
        match self {
            BridgeError::Api(e) => Some(e.code),
            _ => None,
        }
    }
}
