//! Client-scoped logging
//!
//! A client given a `LogConfig` records its events through its own
//! subscriber instead of the process-wide one.

use tracing::Dispatch;
use tracing_subscriber::{fmt, EnvFilter};

use crate::error::{BridgeError, Result};

/// Logging configuration for one client
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// `EnvFilter` directives, e.g. `"info,etcd_bridge=debug"`
    pub filter: String,

    /// Print the event target
    pub with_target: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            with_target: true,
        }
    }
}

impl LogConfig {
    /// Build the dispatcher this config describes
    pub fn dispatch(&self) -> Result<Dispatch> {
        let filter = EnvFilter::try_new(&self.filter)
            .map_err(|e| BridgeError::Config(format!("invalid log filter {:?}: {}", self.filter, e)))?;

        let subscriber = fmt()
            .with_env_filter(filter)
            .with_target(self.with_target)
            .finish();

        Ok(Dispatch::new(subscriber))
    }
}
