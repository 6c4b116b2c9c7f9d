//! Request/response correlation between a backend and a workbench frontend
//!
//! The [`Endpoint`] is the centre of this module. Everything else is a part it
//! is assembled from: waiters and the pending table, the ready handshake, the
//! task tracker, transforms and connection handles, hooks and handlers.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;
use std::time::Duration;

// Submodules
pub mod connection;
pub mod endpoint;
pub mod envelope;
pub mod error;
pub mod handler;
pub mod hooks;
pub mod ready;
pub mod registry;
pub mod tasks;
pub mod transform;
pub mod transport;
pub mod waiter;

pub use connection::{CidPart, Connection, ConnectionCatalog, ConnectionClass};
pub use endpoint::{Endpoint, EndpointBuilder, WeakEndpoint};
pub use error::{BridgeError, ConnectionError, RemoteError, TransformError, TransportError, WaiterError};
pub use handler::{OperationHandler, OperationRequest, OperationTable, Unsupported};
pub use hooks::{DefaultHooks, Hooks};
pub use ready::ReadyPhase;
pub use registry::EndpointRegistry;
pub use tasks::TrackedTask;
pub use transform::{IntoTransform, Resolved, Transform, TransformKind};
pub use transport::{ChannelTransport, FrontendPeer, InboundMessage, NdjsonTransport, Transport, channel_pair};

/// Configuration for an endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Hold operations until the frontend reports `ready`
    pub require_ready: bool,

    /// Give up waiting for readiness after this many milliseconds
    pub ready_timeout_ms: Option<u64>,

    /// Include the error source chain in errors reported to the frontend
    pub traceback_in_errors: bool,

    /// Enable debug tracing
    pub debug: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            require_ready: true,
            ready_timeout_ms: None,
            traceback_in_errors: false,
            debug: false,
        }
    }
}

impl BridgeConfig {
    /// Ready timeout as a duration
    pub fn ready_timeout(&self) -> Option<Duration> {
        self.ready_timeout_ms.map(Duration::from_millis)
    }

    /// Load a JSON config file. Missing keys take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let data = fs::read(path).with_context(|| format!("Failed to read config: {:?}", path))?;
        serde_json::from_slice(&data).with_context(|| format!("Failed to parse config: {:?}", path))
    }

    /// Write the config as pretty JSON, replacing `path` atomically.
    pub fn save(&self, path: &Path) -> Result<()> {
        let data = serde_json::to_vec_pretty(self).context("Failed to serialize config")?;
        let temp_path = path.with_extension("tmp");

        let mut file = File::create(&temp_path)
            .with_context(|| format!("Failed to create temp file: {:?}", temp_path))?;
        file.write_all(&data).context("Failed to write config")?;
        file.sync_all().context("Failed to sync config")?;
        drop(file);

        fs::rename(&temp_path, path)
            .with_context(|| format!("Failed to rename {:?} to {:?}", temp_path, path))?;
        Ok(())
    }
}
