//! Pluggable error and lifecycle hooks
//!
//! Every method has a logging default, so implementors override only the
//! extension points they care about.

use serde_json::Value;

use super::endpoint::Endpoint;
use super::error::{BridgeError, RemoteError, Result, TransportError};

/// Extension points invoked by an [`Endpoint`]
pub trait Hooks: Send + Sync {
    /// The frontend reported a failure for one of our requests.
    ///
    /// The returned error is what the caller of
    /// [`Endpoint::schedule_operation`] receives.
    fn on_frontend_error(&self, endpoint: &Endpoint, error: RemoteError, context: &Value) -> BridgeError {
        tracing::debug!(
            model_id = endpoint.model_id(),
            operation = %error.operation,
            %context,
            "frontend reported error"
        );
        BridgeError::Remote(error)
    }

    /// The transport rejected a send.
    ///
    /// `Ok(())` suppresses the failure; an error is returned to the caller
    /// that attempted the send.
    fn on_send_error(&self, endpoint: &Endpoint, error: TransportError, context: &Value) -> Result<()> {
        tracing::error!(
            model_id = endpoint.model_id(),
            error = %error,
            %context,
            "failed to send message to frontend"
        );
        Ok(())
    }

    /// A tracked task finished with an error.
    fn on_task_error(&self, endpoint: &Endpoint, error: &BridgeError, task: &str) {
        tracing::error!(model_id = endpoint.model_id(), task, error = %error, "tracked task failed");
    }

    /// An inbound message could not be decoded or dispatched.
    fn on_message_error(&self, endpoint: &Endpoint, error: &BridgeError, raw: &str) {
        tracing::warn!(model_id = endpoint.model_id(), error = %error, raw, "inbound message rejected");
    }

    /// A local handler failed an operation requested by the frontend.
    fn on_operation_error(&self, endpoint: &Endpoint, error: &BridgeError, context: &Value) {
        tracing::error!(
            model_id = endpoint.model_id(),
            error = %error,
            %context,
            "operation requested by frontend failed"
        );
    }

    /// The frontend acknowledged initialization.
    fn on_frontend_init(&self, endpoint: &Endpoint) {
        tracing::info!(
            model_id = endpoint.model_id(),
            class = endpoint.class_name(),
            "frontend ready"
        );
    }
}

/// Hooks that only log
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultHooks;

impl Hooks for DefaultHooks {}
