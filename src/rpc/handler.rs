//! Handlers for operations requested by the frontend
//!
//! An endpoint owns one [`OperationHandler`]. Handlers compose by chaining:
//! an [`OperationTable`] answers the names it knows and hands everything else
//! to its fallback, ending at [`Unsupported`].

use futures::FutureExt;
use futures::future::BoxFuture;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use super::endpoint::Endpoint;
use super::error::{BridgeError, Result};
use super::transport::Buffer;

/// An operation the frontend asked this side to perform
#[derive(Clone)]
pub struct OperationRequest {
    /// Endpoint that received the request
    pub endpoint: Endpoint,
    /// Operation name
    pub operation: String,
    /// Operation payload
    pub payload: Value,
    /// Binary buffers sent with the request
    pub buffers: Vec<Buffer>,
}

/// Future returned by handlers
pub type HandlerFuture = BoxFuture<'static, Result<Value>>;

/// Performs operations requested by the frontend
pub trait OperationHandler: Send + Sync {
    /// Handle one request.
    ///
    /// Return [`BridgeError::UnsupportedOperation`] for unknown names so a
    /// chaining handler can try its fallback.
    fn handle(&self, request: OperationRequest) -> HandlerFuture;
}

/// Terminal handler rejecting everything
#[derive(Debug, Default, Clone, Copy)]
pub struct Unsupported;

impl OperationHandler for Unsupported {
    fn handle(&self, request: OperationRequest) -> HandlerFuture {
        futures::future::ready(Err(BridgeError::UnsupportedOperation(request.operation))).boxed()
    }
}

type HandlerFn = Arc<dyn Fn(OperationRequest) -> HandlerFuture + Send + Sync>;

/// Name → handler mapping with a fallback
#[derive(Clone)]
pub struct OperationTable {
    handlers: HashMap<String, HandlerFn>,
    fallback: Arc<dyn OperationHandler>,
}

impl Default for OperationTable {
    fn default() -> Self {
        Self::new()
    }
}

impl OperationTable {
    /// Empty table falling back to [`Unsupported`].
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
            fallback: Arc::new(Unsupported),
        }
    }

    /// Register `handler` for `operation`, replacing any previous one.
    pub fn on<F, Fut>(mut self, operation: impl Into<String>, handler: F) -> Self
    where
        F: Fn(OperationRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        let handler: HandlerFn = Arc::new(move |request| handler(request).boxed());
        self.handlers.insert(operation.into(), handler);
        self
    }

    /// Handler consulted for names this table does not know.
    pub fn with_fallback(mut self, fallback: impl OperationHandler + 'static) -> Self {
        self.fallback = Arc::new(fallback);
        self
    }

    /// Whether `operation` is handled by this table directly.
    pub fn handles(&self, operation: &str) -> bool {
        self.handlers.contains_key(operation)
    }

    /// Names handled directly, sorted.
    pub fn operations(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.keys().cloned().collect();
        names.sort();
        names
    }
}

impl OperationHandler for OperationTable {
    fn handle(&self, request: OperationRequest) -> HandlerFuture {
        match self.handlers.get(&request.operation) {
            Some(handler) => handler(request),
            None => self.fallback.handle(request),
        }
    }
}
