//! Endpoints: request/response correlation over an uncorrelated transport
//!
//! An [`Endpoint`] is the local half of a pair of objects talking over one
//! transport. Outgoing operations get a fresh request id and a waiter in the
//! pending table; inbound messages are demultiplexed into waiter resolutions,
//! frontend-originated operations, or handshake transitions.

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;
use uuid::Uuid;

use super::BridgeConfig;
use super::envelope::{
    InitPhase, Inbound, NotificationEnvelope, RemoteResponseEnvelope, RequestEnvelope, classify,
};
use super::error::{BridgeError, ErrorReport, RemoteError, Result, WaiterError};
use super::handler::{OperationHandler, OperationRequest, Unsupported};
use super::hooks::{DefaultHooks, Hooks};
use super::ready::{ReadyPhase, ReadyState};
use super::registry::{EndpointRegistry, Slot};
use super::tasks::{TaskTracker, TrackedTask};
use super::transform::{self, IntoTransform, Resolved};
use super::transport::{Buffer, InboundMessage, Transport};
use super::waiter::{Outcome, Waiter};

struct PendingRequest {
    operation: String,
    waiter: Waiter,
}

/// Resolved request ids kept to recognise duplicate responses.
const RESOLVED_HISTORY: usize = 1024;

#[derive(Default)]
struct ResolvedIds {
    order: VecDeque<String>,
    ids: HashSet<String>,
}

impl ResolvedIds {
    fn record(&mut self, request_id: &str) {
        if !self.ids.insert(request_id.to_string()) {
            return;
        }
        self.order.push_back(request_id.to_string());
        if self.order.len() > RESOLVED_HISTORY {
            if let Some(oldest) = self.order.pop_front() {
                self.ids.remove(&oldest);
            }
        }
    }

    fn contains(&self, request_id: &str) -> bool {
        self.ids.contains(request_id)
    }
}

/// Shared state behind an [`Endpoint`]
pub(crate) struct EndpointInner {
    model_id: String,
    class_name: String,
    singleton: bool,
    config: BridgeConfig,
    transport: Arc<dyn Transport>,
    handler: Arc<dyn OperationHandler>,
    hooks: Arc<dyn Hooks>,
    pending: Mutex<HashMap<String, PendingRequest>>,
    resolved: Mutex<ResolvedIds>,
    tasks: TaskTracker,
    ready: ReadyState,
}

impl Drop for EndpointInner {
    fn drop(&mut self) {
        EndpointRegistry::global().purge(&self.model_id);
        let aborted = self.tasks.abort_all();
        if !self.ready.is_closed() {
            self.transport.close();
        }
        tracing::debug!(model_id = %self.model_id, aborted, "endpoint dropped");
    }
}

/// Local half of a frontend/backend object pair
///
/// Cloning is cheap; all clones share one pending table, task set and
/// ready state.
#[derive(Clone)]
pub struct Endpoint {
    inner: Arc<EndpointInner>,
}

/// Non-owning reference to an [`Endpoint`]
#[derive(Clone)]
pub struct WeakEndpoint {
    inner: Weak<EndpointInner>,
}

impl WeakEndpoint {
    /// Upgrade if the endpoint is still alive.
    pub fn upgrade(&self) -> Option<Endpoint> {
        self.inner.upgrade().map(Endpoint::from_inner)
    }
}

/// Configures and creates endpoints through the identity registry
pub struct EndpointBuilder {
    class_name: String,
    model_id: Option<String>,
    singleton: bool,
    config: BridgeConfig,
    transport: Arc<dyn Transport>,
    handler: Arc<dyn OperationHandler>,
    hooks: Arc<dyn Hooks>,
}

impl EndpointBuilder {
    /// Start building an endpoint of `class_name` talking over `transport`.
    pub fn new(class_name: impl Into<String>, transport: impl Transport + 'static) -> Self {
        Self::with_transport(class_name, Arc::new(transport))
    }

    /// Like [`EndpointBuilder::new`] with a shared transport.
    pub fn with_transport(class_name: impl Into<String>, transport: Arc<dyn Transport>) -> Self {
        Self {
            class_name: class_name.into(),
            model_id: None,
            singleton: false,
            config: BridgeConfig::default(),
            transport,
            handler: Arc::new(Unsupported),
            hooks: Arc::new(DefaultHooks),
        }
    }

    /// Use an explicit model id instead of a random one.
    pub fn model_id(mut self, model_id: impl Into<String>) -> Self {
        self.model_id = Some(model_id.into());
        self
    }

    /// Allow at most one live instance of this class.
    pub fn singleton(mut self, singleton: bool) -> Self {
        self.singleton = singleton;
        self
    }

    /// Endpoint configuration
    pub fn config(mut self, config: BridgeConfig) -> Self {
        self.config = config;
        self
    }

    /// Handler for operations requested by the frontend
    pub fn handler(mut self, handler: impl OperationHandler + 'static) -> Self {
        self.handler = Arc::new(handler);
        self
    }

    /// Error and lifecycle hooks
    pub fn hooks(mut self, hooks: impl Hooks + 'static) -> Self {
        self.hooks = Arc::new(hooks);
        self
    }

    /// Return the live endpoint for this model id or singleton slot, or create one.
    ///
    /// When an instance already exists the builder's transport, handler and
    /// hooks are discarded.
    pub fn build(self) -> Endpoint {
        let model_id = self.model_id.clone();
        let singleton_class = self.singleton.then(|| self.class_name.clone());
        let slot = Slot {
            model_id: model_id.as_deref(),
            singleton_class: singleton_class.as_deref(),
        };

        let (endpoint, created) = EndpointRegistry::global().get_or_create(slot, || {
            Endpoint::from_inner(Arc::new(EndpointInner {
                model_id: self
                    .model_id
                    .unwrap_or_else(|| Uuid::new_v4().simple().to_string()),
                class_name: self.class_name,
                singleton: self.singleton,
                config: self.config,
                transport: self.transport,
                handler: self.handler,
                hooks: self.hooks,
                pending: Mutex::new(HashMap::new()),
                resolved: Mutex::new(ResolvedIds::default()),
                tasks: TaskTracker::new(),
                ready: ReadyState::new(),
            }))
        });

        if created {
            tracing::debug!(
                model_id = endpoint.model_id(),
                class = endpoint.class_name(),
                singleton = endpoint.is_singleton(),
                "endpoint created"
            );
        }
        endpoint
    }
}

/// Removes an abandoned request from the pending table.
struct PendingGuard<'a> {
    endpoint: &'a Endpoint,
    request_id: &'a str,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if self.endpoint.inner.pending.lock().remove(self.request_id).is_some() {
            tracing::debug!(request_id = self.request_id, "abandoned pending request removed");
        }
    }
}

impl Endpoint {
    pub(crate) fn from_inner(inner: Arc<EndpointInner>) -> Self {
        Self { inner }
    }

    pub(crate) fn weak_inner(&self) -> Weak<EndpointInner> {
        Arc::downgrade(&self.inner)
    }

    /// Look up a live endpoint by model id.
    pub fn get(model_id: &str) -> Option<Endpoint> {
        EndpointRegistry::global().get(model_id)
    }

    /// Non-owning handle
    pub fn downgrade(&self) -> WeakEndpoint {
        WeakEndpoint {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Model id
    pub fn model_id(&self) -> &str {
        &self.inner.model_id
    }

    /// Class name given at construction
    pub fn class_name(&self) -> &str {
        &self.inner.class_name
    }

    /// Whether this endpoint occupies its class's singleton slot
    pub fn is_singleton(&self) -> bool {
        self.inner.singleton
    }

    /// Configuration
    pub fn config(&self) -> &BridgeConfig {
        &self.inner.config
    }

    /// Current handshake phase
    pub fn phase(&self) -> ReadyPhase {
        self.inner.ready.phase()
    }

    /// Whether the frontend acknowledged initialization
    pub fn is_ready(&self) -> bool {
        self.inner.ready.is_ready()
    }

    /// Whether the endpoint was closed
    pub fn is_closed(&self) -> bool {
        self.inner.ready.is_closed()
    }

    /// Number of requests awaiting a response
    pub fn pending_count(&self) -> usize {
        self.inner.pending.lock().len()
    }

    /// Number of outstanding tracked tasks
    pub fn task_count(&self) -> usize {
        self.inner.tasks.len()
    }

    /// Names of outstanding tracked tasks
    pub fn task_names(&self) -> Vec<String> {
        self.inner.tasks.names()
    }

    /// Whether two handles refer to the same endpoint.
    pub fn ptr_eq(&self, other: &Endpoint) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            Err(BridgeError::Closed(self.inner.model_id.clone()))
        } else {
            Ok(())
        }
    }

    /// Enter the `initializing` phase.
    pub fn begin_init(&self) {
        if self.inner.ready.begin_init() {
            tracing::debug!(model_id = %self.inner.model_id, "frontend initializing");
        }
    }

    /// Enter the `ready` phase, releasing gated operations.
    pub fn mark_ready(&self) {
        if self.inner.ready.mark_ready() {
            self.inner.hooks.on_frontend_init(self);
        }
    }

    /// Suspend until the frontend is ready.
    ///
    /// Fails with [`BridgeError::Closed`] if the endpoint closes first and
    /// with [`BridgeError::ReadyTimeout`] when the configured timeout elapses.
    pub async fn wait_ready(&self) -> Result<()> {
        let phase = match self.inner.config.ready_timeout() {
            Some(timeout) => tokio::time::timeout(timeout, self.inner.ready.wait_ready())
                .await
                .map_err(|_| BridgeError::ReadyTimeout(timeout.as_millis() as u64))?,
            None => self.inner.ready.wait_ready().await,
        };

        match phase {
            ReadyPhase::Ready => Ok(()),
            _ => Err(BridgeError::Closed(self.inner.model_id.clone())),
        }
    }

    /// Ask the frontend to perform `operation` and await its result.
    ///
    /// The transform is validated before anything is sent; the reply payload
    /// is passed through it. Remote failures surface as errors naming the
    /// operation.
    pub async fn schedule_operation<T>(&self, operation: &str, args: Value, transform: T) -> Result<Resolved>
    where
        T: IntoTransform,
    {
        self.ensure_open()?;
        if operation.trim().is_empty() {
            return Err(BridgeError::InvalidOperation(operation.to_string()));
        }
        let transform = transform.into_transform()?;

        if self.inner.config.require_ready {
            self.wait_ready().await?;
        }
        self.ensure_open()?;

        let request_id = Uuid::new_v4().to_string();
        let envelope = RequestEnvelope {
            request_id: request_id.clone(),
            operation: operation.to_string(),
            args,
            transform: transform.to_value()?,
        };
        let message = serde_json::to_value(&envelope)?;

        let (waiter, handle) = Waiter::new(request_id.clone());
        self.inner.pending.lock().insert(
            request_id.clone(),
            PendingRequest {
                operation: operation.to_string(),
                waiter,
            },
        );
        let _guard = PendingGuard {
            endpoint: self,
            request_id: &request_id,
        };

        tracing::debug!(
            model_id = %self.inner.model_id,
            %request_id,
            operation,
            transform = ?transform.kind(),
            "scheduling operation"
        );

        if let Err(err) = self.inner.transport.send(message, Vec::new()) {
            let context = json!({ "requestId": request_id, "operation": operation });
            self.inner.hooks.on_send_error(self, err, &context)?;
        }

        match handle.wait().await? {
            Outcome::Payload(payload) => transform::apply(&transform, payload, Some(self)),
            Outcome::Error(error) => {
                let context = json!({ "requestId": request_id, "operation": operation });
                Err(self.inner.hooks.on_frontend_error(self, error, &context))
            }
        }
    }

    /// Raw operation whose payload is deserialized into `T`.
    pub async fn call<T>(&self, operation: &str, args: Value) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let resolved = self
            .schedule_operation(operation, args, transform::Transform::Raw)
            .await?;
        Ok(serde_json::from_value(resolved.into_value())?)
    }

    /// Send an operation the frontend will not reply to.
    ///
    /// Not gated on readiness. Send failures go through `on_send_error`.
    pub fn notify(&self, operation: &str, args: Value) -> Result<()> {
        self.ensure_open()?;
        let message = serde_json::to_value(NotificationEnvelope {
            operation: operation.to_string(),
            args,
        })?;
        self.send(message, Vec::new(), || json!({ "operation": operation }))
    }

    fn send<C>(&self, message: Value, buffers: Vec<Buffer>, context: C) -> Result<()>
    where
        C: FnOnce() -> Value,
    {
        match self.inner.transport.send(message, buffers) {
            Ok(()) => Ok(()),
            Err(err) => self.inner.hooks.on_send_error(self, err, &context()),
        }
    }

    /// Spawn work owned by this endpoint.
    ///
    /// The task is aborted when the endpoint closes; errors are reported to
    /// `on_task_error` and returned to whoever awaits the task.
    pub fn spawn_task<T, F>(&self, name: impl Into<String>, future: F) -> TrackedTask<T>
    where
        T: Send + 'static,
        F: Future<Output = Result<T>> + Send + 'static,
    {
        let name = name.into();
        let task_name = name.clone();
        let weak = self.downgrade();
        let hooks = self.inner.hooks.clone();
        self.inner.tasks.spawn(name, future, move |err| match weak.upgrade() {
            Some(endpoint) => hooks.on_task_error(&endpoint, err, &task_name),
            None => tracing::error!(task = %task_name, error = %err, "task of dropped endpoint failed"),
        })
    }

    /// Demultiplex one raw inbound message.
    ///
    /// Decoding and dispatch failures go to `on_message_error` and are not
    /// returned. Waiter invariant violations are returned to the caller.
    pub fn on_message(&self, raw: &[u8], buffers: Vec<Buffer>) -> Result<()> {
        match self.dispatch(raw, buffers) {
            Ok(()) => Ok(()),
            Err(err @ BridgeError::Waiter(_)) => Err(err),
            Err(err) => {
                self.inner
                    .hooks
                    .on_message_error(self, &err, &String::from_utf8_lossy(raw));
                Ok(())
            }
        }
    }

    fn dispatch(&self, raw: &[u8], buffers: Vec<Buffer>) -> Result<()> {
        let message: Value = serde_json::from_slice(raw)
            .map_err(|err| BridgeError::Protocol(format!("undecodable message: {err}")))?;

        match classify(message, buffers)? {
            Inbound::Response {
                request_id,
                payload,
                error,
            } => self.resolve(&request_id, payload, error),
            Inbound::RemoteRequest {
                remote_request_id,
                operation,
                payload,
                buffers,
            } => {
                self.ensure_open()?;
                self.handle_remote_request(remote_request_id, operation, payload, buffers);
                Ok(())
            }
            Inbound::Init(InitPhase::Initializing) => {
                self.begin_init();
                Ok(())
            }
            Inbound::Init(InitPhase::Ready) => {
                self.mark_ready();
                Ok(())
            }
            Inbound::Closed => {
                self.close();
                Ok(())
            }
        }
    }

    fn resolve(&self, request_id: &str, payload: Value, error: Option<String>) -> Result<()> {
        let Some(pending) = self.inner.pending.lock().remove(request_id) else {
            if self.inner.resolved.lock().contains(request_id) {
                return Err(WaiterError::AlreadySet(request_id.to_string()).into());
            }
            tracing::debug!(
                model_id = %self.inner.model_id,
                request_id,
                "response for unknown or abandoned request ignored"
            );
            return Ok(());
        };
        self.inner.resolved.lock().record(request_id);

        let outcome = match error {
            Some(message) => Outcome::Error(RemoteError {
                operation: pending.operation,
                message,
            }),
            None => Outcome::Payload(payload),
        };
        pending.waiter.set(outcome)?;
        Ok(())
    }

    fn handle_remote_request(
        &self,
        remote_request_id: String,
        operation: String,
        payload: Value,
        buffers: Vec<Buffer>,
    ) {
        tracing::debug!(
            model_id = %self.inner.model_id,
            %remote_request_id,
            %operation,
            "operation requested by frontend"
        );

        let endpoint = self.clone();
        let request = OperationRequest {
            endpoint: self.clone(),
            operation: operation.clone(),
            payload,
            buffers,
        };
        let task_name = format!("remote:{operation}");

        self.spawn_task(task_name, async move {
            let context = json!({ "remoteRequestId": remote_request_id, "operation": operation });
            let reply = match endpoint.inner.handler.handle(request).await {
                Ok(payload) => RemoteResponseEnvelope::success(remote_request_id, payload),
                Err(err) => {
                    endpoint.inner.hooks.on_operation_error(&endpoint, &err, &context);
                    let report = ErrorReport::from_error(&err, endpoint.inner.config.traceback_in_errors);
                    RemoteResponseEnvelope::failure(remote_request_id, report)
                }
            };
            let message = serde_json::to_value(&reply)?;
            endpoint.send(message, Vec::new(), || context)
        });
    }

    /// Feed messages from `inbound` into [`Endpoint::on_message`] in order.
    ///
    /// The loop holds only a weak reference. When the stream ends the
    /// endpoint is closed.
    pub fn listen(&self, mut inbound: mpsc::UnboundedReceiver<InboundMessage>) -> TrackedTask<()> {
        let weak = self.downgrade();
        self.spawn_task("listen", async move {
            while let Some(message) = inbound.recv().await {
                let Some(endpoint) = weak.upgrade() else {
                    break;
                };
                if let Err(err) = endpoint.on_message(&message.data, message.buffers) {
                    tracing::error!(model_id = endpoint.model_id(), error = %err, "invariant violated while handling message");
                }
                if endpoint.is_closed() {
                    return Ok(());
                }
            }

            if let Some(endpoint) = weak.upgrade() {
                tracing::debug!(model_id = endpoint.model_id(), "inbound stream ended");
                endpoint.close();
            }
            Ok(())
        })
    }

    /// Close the endpoint.
    ///
    /// Unregisters it, drops every pending waiter (their callers get
    /// [`BridgeError::Cancelled`]), aborts tracked tasks and closes the
    /// transport. Idempotent.
    pub fn close(&self) {
        if !self.inner.ready.close() {
            return;
        }

        EndpointRegistry::global().unregister(&self.inner.model_id, Arc::as_ptr(&self.inner));
        let dropped: Vec<PendingRequest> = self.inner.pending.lock().drain().map(|(_, p)| p).collect();
        let pending = dropped.len();
        drop(dropped);
        let aborted = self.inner.tasks.abort_all();
        self.inner.transport.close();

        tracing::debug!(
            model_id = %self.inner.model_id,
            pending,
            aborted,
            "endpoint closed"
        );
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("model_id", &self.inner.model_id)
            .field("class_name", &self.inner.class_name)
            .field("phase", &self.phase())
            .field("pending", &self.pending_count())
            .finish()
    }
}

impl fmt::Debug for WeakEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakEndpoint")
            .field("alive", &(self.inner.strong_count() > 0))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::handler::OperationTable;
    use crate::rpc::transport::channel_pair;

    fn ungated() -> BridgeConfig {
        BridgeConfig {
            require_ready: false,
            ..BridgeConfig::default()
        }
    }

    #[tokio::test]
    async fn test_build_reuses_model_id() {
        let (transport, _inbound, _peer) = channel_pair();
        let first = EndpointBuilder::new("Probe", transport)
            .model_id("endpoint-test-reuse")
            .build();

        let (other, _inbound2, _peer2) = channel_pair();
        let second = EndpointBuilder::new("Probe", other)
            .model_id("endpoint-test-reuse")
            .build();
        assert!(first.ptr_eq(&second));
        assert!(Endpoint::get("endpoint-test-reuse").is_some());

        first.close();
        assert!(Endpoint::get("endpoint-test-reuse").is_none());
    }

    #[tokio::test]
    async fn test_empty_operation_rejected() {
        let (transport, _inbound, mut peer) = channel_pair();
        let endpoint = EndpointBuilder::new("Probe", transport).config(ungated()).build();

        let err = endpoint
            .schedule_operation("  ", json!({}), "raw")
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::InvalidOperation(_)));
        assert!(peer.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_late_response_is_ignored() {
        let (transport, _inbound, _peer) = channel_pair();
        let endpoint = EndpointBuilder::new("Probe", transport).config(ungated()).build();

        let message = json!({"requestId": "never-sent", "payload": 1}).to_string();
        endpoint.on_message(message.as_bytes(), Vec::new()).unwrap();
        assert_eq!(endpoint.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_dropped_caller_clears_pending() {
        let (transport, _inbound, mut peer) = channel_pair();
        let endpoint = EndpointBuilder::new("Probe", transport).config(ungated()).build();

        let call = tokio::spawn({
            let endpoint = endpoint.clone();
            async move { endpoint.schedule_operation("slow", json!({}), "raw").await }
        });
        peer.recv().await.unwrap();
        assert_eq!(endpoint.pending_count(), 1);

        call.abort();
        let _ = call.await;
        assert_eq!(endpoint.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_send_error_hook_can_fail_the_call() {
        struct Strict;
        impl Hooks for Strict {
            fn on_send_error(&self, _: &Endpoint, error: crate::rpc::error::TransportError, _: &Value) -> Result<()> {
                Err(error.into())
            }
        }

        let (transport, _inbound, _peer) = channel_pair();
        transport.close();
        let endpoint = EndpointBuilder::new("Probe", transport)
            .config(ungated())
            .hooks(Strict)
            .build();

        let err = endpoint.schedule_operation("echo", json!({}), "raw").await.unwrap_err();
        assert!(matches!(err, BridgeError::Transport(_)));
        assert_eq!(endpoint.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_remote_request_failure_is_structured() {
        let (transport, inbound, mut peer) = channel_pair();
        let handler = OperationTable::new().on("boom", |_| async { Err(BridgeError::handler("kaput")) });
        let endpoint = EndpointBuilder::new("Probe", transport)
            .config(BridgeConfig {
                traceback_in_errors: true,
                ..ungated()
            })
            .handler(handler)
            .build();
        endpoint.listen(inbound);

        peer.request("f-1", "boom", json!({}));
        let reply = peer.recv().await.unwrap().message;
        assert_eq!(reply["remoteRequestId"], "f-1");
        assert_eq!(reply["error"]["kind"], "HandlerError");
        assert_eq!(reply["error"]["message"], "kaput");
        assert!(reply["error"]["traceback"].is_array());
        assert!(reply.get("payload").is_none());
    }

    #[tokio::test]
    async fn test_ready_timeout() {
        let (transport, _inbound, mut peer) = channel_pair();
        let endpoint = EndpointBuilder::new("Probe", transport)
            .config(BridgeConfig {
                ready_timeout_ms: Some(20),
                ..BridgeConfig::default()
            })
            .build();

        let err = endpoint.schedule_operation("echo", json!({}), "raw").await.unwrap_err();
        assert!(matches!(err, BridgeError::ReadyTimeout(20)));
        assert!(peer.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_response_is_invariant_violation() {
        let (transport, inbound, mut peer) = channel_pair();
        let endpoint = EndpointBuilder::new("Probe", transport).config(ungated()).build();
        drop(inbound);

        let call = tokio::spawn({
            let endpoint = endpoint.clone();
            async move { endpoint.call::<Value>("echo", json!({})).await }
        });
        let sent = peer.recv().await.unwrap().message;
        let reply = json!({"requestId": sent["requestId"], "payload": 1}).to_string();

        endpoint.on_message(reply.as_bytes(), Vec::new()).unwrap();
        assert_eq!(call.await.unwrap().unwrap(), json!(1));

        let err = endpoint.on_message(reply.as_bytes(), Vec::new()).unwrap_err();
        assert!(matches!(err, BridgeError::Waiter(WaiterError::AlreadySet(ref id)) if *id == sent["requestId"]));
        assert_eq!(endpoint.pending_count(), 0);
    }
}
