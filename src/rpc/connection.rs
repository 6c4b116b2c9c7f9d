//! Connection handles for persistent frontend objects
//!
//! A connection is identified by a `cid` of the form `<prefix>-<suffix>`. The
//! prefix selects a registered [`ConnectionClass`]; the suffix identifies the
//! particular remote object. Live handles are tracked in a process-wide weak
//! table so the same cid always yields the same instance while any handle to
//! it is alive.

use once_cell::sync::Lazy;
use parking_lot::{Mutex, RwLock};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};
use uuid::Uuid;

use super::endpoint::{Endpoint, WeakEndpoint};
use super::error::{ConnectionError, ConnectionResult};
use crate::util::pack::{kebab_case, pack_value};

/// Class name of the base connection type
pub const BASE_CLASS: &str = "Connection";

/// Separator between the parts packed into a cid suffix
pub const PART_SEPARATOR: &str = "|";

/// Operation sent to the frontend when a connection is disposed
pub const DISPOSE_OPERATION: &str = "dispose";

/// A registered kind of connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionClass {
    name: String,
    prefix: String,
    auto_dispose: bool,
}

impl ConnectionClass {
    /// Define a class; the prefix is the kebab-case form of `name`.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let prefix = kebab_case(&name);
        Self {
            name,
            prefix,
            auto_dispose: false,
        }
    }

    /// Whether handles of this class dispose the remote object by default.
    pub fn with_auto_dispose(mut self, auto_dispose: bool) -> Self {
        self.auto_dispose = auto_dispose;
        self
    }

    /// Class name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Cid prefix
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Default auto-dispose flag for new handles
    pub fn auto_dispose(&self) -> bool {
        self.auto_dispose
    }

    fn matches(&self, cid: &str) -> bool {
        cid == self.prefix
            || cid
                .strip_prefix(self.prefix.as_str())
                .is_some_and(|rest| rest.starts_with('-'))
    }
}

#[derive(Default)]
struct ClassTable {
    by_prefix: HashMap<String, Arc<ConnectionClass>>,
    by_name: HashMap<String, Arc<ConnectionClass>>,
}

/// Process-wide catalog of connection classes and live connections.
pub struct ConnectionCatalog {
    classes: RwLock<ClassTable>,
    instances: Mutex<HashMap<String, Weak<ConnectionInner>>>,
}

static CATALOG: Lazy<ConnectionCatalog> = Lazy::new(ConnectionCatalog::with_builtin_classes);

impl ConnectionCatalog {
    fn with_builtin_classes() -> Self {
        let catalog = Self {
            classes: RwLock::new(ClassTable::default()),
            instances: Mutex::new(HashMap::new()),
        };
        catalog.register(ConnectionClass::new(BASE_CLASS));
        catalog.register(ConnectionClass::new("Widget"));
        catalog.register(ConnectionClass::new("ShellConnection").with_auto_dispose(true));
        catalog.register(ConnectionClass::new("SessionConnection"));
        catalog.register(ConnectionClass::new("CommandConnection").with_auto_dispose(true));
        catalog
    }

    /// Access the global catalog singleton.
    pub fn global() -> &'static Self {
        &CATALOG
    }

    /// Register a connection class, replacing any class with the same prefix.
    pub fn register(&self, class: ConnectionClass) -> Arc<ConnectionClass> {
        let class = Arc::new(class);
        let mut classes = self.classes.write();
        if let Some(previous) = classes.by_prefix.insert(class.prefix.clone(), class.clone()) {
            if previous.name != class.name {
                classes.by_name.remove(&previous.name);
                tracing::debug!(
                    prefix = %class.prefix,
                    previous = %previous.name,
                    replacement = %class.name,
                    "connection class prefix re-registered"
                );
            }
        }
        classes.by_name.insert(class.name.clone(), class.clone());
        class
    }

    /// Look up a class by name.
    pub fn class(&self, name: &str) -> ConnectionResult<Arc<ConnectionClass>> {
        self.classes
            .read()
            .by_name
            .get(name)
            .cloned()
            .ok_or_else(|| ConnectionError::UnknownClass(name.to_string()))
    }

    /// Find the class owning `cid`; the longest matching prefix wins.
    pub fn resolve(&self, cid: &str) -> ConnectionResult<Arc<ConnectionClass>> {
        self.classes
            .read()
            .by_prefix
            .values()
            .filter(|class| class.matches(cid))
            .max_by_key(|class| class.prefix.len())
            .cloned()
            .ok_or_else(|| ConnectionError::UnknownPrefix(cid.to_string()))
    }

    /// List registered class names.
    pub fn list_classes(&self) -> Vec<String> {
        let mut names: Vec<String> = self.classes.read().by_name.keys().cloned().collect();
        names.sort();
        names
    }

    /// Live connections, optionally restricted to a class prefix.
    pub fn live_connections(&self, prefix: Option<&str>) -> Vec<Connection> {
        let live: Vec<Connection> = {
            let instances = self.instances.lock();
            instances
                .values()
                .filter_map(Weak::upgrade)
                .map(|inner| Connection { inner })
                .collect()
        };
        live.into_iter()
            .filter(|conn| prefix.is_none_or(|prefix| conn.prefix() == prefix))
            .collect()
    }

    /// Number of live connections.
    pub fn live_count(&self) -> usize {
        self.instances
            .lock()
            .values()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }

    fn lookup(&self, cid: &str) -> Option<Connection> {
        let inner = self.instances.lock().get(cid).and_then(Weak::upgrade);
        inner.map(|inner| Connection { inner })
    }

    fn unregister(&self, cid: &str, target: *const ConnectionInner) {
        let mut instances = self.instances.lock();
        if instances.get(cid).is_some_and(|weak| weak.as_ptr() == target) {
            instances.remove(cid);
        }
    }

    fn purge(&self, cid: &str) {
        let mut instances = self.instances.lock();
        if instances.get(cid).is_some_and(|weak| weak.strong_count() == 0) {
            instances.remove(cid);
        }
    }
}

/// One part of a cid suffix, see [`Connection::to_cid`]
#[derive(Debug, Clone)]
pub enum CidPart {
    /// Contributes the connection's remote id
    Connection(Connection),
    /// Packed with [`pack_value`]
    Value(Value),
}

impl CidPart {
    fn pack(&self) -> String {
        match self {
            CidPart::Connection(connection) => connection.id(),
            CidPart::Value(value) => pack_value(value),
        }
    }
}

impl From<Connection> for CidPart {
    fn from(connection: Connection) -> Self {
        CidPart::Connection(connection)
    }
}

impl From<&Connection> for CidPart {
    fn from(connection: &Connection) -> Self {
        CidPart::Connection(connection.clone())
    }
}

impl From<Value> for CidPart {
    fn from(value: Value) -> Self {
        CidPart::Value(value)
    }
}

impl From<&str> for CidPart {
    fn from(text: &str) -> Self {
        CidPart::Value(Value::String(text.to_string()))
    }
}

impl From<String> for CidPart {
    fn from(text: String) -> Self {
        CidPart::Value(Value::String(text))
    }
}

struct ConnectionState {
    id: String,
    info: Value,
    auto_dispose: bool,
    disposed: bool,
    closed: bool,
}

struct ConnectionInner {
    cid: String,
    class: Arc<ConnectionClass>,
    state: RwLock<ConnectionState>,
    endpoint: RwLock<Option<WeakEndpoint>>,
}

impl Drop for ConnectionInner {
    fn drop(&mut self) {
        CATALOG.purge(&self.cid);

        let state = self.state.get_mut();
        if state.auto_dispose && !state.closed {
            let endpoint = self.endpoint.get_mut().as_ref().and_then(WeakEndpoint::upgrade);
            send_dispose(endpoint.as_ref(), &self.cid, &state.id);
        }
    }
}

fn send_dispose(endpoint: Option<&Endpoint>, cid: &str, id: &str) {
    let Some(endpoint) = endpoint else {
        tracing::debug!(%cid, "dispose requested for unbound connection");
        return;
    };
    if let Err(err) = endpoint.notify(DISPOSE_OPERATION, json!({ "cid": cid, "id": id })) {
        tracing::warn!(%cid, error = %err, "failed to notify frontend of connection disposal");
    }
}

/// Handle to a persistent object living in the frontend
///
/// Cloning is cheap and preserves identity; see [`Connection::ptr_eq`].
#[derive(Clone)]
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

impl Connection {
    /// Return the live connection for `cid`, creating it if necessary.
    ///
    /// An existing handle has its `id`/`info` refreshed with any supplied
    /// values and is returned as-is.
    pub fn get_or_create(
        cid: &str,
        id: Option<String>,
        info: Option<Value>,
    ) -> ConnectionResult<Connection> {
        if cid.is_empty() {
            return Err(ConnectionError::EmptyCid);
        }
        let class = CATALOG.resolve(cid)?;

        let mut instances = CATALOG.instances.lock();
        if let Some(inner) = instances.get(cid).and_then(Weak::upgrade) {
            drop(instances);
            let existing = Connection { inner };
            existing.refresh(id, info);
            return Ok(existing);
        }

        let connection = Connection::new(cid.to_string(), class, id, info);
        instances.insert(cid.to_string(), Arc::downgrade(&connection.inner));
        drop(instances);

        tracing::debug!(cid, class = connection.class_name(), "connection created");
        Ok(connection)
    }

    fn new(cid: String, class: Arc<ConnectionClass>, id: Option<String>, info: Option<Value>) -> Self {
        let state = ConnectionState {
            id: id.unwrap_or_default(),
            info: info.unwrap_or_else(|| Value::Object(Default::default())),
            auto_dispose: class.auto_dispose,
            disposed: false,
            closed: false,
        };
        Self {
            inner: Arc::new(ConnectionInner {
                cid,
                class,
                state: RwLock::new(state),
                endpoint: RwLock::new(None),
            }),
        }
    }

    /// Build the deterministic cid for `parts` under `class_name`.
    ///
    /// Connections contribute their remote id, strings are used verbatim and
    /// other values are packed. A leading class prefix on the first part is
    /// dropped. No parts yields a random, one-off cid.
    pub fn to_cid(class_name: &str, parts: &[CidPart]) -> ConnectionResult<String> {
        let class = CATALOG.class(class_name)?;
        if parts.is_empty() {
            return Ok(format!("{}-{}", class.prefix, Uuid::new_v4().simple()));
        }

        let joined = parts
            .iter()
            .map(CidPart::pack)
            .collect::<Vec<_>>()
            .join(PART_SEPARATOR);
        let redundant = format!("{}-", class.prefix);
        let suffix = joined.strip_prefix(redundant.as_str()).unwrap_or(&joined);
        Ok(format!("{}-{}", class.prefix, suffix))
    }

    /// Look up a live connection without creating one.
    ///
    /// With `quiet` a missing connection is `Ok(None)` instead of an error.
    pub fn get_existing(
        class_name: &str,
        parts: &[CidPart],
        quiet: bool,
    ) -> ConnectionResult<Option<Connection>> {
        let cid = Connection::to_cid(class_name, parts)?;
        Connection::get_by_cid(&cid, quiet)
    }

    /// Look up a live connection by its full cid.
    pub fn get_by_cid(cid: &str, quiet: bool) -> ConnectionResult<Option<Connection>> {
        match CATALOG.lookup(cid) {
            Some(connection) => Ok(Some(connection)),
            None if quiet => Ok(None),
            None => Err(ConnectionError::NotFound(cid.to_string())),
        }
    }

    /// Connection id
    pub fn cid(&self) -> &str {
        &self.inner.cid
    }

    /// Remote object id (may be empty)
    pub fn id(&self) -> String {
        self.inner.state.read().id.clone()
    }

    /// Metadata object
    pub fn info(&self) -> Value {
        self.inner.state.read().info.clone()
    }

    /// Name of the connection class
    pub fn class_name(&self) -> &str {
        &self.inner.class.name
    }

    /// Cid prefix of the connection class
    pub fn prefix(&self) -> &str {
        &self.inner.class.prefix
    }

    /// Whether dropping the last handle disposes the remote object
    pub fn auto_dispose(&self) -> bool {
        self.inner.state.read().auto_dispose
    }

    /// Override the auto-dispose flag
    pub fn set_auto_dispose(&self, auto_dispose: bool) {
        self.inner.state.write().auto_dispose = auto_dispose;
    }

    /// Whether the handle has been closed
    pub fn is_closed(&self) -> bool {
        self.inner.state.read().closed
    }

    /// Whether the remote object was asked to dispose
    pub fn is_disposed(&self) -> bool {
        self.inner.state.read().disposed
    }

    /// Attach the endpoint used to report disposal.
    pub fn bind(&self, endpoint: &Endpoint) {
        *self.inner.endpoint.write() = Some(endpoint.downgrade());
    }

    /// Endpoint this connection reports to, if still alive.
    pub fn endpoint(&self) -> Option<Endpoint> {
        self.inner.endpoint.read().as_ref().and_then(WeakEndpoint::upgrade)
    }

    /// Whether two handles refer to the same connection instance.
    pub fn ptr_eq(&self, other: &Connection) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Close the handle and remove it from the registry.
    ///
    /// With `dispose` the frontend is told to release the remote object.
    /// Closing twice is a no-op.
    pub fn close(&self, dispose: bool) {
        {
            let mut state = self.inner.state.write();
            if state.closed {
                return;
            }
            state.closed = true;
            state.disposed = dispose;
        }

        CATALOG.unregister(&self.inner.cid, Arc::as_ptr(&self.inner));
        tracing::debug!(cid = %self.inner.cid, dispose, "connection closed");

        if dispose {
            send_dispose(self.endpoint().as_ref(), &self.inner.cid, &self.id());
        }
    }

    /// JSON reference to this connection.
    pub fn to_value(&self) -> Value {
        json!({ "cid": self.cid(), "id": self.id() })
    }

    fn refresh(&self, id: Option<String>, info: Option<Value>) {
        if id.is_none() && info.is_none() {
            return;
        }
        let mut state = self.inner.state.write();
        if let Some(id) = id {
            state.id = id;
        }
        if let Some(info) = info {
            state.info = info;
        }
    }
}

impl PartialEq for Connection {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.read();
        f.debug_struct("Connection")
            .field("cid", &self.inner.cid)
            .field("id", &state.id)
            .field("class", &self.inner.class.name)
            .field("closed", &state.closed)
            .finish()
    }
}

impl fmt::Display for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.inner.cid)
    }
}
