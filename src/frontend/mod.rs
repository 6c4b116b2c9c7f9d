//! Typed call-sites for common frontend operations
//!
//! Each method is a single [`Endpoint::schedule_operation`] call with a fixed
//! operation name, argument shape and transform.

use serde_json::{Value, json};

use crate::rpc::connection::Connection;
use crate::rpc::endpoint::{Endpoint, EndpointBuilder};
use crate::rpc::error::{BridgeError, Result};
use crate::rpc::transform::{Resolved, Transform, TransformKind};
use crate::rpc::transport::Transport;
use crate::rpc::BridgeConfig;

/// Class name of the frontend singleton endpoint
pub const FRONTEND_CLASS: &str = "Frontend";

/// Operation names understood by the workbench frontend
pub mod ops {
    /// Run a registered command
    pub const EXECUTE_COMMAND: &str = "executeCommand";
    /// Call a method on an object reachable from the app
    pub const EXECUTE_METHOD: &str = "executeMethod";
    /// Read a property by dotted path
    pub const GET_PROPERTY: &str = "getProperty";
    /// Write a property by dotted path
    pub const SET_PROPERTY: &str = "setProperty";
    /// List the properties below a dotted path
    pub const LIST_PROPERTIES: &str = "listProperties";
    /// Open a modal dialog
    pub const SHOW_DIALOG: &str = "showDialog";
    /// Open or find a session for a path
    pub const OPEN_SESSION: &str = "openSession";
}

/// Dialogs the frontend can show
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialog {
    /// Free text input
    Text,
    /// Yes/no confirmation
    Confirm,
    /// Pick one of several items
    Item,
    /// Choose a file path
    File,
}

impl Dialog {
    fn method(self) -> &'static str {
        match self {
            Dialog::Text => "getText",
            Dialog::Confirm => "getBoolean",
            Dialog::Item => "getItem",
            Dialog::File => "getOpenFiles",
        }
    }
}

/// Handle on the workbench app
#[derive(Debug, Clone)]
pub struct Frontend {
    endpoint: Endpoint,
}

impl Frontend {
    /// Wrap an existing endpoint.
    pub fn new(endpoint: Endpoint) -> Self {
        Self { endpoint }
    }

    /// The singleton frontend endpoint over `transport`, created on first use.
    pub fn connect(transport: impl Transport + 'static, config: BridgeConfig) -> Self {
        let endpoint = EndpointBuilder::new(FRONTEND_CLASS, transport)
            .singleton(true)
            .config(config)
            .build();
        Self::new(endpoint)
    }

    /// Underlying endpoint
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Run the command `id` with `args`.
    pub async fn execute_command(&self, id: &str, args: Value) -> Result<Value> {
        self.raw(ops::EXECUTE_COMMAND, json!({ "id": id, "args": args }))
            .await
    }

    /// Call `method` (a dotted path from the app root) with positional `args`.
    pub async fn execute_method(&self, method: &str, args: Vec<Value>, transform: Transform) -> Result<Resolved> {
        self.endpoint
            .schedule_operation(ops::EXECUTE_METHOD, json!({ "method": method, "args": args }), transform)
            .await
    }

    /// Read the property at `path`.
    pub async fn get_property(&self, path: &str, transform: Transform) -> Result<Resolved> {
        self.endpoint
            .schedule_operation(ops::GET_PROPERTY, json!({ "path": path }), transform)
            .await
    }

    /// Write `value` to the property at `path`.
    pub async fn set_property(&self, path: &str, value: Value) -> Result<bool> {
        let reply = self
            .raw(ops::SET_PROPERTY, json!({ "path": path, "value": value }))
            .await?;
        Ok(reply.as_bool().unwrap_or(true))
    }

    /// Names of the properties below `path`, `depth` levels deep.
    pub async fn list_properties(&self, path: &str, depth: u32) -> Result<Value> {
        self.raw(ops::LIST_PROPERTIES, json!({ "path": path, "depth": depth }))
            .await
    }

    /// Show a dialog and return the user's answer.
    pub async fn show_dialog(&self, dialog: Dialog, options: Value) -> Result<Value> {
        self.raw(ops::SHOW_DIALOG, json!({ "method": dialog.method(), "options": options }))
            .await
    }

    /// Open a session for `path` and return a handle to it.
    pub async fn open_session(&self, path: &str) -> Result<Connection> {
        let resolved = self
            .endpoint
            .schedule_operation(ops::OPEN_SESSION, json!({ "path": path }), TransformKind::Connection)
            .await?;
        match resolved {
            Resolved::Connection(connection) => Ok(connection),
            other => Err(BridgeError::Protocol(format!(
                "expected a session connection, got {}",
                other.into_value()
            ))),
        }
    }

    async fn raw(&self, operation: &str, args: Value) -> Result<Value> {
        let resolved = self
            .endpoint
            .schedule_operation(operation, args, Transform::Raw)
            .await?;
        Ok(resolved.into_value())
    }
}
