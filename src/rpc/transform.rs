//! Declarative payload transforms
//!
//! A transform travels with each outgoing request so the frontend knows how
//! to shape its reply, and is applied locally to the reply payload once it
//! arrives. Descriptors arrive from callers as JSON and are validated before
//! any message is sent.

use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use super::connection::{BASE_CLASS, Connection};
use super::endpoint::Endpoint;
use super::error::{Result, TransformError, TransformResult};

/// Validated transform descriptor
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
#[serde(tag = "transform", rename_all = "lowercase")]
pub enum Transform {
    /// Pass the payload through unchanged
    #[default]
    Raw,

    /// The frontend evaluates `code` and returns its result
    Function {
        /// Function source evaluated remotely
        code: String,
    },

    /// Materialize a [`Connection`] from the payload
    Connection {
        /// Explicit connection id; otherwise taken from the payload
        #[serde(skip_serializing_if = "Option::is_none")]
        cid: Option<String>,
        /// Override the class default for disposing on drop
        #[serde(skip_serializing_if = "Option::is_none")]
        auto_dispose: Option<bool>,
        /// Metadata attached to the connection
        #[serde(skip_serializing_if = "Option::is_none")]
        info: Option<Value>,
    },

    /// Apply nested transforms to individual payload keys
    Advanced {
        /// Payload key → transform
        mappings: BTreeMap<String, Transform>,
    },
}

/// Bare transform tags, as accepted in the wire shorthand `"raw"`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransformKind {
    /// See [`Transform::Raw`]
    Raw,
    /// See [`Transform::Function`]
    Function,
    /// See [`Transform::Connection`]
    Connection,
    /// See [`Transform::Advanced`]
    Advanced,
}

impl TransformKind {
    /// Parse a wire tag.
    pub fn from_tag(tag: &str) -> TransformResult<Self> {
        match tag {
            "raw" => Ok(TransformKind::Raw),
            "function" => Ok(TransformKind::Function),
            "connection" => Ok(TransformKind::Connection),
            "advanced" => Ok(TransformKind::Advanced),
            other => Err(TransformError::UnknownTransform(other.to_string())),
        }
    }

    /// Wire tag for this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            TransformKind::Raw => "raw",
            TransformKind::Function => "function",
            TransformKind::Connection => "connection",
            TransformKind::Advanced => "advanced",
        }
    }
}

impl Transform {
    /// Tag of this descriptor.
    pub fn kind(&self) -> TransformKind {
        match self {
            Transform::Raw => TransformKind::Raw,
            Transform::Function { .. } => TransformKind::Function,
            Transform::Connection { .. } => TransformKind::Connection,
            Transform::Advanced { .. } => TransformKind::Advanced,
        }
    }

    /// Connection transform with an explicit cid.
    pub fn connection(cid: impl Into<String>) -> Self {
        Transform::Connection {
            cid: Some(cid.into()),
            auto_dispose: None,
            info: None,
        }
    }

    /// Function transform; the code is checked by [`validate`].
    pub fn function(code: impl Into<String>) -> TransformResult<Self> {
        let code = code.into();
        check_function_code(&code)?;
        Ok(Transform::Function { code })
    }

    /// Wire form sent with outgoing requests.
    pub fn to_value(&self) -> serde_json::Result<Value> {
        serde_json::to_value(self)
    }
}

/// Anything accepted where a transform descriptor is expected
pub trait IntoTransform {
    /// Validate and convert into a [`Transform`].
    fn into_transform(self) -> TransformResult<Transform>;
}

impl IntoTransform for Transform {
    fn into_transform(self) -> TransformResult<Transform> {
        Ok(self)
    }
}

impl IntoTransform for TransformKind {
    fn into_transform(self) -> TransformResult<Transform> {
        match self {
            TransformKind::Raw => Ok(Transform::Raw),
            TransformKind::Connection => Ok(Transform::Connection {
                cid: None,
                auto_dispose: None,
                info: None,
            }),
            TransformKind::Function | TransformKind::Advanced => {
                Err(TransformError::MissingParameters(self.as_str().to_string()))
            }
        }
    }
}

impl IntoTransform for &str {
    fn into_transform(self) -> TransformResult<Transform> {
        TransformKind::from_tag(self)?.into_transform()
    }
}

impl IntoTransform for &Value {
    fn into_transform(self) -> TransformResult<Transform> {
        validate(self)
    }
}

impl IntoTransform for Value {
    fn into_transform(self) -> TransformResult<Transform> {
        validate(&self)
    }
}

/// Validate a JSON transform descriptor.
///
/// Accepts a bare tag string or `{"transform": tag, ...}`.
pub fn validate(descriptor: &Value) -> TransformResult<Transform> {
    let params = match descriptor {
        Value::String(tag) => return tag.as_str().into_transform(),
        Value::Object(params) => params,
        other => return Err(TransformError::InvalidDescriptor(json_type(other).into())),
    };

    let tag = params
        .get("transform")
        .and_then(Value::as_str)
        .ok_or(TransformError::InvalidField {
            field: "transform",
            expected: "a string",
        })?;

    match TransformKind::from_tag(tag)? {
        TransformKind::Raw => Ok(Transform::Raw),
        TransformKind::Function => {
            let code = match params.get("code") {
                None => return Err(TransformError::MissingParameters("function".into())),
                Some(Value::String(code)) => code,
                Some(_) => {
                    return Err(TransformError::InvalidField {
                        field: "code",
                        expected: "a string",
                    });
                }
            };
            check_function_code(code)?;
            Ok(Transform::Function { code: code.clone() })
        }
        TransformKind::Connection => {
            let cid = match params.get("cid") {
                None | Some(Value::Null) => None,
                Some(Value::String(cid)) => Some(cid.clone()),
                Some(_) => {
                    return Err(TransformError::InvalidField {
                        field: "cid",
                        expected: "a string",
                    });
                }
            };
            let auto_dispose = match params.get("auto_dispose") {
                None | Some(Value::Null) => None,
                Some(Value::Bool(flag)) => Some(*flag),
                Some(_) => {
                    return Err(TransformError::InvalidField {
                        field: "auto_dispose",
                        expected: "a boolean",
                    });
                }
            };
            let info = match params.get("info") {
                None | Some(Value::Null) => None,
                Some(info @ Value::Object(_)) => Some(info.clone()),
                Some(_) => {
                    return Err(TransformError::InvalidField {
                        field: "info",
                        expected: "an object",
                    });
                }
            };
            Ok(Transform::Connection {
                cid,
                auto_dispose,
                info,
            })
        }
        TransformKind::Advanced => {
            let mappings = match params.get("mappings") {
                None => return Err(TransformError::MissingParameters("advanced".into())),
                Some(Value::Object(mappings)) => mappings,
                Some(_) => {
                    return Err(TransformError::InvalidField {
                        field: "mappings",
                        expected: "an object",
                    });
                }
            };
            let mut validated = BTreeMap::new();
            for (key, nested) in mappings {
                validated.insert(key.clone(), validate(nested)?);
            }
            Ok(Transform::Advanced {
                mappings: validated,
            })
        }
    }
}

fn check_function_code(code: &str) -> TransformResult<()> {
    let trimmed = code.trim_start();
    if trimmed.starts_with("function") || trimmed.starts_with("async") || trimmed.contains("=>") {
        Ok(())
    } else {
        Err(TransformError::NotAFunction(code.to_string()))
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Result of applying a transform to a payload
#[derive(Debug, Clone, PartialEq)]
pub enum Resolved {
    /// Plain JSON value
    Value(Value),
    /// Live connection handle
    Connection(Connection),
    /// Per-key results of an `advanced` transform
    Map(BTreeMap<String, Resolved>),
}

impl Resolved {
    /// Borrow the plain value, if this is one.
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Resolved::Value(value) => Some(value),
            _ => None,
        }
    }

    /// Borrow the connection, if this is one.
    pub fn as_connection(&self) -> Option<&Connection> {
        match self {
            Resolved::Connection(connection) => Some(connection),
            _ => None,
        }
    }

    /// Look up a key of an `advanced` result.
    pub fn get(&self, key: &str) -> Option<&Resolved> {
        match self {
            Resolved::Map(map) => map.get(key),
            _ => None,
        }
    }

    /// Lower back to JSON; connections become `{"cid", "id"}` objects.
    pub fn into_value(self) -> Value {
        match self {
            Resolved::Value(value) => value,
            Resolved::Connection(connection) => connection.to_value(),
            Resolved::Map(map) => Value::Object(
                map.into_iter()
                    .map(|(key, resolved)| (key, resolved.into_value()))
                    .collect::<Map<String, Value>>(),
            ),
        }
    }
}

/// Apply `transform` to `payload`.
///
/// Connections produced here are bound to `endpoint` so that disposal can be
/// reported to the frontend.
pub fn apply(transform: &Transform, payload: Value, endpoint: Option<&Endpoint>) -> Result<Resolved> {
    match transform {
        Transform::Raw | Transform::Function { .. } => Ok(Resolved::Value(payload)),
        Transform::Connection {
            cid,
            auto_dispose,
            info,
        } => {
            let fields = payload.as_object();
            let cid = match cid
                .clone()
                .or_else(|| field_str(fields, "cid"))
            {
                Some(cid) => cid,
                None => Connection::to_cid(BASE_CLASS, &[])?,
            };

            let info = merge_info(info.as_ref(), fields.and_then(|f| f.get("info")));
            let connection = Connection::get_or_create(&cid, field_str(fields, "id"), info)?;
            if let Some(flag) = auto_dispose {
                connection.set_auto_dispose(*flag);
            }
            if let Some(endpoint) = endpoint {
                connection.bind(endpoint);
            }
            Ok(Resolved::Connection(connection))
        }
        Transform::Advanced { mappings } => {
            let mut fields = match payload {
                Value::Object(fields) => fields,
                _ => return Err(TransformError::PayloadNotObject.into()),
            };

            let mut resolved = BTreeMap::new();
            for (key, nested) in mappings {
                let value = fields
                    .remove(key)
                    .ok_or_else(|| TransformError::MissingKey(key.clone()))?;
                resolved.insert(key.clone(), apply(nested, value, endpoint)?);
            }
            Ok(Resolved::Map(resolved))
        }
    }
}

fn field_str(fields: Option<&Map<String, Value>>, key: &str) -> Option<String> {
    fields
        .and_then(|fields| fields.get(key))
        .and_then(Value::as_str)
        .map(String::from)
}

fn merge_info(base: Option<&Value>, overlay: Option<&Value>) -> Option<Value> {
    match (base, overlay) {
        (None, None) => None,
        (Some(base), None) => Some(base.clone()),
        (None, Some(overlay)) => Some(overlay.clone()),
        (Some(Value::Object(base)), Some(Value::Object(overlay))) => {
            let mut merged = base.clone();
            for (key, value) in overlay {
                merged.insert(key.clone(), value.clone());
            }
            Some(Value::Object(merged))
        }
        (Some(_), Some(overlay)) => Some(overlay.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_bare_tags() {
        assert_eq!(validate(&json!("raw")).unwrap(), Transform::Raw);
        assert_eq!(
            validate(&json!("connection")).unwrap().kind(),
            TransformKind::Connection
        );
        assert_eq!(
            validate(&json!("function")),
            Err(TransformError::MissingParameters("function".into()))
        );
        assert_eq!(
            validate(&json!("advanced")),
            Err(TransformError::MissingParameters("advanced".into()))
        );
        assert!(matches!(
            validate(&json!("bogus")),
            Err(TransformError::UnknownTransform(_))
        ));
    }

    #[test]
    fn test_function_requires_code() {
        assert_eq!(
            validate(&json!({"transform": "function"})),
            Err(TransformError::MissingParameters("function".into()))
        );
        assert!(matches!(
            validate(&json!({"transform": "function", "code": "return 1"})),
            Err(TransformError::NotAFunction(_))
        ));
        assert!(validate(&json!({"transform": "function", "code": "(obj) => obj.id"})).is_ok());
        assert!(validate(&json!({"transform": "function", "code": "function (obj) { return obj }"})).is_ok());
    }

    #[test]
    fn test_connection_field_types() {
        assert_eq!(
            validate(&json!({"transform": "connection", "cid": 3})),
            Err(TransformError::InvalidField {
                field: "cid",
                expected: "a string"
            })
        );
        let parsed = validate(&json!({"transform": "connection", "cid": "widget-x", "auto_dispose": true}))
            .unwrap();
        assert_eq!(
            parsed,
            Transform::Connection {
                cid: Some("widget-x".into()),
                auto_dispose: Some(true),
                info: None
            }
        );
    }

    #[test]
    fn test_advanced_mappings_validated_recursively() {
        assert!(matches!(
            validate(&json!({"transform": "advanced", "mappings": ["a"]})),
            Err(TransformError::InvalidField { field: "mappings", .. })
        ));
        assert!(matches!(
            validate(&json!({"transform": "advanced", "mappings": {"a": "function"}})),
            Err(TransformError::MissingParameters(_))
        ));
        let parsed = validate(&json!({"transform": "advanced", "mappings": {"a": "raw"}})).unwrap();
        assert_eq!(parsed.kind(), TransformKind::Advanced);
    }

    #[test]
    fn test_wire_form() {
        assert_eq!(Transform::Raw.to_value().unwrap(), json!({"transform": "raw"}));
        assert_eq!(
            Transform::connection("widget-1").to_value().unwrap(),
            json!({"transform": "connection", "cid": "widget-1"})
        );
    }

    #[test]
    fn test_raw_and_function_pass_through() {
        let payload = json!({"x": 1});
        let out = apply(&Transform::Raw, payload.clone(), None).unwrap();
        assert_eq!(out, Resolved::Value(payload.clone()));

        let function = Transform::function("() => 1").unwrap();
        let out = apply(&function, payload.clone(), None).unwrap();
        assert_eq!(out.into_value(), payload);
    }

    #[test]
    fn test_advanced_keeps_exactly_mapped_keys() {
        let transform = validate(&json!({
            "transform": "advanced",
            "mappings": {"a": "raw", "b": {"transform": "connection", "cid": "widget-adv-b"}}
        }))
        .unwrap();

        let out = apply(&transform, json!({"a": 5, "b": {"id": "B"}, "c": 9}), None).unwrap();
        let Resolved::Map(map) = &out else {
            panic!("expected map");
        };
        assert_eq!(map.keys().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(out.get("a"), Some(&Resolved::Value(json!(5))));
        let conn = out.get("b").and_then(Resolved::as_connection).unwrap();
        assert_eq!(conn.id(), "B");
    }

    #[test]
    fn test_advanced_missing_key() {
        let transform = validate(&json!({"transform": "advanced", "mappings": {"a": "raw"}})).unwrap();
        let err = apply(&transform, json!({"b": 1}), None).unwrap_err();
        assert!(err.to_string().contains("missing key 'a'"));
    }

    #[test]
    fn test_connection_cid_from_payload() {
        let transform = "connection".into_transform().unwrap();
        let out = apply(&transform, json!({"cid": "widget-from-payload", "id": "P"}), None).unwrap();
        let conn = out.as_connection().unwrap();
        assert_eq!(conn.cid(), "widget-from-payload");
        assert_eq!(conn.id(), "P");
    }

    #[test]
    fn test_info_merge() {
        let merged = merge_info(Some(&json!({"a": 1, "b": 1})), Some(&json!({"b": 2}))).unwrap();
        assert_eq!(merged, json!({"a": 1, "b": 2}));
    }
}
