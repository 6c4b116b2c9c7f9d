//! Wire envelopes exchanged with the frontend

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::error::{BridgeError, ErrorReport, Result};
use super::transport::Buffer;

/// Request for the frontend to perform an operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestEnvelope {
    /// Correlation id echoed back in the response
    pub request_id: String,
    /// Operation name
    pub operation: String,
    /// Operation arguments
    pub args: Value,
    /// Wire form of the transform
    pub transform: Value,
}

/// Uncorrelated operation; the frontend does not reply
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationEnvelope {
    /// Operation name
    pub operation: String,
    /// Operation arguments
    pub args: Value,
}

/// Reply to an operation the frontend asked us to perform
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteResponseEnvelope {
    /// Id supplied by the frontend
    pub remote_request_id: String,
    /// Handler result
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    /// Handler failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorReport>,
}

impl RemoteResponseEnvelope {
    /// Successful reply
    pub fn success(remote_request_id: String, payload: Value) -> Self {
        Self {
            remote_request_id,
            payload: Some(payload),
            error: None,
        }
    }

    /// Failed reply
    pub fn failure(remote_request_id: String, error: ErrorReport) -> Self {
        Self {
            remote_request_id,
            payload: None,
            error: Some(error),
        }
    }
}

/// Handshake announcements sent by the frontend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitPhase {
    /// `{"init": "initializing"}`
    Initializing,
    /// `{"init": "ready"}`
    Ready,
}

/// Classified inbound message
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// Reply to one of our requests
    Response {
        /// Our request id
        request_id: String,
        /// Payload (null when absent)
        payload: Value,
        /// Error message, if the operation failed
        error: Option<String>,
    },
    /// The frontend asks us to perform an operation
    RemoteRequest {
        /// Frontend-supplied id to echo in the reply
        remote_request_id: String,
        /// Operation name
        operation: String,
        /// Operation payload
        payload: Value,
        /// Binary buffers
        buffers: Vec<Buffer>,
    },
    /// Handshake progress
    Init(InitPhase),
    /// The frontend closed its side
    Closed,
}

/// Classify a decoded message.
///
/// Out-of-band `buffers` take precedence over buffers inlined in the JSON.
pub fn classify(message: Value, buffers: Vec<Buffer>) -> Result<Inbound> {
    let Value::Object(mut fields) = message else {
        return Err(BridgeError::Protocol("message is not a JSON object".into()));
    };

    if let Some(request_id) = fields.get("requestId") {
        let request_id = request_id
            .as_str()
            .ok_or_else(|| BridgeError::Protocol("requestId must be a string".into()))?
            .to_string();
        let payload = fields.remove("payload").unwrap_or(Value::Null);
        let error = fields.remove("error").and_then(error_message);
        return Ok(Inbound::Response {
            request_id,
            payload,
            error,
        });
    }

    if let Some(remote_request_id) = fields.get("remoteRequestId") {
        let remote_request_id = remote_request_id
            .as_str()
            .ok_or_else(|| BridgeError::Protocol("remoteRequestId must be a string".into()))?
            .to_string();
        let operation = fields
            .get("operation")
            .and_then(Value::as_str)
            .filter(|op| !op.is_empty())
            .ok_or_else(|| BridgeError::Protocol("remote request missing operation".into()))?
            .to_string();
        let payload = fields.remove("payload").unwrap_or_else(|| Value::Object(Map::new()));
        let buffers = if buffers.is_empty() {
            inline_buffers(&fields)?
        } else {
            buffers
        };
        return Ok(Inbound::RemoteRequest {
            remote_request_id,
            operation,
            payload,
            buffers,
        });
    }

    if let Some(init) = fields.get("init") {
        return match init.as_str() {
            Some("initializing") => Ok(Inbound::Init(InitPhase::Initializing)),
            Some("ready") => Ok(Inbound::Init(InitPhase::Ready)),
            _ => Err(BridgeError::Protocol(format!("unknown init phase {init}"))),
        };
    }

    if fields.get("closed").and_then(Value::as_bool) == Some(true) {
        return Ok(Inbound::Closed);
    }

    Err(BridgeError::Protocol("unrecognised message".into()))
}

fn error_message(error: Value) -> Option<String> {
    match error {
        Value::Null => None,
        Value::String(message) => Some(message),
        Value::Object(fields) => match fields.get("message").and_then(Value::as_str) {
            Some(message) => Some(message.to_string()),
            None => Some(Value::Object(fields).to_string()),
        },
        other => Some(other.to_string()),
    }
}

fn inline_buffers(fields: &Map<String, Value>) -> Result<Vec<Buffer>> {
    match fields.get("buffers") {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(buffers) => serde_json::from_value(buffers.clone())
            .map_err(|err| BridgeError::Protocol(format!("invalid inline buffers: {err}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_envelope_is_camel_case() {
        let envelope = RequestEnvelope {
            request_id: "r".into(),
            operation: "echo".into(),
            args: json!({"x": 1}),
            transform: json!({"transform": "raw"}),
        };
        assert_eq!(
            serde_json::to_value(&envelope).unwrap(),
            json!({"requestId": "r", "operation": "echo", "args": {"x": 1}, "transform": {"transform": "raw"}})
        );
    }

    #[test]
    fn test_classify_response() {
        let inbound = classify(json!({"requestId": "r", "payload": 3}), Vec::new()).unwrap();
        assert_eq!(
            inbound,
            Inbound::Response {
                request_id: "r".into(),
                payload: json!(3),
                error: None
            }
        );

        let failed = classify(json!({"requestId": "r", "error": {"message": "bad"}}), Vec::new()).unwrap();
        assert!(matches!(failed, Inbound::Response { error: Some(ref m), .. } if m == "bad"));
    }

    #[test]
    fn test_classify_remote_request_buffers() {
        let inline = classify(
            json!({"remoteRequestId": "f1", "operation": "save", "buffers": [[1, 2]]}),
            Vec::new(),
        )
        .unwrap();
        assert!(matches!(inline, Inbound::RemoteRequest { ref buffers, .. } if buffers == &vec![vec![1u8, 2]]));

        let out_of_band = classify(
            json!({"remoteRequestId": "f1", "operation": "save", "buffers": [[1, 2]]}),
            vec![vec![9]],
        )
        .unwrap();
        assert!(matches!(out_of_band, Inbound::RemoteRequest { ref buffers, .. } if buffers == &vec![vec![9u8]]));
    }

    #[test]
    fn test_classify_handshake_and_garbage() {
        assert_eq!(
            classify(json!({"init": "ready"}), Vec::new()).unwrap(),
            Inbound::Init(InitPhase::Ready)
        );
        assert_eq!(classify(json!({"closed": true}), Vec::new()).unwrap(), Inbound::Closed);
        assert!(matches!(
            classify(json!({"hello": 1}), Vec::new()),
            Err(BridgeError::Protocol(_))
        ));
        assert!(matches!(classify(json!([1]), Vec::new()), Err(BridgeError::Protocol(_))));
        assert!(matches!(
            classify(json!({"remoteRequestId": "x"}), Vec::new()),
            Err(BridgeError::Protocol(_))
        ));
    }
}
