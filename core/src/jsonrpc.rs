use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::{Map, Value};
use thiserror::Error;

pub const JSONRPC_VERSION: &str = "2.0";

/// Error codes from the JSON-RPC 2.0 reserved range.
pub mod codes {
    pub const PARSE_ERROR: i64 = -32700;
    pub const INVALID_REQUEST: i64 = -32600;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL_ERROR: i64 = -32603;
}

/// The `error` member of a JSON-RPC response.
#[derive(Debug, Clone, PartialEq, Error, serde::Serialize)]
#[error("{message} (code {code})")]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn parse_error(detail: impl Into<String>) -> Self {
        Self::new(codes::PARSE_ERROR, "Parse error").with_data(Value::String(detail.into()))
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(codes::INVALID_REQUEST, message)
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(
            codes::METHOD_NOT_FOUND,
            format!("Method not found: {method}"),
        )
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(codes::INVALID_PARAMS, message)
    }

    /// Internal error; the failure description travels in `data`, never in `message`.
    pub fn internal(detail: impl Into<String>) -> Self {
        Self::new(codes::INTERNAL_ERROR, "Internal error").with_data(Value::String(detail.into()))
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// A validated inbound request or notification.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestEnvelope {
    /// `None` marks a notification.
    pub id: Option<Value>,
    pub method: String,
    pub params: Map<String, Value>,
}

/// A message that could not be turned into a [`RequestEnvelope`].
///
/// Carries whatever `id` could be recovered so the rejection can still be
/// correlated by the client.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{error}")]
pub struct EnvelopeError {
    pub id: Value,
    pub error: RpcError,
}

impl EnvelopeError {
    fn new(id: Value, error: RpcError) -> Self {
        Self { id, error }
    }

    pub fn into_response(self) -> ResponseEnvelope {
        ResponseEnvelope::failure(self.id, self.error)
    }
}

impl RequestEnvelope {
    pub fn new(id: Option<Value>, method: impl Into<String>, params: Map<String, Value>) -> Self {
        Self {
            id,
            method: method.into(),
            params,
        }
    }

    pub fn from_value(value: Value) -> Result<Self, EnvelopeError> {
        let Value::Object(mut obj) = value else {
            return Err(EnvelopeError::new(
                Value::Null,
                RpcError::invalid_request("Request must be a JSON object"),
            ));
        };

        let id = obj.remove("id");
        let recovered_id = match &id {
            Some(value) if is_valid_id(value) => value.clone(),
            _ => Value::Null,
        };

        if obj.get("jsonrpc").and_then(Value::as_str) != Some(JSONRPC_VERSION) {
            return Err(EnvelopeError::new(
                recovered_id,
                RpcError::invalid_request("jsonrpc must be '2.0'"),
            ));
        }

        if id.as_ref().is_some_and(|value| !is_valid_id(value)) {
            return Err(EnvelopeError::new(
                Value::Null,
                RpcError::invalid_request("id must be a string, number, or null"),
            ));
        }

        let method = match obj.remove("method") {
            Some(Value::String(method)) if !method.is_empty() => method,
            _ => {
                return Err(EnvelopeError::new(
                    recovered_id,
                    RpcError::invalid_request("method must be a non-empty string"),
                ));
            }
        };

        let params = match obj.remove("params") {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(map)) => map,
            Some(_) => {
                return Err(EnvelopeError::new(
                    recovered_id,
                    RpcError::invalid_params("params must be an object"),
                ));
            }
        };

        Ok(Self { id, method, params })
    }

    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

fn is_valid_id(value: &Value) -> bool {
    matches!(value, Value::String(_) | Value::Number(_) | Value::Null)
}

/// An outbound response. Holds exactly one of `result` or `error`.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseEnvelope {
    id: Value,
    outcome: Result<Value, RpcError>,
}

impl ResponseEnvelope {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            id,
            outcome: Ok(result),
        }
    }

    pub fn failure(id: Value, error: RpcError) -> Self {
        Self {
            id,
            outcome: Err(error),
        }
    }

    pub fn id(&self) -> &Value {
        &self.id
    }

    pub fn result(&self) -> Option<&Value> {
        self.outcome.as_ref().ok()
    }

    pub fn error(&self) -> Option<&RpcError> {
        self.outcome.as_ref().err()
    }

    pub fn is_error(&self) -> bool {
        self.outcome.is_err()
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

impl Serialize for ResponseEnvelope {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(3))?;
        map.serialize_entry("jsonrpc", JSONRPC_VERSION)?;
        map.serialize_entry("id", &self.id)?;
        match &self.outcome {
            Ok(result) => map.serialize_entry("result", result)?,
            Err(error) => map.serialize_entry("error", error)?,
        }
        map.end()
    }
}

/// A server-initiated notification (no `id`, never answered).
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct Notification {
    jsonrpc: &'static str,
    pub method: String,
    pub params: Value,
}

impl Notification {
    pub fn new(method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            method: method.into(),
            params,
        }
    }
}
