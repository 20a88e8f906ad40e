use std::any::Any;

use axum::Json;
use axum::body::Body;
use axum::http::{Response, StatusCode};
use axum::response::IntoResponse;
use kbeauty_core::jsonrpc::{ResponseEnvelope, RpcError};
use serde_json::Value;
use thiserror::Error;

/// Transport-level failures. Rendered as JSON-RPC envelopes with `id: null`
/// since no request id could be trusted at this point.
#[derive(Debug, Error)]
pub enum AppError {
    /// Request body was not valid JSON (400)
    #[error("malformed request body: {0}")]
    MalformedBody(String),
    /// Internal error (500)
    #[error("internal error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, error) = match self {
            AppError::MalformedBody(detail) => {
                tracing::debug!(
                    event = "mcp_parse_error",
                    detail = %detail,
                    "Rejected unparseable MCP request body"
                );
                (StatusCode::BAD_REQUEST, RpcError::parse_error(detail))
            }
            AppError::Internal(detail) => {
                tracing::error!(event = "mcp_internal_error", detail = %detail, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    RpcError::internal(detail),
                )
            }
        };
        (status, Json(ResponseEnvelope::failure(Value::Null, error))).into_response()
    }
}

/// `CatchPanicLayer` handler: a panic escaping a handler still yields a JSON-RPC envelope.
pub fn panic_response(err: Box<dyn Any + Send + 'static>) -> Response<Body> {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        (*s).to_string()
    } else {
        "handler panicked".to_string()
    };
    AppError::Internal(detail).into_response()
}

#[cfg(test)]
mod tests {
    use axum::body::to_bytes;

    use super::*;

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn malformed_body_is_400_parse_error() {
        let response = AppError::MalformedBody("expected value".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["id"], Value::Null);
        assert_eq!(body["error"]["code"], -32700);
    }

    #[tokio::test]
    async fn panic_payload_becomes_internal_error() {
        let response = panic_response(Box::new("kaboom"));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], -32603);
        assert_eq!(body["error"]["data"], "kaboom");
    }
}
