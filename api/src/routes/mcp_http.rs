use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use kbeauty_mcp_runtime::MCP_SESSION_ID_HEADER;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::mcp_sse::mcp_stream;
use crate::error::AppError;
use crate::state::AppState;

const MCP_PATH: &str = "/mcp";
const MESSAGES_PATH: &str = "/messages";

pub fn router() -> Router<AppState> {
    Router::new()
        .route(MCP_PATH, post(mcp_post).get(mcp_stream))
        .route(MESSAGES_PATH, post(mcp_post))
}

/// JSON-RPC 2.0 request as accepted on the MCP routes (batches are arrays of these).
#[derive(Debug, Serialize, Deserialize, utoipa::ToSchema)]
pub struct JsonRpcRequest {
    /// Always `"2.0"`.
    pub jsonrpc: String,
    /// String or number; absent for notifications.
    pub id: Option<Value>,
    pub method: String,
    pub params: Option<Value>,
}

/// JSON-RPC 2.0 response; carries exactly one of `result` or `error`.
#[derive(Debug, Serialize, Deserialize, utoipa::ToSchema)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Value,
    pub result: Option<Value>,
    pub error: Option<Value>,
}

/// `POST /mcp` and `POST /messages`: one JSON-RPC message or batch per request.
#[utoipa::path(
    post,
    path = "/mcp",
    request_body = JsonRpcRequest,
    params(
        ("mcp-session-id" = Option<String>, Header, description = "Session assigned by an earlier response")
    ),
    responses(
        (status = 200, description = "JSON-RPC response (or array for batches)", body = JsonRpcResponse),
        (status = 202, description = "Only notifications were sent"),
        (status = 400, description = "Body is not valid JSON", body = JsonRpcResponse)
    ),
    tag = "mcp"
)]
pub async fn mcp_post(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, AppError> {
    let incoming: Value =
        serde_json::from_slice(&body).map_err(|e| AppError::MalformedBody(e.to_string()))?;

    let presented = headers
        .get(MCP_SESSION_ID_HEADER)
        .and_then(|value| value.to_str().ok());
    let resolved = state.dispatcher.sessions().resolve(presented);
    let session = resolved.session;

    let reply_as_batch = matches!(&incoming, Value::Array(items) if !items.is_empty());
    let mut responses = state
        .dispatcher
        .handle_incoming_message(incoming, &session)
        .await;

    tracing::debug!(
        event = "mcp_http_handled",
        session_id = %session.id,
        session_minted = resolved.minted,
        responses = responses.len(),
        "MCP HTTP message handled"
    );

    let response = if responses.is_empty() {
        StatusCode::ACCEPTED.into_response()
    } else if reply_as_batch {
        (StatusCode::OK, Json(responses)).into_response()
    } else {
        (StatusCode::OK, Json(responses.remove(0))).into_response()
    };
    Ok(with_session_header(response, &session.id))
}

fn with_session_header(mut response: Response, session_id: &str) -> Response {
    match HeaderValue::from_str(session_id) {
        Ok(value) => {
            response.headers_mut().insert(MCP_SESSION_ID_HEADER, value);
        }
        Err(_) => tracing::warn!(
            event = "mcp_session_header_invalid",
            session_id = %session_id,
            "Session id is not a valid header value"
        ),
    }
    response
}
