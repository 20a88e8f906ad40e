use std::convert::Infallible;
use std::time::Duration;

use axum::extract::State;
use axum::http::HeaderValue;
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use kbeauty_core::jsonrpc::Notification;
use kbeauty_mcp_runtime::{MCP_SESSION_ID_HEADER, SessionStore, initialize_payload};
use serde_json::json;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_stream::wrappers::ReceiverStream;

use crate::state::{AppState, StreamGuard};

const SSE_CHANNEL_CAPACITY: usize = 8;

/// `GET /mcp`: server-to-client event stream for a freshly minted session.
#[utoipa::path(
    get,
    path = "/mcp",
    responses(
        (status = 200, description = "Event stream: notifications/initialized, then periodic notifications/heartbeat", content_type = "text/event-stream")
    ),
    tag = "mcp"
)]
pub async fn mcp_stream(State(state): State<AppState>) -> Response {
    let session = state.dispatcher.sessions().create();
    let (tx, rx) = mpsc::channel::<Result<Event, Infallible>>(SSE_CHANNEL_CAPACITY);

    let guard = state.streams.open();
    tracing::info!(
        event = "mcp_sse_opened",
        session_id = %session.id,
        active_streams = state.streams.active(),
        "MCP event stream opened"
    );
    tokio::spawn(run_heartbeat(
        tx,
        state.dispatcher.sessions().clone(),
        session.id.clone(),
        state.sse_heartbeat,
        guard,
    ));

    let mut response = Sse::new(ReceiverStream::new(rx)).into_response();
    if let Ok(value) = HeaderValue::from_str(&session.id) {
        response.headers_mut().insert(MCP_SESSION_ID_HEADER, value);
    }
    response
}

/// Feeds the stream until the client goes away. The receiver is owned by the
/// response body, so `closed()` resolves as soon as the connection drops.
async fn run_heartbeat(
    tx: mpsc::Sender<Result<Event, Infallible>>,
    sessions: SessionStore,
    session_id: String,
    period: Duration,
    _guard: StreamGuard,
) {
    let greeting = Notification::new("notifications/initialized", initialize_payload());
    if tx.send(Ok(frame(&greeting))).await.is_err() {
        tracing::debug!(event = "mcp_sse_closed", session_id = %session_id, "Client left before greeting");
        return;
    }

    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut beats: u64 = 0;

    loop {
        tokio::select! {
            _ = tx.closed() => break,
            _ = ticker.tick() => {
                sessions.touch(&session_id);
                let heartbeat = Notification::new(
                    "notifications/heartbeat",
                    json!({ "timestamp": Utc::now().to_rfc3339() }),
                );
                if tx.send(Ok(frame(&heartbeat))).await.is_err() {
                    break;
                }
                beats += 1;
            }
        }
    }

    tracing::debug!(
        event = "mcp_sse_closed",
        session_id = %session_id,
        heartbeats = beats,
        "MCP event stream closed"
    );
}

fn frame(notification: &Notification) -> Event {
    let data = serde_json::to_string(notification).unwrap_or_else(|_| "{}".to_string());
    Event::default().data(data)
}
