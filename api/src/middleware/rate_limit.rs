use axum::Json;
use axum::http::{HeaderValue, Response, StatusCode};
use axum::response::IntoResponse;
use tower_governor::{
    GovernorError, GovernorLayer, governor::GovernorConfigBuilder,
    key_extractor::SmartIpKeyExtractor,
};

pub type RateLimitLayer =
    GovernorLayer<SmartIpKeyExtractor, governor::middleware::NoOpMiddleware, axum::body::Body>;

const RATE_LIMITED: &str = "rate_limited";

/// Per-IP limit for the MCP routes: `per_minute` requests, replenished evenly.
///
/// Returns `None` when limiting is disabled (`0`).
pub fn mcp_layer(per_minute: u32) -> Option<RateLimitLayer> {
    if per_minute == 0 {
        return None;
    }
    let replenish_ms = (60_000 / u64::from(per_minute)).max(1);
    let config = GovernorConfigBuilder::default()
        .per_millisecond(replenish_ms)
        .burst_size(per_minute)
        .key_extractor(SmartIpKeyExtractor)
        .finish()?;
    Some(GovernorLayer::new(config).error_handler(json_error_handler))
}

/// JSON error body with a `Retry-After` header.
fn json_error_handler(err: GovernorError) -> Response<axum::body::Body> {
    let (status, retry_after, message) = match err {
        GovernorError::TooManyRequests { wait_time, .. } => (
            StatusCode::TOO_MANY_REQUESTS,
            Some(wait_time),
            format!("Too many requests. Retry after {wait_time} seconds."),
        ),
        GovernorError::UnableToExtractKey => (
            StatusCode::INTERNAL_SERVER_ERROR,
            None,
            "Unable to determine client identity for rate limiting".to_string(),
        ),
        GovernorError::Other { code, msg, .. } => (code, None, msg.unwrap_or_default()),
    };

    let request_id = uuid::Uuid::now_v7().to_string();
    tracing::info!(
        event = "mcp_rate_limited",
        status = status.as_u16(),
        request_id = %request_id,
        "Request rejected by rate limiter"
    );
    let body = serde_json::json!({
        "error": RATE_LIMITED,
        "message": message,
        "request_id": request_id,
    });

    let mut response = (status, Json(body)).into_response();
    if let Some(wait_time) = retry_after
        && let Ok(value) = HeaderValue::from_str(&wait_time.to_string())
    {
        response.headers_mut().insert("retry-after", value);
    }
    response
}

#[cfg(test)]
mod tests {
    use axum::body::to_bytes;

    use super::*;

    #[test]
    fn zero_disables_limiting() {
        assert!(mcp_layer(0).is_none());
        assert!(mcp_layer(120).is_some());
    }

    #[tokio::test]
    async fn too_many_requests_carries_retry_after() {
        let response = json_error_handler(GovernorError::TooManyRequests {
            wait_time: 3,
            headers: None,
        });
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers().get("retry-after").unwrap(), "3");
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"], RATE_LIMITED);
    }
}
