use axum::http::{HeaderName, HeaderValue, Method};
use kbeauty_mcp_runtime::MCP_SESSION_ID_HEADER;
use tower_http::cors::{AllowOrigin, CorsLayer};

/// Build a CORS layer from the configured origins.
///
/// - Origins: `None` allows any origin (the `KBEAUTY_CORS_ORIGINS=*` default)
/// - Methods: GET, POST, OPTIONS
/// - Headers: Authorization, Content-Type, Mcp-Session-Id
/// - Exposed: Mcp-Session-Id, so browser clients can read the assigned session
/// - Max age: 3600s
pub fn build_cors_layer(origins: Option<&[String]>) -> CorsLayer {
    let allow_origin = match origins {
        None => AllowOrigin::any(),
        Some(origins) => {
            let values: Vec<HeaderValue> = origins
                .iter()
                .filter_map(|origin| origin.parse::<HeaderValue>().ok())
                .collect();
            AllowOrigin::list(values)
        }
    };

    let session_header = HeaderName::from_static(MCP_SESSION_ID_HEADER);
    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            HeaderName::from_static("authorization"),
            HeaderName::from_static("content-type"),
            session_header.clone(),
        ])
        .expose_headers([session_header])
        .max_age(std::time::Duration::from_secs(3600))
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::routing::post;
    use axum::Router;
    use tower::ServiceExt;

    use super::*;

    async fn ok() -> StatusCode {
        StatusCode::OK
    }

    #[tokio::test]
    async fn preflight_allows_session_header_from_any_origin() {
        let app = Router::new()
            .route("/mcp", post(ok))
            .layer(build_cors_layer(None));

        let response = app
            .oneshot(
                Request::builder()
                    .method(Method::OPTIONS)
                    .uri("/mcp")
                    .header("origin", "https://claude.ai")
                    .header("access-control-request-method", "POST")
                    .header("access-control-request-headers", "mcp-session-id")
                    .body(Body::empty())
                    .expect("request should build"),
            )
            .await
            .expect("request should succeed");

        let headers = response.headers();
        assert_eq!(
            headers
                .get("access-control-allow-origin")
                .expect("allow-origin header should exist"),
            "*"
        );
        let allowed = headers
            .get("access-control-allow-headers")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        assert!(allowed.contains(MCP_SESSION_ID_HEADER));
    }

    #[tokio::test]
    async fn listed_origins_expose_session_header() {
        let origins = vec!["https://claude.ai".to_string()];
        let app = Router::new()
            .route("/mcp", post(ok))
            .layer(build_cors_layer(Some(&origins)));

        let response = app
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/mcp")
                    .header("origin", "https://claude.ai")
                    .body(Body::empty())
                    .expect("request should build"),
            )
            .await
            .expect("request should succeed");

        let headers = response.headers();
        assert_eq!(
            headers
                .get("access-control-allow-origin")
                .expect("allow-origin header should exist"),
            "https://claude.ai"
        );
        assert_eq!(
            headers
                .get("access-control-expose-headers")
                .expect("expose-headers header should exist"),
            MCP_SESSION_ID_HEADER
        );
    }
}
