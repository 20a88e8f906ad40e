use axum::routing::get;
use axum::{Json, Router};
use tower::ServiceBuilder;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;

use crate::config::AppConfig;
use crate::error::panic_response;
use crate::middleware;
use crate::state::AppState;

pub mod discovery;
pub mod health;
pub mod mcp_http;
pub mod mcp_sse;

/// Full application router with the ambient layers applied.
pub fn build_app(state: AppState, config: &AppConfig) -> Router {
    let mcp = match middleware::rate_limit::mcp_layer(config.rate_limit_per_minute) {
        Some(layer) => mcp_http::router().layer(layer),
        None => mcp_http::router(),
    };

    Router::new()
        .route("/api-doc/openapi.json", get(openapi_document))
        .merge(health::router())
        .merge(discovery::router())
        .merge(mcp)
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::x_request_id())
                .layer(CatchPanicLayer::custom(panic_response))
                .layer(middleware::cors::build_cors_layer(
                    config.cors_origins.as_deref(),
                )),
        )
        .with_state(state)
}

async fn openapi_document() -> Json<utoipa::openapi::OpenApi> {
    Json(crate::ApiDoc::openapi())
}

#[cfg(test)]
pub(crate) fn test_app() -> (Router, AppState) {
    use kbeauty_mcp_runtime::SessionPolicy;

    test_app_with_policy(SessionPolicy::unbounded())
}

#[cfg(test)]
pub(crate) fn test_app_with_policy(
    policy: kbeauty_mcp_runtime::SessionPolicy,
) -> (Router, AppState) {
    use std::time::Duration;

    use kbeauty_mcp_runtime::{SessionStore, default_dispatcher};

    let dispatcher =
        default_dispatcher(SessionStore::new(policy)).expect("built-in catalog is valid");
    let state = AppState::new(dispatcher, Duration::from_secs(30));
    let config = AppConfig {
        rate_limit_per_minute: 0,
        ..AppConfig::default()
    };
    (build_app(state.clone(), &config), state)
}

#[cfg(test)]
mod tests {
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode};
    use serde_json::Value;
    use tower::ServiceExt;

    use super::*;

    async fn get_json(app: Router, uri: &str) -> (StatusCode, Value) {
        let response = app
            .oneshot(
                Request::builder()
                    .uri(uri)
                    .body(Body::empty())
                    .expect("request should build"),
            )
            .await
            .expect("request should succeed");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn health_reports_server_identity() {
        let (app, state) = test_app();
        for path in ["/", "/health"] {
            let (status, body) = get_json(app.clone(), path).await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body["status"], "healthy");
            assert_eq!(body["server"], "k-beauty-remote-mcp");
            assert_eq!(body["version"], "3.0.0");
        }
        assert!(state.dispatcher.sessions().is_empty());
    }

    #[tokio::test]
    async fn oauth_stub_uses_request_host() {
        let (app, _) = test_app();
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/.well-known/oauth-authorization-server")
                    .header("host", "mcp.example.com")
                    .body(Body::empty())
                    .expect("request should build"),
            )
            .await
            .unwrap();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(
            body["authorization_endpoint"],
            "https://mcp.example.com/oauth/authorize"
        );
        assert_eq!(body["token_endpoint"], "https://mcp.example.com/oauth/token");
        assert_eq!(body["response_types_supported"][0], "code");
        assert_eq!(body["grant_types_supported"][0], "authorization_code");
    }

    #[tokio::test]
    async fn openapi_document_lists_http_surface() {
        let (app, _) = test_app();
        let (status, body) = get_json(app, "/api-doc/openapi.json").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["paths"]["/"].is_object());
        assert!(body["paths"]["/mcp"].is_object());
        assert!(body["paths"]["/.well-known/oauth-authorization-server"].is_object());
    }

    #[tokio::test]
    async fn responses_carry_request_id() {
        let (app, _) = test_app();
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .expect("request should build"),
            )
            .await
            .unwrap();
        assert!(response.headers().get("x-request-id").is_some());
    }
}
