use axum::http::HeaderMap;
use axum::http::header::HOST;
use axum::{Json, Router, routing::get};
use serde::Serialize;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route(
        "/.well-known/oauth-authorization-server",
        get(oauth_authorization_server_metadata),
    )
}

/// Static OAuth discovery document. No OAuth flow is served behind it.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct OAuthServerMetadata {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub response_types_supported: Vec<String>,
    pub grant_types_supported: Vec<String>,
}

#[utoipa::path(
    get,
    path = "/.well-known/oauth-authorization-server",
    responses(
        (status = 200, description = "OAuth discovery stub", body = OAuthServerMetadata)
    ),
    tag = "discovery"
)]
pub async fn oauth_authorization_server_metadata(
    headers: HeaderMap,
) -> Json<OAuthServerMetadata> {
    let base = request_base_url(&headers);
    tracing::debug!(
        event = "mcp_oauth_discovery",
        base_url = %base,
        "OAuth discovery metadata requested"
    );
    Json(OAuthServerMetadata {
        issuer: base.clone(),
        authorization_endpoint: format!("{base}/oauth/authorize"),
        token_endpoint: format!("{base}/oauth/token"),
        response_types_supported: vec!["code".to_string()],
        grant_types_supported: vec!["authorization_code".to_string()],
    })
}

/// Public base URL as seen by the client, honoring reverse-proxy headers.
pub fn request_base_url(headers: &HeaderMap) -> String {
    let forwarded_proto = first_header_token(headers, "x-forwarded-proto");
    let forwarded_host = first_header_token(headers, "x-forwarded-host");
    let host = forwarded_host
        .or_else(|| {
            headers
                .get(HOST)
                .and_then(|v| v.to_str().ok())
                .map(ToOwned::to_owned)
        })
        .unwrap_or_else(|| "localhost".to_string());

    let proto = forwarded_proto.unwrap_or_else(|| {
        if host.contains("localhost") || host.starts_with("127.0.0.1") {
            "http".to_string()
        } else {
            "https".to_string()
        }
    });
    format!("{}://{}", proto.trim_end_matches(':'), host)
}

fn first_header_token(headers: &HeaderMap, key: &str) -> Option<String> {
    headers
        .get(key)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(ToOwned::to_owned)
}
