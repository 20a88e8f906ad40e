use std::net::SocketAddr;

use kbeauty_mcp_runtime::{SessionPolicy, SessionStore, default_dispatcher};
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;

mod config;
mod error;
mod middleware;
mod routes;
mod state;

use config::AppConfig;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "K-Beauty Remote MCP",
        description = "Model Context Protocol gateway exposing K-Beauty skincare tools over HTTP and SSE."
    ),
    paths(
        routes::health::health_check,
        routes::mcp_http::mcp_post,
        routes::mcp_sse::mcp_stream,
        routes::discovery::oauth_authorization_server_metadata,
    ),
    components(schemas(
        HealthResponse,
        routes::mcp_http::JsonRpcRequest,
        routes::mcp_http::JsonRpcResponse,
        routes::discovery::OAuthServerMetadata,
    ))
)]
struct ApiDoc;

#[derive(Serialize, utoipa::ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub server: String,
    pub version: String,
}

#[tokio::main]
async fn main() {
    // Load .env if present (dev only)
    let _ = dotenvy::dotenv();

    // Structured JSON logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "kbeauty_api=debug,kbeauty_mcp_runtime=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    if let Err(err) = run(AppConfig::from_env()).await {
        tracing::error!(event = "server_exit", error = %err, "K-Beauty MCP server stopped");
        std::process::exit(1);
    }
}

async fn run(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let sessions = SessionStore::new(SessionPolicy::from_ttl_secs(config.session_ttl_secs));
    let _sweeper = sessions.spawn_sweeper(config.session_sweep);
    let dispatcher = default_dispatcher(sessions)?;

    tracing::info!(
        event = "server_config",
        port = config.port,
        tools = dispatcher.registry().len(),
        session_ttl_secs = config.session_ttl_secs,
        sse_heartbeat_secs = config.sse_heartbeat.as_secs(),
        rate_limit_per_minute = config.rate_limit_per_minute,
        cors_any_origin = config.cors_origins.is_none(),
        "K-Beauty MCP server configured"
    );

    let app_state = state::AppState::new(dispatcher, config.sse_heartbeat);
    let app = routes::build_app(app_state, &config);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("K-Beauty MCP listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}
