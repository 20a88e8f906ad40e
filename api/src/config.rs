use std::time::Duration;

const DEFAULT_PORT: u16 = 8000;
const DEFAULT_SESSION_TTL_SECS: u64 = 86_400;
const DEFAULT_SESSION_SWEEP_SECS: u64 = 60;
const SESSION_SWEEP_SECS_MIN: u64 = 1;
const SESSION_SWEEP_SECS_MAX: u64 = 3600;
const DEFAULT_SSE_HEARTBEAT_SECS: u64 = 30;
const SSE_HEARTBEAT_SECS_MIN: u64 = 1;
const SSE_HEARTBEAT_SECS_MAX: u64 = 300;
const DEFAULT_RATE_LIMIT_PER_MINUTE: u32 = 120;

/// Process configuration, read once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub port: u16,
    /// `None` means any origin.
    pub cors_origins: Option<Vec<String>>,
    /// Idle TTL in seconds; `0` keeps sessions for the process lifetime.
    pub session_ttl_secs: u64,
    pub session_sweep: Duration,
    pub sse_heartbeat: Duration,
    /// Requests per minute per client IP on MCP routes; `0` disables limiting.
    pub rate_limit_per_minute: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            cors_origins: None,
            session_ttl_secs: DEFAULT_SESSION_TTL_SECS,
            session_sweep: Duration::from_secs(DEFAULT_SESSION_SWEEP_SECS),
            sse_heartbeat: Duration::from_secs(DEFAULT_SSE_HEARTBEAT_SECS),
            rate_limit_per_minute: DEFAULT_RATE_LIMIT_PER_MINUTE,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let port = lookup("PORT")
            .and_then(|p| p.trim().parse().ok())
            .unwrap_or(DEFAULT_PORT);
        let sweep_secs = parse_env_u64_with_bounds(
            lookup("KBEAUTY_SESSION_SWEEP_SECS"),
            SESSION_SWEEP_SECS_MIN,
            SESSION_SWEEP_SECS_MAX,
            DEFAULT_SESSION_SWEEP_SECS,
        );
        let heartbeat_secs = parse_env_u64_with_bounds(
            lookup("KBEAUTY_SSE_HEARTBEAT_SECS"),
            SSE_HEARTBEAT_SECS_MIN,
            SSE_HEARTBEAT_SECS_MAX,
            DEFAULT_SSE_HEARTBEAT_SECS,
        );
        let ttl_secs = lookup("KBEAUTY_SESSION_TTL_SECS")
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(DEFAULT_SESSION_TTL_SECS);

        Self {
            port,
            cors_origins: parse_origins(lookup("KBEAUTY_CORS_ORIGINS")),
            session_ttl_secs: session_ttl_covering_heartbeat(ttl_secs, heartbeat_secs),
            session_sweep: Duration::from_secs(sweep_secs),
            sse_heartbeat: Duration::from_secs(heartbeat_secs),
            rate_limit_per_minute: lookup("KBEAUTY_RATE_LIMIT_PER_MINUTE")
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(DEFAULT_RATE_LIMIT_PER_MINUTE),
        }
    }
}

fn parse_env_u64_with_bounds(raw: Option<String>, min: u64, max: u64, default: u64) -> u64 {
    raw.and_then(|value| value.trim().parse::<u64>().ok())
        .map_or(default, |parsed| parsed.clamp(min, max))
}

/// A non-zero TTL shorter than the heartbeat would evict sessions with an open stream.
fn session_ttl_covering_heartbeat(ttl_secs: u64, heartbeat_secs: u64) -> u64 {
    if ttl_secs == 0 || ttl_secs >= heartbeat_secs {
        return ttl_secs;
    }
    tracing::warn!(
        event = "config_session_ttl_raised",
        requested_secs = ttl_secs,
        heartbeat_secs,
        "KBEAUTY_SESSION_TTL_SECS is below the SSE heartbeat period; using the heartbeat period"
    );
    heartbeat_secs
}

fn parse_origins(raw: Option<String>) -> Option<Vec<String>> {
    let raw = raw?;
    let origins: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToOwned::to_owned)
        .collect();
    if origins.is_empty() || origins.iter().any(|origin| origin == "*") {
        return None;
    }
    Some(origins)
}
