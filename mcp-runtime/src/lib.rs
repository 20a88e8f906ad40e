use std::sync::Arc;

use clap::{Args, Subcommand};
use serde_json::Value;
use tokio::io::{self, BufReader};

pub mod dispatcher;
pub mod executor;
pub mod kbeauty;
pub mod registry;
pub mod session;
pub mod stdio;

pub use dispatcher::{Dispatcher, initialize_payload, server_capabilities, server_info};
pub use executor::{ToolExecutionError, ToolExecutor};
pub use kbeauty::KBeautyExecutor;
pub use registry::{RegistryError, ToolRegistry};
pub use session::{ResolvedSession, Session, SessionPolicy, SessionStore};

pub const MCP_PROTOCOL_VERSION: &str = "2024-11-05";
pub const MCP_SERVER_NAME: &str = "k-beauty-complete";
/// Header carrying the server-assigned session id on HTTP and SSE responses.
pub const MCP_SESSION_ID_HEADER: &str = "mcp-session-id";

/// Dispatcher wired to the built-in K-Beauty catalog.
pub fn default_dispatcher(sessions: SessionStore) -> Result<Dispatcher, RegistryError> {
    Dispatcher::new(Arc::new(KBeautyExecutor::new()), sessions)
}

#[derive(Subcommand, Debug)]
pub enum McpCommands {
    /// Run the K-Beauty MCP server over stdio
    Serve(McpServeArgs),
    /// Print the tool catalog as JSON
    Tools,
}

#[derive(Args, Clone, Debug)]
pub struct McpServeArgs {
    /// Idle session TTL in seconds (0 keeps the session for the whole process)
    #[arg(long, env = "KBEAUTY_SESSION_TTL_SECS", default_value_t = 0)]
    pub session_ttl_secs: u64,
}

pub async fn run(command: McpCommands) -> i32 {
    match command {
        McpCommands::Serve(args) => {
            let sessions = SessionStore::new(SessionPolicy::from_ttl_secs(args.session_ttl_secs));
            let dispatcher = match default_dispatcher(sessions) {
                Ok(dispatcher) => dispatcher,
                Err(err) => return report_error("mcp_catalog_invalid", &err.to_string()),
            };
            let mut reader = BufReader::new(io::stdin());
            let mut writer = io::stdout();
            match stdio::serve(&dispatcher, &mut reader, &mut writer).await {
                Ok(()) => 0,
                Err(err) => report_error("mcp_server_error", &err.to_string()),
            }
        }
        McpCommands::Tools => {
            let dispatcher = match default_dispatcher(SessionStore::default()) {
                Ok(dispatcher) => dispatcher,
                Err(err) => return report_error("mcp_catalog_invalid", &err.to_string()),
            };
            println!("{}", to_pretty_json(&dispatcher.registry().list_payload()));
            0
        }
    }
}

fn report_error(code: &str, message: &str) -> i32 {
    let payload = serde_json::json!({
        "error": code,
        "message": message,
    });
    eprintln!("{}", to_pretty_json(&payload));
    1
}

fn to_pretty_json(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| "{}".to_string())
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[derive(Parser)]
    struct TestCli {
        #[command(subcommand)]
        command: McpCommands,
    }

    #[test]
    fn serve_defaults_to_process_lifetime_session() {
        let cli = TestCli::try_parse_from(["kbeauty-mcp", "serve"]).unwrap();
        let McpCommands::Serve(args) = cli.command else {
            panic!("expected serve");
        };
        assert_eq!(args.session_ttl_secs, 0);
    }

    #[test]
    fn default_dispatcher_lists_builtin_catalog() {
        let dispatcher = default_dispatcher(SessionStore::default()).unwrap();
        assert_eq!(dispatcher.registry().len(), 9);
        assert!(dispatcher.registry().contains("dupes_finder"));
    }

    #[tokio::test]
    async fn tools_command_succeeds() {
        assert_eq!(run(McpCommands::Tools).await, 0);
    }
}
