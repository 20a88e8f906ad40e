use clap::Parser;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use kbeauty_mcp_runtime::{McpCommands, run as run_mcp};

#[derive(Parser)]
#[command(
    name = "kbeauty-mcp",
    version,
    about = "K-Beauty MCP server over stdio"
)]
struct Cli {
    #[command(subcommand)]
    command: McpCommands,
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();

    // stdout carries protocol frames
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "kbeauty_mcp_runtime=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let code = run_mcp(cli.command).await;
    std::process::exit(code);
}
