use std::time::Duration;

use clap::Parser;

use bridge_core::Config;

#[derive(Parser)]
#[command(
    name = "claude-bridge",
    about = "OpenAI-compatible HTTP gateway for Claude",
    version
)]
struct Cli {
    /// Port to listen on
    #[arg(long, env = "PORT", default_value = "8000")]
    port: u16,

    /// Wrapper bearer token protecting the HTTP surface
    #[arg(long, env = "API_KEY")]
    api_key: Option<String>,

    /// Session time-to-live in minutes
    #[arg(long, env = "SESSION_TTL_MINUTES", default_value = "60")]
    session_ttl_minutes: u64,

    /// Interval between expired-session sweeps, in minutes
    #[arg(long, env = "SESSION_CLEANUP_INTERVAL_MINUTES", default_value = "5")]
    cleanup_interval_minutes: u64,

    /// Per-request deadline in seconds
    #[arg(long, env = "REQUEST_TIMEOUT_SECONDS", default_value = "600")]
    request_timeout_seconds: u64,

    /// Path to the claude executable (default: auto-discover)
    #[arg(long, env = "CLAUDE_COMMAND")]
    claude_command: Option<String>,
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_target(false)
        .init();

    let config = Config {
        port: cli.port,
        api_key: cli.api_key.filter(|k| !k.trim().is_empty()),
        session_ttl: Duration::from_secs(cli.session_ttl_minutes * 60),
        cleanup_interval: Duration::from_secs(cli.cleanup_interval_minutes * 60),
        request_timeout: Duration::from_secs(cli.request_timeout_seconds),
        claude_command: cli.claude_command,
    };

    let rt = tokio::runtime::Runtime::new().expect("failed to create tokio runtime");
    if let Err(e) = rt.block_on(bridge_server::serve(config)) {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
