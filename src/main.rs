use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use botfeed::auth::EnvCredentials;
use botfeed::channel::{ChannelRegistry, Subscription};
use botfeed::config::{ChannelConfig, Endpoints};
use botfeed::logging::{init_logging, log_session_end, LogMode, LoggingConfig};
use botfeed::transport::http::HttpPullTransport;
use botfeed::transport::ws::WsStreamTransport;

/// Watch live status updates for a running trading bot
#[derive(Parser, Debug)]
#[command(name = "botfeed", version, about)]
struct Args {
    /// Bot identifier to watch
    bot_id: String,

    /// REST API base URL
    #[arg(long, default_value = "http://127.0.0.1:8080/api")]
    api_url: String,

    /// WebSocket base URL
    #[arg(long, default_value = "ws://127.0.0.1:8080/ws")]
    stream_url: String,

    /// Poll interval in milliseconds for fallback mode
    #[arg(long, default_value_t = 5000)]
    poll_interval_ms: u64,

    /// Disable the poll fallback
    #[arg(long)]
    no_fallback: bool,

    /// Maximum stream reconnect attempts before giving up
    #[arg(long, default_value_t = 5)]
    max_reconnect_attempts: u32,

    /// Directory for per-session log files (console-only when omitted)
    #[arg(long)]
    log_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let log_mode = match &args.log_dir {
        Some(dir) => LogMode::ConsoleAndFile(dir.clone()),
        None => LogMode::Console,
    };
    init_logging(LoggingConfig::new(log_mode))?;

    let endpoints = Endpoints::new(&args.api_url, &args.stream_url)?;
    let credentials = Arc::new(EnvCredentials::new("BOTFEED_TOKEN"));
    let stream_transport = Arc::new(WsStreamTransport::new(endpoints.clone()));
    let pull_transport = Arc::new(HttpPullTransport::new(endpoints));
    let registry = ChannelRegistry::new(stream_transport, pull_transport, credentials);

    let mut config = ChannelConfig::new(args.bot_id.clone());
    config.poll_interval = Duration::from_millis(args.poll_interval_ms);
    config.fallback_enabled = !args.no_fallback;
    config.max_reconnect_attempts = args.max_reconnect_attempts;

    let subscription = Subscription::new()
        .on_status(|status| {
            tracing::info!(
                bot_id = %status.bot_id,
                state = %status.state,
                equity = ?status.equity,
                open_positions = ?status.open_positions,
                "Status update"
            );
        })
        .on_event(|event| {
            tracing::info!(?event, "Bot event");
        })
        .on_error(|message| {
            tracing::error!("Channel error: {message}");
        });

    registry.watch(config, subscription).await;
    tracing::info!(bot_id = %args.bot_id, "Watching bot, press ctrl-c to stop");

    tokio::signal::ctrl_c().await?;

    registry.close_all().await;
    log_session_end();
    Ok(())
}
