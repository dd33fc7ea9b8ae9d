use clap::{Args, Parser};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use vigil_client_core::api::ApiClient;
use vigil_client_core::config::Config;
use vigil_client_core::protocol::ResourceKind;
use vigil_client_core::refresh::{DashboardState, HttpRefresher, LogNotifier, RefreshTarget};
use vigil_client_core::sync::{
    Collaborators, LifecycleCoordinator, ReconnectPolicy, SyncConfig, LIVE_VIEW,
};
use vigil_client_core::telemetry::logging::{self, LogConfig, LogLevel};
use vigil_client_core::transport::WebSocketTransport;

#[derive(Parser, Debug)]
#[command(
    name = "vigil",
    about = "Predictive-maintenance dashboard client with live sync and polling fallback",
    author,
    version = concat!(env!("CARGO_PKG_VERSION"), "-", env!("BUILD_TIMESTAMP"))
)]
struct Cli {
    #[arg(
        long,
        env = "VIGIL_SERVER",
        help = "Monitor server address, e.g. 127.0.0.1:8000"
    )]
    server: Option<String>,

    #[arg(
        long = "ws-url",
        env = "VIGIL_WS_URL",
        help = "Override the live-update WebSocket URL"
    )]
    ws_url: Option<String>,

    #[arg(
        long = "poll-interval",
        value_name = "SECS",
        default_value_t = 15,
        help = "Fallback poll cadence per resource"
    )]
    poll_interval: u64,

    #[arg(
        long = "reconnect-attempts",
        value_name = "N",
        default_value_t = 5,
        help = "Automatic reconnection attempts before giving up"
    )]
    reconnect_attempts: u32,

    #[arg(
        long = "reconnect-delay",
        value_name = "SECS",
        default_value_t = 3,
        help = "Delay between reconnection attempts"
    )]
    reconnect_delay: u64,

    #[command(flatten)]
    logging: LoggingArgs,
}

#[derive(Args, Debug, Clone)]
struct LoggingArgs {
    #[arg(
        long = "log-level",
        value_enum,
        env = "VIGIL_LOG_LEVEL",
        default_value_t = LogLevel::Info,
        help = "Minimum log level (error, warn, info, debug, trace)"
    )]
    level: LogLevel,

    #[arg(
        long = "log-file",
        value_name = "PATH",
        env = "VIGIL_LOG_FILE",
        help = "Write structured logs to the specified file"
    )]
    file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    logging::init(&LogConfig {
        level: cli.logging.level,
        file: cli.logging.file.clone(),
    })?;

    let mut config = Config::from_env();
    if let Some(server) = cli.server {
        config.server = server;
    }
    if cli.ws_url.is_some() {
        config.ws_url = cli.ws_url;
    }

    let api = Arc::new(ApiClient::new(&config.api_base_url())?);
    let state = Arc::new(DashboardState::default());
    let collab = Collaborators {
        machines: Arc::new(HttpRefresher::new(
            api.clone(),
            state.clone(),
            RefreshTarget::Resource(ResourceKind::Machines),
        )),
        sensors: Arc::new(HttpRefresher::new(
            api.clone(),
            state.clone(),
            RefreshTarget::Resource(ResourceKind::Sensors),
        )),
        models: Arc::new(HttpRefresher::new(
            api.clone(),
            state.clone(),
            RefreshTarget::Resource(ResourceKind::Models),
        )),
        charts: Arc::new(HttpRefresher::new(api, state, RefreshTarget::Charts)),
        notifier: Arc::new(LogNotifier),
    };

    let sync_cfg = SyncConfig {
        ws_url: config.live_ws_url(),
        reconnect: ReconnectPolicy {
            max_attempts: cli.reconnect_attempts,
            delay: Duration::from_secs(cli.reconnect_delay),
        },
        poll_interval: Duration::from_secs(cli.poll_interval),
        ..SyncConfig::default()
    };

    let mut coordinator =
        LifecycleCoordinator::new(sync_cfg, Arc::new(WebSocketTransport), collab);
    coordinator.on_view_enter(LIVE_VIEW);

    tokio::signal::ctrl_c().await?;
    info!(target: "vigil", "shutting down");
    coordinator.on_view_leave(LIVE_VIEW);

    Ok(())
}
