#![forbid(unsafe_code)]

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde_json::Value;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{Level as TraceLevel, info};
use tracing_subscriber::FmtSubscriber;

use wallpaper_player::app::Daemon;
use wallpaper_player::config::AppConfig;
use wallpaper_player::ipc::{ControlClient, ControlRequest, ControlResponse};

#[derive(Parser)]
#[command(name = "wallpaper-player")]
#[command(about = "Live wallpaper player daemon and control client", long_about = None)]
struct Cli {
    /// Config file (defaults to the user config directory)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Control socket override
    #[arg(long, global = true, value_name = "SOCKET")]
    socket: Option<PathBuf>,

    /// trace, debug, info, warn or error
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the player daemon
    Run {
        /// Resource root for this run
        #[arg(long, value_name = "DIR")]
        resource_path: Option<PathBuf>,
    },

    /// Invoke a player command, e.g. `call volume 0.3`
    Call {
        event: String,

        /// JSON argument; bare words are sent as strings
        arg: Option<String>,
    },

    /// Print events from a player stream until interrupted
    Listen { event: String },

    /// Move the resource root of the running daemon
    Relocate {
        #[arg(value_name = "DIR")]
        path: PathBuf,
    },

    /// Report whether another application holds the foreground
    Session {
        #[arg(action = clap::ArgAction::Set)]
        busy: bool,
    },

    /// Report screen lock state
    Lock {
        #[arg(action = clap::ArgAction::Set)]
        locked: bool,
    },

    /// Check that the daemon is alive
    Ping,

    /// Stop the daemon
    Shutdown,
}

fn parse_level(level: &str) -> TraceLevel {
    match level.to_lowercase().as_str() {
        "trace" => TraceLevel::TRACE,
        "debug" => TraceLevel::DEBUG,
        "warn" => TraceLevel::WARN,
        "error" => TraceLevel::ERROR,
        _ => TraceLevel::INFO,
    }
}

fn parse_arg(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(AppConfig::path);
    let mut config = AppConfig::load_from(&config_path)?;
    if let Some(socket) = &cli.socket {
        config.socket_path = Some(socket.clone());
    }

    // Flag, then LOG_LEVEL, then the config file
    let level = cli
        .log_level
        .clone()
        .or_else(|| std::env::var("LOG_LEVEL").ok())
        .unwrap_or_else(|| config.log_level.clone());
    let subscriber = FmtSubscriber::builder()
        .with_max_level(parse_level(&level))
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    runtime.block_on(async move {
        match cli.command {
            Commands::Run { resource_path } => {
                if let Some(path) = resource_path {
                    config.resource_path = path;
                }
                info!(config = %config_path.display(), "Starting wallpaper player");
                let daemon = Daemon::open(config, config_path).await?;
                daemon.run(CancellationToken::new()).await
            }
            Commands::Listen { event } => listen(&config, event).await,
            Commands::Call { event, arg } => {
                let arg = arg.as_deref().map(parse_arg);
                send(&config, ControlRequest::Call { event, arg }).await
            }
            Commands::Relocate { path } => {
                let path = std::path::absolute(&path)
                    .with_context(|| format!("Failed to resolve {}", path.display()))?;
                send(&config, ControlRequest::Relocate { path }).await
            }
            Commands::Session { busy } => send(&config, ControlRequest::Session { busy }).await,
            Commands::Lock { locked } => send(&config, ControlRequest::ScreenLock { locked }).await,
            Commands::Ping => send(&config, ControlRequest::Ping).await,
            Commands::Shutdown => send(&config, ControlRequest::Shutdown).await,
        }
    })
}

async fn connect(config: &AppConfig) -> Result<ControlClient> {
    let socket = config.socket_path()?;
    ControlClient::connect_to(&socket).await
}

async fn send(config: &AppConfig, request: ControlRequest) -> Result<()> {
    let mut client = connect(config).await?;
    match client.request(request).await? {
        ControlResponse::Reply(value) => println!("{value}"),
        ControlResponse::Pong => println!("pong"),
        ControlResponse::Ready => println!("ok"),
        ControlResponse::Event { payload, .. } => println!("{payload}"),
        ControlResponse::Error(message) => bail!("Daemon refused request: {message}"),
    }
    Ok(())
}

async fn listen(config: &AppConfig, event: String) -> Result<()> {
    let mut client = connect(config).await?;
    match client.request(ControlRequest::Listen { event }).await? {
        ControlResponse::Ready => {}
        ControlResponse::Error(message) => bail!("Daemon refused subscription: {message}"),
        other => bail!("Unexpected response to subscription: {other:?}"),
    }

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => return Ok(()),
            response = client.recv_response() => {
                match response? {
                    ControlResponse::Event { payload, .. } => println!("{payload}"),
                    other => bail!("Unexpected message on event stream: {other:?}"),
                }
            }
        }
    }
}
