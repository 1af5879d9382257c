#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

//! # kai-remote
//!
//! Private-network remote for a desktop machine.
//!
//! kai-remote exposes an HTTP API on port 4004 that lets a phone on the same
//! LAN or VPN mesh run allow-listed shell commands, transcribe voice notes,
//! and talk to an agent gateway with spoken replies. Requests from outside
//! the trusted address ranges are refused, and everything but the health
//! probe and the PIN check requires the shared PIN.
//!
//! ## Subcommands
//!
//! - `kai-remote serve` (default): run the HTTP server
//! - `kai-remote check-config`: validate the TOML config and the command
//!   registry, then exit
//!
//! ## API surface
//!
//! | Method | Path                      | PIN | Description                       |
//! |--------|---------------------------|-----|-----------------------------------|
//! | GET    | `/api/health`             | No  | Liveness probe                    |
//! | POST   | `/api/verify`             | No  | Check a PIN                       |
//! | GET    | `/api/commands`           | Yes | List allow-listed commands        |
//! | POST   | `/api/exec`               | Yes | Run a command                     |
//! | POST   | `/api/transcribe`         | Yes | Speech-to-text for an upload      |
//! | POST   | `/api/chat`               | Yes | Gateway turn plus synthesized reply |
//! | GET    | `/api/audio/{filename}`   | Yes | Fetch a synthesized reply         |
//!
//! Any other path falls through to the static client in `server.static_dir`.

use std::net::SocketAddr;

use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use kai_remote::shell::process::augmented_path;
use kai_remote::{routes, AppState, CommandRegistry, Config, VoiceRelay};

/// Private-network remote for a desktop machine.
#[derive(Parser)]
#[command(name = "kai-remote", version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP server (default when no subcommand given).
    Serve {
        /// Path to TOML config file.
        #[arg(long)]
        config: Option<String>,
    },
    /// Validate configuration and the command registry, then exit.
    CheckConfig {
        /// Path to TOML config file.
        #[arg(long)]
        config: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::CheckConfig { config }) => check_config(config.as_deref()),
        Some(Commands::Serve { config }) => run_server(config.as_deref()).await,
        None => run_server(None).await,
    }
}

fn init_tracing(config: &Config) {
    let log_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| config.logging.level.clone());
    tracing_subscriber::fmt().with_env_filter(log_filter).init();
}

/// Load both configuration documents or exit with status 1.
fn load_or_exit(config_path: Option<&str>) -> (Config, CommandRegistry) {
    let config = match Config::load(config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };
    init_tracing(&config);

    match CommandRegistry::load(std::path::Path::new(&config.server.commands_file)) {
        Ok(registry) => (config, registry),
        Err(e) => {
            error!("{e}");
            std::process::exit(1);
        }
    }
}

fn check_config(config_path: Option<&str>) {
    let (config, registry) = load_or_exit(config_path);
    info!(
        "Configuration OK: {} commands from {}, custom commands {}",
        registry.commands().len(),
        config.server.commands_file,
        if registry.allows_custom() {
            "enabled"
        } else {
            "disabled"
        }
    );
}

async fn run_server(config_path: Option<&str>) {
    let (config, registry) = load_or_exit(config_path);

    info!("kai-remote v{} starting", env!("CARGO_PKG_VERSION"));
    info!(
        "Loaded {} commands from {}",
        registry.commands().len(),
        config.server.commands_file
    );
    if registry.allows_custom() {
        warn!("allowCustomCommands is enabled: any command string will be executed");
    }
    if config.transcription.api_key.is_none() {
        warn!("No transcription API key set (OPENAI_API_KEY); /api/transcribe will fail");
    }

    let search_path = augmented_path(&config.exec.extra_path, std::env::var_os("PATH"));
    let relay = match VoiceRelay::new(&config, search_path) {
        Ok(r) => r,
        Err(e) => {
            error!("Failed to prepare temp directories: {e}");
            std::process::exit(1);
        }
    };
    relay.sweep_stale_audio();

    let listen = config.server.listen.clone();
    let state = AppState::new(config, registry, relay);
    let app = routes::router(state.clone());

    let listener = match TcpListener::bind(&listen).await {
        Ok(l) => l,
        Err(e) => {
            error!("Failed to bind {listen}: {e}");
            std::process::exit(1);
        }
    };
    info!("Listening on {listen}");

    // Graceful shutdown
    let shutdown = async {
        let ctrl_c = tokio::signal::ctrl_c();
        #[cfg(unix)]
        {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    tokio::select! {
                        _ = ctrl_c => info!("Received SIGINT"),
                        _ = sigterm.recv() => info!("Received SIGTERM"),
                    }
                }
                Err(e) => {
                    warn!("Failed to register SIGTERM handler: {e}");
                    ctrl_c.await.ok();
                    info!("Received SIGINT");
                }
            }
        }
        #[cfg(not(unix))]
        {
            ctrl_c.await.ok();
            info!("Received SIGINT");
        }
    };

    if let Err(e) = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await
    {
        error!("Server error: {e}");
    }

    // Cleanup
    info!("Shutting down...");
    let pending = state.relay.deletions().pending();
    if pending > 0 {
        info!("Flushing {pending} pending audio deletions");
    }
    state.relay.deletions().shutdown().await;
    info!("Goodbye");
}
