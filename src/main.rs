//! mcp-socket-bridge: expose local capabilities to a remote MCP client over a WebSocket
//!
//! Connects to the configured endpoint, serves the built-in host
//! capabilities, and keeps the connection alive until interrupted.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info, warn, Level};
use tracing_subscriber::EnvFilter;

use mcp_socket_bridge::config;
use mcp_socket_bridge::host;
use mcp_socket_bridge::mcp::{
    AccountInstance, Bridge, ConnectionStatus, InstanceResolver, StaticInstance,
    WebSocketConnector,
};

/// Bridge exposing local tools, resources and prompts to a remote MCP client.
///
/// Dials out to a WebSocket endpoint and answers MCP JSON-RPC requests
/// arriving on that connection, reconnecting whenever it drops.
#[derive(Parser, Debug)]
#[command(name = "mcp-socket-bridge")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(value_name = "CONFIG_FILE")]
    config: Option<PathBuf>,

    /// WebSocket endpoint to connect to (overrides the config file)
    #[arg(long, value_name = "URL")]
    endpoint: Option<String>,

    /// Instance identifier appended to the endpoint (overrides the config file)
    #[arg(long, value_name = "ID")]
    instance: Option<String>,

    /// Increase logging verbosity (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Decrease logging verbosity (only show errors)
    #[arg(short, long)]
    quiet: bool,
}

/// Determines the log level from CLI arguments.
#[allow(clippy::match_same_arms)] // Explicit "warn" arm for clarity
fn get_log_level(verbose: u8, quiet: bool, config_level: &str) -> Level {
    if quiet {
        return Level::ERROR;
    }

    match verbose {
        0 => match config_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::WARN, // Default to warn for unknown levels
        },
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

/// Initialises the tracing subscriber for logging.
fn init_tracing(level: Level) {
    let filter = EnvFilter::from_default_env().add_directive(level.into());

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Resolves when the process is asked to stop.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = terminate.recv() => {}
                }
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

/// Entry point for the mcp-socket-bridge binary.
fn main() -> ExitCode {
    let args = Args::parse();

    // Load configuration
    let config_path = args.config.as_deref();
    let mut cfg = match config::load_config(config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            if config_path.is_none() {
                if let Some(default_path) = config::default_config_path() {
                    eprintln!("\nConfig read from: {}", default_path.display());
                }
            }
            return ExitCode::FAILURE;
        }
    };

    // Apply command-line overrides
    if let Some(endpoint) = args.endpoint {
        cfg.bridge.endpoint = endpoint;
    }
    if let Some(instance) = args.instance {
        cfg.bridge.instance_id = Some(instance);
    }
    if let Err(e) = cfg.validate() {
        eprintln!("Configuration error: {e}");
        return ExitCode::FAILURE;
    }

    // Initialise logging
    let log_level = get_log_level(args.verbose, args.quiet, &cfg.logging.level);
    init_tracing(log_level);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        endpoint = %cfg.bridge.endpoint,
        "Starting mcp-socket-bridge"
    );

    let resolver: Arc<dyn InstanceResolver> = match cfg.bridge.instance_id.clone() {
        Some(id) => Arc::new(StaticInstance(id)),
        None => Arc::new(AccountInstance),
    };
    let bridge_config = cfg.bridge_config();
    let connector = WebSocketConnector::new().with_connect_timeout(cfg.connect_timeout());

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "Failed to create Tokio runtime");
            return ExitCode::FAILURE;
        }
    };

    runtime.block_on(async move {
        let bridge = Bridge::init(bridge_config, Arc::new(connector), resolver);
        let handle = bridge.handle();

        host::register(&handle);

        let status_log = handle.subscribe_status(|status| match status {
            ConnectionStatus::Connected => info!("Bridge connected"),
            ConnectionStatus::Error => warn!("Bridge could not open a connection"),
            ConnectionStatus::Connecting | ConnectionStatus::Disconnected => {}
        });
        let error_log = handle.subscribe_errors(|last_error| {
            if let Some(message) = last_error {
                warn!(error = %message, "Bridge connection error");
            }
        });

        info!("Bridge running, press Ctrl+C to stop");
        shutdown_signal().await;

        info!("Shutting down");
        status_log.unsubscribe();
        error_log.unsubscribe();
        bridge.shutdown().await;
    });

    ExitCode::SUCCESS
}
