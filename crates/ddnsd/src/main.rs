// # ddnsd - DDNS Agent Daemon
//
// This is a THIN integration layer. All update logic lives in ddns-core;
// the daemon only wires the production pieces together:
// 1. Reading settings from environment variables
// 2. Installing logging
// 3. Opening the state store and building the HTTP client and token cipher
// 4. Translating OS signals into reload/stop requests
// 5. Running the agent loop
//
// ## Configuration
//
// All settings come from environment variables (see `ddns_core::settings`):
//
// - `DDNS_CONFIG_PATH`: Configuration source written by the publisher
// - `DDNS_STATE_PATH`: SQLite file for update history and cache
// - `DDNS_MASTER_KEY`: Hex-encoded AES-256-GCM key for target tokens
// - `DDNS_CHECK_IP_URL`: Check-IP URL used while the source is empty
// - `DDNS_CHECK_IP_HOST_ALLOWLIST`, `DDNS_UPDATE_HOST_ALLOWLIST`: Optional
//   comma-separated host allowlists
// - `DDNS_IP_LOOKUP_TIMEOUT_SECS`, `DDNS_UPDATE_TIMEOUT_SECS`: Per-call timeouts
// - `DDNS_LOG_LEVEL`: trace, debug, info, warn, error
//
// ## Signals
//
// - `SIGHUP`: reload the configuration before the next cycle
// - `SIGTERM` / `SIGINT`: stop after the current cycle
//
// ## Example
//
// ```bash
// export DDNS_CONFIG_PATH=/etc/ddns/config.enc.json
// export DDNS_STATE_PATH=/var/lib/ddns/agent.db
// export DDNS_MASTER_KEY=$(cat /etc/ddns/master.key)
// export DDNS_UPDATE_HOST_ALLOWLIST=dynamicdns.park-your-domain.com
//
// ddnsd
// ```

use anyhow::{Context, Result};
use ddns_core::{
    AesGcmTokenCipher, AgentRuntime, AgentSettings, Error as CoreError, RuntimeSignals,
    SqliteStateStore, StateStore,
};
use ddns_http::ReqwestHttpClient;
use std::env;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{Level, debug, error, info};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy)]
enum DdnsExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
}

impl From<DdnsExitCode> for ExitCode {
    fn from(code: DdnsExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

fn main() -> ExitCode {
    // Load and validate settings from environment
    let settings = match AgentSettings::from_lookup(|key| env::var(key).ok()) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return DdnsExitCode::ConfigError.into();
        }
    };

    // Initialize tracing
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level(&settings.log_level))
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return DdnsExitCode::ConfigError.into();
    }

    info!("Starting ddnsd daemon");
    debug!("Settings: {:?}", settings);

    // Enter tokio runtime
    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return DdnsExitCode::RuntimeError.into();
        }
    };

    let result = rt.block_on(async move {
        let signals = RuntimeSignals::new();

        let mut agent = match start(settings, &signals).await {
            Ok(agent) => agent,
            Err(e) => {
                error!("Startup failed: {:#}", e);
                return DdnsExitCode::ConfigError;
            }
        };

        match agent.run(&signals).await {
            Ok(()) => {
                info!("Daemon stopped");
                DdnsExitCode::CleanShutdown
            }
            Err(e) => {
                error!("Daemon error: {}", e);
                DdnsExitCode::RuntimeError
            }
        }
    });

    result.into()
}

fn log_level(level: &str) -> Level {
    match level {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

/// Build the production collaborators and load the initial configuration
async fn start(settings: AgentSettings, signals: &RuntimeSignals) -> Result<AgentRuntime> {
    let cipher = AesGcmTokenCipher::from_hex_key(&settings.master_key)
        .context("Invalid DDNS_MASTER_KEY")?;

    let http = ReqwestHttpClient::new().context("Failed to create HTTP client")?;

    let store = SqliteStateStore::open(&settings.state_path)
        .await
        .with_context(|| format!("Failed to open state store {}", settings.state_path.display()))?;

    let agent = match AgentRuntime::new(
        Arc::new(settings),
        Box::new(store.clone()),
        Box::new(http),
        Box::new(cipher),
    )
    .await
    {
        Ok(agent) => agent,
        Err(e) => {
            // The store is already open; release it before bailing out
            if let Err(close_err) = store.close().await {
                error!("Failed to close state store: {}", close_err);
            }
            return Err(startup_error(e));
        }
    };

    listen_for_signals(signals.clone())?;
    Ok(agent)
}

fn startup_error(err: CoreError) -> anyhow::Error {
    match err {
        CoreError::ConfigMissing(path) => anyhow::anyhow!(
            "Configuration source {} does not exist. \
            Publish a configuration or point DDNS_CONFIG_PATH at it",
            path
        ),
        other => anyhow::Error::new(other).context("Failed to load configuration"),
    }
}

/// Translate SIGHUP into reload requests and SIGTERM/SIGINT into a stop
#[cfg(unix)]
fn listen_for_signals(signals: RuntimeSignals) -> Result<()> {
    let mut sighup =
        signal(SignalKind::hangup()).context("Failed to setup SIGHUP handler")?;
    let mut sigterm =
        signal(SignalKind::terminate()).context("Failed to setup SIGTERM handler")?;
    let mut sigint =
        signal(SignalKind::interrupt()).context("Failed to setup SIGINT handler")?;

    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = sighup.recv() => {
                    info!("Received SIGHUP, reloading configuration");
                    signals.request_reload();
                }
                _ = sigterm.recv() => {
                    info!("Received SIGTERM, shutting down");
                    signals.request_stop();
                    break;
                }
                _ = sigint.recv() => {
                    info!("Received SIGINT, shutting down");
                    signals.request_stop();
                    break;
                }
            }
        }
    });

    Ok(())
}

/// Stop on CTRL-C
///
/// Fallback implementation for non-Unix platforms; there is no reload signal.
#[cfg(not(unix))]
fn listen_for_signals(signals: RuntimeSignals) -> Result<()> {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received CTRL-C, shutting down"),
            Err(e) => error!("Failed to wait for CTRL-C: {}", e),
        }
        signals.request_stop();
    });
    Ok(())
}
