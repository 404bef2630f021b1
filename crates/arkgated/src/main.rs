// # arkgated - Arkgate reconciliation daemon
//
// The arkgated daemon is responsible for:
// 1. Reading configuration from environment variables
// 2. Opening the record store
// 3. Wiring the hostname.if writer and the control channel into a GatewayService
// 4. Reconciling files with the store at start-up and on SIGHUP
//
// All synchronization logic lives in arkgate-core; this is a thin
// integration layer.
//
// ## Configuration
//
// All configuration is done via environment variables:
//
// ### Hostname files
// - `ARKGATE_HOSTNAME_DIR`: Directory for hostname.if files (default `/etc`)
//
// ### Control channel
// - `ARKGATE_CONTROL_SOCKET`: Unix socket of the privileged daemon
//   (falls back to `SRV_SOCKET`; notifications are disabled when neither is set)
// - `ARKGATE_CHANNEL_TIMEOUT_MS`: Connect/read/write timeout
// - `ARKGATE_CHANNEL_RETRIES`: Extra attempts when the socket is unreachable
// - `ARKGATE_CHANNEL_RETRY_DELAY_MS`: Delay between attempts
//
// ### Store
// - `ARKGATE_STORE_TYPE`: Type of store (file, memory)
// - `ARKGATE_STORE_PATH`: Path to store file (for file store)
//
// ### Logging
// - `ARKGATE_LOG_LEVEL`: trace, debug, info, warn, error
//
// ## Example
//
// ```bash
// export ARKGATE_HOSTNAME_DIR=/etc
// export ARKGATE_CONTROL_SOCKET=/var/run/arkgate/ctl.sock
// export ARKGATE_STORE_TYPE=file
// export ARKGATE_STORE_PATH=/var/db/arkgate/records.json
//
// arkgated
// ```

use anyhow::{Context, Result};
use arkgate_core::config::{ChannelConfig, GatewayConfig, HostnameConfig, StoreConfig};
use arkgate_core::{
    ConfigWriter, FileStore, GatewayService, GatewayStore, MemoryStore, Notifier, SyncEvent,
};
use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{Level, debug, error, info, warn};
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
enum ArkgateExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
}

impl From<ArkgateExitCode> for ExitCode {
    fn from(code: ArkgateExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Application configuration
struct Config {
    hostname_dir: PathBuf,
    control_socket: Option<PathBuf>,
    channel_timeout_ms: Option<u64>,
    channel_retries: Option<usize>,
    channel_retry_delay_ms: Option<u64>,
    store_type: String,
    store_path: Option<PathBuf>,
    log_level: String,
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self> {
        Ok(Self {
            hostname_dir: env::var("ARKGATE_HOSTNAME_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("/etc")),
            control_socket: env::var("ARKGATE_CONTROL_SOCKET")
                .or_else(|_| env::var("SRV_SOCKET"))
                .ok()
                .filter(|s| !s.is_empty())
                .map(PathBuf::from),
            channel_timeout_ms: parse_var("ARKGATE_CHANNEL_TIMEOUT_MS")?,
            channel_retries: parse_var("ARKGATE_CHANNEL_RETRIES")?,
            channel_retry_delay_ms: parse_var("ARKGATE_CHANNEL_RETRY_DELAY_MS")?,
            store_type: env::var("ARKGATE_STORE_TYPE").unwrap_or_else(|_| "file".to_string()),
            store_path: env::var("ARKGATE_STORE_PATH").ok().map(PathBuf::from),
            log_level: env::var("ARKGATE_LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        })
    }

    /// Validate the configuration and build the core configuration from it
    fn validate(&self) -> Result<GatewayConfig> {
        let store = match self.store_type.as_str() {
            "memory" => StoreConfig::Memory,
            "file" => match &self.store_path {
                Some(path) => StoreConfig::File { path: path.clone() },
                None => anyhow::bail!(
                    "ARKGATE_STORE_PATH is required when ARKGATE_STORE_TYPE=file. \
                    Set it via: export ARKGATE_STORE_PATH=/var/db/arkgate/records.json"
                ),
            },
            other => anyhow::bail!(
                "ARKGATE_STORE_TYPE '{}' is not supported. \
                Supported types: file, memory",
                other
            ),
        };

        if !self.hostname_dir.is_dir() {
            anyhow::bail!(
                "ARKGATE_HOSTNAME_DIR does not exist or is not a directory: {}",
                self.hostname_dir.display()
            );
        }

        match self.log_level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!(
                "ARKGATE_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        }

        let channel = self.control_socket.as_ref().map(|path| {
            let mut channel = ChannelConfig::new(path);
            if let Some(timeout_ms) = self.channel_timeout_ms {
                channel.connect_timeout_ms = timeout_ms;
                channel.io_timeout_ms = timeout_ms;
            }
            if let Some(retries) = self.channel_retries {
                channel.max_retries = retries;
            }
            if let Some(delay_ms) = self.channel_retry_delay_ms {
                channel.retry_delay_ms = delay_ms;
            }
            channel
        });

        let config = GatewayConfig {
            hostname: HostnameConfig {
                dir: self.hostname_dir.clone(),
                ..HostnameConfig::default()
            },
            channel,
            store,
            service: Default::default(),
        };
        config.validate()?;
        Ok(config)
    }
}

/// Parse an optional numeric environment variable
fn parse_var<T>(name: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .with_context(|| format!("{} must be a number, got {:?}", name, value)),
        Err(_) => Ok(None),
    }
}

fn main() -> ExitCode {
    // Load configuration from environment
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            return ArkgateExitCode::ConfigError.into();
        }
    };

    // Validate configuration
    let gateway_config = match config.validate() {
        Ok(gateway_config) => gateway_config,
        Err(e) => {
            eprintln!("Configuration validation error: {:#}", e);
            return ArkgateExitCode::ConfigError.into();
        }
    };

    // Initialize tracing
    let log_level = match config.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return ArkgateExitCode::ConfigError.into();
    }

    info!("Starting arkgated daemon");
    info!(
        "hostname.if directory: {}",
        gateway_config.hostname.dir.display()
    );

    // Enter tokio runtime
    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return ArkgateExitCode::RuntimeError.into();
        }
    };

    let result = rt.block_on(async {
        if let Err(e) = run_daemon(gateway_config).await {
            error!("Daemon error: {:#}", e);
            ArkgateExitCode::RuntimeError
        } else {
            ArkgateExitCode::CleanShutdown
        }
    });

    result.into()
}

/// Open the configured store and run the daemon on it
async fn run_daemon(config: GatewayConfig) -> Result<()> {
    match &config.store {
        StoreConfig::Memory => {
            warn!("Using in-memory store; records are lost on exit");
            serve(Arc::new(MemoryStore::new()), config).await
        }
        StoreConfig::File { path } => {
            info!("Using file store at {}", path.display());
            let store = FileStore::new(path)
                .await
                .with_context(|| format!("opening store {}", path.display()))?;
            serve(Arc::new(store), config).await
        }
    }
}

async fn serve<S: GatewayStore>(store: Arc<S>, config: GatewayConfig) -> Result<()> {
    let writer = Arc::new(
        ConfigWriter::new(&config.hostname.dir).with_file_prefix(&config.hostname.file_prefix),
    );
    let notifier = build_notifier(config.channel.as_ref());

    let (service, events) = GatewayService::new(store, writer, notifier, &config.service)?;
    tokio::spawn(log_events(events));

    reconcile(&service).await?;
    info!("Daemon initialized successfully");

    wait_for_shutdown(&service).await
}

#[cfg(feature = "notify")]
fn build_notifier(channel: Option<&ChannelConfig>) -> Option<Arc<dyn Notifier>> {
    match channel {
        Some(channel) => {
            info!(
                "Notifying privileged daemon at {} (retries: {})",
                channel.socket_path.display(),
                channel.max_retries
            );
            Some(Arc::new(arkgate_core::CommandChannel::new(channel)))
        }
        None => {
            warn!("No control socket configured; netstart notifications disabled");
            None
        }
    }
}

#[cfg(not(feature = "notify"))]
fn build_notifier(_channel: Option<&ChannelConfig>) -> Option<Arc<dyn Notifier>> {
    info!("Built without the notify feature; netstart notifications disabled");
    None
}

/// Run one reconcile pass, logging what it could not fix
async fn reconcile<S: GatewayStore>(service: &GatewayService<S>) -> Result<()> {
    let report = service.reconcile().await.context("reconcile failed")?;
    for warning in &report.warnings {
        warn!("Reconcile: {}", warning);
    }
    info!(
        "Reconcile wrote {} file(s), repaired {} IP and {} subscriber reference(s)",
        report.written.len(),
        report.repaired_ips.len(),
        report.repaired_subscribers.len()
    );
    Ok(())
}

/// Drain service events into the log
async fn log_events(events: tokio::sync::mpsc::Receiver<SyncEvent>) {
    let mut events = ReceiverStream::new(events);
    while let Some(event) = events.next().await {
        match event {
            SyncEvent::NotifyFailed { command, error } => {
                warn!("Notification {:?} failed: {}", command, error)
            }
            SyncEvent::Repaired { kind, child_id } => {
                info!("Cleared dangling reference on {} {}", kind, child_id)
            }
            other => debug!("Sync event: {:?}", other),
        }
    }
}

/// Reconcile on SIGHUP until SIGTERM or SIGINT arrives
#[cfg(unix)]
async fn wait_for_shutdown<S: GatewayStore>(service: &GatewayService<S>) -> Result<()> {
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGINT handler: {}", e))?;
    let mut sighup = signal(SignalKind::hangup())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGHUP handler: {}", e))?;

    loop {
        let received = tokio::select! {
            _ = sigterm.recv() => "SIGTERM",
            _ = sigint.recv() => "SIGINT",
            _ = sighup.recv() => "SIGHUP",
        };

        if received != "SIGHUP" {
            info!("Received shutdown signal: {}", received);
            info!("Shutting down daemon");
            return Ok(());
        }

        info!("Received SIGHUP, reconciling");
        if let Err(e) = reconcile(service).await {
            error!("{:#}", e);
        }
    }
}

/// Wait for CTRL-C
///
/// Fallback implementation for non-Unix platforms.
#[cfg(not(unix))]
async fn wait_for_shutdown<S: GatewayStore>(_service: &GatewayService<S>) -> Result<()> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to wait for CTRL-C: {}", e))?;
    info!("Received shutdown signal: SIGINT");
    Ok(())
}
