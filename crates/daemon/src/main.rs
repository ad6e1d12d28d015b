//! OpenMica Daemon
//!
//! Main daemon process for OpenMica.
//!
//! Responsibilities:
//! - Load configuration and compile styling rules
//! - Wire the rule service to the Win32 platform layer
//! - Reload rules when the config file changes
//! - Handle IPC commands from the CLI

mod config;
mod settings;
mod watcher;

use anyhow::{Context, Result};
use config::Config;
use openmica_core_rules::{
    RuleService, ServiceParts, SettingsChange, SettingsProvider, TitlebarColorMode, WindowHandle,
    DEFAULT_WORKERS,
};
use openmica_ipc::{IpcCommand, IpcResponse, RuleInfo, PIPE_NAME};
use openmica_platform_win32::{DwmStyler, Win32Desktop, Win32EventSource};
use settings::{FileSettings, LoadedConfig};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;
use watcher::ConfigWatcher;

/// Events that the daemon event loop processes.
enum DaemonEvent {
    /// An IPC command from a CLI client.
    IpcCommand {
        cmd: IpcCommand,
        responder: oneshot::Sender<IpcResponse>,
    },
    /// The config file changed on disk.
    ConfigChanged,
    /// Shutdown signal.
    Shutdown,
}

/// IPC read timeout - clients must send within this period.
#[cfg_attr(not(windows), allow(dead_code))]
const IPC_READ_TIMEOUT: Duration = Duration::from_secs(5);

/// How long shutdown waits for in-flight styling jobs.
const SHUTDOWN_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Daemon state owned by the event loop.
struct Daemon {
    settings: Arc<FileSettings>,
    service: RuleService,
    watcher: Option<ConfigWatcher>,
}

impl Daemon {
    fn new(settings: Arc<FileSettings>, service: RuleService) -> Self {
        Self {
            settings,
            service,
            watcher: None,
        }
    }

    /// Re-read the config file and publish it.
    ///
    /// The system titlebar default is updated before subscribers hear about
    /// the reload, so the rescan it triggers already uses the new default.
    fn reload(&mut self, event_tx: &mpsc::Sender<DaemonEvent>) -> Result<()> {
        let service = &self.service;
        self.settings.reload(|config| {
            service.set_system_titlebar_mode(config.general.system_titlebar);
        })?;
        self.sync_watcher(event_tx);
        Ok(())
    }

    /// Switch to another config file and load it.
    fn set_config_path(
        &mut self,
        path: &str,
        event_tx: &mpsc::Sender<DaemonEvent>,
    ) -> Result<()> {
        let path = PathBuf::from(path);
        if !path.is_file() {
            anyhow::bail!("{} is not a file", path.display());
        }
        let service = &self.service;
        self.settings.set_config_path(&path, |config| {
            service.set_system_titlebar_mode(config.general.system_titlebar);
        })?;
        self.sync_watcher(event_tx);
        Ok(())
    }

    /// Start, restart or stop the config watcher to match the config.
    fn sync_watcher(&mut self, event_tx: &mpsc::Sender<DaemonEvent>) {
        if let Some(watcher) = self.watcher.take() {
            debug!("Stopped watching {}", watcher.path().display());
            watcher.stop();
        }

        let general = self.settings.config().general;
        let path = match self.settings.path() {
            Some(path) if general.watch_config => path,
            _ => {
                self.settings.set_watching(false);
                return;
            }
        };

        debug!(
            "Watching {} every {}ms",
            path.display(),
            general.watch_interval_ms
        );
        self.watcher = Some(ConfigWatcher::spawn(
            path,
            Duration::from_millis(general.watch_interval_ms),
            event_tx.clone(),
            || DaemonEvent::ConfigChanged,
        ));
        self.settings.set_watching(true);
    }

    fn handle_command(
        &mut self,
        cmd: IpcCommand,
        event_tx: &mpsc::Sender<DaemonEvent>,
    ) -> IpcResponse {
        match cmd {
            IpcCommand::Reload => match self.reload(event_tx) {
                Ok(()) => IpcResponse::Ok,
                Err(e) => IpcResponse::error(format!("Reload failed: {:#}", e)),
            },
            IpcCommand::SetConfigPath { path } => match self.set_config_path(&path, event_tx) {
                Ok(()) => IpcResponse::Ok,
                Err(e) => IpcResponse::error(format!("Failed to load {}: {:#}", path, e)),
            },
            IpcCommand::Reapply => {
                if self.service.reapply_all() {
                    IpcResponse::Ok
                } else {
                    IpcResponse::error("Rule service is shutting down")
                }
            }
            IpcCommand::SetSystemTitlebar { mode } => {
                if !matches!(mode, TitlebarColorMode::Light | TitlebarColorMode::Dark) {
                    return IpcResponse::error("System titlebar must be light or dark");
                }
                self.service.set_system_titlebar_mode(mode);
                self.settings.notify(SettingsChange::SystemTitlebarChanged);
                info!("System titlebar set to {:?}", mode);
                IpcResponse::Ok
            }
            IpcCommand::QueryRules => IpcResponse::Rules {
                rules: self
                    .settings
                    .rules()
                    .iter()
                    .map(RuleInfo::from)
                    .collect(),
            },
            IpcCommand::MatchWindow { handle } => {
                match self.service.resolve_rule_name(WindowHandle(handle)) {
                    Ok(rule) => IpcResponse::MatchResult { rule },
                    Err(e) => IpcResponse::error(e.to_string()),
                }
            }
            IpcCommand::Status => IpcResponse::Status {
                running: self.service.is_running(),
                rule_count: self.settings.rule_count(),
                watching: self.settings.is_watching(),
                config_path: self
                    .settings
                    .path()
                    .map(|p| p.display().to_string()),
                system_titlebar: self.service.system_titlebar_mode(),
            },
            IpcCommand::Stop => {
                info!("Stop requested via IPC");
                IpcResponse::Ok
            }
        }
    }

    /// Stop reacting to windows and let queued work finish.
    fn shutdown(&mut self) {
        if let Some(watcher) = self.watcher.take() {
            watcher.stop();
        }
        self.settings.set_watching(false);
        self.service.stop_service();

        if !self.service.wait_idle(SHUTDOWN_DRAIN_TIMEOUT) {
            warn!(
                "Styling jobs still running after {:?}, exiting anyway",
                SHUTDOWN_DRAIN_TIMEOUT
            );
        }
    }
}

/// Run the IPC server, accepting connections and dispatching commands.
#[cfg(windows)]
async fn run_ipc_server(event_tx: mpsc::Sender<DaemonEvent>) {
    use tokio::net::windows::named_pipe::{PipeMode, ServerOptions};

    let mut is_first_instance = true;

    loop {
        // Create a new pipe server instance
        let server = match ServerOptions::new()
            .first_pipe_instance(is_first_instance)
            .pipe_mode(PipeMode::Byte)
            .create(PIPE_NAME)
        {
            Ok(s) => {
                is_first_instance = false;
                s
            }
            Err(e) => {
                error!("Failed to create named pipe server: {}", e);
                if is_first_instance {
                    error!("Is another openmica daemon already running?");
                }
                tokio::time::sleep(Duration::from_secs(1)).await;
                continue;
            }
        };

        debug!("Waiting for client connection on {}", PIPE_NAME);

        if let Err(e) = server.connect().await {
            error!("Failed to accept client connection: {}", e);
            continue;
        }

        debug!("Client connected");

        let event_tx = event_tx.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_client(server, event_tx).await {
                warn!("Client handler error: {}", e);
            }
        });
    }
}

/// Handle a single client connection.
#[cfg(windows)]
async fn handle_client(
    pipe: tokio::net::windows::named_pipe::NamedPipeServer,
    event_tx: mpsc::Sender<DaemonEvent>,
) -> Result<()> {
    use openmica_ipc::{decode_line, MAX_IPC_MESSAGE_SIZE};
    use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};

    let (reader, mut writer) = tokio::io::split(pipe);
    let limited_reader = reader.take(MAX_IPC_MESSAGE_SIZE as u64);
    let mut reader = BufReader::new(limited_reader);
    let mut line = String::new();

    // Read command (single line of JSON) with timeout and size bound
    let read_result = tokio::time::timeout(IPC_READ_TIMEOUT, reader.read_line(&mut line)).await;
    let bytes_read = match read_result {
        Ok(Ok(n)) => n,
        Ok(Err(e)) => return Err(e.into()),
        Err(_) => {
            // Timeout: client did not send in time, silently close
            return Ok(());
        }
    };
    if bytes_read == 0 {
        return Ok(()); // Client disconnected
    }

    debug!("Received command: {}", line.trim());

    let cmd: IpcCommand = match decode_line(&line) {
        Ok(cmd) => cmd,
        Err(e) => {
            let response = IpcResponse::error(format!("Invalid command: {}", e));
            writer.write_all(response_line(&response).as_bytes()).await?;
            return Ok(());
        }
    };

    let is_stop = matches!(cmd, IpcCommand::Stop);
    let (resp_tx, resp_rx) = oneshot::channel();

    if event_tx
        .send(DaemonEvent::IpcCommand {
            cmd,
            responder: resp_tx,
        })
        .await
        .is_err()
    {
        let response = IpcResponse::error("Daemon is shutting down");
        writer.write_all(response_line(&response).as_bytes()).await?;
        return Ok(());
    }

    let response = match resp_rx.await {
        Ok(resp) => resp,
        Err(_) => IpcResponse::error("Failed to get response from daemon"),
    };
    writer.write_all(response_line(&response).as_bytes()).await?;

    // If this was a stop command, signal shutdown
    if is_stop {
        let _ = event_tx.send(DaemonEvent::Shutdown).await;
    }

    Ok(())
}

/// Serialize a response, falling back to a fixed error line.
#[cfg_attr(not(windows), allow(dead_code))]
fn response_line(response: &IpcResponse) -> String {
    match openmica_ipc::encode_line(response) {
        Ok(line) => line,
        Err(e) => {
            warn!("Failed to serialize IPC response: {}", e);
            "{\"status\":\"error\",\"message\":\"Internal serialization error\"}\n".to_string()
        }
    }
}

/// Check if another daemon instance is already running by probing the named pipe.
#[cfg(windows)]
async fn check_already_running() -> bool {
    tokio::net::windows::named_pipe::ClientOptions::new()
        .open(PIPE_NAME)
        .is_ok()
}

#[cfg(not(windows))]
async fn check_already_running() -> bool {
    false
}

/// Load the initial config, falling back to defaults when it is unreadable.
fn initial_config() -> (Option<PathBuf>, LoadedConfig) {
    let path = Config::locate();
    let config = match &path {
        Some(path) => Config::load_from_path(path).unwrap_or_else(|e| {
            // Can't use tracing yet, fall back to eprintln
            eprintln!("Failed to load configuration: {:#}. Using defaults.", e);
            Config::default()
        }),
        None => Config::default(),
    };
    (path, LoadedConfig::from_config(config))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (needed for log level)
    let (config_path, loaded) = initial_config();

    // Initialize logging with configured log level
    let subscriber = FmtSubscriber::builder()
        .with_max_level(loaded.config.general.tracing_level())
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("OpenMica daemon starting...");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    loaded.log_warnings();

    // Check if another instance is already running
    if check_already_running().await {
        error!(
            "Another openmica daemon instance is already running (pipe {} is active)",
            PIPE_NAME
        );
        return Ok(());
    }

    match &config_path {
        Some(path) => info!("Configuration: {}", path.display()),
        None => info!("Configuration: built-in defaults"),
    }

    let system_titlebar = loaded.config.general.system_titlebar;
    let settings = Arc::new(FileSettings::new(config_path, loaded));
    let events =
        Arc::new(Win32EventSource::start().context("Failed to install window event hook")?);

    let service = RuleService::new(ServiceParts {
        desktop: Arc::new(Win32Desktop::new()),
        styler: Arc::new(DwmStyler::new()),
        settings: settings.clone(),
        events: events.clone(),
        workers: DEFAULT_WORKERS,
    })
    .context("Failed to start styling workers")?;
    service.set_system_titlebar_mode(system_titlebar);

    info!("{} rules loaded", settings.rule_count());

    // Style everything already on screen, then follow new windows
    service.reapply_all();
    service.start_service();

    let (event_tx, mut event_rx) = mpsc::channel::<DaemonEvent>(100);
    let mut daemon = Daemon::new(settings, service);
    daemon.sync_watcher(&event_tx);

    // Spawn IPC server
    #[cfg(windows)]
    {
        let ipc_tx = event_tx.clone();
        tokio::spawn(async move {
            run_ipc_server(ipc_tx).await;
        });
        info!("IPC server listening on {}", PIPE_NAME);
    }

    // Install Ctrl+C handler so terminal kill triggers graceful shutdown
    {
        let shutdown_tx = event_tx.clone();
        tokio::spawn(async move {
            if let Ok(()) = tokio::signal::ctrl_c().await {
                info!("Ctrl+C received, initiating shutdown...");
                let _ = shutdown_tx.send(DaemonEvent::Shutdown).await;
            }
        });
    }

    info!("Ready. Use openmica-cli to send commands.");

    while let Some(event) = event_rx.recv().await {
        match event {
            DaemonEvent::IpcCommand { cmd, responder } => {
                debug!("Handling IPC command: {:?}", cmd);
                let response = daemon.handle_command(cmd, &event_tx);
                let _ = responder.send(response);
            }
            DaemonEvent::ConfigChanged => {
                info!("Config file changed, reloading");
                if let Err(e) = daemon.reload(&event_tx) {
                    warn!("Reload failed, keeping previous rules: {:#}", e);
                }
            }
            DaemonEvent::Shutdown => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    daemon.shutdown();
    events.stop();

    info!("OpenMica daemon shutting down.");
    Ok(())
}
