//! clockistryd - The clockistry background service
//!
//! This is the main entry point for the clockistryd service.
//! It wires together all the components:
//! - Configuration loading
//! - Store initialization
//! - Timer lifecycle manager
//! - IPC server and the live timer feed

use anyhow::{Context, Result};
use clap::Parser;
use clockistry_api::{
    Command, ErrorCode, ErrorInfo, Event, EventPayload, HealthStatus, Response, ResponsePayload,
};
use clockistry_config::{load_config, Settings, StoreBackend};
use clockistry_core::{TimerLifecycleManager, TimerResult};
use clockistry_ipc::{IpcServer, ServerMessage};
use clockistry_store::{DocumentStore, MemoryStore, SqliteStore};
use clockistry_util::{default_config_path, is_mock_time_active, ClientId, RateLimiter, SystemClock};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

const RATE_LIMIT_CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

/// clockistryd - Time tracking timer service
#[derive(Parser, Debug)]
#[command(name = "clockistryd")]
#[command(about = "Time tracking timer service", long_about = None)]
struct Args {
    /// Configuration file path (default: ~/.config/clockistry/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Socket path override (or set CLOCKISTRY_SOCKET env var)
    #[arg(short, long, env = "CLOCKISTRY_SOCKET")]
    socket: Option<PathBuf>,

    /// Data directory override (or set CLOCKISTRY_DATA_DIR env var)
    #[arg(short, long, env = "CLOCKISTRY_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

/// Main service state
struct Service {
    manager: Arc<TimerLifecycleManager>,
    ipc: Arc<IpcServer>,
    rate_limiter: RateLimiter<ClientId>,
}

impl Service {
    async fn new(args: &Args) -> Result<Self> {
        let settings = load_settings(args)?;

        let store = open_store(&settings)?;
        let manager = TimerLifecycleManager::from_settings(store, Arc::new(SystemClock), &settings);

        info!(
            start_guard = manager.start_guard().as_str(),
            io_timeout = ?settings.store.io_timeout,
            "Timer manager initialized"
        );

        let socket_path = settings.service.socket_path.clone();
        let mut ipc = IpcServer::new(&socket_path);
        ipc.start().await?;

        info!(socket_path = %socket_path.display(), "IPC server started");

        let rate_limiter = RateLimiter::new(settings.ipc.requests_per_second, Duration::from_secs(1));

        Ok(Self {
            manager: Arc::new(manager),
            ipc: Arc::new(ipc),
            rate_limiter,
        })
    }

    async fn run(self) -> Result<()> {
        let ipc_ref = self.ipc.clone();
        let mut ipc_messages = ipc_ref
            .take_message_receiver()
            .await
            .context("IPC message receiver already taken")?;

        let manager = self.manager.clone();
        let mut timer_events = manager.subscribe(None);
        let rate_limiter = Arc::new(Mutex::new(self.rate_limiter));

        // Spawn IPC accept task
        let ipc_accept = ipc_ref.clone();
        tokio::spawn(async move {
            if let Err(e) = ipc_accept.run().await {
                error!(error = %e, "IPC server error");
            }
        });

        let mut sigterm = signal(SignalKind::terminate())
            .context("Failed to create SIGTERM handler")?;
        let mut sigint = signal(SignalKind::interrupt())
            .context("Failed to create SIGINT handler")?;
        let mut sighup = signal(SignalKind::hangup())
            .context("Failed to create SIGHUP handler")?;

        // Forget clients that have gone quiet
        let mut cleanup_timer = tokio::time::interval(RATE_LIMIT_CLEANUP_INTERVAL);

        info!("Service running");

        loop {
            tokio::select! {
                _ = sigterm.recv() => {
                    info!("Received SIGTERM, shutting down gracefully");
                    break;
                }
                _ = sigint.recv() => {
                    info!("Received SIGINT, shutting down gracefully");
                    break;
                }
                _ = sighup.recv() => {
                    info!("Received SIGHUP, shutting down gracefully");
                    break;
                }

                // Timer lifecycle changes go out to subscribed clients
                Some(event) = timer_events.recv() => {
                    ipc_ref.broadcast_event(Event::new(event.into_payload()));
                }

                Some(msg) = ipc_messages.recv() => {
                    Self::handle_ipc_message(&manager, &ipc_ref, &rate_limiter, msg).await;
                }

                _ = cleanup_timer.tick() => {
                    rate_limiter.lock().await.cleanup(RATE_LIMIT_CLEANUP_INTERVAL);
                }
            }
        }

        info!(clients = ipc_ref.client_count().await, "Shutting down clockistryd");

        ipc_ref.broadcast_event(Event::new(EventPayload::Shutdown));
        ipc_ref.shutdown();

        info!("Shutdown complete");
        Ok(())
    }

    async fn handle_ipc_message(
        manager: &Arc<TimerLifecycleManager>,
        ipc: &Arc<IpcServer>,
        rate_limiter: &Arc<Mutex<RateLimiter<ClientId>>>,
        msg: ServerMessage,
    ) {
        match msg {
            ServerMessage::Request { client_id, request } => {
                {
                    let mut limiter = rate_limiter.lock().await;
                    if !limiter.check(&client_id) {
                        debug!(client_id = %client_id, "Request rate limited");
                        let response = Response::error(
                            request.request_id,
                            ErrorInfo::new(ErrorCode::RateLimited, "Too many requests"),
                        );
                        let _ = ipc.send_response(&client_id, response).await;
                        return;
                    }
                }

                // Store calls suspend; one slow request must not stall the loop
                let manager = manager.clone();
                let ipc = ipc.clone();
                tokio::spawn(async move {
                    let response =
                        handle_command(&manager, &client_id, request.request_id, request.command)
                            .await;
                    if let Err(e) = ipc.send_response(&client_id, response).await {
                        debug!(client_id = %client_id, error = %e, "Failed to deliver response");
                    }
                });
            }
            ServerMessage::ClientConnected { client_id, peer } => {
                debug!(client_id = %client_id, uid = ?peer.uid, "Client registered");
            }
            ServerMessage::ClientDisconnected { client_id } => {
                debug!(client_id = %client_id, "Client disconnected");
                rate_limiter.lock().await.remove(&client_id);
            }
        }
    }
}

/// Execute one protocol command against the timer manager
async fn handle_command(
    manager: &TimerLifecycleManager,
    client_id: &ClientId,
    request_id: u64,
    command: Command,
) -> Response {
    let result = match command {
        Command::StartTimer { user_id, fields } => manager
            .start_timer(&user_id, fields)
            .await
            .map(ResponsePayload::TimerStarted),

        Command::UpdateTimer { entry_id, patch } => manager
            .update_timer(&entry_id, patch)
            .await
            .map(|()| ResponsePayload::TimerUpdated),

        Command::StopTimer { entry_id } => manager
            .stop_timer(&entry_id)
            .await
            .map(|()| ResponsePayload::TimerStopped),

        Command::StopRunningTimer { user_id } => manager
            .stop_running_timer(&user_id)
            .await
            .map(|entry| ResponsePayload::RunningTimerStopped { entry }),

        Command::GetRunningTimer { user_id } => manager
            .running_view(&user_id)
            .await
            .map(|running| ResponsePayload::RunningTimer { running }),

        Command::GetEntry { entry_id } => manager.get_entry(&entry_id).await.map(ResponsePayload::Entry),

        Command::ListEntries { user_id } => manager
            .list_entries(&user_id)
            .await
            .map(|entries| ResponsePayload::Entries { entries }),

        // Subscription state lives in the IPC server; only acknowledge here
        Command::SubscribeEvents { .. } => Ok(ResponsePayload::Subscribed {
            client_id: client_id.clone(),
        }),

        Command::UnsubscribeEvents => Ok(ResponsePayload::Unsubscribed),

        Command::GetHealth => Ok(ResponsePayload::Health(HealthStatus {
            live: true,
            ready: true,
            store_ok: manager.store_healthy(),
        })),

        Command::Ping => Ok(ResponsePayload::Pong),
    };

    respond(request_id, result)
}

fn respond(request_id: u64, result: TimerResult<ResponsePayload>) -> Response {
    match result {
        Ok(payload) => Response::success(request_id, payload),
        Err(e) => Response::error(request_id, ErrorInfo::new(e.code(), e.to_string())),
    }
}

/// Config file (if any) plus command-line overrides
fn load_settings(args: &Args) -> Result<Settings> {
    let mut settings = match &args.config {
        Some(path) => load_config(path)
            .with_context(|| format!("Failed to load config from {:?}", path))?,
        None => {
            let path = default_config_path();
            if path.exists() {
                load_config(&path)
                    .with_context(|| format!("Failed to load config from {:?}", path))?
            } else {
                info!(path = %path.display(), "No config file found, using defaults");
                Settings::default()
            }
        }
    };

    if let Some(socket) = &args.socket {
        settings.service.socket_path = socket.clone();
    }
    if let Some(data_dir) = &args.data_dir {
        settings.service.data_dir = data_dir.clone();
    }

    Ok(settings)
}

fn open_store(settings: &Settings) -> Result<Arc<dyn DocumentStore>> {
    match settings.store.backend {
        StoreBackend::Sqlite => {
            let db_path = settings.database_path();
            let store = SqliteStore::open(&db_path)
                .and_then(|store| store.with_busy_timeout(settings.store.io_timeout))
                .with_context(|| format!("Failed to open database {:?}", db_path))?;
            info!(db_path = %db_path.display(), "Store initialized");
            Ok(Arc::new(store))
        }
        StoreBackend::Memory => {
            warn!("Using in-memory store, time entries will not survive a restart");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // RUST_LOG wins over --log-level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "clockistryd starting"
    );

    if is_mock_time_active() {
        warn!(now = %clockistry_util::now(), "Mock time is active, timestamps are shifted");
    }

    let service = Service::new(&args).await?;
    service.run().await
}
