//! playtimed - The playtime tracking service
//!
//! This is the main entry point for the playtimed service.
//! It wires together all the components:
//! - Configuration loading
//! - Ledger store
//! - Playtime engine
//! - Shell grant backend
//! - IPC server
//! - Periodic tick driver

use anyhow::{Context, Result};
use clap::Parser;
use playtime_api::{
    ClientRole, Command, ErrorCode, ErrorInfo, Event, EventPayload, Response, ResponsePayload,
};
use playtime_config::{load_config, GrantTemplates, PlaytimeConfig};
use playtime_core::{CoreEvent, EngineOptions, LedgerStep, PlaytimeEngine};
use playtime_host_shell::{ShellGrants, ShellTemplates};
use playtime_ipc::{IpcServer, ServerMessage};
use playtime_store::{JsonFileStore, Store};
use playtime_util::{default_config_path, format_playtime, ClientId, PlaytimeError, LEDGER_FILENAME};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{signal, SignalKind};
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

/// playtimed - Playtime tracking and milestone rewards
#[derive(Parser, Debug)]
#[command(name = "playtimed")]
#[command(about = "Playtime tracking and milestone rewards service", long_about = None)]
struct Args {
    /// Configuration file path (default: ~/.config/playtimed/config.toml)
    #[arg(short, long, default_value_os_t = default_config_path())]
    config: PathBuf,

    /// Socket path override (or set PLAYTIME_SOCKET env var)
    #[arg(short, long, env = "PLAYTIME_SOCKET")]
    socket: Option<PathBuf>,

    /// Data directory override (or set PLAYTIME_DATA_DIR env var)
    #[arg(short, long, env = "PLAYTIME_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

/// Main service state
struct Service {
    engine: Arc<PlaytimeEngine>,
    ipc: Arc<IpcServer>,
    config_path: PathBuf,
    tick_interval: Duration,
}

impl Service {
    async fn new(args: &Args) -> Result<Self> {
        let config = if args.config.exists() {
            let config = load_config(&args.config)
                .with_context(|| format!("Failed to load config from {:?}", args.config))?;
            info!(
                config_path = %args.config.display(),
                rule_count = config.rewards.rules.rule_count(),
                "Configuration loaded"
            );
            config
        } else {
            warn!(
                config_path = %args.config.display(),
                "Config file not found, using defaults"
            );
            PlaytimeConfig::default()
        };

        let socket_path = args
            .socket
            .clone()
            .unwrap_or_else(|| config.service.socket_path.clone());

        let data_dir = args
            .data_dir
            .clone()
            .unwrap_or_else(|| config.service.data_dir.clone());

        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory {:?}", data_dir))?;

        let ledger_path = data_dir.join(LEDGER_FILENAME);
        let store: Arc<dyn Store> = Arc::new(JsonFileStore::new(&ledger_path));
        info!(ledger_path = %ledger_path.display(), "Store initialized");

        let grants = Arc::new(ShellGrants::new(convert_grant_templates(&config.grants)));

        let engine = Arc::new(PlaytimeEngine::new(
            store,
            grants,
            config.rewards,
            EngineOptions::from_service(&config.service),
        ));
        engine.start().context("Failed to start playtime engine")?;

        let mut ipc = IpcServer::new(&socket_path);
        ipc.start()
            .await
            .with_context(|| format!("Failed to listen on {:?}", socket_path))?;

        Ok(Self {
            engine,
            ipc: Arc::new(ipc),
            config_path: args.config.clone(),
            tick_interval: config.service.tick_interval,
        })
    }

    async fn run(self) -> Result<()> {
        let engine = self.engine.clone();
        let ipc = self.ipc.clone();
        let mut workers = Workers::new(engine.clone(), ipc.clone());
        let mut ipc_messages = ipc
            .take_message_receiver()
            .await
            .context("IPC message receiver already taken")?;

        let ipc_accept = ipc.clone();
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

        let mut tick_timer = tokio::time::interval(self.tick_interval);
        tick_timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(tick_interval = ?self.tick_interval, "Service running");

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

                // SIGHUP - reload reward rules
                _ = sighup.recv() => {
                    info!("Received SIGHUP, reloading configuration");
                    match reload_config(&engine, &self.config_path) {
                        Ok(event) => broadcast_core_events(&ipc, vec![event]),
                        Err(e) => error!(error = %e, "Configuration reload failed, keeping current rules"),
                    }
                }

                // Each tick runs on its own task so a slow grant never delays the next one
                _ = tick_timer.tick() => {
                    workers.spawn_tick();
                }

                Some(msg) = ipc_messages.recv() => {
                    Self::handle_ipc_message(&mut workers, &self.config_path, msg).await;
                }

                Some(result) = workers.tasks.join_next(), if !workers.tasks.is_empty() => {
                    if let Err(e) = result {
                        error!(error = %e, "Background task failed");
                    }
                }
            }
        }

        info!(pending = workers.tasks.len(), "Shutting down playtimed");

        // Grants still running must land in the ledger before the final save
        workers.drain().await;

        match engine.shutdown(playtime_util::now()).await {
            Ok(user_count) => broadcast_core_events(&ipc, vec![CoreEvent::LedgerSaved { user_count }]),
            Err(e) => error!(error = %e, "Final ledger save failed"),
        }
        ipc.broadcast_event(Event::new(EventPayload::Shutdown));
        ipc.shutdown();

        info!("Shutdown complete");

        Ok(())
    }

    async fn handle_ipc_message(workers: &mut Workers, config_path: &Path, msg: ServerMessage) {
        match msg {
            ServerMessage::Request { client_id, request } => {
                let ipc = workers.ipc.clone();
                let role = match ipc.get_client_info(&client_id).await {
                    Some(info) => info.role,
                    None => {
                        debug!(client_id = %client_id, "Request from a client that already left");
                        return;
                    }
                };

                let response = handle_command(
                    workers,
                    config_path,
                    client_id,
                    role,
                    request.request_id,
                    request.command,
                );
                let _ = ipc.send_response(&client_id, response).await;
            }
            ServerMessage::ClientConnected { client_id, info } => {
                info!(
                    client_id = %client_id,
                    role = ?info.role,
                    uid = ?info.uid,
                    "Client connected"
                );
            }
            ServerMessage::ClientDisconnected { client_id } => {
                debug!(client_id = %client_id, "Client disconnected");
            }
        }
    }
}

/// Background tasks spawned by the service loop. Every one of them is
/// awaited before the final save.
struct Workers {
    engine: Arc<PlaytimeEngine>,
    ipc: Arc<IpcServer>,
    tasks: JoinSet<()>,
}

impl Workers {
    fn new(engine: Arc<PlaytimeEngine>, ipc: Arc<IpcServer>) -> Self {
        Self {
            engine,
            ipc,
            tasks: JoinSet::new(),
        }
    }

    fn spawn_tick(&mut self) {
        let engine = self.engine.clone();
        let ipc = self.ipc.clone();
        self.tasks.spawn(async move {
            let events = engine.tick(playtime_util::now()).await;
            broadcast_core_events(&ipc, events);
        });
    }

    /// Broadcast the ledger step's own events now, then sweep and save in
    /// the background and broadcast whatever that produces.
    fn spawn_settle(&mut self, mut step: LedgerStep) {
        broadcast_core_events(&self.ipc, std::mem::take(&mut step.events));

        if !step.sweep && !step.persist {
            return;
        }

        let engine = self.engine.clone();
        let ipc = self.ipc.clone();
        self.tasks.spawn(async move {
            let events = engine.settle(step, playtime_util::now()).await;
            broadcast_core_events(&ipc, events);
        });
    }

    async fn drain(&mut self) {
        while let Some(result) = self.tasks.join_next().await {
            if let Err(e) = result {
                error!(error = %e, "Background task failed");
            }
        }
    }
}

/// Run one client command. Ledger changes happen here, in arrival order;
/// reward sweeps and saves they trigger are spawned so a slow grant never
/// holds up the next request.
fn handle_command(
    workers: &mut Workers,
    config_path: &Path,
    client_id: ClientId,
    role: ClientRole,
    request_id: u64,
    command: Command,
) -> Response {
    let now = playtime_util::now();
    let engine = workers.engine.clone();
    let ipc = workers.ipc.clone();

    match command {
        Command::Login {
            user_id,
            display_name,
        } => match engine.record_login(user_id, &display_name, now) {
            Ok(step) => {
                workers.spawn_settle(step);
                Response::success(request_id, ResponsePayload::LoggedIn)
            }
            Err(e) => Response::error(request_id, error_info(&e)),
        },

        Command::Logout { user_id } => match engine.record_logout(user_id, now) {
            Ok(step) => {
                let session_ms = step.events.iter().find_map(|event| match event {
                    CoreEvent::UserLoggedOut { session_ms, .. } => Some(*session_ms),
                    _ => None,
                });
                workers.spawn_settle(step);
                Response::success(request_id, ResponsePayload::LoggedOut { session_ms })
            }
            Err(e) => Response::error(request_id, error_info(&e)),
        },

        Command::GetPlaytime { user_id } => Response::success(
            request_id,
            ResponsePayload::Playtime(engine.playtime_view(user_id, now)),
        ),

        Command::SetPlaytime { user_id, duration } => {
            if !role.can_set_playtime() {
                let e = PlaytimeError::permission("Admin role required to set playtime");
                return Response::error(request_id, error_info(&e));
            }

            match engine.record_override(user_id, &duration, now) {
                Ok(step) => {
                    let total_ms = engine.current_total(&user_id, now);
                    workers.spawn_settle(step);
                    Response::success(
                        request_id,
                        ResponsePayload::PlaytimeSet {
                            total_ms,
                            formatted: format_playtime(total_ms),
                        },
                    )
                }
                Err(e) => Response::error(request_id, error_info(&e)),
            }
        }

        Command::ReloadConfig => {
            if !role.can_reload_config() {
                let e = PlaytimeError::permission("Admin role required to reload configuration");
                return Response::error(request_id, error_info(&e));
            }

            match reload_config(&engine, config_path) {
                Ok(event) => {
                    let rule_count = match &event {
                        CoreEvent::RewardsReloaded { rule_count, .. } => *rule_count,
                        _ => 0,
                    };
                    broadcast_core_events(&ipc, vec![event]);
                    Response::success(request_id, ResponsePayload::ConfigReloaded { rule_count })
                }
                Err(e) => Response::error(request_id, error_info(&e)),
            }
        }

        Command::SubscribeEvents => {
            Response::success(request_id, ResponsePayload::Subscribed { client_id })
        }

        Command::UnsubscribeEvents => Response::success(request_id, ResponsePayload::Unsubscribed),

        Command::GetHealth => Response::success(request_id, ResponsePayload::Health(engine.health())),

        Command::Ping => Response::success(request_id, ResponsePayload::Pong),
    }
}

/// Re-read the config file and swap the reward settings
fn reload_config(engine: &PlaytimeEngine, config_path: &Path) -> Result<CoreEvent, PlaytimeError> {
    let config = load_config(config_path).map_err(|e| PlaytimeError::config(e.to_string()))?;
    Ok(engine.reload_rewards(config.rewards))
}

fn convert_grant_templates(grants: &GrantTemplates) -> ShellTemplates {
    ShellTemplates {
        group_command: grants.group_command.clone(),
        permission_command: grants.permission_command.clone(),
        console_command: grants.console_command.clone(),
    }
}

fn error_info(e: &PlaytimeError) -> ErrorInfo {
    let code = match e {
        PlaytimeError::NotRunning(_) => ErrorCode::NotRunning,
        PlaytimeError::InvalidDuration(_) => ErrorCode::InvalidDuration,
        PlaytimeError::ConfigError(_) => ErrorCode::ConfigError,
        PlaytimeError::PermissionDenied(_) => ErrorCode::PermissionDenied,
        PlaytimeError::StoreError(_) | PlaytimeError::Internal(_) => ErrorCode::InternalError,
    };
    ErrorInfo::new(code, e.to_string())
}

/// Map a core event to its client-facing form. Skipped rules are only logged.
fn event_payload(event: CoreEvent) -> Option<EventPayload> {
    let payload = match event {
        CoreEvent::UserLoggedIn {
            user_id,
            display_name,
        } => EventPayload::UserLoggedIn {
            user_id,
            display_name,
        },
        CoreEvent::UserLoggedOut {
            user_id,
            session_ms,
            total_ms,
        } => EventPayload::UserLoggedOut {
            user_id,
            session_ms,
            total_ms,
        },
        CoreEvent::PlaytimeSet { user_id, total_ms } => {
            EventPayload::PlaytimeSet { user_id, total_ms }
        }
        CoreEvent::RewardGranted {
            user_id,
            rule_index,
            kind,
            payload,
        } => EventPayload::RewardGranted {
            user_id,
            rule_index,
            kind,
            payload,
        },
        CoreEvent::RewardFailed {
            user_id,
            rule_index,
            error,
        } => EventPayload::RewardFailed {
            user_id,
            rule_index,
            error,
        },
        CoreEvent::RewardSkipped { .. } => return None,
        CoreEvent::LedgerSaved { user_count } => EventPayload::LedgerSaved { user_count },
        CoreEvent::RewardsReloaded {
            rule_count,
            enabled,
        } => EventPayload::ConfigReloaded {
            rule_count,
            enabled,
        },
    };
    Some(payload)
}

fn broadcast_core_events(ipc: &IpcServer, events: Vec<CoreEvent>) {
    for payload in events.into_iter().filter_map(event_payload) {
        ipc.broadcast_event(Event::new(payload));
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "playtimed starting"
    );

    let service = Service::new(&args).await?;
    service.run().await
}
