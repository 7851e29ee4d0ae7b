use std::fs;
use std::io::ErrorKind;
use std::os::unix::net::UnixStream as StdUnixStream;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, Mutex};

use sandbox_core::{config, EventId, ReloadEvent, ResultStore, SandboxConfig};

use crate::deploy::{DeployReceipt, Deployer};
use crate::error::{io_err, DaemonError, StepError};
use crate::paths::{run_dir, socket_path};
use crate::protocol::{DaemonRequest, DaemonResponse};
use crate::reload::{OnSuccess, ReloadManager, SubmitError};
use crate::steps::{EventLog, ReloadSteps, SandboxSteps, Stage};

/// State shared by every socket client.
struct DaemonState {
    home: PathBuf,
    config: SandboxConfig,
    store: Arc<ResultStore>,
    manager: ReloadManager,
    deployer: Arc<Deployer>,
    deploy_lock: Mutex<()>,
    started_at_unix: u64,
}

/// Start the daemon runtime and block the current thread until it exits.
pub fn start_blocking(home: &Path) -> Result<(), DaemonError> {
    init_tracing();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(run(home.to_path_buf()))
}

/// Run the daemon with the configuration under `home` and production steps.
pub async fn run(home: PathBuf) -> Result<(), DaemonError> {
    let config = config::load_at(&home)?;
    let steps: Arc<dyn ReloadSteps> = Arc::new(SandboxSteps::new(config.clone())?);
    serve(home, config, steps).await
}

/// Run the reload worker, socket server and signal handler until one of
/// them requests shutdown.
pub async fn serve(
    home: PathBuf,
    config: SandboxConfig,
    steps: Arc<dyn ReloadSteps>,
) -> Result<(), DaemonError> {
    ensure_runtime_dirs(&home, &config)?;
    let store = Arc::new(ResultStore::open(&config.results_dir)?);
    let (manager, worker) = ReloadManager::new(store.clone(), steps);

    let state = Arc::new(DaemonState {
        deployer: Arc::new(Deployer::new(&config)),
        home: home.clone(),
        config,
        store,
        manager,
        deploy_lock: Mutex::new(()),
        started_at_unix: unix_seconds_now(),
    });

    let (shutdown_tx, _) = broadcast::channel::<()>(16);

    let worker_handle = {
        let shutdown = shutdown_tx.clone();
        let shutdown_rx = shutdown.subscribe();
        tokio::spawn(async move {
            worker.run(shutdown_rx).await;
            let _ = shutdown.send(());
            Ok::<(), DaemonError>(())
        })
    };

    let socket_handle = {
        let shutdown = shutdown_tx.clone();
        let state = state.clone();
        let shutdown_rx = shutdown.subscribe();
        tokio::spawn(async move {
            let result = socket_server_task(state, shutdown.clone(), shutdown_rx).await;
            let _ = shutdown.send(());
            result
        })
    };

    let signal_handle = {
        let shutdown = shutdown_tx.clone();
        let mut shutdown_rx = shutdown.subscribe();
        tokio::spawn(async move {
            tokio::select! {
                _ = shutdown_rx.recv() => Ok(()),
                signal = wait_for_signal() => {
                    match signal {
                        Ok(name) => {
                            tracing::info!("received {name}, shutting down daemon");
                            let _ = shutdown.send(());
                            Ok(())
                        }
                        Err(err) => Err(DaemonError::Protocol(format!("signal handler failed: {err}"))),
                    }
                }
            }
        })
    };

    tracing::info!(
        socket = %socket_path(&home).display(),
        app_dir = %state.config.app_dir.display(),
        "sandbox daemon started",
    );

    let (worker_result, socket_result, signal_result) =
        tokio::join!(worker_handle, socket_handle, signal_handle);

    handle_join("reload_worker", worker_result)?;
    handle_join("socket_server", socket_result)?;
    handle_join("signal_handler", signal_result)?;
    Ok(())
}

async fn wait_for_signal() -> std::io::Result<&'static str> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result.map(|()| "ctrl-c"),
        _ = terminate.recv() => Ok("SIGTERM"),
    }
}

async fn socket_server_task(
    state: Arc<DaemonState>,
    shutdown_tx: broadcast::Sender<()>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let socket = socket_path(&state.home);
    prepare_socket_for_bind(&socket)?;

    let listener = UnixListener::bind(&socket).map_err(|e| io_err(&socket, e))?;
    set_socket_permissions(&socket)?;

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            accepted = listener.accept() => {
                let (stream, _) = accepted.map_err(|e| io_err(&socket, e))?;
                let state = state.clone();
                let shutdown_tx = shutdown_tx.clone();
                tokio::spawn(async move {
                    if let Err(err) = handle_socket_client(stream, state, shutdown_tx).await {
                        tracing::error!(error = %err, "socket client error");
                    }
                });
            }
        }
    }

    if socket.exists() {
        let _ = fs::remove_file(&socket);
    }
    Ok(())
}

async fn handle_socket_client(
    stream: UnixStream,
    state: Arc<DaemonState>,
    shutdown_tx: broadcast::Sender<()>,
) -> Result<(), DaemonError> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| io_err("daemon socket read", e))?
    {
        if line.trim().is_empty() {
            continue;
        }

        let request: DaemonRequest = match serde_json::from_str(&line) {
            Ok(request) => request,
            Err(err) => {
                write_response(
                    &mut writer,
                    &DaemonResponse::error(format!("invalid request JSON: {err}")),
                )
                .await?;
                continue;
            }
        };

        let stop = request.cmd == "stop";
        let response = dispatch(&state, request, &shutdown_tx).await;
        write_response(&mut writer, &response).await?;
        if stop {
            break;
        }
    }

    Ok(())
}

async fn dispatch(
    state: &DaemonState,
    request: DaemonRequest,
    shutdown_tx: &broadcast::Sender<()>,
) -> DaemonResponse {
    match request.cmd.as_str() {
        "status" => DaemonResponse::ok(build_status_payload(state)),
        "deploy" => {
            let Some(source) = request.source else {
                return DaemonResponse::error("deploy requires 'source'");
            };
            match handle_deploy(state, source).await {
                Ok(receipt) => match serde_json::to_value(receipt) {
                    Ok(data) => DaemonResponse::ok(data),
                    Err(err) => DaemonResponse::error(err.to_string()),
                },
                Err(err) => {
                    tracing::warn!(error = %err, "deploy rejected");
                    DaemonResponse::error(err.to_string())
                }
            }
        }
        "result" => {
            let Some(id) = request.id else {
                return DaemonResponse::error("result requires 'id'");
            };
            let id = EventId::from(id);
            match state
                .store
                .query(&id, request.log)
                .map_err(DaemonError::from)
                .and_then(|result| Ok(serde_json::to_value(result)?))
            {
                Ok(data) => DaemonResponse::ok(data),
                Err(err) => DaemonResponse::error(err.to_string()),
            }
        }
        "stop" => {
            let _ = shutdown_tx.send(());
            DaemonResponse::ok(json!({ "stopping": true }))
        }
        other => DaemonResponse::error(format!("unknown command '{other}'")),
    }
}

/// Stage `source` and hand the reload off. The new baseline is committed by
/// the worker once the reload succeeds. Deploys run one at a time.
async fn handle_deploy(state: &DaemonState, source: PathBuf) -> Result<DeployReceipt, DaemonError> {
    let _guard = state.deploy_lock.lock().await;

    // Only deploys take the reload slot and they are serialized here, so a
    // free slot now is still free at submit time.
    if state.manager.is_busy() {
        return Err(DaemonError::Busy);
    }

    let deployer = state.deployer.clone();
    let staged = tokio::task::spawn_blocking(move || deployer.stage(&source))
        .await
        .map_err(|err| DaemonError::Protocol(format!("deploy task join error: {err}")))??;

    let event = ReloadEvent::new(staged.plan.rebuild, staged.plan.relaunch);
    let receipt = DeployReceipt {
        id: event.id.clone(),
        rebuild: event.rebuild,
        relaunch: event.relaunch,
        changes: staged.changes.len(),
    };
    // Committed only on Success. A failed event keeps the previous baseline.
    let deployer = state.deployer.clone();
    let id = event.id.clone();
    let record_baseline: OnSuccess = Box::new(move |log: &mut EventLog| {
        deployer
            .commit(&id)
            .map_err(|err| StepError::Internal(format!("failed to record deploy baseline: {err}")))?;
        log.line(Stage::Reload, &format!("recorded baseline for {id}"));
        Ok(())
    });
    state
        .manager
        .submit_with(event, Some(record_baseline))
        .map_err(|err| match err {
            SubmitError::Busy => DaemonError::Busy,
            SubmitError::Closed => DaemonError::ChannelClosed("reload worker"),
        })?;

    Ok(receipt)
}

fn build_status_payload(state: &DaemonState) -> Value {
    json!({
        "running": true,
        "pid": std::process::id(),
        "started_at_unix": state.started_at_unix,
        "busy": state.manager.is_busy(),
        "socket": socket_path(&state.home).display().to_string(),
        "app_dir": state.config.app_dir.display().to_string(),
        "results_dir": state.store.root().display().to_string(),
        "supervisor_url": state.config.supervisor.rpc_url(),
    })
}

fn prepare_socket_for_bind(socket: &Path) -> Result<(), DaemonError> {
    if !socket.exists() {
        return Ok(());
    }

    match StdUnixStream::connect(socket) {
        Ok(_) => {
            return Err(DaemonError::Protocol(format!(
                "daemon socket already in use: {}",
                socket.display()
            )));
        }
        Err(err) => {
            tracing::warn!(
                socket = %socket.display(),
                error = %err,
                "removing stale daemon socket before bind",
            );
        }
    }

    match fs::remove_file(socket) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(io_err(socket, err)),
    }
}

fn ensure_runtime_dirs(home: &Path, config: &SandboxConfig) -> Result<(), DaemonError> {
    for dir in [
        run_dir(home),
        config.app_dir.clone(),
        config.supervisor.root.clone(),
    ] {
        if !dir.exists() {
            fs::create_dir_all(&dir).map_err(|e| io_err(&dir, e))?;
        }
    }
    Ok(())
}

async fn write_response(
    writer: &mut OwnedWriteHalf,
    response: &DaemonResponse,
) -> Result<(), DaemonError> {
    let payload = serde_json::to_string(response)?;
    writer
        .write_all(payload.as_bytes())
        .await
        .map_err(|e| io_err("daemon socket write", e))?;
    writer
        .write_all(b"\n")
        .await
        .map_err(|e| io_err("daemon socket write", e))?;
    writer
        .flush()
        .await
        .map_err(|e| io_err("daemon socket flush", e))?;
    Ok(())
}

fn handle_join(
    task: &str,
    result: Result<Result<(), DaemonError>, tokio::task::JoinError>,
) -> Result<(), DaemonError> {
    match result {
        Ok(inner) => inner,
        Err(err) => Err(DaemonError::Protocol(format!(
            "{task} task join failure: {err}"
        ))),
    }
}

fn unix_seconds_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}

fn set_socket_permissions(path: &Path) -> Result<(), DaemonError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(|e| io_err(path, e))
}
