use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::os::unix::net::UnixStream as StdUnixStream;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use notify::{recommended_watcher, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use serde::Serialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::Instant;

use tally_core::{ledger::ledger_dir_at, Config, Ledger};
use tally_gateway::SheetTransport;
use tally_sync::{report, SyncEngine, SyncError};

use crate::error::{io_err, DaemonError};
use crate::paths::{logs_dir, socket_path, tally_root, DEBOUNCE_WINDOW};
use crate::protocol::{DaemonRequest, DaemonResponse};

type Engine = Arc<SyncEngine<Arc<dyn SheetTransport>>>;

struct SyncJob {
    source: &'static str,
    respond_to: oneshot::Sender<Result<SyncSummary, String>>,
}

/// What one daemon-driven cycle did, as reported over the socket.
#[derive(Debug, Clone, Serialize)]
pub struct SyncSummary {
    pub source: String,
    pub applied: usize,
    pub conflicts: usize,
    pub duration_ms: u128,
}

/// Load config, build the engine, and block the current thread on the
/// daemon runtime until it exits.
pub fn start_blocking() -> Result<(), DaemonError> {
    let config = Config::from_env()?;
    init_tracing(&config.log_level);

    let ledger = Arc::new(Ledger::open_at(&config.home)?);
    let engine = Arc::new(SyncEngine::from_config(&config, Arc::clone(&ledger)));
    let interval = Duration::from_secs(config.sync_interval_secs);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(run(config.home, ledger, engine, interval))
}

/// Run the daemon runtime.
pub async fn run(
    home: PathBuf,
    ledger: Arc<Ledger>,
    engine: Engine,
    interval: Duration,
) -> Result<(), DaemonError> {
    ensure_runtime_dirs(&home)?;

    let started_at_unix = unix_seconds_now();
    let last_sync_unix = Arc::new(AtomicU64::new(0));

    let (sync_tx, sync_rx) = mpsc::channel::<SyncJob>(64);
    let (shutdown_tx, _) = broadcast::channel::<()>(16);

    let watcher_handle = {
        let shutdown = shutdown_tx.clone();
        let home = home.clone();
        let sync_tx = sync_tx.clone();
        tokio::spawn(async move {
            let result = watcher_task(home, sync_tx, shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };

    let ticker_handle = {
        let shutdown = shutdown_tx.clone();
        let sync_tx = sync_tx.clone();
        tokio::spawn(async move {
            let result = ticker_task(interval, sync_tx, shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };

    let processor_handle = {
        let shutdown = shutdown_tx.clone();
        let engine = engine.clone();
        let last_sync = last_sync_unix.clone();
        tokio::spawn(async move {
            let result = sync_processor_task(engine, last_sync, sync_rx, shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };

    let socket_handle = {
        let shutdown = shutdown_tx.clone();
        let home = home.clone();
        let ledger = ledger.clone();
        let engine = engine.clone();
        let sync_tx = sync_tx.clone();
        let last_sync = last_sync_unix.clone();
        tokio::spawn(async move {
            let result = socket_server_task(
                home,
                ledger,
                engine,
                last_sync,
                sync_tx,
                shutdown.clone(),
                shutdown.subscribe(),
                started_at_unix,
            )
            .await;
            let _ = shutdown.send(());
            result
        })
    };

    // An in-flight cycle blocks inside spawn_blocking; cancelling the
    // gateway token makes it return promptly once shutdown begins.
    let cancel_handle = {
        let engine = engine.clone();
        let mut shutdown_rx = shutdown_tx.subscribe();
        tokio::spawn(async move {
            let _ = shutdown_rx.recv().await;
            engine.cancel_token().cancel();
            Ok::<(), DaemonError>(())
        })
    };

    let signal_handle = {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            let mut shutdown_rx = shutdown.subscribe();
            tokio::select! {
                _ = shutdown_rx.recv() => Ok(()),
                signal = tokio::signal::ctrl_c() => {
                    match signal {
                        Ok(()) => {
                            tracing::info!("received ctrl-c, shutting down daemon");
                            let _ = shutdown.send(());
                            Ok(())
                        }
                        Err(err) => Err(DaemonError::Protocol(format!("ctrl-c handler failed: {err}"))),
                    }
                }
            }
        })
    };

    let (watcher_result, ticker_result, processor_result, socket_result, cancel_result, signal_result) = tokio::join!(
        watcher_handle,
        ticker_handle,
        processor_handle,
        socket_handle,
        cancel_handle,
        signal_handle
    );

    handle_join("watcher", watcher_result)?;
    handle_join("ticker", ticker_result)?;
    handle_join("sync_processor", processor_result)?;
    handle_join("socket_server", socket_result)?;
    handle_join("cancel", cancel_result)?;
    handle_join("signal_handler", signal_result)?;
    Ok(())
}

async fn watcher_task(
    home: PathBuf,
    sync_tx: mpsc::Sender<SyncJob>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let ledger_dir = ledger_dir_at(&home);
    if !ledger_dir.exists() {
        fs::create_dir_all(&ledger_dir).map_err(|e| io_err(&ledger_dir, e))?;
    }

    // Canonicalize so that FSEvents paths (real paths, e.g. /private/var/...
    // on macOS) match the prefix checks below.
    let ledger_dir = fs::canonicalize(&ledger_dir).unwrap_or(ledger_dir);

    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<notify::Result<Event>>();
    let mut _watcher: RecommendedWatcher = recommended_watcher(move |event| {
        let _ = event_tx.send(event);
    })?;
    _watcher.watch(&ledger_dir, RecursiveMode::NonRecursive)?;

    let mut debounce = HashMap::<PathBuf, Instant>::new();

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            event = event_rx.recv() => {
                let Some(event) = event else { break };
                let event = match event {
                    Ok(event) => event,
                    Err(err) => {
                        tracing::warn!(error = %err, "watcher event error");
                        continue;
                    }
                };
                if !is_relevant_event_kind(&event.kind) {
                    continue;
                }

                for path in event.paths {
                    if !is_ledger_file(&path) {
                        continue;
                    }
                    if !should_process_event(&mut debounce, &path, Instant::now()) {
                        continue;
                    }

                    match enqueue_sync(&sync_tx, "watcher").await {
                        Ok(summary) => {
                            tracing::info!(
                                applied = summary.applied,
                                conflicts = summary.conflicts,
                                duration_ms = summary.duration_ms,
                                "watcher-triggered sync completed",
                            );
                        }
                        Err(err) => {
                            tracing::error!(error = %err, "watcher-triggered sync failed");
                        }
                    }
                }
            }
        }
    }

    Ok(())
}

async fn ticker_task(
    interval: Duration,
    sync_tx: mpsc::Sender<SyncJob>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    ticker.tick().await; // consume the immediate first tick

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            _ = ticker.tick() => {
                match enqueue_sync(&sync_tx, "timer").await {
                    Ok(summary) => {
                        tracing::info!(
                            applied = summary.applied,
                            conflicts = summary.conflicts,
                            duration_ms = summary.duration_ms,
                            "periodic sync completed",
                        );
                    }
                    Err(err) => {
                        tracing::warn!(error = %err, "periodic sync failed");
                    }
                }
            }
        }
    }

    Ok(())
}

async fn sync_processor_task(
    engine: Engine,
    last_sync: Arc<AtomicU64>,
    mut sync_rx: mpsc::Receiver<SyncJob>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            maybe_job = sync_rx.recv() => {
                let Some(job) = maybe_job else { break };
                let started = Instant::now();

                let outcome = run_cycle_blocking(engine.clone()).await?;
                let result = match outcome {
                    Ok(outcome) => {
                        last_sync.store(unix_seconds_now(), Ordering::SeqCst);
                        Ok(SyncSummary {
                            source: job.source.to_string(),
                            applied: outcome.applied,
                            conflicts: outcome.conflicts.len(),
                            duration_ms: started.elapsed().as_millis(),
                        })
                    }
                    Err(SyncError::Busy) => {
                        // run_cycle recorded the trigger; the follow-up
                        // drain below will pick it up.
                        Err("sync already in flight, trigger coalesced".to_string())
                    }
                    Err(err) => Err(err.to_string()),
                };
                let _ = job.respond_to.send(result);

                // Triggers that arrived mid-cycle collapse into one
                // follow-up cycle.
                while engine.take_pending() {
                    match run_cycle_blocking(engine.clone()).await? {
                        Ok(outcome) => {
                            last_sync.store(unix_seconds_now(), Ordering::SeqCst);
                            tracing::info!(applied = outcome.applied, "coalesced sync completed");
                        }
                        Err(err) => {
                            tracing::warn!(error = %err, "coalesced sync failed");
                            break;
                        }
                    }
                }
            }
        }
    }

    Ok(())
}

async fn run_cycle_blocking(
    engine: Engine,
) -> Result<Result<tally_sync::CycleOutcome, SyncError>, DaemonError> {
    tokio::task::spawn_blocking(move || engine.run_cycle(false))
        .await
        .map_err(|err| DaemonError::Protocol(format!("sync task join error: {err}")))
}

#[allow(clippy::too_many_arguments)]
async fn socket_server_task(
    home: PathBuf,
    ledger: Arc<Ledger>,
    engine: Engine,
    last_sync: Arc<AtomicU64>,
    sync_tx: mpsc::Sender<SyncJob>,
    shutdown_tx: broadcast::Sender<()>,
    mut shutdown_rx: broadcast::Receiver<()>,
    started_at_unix: u64,
) -> Result<(), DaemonError> {
    let socket = socket_path(&home);
    prepare_socket_for_bind(&socket)?;

    let listener = UnixListener::bind(&socket).map_err(|e| io_err(&socket, e))?;
    set_socket_permissions(&socket)?;

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            accepted = listener.accept() => {
                let (stream, _) = accepted.map_err(|e| io_err(&socket, e))?;
                let home = home.clone();
                let ledger = ledger.clone();
                let engine = engine.clone();
                let last_sync = last_sync.clone();
                let sync_tx = sync_tx.clone();
                let shutdown_tx = shutdown_tx.clone();
                tokio::spawn(async move {
                    if let Err(err) = handle_socket_client(
                        stream,
                        home,
                        ledger,
                        engine,
                        last_sync,
                        sync_tx,
                        shutdown_tx,
                        started_at_unix,
                    ).await {
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

#[allow(clippy::too_many_arguments)]
async fn handle_socket_client(
    stream: UnixStream,
    home: PathBuf,
    ledger: Arc<Ledger>,
    engine: Engine,
    last_sync: Arc<AtomicU64>,
    sync_tx: mpsc::Sender<SyncJob>,
    shutdown_tx: broadcast::Sender<()>,
    started_at_unix: u64,
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

        let request: Result<DaemonRequest, _> = serde_json::from_str(&line);
        let request = match request {
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

        let cmd = request.cmd.clone();
        let response = match cmd.as_str() {
            "status" => {
                match build_status_payload(
                    home.clone(),
                    ledger.clone(),
                    engine.clone(),
                    &last_sync,
                    started_at_unix,
                )
                .await
                {
                    Ok(payload) => DaemonResponse::ok(payload),
                    Err(err) => DaemonResponse::error(err.to_string()),
                }
            }
            "sync" => match enqueue_sync(&sync_tx, "socket").await {
                Ok(summary) => DaemonResponse::ok(json!(summary)),
                Err(err) => DaemonResponse::error(err.to_string()),
            },
            "stop" => {
                engine.cancel_token().cancel();
                let _ = shutdown_tx.send(());
                DaemonResponse::ok(json!({ "stopping": true }))
            }
            other => DaemonResponse::error(format!("unknown command '{other}'")),
        };

        write_response(&mut writer, &response).await?;
        if cmd == "stop" {
            break;
        }
    }

    Ok(())
}

async fn build_status_payload(
    home: PathBuf,
    ledger: Arc<Ledger>,
    engine: Engine,
    last_sync: &AtomicU64,
    started_at_unix: u64,
) -> Result<Value, DaemonError> {
    let socket = socket_path(&home);
    let phase = format!("{:?}", engine.phase()).to_lowercase();
    let last_sync_at_unix = last_sync.load(Ordering::SeqCst);

    let report = tokio::task::spawn_blocking(move || report::check(&home, &ledger))
        .await
        .map_err(|err| DaemonError::Protocol(format!("status task join error: {err}")))??;

    Ok(json!({
        "running": true,
        "started_at_unix": started_at_unix,
        "last_sync_at_unix": last_sync_at_unix,
        "phase": phase,
        "sheet": report,
        "socket": socket.display().to_string(),
    }))
}

async fn enqueue_sync(
    sync_tx: &mpsc::Sender<SyncJob>,
    source: &'static str,
) -> Result<SyncSummary, DaemonError> {
    let (tx, rx) = oneshot::channel();
    sync_tx
        .send(SyncJob {
            source,
            respond_to: tx,
        })
        .await
        .map_err(|_| DaemonError::ChannelClosed("sync queue"))?;

    let outcome = rx
        .await
        .map_err(|_| DaemonError::ChannelClosed("sync response"))?;
    outcome.map_err(DaemonError::Protocol)
}

fn is_relevant_event_kind(kind: &EventKind) -> bool {
    matches!(kind, EventKind::Create(_) | EventKind::Modify(_))
}

fn is_ledger_file(path: &Path) -> bool {
    matches!(
        path.file_name().and_then(|name| name.to_str()),
        Some("ledger.log") | Some("items.json")
    )
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

fn should_process_event(
    debounce: &mut HashMap<PathBuf, Instant>,
    path: &Path,
    now: Instant,
) -> bool {
    should_process_event_with_threshold(debounce, path, now, DEBOUNCE_WINDOW)
}

fn should_process_event_with_threshold(
    debounce: &mut HashMap<PathBuf, Instant>,
    path: &Path,
    now: Instant,
    threshold: Duration,
) -> bool {
    debounce.retain(|_, seen_at| now.duration_since(*seen_at) <= Duration::from_secs(30));
    match debounce.get(path) {
        Some(last_seen) if now.duration_since(*last_seen) < threshold => false,
        _ => {
            debounce.insert(path.to_path_buf(), now);
            true
        }
    }
}

fn ensure_runtime_dirs(home: &Path) -> Result<(), DaemonError> {
    let root = tally_root(home);
    if !root.exists() {
        fs::create_dir_all(&root).map_err(|e| io_err(&root, e))?;
    }
    let logs = logs_dir(home);
    if !logs.exists() {
        fs::create_dir_all(&logs).map_err(|e| io_err(&logs, e))?;
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

fn init_tracing(level: &str) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.to_string()));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}

#[cfg(unix)]
fn set_socket_permissions(path: &Path) -> Result<(), DaemonError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(|e| io_err(path, e))
}

#[cfg(not(unix))]
fn set_socket_permissions(_path: &Path) -> Result<(), DaemonError> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use tempfile::TempDir;
    use tokio::time::advance;

    use tally_core::{TxDraft, TxKind};
    use tally_gateway::{GatewayConfig, MemoryTransport, SheetGateway};
    use tally_sync::ConflictPolicy;

    fn mock_engine(home: &Path, ledger: Arc<Ledger>) -> Engine {
        let transport: Arc<dyn SheetTransport> = Arc::new(MemoryTransport::new());
        Arc::new(SyncEngine::with_log_sink(
            home,
            ledger,
            SheetGateway::new(transport, GatewayConfig::default()),
            ConflictPolicy::LedgerWins,
        ))
    }

    #[tokio::test(start_paused = true, flavor = "current_thread")]
    async fn debounce_coalesces_rapid_events() {
        let threshold = Duration::from_millis(100);
        let mut debounce = HashMap::<PathBuf, Instant>::new();
        let path = PathBuf::from("/tmp/ledger.log");
        let mut sync_triggers = 0usize;

        for _ in 0..5 {
            if should_process_event_with_threshold(&mut debounce, &path, Instant::now(), threshold)
            {
                sync_triggers += 1;
            }
            advance(Duration::from_millis(10)).await;
        }

        advance(Duration::from_millis(150)).await;
        assert_eq!(
            sync_triggers, 1,
            "rapid appends should collapse to one sync trigger"
        );
    }

    #[test]
    fn ledger_file_filter_matches_log_and_catalog_only() {
        assert!(is_ledger_file(Path::new("/h/.tally/ledger/ledger.log")));
        assert!(is_ledger_file(Path::new("/h/.tally/ledger/items.json")));
        assert!(!is_ledger_file(Path::new("/h/.tally/ledger/items.json.tmp")));
        assert!(!is_ledger_file(Path::new("/h/.tally/checkpoint.json")));
    }

    #[tokio::test]
    async fn processor_runs_cycle_and_records_timestamp() {
        let home = TempDir::new().expect("home");
        let ledger = Arc::new(Ledger::open_at(home.path()).expect("ledger"));
        ledger
            .append(TxDraft::new("bolt", 5, TxKind::Receive, "tester"))
            .expect("append");
        let engine = mock_engine(home.path(), ledger);
        let last_sync = Arc::new(AtomicU64::new(0));

        let (sync_tx, sync_rx) = mpsc::channel::<SyncJob>(8);
        let (shutdown_tx, _) = broadcast::channel::<()>(1);
        let processor = tokio::spawn(sync_processor_task(
            engine,
            last_sync.clone(),
            sync_rx,
            shutdown_tx.subscribe(),
        ));

        let summary = enqueue_sync(&sync_tx, "test").await.expect("sync");
        assert_eq!(summary.applied, 1);
        assert_eq!(summary.source, "test");
        assert!(last_sync.load(Ordering::SeqCst) > 0);

        let _ = shutdown_tx.send(());
        processor.await.expect("join").expect("processor");
    }

    #[tokio::test]
    async fn status_payload_reports_sheet_state_and_phase() {
        let home = TempDir::new().expect("home");
        let ledger = Arc::new(Ledger::open_at(home.path()).expect("ledger"));
        ledger
            .append(TxDraft::new("bolt", 5, TxKind::Receive, "tester"))
            .expect("append");
        let engine = mock_engine(home.path(), ledger.clone());

        let last_sync = AtomicU64::new(0);
        let payload = build_status_payload(
            home.path().to_path_buf(),
            ledger,
            engine,
            &last_sync,
            1_000_000,
        )
        .await
        .expect("payload");

        assert_eq!(payload["running"], json!(true));
        assert_eq!(payload["started_at_unix"], json!(1_000_000u64));
        assert_eq!(payload["last_sync_at_unix"], json!(0u64));
        assert_eq!(payload["phase"], json!("idle"));
        assert_eq!(payload["sheet"]["state"], json!("never_synced"));
    }

    #[tokio::test]
    async fn socket_protocol_status_and_stop_over_in_memory_channels() {
        let (request_tx, mut request_rx) = mpsc::channel::<Vec<u8>>(8);
        let (response_tx, mut response_rx) = mpsc::channel::<Vec<u8>>(8);
        let (shutdown_tx, mut shutdown_rx) = broadcast::channel::<()>(1);

        tokio::spawn(async move {
            while let Some(bytes) = request_rx.recv().await {
                let line = String::from_utf8(bytes).expect("utf8");
                let request: DaemonRequest = serde_json::from_str(line.trim()).expect("request");
                let response = match request.cmd.as_str() {
                    "status" => DaemonResponse::ok(json!({"running": true})),
                    "stop" => {
                        let _ = shutdown_tx.send(());
                        DaemonResponse::ok(json!({"stopping": true}))
                    }
                    other => DaemonResponse::error(format!("unknown command '{other}'")),
                };
                let encoded = serde_json::to_vec(&response).expect("encode response");
                if response_tx.send(encoded).await.is_err() {
                    break;
                }
            }
        });

        request_tx
            .send(br#"{"cmd":"status"}"#.to_vec())
            .await
            .expect("send status request");
        let status_response = response_rx.recv().await.expect("status response");
        let status_json: serde_json::Value =
            serde_json::from_slice(&status_response).expect("decode status");
        assert_eq!(status_json["ok"], serde_json::Value::Bool(true));

        request_tx
            .send(br#"{"cmd":"stop"}"#.to_vec())
            .await
            .expect("send stop request");
        let stop_response = response_rx.recv().await.expect("stop response");
        let stop_json: serde_json::Value =
            serde_json::from_slice(&stop_response).expect("decode stop");
        assert_eq!(stop_json["ok"], serde_json::Value::Bool(true));

        shutdown_rx.recv().await.expect("shutdown signal");
    }
}
