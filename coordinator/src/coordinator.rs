//! Main coordinator implementation
//!
//! Owns the resource ledger and serves it to workers. One `select!` loop
//! handles ledger calls, periodic refreshes, worker health checks and
//! shutdown, so all ledger mutations happen in sequence.

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{interval, interval_at, Duration, Instant};

use shared::{
    logging, process_debug, process_error, process_info, process_warn, LedgerRequest, LedgerResponse, ProcessId,
    SharedResult, UtilizationProbe, UtilizationSnapshot,
};

use crate::{
    core::CoordinatorState,
    error::{CoordinatorError, CoordinatorResult},
    traits::{LedgerCall, LedgerListener, SnapshotStore, WorkerManager},
};

/// Tunables for the coordinator event loop
#[derive(Debug, Clone)]
pub struct CoordinatorSettings {
    pub ledger_addr: SocketAddr,
    pub worker_count: u32,
    pub refresh_interval: Duration,
    pub health_interval: Duration,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self {
            ledger_addr: SocketAddr::from(([127, 0, 0, 1], 7000)),
            worker_count: 0,
            refresh_interval: Duration::from_secs(300),
            health_interval: Duration::from_secs(10),
        }
    }
}

/// Coordinator that owns the ledger and supervises workers
pub struct Coordinator<P, S, L, W>
where
    P: UtilizationProbe + 'static,
    S: SnapshotStore + 'static,
    L: LedgerListener + 'static,
    W: WorkerManager + 'static,
{
    state: CoordinatorState,
    settings: CoordinatorSettings,

    /// Injected services
    probe: Arc<P>,
    store: S,
    listener: L,
    workers: W,

    /// Bound ledger address once initialized
    bound_addr: Option<SocketAddr>,
    ledger_rx: Option<mpsc::Receiver<LedgerCall>>,

    /// Background refresh results
    refresh_tx: mpsc::Sender<SharedResult<UtilizationSnapshot>>,
    refresh_rx: Option<mpsc::Receiver<SharedResult<UtilizationSnapshot>>>,

    /// Shutdown signal
    shutdown_tx: mpsc::Sender<()>,
    shutdown_rx: Option<mpsc::Receiver<()>>,
}

impl<P, S, L, W> Coordinator<P, S, L, W>
where
    P: UtilizationProbe + 'static,
    S: SnapshotStore + 'static,
    L: LedgerListener + 'static,
    W: WorkerManager + 'static,
{
    pub fn new(probe: P, store: S, listener: L, workers: W, settings: CoordinatorSettings) -> Self {
        let (refresh_tx, refresh_rx) = mpsc::channel(1);
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        Self {
            state: CoordinatorState::new(),
            settings,
            probe: Arc::new(probe),
            store,
            listener,
            workers,
            bound_addr: None,
            ledger_rx: None,
            refresh_tx,
            refresh_rx: Some(refresh_rx),
            shutdown_tx,
            shutdown_rx: Some(shutdown_rx),
        }
    }

    pub fn state(&self) -> &CoordinatorState {
        &self.state
    }

    pub fn bound_addr(&self) -> Option<SocketAddr> {
        self.bound_addr
    }

    pub fn get_shutdown_sender(&self) -> mpsc::Sender<()> {
        self.shutdown_tx.clone()
    }

    /// Warm the ledger, start the ledger listener and spawn workers
    pub async fn initialize(&mut self) -> CoordinatorResult<()> {
        process_debug!(ProcessId::current(), "🚀 Initializing coordinator...");

        match self.store.load().await {
            Ok(Some(snapshot)) => {
                process_info!(
                    ProcessId::current(),
                    "💾 Warm start from persisted snapshot ({} clusters)",
                    snapshot.clusters.len()
                );
                self.state.accept_snapshot(snapshot);
            }
            Ok(None) => {
                process_debug!(ProcessId::current(), "No persisted snapshot found");
            }
            Err(e) => logging::log_error(ProcessId::current(), "Loading persisted snapshot", &e),
        }

        if !self.state.has_snapshot() {
            // A failed start-up refresh is retried on the first read
            if let Err(e) = self.refresh_now().await {
                logging::log_error(ProcessId::current(), "Initial utilization probe", &e);
            }
        }

        let (bound_addr, ledger_rx) = self.listener.start(self.settings.ledger_addr).await?;
        self.bound_addr = Some(bound_addr);
        self.ledger_rx = Some(ledger_rx);
        process_debug!(ProcessId::current(), "📒 Ledger listener: {}", bound_addr);

        if self.settings.worker_count > 0 {
            let spawned = self.workers.spawn_workers(self.settings.worker_count, bound_addr).await?;
            process_info!(ProcessId::current(), "🏭 Spawned {} workers", spawned.len());
        }

        logging::log_success(ProcessId::current(), "Coordinator initialized successfully");
        Ok(())
    }

    /// Main event loop
    pub async fn run(&mut self) -> CoordinatorResult<()> {
        let mut ledger_rx = self
            .ledger_rx
            .take()
            .ok_or_else(|| CoordinatorError::config("coordinator not initialized"))?;
        let mut refresh_rx = self
            .refresh_rx
            .take()
            .ok_or_else(|| CoordinatorError::config("event loop already started"))?;
        let mut shutdown_rx = self
            .shutdown_rx
            .take()
            .ok_or_else(|| CoordinatorError::config("event loop already started"))?;

        let period = self.settings.refresh_interval;
        let mut refresh_interval = interval_at(Instant::now() + period, period);
        let mut health_interval = interval(self.settings.health_interval);

        loop {
            tokio::select! {
                call = ledger_rx.recv() => {
                    match call {
                        Some(call) => self.handle_call(call).await,
                        None => {
                            process_warn!(ProcessId::current(), "Ledger listener closed");
                            break;
                        }
                    }
                },

                Some(result) = refresh_rx.recv() => {
                    self.complete_refresh(result).await;
                },

                _ = refresh_interval.tick() => {
                    self.start_background_refresh();
                },

                _ = health_interval.tick() => {
                    match self.workers.restart_exited().await {
                        Ok(restarted) if !restarted.is_empty() => {
                            process_warn!(ProcessId::current(), "♻️ Restarted workers: {:?}", restarted);
                        }
                        Ok(_) => {}
                        Err(e) => logging::log_error(ProcessId::current(), "Worker health check", &e),
                    }
                },

                _ = shutdown_rx.recv() => {
                    logging::log_shutdown(ProcessId::current(), "shutdown requested");
                    break;
                }
            }
        }

        self.shutdown().await
    }

    async fn shutdown(&mut self) -> CoordinatorResult<()> {
        if let Err(e) = self.workers.stop_workers().await {
            logging::log_error(ProcessId::current(), "Stopping workers", &e);
        }
        self.listener.shutdown().await?;

        let stats = self.state.stats();
        process_info!(
            ProcessId::current(),
            "📈 Ledger totals: {} debits applied, {} rejected, {} snapshots accepted, {} refresh failures",
            stats.debits_applied,
            stats.debits_rejected,
            stats.snapshots_accepted,
            stats.refresh_failures
        );
        Ok(())
    }

    /// Answer a single ledger call
    pub async fn handle_call(&mut self, call: LedgerCall) {
        let response = self.handle_request(call.request).await;
        if call.reply.send(response).is_err() {
            process_debug!(ProcessId::current(), "Ledger caller went away before the reply");
        }
    }

    pub async fn handle_request(&mut self, request: LedgerRequest) -> LedgerResponse {
        match request {
            LedgerRequest::GetSnapshot => {
                if !self.state.has_snapshot() {
                    // Nothing cached yet: gather now rather than answer empty
                    if let Err(e) = self.refresh_now().await {
                        return LedgerResponse::Error { message: e.to_string() };
                    }
                }
                match self.state.snapshot() {
                    Some(snapshot) => LedgerResponse::Snapshot {
                        snapshot: snapshot.clone(),
                    },
                    None => LedgerResponse::Error {
                        message: "no utilization snapshot available".to_string(),
                    },
                }
            }
            LedgerRequest::Debit {
                cluster,
                cores,
                memory_gib,
            } => LedgerResponse::Debited {
                applied: self.state.debit(&cluster, cores, memory_gib),
            },
            LedgerRequest::Publish { snapshot } => {
                self.accept_and_persist(snapshot).await;
                LedgerResponse::Published
            }
        }
    }

    /// Gather synchronously and swap the result in
    pub async fn refresh_now(&mut self) -> CoordinatorResult<()> {
        let snapshot = self
            .probe
            .gather()
            .await
            .map_err(|e| CoordinatorError::probe(e.to_string()))?;
        self.accept_and_persist(snapshot).await;
        Ok(())
    }

    fn start_background_refresh(&mut self) {
        if !self.state.begin_refresh() {
            process_debug!(ProcessId::current(), "⏳ Refresh still running, skipping tick");
            return;
        }

        let probe = Arc::clone(&self.probe);
        let tx = self.refresh_tx.clone();
        tokio::spawn(async move {
            let result = probe.gather().await;
            let _ = tx.send(result).await;
        });
    }

    async fn complete_refresh(&mut self, result: SharedResult<UtilizationSnapshot>) {
        match result {
            Ok(snapshot) => {
                self.state.finish_refresh(true);
                if self.state.is_older_than_cached(&snapshot) {
                    process_warn!(
                        ProcessId::current(),
                        "⏭️ Dropping refresh gathered at {}; a newer snapshot is cached",
                        snapshot.gathered_at
                    );
                    return;
                }
                self.accept_and_persist(snapshot).await;
            }
            Err(e) => {
                self.state.finish_refresh(false);
                process_error!(ProcessId::current(), "❌ Utilization refresh failed: {}", e);
            }
        }
    }

    async fn accept_and_persist(&mut self, snapshot: UtilizationSnapshot) {
        if let Err(e) = self.store.save(&snapshot).await {
            logging::log_error(ProcessId::current(), "Persisting snapshot", &e);
        }
        self.state.accept_snapshot(snapshot);
    }
}
