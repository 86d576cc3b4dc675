//! Builder wiring mock services into a coordinator

use ::coordinator::*;
use shared::{MockUtilizationProbe, SharedError};
use tokio::sync::mpsc;
use tokio::time::Duration;

use super::fixtures::TestFixtures;

type MockCoordinator = Coordinator<MockUtilizationProbe, MockSnapshotStore, MockLedgerListener, MockWorkerManager>;

/// Builder for coordinators backed by mocks
///
/// Defaults: nothing persisted, the probe is never expected to run, the
/// listener hands out a channel the test can feed, no workers.
pub struct CoordinatorBuilder {
    probe: MockUtilizationProbe,
    store: MockSnapshotStore,
    listener: MockLedgerListener,
    workers: MockWorkerManager,
    settings: CoordinatorSettings,
    ledger_tx: mpsc::Sender<LedgerCall>,
}

impl CoordinatorBuilder {
    pub fn new() -> Self {
        let (ledger_tx, ledger_rx) = mpsc::channel(16);

        let probe = MockUtilizationProbe::new();
        let mut store = MockSnapshotStore::new();
        let mut listener = MockLedgerListener::new();
        let mut workers = MockWorkerManager::new();

        store.expect_load().returning(|| Ok(None));
        store.expect_save().returning(|_| Ok(())).times(0..);
        listener
            .expect_start()
            .return_once(move |_| Ok((TestFixtures::bound_addr(), ledger_rx)));
        listener.expect_shutdown().returning(|| Ok(())).times(0..);
        workers.expect_restart_exited().returning(|| Ok(vec![])).times(0..);
        workers.expect_stop_workers().returning(|| Ok(())).times(0..);

        Self {
            probe,
            store,
            listener,
            workers,
            settings: CoordinatorSettings {
                ledger_addr: TestFixtures::ledger_addr(),
                worker_count: 0,
                refresh_interval: Duration::from_secs(3600),
                health_interval: Duration::from_secs(3600),
            },
            ledger_tx,
        }
    }

    /// Replace the default store expectations
    pub fn with_store<F>(mut self, setup: F) -> Self
    where
        F: FnOnce(&mut MockSnapshotStore),
    {
        let mut store = MockSnapshotStore::new();
        setup(&mut store);
        self.store = store;
        self
    }

    pub fn with_probe<F>(mut self, setup: F) -> Self
    where
        F: FnOnce(&mut MockUtilizationProbe),
    {
        setup(&mut self.probe);
        self
    }

    /// Replace the default worker manager expectations
    pub fn with_workers<F>(mut self, setup: F) -> Self
    where
        F: FnOnce(&mut MockWorkerManager),
    {
        let mut workers = MockWorkerManager::new();
        setup(&mut workers);
        self.workers = workers;
        self
    }

    pub fn with_worker_count(mut self, count: u32) -> Self {
        self.settings.worker_count = count;
        self
    }

    pub fn with_refresh_interval(mut self, interval: Duration) -> Self {
        self.settings.refresh_interval = interval;
        self
    }

    /// Probe that always fails
    pub fn with_failing_probe(self) -> Self {
        self.with_probe(|probe| {
            probe
                .expect_gather()
                .returning(|| Err(SharedError::protocol("vcenter unreachable")));
        })
    }

    /// Coordinator plus the sender that feeds its ledger channel
    pub fn build(self) -> (MockCoordinator, mpsc::Sender<LedgerCall>) {
        let coordinator = Coordinator::new(self.probe, self.store, self.listener, self.workers, self.settings);
        (coordinator, self.ledger_tx)
    }
}

impl Default for CoordinatorBuilder {
    fn default() -> Self {
        Self::new()
    }
}
