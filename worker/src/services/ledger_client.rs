//! Ledger access for workers
//!
//! `TcpLedgerClient` forwards every call to the coordinator over one
//! persistent framed connection. `LocalLedger` keeps the ledger in-process for
//! workers started without a coordinator.

use async_trait::async_trait;
use std::net::SocketAddr;
use tokio::net::TcpStream;
use tokio::sync::Mutex;

use shared::framing::{read_frame, write_frame};
use shared::{
    process_debug, process_warn, LedgerRequest, LedgerResponse, ProcessId, ResourceLedger, UtilizationProbe,
    UtilizationSnapshot,
};

use crate::error::{ProvisionError, ProvisionResult};
use crate::traits::LedgerClient;

pub struct TcpLedgerClient {
    coordinator_addr: SocketAddr,
    connection: Mutex<Option<TcpStream>>,
}

impl TcpLedgerClient {
    pub fn new(coordinator_addr: SocketAddr) -> Self {
        Self {
            coordinator_addr,
            connection: Mutex::new(None),
        }
    }

    /// Send one request; a broken connection is re-established once
    ///
    /// A `GetSnapshot` is re-sent whenever the exchange fails. Any other
    /// request is re-sent only if writing it failed, since a lost reply may
    /// follow a call the coordinator already applied.
    async fn request(&self, request: LedgerRequest) -> ProvisionResult<LedgerResponse> {
        let resend_after_reply_loss = matches!(request, LedgerRequest::GetSnapshot);
        let mut connection = self.connection.lock().await;

        for attempt in 0..2 {
            if connection.is_none() {
                let stream = TcpStream::connect(self.coordinator_addr).await.map_err(|e| {
                    ProvisionError::ledger(format!("cannot reach coordinator at {}: {e}", self.coordinator_addr))
                })?;
                process_debug!(ProcessId::current(), "🔗 Connected to ledger at {}", self.coordinator_addr);
                *connection = Some(stream);
            }

            let Some(stream) = connection.as_mut() else {
                continue;
            };
            if let Err(e) = write_frame(stream, &request).await {
                process_warn!(ProcessId::current(), "⚠️ Ledger send failed (attempt {}): {}", attempt + 1, e);
                *connection = None;
                continue;
            }
            match read_frame::<_, LedgerResponse>(stream).await {
                Ok(LedgerResponse::Error { message }) => return Err(ProvisionError::ledger(message)),
                Ok(response) => return Ok(response),
                Err(e) => {
                    process_warn!(ProcessId::current(), "⚠️ Ledger reply lost (attempt {}): {}", attempt + 1, e);
                    *connection = None;
                    if !resend_after_reply_loss {
                        return Err(ProvisionError::ledger(format!(
                            "no reply from coordinator at {}; the call may have been applied",
                            self.coordinator_addr
                        )));
                    }
                }
            }
        }

        Err(ProvisionError::ledger(format!(
            "coordinator at {} did not answer",
            self.coordinator_addr
        )))
    }
}

fn unexpected(response: LedgerResponse) -> ProvisionError {
    ProvisionError::ledger(format!("unexpected ledger response: {response:?}"))
}

#[async_trait]
impl LedgerClient for TcpLedgerClient {
    async fn snapshot(&self) -> ProvisionResult<UtilizationSnapshot> {
        match self.request(LedgerRequest::GetSnapshot).await? {
            LedgerResponse::Snapshot { snapshot } => Ok(snapshot),
            other => Err(unexpected(other)),
        }
    }

    async fn debit(&self, cluster: &str, cores: u32, memory_gib: u32) -> ProvisionResult<bool> {
        let request = LedgerRequest::Debit {
            cluster: cluster.to_string(),
            cores,
            memory_gib,
        };
        match self.request(request).await? {
            LedgerResponse::Debited { applied } => Ok(applied),
            other => Err(unexpected(other)),
        }
    }
}

/// In-process ledger that gathers directly through its own probe
pub struct LocalLedger<P: UtilizationProbe> {
    probe: P,
    ledger: Mutex<ResourceLedger>,
}

impl<P: UtilizationProbe> LocalLedger<P> {
    pub fn new(probe: P) -> Self {
        Self {
            probe,
            ledger: Mutex::new(ResourceLedger::new()),
        }
    }
}

#[async_trait]
impl<P: UtilizationProbe> LedgerClient for LocalLedger<P> {
    async fn snapshot(&self) -> ProvisionResult<UtilizationSnapshot> {
        let mut ledger = self.ledger.lock().await;
        if let Some(snapshot) = ledger.snapshot() {
            return Ok(snapshot.clone());
        }

        let snapshot = self.probe.gather().await?;
        ledger.replace(snapshot.clone());
        Ok(snapshot)
    }

    async fn debit(&self, cluster: &str, cores: u32, memory_gib: u32) -> ProvisionResult<bool> {
        Ok(self.ledger.lock().await.debit(cluster, cores, memory_gib))
    }
}
