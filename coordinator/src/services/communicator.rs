//! TCP ledger listener
//!
//! Each worker connection carries framed `LedgerRequest`s; every request is
//! handed to the coordinator loop as a `LedgerCall` and the reply is written
//! back on the same connection before the next request is read.

use async_trait::async_trait;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot, Mutex};

use crate::error::{CoordinatorError, CoordinatorResult};
use crate::traits::{LedgerCall, LedgerListener};
use shared::framing::{read_frame, write_frame};
use shared::{process_debug, LedgerRequest, LedgerResponse, ProcessId};

pub struct TcpLedgerListener {
    /// Accept loop, aborted on shutdown
    accept_task: Arc<Mutex<Option<tokio::task::JoinHandle<()>>>>,
}

impl TcpLedgerListener {
    pub fn new() -> Self {
        Self {
            accept_task: Arc::new(Mutex::new(None)),
        }
    }

    async fn serve_connection(mut stream: TcpStream, calls: mpsc::Sender<LedgerCall>) {
        loop {
            let request: LedgerRequest = match read_frame(&mut stream).await {
                Ok(request) => request,
                // Peer closed or sent garbage; either way this connection is done
                Err(_) => return,
            };

            let (reply, response_rx) = oneshot::channel();
            if calls.send(LedgerCall { request, reply }).await.is_err() {
                return;
            }

            let response = response_rx.await.unwrap_or_else(|_| LedgerResponse::Error {
                message: "coordinator dropped the request".to_string(),
            });

            if write_frame(&mut stream, &response).await.is_err() {
                return;
            }
        }
    }
}

impl Default for TcpLedgerListener {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LedgerListener for TcpLedgerListener {
    async fn start(&self, bind_addr: SocketAddr) -> CoordinatorResult<(SocketAddr, mpsc::Receiver<LedgerCall>)> {
        let listener = TcpListener::bind(bind_addr)
            .await
            .map_err(|e| CoordinatorError::communication(format!("Failed to bind to {bind_addr}: {e}")))?;
        let local_addr = listener.local_addr()?;

        let (tx, rx) = mpsc::channel(256);
        let handle = tokio::spawn(async move {
            while let Ok((stream, peer)) = listener.accept().await {
                process_debug!(ProcessId::current(), "🔌 Ledger connection from {}", peer);
                tokio::spawn(Self::serve_connection(stream, tx.clone()));
            }
        });

        *self.accept_task.lock().await = Some(handle);

        process_debug!(ProcessId::current(), "📒 Ledger listener started on {}", local_addr);
        Ok((local_addr, rx))
    }

    async fn shutdown(&self) -> CoordinatorResult<()> {
        if let Some(handle) = self.accept_task.lock().await.take() {
            handle.abort();
        }
        process_debug!(ProcessId::current(), "🔌 Ledger listener shut down");
        Ok(())
    }
}
