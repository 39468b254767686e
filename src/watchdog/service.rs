//! Watchdog Service
//!
//! Runs one [`AdmissionGate`] inside a dedicated tokio task. Callers talk to
//! it through cloneable [`WatchdogHandle`]s, so every load/mutate/save cycle
//! in the process is serialized through a single owner. Gate calls do
//! blocking store I/O and run on tokio's blocking pool, one at a time.

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::clock::Clock;
use super::error::ServiceError;
use super::gate::{AdmissionGate, GateStatus, Outcome, RecordReceipt, Verdict};
use super::store::StateStore;

const REQUEST_QUEUE_DEPTH: usize = 64;

enum Request {
    Check(oneshot::Sender<Outcome<Verdict>>),
    Record {
        tokens: u64,
        reply: oneshot::Sender<Outcome<RecordReceipt>>,
    },
    Status(oneshot::Sender<Outcome<GateStatus>>),
}

/// Owner task for a gate
pub struct WatchdogService;

impl WatchdogService {
    /// Move `gate` into a new task
    ///
    /// The task exits once every handle has been dropped.
    pub fn spawn<S, C>(gate: AdmissionGate<S, C>) -> (WatchdogHandle, JoinHandle<()>)
    where
        S: StateStore + 'static,
        C: Clock + 'static,
    {
        let (tx, mut rx) = mpsc::channel(REQUEST_QUEUE_DEPTH);

        let task = tokio::spawn(async move {
            let mut gate = gate;
            while let Some(request) = rx.recv().await {
                let served = tokio::task::spawn_blocking(move || {
                    serve(&gate, request);
                    gate
                })
                .await;
                gate = match served {
                    Ok(gate) => gate,
                    Err(e) => {
                        warn!("Watchdog gate call failed, service stopping: {}", e);
                        return;
                    }
                };
            }
            debug!("All watchdog handles dropped, service stopping");
        });

        (WatchdogHandle { tx }, task)
    }
}

fn serve<S: StateStore, C: Clock>(gate: &AdmissionGate<S, C>, request: Request) {
    match request {
        Request::Check(reply) => {
            let _ = reply.send(gate.check_before_request());
        }
        Request::Record { tokens, reply } => {
            let _ = reply.send(gate.record_request(tokens));
        }
        Request::Status(reply) => {
            let _ = reply.send(gate.get_status());
        }
    }
}

/// Cloneable client for a [`WatchdogService`]
#[derive(Clone)]
pub struct WatchdogHandle {
    tx: mpsc::Sender<Request>,
}

impl WatchdogHandle {
    /// See [`AdmissionGate::check_before_request`]
    pub async fn check(&self) -> Result<Outcome<Verdict>, ServiceError> {
        let (reply, rx) = oneshot::channel();
        self.send(Request::Check(reply)).await?;
        rx.await.map_err(|_| ServiceError::Closed)
    }

    /// See [`AdmissionGate::record_request`]
    pub async fn record(&self, tokens: u64) -> Result<Outcome<RecordReceipt>, ServiceError> {
        let (reply, rx) = oneshot::channel();
        self.send(Request::Record { tokens, reply }).await?;
        rx.await.map_err(|_| ServiceError::Closed)
    }

    /// See [`AdmissionGate::get_status`]
    pub async fn status(&self) -> Result<Outcome<GateStatus>, ServiceError> {
        let (reply, rx) = oneshot::channel();
        self.send(Request::Status(reply)).await?;
        rx.await.map_err(|_| ServiceError::Closed)
    }

    async fn send(&self, request: Request) -> Result<(), ServiceError> {
        self.tx.send(request).await.map_err(|_| ServiceError::Closed)
    }
}
