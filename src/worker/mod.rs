// src/worker/mod.rs — Isolated model worker reachable only by message passing

pub mod protocol;
pub mod server;
pub mod snapshot;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};

use crate::infra::errors::{Result, SynapseError};

pub use protocol::{
    Envelope, ModelPrediction, TrainingReport, WorkerInfo, WorkerRequest, WorkerResponse,
};
pub use server::{spawn_worker, ModelWorker};
pub use snapshot::{LabeledPrediction, PredictorSnapshot, TokenLabels};

/// Cloneable sender side of the worker queue.
#[derive(Clone)]
pub struct WorkerHandle {
    tx: mpsc::Sender<Envelope>,
    next_id: Arc<AtomicU64>,
    snapshot: watch::Receiver<Arc<PredictorSnapshot>>,
}

impl WorkerHandle {
    pub fn new(
        tx: mpsc::Sender<Envelope>,
        snapshot: watch::Receiver<Arc<PredictorSnapshot>>,
    ) -> Self {
        Self {
            tx,
            next_id: Arc::new(AtomicU64::new(1)),
            snapshot,
        }
    }

    fn envelope(&self, request: WorkerRequest) -> (Envelope, oneshot::Receiver<WorkerResponse>) {
        let (reply, rx) = oneshot::channel();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        (Envelope { id, request, reply }, rx)
    }

    /// Enqueue without waiting. A full or closed queue is `ModelUnavailable`.
    pub fn try_submit(&self, request: WorkerRequest) -> Result<oneshot::Receiver<WorkerResponse>> {
        let kind = request.kind();
        let (envelope, rx) = self.envelope(request);
        self.tx.try_send(envelope).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => {
                SynapseError::ModelUnavailable(format!("worker queue full, {kind} skipped"))
            }
            mpsc::error::TrySendError::Closed(_) => {
                SynapseError::ModelUnavailable("worker stopped".into())
            }
        })?;
        Ok(rx)
    }

    /// Send a request and await its response within `timeout`.
    ///
    /// The deadline covers queueing and processing. On expiry the job is
    /// not cancelled; its eventual reply is discarded.
    pub async fn request(&self, request: WorkerRequest, timeout: Duration) -> Result<WorkerResponse> {
        let (envelope, rx) = self.envelope(request);
        let timeout_ms = timeout.as_millis() as u64;
        let exchange = async {
            self.tx
                .send(envelope)
                .await
                .map_err(|_| SynapseError::ModelUnavailable("worker stopped".into()))?;
            rx.await
                .map_err(|_| SynapseError::ModelUnavailable("worker dropped the request".into()))
        };
        match tokio::time::timeout(timeout, exchange).await {
            Ok(result) => result,
            Err(_) => Err(SynapseError::PredictionTimeout { timeout_ms }),
        }
    }

    /// Latest committed training state.
    pub fn snapshot(&self) -> Arc<PredictorSnapshot> {
        self.snapshot.borrow().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
