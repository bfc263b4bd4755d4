//! Verification worker.
//!
//! Offloads proof verification to a dedicated task so the cryptographic work
//! does not block concurrent request handling. Requests are dispatched by
//! message with a correlation id and awaited on a oneshot reply; each call
//! carries a timeout, and a crashed worker surfaces as a failure result
//! rather than a hang.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use crate::{Error, error::CredentialError};

use super::{ProofAdapter, VerifyInput};

/// Default per-call verification timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

const CHANNEL_CAPACITY: usize = 64;

struct VerificationJob {
    correlation_id: Uuid,
    input: VerifyInput,
    reply: oneshot::Sender<Result<bool, Error>>,
}

/// Spawns the verification task.
pub struct VerificationWorker;

impl VerificationWorker {
    /// Spawn a worker with the default per-call timeout.
    ///
    /// Returns the request handle and the worker's join handle. The task
    /// exits once every handle clone has been dropped.
    pub fn spawn(
        adapter: Arc<dyn ProofAdapter>,
    ) -> (VerificationHandle, tokio::task::JoinHandle<()>) {
        Self::spawn_with_timeout(adapter, DEFAULT_TIMEOUT)
    }

    pub fn spawn_with_timeout(
        adapter: Arc<dyn ProofAdapter>,
        timeout: Duration,
    ) -> (VerificationHandle, tokio::task::JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<VerificationJob>(CHANNEL_CAPACITY);

        let task = tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                tracing::debug!(correlation_id = %job.correlation_id, "Verifying proof");
                let result = adapter.verify_proof(&job.input).await;
                if job.reply.send(result).is_err() {
                    // Caller timed out or went away; nothing to deliver to.
                    tracing::debug!(
                        correlation_id = %job.correlation_id,
                        "Verification reply dropped"
                    );
                }
            }
            tracing::debug!("Verification worker shutting down");
        });

        (VerificationHandle { tx, timeout }, task)
    }
}

/// Cheaply cloneable handle for dispatching verification requests.
#[derive(Clone)]
pub struct VerificationHandle {
    tx: mpsc::Sender<VerificationJob>,
    timeout: Duration,
}

impl VerificationHandle {
    /// Verify a proof on the worker.
    ///
    /// Returns [`CredentialError::WorkerUnavailable`] when the worker has
    /// exited and [`CredentialError::VerificationTimeout`] when no reply
    /// arrives within the per-call timeout. Never hangs indefinitely.
    pub async fn verify(&self, input: VerifyInput) -> Result<bool, Error> {
        let correlation_id = Uuid::new_v4();
        let (reply_tx, reply_rx) = oneshot::channel();

        self.tx
            .send(VerificationJob {
                correlation_id,
                input,
                reply: reply_tx,
            })
            .await
            .map_err(|_| Error::from(CredentialError::WorkerUnavailable))?;

        match tokio::time::timeout(self.timeout, reply_rx).await {
            Ok(Ok(result)) => result,
            // Worker dropped the reply sender without answering.
            Ok(Err(_)) => Err(CredentialError::WorkerUnavailable.into()),
            Err(_) => {
                tracing::warn!(correlation_id = %correlation_id, "Proof verification timed out");
                Err(CredentialError::VerificationTimeout(self.timeout).into())
            }
        }
    }
}
