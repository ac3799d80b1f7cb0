//! Fair wait queue in front of the reservation engine.
//!
//! Callers that want to block until a key frees up enqueue a job on a FIFO
//! channel; a dispatcher serves jobs in arrival order, bounded by a
//! configured concurrency. Each served job loops the engine with a backoff
//! until it wins a reservation or its worker-side deadline elapses. The
//! requester awaits the reply under its own deadline; whichever deadline
//! fires first ends the wait for that side.
//!
//! Both deadlines surface as `Ok(None)`, never as errors. A requester that
//! stops waiting does not cancel its worker: a reservation committed for a
//! vanished requester is wasted quota by design.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, Semaphore};
use tokio::time::Instant;
use tracing::debug;

use super::engine::{Reservation, ReservationEngine};
use super::error::{BrokerError, Result};
use super::store::KeyStore;

/// Buffered jobs before enqueue itself applies backpressure.
const QUEUE_DEPTH: usize = 1024;

/// Wait queue tuning.
#[derive(Debug, Clone)]
pub struct WaitQueueConfig {
    /// Jobs served in parallel.
    pub concurrency: usize,
    /// Pause between reservation attempts of one job.
    pub backoff: Duration,
    /// Worker-side deadline per job; `None` waits indefinitely.
    pub max_wait: Option<Duration>,
}

impl Default for WaitQueueConfig {
    fn default() -> Self {
        WaitQueueConfig {
            concurrency: 5,
            backoff: Duration::from_millis(1000),
            max_wait: None,
        }
    }
}

struct WaitJob {
    reply: oneshot::Sender<Result<Option<Reservation>>>,
}

/// Handle to the wait queue. Cheap to clone; all clones feed the same
/// FIFO.
#[derive(Clone)]
pub struct WaitQueue {
    tx: mpsc::Sender<WaitJob>,
}

impl WaitQueue {
    /// Spawn the dispatcher and return a handle to it.
    pub fn spawn<S: KeyStore>(
        engine: Arc<ReservationEngine<S>>,
        config: WaitQueueConfig,
    ) -> WaitQueue {
        let (tx, mut rx) = mpsc::channel::<WaitJob>(QUEUE_DEPTH);
        let permits = Arc::new(Semaphore::new(config.concurrency.max(1)));

        tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                // Acquiring before spawning keeps dequeue order FIFO under
                // the concurrency bound.
                let permit = match permits.clone().acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => break,
                };
                let engine = engine.clone();
                let backoff = config.backoff;
                let max_wait = config.max_wait;
                tokio::spawn(async move {
                    let outcome = drain_reservation(&engine, backoff, max_wait).await;
                    // Ignore send errors - the requester may have given up
                    let _ = job.reply.send(outcome);
                    drop(permit);
                });
            }
            debug!("wait queue dispatcher stopped");
        });

        WaitQueue { tx }
    }

    /// Block until a reservation succeeds or a deadline fires.
    ///
    /// `request_timeout` is the caller-side deadline; `None` waits for the
    /// worker outcome indefinitely. Returns `Ok(None)` on either timeout.
    pub async fn reserve_blocking(
        &self,
        request_timeout: Option<Duration>,
    ) -> Result<Option<Reservation>> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(WaitJob { reply: reply_tx })
            .await
            .map_err(|_| BrokerError::QueueUnavailable)?;

        match request_timeout {
            Some(timeout) => match tokio::time::timeout(timeout, reply_rx).await {
                Ok(Ok(outcome)) => outcome,
                Ok(Err(_)) => Err(BrokerError::QueueUnavailable),
                // Caller deadline elapsed; the worker keeps going.
                Err(_) => Ok(None),
            },
            None => reply_rx.await.map_err(|_| BrokerError::QueueUnavailable)?,
        }
    }
}

/// Loop the engine until a reservation succeeds or `max_wait` elapses.
/// Sleeps are capped at the remaining deadline so a timeout is reported
/// promptly even when it is shorter than one backoff.
async fn drain_reservation<S: KeyStore>(
    engine: &ReservationEngine<S>,
    backoff: Duration,
    max_wait: Option<Duration>,
) -> Result<Option<Reservation>> {
    let deadline = max_wait.map(|d| Instant::now() + d);
    loop {
        if let Some(reservation) = engine.reserve().await? {
            return Ok(Some(reservation));
        }
        match deadline {
            Some(deadline) => {
                let now = Instant::now();
                if now >= deadline {
                    return Ok(None);
                }
                tokio::time::sleep(backoff.min(deadline - now)).await;
            }
            None => tokio::time::sleep(backoff).await,
        }
    }
}
