//! Asynchronous access logging.
//!
//! The audit middleware hands each finished request to an [`AuditLogger`],
//! which queues it without waiting. A fixed pool of workers drains the queue
//! into the [`AuditStore`]. Persistence failures are logged and dropped; they
//! never reach the client response.
//!
//! The queue is bounded. When it is full new entries are discarded with a
//! warning rather than applying backpressure to request handling.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;

use crate::clock::Clock;
use crate::models::audit::{AuditEntry, RequestRecord};
use crate::store::AuditStore;

/// Producer side, cloned into application state.
#[derive(Clone)]
pub struct AuditLogger {
    tx: mpsc::Sender<AuditEntry>,
    clock: Arc<dyn Clock>,
}

impl AuditLogger {
    /// Stamp and enqueue one request. Never blocks.
    ///
    /// Returns `false` if the entry was dropped.
    pub fn record(&self, record: RequestRecord) -> bool {
        let entry = AuditEntry::from_record(record, self.clock.now());

        match self.tx.try_send(entry) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(entry)) => {
                tracing::warn!(
                    user_id = %entry.user_id,
                    path = %entry.path,
                    "audit queue full, dropping entry"
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(entry)) => {
                tracing::warn!(
                    user_id = %entry.user_id,
                    path = %entry.path,
                    "audit queue closed, dropping entry"
                );
                false
            }
        }
    }
}

/// Handle on the worker pool.
pub struct AuditWorkers {
    handles: Vec<JoinHandle<()>>,
    stop: watch::Sender<bool>,
}

/// Create the queue and start `workers` tasks draining it into `store`.
///
/// At least one worker is always started; with none the receiver would be
/// dropped here and every entry lost.
pub fn spawn(
    store: Arc<dyn AuditStore>,
    clock: Arc<dyn Clock>,
    capacity: usize,
    workers: usize,
) -> (AuditLogger, AuditWorkers) {
    let capacity = capacity.max(1);
    let workers = workers.max(1);
    let (tx, rx) = mpsc::channel(capacity);
    let (stop, stop_rx) = watch::channel(false);
    let rx = Arc::new(Mutex::new(rx));

    let handles = (0..workers)
        .map(|worker| {
            tokio::spawn(run_worker(
                worker,
                Arc::clone(&rx),
                stop_rx.clone(),
                Arc::clone(&store),
            ))
        })
        .collect();

    tracing::info!(capacity, workers, "audit workers started");

    (AuditLogger { tx, clock }, AuditWorkers { handles, stop })
}

impl AuditWorkers {
    /// Stop accepting entries, then wait up to `timeout` for the queue to drain.
    ///
    /// Returns `true` if every worker finished in time.
    pub async fn shutdown(self, timeout: Duration) -> bool {
        let _ = self.stop.send(true);

        let handles = self.handles;
        let drained = tokio::time::timeout(timeout, async move {
            for handle in handles {
                if let Err(e) = handle.await {
                    tracing::error!(error = %e, "audit worker panicked");
                }
            }
        })
        .await
        .is_ok();

        if drained {
            tracing::info!("audit queue drained");
        } else {
            tracing::warn!(?timeout, "audit queue not drained before timeout");
        }

        drained
    }
}

async fn run_worker(
    worker: usize,
    rx: Arc<Mutex<mpsc::Receiver<AuditEntry>>>,
    mut stop: watch::Receiver<bool>,
    store: Arc<dyn AuditStore>,
) {
    loop {
        let next = {
            let mut rx = rx.lock().await;
            tokio::select! {
                biased;
                entry = rx.recv() => entry,
                _ = stop.changed() => {
                    // Refuse new entries but keep what is already queued
                    rx.close();
                    rx.recv().await
                }
            }
        };

        let Some(entry) = next else {
            break;
        };

        if let Err(e) = store.insert_audit_entry(&entry).await {
            tracing::error!(
                worker,
                error = %e,
                user_id = %entry.user_id,
                path = %entry.path,
                "failed to write audit entry"
            );
        }
    }

    tracing::debug!(worker, "audit worker stopped");
}
