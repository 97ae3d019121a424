/// Late-confirmation watcher.
///
/// When a submission misses its ceiling the record is already finalized as
/// REJECTED. The transaction may still be mined later; the watcher keeps
/// awaiting the original receipt and logs what happens to it.
///
/// Jobs go through an mpsc queue to one supervisor task, which runs each
/// watch in a `JoinSet` and reports task panics instead of propagating
/// them. The watcher holds no record store and cannot change record state.
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::chain::LedgerClient;
use crate::error::AnchorError;

#[derive(Debug, Clone)]
pub struct WatchJob {
    pub record_id: Uuid,
    pub tx_hash: String,
}

#[derive(Debug, Default)]
struct Counters {
    queued: AtomicU64,
    late_confirmed: AtomicU64,
    late_reverted: AtomicU64,
    abandoned: AtomicU64,
    crashed: AtomicU64,
}

/// Snapshot of watcher outcomes, for logs and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WatcherStats {
    pub queued: u64,
    pub late_confirmed: u64,
    pub late_reverted: u64,
    pub abandoned: u64,
    pub crashed: u64,
}

impl WatcherStats {
    pub fn finished(&self) -> u64 {
        self.late_confirmed + self.late_reverted + self.abandoned + self.crashed
    }
}

/// Handle to the supervised watcher queue. Cheap to clone.
#[derive(Clone)]
pub struct ReceiptWatcher {
    jobs: mpsc::UnboundedSender<WatchJob>,
    counters: Arc<Counters>,
}

impl ReceiptWatcher {
    /// Start the supervisor task. Must be called within a Tokio runtime.
    pub fn spawn(ledger: Arc<dyn LedgerClient>, ceiling: Duration) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let counters = Arc::new(Counters::default());
        tokio::spawn(supervise(rx, ledger, ceiling, counters.clone()));
        Self { jobs: tx, counters }
    }

    /// Queue a transaction for late-confirmation logging.
    pub fn watch(&self, record_id: Uuid, tx_hash: String) {
        self.counters.queued.fetch_add(1, Ordering::Relaxed);
        if self.jobs.send(WatchJob { record_id, tx_hash }).is_err() {
            warn!(component = "watcher", record_id = %record_id, "Receipt watcher stopped, job dropped");
            self.counters.abandoned.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn stats(&self) -> WatcherStats {
        WatcherStats {
            queued: self.counters.queued.load(Ordering::Relaxed),
            late_confirmed: self.counters.late_confirmed.load(Ordering::Relaxed),
            late_reverted: self.counters.late_reverted.load(Ordering::Relaxed),
            abandoned: self.counters.abandoned.load(Ordering::Relaxed),
            crashed: self.counters.crashed.load(Ordering::Relaxed),
        }
    }
}

async fn supervise(
    mut rx: mpsc::UnboundedReceiver<WatchJob>,
    ledger: Arc<dyn LedgerClient>,
    ceiling: Duration,
    counters: Arc<Counters>,
) {
    let mut tasks = JoinSet::new();

    loop {
        tokio::select! {
            job = rx.recv() => match job {
                Some(job) => {
                    tasks.spawn(watch_one(ledger.clone(), job, ceiling, counters.clone()));
                }
                None => break,
            },
            Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                report_join(joined, &counters);
            }
        }
    }

    while let Some(joined) = tasks.join_next().await {
        report_join(joined, &counters);
    }
}

fn report_join(joined: Result<(), tokio::task::JoinError>, counters: &Counters) {
    if let Err(e) = joined {
        error!(component = "watcher", error = %e, "Receipt watch task crashed");
        counters.crashed.fetch_add(1, Ordering::Relaxed);
    }
}

async fn watch_one(
    ledger: Arc<dyn LedgerClient>,
    job: WatchJob,
    ceiling: Duration,
    counters: Arc<Counters>,
) {
    // Outer bound in case the client ignores its own timeout
    let result = tokio::time::timeout(
        ceiling + Duration::from_secs(1),
        ledger.wait_for_receipt(&job.tx_hash, ceiling),
    )
    .await;

    match result {
        Ok(Ok(receipt)) => {
            info!(
                component = "watcher",
                record_id = %job.record_id,
                tx_hash = %job.tx_hash,
                block = receipt.block_number,
                "Late confirmation after timeout; record status left unchanged, reconciliation will pick it up"
            );
            counters.late_confirmed.fetch_add(1, Ordering::Relaxed);
        }
        Ok(Err(AnchorError::ContractRejection(reason))) => {
            warn!(
                component = "watcher",
                record_id = %job.record_id,
                tx_hash = %job.tx_hash,
                reason = %reason,
                "Timed-out transaction later reverted"
            );
            counters.late_reverted.fetch_add(1, Ordering::Relaxed);
        }
        Ok(Err(e)) => {
            warn!(
                component = "watcher",
                record_id = %job.record_id,
                tx_hash = %job.tx_hash,
                error = %e,
                "Gave up waiting for late receipt"
            );
            counters.abandoned.fetch_add(1, Ordering::Relaxed);
        }
        Err(_) => {
            warn!(
                component = "watcher",
                record_id = %job.record_id,
                tx_hash = %job.tx_hash,
                "Late receipt watch exceeded its ceiling"
            );
            counters.abandoned.fetch_add(1, Ordering::Relaxed);
        }
    }
}
