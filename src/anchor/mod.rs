/// Anchoring of service records on the ledger.
///
/// The submitter turns a `ServiceRecord` into an anchored proof:
/// 1. Compute the canonical digest (see `canonical`)
/// 2. Submit it to the registry contract
/// 3. Race submission + receipt against a fixed ceiling
/// 4. Persist CONFIRMED (immutable) or REJECTED (editable)
///
/// A submission that misses its ceiling is finalized as REJECTED and its
/// transaction is handed to the `ReceiptWatcher`, which only logs. Late
/// confirmations are folded back in by reconciliation, never by the
/// watcher.
pub mod canonical;
pub mod watcher;

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

use crate::chain::{LedgerClient, ServiceFields, TxReceipt};
use crate::error::{AnchorError, Result};
use crate::state::models::{RecordStatus, ServiceRecord};
use crate::state::RecordStore;
use watcher::ReceiptWatcher;

/// Timeouts for submission and resend checks.
#[derive(Debug, Clone)]
pub struct SubmitterConfig {
    /// Ceiling for `registerHash` submission + receipt.
    pub hash_timeout: Duration,
    /// Ceiling for `registerService` submission + receipt.
    pub service_timeout: Duration,
    /// Ceiling for the existence re-check before resending a CONFIRMED record.
    pub resend_check_timeout: Duration,
    /// How long the watcher keeps waiting for a timed-out receipt.
    pub watch_ceiling: Duration,
}

impl Default for SubmitterConfig {
    fn default() -> Self {
        Self {
            hash_timeout: Duration::from_secs(20),
            service_timeout: Duration::from_secs(25),
            resend_check_timeout: Duration::from_secs(5),
            watch_ceiling: Duration::from_secs(600),
        }
    }
}

/// Which contract call anchors the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum AnchorMode {
    /// `registerHash(digest)` only.
    #[default]
    Hash,
    /// `registerService(...)` for the full struct, then `registerHash(digest)`.
    Service,
}

/// Result of one anchoring attempt, after the record was persisted.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnchorOutcome {
    pub record_id: Uuid,
    pub status: RecordStatus,
    pub blockchain_hash: Option<String>,
    pub transaction_hash: Option<String>,
    pub ledger_service_id: Option<i64>,
    pub block_number: Option<u64>,
    pub timed_out: bool,
    pub error: Option<String>,
}

impl AnchorOutcome {
    pub fn confirmed(&self) -> bool {
        self.status == RecordStatus::Confirmed
    }
}

/// Removes the record from the in-flight set on drop.
struct InFlightGuard<'a> {
    set: &'a Mutex<HashSet<Uuid>>,
    id: Uuid,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.set
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.id);
    }
}

pub struct AnchorSubmitter {
    ledger: Arc<dyn LedgerClient>,
    store: Arc<dyn RecordStore>,
    watcher: ReceiptWatcher,
    config: SubmitterConfig,
    in_flight: Mutex<HashSet<Uuid>>,
}

impl AnchorSubmitter {
    /// Must be called within a Tokio runtime (starts the receipt watcher).
    pub fn new(
        ledger: Arc<dyn LedgerClient>,
        store: Arc<dyn RecordStore>,
        config: SubmitterConfig,
    ) -> Self {
        let watcher = ReceiptWatcher::spawn(ledger.clone(), config.watch_ceiling);
        Self {
            ledger,
            store,
            watcher,
            config,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    pub fn watcher(&self) -> &ReceiptWatcher {
        &self.watcher
    }

    pub fn config(&self) -> &SubmitterConfig {
        &self.config
    }

    /// Advisory per-record lock. Fails fast if another anchor or resend
    /// for the same record is running in this process.
    fn acquire(&self, id: Uuid) -> Result<InFlightGuard<'_>> {
        let mut set = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        if !set.insert(id) {
            return Err(AnchorError::AnchorInFlight(id));
        }
        Ok(InFlightGuard {
            set: &self.in_flight,
            id,
        })
    }

    async fn load(&self, id: Uuid) -> Result<ServiceRecord> {
        self.store
            .find_by_id(id)
            .await?
            .ok_or(AnchorError::RecordNotFound(id))
    }

    /// Anchor a record that has not been confirmed yet.
    ///
    /// Errors only when the record cannot be loaded or saved, or is
    /// already CONFIRMED; ledger failures are reported in the outcome.
    pub async fn anchor(&self, id: Uuid, mode: AnchorMode) -> Result<AnchorOutcome> {
        let _guard = self.acquire(id)?;
        let record = self.load(id).await?;
        if record.status == RecordStatus::Confirmed {
            return Err(AnchorError::NotResendable(id));
        }
        self.run(record, mode).await
    }

    /// Resend a record after checking eligibility (see `can_resend`).
    pub async fn resend(&self, id: Uuid, mode: AnchorMode) -> Result<AnchorOutcome> {
        let _guard = self.acquire(id)?;
        let record = self.load(id).await?;
        if !self.can_resend(&record).await {
            return Err(AnchorError::NotResendable(id));
        }
        info!(component = "anchor", record_id = %id, status = %record.status, "Resending record");
        self.run(record, mode).await
    }

    /// Resend eligibility.
    ///
    /// REJECTED / EXPIRED and records without a real digest are eligible.
    /// A CONFIRMED record is eligible only if the ledger no longer knows
    /// its hash; when that check errors or times out the resend is allowed.
    pub async fn can_resend(&self, record: &ServiceRecord) -> bool {
        if record.status.is_failed() || canonical::needs_hash(record) {
            return true;
        }
        if record.status != RecordStatus::Confirmed {
            return false;
        }

        let Some(hash) = record.blockchain_hash.as_deref() else {
            return true;
        };
        match tokio::time::timeout(self.config.resend_check_timeout, self.ledger.hash_exists(hash))
            .await
        {
            Ok(Ok(exists)) => !exists,
            Ok(Err(e)) => {
                warn!(component = "anchor", record_id = %record.id, error = %e, "Existence check failed, allowing resend");
                true
            }
            Err(_) => {
                warn!(component = "anchor", record_id = %record.id, "Existence check timed out, allowing resend");
                true
            }
        }
    }

    /// Hash, submit, and persist the outcome for one record.
    async fn run(&self, mut record: ServiceRecord, mode: AnchorMode) -> Result<AnchorOutcome> {
        let hash = canonical::rehash(&mut record)?;
        record.mark_pending();
        self.store.save(&record).await?;

        // A record already registered as a service only needs its hash
        let service_step = if mode == AnchorMode::Service && record.ledger_service_id.is_none() {
            let fields = ServiceFields::from_record(&record);
            Some(
                self.submit_bounded(self.config.service_timeout, || {
                    self.ledger.submit_service_record(&fields)
                })
                .await,
            )
        } else {
            None
        };

        let attempt = match service_step {
            Some(Err(e)) => Err(e),
            Some(Ok(service_receipt)) => {
                record.ledger_service_id = service_receipt
                    .ledger_service_id
                    .and_then(|id| i64::try_from(id).ok());
                self.submit_bounded(self.config.hash_timeout, || self.ledger.submit_hash(&hash))
                    .await
            }
            None => {
                self.submit_bounded(self.config.hash_timeout, || self.ledger.submit_hash(&hash))
                    .await
            }
        };

        let outcome = match attempt {
            Ok(receipt) => {
                record.mark_confirmed(&receipt.tx_hash, &self.ledger.signer_identity());
                info!(
                    component = "anchor",
                    record_id = %record.id,
                    tx_hash = %receipt.tx_hash,
                    block = receipt.block_number,
                    "Record anchored"
                );
                self.outcome(&record, Some(receipt.block_number), false, None)
            }
            Err(AnchorError::SubmissionTimeout { tx_hash, after }) => {
                record.mark_rejected();
                if let Some(tx) = tx_hash.clone() {
                    record.transaction_hash = Some(tx.clone());
                    self.watcher.watch(record.id, tx);
                }
                let err = AnchorError::SubmissionTimeout { tx_hash, after };
                warn!(component = "anchor", record_id = %record.id, error = %err, "Anchor timed out");
                self.outcome(&record, None, true, Some(err.to_string()))
            }
            Err(e) => {
                record.mark_rejected();
                warn!(component = "anchor", record_id = %record.id, error = %e, "Anchor failed");
                self.outcome(&record, None, false, Some(e.to_string()))
            }
        };

        self.store.save(&record).await?;
        Ok(outcome)
    }

    /// Race a submission and its receipt against a single deadline.
    ///
    /// Returns within `ceiling` regardless of when the underlying calls
    /// resolve. A timeout carries the tx hash if broadcast had completed.
    pub async fn submit_bounded<F, Fut>(&self, ceiling: Duration, submit: F) -> Result<TxReceipt>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<String>>,
    {
        let deadline = Instant::now() + ceiling;
        let timeout = |tx_hash| AnchorError::SubmissionTimeout {
            tx_hash,
            after: ceiling,
        };

        match tokio::time::timeout_at(deadline, self.ledger.is_connected()).await {
            Ok(true) => {}
            Ok(false) => return Err(AnchorError::LedgerUnavailable),
            Err(_) => return Err(timeout(None)),
        }

        let tx_hash = match tokio::time::timeout_at(deadline, submit()).await {
            Ok(Ok(tx)) => tx,
            Ok(Err(e)) => return Err(e),
            Err(_) => return Err(timeout(None)),
        };

        let remaining = deadline.saturating_duration_since(Instant::now());
        match tokio::time::timeout_at(deadline, self.ledger.wait_for_receipt(&tx_hash, remaining))
            .await
        {
            Ok(Ok(receipt)) => Ok(receipt),
            Ok(Err(AnchorError::SubmissionTimeout { .. })) | Err(_) => Err(timeout(Some(tx_hash))),
            Ok(Err(e)) => Err(e),
        }
    }

    /// Submit the record's stored hash and persist the outcome.
    /// Used by reconciliation for records that already carry a digest.
    /// Shares the in-flight guard with `anchor` and `resend`.
    ///
    /// The stored digest is only reused while it still matches the
    /// record's fields. An editable record whose fields moved on (or that
    /// has no hash timestamp) is rehashed first. An immutable record whose
    /// fields moved on is refused: a new digest would cover content that
    /// was never anchored.
    pub async fn submit_existing(&self, record: &mut ServiceRecord) -> Result<AnchorOutcome> {
        let _guard = self.acquire(record.id)?;
        let stored = record
            .blockchain_hash
            .clone()
            .filter(|h| !canonical::is_placeholder(h))
            .ok_or(AnchorError::NotResendable(record.id))?;

        // `None`: no hash timestamp, so staleness cannot be shown
        let current = canonical::recompute(record)?
            .map(|computed| canonical::hashes_match(&stored, &computed));
        let hash = if current.unwrap_or(record.is_immutable) {
            stored
        } else if record.is_immutable {
            warn!(
                component = "anchor",
                record_id = %record.id,
                "Anchored record no longer matches its hash, refusing to resubmit"
            );
            return Err(AnchorError::NotResendable(record.id));
        } else {
            let hash = canonical::rehash(record)?;
            record.mark_pending();
            self.store.save(record).await?;
            info!(
                component = "anchor",
                record_id = %record.id,
                previous = %stored,
                hash = %hash,
                "Stored hash was stale, rehashed before resubmitting"
            );
            hash
        };

        let outcome = match self
            .submit_bounded(self.config.hash_timeout, || self.ledger.submit_hash(&hash))
            .await
        {
            Ok(receipt) => {
                record.mark_confirmed(&receipt.tx_hash, &self.ledger.signer_identity());
                self.outcome(record, Some(receipt.block_number), false, None)
            }
            Err(AnchorError::SubmissionTimeout { tx_hash, after }) => {
                record.mark_rejected();
                if let Some(tx) = tx_hash.clone() {
                    record.transaction_hash = Some(tx.clone());
                    self.watcher.watch(record.id, tx);
                }
                let err = AnchorError::SubmissionTimeout { tx_hash, after };
                self.outcome(record, None, true, Some(err.to_string()))
            }
            Err(e) => {
                record.mark_rejected();
                self.outcome(record, None, false, Some(e.to_string()))
            }
        };

        self.store.save(record).await?;
        Ok(outcome)
    }

    fn outcome(
        &self,
        record: &ServiceRecord,
        block_number: Option<u64>,
        timed_out: bool,
        error: Option<String>,
    ) -> AnchorOutcome {
        AnchorOutcome {
            record_id: record.id,
            status: record.status,
            blockchain_hash: record.blockchain_hash.clone(),
            transaction_hash: record.transaction_hash.clone(),
            ledger_service_id: record.ledger_service_id,
            block_number,
            timed_out,
            error,
        }
    }
}
