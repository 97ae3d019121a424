/// Reconciliation of local record state against the ledger.
///
/// Every operation follows the same shape:
/// 1. Load a working set from the record store (the only hard failure)
/// 2. Process each record with its own error handling
/// 3. Return counters; one bad record never aborts the batch
///
/// ```text
/// store ──▶ working set ──▶ hash_exists (fan-out) ──▶ transition ──▶ save
/// ```
///
/// Existence queries run with bounded concurrency. Writes are applied
/// sequentially as the query results arrive.
pub mod dates;

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::anchor::{canonical, AnchorOutcome, AnchorSubmitter};
use crate::chain::LedgerClient;
use crate::error::{AnchorError, Result};
use crate::state::models::{RecordStatus, ServiceRecord};
use crate::state::RecordStore;

#[derive(Debug, Clone)]
pub struct ReconcileConfig {
    /// Maximum concurrent existence queries.
    pub concurrency: usize,
    /// Per-query bound on `hash_exists`.
    pub query_timeout: Duration,
    /// PENDING records older than this are expired.
    pub stale_after: Duration,
    /// Period of `run_periodic`.
    pub interval: Duration,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            concurrency: 8,
            query_timeout: Duration::from_secs(10),
            stale_after: Duration::from_secs(24 * 60 * 60),
            interval: Duration::from_secs(15 * 60),
        }
    }
}

/// Batch operations exposed over HTTP and the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ReconcileOperation {
    VerifyAll,
    FixInvalidHashes,
    FixFailingHashes,
    RegisterAllExistingHashes,
    CleanOrphanHashes,
    FixIncorrectDates,
    ExpireStalePending,
}

impl ReconcileOperation {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::VerifyAll => "verify-all",
            Self::FixInvalidHashes => "fix-invalid-hashes",
            Self::FixFailingHashes => "fix-failing-hashes",
            Self::RegisterAllExistingHashes => "register-all-existing-hashes",
            Self::CleanOrphanHashes => "clean-orphan-hashes",
            Self::FixIncorrectDates => "fix-incorrect-dates",
            Self::ExpireStalePending => "expire-stale-pending",
        }
    }
}

/// Counters shared by every batch report.
///
/// `success_count + error_count <= total_processed`; the remainder were
/// skipped or needed no change.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchCounters {
    pub total_processed: u64,
    pub success_count: u64,
    pub error_count: u64,
}

impl BatchCounters {
    fn new(total: usize) -> Self {
        Self {
            total_processed: total as u64,
            ..Self::default()
        }
    }

    pub fn is_consistent(&self) -> bool {
        self.success_count + self.error_count <= self.total_processed
    }
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyAllReport {
    #[serde(flatten)]
    pub counters: BatchCounters,
    pub promoted: u64,
    pub demoted: u64,
    pub unchanged: u64,
    /// Hashed records holding a placeholder value; see `fix_invalid_hashes`.
    pub placeholders: u64,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RepairReport {
    #[serde(flatten)]
    pub counters: BatchCounters,
    pub fixed_count: u64,
    /// Already on the ledger, nothing submitted.
    pub skipped: u64,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrphanReport {
    #[serde(flatten)]
    pub counters: BatchCounters,
    pub local_distinct: u64,
    pub ledger_total: u64,
    /// `ledger_total - local_distinct`. Positive means the ledger holds
    /// hashes no local record accounts for.
    pub gap: i64,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DateFixReport {
    #[serde(flatten)]
    pub counters: BatchCounters,
    pub service_dates_fixed: u64,
    pub created_dates_fixed: u64,
    /// Out-of-window records left alone because they are anchored.
    pub skipped_immutable: u64,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpireReport {
    #[serde(flatten)]
    pub counters: BatchCounters,
    pub expired: u64,
}

/// Report of any operation, as returned by `run`.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ReconcileReport {
    Verify(VerifyAllReport),
    Repair(RepairReport),
    Orphans(OrphanReport),
    Dates(DateFixReport),
    Expire(ExpireReport),
}

impl ReconcileReport {
    pub fn counters(&self) -> &BatchCounters {
        match self {
            Self::Verify(r) => &r.counters,
            Self::Repair(r) => &r.counters,
            Self::Orphans(r) => &r.counters,
            Self::Dates(r) => &r.counters,
            Self::Expire(r) => &r.counters,
        }
    }
}

pub struct ReconciliationEngine {
    ledger: Arc<dyn LedgerClient>,
    store: Arc<dyn RecordStore>,
    submitter: Arc<AnchorSubmitter>,
    config: ReconcileConfig,
}

impl ReconciliationEngine {
    pub fn new(
        ledger: Arc<dyn LedgerClient>,
        store: Arc<dyn RecordStore>,
        submitter: Arc<AnchorSubmitter>,
        config: ReconcileConfig,
    ) -> Self {
        Self {
            ledger,
            store,
            submitter,
            config,
        }
    }

    pub fn config(&self) -> &ReconcileConfig {
        &self.config
    }

    /// Dispatch one operation by name.
    pub async fn run(&self, op: ReconcileOperation) -> Result<ReconcileReport> {
        info!(component = "reconcile", operation = op.as_str(), "Reconciliation started");
        let report = match op {
            ReconcileOperation::VerifyAll => ReconcileReport::Verify(self.verify_all().await?),
            ReconcileOperation::FixInvalidHashes => {
                ReconcileReport::Repair(self.fix_invalid_hashes().await?)
            }
            ReconcileOperation::FixFailingHashes => {
                ReconcileReport::Repair(self.fix_failing_hashes().await?)
            }
            ReconcileOperation::RegisterAllExistingHashes => {
                ReconcileReport::Repair(self.register_all_existing_hashes().await?)
            }
            ReconcileOperation::CleanOrphanHashes => {
                ReconcileReport::Orphans(self.clean_orphan_hashes().await?)
            }
            ReconcileOperation::FixIncorrectDates => {
                ReconcileReport::Dates(self.fix_incorrect_dates().await?)
            }
            ReconcileOperation::ExpireStalePending => {
                ReconcileReport::Expire(self.expire_stale_pending(self.config.stale_after).await?)
            }
        };
        let counters = report.counters();
        info!(
            component = "reconcile",
            operation = op.as_str(),
            total = counters.total_processed,
            success = counters.success_count,
            errors = counters.error_count,
            "Reconciliation finished"
        );
        Ok(report)
    }

    /// Hashed records split into (real digests, placeholder count).
    async fn load_real_hashed(&self) -> Result<(Vec<ServiceRecord>, u64)> {
        let (real, placeholders): (Vec<_>, Vec<_>) = self
            .store
            .find_hashed()
            .await?
            .into_iter()
            .partition(|r| canonical::has_real_hash(r));
        Ok((real, placeholders.len() as u64))
    }

    /// Query ledger existence for each record, `concurrency` at a time.
    async fn check_existence(
        &self,
        records: Vec<ServiceRecord>,
    ) -> Vec<(ServiceRecord, Result<bool>)> {
        let ledger = &self.ledger;
        let limit = self.config.query_timeout;

        stream::iter(records)
            .map(|record| async move {
                let result = match record.blockchain_hash.as_deref() {
                    Some(hash) => match tokio::time::timeout(limit, ledger.hash_exists(hash)).await {
                        Ok(result) => result,
                        Err(_) => Err(AnchorError::Connectivity(format!(
                            "existence query timed out after {}s",
                            limit.as_secs()
                        ))),
                    },
                    None => Ok(false),
                };
                (record, result)
            })
            .buffer_unordered(self.config.concurrency.max(1))
            .collect()
            .await
    }

    /// Align every hashed record's status with the ledger.
    ///
    /// Present on-chain and not CONFIRMED → CONFIRMED. Absent and
    /// CONFIRMED → REJECTED. Anything else is left as is.
    pub async fn verify_all(&self) -> Result<VerifyAllReport> {
        let (records, placeholders) = self.load_real_hashed().await?;
        let mut report = VerifyAllReport {
            counters: BatchCounters::new(records.len()),
            placeholders,
            ..VerifyAllReport::default()
        };
        let confirmed_by = self.ledger.signer_identity();

        for (mut record, exists) in self.check_existence(records).await {
            let exists = match exists {
                Ok(exists) => exists,
                Err(e) => {
                    warn!(component = "reconcile", record_id = %record.id, error = %e, "Existence check failed");
                    report.counters.error_count += 1;
                    continue;
                }
            };

            let promote = exists && record.status != RecordStatus::Confirmed;
            let demote = !exists && record.status == RecordStatus::Confirmed;
            if !promote && !demote {
                report.unchanged += 1;
                report.counters.success_count += 1;
                continue;
            }

            let previous = record.status;
            if promote {
                record.mark_confirmed_by_reconciliation(&confirmed_by);
            } else {
                record.mark_rejected();
            }

            match self.store.save(&record).await {
                Ok(()) => {
                    info!(
                        component = "reconcile",
                        record_id = %record.id,
                        from = %previous,
                        to = %record.status,
                        "Record status reconciled"
                    );
                    report.counters.success_count += 1;
                    if promote {
                        report.promoted += 1;
                    } else {
                        report.demoted += 1;
                    }
                }
                Err(e) => {
                    error!(component = "reconcile", record_id = %record.id, error = %e, "Failed to save reconciled record");
                    report.counters.error_count += 1;
                }
            }
        }

        Ok(report)
    }

    /// Replace placeholder hashes with real digests and anchor them.
    pub async fn fix_invalid_hashes(&self) -> Result<RepairReport> {
        let records: Vec<_> = self
            .store
            .find_hashed()
            .await?
            .into_iter()
            .filter(canonical::needs_hash)
            .collect();
        let mut report = RepairReport {
            counters: BatchCounters::new(records.len()),
            ..RepairReport::default()
        };

        for mut record in records {
            let result = self.rehash_and_submit(&mut record).await;
            self.tally_repair(&mut report, record.id, result);
        }

        Ok(report)
    }

    async fn rehash_and_submit(&self, record: &mut ServiceRecord) -> Result<AnchorOutcome> {
        let previous = record.blockchain_hash.clone().unwrap_or_default();
        let hash = canonical::rehash(record)?;
        record.mark_pending();
        self.store.save(record).await?;
        info!(
            component = "reconcile",
            record_id = %record.id,
            previous = %previous,
            hash = %hash,
            "Replaced placeholder hash"
        );
        self.submitter.submit_existing(record).await
    }

    /// Resubmit records whose anchor attempt is over but whose hash is
    /// missing from the ledger (CONFIRMED, REJECTED or EXPIRED). PENDING
    /// records are skipped since they may still be in flight.
    pub async fn fix_failing_hashes(&self) -> Result<RepairReport> {
        let (records, _) = self.load_real_hashed().await?;
        let records: Vec<_> = records
            .into_iter()
            .filter(|r| r.status != RecordStatus::Pending)
            .collect();
        self.submit_missing(records).await
    }

    /// Submit every real hash the ledger does not know yet, whatever the
    /// record's status.
    pub async fn register_all_existing_hashes(&self) -> Result<RepairReport> {
        let (records, _) = self.load_real_hashed().await?;
        self.submit_missing(records).await
    }

    async fn submit_missing(&self, records: Vec<ServiceRecord>) -> Result<RepairReport> {
        let mut report = RepairReport {
            counters: BatchCounters::new(records.len()),
            ..RepairReport::default()
        };

        for (mut record, exists) in self.check_existence(records).await {
            match exists {
                Ok(true) => report.skipped += 1,
                Ok(false) => {
                    let result = self.submitter.submit_existing(&mut record).await;
                    self.tally_repair(&mut report, record.id, result);
                }
                Err(e) => {
                    warn!(component = "reconcile", record_id = %record.id, error = %e, "Existence check failed");
                    report.counters.error_count += 1;
                }
            }
        }

        Ok(report)
    }

    fn tally_repair(&self, report: &mut RepairReport, id: Uuid, result: Result<AnchorOutcome>) {
        match result {
            Ok(outcome) if outcome.confirmed() => {
                report.fixed_count += 1;
                report.counters.success_count += 1;
            }
            Ok(outcome) => {
                warn!(
                    component = "reconcile",
                    record_id = %id,
                    error = outcome.error.as_deref().unwrap_or("not confirmed"),
                    "Resubmission did not confirm"
                );
                report.counters.error_count += 1;
            }
            Err(e) => {
                warn!(component = "reconcile", record_id = %id, error = %e, "Resubmission failed");
                report.counters.error_count += 1;
            }
        }
    }

    /// Compare distinct local hashes with the ledger's registered count.
    ///
    /// Reports the difference only. The registry cannot enumerate its
    /// keys, so individual orphans cannot be identified or removed.
    pub async fn clean_orphan_hashes(&self) -> Result<OrphanReport> {
        let (records, _) = self.load_real_hashed().await?;
        let mut report = OrphanReport {
            counters: BatchCounters::new(records.len()),
            ..OrphanReport::default()
        };

        let mut distinct: Vec<String> = records
            .iter()
            .filter_map(|r| r.blockchain_hash.as_deref())
            .map(str::to_lowercase)
            .collect();
        distinct.sort_unstable();
        distinct.dedup();
        report.local_distinct = distinct.len() as u64;

        match self.ledger.registered_hashes_count().await {
            Ok(total) => {
                report.ledger_total = total;
                report.gap = total as i64 - report.local_distinct as i64;
                report.counters.success_count = report.counters.total_processed;
                if report.gap != 0 {
                    warn!(
                        component = "reconcile",
                        local = report.local_distinct,
                        ledger = total,
                        gap = report.gap,
                        "Local and ledger hash counts differ"
                    );
                }
            }
            Err(e) => {
                warn!(component = "reconcile", error = %e, "Could not read ledger hash count");
                report.counters.error_count = report.counters.total_processed;
            }
        }

        Ok(report)
    }

    /// Normalize out-of-window service dates and future creation dates.
    ///
    /// CONFIRMED records are not touched: `service_date` is part of the
    /// anchored digest. An editable record with a real digest is rehashed
    /// when its `service_date` moves, so a later resubmission anchors the
    /// corrected content.
    pub async fn fix_incorrect_dates(&self) -> Result<DateFixReport> {
        let records = self.store.find_all().await?;
        let mut report = DateFixReport {
            counters: BatchCounters::new(records.len()),
            ..DateFixReport::default()
        };
        let now = chrono::Utc::now();

        for record in records {
            let mut fixed = record.clone();
            let fix = dates::normalize(&mut fixed, now);
            if !fix.any() {
                continue;
            }
            if record.is_immutable {
                report.skipped_immutable += 1;
                continue;
            }
            if fix.service_date && canonical::has_real_hash(&fixed) {
                if let Err(e) = canonical::rehash(&mut fixed) {
                    error!(component = "reconcile", record_id = %fixed.id, error = %e, "Failed to rehash date fix");
                    report.counters.error_count += 1;
                    continue;
                }
            }

            match self.store.save(&fixed).await {
                Ok(()) => {
                    info!(
                        component = "reconcile",
                        record_id = %fixed.id,
                        service_date = fix.service_date,
                        created_at = fix.created_at,
                        "Normalized record dates"
                    );
                    report.counters.success_count += 1;
                    report.service_dates_fixed += u64::from(fix.service_date);
                    report.created_dates_fixed += u64::from(fix.created_at);
                }
                Err(e) => {
                    error!(component = "reconcile", record_id = %fixed.id, error = %e, "Failed to save date fix");
                    report.counters.error_count += 1;
                }
            }
        }

        Ok(report)
    }

    /// Mark PENDING records created more than `stale_after` ago as EXPIRED.
    pub async fn expire_stale_pending(&self, stale_after: Duration) -> Result<ExpireReport> {
        let records = self.store.find_by_status(&[RecordStatus::Pending]).await?;
        let mut report = ExpireReport {
            counters: BatchCounters::new(records.len()),
            ..ExpireReport::default()
        };
        let max_age = chrono::Duration::from_std(stale_after)
            .map_err(|e| AnchorError::Config(format!("stale_after out of range: {e}")))?;
        let cutoff = chrono::Utc::now() - max_age;

        for mut record in records.into_iter().filter(|r| r.created_at < cutoff) {
            record.mark_expired();
            match self.store.save(&record).await {
                Ok(()) => {
                    info!(component = "reconcile", record_id = %record.id, "Expired stale pending record");
                    report.expired += 1;
                    report.counters.success_count += 1;
                }
                Err(e) => {
                    error!(component = "reconcile", record_id = %record.id, error = %e, "Failed to expire record");
                    report.counters.error_count += 1;
                }
            }
        }

        Ok(report)
    }

    /// Run `verify_all` then `expire_stale_pending` every `interval` until
    /// `shutdown` flips to true or its sender is dropped.
    pub async fn run_periodic(&self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!(component = "reconcile", interval_secs = interval.as_secs(), "Periodic reconciliation started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.run(ReconcileOperation::VerifyAll).await {
                        error!(component = "reconcile", error = %e, "Periodic verify failed");
                    }
                    if let Err(e) = self.run(ReconcileOperation::ExpireStalePending).await {
                        error!(component = "reconcile", error = %e, "Periodic expiry failed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!(component = "reconcile", "Periodic reconciliation stopped");
    }
}
