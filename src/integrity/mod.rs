/// Tamper detection for anchored records.
///
/// A record is checked by recomputing its canonical digest from the
/// current field values and comparing it with the stored hash, then
/// asking the ledger whether the stored hash is registered.
///
/// | stored vs computed | on ledger      | status   |
/// |--------------------|----------------|----------|
/// | differ             | any            | VIOLATED |
/// | match              | yes            | VALID    |
/// | match              | no / error     | UNKNOWN  |
///
/// Records that are not CONFIRMED, or have no real hash, are NOT_VERIFIED.
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::anchor::canonical;
use crate::chain::LedgerClient;
use crate::error::{AnchorError, Result};
use crate::state::models::{RecordStatus, ServiceRecord};
use crate::state::RecordStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IntegrityStatus {
    Valid,
    Violated,
    Unknown,
    NotVerified,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrityReport {
    pub record_id: Uuid,
    pub status: IntegrityStatus,
    pub is_valid: bool,
    pub hash_matches: bool,
    pub exists_in_blockchain: bool,
    pub stored_hash: Option<String>,
    pub computed_hash: Option<String>,
    /// Why the status is not VALID, when there is something to say.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl IntegrityReport {
    fn not_verified(record: &ServiceRecord, detail: impl Into<String>) -> Self {
        Self {
            record_id: record.id,
            status: IntegrityStatus::NotVerified,
            is_valid: false,
            hash_matches: false,
            exists_in_blockchain: false,
            stored_hash: record.blockchain_hash.clone(),
            computed_hash: None,
            detail: Some(detail.into()),
        }
    }
}

/// Tally over every CONFIRMED record.
///
/// `total == valid + violated + unknown + not_verified`.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegritySummary {
    pub total: u64,
    pub valid: u64,
    pub violated: u64,
    pub unknown: u64,
    pub not_verified: u64,
    pub reports: Vec<IntegrityReport>,
}

impl IntegritySummary {
    fn push(&mut self, report: IntegrityReport) {
        self.total += 1;
        match report.status {
            IntegrityStatus::Valid => self.valid += 1,
            IntegrityStatus::Violated => self.violated += 1,
            IntegrityStatus::Unknown => self.unknown += 1,
            IntegrityStatus::NotVerified => self.not_verified += 1,
        }
        self.reports.push(report);
    }

    pub fn is_consistent(&self) -> bool {
        self.total == self.valid + self.violated + self.unknown + self.not_verified
    }
}

pub struct IntegrityVerifier {
    ledger: Arc<dyn LedgerClient>,
    store: Arc<dyn RecordStore>,
    query_timeout: Duration,
    concurrency: usize,
}

impl IntegrityVerifier {
    pub fn new(
        ledger: Arc<dyn LedgerClient>,
        store: Arc<dyn RecordStore>,
        query_timeout: Duration,
        concurrency: usize,
    ) -> Self {
        Self {
            ledger,
            store,
            query_timeout,
            concurrency: concurrency.max(1),
        }
    }

    /// Check one record. Errors only when the record cannot be loaded.
    pub async fn verify(&self, id: Uuid) -> Result<IntegrityReport> {
        let record = self
            .store
            .find_by_id(id)
            .await?
            .ok_or(AnchorError::RecordNotFound(id))?;
        Ok(self.check(&record).await)
    }

    /// Check every CONFIRMED record.
    pub async fn verify_all(&self) -> Result<IntegritySummary> {
        let records = self
            .store
            .find_by_status(&[RecordStatus::Confirmed])
            .await?;

        let reports: Vec<IntegrityReport> = stream::iter(records)
            .map(|record| async move { self.check(&record).await })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut summary = IntegritySummary::default();
        for report in reports {
            summary.push(report);
        }
        info!(
            component = "integrity",
            total = summary.total,
            valid = summary.valid,
            violated = summary.violated,
            unknown = summary.unknown,
            not_verified = summary.not_verified,
            "Integrity sweep finished"
        );
        Ok(summary)
    }

    async fn check(&self, record: &ServiceRecord) -> IntegrityReport {
        if record.status != RecordStatus::Confirmed || record.confirmed_at.is_none() {
            return IntegrityReport::not_verified(record, "record is not chain-confirmed");
        }
        let Some(stored) = record
            .blockchain_hash
            .as_deref()
            .filter(|h| !canonical::is_placeholder(h))
        else {
            return IntegrityReport::not_verified(record, "record has no anchored hash");
        };

        let computed = match canonical::recompute(record) {
            Ok(computed) => computed,
            Err(e) => return IntegrityReport::not_verified(record, e.to_string()),
        };
        let exists = self.exists(stored).await;

        let mut report = IntegrityReport {
            record_id: record.id,
            status: IntegrityStatus::Unknown,
            is_valid: false,
            hash_matches: false,
            exists_in_blockchain: matches!(exists, Ok(true)),
            stored_hash: Some(stored.to_string()),
            computed_hash: computed.clone(),
            detail: None,
        };

        let Some(computed) = computed else {
            report.detail = Some("hash timestamp missing, digest cannot be recomputed".into());
            return report;
        };

        report.hash_matches = canonical::hashes_match(stored, &computed);
        match (report.hash_matches, exists) {
            (false, _) => {
                report.status = IntegrityStatus::Violated;
                warn!(
                    component = "integrity",
                    record_id = %record.id,
                    stored = %stored,
                    computed = %computed,
                    "Record content no longer matches its anchored hash"
                );
            }
            (true, Ok(true)) => {
                report.status = IntegrityStatus::Valid;
                report.is_valid = true;
            }
            (true, Ok(false)) => {
                report.detail = Some("hash not found on ledger".into());
            }
            (true, Err(e)) => {
                report.detail = Some(format!("ledger query failed: {e}"));
            }
        }
        report
    }

    async fn exists(&self, hash: &str) -> Result<bool> {
        match tokio::time::timeout(self.query_timeout, self.ledger.hash_exists(hash)).await {
            Ok(result) => result,
            Err(_) => Err(AnchorError::Connectivity(format!(
                "existence query timed out after {}s",
                self.query_timeout.as_secs()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::InMemoryLedger;
    use crate::state::InMemoryRecordStore;
    use chrono::Utc;

    struct Fixture {
        ledger: Arc<InMemoryLedger>,
        store: Arc<InMemoryRecordStore>,
        verifier: IntegrityVerifier,
    }

    fn fixture() -> Fixture {
        let ledger = Arc::new(InMemoryLedger::new());
        let store = Arc::new(InMemoryRecordStore::new());
        let verifier =
            IntegrityVerifier::new(ledger.clone(), store.clone(), Duration::from_secs(5), 4);
        Fixture {
            ledger,
            store,
            verifier,
        }
    }

    fn anchored(ledger: &InMemoryLedger) -> ServiceRecord {
        let mut r = ServiceRecord::new("VIN-I", "OIL_CHANGE", "Synthetic", 50_000, 150.0, Utc::now());
        let hash = canonical::rehash(&mut r).unwrap();
        r.mark_confirmed("0xtx", "signer");
        ledger.insert_hash(&hash);
        r
    }

    #[tokio::test]
    async fn test_unconfirmed_record_not_verified() {
        let f = fixture();
        let mut r = ServiceRecord::new("VIN-I", "OIL_CHANGE", "x", 0, 0.0, Utc::now());
        canonical::rehash(&mut r).unwrap();
        f.store.save(&r).await.unwrap();

        let report = f.verifier.verify(r.id).await.unwrap();
        assert_eq!(report.status, IntegrityStatus::NotVerified);
        assert!(!report.is_valid);
    }

    #[tokio::test]
    async fn test_demoted_record_edit_is_not_tamper() {
        let f = fixture();
        let mut r = anchored(&f.ledger);
        f.ledger.remove_hash(r.blockchain_hash.as_deref().unwrap());
        r.mark_rejected();
        r.description = "Corrected after demotion".into();
        f.store.save(&r).await.unwrap();

        let report = f.verifier.verify(r.id).await.unwrap();
        assert_eq!(report.status, IntegrityStatus::NotVerified);
        assert!(!report.hash_matches);
    }

    #[tokio::test]
    async fn test_stale_confirmation_stamp_is_ignored() {
        let f = fixture();
        let mut r = anchored(&f.ledger);
        // A row written before demotions cleared the stamp
        r.status = RecordStatus::Pending;
        r.is_immutable = false;
        r.can_edit = true;
        f.store.save(&r).await.unwrap();

        let report = f.verifier.verify(r.id).await.unwrap();
        assert_eq!(report.status, IntegrityStatus::NotVerified);
    }

    #[tokio::test]
    async fn test_untouched_record_is_valid() {
        let f = fixture();
        let r = anchored(&f.ledger);
        f.store.save(&r).await.unwrap();

        let report = f.verifier.verify(r.id).await.unwrap();
        assert_eq!(report.status, IntegrityStatus::Valid);
        assert!(report.is_valid && report.hash_matches && report.exists_in_blockchain);
        assert_eq!(report.stored_hash, report.computed_hash);
    }

    #[tokio::test]
    async fn test_tampered_record_is_violated() {
        let f = fixture();
        let mut r = anchored(&f.ledger);
        r.description = "Conventional".into();
        f.store.save(&r).await.unwrap();

        let report = f.verifier.verify(r.id).await.unwrap();
        assert_eq!(report.status, IntegrityStatus::Violated);
        assert!(!report.hash_matches);
        assert!(report.exists_in_blockchain);
        assert!(!report.is_valid);
        assert_ne!(report.stored_hash, report.computed_hash);
    }

    #[tokio::test]
    async fn test_mismatch_wins_over_ledger_failure() {
        let f = fixture();
        let mut r = anchored(&f.ledger);
        r.vehicle_id = "VIN-OTHER".into();
        f.store.save(&r).await.unwrap();
        f.ledger.set_fail_queries(true);

        let report = f.verifier.verify(r.id).await.unwrap();
        assert_eq!(report.status, IntegrityStatus::Violated);
        assert!(!report.exists_in_blockchain);
    }

    #[tokio::test]
    async fn test_match_but_absent_is_unknown() {
        let f = fixture();
        let r = anchored(&f.ledger);
        f.ledger.remove_hash(r.blockchain_hash.as_deref().unwrap());
        f.store.save(&r).await.unwrap();

        let report = f.verifier.verify(r.id).await.unwrap();
        assert_eq!(report.status, IntegrityStatus::Unknown);
        assert!(report.hash_matches);
        assert!(!report.is_valid);

        f.ledger.set_fail_queries(true);
        let report = f.verifier.verify(r.id).await.unwrap();
        assert_eq!(report.status, IntegrityStatus::Unknown);
    }

    #[tokio::test]
    async fn test_missing_record_is_error() {
        let f = fixture();
        assert!(matches!(
            f.verifier.verify(Uuid::now_v7()).await,
            Err(AnchorError::RecordNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_verify_all_tally() {
        let f = fixture();
        let valid = anchored(&f.ledger);
        let mut tampered = anchored(&f.ledger);
        tampered.description = "edited".into();
        let lost = anchored(&f.ledger);
        f.ledger.remove_hash(lost.blockchain_hash.as_deref().unwrap());
        let mut placeholder = anchored(&f.ledger);
        placeholder.blockchain_hash = Some(canonical::ZERO_HASH.into());
        let pending = ServiceRecord::new("VIN-P", "TIRES", "x", 0, 0.0, Utc::now());
        for r in [&valid, &tampered, &lost, &placeholder, &pending] {
            f.store.save(r).await.unwrap();
        }

        let summary = f.verifier.verify_all().await.unwrap();
        assert_eq!(summary.total, 4);
        assert_eq!(summary.valid, 1);
        assert_eq!(summary.violated, 1);
        assert_eq!(summary.unknown, 1);
        assert_eq!(summary.not_verified, 1);
        assert!(summary.is_consistent());
    }

    #[tokio::test]
    async fn test_verify_all_empty() {
        let f = fixture();
        let summary = f.verifier.verify_all().await.unwrap();
        assert_eq!(summary.total, 0);
        assert!(summary.is_consistent());
    }
}
