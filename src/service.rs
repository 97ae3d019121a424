/// Facade consumed by the HTTP layer, the CLI and the surrounding
/// application.
///
/// Wires one ledger client and one record store into the submitter,
/// reconciliation engine and integrity verifier. Every method returns a
/// structured result; ledger failures never surface as raw errors.
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

use crate::anchor::{canonical, AnchorMode, AnchorOutcome, AnchorSubmitter, SubmitterConfig};
use crate::chain::{ChainService, ChainStats, LedgerClient};
use crate::error::{AnchorError, Result};
use crate::integrity::{IntegrityReport, IntegritySummary, IntegrityVerifier};
use crate::reconcile::{ReconcileConfig, ReconcileOperation, ReconcileReport, ReconciliationEngine};
use crate::state::models::RecordStatus;
use crate::state::RecordStore;
use crate::status::diagnostics::{self, DiagnosticsConfig, NetworkDiagnostics};
use crate::status::{map_status, service_status, ExternalStatus, ServiceStatus};

/// Result of `submit_service_to_blockchain`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionOutcome {
    pub success: bool,
    pub transaction_hash: Option<String>,
    pub status: ExternalStatus,
    pub error: Option<String>,
}

impl SubmissionOutcome {
    fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            transaction_hash: None,
            status: ExternalStatus::Failed,
            error: Some(error.into()),
        }
    }

    fn from_outcome(outcome: &AnchorOutcome) -> Self {
        let hash_present = outcome
            .blockchain_hash
            .as_deref()
            .is_some_and(|h| !canonical::is_placeholder(h));
        let on_chain = outcome.confirmed().then_some(true);
        Self {
            success: outcome.confirmed(),
            transaction_hash: outcome.transaction_hash.clone(),
            status: map_status(outcome.status, hash_present, on_chain),
            error: outcome.error.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkHealth {
    pub status: HealthStatus,
    pub ledger: String,
    pub block_number: Option<u64>,
    pub chain_id: Option<u64>,
    /// Wei, as a decimal string.
    pub gas_price: Option<String>,
    pub error: Option<String>,
}

pub struct AnchorService {
    ledger: Arc<dyn LedgerClient>,
    store: Arc<dyn RecordStore>,
    submitter: Arc<AnchorSubmitter>,
    reconciler: Arc<ReconciliationEngine>,
    integrity: IntegrityVerifier,
    diagnostics: DiagnosticsConfig,
    mode: AnchorMode,
    query_timeout: Duration,
}

impl AnchorService {
    /// Must be called within a Tokio runtime (starts the receipt watcher).
    pub fn new(
        ledger: Arc<dyn LedgerClient>,
        store: Arc<dyn RecordStore>,
        submitter_config: SubmitterConfig,
        reconcile_config: ReconcileConfig,
    ) -> Self {
        let query_timeout = reconcile_config.query_timeout;
        let submitter = Arc::new(AnchorSubmitter::new(
            ledger.clone(),
            store.clone(),
            submitter_config,
        ));
        let integrity = IntegrityVerifier::new(
            ledger.clone(),
            store.clone(),
            query_timeout,
            reconcile_config.concurrency,
        );
        let reconciler = Arc::new(ReconciliationEngine::new(
            ledger.clone(),
            store.clone(),
            submitter.clone(),
            reconcile_config,
        ));

        Self {
            ledger,
            store,
            submitter,
            reconciler,
            integrity,
            diagnostics: DiagnosticsConfig::default(),
            mode: AnchorMode::default(),
            query_timeout,
        }
    }

    pub fn with_mode(mut self, mode: AnchorMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_diagnostics(mut self, config: DiagnosticsConfig) -> Self {
        self.diagnostics = config;
        self
    }

    pub fn mode(&self) -> AnchorMode {
        self.mode
    }

    pub fn ledger(&self) -> &Arc<dyn LedgerClient> {
        &self.ledger
    }

    pub fn submitter(&self) -> &Arc<AnchorSubmitter> {
        &self.submitter
    }

    pub fn reconciler(&self) -> &Arc<ReconciliationEngine> {
        &self.reconciler
    }

    /// Anchor a record and report the result in external terms.
    ///
    /// An already CONFIRMED record is reported as a success without a new
    /// submission.
    pub async fn submit_service_to_blockchain(&self, id: Uuid) -> SubmissionOutcome {
        match self.store.find_by_id(id).await {
            Ok(Some(record)) if record.status == RecordStatus::Confirmed => {
                return SubmissionOutcome {
                    success: true,
                    transaction_hash: record.transaction_hash,
                    status: ExternalStatus::Confirmed,
                    error: None,
                };
            }
            Ok(Some(_)) => {}
            Ok(None) => return SubmissionOutcome::failed(AnchorError::RecordNotFound(id).to_string()),
            Err(e) => return SubmissionOutcome::failed(e.to_string()),
        }

        match self.submitter.anchor(id, self.mode).await {
            Ok(outcome) => SubmissionOutcome::from_outcome(&outcome),
            Err(e) => SubmissionOutcome::failed(e.to_string()),
        }
    }

    /// Anchor with full detail. Errors for missing, in-flight or
    /// already CONFIRMED records.
    pub async fn anchor(&self, id: Uuid) -> Result<AnchorOutcome> {
        self.submitter.anchor(id, self.mode).await
    }

    pub async fn resend(&self, id: Uuid) -> Result<AnchorOutcome> {
        self.submitter.resend(id, self.mode).await
    }

    /// Fire-and-forget anchoring for the record-creation path.
    pub fn anchor_in_background(self: &Arc<Self>, id: Uuid) -> JoinHandle<()> {
        let service = self.clone();
        tokio::spawn(async move {
            match service.submitter.anchor(id, service.mode).await {
                Ok(outcome) if outcome.confirmed() => {
                    info!(component = "service", record_id = %id, "Background anchor confirmed");
                }
                Ok(outcome) => {
                    warn!(
                        component = "service",
                        record_id = %id,
                        status = %outcome.status,
                        error = outcome.error.as_deref().unwrap_or_default(),
                        "Background anchor did not confirm"
                    );
                }
                Err(e) => {
                    warn!(component = "service", record_id = %id, error = %e, "Background anchor failed");
                }
            }
        })
    }

    pub async fn get_service_status(&self, id: Uuid) -> Result<ServiceStatus> {
        let record = self
            .store
            .find_by_id(id)
            .await?
            .ok_or(AnchorError::RecordNotFound(id))?;
        Ok(service_status(self.ledger.as_ref(), &record, self.query_timeout).await)
    }

    pub async fn get_network_health(&self) -> NetworkHealth {
        let mut health = NetworkHealth {
            status: HealthStatus::Unhealthy,
            ledger: self.ledger.name().to_string(),
            block_number: None,
            chain_id: None,
            gas_price: None,
            error: None,
        };

        if !self.ledger.is_connected().await {
            health.error = Some(AnchorError::LedgerUnavailable.to_string());
            return health;
        }

        match tokio::time::timeout(self.query_timeout, self.ledger.network_info()).await {
            Ok(Ok(info)) => {
                health.status = HealthStatus::Healthy;
                health.block_number = Some(info.block_number);
                health.chain_id = Some(info.chain_id);
                health.gas_price = Some(info.gas_price.to_string());
            }
            Ok(Err(e)) => health.error = Some(e.to_string()),
            Err(_) => health.error = Some("network info timed out".into()),
        }
        health
    }

    pub async fn verify_service_integrity(&self, id: Uuid) -> Result<IntegrityReport> {
        self.integrity.verify(id).await
    }

    pub async fn verify_all_services_integrity(&self) -> Result<IntegritySummary> {
        self.integrity.verify_all().await
    }

    pub async fn diagnose(&self) -> NetworkDiagnostics {
        diagnostics::diagnose_network(self.ledger.as_ref(), &self.diagnostics).await
    }

    /// Service struct registered under `ledger_id`, if any.
    pub async fn ledger_service(&self, ledger_id: u64) -> Result<Option<ChainService>> {
        self.ledger.get_service_by_id(ledger_id).await
    }

    pub async fn ledger_stats(&self) -> Result<ChainStats> {
        self.ledger.get_stats().await
    }

    pub async fn reconcile(&self, op: ReconcileOperation) -> Result<ReconcileReport> {
        self.reconciler.run(op).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::InMemoryLedger;
    use crate::state::models::ServiceRecord;
    use crate::state::InMemoryRecordStore;
    use chrono::Utc;

    struct Fixture {
        ledger: Arc<InMemoryLedger>,
        store: Arc<InMemoryRecordStore>,
        service: Arc<AnchorService>,
    }

    fn fixture() -> Fixture {
        let ledger = Arc::new(InMemoryLedger::new());
        let store = Arc::new(InMemoryRecordStore::new());
        let service = Arc::new(AnchorService::new(
            ledger.clone(),
            store.clone(),
            SubmitterConfig::default(),
            ReconcileConfig::default(),
        ));
        Fixture {
            ledger,
            store,
            service,
        }
    }

    async fn seed(store: &InMemoryRecordStore) -> ServiceRecord {
        let record = ServiceRecord::new("VIN-F", "OIL_CHANGE", "Oil", 50_000, 150.0, Utc::now());
        store.save(&record).await.unwrap();
        record
    }

    #[tokio::test]
    async fn test_submission_success() {
        let f = fixture();
        f.ledger.set_block_number(9);
        f.ledger.queue_tx_hash("0xabc123");
        let record = seed(&f.store).await;

        let outcome = f.service.submit_service_to_blockchain(record.id).await;
        assert!(outcome.success);
        assert_eq!(outcome.status, ExternalStatus::Confirmed);
        assert_eq!(outcome.transaction_hash.as_deref(), Some("0xabc123"));

        // Repeat submissions report the existing anchor
        let again = f.service.submit_service_to_blockchain(record.id).await;
        assert!(again.success);
        assert_eq!(again.transaction_hash.as_deref(), Some("0xabc123"));
    }

    #[tokio::test]
    async fn test_submission_with_ledger_down() {
        let f = fixture();
        f.ledger.set_connected(false);
        let record = seed(&f.store).await;

        let outcome = f.service.submit_service_to_blockchain(record.id).await;
        assert!(!outcome.success);
        assert_eq!(outcome.status, ExternalStatus::Failed);
        assert_eq!(outcome.error.as_deref(), Some("ledger unavailable"));

        let stored = f.store.find_by_id(record.id).await.unwrap().unwrap();
        assert_eq!(stored.status, RecordStatus::Rejected);
        assert!(stored.can_edit);
    }

    #[tokio::test]
    async fn test_submission_for_unknown_record() {
        let f = fixture();
        let outcome = f.service.submit_service_to_blockchain(Uuid::now_v7()).await;
        assert!(!outcome.success);
        assert!(outcome.error.unwrap().contains("not found"));
    }

    #[tokio::test]
    async fn test_background_anchor() {
        let f = fixture();
        let record = seed(&f.store).await;

        f.service.anchor_in_background(record.id).await.unwrap();
        let status = f.service.get_service_status(record.id).await.unwrap();
        assert_eq!(status.status, ExternalStatus::Confirmed);
        assert_eq!(status.exists_in_blockchain, Some(true));
    }

    #[tokio::test]
    async fn test_network_health() {
        let f = fixture();
        f.ledger.set_block_number(42);
        let health = f.service.get_network_health().await;
        assert_eq!(health.status, HealthStatus::Healthy);
        assert_eq!(health.block_number, Some(42));
        assert_eq!(health.gas_price.as_deref(), Some("0"));

        f.ledger.set_connected(false);
        let health = f.service.get_network_health().await;
        assert_eq!(health.status, HealthStatus::Unhealthy);
        assert_eq!(health.block_number, None);
    }

    #[tokio::test]
    async fn test_service_mode_exposes_ledger_entry() {
        let ledger = Arc::new(InMemoryLedger::new());
        let store = Arc::new(InMemoryRecordStore::new());
        let service = AnchorService::new(
            ledger.clone(),
            store.clone(),
            SubmitterConfig::default(),
            ReconcileConfig::default(),
        )
        .with_mode(AnchorMode::Service);
        let record = seed(&store).await;

        let outcome = service.anchor(record.id).await.unwrap();
        let ledger_id = outcome.ledger_service_id.unwrap() as u64;
        let entry = service.ledger_service(ledger_id).await.unwrap().unwrap();
        assert_eq!(entry.vehicle_id, "VIN-F");
        assert_eq!(service.ledger_stats().await.unwrap().total_services, 1);
    }

    #[tokio::test]
    async fn test_integrity_through_facade() {
        let f = fixture();
        let record = seed(&f.store).await;
        f.service.anchor(record.id).await.unwrap();

        let report = f.service.verify_service_integrity(record.id).await.unwrap();
        assert!(report.is_valid);
        let summary = f.service.verify_all_services_integrity().await.unwrap();
        assert_eq!(summary.valid, 1);
    }
}
