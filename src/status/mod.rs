/// Externally visible anchoring status.
///
/// Local record state and ledger state are folded into one of four
/// values a client can act on. A failed local status always wins.
pub mod diagnostics;

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::anchor::canonical;
use crate::chain::LedgerClient;
use crate::state::models::{RecordStatus, ServiceRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ExternalStatus {
    Pending,
    Submitted,
    Confirmed,
    Failed,
}

/// Map local status, hash presence and the ledger's answer (`None` when
/// it was not asked or could not answer) to an external status.
pub fn map_status(local: RecordStatus, hash_present: bool, on_chain: Option<bool>) -> ExternalStatus {
    if local.is_failed() {
        return ExternalStatus::Failed;
    }
    match (local, hash_present, on_chain) {
        (_, false, _) => ExternalStatus::Pending,
        (_, true, Some(true)) => ExternalStatus::Confirmed,
        // Anchored locally but gone from the ledger: awaiting reconciliation
        (RecordStatus::Confirmed, true, Some(false)) => ExternalStatus::Submitted,
        (RecordStatus::Confirmed, true, None) => ExternalStatus::Confirmed,
        _ => ExternalStatus::Submitted,
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceStatus {
    pub record_id: Uuid,
    pub status: ExternalStatus,
    pub local_status: RecordStatus,
    pub blockchain_hash: Option<String>,
    pub transaction_hash: Option<String>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub is_immutable: bool,
    /// `None` when the ledger could not be asked.
    pub exists_in_blockchain: Option<bool>,
}

/// Build the status of one record, asking the ledger when it has a hash.
pub async fn service_status(
    ledger: &dyn LedgerClient,
    record: &ServiceRecord,
    query_timeout: Duration,
) -> ServiceStatus {
    let hash = record
        .blockchain_hash
        .as_deref()
        .filter(|h| !canonical::is_placeholder(h));

    let on_chain = match hash {
        Some(hash) => match tokio::time::timeout(query_timeout, ledger.hash_exists(hash)).await {
            Ok(Ok(exists)) => Some(exists),
            _ => None,
        },
        None => None,
    };

    ServiceStatus {
        record_id: record.id,
        status: map_status(record.status, hash.is_some(), on_chain),
        local_status: record.status,
        blockchain_hash: record.blockchain_hash.clone(),
        transaction_hash: record.transaction_hash.clone(),
        confirmed_at: record.confirmed_at,
        is_immutable: record.is_immutable,
        exists_in_blockchain: on_chain,
    }
}
