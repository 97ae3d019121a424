/// Ledger access for anchoring and reconciliation.
///
/// The chain module exposes one trait, `LedgerClient`, over the
/// service-registry contract deployed on a permissioned EVM network:
/// - `rpc`: JSON-RPC client (production)
/// - `memory`: process-local ledger (tests, dev mode)
///
/// Every data operation returns an explicit `Result`. Nothing in this
/// module panics on network failure, and an unreachable node degrades to
/// `AnchorError::LedgerUnavailable` instead of failing process startup.
pub mod contract;
pub mod memory;
pub mod rpc;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::state::models::ServiceRecord;

pub use memory::InMemoryLedger;
pub use rpc::{LedgerConfig, RpcLedgerClient};

/// Receipt of a mined, successful transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxReceipt {
    pub tx_hash: String,
    pub block_number: u64,
    pub gas_used: Option<u64>,
    /// Id emitted by `ServiceRegistered`, for `registerService` transactions.
    pub ledger_service_id: Option<u64>,
}

/// Arguments of `registerService`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceFields {
    pub vehicle_id: String,
    pub mileage: u64,
    /// Cost in minor currency units; the contract stores integers.
    pub cost_cents: u64,
    pub description: String,
    pub service_type: String,
}

impl ServiceFields {
    pub fn from_record(record: &ServiceRecord) -> Self {
        Self {
            vehicle_id: record.vehicle_id.clone(),
            mileage: record.mileage.max(0) as u64,
            cost_cents: (record.cost * 100.0).round().max(0.0) as u64,
            description: record.description.clone(),
            service_type: record.service_type.clone(),
        }
    }
}

/// On-chain service struct returned by `getService`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainService {
    pub id: u64,
    pub vehicle_id: String,
    pub mileage: u64,
    pub cost: u64,
    pub description: String,
    pub service_type: String,
    pub service_provider: String,
    pub timestamp: u64,
    pub verified: bool,
}

/// Aggregate counters returned by `getStats`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainStats {
    pub total_services: u64,
    pub verified_services: u64,
    /// Contract balance in wei, as a decimal string.
    pub balance: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkInfo {
    pub chain_id: u64,
    pub block_number: u64,
    pub gas_price: u128,
}

/// Trait for ledger clients.
///
/// Implementations own their connection state. Callers never reach into
/// a shared global provider; they hold an `Arc<dyn LedgerClient>`.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Human-readable name of this client (e.g., "json-rpc", "in-memory").
    fn name(&self) -> &str;

    /// Identity recorded as `confirmed_by` on records this client anchors.
    fn signer_identity(&self) -> String;

    /// Make sure the connection and contract handle are set up, attempting
    /// one re-initialization if they are not.
    async fn ensure_ready(&self) -> Result<()>;

    /// True when the node answers a cheap liveness query.
    async fn is_connected(&self) -> bool;

    /// Send `registerHash(hash)`. Returns the transaction hash.
    async fn submit_hash(&self, hash: &str) -> Result<String>;

    /// Send `registerService(...)`. Returns the transaction hash; the
    /// ledger-assigned id arrives with the receipt.
    async fn submit_service_record(&self, fields: &ServiceFields) -> Result<String>;

    /// Wait until `tx_hash` is mined or `timeout` elapses.
    ///
    /// Fails with `SubmissionTimeout` on timeout and `ContractRejection`
    /// when the transaction reverted.
    async fn wait_for_receipt(&self, tx_hash: &str, timeout: Duration) -> Result<TxReceipt>;

    async fn hash_exists(&self, hash: &str) -> Result<bool>;

    async fn get_service_by_id(&self, id: u64) -> Result<Option<ChainService>>;

    async fn get_stats(&self) -> Result<ChainStats>;

    /// Total number of hashes ever registered on the contract.
    async fn registered_hashes_count(&self) -> Result<u64>;

    async fn block_number(&self) -> Result<u64>;

    async fn chain_id(&self) -> Result<u64>;

    async fn gas_price(&self) -> Result<u128>;

    /// True when the configured contract address holds deployed code.
    async fn contract_code_present(&self) -> Result<bool>;

    /// Unix timestamp (seconds) of block `number`.
    async fn block_timestamp(&self, number: u64) -> Result<u64>;

    async fn network_info(&self) -> Result<NetworkInfo> {
        Ok(NetworkInfo {
            chain_id: self.chain_id().await?,
            block_number: self.block_number().await?,
            gas_price: self.gas_price().await?,
        })
    }
}

/// Parse a `0x`-prefixed hex quantity as returned by JSON-RPC.
pub(crate) fn parse_quantity(value: &str) -> Option<u128> {
    let digits = value.trim_start_matches("0x");
    if digits.is_empty() {
        return Some(0);
    }
    u128::from_str_radix(digits, 16).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_service_fields_from_record() {
        let record = ServiceRecord::new("VIN9", "TIRES", "Rotation", 50_000, 150.499, Utc::now());
        let fields = ServiceFields::from_record(&record);
        assert_eq!(fields.mileage, 50_000);
        assert_eq!(fields.cost_cents, 15_050);
        assert_eq!(fields.service_type, "TIRES");
    }

    #[test]
    fn test_service_fields_clamp_negative() {
        let record = ServiceRecord::new("VIN9", "TIRES", "Rotation", -5, -1.0, Utc::now());
        let fields = ServiceFields::from_record(&record);
        assert_eq!(fields.mileage, 0);
        assert_eq!(fields.cost_cents, 0);
    }

    #[test]
    fn test_parse_quantity() {
        assert_eq!(parse_quantity("0x10"), Some(16));
        assert_eq!(parse_quantity("0x"), Some(0));
        assert_eq!(parse_quantity("0xzz"), None);
    }
}
