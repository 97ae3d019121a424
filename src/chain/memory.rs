/// Process-local ledger.
///
/// Implements `LedgerClient` with the registry contract's semantics held
/// in memory. Transactions are mined when their receipt is awaited, after
/// the configured receipt delay. Used by tests and `--ledger memory`.
///
/// Failure knobs let callers simulate an unreachable node, slow
/// confirmation, reverts and flaky existence queries.
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use alloy::primitives::keccak256;
use async_trait::async_trait;

use super::{ChainService, ChainStats, LedgerClient, ServiceFields, TxReceipt};
use crate::error::{AnchorError, Result};

const GENESIS_TIMESTAMP: u64 = 1_700_000_000;
const BLOCK_TIME_SECS: u64 = 2;

#[derive(Debug, Clone)]
enum PendingTx {
    Hash(String),
    Service(ServiceFields),
    Reverted(String),
}

#[derive(Debug, Default)]
struct LedgerState {
    block_number: u64,
    hashes: HashSet<String>,
    services: BTreeMap<u64, ChainService>,
    pending: HashMap<String, PendingTx>,
    mined: HashMap<String, std::result::Result<TxReceipt, String>>,
    queued_tx_hashes: VecDeque<String>,
    tx_counter: u64,
}

pub struct InMemoryLedger {
    state: Mutex<LedgerState>,
    connected: AtomicBool,
    fail_submissions: AtomicBool,
    revert_submissions: AtomicBool,
    fail_queries: AtomicBool,
    receipt_delay: Mutex<Duration>,
    chain_id: u64,
    identity: String,
}

impl Default for InMemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(LedgerState::default()),
            connected: AtomicBool::new(true),
            fail_submissions: AtomicBool::new(false),
            revert_submissions: AtomicBool::new(false),
            fail_queries: AtomicBool::new(false),
            receipt_delay: Mutex::new(Duration::ZERO),
            chain_id: 1337,
            identity: "0x00000000000000000000000000000000000000aa".to_string(),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, LedgerState> {
        // A poisoned lock only means a test thread panicked mid-update
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    pub fn set_fail_submissions(&self, fail: bool) {
        self.fail_submissions.store(fail, Ordering::SeqCst);
    }

    pub fn set_revert_submissions(&self, revert: bool) {
        self.revert_submissions.store(revert, Ordering::SeqCst);
    }

    pub fn set_fail_queries(&self, fail: bool) {
        self.fail_queries.store(fail, Ordering::SeqCst);
    }

    pub fn set_receipt_delay(&self, delay: Duration) {
        *self.receipt_delay.lock().unwrap_or_else(|e| e.into_inner()) = delay;
    }

    pub fn set_block_number(&self, block: u64) {
        self.state().block_number = block;
    }

    /// Produce `n` empty blocks.
    pub fn advance_blocks(&self, n: u64) {
        self.state().block_number += n;
    }

    /// Use `tx_hash` for the next submitted transaction.
    pub fn queue_tx_hash(&self, tx_hash: impl Into<String>) {
        self.state().queued_tx_hashes.push_back(tx_hash.into());
    }

    /// Register a hash directly, as if mined earlier.
    pub fn insert_hash(&self, hash: &str) {
        self.state().hashes.insert(hash.to_lowercase());
    }

    /// Drop a hash, as after a ledger reset.
    pub fn remove_hash(&self, hash: &str) {
        self.state().hashes.remove(&hash.to_lowercase());
    }

    pub fn contains_hash(&self, hash: &str) -> bool {
        self.state().hashes.contains(&hash.to_lowercase())
    }

    fn delay(&self) -> Duration {
        *self.receipt_delay.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn check_connected(&self) -> Result<()> {
        if self.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(AnchorError::LedgerUnavailable)
        }
    }

    fn check_queries(&self) -> Result<()> {
        self.check_connected()?;
        if self.fail_queries.load(Ordering::SeqCst) {
            return Err(AnchorError::Rpc("eth_call: internal error".into()));
        }
        Ok(())
    }

    fn enqueue(&self, tx: PendingTx) -> Result<String> {
        self.check_connected()?;
        if self.fail_submissions.load(Ordering::SeqCst) {
            return Err(AnchorError::Rpc(
                "eth_sendRawTransaction: replacement transaction underpriced".into(),
            ));
        }

        let tx = if self.revert_submissions.load(Ordering::SeqCst) {
            PendingTx::Reverted("execution reverted: registry paused".into())
        } else {
            tx
        };

        let mut state = self.state();
        state.tx_counter += 1;
        let tx_hash = match state.queued_tx_hashes.pop_front() {
            Some(h) => h,
            None => {
                let seed = format!("tx:{}:{:?}", state.tx_counter, tx);
                format!("0x{}", hex::encode(keccak256(seed.as_bytes())))
            }
        };
        state.pending.insert(tx_hash.clone(), tx);
        Ok(tx_hash)
    }

    /// Apply a pending transaction in a new block.
    fn mine(&self, tx_hash: &str) -> Option<std::result::Result<TxReceipt, String>> {
        let mut state = self.state();
        if let Some(done) = state.mined.get(tx_hash) {
            return Some(done.clone());
        }
        let tx = state.pending.remove(tx_hash)?;
        state.block_number += 1;
        let block_number = state.block_number;

        let outcome = match tx {
            PendingTx::Reverted(reason) => Err(reason),
            PendingTx::Hash(hash) => {
                if state.hashes.insert(hash) {
                    Ok(TxReceipt {
                        tx_hash: tx_hash.to_string(),
                        block_number,
                        gas_used: Some(45_000),
                        ledger_service_id: None,
                    })
                } else {
                    Err("execution reverted: hash already registered".to_string())
                }
            }
            PendingTx::Service(fields) => {
                let id = state.services.len() as u64 + 1;
                state.services.insert(
                    id,
                    ChainService {
                        id,
                        vehicle_id: fields.vehicle_id,
                        mileage: fields.mileage,
                        cost: fields.cost_cents,
                        description: fields.description,
                        service_type: fields.service_type,
                        service_provider: self.identity.clone(),
                        timestamp: GENESIS_TIMESTAMP + block_number * BLOCK_TIME_SECS,
                        verified: false,
                    },
                );
                Ok(TxReceipt {
                    tx_hash: tx_hash.to_string(),
                    block_number,
                    gas_used: Some(180_000),
                    ledger_service_id: Some(id),
                })
            }
        };
        state.mined.insert(tx_hash.to_string(), outcome.clone());
        Some(outcome)
    }
}

#[async_trait]
impl LedgerClient for InMemoryLedger {
    fn name(&self) -> &str {
        "in-memory"
    }

    fn signer_identity(&self) -> String {
        self.identity.clone()
    }

    async fn ensure_ready(&self) -> Result<()> {
        self.check_connected()
    }

    async fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn submit_hash(&self, hash: &str) -> Result<String> {
        self.enqueue(PendingTx::Hash(hash.to_lowercase()))
    }

    async fn submit_service_record(&self, fields: &ServiceFields) -> Result<String> {
        self.enqueue(PendingTx::Service(fields.clone()))
    }

    async fn wait_for_receipt(&self, tx_hash: &str, timeout: Duration) -> Result<TxReceipt> {
        let delay = self.delay();
        if delay > timeout {
            tokio::time::sleep(timeout).await;
            return Err(AnchorError::SubmissionTimeout {
                tx_hash: Some(tx_hash.to_string()),
                after: timeout,
            });
        }
        tokio::time::sleep(delay).await;

        match self.mine(tx_hash) {
            Some(Ok(receipt)) => Ok(receipt),
            Some(Err(reason)) => Err(AnchorError::ContractRejection(reason)),
            None => Err(AnchorError::Rpc(format!("unknown transaction {tx_hash}"))),
        }
    }

    async fn hash_exists(&self, hash: &str) -> Result<bool> {
        self.check_queries()?;
        Ok(self.contains_hash(hash))
    }

    async fn get_service_by_id(&self, id: u64) -> Result<Option<ChainService>> {
        self.check_queries()?;
        Ok(self.state().services.get(&id).cloned())
    }

    async fn get_stats(&self) -> Result<ChainStats> {
        self.check_queries()?;
        let state = self.state();
        Ok(ChainStats {
            total_services: state.services.len() as u64,
            verified_services: state.services.values().filter(|s| s.verified).count() as u64,
            balance: "0".to_string(),
        })
    }

    async fn registered_hashes_count(&self) -> Result<u64> {
        self.check_queries()?;
        Ok(self.state().hashes.len() as u64)
    }

    async fn block_number(&self) -> Result<u64> {
        self.check_connected()?;
        Ok(self.state().block_number)
    }

    async fn chain_id(&self) -> Result<u64> {
        self.check_connected()?;
        Ok(self.chain_id)
    }

    async fn gas_price(&self) -> Result<u128> {
        self.check_connected()?;
        Ok(0)
    }

    async fn contract_code_present(&self) -> Result<bool> {
        self.check_connected()?;
        Ok(true)
    }

    async fn block_timestamp(&self, number: u64) -> Result<u64> {
        self.check_connected()?;
        if number > self.state().block_number {
            return Err(AnchorError::Rpc(format!("block {number} not found")));
        }
        Ok(GENESIS_TIMESTAMP + number * BLOCK_TIME_SECS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hash(byte: u8) -> String {
        format!("0x{}", hex::encode([byte; 32]))
    }

    #[tokio::test]
    async fn test_submit_and_mine_hash() {
        let ledger = InMemoryLedger::new();
        ledger.set_block_number(9);
        ledger.queue_tx_hash("0xabc");

        let tx = ledger.submit_hash(&hash(1)).await.unwrap();
        assert_eq!(tx, "0xabc");
        assert!(!ledger.hash_exists(&hash(1)).await.unwrap());

        let receipt = ledger
            .wait_for_receipt(&tx, Duration::from_secs(20))
            .await
            .unwrap();
        assert_eq!(receipt.block_number, 10);
        assert!(ledger.hash_exists(&hash(1)).await.unwrap());
        assert_eq!(ledger.registered_hashes_count().await.unwrap(), 1);

        // Receipts are stable once mined
        let again = ledger
            .wait_for_receipt(&tx, Duration::from_secs(20))
            .await
            .unwrap();
        assert_eq!(again, receipt);
    }

    #[tokio::test]
    async fn test_duplicate_hash_reverts() {
        let ledger = InMemoryLedger::new();
        ledger.insert_hash(&hash(2));
        let tx = ledger.submit_hash(&hash(2)).await.unwrap();
        let err = ledger
            .wait_for_receipt(&tx, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, AnchorError::ContractRejection(ref r) if r.contains("already registered")));
    }

    #[tokio::test]
    async fn test_service_registration_assigns_id() {
        let ledger = InMemoryLedger::new();
        let fields = ServiceFields {
            vehicle_id: "VIN1".into(),
            mileage: 50_000,
            cost_cents: 15_000,
            description: "Oil".into(),
            service_type: "OIL_CHANGE".into(),
        };
        let tx = ledger.submit_service_record(&fields).await.unwrap();
        let receipt = ledger
            .wait_for_receipt(&tx, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(receipt.ledger_service_id, Some(1));

        let service = ledger.get_service_by_id(1).await.unwrap().unwrap();
        assert_eq!(service.vehicle_id, "VIN1");
        assert_eq!(service.cost, 15_000);
        assert!(ledger.get_service_by_id(2).await.unwrap().is_none());
        assert_eq!(ledger.get_stats().await.unwrap().total_services, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_receipt_times_out() {
        let ledger = InMemoryLedger::new();
        ledger.set_receipt_delay(Duration::from_secs(60));
        let tx = ledger.submit_hash(&hash(3)).await.unwrap();
        let err = ledger
            .wait_for_receipt(&tx, Duration::from_secs(20))
            .await
            .unwrap_err();
        assert!(matches!(err, AnchorError::SubmissionTimeout { .. }));
        assert!(!ledger.contains_hash(&hash(3)));
    }

    #[tokio::test]
    async fn test_disconnected_ledger() {
        let ledger = InMemoryLedger::new();
        ledger.set_connected(false);
        assert!(!ledger.is_connected().await);
        assert!(matches!(
            ledger.submit_hash(&hash(4)).await,
            Err(AnchorError::LedgerUnavailable)
        ));
        assert!(ledger.network_info().await.is_err());
    }
}
