/// JSON-RPC ledger client.
///
/// Talks to an EVM node over raw JSON-RPC for maximum compatibility with
/// permissioned networks (Besu, Quorum, Hardhat, Anvil). Calls to the
/// service-registry contract are ABI-encoded with `alloy::sol!` and
/// transactions are signed locally as legacy transactions.
///
/// Bootstrap detects the chain id with a bounded timeout. On success the
/// connection is pinned to that chain id; on failure it stays unpinned and
/// re-detects the chain id before each signing call. Bootstrap never
/// fails: a dead node yields a client that reports `is_connected() == false`.
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::{Address, Bytes, TxKind, B256, U256};
use alloy::signers::local::PrivateKeySigner;
use alloy::sol_types::{SolCall, SolEvent};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::contract::IServiceRegistry;
use super::{
    parse_quantity, ChainService, ChainStats, LedgerClient, ServiceFields, TxReceipt,
};
use crate::error::{AnchorError, Result};

/// Configuration for the JSON-RPC ledger client.
#[derive(Clone)]
pub struct LedgerConfig {
    /// JSON-RPC endpoint of the permissioned network node.
    pub rpc_url: String,
    /// Expected chain id. Used to warn on mismatch; the detected id wins.
    pub chain_id: Option<u64>,
    /// Private key (hex, with or without 0x prefix) for signing transactions.
    /// In production, this would come from a KMS.
    pub private_key_hex: String,
    /// Address of the deployed service-registry contract.
    pub contract_address: String,
    /// Per-request HTTP timeout.
    pub request_timeout: Duration,
    /// Ceiling on chain-id detection at bootstrap.
    pub bootstrap_timeout: Duration,
    /// Interval between `eth_getTransactionReceipt` polls.
    pub poll_interval: Duration,
    /// Gas limit used when `eth_estimateGas` fails.
    pub default_gas_limit: u64,
}

impl std::fmt::Debug for LedgerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerConfig")
            .field("rpc_url", &self.rpc_url)
            .field("chain_id", &self.chain_id)
            .field("private_key_hex", &"<redacted>")
            .field("contract_address", &self.contract_address)
            .field("request_timeout", &self.request_timeout)
            .field("bootstrap_timeout", &self.bootstrap_timeout)
            .field("poll_interval", &self.poll_interval)
            .field("default_gas_limit", &self.default_gas_limit)
            .finish()
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            rpc_url: "http://127.0.0.1:8545".to_string(),
            chain_id: None,
            private_key_hex: String::new(),
            contract_address: String::new(),
            request_timeout: Duration::from_secs(15),
            bootstrap_timeout: Duration::from_secs(10),
            poll_interval: Duration::from_secs(1),
            default_gas_limit: 500_000,
        }
    }
}

/// Signer plus contract handle, set up once and replaced on re-init.
struct Connection {
    signer: PrivateKeySigner,
    contract: Address,
    /// Pinned chain id. `None` means re-detect per signing call.
    chain_id: Option<u64>,
}

/// JSON-RPC implementation of `LedgerClient`.
pub struct RpcLedgerClient {
    config: LedgerConfig,
    client: Client,
    conn: RwLock<Option<Arc<Connection>>>,
    /// Serializes nonce lookup and broadcast so concurrent submissions
    /// from this process do not reuse a nonce.
    send_lock: Mutex<()>,
    request_id: AtomicU64,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse<T> {
    result: Option<T>,
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcReceipt {
    block_number: Option<String>,
    status: Option<String>,
    gas_used: Option<String>,
    #[serde(default)]
    logs: Vec<RpcLog>,
}

#[derive(Debug, Deserialize)]
struct RpcLog {
    #[serde(default)]
    topics: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RpcTransaction {
    from: String,
    to: Option<String>,
    input: String,
}

#[derive(Debug, Deserialize)]
struct RpcBlock {
    timestamp: String,
}

fn decode_hex(value: &str) -> Result<Vec<u8>> {
    hex::decode(value.trim_start_matches("0x"))
        .map_err(|e| AnchorError::Serialization(format!("invalid hex from node: {e}")))
}

fn parse_hash(hash: &str) -> Result<B256> {
    hash.parse::<B256>()
        .map_err(|e| AnchorError::Serialization(format!("invalid 32-byte hash {hash}: {e}")))
}

fn u256_to_u64(value: U256) -> u64 {
    u64::try_from(value).unwrap_or(u64::MAX)
}

fn quantity(value: &str, what: &str) -> Result<u128> {
    parse_quantity(value).ok_or_else(|| AnchorError::Rpc(format!("invalid {what}: {value}")))
}

/// `ServiceRegistered.serviceId` is indexed, so it arrives as topic 1.
fn service_id_from_logs(logs: &[RpcLog]) -> Option<u64> {
    let signature = format!("{:?}", IServiceRegistry::ServiceRegistered::SIGNATURE_HASH);
    logs.iter()
        .filter(|log| {
            log.topics
                .first()
                .is_some_and(|t| t.eq_ignore_ascii_case(&signature))
        })
        .find_map(|log| log.topics.get(1))
        .and_then(|topic| topic.parse::<B256>().ok())
        .map(|topic| u256_to_u64(U256::from_be_bytes(topic.0)))
}

fn is_revert(e: &AnchorError) -> bool {
    matches!(e, AnchorError::Rpc(msg) if msg.to_lowercase().contains("revert"))
}

impl RpcLedgerClient {
    /// Build a client and run bootstrap. Never fails; see module docs.
    pub async fn connect(config: LedgerConfig) -> Self {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "Failed to build tuned HTTP client, using defaults");
                Client::new()
            });

        let this = Self {
            config,
            client,
            conn: RwLock::new(None),
            send_lock: Mutex::new(()),
            request_id: AtomicU64::new(1),
        };
        this.bootstrap().await;
        this
    }

    /// Parse signer and contract, detect the chain id, install the connection.
    /// Returns whether a connection was installed.
    async fn bootstrap(&self) -> bool {
        let signer: PrivateKeySigner = match self.config.private_key_hex.parse() {
            Ok(s) => s,
            Err(e) => {
                warn!(component = "chain", error = %e, "Invalid ledger signing key, ledger disabled");
                return false;
            }
        };
        let contract: Address = match self.config.contract_address.parse() {
            Ok(a) => a,
            Err(e) => {
                warn!(
                    component = "chain",
                    address = %self.config.contract_address,
                    error = %e,
                    "Invalid contract address, ledger disabled"
                );
                return false;
            }
        };

        let chain_id =
            match tokio::time::timeout(self.config.bootstrap_timeout, self.fetch_chain_id()).await {
                Ok(Ok(id)) => {
                    if let Some(expected) = self.config.chain_id.filter(|e| *e != id) {
                        warn!(
                            component = "chain",
                            expected,
                            detected = id,
                            "Chain id differs from configuration, using detected id"
                        );
                    }
                    info!(component = "chain", chain_id = id, rpc_url = %self.config.rpc_url, "Ledger connected");
                    Some(id)
                }
                Ok(Err(e)) => {
                    warn!(component = "chain", error = %e, "Chain id detection failed, running unpinned");
                    None
                }
                Err(_) => {
                    warn!(
                        component = "chain",
                        timeout_secs = self.config.bootstrap_timeout.as_secs(),
                        "Chain id detection timed out, running unpinned"
                    );
                    None
                }
            };

        *self.conn.write().await = Some(Arc::new(Connection {
            signer,
            contract,
            chain_id,
        }));
        true
    }

    /// Current connection, re-initializing once if it is unset.
    async fn connection(&self) -> Result<Arc<Connection>> {
        if let Some(conn) = self.conn.read().await.as_ref() {
            return Ok(conn.clone());
        }
        debug!(component = "chain", "Connection unset, re-initializing");
        if !self.bootstrap().await {
            return Err(AnchorError::LedgerUnavailable);
        }
        self.conn
            .read()
            .await
            .clone()
            .ok_or(AnchorError::LedgerUnavailable)
    }

    async fn resolve_chain_id(&self, conn: &Connection) -> Result<u64> {
        match conn.chain_id {
            Some(id) => Ok(id),
            None => self.fetch_chain_id().await,
        }
    }

    async fn fetch_chain_id(&self) -> Result<u64> {
        let hex_id: String = self.rpc_call("eth_chainId", serde_json::json!([])).await?;
        Ok(quantity(&hex_id, "chain id")? as u64)
    }

    /// Send a JSON-RPC request whose result may legitimately be null.
    async fn rpc_call_opt<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<Option<T>> {
        let body = serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": self.request_id.fetch_add(1, Ordering::Relaxed),
        });

        let resp: JsonRpcResponse<T> = self
            .client
            .post(&self.config.rpc_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| AnchorError::Connectivity(format!("{method}: {e}")))?
            .json()
            .await
            .map_err(|e| AnchorError::Serialization(format!("RPC response parse error: {e}")))?;

        if let Some(err) = resp.error {
            return Err(AnchorError::Rpc(format!("{method}: {}", err.message)));
        }

        Ok(resp.result)
    }

    /// Send a JSON-RPC request that must return a result.
    async fn rpc_call<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<T> {
        self.rpc_call_opt(method, params)
            .await?
            .ok_or_else(|| AnchorError::Rpc(format!("{method}: empty RPC response")))
    }

    /// Read-only contract call via `eth_call`.
    async fn call_contract(&self, input: Vec<u8>) -> Result<Vec<u8>> {
        let conn = self.connection().await?;
        let out: String = self
            .rpc_call(
                "eth_call",
                serde_json::json!([
                    {
                        "to": format!("{:?}", conn.contract),
                        "data": format!("0x{}", hex::encode(&input)),
                    },
                    "latest"
                ]),
            )
            .await?;
        decode_hex(&out)
    }

    /// Build, sign, and send a contract transaction. Returns the tx hash.
    async fn send_contract_tx(&self, input: Vec<u8>) -> Result<String> {
        use alloy::consensus::{SignableTransaction, TxEnvelope, TxLegacy};
        use alloy::eips::eip2718::Encodable2718;
        use alloy::signers::Signer;

        let conn = self.connection().await?;
        let chain_id = self.resolve_chain_id(&conn).await?;
        let from_address = conn.signer.address();
        let data = format!("0x{}", hex::encode(&input));

        let _guard = self.send_lock.lock().await;

        let nonce_hex: String = self
            .rpc_call(
                "eth_getTransactionCount",
                serde_json::json!([format!("{from_address:?}"), "pending"]),
            )
            .await?;
        let nonce = quantity(&nonce_hex, "nonce")? as u64;

        let gas_price_hex: String = self.rpc_call("eth_gasPrice", serde_json::json!([])).await?;
        let gas_price = quantity(&gas_price_hex, "gas price")?;

        let estimate: Result<String> = self
            .rpc_call(
                "eth_estimateGas",
                serde_json::json!([{
                    "from": format!("{from_address:?}"),
                    "to": format!("{:?}", conn.contract),
                    "data": data,
                }]),
            )
            .await;
        let gas_limit = match estimate {
            // 20% headroom over the estimate
            Ok(hex_gas) => quantity(&hex_gas, "gas estimate")? as u64 * 6 / 5,
            // A revert during estimation means the call would revert on-chain too
            Err(e) if is_revert(&e) => {
                return Err(AnchorError::ContractRejection(e.to_string()));
            }
            Err(e) => {
                debug!(component = "chain", error = %e, "Gas estimation failed, using default limit");
                self.config.default_gas_limit
            }
        };

        let tx = TxLegacy {
            chain_id: Some(chain_id),
            nonce,
            gas_price,
            gas_limit,
            to: TxKind::Call(conn.contract),
            value: U256::ZERO,
            input: Bytes::from(input),
        };

        let sig_hash = tx.signature_hash();
        let sig = conn
            .signer
            .sign_hash(&sig_hash)
            .await
            .map_err(|e| AnchorError::Rpc(format!("transaction signing failed: {e}")))?;

        let signed = TxEnvelope::Legacy(tx.into_signed(sig));

        let mut raw_tx = Vec::new();
        signed.encode_2718(&mut raw_tx);
        let raw_hex = format!("0x{}", hex::encode(&raw_tx));

        let tx_hash: String = self
            .rpc_call("eth_sendRawTransaction", serde_json::json!([raw_hex]))
            .await
            .map_err(|e| {
                if is_revert(&e) {
                    AnchorError::ContractRejection(e.to_string())
                } else {
                    e
                }
            })?;

        debug!(component = "chain", tx_hash = %tx_hash, nonce, gas_limit, "Transaction broadcast");
        Ok(tx_hash)
    }

    /// Replay a reverted transaction with `eth_call` to recover the reason.
    async fn revert_reason(&self, tx_hash: &str, block: Option<&str>) -> String {
        let tx: Result<RpcTransaction> = self
            .rpc_call("eth_getTransactionByHash", serde_json::json!([tx_hash]))
            .await;
        let fallback = format!("transaction {tx_hash} reverted");
        let Ok(tx) = tx else {
            return fallback;
        };

        let replay: Result<String> = self
            .rpc_call(
                "eth_call",
                serde_json::json!([
                    { "from": tx.from, "to": tx.to, "data": tx.input },
                    block.unwrap_or("latest")
                ]),
            )
            .await;

        match replay {
            Err(AnchorError::Rpc(msg)) => msg,
            _ => fallback,
        }
    }

    async fn poll_receipt(&self, tx_hash: &str) -> Result<TxReceipt> {
        loop {
            match self
                .rpc_call_opt::<RpcReceipt>("eth_getTransactionReceipt", serde_json::json!([tx_hash]))
                .await
            {
                Ok(Some(receipt)) => {
                    let block_number = receipt
                        .block_number
                        .as_deref()
                        .and_then(parse_quantity)
                        .unwrap_or_default() as u64;

                    if receipt.status.as_deref() == Some("0x0") {
                        let reason = self
                            .revert_reason(tx_hash, receipt.block_number.as_deref())
                            .await;
                        return Err(AnchorError::ContractRejection(reason));
                    }

                    return Ok(TxReceipt {
                        tx_hash: tx_hash.to_string(),
                        block_number,
                        gas_used: receipt
                            .gas_used
                            .as_deref()
                            .and_then(parse_quantity)
                            .map(|g| g as u64),
                        ledger_service_id: service_id_from_logs(&receipt.logs),
                    });
                }
                Ok(None) => {}
                // Transient node errors while polling are retried until the deadline
                Err(e) => debug!(component = "chain", tx_hash = %tx_hash, error = %e, "Receipt poll failed"),
            }
            tokio::time::sleep(self.config.poll_interval).await;
        }
    }
}

#[async_trait]
impl LedgerClient for RpcLedgerClient {
    fn name(&self) -> &str {
        "json-rpc"
    }

    fn signer_identity(&self) -> String {
        self.config
            .private_key_hex
            .parse::<PrivateKeySigner>()
            .map(|s| format!("{:?}", s.address()))
            .unwrap_or_else(|_| "unknown-signer".to_string())
    }

    async fn ensure_ready(&self) -> Result<()> {
        self.connection().await.map(|_| ())
    }

    async fn is_connected(&self) -> bool {
        if self.ensure_ready().await.is_err() {
            return false;
        }
        matches!(
            tokio::time::timeout(Duration::from_secs(5), self.block_number()).await,
            Ok(Ok(_))
        )
    }

    async fn submit_hash(&self, hash: &str) -> Result<String> {
        let call = IServiceRegistry::registerHashCall {
            hash: parse_hash(hash)?,
        };
        self.send_contract_tx(call.abi_encode()).await
    }

    async fn submit_service_record(&self, fields: &ServiceFields) -> Result<String> {
        let call = IServiceRegistry::registerServiceCall {
            vehicleId: fields.vehicle_id.clone(),
            mileage: U256::from(fields.mileage),
            cost: U256::from(fields.cost_cents),
            description: fields.description.clone(),
            serviceType: fields.service_type.clone(),
        };
        self.send_contract_tx(call.abi_encode()).await
    }

    async fn wait_for_receipt(&self, tx_hash: &str, timeout: Duration) -> Result<TxReceipt> {
        let deadline = Instant::now() + timeout;
        match tokio::time::timeout_at(deadline, self.poll_receipt(tx_hash)).await {
            Ok(result) => result,
            Err(_) => Err(AnchorError::SubmissionTimeout {
                tx_hash: Some(tx_hash.to_string()),
                after: timeout,
            }),
        }
    }

    async fn hash_exists(&self, hash: &str) -> Result<bool> {
        let call = IServiceRegistry::hashExistsCall {
            hash: parse_hash(hash)?,
        };
        let out = self.call_contract(call.abi_encode()).await?;
        IServiceRegistry::hashExistsCall::abi_decode_returns(&out)
            .map_err(|e| AnchorError::Serialization(format!("hashExists decode: {e}")))
    }

    async fn get_service_by_id(&self, id: u64) -> Result<Option<ChainService>> {
        let call = IServiceRegistry::getServiceCall {
            serviceId: U256::from(id),
        };
        let out = match self.call_contract(call.abi_encode()).await {
            Ok(out) => out,
            // The registry reverts on unknown ids
            Err(e) if is_revert(&e) => return Ok(None),
            Err(e) => return Err(e),
        };
        let service = IServiceRegistry::getServiceCall::abi_decode_returns(&out)
            .map_err(|e| AnchorError::Serialization(format!("getService decode: {e}")))?;

        if service.id.is_zero() {
            return Ok(None);
        }

        Ok(Some(ChainService {
            id: u256_to_u64(service.id),
            vehicle_id: service.vehicleId,
            mileage: u256_to_u64(service.mileage),
            cost: u256_to_u64(service.cost),
            description: service.description,
            service_type: service.serviceType,
            service_provider: format!("{:?}", service.serviceProvider),
            timestamp: u256_to_u64(service.timestamp),
            verified: service.verified,
        }))
    }

    async fn get_stats(&self) -> Result<ChainStats> {
        let out = self
            .call_contract(IServiceRegistry::getStatsCall {}.abi_encode())
            .await?;
        let stats = IServiceRegistry::getStatsCall::abi_decode_returns(&out)
            .map_err(|e| AnchorError::Serialization(format!("getStats decode: {e}")))?;

        Ok(ChainStats {
            total_services: u256_to_u64(stats.total),
            verified_services: u256_to_u64(stats.verified),
            balance: stats.balance.to_string(),
        })
    }

    async fn registered_hashes_count(&self) -> Result<u64> {
        let out = self
            .call_contract(IServiceRegistry::getRegisteredHashesCountCall {}.abi_encode())
            .await?;
        let count = IServiceRegistry::getRegisteredHashesCountCall::abi_decode_returns(&out)
            .map_err(|e| AnchorError::Serialization(format!("getRegisteredHashesCount decode: {e}")))?;
        Ok(u256_to_u64(count))
    }

    async fn block_number(&self) -> Result<u64> {
        let hex_block: String = self.rpc_call("eth_blockNumber", serde_json::json!([])).await?;
        Ok(quantity(&hex_block, "block number")? as u64)
    }

    async fn chain_id(&self) -> Result<u64> {
        match self.conn.read().await.as_ref().and_then(|c| c.chain_id) {
            Some(id) => Ok(id),
            None => self.fetch_chain_id().await,
        }
    }

    async fn gas_price(&self) -> Result<u128> {
        let hex_price: String = self.rpc_call("eth_gasPrice", serde_json::json!([])).await?;
        quantity(&hex_price, "gas price")
    }

    async fn contract_code_present(&self) -> Result<bool> {
        let conn = self.connection().await?;
        let code: String = self
            .rpc_call(
                "eth_getCode",
                serde_json::json!([format!("{:?}", conn.contract), "latest"]),
            )
            .await?;
        Ok(!code.trim_start_matches("0x").is_empty())
    }

    async fn block_timestamp(&self, number: u64) -> Result<u64> {
        let block: Option<RpcBlock> = self
            .rpc_call_opt(
                "eth_getBlockByNumber",
                serde_json::json!([format!("0x{number:x}"), false]),
            )
            .await?;
        let block = block.ok_or_else(|| AnchorError::Rpc(format!("block {number} not found")))?;
        Ok(quantity(&block.timestamp, "block timestamp")? as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Hardhat / Anvil account #0.
    const DEV_KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    fn unreachable_config() -> LedgerConfig {
        LedgerConfig {
            // Port 9 (discard) is closed on test hosts, connections fail fast
            rpc_url: "http://127.0.0.1:9".to_string(),
            private_key_hex: DEV_KEY.to_string(),
            contract_address: "0x5FbDB2315678afecb367f032d93F642f64180aa3".to_string(),
            request_timeout: Duration::from_millis(500),
            bootstrap_timeout: Duration::from_millis(500),
            ..LedgerConfig::default()
        }
    }

    #[tokio::test]
    async fn test_bootstrap_degrades_without_node() {
        let client = RpcLedgerClient::connect(unreachable_config()).await;
        // Signer and contract parsed; chain id could not be pinned
        let conn = client.conn.read().await.clone().unwrap();
        assert!(conn.chain_id.is_none());
        assert!(!client.is_connected().await);
    }

    #[tokio::test]
    async fn test_invalid_key_leaves_ledger_unavailable() {
        let config = LedgerConfig {
            private_key_hex: "not-a-key".to_string(),
            ..unreachable_config()
        };
        let client = RpcLedgerClient::connect(config).await;
        assert!(matches!(
            client.ensure_ready().await,
            Err(AnchorError::LedgerUnavailable)
        ));
        assert!(matches!(
            client.submit_hash(&format!("0x{}", "ab".repeat(32))).await,
            Err(AnchorError::LedgerUnavailable)
        ));
    }

    #[tokio::test]
    async fn test_unreachable_calls_return_errors() {
        let client = RpcLedgerClient::connect(unreachable_config()).await;
        let hash = format!("0x{}", "11".repeat(32));
        let err = client.hash_exists(&hash).await.unwrap_err();
        assert!(err.is_connectivity());
    }

    #[test]
    fn test_signer_identity() {
        let client_config = unreachable_config();
        let signer: PrivateKeySigner = client_config.private_key_hex.parse().unwrap();
        assert_eq!(
            format!("{:?}", signer.address()).to_lowercase(),
            "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266"
        );
    }

    #[test]
    fn test_parse_hash_rejects_short_values() {
        assert!(parse_hash("0x1234").is_err());
        assert!(parse_hash(&format!("0x{}", "ff".repeat(32))).is_ok());
    }

    #[test]
    fn test_service_id_from_logs() {
        let signature = format!("{:?}", IServiceRegistry::ServiceRegistered::SIGNATURE_HASH);
        let logs = vec![
            RpcLog {
                topics: vec![format!("0x{}", "00".repeat(32))],
            },
            RpcLog {
                topics: vec![signature, format!("0x{:064x}", 42)],
            },
        ];
        assert_eq!(service_id_from_logs(&logs), Some(42));
        assert_eq!(service_id_from_logs(&[]), None);
    }

    #[test]
    fn test_receipt_deserializes() {
        let json = r#"{
            "blockNumber": "0xa",
            "status": "0x1",
            "gasUsed": "0x5208",
            "logs": []
        }"#;
        let receipt: RpcReceipt = serde_json::from_str(json).unwrap();
        assert_eq!(receipt.block_number.as_deref().and_then(parse_quantity), Some(10));
        assert_eq!(receipt.status.as_deref(), Some("0x1"));
    }
}
