/// Composite ledger health probe.
///
/// Probes run one after another so their timings do not interfere:
///
/// ```text
/// block height ─▶ chain id ─▶ gas price ─▶ contract code ─▶ block latency ─▶ liveness
/// ```
///
/// Each probe is bounded and a failed probe becomes an entry in `issues`.
/// The report is always returned.
use std::future::Future;
use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};

use crate::chain::LedgerClient;
use crate::error::{AnchorError, Result};

#[derive(Debug, Clone)]
pub struct DiagnosticsConfig {
    /// Bound on each individual probe.
    pub probe_timeout: Duration,
    /// Blocks spanned by the inter-block latency sample.
    pub latency_sample_blocks: u64,
    /// Wait between the two height reads of the liveness check.
    pub liveness_delay: Duration,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            probe_timeout: Duration::from_secs(5),
            latency_sample_blocks: 10,
            liveness_delay: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkDiagnostics {
    pub ledger: String,
    pub connected: bool,
    pub block_number: Option<u64>,
    pub chain_id: Option<u64>,
    /// Wei, as a decimal string.
    pub gas_price: Option<String>,
    pub contract_deployed: Option<bool>,
    pub avg_block_time_secs: Option<f64>,
    /// Height increase observed over `liveness_delay`.
    pub blocks_during_probe: Option<u64>,
    pub issues: Vec<String>,
}

impl NetworkDiagnostics {
    pub fn healthy(&self) -> bool {
        self.issues.is_empty()
    }
}

async fn probe<T>(limit: Duration, fut: impl Future<Output = Result<T>>) -> Result<T> {
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(AnchorError::Connectivity(format!(
            "probe timed out after {}s",
            limit.as_secs()
        ))),
    }
}

pub async fn diagnose_network(
    ledger: &dyn LedgerClient,
    config: &DiagnosticsConfig,
) -> NetworkDiagnostics {
    let limit = config.probe_timeout;
    let mut report = NetworkDiagnostics {
        ledger: ledger.name().to_string(),
        connected: ledger.is_connected().await,
        ..NetworkDiagnostics::default()
    };
    if !report.connected {
        report.issues.push("ledger is not connected".into());
    }

    match probe(limit, ledger.block_number()).await {
        Ok(n) => report.block_number = Some(n),
        Err(e) => report.issues.push(format!("block height unavailable: {e}")),
    }
    match probe(limit, ledger.chain_id()).await {
        Ok(id) => report.chain_id = Some(id),
        Err(e) => report.issues.push(format!("chain id unavailable: {e}")),
    }
    match probe(limit, ledger.gas_price()).await {
        Ok(price) => report.gas_price = Some(price.to_string()),
        Err(e) => report.issues.push(format!("gas price unavailable: {e}")),
    }
    match probe(limit, ledger.contract_code_present()).await {
        Ok(true) => report.contract_deployed = Some(true),
        Ok(false) => {
            report.contract_deployed = Some(false);
            report
                .issues
                .push("no contract code at the configured registry address".into());
        }
        Err(e) => report.issues.push(format!("contract check failed: {e}")),
    }

    // The remaining probes need a starting height
    let Some(height) = report.block_number else {
        warn!(component = "diagnostics", issues = report.issues.len(), "Network diagnostics incomplete");
        return report;
    };

    let span = config.latency_sample_blocks.min(height);
    if span == 0 {
        report
            .issues
            .push("not enough blocks to sample block time".into());
    } else {
        let latest = probe(limit, ledger.block_timestamp(height)).await;
        let earlier = probe(limit, ledger.block_timestamp(height - span)).await;
        match (latest, earlier) {
            (Ok(latest), Ok(earlier)) => {
                report.avg_block_time_secs =
                    Some(latest.saturating_sub(earlier) as f64 / span as f64);
            }
            (Err(e), _) | (_, Err(e)) => {
                report.issues.push(format!("block time sample failed: {e}"))
            }
        }
    }

    tokio::time::sleep(config.liveness_delay).await;
    match probe(limit, ledger.block_number()).await {
        Ok(after) => {
            let delta = after.saturating_sub(height);
            report.blocks_during_probe = Some(delta);
            if delta == 0 {
                report.issues.push(format!(
                    "no new blocks in {}s; the network may not be producing blocks",
                    config.liveness_delay.as_secs()
                ));
            }
        }
        Err(e) => report.issues.push(format!("liveness check failed: {e}")),
    }

    if report.healthy() {
        info!(component = "diagnostics", block = height, "Network diagnostics clean");
    } else {
        warn!(component = "diagnostics", issues = ?report.issues, "Network diagnostics found issues");
    }
    report
}
