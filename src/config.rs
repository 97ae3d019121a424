/// Process configuration.
///
/// Read once from the environment at startup. Outside production every
/// ledger setting falls back to the well-known local devnet values; in
/// production a missing ledger setting is a startup error.
use std::net::SocketAddr;
use std::time::Duration;

use crate::anchor::{AnchorMode, SubmitterConfig};
use crate::chain::LedgerConfig;
use crate::error::{AnchorError, Result};
use crate::reconcile::ReconcileConfig;

/// Account #0 of the standard local development node. Never funded on a
/// real network.
pub const DEV_PRIVATE_KEY: &str =
    "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

/// First contract deployed by the dev account on a fresh devnet.
pub const DEV_CONTRACT_ADDRESS: &str = "0x5FbDB2315678afecb367f032d93F642f64180aa3";

pub const DEV_RPC_URL: &str = "http://127.0.0.1:8545";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    fn parse(value: Option<&str>) -> Result<Self> {
        match value.map(str::to_ascii_lowercase).as_deref() {
            None | Some("") | Some("development") | Some("dev") | Some("test") => {
                Ok(Self::Development)
            }
            Some("production") | Some("prod") => Ok(Self::Production),
            Some(other) => Err(AnchorError::Config(format!("unknown APP_ENV: {other}"))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: Environment,
    /// PostgreSQL URL; the in-memory record store is used when unset.
    pub database_url: Option<String>,
    pub listen_addr: SocketAddr,
    pub ledger: LedgerConfig,
    pub submitter: SubmitterConfig,
    pub reconcile: ReconcileConfig,
    /// Contract call used when anchoring new records.
    pub anchor_mode: AnchorMode,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let environment = Environment::parse(get("APP_ENV").as_deref())?;

        let ledger_setting = |key: &str, dev_default: &str| -> Result<String> {
            match (get(key), environment) {
                (Some(v), _) => Ok(v),
                (None, Environment::Development) => Ok(dev_default.to_string()),
                (None, Environment::Production) => {
                    Err(AnchorError::Config(format!("{key} must be set in production")))
                }
            }
        };

        let ledger = LedgerConfig {
            rpc_url: ledger_setting("RPC_URL", DEV_RPC_URL)?,
            chain_id: get("CHAIN_ID").map(|v| parse_num("CHAIN_ID", &v)).transpose()?,
            private_key_hex: ledger_setting("PRIVATE_KEY", DEV_PRIVATE_KEY)?,
            contract_address: ledger_setting("CONTRACT_ADDRESS", DEV_CONTRACT_ADDRESS)?,
            ..LedgerConfig::default()
        };

        let listen_addr = get("LISTEN_ADDR")
            .unwrap_or_else(|| "0.0.0.0:8080".to_string())
            .parse()
            .map_err(|e| AnchorError::Config(format!("invalid LISTEN_ADDR: {e}")))?;

        let mut reconcile = ReconcileConfig::default();
        if let Some(secs) = get("RECONCILE_INTERVAL_SECS") {
            reconcile.interval = Duration::from_secs(parse_num("RECONCILE_INTERVAL_SECS", &secs)?);
        }
        if let Some(hours) = get("STALE_AFTER_HOURS") {
            reconcile.stale_after =
                Duration::from_secs(parse_num("STALE_AFTER_HOURS", &hours)? * 60 * 60);
        }
        if reconcile.interval.is_zero() {
            return Err(AnchorError::Config(
                "RECONCILE_INTERVAL_SECS must be positive".into(),
            ));
        }

        let anchor_mode = match get("ANCHOR_MODE") {
            Some(mode) => <AnchorMode as clap::ValueEnum>::from_str(&mode, true)
                .map_err(|e| AnchorError::Config(format!("invalid ANCHOR_MODE: {e}")))?,
            None => AnchorMode::default(),
        };

        Ok(Self {
            environment,
            database_url: get("DATABASE_URL"),
            listen_addr,
            ledger,
            submitter: SubmitterConfig::default(),
            reconcile,
            anchor_mode,
        })
    }
}

fn parse_num(key: &str, value: &str) -> Result<u64> {
    value
        .trim()
        .parse()
        .map_err(|e| AnchorError::Config(format!("invalid {key}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<AppConfig> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn test_dev_defaults() {
        let cfg = config(&[]).unwrap();
        assert_eq!(cfg.environment, Environment::Development);
        assert_eq!(cfg.ledger.rpc_url, DEV_RPC_URL);
        assert_eq!(cfg.ledger.private_key_hex, DEV_PRIVATE_KEY);
        assert_eq!(cfg.ledger.contract_address, DEV_CONTRACT_ADDRESS);
        assert_eq!(cfg.ledger.chain_id, None);
        assert!(cfg.database_url.is_none());
        assert_eq!(cfg.reconcile.interval, Duration::from_secs(15 * 60));
    }

    #[test]
    fn test_production_requires_ledger_settings() {
        let err = config(&[("APP_ENV", "production"), ("RPC_URL", "http://node:8545")]).unwrap_err();
        assert!(err.to_string().contains("PRIVATE_KEY"));

        let cfg = config(&[
            ("APP_ENV", "production"),
            ("RPC_URL", "http://node:8545"),
            ("PRIVATE_KEY", "0x01"),
            ("CONTRACT_ADDRESS", "0x00000000000000000000000000000000000000cc"),
            ("CHAIN_ID", "1337"),
        ])
        .unwrap();
        assert_eq!(cfg.environment, Environment::Production);
        assert_eq!(cfg.ledger.chain_id, Some(1337));
    }

    #[test]
    fn test_overrides_and_validation() {
        let cfg = config(&[
            ("RECONCILE_INTERVAL_SECS", "30"),
            ("STALE_AFTER_HOURS", "2"),
            ("LISTEN_ADDR", "127.0.0.1:9000"),
            ("DATABASE_URL", "postgres://localhost/maintenance"),
        ])
        .unwrap();
        assert_eq!(cfg.reconcile.interval, Duration::from_secs(30));
        assert_eq!(cfg.reconcile.stale_after, Duration::from_secs(7_200));
        assert_eq!(cfg.listen_addr.port(), 9000);
        assert!(cfg.database_url.is_some());
        assert_eq!(cfg.anchor_mode, AnchorMode::Hash);

        let cfg = config(&[("ANCHOR_MODE", "SERVICE")]).unwrap();
        assert_eq!(cfg.anchor_mode, AnchorMode::Service);
        assert!(config(&[("ANCHOR_MODE", "batch")]).is_err());

        assert!(config(&[("CHAIN_ID", "abc")]).is_err());
        assert!(config(&[("RECONCILE_INTERVAL_SECS", "0")]).is_err());
        assert!(config(&[("APP_ENV", "staging")]).is_err());
    }
}
