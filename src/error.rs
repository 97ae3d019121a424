use std::time::Duration;

use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum AnchorError {
    #[error("ledger unavailable")]
    LedgerUnavailable,

    #[error("RPC connection failed: {0}")]
    Connectivity(String),

    #[error("no receipt within {}s{}", .after.as_secs(), .tx_hash.as_deref().map(|h| format!(" for {h}")).unwrap_or_default())]
    SubmissionTimeout {
        tx_hash: Option<String>,
        after: Duration,
    },

    #[error("contract rejected transaction: {0}")]
    ContractRejection(String),

    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("record store error: {0}")]
    Store(String),

    #[error("service record not found: {0}")]
    RecordNotFound(Uuid),

    #[error("record {0} is not eligible for resend")]
    NotResendable(Uuid),

    #[error("an anchor submission is already in flight for record {0}")]
    AnchorInFlight(Uuid),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AnchorError {
    /// True for failures caused by the ledger being unreachable rather than
    /// by anything the ledger said.
    pub fn is_connectivity(&self) -> bool {
        matches!(self, Self::LedgerUnavailable | Self::Connectivity(_))
    }
}

impl From<serde_json::Error> for AnchorError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AnchorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ledger_unavailable_message() {
        assert_eq!(AnchorError::LedgerUnavailable.to_string(), "ledger unavailable");
    }

    #[test]
    fn test_timeout_message_includes_tx() {
        let err = AnchorError::SubmissionTimeout {
            tx_hash: Some("0xabc".into()),
            after: Duration::from_secs(20),
        };
        assert_eq!(err.to_string(), "no receipt within 20s for 0xabc");

        let err = AnchorError::SubmissionTimeout {
            tx_hash: None,
            after: Duration::from_secs(25),
        };
        assert_eq!(err.to_string(), "no receipt within 25s");
    }

    #[test]
    fn test_is_connectivity() {
        assert!(AnchorError::LedgerUnavailable.is_connectivity());
        assert!(AnchorError::Connectivity("refused".into()).is_connectivity());
        assert!(!AnchorError::ContractRejection("revert".into()).is_connectivity());
    }
}
