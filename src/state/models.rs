/// Database models for maintenance-anchor.
///
/// `ServiceRecord` maps directly to the `service_records` table and is
/// used for both reading and writing via sqlx.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Local anchoring status of a service record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "record_status", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum RecordStatus {
    Pending,
    Confirmed,
    Rejected,
    Expired,
}

impl RecordStatus {
    /// REJECTED and EXPIRED records can always be edited and resent.
    pub fn is_failed(self) -> bool {
        matches!(self, Self::Rejected | Self::Expired)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Confirmed => "CONFIRMED",
            Self::Rejected => "REJECTED",
            Self::Expired => "EXPIRED",
        }
    }
}

impl std::fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A vehicle-maintenance event and its anchoring state.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceRecord {
    pub id: Uuid,
    pub vehicle_id: String,
    pub service_type: String,
    pub description: String,
    pub mileage: i64,
    pub cost: f64,
    pub service_date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    pub status: RecordStatus,
    /// 0x-prefixed keccak-256 of the canonical record, or a placeholder.
    pub blockchain_hash: Option<String>,
    /// Canonical timestamp folded into `blockchain_hash`.
    pub hash_timestamp: Option<DateTime<Utc>>,
    /// Receipt id of the submission that confirmed (or last attempted) the anchor.
    pub transaction_hash: Option<String>,
    /// Id assigned by `registerService`, when the full struct was registered.
    pub ledger_service_id: Option<i64>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub confirmed_by: Option<String>,
    pub is_immutable: bool,
    pub can_edit: bool,
}

impl ServiceRecord {
    /// A freshly created record: PENDING, editable, no hash yet.
    pub fn new(
        vehicle_id: impl Into<String>,
        service_type: impl Into<String>,
        description: impl Into<String>,
        mileage: i64,
        cost: f64,
        service_date: DateTime<Utc>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            vehicle_id: vehicle_id.into(),
            service_type: service_type.into(),
            description: description.into(),
            mileage,
            cost,
            service_date,
            created_at: now,
            updated_at: now,
            status: RecordStatus::Pending,
            blockchain_hash: None,
            hash_timestamp: None,
            transaction_hash: None,
            ledger_service_id: None,
            confirmed_at: None,
            confirmed_by: None,
            is_immutable: false,
            can_edit: true,
        }
    }

    pub fn mark_confirmed(&mut self, tx_hash: &str, confirmed_by: &str) {
        let now = Utc::now();
        self.status = RecordStatus::Confirmed;
        self.transaction_hash = Some(tx_hash.to_string());
        self.confirmed_at = Some(now);
        self.confirmed_by = Some(confirmed_by.to_string());
        self.is_immutable = true;
        self.can_edit = false;
        self.updated_at = now;
    }

    /// Promote to CONFIRMED after finding the hash on-chain during
    /// reconciliation. Keeps the transaction hash of the last attempt.
    pub fn mark_confirmed_by_reconciliation(&mut self, confirmed_by: &str) {
        let now = Utc::now();
        self.status = RecordStatus::Confirmed;
        self.confirmed_at = Some(now);
        self.confirmed_by = Some(confirmed_by.to_string());
        self.is_immutable = true;
        self.can_edit = false;
        self.updated_at = now;
    }

    pub fn mark_rejected(&mut self) {
        self.leave_confirmed(RecordStatus::Rejected);
    }

    pub fn mark_expired(&mut self) {
        self.leave_confirmed(RecordStatus::Expired);
    }

    pub fn mark_pending(&mut self) {
        self.leave_confirmed(RecordStatus::Pending);
    }

    /// Any non-CONFIRMED status drops the confirmation stamp; an editable
    /// record must never look chain-confirmed.
    fn leave_confirmed(&mut self, status: RecordStatus) {
        self.status = status;
        self.confirmed_at = None;
        self.confirmed_by = None;
        self.is_immutable = false;
        self.can_edit = true;
        self.updated_at = Utc::now();
    }

    /// `is_immutable ⇔ CONFIRMED ⇔ ¬can_edit`.
    pub fn invariants_hold(&self) -> bool {
        let confirmed = self.status == RecordStatus::Confirmed;
        self.is_immutable == confirmed && self.can_edit != confirmed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> ServiceRecord {
        ServiceRecord::new("VIN123", "OIL_CHANGE", "Synthetic oil", 50_000, 150.0, Utc::now())
    }

    #[test]
    fn test_new_record_is_pending_and_editable() {
        let r = record();
        assert_eq!(r.status, RecordStatus::Pending);
        assert!(r.can_edit);
        assert!(!r.is_immutable);
        assert!(r.invariants_hold());
    }

    #[test]
    fn test_transitions_keep_invariants() {
        let mut r = record();

        r.mark_confirmed("0xabc", "0xsigner");
        assert!(r.invariants_hold());
        assert!(r.is_immutable);
        assert!(!r.can_edit);
        assert_eq!(r.transaction_hash.as_deref(), Some("0xabc"));

        r.mark_rejected();
        assert!(r.invariants_hold());
        assert!(r.can_edit);

        r.mark_expired();
        assert!(r.invariants_hold());
        assert!(r.status.is_failed());

        r.mark_pending();
        assert!(r.invariants_hold());

        r.mark_confirmed_by_reconciliation("reconciler");
        assert!(r.invariants_hold());
        assert_eq!(r.confirmed_by.as_deref(), Some("reconciler"));
    }

    #[test]
    fn test_leaving_confirmed_clears_confirmation() {
        let mut r = record();
        r.mark_confirmed("0xabc", "0xsigner");
        r.mark_rejected();
        assert!(r.confirmed_at.is_none());
        assert!(r.confirmed_by.is_none());
        assert_eq!(r.transaction_hash.as_deref(), Some("0xabc"));

        r.mark_confirmed_by_reconciliation("reconciler");
        assert!(r.confirmed_at.is_some());
        assert_eq!(r.confirmed_by.as_deref(), Some("reconciler"));
        assert_eq!(r.transaction_hash.as_deref(), Some("0xabc"));

        let demotions: [fn(&mut ServiceRecord); 2] =
            [ServiceRecord::mark_expired, ServiceRecord::mark_pending];
        for demote in demotions {
            r.mark_confirmed("0xdef", "0xsigner");
            demote(&mut r);
            assert!(r.confirmed_at.is_none() && r.confirmed_by.is_none());
            assert!(r.invariants_hold());
        }
    }

    #[test]
    fn test_status_serializes_uppercase() {
        let json = serde_json::to_string(&RecordStatus::Rejected).unwrap();
        assert_eq!(json, "\"REJECTED\"");
    }
}
