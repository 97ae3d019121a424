/// Canonical record hashing.
///
/// The anchored digest is keccak-256 over the UTF-8 JSON serialization of
/// a fixed field subset, in this key order:
///
/// ```text
/// {"recordId","vehicleId","type","description","serviceDate","timestamp"}
/// ```
///
/// `timestamp` is the submission time in epoch milliseconds. It is stored
/// on the record as `hash_timestamp`, so the digest can be recomputed
/// later from stored fields alone.
use alloy::primitives::keccak256;
use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use serde::Serialize;

use crate::error::Result;
use crate::state::models::ServiceRecord;

/// `0x` + 64 hex digits.
pub const HASH_HEX_LEN: usize = 66;

pub const ZERO_HASH: &str = "0x0000000000000000000000000000000000000000000000000000000000000000";

/// Values written by older code paths in place of a real digest.
pub const PLACEHOLDER_HASHES: &[&str] = &[ZERO_HASH, "0x", "0x0", "pending", "placeholder", "null"];

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CanonicalRecord<'a> {
    record_id: String,
    vehicle_id: &'a str,
    #[serde(rename = "type")]
    service_type: &'a str,
    description: &'a str,
    service_date: String,
    timestamp: i64,
}

/// Canonical timestamps carry millisecond precision.
pub fn canonical_now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

pub fn canonical_json(record: &ServiceRecord, timestamp: DateTime<Utc>) -> Result<String> {
    let canonical = CanonicalRecord {
        record_id: record.id.to_string(),
        vehicle_id: &record.vehicle_id,
        service_type: &record.service_type,
        description: &record.description,
        service_date: record
            .service_date
            .to_rfc3339_opts(SecondsFormat::Millis, true),
        timestamp: timestamp.timestamp_millis(),
    };
    Ok(serde_json::to_string(&canonical)?)
}

/// Digest of the canonical object, as `0x`-prefixed lowercase hex.
pub fn digest(record: &ServiceRecord, timestamp: DateTime<Utc>) -> Result<String> {
    let json = canonical_json(record, timestamp)?;
    Ok(format!("0x{}", hex::encode(keccak256(json.as_bytes()))))
}

/// Recompute the digest from the record's stored `hash_timestamp`.
/// `None` when the record was never hashed.
pub fn recompute(record: &ServiceRecord) -> Result<Option<String>> {
    record
        .hash_timestamp
        .map(|ts| digest(record, ts))
        .transpose()
}

/// Stamp a fresh canonical timestamp on `record` and store its digest.
pub fn rehash(record: &mut ServiceRecord) -> Result<String> {
    let timestamp = canonical_now();
    let hash = digest(record, timestamp)?;
    record.hash_timestamp = Some(timestamp);
    record.blockchain_hash = Some(hash.clone());
    Ok(hash)
}

pub fn is_well_formed(hash: &str) -> bool {
    hash.len() == HASH_HEX_LEN
        && hash.starts_with("0x")
        && hash[2..].bytes().all(|b| b.is_ascii_hexdigit())
}

/// True for known placeholder values and anything that is not a digest.
pub fn is_placeholder(hash: &str) -> bool {
    PLACEHOLDER_HASHES
        .iter()
        .any(|p| p.eq_ignore_ascii_case(hash))
        || !is_well_formed(hash)
}

/// The record holds no usable digest.
pub fn needs_hash(record: &ServiceRecord) -> bool {
    record.blockchain_hash.as_deref().map_or(true, is_placeholder)
}

/// The record holds a real digest (not null, not a placeholder).
pub fn has_real_hash(record: &ServiceRecord) -> bool {
    !needs_hash(record)
}

pub fn hashes_match(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use uuid::Uuid;

    fn record() -> ServiceRecord {
        let mut r = ServiceRecord::new(
            "1HGCM82633A004352",
            "OIL_CHANGE",
            "Full synthetic 5W-30",
            50_000,
            150.0,
            Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap(),
        );
        r.id = Uuid::parse_str("0190f2a4-7c1e-7d3a-9b7e-1234567890ab").unwrap();
        r
    }

    fn ts() -> DateTime<Utc> {
        Utc.timestamp_millis_opt(1_709_287_200_123).unwrap()
    }

    #[test]
    fn test_canonical_key_order() {
        let json = canonical_json(&record(), ts()).unwrap();
        assert_eq!(
            json,
            r#"{"recordId":"0190f2a4-7c1e-7d3a-9b7e-1234567890ab","vehicleId":"1HGCM82633A004352","type":"OIL_CHANGE","description":"Full synthetic 5W-30","serviceDate":"2024-03-01T10:00:00.000Z","timestamp":1709287200123}"#
        );
    }

    #[test]
    fn test_digest_deterministic() {
        let r = record();
        let a = digest(&r, ts()).unwrap();
        let b = digest(&r, ts()).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), HASH_HEX_LEN);
        assert!(is_well_formed(&a));
    }

    #[test]
    fn test_digest_ignores_unhashed_fields() {
        let r = record();
        let mut other = r.clone();
        other.mileage = 99_999;
        other.cost = 1.0;
        other.mark_rejected();
        assert_eq!(digest(&r, ts()).unwrap(), digest(&other, ts()).unwrap());
    }

    #[test]
    fn test_digest_tracks_hashed_fields() {
        let r = record();
        let mut edited = r.clone();
        edited.description = "Conventional oil".into();
        assert_ne!(digest(&r, ts()).unwrap(), digest(&edited, ts()).unwrap());
        assert_ne!(
            digest(&r, ts()).unwrap(),
            digest(&r, ts() + chrono::Duration::milliseconds(1)).unwrap()
        );
    }

    #[test]
    fn test_rehash_then_recompute() {
        let mut r = record();
        assert_eq!(recompute(&r).unwrap(), None);
        let hash = rehash(&mut r).unwrap();
        assert_eq!(recompute(&r).unwrap(), Some(hash));
    }

    #[test]
    fn test_placeholders() {
        assert!(is_placeholder(ZERO_HASH));
        assert!(is_placeholder("pending"));
        assert!(is_placeholder("0x1234"));
        assert!(!is_placeholder(&format!("0x{}", "ab".repeat(32))));

        let mut r = record();
        assert!(needs_hash(&r));
        r.blockchain_hash = Some(ZERO_HASH.to_string());
        assert!(needs_hash(&r));
        rehash(&mut r).unwrap();
        assert!(has_real_hash(&r));
    }

    #[test]
    fn test_hashes_match_ignores_case() {
        let lower = format!("0x{}", "ab".repeat(32));
        assert!(hashes_match(&lower, &lower.to_uppercase().replacen("0X", "0x", 1)));
        assert!(!hashes_match(&lower, ZERO_HASH));
    }
}
