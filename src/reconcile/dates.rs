/// Date normalization for `fix_incorrect_dates`.
use chrono::{DateTime, Duration, Utc};

use crate::state::models::ServiceRecord;

/// Which fields `normalize` changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateFix {
    pub service_date: bool,
    pub created_at: bool,
}

impl DateFix {
    pub fn any(&self) -> bool {
        self.service_date || self.created_at
    }
}

/// Accepted service dates: `[now - 1y, now + 1y]`.
pub fn service_date_window(now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    let year = Duration::days(365);
    (now - year, now + year)
}

/// Pull a future `created_at` back to `now`, then replace an out-of-window
/// `service_date` with `created_at`.
pub fn normalize(record: &mut ServiceRecord, now: DateTime<Utc>) -> DateFix {
    let mut fix = DateFix::default();

    if record.created_at > now {
        record.created_at = now;
        fix.created_at = true;
    }

    let (earliest, latest) = service_date_window(now);
    if record.service_date < earliest || record.service_date > latest {
        record.service_date = record.created_at;
        fix.service_date = true;
    }

    if fix.any() {
        record.updated_at = now;
    }
    fix
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(service_date: DateTime<Utc>, created_at: DateTime<Utc>) -> ServiceRecord {
        let mut r = ServiceRecord::new("VIN", "INSPECTION", "Annual", 10, 50.0, service_date);
        r.created_at = created_at;
        r
    }

    #[test]
    fn test_in_window_untouched() {
        let now = Utc::now();
        let mut r = record(now - Duration::days(30), now - Duration::days(29));
        assert!(!normalize(&mut r, now).any());
    }

    #[test]
    fn test_ancient_service_date_uses_created_at() {
        let now = Utc::now();
        let created = now - Duration::days(3);
        let mut r = record(now - Duration::days(800), created);
        let fix = normalize(&mut r, now);
        assert!(fix.service_date);
        assert!(!fix.created_at);
        assert_eq!(r.service_date, created);
    }

    #[test]
    fn test_far_future_service_date() {
        let now = Utc::now();
        let mut r = record(now + Duration::days(400), now - Duration::days(1));
        assert!(normalize(&mut r, now).service_date);
    }

    #[test]
    fn test_future_created_at_clamped_first() {
        let now = Utc::now();
        let mut r = record(now + Duration::days(500), now + Duration::days(10));
        let fix = normalize(&mut r, now);
        assert!(fix.created_at && fix.service_date);
        assert_eq!(r.created_at, now);
        assert_eq!(r.service_date, now);
    }
}
