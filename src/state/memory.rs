/// Process-local `RecordStore` backed by a map.
///
/// Used by tests and by the CLI when no `DATABASE_URL` is configured.
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::models::{RecordStatus, ServiceRecord};
use super::RecordStore;
use crate::error::{AnchorError, Result};

#[derive(Default)]
pub struct InMemoryRecordStore {
    records: RwLock<HashMap<Uuid, ServiceRecord>>,
    /// When set, every bulk query fails. Lets tests exercise the
    /// "initial working set unavailable" path.
    fail_queries: AtomicBool,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn with_records(records: impl IntoIterator<Item = ServiceRecord>) -> Self {
        let store = Self::new();
        {
            let mut map = store.records.write().await;
            for r in records {
                map.insert(r.id, r);
            }
        }
        store
    }

    pub fn set_fail_queries(&self, fail: bool) {
        self.fail_queries.store(fail, Ordering::SeqCst);
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    fn check_available(&self) -> Result<()> {
        if self.fail_queries.load(Ordering::SeqCst) {
            return Err(AnchorError::Store("record store unavailable".into()));
        }
        Ok(())
    }

    async fn collect<F>(&self, pred: F) -> Result<Vec<ServiceRecord>>
    where
        F: Fn(&ServiceRecord) -> bool,
    {
        self.check_available()?;
        let mut out: Vec<ServiceRecord> = self
            .records
            .read()
            .await
            .values()
            .filter(|r| pred(r))
            .cloned()
            .collect();
        out.sort_by_key(|r| r.created_at);
        Ok(out)
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<ServiceRecord>> {
        Ok(self.records.read().await.get(&id).cloned())
    }

    async fn find_hashed(&self) -> Result<Vec<ServiceRecord>> {
        self.collect(|r| r.blockchain_hash.is_some()).await
    }

    async fn find_by_status(&self, statuses: &[RecordStatus]) -> Result<Vec<ServiceRecord>> {
        self.collect(|r| statuses.contains(&r.status)).await
    }

    async fn find_all(&self) -> Result<Vec<ServiceRecord>> {
        self.collect(|_| true).await
    }

    async fn save(&self, record: &ServiceRecord) -> Result<()> {
        self.records.write().await.insert(record.id, record.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn record(hash: Option<&str>) -> ServiceRecord {
        let mut r = ServiceRecord::new("VIN1", "BRAKES", "Pads", 1_000, 80.0, Utc::now());
        r.blockchain_hash = hash.map(str::to_string);
        r
    }

    #[tokio::test]
    async fn test_predicates() {
        let mut confirmed = record(Some("0x01"));
        confirmed.mark_confirmed("0xtx", "signer");
        let store =
            InMemoryRecordStore::with_records([record(None), record(Some("0x02")), confirmed]).await;

        assert_eq!(store.find_all().await.unwrap().len(), 3);
        assert_eq!(store.find_hashed().await.unwrap().len(), 2);
        assert_eq!(
            store
                .find_by_status(&[RecordStatus::Confirmed])
                .await
                .unwrap()
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn test_save_overwrites() {
        let store = InMemoryRecordStore::new();
        let mut r = record(None);
        store.save(&r).await.unwrap();
        r.mark_rejected();
        store.save(&r).await.unwrap();

        assert_eq!(store.len().await, 1);
        let loaded = store.find_by_id(r.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, RecordStatus::Rejected);
    }

    #[tokio::test]
    async fn test_failing_queries() {
        let store = InMemoryRecordStore::new();
        store.set_fail_queries(true);
        assert!(matches!(store.find_all().await, Err(AnchorError::Store(_))));
    }
}
