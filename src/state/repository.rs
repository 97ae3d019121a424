/// PostgreSQL implementation of `RecordStore`.
///
/// All queries use sqlx runtime-checked queries (not compile-time checked)
/// to avoid requiring a live database during development builds.
use async_trait::async_trait;
use uuid::Uuid;

use super::models::{RecordStatus, ServiceRecord};
use super::{Database, RecordStore};
use crate::error::{AnchorError, Result};

fn db_err(e: sqlx::Error) -> AnchorError {
    AnchorError::Store(e.to_string())
}

#[derive(Clone)]
pub struct PgRecordStore {
    db: Database,
}

impl PgRecordStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl RecordStore for PgRecordStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<ServiceRecord>> {
        sqlx::query_as::<_, ServiceRecord>("SELECT * FROM service_records WHERE id = $1")
            .bind(id)
            .fetch_optional(self.db.pool())
            .await
            .map_err(db_err)
    }

    async fn find_hashed(&self) -> Result<Vec<ServiceRecord>> {
        sqlx::query_as::<_, ServiceRecord>(
            "SELECT * FROM service_records WHERE blockchain_hash IS NOT NULL ORDER BY created_at",
        )
        .fetch_all(self.db.pool())
        .await
        .map_err(db_err)
    }

    async fn find_by_status(&self, statuses: &[RecordStatus]) -> Result<Vec<ServiceRecord>> {
        sqlx::query_as::<_, ServiceRecord>(
            "SELECT * FROM service_records WHERE status::text = ANY($1) ORDER BY created_at",
        )
        .bind(
            statuses
                .iter()
                .map(|s| s.as_str().to_string())
                .collect::<Vec<_>>(),
        )
        .fetch_all(self.db.pool())
        .await
        .map_err(db_err)
    }

    async fn find_all(&self) -> Result<Vec<ServiceRecord>> {
        sqlx::query_as::<_, ServiceRecord>("SELECT * FROM service_records ORDER BY created_at")
            .fetch_all(self.db.pool())
            .await
            .map_err(db_err)
    }

    async fn save(&self, record: &ServiceRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO service_records
            (id, vehicle_id, service_type, description, mileage, cost, service_date, created_at, updated_at,
             status, blockchain_hash, hash_timestamp, transaction_hash, ledger_service_id,
             confirmed_at, confirmed_by, is_immutable, can_edit)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
            ON CONFLICT (id) DO UPDATE SET
                vehicle_id = $2, service_type = $3, description = $4, mileage = $5, cost = $6,
                service_date = $7, created_at = $8, updated_at = $9, status = $10,
                blockchain_hash = $11, hash_timestamp = $12, transaction_hash = $13,
                ledger_service_id = $14, confirmed_at = $15, confirmed_by = $16,
                is_immutable = $17, can_edit = $18
            "#,
        )
        .bind(record.id)
        .bind(&record.vehicle_id)
        .bind(&record.service_type)
        .bind(&record.description)
        .bind(record.mileage)
        .bind(record.cost)
        .bind(record.service_date)
        .bind(record.created_at)
        .bind(record.updated_at)
        .bind(record.status)
        .bind(&record.blockchain_hash)
        .bind(record.hash_timestamp)
        .bind(&record.transaction_hash)
        .bind(record.ledger_service_id)
        .bind(record.confirmed_at)
        .bind(&record.confirmed_by)
        .bind(record.is_immutable)
        .bind(record.can_edit)
        .execute(self.db.pool())
        .await
        .map_err(db_err)?;

        Ok(())
    }
}
