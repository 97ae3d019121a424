/// Record store boundary for maintenance-anchor.
///
/// Record CRUD is owned by the surrounding application. The engine only
/// needs find/save by id and a few predicates, expressed by the
/// `RecordStore` trait:
/// - PostgreSQL via sqlx (`PgRecordStore`)
/// - process-local map (`InMemoryRecordStore`) for tests and dev mode
///
/// There is no transaction spanning an anchor lifecycle. Every state
/// transition is an independent read-then-write.
pub mod memory;
pub mod models;
pub mod repository;

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{AnchorError, Result};
use models::{RecordStatus, ServiceRecord};

pub use memory::InMemoryRecordStore;
pub use repository::PgRecordStore;

/// Trait for the service-record store consumed by the engine.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Load one record by id.
    async fn find_by_id(&self, id: Uuid) -> Result<Option<ServiceRecord>>;

    /// Every record whose `blockchain_hash` is not null.
    async fn find_hashed(&self) -> Result<Vec<ServiceRecord>>;

    /// Every record whose status is one of `statuses`.
    async fn find_by_status(&self, statuses: &[RecordStatus]) -> Result<Vec<ServiceRecord>>;

    /// Every record.
    async fn find_all(&self) -> Result<Vec<ServiceRecord>>;

    /// Insert or overwrite a record by id.
    async fn save(&self, record: &ServiceRecord) -> Result<()>;
}

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Connect to PostgreSQL.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .map_err(|e| AnchorError::Store(format!("connect failed: {e}")))?;

        Ok(Self { pool })
    }

    /// Run pending migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AnchorError::Store(format!("Migration failed: {e}")))
    }

    /// Get a reference to the underlying pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}
