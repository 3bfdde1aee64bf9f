//! Job-record storage.
//!
//! The engine never talks to a database directly; routes go through the
//! `JobStore` seam. `PgJobStore` keeps each job as a JSONB document, and
//! `MemoryJobStore` backs tests and local runs. Writes are last-write-wins.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::types::Json;
use sqlx::PgPool;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{EngineError, EngineResult};
use crate::models::RepairJob;

#[async_trait]
pub trait JobStore: Send + Sync {
    /// Next human-readable job number, e.g. `REP-20260115-00042`.
    async fn next_job_number(&self) -> EngineResult<String>;

    async fn insert(&self, job: &RepairJob) -> EngineResult<()>;

    async fn get(&self, id: Uuid) -> EngineResult<Option<RepairJob>>;

    /// All jobs, oldest first.
    async fn list(&self) -> EngineResult<Vec<RepairJob>>;

    /// Overwrite an existing job. `NotFound` if it was deleted meanwhile.
    async fn save(&self, job: &RepairJob) -> EngineResult<()>;

    /// Remove the job and its history. Returns whether it existed.
    async fn delete(&self, id: Uuid) -> EngineResult<bool>;
}

/// Type alias for the shared job store carried in router extensions.
pub type AppDb = Arc<dyn JobStore>;

fn format_job_number(sequence: u64) -> String {
    format!("REP-{}-{:05}", Utc::now().format("%Y%m%d"), sequence)
}

fn not_found(id: Uuid) -> EngineError {
    EngineError::NotFound(format!("Repair job {} not found", id))
}

// ============================================================================
// In-memory store
// ============================================================================

#[derive(Default)]
pub struct MemoryJobStore {
    jobs: RwLock<HashMap<Uuid, RepairJob>>,
    sequence: AtomicU64,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn next_job_number(&self) -> EngineResult<String> {
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format_job_number(sequence))
    }

    async fn insert(&self, job: &RepairJob) -> EngineResult<()> {
        let mut jobs = self.jobs.write().await;
        if jobs.contains_key(&job.id) {
            return Err(EngineError::Conflict(format!("Repair job {} already exists", job.id)));
        }
        jobs.insert(job.id, job.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> EngineResult<Option<RepairJob>> {
        Ok(self.jobs.read().await.get(&id).cloned())
    }

    async fn list(&self) -> EngineResult<Vec<RepairJob>> {
        let mut jobs: Vec<RepairJob> = self.jobs.read().await.values().cloned().collect();
        jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.job_number.cmp(&b.job_number)));
        Ok(jobs)
    }

    async fn save(&self, job: &RepairJob) -> EngineResult<()> {
        let mut jobs = self.jobs.write().await;
        match jobs.get_mut(&job.id) {
            Some(slot) => {
                *slot = job.clone();
                Ok(())
            }
            None => Err(not_found(job.id)),
        }
    }

    async fn delete(&self, id: Uuid) -> EngineResult<bool> {
        Ok(self.jobs.write().await.remove(&id).is_some())
    }
}

// ============================================================================
// Postgres store
// ============================================================================

pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn next_job_number(&self) -> EngineResult<String> {
        let sequence: i64 = sqlx::query_scalar("SELECT nextval('repair_job_number_seq')")
            .fetch_one(&self.pool)
            .await?;
        Ok(format_job_number(sequence.max(0) as u64))
    }

    async fn insert(&self, job: &RepairJob) -> EngineResult<()> {
        sqlx::query(
            r#"
            INSERT INTO repair_jobs (id, job_number, document, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(job.id)
        .bind(&job.job_number)
        .bind(Json(job))
        .bind(job.created_at)
        .bind(job.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> EngineResult<Option<RepairJob>> {
        let row: Option<Json<RepairJob>> =
            sqlx::query_scalar("SELECT document FROM repair_jobs WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|Json(job)| job.normalize()))
    }

    async fn list(&self) -> EngineResult<Vec<RepairJob>> {
        let rows: Vec<Json<RepairJob>> =
            sqlx::query_scalar("SELECT document FROM repair_jobs ORDER BY created_at, job_number")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(|Json(job)| job.normalize()).collect())
    }

    async fn save(&self, job: &RepairJob) -> EngineResult<()> {
        let updated = sqlx::query(
            "UPDATE repair_jobs SET document = $2, updated_at = $3 WHERE id = $1",
        )
        .bind(job.id)
        .bind(Json(job))
        .bind(job.updated_at)
        .execute(&self.pool)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(not_found(job.id));
        }
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> EngineResult<bool> {
        let deleted = sqlx::query("DELETE FROM repair_jobs WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(deleted.rows_affected() > 0)
    }
}
