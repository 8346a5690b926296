use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::errors::GenerationError;
use crate::models::analysis::{AnalysisRecord, AnalysisRow};

/// Read access to analyses, plus the one-time insert made when an analysis finishes.
#[async_trait]
pub trait AnalysisStore: Send + Sync {
    async fn get(&self, id: Uuid) -> Result<Option<AnalysisRecord>, GenerationError>;

    async fn insert(&self, record: &AnalysisRecord) -> Result<(), GenerationError>;
}

#[derive(Default)]
pub struct InMemoryAnalysisStore {
    records: RwLock<HashMap<Uuid, AnalysisRecord>>,
}

impl InMemoryAnalysisStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AnalysisStore for InMemoryAnalysisStore {
    async fn get(&self, id: Uuid) -> Result<Option<AnalysisRecord>, GenerationError> {
        let records = self.records.read().unwrap_or_else(|e| e.into_inner());
        Ok(records.get(&id).cloned())
    }

    async fn insert(&self, record: &AnalysisRecord) -> Result<(), GenerationError> {
        let mut records = self.records.write().unwrap_or_else(|e| e.into_inner());
        if records.contains_key(&record.id) {
            return Err(GenerationError::Validation(format!(
                "Analysis {} already exists",
                record.id
            )));
        }
        records.insert(record.id, record.clone());
        Ok(())
    }
}

pub struct PgAnalysisStore {
    pool: PgPool,
}

impl PgAnalysisStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AnalysisStore for PgAnalysisStore {
    async fn get(&self, id: Uuid) -> Result<Option<AnalysisRecord>, GenerationError> {
        let row = sqlx::query_as::<_, AnalysisRow>("SELECT * FROM analyses WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(AnalysisRecord::try_from)
            .transpose()
            .map_err(|e| GenerationError::Storage(format!("Corrupt analysis {id}: {e}")))
    }

    async fn insert(&self, record: &AnalysisRecord) -> Result<(), GenerationError> {
        let breakdown = serde_json::to_value(record.score_breakdown)
            .map_err(|e| GenerationError::Storage(e.to_string()))?;
        let keywords = serde_json::to_value(&record.keyword_match)
            .map_err(|e| GenerationError::Storage(e.to_string()))?;

        let result = sqlx::query(
            r#"
            INSERT INTO analyses
                (id, user_id, resume_text, job_description, score_breakdown,
                 overall_score, keyword_match, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(record.id)
        .bind(record.user_id)
        .bind(&record.resume_text)
        .bind(&record.job_description)
        .bind(&breakdown)
        .bind(record.overall_score as i32)
        .bind(&keywords)
        .bind(record.created_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(GenerationError::Validation(format!(
                "Analysis {} already exists",
                record.id
            )));
        }
        Ok(())
    }
}
